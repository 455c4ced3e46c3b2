use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

/// Bounded in-memory byte pipe coupling the encoder's producer thread to a
/// synchronous consumer. Dropping the writer ends the stream cleanly;
/// `close_with_error` makes the reader's next read fail with that error;
/// dropping the reader makes the writer's next write fail with
/// `BrokenPipe`. Back-pressure is the channel bound.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = bounded::<Vec<u8>>(capacity.max(1));
    let err = Arc::new(Mutex::new(None));
    (
        PipeWriter {
            tx: Some(tx),
            err: Arc::clone(&err),
        },
        PipeReader {
            rx,
            err,
            pending: Vec::new(),
            pos: 0,
        },
    )
}

pub struct PipeWriter {
    tx: Option<Sender<Vec<u8>>>,
    err: Arc<Mutex<Option<io::Error>>>,
}

impl PipeWriter {
    /// Close the write end so the consumer's next read returns `err`
    /// instead of a clean end of stream.
    pub fn close_with_error(mut self, err: io::Error) {
        *self.err.lock().unwrap() = Some(err);
        self.tx.take();
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))?;
        tx.send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    err: Arc<Mutex<Option<io::Error>>>,
    pending: Vec<u8>,
    pos: usize,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.pending.len() {
            match self.rx.recv() {
                Ok(segment) => {
                    self.pending = segment;
                    self.pos = 0;
                }
                Err(_) => {
                    // Producer gone: surface its error once, then EOF.
                    if let Some(e) = self.err.lock().unwrap().take() {
                        return Err(e);
                    }
                    return Ok(0);
                }
            }
        }
        let n = (self.pending.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
