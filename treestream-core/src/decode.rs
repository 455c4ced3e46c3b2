use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::chunk;
use crate::error::{Result, StreamError};
use crate::frame::{CHUNK_MAGIC, DEFAULT_CHUNK_SIZE, EntryKind, MANIFEST_MAGIC};
use crate::header::{read_header, FileHeader};
use crate::manifest::read_manifest;
use crate::path_safety::sanitize_path;

#[derive(Debug, Default, Clone)]
pub struct DecodeReport {
    pub files: u64,
    pub dirs: u64,
    pub symlinks: u64,
    pub skipped: u64,
    pub recoveries: u64,
    pub manifest_entries: Option<u64>,
}

/// Reconstructs a directory tree from a record stream. In strict mode
/// every error aborts the stream and a trailing manifest is required; in
/// non-strict mode chunk-level corruption triggers a byte-scan
/// resynchronisation and unsafe records are skipped.
pub struct Decoder {
    dest: PathBuf,
    strict: bool,
    max_chunk_size: usize,
}

impl Decoder {
    pub fn new(dest: impl Into<PathBuf>, strict: bool, max_chunk_size: usize) -> Self {
        let max_chunk_size = if max_chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            max_chunk_size
        };
        Self {
            dest: dest.into(),
            strict,
            max_chunk_size,
        }
    }

    /// Decode from a forward-only stream. Chunk resynchronisation needs to
    /// rewind and is therefore unavailable; corruption that would trigger
    /// it surfaces as a `Recovery` error instead.
    pub fn decode<R: Read>(&self, r: R) -> Result<DecodeReport> {
        self.run(PeekReader::new(ForwardSource(r)))
    }

    /// Decode from a seekable stream, with chunk resynchronisation
    /// available in non-strict mode.
    pub fn decode_seekable<R: Read + Seek>(&self, r: R) -> Result<DecodeReport> {
        self.run(PeekReader::new(SeekSource(r)))
    }

    fn run<S: Source>(&self, mut src: PeekReader<S>) -> Result<DecodeReport> {
        let mut report = DecodeReport::default();
        let mut records: u64 = 0;
        let mut saw_manifest = false;

        loop {
            let magic = match src
                .peek4()
                .map_err(|e| StreamError::io("peek stream", e))?
            {
                None => break, // clean end of stream
                Some(b) => u32::from_be_bytes(b),
            };

            if magic == MANIFEST_MAGIC {
                let entries = read_manifest(&mut src)?;
                if entries.len() as u64 != records {
                    log::warn!(
                        "manifest lists {} records, stream carried {}",
                        entries.len(),
                        records
                    );
                }
                report.manifest_entries = Some(entries.len() as u64);
                saw_manifest = true;
                break;
            }

            let header = read_header(&mut src)?;
            records += 1;

            let full_path = match sanitize_path(&self.dest, &header.rel_path) {
                Ok(p) => p,
                Err(e) => {
                    if self.strict {
                        return Err(e);
                    }
                    log::warn!("skipping record: {e}");
                    report.skipped += 1;
                    if header.kind == EntryKind::Regular {
                        self.drain_chunks(&mut src, header.file_size)?;
                    }
                    continue;
                }
            };

            if let Some(parent) = full_path.parent() {
                make_dirs(parent, 0o755)?;
            }

            match header.kind {
                EntryKind::Directory => {
                    make_dirs(&full_path, header.file_mode)?;
                    report.dirs += 1;
                    log::debug!("decoded directory {}", header.rel_path);
                }
                EntryKind::Symlink => {
                    replace_symlink(&full_path, &header.link_target)?;
                    report.symlinks += 1;
                    log::debug!(
                        "decoded symlink {} -> {}",
                        header.rel_path,
                        header.link_target
                    );
                }
                EntryKind::Regular => match self.restore_file(&mut src, &header, &full_path) {
                    Ok(()) => {
                        report.files += 1;
                        log::debug!(
                            "decoded file {} ({} bytes)",
                            header.rel_path,
                            header.file_size
                        );
                    }
                    Err(e) if !self.strict && chunk_level(&e) => {
                        log::warn!(
                            "chunk stream damaged in {}: {e}; scanning for the next chunk boundary",
                            header.rel_path
                        );
                        self.resync(&mut src)?;
                        report.recoveries += 1;
                        report.skipped += 1;
                    }
                    Err(e) => return Err(e),
                },
            }
        }

        if self.strict && !saw_manifest {
            return Err(StreamError::Format(
                "stream ended without a manifest".into(),
            ));
        }
        Ok(report)
    }

    // Open the destination with the recorded mode and fill it chunk by
    // chunk until the declared size is reached. The handle closes on every
    // exit path, so a failed file is left truncated at the failure point.
    fn restore_file<S: Source>(
        &self,
        src: &mut PeekReader<S>,
        header: &FileHeader,
        path: &Path,
    ) -> Result<()> {
        let mut opts = OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(header.file_mode);
        }
        let mut file = opts
            .open(path)
            .map_err(|e| StreamError::io(format!("create {}", path.display()), e))?;

        let mut buf = vec![0u8; self.max_chunk_size];
        let mut total: u64 = 0;
        while total < header.file_size {
            let len = chunk::read_chunk_header(src, self.max_chunk_size)?;
            if total + len > header.file_size {
                return Err(StreamError::Integrity(format!(
                    "chunk overruns declared size of {}: {total} + {len} > {}",
                    header.rel_path, header.file_size
                )));
            }
            src.read_exact(&mut buf[..len as usize])
                .map_err(|e| StreamError::io("read chunk payload", e))?;
            file.write_all(&buf[..len as usize])
                .map_err(|e| StreamError::io(format!("write {}", path.display()), e))?;
            total += len;
        }
        Ok(())
    }

    // Consume a rejected record's chunks so the stream stays in sync.
    fn drain_chunks<S: Source>(&self, src: &mut PeekReader<S>, file_size: u64) -> Result<()> {
        let mut total: u64 = 0;
        while total < file_size {
            let len = chunk::read_chunk_header(src, self.max_chunk_size)?;
            chunk::skip_payload(src, len)?;
            total += len;
        }
        Ok(())
    }

    // Byte-scan resynchronisation: roll a 4-byte window over the stream
    // until the chunk sentinel appears, rewind so the full chunk header can
    // be re-read from its magic, then drain the orphaned chunks of the
    // abandoned record up to the next non-chunk boundary.
    fn resync<S: Source>(&self, src: &mut PeekReader<S>) -> Result<()> {
        if !src.supports_rewind() {
            return Err(StreamError::Recovery(
                "stream does not support seeking, cannot recover".into(),
            ));
        }

        let needle = CHUNK_MAGIC.to_be_bytes();
        'scan: loop {
            let mut window = [0u8; 4];
            let mut filled = 0usize;
            loop {
                let mut byte = [0u8; 1];
                let n = src
                    .read(&mut byte)
                    .map_err(|e| StreamError::io("scan stream", e))?;
                if n == 0 {
                    return Err(StreamError::Recovery(
                        "stream ended before a chunk boundary was found".into(),
                    ));
                }
                window.rotate_left(1);
                window[3] = byte[0];
                filled += 1;
                if filled >= 4 && window == needle {
                    src.rewind(4)
                        .map_err(|e| StreamError::io("rewind stream", e))?;
                    break;
                }
            }

            loop {
                let magic = match src
                    .peek4()
                    .map_err(|e| StreamError::io("peek stream", e))?
                {
                    None => return Ok(()),
                    Some(b) => u32::from_be_bytes(b),
                };
                if magic != CHUNK_MAGIC {
                    return Ok(());
                }
                match chunk::read_chunk_header(src, self.max_chunk_size) {
                    Ok(len) => chunk::skip_payload(src, len)?,
                    // A scan hit inside unrelated bytes; keep scanning.
                    Err(StreamError::Format(_)) => continue 'scan,
                    Err(e) => return Err(e),
                }
            }
        }
    }
}

// Chunk-header and chunk-payload failures are the ones recovery may
// rescue; everything else stays terminal.
fn chunk_level(e: &StreamError) -> bool {
    match e {
        StreamError::Format(_) | StreamError::Integrity(_) => true,
        _ => e.is_truncation(),
    }
}

fn make_dirs(path: &Path, mode: u32) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder
        .create(path)
        .map_err(|e| StreamError::io(format!("create directory {}", path.display()), e))
}

// Replaces whatever currently sits at `path` with the symlink. The link
// target is written verbatim; no mode is applied.
#[cfg(unix)]
fn replace_symlink(path: &Path, target: &str) -> Result<()> {
    if let Ok(md) = fs::symlink_metadata(path) {
        let removed = if md.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        removed.map_err(|e| StreamError::io(format!("remove {}", path.display()), e))?;
    }
    std::os::unix::fs::symlink(target, path)
        .map_err(|e| StreamError::io(format!("symlink {} -> {target}", path.display()), e))
}

#[cfg(not(unix))]
fn replace_symlink(path: &Path, target: &str) -> Result<()> {
    let _ = target;
    Err(StreamError::io(
        format!("symlink {}", path.display()),
        io::Error::new(io::ErrorKind::Unsupported, "symlinks are not supported here"),
    ))
}

// Byte source the decoder consumes. `rewind` undoes reads during chunk
// resynchronisation; forward-only sources report it as unsupported.
trait Source: Read {
    fn supports_rewind(&self) -> bool;
    fn rewind(&mut self, n: u64) -> io::Result<()>;
}

struct SeekSource<R: Read + Seek>(R);

impl<R: Read + Seek> Read for SeekSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read + Seek> Source for SeekSource<R> {
    fn supports_rewind(&self) -> bool {
        true
    }

    fn rewind(&mut self, n: u64) -> io::Result<()> {
        self.0.seek(SeekFrom::Current(-(n as i64)))?;
        Ok(())
    }
}

struct ForwardSource<R: Read>(R);

impl<R: Read> Read for ForwardSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read> Source for ForwardSource<R> {
    fn supports_rewind(&self) -> bool {
        false
    }

    fn rewind(&mut self, _n: u64) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stream does not support seeking",
        ))
    }
}

// Exact 4-byte lookahead. Peeked bytes are handed back to the next read,
// so the underlying position stays byte-accurate for recovery seeks.
struct PeekReader<S> {
    inner: S,
    pending: [u8; 4],
    len: usize,
    pos: usize,
}

impl<S: Source> PeekReader<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            pending: [0; 4],
            len: 0,
            pos: 0,
        }
    }

    /// Look at the next 4 bytes without consuming them. `None` means the
    /// stream ended cleanly on a block boundary; ending inside the 4 bytes
    /// is an `UnexpectedEof` error.
    fn peek4(&mut self) -> io::Result<Option<[u8; 4]>> {
        if self.pos < self.len {
            debug_assert_eq!((self.pos, self.len), (0, 4));
            return Ok(Some(self.pending));
        }

        let mut first = [0u8; 1];
        loop {
            match self.inner.read(&mut first) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        let mut buf = [0u8; 4];
        buf[0] = first[0];
        self.inner.read_exact(&mut buf[1..])?;
        self.pending = buf;
        self.len = 4;
        self.pos = 0;
        Ok(Some(buf))
    }

    fn supports_rewind(&self) -> bool {
        self.inner.supports_rewind()
    }

    fn rewind(&mut self, n: u64) -> io::Result<()> {
        debug_assert!(self.pos >= self.len, "rewind with peeked bytes pending");
        self.inner.rewind(n)
    }
}

impl<S: Source> Read for PeekReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos < self.len {
            let n = (self.len - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
            self.pos += n;
            return Ok(n);
        }
        self.inner.read(buf)
    }
}
