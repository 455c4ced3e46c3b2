use byteorder::{BigEndian, ByteOrder};
use std::io::{self, Read, Write};

use crate::error::{Result, StreamError};
use crate::frame::{CHUNK_HEADER_SIZE, CHUNK_MAGIC};

/// Emit one chunk: 4-byte magic, 8-byte length, payload.
pub fn write_chunk<W: Write>(w: &mut W, payload: &[u8]) -> Result<()> {
    let mut head = [0u8; CHUNK_HEADER_SIZE];
    BigEndian::write_u32(&mut head[0..4], CHUNK_MAGIC);
    BigEndian::write_u64(&mut head[4..12], payload.len() as u64);
    w.write_all(&head)
        .map_err(|e| StreamError::io("write chunk header", e))?;
    w.write_all(payload)
        .map_err(|e| StreamError::io("write chunk payload", e))
}

/// Read and validate a 12-byte chunk header, returning the payload length.
pub fn read_chunk_header<R: Read>(r: &mut R, max_len: usize) -> Result<u64> {
    let mut head = [0u8; CHUNK_HEADER_SIZE];
    r.read_exact(&mut head)
        .map_err(|e| StreamError::io("read chunk header", e))?;

    let magic = BigEndian::read_u32(&head[0..4]);
    if magic != CHUNK_MAGIC {
        return Err(StreamError::Format(format!(
            "invalid chunk magic: expected {CHUNK_MAGIC:#010x}, got {magic:#010x}"
        )));
    }

    let len = BigEndian::read_u64(&head[4..12]);
    if len > max_len as u64 {
        return Err(StreamError::Format(format!(
            "chunk length {len} exceeds maximum allowed {max_len}"
        )));
    }
    Ok(len)
}

/// Consume a chunk payload without keeping it.
pub fn skip_payload<R: Read>(r: &mut R, len: u64) -> Result<()> {
    let copied = io::copy(&mut r.by_ref().take(len), &mut io::sink())
        .map_err(|e| StreamError::io("skip chunk payload", e))?;
    if copied < len {
        return Err(StreamError::io(
            "skip chunk payload",
            io::Error::new(io::ErrorKind::UnexpectedEof, "chunk payload truncated"),
        ));
    }
    Ok(())
}
