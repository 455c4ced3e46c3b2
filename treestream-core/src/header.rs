use byteorder::{BigEndian, ByteOrder};
use std::io::{Read, Write};

use crate::error::{Result, StreamError};
use crate::frame::{EntryKind, HEADER_MAGIC, HEADER_SIZE, HEADER_VERSION};

// Field offsets inside the 512-byte header.
const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 4;
const OFF_PATH: usize = 8;
const PATH_FIELD: usize = 256;
const OFF_SIZE: usize = 264;
const OFF_MODE: usize = 272;
const OFF_MTIME: usize = 276;
const OFF_KIND: usize = 284;
const OFF_LINK: usize = 285;
const LINK_FIELD: usize = 128;
const OFF_CRC: usize = HEADER_SIZE - 4;

/// One record's fixed-size header. `file_mode` is carried verbatim as
/// opaque platform bits; `mod_time` is Unix seconds and may be negative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u32,
    pub rel_path: String,
    pub file_size: u64,
    pub file_mode: u32,
    pub mod_time: i64,
    pub kind: EntryKind,
    pub link_target: String,
}

/// Serialise a header into its 512-byte wire form, CRC appended over the
/// first 508 bytes, and write it in one call.
pub fn write_header<W: Write>(w: &mut W, fh: &FileHeader) -> Result<()> {
    let mut buf = [0u8; HEADER_SIZE];
    BigEndian::write_u32(&mut buf[OFF_MAGIC..], HEADER_MAGIC);
    BigEndian::write_u32(&mut buf[OFF_VERSION..], fh.version);

    let path = fh.rel_path.as_bytes();
    if path.len() >= PATH_FIELD {
        return Err(StreamError::Format(format!(
            "file path too long: {}",
            fh.rel_path
        )));
    }
    buf[OFF_PATH..OFF_PATH + path.len()].copy_from_slice(path);

    BigEndian::write_u64(&mut buf[OFF_SIZE..], fh.file_size);
    BigEndian::write_u32(&mut buf[OFF_MODE..], fh.file_mode);
    BigEndian::write_i64(&mut buf[OFF_MTIME..], fh.mod_time);
    buf[OFF_KIND] = fh.kind as u8;

    if fh.kind == EntryKind::Symlink {
        let target = fh.link_target.as_bytes();
        if target.len() >= LINK_FIELD {
            return Err(StreamError::Format(format!(
                "symlink target too long: {}",
                fh.link_target
            )));
        }
        buf[OFF_LINK..OFF_LINK + target.len()].copy_from_slice(target);
    }

    // Bytes 413..507 stay reserved as zero.
    let crc = crc32fast::hash(&buf[..OFF_CRC]);
    BigEndian::write_u32(&mut buf[OFF_CRC..], crc);

    w.write_all(&buf)
        .map_err(|e| StreamError::io("write file header", e))
}

/// Read exactly 512 bytes and decode them, verifying magic and CRC.
pub fn read_header<R: Read>(r: &mut R) -> Result<FileHeader> {
    let mut buf = [0u8; HEADER_SIZE];
    r.read_exact(&mut buf)
        .map_err(|e| StreamError::io("read file header", e))?;
    parse_header(&buf)
}

pub fn parse_header(buf: &[u8; HEADER_SIZE]) -> Result<FileHeader> {
    let magic = BigEndian::read_u32(&buf[OFF_MAGIC..]);
    if magic != HEADER_MAGIC {
        return Err(StreamError::Format(format!(
            "invalid header magic: expected {HEADER_MAGIC:#010x}, got {magic:#010x}"
        )));
    }

    let stored = BigEndian::read_u32(&buf[OFF_CRC..]);
    let computed = crc32fast::hash(&buf[..OFF_CRC]);
    if stored != computed {
        return Err(StreamError::Integrity(format!(
            "header CRC mismatch: stored {stored:#010x}, computed {computed:#010x}"
        )));
    }

    let version = BigEndian::read_u32(&buf[OFF_VERSION..]);
    if version != HEADER_VERSION {
        return Err(StreamError::Format(format!(
            "unsupported header version: {version}"
        )));
    }

    let kind_raw = buf[OFF_KIND];
    let kind = EntryKind::from_wire(kind_raw)
        .ok_or_else(|| StreamError::Format(format!("unknown file type: {kind_raw}")))?;

    let rel_path = nul_terminated(&buf[OFF_PATH..OFF_PATH + PATH_FIELD])?;
    let link_target = if kind == EntryKind::Symlink {
        nul_terminated(&buf[OFF_LINK..OFF_LINK + LINK_FIELD])?
    } else {
        String::new()
    };

    Ok(FileHeader {
        version,
        rel_path,
        file_size: BigEndian::read_u64(&buf[OFF_SIZE..]),
        file_mode: BigEndian::read_u32(&buf[OFF_MODE..]),
        mod_time: BigEndian::read_i64(&buf[OFF_MTIME..]),
        kind,
        link_target,
    })
}

// The wire form is the byte prefix up to the first NUL.
fn nul_terminated(field: &[u8]) -> Result<String> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end])
        .map(str::to_owned)
        .map_err(|_| StreamError::Format("non-UTF-8 string in header".into()))
}
