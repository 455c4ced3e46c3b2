use byteorder::{BigEndian, ReadBytesExt};
use std::io::{self, Read};

use crate::error::{Result, StreamError};
use crate::frame::{EntryKind, MANIFEST_MAGIC, MANIFEST_VERSION};

/// One record's entry in the trailing index. `header_offset` is the byte
/// offset of the record's header from the start of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub header_offset: u64,
    pub file_size: u64,
    pub kind: EntryKind,
    pub rel_path: String,
}

/// Serialise the whole manifest into one contiguous buffer and write it in
/// a single call, so a streaming consumer never observes a torn manifest.
/// Layout: magic, version, entry count, entries, trailer magic, CRC32 over
/// every preceding byte.
pub fn write_manifest<W: io::Write>(w: &mut W, entries: &[ManifestEntry]) -> Result<()> {
    let mut buf = Vec::with_capacity(24 + entries.len() * 32);
    buf.extend_from_slice(&MANIFEST_MAGIC.to_be_bytes());
    buf.extend_from_slice(&MANIFEST_VERSION.to_be_bytes());
    buf.extend_from_slice(&(entries.len() as u64).to_be_bytes());

    for entry in entries {
        let path = entry.rel_path.as_bytes();
        if path.len() > u16::MAX as usize {
            return Err(StreamError::Format(format!(
                "manifest path too long: {}",
                entry.rel_path
            )));
        }
        buf.extend_from_slice(&entry.header_offset.to_be_bytes());
        buf.extend_from_slice(&entry.file_size.to_be_bytes());
        buf.push(entry.kind as u8);
        buf.extend_from_slice(&(path.len() as u16).to_be_bytes());
        buf.extend_from_slice(path);
    }

    buf.extend_from_slice(&MANIFEST_MAGIC.to_be_bytes());
    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_be_bytes());

    w.write_all(&buf)
        .map_err(|e| StreamError::io("write manifest", e))
}

/// Read a manifest from the stream. The whole block is consumed through
/// the CRC fold first, so a CRC mismatch takes precedence over version,
/// trailer, and entry validation: corruption anywhere in the block is
/// reported as damage, not malformation.
pub fn read_manifest<R: Read>(r: &mut R) -> Result<Vec<ManifestEntry>> {
    let merr = |e: io::Error| StreamError::io("read manifest", e);
    let mut cr = CrcReader::new(r);

    let magic = cr.read_u32::<BigEndian>().map_err(merr)?;
    if magic != MANIFEST_MAGIC {
        return Err(StreamError::Format(format!(
            "invalid manifest magic: expected {MANIFEST_MAGIC:#010x}, got {magic:#010x}"
        )));
    }

    let version = cr.read_u32::<BigEndian>().map_err(merr)?;
    let count = cr.read_u64::<BigEndian>().map_err(merr)?;
    let mut raw_entries = Vec::new();
    for _ in 0..count {
        let header_offset = cr.read_u64::<BigEndian>().map_err(merr)?;
        let file_size = cr.read_u64::<BigEndian>().map_err(merr)?;
        let kind_raw = cr.read_u8().map_err(merr)?;
        let path_len = cr.read_u16::<BigEndian>().map_err(merr)?;
        let mut path = vec![0u8; path_len as usize];
        cr.read_exact(&mut path).map_err(merr)?;
        raw_entries.push((header_offset, file_size, kind_raw, path));
    }
    let trailer = cr.read_u32::<BigEndian>().map_err(merr)?;

    let computed = cr.finalize();
    let stored = r.read_u32::<BigEndian>().map_err(merr)?;
    if stored != computed {
        return Err(StreamError::Integrity(format!(
            "manifest CRC mismatch: stored {stored:#010x}, computed {computed:#010x}"
        )));
    }

    if version != MANIFEST_VERSION {
        return Err(StreamError::Format(format!(
            "unsupported manifest version: {version}"
        )));
    }
    if trailer != MANIFEST_MAGIC {
        return Err(StreamError::Format(format!(
            "invalid manifest trailer: expected {MANIFEST_MAGIC:#010x}, got {trailer:#010x}"
        )));
    }

    let mut entries = Vec::with_capacity(raw_entries.len());
    for (header_offset, file_size, kind_raw, path) in raw_entries {
        let kind = EntryKind::from_wire(kind_raw).ok_or_else(|| {
            StreamError::Format(format!("unknown file type in manifest: {kind_raw}"))
        })?;
        let rel_path = String::from_utf8(path)
            .map_err(|_| StreamError::Format("non-UTF-8 path in manifest".into()))?;
        entries.push(ManifestEntry {
            header_offset,
            file_size,
            kind,
            rel_path,
        });
    }
    Ok(entries)
}

// Folds every byte it passes through into a running CRC32.
struct CrcReader<'a, R: Read> {
    inner: &'a mut R,
    hasher: crc32fast::Hasher,
}

impl<'a, R: Read> CrcReader<'a, R> {
    fn new(inner: &'a mut R) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
        }
    }

    fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

impl<R: Read> Read for CrcReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}
