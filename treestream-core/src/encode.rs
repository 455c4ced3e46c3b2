use std::fs::{self, File, Metadata};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::chunk::write_chunk;
use crate::error::{Result, StreamError};
use crate::frame::{EntryKind, DEFAULT_CHUNK_SIZE, HEADER_VERSION};
use crate::header::{write_header, FileHeader};
use crate::manifest::{write_manifest, ManifestEntry};
use crate::pipe::{pipe, PipeReader};

// Segments the producer may buffer in the pipe before blocking.
const PIPE_CAPACITY: usize = 64;
const WRITE_BUF_SIZE: usize = 64 * 1024;

#[derive(Debug, Default, Clone)]
pub struct EncodeReport {
    pub files: u64,
    pub dirs: u64,
    pub symlinks: u64,
    pub skipped: u64,
    pub payload_bytes: u64,
}

/// Streams a filesystem subtree as a sequence of header/chunk records
/// followed by a trailing manifest. Entries are emitted in the order
/// supplied; callers wanting deterministic output sort the list first.
pub struct Encoder {
    root: PathBuf,
    chunk_size: usize,
}

impl Encoder {
    pub fn new(root: impl Into<PathBuf>, chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            root: root.into(),
            chunk_size,
        }
    }

    /// Encode lazily: a background thread produces the stream into a
    /// bounded pipe and the returned reader consumes it. A producer error
    /// closes the pipe with that error, so it surfaces on the consumer's
    /// next read.
    pub fn encode(self, entries: Vec<PathBuf>) -> PipeReader {
        let (writer, reader) = pipe(PIPE_CAPACITY);
        std::thread::spawn(move || {
            let mut writer = writer;
            match self.encode_to_writer(&entries, &mut writer) {
                Ok(report) => {
                    log::debug!(
                        "stream complete: {} files, {} dirs, {} symlinks",
                        report.files,
                        report.dirs,
                        report.symlinks
                    );
                }
                Err(e) => {
                    log::error!("encode failed: {e}");
                    writer.close_with_error(io::Error::new(io::ErrorKind::Other, e));
                }
            }
        });
        reader
    }

    /// The synchronous core: encode every entry into `sink` and append the
    /// manifest. Offsets are taken from a counting layer underneath the
    /// write buffer, flushed before each header so they are exact.
    pub fn encode_to_writer<W: Write>(
        &self,
        entries: &[PathBuf],
        sink: &mut W,
    ) -> Result<EncodeReport> {
        let mut out = BufWriter::with_capacity(WRITE_BUF_SIZE, CountingWriter::new(sink));
        let mut manifest: Vec<ManifestEntry> = Vec::with_capacity(entries.len());
        let mut report = EncodeReport::default();
        let mut buf = vec![0u8; self.chunk_size];

        for rel in entries {
            let header = match self.build_header(rel)? {
                Some(h) => h,
                None => {
                    report.skipped += 1;
                    continue;
                }
            };

            out.flush()
                .map_err(|e| StreamError::io("flush stream", e))?;
            let header_offset = out.get_ref().bytes_written();

            write_header(&mut out, &header)?;
            match header.kind {
                EntryKind::Regular => {
                    let path = self.root.join(rel);
                    report.payload_bytes +=
                        stream_file(&path, header.file_size, &mut buf, &mut out)?;
                    report.files += 1;
                    log::debug!("encoded file {} ({} bytes)", header.rel_path, header.file_size);
                }
                EntryKind::Directory => {
                    report.dirs += 1;
                    log::debug!("encoded directory {}", header.rel_path);
                }
                EntryKind::Symlink => {
                    report.symlinks += 1;
                    log::debug!(
                        "encoded symlink {} -> {}",
                        header.rel_path,
                        header.link_target
                    );
                }
            }

            manifest.push(ManifestEntry {
                header_offset,
                file_size: header.file_size,
                kind: header.kind,
                rel_path: header.rel_path,
            });
        }

        out.flush()
            .map_err(|e| StreamError::io("flush stream", e))?;
        write_manifest(&mut out, &manifest)?;
        out.flush()
            .map_err(|e| StreamError::io("flush stream", e))?;
        Ok(report)
    }

    // Stat one entry without following symlinks and build its header.
    // Returns None for anything that is not a file, directory, or symlink.
    fn build_header(&self, rel: &Path) -> Result<Option<FileHeader>> {
        let path = self.root.join(rel);
        let md = fs::symlink_metadata(&path)
            .map_err(|e| StreamError::io(format!("stat {}", path.display()), e))?;
        let ft = md.file_type();

        let kind = if ft.is_dir() {
            EntryKind::Directory
        } else if ft.is_symlink() {
            EntryKind::Symlink
        } else if ft.is_file() {
            EntryKind::Regular
        } else {
            log::debug!("skipping special entry {}", path.display());
            return Ok(None);
        };

        let rel_str = rel
            .to_str()
            .ok_or_else(|| {
                StreamError::Format(format!("non-UTF-8 path: {}", path.display()))
            })?
            .replace('\\', "/");

        let link_target = if kind == EntryKind::Symlink {
            let target = fs::read_link(&path)
                .map_err(|e| StreamError::io(format!("readlink {}", path.display()), e))?;
            target
                .to_str()
                .ok_or_else(|| {
                    StreamError::Format(format!("non-UTF-8 symlink target: {}", path.display()))
                })?
                .to_owned()
        } else {
            String::new()
        };

        Ok(Some(FileHeader {
            version: HEADER_VERSION,
            rel_path: rel_str,
            file_size: if kind == EntryKind::Regular { md.len() } else { 0 },
            file_mode: file_mode(&md),
            mod_time: mod_time_secs(&md),
            kind,
            link_target,
        }))
    }
}

// Stream a regular file as chunks, one per non-empty read, capped so the
// byte total matches the size already written to the header. A file that
// shrinks underneath us is an error; a file that grew is cut at the
// declared size.
fn stream_file<W: Write>(
    path: &Path,
    declared_size: u64,
    buf: &mut [u8],
    out: &mut W,
) -> Result<u64> {
    let mut file =
        File::open(path).map_err(|e| StreamError::io(format!("open {}", path.display()), e))?;
    let mut remaining = declared_size;
    while remaining > 0 {
        let want = (buf.len() as u64).min(remaining) as usize;
        let n = file
            .read(&mut buf[..want])
            .map_err(|e| StreamError::io(format!("read {}", path.display()), e))?;
        if n == 0 {
            return Err(StreamError::io(
                format!("read {}", path.display()),
                io::Error::new(io::ErrorKind::UnexpectedEof, "file shrank while encoding"),
            ));
        }
        write_chunk(out, &buf[..n])?;
        remaining -= n as u64;
    }
    Ok(declared_size)
}

fn file_mode(md: &Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        md.permissions().mode()
    }
    #[cfg(not(unix))]
    {
        if md.permissions().readonly() {
            0o444
        } else {
            0o644
        }
    }
}

fn mod_time_secs(md: &Metadata) -> i64 {
    let Ok(mtime) = md.modified() else { return 0 };
    match mtime.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

// Counts bytes on their way to the sink. Sits below the write buffer so a
// flush makes the count equal to what the consumer has been offered.
struct CountingWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
