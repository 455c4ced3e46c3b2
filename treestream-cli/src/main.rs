use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use treestream_core::chunk::read_chunk_header;
use treestream_core::decode::Decoder;
use treestream_core::encode::Encoder;
use treestream_core::frame::{EntryKind, DEFAULT_CHUNK_SIZE, MANIFEST_MAGIC};
use treestream_core::header::read_header;
use treestream_core::manifest::read_manifest;
use treestream_core::walker::build_file_list;

#[derive(Parser)]
#[command(
    name = "treestream",
    version,
    about = "Stream directory trees as a single chunked, checksummed byte stream"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Encode a directory tree into a stream file
    Encode {
        #[arg(long)]
        source: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
        /// Skip entries whose relative path contains this substring (repeatable)
        #[arg(long)]
        exclude: Vec<String>,
    },
    /// Decode a stream file into a directory
    Decode {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        dest: PathBuf,
        /// Abort on the first error instead of recovering
        #[arg(long, default_value_t = false)]
        strict: bool,
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },
    /// List the records of a stream file without extracting anything
    List {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Encode {
            source,
            output,
            chunk_size,
            exclude,
        } => encode(&source, &output, chunk_size, &exclude),
        Cmd::Decode {
            input,
            dest,
            strict,
            chunk_size,
        } => decode(&input, &dest, strict, chunk_size),
        Cmd::List { input, chunk_size } => list(&input, chunk_size),
    }
}

fn encode(source: &Path, output: &Path, chunk_size: usize, exclude: &[String]) -> Result<()> {
    let entries = build_file_list(source, exclude)
        .with_context(|| format!("walk {}", source.display()))?;
    let encoder = Encoder::new(source, chunk_size);

    if output.as_os_str() == "-" {
        let mut reader = encoder.encode(entries);
        let n = std::io::copy(&mut reader, &mut std::io::stdout().lock())
            .context("stream to stdout")?;
        log::info!("streamed {n} bytes");
        return Ok(());
    }

    let mut out = BufWriter::new(
        File::create(output).with_context(|| format!("create {}", output.display()))?,
    );
    let report = encoder.encode_to_writer(&entries, &mut out)?;
    out.flush().context("flush output")?;

    println!(
        "encoded {} files, {} dirs, {} symlinks ({} bytes of file data)",
        report.files, report.dirs, report.symlinks, report.payload_bytes
    );
    if report.skipped > 0 {
        println!("skipped {} special entries", report.skipped);
    }
    Ok(())
}

fn decode(input: &Path, dest: &Path, strict: bool, chunk_size: usize) -> Result<()> {
    let file = File::open(input).with_context(|| format!("open {}", input.display()))?;
    let decoder = Decoder::new(dest, strict, chunk_size);
    let report = decoder.decode_seekable(file)?;

    println!(
        "decoded {} files, {} dirs, {} symlinks",
        report.files, report.dirs, report.symlinks
    );
    if report.recoveries > 0 {
        println!(
            "recovered from {} damaged chunk runs ({} records lost)",
            report.recoveries, report.skipped
        );
    } else if report.skipped > 0 {
        println!("skipped {} records", report.skipped);
    }
    Ok(())
}

fn list(input: &Path, chunk_size: usize) -> Result<()> {
    let mut f = File::open(input).with_context(|| format!("open {}", input.display()))?;
    loop {
        let mut magic = [0u8; 4];
        match f.read_exact(&mut magic) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e).context("read stream"),
        }
        f.seek(SeekFrom::Current(-4)).context("seek stream")?;

        if u32::from_be_bytes(magic) == MANIFEST_MAGIC {
            let entries = read_manifest(&mut f)?;
            println!("manifest: {} entries", entries.len());
            break;
        }

        let header = read_header(&mut f)?;
        match header.kind {
            EntryKind::Regular => {
                println!("file     {:>12}  {}", header.file_size, header.rel_path);
                let mut total: u64 = 0;
                while total < header.file_size {
                    let len = read_chunk_header(&mut f, chunk_size)?;
                    f.seek(SeekFrom::Current(len as i64)).context("seek stream")?;
                    total += len;
                }
            }
            EntryKind::Directory => println!("dir      {:>12}  {}", "-", header.rel_path),
            EntryKind::Symlink => println!(
                "symlink  {:>12}  {} -> {}",
                "-", header.rel_path, header.link_target
            ),
        }
    }
    Ok(())
}
