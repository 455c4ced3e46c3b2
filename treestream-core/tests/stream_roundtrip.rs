use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use rand::{rngs::StdRng, Rng, SeedableRng};
use treestream_core::decode::Decoder;
use treestream_core::encode::Encoder;
use treestream_core::frame::{CHUNK_MAGIC, HEADER_MAGIC, MANIFEST_MAGIC};
use treestream_core::manifest::read_manifest;
use treestream_core::walker::build_file_list;
use treestream_core::EntryKind;

fn build_tree(root: &Path) {
    fs::create_dir_all(root.join("sub/inner")).unwrap();
    fs::create_dir(root.join("empty")).unwrap();
    fs::write(root.join("a.txt"), b"hello treestream").unwrap();
    fs::write(root.join("empty.bin"), b"").unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let mut big = vec![0u8; 10_000];
    rng.fill(&mut big[..]);
    fs::write(root.join("sub/big.bin"), &big).unwrap();
    fs::write(root.join("sub/inner/note.txt"), b"deep").unwrap();
    #[cfg(unix)]
    std::os::unix::fs::symlink("a.txt", root.join("link")).unwrap();
}

fn encode_tree(root: &Path, chunk_size: usize) -> Vec<u8> {
    let entries = build_file_list(root, &[]).unwrap();
    let mut out = Vec::new();
    Encoder::new(root, chunk_size)
        .encode_to_writer(&entries, &mut out)
        .unwrap();
    out
}

fn assert_same_tree(src: &Path, dst: &Path) {
    let a = build_file_list(src, &[]).unwrap();
    let b = build_file_list(dst, &[]).unwrap();
    assert_eq!(a, b, "relative path sets differ");
    for rel in &a {
        let sp = src.join(rel);
        let dp = dst.join(rel);
        let sm = fs::symlink_metadata(&sp).unwrap();
        let dm = fs::symlink_metadata(&dp).unwrap();
        assert_eq!(sm.file_type().is_dir(), dm.file_type().is_dir(), "{rel:?}");
        assert_eq!(
            sm.file_type().is_symlink(),
            dm.file_type().is_symlink(),
            "{rel:?}"
        );
        if sm.file_type().is_file() {
            assert_eq!(fs::read(&sp).unwrap(), fs::read(&dp).unwrap(), "{rel:?}");
        }
        if sm.file_type().is_symlink() {
            assert_eq!(
                fs::read_link(&sp).unwrap(),
                fs::read_link(&dp).unwrap(),
                "{rel:?}"
            );
        }
    }
}

#[test]
fn roundtrip_restores_structure_and_content() {
    let td = tempfile::tempdir().unwrap();
    let src = td.path().join("src");
    let dst = td.path().join("dst");
    fs::create_dir(&src).unwrap();
    build_tree(&src);

    let stream = encode_tree(&src, 1024);
    let report = Decoder::new(&dst, false, 1024)
        .decode_seekable(Cursor::new(&stream))
        .unwrap();

    assert_same_tree(&src, &dst);
    assert_eq!(report.files, 4);
    assert_eq!(report.dirs, 3);
    #[cfg(unix)]
    assert_eq!(report.symlinks, 1);
    assert_eq!(report.skipped, 0);
    assert!(report.manifest_entries.is_some());
}

#[test]
fn stream_shape_single_file_and_empty_dir() {
    let td = tempfile::tempdir().unwrap();
    let src = td.path().join("src");
    fs::create_dir(&src).unwrap();
    fs::write(src.join("a.txt"), b"abc").unwrap();
    fs::create_dir(src.join("d")).unwrap();

    let entries = build_file_list(&src, &[]).unwrap();
    assert_eq!(entries, vec![PathBuf::from("a.txt"), PathBuf::from("d")]);

    let stream = encode_tree(&src, 4096);

    // header(a.txt) at 0, one 3-byte chunk at 512, header(d) at 527,
    // manifest at 1039.
    let be32 = |at: usize| u32::from_be_bytes(stream[at..at + 4].try_into().unwrap());
    assert_eq!(be32(0), HEADER_MAGIC);
    assert_eq!(be32(512), CHUNK_MAGIC);
    assert_eq!(
        u64::from_be_bytes(stream[516..524].try_into().unwrap()),
        3
    );
    assert_eq!(&stream[524..527], b"abc");
    assert_eq!(be32(527), HEADER_MAGIC);
    assert_eq!(be32(1039), MANIFEST_MAGIC);

    let manifest = read_manifest(&mut Cursor::new(&stream[1039..])).unwrap();
    assert_eq!(manifest.len(), 2);
    assert_eq!(manifest[0].header_offset, 0);
    assert_eq!(manifest[0].file_size, 3);
    assert_eq!(manifest[0].kind, EntryKind::Regular);
    assert_eq!(manifest[0].rel_path, "a.txt");
    assert_eq!(manifest[1].header_offset, 527);
    assert_eq!(manifest[1].kind, EntryKind::Directory);
}

#[test]
fn empty_entry_list_encodes_manifest_only() {
    let td = tempfile::tempdir().unwrap();
    let src = td.path().join("src");
    fs::create_dir(&src).unwrap();

    let mut stream = Vec::new();
    Encoder::new(&src, 4096)
        .encode_to_writer(&[], &mut stream)
        .unwrap();
    assert_eq!(stream.len(), 24);

    let dst = td.path().join("dst");
    let report = Decoder::new(&dst, false, 4096)
        .decode_seekable(Cursor::new(&stream))
        .unwrap();
    assert_eq!(report.manifest_entries, Some(0));
    assert_eq!(report.files + report.dirs + report.symlinks, 0);
}

#[test]
fn encode_is_deterministic() {
    let td = tempfile::tempdir().unwrap();
    let src = td.path().join("src");
    fs::create_dir(&src).unwrap();
    build_tree(&src);

    let first = encode_tree(&src, 1024);
    let second = encode_tree(&src, 1024);
    assert_eq!(first, second);
}

#[test]
fn double_decode_is_idempotent() {
    let td = tempfile::tempdir().unwrap();
    let src = td.path().join("src");
    let dst = td.path().join("dst");
    fs::create_dir(&src).unwrap();
    build_tree(&src);

    let stream = encode_tree(&src, 1024);
    let dec = Decoder::new(&dst, false, 1024);
    dec.decode_seekable(Cursor::new(&stream)).unwrap();
    dec.decode_seekable(Cursor::new(&stream)).unwrap();
    assert_same_tree(&src, &dst);
}

#[test]
fn pipe_stream_matches_writer_stream() {
    let td = tempfile::tempdir().unwrap();
    let src = td.path().join("src");
    fs::create_dir(&src).unwrap();
    build_tree(&src);

    let entries = build_file_list(&src, &[]).unwrap();
    let mut direct = Vec::new();
    Encoder::new(&src, 1024)
        .encode_to_writer(&entries, &mut direct)
        .unwrap();

    let mut piped = Vec::new();
    Encoder::new(&src, 1024)
        .encode(entries)
        .read_to_end(&mut piped)
        .unwrap();
    assert_eq!(direct, piped);
}

#[test]
fn decode_straight_from_pipe() {
    let td = tempfile::tempdir().unwrap();
    let src = td.path().join("src");
    let dst = td.path().join("dst");
    fs::create_dir(&src).unwrap();
    build_tree(&src);

    let entries = build_file_list(&src, &[]).unwrap();
    let reader = Encoder::new(&src, 1024).encode(entries);
    Decoder::new(&dst, false, 1024).decode(reader).unwrap();
    assert_same_tree(&src, &dst);
}

#[test]
fn producer_error_surfaces_on_reader() {
    let td = tempfile::tempdir().unwrap();
    let src = td.path().join("src");
    fs::create_dir(&src).unwrap();

    let mut reader = Encoder::new(&src, 1024).encode(vec![PathBuf::from("missing.txt")]);
    let mut sink = Vec::new();
    let err = reader.read_to_end(&mut sink).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::Other);
}

#[cfg(unix)]
#[test]
fn executable_bit_survives_roundtrip() {
    use std::os::unix::fs::PermissionsExt;

    let td = tempfile::tempdir().unwrap();
    let src = td.path().join("src");
    let dst = td.path().join("dst");
    fs::create_dir(&src).unwrap();
    let script = src.join("run.sh");
    fs::write(&script, b"#!/bin/sh\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let stream = encode_tree(&src, 1024);
    Decoder::new(&dst, false, 1024)
        .decode_seekable(Cursor::new(&stream))
        .unwrap();
    let mode = fs::symlink_metadata(dst.join("run.sh"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o755);
}
