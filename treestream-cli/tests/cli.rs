use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;

#[test]
fn encode_then_decode_roundtrip() {
    let td = tempfile::tempdir().unwrap();
    let src = td.path().join("src");
    fs::create_dir_all(src.join("sub")).unwrap();
    fs::write(src.join("a.txt"), b"hello from the cli").unwrap();
    fs::write(src.join("sub/b.bin"), vec![0x42u8; 20_000]).unwrap();

    let stream = td.path().join("tree.stream");
    let mut cmd = Command::cargo_bin("treestream").unwrap();
    cmd.args([
        "encode",
        "--source",
        src.to_str().unwrap(),
        "--output",
        stream.to_str().unwrap(),
    ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("encoded 2 files"));

    let dst = td.path().join("dst");
    let mut cmd = Command::cargo_bin("treestream").unwrap();
    cmd.args([
        "decode",
        "--input",
        stream.to_str().unwrap(),
        "--dest",
        dst.to_str().unwrap(),
    ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("decoded 2 files"));

    assert_eq!(fs::read(dst.join("a.txt")).unwrap(), b"hello from the cli");
    assert_eq!(fs::read(dst.join("sub/b.bin")).unwrap(), vec![0x42u8; 20_000]);
}

#[test]
fn exclude_flag_prunes_entries() {
    let td = tempfile::tempdir().unwrap();
    let src = td.path().join("src");
    fs::create_dir_all(src.join(".git")).unwrap();
    fs::write(src.join(".git/config"), b"ignored").unwrap();
    fs::write(src.join("kept.txt"), b"kept").unwrap();

    let stream = td.path().join("tree.stream");
    Command::cargo_bin("treestream")
        .unwrap()
        .args([
            "encode",
            "--source",
            src.to_str().unwrap(),
            "--output",
            stream.to_str().unwrap(),
            "--exclude",
            ".git",
        ])
        .assert()
        .success();

    let dst = td.path().join("dst");
    Command::cargo_bin("treestream")
        .unwrap()
        .args([
            "decode",
            "--input",
            stream.to_str().unwrap(),
            "--dest",
            dst.to_str().unwrap(),
        ])
        .assert()
        .success();

    assert!(dst.join("kept.txt").exists());
    assert!(!dst.join(".git").exists());
}

#[test]
fn strict_decode_fails_on_garbage_input() {
    let td = tempfile::tempdir().unwrap();
    let garbage = td.path().join("garbage.stream");
    fs::write(&garbage, vec![0u8; 600]).unwrap();

    let dst = td.path().join("dst");
    Command::cargo_bin("treestream")
        .unwrap()
        .args([
            "decode",
            "--input",
            garbage.to_str().unwrap(),
            "--dest",
            dst.to_str().unwrap(),
            "--strict",
        ])
        .assert()
        .failure();
}

#[test]
fn list_prints_one_line_per_record() {
    let td = tempfile::tempdir().unwrap();
    let src = td.path().join("src");
    fs::create_dir_all(src.join("d")).unwrap();
    fs::write(src.join("a.txt"), b"abc").unwrap();

    let stream = td.path().join("tree.stream");
    Command::cargo_bin("treestream")
        .unwrap()
        .args([
            "encode",
            "--source",
            src.to_str().unwrap(),
            "--output",
            stream.to_str().unwrap(),
        ])
        .assert()
        .success();

    Command::cargo_bin("treestream")
        .unwrap()
        .args(["list", "--input", stream.to_str().unwrap()])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("a.txt")
                .and(predicate::str::contains("manifest: 2 entries")),
        );
}
