// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use {
    crate::ExitCode,
    fw_tools::{secrets, Envelope, Secrets},
    std::{io::Write, path::Path},
};

/// Generate keys, protect a firmware with them and inspect the result.
#[test]
fn keygen_protect_inspect() {
    let dir = tempfile::tempdir().unwrap();
    let keys_dir = dir.path().join("keys");
    let output = test(["keygen", "--out-dir", path(&keys_dir)]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains(secrets::DEVICE_KEYS_FILE));
    let secrets_path = keys_dir.join(secrets::SECRETS_FILE);

    let firmware = create_file(&[0x42; 3000]);
    let protected = dir.path().join("fw.prot");
    let output = test([
        "protect",
        "--secrets",
        path(&secrets_path),
        "-i",
        path(firmware.path()),
        "-o",
        path(&protected),
        "--firmware-version",
        "7",
        "-m",
        "Seventh release",
    ]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("version 7"));
    assert!(output.stderr.is_empty());

    let envelope = Envelope::parse(&std::fs::read(&protected).unwrap()).unwrap();
    assert_eq!(envelope.header.version, 7);
    assert_eq!(envelope.header.size, 3000);
    // 3000 + 15 + NUL, padded
    assert_eq!(envelope.header.encrypted_size, 3024);

    let output = test(["inspect", "-i", path(&protected), "--secrets", path(&secrets_path)]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("3024"));
    assert!(output.stdout.contains(&hex::encode(envelope.iv)));
    assert!(output.stdout.contains("authentic"));

    // Keys are never overwritten
    let output = test(["keygen", "--out-dir", path(&keys_dir)]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("refusing to overwrite"));
}

/// An envelope signed with other keys does not verify.
#[test]
fn inspect_with_other_keys_reports_forged() {
    let dir = tempfile::tempdir().unwrap();
    let mine = dir.path().join("mine");
    let theirs = dir.path().join("theirs");
    for keys in [&mine, &theirs] {
        std::fs::create_dir(keys).unwrap();
        Secrets::generate(&mut rand::thread_rng()).unwrap().write(keys).unwrap();
    }
    let secrets = Secrets::load(&theirs.join(secrets::SECRETS_FILE)).unwrap();
    let envelope = Envelope::protect(&secrets, 1, b"firmware", "", &mut rand::thread_rng()).unwrap();
    let file = create_file(&envelope.to_bytes());

    let mine = mine.join(secrets::SECRETS_FILE);
    let output = test(["inspect", "-i", path(file.path()), "--secrets", path(&mine)]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("forged"));
}

#[test]
fn protect_without_secrets() {
    let firmware = create_file(b"firmware");
    let output = test([
        "protect",
        "-i",
        path(firmware.path()),
        "-o",
        "/nonexistent/out",
        "--firmware-version",
        "1",
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("secrets file must be specified"));
}

#[test]
fn relative_secrets_path_in_config() {
    let config = create_file(b"secrets = \"keys/secrets.toml\"\n");
    let firmware = create_file(b"firmware");
    let output = test([
        "protect",
        "-c",
        path(config.path()),
        "-i",
        path(firmware.path()),
        "-o",
        "/nonexistent/out",
        "--firmware-version",
        "1",
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("secrets path is not absolute"));
}

#[test]
fn port_in_config_and_cli() {
    let config = create_file(b"port = \"/dev/ttyACM0\"\nframe_size = 64\n");
    let envelope = create_file(b"");
    let output = test([
        "update",
        "-c",
        path(config.path()),
        "-i",
        path(envelope.path()),
        "--port",
        "/dev/ttyUSB1",
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("port specified in both config and cli"));
}

#[test]
fn unknown_config_field() {
    let config = create_file(b"baud = 9600\n");
    let envelope = create_file(b"");
    let output = test(["update", "-c", path(config.path()), "-i", path(envelope.path())]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("config file format error"));
}

#[test]
fn truncated_envelope() {
    let envelope = create_file(&[0; 100]);
    let output = test(["inspect", "-i", path(envelope.path())]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("truncated"));
}

fn test<const N: usize>(args: [&str; N]) -> Output {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit_code = crate::main_args(std::iter::once("fw-tools").chain(args), &mut stdout, &mut stderr);
    println!("* args: {:?}", args);
    println!("* exit_code: {:?}", exit_code);
    println!("* stdout:\n{}", String::from_utf8_lossy(&stdout));
    println!("* stderr:\n{}", String::from_utf8_lossy(&stderr));
    Output {
        exit_code,
        stdout: String::from_utf8(stdout).unwrap(),
        stderr: String::from_utf8(stderr).unwrap(),
    }
}

#[derive(Debug)]
struct Output {
    exit_code: ExitCode,
    stdout: String,
    stderr: String,
}

fn create_file(data: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file
}

fn path(path: &Path) -> &str {
    path.to_str().unwrap()
}
