// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use {
    bootloader::Verification,
    colored::Colorize,
    fw_tools::{envelope, secrets, updater, Envelope, Secrets, Updater},
    std::{
        ffi::OsString,
        io::Write,
        path::{Path, PathBuf},
    },
    tokio_serial::SerialPortBuilderExt,
};

mod args;

#[cfg(test)]
mod tests;

fn main() -> std::process::ExitCode {
    let _ = pretty_env_logger::try_init();
    main_args(std::env::args_os(), &mut std::io::stdout(), &mut std::io::stderr()).into()
}

fn main_args<I, T>(args: I, stdout: impl Write, mut stderr: impl Write) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match run(args, stdout) {
        Ok(()) => ExitCode(0),
        Err(Error::Args(e @ args::Error::Cli(_))) => {
            // Clap already does the "error: {}" formatting.
            writeln!(stderr, "{e}").expect("write error to stderr");
            ExitCode(1)
        }
        Err(e) => {
            writeln!(stderr, "{} {e}", "error:".bold().red()).expect("write error to stderr");
            ExitCode(1)
        }
    }
}

fn run<I, T>(args: I, mut stdout: impl Write) -> Result<(), Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match args::args(args)? {
        args::Args::Keygen { out_dir } => {
            std::fs::create_dir_all(&out_dir).map_err(Error::CreateDir)?;
            let secrets = Secrets::generate(&mut rand::thread_rng())?;
            secrets.write(&out_dir)?;
            for name in [secrets::SECRETS_FILE, secrets::SIGNING_KEY_FILE, secrets::DEVICE_KEYS_FILE] {
                writeln!(&mut stdout, "{:8} {}", "wrote".bold(), out_dir.join(name).display())
                    .map_err(Error::Stdout)?;
            }
        }
        args::Args::Protect {
            secrets,
            input,
            output,
            version,
            message,
        } => {
            let secrets = Secrets::load(&secrets)?;
            let firmware = std::fs::read(&input).map_err(Error::ReadInputFile)?;
            let envelope = Envelope::protect(&secrets, version, &firmware, &message, &mut rand::thread_rng())?;
            std::fs::write(&output, envelope.to_bytes()).map_err(Error::WriteOutputFile)?;

            // Sanity check that what was written reads back and verifies.
            let written = std::fs::read(&output).map_err(Error::ReadOutputFile)?;
            let parsed = Envelope::parse(&written).map_err(Error::ParseOutputFile)?;
            if parsed.verify(&secrets.device_keys()?) != Verification::Authentic {
                return Err(Error::OutputNotAuthentic(output));
            }
            writeln!(
                &mut stdout,
                "{:10} {} ({} bytes, version {})",
                "protected".bold(),
                output.display(),
                written.len(),
                version
            )
            .map_err(Error::Stdout)?;
        }
        args::Args::Update {
            input,
            port,
            baudrate,
            frame_size,
            boot,
        } => {
            let envelope = read_envelope(&input)?;
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(Error::Runtime)?;
            runtime.block_on(async {
                let serial = tokio_serial::new(&port, baudrate)
                    .open_native_async()
                    .map_err(|e| Error::OpenPort(port.clone(), e))?;
                let mut updater = Updater::new(serial).frame_size(frame_size)?;
                updater.update(&envelope).await?;
                writeln!(
                    &mut stdout,
                    "{:10} version {} ({} bytes)",
                    "installed".bold(),
                    envelope.header.version,
                    envelope.header.size
                )
                .map_err(Error::Stdout)?;
                if boot {
                    updater.boot().await?;
                    writeln!(&mut stdout, "{:10} firmware started", "booted".bold()).map_err(Error::Stdout)?;
                }
                Ok::<_, Error>(())
            })?;
        }
        args::Args::Inspect { input, secrets } => {
            let envelope = read_envelope(&input)?;
            let header = envelope.header;
            let version = if header.is_debug() {
                "0 (debug build)".to_owned()
            } else {
                header.version.to_string()
            };
            writeln!(&mut stdout, "{:10} {version}", "version".bold()).map_err(Error::Stdout)?;
            writeln!(&mut stdout, "{:10} {}", "size".bold(), header.size).map_err(Error::Stdout)?;
            writeln!(&mut stdout, "{:10} {}", "encrypted".bold(), header.encrypted_size).map_err(Error::Stdout)?;
            writeln!(&mut stdout, "{:10} {}", "iv".bold(), hex::encode(envelope.iv)).map_err(Error::Stdout)?;
            writeln!(
                &mut stdout,
                "{:10} {}...",
                "signature".bold(),
                hex::encode(&envelope.signature[..32])
            )
            .map_err(Error::Stdout)?;
            if let Some(secrets) = secrets {
                let keys = Secrets::load(&secrets)?.device_keys()?;
                let verdict = match envelope.verify(&keys) {
                    Verification::Authentic => "authentic".green(),
                    Verification::Forged => "forged".red(),
                    Verification::MalformedInput => "malformed".red(),
                };
                writeln!(&mut stdout, "{:10} {verdict}", "verified".bold()).map_err(Error::Stdout)?;
            }
        }
    }
    Ok(())
}

fn read_envelope(path: &Path) -> Result<Envelope, Error> {
    let bytes = std::fs::read(path).map_err(Error::ReadInputFile)?;
    Ok(Envelope::parse(&bytes)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ExitCode(u8);

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        code.0.into()
    }
}

#[derive(Debug)]
enum Error {
    Args(args::Error),
    CreateDir(std::io::Error),
    Envelope(envelope::Error),
    OpenPort(String, tokio_serial::Error),
    OutputNotAuthentic(PathBuf),
    ParseOutputFile(envelope::Error),
    ReadInputFile(std::io::Error),
    ReadOutputFile(std::io::Error),
    Runtime(std::io::Error),
    Secrets(secrets::Error),
    Stdout(std::io::Error),
    Update(updater::Error),
    WriteOutputFile(std::io::Error),
}

impl From<args::Error> for Error {
    fn from(e: args::Error) -> Self {
        Error::Args(e)
    }
}

impl From<envelope::Error> for Error {
    fn from(e: envelope::Error) -> Self {
        Error::Envelope(e)
    }
}

impl From<secrets::Error> for Error {
    fn from(e: secrets::Error) -> Self {
        Error::Secrets(e)
    }
}

impl From<updater::Error> for Error {
    fn from(e: updater::Error) -> Self {
        Error::Update(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Args(e) => write!(f, "{e}"),
            Error::CreateDir(e) => write!(f, "failed to create output directory: {e}"),
            Error::Envelope(e) => write!(f, "{e}"),
            Error::OpenPort(port, e) => write!(f, "failed to open {port}: {e}"),
            Error::OutputNotAuthentic(path) => write!(
                f,
                "{} does not verify after writing; is another process using it?",
                path.display()
            ),
            Error::ParseOutputFile(e) => write!(
                f,
                "failed to parse output file after writing: {e}; is another process using it?"
            ),
            Error::ReadInputFile(e) => write!(f, "failed to read input file: {e}"),
            Error::ReadOutputFile(e) => write!(f, "failed to read output file: {e}"),
            Error::Runtime(e) => write!(f, "failed to start the async runtime: {e}"),
            Error::Secrets(e) => write!(f, "{e}"),
            Error::Stdout(e) => write!(f, "failed to write to stdout: {e}"),
            Error::Update(e) => write!(f, "update failed: {e}"),
            Error::WriteOutputFile(e) => write!(f, "failed to write output file: {e}"),
        }
    }
}

impl std::error::Error for Error {}
