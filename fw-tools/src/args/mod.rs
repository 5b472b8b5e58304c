// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use {clap::Parser, fw_tools::updater::DEFAULT_FRAME_SIZE, std::path::PathBuf};

mod cli;
mod config;

pub use config::Error as ConfigError;

const DEFAULT_PORT: &str = "/dev/ttyUSB0";
const DEFAULT_BAUDRATE: u32 = 115_200;

/// Program arguments loaded from the CLI and config file.
#[derive(Debug, Clone)]
pub enum Args {
    /// Generate key material.
    Keygen { out_dir: PathBuf },
    /// Encrypt and sign a firmware binary.
    Protect {
        secrets: PathBuf,
        input: PathBuf,
        output: PathBuf,
        version: u16,
        message: String,
    },
    /// Send a protected firmware over a serial port.
    Update {
        input: PathBuf,
        port: String,
        baudrate: u32,
        frame_size: usize,
        boot: bool,
    },
    /// Print a protected firmware.
    Inspect { input: PathBuf, secrets: Option<PathBuf> },
}

pub fn args<I, T>(args: I) -> Result<Args, Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = cli::Args::try_parse_from(args).map_err(Error::Cli)?;
    match cli.command {
        cli::Command::Keygen { out_dir } => Ok(Args::Keygen { out_dir }),
        cli::Command::Protect {
            secrets,
            config,
            input,
            output,
            firmware_version,
            message,
        } => {
            let config = load(config)?;
            let secrets = pick(secrets, config_secrets(&config)?, Error::SecretsInConfigAndCli)?
                .ok_or(Error::SecretsMissing)?;
            Ok(Args::Protect {
                secrets,
                input,
                output,
                version: firmware_version,
                message,
            })
        }
        cli::Command::Update {
            config,
            input,
            port,
            baudrate,
            frame_size,
            boot,
        } => {
            let config = load(config)?;
            let port = pick(port, config.port, Error::PortInConfigAndCli)?;
            let baudrate = pick(baudrate, config.baudrate, Error::BaudrateInConfigAndCli)?;
            let frame_size = pick(frame_size, config.frame_size, Error::FrameSizeInConfigAndCli)?;
            Ok(Args::Update {
                input,
                port: port.unwrap_or_else(|| DEFAULT_PORT.to_owned()),
                baudrate: baudrate.unwrap_or(DEFAULT_BAUDRATE),
                frame_size: frame_size.unwrap_or(DEFAULT_FRAME_SIZE),
                boot,
            })
        }
        cli::Command::Inspect { input, secrets, config } => {
            let config = load(config)?;
            let secrets = pick(secrets, config_secrets(&config)?, Error::SecretsInConfigAndCli)?;
            Ok(Args::Inspect { input, secrets })
        }
    }
}

fn load(path: Option<PathBuf>) -> Result<config::Config, Error> {
    Ok(path.map(|c| config::Config::load(&c)).transpose()?.unwrap_or_default())
}

fn config_secrets(config: &config::Config) -> Result<Option<PathBuf>, Error> {
    config
        .secrets
        .as_ref()
        .map(|secrets| {
            if !secrets.is_absolute() {
                return Err(Error::SecretsPathNotAbsoluteInConfig(secrets.clone()));
            }
            Ok(secrets.clone())
        })
        .transpose()
}

/// Reconcile a CLI and a config value. Specifying both is an error.
fn pick<T>(cli: Option<T>, config: Option<T>, both: Error) -> Result<Option<T>, Error> {
    match (cli, config) {
        (Some(_), Some(_)) => Err(both),
        (cli, config) => Ok(cli.or(config)),
    }
}

#[derive(Debug)]
pub enum Error {
    BaudrateInConfigAndCli,
    Cli(clap::Error),
    Config(ConfigError),
    FrameSizeInConfigAndCli,
    PortInConfigAndCli,
    SecretsInConfigAndCli,
    SecretsMissing,
    SecretsPathNotAbsoluteInConfig(PathBuf),
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::BaudrateInConfigAndCli => write!(f, "baudrate specified in both config and cli"),
            Error::Cli(e) => write!(f, "{}", e.render().ansi()),
            Error::Config(e) => write!(f, "config error: {e}"),
            Error::FrameSizeInConfigAndCli => write!(f, "frame size specified in both config and cli"),
            Error::PortInConfigAndCli => write!(f, "port specified in both config and cli"),
            Error::SecretsInConfigAndCli => write!(f, "secrets specified in both config and cli"),
            Error::SecretsMissing => write!(
                f,
                "secrets file must be specified, either with --secrets or in the config file"
            ),
            Error::SecretsPathNotAbsoluteInConfig(path) => write!(
                f,
                r#"config error: secrets path is not absolute: "{}""#,
                path.to_str().unwrap_or("<invalid path>")
            ),
        }
    }
}

impl std::error::Error for Error {}
