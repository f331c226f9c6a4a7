//! shoutout CLI entry point.

use std::io::{self, Read};
use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use shoutlink_client::cli::{Cli, Command, ConfigAction};
use shoutlink_client::config::FileConfig;
use shoutlink_client::{Shout, ShoutResult, TransportError};
use shoutlink_core::{TracingConfig, init_tracing};

/// Bytes read from stdin per send.
const CHUNK_SIZE: usize = 4096;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::default()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> ShoutResult<()> {
    let file = match cli.config {
        Some(ref path) => FileConfig::load_from(path)?,
        None => FileConfig::load()?,
    };

    match cli.command {
        Some(Command::Config { ref action }) => match action {
            ConfigAction::Dump => {
                println!("# {}", FileConfig::default_path().display());
                println!("{}", file.to_toml()?);
                Ok(())
            }
            ConfigAction::Validate => {
                cli.stream_config(&file)?.validate()?;
                println!("Configuration is valid.");
                Ok(())
            }
            ConfigAction::Path => {
                println!("config: {}", FileConfig::default_path().display());
                Ok(())
            }
        },
        None => stream_stdin(cli.stream_config(&file)?),
    }
}

fn stream_stdin(config: shoutlink_core::StreamConfig) -> ShoutResult<()> {
    let mut shout = Shout::new(config);
    shout.open()?;
    info!(
        host = %shout.config().host,
        mount = %shout.config().mount,
        "streaming standard input"
    );

    let mut stdin = io::stdin().lock();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match stdin.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransportError::Io(e).into()),
        };
        shout.send(&buf[..n])?;
        total += n as u64;
        shout.sync();
    }

    info!(bytes = total, "end of input");
    shout.close();
    Ok(())
}
