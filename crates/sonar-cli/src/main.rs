//! SONAR CLI
//!
//! Log in to an access point and fetch decrypted audio.

mod account;
mod config;
mod http;
mod progress;

use clap::{Parser, Subcommand};
use console::style;
use sonar_core::{Bitrate, Credentials, Engine, SessionHandle};
use sonar_transport::TcpConnector;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use account::StoredAccount;
use config::Config;
use http::ReqwestHttpClient;
use progress::{FetchProgress, format_bytes, format_duration_ms};

/// SONAR - access-point client for streaming audio
#[derive(Parser)]
#[command(name = "sonar")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with a password and store reusable credentials
    Login {
        /// Account name
        #[arg(required = true)]
        username: String,
    },

    /// Download a track's audio
    Fetch {
        /// Track URI or open link
        #[arg(required = true)]
        uri: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Byte offset to start from
        #[arg(long)]
        seek: Option<u64>,

        /// Preferred bitrate (96, 160, 320 or any)
        #[arg(long)]
        bitrate: Option<Bitrate>,
    },

    /// Show track information
    Info {
        /// Track URI or open link
        #[arg(required = true)]
        uri: String,
    },

    /// Forget stored credentials
    Logout,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    // Validate configuration
    config.validate()?;

    // Initialize logging
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Login { username } => login(&username, &config)?,
        Commands::Fetch {
            uri,
            output,
            seek,
            bitrate,
        } => fetch(&uri, output, seek, bitrate, &config)?,
        Commands::Info { uri } => show_info(&uri, &config)?,
        Commands::Logout => logout(&config)?,
    }

    Ok(())
}

/// Start an engine with the TCP connector and reqwest resolver client
fn start_engine(config: &Config) -> anyhow::Result<Engine> {
    let engine_config = config.engine_config()?;
    let http = ReqwestHttpClient::with_timeout(engine_config.resolver.request_timeout)?;
    let engine = Engine::start(
        engine_config,
        Arc::new(TcpConnector::default()),
        Arc::new(http),
    )?;
    Ok(engine)
}

/// Log in with the stored credentials
fn stored_session(engine: &Engine, config: &Config) -> anyhow::Result<SessionHandle> {
    let account = StoredAccount::load(&config.account.credentials_file)?;
    let stored = account.to_credentials()?;
    let session = engine.login(&stored.username, stored.to_credentials())?;
    info!(username = %stored.username, "Logged in with stored credentials");
    Ok(session)
}

/// Password login; keeps the reusable blob for later commands
fn login(username: &str, config: &Config) -> anyhow::Result<()> {
    let password = rpassword::prompt_password(format!("Password for {username}: "))?;

    let engine = start_engine(config)?;
    let result = (|| {
        let session = engine.login(username, Credentials::Password(password))?;
        let stored = engine.reusable_credentials(session)?;
        let country = engine.country(session)?;
        engine.logout(session)?;
        anyhow::Ok((stored, country))
    })();
    engine.shutdown();
    let (stored, country) = result?;

    let path = &config.account.credentials_file;
    StoredAccount::from_credentials(&stored).save(path)?;

    println!(
        "{} Logged in as {}",
        style("✓").green(),
        style(&stored.username).bold()
    );
    if let Some(country) = country {
        println!("  Country: {country}");
    }
    println!("  Credentials saved to {}", path.display());
    Ok(())
}

/// Fetch a track to a file or stdout
fn fetch(
    uri: &str,
    output: Option<PathBuf>,
    seek: Option<u64>,
    bitrate: Option<Bitrate>,
    config: &Config,
) -> anyhow::Result<()> {
    let engine = start_engine(config)?;
    let result = fetch_with(&engine, uri, output, seek, bitrate, config);
    engine.shutdown();
    result
}

fn fetch_with(
    engine: &Engine,
    uri: &str,
    output: Option<PathBuf>,
    seek: Option<u64>,
    bitrate: Option<Bitrate>,
    config: &Config,
) -> anyhow::Result<()> {
    let session = stored_session(engine, config)?;
    if let Some(bitrate) = bitrate {
        engine.set_preferred_bitrate(session, bitrate)?;
    }

    let (track, mut reader) = engine.open(session, uri)?;
    reader.set_read_timeout(Some(
        Duration::from_secs(config.engine.chunk_timeout_secs) * (config.engine.max_reconnect_attempts + 2),
    ));
    if let Some(offset) = seek {
        engine.seek(track, offset)?;
    }

    let metadata = engine.metadata(track)?;
    let name = metadata.name.clone().unwrap_or_else(|| uri.to_string());
    let progress = FetchProgress::new(&name);
    engine.play(track, Some(progress.callback()))?;

    let mut writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout().lock()),
    };

    match io::copy(&mut reader, &mut writer) {
        Ok(bytes) => {
            writer.flush()?;
            progress.finish(bytes);
            info!(bytes, "Fetch complete");
        }
        Err(e) => {
            progress.abandon();
            return Err(e.into());
        }
    }

    if let Err(e) = engine.close(track) {
        warn!("Close failed: {e}");
    }
    engine.logout(session)?;

    if let Some(path) = output {
        eprintln!(
            "{} Wrote {}",
            style("✓").green(),
            style(path.display()).bold()
        );
    }
    Ok(())
}

/// Print metadata for a track without downloading it
fn show_info(uri: &str, config: &Config) -> anyhow::Result<()> {
    let engine = start_engine(config)?;
    let result = (|| {
        let session = stored_session(&engine, config)?;
        let (track, _reader) = engine.open(session, uri)?;
        let metadata = engine.metadata(track)?;
        engine.close(track)?;
        engine.logout(session)?;
        anyhow::Ok(metadata)
    })();
    engine.shutdown();
    let metadata = result?;

    println!("{}", style(metadata.name.as_deref().unwrap_or(uri)).bold());
    println!("  URI:      {uri}");
    println!("  Format:   {:?}", metadata.format);
    if let Some(ms) = metadata.duration_ms {
        println!("  Duration: {}", format_duration_ms(ms));
    }
    match metadata.file_length {
        Some(len) => println!("  Size:     {}", format_bytes(len)),
        None => println!("  Size:     {}", style("unknown until playback").dim()),
    }
    Ok(())
}

/// Remove stored credentials
fn logout(config: &Config) -> anyhow::Result<()> {
    let path = &config.account.credentials_file;
    if path.exists() {
        std::fs::remove_file(path)?;
        println!("{} Removed {}", style("✓").green(), path.display());
    } else {
        println!("No stored credentials");
    }
    Ok(())
}
