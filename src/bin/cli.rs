use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lib::api::spotify::SpotifySource;
use lib::api::ytmusic::YtMusicTarget;
use lib::api::{SourceCatalog, TargetCatalog};
use lib::config::Config;
use lib::migrate::Migrator;
use lib::models::{LikeReport, PlaylistReport};
use music_library_migrate as lib;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::subscriber as tracing_subscriber_global;
use tracing_appender::rolling::RollingFileAppender;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "music-library-migrate", version)]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Auth helpers
    Auth {
        #[command(subcommand)]
        sub: AuthCommands,
    },
    /// Like every saved Spotify track on YouTube Music, oldest first
    ExportSaved,
    /// Recreate every non-empty Spotify playlist on YouTube Music
    ExportPlaylists,
    /// Export playlists, then saved tracks
    ExportAll,
    /// Validate config file and exit
    ConfigValidate,
}

#[derive(Subcommand)]
enum AuthCommands {
    /// Authorize Spotify and store tokens in DB (interactive)
    Spotify,
    /// Store YouTube Music browser headers in DB (interactive)
    Ytmusic,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(p) => Config::from_path(p).with_context(|| format!("loading config from {}", p.display())),
        None => match Config::default_path() {
            Some(p) if p.exists() => {
                Config::from_path(&p).with_context(|| format!("loading config from {}", p.display()))
            }
            _ => Ok(Config::default()),
        },
    }
}

async fn build_migrator(cfg: &Config) -> Result<Migrator> {
    let timeout = Duration::from_secs(cfg.http_timeout_secs);
    let source = SpotifySource::new(String::new(), String::new(), cfg.db_path.clone())
        .with_http_timeout(timeout);
    if !source.is_authenticated() {
        anyhow::bail!("Spotify is not authenticated. Run `auth spotify` first.");
    }
    let target = YtMusicTarget::load(&cfg.db_path).await?.with_http_timeout(timeout);
    if !target.is_authenticated() {
        anyhow::bail!("YouTube Music is not authenticated. Run `auth ytmusic` first.");
    }
    let source: Arc<dyn SourceCatalog> = Arc::new(source);
    let target: Arc<dyn TargetCatalog> = Arc::new(target);
    Ok(Migrator::new(source, target, cfg))
}

fn print_like_report(report: &LikeReport) {
    println!(
        "Saved tracks: {} liked, {} failed, {} not found.",
        report.liked.len(),
        report.failed.len(),
        report.unresolved
    );
    for id in &report.failed {
        println!("- FAILED TO LIKE {}", id);
    }
}

fn print_playlist_report(report: &PlaylistReport) {
    println!(
        "Playlists: {} created, {} failed.",
        report.created.len(),
        report.failed.len()
    );
    for (name, id) in &report.created {
        println!("- {} -> {}", name, id);
    }
    for (name, err) in &report.failed {
        println!("- FAILED {}: {}", name, err);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::ConfigValidate = cli.command {
        match load_config(cli.config.as_ref()) {
            Ok(_) => println!("OK"),
            Err(e) => {
                eprintln!("Config validation failed: {:#}", e);
                std::process::exit(2);
            }
        }
        return Ok(());
    }

    let cfg = load_config(cli.config.as_ref())?;

    // Initialize log->tracing bridge and structured logging.
    // Logs go to both stdout and a daily-rotated file in cfg.log_dir.
    let _ = LogTracer::init();
    std::fs::create_dir_all(&cfg.log_dir)
        .with_context(|| format!("creating log dir {}", cfg.log_dir.display()))?;
    let file_appender: RollingFileAppender = tracing_appender::rolling::daily(&cfg.log_dir, "music-library-migrate.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Honor RUST_LOG if set, otherwise default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer);

    tracing_subscriber_global::set_global_default(subscriber)
        .context("setting global tracing subscriber")?;

    match cli.command {
        Commands::Auth { sub } => match sub {
            AuthCommands::Spotify => lib::api::spotify_auth::run_spotify_auth(&cfg).await?,
            AuthCommands::Ytmusic => lib::api::ytmusic_auth::run_ytmusic_auth(&cfg).await?,
        },
        Commands::ExportSaved => {
            let migrator = build_migrator(&cfg).await?;
            let report = migrator
                .export_saved_tracks()
                .await
                .context("exporting saved tracks")?;
            print_like_report(&report);
        }
        Commands::ExportPlaylists => {
            let migrator = build_migrator(&cfg).await?;
            let report = migrator.export_playlists().await?;
            print_playlist_report(&report);
            report.into_result()?;
        }
        Commands::ExportAll => {
            let migrator = build_migrator(&cfg).await?;
            let playlists = migrator.export_playlists().await?;
            print_playlist_report(&playlists);
            let likes = migrator
                .export_saved_tracks()
                .await
                .context("exporting saved tracks")?;
            print_like_report(&likes);
            playlists.into_result()?;
        }
        Commands::ConfigValidate => {}
    }

    Ok(())
}
