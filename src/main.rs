use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cast_gateway::api::ApiServerBuilder;
use cast_gateway::cast::{CastV2Factory, Connector, DiscoveryEngine, PlaybackDispatcher};
use cast_gateway::media::content_type_for;
use cast_gateway::{Config, tts};

/// Cast gateway - play media and speech on Cast receivers over HTTP
#[derive(Parser)]
#[command(name = "cast-gateway", version, about)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "CAST_PORT")]
    port: Option<u16>,

    /// Root directory for static media and recorded speech
    #[arg(long, env = "CAST_STATIC_DIR")]
    static_dir: Option<PathBuf>,

    /// Discover devices on first request instead of at startup
    #[arg(long)]
    no_preload: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Discover receivers once and print them as JSON
    Devices,
    /// Print the supported speech languages
    Langs,
    /// Play a URL on a receiver, looked up by its advertised name
    Play {
        /// Friendly name of the receiver
        device: String,
        /// Media URL the receiver can fetch
        url: String,
        /// Content type to announce (guessed from the URL by default)
        #[arg(long)]
        content_type: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,cast_gateway=info",
        1 => "info,cast_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(port) = cli.port {
        config.api_server.port = port;
    }
    if let Some(dir) = cli.static_dir {
        config.api_server.static_dir = dir;
    }
    if cli.no_preload {
        config.api_server.preload_devices = false;
    }
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Devices => list_devices(&config).await,
        Command::Langs => {
            println!("{}", serde_json::to_string_pretty(&tts::langs::languages())?);
            Ok(())
        }
        Command::Play {
            device,
            url,
            content_type,
        } => play(&config, &device, &url, content_type.as_deref()).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        environment = %config.environment,
        version = %config.version,
        port = config.api_server.port,
        "starting cast gateway"
    );

    ApiServerBuilder::new(config).build()?.run().await?;
    Ok(())
}

/// Run one discovery pass and print what was found
async fn list_devices(config: &Config) -> anyhow::Result<()> {
    let engine = DiscoveryEngine::mdns(config.cast.discovery_timeout);
    let devices = engine.discover().await?;
    println!("{}", serde_json::to_string_pretty(&devices)?);
    Ok(())
}

/// Connect to one receiver by name and play a URL on it
async fn play(
    config: &Config,
    device: &str,
    url: &str,
    content_type: Option<&str>,
) -> anyhow::Result<()> {
    let connector = Connector::new(
        DiscoveryEngine::mdns(config.cast.discovery_timeout),
        Arc::new(CastV2Factory),
        config.cast.connect_timeout,
    );
    let handle = connector.connect(device).await?;

    let dispatcher =
        PlaybackDispatcher::new(config.cast.connect_timeout, config.cast.playback_timeout);
    dispatcher
        .play(&handle, url, content_type.unwrap_or_else(|| content_type_for(url)))
        .await?;

    println!("Playing {url} on '{device}'");
    Ok(())
}
