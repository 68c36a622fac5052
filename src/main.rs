use anyhow::{Context, Result};
use clap::Parser;
use loqa_live::audio::{InputDevice, ScriptedInput};
use loqa_live::{
    create_router, AppState, ClockOutput, Config, LiveAgentHandle, LiveSession, NatsTransport,
    WavFileInput,
};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "loqa-live", about = "Live duplex voice session with a remote agent")]
struct Cli {
    /// Config file (extension optional)
    #[arg(long, default_value = "config/loqa-live")]
    config: String,

    /// WAV file to use as the microphone (overrides audio.input_wav)
    #[arg(long)]
    input_wav: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Loqa Live v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Agent relay: {} (model {}, voice {})", cfg.agent.nats_url, cfg.agent.model, cfg.agent.voice);

    let input: Box<dyn InputDevice> = match cli.input_wav.or_else(|| cfg.audio.input_wav.clone()) {
        Some(path) => {
            info!("Microphone: replaying {}", path.display());
            Box::new(WavFileInput::new(path))
        }
        None => {
            warn!("No input WAV configured; microphone will stay silent");
            Box::new(ScriptedInput::new())
        }
    };

    let session = LiveSession::new(
        cfg.session_config(),
        Box::new(NatsTransport::new(cfg.agent.nats_url.clone())),
        input,
        Box::new(ClockOutput::new()),
    );
    let (live, coordinator) = LiveAgentHandle::spawn(session);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP control API listening on {}", addr);

    axum::serve(listener, create_router(AppState::new(live.clone())))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server failed")?;

    live.stop().await?;
    drop(live);
    coordinator.await.context("Live session task panicked")?;

    Ok(())
}
