use agent_voice_rs::{
    agent::InMemoryDirectory,
    config::load_config,
    providers::{DeepgramTranscription, ElevenLabsSynthesis, OpenAiCompletion, ProviderSet},
    session::SessionRegistry,
    transport::{TransportConfig, VoiceServer},
};
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "agent-voice", about = "Real-time voice conversation gateway")]
struct Args {
    /// Address to listen on for WebSocket connections
    #[arg(long, default_value = "127.0.0.1:8088")]
    bind: String,

    /// Path to a JSON file seeding agents and their knowledge documents
    #[arg(long)]
    agents: std::path::PathBuf,

    /// Sessions idle longer than this are evicted
    #[arg(long, default_value_t = 300)]
    idle_timeout_secs: u64,

    /// How often the idle sweep runs
    #[arg(long, default_value_t = 60)]
    sweep_interval_secs: u64,

    /// Per-session inbound audio queue depth
    #[arg(long, default_value_t = 8)]
    queue_depth: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    // Missing credentials abort here, before any session can be accepted.
    let api_config = load_config().context("provider credentials are required at startup")?;

    let seed = std::fs::read_to_string(&args.agents)
        .with_context(|| format!("failed to read agent seed file {}", args.agents.display()))?;
    let directory = Arc::new(
        InMemoryDirectory::from_json(&seed).context("failed to parse agent seed file")?,
    );
    log::info!("loaded {} agents", directory.agent_count());

    let providers = ProviderSet {
        transcriber: Arc::new(DeepgramTranscription::new(
            api_config.deepgram_key().to_string(),
        )?),
        completer: Arc::new(OpenAiCompletion::new(api_config.openai_key().to_string())?),
        synthesizer: Arc::new(ElevenLabsSynthesis::new(
            api_config.elevenlabs_key().to_string(),
        )?),
    };

    let registry = Arc::new(SessionRegistry::new(Duration::from_secs(
        args.idle_timeout_secs,
    )));

    let cancel = CancellationToken::new();
    let sweeper = registry.spawn_sweeper(
        Duration::from_secs(args.sweep_interval_secs),
        cancel.clone(),
    );

    let server = VoiceServer::new(
        TransportConfig {
            bind_address: args.bind.clone(),
            queue_depth: args.queue_depth,
        },
        directory,
        registry,
        providers,
    );

    tokio::select! {
        result = server.run(cancel.clone()) => {
            result.context("voice gateway failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("received Ctrl+C, shutting down");
            cancel.cancel();
        }
    }

    sweeper.await.ok();
    Ok(())
}
