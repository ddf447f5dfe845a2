//! assistantd binary: wire config, engine, and listener together.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use assistantd::config::DEFAULT_PORT;
use assistantd::{CommandEngine, EngineConfig, InferenceEngine, Listener, ServerConfig};

#[derive(Parser, Debug)]
#[command(
    name = "assistantd",
    about = "Single-slot LLM inference server over raw TCP"
)]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Listen port.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Generator program invoked once per request; the templated prompt is
    /// written to its stdin and its stdout is streamed back to the client.
    #[arg(long = "engine-cmd")]
    engine_cmd: String,

    /// Extra argument for the generator program (repeatable).
    #[arg(long = "engine-arg")]
    engine_args: Vec<String>,

    /// Prompt template; `{prompt}` is replaced with the request text.
    #[arg(long, default_value = "Q: {prompt}. A: ")]
    prompt_template: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "assistantd=info,assistant_protocol=info".into()),
        )
        .init();

    let args = Args::parse();

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        ..Default::default()
    };
    let engine: Arc<dyn InferenceEngine> = Arc::new(CommandEngine::new(EngineConfig {
        program: args.engine_cmd,
        args: args.engine_args,
        prompt_template: args.prompt_template,
    }));

    let listener = Listener::bind_with_retry(&config).await?;

    tokio::select! {
        _ = listener.run(engine) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received interrupt, shutting down");
        }
    }

    Ok(())
}
