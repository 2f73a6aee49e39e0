use anyhow::Result;
use dotenvy::dotenv;
use log::{error, info};
use std::sync::Arc;

use persona_clash::core::{Config, Provider};
use persona_clash::database::Database;
use persona_clash::features::generation::{GenerationMode, Generator, OpenAiGenerator, ScriptedGenerator};
use persona_clash::features::personas::PersonaGenerator;
use persona_clash::features::DebateOrchestrator;
use persona_clash::ipc::DebateServer;

/// Turn, summary and persona-writing backends for the configured provider
fn build_generators(config: &Config) -> (Arc<dyn Generator>, Arc<dyn Generator>, Arc<dyn Generator>) {
    match config.provider {
        Provider::OpenAi => {
            let turn_mode = if config.stream_responses {
                GenerationMode::Incremental
            } else {
                GenerationMode::Immediate
            };
            let immediate = || -> Arc<dyn Generator> {
                Arc::new(OpenAiGenerator::new(
                    &config.openai_model,
                    config.temperature,
                    GenerationMode::Immediate,
                ))
            };
            let turns: Arc<dyn Generator> =
                Arc::new(OpenAiGenerator::new(&config.openai_model, config.temperature, turn_mode));
            (turns, immediate(), immediate())
        }
        Provider::Scripted => {
            let smart: Arc<dyn Generator> = Arc::new(ScriptedGenerator::smart());
            (smart.clone(), smart.clone(), smart)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    // The openai crate reads its credentials from the environment
    if let Some(key) = &config.openai_api_key {
        std::env::set_var("OPENAI_API_KEY", key);
        std::env::set_var("OPENAI_KEY", key);
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!(
        "Starting persona-clash server (provider: {}, model: {}, token counter: {})",
        config.provider.as_str(),
        config.openai_model,
        config.token_counter.as_str()
    );

    let database = Arc::new(Database::new(&config.database_path).await?);
    let (turns, summarizer, persona_writer) = build_generators(&config);
    let token_counter = config.token_counter.build()?;

    let orchestrator = DebateOrchestrator::new(
        turns,
        summarizer,
        PersonaGenerator::new(persona_writer, database.clone()),
        database,
    )
    .with_token_ceiling(config.history_token_ceiling)
    .with_token_counter(token_counter);

    let server = Arc::new(DebateServer::new(Arc::new(orchestrator)).with_socket_path(&config.socket_path));

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Debate server stopped: {e}");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    let _ = std::fs::remove_file(&config.socket_path);
    Ok(())
}
