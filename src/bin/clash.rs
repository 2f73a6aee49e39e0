//! Command-line client for a running persona-clash server.
//!
//! # Usage
//!
//! ```bash
//! # Start a debate and print its id
//! clash start "Pineapple on pizza" Ava Ben --question "Does pineapple belong on pizza?"
//!
//! # Stream the next turn of debate 3
//! clash next 3
//!
//! # Start a debate and stream six turns
//! clash run "Cats or dogs" Ava Ben --turns 6
//!
//! # Show a stored debate, or the latest ones
//! clash show 3
//! clash list --limit 5
//! ```

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::time::Duration;

use persona_clash::features::debate::{DebateId, DebateRequest, DebateSnapshot, DEFAULT_ANSWER_LENGTH};
use persona_clash::ipc::{connect_with_retry, get_socket_path, DebateClient, ServerEvent};

#[derive(Parser)]
#[command(name = "clash", version, about = "Drive two-persona debates on a persona-clash server")]
struct Cli {
    /// Server socket (defaults to $CLASH_SOCKET or /tmp/persona-clash.sock)
    #[arg(long, global = true)]
    socket: Option<String>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct StartArgs {
    topic: String,
    name1: String,
    name2: String,
    /// Question that frames the opening turn
    #[arg(short, long)]
    question: Option<String>,
    /// Target reply length in words
    #[arg(short, long, default_value_t = DEFAULT_ANSWER_LENGTH)]
    answer_length: u32,
}

impl StartArgs {
    fn into_request(self) -> DebateRequest {
        DebateRequest::new(self.topic, self.name1, self.name2)
            .with_questions(self.question.into_iter().collect())
            .with_answer_length(self.answer_length)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a debate and print its id
    Start(StartArgs),

    /// Produce the next turn of a debate
    Next {
        debate_id: DebateId,
        /// Wait for the whole reply instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },

    /// Create a debate and run several turns
    Run {
        #[command(flatten)]
        start: StartArgs,
        #[arg(short, long, default_value_t = 4)]
        turns: u32,
        /// Keep the debate open afterwards
        #[arg(long)]
        keep: bool,
    },

    /// Print a stored debate and its turns
    Show { debate_id: DebateId },

    /// List recent debates
    List {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Close a live debate
    End { debate_id: DebateId },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let socket = cli.socket.unwrap_or_else(get_socket_path);
    let mut client = connect_with_retry(&socket, 3, Duration::from_millis(500)).await?;

    match cli.command {
        Commands::Start(args) => {
            let debate = start(&mut client, args.into_request()).await?;
            println!("{}", debate.id);
        }
        Commands::Next { debate_id, no_stream } => {
            next_turn(&mut client, debate_id, !no_stream).await?;
        }
        Commands::Run { start: args, turns, keep } => {
            let debate = start(&mut client, args.into_request()).await?;
            for _ in 0..turns {
                next_turn(&mut client, debate.id, true).await?;
            }
            if !keep {
                let request_id = client.end_debate(debate.id).await?;
                reply(&mut client, &request_id).await?;
            }
        }
        Commands::Show { debate_id } => {
            let request_id = client.get_debate(debate_id).await?;
            if let ServerEvent::Debate { transcript, .. } = reply(&mut client, &request_id).await? {
                let debate = transcript.debate;
                println!(
                    "#{} {} ({} vs {}, {})",
                    debate.id, debate.topic, debate.persona1.name, debate.persona2.name, debate.provider
                );
                for turn in transcript.turns {
                    println!("\n[{}] {}: {}", turn.turn_number, turn.speaker, turn.content);
                }
            }
        }
        Commands::List { limit } => {
            let request_id = client.list_debates(limit).await?;
            if let ServerEvent::Debates { debates, .. } = reply(&mut client, &request_id).await? {
                for debate in debates {
                    println!(
                        "#{:<5} {}  {} vs {}  {}",
                        debate.id,
                        debate.created_at.format("%Y-%m-%d %H:%M"),
                        debate.persona1.name,
                        debate.persona2.name,
                        debate.topic
                    );
                }
            }
        }
        Commands::End { debate_id } => {
            let request_id = client.end_debate(debate_id).await?;
            reply(&mut client, &request_id).await?;
        }
    }

    Ok(())
}

async fn start(client: &mut DebateClient, request: DebateRequest) -> Result<DebateSnapshot> {
    let request_id = client.start_debate(request).await?;
    match reply(client, &request_id).await? {
        ServerEvent::DebateStarted { debate, .. } => {
            eprintln!(
                "Debate {}: {} vs {} on '{}'",
                debate.id, debate.persona_a.name, debate.persona_b.name, debate.topic
            );
            Ok(debate)
        }
        other => Err(anyhow!("unexpected reply: {other:?}")),
    }
}

async fn next_turn(client: &mut DebateClient, debate_id: DebateId, stream: bool) -> Result<()> {
    let request_id = client.advance_turn(debate_id, stream).await?;
    if let ServerEvent::TurnCompleted { turn, .. } = reply(client, &request_id).await? {
        println!("\n{}: {}", turn.speaker, turn.content);
    }
    Ok(())
}

/// Wait for the final event answering `request_id`, printing streamed fragments on the way
async fn reply(client: &mut DebateClient, request_id: &str) -> Result<ServerEvent> {
    let mut current_speaker: Option<String> = None;
    loop {
        let event = client
            .recv()
            .await
            .ok_or_else(|| anyhow!("connection to server closed"))?;
        if event.request_id() != Some(request_id) {
            continue;
        }

        if !event.is_final() {
            if let ServerEvent::Fragment { speaker, fragment, .. } = event {
                if current_speaker.as_deref() != Some(speaker.as_str()) {
                    print!("\n{speaker}: ");
                    current_speaker = Some(speaker);
                }
                print!("{fragment}");
                std::io::stdout().flush()?;
            }
            continue;
        }

        return match event {
            ServerEvent::Error { kind, message, retryable, .. } => {
                let hint = if retryable { " (retryable)" } else { "" };
                Err(anyhow!("{kind}: {message}{hint}"))
            }
            ServerEvent::EndOfTurn { .. } => {
                println!();
                Ok(event)
            }
            other => Ok(other),
        };
    }
}
