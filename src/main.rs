// ABOUTME: Entry point for the foreman binary.
// ABOUTME: Parses CLI arguments, wires up the registry and leader, and runs requests.

use std::io::Write as _;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use foreman_agent::{
    Agent, AgentParams, AgentRegistry, DomainContext, GeneralAgent, GenerationRecord,
    GenerationSink, LEADER_AGENT, Leader, LeaderAgent, create_chat_client,
};
use foreman_agent::config::ForemanConfig;
use foreman_core::ChatMessage;

#[derive(Parser)]
#[command(
    name = "foreman",
    about = "Multi-agent orchestrator: a leader plans steps, delegates them, and answers"
)]
struct Cli {
    /// One-shot request. Starts an interactive session when omitted.
    request: Option<String>,

    /// Project context injected into every agent's system prompt.
    #[arg(long)]
    project: Option<String>,

    /// Print the answer only once it is complete instead of streaming.
    #[arg(long)]
    no_stream: bool,
}

/// Logs every completed model turn through tracing.
struct LogSink;

impl GenerationSink for LogSink {
    fn record(&self, record: GenerationRecord) {
        tracing::info!(
            agent = %record.agent,
            model = %record.model,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            "generation finished"
        );
    }
}

fn build_registry() -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    registry.register(LEADER_AGENT, Arc::new(|_params| {
        Ok(Box::new(LeaderAgent) as Box<dyn Agent>)
    }));
    registry.register(GeneralAgent::NAME, Arc::new(|_params| {
        Ok(Box::new(GeneralAgent) as Box<dyn Agent>)
    }));
    registry
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "foreman=info".parse().expect("valid filter")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ForemanConfig::from_env().context("loading configuration")?;
    let (client, model) = create_chat_client(&config.provider, config.model.as_deref())
        .context("creating chat client")?;
    tracing::info!(provider = %config.provider, %model, "foreman starting up");

    let params = AgentParams {
        context: DomainContext {
            project: cli.project.clone(),
            language: config.language.clone(),
        },
        tracer: Some(Arc::new(LogSink)),
        temperature: config.temperature,
    };
    let mut leader = Leader::new(client, model, build_registry(), params);

    let stream_callback = |chunk: &str| {
        print!("{chunk}");
        let _ = std::io::stdout().flush();
    };
    let callback = (!cli.no_stream).then_some(&stream_callback as &foreman_agent::StreamCallback);

    let mut messages: Vec<ChatMessage> = Vec::new();

    if let Some(request) = cli.request {
        messages.push(ChatMessage::user(request));
        let answer = leader.respond(&messages, callback).await;
        if cli.no_stream {
            println!("{answer}");
        } else {
            println!();
        }
        return Ok(());
    }

    // Interactive session: conversation context accumulates across turns.
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        messages.push(ChatMessage::user(line));
        let answer = leader.respond(&messages, callback).await;
        if cli.no_stream {
            println!("{answer}");
        } else {
            println!();
        }
        messages.push(ChatMessage::assistant(answer));
    }

    Ok(())
}
