use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod evaluation;
mod generator;
mod hybrid;
mod llm;
mod models;
mod output;
mod parser;
mod runner;
mod scenarios;
mod schema;
mod strategies;

use crate::config::Config;
use crate::evaluation::Evaluator;
use crate::generator::MessageGenerator;
use crate::llm::{LanguageModel, LlmRouter, Provider};
use crate::output::OutputFormat;
use crate::parser::parse_message_as;
use crate::runner::{PlannedQuery, Runner, load_message_file};
use crate::schema::MessageType;
use crate::strategies::HYBRID;

const CONNECTION_PROMPT: &str = "Reply with the single word OK.";

/// ISO 20022 RAG evaluation CLI - compare prompt strategies across LLM providers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format: plain or json
    #[arg(short, long, global = true, default_value = "plain")]
    output: OutputFormat,

    /// Verbose output - show progress for each API request
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every configured model and method over the generated messages
    Run,
    /// Generate synthetic ISO 20022 messages
    Generate {
        /// Message type code, e.g. pacs.008; repeat to mix types, omit for all
        #[arg(short = 't', long = "type")]
        message_types: Vec<MessageType>,
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
        #[arg(long)]
        seed: Option<u64>,
        /// Write one file per message here instead of printing
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Answer a question about one XML message and score the answer
    Analyze {
        /// ISO 20022 XML file
        file: PathBuf,
        /// simple, context, reranker or hybrid
        #[arg(short, long, default_value = HYBRID)]
        method: String,
        #[arg(long, default_value = "gpt-4")]
        model: String,
        /// Question to ask; summarizes the message when empty
        #[arg(short, long, default_value = "")]
        query: String,
    },
    /// Score a response text file
    Evaluate {
        /// File containing the response text
        file: PathBuf,
        #[arg(short = 't', long = "type")]
        message_type: MessageType,
        /// Source XML message for amount and currency checks
        #[arg(long)]
        message: Option<PathBuf>,
    },
    /// Send a short prompt to every provider with credentials
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    match args.command {
        Command::Run => {
            let llm = LlmRouter::from_env(&config).context("Failed to initialize LLM clients")?;
            let runner = Runner::new(config, Box::new(llm))?;
            let results = runner.run_comparison().await?;
            output::print_results(&results, args.output);
        }
        Command::Generate {
            message_types,
            count,
            seed,
            out_dir,
        } => generate(message_types, count, seed, out_dir.as_deref())?,
        Command::Analyze {
            file,
            method,
            model,
            query,
        } => {
            let message = load_message_file(&file)?;
            let llm = LlmRouter::from_env(&config).context("Failed to initialize LLM clients")?;
            let runner = Runner::new(config, Box::new(llm))?;
            let planned = PlannedQuery {
                category: "Ad hoc".to_string(),
                name: file.display().to_string(),
                query,
                description: String::new(),
            };
            let record = runner.analyze(&message, &planned, &model, &method).await;
            output::print_record(&record, args.output);
            if let Some(error) = record.error {
                bail!("analysis failed: {}", error);
            }
        }
        Command::Evaluate {
            file,
            message_type,
            message,
        } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read response file: {}", file.display()))?;
            let evaluator = Evaluator::new().context("Failed to build evaluator")?;
            let evaluation = match message {
                Some(path) => {
                    let xml = std::fs::read_to_string(&path).with_context(|| {
                        format!("Failed to read message file: {}", path.display())
                    })?;
                    let reference = parse_message_as(&xml, message_type)
                        .with_context(|| format!("Invalid message file: {}", path.display()))?;
                    evaluator.evaluate_against(&text, &reference)
                }
                None => evaluator.evaluate_response(&text, message_type),
            };
            output::print_evaluation(&evaluation, args.output);
        }
        Command::Check => check_connections(&config).await?,
    }

    Ok(())
}

fn generate(
    message_types: Vec<MessageType>,
    count: usize,
    seed: Option<u64>,
    out_dir: Option<&Path>,
) -> anyhow::Result<()> {
    let mut generator = match seed {
        Some(seed) => MessageGenerator::with_seed(seed),
        None => MessageGenerator::new(),
    };

    if let Some(dir) = out_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }

    let batch = generator.generate_batch(count, &message_types);
    for (index, generated) in batch.iter().enumerate() {
        match out_dir {
            Some(dir) => {
                let path = dir.join(format!(
                    "{}_{}.xml",
                    generated.message_type,
                    generated.injected.message_id()
                ));
                std::fs::write(&path, &generated.xml)
                    .with_context(|| format!("Failed to write message: {}", path.display()))?;
                info!("Wrote {}", path.display());
            }
            None => {
                if index > 0 {
                    println!();
                }
                println!("{}", generated.xml);
            }
        }
    }
    Ok(())
}

/// First configured model served by `provider`, or a sensible default
fn check_model(config: &Config, provider: Provider) -> String {
    config
        .run
        .models
        .iter()
        .find(|model| Provider::for_model(model).ok() == Some(provider))
        .cloned()
        .unwrap_or_else(|| match provider {
            Provider::OpenAi => "gpt-4".to_string(),
            Provider::Gemini => "gemini-1.5-pro".to_string(),
        })
}

async fn check_connections(config: &Config) -> anyhow::Result<()> {
    let router = LlmRouter::from_env(config).context("Failed to initialize LLM clients")?;
    let mut failed = 0;

    for (provider, key_var) in [
        (Provider::OpenAi, &config.openai.env_var_api_key),
        (Provider::Gemini, &config.gemini.env_var_api_key),
    ] {
        if !router.is_configured(provider) {
            println!("⚠️  {provider}: skipped ({key_var} not set)");
            continue;
        }

        let model = check_model(config, provider);
        match router.complete(CONNECTION_PROMPT, &model).await {
            Ok(reply) => println!("✅ {provider} ({model}): {}", reply.trim()),
            Err(e) => {
                failed += 1;
                println!("❌ {provider} ({model}): {e}");
            }
        }
    }

    if failed > 0 {
        bail!("{} provider connection(s) failed", failed);
    }
    Ok(())
}
