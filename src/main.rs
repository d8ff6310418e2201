// Command-line entry point for the fraud assistant. Wires configuration, logging, the model
// registry and the chatbot together and dispatches one subcommand.
use anyhow::{bail, Context, Result};
use fraud_assistant::chat::{AccountDirectory, Chatbot, NoAccounts, SqliteAccounts};
use fraud_assistant::config::{AppConfig, LoggingConfig};
use fraud_assistant::csv_reader::CsvDataSource;
use fraud_assistant::models::{Algorithm, ModelRegistry, ModelStore};
use fraud_assistant::{FraudService, TransactionFeatures};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{self, BufRead, Read, Write};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: fraud-assistant <command> [options]

commands:
  train [ann|svm|knn|all] [--force]      train or load models and print their metrics
  score <features.json|-> [--algorithm A] score a JSON object of Time/Amount/V1..V28
  assess <amount> [merchant] [--algorithm A]
                                          score an amount with business-rule floors
  algorithms                              list algorithms and which are available
  chat [--user ID]                        chat on stdin, one message per line

configuration: config/default.toml, overridden by FRAUD_ASSISTANT__* variables";

// Parsed command line: the subcommand, its positional arguments and flags
struct Args {
    command: String,
    positional: Vec<String>,
    algorithm: Option<Algorithm>,
    user: String,
    force: bool,
}

// Splits raw arguments into a command, positionals and the known flags
// Inputs: process arguments without the program name
// Outputs: Args, or an error for unknown flags and bad algorithm names
fn parse_args(raw: &[String]) -> Result<Args> {
    let mut iter = raw.iter();
    let command = iter.next().cloned().unwrap_or_else(|| "help".to_string());
    let mut args = Args {
        command,
        positional: Vec::new(),
        algorithm: None,
        user: "cli".to_string(),
        force: false,
    };

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--force" => args.force = true,
            "--algorithm" | "-a" => {
                let name = iter.next().context("--algorithm needs a value")?;
                args.algorithm = Some(name.parse()?);
            }
            "--user" | "-u" => {
                args.user = iter.next().context("--user needs a value")?.clone();
            }
            flag if flag.starts_with("--") => bail!("unknown option {flag}\n\n{USAGE}"),
            _ => args.positional.push(arg.clone()),
        }
    }
    Ok(args)
}

// Installs the tracing subscriber; RUST_LOG wins over the configured level
fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fraud_assistant={}", config.level)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if config.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{text}");
    Ok(())
}

fn build_service(config: &AppConfig) -> Arc<FraudService> {
    let registry = ModelRegistry::new(
        CsvDataSource::new(&config.data.path),
        ModelStore::new(&config.models.dir),
    );
    Arc::new(FraudService::new(
        Arc::new(registry),
        config.decision,
        config.models.model_version.clone(),
    ))
}

// Trains the requested algorithms (all three by default) and prints each outcome
// Key steps:
// 1. Resolve which algorithms to train
// 2. Train or load each one, continuing past failures
// 3. Fail the command if any algorithm failed
fn run_train(service: &FraudService, args: &Args) -> Result<()> {
    let targets: Vec<Algorithm> = match args.positional.first().map(String::as_str) {
        None | Some("all") => Algorithm::ALL.to_vec(),
        Some(name) => vec![name.parse()?],
    };

    let mut failed = Vec::new();
    for algorithm in targets {
        match service.train(algorithm, args.force) {
            Ok(outcome) => print_json(&outcome)?,
            Err(e) => {
                eprintln!("{algorithm}: {e}");
                failed.push(algorithm);
            }
        }
    }
    if !failed.is_empty() {
        bail!("training failed for {failed:?}");
    }
    Ok(())
}

fn run_score(service: &FraudService, args: &Args, default: Algorithm) -> Result<()> {
    let source = args
        .positional
        .first()
        .context("score needs a JSON file path or '-' for stdin")?;
    let text = if source == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read {source}"))?
    };
    let payload: HashMap<String, f64> =
        serde_json::from_str(&text).context("Features must be a JSON object of numbers")?;
    let features = TransactionFeatures::from(payload);

    let algorithm = args.algorithm.unwrap_or(default);
    service.registry().train(algorithm, false)?;
    let decision = service.score(&features, Some(algorithm))?;
    print_json(&decision)
}

fn run_assess(service: &FraudService, args: &Args, default: Algorithm) -> Result<()> {
    let amount: f64 = args
        .positional
        .first()
        .context("assess needs an amount")?
        .trim_start_matches('$')
        .parse()
        .context("amount must be a number")?;
    let merchant = (args.positional.len() > 1).then(|| args.positional[1..].join(" "));

    let algorithm = args.algorithm.unwrap_or(default);
    if let Err(e) = service.registry().train(algorithm, false) {
        warn!(%algorithm, error = %e, "Model unavailable, assessing with business rules only");
    }
    print_json(&service.assess(amount, merchant.as_deref(), algorithm))
}

fn run_chat(service: Arc<FraudService>, config: &AppConfig, user: &str) -> Result<()> {
    let accounts: Arc<dyn AccountDirectory> = match &config.chat.accounts_db {
        Some(path) => Arc::new(
            SqliteAccounts::open(path)
                .with_context(|| format!("Failed to open accounts database {}", path.display()))?,
        ),
        None => Arc::new(NoAccounts),
    };
    if let Err(e) = service.registry().set_active(config.models.default_algorithm) {
        warn!(error = %e, "Default model unavailable, fraud checks will use business rules");
    }
    let bot = Chatbot::new(service, accounts);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        let message = line.trim();
        if message.eq_ignore_ascii_case("quit") || message.eq_ignore_ascii_case("exit") {
            break;
        }
        if !message.is_empty() {
            writeln!(stdout, "{}\n", bot.chat(user, message))?;
        }
        write!(stdout, "> ")?;
        stdout.flush()?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&raw)?;

    let config = AppConfig::load()?;
    init_logging(&config.logging);
    info!(command = %args.command, "Starting fraud assistant");

    let service = build_service(&config);
    match args.command.as_str() {
        "train" => run_train(&service, &args),
        "score" => run_score(&service, &args, config.models.default_algorithm),
        "assess" => run_assess(&service, &args, config.models.default_algorithm),
        "algorithms" => print_json(&service.list_algorithms()),
        "chat" => run_chat(service, &config, &args.user),
        "help" | "--help" | "-h" => {
            println!("{USAGE}");
            Ok(())
        }
        other => bail!("unknown command '{other}'\n\n{USAGE}"),
    }
}
