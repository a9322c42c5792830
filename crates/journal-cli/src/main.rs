//! CLI mínima del journal: `journal [--adapter NAME] <append|append-json|list|latest>`.
//!
//! Códigos de salida: 0 ok, 1 error de backend, 2 validación, 3 conflicto.

use clap::{Parser, Subcommand};
use journal_core::{AppendRequest, JournalConfig, JournalError};
use journal_infra::Journal;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "journal", about = "Append-only event journal")]
struct Cli {
    /// Backend: memory | relational | document (por defecto JOURNAL_ADAPTER)
    #[arg(long, global = true)]
    adapter: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Agrega un evento a un ref
    Append {
        #[arg(long = "ref")]
        reference: String,
        #[arg(long)]
        name: String,
        /// Payload JSON
        #[arg(long)]
        payload: Option<String>,
        #[arg(long)]
        initiated_by: Option<String>,
        #[arg(long)]
        expected_version: Option<u64>,
    },
    /// Agrega un evento desde una petición JSON sin tipar
    AppendJson { request: String },
    /// Lista eventos de un ref (una línea JSON por evento)
    List {
        #[arg(long = "ref")]
        reference: String,
        #[arg(long)]
        from: Option<u64>,
        #[arg(long)]
        to: Option<u64>,
    },
    /// Última versión de un ref
    Latest {
        #[arg(long = "ref")]
        reference: String,
    },
}

/// Fallos de la CLI: entrada mal formada, salida no serializable o error del journal.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid input: {0}")]
    Input(String),
    #[error("cannot serialize output: {0}")]
    Output(#[from] serde_json::Error),
    #[error(transparent)]
    Journal(#[from] JournalError),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Input(_) => 2,
            CliError::Output(_) => 1,
            CliError::Journal(e) => exit_code(e),
        }
    }
}

fn exit_code(err: &JournalError) -> i32 {
    match err {
        JournalError::Conflict { .. } => 3,
        JournalError::Validation(_) | JournalError::InvalidRef { .. } => 2,
        _ => 1,
    }
}

fn parse_json(raw: &str) -> Result<Value, CliError> {
    serde_json::from_str(raw).map_err(|e| CliError::Input(format!("invalid JSON: {e}")))
}

async fn run(journal: &Journal, command: Command) -> Result<(), CliError> {
    match command {
        Command::Append { reference, name, payload, initiated_by, expected_version } => {
            let payload = payload.as_deref().map(parse_json).transpose()?;
            let ev = journal.append_event(&name, &reference, payload, initiated_by.as_deref(), expected_version).await?;
            println!("{}", serde_json::to_string(&ev)?);
        }
        Command::AppendJson { request } => {
            let request: AppendRequest =
                serde_json::from_value(parse_json(&request)?).map_err(|e| CliError::Input(format!("invalid request: {e}")))?;
            let ev = journal.append(request).await?;
            println!("{}", serde_json::to_string(&ev)?);
        }
        Command::List { reference, from, to } => {
            for ev in journal.list_events(&reference, from, to).await? {
                println!("{}", serde_json::to_string(&ev)?);
            }
        }
        Command::Latest { reference } => {
            println!("{}", journal.latest_version(&reference).await?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Cargar .env si existe
    let _ = dotenvy::dotenv();
    env_logger::init();
    let cli = Cli::parse();

    let mut journal = Journal::new(JournalConfig::from_env());
    if let Err(e) = journal.create_client(cli.adapter.as_deref(), None).await {
        eprintln!("[journal] {e}");
        std::process::exit(exit_code(&e).max(1));
    }
    let result = run(&journal, cli.command).await;
    if let Err(e) = journal.destroy_client().await {
        log::warn!("disconnect failed: {e}");
    }
    if let Err(e) = result {
        eprintln!("[journal] {e}");
        std::process::exit(e.exit_code());
    }
}
