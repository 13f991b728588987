//! Rescan chat files, show their status line, and preview what the
//! generation interceptor would send.
//!
//! Reads extension settings from the host-wide settings file given with
//! `--settings` and the API key override from `VHELAS_API_KEY`. Log
//! verbosity is controlled by `VHELAS_LOG` (default `warn`).
//!
//! # Examples
//!
//! ```sh
//! # Extract markers, write the chat back if anything changed
//! vhelas scan chats/adventure.jsonl
//!
//! # Show the current status line without touching the file
//! vhelas status chats/adventure.jsonl
//!
//! # Try the extractor on a single message
//! echo 'Hi<!--STATUS:["Inn","Noon"]-->' | vhelas extract
//!
//! # Replay host events against a chat file
//! printf 'CHAT_CHANGED\nMESSAGE_RECEIVED\n' | vhelas watch chats/adventure.jsonl
//! ```

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use vhelas::config::Settings;
use vhelas::diagnostics::{DiagnosticBuffer, DiagnosticsLayer};
use vhelas::events::{ChatEvent, EventBus};
use vhelas::extension::{HostContext, StatusLineExtension};
use vhelas::host::{ChatFile, SaveFlag};
use vhelas::intercept::{GenerationInterceptor, InterceptAction};
use vhelas::status::{MemorySink, StatusLine, derive_status};
use vhelas::tags::extract_tags;

/// Environment variable holding the log filter directive.
const LOG_ENV: &str = "VHELAS_LOG";

/// Exit code when the interceptor aborts generation.
const EXIT_ABORTED: i32 = 2;

/// Inline state tags and status line for chat transcripts.
#[derive(Parser)]
#[command(name = "vhelas", version)]
struct Cli {
    /// Host-wide settings file (JSON object keyed by extension name).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Print captured tag diagnostics before exiting.
    #[arg(long, global = true)]
    diagnostics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rescan a chat file, save it if modified, and print the status line.
    Scan {
        /// Chat file (`.jsonl` or JSON array).
        chat: PathBuf,
    },
    /// Print the status line of a chat file without modifying it.
    Status { chat: PathBuf },
    /// Extract tags from one message text read from stdin.
    Extract,
    /// Print the outbound messages the interceptor would send.
    Intercept { chat: PathBuf },
    /// Dispatch event names read from stdin against a chat file.
    Watch { chat: PathBuf },
    /// Print the JSON Schema of the extension settings.
    Schema,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let diagnostics = init_tracing();

    let code = match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };

    if cli.diagnostics {
        print_diagnostics(&diagnostics);
    }
    process::exit(code);
}

fn init_tracing() -> DiagnosticBuffer {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let (diagnostics_layer, buffer) = DiagnosticsLayer::new();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .with(diagnostics_layer)
        .init();
    buffer
}

fn print_diagnostics(buffer: &DiagnosticBuffer) {
    let captured = buffer.drain();
    if captured.is_empty() {
        eprintln!("No diagnostics.");
        return;
    }
    eprintln!("{} diagnostic(s):", captured.len());
    for diagnostic in captured {
        eprintln!("  {diagnostic}");
    }
}

async fn run(cli: &Cli) -> Result<i32, String> {
    if let Command::Schema = cli.command {
        let schema = serde_json::to_string_pretty(&Settings::json_schema())
            .map_err(|e| format!("failed to serialize schema: {e}"))?;
        println!("{schema}");
        return Ok(0);
    }

    let settings = Settings::load(cli.settings.as_deref());
    let extension = Arc::new(
        StatusLineExtension::new(settings).map_err(|e| format!("failed to build tag registry: {e}"))?,
    );

    match &cli.command {
        Command::Scan { chat } => scan(&extension, chat).await,
        Command::Status { chat } => status(&extension, chat).await,
        Command::Extract => extract(&extension).await,
        Command::Intercept { chat } => intercept(&extension, chat).await,
        Command::Watch { chat } => watch(extension, chat).await,
        Command::Schema => Ok(0),
    }
}

// ── Subcommands ────────────────────────────────────────────────────

async fn scan(extension: &StatusLineExtension, path: &Path) -> Result<i32, String> {
    let mut chat = ChatFile::load(path).await.map_err(|e| e.to_string())?;
    let saves = SaveFlag::new();
    let sink = MemorySink::new();

    let report = extension.refresh(&mut HostContext::new(&mut chat.messages, &saves, &sink));
    if chat.flush(&saves).await.map_err(|e| e.to_string())? {
        eprintln!(
            "Updated {} ({} message(s) changed, {} marker(s) rejected)",
            path.display(),
            report.scan.messages_changed,
            report.scan.rejected
        );
    }
    println!("{}", report.status);
    Ok(0)
}

async fn status(extension: &StatusLineExtension, path: &Path) -> Result<i32, String> {
    let chat = ChatFile::load(path).await.map_err(|e| e.to_string())?;
    let line = if extension.settings().enabled {
        derive_status(extension.registry(), &chat.messages)
    } else {
        StatusLine::default()
    };
    println!("{line}");
    Ok(0)
}

async fn extract(extension: &StatusLineExtension) -> Result<i32, String> {
    let mut text = String::new();
    tokio::io::stdin()
        .read_to_string(&mut text)
        .await
        .map_err(|e| format!("failed to read stdin: {e}"))?;
    let text = text.trim_end_matches(['\r', '\n']);

    let extraction = extract_tags(extension.registry(), text);
    let rejected: Vec<String> = extraction.rejected.iter().map(|e| e.to_string()).collect();
    let output = json!({
        "variables": extraction.variables(),
        "text": extraction.cleaned.as_deref().unwrap_or(text),
        "rejected": rejected,
    });
    let rendered = serde_json::to_string_pretty(&output)
        .map_err(|e| format!("failed to serialize extraction: {e}"))?;
    println!("{rendered}");
    Ok(0)
}

async fn intercept(extension: &StatusLineExtension, path: &Path) -> Result<i32, String> {
    let chat = ChatFile::load(path).await.map_err(|e| e.to_string())?;
    let mut outbound = chat.messages.clone();
    match extension.intercept(&chat.messages, &mut outbound) {
        InterceptAction::Proceed => {
            let rendered = serde_json::to_string_pretty(&outbound)
                .map_err(|e| format!("failed to serialize outbound messages: {e}"))?;
            println!("{rendered}");
            Ok(0)
        }
        InterceptAction::Abort(reason) => {
            eprintln!("Generation aborted: {reason}");
            Ok(EXIT_ABORTED)
        }
    }
}

async fn watch(extension: Arc<StatusLineExtension>, path: &Path) -> Result<i32, String> {
    let bus = EventBus::standard(extension);
    let sink = MemorySink::new();
    let saves = SaveFlag::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| format!("failed to read stdin: {e}"))?
    {
        if line.trim().is_empty() {
            continue;
        }
        let event: ChatEvent = match line.parse() {
            Ok(event) => event,
            Err(e) => {
                warn!("{e}");
                continue;
            }
        };

        // The host may have edited the file since the last event.
        let mut chat = ChatFile::load(path).await.map_err(|e| e.to_string())?;
        let report = bus.dispatch(event, &mut HostContext::new(&mut chat.messages, &saves, &sink));
        chat.flush(&saves).await.map_err(|e| e.to_string())?;

        match report {
            Some(report) => println!("{event}: {}", report.status),
            None => println!("{event}: (no update)"),
        }
    }
    Ok(0)
}
