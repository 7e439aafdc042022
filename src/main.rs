#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::prelude::*;

use preview_sandbox::app::config::PreviewConfig;
use preview_sandbox::app::preview::{PreviewEvent, PreviewSandbox, PreviewSession, RenderOutcome, VNode};
use preview_sandbox::app::source::{SourceDocument, StringChunkSource};
use preview_sandbox::app::v8_bindings::ensure_v8_platform;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_BRANCH"),
    "@",
    env!("GIT_COMMIT"),
    ")"
);

#[derive(Parser)]
#[command(
    name = "preview-sandbox",
    version,
    long_version = LONG_VERSION,
    about = "Render generated TSX components in an isolated V8 sandbox"
)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a source file once and print the outcome
    Render {
        file: PathBuf,
        /// Write the region HTML here
        #[arg(long)]
        out: Option<PathBuf>,
        /// Wrap the region in a standalone HTML page
        #[arg(long)]
        document: bool,
    },
    /// Replay a source file as a token stream, printing each state change
    Stream {
        file: PathBuf,
        #[arg(long, default_value_t = 16)]
        chunk_size: usize,
        /// Render after this many chunks
        #[arg(long, default_value_t = 8)]
        render_every: usize,
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
    },
    /// Render, then dispatch events and advance timers
    Interact {
        file: PathBuf,
        /// `event:handler[=value]`, e.g. `click:h0` or `change:h2=hello`
        #[arg(long = "dispatch")]
        dispatches: Vec<String>,
        /// Advance the preview clock after the dispatches
        #[arg(long)]
        advance_ms: Option<u64>,
    },
}

fn init_logging() {
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "", "preview-sandbox") {
        let log_dir = proj_dirs.data_dir().join("logs");
        let _ = std::fs::create_dir_all(&log_dir);

        let log_path = log_dir.join("preview-sandbox.log");

        let file = match std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&log_path)
        {
            Ok(file) => file,
            Err(e) => {
                eprintln!("Failed to open log file {:?}: {}", log_path, e);
                return;
            }
        };

        // Owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = file.metadata() {
                let mut perms = metadata.permissions();
                perms.set_mode(0o600);
                if let Err(e) = std::fs::set_permissions(&log_path, perms) {
                    eprintln!("[SECURITY] Failed to set log file permissions: {}", e);
                }
            }
        }

        // RUST_LOG replaces the default filter entirely
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("preview_sandbox=info,v8=warn"));

        let subscriber = tracing_subscriber::registry().with(filter).with(
            tracing_subscriber::fmt::layer()
                .with_writer(move || file.try_clone().expect("Failed to clone file handle"))
                .with_ansi(false),
        );

        if tracing::subscriber::set_global_default(subscriber).is_err() {
            eprintln!("Tracing subscriber already set");
            return;
        }

        // Bridge log crate events to tracing; must follow the subscriber
        if let Err(e) = tracing_log::LogTracer::init() {
            eprintln!("Failed to initialize log-to-tracing bridge: {}", e);
        }

        tracing::info!("Logging initialized to: {:?}", log_path);
    }
}

fn setup_panic_handler() {
    // Writes to crash.log even when logging never came up
    std::panic::set_hook(Box::new(|panic_info| {
        let crash_msg = format!(
            "Preview sandbox crashed!\n\
             Panic occurred at: {}\n\
             Details: {}\n\
             Backtrace:\n{:?}\n",
            panic_info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_else(|| "unknown location".to_string()),
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| panic_info.payload().downcast_ref::<String>().map(|s| s.as_str()))
                .unwrap_or("unknown panic"),
            std::backtrace::Backtrace::force_capture()
        );

        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "", "preview-sandbox") {
            let log_dir = proj_dirs.data_dir().join("logs");
            let _ = std::fs::create_dir_all(&log_dir);
            let crash_log_path = log_dir.join("crash.log");

            if let Ok(mut file) = std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(&crash_log_path)
            {
                use std::io::Write;
                let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
                let _ = writeln!(file, "\n=== CRASH at {} ===\n{}", timestamp, crash_msg);
            }

            eprintln!("\n{}", crash_msg);
            eprintln!("Crash log written to: {:?}", crash_log_path);
        } else {
            eprintln!("\n{}", crash_msg);
        }
    }));
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_outcome(outcome: &RenderOutcome) {
    match outcome {
        RenderOutcome::Empty => println!("empty"),
        RenderOutcome::Displayed => println!("displayed"),
        RenderOutcome::Errored(err) => println!("errored ({}): {}", err.kind(), err),
    }
}

fn print_handlers(sandbox: &PreviewSandbox) {
    let handlers: Vec<(String, String)> = sandbox
        .region()
        .view()
        .map(|nodes| nodes.iter().flat_map(VNode::handlers).collect())
        .unwrap_or_default();
    for (event, id) in handlers {
        println!("  {} -> {}", event, id);
    }
}

/// Parse `event:handler[=value]` into a handler id and payload
fn parse_dispatch(arg: &str) -> Result<(String, PreviewEvent)> {
    let (event, rest) = arg
        .split_once(':')
        .ok_or_else(|| anyhow!("Expected event:handler[=value], got '{}'", arg))?;
    let (handler, value) = match rest.split_once('=') {
        Some((handler, value)) => (handler, Some(value)),
        None => (rest, None),
    };
    if handler.is_empty() {
        return Err(anyhow!("Missing handler id in '{}'", arg));
    }

    let mut payload = PreviewEvent::new();
    match (event, value) {
        ("keydown" | "keyup" | "keypress", Some(key)) => payload = payload.with_key(key),
        (_, Some("true")) if event == "check" => payload = payload.with_checked(true),
        (_, Some("false")) if event == "check" => payload = payload.with_checked(false),
        (_, Some(value)) => payload = payload.with_value(value),
        (_, None) => {}
    }
    Ok((handler.to_string(), payload))
}

fn run(cli: Cli) -> Result<()> {
    let config = PreviewConfig::load_or_default(cli.config.as_deref())?;
    ensure_v8_platform()?;

    match cli.command {
        Command::Render { file, out, document } => {
            let text = read_source(&file)?;
            let doc = SourceDocument::from_text(text);
            let mut sandbox = config.build_sandbox();
            let outcome = sandbox.render(doc.renderable_text());
            print_outcome(&outcome);

            let html = if document {
                sandbox.region().document(&config.document_style())
            } else {
                sandbox.region().to_html()
            };
            match out {
                Some(path) => {
                    std::fs::write(&path, html)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    preview_sandbox::log_info!("Preview written to {}", path.display());
                }
                None => println!("{}", html),
            }
        }
        Command::Stream {
            file,
            chunk_size,
            render_every,
            delay_ms,
        } => {
            let text = read_source(&file)?;
            let mut source = StringChunkSource::new(&text, chunk_size);
            if delay_ms > 0 {
                source = source.with_delay(Duration::from_millis(delay_ms));
            }
            let mut session = PreviewSession::new(config.build_sandbox());
            let outcome = session.drive(&mut source, render_every);
            for transition in session.transitions() {
                println!("{}", transition);
            }
            println!("renders: {}", session.render_count());
            print_outcome(&outcome);
        }
        Command::Interact {
            file,
            dispatches,
            advance_ms,
        } => {
            let text = read_source(&file)?;
            let doc = SourceDocument::from_text(text);
            let mut sandbox = config.build_sandbox();
            print_outcome(&sandbox.render(doc.renderable_text()));
            print_handlers(&sandbox);

            for arg in &dispatches {
                let (handler, event) = parse_dispatch(arg)?;
                let outcome = sandbox.dispatch(&handler, &event);
                print!("{} -> ", arg);
                print_outcome(&outcome);
            }
            if let Some(ms) = advance_ms {
                let outcome = sandbox.advance_timers(Duration::from_millis(ms));
                print!("advance {}ms -> ", ms);
                print_outcome(&outcome);
            }
            println!("{}", sandbox.region().to_html());
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // Before anything else, so early crashes are recorded
    setup_panic_handler();
    init_logging();

    let cli = Cli::parse();
    tracing::info!("preview-sandbox {} starting", LONG_VERSION);

    let result = run(cli);
    if let Err(e) = &result {
        preview_sandbox::log_error!("preview-sandbox failed: {:#}", e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dispatch_forms() {
        let (id, event) = parse_dispatch("click:h0").unwrap();
        assert_eq!(id, "h0");
        assert_eq!(event, PreviewEvent::new());

        let (id, event) = parse_dispatch("change:h2=hello").unwrap();
        assert_eq!(id, "h2");
        assert_eq!(event, PreviewEvent::new().with_value("hello"));

        let (_, event) = parse_dispatch("keydown:h1=Enter").unwrap();
        assert_eq!(event, PreviewEvent::new().with_key("Enter"));

        let (_, event) = parse_dispatch("check:h3=true").unwrap();
        assert_eq!(event, PreviewEvent::new().with_checked(true));
    }

    #[test]
    fn test_parse_dispatch_rejects_malformed() {
        assert!(parse_dispatch("click").is_err());
        assert!(parse_dispatch("click:").is_err());
    }
}
