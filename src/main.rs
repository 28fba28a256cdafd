mod decision;
mod preferences;
mod progress;
mod project;
mod state;
mod types;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use project::Project;
use std::io::{self, Read, Write};
use std::panic;
use tracing_subscriber::EnvFilter;
use types::{Emit, HookPayload};

/// Filter directive for diagnostics on stderr, e.g. `RESEARCH_HOOKS_LOG=debug`.
const LOG_ENV: &str = "RESEARCH_HOOKS_LOG";

/// Lifecycle hooks for research projects driven by an AI coding assistant.
///
/// Each subcommand reads the hook payload as JSON on stdin and always
/// exits 0; internal failures are swallowed so a broken hook never stops
/// the assistant.
#[derive(Debug, Parser)]
#[command(name = "research-hooks", version, about)]
struct Cli {
    #[command(subcommand)]
    hook: Hook,
}

#[derive(Debug, Subcommand)]
enum Hook {
    /// SessionStart: print a progress briefing for dataset-coding projects.
    Context {
        /// Also re-inject the saved batch briefing lost to compaction.
        #[arg(long)]
        post_compact: bool,
    },
    /// Stop: block until the session log has been updated recently.
    LogReminder,
    /// Stop: block until modified scripts have fresh review reports.
    ReviewReminder,
    /// PostToolUse: warn when scripts are written back-to-back without
    /// looking at data.
    MassProductionGuard,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("off"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("reading hook input")?;
    Ok(buffer)
}

fn run(hook: &Hook) -> Result<Option<Emit>> {
    let raw = read_stdin().unwrap_or_else(|err| {
        tracing::debug!("{err:#}");
        String::new()
    });
    let payload = HookPayload::parse(&raw);
    tracing::debug!(?hook, event = ?payload.hook_event_name, cwd = %payload.cwd, "hook invoked");

    let Some(project) = Project::open(&payload)? else {
        return Ok(None);
    };
    match hook {
        Hook::Context { post_compact } => project.handle_context(*post_compact),
        Hook::LogReminder => project.handle_log_reminder(&payload),
        Hook::ReviewReminder => project.handle_review_reminder(&payload),
        Hook::MassProductionGuard => project.handle_mass_production_guard(&payload),
    }
}

fn render(emit: &Emit) -> Result<String> {
    match emit {
        Emit::Text(text) => Ok(text.clone()),
        Emit::Json(output) => serde_json::to_string(output).context("serializing hook output"),
    }
}

fn main() {
    init_logging();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        // A mismatched hook registration must not break the session.
        Err(err) => {
            tracing::debug!("ignoring arguments: {err}");
            return;
        }
    };
    panic::set_hook(Box::new(|info| tracing::debug!("hook panicked: {info}")));

    let result = panic::catch_unwind(|| {
        run(&cli.hook).and_then(|emit| emit.as_ref().map(render).transpose())
    });

    // Fail open: whatever went wrong, the host sees a silent success.
    match result {
        Ok(Ok(Some(text))) => {
            let _ = writeln!(io::stdout(), "{text}");
        }
        Ok(Ok(None)) => {}
        Ok(Err(err)) => tracing::debug!("hook failed: {err:#}"),
        Err(_) => {}
    }
}
