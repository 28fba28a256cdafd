use crate::state::{GuardState, LogReminderState, ReviewState};
use std::collections::BTreeSet;

// ===================================================================
// Outcomes shared by all three state machines
// ===================================================================

/// Result of one state-machine step: the state to persist (if any) and
/// what the hook should say.
#[derive(Debug, PartialEq)]
pub struct Step<S, O> {
    /// `None` leaves the state file untouched.
    pub save: Option<S>,
    pub outcome: O,
}

impl<S, O> Step<S, O> {
    fn persist(state: S, outcome: O) -> Self {
        Self { save: Some(state), outcome }
    }

    fn untouched(outcome: O) -> Self {
        Self { save: None, outcome }
    }
}

/// Outcome of a stop hook.
#[derive(Debug, PartialEq, Eq)]
pub enum StopOutcome {
    Allow,
    Block(String),
}

// ===================================================================
// Session log reminder
// ===================================================================

/// The most recently modified session log.
#[derive(Debug, Clone)]
pub struct LogSnapshot {
    pub file_name: String,
    /// Nanoseconds since the epoch.
    pub mtime: u64,
}

pub struct LogReminderContext<'a> {
    pub latest_log: Option<LogSnapshot>,
    /// Local date, `YYYY-MM-DD`.
    pub today: &'a str,
    /// Log directory as shown to the assistant.
    pub log_dir: &'a str,
    pub threshold: u32,
}

pub fn decide_log_reminder(
    mut state: LogReminderState,
    ctx: &LogReminderContext,
) -> Step<LogReminderState, StopOutcome> {
    let Some(log) = &ctx.latest_log else {
        if state.no_log_reminded {
            return Step::untouched(StopOutcome::Allow);
        }
        state.no_log_reminded = true;
        return Step::persist(
            state,
            StopOutcome::Block(format!(
                "No session log exists yet. Create one at {}/{}_description.md \
                 before continuing. Include the current goal and key context.",
                ctx.log_dir, ctx.today
            )),
        );
    };

    if log.mtime != state.last_mtime {
        let fresh = LogReminderState {
            last_mtime: log.mtime,
            ..Default::default()
        };
        return Step::persist(fresh, StopOutcome::Allow);
    }

    state.counter = state.counter.saturating_add(1);
    if state.counter >= ctx.threshold && !state.reminded {
        state.reminded = true;
        let reason = format!(
            "SESSION LOG REMINDER: {} responses without updating the session log. \
             Append your recent progress to {}.",
            state.counter, log.file_name
        );
        return Step::persist(state, StopOutcome::Block(reason));
    }
    Step::persist(state, StopOutcome::Allow)
}

// ===================================================================
// Review reminder
// ===================================================================

pub fn decide_review(
    state: ReviewState,
    unreviewed: BTreeSet<String>,
    review_command: &str,
) -> Step<ReviewState, StopOutcome> {
    if unreviewed.is_empty() {
        return Step::untouched(StopOutcome::Allow);
    }

    let previous: BTreeSet<&str> = state.unreviewed_files.iter().map(String::as_str).collect();
    let current: BTreeSet<&str> = unreviewed.iter().map(String::as_str).collect();
    if state.reminded && previous == current {
        return Step::untouched(StopOutcome::Allow);
    }

    let files: Vec<String> = unreviewed.into_iter().collect();
    let reason = format!(
        "R-REVIEWER REMINDER: {} R file(s) were modified without review: {}. \
         Run {review_command} on these files before finishing, or use the \
         r-reviewer agent directly.",
        files.len(),
        files.join(", ")
    );
    Step::persist(
        ReviewState {
            reminded: true,
            unreviewed_files: files,
        },
        StopOutcome::Block(reason),
    )
}

// ===================================================================
// Mass-production guard
// ===================================================================

/// A tool call as seen by the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardEvent {
    /// A data file was read.
    DataRead,
    /// A shell command ran a script.
    ScriptRun,
    /// A script file was written or edited.
    ScriptWrite(String),
    Ignored,
}

#[derive(Debug, PartialEq, Eq)]
pub enum GuardOutcome {
    Quiet,
    Warn(String),
}

/// Pair key recorded in `warned_for`.
pub fn pair_key(previous: &str, current: &str) -> String {
    format!("{previous}→{current}")
}

fn file_name(path: &str) -> &str {
    std::path::Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

pub fn decide_guard(
    mut state: GuardState,
    event: GuardEvent,
    now: f64,
) -> Step<GuardState, GuardOutcome> {
    let current = match event {
        GuardEvent::Ignored => return Step::untouched(GuardOutcome::Quiet),
        GuardEvent::DataRead | GuardEvent::ScriptRun => {
            state.last_script_write = None;
            state.last_write_time = 0.0;
            return Step::persist(state, GuardOutcome::Quiet);
        }
        GuardEvent::ScriptWrite(path) => path,
    };

    let previous = state.last_script_write.take();
    state.last_write_time = now;

    match previous {
        Some(prev) if prev != current => {
            let key = pair_key(&prev, &current);
            let already_warned = state.warned_for.as_deref() == Some(key.as_str());
            state.last_script_write = Some(current.clone());
            if already_warned {
                return Step::persist(state, GuardOutcome::Quiet);
            }
            state.warned_for = Some(key);
            let warning = format!(
                "R MASS-PRODUCTION WARNING: You just wrote {} right after {} without \
                 reading any input data or running scripts in between. Per \
                 r-code-conventions.md Section 0: each R script needs individual \
                 analytical attention. Before continuing, read the actual input data \
                 this script will process, or review the output of the previous script.",
                file_name(&current),
                file_name(&prev)
            );
            Step::persist(state, GuardOutcome::Warn(warning))
        }
        _ => {
            state.last_script_write = Some(current);
            state.warned_for = None;
            Step::persist(state, GuardOutcome::Quiet)
        }
    }
}
