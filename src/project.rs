use anyhow::{Context, Result};
use crate::decision::{
    self, GuardEvent, GuardOutcome, LogReminderContext, LogSnapshot, StopOutcome,
};
use crate::preferences::Preferences;
use crate::progress::{self, ProgressRecord};
use crate::state::{GuardState, LogReminderState, ReviewState, StateStore};
use crate::types::{Emit, HookOutput, HookPayload, ToolCall};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const LOG_REMINDER_DIR: &str = "claude-log-reminder";
const REVIEW_REMINDER_DIR: &str = "claude-r-review-reminder";
const GUARD_DIR: &str = "claude-r-mass-production-guard";

/// Read a text file, returning `None` if it doesn't exist.
fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

fn mtime(path: &Path) -> Result<SystemTime> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("reading mtime of {}", path.display()))
}

fn nanos_since_epoch(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn stop_output(outcome: StopOutcome) -> Option<Emit> {
    match outcome {
        StopOutcome::Allow => None,
        StopOutcome::Block(reason) => Some(Emit::Json(HookOutput::block(reason))),
    }
}

pub struct Project {
    dir: PathBuf,
    /// `cwd` exactly as the host sent it; state files are keyed on this.
    key_source: String,
    pub prefs: Preferences,
}

impl Project {
    /// Resolve the project from the payload's `cwd` and load preferences.
    /// Returns `None` when the payload carries no directory.
    pub fn open(payload: &HookPayload) -> Result<Option<Self>> {
        if payload.cwd.is_empty() {
            return Ok(None);
        }
        let dir = PathBuf::from(&payload.cwd);
        let prefs = Preferences::load(&dir)?;
        Ok(Some(Self {
            dir,
            key_source: payload.cwd.clone(),
            prefs,
        }))
    }

    fn store(&self, hook_dir: &str) -> StateStore {
        let store = StateStore::new(&self.prefs.state_root(), hook_dir, &self.key_source);
        tracing::debug!(path = %store.path().display(), "using state file");
        store
    }

    // ---------------------------------------------------------------
    // Session context loader
    // ---------------------------------------------------------------

    fn read_progress(&self) -> Option<ProgressRecord> {
        let path = self.dir.join(&self.prefs.progress_file);
        let raw = match read_optional(&path) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                tracing::debug!("ignoring progress file: {err:#}");
                return None;
            }
        };
        match ProgressRecord::parse(&raw) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::debug!("ignoring progress file {}: {err:#}", path.display());
                None
            }
        }
    }

    /// The saved batch briefing, trimmed; `None` if missing or blank.
    fn read_briefing(&self) -> Option<String> {
        let path = self.dir.join(&self.prefs.briefing_file);
        match read_optional(&path) {
            Ok(text) => text
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            Err(err) => {
                tracing::debug!("ignoring briefing: {err:#}");
                None
            }
        }
    }

    pub fn handle_context(&self, post_compact: bool) -> Result<Option<Emit>> {
        let Some(record) = self.read_progress() else {
            return Ok(None);
        };
        if !record.is_coding_project() {
            return Ok(None);
        }
        let recovered = if post_compact { self.read_briefing() } else { None };
        let text = progress::briefing(&record, &self.prefs.resume_template, recovered.as_deref())?;
        Ok(Some(Emit::Text(text)))
    }

    // ---------------------------------------------------------------
    // Session log reminder
    // ---------------------------------------------------------------

    /// The most recently modified `*.md` file directly inside the log dir.
    fn latest_log(&self) -> Result<Option<LogSnapshot>> {
        let log_dir = self.dir.join(&self.prefs.session_log_dir);
        let entries = match fs::read_dir(&log_dir) {
            Ok(entries) => entries,
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
                return Ok(None);
            }
            Err(e) => return Err(e).with_context(|| format!("listing {}", log_dir.display())),
        };

        let mut latest: Option<(SystemTime, PathBuf)> = None;
        for entry in entries {
            let path = entry
                .with_context(|| format!("listing {}", log_dir.display()))?
                .path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let modified = mtime(&path)?;
            if latest.as_ref().is_none_or(|(t, _)| modified > *t) {
                latest = Some((modified, path));
            }
        }

        Ok(latest.map(|(modified, path)| LogSnapshot {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            mtime: nanos_since_epoch(modified),
        }))
    }

    pub fn handle_log_reminder(&self, payload: &HookPayload) -> Result<Option<Emit>> {
        if payload.stop_hook_active {
            return Ok(None);
        }
        let store = self.store(LOG_REMINDER_DIR);
        let state: LogReminderState = store.load();
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        let log_dir = self.prefs.session_log_dir.to_string_lossy();
        let ctx = LogReminderContext {
            latest_log: self.latest_log()?,
            today: &today,
            log_dir: &log_dir,
            threshold: self.prefs.log_threshold,
        };

        let step = decision::decide_log_reminder(state, &ctx);
        if let Some(next) = &step.save {
            store.save(next)?;
        }
        Ok(stop_output(step.outcome))
    }

    // ---------------------------------------------------------------
    // Review reminder
    // ---------------------------------------------------------------

    /// Script files that differ from HEAD or are untracked, as
    /// repository-relative paths, plus the repository's working directory.
    /// Any git failure is an empty result.
    fn modified_scripts(&self) -> (BTreeSet<String>, PathBuf) {
        match self.git_changed_paths() {
            Ok((paths, workdir)) => (
                paths.into_iter().filter(|p| self.prefs.is_reviewable(p)).collect(),
                workdir,
            ),
            Err(err) => {
                tracing::debug!("no version-control changes: {err:#}");
                (BTreeSet::new(), self.dir.clone())
            }
        }
    }

    fn git_changed_paths(&self) -> Result<(Vec<String>, PathBuf)> {
        let repo = git2::Repository::discover(&self.dir)
            .with_context(|| format!("finding git repo from {}", self.dir.display()))?;
        let workdir = repo
            .workdir()
            .context("git repo is bare, no working directory")?
            .to_path_buf();
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = repo.statuses(Some(&mut opts)).context("checking git status")?;
        let paths = statuses
            .iter()
            .filter(|s| !s.status().is_ignored())
            .filter_map(|s| s.path().map(String::from))
            .collect();
        Ok((paths, workdir))
    }

    fn report_path(&self, script: &str) -> PathBuf {
        let stem = Path::new(script)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.dir
            .join(&self.prefs.review_report_dir)
            .join(format!("{stem}{}", self.prefs.review_report_suffix))
    }

    /// A script is unreviewed if its report is missing or older than it.
    fn is_unreviewed(&self, script: &str, workdir: &Path) -> Result<bool> {
        let report = self.report_path(script);
        if !report.exists() {
            return Ok(true);
        }
        let source = workdir.join(script);
        if !source.exists() {
            return Ok(false);
        }
        Ok(mtime(&source)? > mtime(&report)?)
    }

    pub fn handle_review_reminder(&self, payload: &HookPayload) -> Result<Option<Emit>> {
        if payload.stop_hook_active {
            return Ok(None);
        }
        let store = self.store(REVIEW_REMINDER_DIR);
        let state: ReviewState = store.load();

        let (scripts, workdir) = self.modified_scripts();
        if scripts.is_empty() {
            return Ok(None);
        }
        let mut unreviewed = BTreeSet::new();
        for script in scripts {
            if self.is_unreviewed(&script, &workdir)? {
                unreviewed.insert(script);
            }
        }

        let step = decision::decide_review(state, unreviewed, &self.prefs.review_command);
        if let Some(next) = &step.save {
            store.save(next)?;
        }
        Ok(stop_output(step.outcome))
    }

    // ---------------------------------------------------------------
    // Mass-production guard
    // ---------------------------------------------------------------

    fn guard_event(&self, call: ToolCall) -> GuardEvent {
        match call {
            ToolCall::Read { file_path } if self.prefs.is_data_file(&file_path) => {
                GuardEvent::DataRead
            }
            ToolCall::Bash { command } if self.prefs.is_script_run(&command) => {
                GuardEvent::ScriptRun
            }
            ToolCall::Write { file_path } | ToolCall::Edit { file_path }
                if self.prefs.is_script(&file_path) =>
            {
                GuardEvent::ScriptWrite(file_path)
            }
            _ => GuardEvent::Ignored,
        }
    }

    pub fn handle_mass_production_guard(&self, payload: &HookPayload) -> Result<Option<Emit>> {
        let event = self.guard_event(payload.tool_call());
        if event == GuardEvent::Ignored {
            return Ok(None);
        }
        let store = self.store(GUARD_DIR);
        let state: GuardState = store.load();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let step = decision::decide_guard(state, event, now);
        if let Some(next) = &step.save {
            store.save(next)?;
        }
        Ok(match step.outcome {
            GuardOutcome::Quiet => None,
            GuardOutcome::Warn(msg) => Some(Emit::Json(HookOutput::post_tool_context(msg))),
        })
    }
}
