use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Project-relative location of the optional preferences file.
const FILENAME: &str = ".claude/research-hooks.toml";

/// Overrides `state_root` from the environment.
pub const STATE_DIR_ENV: &str = "RESEARCH_HOOKS_STATE_DIR";

const DEFAULT_DATA_EXTENSIONS: &[&str] =
    &["csv", "rds", "dta", "xlsx", "xls", "tsv", "sav", "parquet"];

/// Per-project settings stored in `.claude/research-hooks.toml`.
///
/// Every key is optional; a missing file means "all defaults". Paths are
/// relative to the project directory unless noted.
///
/// ```toml
/// log_threshold = 20
/// script_suffixes = [".R"]
/// resume_template = "/code-dataset {{ concept }} --from {{ step }}"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Progress-tracking JSON summarized at session start.
    pub progress_file: PathBuf,

    /// Briefing re-injected after context compaction.
    pub briefing_file: PathBuf,

    /// Directory of dated markdown session logs.
    pub session_log_dir: PathBuf,

    /// Directory holding per-script review reports.
    pub review_report_dir: PathBuf,

    /// Appended to a script's stem to name its review report.
    pub review_report_suffix: String,

    /// Stop attempts without a log update before the reminder blocks.
    pub log_threshold: u32,

    /// File name endings that identify script files for the
    /// mass-production guard (case-sensitive).
    pub script_suffixes: Vec<String>,

    /// File name endings of scripts that need a review report
    /// (case-sensitive).
    pub review_suffixes: Vec<String>,

    /// Extensions (without the dot, case-insensitive) that count as data.
    pub data_extensions: Vec<String>,

    /// Substrings of a shell command that mean "a script was executed".
    pub runner_tokens: Vec<String>,

    /// Jinja2 template for the resume hint; receives `concept` and `step`.
    pub resume_template: String,

    /// Command the review reminder tells the assistant to run.
    pub review_command: String,

    /// Root for per-hook state directories. Absolute; defaults to the
    /// system temp dir.
    pub state_root: Option<PathBuf>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            progress_file: "Replication/data/coded/coding_progress.json".into(),
            briefing_file: "Replication/data/coded/.context/batch_briefing.md".into(),
            session_log_dir: "quality_reports/session_logs".into(),
            review_report_dir: "quality_reports".into(),
            review_report_suffix: "_r_review.md".into(),
            log_threshold: 15,
            script_suffixes: vec![".R".into(), ".r".into()],
            review_suffixes: vec![".R".into()],
            data_extensions: DEFAULT_DATA_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            runner_tokens: vec!["Rscript".into(), "rscript".into()],
            resume_template: "/create-dataset {{ concept }} --resume {{ step }}".into(),
            review_command: "/review-r".into(),
            state_root: None,
        }
    }
}

impl Preferences {
    /// Load preferences for the project at `project_dir`.
    ///
    /// Unlike hook state, the file is never created here; hooks run in the
    /// user's tree and must not leave files behind. Missing keys are filled
    /// in with defaults via serde.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(FILENAME);
        let mut prefs = match fs::read_to_string(&path) {
            Ok(contents) => toml::from_str::<Preferences>(&contents)
                .with_context(|| format!("parsing {}", path.display()))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Preferences::default(),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        if let Some(dir) = env::var_os(STATE_DIR_ENV).filter(|v| !v.is_empty()) {
            prefs.state_root = Some(PathBuf::from(dir));
        }
        Ok(prefs)
    }

    pub fn state_root(&self) -> PathBuf {
        self.state_root.clone().unwrap_or_else(env::temp_dir)
    }

    pub fn is_script(&self, file_path: &str) -> bool {
        self.script_suffixes.iter().any(|s| file_path.ends_with(s.as_str()))
    }

    pub fn is_data_file(&self, file_path: &str) -> bool {
        Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.data_extensions
                    .iter()
                    .any(|d| d.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
    }

    pub fn is_reviewable(&self, file_path: &str) -> bool {
        self.review_suffixes.iter().any(|s| file_path.ends_with(s.as_str()))
    }

    pub fn is_script_run(&self, command: &str) -> bool {
        self.runner_tokens.iter().any(|t| command.contains(t.as_str()))
    }
}
