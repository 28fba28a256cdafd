//! The dataset-coding progress record and its session-start briefing.
//!
//! The record is owned by the coding workflow; this module only reads it.
//! Display-only fields are kept as raw JSON because the workflow writes
//! them as either strings or numbers.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Briefings longer than this many characters are cut down.
pub const MAX_CHARS: usize = 2000;
/// Characters kept when a briefing is cut.
pub const TRUNCATED_CHARS: usize = 1950;
pub const TRUNCATION_NOTICE: &str = "\n\n[... truncated for context budget]";

const DEFAULT_CHECK_INTERVAL: f64 = 10.0;

/// A JSON object read as-is. Presence of a section is decided by whether
/// the object has any keys, whatever their values.
type Section = Map<String, Value>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProgressRecord {
    pub project: Option<Section>,
    /// Legacy location of the concept name.
    pub concept: Value,
    pub batch_queue: Option<Section>,
    pub context_management: ContextManagement,
    pub calibration: Option<Section>,
    pub drift_monitoring: DriftMonitoring,
    /// Batch id to batch record; non-object entries are tolerated.
    pub batches: BTreeMap<String, Value>,
}

/// Typed view of the `project` section. Every field is raw JSON: the
/// workflow writes counts as integers or floats and steps as strings or
/// numbers.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProjectInfo {
    pub strategy: Value,
    pub majority_voting: Value,
    pub total_cells: Value,
    pub completed_cells: Value,
    pub current_step: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BatchQueue {
    pub current_variable: Value,
    pub current_region: Value,
    pub current_run: Value,
    pub next_batch_id: Value,
    pub batches_since_sentinel_check: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ContextManagement {
    pub batch_size_cells: Value,
    pub sessions_completed: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Calibration {
    pub status: Value,
    pub icc: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DriftMonitoring {
    pub check_interval_batches: Value,
    pub checks: Vec<DriftCheck>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DriftCheck {
    pub status: Value,
    pub exact_agreement: Value,
}

/// Counts of batches by status.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchTally {
    pub complete: usize,
    pub in_progress: usize,
    pub pending: usize,
}

/// Deserialize a section into its typed view. All view fields are
/// `Value`, so only a non-object section could fail, and sections are
/// already objects.
fn view<T: DeserializeOwned + Default>(section: Option<&Section>) -> T {
    section
        .and_then(|m| serde_json::from_value(Value::Object(m.clone())).ok())
        .unwrap_or_default()
}

fn non_empty(section: Option<&Section>) -> Option<&Section> {
    section.filter(|m| !m.is_empty())
}

impl ProgressRecord {
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("parsing progress record")
    }

    /// Whether this record describes a dataset-coding project at all.
    pub fn is_coding_project(&self) -> bool {
        non_empty(self.project.as_ref()).is_some() || is_truthy(&self.concept)
    }

    pub fn project_info(&self) -> ProjectInfo {
        view(self.project.as_ref())
    }

    pub fn concept(&self) -> String {
        let project = self.project.as_ref();
        match project.and_then(|p| p.get("concept")) {
            Some(concept) => display(concept),
            None if !self.concept.is_null() => display(&self.concept),
            None => "unknown".to_string(),
        }
    }

    pub fn batch_tally(&self) -> BatchTally {
        let mut tally = BatchTally::default();
        for batch in self.batches.values() {
            match batch.get("status").and_then(Value::as_str) {
                Some("complete") => tally.complete += 1,
                Some("in_progress") => tally.in_progress += 1,
                Some("pending") => tally.pending += 1,
                _ => {}
            }
        }
        tally
    }

    /// The batch tally line, or `None` when there are no batches.
    pub fn batch_status_line(&self) -> Option<String> {
        if self.batches.is_empty() {
            return None;
        }
        let t = self.batch_tally();
        Some(format!(
            "- Batches: {} complete, {} in progress, {} pending",
            t.complete, t.in_progress, t.pending
        ))
    }

    /// Render the progress summary. `resume_template` is a Jinja2 template
    /// receiving `concept` and `step`.
    pub fn summary(&self, resume_template: &str) -> Result<String> {
        let project = self.project_info();
        let concept = self.concept();
        let strategy = display_or_unknown(&project.strategy);
        let step = display_or_unknown(&project.current_step);
        let majority = is_truthy(&project.majority_voting);

        let mut lines = vec!["## Dataset Coding Progress".to_string()];
        lines.push(format!(
            "- Concept: {concept} | Strategy: {strategy} | Majority voting: {}",
            if majority { "ON" } else { "OFF" }
        ));

        let total = number(&project.total_cells);
        if total > 0.0 {
            let pct = number(&project.completed_cells) / total * 100.0;
            lines.push(format!(
                "- Progress: {} / {} cells ({pct:.1}%)",
                format_count(&project.completed_cells),
                format_count(&project.total_cells)
            ));
        }
        lines.push(format!("- Current step: {step}"));

        if let Some(queue) = non_empty(self.batch_queue.as_ref()) {
            self.push_queue_lines(&view(Some(queue)), majority, &mut lines);
        }

        let ctx = &self.context_management;
        if is_truthy(&ctx.batch_size_cells) {
            lines.push(format!(
                "- Batch size: {} cells | Sessions completed: {}",
                display(&ctx.batch_size_cells),
                display_or_zero(&ctx.sessions_completed)
            ));
        }

        if let Some(cal) = non_empty(self.calibration.as_ref()) {
            let cal: Calibration = view(Some(cal));
            if is_truthy(&cal.status) {
                let status = display(&cal.status);
                if is_truthy(&cal.icc) {
                    lines.push(format!("- Calibration: {status} (ICC: {})", display(&cal.icc)));
                } else {
                    lines.push(format!("- Calibration: {status}"));
                }
            }
        }

        if let Some(latest) = self.drift_monitoring.checks.last() {
            let status = if latest.status.is_null() {
                "UNKNOWN".to_string()
            } else {
                display(&latest.status)
            };
            if matches!(status.as_str(), "YELLOW" | "RED") {
                lines.push(format!(
                    "- **DRIFT ALERT: {status}** (sentinel agreement: {})",
                    display(&latest.exact_agreement)
                ));
            }
        }

        lines.push(format!(
            "- To continue: {}",
            render_resume(resume_template, &concept, &step)?
        ));
        Ok(lines.join("\n"))
    }

    fn push_queue_lines(&self, queue: &BatchQueue, majority: bool, lines: &mut Vec<String>) {
        if is_truthy(&queue.current_variable) {
            let region = if is_truthy(&queue.current_region) {
                format!(" -> {}", display(&queue.current_region))
            } else {
                String::new()
            };
            let run = if majority && is_truthy(&queue.current_run) {
                format!(" -> Run {} of 3", display(&queue.current_run))
            } else {
                String::new()
            };
            lines.push(format!(
                "- Current: {}{region}{run}",
                display(&queue.current_variable)
            ));
        }
        if is_truthy(&queue.next_batch_id) {
            lines.push(format!("- Next batch: {}", display(&queue.next_batch_id)));
        }
        let interval = match &self.drift_monitoring.check_interval_batches {
            Value::Null => DEFAULT_CHECK_INTERVAL,
            other => number(other),
        };
        if let Some(line) = sentinel_line(number(&queue.batches_since_sentinel_check), interval) {
            lines.push(line);
        }
    }
}

/// Urgency line for the next sentinel check, if one is close or overdue.
pub fn sentinel_line(batches_since_check: f64, interval: f64) -> Option<String> {
    if batches_since_check <= 0.0 {
        return None;
    }
    let remaining = interval - batches_since_check;
    if remaining <= 0.0 {
        Some(format!(
            "- Sentinel check: **OVERDUE** (due {} batches ago)",
            format_number(remaining.abs())
        ))
    } else if remaining <= 3.0 {
        Some(format!(
            "- Sentinel check: due in {} batches",
            format_number(remaining)
        ))
    } else {
        None
    }
}

fn render_resume(template: &str, concept: &str, step: &str) -> Result<String> {
    let env = Environment::new();
    let tmpl = env
        .template_from_str(template)
        .context("parsing resume template")?;
    tmpl.render(context! { concept, step })
        .context("rendering resume template")
}

/// Build the full briefing: summary, batch tally, and (after compaction)
/// the saved batch briefing.
pub fn briefing(
    record: &ProgressRecord,
    resume_template: &str,
    recovered: Option<&str>,
) -> Result<String> {
    let mut parts = vec![record.summary(resume_template)?];
    if let Some(line) = record.batch_status_line() {
        parts.push(line);
    }
    if let Some(text) = recovered {
        parts.extend(
            [
                "",
                "---",
                "",
                "## Batch Briefing (recovered after context compaction)",
                "",
                text,
            ]
            .map(String::from),
        );
    }
    Ok(truncate(&parts.join("\n")))
}

/// Cap a briefing at `MAX_CHARS` characters.
pub fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(TRUNCATED_CHARS).collect();
    cut.push_str(TRUNCATION_NOTICE);
    cut
}

/// Numeric value of a JSON field; anything non-numeric counts as zero.
fn number(v: &Value) -> f64 {
    v.as_f64().unwrap_or(0.0)
}

/// Whole numbers print without a fractional part.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// A count with thousands separators, keeping the fractional part of
/// counts written as floats (`1234.0` prints as `1,234.0`).
fn format_count(v: &Value) -> String {
    let raw = match v {
        Value::Number(n) => n.to_string(),
        other => display(other),
    };
    let (sign, rest) = match raw.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", raw.as_str()),
    };
    let (int, frac) = match rest.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (rest, None),
    };
    if !int.chars().all(|c| c.is_ascii_digit()) {
        return raw.clone();
    }
    let mut out = String::from(sign);
    out.push_str(&group_thousands(int));
    if let Some(frac) = frac {
        out.push('.');
        out.push_str(frac);
    }
    out
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn display(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn display_or_unknown(v: &Value) -> String {
    if v.is_null() { "unknown".to_string() } else { display(v) }
}

fn display_or_zero(v: &Value) -> String {
    if v.is_null() { "0".to_string() } else { display(v) }
}
