use serde::{Deserialize, Serialize};

// ===================================================================
// Hook Input (received via stdin, snake_case JSON)
// ===================================================================

/// The subset of the hook payload these hooks look at.
///
/// Every field is optional on the wire. Hosts send more keys than this
/// (`session_id`, `transcript_path`, ...) and those are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookPayload {
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub stop_hook_active: bool,
    #[serde(default)]
    pub hook_event_name: Option<String>,
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: serde_json::Value,
}

impl HookPayload {
    /// Parse stdin leniently. Empty, malformed or non-object input yields
    /// the default payload rather than an error.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str(raw) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::debug!("treating unparsable hook input as empty: {err}");
                Self::default()
            }
        }
    }

    /// Parse `tool_name` + `tool_input` into a typed `ToolCall`.
    pub fn tool_call(&self) -> ToolCall {
        ToolCall::parse(&self.tool_name, &self.tool_input)
    }
}

// ===================================================================
// Tool-Specific Input Types
// ===================================================================

/// Parsed tool call, matching `tool_name` to the one field we need from
/// `tool_input`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    Read { file_path: String },
    Write { file_path: String },
    Edit { file_path: String },
    Bash { command: String },
    /// Any other tool, or a known tool whose input lacked the field.
    Other,
}

#[derive(Debug, Deserialize)]
struct FileToolInput {
    file_path: String,
}

#[derive(Debug, Deserialize)]
struct BashToolInput {
    command: String,
}

impl ToolCall {
    pub fn parse(tool_name: &str, tool_input: &serde_json::Value) -> Self {
        let file_path = || {
            serde_json::from_value::<FileToolInput>(tool_input.clone())
                .ok()
                .map(|i| i.file_path)
                .filter(|p| !p.is_empty())
        };
        match tool_name {
            "Read" => file_path().map_or(Self::Other, |file_path| Self::Read { file_path }),
            "Write" => file_path().map_or(Self::Other, |file_path| Self::Write { file_path }),
            "Edit" => file_path().map_or(Self::Other, |file_path| Self::Edit { file_path }),
            "Bash" => serde_json::from_value::<BashToolInput>(tool_input.clone())
                .map_or(Self::Other, |i| Self::Bash { command: i.command }),
            _ => Self::Other,
        }
    }
}

// ===================================================================
// Hook Output Types (written to stdout as JSON, camelCase)
// ===================================================================

/// Top-level hook output written to stdout.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HookOutput {
    /// Set to `"block"` to prevent the assistant from stopping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,

    /// Explanation shown to the assistant when `decision` is `"block"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Event-specific output fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<HookSpecificOutput>,
}

impl HookOutput {
    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            decision: Some("block".into()),
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Non-blocking note appended to the assistant's context after a tool call.
    pub fn post_tool_context(text: impl Into<String>) -> Self {
        Self {
            hook_specific_output: Some(HookSpecificOutput::PostToolUse(ContextOutput {
                additional_context: Some(text.into()),
            })),
            ..Default::default()
        }
    }
}

/// Event-specific output, tagged by `hookEventName`.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "hookEventName")]
pub enum HookSpecificOutput {
    PostToolUse(ContextOutput),
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContextOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
}

/// What a hook wants printed on stdout, if anything.
#[derive(Debug, PartialEq)]
pub enum Emit {
    /// Plain text injected into context verbatim.
    Text(String),
    Json(HookOutput),
}
