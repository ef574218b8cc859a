//! LLM advisory client and parser.
//!
//! The advisory service answers free-text questions about the flight with a
//! server-sent-event stream. The assembled text may embed actionable
//! commands (a `COMMANDS_JSON:` array or bare command lines) and
//! display-only `RECOMMEND:` lines; everything actionable is filtered
//! through the normal command vocabulary, so an advisory can never name an
//! event the bridge does not know.
//!
//! Requests are rate limited to one per 30 s and cancel-on-new-request: a
//! fresh question aborts the stream still in flight.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use futures_util::StreamExt;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::{Command, CommandFamily, CommandKind};

/// Minimum interval between advisory requests.
pub const ADVISORY_RATE_LIMIT: Duration = Duration::from_secs(30);

/// Marker introducing an embedded JSON command array.
const COMMANDS_JSON_MARKER: &str = "COMMANDS_JSON:";

/// Marker introducing a display-only recommendation.
const RECOMMEND_MARKER: &str = "RECOMMEND:";

/// Errors from the advisory client.
#[derive(Debug, Error)]
pub enum AdvisoryError {
    /// Transport-level failure.
    #[error("advisory request failed: {0}")]
    Request(String),

    /// A newer request superseded this one.
    #[error("advisory request superseded")]
    Superseded,

    /// The 30 s rate limit has not elapsed.
    #[error("advisory rate limited, retry in {remaining_secs}s")]
    RateLimited {
        /// Seconds until the next request is allowed.
        remaining_secs: u64,
    },
}

/// A parsed advisory ready for the UI callback.
#[derive(Debug, Clone, Default)]
pub struct Advisory {
    /// Full advisory text.
    pub text: String,
    /// Actionable commands extracted from the text.
    pub commands: Vec<Command>,
    /// Display-only recommendations.
    pub recommendations: Vec<String>,
    /// Whether this advisory reports a failure.
    pub error: bool,
}

impl Advisory {
    /// The advisory delivered when a request fails.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            text: message.into(),
            commands: Vec::new(),
            recommendations: Vec::new(),
            error: true,
        }
    }
}

/// One `data:` payload of the advisory stream.
#[derive(Debug, Deserialize)]
struct SsePayload {
    #[serde(default)]
    chunk: String,
    #[serde(default)]
    done: bool,
}

/// Concatenate the `chunk` fields of an SSE body into the advisory text.
///
/// Unparseable `data:` lines are skipped; the stream ends at a payload with
/// `done: true` or at end of input.
pub fn assemble_sse_text(body: &str) -> String {
    let mut text = String::new();
    for line in body.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        match serde_json::from_str::<SsePayload>(data.trim()) {
            Ok(payload) => {
                text.push_str(&payload.chunk);
                if payload.done {
                    break;
                }
            }
            Err(e) => debug!(error = %e, "Skipping malformed SSE payload"),
        }
    }
    text
}

/// Wire form of one entry in a `COMMANDS_JSON` array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonCommand {
    Named {
        command: String,
        #[serde(default)]
        value: Option<serde_json::Value>,
    },
    Bare(String),
}

/// Get the bare-command-line regex.
///
/// Matches a known AP/heading/toggle event name, optionally followed by a
/// numeric argument or ON/OFF.
fn command_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(AP_|HEADING_|TOGGLE_|YAW_)[A-Z0-9_]+(\s+(\d+|ON|OFF))?$").unwrap()
    })
}

/// Extract actionable commands and recommendations from advisory text.
pub fn parse_advisory_text(text: &str) -> (Vec<Command>, Vec<String>) {
    let mut commands = Vec::new();
    let mut recommendations = Vec::new();

    let line_re = command_line_pattern();

    for line in text.lines() {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix(COMMANDS_JSON_MARKER) {
            commands.extend(parse_commands_json(rest.trim()));
            continue;
        }

        if let Some(rest) = line.strip_prefix(RECOMMEND_MARKER) {
            recommendations.push(rest.trim().to_string());
            continue;
        }

        if line_re.is_match(line) {
            let mut parts = line.split_whitespace();
            let name = parts.next().unwrap_or_default();
            let arg = parts.next();
            if let Some(cmd) = command_from_parts(name, arg) {
                commands.push(cmd);
            }
        }
    }

    (commands, recommendations)
}

fn parse_commands_json(json: &str) -> Vec<Command> {
    let entries: Vec<JsonCommand> = match serde_json::from_str(json) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed COMMANDS_JSON advisory");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| match entry {
            JsonCommand::Named { command, value } => {
                let arg = value.as_ref().and_then(value_to_arg);
                command_from_parts(&command, arg.as_deref())
            }
            JsonCommand::Bare(name) => command_from_parts(&name, None),
        })
        .collect()
}

fn value_to_arg(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(true) => Some("ON".to_string()),
        serde_json::Value::Bool(false) => Some("OFF".to_string()),
        serde_json::Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Build a whitelisted command from an advisory name and optional argument.
fn command_from_parts(name: &str, arg: Option<&str>) -> Option<Command> {
    let kind = CommandKind::from_api_name(name)?;

    match kind.family() {
        CommandFamily::Toggle => {
            let engage = !matches!(arg, Some("OFF") | Some("off"));
            Some(Command::toggle(kind, engage, "advisory"))
        }
        CommandFamily::SetValue => {
            let value: f64 = arg?.parse().ok()?;
            Some(Command::set_value(kind, value, "advisory"))
        }
        // Advisories never drive raw axes
        CommandFamily::Axis => None,
    }
}

/// HTTP + SSE advisory client.
pub struct AdvisoryClient {
    client: reqwest::Client,
    base_url: String,
    last_request: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl AdvisoryClient {
    /// Create a client against the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            last_request: None,
            cancel: None,
        }
    }

    /// Whether the rate limit allows a request now.
    pub fn can_request_at(&self, now: Instant) -> bool {
        match self.last_request {
            Some(last) => now.duration_since(last) >= ADVISORY_RATE_LIMIT,
            None => true,
        }
    }

    /// Abort any in-flight request.
    pub fn abort(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }

    /// Ask the advisory service a question.
    ///
    /// Supersedes any request still streaming. The returned advisory has
    /// its commands and recommendations already parsed.
    pub async fn request(&mut self, message: &str) -> Result<Advisory, AdvisoryError> {
        let now = Instant::now();
        if !self.can_request_at(now) {
            let elapsed = self.last_request.map(|l| now.duration_since(l)).unwrap_or_default();
            return Err(AdvisoryError::RateLimited {
                remaining_secs: ADVISORY_RATE_LIMIT.saturating_sub(elapsed).as_secs(),
            });
        }
        self.last_request = Some(now);

        self.abort();
        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        let url = format!("{}/advisory", self.base_url.trim_end_matches('/'));
        let response = tokio::select! {
            result = self
                .client
                .post(&url)
                .json(&serde_json::json!({ "message": message }))
                .send() => result.map_err(|e| AdvisoryError::Request(e.to_string()))?,
            _ = cancel.cancelled() => return Err(AdvisoryError::Superseded),
        };

        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        loop {
            tokio::select! {
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => body.extend_from_slice(&bytes),
                    Some(Err(e)) => return Err(AdvisoryError::Request(e.to_string())),
                    None => break,
                },
                _ = cancel.cancelled() => return Err(AdvisoryError::Superseded),
            }
        }

        let text = assemble_sse_text(&String::from_utf8_lossy(&body));
        let (commands, recommendations) = parse_advisory_text(&text);

        Ok(Advisory {
            text,
            commands,
            recommendations,
            error: false,
        })
    }
}

impl std::fmt::Debug for AdvisoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvisoryClient")
            .field("base_url", &self.base_url)
            .field("in_flight", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandValue;

    #[test]
    fn test_assemble_sse_concatenates_chunks() {
        let body = "data: {\"chunk\": \"Reduce \"}\n\
                    data: {\"chunk\": \"power and \"}\n\
                    data: {\"chunk\": \"descend.\", \"done\": true}\n";
        assert_eq!(assemble_sse_text(body), "Reduce power and descend.");
    }

    #[test]
    fn test_assemble_sse_stops_at_done() {
        let body = "data: {\"chunk\": \"before\", \"done\": true}\n\
                    data: {\"chunk\": \" after\"}\n";
        assert_eq!(assemble_sse_text(body), "before");
    }

    #[test]
    fn test_assemble_sse_skips_garbage() {
        let body = ": keepalive\n\
                    data: not json\n\
                    data: {\"chunk\": \"ok\"}\n";
        assert_eq!(assemble_sse_text(body), "ok");
    }

    #[test]
    fn test_parse_command_lines() {
        let text = "You should level off.\n\
                    AP_ALT_VAR_SET 4500\n\
                    AP_MASTER ON\n\
                    YAW_DAMPER_TOGGLE\n\
                    AP_HDG_HOLD OFF";
        let (commands, recs) = parse_advisory_text(text);

        assert_eq!(commands.len(), 4);
        assert_eq!(commands[0].kind, CommandKind::ApAltVarSet);
        assert_eq!(commands[0].value, CommandValue::Number(4500.0));
        assert_eq!(commands[1].kind, CommandKind::ApMaster);
        assert_eq!(commands[1].value, CommandValue::Bool(true));
        assert_eq!(commands[2].kind, CommandKind::YawDamperToggle);
        assert_eq!(commands[3].value, CommandValue::Bool(false));
        assert!(recs.is_empty());
    }

    #[test]
    fn test_parse_commands_json_block() {
        let text = r#"Suggested plan below.
COMMANDS_JSON: [{"command": "AP_ALT_VAR_SET", "value": 6500}, "AP_MASTER", {"command": "AP_VS_VAR_SET", "value": -500}]"#;
        let (commands, _) = parse_advisory_text(text);

        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0].kind, CommandKind::ApAltVarSet);
        assert_eq!(commands[0].value, CommandValue::Number(6500.0));
        assert_eq!(commands[1].kind, CommandKind::ApMaster);
        assert_eq!(commands[2].value, CommandValue::Number(-500.0));
    }

    #[test]
    fn test_parse_recommendations() {
        let text = "RECOMMEND: extend downwind for spacing\n\
                    RECOMMEND: check carb heat";
        let (commands, recs) = parse_advisory_text(text);
        assert!(commands.is_empty());
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0], "extend downwind for spacing");
    }

    #[test]
    fn test_unknown_and_axis_commands_filtered() {
        let text = "AP_SELF_DESTRUCT ON\n\
                    AXIS_ELEVATOR_SET 50\n\
                    HEADING_BUG_SET 270";
        let (commands, _) = parse_advisory_text(text);

        // Only the heading bug survives: unknown names and raw axes drop
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].kind, CommandKind::HeadingBugSet);
        assert_eq!(commands[0].value, CommandValue::Number(270.0));
    }

    #[test]
    fn test_prose_lines_are_not_commands() {
        let text = "AP usage is recommended here.\n\
                    Try heading 270 instead.";
        let (commands, recs) = parse_advisory_text(text);
        assert!(commands.is_empty());
        assert!(recs.is_empty());
    }

    #[test]
    fn test_failure_advisory_shape() {
        let advisory = Advisory::failure("service unreachable");
        assert!(advisory.error);
        assert!(advisory.commands.is_empty());
        assert_eq!(advisory.text, "service unreachable");
    }

    #[test]
    fn test_rate_limit_accounting() {
        let mut client = AdvisoryClient::new("http://localhost:9000");
        let t0 = Instant::now();
        assert!(client.can_request_at(t0));

        client.last_request = Some(t0);
        assert!(!client.can_request_at(t0 + Duration::from_secs(10)));
        assert!(client.can_request_at(t0 + Duration::from_secs(31)));
    }
}
