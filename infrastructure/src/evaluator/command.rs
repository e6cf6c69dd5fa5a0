//! Subprocess policy evaluator.
//!
//! Runs the configured command once per evaluation. The command reads
//!
//! ```json
//! {"policy": "<policy source>", "call": {"name": "git_status", "arguments": {}}}
//! ```
//!
//! on stdin and answers on stdout with
//!
//! ```json
//! {"decision": "ALLOW", "rationale": "read-only"}
//! ```
//!
//! A non-zero exit, unparsable output or an unknown decision is an
//! [`EvaluatorError`], never a decision.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use toolgate_application::{EvaluatorError, PolicyEvaluator};
use toolgate_domain::{Decision, PolicyDecision, ToolCall};
use tracing::{debug, trace};

/// Maximum stderr echoed into an error message
const MAX_STDERR: usize = 2048;

#[derive(Debug, Deserialize)]
struct EvaluatorResponse {
    decision: String,
    #[serde(default)]
    rationale: Option<String>,
}

/// Evaluator backed by an external program.
///
/// The child is killed if the evaluation future is dropped, so the caller's
/// timeout also bounds the process.
#[derive(Debug, Clone)]
pub struct CommandPolicyEvaluator {
    command: String,
    args: Vec<String>,
}

impl CommandPolicyEvaluator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn parse_response(stdout: &[u8]) -> Result<PolicyDecision, EvaluatorError> {
        let response: EvaluatorResponse = serde_json::from_slice(stdout).map_err(|e| {
            EvaluatorError::Malformed(format!(
                "{}: {}",
                e,
                String::from_utf8_lossy(stdout).trim()
            ))
        })?;
        let decision = Decision::parse(&response.decision).ok_or_else(|| {
            EvaluatorError::Malformed(format!("unknown decision '{}'", response.decision))
        })?;
        let mut result = PolicyDecision::new(decision);
        result.rationale = response.rationale;
        Ok(result)
    }
}

#[async_trait]
impl PolicyEvaluator for CommandPolicyEvaluator {
    async fn evaluate(
        &self,
        policy_source: &str,
        call: &ToolCall,
    ) -> Result<PolicyDecision, EvaluatorError> {
        let payload = json!({
            "policy": policy_source,
            "call": {
                "name": call.name,
                "arguments": call.arguments,
            },
        })
        .to_string();

        debug!(command = %self.command, tool = %call.name, "Running policy evaluator");
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EvaluatorError::Failed(format!("failed to spawn '{}': {}", self.command, e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| EvaluatorError::Failed("failed to capture stdin".into()))?;
        let write = async move {
            stdin.write_all(payload.as_bytes()).await?;
            stdin.shutdown().await
        };

        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output.map_err(|e| EvaluatorError::Failed(e.to_string()))?;
        if let Err(e) = written {
            // The program may legitimately answer without reading its input
            trace!("Evaluator did not consume stdin: {}", e);
        }

        if !output.status.success() {
            let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.len() > MAX_STDERR {
                let mut cut = MAX_STDERR;
                while !stderr.is_char_boundary(cut) {
                    cut -= 1;
                }
                stderr.truncate(cut);
            }
            return Err(EvaluatorError::Failed(match output.status.code() {
                Some(code) => format!("exited with code {}: {}", code, stderr),
                None => format!("terminated by signal: {}", stderr),
            }));
        }

        Self::parse_response(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let decision =
            CommandPolicyEvaluator::parse_response(br#"{"decision":"DENY_ABORT","rationale":"rm"}"#)
                .unwrap();
        assert_eq!(decision, PolicyDecision::deny_abort("rm"));

        let err = CommandPolicyEvaluator::parse_response(br#"{"decision":"MAYBE"}"#).unwrap_err();
        assert!(matches!(err, EvaluatorError::Malformed(msg) if msg.contains("MAYBE")));

        let err = CommandPolicyEvaluator::parse_response(b"not json").unwrap_err();
        assert!(matches!(err, EvaluatorError::Malformed(_)));
    }

    #[cfg(unix)]
    fn shell(script: &str) -> CommandPolicyEvaluator {
        CommandPolicyEvaluator::new("sh").with_args(["-c", script])
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_evaluator_sees_policy_and_call() {
        let evaluator = shell(
            r#"input=$(cat)
if printf '%s' "$input" | grep -q '"name":"git_status"' && printf '%s' "$input" | grep -q '"policy":"allow reads"'; then
  echo '{"decision":"ALLOW","rationale":"read"}'
else
  echo '{"decision":"ASK"}'
fi"#,
        );
        let decision = evaluator
            .evaluate("allow reads", &ToolCall::new("git_status"))
            .await
            .unwrap();
        assert_eq!(decision.decision, Decision::Allow);
        assert_eq!(decision.rationale.as_deref(), Some("read"));

        let decision = evaluator
            .evaluate("allow reads", &ToolCall::new("fs_write"))
            .await
            .unwrap();
        assert_eq!(decision.decision, Decision::Ask);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let evaluator = shell("cat >/dev/null; echo 'SyntaxError: line 1' >&2; exit 3");
        let err = evaluator
            .evaluate("broken", &ToolCall::new("git_status"))
            .await
            .unwrap_err();
        match err {
            EvaluatorError::Failed(msg) => {
                assert!(msg.contains("code 3"));
                assert!(msg.contains("SyntaxError"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unknown_decision_is_malformed() {
        let evaluator = shell(r#"echo '{"decision":"allow-ish"}'"#);
        let err = evaluator
            .evaluate("", &ToolCall::new("git_status"))
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluatorError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_failure() {
        let evaluator = CommandPolicyEvaluator::new("/nonexistent/toolgate-evaluator");
        let err = evaluator
            .evaluate("", &ToolCall::new("git_status"))
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluatorError::Failed(msg) if msg.contains("failed to spawn")));
    }
}
