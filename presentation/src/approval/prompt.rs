//! Interactive approval of ASK decisions.
//!
//! While a call is parked in the [`ApprovalRendezvous`], the operator sees:
//!
//! ```text
//! ═══════════════════════════════════════════════════════════════
//!   Tool Call Awaiting Approval
//! ═══════════════════════════════════════════════════════════════
//!
//! Call:  7f0c…
//! Tool:  fs_write_file
//! Arguments:
//!   { "path": "notes.txt", ... }
//!
//! Commands:
//!   /approve [reason]  - Run the call
//!   /reject [reason]   - Refuse and stop the agent
//!   /deny [reason]     - Refuse, the agent may continue
//!
//! toolgate>
//! ```
//!
//! | Command | Aliases | Resolution |
//! |---------|---------|------------|
//! | `/approve` | `approve`, `a`, `y` | Continue |
//! | `/reject` | `reject`, `r`, `n` | Abort |
//! | `/deny` | `deny`, `d`, `c` | DenyContinue |

use colored::Colorize;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use toolgate_application::{ApprovalRendezvous, Resolution};
use toolgate_domain::{CallId, ToolCall};
use tracing::debug;

/// Reason recorded when the operator's input closes while a call is waiting.
const INPUT_CLOSED_REASON: &str = "operator input closed";

/// Parse one line of operator input.
///
/// The first word selects the resolution, the rest becomes its reason.
pub fn parse_answer(input: &str) -> Option<Resolution> {
    let input = input.trim();
    let (command, rest) = match input.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (input, ""),
    };
    let reason = (!rest.is_empty()).then(|| rest.to_string());

    match command.to_lowercase().as_str() {
        "/approve" | "approve" | "a" | "y" => Some(Resolution::Continue { reason }),
        "/reject" | "reject" | "r" | "n" => Some(Resolution::Abort { reason }),
        "/deny" | "deny" | "d" | "c" => Some(Resolution::DenyContinue { reason }),
        _ => None,
    }
}

/// Terminal operator for the approval rendezvous.
///
/// Prompts for one pending call at a time and resolves it from the answer.
/// A call resolved elsewhere while it is on screen is simply skipped.
pub struct InteractiveApprover {
    rendezvous: Arc<ApprovalRendezvous>,
}

impl InteractiveApprover {
    pub fn new(rendezvous: Arc<ApprovalRendezvous>) -> Self {
        Self { rendezvous }
    }

    /// Prompt on the process's stdin until it closes.
    pub async fn run_stdin(&self) -> io::Result<()> {
        self.run(BufReader::new(tokio::io::stdin())).await
    }

    /// Prompt until `input` reaches EOF or the rendezvous goes away.
    ///
    /// On EOF the call currently on screen is rejected.
    pub async fn run<R>(&self, input: R) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut events = self.rendezvous.subscribe();
        let mut shown: Option<CallId> = None;

        loop {
            let current = self.rendezvous.pending().into_iter().next();
            if let Some((call_id, call)) = &current
                && shown.as_ref() != Some(call_id)
            {
                self.display_prompt(call_id, call);
                shown = Some(call_id.clone());
                Self::print_input_marker()?;
            }

            tokio::select! {
                biased;

                line = lines.next_line() => {
                    let Some(line) = line? else {
                        if let Some((call_id, _)) = current {
                            self.rendezvous.reject(&call_id, Some(INPUT_CLOSED_REASON.to_string()));
                        }
                        return Ok(());
                    };

                    let Some((call_id, _)) = current else {
                        if !line.trim().is_empty() {
                            println!("{}", "No calls are awaiting approval.".dimmed());
                        }
                        continue;
                    };

                    match parse_answer(&line) {
                        Some(resolution) => {
                            if !self.rendezvous.resolve(&call_id, resolution) {
                                println!("{}", "Call was already resolved.".dimmed());
                            }
                            shown = None;
                        }
                        None => {
                            if !line.trim().is_empty() {
                                Self::print_commands();
                            }
                            Self::print_input_marker()?;
                        }
                    }
                }

                event = events.recv() => {
                    match event {
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "Approval prompt lagged behind notifications");
                        }
                        Err(RecvError::Closed) => return Ok(()),
                    }
                }
            }
        }
    }

    fn display_prompt(&self, call_id: &CallId, call: &ToolCall) {
        let rule = "═══════════════════════════════════════════════════════════════";
        println!();
        println!("{}", rule.yellow().bold());
        println!("{}", "  Tool Call Awaiting Approval".yellow().bold());
        println!("{}", rule.yellow().bold());
        println!();
        println!("{}  {}", "Call:".cyan().bold(), call_id.to_string().dimmed());
        println!("{}  {}", "Tool:".cyan().bold(), call.name.bold());

        if !call.arguments.is_empty() {
            println!("{}", "Arguments:".cyan().bold());
            let rendered = serde_json::to_string_pretty(&call.arguments_json())
                .unwrap_or_else(|_| "{}".to_string());
            for line in rendered.lines() {
                println!("  {}", line);
            }
        }
        println!();
        Self::print_commands();
    }

    fn print_commands() {
        println!("{}", "Commands:".cyan().bold());
        println!("  {}  - Run the call", "/approve [reason]".green());
        println!("  {}   - Refuse and stop the agent", "/reject [reason]".red());
        println!("  {}     - Refuse, the agent may continue", "/deny [reason]".yellow());
        println!();
    }

    fn print_input_marker() -> io::Result<()> {
        print!("{} ", "toolgate>".magenta().bold());
        io::stdout().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_answer_aliases() {
        assert_eq!(
            parse_answer("a"),
            Some(Resolution::Continue { reason: None })
        );
        assert_eq!(
            parse_answer("/REJECT  too risky "),
            Some(Resolution::Abort {
                reason: Some("too risky".into())
            })
        );
        assert_eq!(
            parse_answer("c not now"),
            Some(Resolution::DenyContinue {
                reason: Some("not now".into())
            })
        );
        assert_eq!(parse_answer("maybe"), None);
        assert_eq!(parse_answer(""), None);
    }

    async fn park(rendezvous: &Arc<ApprovalRendezvous>, id: &str) -> tokio::task::JoinHandle<Resolution> {
        let waiter = {
            let rendezvous = Arc::clone(rendezvous);
            let call_id = CallId::from(id);
            tokio::spawn(async move {
                rendezvous
                    .await_decision(&call_id, &ToolCall::new("fs_write_file"))
                    .await
                    .unwrap()
            })
        };
        let call_id = CallId::from(id);
        tokio::time::timeout(Duration::from_secs(5), async {
            while !rendezvous.is_pending(&call_id) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        waiter
    }

    #[tokio::test]
    async fn test_approve_from_input() {
        let rendezvous = Arc::new(ApprovalRendezvous::new());
        let waiter = park(&rendezvous, "c1").await;

        let approver = InteractiveApprover::new(Arc::clone(&rendezvous));
        approver
            .run(BufReader::new(&b"a looks fine\n"[..]))
            .await
            .unwrap();

        assert_eq!(
            waiter.await.unwrap(),
            Resolution::Continue {
                reason: Some("looks fine".into())
            }
        );
        assert!(rendezvous.pending().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_input_then_deny() {
        let rendezvous = Arc::new(ApprovalRendezvous::new());
        let waiter = park(&rendezvous, "c1").await;

        let approver = InteractiveApprover::new(Arc::clone(&rendezvous));
        approver
            .run(BufReader::new(&b"what?\n\nd\n"[..]))
            .await
            .unwrap();

        assert_eq!(
            waiter.await.unwrap(),
            Resolution::DenyContinue { reason: None }
        );
    }

    #[tokio::test]
    async fn test_eof_rejects_waiting_call() {
        let rendezvous = Arc::new(ApprovalRendezvous::new());
        let waiter = park(&rendezvous, "c1").await;

        let approver = InteractiveApprover::new(Arc::clone(&rendezvous));
        approver.run(BufReader::new(&b""[..])).await.unwrap();

        assert_eq!(
            waiter.await.unwrap(),
            Resolution::Abort {
                reason: Some(INPUT_CLOSED_REASON.into())
            }
        );
    }

    #[tokio::test]
    async fn test_eof_without_pending_returns() {
        let rendezvous = Arc::new(ApprovalRendezvous::new());
        let approver = InteractiveApprover::new(rendezvous);
        approver
            .run(BufReader::new(&b"a\n"[..]))
            .await
            .unwrap();
    }
}
