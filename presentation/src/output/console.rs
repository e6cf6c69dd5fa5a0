//! Console output formatter

use colored::Colorize;
use std::path::Path;
use toolgate_application::GatewayError;
use toolgate_domain::{MountCapabilities, MountStatus, PolicyDecision, ToolResult};

/// Formats gateway results for console output
pub struct ConsoleFormatter;

impl ConsoleFormatter {
    /// Format the capability listing of every mount
    pub fn format_capabilities(mounts: &[MountCapabilities]) -> String {
        let mut output = String::new();

        output.push_str(&Self::header("Mounted Tool Servers"));
        output.push('\n');

        if mounts.is_empty() {
            output.push_str(&format!("\n{}\n", "No servers mounted.".dimmed()));
            return output;
        }

        for mount in mounts {
            let pinned = if mount.pinned { " (pinned)" } else { "" };
            output.push_str(&Self::section_header(&format!("{}{}", mount.name, pinned)));

            match &mount.status {
                MountStatus::Initializing => {
                    output.push_str(&format!("  {}\n", "initializing".yellow()));
                }
                MountStatus::Failed { error } => {
                    output.push_str(&format!("  {} {}\n", "failed:".red().bold(), error));
                }
                MountStatus::Running { handshake, tools } => {
                    let version = handshake.server_version.as_deref().unwrap_or("?");
                    output.push_str(&format!(
                        "  {} {} {}\n",
                        "running".green(),
                        handshake.server_name.bold(),
                        version.dimmed()
                    ));
                    if tools.is_empty() {
                        output.push_str(&format!("  {}\n", "(no tools)".dimmed()));
                    }
                    for tool in tools {
                        match &tool.description {
                            Some(description) => output.push_str(&format!(
                                "  * {} {}\n",
                                tool.name.cyan(),
                                description.dimmed()
                            )),
                            None => output.push_str(&format!("  * {}\n", tool.name.cyan())),
                        }
                    }
                }
            }
        }

        let running = mounts.iter().filter(|m| m.status.is_running()).count();
        output.push_str(&format!(
            "\n{} {}/{} running\n",
            "Mounts:".bold(),
            running,
            mounts.len()
        ));

        output
    }

    /// Format a successful (or backend-flagged error) tool result
    pub fn format_result(tool: &str, result: &ToolResult) -> String {
        let mut output = String::new();

        let status = if result.is_success() {
            "OK".green().bold()
        } else {
            "TOOL ERROR".yellow().bold()
        };
        output.push_str(&format!("{} {}\n", status, tool.bold()));

        let text = result.text_content();
        if !text.is_empty() {
            output.push_str(&format!("\n{}\n", text));
        }

        if let Some(structured) = &result.structured_content {
            output.push_str(&format!(
                "\n{}\n{}\n",
                "Structured content:".dimmed(),
                serde_json::to_string_pretty(structured).unwrap_or_else(|_| "{}".to_string())
            ));
        }

        output
    }

    /// Format a gateway refusal or failure
    pub fn format_gateway_error(error: &GatewayError) -> String {
        let wire = error.to_tool_error();
        let label = match error {
            GatewayError::Denied { .. } => "DENIED".red().bold(),
            GatewayError::EvaluatorFailed { .. } => "POLICY ERROR".red().bold(),
            GatewayError::ReservedCodeMisuse { .. } => "BACKEND MISUSE".magenta().bold(),
            GatewayError::Backend(_) => "BACKEND ERROR".yellow().bold(),
            GatewayError::Store(_) | GatewayError::Internal { .. } => "INTERNAL".red().bold(),
        };

        let mut output = format!("{} {}\n", label, error);
        output.push_str(&format!(
            "  {} {} {}\n",
            "code:".dimmed(),
            wire.code,
            wire.message
        ));
        if error.is_abort() {
            output.push_str(&format!("  {}\n", "The agent turn should stop.".red()));
        }
        output
    }

    /// Format the outcome of a policy self-check
    pub fn format_policy_check(file: &Path, decision: &PolicyDecision) -> String {
        let mut output = format!(
            "{} {}\n",
            "Policy OK".green().bold(),
            file.display().to_string().dimmed()
        );
        output.push_str(&format!("  {} {}\n", "self-check decision:".dimmed(), decision.decision));
        if let Some(rationale) = &decision.rationale {
            output.push_str(&format!("  {} {}\n", "rationale:".dimmed(), rationale));
        }
        output
    }

    /// Format the configuration search path as `(label, path, found)` rows
    pub fn format_config_sources(sources: &[(&str, &Path, bool)]) -> String {
        let mut output = String::new();

        output.push_str(&format!("{}\n", "Configuration files:".bold()));
        for (label, path, found) in sources {
            let status = if *found {
                "[found]".green()
            } else {
                "[not found]".dimmed()
            };
            output.push_str(&format!("  {:<10} {} {}\n", label, path.display(), status));
        }
        output.push_str(&format!(
            "\n{}\n",
            "TOOLGATE_* environment variables override every file.".dimmed()
        ));

        output
    }

    fn header(title: &str) -> String {
        let line = "=".repeat(60);
        format!("{}\n{:^60}\n{}", line.cyan(), title.bold(), line.cyan())
    }

    fn section_header(title: &str) -> String {
        format!("\n{}\n{}\n", title.cyan().bold(), "-".repeat(40))
    }
}
