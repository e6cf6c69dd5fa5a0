//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for toolgate
#[derive(Parser, Debug)]
#[command(name = "toolgate")]
#[command(author, version, about = "Policy gateway for agent tool calls")]
#[command(long_about = r#"
toolgate mounts tool servers under one namespaced surface and runs every
tool call through a policy before it reaches a backend.

Each call is judged ALLOW, ASK, DENY_CONTINUE or DENY_ABORT. ASK pauses the
call until an operator approves or rejects it at the prompt.

Configuration files are loaded from (in priority order):
1. --config <path>     Explicit config file
2. ./toolgate.toml     Project-level config
3. ~/.config/toolgate/config.toml   Global config

Environment variables prefixed with TOOLGATE_ override every file
(e.g. TOOLGATE_GATEWAY__AGENT_ID=ci).

Example:
  toolgate status
  toolgate call git_status --args '{"repo_path": "."}'
  toolgate check-policy ./policy.txt
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long, global = true)]
    pub no_config: bool,

    /// Print machine-readable JSON instead of formatted text
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mount the configured servers and print their capabilities
    Status,

    /// Run one tool call through the policy gateway
    Call {
        /// Namespaced tool name, e.g. `git_status`
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(short, long, value_name = "JSON")]
        args: Option<String>,

        /// Agent id recorded with the call (overrides config)
        #[arg(long, value_name = "ID")]
        agent: Option<String>,
    },

    /// Evaluate a policy file against a benign call without installing it
    CheckPolicy {
        /// Policy source file
        file: PathBuf,
    },

    /// Show configuration file locations
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_call_with_args() {
        let cli = Cli::parse_from([
            "toolgate",
            "-vv",
            "call",
            "git_status",
            "--args",
            r#"{"repo_path":"."}"#,
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Call { tool, args, agent } => {
                assert_eq!(tool, "git_status");
                assert_eq!(args.as_deref(), Some(r#"{"repo_path":"."}"#));
                assert!(agent.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["toolgate", "status", "--json", "--no-config"]);
        assert!(matches!(cli.command, Command::Status));
        assert!(cli.json);
        assert!(cli.no_config);
    }

    #[test]
    fn test_check_policy_requires_file() {
        assert!(Cli::try_parse_from(["toolgate", "check-policy"]).is_err());
        let cli = Cli::try_parse_from(["toolgate", "check-policy", "p.txt"]).unwrap();
        match cli.command {
            Command::CheckPolicy { file } => assert_eq!(file, PathBuf::from("p.txt")),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
