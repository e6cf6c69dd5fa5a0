//! CLI entrypoint for toolgate
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use toolgate_application::{
    ApprovalRendezvous, AuditLogger, FixedDecisionEvaluator, GatewayParams, PolicyEngine,
    PolicyEvaluator, PolicyGateway, RecordStore,
};
use toolgate_domain::{Decision, PolicyDecision, ToolCall};
use toolgate_infrastructure::{
    CommandPolicyEvaluator, Compositor, ConfigLoader, FileConfig, InMemoryRecordStore,
    JsonlAuditLogger, MANAGEMENT_MOUNT, StdioProviderFactory, management_server,
};
use toolgate_presentation::{Cli, Command, ConsoleFormatter, InteractiveApprover};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Everything a gated call needs, built once per process
struct Services {
    compositor: Arc<Compositor>,
    engine: Arc<PolicyEngine>,
    rendezvous: Arc<ApprovalRendezvous>,
    gateway: PolicyGateway,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity level; RUST_LOG wins when -v is absent
    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"), // -vvv or more
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    info!("Starting toolgate");

    if let Command::Config = cli.command {
        let sources = ConfigLoader::sources(cli.config.as_ref());
        let rows: Vec<(&str, &Path, bool)> = sources
            .iter()
            .map(|s| (s.label, s.path.as_path(), s.found))
            .collect();
        println!("{}", ConsoleFormatter::format_config_sources(&rows));
        return Ok(());
    }

    // Load configuration
    let config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_ref()).context("Failed to load configuration")?
    };

    let issues = config.validate();
    if !issues.is_empty() {
        for issue in &issues {
            eprintln!("config error: {}", issue);
        }
        bail!("Configuration has {} error(s)", issues.len());
    }

    let agent_override = match &cli.command {
        Command::Call { agent, .. } => agent.clone(),
        _ => None,
    };

    // === Dependency Injection ===
    let services = build_services(&config, agent_override).await?;

    let code = match cli.command {
        Command::Status => {
            let capabilities = services.compositor.list_capabilities().await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&capabilities)?);
            } else {
                println!("{}", ConsoleFormatter::format_capabilities(&capabilities));
            }
            0
        }
        Command::Call { tool, args, .. } => {
            let call = build_call(&tool, args.as_deref())?;
            run_call(&services, call, cli.json).await?
        }
        Command::CheckPolicy { file } => {
            let source = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read policy file {}", file.display()))?;
            let decision = services.engine.self_check(&source).await?;
            print_policy_check(&file, &decision, cli.json)?;
            0
        }
        Command::Config => 0,
    };

    services.rendezvous.close_all();
    services.compositor.close().await;

    // Exit explicitly: a pending stdin read would otherwise hold the runtime open
    std::process::exit(code);
}

async fn build_services(config: &FileConfig, agent: Option<String>) -> Result<Services> {
    let policy_source = config
        .policy
        .load_source()
        .context("Failed to read policy source file")?;
    let mut params: GatewayParams = config.to_gateway_params(policy_source);
    if let Some(agent) = agent {
        params = params.with_agent_id(agent);
    }

    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());

    let evaluator: Arc<dyn PolicyEvaluator> = match &config.policy.evaluator.command {
        Some(command) => Arc::new(
            CommandPolicyEvaluator::new(command).with_args(&config.policy.evaluator.args),
        ),
        None => {
            // Validation already rejected unknown decisions
            let decision = config
                .policy
                .parse_default_decision()
                .unwrap_or(Decision::Ask);
            Arc::new(FixedDecisionEvaluator::new(PolicyDecision::new(decision)))
        }
    };

    let audit: Option<Arc<dyn AuditLogger>> = config
        .audit
        .jsonl_path
        .as_ref()
        .and_then(JsonlAuditLogger::new)
        .map(|logger| Arc::new(logger) as Arc<dyn AuditLogger>);

    let mut engine = PolicyEngine::new(Arc::clone(&store), evaluator, &params);
    if let Some(audit) = &audit {
        engine = engine.with_audit_logger(Arc::clone(audit));
    }
    let engine = Arc::new(engine);
    engine.load_policy().await?;

    let rendezvous = Arc::new(ApprovalRendezvous::new());

    let factory =
        StdioProviderFactory::new().with_request_timeout(config.gateway.backend_timeout());
    let compositor = Arc::new(Compositor::new(Arc::new(factory)));
    let management = management_server(Arc::clone(&rendezvous), Arc::clone(&engine));
    compositor
        .mount_in_process(MANAGEMENT_MOUNT, Arc::new(management), true)
        .await
        .context("Failed to mount management tools")?;
    for (name, error) in compositor.mount_all(&config.servers).await {
        warn!(mount = %name, error = %error, "Server failed to mount");
    }

    let mut gateway = PolicyGateway::new(
        Arc::clone(&compositor) as _,
        Arc::clone(&engine),
        Arc::clone(&rendezvous),
        store,
        params,
    );
    if let Some(audit) = audit {
        gateway = gateway.with_audit_logger(audit);
    }

    Ok(Services {
        compositor,
        engine,
        rendezvous,
        gateway,
    })
}

fn build_call(tool: &str, args: Option<&str>) -> Result<ToolCall> {
    let call = ToolCall::new(tool);
    let Some(args) = args else {
        return Ok(call);
    };
    let value: Value = serde_json::from_str(args).context("--args is not valid JSON")?;
    if !value.is_object() {
        bail!("--args must be a JSON object");
    }
    Ok(call.with_arguments(value))
}

/// Run one call through the gateway while the operator prompt listens for ASK.
///
/// Returns the process exit code.
async fn run_call(services: &Services, call: ToolCall, json: bool) -> Result<i32> {
    let approver = InteractiveApprover::new(Arc::clone(&services.rendezvous));
    let prompt = tokio::spawn(async move {
        if let Err(e) = approver.run_stdin().await {
            warn!(error = %e, "Approval prompt stopped");
        }
    });

    let tool = call.name.clone();
    let outcome = services.gateway.call_tool(call).await;
    prompt.abort();

    match outcome {
        Ok(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", ConsoleFormatter::format_result(&tool, &result));
            }
            Ok(if result.is_success() { 0 } else { 1 })
        }
        Err(error) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&error.to_tool_error())?);
            } else {
                println!("{}", ConsoleFormatter::format_gateway_error(&error));
            }
            Ok(if error.is_abort() { 2 } else { 1 })
        }
    }
}

fn print_policy_check(file: &Path, decision: &PolicyDecision, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(decision)?);
    } else {
        println!("{}", ConsoleFormatter::format_policy_check(file, decision));
    }
    Ok(())
}
