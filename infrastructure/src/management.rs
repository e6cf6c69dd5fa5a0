//! Management tools mounted next to the backends
//!
//! The gateway exposes its own approval queue and policy lifecycle as a
//! pinned in-process mount, so an operator agent can work them through the
//! same gated surface as any other tool:
//!
//! | Tool | Effect |
//! |------|--------|
//! | `pending` | Calls parked for approval |
//! | `approve` / `reject` / `deny_continue` | Resolve a parked call |
//! | `get_policy` | Active policy source and version |
//! | `list_proposals` | Every stored proposal |
//! | `create_proposal` | Self-check and store a proposal |
//! | `approve_proposal` / `reject_proposal` / `withdraw_proposal` | Close a proposal |

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value, json};
use toolgate_application::{ApprovalRendezvous, PolicyEngine, PolicyError, Resolution};
use toolgate_domain::{CallId, ToolDefinition, ToolError, ToolResult};

use crate::local::LocalToolServer;

/// Mount name of the management server.
pub const MANAGEMENT_MOUNT: &str = "approval_policy";

/// Build the management server over the running rendezvous and engine.
pub fn management_server(
    rendezvous: Arc<ApprovalRendezvous>,
    engine: Arc<PolicyEngine>,
) -> LocalToolServer {
    let server = LocalToolServer::new(MANAGEMENT_MOUNT).with_instructions(
        "Resolve tool calls waiting for approval and manage the authorization policy.",
    );

    // ==================== Approvals ====================

    let pending_rendezvous = Arc::clone(&rendezvous);
    let server = server.with_tool(
        ToolDefinition::new("pending")
            .with_description("List tool calls waiting for an approval decision"),
        move |_args| {
            let rendezvous = Arc::clone(&pending_rendezvous);
            async move {
                let calls: Vec<Value> = rendezvous
                    .pending()
                    .into_iter()
                    .map(|(call_id, call)| {
                        json!({ "call_id": call_id, "name": call.name, "arguments": call.arguments })
                    })
                    .collect();
                Ok(structured(&json!({ "calls": calls })))
            }
        },
    );

    let server = resolve_tool(
        server,
        &rendezvous,
        "approve",
        "Approve a waiting call so it runs",
        |reason| Resolution::Continue { reason },
    );
    let server = resolve_tool(
        server,
        &rendezvous,
        "reject",
        "Reject a waiting call and stop the agent turn",
        |reason| Resolution::Abort { reason },
    );
    let server = resolve_tool(
        server,
        &rendezvous,
        "deny_continue",
        "Refuse a waiting call and let the agent continue",
        |reason| Resolution::DenyContinue { reason },
    );

    // ==================== Policy ====================

    let policy_engine = Arc::clone(&engine);
    let server = server.with_tool(
        ToolDefinition::new("get_policy").with_description("Show the active policy"),
        move |_args| {
            let engine = Arc::clone(&policy_engine);
            async move { Ok(structured(&engine.get_policy())) }
        },
    );

    let list_engine = Arc::clone(&engine);
    let server = server.with_tool(
        ToolDefinition::new("list_proposals").with_description("List policy proposals"),
        move |_args| {
            let engine = Arc::clone(&list_engine);
            async move {
                let proposals = engine.list_proposals().await.map_err(policy_error)?;
                Ok(structured(&json!({ "proposals": proposals })))
            }
        },
    );

    let create_engine = Arc::clone(&engine);
    let server = server.with_tool(
        ToolDefinition::new("create_proposal")
            .with_description("Propose a new policy; it is self-checked before it is stored")
            .with_input_schema(json!({
                "type": "object",
                "properties": { "content": { "type": "string" } },
                "required": ["content"]
            })),
        move |args| {
            let engine = Arc::clone(&create_engine);
            async move {
                let content = required_str(&args, "content")?;
                let proposal = engine.create_proposal(&content).await.map_err(policy_error)?;
                Ok(structured(&proposal))
            }
        },
    );

    let approve_engine = Arc::clone(&engine);
    let server = server.with_tool(
        proposal_definition("approve_proposal", "Activate a pending proposal"),
        move |args| {
            let engine = Arc::clone(&approve_engine);
            async move {
                let id = required_str(&args, "id")?;
                let policy = engine.approve_proposal(&id).await.map_err(policy_error)?;
                Ok(structured(&policy))
            }
        },
    );

    let reject_engine = Arc::clone(&engine);
    let server = server.with_tool(
        proposal_definition("reject_proposal", "Reject a pending proposal"),
        move |args| {
            let engine = Arc::clone(&reject_engine);
            async move {
                let id = required_str(&args, "id")?;
                let proposal = engine.reject_proposal(&id).await.map_err(policy_error)?;
                Ok(structured(&proposal))
            }
        },
    );

    server.with_tool(
        proposal_definition("withdraw_proposal", "Withdraw a pending proposal"),
        move |args| {
            let engine = Arc::clone(&engine);
            async move {
                let id = required_str(&args, "id")?;
                let proposal = engine.withdraw_proposal(&id).await.map_err(policy_error)?;
                Ok(structured(&proposal))
            }
        },
    )
}

fn resolve_tool(
    server: LocalToolServer,
    rendezvous: &Arc<ApprovalRendezvous>,
    name: &str,
    description: &str,
    resolution: fn(Option<String>) -> Resolution,
) -> LocalToolServer {
    let rendezvous = Arc::clone(rendezvous);
    let definition = ToolDefinition::new(name)
        .with_description(description)
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "call_id": { "type": "string" },
                "reason": { "type": "string" }
            },
            "required": ["call_id"]
        }));

    server.with_tool(definition, move |args| {
        let rendezvous = Arc::clone(&rendezvous);
        async move {
            let call_id = CallId::new(required_str(&args, "call_id")?);
            let reason = args
                .get("reason")
                .and_then(Value::as_str)
                .map(str::to_string);
            if !rendezvous.resolve(&call_id, resolution(reason)) {
                return Err(ToolError::invalid_params(format!(
                    "No call {} is waiting for approval",
                    call_id
                )));
            }
            Ok(structured(&json!({ "call_id": call_id, "resolved": true })))
        }
    })
}

fn proposal_definition(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition::new(name)
        .with_description(description)
        .with_input_schema(json!({
            "type": "object",
            "properties": { "id": { "type": "string" } },
            "required": ["id"]
        }))
}

fn required_str(args: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ToolError::invalid_params(format!("missing string argument '{}'", key)))
}

fn structured<T: Serialize>(value: &T) -> ToolResult {
    let value = serde_json::to_value(value).unwrap_or(Value::Null);
    ToolResult::text(value.to_string()).with_structured(value)
}

fn policy_error(error: PolicyError) -> ToolError {
    match error {
        PolicyError::Store(e) => ToolError::internal(e.to_string()),
        other => ToolError::invalid_params(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::{Compositor, StdioProviderFactory};
    use crate::store::InMemoryRecordStore;
    use std::time::Duration;
    use toolgate_application::{
        FixedDecisionEvaluator, GatewayParams, PolicyEvaluator, RecordStore, ToolSurface,
    };
    use toolgate_domain::{MountError, PolicyDecision, ToolCall};

    struct Fixture {
        compositor: Compositor,
        rendezvous: Arc<ApprovalRendezvous>,
        engine: Arc<PolicyEngine>,
    }

    async fn fixture() -> Fixture {
        let params = GatewayParams::default().with_default_policy("allow everything");
        let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
        let evaluator: Arc<dyn PolicyEvaluator> =
            Arc::new(FixedDecisionEvaluator::new(PolicyDecision::allow()));
        let engine = Arc::new(PolicyEngine::new(store, evaluator, &params));
        engine.load_policy().await.unwrap();
        let rendezvous = Arc::new(ApprovalRendezvous::new());

        let compositor = Compositor::new(Arc::new(StdioProviderFactory::new()));
        compositor
            .mount_in_process(
                MANAGEMENT_MOUNT,
                Arc::new(management_server(Arc::clone(&rendezvous), Arc::clone(&engine))),
                true,
            )
            .await
            .unwrap();

        Fixture {
            compositor,
            rendezvous,
            engine,
        }
    }

    async fn call(compositor: &Compositor, call: ToolCall) -> Result<Value, ToolError> {
        let result = compositor.call_tool(&call).await?;
        Ok(result.structured_content.unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_tools_are_listed_under_the_pinned_mount() {
        let f = fixture().await;
        let capabilities = f.compositor.list_capabilities().await;
        assert_eq!(capabilities.len(), 1);
        assert!(capabilities[0].pinned);

        let names: Vec<String> = capabilities[0]
            .tools()
            .iter()
            .map(|t| t.name.clone())
            .collect();
        for tool in [
            "approval_policy_pending",
            "approval_policy_approve",
            "approval_policy_reject",
            "approval_policy_deny_continue",
            "approval_policy_get_policy",
            "approval_policy_create_proposal",
            "approval_policy_approve_proposal",
            "approval_policy_reject_proposal",
            "approval_policy_withdraw_proposal",
        ] {
            assert!(names.iter().any(|n| n == tool), "missing {tool}");
        }

        let err = f.compositor.unmount(MANAGEMENT_MOUNT).await.unwrap_err();
        assert!(matches!(err, MountError::Pinned(_)));
    }

    #[tokio::test]
    async fn test_pending_call_is_approved_through_the_mount() {
        let f = fixture().await;
        let waiter = {
            let rendezvous = Arc::clone(&f.rendezvous);
            tokio::spawn(async move {
                rendezvous
                    .await_decision(&CallId::from("c1"), &ToolCall::new("git_push"))
                    .await
                    .unwrap()
            })
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            while !f.rendezvous.is_pending(&CallId::from("c1")) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        let pending = call(&f.compositor, ToolCall::new("approval_policy_pending"))
            .await
            .unwrap();
        assert_eq!(pending["calls"][0]["call_id"], "c1");
        assert_eq!(pending["calls"][0]["name"], "git_push");

        let resolved = call(
            &f.compositor,
            ToolCall::new("approval_policy_approve")
                .with_arg("call_id", "c1")
                .with_arg("reason", "looks fine"),
        )
        .await
        .unwrap();
        assert_eq!(resolved["resolved"], true);
        assert_eq!(
            waiter.await.unwrap(),
            Resolution::Continue {
                reason: Some("looks fine".into())
            }
        );

        let err = call(
            &f.compositor,
            ToolCall::new("approval_policy_reject").with_arg("call_id", "c1"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ToolError::invalid_params("").code);
    }

    #[tokio::test]
    async fn test_proposal_lifecycle_through_the_mount() {
        let f = fixture().await;

        let proposal = call(
            &f.compositor,
            ToolCall::new("approval_policy_create_proposal").with_arg("content", "deny git_push"),
        )
        .await
        .unwrap();
        assert_eq!(proposal["status"], "pending");
        let id = proposal["id"].as_str().unwrap().to_string();

        let policy = call(
            &f.compositor,
            ToolCall::new("approval_policy_approve_proposal").with_arg("id", id.as_str()),
        )
        .await
        .unwrap();
        assert_eq!(policy["source"], "deny git_push");

        let active = call(&f.compositor, ToolCall::new("approval_policy_get_policy"))
            .await
            .unwrap();
        assert_eq!(active["source"], "deny git_push");
        assert_eq!(f.engine.get_policy().source, "deny git_push");

        let err = call(
            &f.compositor,
            ToolCall::new("approval_policy_withdraw_proposal").with_arg("id", id.as_str()),
        )
        .await
        .unwrap_err();
        assert!(err.message.contains("not pending"));

        let second = call(
            &f.compositor,
            ToolCall::new("approval_policy_create_proposal").with_arg("content", "ask always"),
        )
        .await
        .unwrap();
        let rejected = call(
            &f.compositor,
            ToolCall::new("approval_policy_reject_proposal")
                .with_arg("id", second["id"].as_str().unwrap()),
        )
        .await
        .unwrap();
        assert_eq!(rejected["status"], "rejected");
        assert_eq!(f.engine.get_policy().source, "deny git_push");

        let listed = call(&f.compositor, ToolCall::new("approval_policy_list_proposals"))
            .await
            .unwrap();
        assert_eq!(listed["proposals"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_arguments_are_invalid_params() {
        let f = fixture().await;
        let err = call(&f.compositor, ToolCall::new("approval_policy_approve_proposal"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ToolError::invalid_params("").code);
        assert!(err.message.contains("'id'"));
    }
}
