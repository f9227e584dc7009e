use std::time::Duration;
use tracing::info;

use crate::error::ControllerError;
use crate::services::invoker::ScriptInvoker;
use crate::services::registry::RouterRegistry;
use crate::services::translator;
use crate::types::{Action, ExecOutcome};

/// Runs abstract actions against their target router.
pub struct ActionExecutor {
    invoker: ScriptInvoker,
    /// Optional deadline for one action. Unlike discovery there is no hard
    /// default; traffic-shaping commits can legitimately take a while.
    timeout: Option<Duration>,
}

impl ActionExecutor {
    pub fn new(invoker: ScriptInvoker, timeout: Option<Duration>) -> Self {
        Self { invoker, timeout }
    }

    /// Translate and run one action.
    ///
    /// An unknown `router_id` is the only rejection. Invocation failures come
    /// back inside the outcome, so a caller working through a batch can keep
    /// going; the result is returned, never persisted.
    pub async fn execute(
        &self,
        registry: &RouterRegistry,
        action: &Action,
    ) -> Result<ExecOutcome, ControllerError> {
        let router = registry
            .get(&action.router_id)
            .await
            .ok_or_else(|| ControllerError::RouterNotFound(action.router_id.clone()))?;

        info!("executing action {} against router {}", action.command, router.id);

        let argv = translator::translate(&router, action);
        match self.invoker.invoke(&argv, &router.api_key, self.timeout).await {
            Ok(stdout) => Ok(parse_outcome(&stdout)),
            Err(e) => Ok(ExecOutcome {
                success: false,
                output: serde_json::Value::Null,
                error: Some(e.to_string()),
            }),
        }
    }
}

/// Interpret the program's stdout. Most subcommands print JSON; anything
/// else is a plain success carrying the raw text.
fn parse_outcome(stdout: &str) -> ExecOutcome {
    match serde_json::from_str::<serde_json::Value>(stdout.trim()) {
        Ok(value) => {
            let success = value
                .get("success")
                .and_then(|v| v.as_bool())
                .unwrap_or(true);
            ExecOutcome {
                success,
                output: value,
                error: None,
            }
        }
        Err(_) => ExecOutcome {
            success: true,
            output: serde_json::Value::String(stdout.trim().to_string()),
            error: None,
        },
    }
}
