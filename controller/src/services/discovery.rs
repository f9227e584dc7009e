use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::error::ControllerError;
use crate::services::invoker::ScriptInvoker;
use crate::types::{RouterFacts, RouterInterface};

/// Hard deadline for one identity query. A router that cannot answer
/// `get-info` inside this window is treated as unreachable.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait Discover {
    async fn discover(&self, host: &str, api_key: &str) -> Result<RouterFacts, ControllerError>;
}

/// Fetches a router's identity (hostname, version, interfaces) through the
/// control-plane program.
pub struct DiscoveryClient {
    invoker: ScriptInvoker,
}

/// What the program actually prints for `get-info`. Every field is optional;
/// a router that omits one still counts as discovered.
#[derive(Debug, Deserialize)]
struct RawInfo {
    hostname: Option<String>,
    version: Option<String>,
    #[serde(default)]
    interfaces: Vec<RouterInterface>,
}

impl DiscoveryClient {
    pub fn new(invoker: ScriptInvoker) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl Discover for DiscoveryClient {
    /// Run `get-info` against one router.
    ///
    /// The argv is built here rather than through the command translator:
    /// discovery takes no free-form params, and `get-info` auto-detects the
    /// version so `--version` is omitted.
    async fn discover(&self, host: &str, api_key: &str) -> Result<RouterFacts, ControllerError> {
        let args = vec![
            "--host".to_string(),
            host.to_string(),
            "--key".to_string(),
            api_key.to_string(),
            "get-info".to_string(),
        ];

        let stdout = self
            .invoker
            .invoke(&args, api_key, Some(DISCOVERY_TIMEOUT))
            .await?;

        let raw: RawInfo = serde_json::from_str(stdout.trim())
            .map_err(|e| ControllerError::InvalidResponse(e.to_string()))?;

        Ok(RouterFacts {
            hostname: raw.hostname.unwrap_or_else(|| "unknown".to_string()),
            version: raw.version.unwrap_or_else(|| "unknown".to_string()),
            interfaces: raw.interfaces,
        })
    }
}
