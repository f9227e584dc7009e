use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

// ============================================================================
// Router Types
// ============================================================================

/// Snapshot of a device interface as reported by discovery.
/// Replaced wholesale on change, never merged field-by-field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterInterface {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub address: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterStatus {
    Online,
    Offline,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Router {
    /// Stable slug, assigned at creation. Sole registry key, never changes.
    pub id: String,
    /// Last-known hostname; the device is authoritative, not the user.
    pub name: String,
    pub host: String,
    pub api_key: String,
    pub version: String,
    /// User-supplied free text. Discovery never touches it.
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<RouterInterface>,
    pub enabled: bool,
    pub status: RouterStatus,
    /// Unix seconds of the last successful discovery.
    #[serde(default)]
    pub last_seen: Option<i64>,
}

/// Partial update for a router record. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterPatch {
    pub id: Option<String>,
    pub name: Option<String>,
    pub host: Option<String>,
    pub api_key: Option<String>,
    pub version: Option<String>,
    pub location: Option<String>,
    pub interfaces: Option<Vec<RouterInterface>>,
    pub enabled: Option<bool>,
    pub status: Option<RouterStatus>,
    pub last_seen: Option<i64>,
}

impl RouterPatch {
    pub fn for_router(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Self::default()
        }
    }
}

/// Identity reported by a router through the control-plane program.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterFacts {
    pub hostname: String,
    pub version: String,
    pub interfaces: Vec<RouterInterface>,
}

// ============================================================================
// Action Types
// ============================================================================

/// Abstract user-facing operation to run against one router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    /// Scheduling hint; opaque to the controller.
    #[serde(default)]
    pub offset_minutes: i64,
    pub router_id: String,
    pub command: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

/// One value from an action's parameter bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

/// Result of executing one action against the control-plane program.
/// Failures are carried here rather than as errors so batch callers can
/// continue with their remaining items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecOutcome {
    pub success: bool,
    pub output: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecOutcome {
    /// Convert into the handoff format accepted by the external result store.
    pub fn into_record(self, kind: &str, name: &str, on_success: TestStatus) -> TestRecord {
        let status = if self.success { on_success } else { TestStatus::Error };
        let details = match self.error {
            Some(err) => err,
            None => self.output.to_string(),
        };
        TestRecord {
            id: Uuid::new_v4().to_string(),
            timestamp: now_unix(),
            kind: kind.to_string(),
            name: name.to_string(),
            status,
            details,
        }
    }
}

// ============================================================================
// Test-Result Records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Blocked,
    Allowed,
    Sinkholed,
    Error,
}

/// Record handed to the external test-result store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRecord {
    pub id: String,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub status: TestStatus,
    pub details: String,
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
