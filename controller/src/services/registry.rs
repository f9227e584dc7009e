use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::error::ControllerError;
use crate::types::{Router, RouterPatch, RouterStatus};

/// Change notification emitted after a mutation has been persisted.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    Updated(Router),
    Deleted(String),
}

/// The persisted document: one JSON object holding the whole fleet,
/// rewritten in full on every mutation.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    routers: Vec<Router>,
}

/// Owner of the fleet's router records.
///
/// All reads and read-modify-write cycles go through the one lock, so
/// interleaved partial merges cannot lose updates. The persisted document is
/// the single source of truth across restarts; the in-memory map is rebuilt
/// from it at load and is the only writer thereafter.
pub struct RouterRegistry {
    path: PathBuf,
    routers: Mutex<HashMap<String, Router>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl RouterRegistry {
    /// Load the registry from its document.
    ///
    /// A missing file is an empty fleet and is persisted immediately. A
    /// corrupt file degrades to an empty fleet with a warning; the next
    /// `save` overwrites it.
    pub fn load(path: PathBuf) -> Result<Self, ControllerError> {
        let mut map = HashMap::new();

        if !path.exists() {
            info!("no registry document at {:?}, starting empty", path);
            write_document(&path, &[])?;
        } else {
            let bytes = fs::read(&path)
                .map_err(|e| ControllerError::Persistence(format!("read {:?}: {}", path, e)))?;
            match serde_json::from_slice::<RegistryDocument>(&bytes) {
                Ok(doc) => {
                    map = doc
                        .routers
                        .into_iter()
                        .map(|router| (router.id.clone(), router))
                        .collect();
                    info!("loaded {} router(s) from {:?}", map.len(), path);
                }
                Err(e) => {
                    warn!("registry document {:?} is corrupt ({}), starting empty", path, e);
                }
            }
        }

        Ok(Self {
            path,
            routers: Mutex::new(map),
            events: broadcast::channel(64).0,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    pub async fn get(&self, id: &str) -> Option<Router> {
        self.routers.lock().await.get(id).cloned()
    }

    /// All routers, ordered by id.
    pub async fn list(&self) -> Vec<Router> {
        let mut routers: Vec<Router> = self.routers.lock().await.values().cloned().collect();
        routers.sort_by(|a, b| a.id.cmp(&b.id));
        routers
    }

    /// Merge a partial update onto the stored record (or create a new record
    /// when the id is unknown), persist the document, and notify subscribers.
    ///
    /// Fields absent from the patch keep their stored values; this is how
    /// `location` and `status` survive callers that only edit one field.
    pub async fn save(&self, patch: RouterPatch) -> Result<Router, ControllerError> {
        let mut routers = self.routers.lock().await;

        let id = match patch.id.clone() {
            Some(id) => id,
            None => slug(patch.name.as_deref().ok_or_else(|| {
                ControllerError::InvalidPayload("save requires an id or a name".to_string())
            })?),
        };

        let router = match routers.get(&id).cloned() {
            Some(existing) => merge(existing, patch),
            None => new_router(id.clone(), patch)?,
        };

        routers.insert(id, router.clone());
        self.write_document(&routers).await?;
        let _ = self.events.send(RegistryEvent::Updated(router.clone()));
        Ok(router)
    }

    /// Remove a router and persist. Unknown ids are a no-op: no error, no
    /// event, no rewrite.
    pub async fn delete(&self, id: &str) -> Result<(), ControllerError> {
        let mut routers = self.routers.lock().await;
        if routers.remove(id).is_none() {
            return Ok(());
        }
        self.write_document(&routers).await?;
        let _ = self.events.send(RegistryEvent::Deleted(id.to_string()));
        info!("deleted router {}", id);
        Ok(())
    }

    /// Refresh status and last-seen in memory only, without a rewrite or an
    /// event. The reconciler's post-sweep `persist` flushes it.
    pub async fn touch(&self, id: &str, status: RouterStatus, last_seen: i64) {
        if let Some(router) = self.routers.lock().await.get_mut(id) {
            router.status = status;
            router.last_seen = Some(last_seen);
        }
    }

    /// Unconditionally rewrite the document from the in-memory map.
    pub async fn persist(&self) -> Result<(), ControllerError> {
        let routers = self.routers.lock().await;
        self.write_document(&routers).await
    }

    /// Rewrite the document on the blocking pool so the file I/O never
    /// stalls a runtime worker. The lock stays held across the write, which
    /// keeps rewrites ordered.
    async fn write_document(
        &self,
        routers: &HashMap<String, Router>,
    ) -> Result<(), ControllerError> {
        let path = self.path.clone();
        let snapshot: Vec<Router> = routers.values().cloned().collect();
        tokio::task::spawn_blocking(move || write_document(&path, &snapshot))
            .await
            .map_err(|e| ControllerError::Persistence(format!("writer task: {}", e)))?
    }
}

fn write_document(path: &Path, routers: &[Router]) -> Result<(), ControllerError> {
    let mut list: Vec<&Router> = routers.iter().collect();
    list.sort_by(|a, b| a.id.cmp(&b.id));

    let doc = serde_json::json!({ "routers": list });
    let bytes = serde_json::to_vec_pretty(&doc)
        .map_err(|e| ControllerError::Persistence(format!("serialize registry: {}", e)))?;

    // Write-then-rename keeps the document whole if the process dies
    // mid-write.
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)
        .map_err(|e| ControllerError::Persistence(format!("write {:?}: {}", tmp, e)))?;
    fs::rename(&tmp, path)
        .map_err(|e| ControllerError::Persistence(format!("rename {:?}: {}", tmp, e)))?;
    Ok(())
}

/// Derive the stable registry key from a human name: lowercased, whitespace
/// to hyphens, non-word characters stripped, repeated hyphens collapsed.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_hyphen = true; // also trims leading hyphens
    for ch in name.to_lowercase().chars() {
        let mapped = if ch.is_whitespace() { '-' } else { ch };
        match mapped {
            'a'..='z' | '0'..='9' => {
                out.push(mapped);
                last_hyphen = false;
            }
            '-' => {
                if !last_hyphen {
                    out.push('-');
                    last_hyphen = true;
                }
            }
            _ => {}
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

fn merge(mut existing: Router, patch: RouterPatch) -> Router {
    // id is immutable once assigned; everything else merges field-by-field.
    if let Some(name) = patch.name {
        existing.name = name;
    }
    if let Some(host) = patch.host {
        existing.host = host;
    }
    if let Some(api_key) = patch.api_key {
        existing.api_key = api_key;
    }
    if let Some(version) = patch.version {
        existing.version = version;
    }
    if let Some(location) = patch.location {
        existing.location = Some(location);
    }
    if let Some(interfaces) = patch.interfaces {
        existing.interfaces = interfaces;
    }
    if let Some(enabled) = patch.enabled {
        existing.enabled = enabled;
    }
    if let Some(status) = patch.status {
        existing.status = status;
    }
    if let Some(last_seen) = patch.last_seen {
        existing.last_seen = Some(last_seen);
    }
    existing
}

fn new_router(id: String, patch: RouterPatch) -> Result<Router, ControllerError> {
    let missing = |field: &str| {
        ControllerError::InvalidPayload(format!("new router requires {}", field))
    };
    Ok(Router {
        id,
        name: patch.name.ok_or_else(|| missing("name"))?,
        host: patch.host.ok_or_else(|| missing("host"))?,
        api_key: patch.api_key.ok_or_else(|| missing("apiKey"))?,
        version: patch.version.unwrap_or_default(),
        location: patch.location,
        interfaces: patch.interfaces.unwrap_or_default(),
        enabled: patch.enabled.unwrap_or(true),
        status: patch.status.unwrap_or(RouterStatus::Unknown),
        last_seen: patch.last_seen,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry_in(dir: &TempDir) -> RouterRegistry {
        RouterRegistry::load(dir.path().join("routers.json")).unwrap()
    }

    fn seed_patch() -> RouterPatch {
        RouterPatch {
            id: Some("edge-1".to_string()),
            name: Some("edge-1".to_string()),
            host: Some("192.168.122.210".to_string()),
            api_key: Some("SUPERSECRET".to_string()),
            version: Some("1.5".to_string()),
            location: Some("lab rack 2".to_string()),
            status: Some(RouterStatus::Online),
            ..RouterPatch::default()
        }
    }

    #[test]
    fn test_slug_derivation() {
        assert_eq!(slug("Branch Office #2"), "branch-office-2");
        assert_eq!(slug("  Edge   Router  "), "edge-router");
        assert_eq!(slug("core"), "core");
        assert_eq!(slug("a--b"), "a-b");
    }

    #[tokio::test]
    async fn test_missing_document_bootstraps_empty() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        assert!(registry.list().await.is_empty());
        // Self-healing bootstrap: the empty document exists on disk now.
        let written = fs::read_to_string(dir.path().join("routers.json")).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(doc["routers"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_corrupt_document_degrades_to_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("routers.json"), "{not json").unwrap();

        let registry = registry_in(&dir);
        assert!(registry.list().await.is_empty());

        // The next save overwrites the corrupt file.
        registry.save(seed_patch()).await.unwrap();
        let written = fs::read_to_string(dir.path().join("routers.json")).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(doc["routers"][0]["id"], "edge-1");
    }

    #[tokio::test]
    async fn test_partial_update_merge_law() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        registry.save(seed_patch()).await.unwrap();

        // Edit one field; everything else must survive.
        let patch = RouterPatch {
            id: Some("edge-1".to_string()),
            enabled: Some(false),
            ..RouterPatch::default()
        };
        let updated = registry.save(patch).await.unwrap();

        assert!(!updated.enabled);
        assert_eq!(updated.location.as_deref(), Some("lab rack 2"));
        assert_eq!(updated.status, RouterStatus::Online);
        assert_eq!(updated.api_key, "SUPERSECRET");
    }

    #[tokio::test]
    async fn test_round_trip_across_restart() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        let saved = registry.save(seed_patch()).await.unwrap();
        drop(registry);

        let reloaded = registry_in(&dir);
        let listed = reloaded.list().await;
        assert_eq!(listed, vec![saved]);
    }

    #[tokio::test]
    async fn test_delete_unknown_id_is_noop() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        let mut events = registry.subscribe();

        registry.delete("ghost").await.unwrap();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_events_on_save_and_delete() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        let mut events = registry.subscribe();

        registry.save(seed_patch()).await.unwrap();
        registry.delete("edge-1").await.unwrap();

        match events.try_recv().unwrap() {
            RegistryEvent::Updated(router) => assert_eq!(router.id, "edge-1"),
            other => panic!("expected Updated, got {:?}", other),
        }
        match events.try_recv().unwrap() {
            RegistryEvent::Deleted(id) => assert_eq!(id, "edge-1"),
            other => panic!("expected Deleted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_new_router_requires_identity_fields() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);

        let err = registry
            .save(RouterPatch {
                id: Some("edge-9".to_string()),
                name: Some("edge-9".to_string()),
                ..RouterPatch::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_touch_is_memory_only_until_persist() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        registry.save(seed_patch()).await.unwrap();

        registry.touch("edge-1", RouterStatus::Offline, 1700000000).await;

        // Not yet on disk.
        let on_disk = fs::read_to_string(dir.path().join("routers.json")).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&on_disk).unwrap();
        assert_eq!(doc["routers"][0]["status"], "online");

        registry.persist().await.unwrap();
        let on_disk = fs::read_to_string(dir.path().join("routers.json")).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&on_disk).unwrap();
        assert_eq!(doc["routers"][0]["status"], "offline");
        assert_eq!(doc["routers"][0]["lastSeen"], 1700000000);
    }
}
