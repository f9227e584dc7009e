use std::time::Duration;
use tracing::{error, info, warn};

use crate::services::discovery::Discover;
use crate::services::registry::RouterRegistry;
use crate::types::{now_unix, RouterPatch, RouterStatus};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub checked: usize,
    pub changed: usize,
    pub offline: usize,
}

/// One reconciliation sweep over every enabled router.
///
/// Routers are visited sequentially: at most one control-plane invocation is
/// in flight, and the registry never sees two sweep writers racing on the
/// same record. The sweep never fails as a whole; a router that cannot be
/// discovered or persisted is logged and the loop moves on.
pub async fn run_sweep<D: Discover + Sync>(registry: &RouterRegistry, discovery: &D) -> SweepSummary {
    let mut summary = SweepSummary::default();

    for router in registry.list().await {
        if !router.enabled {
            continue;
        }
        summary.checked += 1;

        match discovery.discover(&router.host, &router.api_key).await {
            Ok(facts) => {
                let mut patch = RouterPatch::for_router(&router.id);
                if facts.hostname != router.name {
                    info!(
                        "router {} hostname changed: {} -> {}",
                        router.id, router.name, facts.hostname
                    );
                    patch.name = Some(facts.hostname);
                }
                if facts.version != router.version {
                    info!(
                        "router {} version changed: {} -> {}",
                        router.id, router.version, facts.version
                    );
                    patch.version = Some(facts.version);
                }
                if facts.interfaces != router.interfaces {
                    info!("router {} interface list changed", router.id);
                    patch.interfaces = Some(facts.interfaces);
                }
                if router.status != RouterStatus::Online {
                    info!("router {} is back online", router.id);
                    patch.status = Some(RouterStatus::Online);
                }

                let dirty = patch.name.is_some()
                    || patch.version.is_some()
                    || patch.interfaces.is_some()
                    || patch.status.is_some();

                if dirty {
                    summary.changed += 1;
                    patch.status = Some(RouterStatus::Online);
                    patch.last_seen = Some(now_unix());
                    if let Err(e) = registry.save(patch).await {
                        error!("failed to persist router {}: {}", router.id, e);
                    }
                } else {
                    // Unchanged, already-online router: refresh liveness in
                    // memory only; the post-sweep persist flushes it without
                    // an extra rewrite.
                    registry
                        .touch(&router.id, RouterStatus::Online, now_unix())
                        .await;
                }
            }
            Err(e) => {
                warn!("discovery failed for router {}: {}", router.id, e);
                if router.status != RouterStatus::Offline {
                    summary.offline += 1;
                    let mut patch = RouterPatch::for_router(&router.id);
                    patch.status = Some(RouterStatus::Offline);
                    if let Err(e) = registry.save(patch).await {
                        error!("failed to persist router {}: {}", router.id, e);
                    }
                }
            }
        }
    }

    if let Err(e) = registry.persist().await {
        error!("failed to persist registry after sweep: {}", e);
    }

    summary
}

/// Daemon-mode driver: run a sweep every `interval`, forever.
pub async fn reconcile_loop<D: Discover + Sync>(
    registry: &RouterRegistry,
    discovery: &D,
    interval: Duration,
) {
    info!("starting reconciliation loop (interval {:?})", interval);
    loop {
        tokio::time::sleep(interval).await;
        let summary = run_sweep(registry, discovery).await;
        info!(
            "sweep complete: {} checked, {} changed, {} newly offline",
            summary.checked, summary.changed, summary.offline
        );
    }
}
