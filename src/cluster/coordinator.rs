// src/cluster/coordinator.rs

//! Lease bookkeeping and gated teardown.
//!
//! Every task that runs a job on a remote cluster holds a lease for the
//! duration of that job. A cluster is only torn down once:
//! - the run reached [`PipelinePhase::Completed`] with every task complete,
//! - the cluster is not `permanent`,
//! - no lease on it is still active.
//!
//! A failed run leaves clusters alone so they can be inspected.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::provider::ClusterProvider;
use super::{ClusterLease, ClusterSpec, PipelinePhase, TeardownError};
use crate::dag::PipelineResult;
use crate::exec::ClusterHint;
use crate::types::{ClusterId, ClusterKind};

/// What the teardown step did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Set when teardown did not run at all, with the reason.
    pub gated: Option<String>,
    pub torn_down: Vec<ClusterId>,
    /// Clusters deliberately left running, with the reason.
    pub skipped: Vec<(ClusterId, String)>,
    pub failed: Vec<TeardownError>,
}

#[derive(Debug)]
struct CoordinatorState {
    phase: PipelinePhase,
    clusters: BTreeMap<ClusterId, ClusterSpec>,
    leases: Vec<ClusterLease>,
    torn_down: BTreeSet<ClusterId>,
}

/// Owns cluster state for one pipeline run.
///
/// Shared by all concurrently executing tasks; every operation takes a
/// short lock and never holds it across an await.
#[derive(Debug)]
pub struct ClusterCoordinator {
    provider: Arc<dyn ClusterProvider>,
    state: Mutex<CoordinatorState>,
}

impl ClusterCoordinator {
    pub fn new(provider: Arc<dyn ClusterProvider>) -> Self {
        Self {
            provider,
            state: Mutex::new(CoordinatorState {
                phase: PipelinePhase::NotStarted,
                clusters: BTreeMap::new(),
                leases: Vec::new(),
                torn_down: BTreeSet::new(),
            }),
        }
    }

    pub fn register_cluster(&self, spec: ClusterSpec) {
        debug!(cluster = %spec.id, size = spec.size, kind = ?spec.kind, "registering cluster");
        self.state.lock().clusters.insert(spec.id.clone(), spec);
    }

    pub fn cluster(&self, id: &str) -> Option<ClusterSpec> {
        self.state.lock().clusters.get(id).cloned()
    }

    pub fn phase(&self) -> PipelinePhase {
        self.state.lock().phase
    }

    /// Move to `next`. Illegal transitions are refused and logged.
    pub fn set_phase(&self, next: PipelinePhase) -> bool {
        let mut state = self.state.lock();
        let current = state.phase;
        if current == next {
            return true;
        }
        if !current.can_transition_to(next) {
            warn!(from = %current, to = %next, "refusing illegal pipeline phase transition");
            return false;
        }
        info!(from = %current, to = %next, "pipeline phase changed");
        state.phase = next;
        true
    }

    /// The job hint for `cluster`, or `None` in local mode.
    pub fn hint_for(&self, cluster: &str) -> Option<ClusterHint> {
        let state = self.state.lock();
        state
            .clusters
            .get(cluster)
            .filter(|spec| !spec.is_local())
            .map(|spec| ClusterHint {
                cluster: spec.id.clone(),
                size: spec.size,
            })
    }

    /// Record that `task_id` is about to run a job on `cluster`.
    ///
    /// Returns `Ok(None)` for local-mode clusters (no lease is recorded),
    /// and an error for unknown clusters or ones already torn down.
    pub fn register_lease(&self, cluster: &str, task_id: &str) -> Result<Option<ClusterHint>, String> {
        let mut state = self.state.lock();
        let spec = state
            .clusters
            .get(cluster)
            .cloned()
            .ok_or_else(|| format!("unknown cluster '{cluster}'"))?;

        if spec.is_local() {
            debug!(cluster, task = task_id, "local mode; no lease needed");
            return Ok(None);
        }
        if state.torn_down.contains(cluster) {
            return Err(format!("cluster '{cluster}' has already been torn down"));
        }

        state.leases.push(ClusterLease {
            cluster: spec.id.clone(),
            task_id: task_id.to_string(),
            active: true,
        });
        debug!(cluster, task = task_id, "lease registered");
        Ok(Some(ClusterHint {
            cluster: spec.id,
            size: spec.size,
        }))
    }

    /// Mark the active lease held by `task_id` on `cluster` as released.
    pub fn release_lease(&self, cluster: &str, task_id: &str) {
        let mut state = self.state.lock();
        match state
            .leases
            .iter_mut()
            .find(|l| l.active && l.cluster == cluster && l.task_id == task_id)
        {
            Some(lease) => {
                lease.active = false;
                debug!(cluster, task = task_id, "lease released");
            }
            None => debug!(cluster, task = task_id, "no active lease to release"),
        }
    }

    pub fn active_leases(&self, cluster: &str) -> usize {
        self.state
            .lock()
            .leases
            .iter()
            .filter(|l| l.active && l.cluster == cluster)
            .count()
    }

    /// Snapshot of every lease recorded so far.
    pub fn leases(&self) -> Vec<ClusterLease> {
        self.state.lock().leases.clone()
    }

    pub fn is_torn_down(&self, cluster: &str) -> bool {
        self.state.lock().torn_down.contains(cluster)
    }

    /// Tear down every idle, non-permanent cluster after a fully successful run.
    ///
    /// Each cluster is torn down at most once per coordinator. Provider
    /// failures are reported, not propagated.
    pub async fn teardown_idle_clusters(&self, result: &PipelineResult) -> TeardownReport {
        let mut report = TeardownReport::default();

        let candidates = {
            let mut state = self.state.lock();
            if !result.is_complete() {
                let reason = "pipeline did not complete; leaving clusters running".to_string();
                info!("{reason}");
                report.gated = Some(reason);
                return report;
            }
            if state.phase != PipelinePhase::Completed {
                let reason = format!("pipeline phase is {}, not Completed", state.phase);
                warn!("skipping cluster teardown: {reason}");
                report.gated = Some(reason);
                return report;
            }

            let mut candidates = Vec::new();
            let specs: Vec<ClusterSpec> = state.clusters.values().cloned().collect();
            for spec in specs {
                let active = state
                    .leases
                    .iter()
                    .filter(|l| l.active && l.cluster == spec.id)
                    .count();
                let skip = if spec.kind == ClusterKind::Permanent {
                    Some("permanent cluster".to_string())
                } else if spec.is_local() {
                    Some("local mode".to_string())
                } else if state.torn_down.contains(&spec.id) {
                    Some("already torn down".to_string())
                } else if active > 0 {
                    Some(format!("{active} active lease(s)"))
                } else {
                    None
                };

                match skip {
                    Some(reason) => {
                        debug!(cluster = %spec.id, %reason, "not tearing down cluster");
                        report.skipped.push((spec.id.clone(), reason));
                    }
                    None => {
                        // Claimed now so concurrent lease requests are refused.
                        state.torn_down.insert(spec.id.clone());
                        candidates.push(spec);
                    }
                }
            }
            candidates
        };

        for spec in candidates {
            match self.provider.teardown(&spec).await {
                Ok(()) => {
                    info!(cluster = %spec.id, "cluster torn down");
                    report.torn_down.push(spec.id);
                }
                Err(e) => {
                    warn!(cluster = %spec.id, error = %e, "cluster teardown failed");
                    self.state.lock().torn_down.remove(&spec.id);
                    report.failed.push(TeardownError {
                        cluster: spec.id,
                        message: format!("{e:#}"),
                    });
                }
            }
        }

        report
    }
}
