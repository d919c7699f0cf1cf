//! `spec.md` §4.5, component E. Per-tick driver that cordons, drains, and terminates at most
//! `maxUnavailable` drifted instances at a time. Owns a [`DrainManager`] per instance group so
//! only one drain batch is ever in flight; the wait-group/error-channel shape here is the same
//! one the trino-lb scaler uses for its per-cluster-group `JoinSet` fan-out, just applied to
//! nodes and bounded by a timeout instead of awaited to completion.

use std::time::Duration;

use snafu::{ResultExt, Snafu};
use stackable_operator::{
    k8s_openapi::api::core::v1::{Node, Pod},
    kube::{
        api::{Api, DeleteParams, EvictParams, ListParams, Patch, PatchParams},
        ResourceExt,
    },
};
use tokio::task::JoinSet;

use crate::{
    aws::{
        client::CloudClients,
        model::{GroupInstance, InstanceConfigRef, ScalingConfigIdentity, ScalingGroup},
    },
    crd::RollingUpdateStrategy,
    discovery::NodeInfo,
};

const WAIT_GROUP_TIMEOUT: Duration = Duration::from_secs(5);
const FIELD_MANAGER: &str = "instance-group-operator";

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to cordon node {node}"))]
    Cordon {
        node: String,
        source: stackable_operator::kube::Error,
    },

    #[snafu(display("failed to uncordon node {node}"))]
    Uncordon {
        node: String,
        source: stackable_operator::kube::Error,
    },

    #[snafu(display("failed to list pods on node {node}"))]
    ListPods {
        node: String,
        source: stackable_operator::kube::Error,
    },

    #[snafu(display("failed to evict or delete a pod on node {node}"))]
    Drain {
        node: String,
        source: stackable_operator::kube::Error,
    },

    #[snafu(display("drain task did not finish cleanly"))]
    Join { source: tokio::task::JoinError },

    #[snafu(display("drain of node {node} exceeded its {timeout_secs}s strategy timeout"))]
    DrainTimeout { node: String, timeout_secs: u32 },

    #[snafu(display("failed to terminate scaling instances"))]
    Terminate { source: crate::aws::client::SdkError },
}

type Result<T, E = Error> = std::result::Result<T, E>;

enum DrainOutcome {
    Drained { instance_id: String },
    Failed(Error),
}

/// Owns the single in-flight drain batch for one instance group (`spec.md` §4.5, §5: "never
/// shared across instance groups"). Construct once per instance group and keep across ticks —
/// recreating it would forget in-flight drains.
#[derive(Default)]
pub struct DrainManager {
    tasks: JoinSet<DrainOutcome>,
    batch_instance_ids: Vec<String>,
}

impl DrainManager {
    pub fn new() -> Self {
        DrainManager::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Blocks for at most [`WAIT_GROUP_TIMEOUT`]. Returns as soon as a task errors or the wait
    /// group empties; otherwise leaves the remaining tasks running and returns `TimedOut`.
    async fn wait(&mut self) -> WaitResult {
        let deadline = tokio::time::Instant::now() + WAIT_GROUP_TIMEOUT;
        loop {
            if self.tasks.is_empty() {
                return WaitResult::AllDrained;
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return WaitResult::TimedOut;
            }
            match tokio::time::timeout(remaining, self.tasks.join_next()).await {
                Ok(Some(Ok(DrainOutcome::Drained { instance_id }))) => {
                    self.batch_instance_ids.retain(|id| id != &instance_id);
                    continue;
                }
                Ok(Some(Ok(DrainOutcome::Failed(err)))) => return WaitResult::Error(err),
                Ok(Some(Err(source))) => return WaitResult::Error(Error::Join { source }),
                Ok(None) => return WaitResult::AllDrained,
                Err(_elapsed) => return WaitResult::TimedOut,
            }
        }
    }
}

enum WaitResult {
    AllDrained,
    Error(Error),
    TimedOut,
}

/// What the orchestrator did this tick. Mirrors the `(done bool, err error)` shape from
/// `spec.md` §4.5: `done=true` means no targets remain, the caller may advance past
/// `InitUpgrade`.
pub struct TickOutcome {
    pub done: bool,
}

pub struct RollingUpdate<'a> {
    pub clients: &'a CloudClients,
    pub kube_client: &'a stackable_operator::client::Client,
}

impl<'a> RollingUpdate<'a> {
    /// One call per reconcile tick while `state == InitUpgrade`.
    pub async fn tick(
        &self,
        group: &ScalingGroup,
        nodes: &[NodeInfo],
        strategy: &RollingUpdateStrategy,
        drain_manager: &mut DrainManager,
    ) -> Result<TickOutcome> {
        if !drain_manager.is_empty() {
            return self.await_in_flight_batch(&group.name, drain_manager).await;
        }

        if !all_desired_in_service(group) || !all_nodes_ready(group, nodes) {
            return Ok(TickOutcome { done: false });
        }
        // ReadinessGatesPassing: reserved extension point, a
        // no-op until a gate implementation exists.

        let targets = update_targets(group);
        if targets.is_empty() {
            return Ok(TickOutcome { done: true });
        }

        let max_unavailable = resolve_max_unavailable(&strategy.max_unavailable, group.instances.len());
        let batch_size = max_unavailable
            .min(targets.len())
            .min(group.desired_capacity.max(1) as usize);
        let batch = &targets[..batch_size];

        tracing::info!(
            scaling_group = group.name,
            batch_size,
            targets = targets.len(),
            instances = crate::tags::join_identifiers(batch.iter().map(|i| i.instance_id.as_str())),
            "starting a drain batch"
        );
        for instance in batch {
            let Some(node) = nodes.iter().find(|n| n.instance_id == instance.instance_id) else {
                continue;
            };
            let node_name = node.name.clone();
            let instance_id = instance.instance_id.clone();
            drain_manager.batch_instance_ids.push(instance_id.clone());

            let node_api: Api<Node> = Api::all(self.kube_client.as_kube_client());
            let pod_api: Api<Pod> = Api::all(self.kube_client.as_kube_client());
            let strategy = strategy.clone();
            drain_manager.tasks.spawn(async move {
                let timeout = Duration::from_secs(strategy.drain_timeout_seconds as u64);
                let outcome = match tokio::time::timeout(timeout, drain_one_node(&node_api, &pod_api, &node_name, &strategy)).await {
                    Ok(result) => result,
                    Err(_elapsed) => Err(Error::DrainTimeout {
                        node: node_name.clone(),
                        timeout_secs: strategy.drain_timeout_seconds,
                    }),
                };
                match outcome {
                    Ok(()) => DrainOutcome::Drained { instance_id },
                    Err(err) => {
                        let _ = uncordon(&node_api, &node_name).await;
                        DrainOutcome::Failed(err)
                    }
                }
            });
        }

        self.await_in_flight_batch(&group.name, drain_manager).await
    }

    async fn await_in_flight_batch(
        &self,
        group_name: &str,
        drain_manager: &mut DrainManager,
    ) -> Result<TickOutcome> {
        match drain_manager.wait().await {
            WaitResult::TimedOut => Ok(TickOutcome { done: false }),
            WaitResult::Error(err) => {
                tracing::warn!(scaling_group = group_name, %err, "drain batch failed, will retry next tick");
                Err(err)
            }
            WaitResult::AllDrained => {
                let batch = std::mem::take(&mut drain_manager.batch_instance_ids);
                if !batch.is_empty() {
                    self.clients
                        .scaling
                        .terminate_instances(group_name, &batch)
                        .await
                        .context(TerminateSnafu)?;
                    tracing::info!(
                        scaling_group = group_name,
                        instances = crate::tags::join_identifiers(&batch),
                        "terminated drained batch"
                    );
                }
                Ok(TickOutcome { done: false })
            }
        }
    }
}

async fn drain_one_node(
    node_api: &Api<Node>,
    pod_api: &Api<Pod>,
    node_name: &str,
    strategy: &RollingUpdateStrategy,
) -> Result<()> {
    cordon(node_api, node_name).await?;

    let pods = pod_api
        .list(&ListParams::default().fields(&format!("spec.nodeName={node_name}")))
        .await
        .context(ListPodsSnafu { node: node_name })?;

    for pod in pods.items {
        if is_daemonset_pod(&pod) {
            continue;
        }
        let evict = EvictParams {
            delete_options: Some(DeleteParams {
                grace_period_seconds: None,
                ..DeleteParams::default()
            }),
            ..EvictParams::default()
        };
        if let Err(source) = pod_api.evict(&pod.name_any(), &evict).await {
            if strategy.force {
                let _ = pod_api.delete(&pod.name_any(), &DeleteParams::default()).await;
            } else {
                return Err(Error::Drain { node: node_name.to_string(), source });
            }
        }
    }

    Ok(())
}

fn is_daemonset_pod(pod: &Pod) -> bool {
    pod.owner_references().iter().any(|owner| owner.kind == "DaemonSet")
}

async fn cordon(api: &Api<Node>, node_name: &str) -> Result<()> {
    let patch = serde_json::json!({ "spec": { "unschedulable": true } });
    api.patch(node_name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Merge(&patch))
        .await
        .context(CordonSnafu { node: node_name })?;
    Ok(())
}

async fn uncordon(api: &Api<Node>, node_name: &str) -> Result<()> {
    let patch = serde_json::json!({ "spec": { "unschedulable": false } });
    api.patch(node_name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Merge(&patch))
        .await
        .context(UncordonSnafu { node: node_name })?;
    Ok(())
}

/// `spec.md` §4.5 classification: transient lifecycle states are never targets; the remainder
/// is a target iff its config identity differs from the group's active one.
fn update_targets(group: &ScalingGroup) -> Vec<GroupInstance> {
    let mut targets: Vec<GroupInstance> = group
        .instances
        .iter()
        .filter(|i| !i.lifecycle_state.is_transient())
        .filter(|i| instance_config_differs(i, &group.config_identity))
        .cloned()
        .collect();
    targets.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
    targets
}

fn instance_config_differs(instance: &GroupInstance, active: &ScalingConfigIdentity) -> bool {
    match (&instance.config_ref, active) {
        (InstanceConfigRef::None, _) => true,
        (InstanceConfigRef::LaunchConfiguration(name), ScalingConfigIdentity::LaunchConfiguration(active_name)) => {
            name != active_name
        }
        (
            InstanceConfigRef::LaunchTemplate { name, version },
            ScalingConfigIdentity::LaunchTemplate { name: active_name, version: active_version },
        ) => name != active_name || version != active_version,
        _ => true,
    }
}

fn all_desired_in_service(group: &ScalingGroup) -> bool {
    let in_service = group
        .instances
        .iter()
        .filter(|i| matches!(i.lifecycle_state, crate::aws::model::LifecycleState::InService))
        .count();
    in_service as i32 == group.desired_capacity
}

fn all_nodes_ready(group: &ScalingGroup, nodes: &[NodeInfo]) -> bool {
    group.instances.iter().all(|instance| {
        nodes
            .iter()
            .find(|n| n.instance_id == instance.instance_id)
            .map(|n| n.ready)
            .unwrap_or(false)
    })
}

/// Resolves `maxUnavailable` against the current instance count; always at least 1.
fn resolve_max_unavailable(value: &crate::crd::MaxUnavailable, total: usize) -> usize {
    let resolved = match value {
        crate::crd::MaxUnavailable::Count(n) => *n as usize,
        crate::crd::MaxUnavailable::Percent(p) => {
            let pct: f64 = p.trim_end_matches('%').parse().unwrap_or(0.0);
            ((total as f64) * (pct / 100.0)).round() as usize
        }
    };
    resolved.max(1)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::aws::model::LifecycleState;

    fn instance(id: &str, state: LifecycleState, config: InstanceConfigRef) -> GroupInstance {
        GroupInstance {
            instance_id: id.to_string(),
            availability_zone: "us-west-2a".to_string(),
            lifecycle_state: state,
            config_ref: config,
        }
    }

    fn group(instances: Vec<GroupInstance>) -> ScalingGroup {
        ScalingGroup {
            name: "ig-test".to_string(),
            min_size: 1,
            max_size: 3,
            desired_capacity: instances.len() as i32,
            subnets: vec![],
            config_identity: ScalingConfigIdentity::LaunchConfiguration("ig-test-v2".to_string()),
            instances,
            tags: BTreeMap::new(),
            suspended_processes: vec![],
            warm_pool_status: None,
        }
    }

    #[test]
    fn targets_exclude_transient_and_current_config() {
        let g = group(vec![
            instance("i-1", LifecycleState::InService, InstanceConfigRef::LaunchConfiguration("ig-test-v1".to_string())),
            instance("i-2", LifecycleState::InService, InstanceConfigRef::LaunchConfiguration("ig-test-v2".to_string())),
            instance("i-3", LifecycleState::Terminating, InstanceConfigRef::LaunchConfiguration("ig-test-v1".to_string())),
        ]);
        let targets = update_targets(&g);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].instance_id, "i-1");
    }

    #[test]
    fn targets_sorted_lexicographically() {
        let g = group(vec![
            instance("i-20", LifecycleState::InService, InstanceConfigRef::None),
            instance("i-3", LifecycleState::InService, InstanceConfigRef::None),
        ]);
        let targets = update_targets(&g);
        assert_eq!(targets[0].instance_id, "i-20");
        assert_eq!(targets[1].instance_id, "i-3");
    }

    #[test]
    fn resolve_max_unavailable_percent_rounds_and_floors_at_one() {
        assert_eq!(resolve_max_unavailable(&crate::crd::MaxUnavailable::Percent("10%".to_string()), 3), 1);
        assert_eq!(resolve_max_unavailable(&crate::crd::MaxUnavailable::Count(0), 10), 1);
    }

    #[test]
    fn all_nodes_ready_requires_every_instance_matched() {
        let g = group(vec![instance("i-1", LifecycleState::InService, InstanceConfigRef::None)]);
        let nodes = vec![NodeInfo { name: "node-1".to_string(), instance_id: "i-1".to_string(), ready: true }];
        assert!(all_nodes_ready(&g, &nodes));
        let nodes_not_ready = vec![NodeInfo { name: "node-1".to_string(), instance_id: "i-1".to_string(), ready: false }];
        assert!(!all_nodes_ready(&g, &nodes_not_ready));
    }
}
