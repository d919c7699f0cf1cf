//! Top-level reconcile loop for `InstanceGroup`. Wires discovery, the drift-aware
//! planner, the rolling-update orchestrator, and node authorization into the state machine in
//! `state.rs`. Deletion runs through `kube::runtime::finalizer` so cloud teardown (scaling
//! group, role, and the shared `aws-auth` entry) completes before the resource disappears.

use std::{collections::HashMap, sync::Arc, time::Duration};

use snafu::ResultExt;
use stackable_operator::{
    kube::{
        Api, ResourceExt,
        runtime::{controller::Action, events::Recorder, finalizer, reflector::ObjectRef},
    },
    status::condition::{ClusterCondition, ClusterConditionStatus, ClusterConditionType},
};
use tokio::sync::Mutex;

use crate::{
    authconfig::AuthConfig,
    aws::client::CloudClients,
    crd::{
        ReconcileState,
        status::{InstanceGroupStatus, Lifecycle},
        v1alpha1::InstanceGroup,
    },
    discovery::{self, CloudDiscovery, DiscoveredState},
    error::{self, Error},
    events,
    planner::Planner,
    readiness::{self, Readiness},
    rolling_update::{DrainManager, RollingUpdate},
    state,
};

pub const CONTROLLER_NAME: &str = "instancegroup";
pub const OPERATOR_NAME: &str = "instancegroups.keikoproj.io";
pub const FULL_CONTROLLER_NAME: &str = "instancegroup.instancegroups.keikoproj.io";

const FIELD_MANAGER: &str = "instance-group-operator";
const FINALIZER: &str = "instancegroups.keikoproj.io/cloud-resources";
const RETRY_BACKOFF: Duration = Duration::from_secs(15);

pub struct Ctx {
    pub client: stackable_operator::client::Client,
    pub clients: CloudClients,
    pub cluster_name: String,
    pub auth_config: AuthConfig,
    pub recorder: Arc<Recorder>,
    /// One [`DrainManager`] per instance group, keyed by `namespace/name`. A reconcile tick is
    /// stateless by construction, but an in-flight drain batch has to survive
    /// across ticks, so it lives here rather than on the stack of `apply`.
    drain_managers: Mutex<HashMap<String, DrainManager>>,
}

impl Ctx {
    pub fn new(
        client: stackable_operator::client::Client,
        clients: CloudClients,
        cluster_name: String,
        recorder: Arc<Recorder>,
    ) -> Self {
        Ctx {
            auth_config: AuthConfig::new(&client),
            client,
            clients,
            cluster_name,
            recorder,
            drain_managers: Mutex::new(HashMap::new()),
        }
    }
}

pub async fn reconcile_instance_group(instance_group: Arc<InstanceGroup>, ctx: Arc<Ctx>) -> error::Result<Action> {
    let namespace = instance_group.namespace_or_err().context(error::CrdSnafu)?;
    let api: Api<InstanceGroup> = Api::namespaced(ctx.client.as_kube_client(), &namespace);
    let failed_object = instance_group.clone();

    let result = finalizer(&api, FINALIZER, instance_group, |event| async {
        match event {
            finalizer::Event::Apply(ig) => apply(ig, &ctx).await,
            finalizer::Event::Cleanup(ig) => cleanup(ig, &ctx).await,
        }
    })
    .await
    .map_err(|err| match err {
        finalizer::Error::ApplyFailed(err) | finalizer::Error::CleanupFailed(err) => err,
        finalizer::Error::AddFinalizer(source) | finalizer::Error::RemoveFinalizer(source) => {
            Error::FinalizerWrite { source }
        }
        finalizer::Error::UnnamedObject => Error::UnnamedObject,
        finalizer::Error::InvalidFinalizer => Error::InvalidFinalizer,
    });

    if let Err(reconcile_error) = &result {
        if !reconcile_error.retryable() {
            persist_terminal_error(&ctx, &failed_object).await;
        }
    }

    result
}

/// A non-retryable error still has to leave a trace on the resource: `error_policy` only picks
/// the next requeue `Action`, it never sees the `api` handle needed to patch status, so the
/// terminal `Err` state is written here instead, right where the error first surfaces.
async fn persist_terminal_error(ctx: &Ctx, instance_group: &InstanceGroup) {
    let mut status = instance_group.status.clone().unwrap_or_default();
    status.state = ReconcileState::Err;
    if let Err(patch_error) = ctx.client.apply_patch_status(FIELD_MANAGER, instance_group, &status).await {
        tracing::warn!(
            error = %patch_error,
            instance_group = instance_group.name_any(),
            "failed to persist the terminal error state"
        );
    }
}

/// Every non-delete `ReconcileState` runs through here: discovery first, then whatever action
/// the current state calls for, folded back into the next state via `state.rs`.
#[tracing::instrument(
    name = "reconcile",
    skip_all,
    fields(instance_group = %instance_group.name_any())
)]
async fn apply(instance_group: Arc<InstanceGroup>, ctx: &Ctx) -> std::result::Result<Action, Error> {
    let Some(eks) = instance_group.spec.eks.as_ref() else {
        // eksManaged/eksFargate are accepted but not reconciled.
        return Ok(Action::await_change());
    };

    if let Some(strategy) = instance_group.rolling_update_strategy() {
        if let Err(reason) = error::validate_strategy(&strategy) {
            return Err(Error::StrategyValidation { reason });
        }
    }

    let namespace = instance_group.namespace_or_err().context(error::CrdSnafu)?;
    let key = format!("{namespace}/{}", instance_group.name_any());

    let discovery = CloudDiscovery {
        clients: &ctx.clients,
        kube_client: &ctx.client,
        cluster_name: ctx.cluster_name.clone(),
    };
    let mut discovered = discovery.discover(&instance_group, eks).await.context(error::DiscoverySnafu)?;

    let current_state = instance_group.status.as_ref().map(|s| s.state).unwrap_or_default();
    let action = if current_state == ReconcileState::Init {
        state::route_init(false, &discovered).1
    } else {
        route_from_current_state(current_state)
    };

    let planner = Planner {
        clients: &ctx.clients,
        cluster_name: &ctx.cluster_name,
    };

    let (next_state, role_arn, readiness) = match action {
        state::Action::Create => {
            let outcome = planner.create(&instance_group, eks, &mut discovered).await.context(error::PlanSnafu)?;
            events::instance_group_created(
                &ctx.recorder,
                &instance_group,
                discovered.scaling_config.name().unwrap_or_default(),
            )
            .await;
            (state::after_plan(&outcome, Readiness::NotReady), outcome.role_arn, Readiness::NotReady)
        }
        state::Action::Update => {
            let mut outcome = planner.update(&instance_group, eks, &mut discovered).await.context(error::PlanSnafu)?;
            if let crate::crd::UpgradeStrategy::Crd(strategy) = &eks.strategy {
                let active = crate::crd_strategy::is_active(&ctx.client, &namespace, &instance_group.name_any(), strategy)
                    .await
                    .context(error::CrdStrategySnafu)?;
                outcome.rotation_needed |= active;
            }
            let previous = previous_readiness(current_state);
            let readiness = publish_readiness_transition(ctx, &instance_group, &discovered, previous).await;
            (state::after_plan(&outcome, readiness), outcome.role_arn, readiness)
        }
        state::Action::Upgrade => {
            let Some(strategy) = instance_group.rolling_update_strategy() else {
                // A `Crd`-typed strategy delegates rollout to an external controller
                //: flag it and fall straight back to the normal
                // converge check rather than driving our own drain orchestrator.
                let previous = previous_readiness(current_state);
                let readiness = publish_readiness_transition(ctx, &instance_group, &discovered, previous).await;
                (state::after_upgrade_tick(true, readiness), role_arn_of(&discovered), readiness)
            } else {
                let Some(group) = discovered.scaling_group.clone() else {
                    return Ok(Action::requeue(RETRY_BACKOFF));
                };
                let rolling_update = RollingUpdate { clients: &ctx.clients, kube_client: &ctx.client };
                let mut drain_managers = ctx.drain_managers.lock().await;
                let drain_manager = drain_managers.entry(key.clone()).or_default();
                let outcome = rolling_update
                    .tick(&group, &discovered.nodes, &strategy, drain_manager)
                    .await
                    .context(error::DrainSnafu)?;
                if outcome.done {
                    drain_managers.remove(&key);
                }
                drop(drain_managers);
                let previous = previous_readiness(current_state);
                let readiness = publish_readiness_transition(ctx, &instance_group, &discovered, previous).await;
                (state::after_upgrade_tick(outcome.done, readiness), role_arn_of(&discovered), readiness)
            }
        }
        state::Action::Delete => unreachable!("route_from_current_state never returns Delete for the Apply path"),
    };

    if next_state != current_state {
        tracing::info!(
            instance_group = instance_group.name_any(),
            from = ?current_state,
            to = ?next_state,
            "reconcile state transition"
        );
    }

    if let Some(role_arn) = &role_arn {
        if let Err(error) = ctx.auth_config.ensure_role(role_arn).await {
            tracing::warn!(
                %error,
                instance_group = instance_group.name_any(),
                "failed to ensure node-authorization entry, will retry next tick"
            );
        }
    }

    let status = build_status(&instance_group, &discovered, next_state, role_arn, readiness);
    ctx.client
        .apply_patch_status(FIELD_MANAGER, &*instance_group, &status)
        .await
        .context(error::ApplyStatusSnafu)?;

    Ok(requeue_for(next_state))
}

/// The `InitDelete`/`Deleting` path. Runs the peer scan before removing the `aws-auth` entry,
/// so a role another `InstanceGroup` still shares is never torn down.
#[tracing::instrument(
    name = "cleanup",
    skip_all,
    fields(instance_group = %instance_group.name_any())
)]
async fn cleanup(instance_group: Arc<InstanceGroup>, ctx: &Ctx) -> std::result::Result<Action, Error> {
    let Some(eks) = instance_group.spec.eks.as_ref() else {
        return Ok(Action::await_change());
    };

    let namespace = instance_group.namespace_or_err().context(error::CrdSnafu)?;
    let discovery = CloudDiscovery {
        clients: &ctx.clients,
        kube_client: &ctx.client,
        cluster_name: ctx.cluster_name.clone(),
    };
    let discovered = discovery.discover(&instance_group, eks).await.context(error::DiscoverySnafu)?;

    let planner = Planner {
        clients: &ctx.clients,
        cluster_name: &ctx.cluster_name,
    };
    let torn_down = planner.delete(&discovered).await.context(error::PlanSnafu)?;

    if !torn_down {
        return Ok(Action::requeue(RETRY_BACKOFF));
    }

    if let Some(role_arn) = discovered.role.as_ref().map(|r| r.arn.clone()) {
        let shared =
            discovery::role_arn_shared_with_other_group(&ctx.client, &namespace, &role_arn, &instance_group.name_any())
                .await
                .context(error::DiscoverySnafu)?;
        if !shared {
            if let Err(error) = ctx.auth_config.remove_role(&role_arn).await {
                tracing::warn!(
                    %error,
                    instance_group = instance_group.name_any(),
                    "failed to remove node-authorization entry, will retry next tick"
                );
            }
        }
    }
    ctx.drain_managers.lock().await.remove(&format!("{namespace}/{}", instance_group.name_any()));

    Ok(Action::await_change())
}

fn route_from_current_state(state: ReconcileState) -> state::Action {
    match state {
        ReconcileState::InitCreate => state::Action::Create,
        ReconcileState::InitUpgrade => state::Action::Upgrade,
        _ => state::Action::Update,
    }
}

/// The readiness evaluator needs last tick's verdict, which this controller derives from
/// `status.state` rather than a separate stored field (`Modified` implies the group was last
/// observed `Ready`; anything else implies `NotReady` or unknown).
fn previous_readiness(state: ReconcileState) -> Option<Readiness> {
    match state {
        ReconcileState::Modified | ReconcileState::Ready => Some(Readiness::Ready),
        ReconcileState::Init => None,
        _ => Some(Readiness::NotReady),
    }
}

async fn publish_readiness_transition(
    ctx: &Ctx,
    instance_group: &InstanceGroup,
    discovered: &DiscoveredState,
    previous: Option<Readiness>,
) -> Readiness {
    let Some(group) = &discovered.scaling_group else {
        return Readiness::NotReady;
    };
    let (current, transitioned) = readiness::evaluate(group, &discovered.nodes, previous);
    match transitioned {
        Some(Readiness::Ready) => events::nodes_ready(&ctx.recorder, instance_group).await,
        Some(Readiness::NotReady) => events::nodes_not_ready(&ctx.recorder, instance_group).await,
        None => {}
    }
    current
}

fn role_arn_of(discovered: &DiscoveredState) -> Option<String> {
    discovered.role.as_ref().map(|r| r.arn.clone())
}

/// Builds (or refreshes) the `NodesReady` condition from the tick's evaluated `Readiness`,
/// replacing any previous entry of the same type rather than appending a duplicate.
fn nodes_ready_condition(readiness: Readiness) -> ClusterCondition {
    let ready = readiness == Readiness::Ready;
    ClusterCondition {
        type_: ClusterConditionType::Available,
        status: if ready {
            ClusterConditionStatus::True
        } else {
            ClusterConditionStatus::False
        },
        reason: Some(if ready { "NodesReady".to_string() } else { "NodesNotReady".to_string() }),
        message: Some(if ready {
            "all scaling-group instances are registered and ready".to_string()
        } else {
            "waiting for scaling-group instances to register as ready nodes".to_string()
        }),
        ..Default::default()
    }
}

fn merge_condition(mut conditions: Vec<ClusterCondition>, updated: ClusterCondition) -> Vec<ClusterCondition> {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == updated.type_) {
        *existing = updated;
    } else {
        conditions.push(updated);
    }
    conditions
}

fn build_status(
    instance_group: &InstanceGroup,
    discovered: &DiscoveredState,
    state: ReconcileState,
    role_arn: Option<String>,
    readiness: Readiness,
) -> InstanceGroupStatus {
    let previous = instance_group.status.clone().unwrap_or_default();
    let is_template = matches!(discovered.scaling_config, crate::scaling_config::ScalingConfig::Template(_));
    let (config_name, latest_template_version) = match discovered.scaling_config.identity() {
        Some(crate::scaling_config::ConfigIdentity::Classic { name }) => (Some(name.clone()), None),
        Some(crate::scaling_config::ConfigIdentity::Template { name, version }) => {
            (Some(name.clone()), Some(version.clone()))
        }
        None => (None, None),
    };

    InstanceGroupStatus {
        state,
        active_launch_configuration_name: (!is_template).then(|| config_name.clone()).flatten(),
        active_launch_template_name: is_template.then(|| config_name.clone()).flatten(),
        latest_template_version,
        current_min: discovered.scaling_group.as_ref().map(|g| g.min_size),
        current_max: discovered.scaling_group.as_ref().map(|g| g.max_size),
        lifecycle: classify_lifecycle(&instance_group.spec.eks),
        conditions: merge_condition(previous.conditions, nodes_ready_condition(readiness)),
        strategy_retry_count: previous.strategy_retry_count,
        nodes_instance_role_arn: role_arn.or(previous.nodes_instance_role_arn),
    }
}

/// `Mixed` when the group carries instance-type overrides (a mixed-instances policy), `Spot`
/// when a spot price is set without overrides, `Normal` otherwise.
fn classify_lifecycle(eks: &Option<crate::crd::v1alpha1::EksSpec>) -> Lifecycle {
    let Some(eks) = eks else {
        return Lifecycle::Normal;
    };
    if !eks.ec2_spec.instance_type_overrides.is_empty() {
        Lifecycle::Mixed
    } else if eks.ec2_spec.spot_price.is_some() {
        Lifecycle::Spot
    } else {
        Lifecycle::Normal
    }
}

fn requeue_for(state: ReconcileState) -> Action {
    if state.is_terminal() {
        Action::await_change()
    } else {
        Action::requeue(RETRY_BACKOFF)
    }
}

pub fn error_policy(_instance_group: Arc<InstanceGroup>, error: &Error, _ctx: Arc<Ctx>) -> Action {
    if error.retryable() {
        Action::requeue(RETRY_BACKOFF)
    } else {
        Action::await_change()
    }
}

/// Used by `main.rs` to build `ObjectRef`s for event-driven requeues.
pub fn object_ref(instance_group: &InstanceGroup) -> ObjectRef<InstanceGroup> {
    ObjectRef::from_obj(instance_group)
}
