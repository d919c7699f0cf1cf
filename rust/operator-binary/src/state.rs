//! One type, one transition table. [`ReconcileState`] lives in `crd::status`; this module is the
//! one place that decides the next state, so no other helper writes `status.state` directly.

use crate::{crd::ReconcileState, discovery::DiscoveredState, planner::PlanOutcome, readiness::Readiness};

/// What the caller should do this tick, decided from the current state and what discovery saw.
pub enum Action {
    Create,
    Update,
    Upgrade,
    Delete,
}

/// `Init` transition: routes a fresh or rehydrated resource onto the right path based on whether
/// a deletion timestamp is set and whether a ScalingGroup already exists.
pub fn route_init(deletion_requested: bool, discovered: &DiscoveredState) -> (ReconcileState, Action) {
    if deletion_requested {
        return (ReconcileState::InitDelete, Action::Delete);
    }
    if discovered.scaling_group.is_some() {
        (ReconcileState::InitUpdate, Action::Update)
    } else {
        (ReconcileState::InitCreate, Action::Create)
    }
}

/// After the Create or Update path runs, folds the planner's outcome and node readiness into
/// the next state. Rotation always implies `InitUpgrade` or later; the state never regresses
/// without a completed rollout.
pub fn after_plan(outcome: &PlanOutcome, readiness: Readiness) -> ReconcileState {
    if outcome.short_circuited {
        return ReconcileState::Modifying;
    }
    if outcome.rotation_needed {
        return ReconcileState::InitUpgrade;
    }
    match readiness {
        Readiness::Ready => ReconcileState::Modified,
        Readiness::NotReady => ReconcileState::Modifying,
    }
}

/// After a rolling-update tick: `done=true` means no update targets remain, so the group falls
/// back to the normal converge check; otherwise stay in `InitUpgrade` for the next tick.
pub fn after_upgrade_tick(done: bool, readiness: Readiness) -> ReconcileState {
    if !done {
        return ReconcileState::InitUpgrade;
    }
    match readiness {
        Readiness::Ready => ReconcileState::Modified,
        Readiness::NotReady => ReconcileState::Modifying,
    }
}

/// `Modified` is steady state; a drift re-detected on a later tick routes back through
/// `Modifying`/`InitUpgrade` via `after_plan`, never straight to `Ready` without re-running the
/// planner.
pub fn after_delete_tick(torn_down: bool) -> ReconcileState {
    if torn_down {
        ReconcileState::Deleted
    } else {
        ReconcileState::Deleting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovered_with_group(present: bool) -> DiscoveredState {
        use crate::aws::model::ClusterMetadata;
        use crate::scaling_config::{ClassicConfig, ScalingConfig};

        DiscoveredState {
            cluster: ClusterMetadata::default(),
            scaling_group: present.then(|| crate::aws::model::ScalingGroup {
                name: "ig-test".to_string(),
                min_size: 1,
                max_size: 1,
                desired_capacity: 1,
                subnets: vec![],
                config_identity: crate::aws::model::ScalingConfigIdentity::LaunchConfiguration("v1".to_string()),
                instances: vec![],
                tags: Default::default(),
                suspended_processes: vec![],
                warm_pool_status: None,
            }),
            scaling_config: ScalingConfig::Classic(ClassicConfig::new(None, None)),
            role: None,
            instance_profile: None,
            attached_policies: vec![],
            lifecycle_hooks: vec![],
            nodes: vec![],
            instance_type_info: vec![],
            node_instance_pool: None,
        }
    }

    #[test]
    fn init_routes_to_delete_when_deletion_requested() {
        let discovered = discovered_with_group(true);
        let (state, action) = route_init(true, &discovered);
        assert_eq!(state, ReconcileState::InitDelete);
        assert!(matches!(action, Action::Delete));
    }

    #[test]
    fn init_routes_to_create_when_no_group_exists() {
        let discovered = discovered_with_group(false);
        let (state, action) = route_init(false, &discovered);
        assert_eq!(state, ReconcileState::InitCreate);
        assert!(matches!(action, Action::Create));
    }

    #[test]
    fn rotation_needed_always_routes_to_upgrade() {
        let outcome = PlanOutcome { rotation_needed: true, short_circuited: false, role_arn: None };
        assert_eq!(after_plan(&outcome, Readiness::Ready), ReconcileState::InitUpgrade);
    }

    #[test]
    fn short_circuit_stays_at_modifying_regardless_of_readiness() {
        let outcome = PlanOutcome { rotation_needed: false, short_circuited: true, role_arn: None };
        assert_eq!(after_plan(&outcome, Readiness::Ready), ReconcileState::Modifying);
    }

    #[test]
    fn upgrade_tick_not_done_stays_in_upgrade() {
        assert_eq!(after_upgrade_tick(false, Readiness::Ready), ReconcileState::InitUpgrade);
    }
}
