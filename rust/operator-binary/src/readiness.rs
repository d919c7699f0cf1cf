//! Joins scaling-group instances against cluster nodes by provider-id suffix and decides
//! whether the group as a whole is ready. Edge-triggered: the caller only emits a
//! `NodesReady`/`NodesNotReady` event when the verdict flips from the previously observed one.

use crate::{aws::model::ScalingGroup, discovery::NodeInfo};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady,
}

/// An edge transition worth publishing an event for; `None` when the verdict is unchanged from
/// `previous`.
pub fn evaluate(group: &ScalingGroup, nodes: &[NodeInfo], previous: Option<Readiness>) -> (Readiness, Option<Readiness>) {
    let current = if group.instances.len() as i32 != group.desired_capacity {
        // Scaling in progress: treated as not-ready without flipping the edge unless it's an
        // actual change from the last observed verdict.
        Readiness::NotReady
    } else if group.instances.iter().all(|instance| {
        nodes
            .iter()
            .find(|n| n.instance_id == instance.instance_id)
            .map(|n| n.ready)
            .unwrap_or(false)
    }) {
        Readiness::Ready
    } else {
        Readiness::NotReady
    };

    let transitioned = match previous {
        Some(prev) if prev == current => None,
        _ => Some(current),
    };

    (current, transitioned)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::aws::model::{GroupInstance, InstanceConfigRef, LifecycleState, ScalingConfigIdentity};

    fn group(desired: i32, instances: Vec<GroupInstance>) -> ScalingGroup {
        ScalingGroup {
            name: "ig-test".to_string(),
            min_size: 1,
            max_size: 3,
            desired_capacity: desired,
            subnets: vec![],
            config_identity: ScalingConfigIdentity::LaunchConfiguration("v1".to_string()),
            instances,
            tags: BTreeMap::new(),
            suspended_processes: vec![],
            warm_pool_status: None,
        }
    }

    fn instance(id: &str) -> GroupInstance {
        GroupInstance {
            instance_id: id.to_string(),
            availability_zone: "us-west-2a".to_string(),
            lifecycle_state: LifecycleState::InService,
            config_ref: InstanceConfigRef::None,
        }
    }

    #[test]
    fn mismatched_instance_count_is_not_ready() {
        let g = group(2, vec![instance("i-1")]);
        let (current, transitioned) = evaluate(&g, &[], None);
        assert_eq!(current, Readiness::NotReady);
        assert_eq!(transitioned, Some(Readiness::NotReady));
    }

    #[test]
    fn all_ready_nodes_yields_ready() {
        let g = group(1, vec![instance("i-1")]);
        let nodes = vec![NodeInfo { name: "node-1".to_string(), instance_id: "i-1".to_string(), ready: true }];
        let (current, transitioned) = evaluate(&g, &nodes, Some(Readiness::NotReady));
        assert_eq!(current, Readiness::Ready);
        assert_eq!(transitioned, Some(Readiness::Ready));
    }

    #[test]
    fn no_event_when_verdict_unchanged() {
        let g = group(1, vec![instance("i-1")]);
        let nodes = vec![NodeInfo { name: "node-1".to_string(), instance_id: "i-1".to_string(), ready: true }];
        let (current, transitioned) = evaluate(&g, &nodes, Some(Readiness::Ready));
        assert_eq!(current, Readiness::Ready);
        assert_eq!(transitioned, None);
    }
}
