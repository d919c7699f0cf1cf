//! The three Kubernetes events this controller publishes against the `InstanceGroup` it's
//! reconciling, via `kube::runtime::events::{Recorder, Reporter}` constructed once at startup in
//! `main.rs` and shared across every reconcile invocation.

use stackable_operator::kube::{
    ResourceExt,
    runtime::events::{Event, EventType, Recorder},
};

use crate::crd::v1alpha1::InstanceGroup;

/// Published once, the tick an `InstanceGroup`'s backing scaling group is first created.
pub async fn instance_group_created(recorder: &Recorder, instance_group: &InstanceGroup, scaling_group_name: &str) {
    publish(
        recorder,
        instance_group,
        Event {
            type_: EventType::Normal,
            reason: "InstanceGroupCreated".to_string(),
            note: Some(format!("created scaling group {scaling_group_name}")),
            action: "Create".to_string(),
            secondary: None,
        },
    )
    .await
}

/// Edge-triggered on a `NotReady -> Ready` transition; never published on a
/// tick where readiness is unchanged.
pub async fn nodes_ready(recorder: &Recorder, instance_group: &InstanceGroup) {
    publish(
        recorder,
        instance_group,
        Event {
            type_: EventType::Normal,
            reason: "NodesReady".to_string(),
            note: Some("all scaling group instances have a ready node".to_string()),
            action: "Reconcile".to_string(),
            secondary: None,
        },
    )
    .await
}

/// Edge-triggered on a `Ready -> NotReady` transition.
pub async fn nodes_not_ready(recorder: &Recorder, instance_group: &InstanceGroup) {
    publish(
        recorder,
        instance_group,
        Event {
            type_: EventType::Warning,
            reason: "NodesNotReady".to_string(),
            note: Some("one or more scaling group instances have no ready node".to_string()),
            action: "Reconcile".to_string(),
            secondary: None,
        },
    )
    .await
}

async fn publish(recorder: &Recorder, instance_group: &InstanceGroup, event: Event) {
    if let Err(error) = recorder.publish(&event, &instance_group.object_ref(&())).await {
        tracing::warn!(
            %error,
            instance_group = instance_group.name_any(),
            "failed to publish event"
        );
    }
}
