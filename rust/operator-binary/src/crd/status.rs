use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use stackable_operator::status::condition::ClusterCondition;

/// One type, one transition table.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub enum ReconcileState {
    #[default]
    Init,
    InitCreate,
    InitUpdate,
    InitUpgrade,
    InitDelete,
    Modifying,
    Modified,
    Deleting,
    Deleted,
    Ready,
    Err,
}

impl ReconcileState {
    pub const RETRYABLE: &'static [ReconcileState] = &[
        ReconcileState::Deleting,
        ReconcileState::Init,
        ReconcileState::InitCreate,
        ReconcileState::InitDelete,
        ReconcileState::InitUpdate,
        ReconcileState::InitUpgrade,
        ReconcileState::Modified,
        ReconcileState::Modifying,
    ];

    pub const TERMINAL: &'static [ReconcileState] = &[
        ReconcileState::Deleted,
        ReconcileState::Ready,
        ReconcileState::Err,
    ];

    pub fn is_retryable(self) -> bool {
        Self::RETRYABLE.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub enum Lifecycle {
    #[default]
    Normal,
    Spot,
    Mixed,
}

#[derive(Clone, Default, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceGroupStatus {
    #[serde(default)]
    pub state: ReconcileState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_launch_configuration_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_launch_template_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_template_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_min: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_max: Option<i32>,

    #[serde(default)]
    pub lifecycle: Lifecycle,

    #[serde(default)]
    pub conditions: Vec<ClusterCondition>,

    #[serde(default)]
    pub strategy_retry_count: u32,

    /// The IAM role ARN used by instances in this group's scaling group. Used by the delete
    /// path's peer scan to decide whether another
    /// `InstanceGroup` still shares the role before removing it from node authorization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes_instance_role_arn: Option<String>,
}
