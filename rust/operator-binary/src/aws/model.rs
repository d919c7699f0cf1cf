//! Domain types shared by discovery, drift detection, and the mutation planner. These are
//! deliberately decoupled from the `aws-sdk-*` wire types: the reconciler core only ever sees
//! these, which keeps it testable without live clients.

use std::collections::BTreeMap;

/// A block device mapping entry, compared field-by-field by the drift detector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockDevice {
    pub device_name: String,
    pub volume_type: String,
    pub size: i32,
    pub iops: Option<i32>,
    pub throughput: Option<i32>,
}

/// The resolved, desired shape of a scaling configuration — the input that the drift detector
/// and `ScalingConfig::Create`/`Drifted` both consume. All
/// references (security groups, subnets, AMI) are already resolved to ids by this point.
#[derive(Clone, Debug, PartialEq)]
pub struct DesiredConfigInput {
    pub image_id: String,
    pub instance_type: String,
    pub instance_profile_arn: String,
    pub key_name: Option<String>,
    pub spot_price: Option<String>,
    pub user_data: Vec<u8>,
    pub security_groups: Vec<String>,
    pub block_devices: Vec<BlockDevice>,

    // Template-only fields: metadata options, placement, license specifications, and the
    // mixed-instances policy structure.
    pub metadata_options: Option<MetadataOptions>,
    pub placement: Option<Placement>,
    pub license_specifications: Vec<String>,
    pub mixed_instances_policy: Option<MixedInstancesPolicy>,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct MetadataOptions {
    pub http_tokens: String,
    pub http_put_response_hop_limit: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Placement {
    pub tenancy: Option<String>,
    pub availability_zone: Option<String>,
}

/// A scaling-group knob that permits multiple instance types with weights and a spot/on-demand
/// ratio. Overrides are ordered: explicit instance types first, sub-family flexible pool entries
/// appended.
#[derive(Clone, Debug, PartialEq)]
pub struct MixedInstancesPolicy {
    pub on_demand_base_capacity: i32,
    pub on_demand_percentage_above_base_capacity: i32,
    pub spot_allocation_strategy: Option<String>,
    pub overrides: Vec<InstanceTypeOverride>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceTypeOverride {
    pub instance_type: String,
    pub weighted_capacity: u32,
}

/// Transient lifecycle states: an instance in one of these must
/// never be counted as an update target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    InService,
    Detaching,
    Pending,
    PendingProceed,
    PendingWait,
    EnteringStandby,
    Terminating,
    TerminatingWait,
    TerminatingProceed,
    Terminated,
    Standby,
}

impl LifecycleState {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LifecycleState::Detaching
                | LifecycleState::Pending
                | LifecycleState::PendingProceed
                | LifecycleState::PendingWait
                | LifecycleState::EnteringStandby
                | LifecycleState::Terminating
                | LifecycleState::TerminatingWait
                | LifecycleState::TerminatingProceed
                | LifecycleState::Terminated
        )
    }

    pub fn from_api_str(value: &str) -> Self {
        match value {
            "InService" => LifecycleState::InService,
            "Detaching" => LifecycleState::Detaching,
            "Pending" => LifecycleState::Pending,
            "Pending:Proceed" => LifecycleState::PendingProceed,
            "Pending:Wait" => LifecycleState::PendingWait,
            "EnteringStandby" => LifecycleState::EnteringStandby,
            "Terminating" => LifecycleState::Terminating,
            "Terminating:Wait" => LifecycleState::TerminatingWait,
            "Terminating:Proceed" => LifecycleState::TerminatingProceed,
            "Terminated" => LifecycleState::Terminated,
            "Standby" => LifecycleState::Standby,
            _ => LifecycleState::Pending,
        }
    }
}

/// Which configuration identity a live scaling-group instance references.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstanceConfigRef {
    LaunchConfiguration(String),
    LaunchTemplate { name: String, version: String },
    None,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupInstance {
    pub instance_id: String,
    pub availability_zone: String,
    pub lifecycle_state: LifecycleState,
    pub config_ref: InstanceConfigRef,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ScalingConfigIdentity {
    LaunchConfiguration(String),
    LaunchTemplate { name: String, version: String },
    Mixed(MixedInstancesPolicy),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScalingGroup {
    pub name: String,
    pub min_size: i32,
    pub max_size: i32,
    pub desired_capacity: i32,
    pub subnets: Vec<String>,
    pub config_identity: ScalingConfigIdentity,
    pub instances: Vec<GroupInstance>,
    pub tags: BTreeMap<String, String>,
    pub suspended_processes: Vec<String>,
    pub warm_pool_status: Option<WarmPoolStatus>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WarmPoolStatus {
    Stable,
    PendingDelete,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleHook {
    pub name: String,
    pub transition: String,
    pub role_arn: Option<String>,
    pub notification_target_arn: Option<String>,
    pub heartbeat_timeout: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Role {
    pub arn: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceProfile {
    pub arn: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ClusterMetadata {
    pub version: String,
    pub endpoint: String,
    pub certificate_authority: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceTypeInfo {
    pub instance_type: String,
    pub vcpus: i32,
    pub memory_mib: i64,
}

/// The resolved shape of a launch template's default version, read back from the cloud so
/// drift detection has something to compare against before any local rotation has happened.
#[derive(Clone, Debug, PartialEq)]
pub struct LaunchTemplateDescription {
    pub resolved: DesiredConfigInput,
    pub latest_version: String,
}
