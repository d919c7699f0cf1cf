//! The `InstanceGroup` custom resource: a declared pool of worker compute attached to a
//! managed Kubernetes cluster.

pub mod annotations;
pub mod status;

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, Snafu};
use stackable_operator::{
    kube::{CustomResource, ResourceExt, runtime::reflector::ObjectRef},
    schemars,
    status::condition::{ClusterCondition, HasStatusCondition},
    versioned::versioned,
};

pub use status::{InstanceGroupStatus, Lifecycle, ReconcileState};

pub const GROUP: &str = "instancegroups.keikoproj.io";

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("object {obj_ref} has no namespace"))]
    ObjectHasNoNamespace { obj_ref: ObjectRef<v1alpha1::InstanceGroup> },

    #[snafu(display("instance group declares no eks spec (eksManaged/eksFargate are recognized but not reconciled by this controller)"))]
    NoEksSpec,
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[versioned(
    version(name = "v1alpha1"),
    crates(
        kube_core = "stackable_operator::kube::core",
        kube_client = "stackable_operator::kube::client",
        k8s_openapi = "stackable_operator::k8s_openapi",
        schemars = "stackable_operator::schemars",
        versioned = "stackable_operator::versioned"
    )
)]
pub mod versioned {
    /// An InstanceGroup is a pool of worker compute (a cloud auto-scaling group) attached to a
    /// managed Kubernetes cluster. The controller drives cloud state until it matches the
    /// declared spec, then rotates in-service nodes whose configuration has drifted.
    #[versioned(crd(
        group = "instancegroups.keikoproj.io",
        plural = "instancegroups",
        shortname = "ig",
        status = "InstanceGroupStatus",
        namespaced
    ))]
    #[derive(Clone, CustomResource, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct InstanceGroupSpec {
        /// Settings for an EKS-style managed node pool backed by a scaling group this
        /// controller owns. This is the only variant this controller's reconciler drives.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub eks: Option<v1alpha1::EksSpec>,

        /// Recognized but not reconciled by this controller; present only so the CRD accepts
        /// resources authored for EKS-managed node groups without failing validation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub eks_managed: Option<serde_json::Value>,

        /// Recognized but not reconciled by this controller; present only so the CRD accepts
        /// resources authored for Fargate profiles without failing validation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub eks_fargate: Option<serde_json::Value>,
    }

    #[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct EksSpec {
        /// Minimum number of instances in the scaling group.
        pub min_size: i32,
        /// Maximum number of instances in the scaling group.
        pub max_size: i32,

        /// Which scaling-configuration kind backs this group.
        #[serde(default)]
        pub r#type: super::ScalingConfigKind,

        pub ec2_spec: v1alpha1::Ec2Spec,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub iam_config: Option<v1alpha1::IamConfig>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub warm_pool: Option<v1alpha1::WarmPoolSpec>,

        #[serde(default)]
        pub configuration: v1alpha1::ClusterConfiguration,

        /// Strategy used to rotate in-service nodes when the scaling config drifts.
        #[serde(default)]
        pub strategy: super::UpgradeStrategy,
    }

    #[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Ec2Spec {
        /// Literal AMI id, the sentinel `"latest"`, or `"ssm://<parameter-name>"`.
        pub image: String,

        /// Primary instance type.
        pub instance_type: String,

        /// Additional instance types with relative weights, used for a
        /// `MixedInstancesPolicy` on template-backed groups.
        #[serde(default)]
        pub instance_type_overrides: Vec<super::InstanceTypeOverride>,

        /// Key-pair name injected into the scaling configuration.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub key_pair_name: Option<String>,

        /// Security groups, referenced by id or by Name tag.
        #[serde(default)]
        pub security_groups: Vec<String>,

        /// Subnets, referenced by id or by Name tag.
        #[serde(default)]
        pub subnets: Vec<String>,

        /// Spot price, if set the group is spot-only (`Lifecycle::Spot`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub spot_price: Option<String>,

        /// Ratio of on-demand/spot instances for a mixed-instances policy
        /// (`Lifecycle::Mixed` when set together with `instanceTypeOverrides`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub spot_allocation_strategy: Option<String>,

        #[serde(default)]
        pub volumes: Vec<super::VolumeSpec>,

        #[serde(default)]
        pub bootstrap_options: super::BootstrapOptions,

        #[serde(default)]
        pub user_data: super::UserDataStages,

        #[serde(default)]
        pub labels: BTreeMap<String, String>,

        #[serde(default)]
        pub taints: Vec<super::Taint>,

        #[serde(default)]
        pub lifecycle_hooks: Vec<super::LifecycleHookSpec>,

        #[serde(default)]
        pub metrics_collection: Vec<String>,

        #[serde(default)]
        pub additional_tags: BTreeMap<String, String>,
    }

    #[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct IamConfig {
        /// When set, the controller treats the role as externally owned: it is never created,
        /// mutated, or deleted by this controller.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub preferred_instance_profile_arn: Option<String>,

        #[serde(default)]
        pub managed_policies: Vec<String>,
    }

    #[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct WarmPoolSpec {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub min_size: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub max_size: Option<i32>,
    }

    #[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ClusterConfiguration {
        #[serde(default)]
        pub suspended_processes: Vec<String>,
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum ScalingConfigKind {
    #[default]
    LaunchConfiguration,
    LaunchTemplate,
}

#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum UpgradeStrategy {
    RollingUpdate(RollingUpdateStrategy),
    Crd(CrdStrategy),
}

impl Default for UpgradeStrategy {
    fn default() -> Self {
        UpgradeStrategy::RollingUpdate(RollingUpdateStrategy::default())
    }
}

#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollingUpdateStrategy {
    #[serde(default = "default_max_unavailable")]
    pub max_unavailable: MaxUnavailable,
    #[serde(default = "default_drain_timeout_seconds")]
    pub drain_timeout_seconds: u32,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub readiness_gates: Vec<String>,
}

impl Default for RollingUpdateStrategy {
    fn default() -> Self {
        RollingUpdateStrategy {
            max_unavailable: default_max_unavailable(),
            drain_timeout_seconds: default_drain_timeout_seconds(),
            force: true,
            readiness_gates: Vec::new(),
        }
    }
}

fn default_max_unavailable() -> MaxUnavailable {
    MaxUnavailable::Count(1)
}

fn default_drain_timeout_seconds() -> u32 {
    900
}

#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MaxUnavailable {
    Count(u32),
    Percent(String),
}

#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrdStrategy {
    pub crd_name: String,
    pub spec: serde_json::Value,
    pub status_json_path: String,
    pub status_success_string: String,
    pub status_failure_string: String,
}

#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceTypeOverride {
    pub instance_type: String,
    #[serde(default = "default_weight")]
    pub weighted_capacity: u32,
}

fn default_weight() -> u32 {
    1
}

#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iops: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput: Option<i32>,
    #[serde(default)]
    pub mount_options: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_runtime: Option<String>,
    #[serde(default)]
    pub arguments: Vec<String>,
}

/// Base64-encoded user-data stages, each consumed by the producer selected by
/// the `os-family` annotation. Byte-stable for identical inputs.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDataStages {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_bootstrap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_bootstrap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_config_yaml: Option<String>,
}

#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Taint {
    pub key: String,
    pub value: String,
    pub effect: String,
}

#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleHookSpec {
    pub name: String,
    pub transition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_target_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_timeout: Option<i32>,
}

impl HasStatusCondition for v1alpha1::InstanceGroup {
    fn conditions(&self) -> Vec<ClusterCondition> {
        match &self.status {
            Some(status) => status.conditions.clone(),
            None => vec![],
        }
    }
}

impl v1alpha1::InstanceGroup {
    pub fn eks_spec(&self) -> Result<&v1alpha1::EksSpec> {
        self.spec.eks.as_ref().context(NoEksSpecSnafu)
    }

    pub fn namespace_or_err(&self) -> Result<String> {
        self.namespace().with_context(|| ObjectHasNoNamespaceSnafu {
            obj_ref: ObjectRef::from_obj(self),
        })
    }

    pub fn scaling_config_kind(&self) -> ScalingConfigKind {
        self.spec
            .eks
            .as_ref()
            .map(|eks| eks.r#type)
            .unwrap_or_default()
    }

    pub fn rolling_update_strategy(&self) -> Option<RollingUpdateStrategy> {
        match &self.spec.eks.as_ref()?.strategy {
            UpgradeStrategy::RollingUpdate(strategy) => Some(strategy.clone()),
            UpgradeStrategy::Crd(_) => None,
        }
    }
}
