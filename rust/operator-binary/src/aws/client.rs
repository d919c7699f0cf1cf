//! Narrow trait interfaces over the cloud SDK clients: the reconciler core (discovery, drift,
//! planner, rolling update) only ever depends on these traits, never on `aws-sdk-*` types
//! directly, so it stays testable with hand-written fakes.

use async_trait::async_trait;

use super::model::{
    ClusterMetadata, DesiredConfigInput, InstanceProfile, InstanceTypeInfo,
    LaunchTemplateDescription, LifecycleHook, Role, ScalingGroup,
};

/// Errors surfaced by the trait methods below. Deliberately coarse: the transient/permanent
/// classification is applied by the caller inspecting `is_transient`, not by the trait boundary.
#[derive(Debug)]
pub struct SdkError {
    pub message: String,
    pub is_transient: bool,
}

impl std::fmt::Display for SdkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SdkError {}

impl SdkError {
    pub fn transient(message: impl Into<String>) -> Self {
        SdkError {
            message: message.into(),
            is_transient: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        SdkError {
            message: message.into(),
            is_transient: false,
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;

/// List/describe scaling groups, lifecycle hooks, warm pools; create/update configs and
/// groups, tags, lifecycle hooks, metrics, processes, warm pool; terminate instances in a
/// batch.
#[async_trait]
pub trait ScalingGroupsApi: Send + Sync {
    async fn find_group_by_tags(
        &self,
        cluster_name: &str,
        namespace: &str,
        name: &str,
    ) -> SdkResult<Vec<ScalingGroup>>;

    async fn create_group(
        &self,
        name: &str,
        min_size: i32,
        max_size: i32,
        desired_capacity: i32,
        subnets: &[String],
        config: &DesiredConfigInput,
        config_identity_name: &str,
        template_version: Option<&str>,
        tags: &std::collections::BTreeMap<String, String>,
    ) -> SdkResult<()>;

    async fn update_group(
        &self,
        name: &str,
        min_size: i32,
        max_size: i32,
        subnets: &[String],
        config: &DesiredConfigInput,
        config_identity_name: &str,
        template_version: Option<&str>,
    ) -> SdkResult<()>;

    async fn delete_group(&self, name: &str) -> SdkResult<()>;

    async fn create_launch_configuration(
        &self,
        name: &str,
        config: &DesiredConfigInput,
    ) -> SdkResult<()>;

    async fn create_launch_template_version(
        &self,
        template_name: &str,
        config: &DesiredConfigInput,
    ) -> SdkResult<String>;

    /// Reads back the live classic launch configuration by name, if it still exists, so
    /// discovery can compare against it instead of assuming drift on every tick.
    async fn describe_launch_configuration(&self, name: &str) -> SdkResult<Option<DesiredConfigInput>>;

    /// Reads back the default version of a launch template by name, if it still exists.
    async fn describe_launch_template(&self, name: &str) -> SdkResult<Option<LaunchTemplateDescription>>;

    async fn create_or_update_tags(
        &self,
        group_name: &str,
        tags: &std::collections::BTreeMap<String, String>,
    ) -> SdkResult<()>;

    async fn delete_tags(&self, group_name: &str, keys: &[String]) -> SdkResult<()>;

    async fn put_lifecycle_hooks(
        &self,
        group_name: &str,
        hooks: &[LifecycleHook],
    ) -> SdkResult<()>;

    async fn delete_lifecycle_hooks(&self, group_name: &str, names: &[String]) -> SdkResult<()>;

    async fn describe_lifecycle_hooks(&self, group_name: &str) -> SdkResult<Vec<LifecycleHook>>;

    async fn update_metrics_collection(
        &self,
        group_name: &str,
        enable: &[String],
        disable: &[String],
    ) -> SdkResult<()>;

    async fn suspend_processes(&self, group_name: &str, processes: &[String]) -> SdkResult<()>;

    async fn resume_processes(&self, group_name: &str, processes: &[String]) -> SdkResult<()>;

    async fn terminate_instances(
        &self,
        group_name: &str,
        instance_ids: &[String],
    ) -> SdkResult<()>;

    async fn put_warm_pool(&self, group_name: &str, min_size: i32, max_size: i32)
    -> SdkResult<()>;
}

/// Resolve the IAM role/instance-profile, either pre-existing or by name convention; create
/// role + profile, attach/detach managed policies.
#[async_trait]
pub trait IamApi: Send + Sync {
    async fn get_role(&self, name: &str) -> SdkResult<Option<Role>>;
    async fn get_role_by_arn(&self, arn: &str) -> SdkResult<Option<Role>>;
    async fn create_role(&self, name: &str) -> SdkResult<Role>;
    async fn delete_role(&self, name: &str) -> SdkResult<()>;

    async fn get_instance_profile(&self, name: &str) -> SdkResult<Option<InstanceProfile>>;
    async fn create_instance_profile(
        &self,
        name: &str,
        role_name: &str,
    ) -> SdkResult<InstanceProfile>;
    async fn delete_instance_profile(&self, name: &str) -> SdkResult<()>;

    async fn list_attached_policies(&self, role_name: &str) -> SdkResult<Vec<String>>;
    async fn attach_policy(&self, role_name: &str, policy_arn: &str) -> SdkResult<()>;
    async fn detach_policy(&self, role_name: &str, policy_arn: &str) -> SdkResult<()>;
}

/// Resolve security-group/subnet references, and instance-type info for mixed-instances
/// sub-family pools.
#[async_trait]
pub trait Ec2Api: Send + Sync {
    async fn resolve_security_groups(&self, refs: &[String]) -> SdkResult<Vec<String>>;
    async fn resolve_subnets(&self, refs: &[String]) -> SdkResult<Vec<String>>;
    async fn describe_instance_types(
        &self,
        instance_types: &[String],
    ) -> SdkResult<Vec<InstanceTypeInfo>>;
}

/// Resolve the image sentinel via parameter store.
#[async_trait]
pub trait SsmApi: Send + Sync {
    async fn get_parameter(&self, path: &str) -> SdkResult<String>;
}

/// Cluster metadata (version, endpoint, CA).
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn describe_cluster(&self, name: &str) -> SdkResult<ClusterMetadata>;
}

/// Bundles the cloud client handles the reconciler needs per tick. All SDK clients are shared
/// read-only; this is a plain `Arc`-able bundle, no interior mutability.
pub struct CloudClients {
    pub scaling: std::sync::Arc<dyn ScalingGroupsApi>,
    pub iam: std::sync::Arc<dyn IamApi>,
    pub ec2: std::sync::Arc<dyn Ec2Api>,
    pub ssm: std::sync::Arc<dyn SsmApi>,
    pub cluster: std::sync::Arc<dyn ClusterApi>,
}
