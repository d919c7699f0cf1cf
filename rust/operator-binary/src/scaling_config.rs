//! A polymorphic value over {classic launch configuration, versioned launch template}. Modeled
//! as a tagged union matched in the planner, not as an inheritance hierarchy.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    aws::{
        client::{ScalingGroupsApi, SdkResult},
        model::{DesiredConfigInput, InstanceConfigRef, ScalingGroup},
    },
    drift::drifted,
};

/// Resolved live group instances + active identity, enough to answer
/// [`ScalingConfig::rotation_needed`] without re-fetching.
pub struct DiscoverInput<'a> {
    pub group: &'a ScalingGroup,
    pub latest_template_version: Option<&'a str>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigIdentity {
    Classic { name: String },
    Template { name: String, version: String },
}

impl ConfigIdentity {
    pub fn name(&self) -> &str {
        match self {
            ConfigIdentity::Classic { name } | ConfigIdentity::Template { name, .. } => name,
        }
    }
}

/// A live (or not-yet-created) scaling configuration, backing either a classic launch
/// configuration or a versioned launch template.
pub enum ScalingConfig {
    Classic(ClassicConfig),
    Template(VersionedTemplate),
}

impl ScalingConfig {
    pub fn provisioned(&self) -> bool {
        match self {
            ScalingConfig::Classic(c) => c.identity.is_some(),
            ScalingConfig::Template(t) => t.identity.is_some(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ScalingConfig::Classic(c) => c.identity.as_ref().map(ConfigIdentity::name),
            ScalingConfig::Template(t) => t.identity.as_ref().map(ConfigIdentity::name),
        }
    }

    pub fn identity(&self) -> Option<&ConfigIdentity> {
        match self {
            ScalingConfig::Classic(c) => c.identity.as_ref(),
            ScalingConfig::Template(t) => t.identity.as_ref(),
        }
    }

    /// The latest launch-template version discovered live, if this is a template-backed
    /// config; always `None` for classic configs, which have no version concept.
    pub fn latest_version(&self) -> Option<&str> {
        match self {
            ScalingConfig::Classic(_) => None,
            ScalingConfig::Template(t) => t.latest_version.as_deref(),
        }
    }

    pub async fn create(
        &mut self,
        api: &Arc<dyn ScalingGroupsApi>,
        desired: &DesiredConfigInput,
        name_prefix: &str,
    ) -> SdkResult<()> {
        match self {
            ScalingConfig::Classic(c) => c.create(api, desired, name_prefix).await,
            ScalingConfig::Template(t) => t.create(api, desired, name_prefix).await,
        }
    }

    pub fn drifted(&self, desired: &DesiredConfigInput) -> bool {
        match self {
            ScalingConfig::Classic(c) => c.drifted(desired),
            ScalingConfig::Template(t) => t.drifted(desired),
        }
    }

    pub fn rotation_needed(&self, input: &DiscoverInput<'_>) -> bool {
        match self {
            ScalingConfig::Classic(c) => c.rotation_needed(input),
            ScalingConfig::Template(t) => t.rotation_needed(input),
        }
    }
}

/// Unique name, `<prefix>-<unix-seconds>`. Collisions are astronomically unlikely within a
/// single instance group's lifetime and are not guarded against, matching the source system.
pub fn classic_config_name(prefix: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{prefix}-{now}")
}

/// `spec.md` §3, §4.1: immutable once created; drift always requires a fresh name + rotation.
pub struct ClassicConfig {
    pub identity: Option<ConfigIdentity>,
    pub resolved: Option<DesiredConfigInput>,
}

impl ClassicConfig {
    pub fn new(identity: Option<ConfigIdentity>, resolved: Option<DesiredConfigInput>) -> Self {
        ClassicConfig { identity, resolved }
    }

    pub async fn create(
        &mut self,
        api: &Arc<dyn ScalingGroupsApi>,
        desired: &DesiredConfigInput,
        name_prefix: &str,
    ) -> SdkResult<()> {
        let name = classic_config_name(name_prefix);
        api.create_launch_configuration(&name, desired).await?;
        self.identity = Some(ConfigIdentity::Classic { name });
        self.resolved = Some(desired.clone());
        Ok(())
    }

    pub fn drifted(&self, desired: &DesiredConfigInput) -> bool {
        match &self.resolved {
            Some(current) => drifted(current, desired),
            None => true,
        }
    }

    /// Configurations are immutable, so any drift at all forces a rotation of in-service
    /// nodes.
    pub fn rotation_needed(&self, input: &DiscoverInput<'_>) -> bool {
        let Some(ConfigIdentity::Classic { name }) = &self.identity else {
            return false;
        };
        input.group.instances.iter().any(|i| match &i.config_ref {
            InstanceConfigRef::LaunchConfiguration(n) => n != name,
            InstanceConfigRef::LaunchTemplate { .. } => true,
            InstanceConfigRef::None => true,
        })
    }
}

/// `spec.md` §3, §4.1: versions are appended, never rewritten; old versions are retained.
pub struct VersionedTemplate {
    pub identity: Option<ConfigIdentity>,
    pub resolved: Option<DesiredConfigInput>,
    pub latest_version: Option<String>,
}

impl VersionedTemplate {
    pub fn new(
        identity: Option<ConfigIdentity>,
        resolved: Option<DesiredConfigInput>,
        latest_version: Option<String>,
    ) -> Self {
        VersionedTemplate {
            identity,
            resolved,
            latest_version,
        }
    }

    pub async fn create(
        &mut self,
        api: &Arc<dyn ScalingGroupsApi>,
        desired: &DesiredConfigInput,
        name_prefix: &str,
    ) -> SdkResult<()> {
        let name = match &self.identity {
            Some(ConfigIdentity::Template { name, .. }) => name.clone(),
            _ => name_prefix.to_string(),
        };
        let version = api.create_launch_template_version(&name, desired).await?;
        self.identity = Some(ConfigIdentity::Template {
            name,
            version: version.clone(),
        });
        self.resolved = Some(desired.clone());
        self.latest_version = Some(version);
        Ok(())
    }

    /// §4.1: refresh `LatestVersion` — the live-discovery counterpart of [`Self::create`].
    pub fn discover(&mut self, latest_version: Option<String>) {
        self.latest_version = latest_version;
    }

    pub fn drifted(&self, desired: &DesiredConfigInput) -> bool {
        match &self.resolved {
            Some(current) => drifted(current, desired),
            None => true,
        }
    }

    /// True when some in-service instance references an older version or a different
    /// template name.
    pub fn rotation_needed(&self, input: &DiscoverInput<'_>) -> bool {
        let Some(ConfigIdentity::Template { name, .. }) = &self.identity else {
            return false;
        };
        let latest = input.latest_template_version.or(self.latest_version.as_deref());
        input.group.instances.iter().any(|i| match &i.config_ref {
            InstanceConfigRef::LaunchTemplate { name: n, version } => {
                n != name || Some(version.as_str()) != latest
            }
            InstanceConfigRef::LaunchConfiguration(_) => true,
            InstanceConfigRef::None => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::model::BlockDevice;

    fn config(image: &str) -> DesiredConfigInput {
        DesiredConfigInput {
            image_id: image.to_string(),
            instance_type: "m5.large".to_string(),
            instance_profile_arn: "arn:aws:iam::1:instance-profile/ig".to_string(),
            key_name: None,
            spot_price: None,
            user_data: b"data".to_vec(),
            security_groups: vec!["sg-1".to_string()],
            block_devices: vec![BlockDevice {
                device_name: "/dev/xvda".to_string(),
                volume_type: "gp3".to_string(),
                size: 20,
                iops: None,
                throughput: None,
            }],
            metadata_options: None,
            placement: None,
            license_specifications: vec![],
            mixed_instances_policy: None,
        }
    }

    #[test]
    fn classic_config_drift_forces_rotation_only_after_provisioned() {
        let c = ClassicConfig::new(None, None);
        assert!(c.drifted(&config("ami-a")));
    }

    #[test]
    fn classic_rotation_needed_when_instance_config_differs() {
        use crate::aws::model::{GroupInstance, LifecycleState};
        let c = ClassicConfig::new(
            Some(ConfigIdentity::Classic {
                name: "ig-123".to_string(),
            }),
            Some(config("ami-a")),
        );
        let group = ScalingGroup {
            name: "ig".to_string(),
            min_size: 1,
            max_size: 1,
            desired_capacity: 1,
            subnets: vec![],
            config_identity: crate::aws::model::ScalingConfigIdentity::LaunchConfiguration(
                "ig-123".to_string(),
            ),
            instances: vec![GroupInstance {
                instance_id: "i-1".to_string(),
                availability_zone: "us-west-2a".to_string(),
                lifecycle_state: LifecycleState::InService,
                config_ref: InstanceConfigRef::LaunchConfiguration("ig-old".to_string()),
            }],
            tags: Default::default(),
            suspended_processes: vec![],
            warm_pool_status: None,
        };
        let input = DiscoverInput {
            group: &group,
            latest_template_version: None,
        };
        assert!(c.rotation_needed(&input));
    }
}
