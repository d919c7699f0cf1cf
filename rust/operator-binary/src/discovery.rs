//! Reads current cloud and cluster state into a [`DiscoveredState`] snapshot that every other
//! reconcile step consumes. Rebuilt every tick, discarded at the end.

use std::collections::BTreeMap;

use snafu::{OptionExt, ResultExt, Snafu};
use stackable_operator::{
    k8s_openapi::api::core::v1::Node,
    kube::{Api, ResourceExt},
};

use crate::{
    aws::{
        client::CloudClients,
        model::{
            ClusterMetadata, InstanceProfile, InstanceTypeInfo, LifecycleHook, Role, ScalingGroup,
        },
    },
    crd::v1alpha1::{EksSpec, InstanceGroup},
    instance_types::sub_family_pool,
    scaling_config::{ClassicConfig, ConfigIdentity, ScalingConfig, VersionedTemplate},
};

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("multiple scaling groups are tagged for instance group {namespace}/{name}; operator action is required"))]
    AmbiguousOwnership { namespace: String, name: String },

    #[snafu(display("failed to resolve security groups or subnets"))]
    Resolution { source: crate::aws::client::SdkError },

    #[snafu(display("failed to describe cluster {name}"))]
    DescribeCluster {
        name: String,
        source: crate::aws::client::SdkError,
    },

    #[snafu(display("cloud query failed"))]
    CloudQuery { source: crate::aws::client::SdkError },

    #[snafu(display("failed to list cluster nodes"))]
    ListNodes {
        source: stackable_operator::kube::Error,
    },

    #[snafu(display("failed to describe instance types"))]
    DescribeInstanceTypes { source: crate::aws::client::SdkError },

    #[snafu(display("instance group has no namespace"))]
    NoNamespace,
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// A cluster Node, reduced to what the rolling-update orchestrator and readiness evaluator
/// need: join key is the provider-id suffix after the zone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    pub instance_id: String,
    pub ready: bool,
}

/// The per-tick snapshot owned by the reconciler.
pub struct DiscoveredState {
    pub cluster: ClusterMetadata,
    pub scaling_group: Option<ScalingGroup>,
    pub scaling_config: ScalingConfig,
    pub role: Option<Role>,
    pub instance_profile: Option<InstanceProfile>,
    pub attached_policies: Vec<String>,
    pub lifecycle_hooks: Vec<LifecycleHook>,
    pub nodes: Vec<NodeInfo>,
    pub instance_type_info: Vec<InstanceTypeInfo>,
    /// Sub-family flexible instance pool, computed once per discovery when a mixed-instances
    /// policy without an explicit override list is requested.
    pub node_instance_pool: Option<Vec<String>>,
}

/// `instance_id` from a node's `spec.providerID`, of the form
/// `aws:///<zone>/<instance-id>`.
pub fn instance_id_from_provider_id(provider_id: &str) -> Option<&str> {
    provider_id.rsplit('/').next().filter(|s| !s.is_empty())
}

pub struct CloudDiscovery<'a> {
    pub clients: &'a CloudClients,
    pub kube_client: &'a stackable_operator::client::Client,
    pub cluster_name: String,
}

impl<'a> CloudDiscovery<'a> {
    pub async fn discover(&self, ig: &InstanceGroup, eks: &EksSpec) -> Result<DiscoveredState> {
        let namespace = ig.namespace().context(NoNamespaceSnafu)?;
        let name = ig.name_any();

        // Step 1: cluster metadata.
        let cluster = self
            .clients
            .cluster
            .describe_cluster(&self.cluster_name)
            .await
            .context(DescribeClusterSnafu {
                name: self.cluster_name.clone(),
            })?;

        // Step 2: at most one scaling group may be tagged for this instance group.
        let mut groups = self
            .clients
            .scaling
            .find_group_by_tags(&self.cluster_name, &namespace, &name)
            .await
            .context(CloudQuerySnafu)?;
        if groups.len() > 1 {
            return AmbiguousOwnershipSnafu { namespace, name }.fail();
        }
        let scaling_group = groups.pop();

        // Step 3: resolve the backing ScalingConfig.
        let scaling_config = self.resolve_scaling_config(&scaling_group, eks).await?;

        // Step 4: resolve role + instance profile.
        let (role, instance_profile) = self.resolve_role(ig, eks).await?;

        // Step 5: attached managed policies.
        let attached_policies = match &role {
            Some(role) => self
                .clients
                .iam
                .list_attached_policies(&role.name)
                .await
                .context(CloudQuerySnafu)?,
            None => Vec::new(),
        };

        // Step 6: lifecycle hooks currently configured.
        let lifecycle_hooks = match &scaling_group {
            Some(group) => self
                .clients
                .scaling
                .describe_lifecycle_hooks(&group.name)
                .await
                .context(CloudQuerySnafu)?,
            None => Vec::new(),
        };

        // Step 7: cluster nodes, not namespaced.
        let nodes = self.list_nodes().await?;

        // Step 8: instance-type info, only if a mixed-instances policy is requested.
        let requested_types = requested_instance_types(eks);
        let instance_type_info = if !requested_types.is_empty() {
            self.clients
                .ec2
                .describe_instance_types(&requested_types)
                .await
                .context(DescribeInstanceTypesSnafu)?
        } else {
            Vec::new()
        };

        let node_instance_pool = if eks.ec2_spec.instance_type_overrides.is_empty()
            && !instance_type_info.is_empty()
        {
            Some(sub_family_pool(&eks.ec2_spec.instance_type, &instance_type_info))
        } else {
            None
        };

        Ok(DiscoveredState {
            cluster,
            scaling_group,
            scaling_config,
            role,
            instance_profile,
            attached_policies,
            lifecycle_hooks,
            nodes,
            instance_type_info,
            node_instance_pool,
        })
    }

    async fn resolve_scaling_config(
        &self,
        scaling_group: &Option<ScalingGroup>,
        eks: &EksSpec,
    ) -> Result<ScalingConfig> {
        use crate::crd::ScalingConfigKind;
        use crate::aws::model::ScalingConfigIdentity;

        let identity = scaling_group.as_ref().map(|g| g.config_identity.clone());

        Ok(match eks.r#type {
            ScalingConfigKind::LaunchConfiguration => {
                let identity = match identity {
                    Some(ScalingConfigIdentity::LaunchConfiguration(name)) if !name.is_empty() => {
                        Some(ConfigIdentity::Classic { name })
                    }
                    _ => None,
                };
                let resolved = match &identity {
                    Some(ConfigIdentity::Classic { name }) => self
                        .clients
                        .scaling
                        .describe_launch_configuration(name)
                        .await
                        .context(CloudQuerySnafu)?,
                    _ => None,
                };
                ScalingConfig::Classic(ClassicConfig::new(identity, resolved))
            }
            ScalingConfigKind::LaunchTemplate => {
                let identity = match identity {
                    Some(ScalingConfigIdentity::LaunchTemplate { name, version }) => {
                        Some(ConfigIdentity::Template { name, version })
                    }
                    _ => None,
                };
                let description = match &identity {
                    Some(ConfigIdentity::Template { name, .. }) => self
                        .clients
                        .scaling
                        .describe_launch_template(name)
                        .await
                        .context(CloudQuerySnafu)?,
                    _ => None,
                };
                let mut template = VersionedTemplate::new(
                    identity,
                    description.as_ref().map(|d| d.resolved.clone()),
                    None,
                );
                template.discover(description.map(|d| d.latest_version));
                ScalingConfig::Template(template)
            }
        })
    }

    async fn resolve_role(
        &self,
        ig: &InstanceGroup,
        eks: &EksSpec,
    ) -> Result<(Option<Role>, Option<InstanceProfile>)> {
        if let Some(arn) = eks
            .iam_config
            .as_ref()
            .and_then(|c| c.preferred_instance_profile_arn.as_ref())
        {
            let role = self
                .clients
                .iam
                .get_role_by_arn(arn)
                .await
                .context(CloudQuerySnafu)?;
            return Ok((role, None));
        }

        let role_name = format!("{}-role", ig.name_any());
        let profile_name = format!("{}-profile", ig.name_any());
        let role = self
            .clients
            .iam
            .get_role(&role_name)
            .await
            .context(CloudQuerySnafu)?;
        let profile = self
            .clients
            .iam
            .get_instance_profile(&profile_name)
            .await
            .context(CloudQuerySnafu)?;
        Ok((role, profile))
    }

    async fn list_nodes(&self) -> Result<Vec<NodeInfo>> {
        let api: Api<Node> = Api::all(self.kube_client.as_kube_client());
        let nodes = api
            .list(&Default::default())
            .await
            .context(ListNodesSnafu)?;
        Ok(nodes
            .items
            .into_iter()
            .filter_map(|node| {
                let instance_id = node
                    .spec
                    .as_ref()
                    .and_then(|s| s.provider_id.as_deref())
                    .and_then(instance_id_from_provider_id)?
                    .to_string();
                let ready = node
                    .status
                    .as_ref()
                    .and_then(|s| s.conditions.as_ref())
                    .and_then(|conds| conds.iter().find(|c| c.type_ == "Ready"))
                    .map(|c| c.status == "True")
                    .unwrap_or(false);
                Some(NodeInfo {
                    name: node.name_any(),
                    instance_id,
                    ready,
                })
            })
            .collect())
    }
}

/// Instance types referenced by a mixed-instances policy: the primary type plus any explicit
/// overrides.
fn requested_instance_types(eks: &EksSpec) -> Vec<String> {
    if eks.ec2_spec.spot_allocation_strategy.is_none() && eks.ec2_spec.instance_type_overrides.is_empty()
    {
        return Vec::new();
    }
    let mut types = vec![eks.ec2_spec.instance_type.clone()];
    types.extend(eks.ec2_spec.instance_type_overrides.iter().map(|o| o.instance_type.clone()));
    types
}

/// Each requested security-group/subnet reference is an id if it matches a known id pattern,
/// otherwise a Name-tag lookup.
pub async fn resolve_security_groups_and_subnets(
    ec2: &std::sync::Arc<dyn crate::aws::client::Ec2Api>,
    security_groups: &[String],
    subnets: &[String],
) -> Result<(Vec<String>, Vec<String>)> {
    let resolved_sgs = ec2
        .resolve_security_groups(security_groups)
        .await
        .context(ResolutionSnafu)?;
    let resolved_subnets = ec2.resolve_subnets(subnets).await.context(ResolutionSnafu)?;
    Ok((resolved_sgs, resolved_subnets))
}

/// Resolve the image sentinel via parameter store, selecting the path by (OS family,
/// architecture, Kubernetes version).
pub async fn resolve_image(
    ssm: &std::sync::Arc<dyn crate::aws::client::SsmApi>,
    image: &str,
    os_family: crate::crd::annotations::OsFamily,
    architecture: &str,
    kubernetes_version: &str,
) -> Result<String> {
    if image == "latest" {
        let path = ssm_parameter_path(os_family, architecture, kubernetes_version);
        return ssm.get_parameter(&path).await.context(CloudQuerySnafu);
    }
    if let Some(path) = image.strip_prefix("ssm://") {
        return ssm.get_parameter(path).await.context(CloudQuerySnafu);
    }
    Ok(image.to_string())
}

fn ssm_parameter_path(
    os_family: crate::crd::annotations::OsFamily,
    architecture: &str,
    kubernetes_version: &str,
) -> String {
    use crate::crd::annotations::OsFamily;
    let os_segment = match os_family {
        OsFamily::AmazonLinux2 => "amazon-linux-2",
        OsFamily::AmazonLinux2023 => "amazon-linux-2023",
        OsFamily::Bottlerocket => "bottlerocket",
        OsFamily::Windows => "windows",
    };
    format!("/aws/service/eks/optimized-ami/{kubernetes_version}/{os_segment}/{architecture}/recommended/image_id")
}

/// Used by the delete path: does any other `InstanceGroup` still reference this role ARN?
/// Scans peers via a read-only dynamic-client listing.
pub async fn role_arn_shared_with_other_group(
    client: &stackable_operator::client::Client,
    namespace: &str,
    role_arn: &str,
    exclude_name: &str,
) -> Result<bool> {
    let api: Api<crate::crd::v1alpha1::InstanceGroup> =
        Api::namespaced(client.as_kube_client(), namespace);
    let groups = api.list(&Default::default()).await.context(ListNodesSnafu)?;
    Ok(groups.items.iter().any(|g| {
        g.name_any() != exclude_name
            && g.status
                .as_ref()
                .and_then(|s| s.nodes_instance_role_arn.as_deref())
                == Some(role_arn)
    }))
}

pub fn policy_arn(policy: &str) -> String {
    if policy.starts_with("arn:aws:iam::") {
        policy.to_string()
    } else {
        format!("arn:aws:iam::aws:policy/{policy}")
    }
}

pub type Tags = BTreeMap<String, String>;
