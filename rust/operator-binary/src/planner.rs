//! Decides which cloud writes a tick performs and owns the "rotation required" flag that tells
//! the state machine to advance to `InitUpgrade`.

use std::collections::BTreeMap;

use base64::Engine;
use snafu::{OptionExt, ResultExt, Snafu};

use crate::{
    aws::{
        client::CloudClients,
        model::{
            BlockDevice, DesiredConfigInput, InstanceProfile, MetadataOptions, MixedInstancesPolicy,
            Placement, Role, ScalingGroup, WarmPoolStatus,
        },
    },
    crd::{
        annotations::Annotations,
        v1alpha1::{EksSpec, InstanceGroup},
        ScalingConfigKind,
    },
    discovery::{self, DiscoveredState},
    scaling_config::DiscoverInput,
    tags,
    userdata::{self, UserDataContext},
};

const WORKER_NODE_POLICY: &str = "AmazonEKSWorkerNodePolicy";
const CNI_POLICY: &str = "AmazonEKS_CNI_Policy";
const ECR_READONLY_POLICY: &str = "AmazonEC2ContainerRegistryReadOnly";

static EMPTY_MAP: BTreeMap<String, String> = BTreeMap::new();

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("cloud write failed"))]
    CloudWrite { source: crate::aws::client::SdkError },

    #[snafu(display("failed to resolve referenced security groups, subnets, or image"))]
    Resolution { source: discovery::Error },

    #[snafu(display("instance group has no eks spec"))]
    NoEksSpec,

    #[snafu(display("instance group has no namespace"))]
    NoNamespace,

    #[snafu(display("the instance group's preferred instance profile arn did not resolve to a role"))]
    PreferredRoleNotFound,
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// What the planner decided this tick. The state machine consumes this to pick
/// the next `ReconcileState`.
#[derive(Debug, Default)]
pub struct PlanOutcome {
    pub rotation_needed: bool,
    /// Warm pool is `Pending:Delete`, planner returned early.
    pub short_circuited: bool,
    pub role_arn: Option<String>,
}

pub struct Planner<'a> {
    pub clients: &'a CloudClients,
    pub cluster_name: &'a str,
}

/// Default managed-policy set: IRSA omits the CNI
/// policy; a warm pool forces the worker-node policy back in regardless.
fn default_policies(irsa_enabled: bool, warm_pool: bool) -> Vec<&'static str> {
    let mut policies = vec![WORKER_NODE_POLICY, ECR_READONLY_POLICY];
    if !irsa_enabled {
        policies.push(CNI_POLICY);
    }
    if warm_pool && !policies.contains(&WORKER_NODE_POLICY) {
        policies.push(WORKER_NODE_POLICY);
    }
    policies
}

fn decode_stage(stage: &Option<String>) -> Option<Vec<u8>> {
    stage
        .as_ref()
        .map(|s| base64::engine::general_purpose::STANDARD.decode(s).unwrap_or_else(|_| s.clone().into_bytes()))
}

fn annotations_of(ig: &InstanceGroup) -> Annotations<'_> {
    Annotations(ig.metadata.annotations.as_ref().unwrap_or(&EMPTY_MAP))
}

impl<'a> Planner<'a> {
    /// Idempotent role ensure. Externally-owned roles
    /// (`iamConfig.preferredInstanceProfileArn` set) are never created or reconciled.
    async fn ensure_managed_role(
        &self,
        ig: &InstanceGroup,
        eks: &EksSpec,
        discovered: &DiscoveredState,
    ) -> Result<(Role, Option<InstanceProfile>)> {
        if eks
            .iam_config
            .as_ref()
            .and_then(|c| c.preferred_instance_profile_arn.as_ref())
            .is_some()
        {
            let role = discovered.role.clone().context(PreferredRoleNotFoundSnafu)?;
            return Ok((role, discovered.instance_profile.clone()));
        }

        let annotations = annotations_of(ig);
        let irsa = annotations.irsa_enabled();
        let warm_pool = eks.warm_pool.is_some();

        let name = ig.metadata.name.clone().unwrap_or_default();
        let role_name = format!("{name}-role");
        let profile_name = format!("{name}-profile");

        let role = match &discovered.role {
            Some(role) => role.clone(),
            None => self
                .clients
                .iam
                .create_role(&role_name)
                .await
                .context(CloudWriteSnafu)?,
        };
        let profile = match &discovered.instance_profile {
            Some(profile) => profile.clone(),
            None => self
                .clients
                .iam
                .create_instance_profile(&profile_name, &role.name)
                .await
                .context(CloudWriteSnafu)?,
        };

        let mut desired_policies: Vec<String> = default_policies(irsa, warm_pool)
            .into_iter()
            .map(discovery::policy_arn)
            .collect();
        if let Some(iam) = &eks.iam_config {
            desired_policies.extend(iam.managed_policies.iter().map(|p| discovery::policy_arn(p)));
        }
        desired_policies.sort();
        desired_policies.dedup();

        let policy_diff = managed_policy_diff(&discovered.attached_policies, &desired_policies);

        for policy in &policy_diff.attach {
            self.clients
                .iam
                .attach_policy(&role.name, policy)
                .await
                .context(CloudWriteSnafu)?;
        }
        for policy in &policy_diff.detach {
            self.clients
                .iam
                .detach_policy(&role.name, policy)
                .await
                .context(CloudWriteSnafu)?;
        }

        Ok((role, Some(profile)))
    }

    /// Assembles the desired scaling-config input: resolves security groups, subnets, the
    /// image sentinel, and produces the user-data blob.
    pub async fn build_desired_config(
        &self,
        ig: &InstanceGroup,
        eks: &EksSpec,
        discovered: &DiscoveredState,
        role_arn: &str,
    ) -> Result<(DesiredConfigInput, Vec<String>)> {
        let (security_groups, subnets) = discovery::resolve_security_groups_and_subnets(
            &self.clients.ec2,
            &eks.ec2_spec.security_groups,
            &eks.ec2_spec.subnets,
        )
        .await
        .context(ResolutionSnafu)?;

        let annotations = annotations_of(ig);
        let architecture = "x86_64";
        let image = discovery::resolve_image(
            &self.clients.ssm,
            &eks.ec2_spec.image,
            annotations.os_family(),
            architecture,
            &discovered.cluster.version,
        )
        .await
        .context(ResolutionSnafu)?;

        let max_pods = compute_max_pods(&annotations, discovered);

        let labels = if let Some(replacement) = annotations.override_default_labels() {
            let mut map = BTreeMap::new();
            map.insert("instancegroups.keikoproj.io/role".to_string(), replacement.to_string());
            map
        } else {
            eks.ec2_spec.labels.clone()
        };

        let pre_bootstrap = decode_stage(&eks.ec2_spec.user_data.pre_bootstrap);
        let post_bootstrap = decode_stage(&eks.ec2_spec.user_data.post_bootstrap);
        let node_config_yaml = decode_stage(&eks.ec2_spec.user_data.node_config_yaml);

        let user_data_ctx = UserDataContext {
            cluster_name: self.cluster_name,
            api_endpoint: &discovered.cluster.endpoint,
            certificate_authority: &discovered.cluster.certificate_authority,
            kubernetes_version: &discovered.cluster.version,
            container_runtime: eks.ec2_spec.bootstrap_options.container_runtime.as_deref(),
            bootstrap_arguments: &eks.ec2_spec.bootstrap_options.arguments,
            pre_bootstrap: pre_bootstrap.as_deref(),
            post_bootstrap: post_bootstrap.as_deref(),
            node_config_yaml: node_config_yaml.as_deref(),
            labels: &labels,
            taints: &eks.ec2_spec.taints,
            max_pods,
        };
        let user_data = userdata::produce(annotations.os_family(), &user_data_ctx);

        let block_devices = eks
            .ec2_spec
            .volumes
            .iter()
            .map(|v| BlockDevice {
                device_name: v.name.clone(),
                volume_type: v.volume_type.clone().unwrap_or_else(|| "gp3".to_string()),
                size: v.size.unwrap_or(20),
                iops: v.iops,
                throughput: v.throughput,
            })
            .collect();

        let is_template = matches!(eks.r#type, ScalingConfigKind::LaunchTemplate);

        let mixed_instances_policy = if is_template && !eks.ec2_spec.instance_type_overrides.is_empty() {
            Some(MixedInstancesPolicy {
                on_demand_base_capacity: 0,
                on_demand_percentage_above_base_capacity: if eks.ec2_spec.spot_price.is_some() { 0 } else { 100 },
                spot_allocation_strategy: eks.ec2_spec.spot_allocation_strategy.clone(),
                overrides: mixed_instances_overrides(&eks.ec2_spec.instance_type, &eks.ec2_spec.instance_type_overrides),
            })
        } else {
            None
        };

        Ok((
            DesiredConfigInput {
                image_id: image,
                instance_type: eks.ec2_spec.instance_type.clone(),
                instance_profile_arn: role_arn.to_string(),
                key_name: eks.ec2_spec.key_pair_name.clone(),
                spot_price: eks.ec2_spec.spot_price.clone(),
                user_data,
                security_groups,
                block_devices,
                metadata_options: is_template.then(|| MetadataOptions {
                    http_tokens: "required".to_string(),
                    http_put_response_hop_limit: 2,
                }),
                placement: is_template.then(|| Placement {
                    tenancy: None,
                    availability_zone: None,
                }),
                license_specifications: Vec::new(),
                mixed_instances_policy,
            },
            subnets,
        ))
    }

    /// The create path.
    pub async fn create(
        &self,
        ig: &InstanceGroup,
        eks: &EksSpec,
        discovered: &mut DiscoveredState,
    ) -> Result<PlanOutcome> {
        let (role, profile) = self.ensure_managed_role(ig, eks, discovered).await?;
        let role_arn = profile.as_ref().map(|p| p.arn.clone()).unwrap_or_else(|| role.arn.clone());

        let (desired, subnets) = self.build_desired_config(ig, eks, discovered, &role_arn).await?;

        if !discovered.scaling_config.provisioned() {
            let name_prefix = ig.metadata.name.clone().unwrap_or_default();
            discovered
                .scaling_config
                .create(&self.clients.scaling, &desired, &name_prefix)
                .await
                .context(CloudWriteSnafu)?;
            tracing::info!(
                instance_group = name_prefix,
                config = discovered.scaling_config.name(),
                "created scaling configuration"
            );
        }

        let namespace = ig.namespace_or_err().ok().context(NoNamespaceSnafu)?;
        let name = ig.metadata.name.clone().unwrap_or_default();
        let mut group_tags =
            tags::owned_tags(&name, self.cluster_name, &namespace, &name, &eks.ec2_spec.additional_tags);
        let annotations = annotations_of(ig);
        if annotations.cluster_autoscaler_enabled() {
            group_tags.extend(tags::autoscaler_tags(&eks.ec2_spec.labels, &eks.ec2_spec.taints));
        }

        let config_name = discovered.scaling_config.name().unwrap_or_default().to_string();
        let template_version = template_version_of(discovered.scaling_config.identity());
        self.clients
            .scaling
            .create_group(
                &name,
                eks.min_size,
                eks.max_size,
                eks.min_size,
                &subnets,
                &desired,
                &config_name,
                template_version.as_deref(),
                &group_tags,
            )
            .await
            .context(CloudWriteSnafu)?;
        tracing::info!(instance_group = name, min = eks.min_size, max = eks.max_size, "created scaling group");

        if !eks.ec2_spec.lifecycle_hooks.is_empty() {
            let hooks = eks
                .ec2_spec
                .lifecycle_hooks
                .iter()
                .map(lifecycle_hook_from_spec)
                .collect::<Vec<_>>();
            self.clients
                .scaling
                .put_lifecycle_hooks(&name, &hooks)
                .await
                .context(CloudWriteSnafu)?;
        }
        self.configure_metrics_suspend_warmpool(&name, eks).await?;

        Ok(PlanOutcome {
            rotation_needed: false,
            short_circuited: false,
            role_arn: Some(role_arn),
        })
    }

    async fn configure_metrics_suspend_warmpool(&self, group_name: &str, eks: &EksSpec) -> Result<()> {
        if !eks.ec2_spec.metrics_collection.is_empty() {
            self.clients
                .scaling
                .update_metrics_collection(group_name, &eks.ec2_spec.metrics_collection, &[])
                .await
                .context(CloudWriteSnafu)?;
        }
        if !eks.configuration.suspended_processes.is_empty() {
            self.clients
                .scaling
                .suspend_processes(group_name, &eks.configuration.suspended_processes)
                .await
                .context(CloudWriteSnafu)?;
        }
        if let Some(warm_pool) = &eks.warm_pool {
            self.clients
                .scaling
                .put_warm_pool(
                    group_name,
                    warm_pool.min_size.unwrap_or(0),
                    warm_pool.max_size.unwrap_or(0),
                )
                .await
                .context(CloudWriteSnafu)?;
        }
        Ok(())
    }

    /// The update path.
    pub async fn update(
        &self,
        ig: &InstanceGroup,
        eks: &EksSpec,
        discovered: &mut DiscoveredState,
    ) -> Result<PlanOutcome> {
        let (role, profile) = self.ensure_managed_role(ig, eks, discovered).await?;
        let role_arn = profile.as_ref().map(|p| p.arn.clone()).unwrap_or_else(|| role.arn.clone());

        let (desired, subnets) = self.build_desired_config(ig, eks, discovered, &role_arn).await?;

        let mut rotation_needed = false;

        if discovered.scaling_config.drifted(&desired) {
            let name_prefix = ig.metadata.name.clone().unwrap_or_default();
            discovered
                .scaling_config
                .create(&self.clients.scaling, &desired, &name_prefix)
                .await
                .context(CloudWriteSnafu)?;
            tracing::info!(
                instance_group = name_prefix,
                config = discovered.scaling_config.name(),
                "scaling configuration drifted, created a new one and scheduled a rotation"
            );
            rotation_needed = true;
        }

        if let Some(group) = &discovered.scaling_group {
            let input = DiscoverInput {
                group,
                latest_template_version: discovered.scaling_config.latest_version(),
            };
            if discovered.scaling_config.rotation_needed(&input) {
                rotation_needed = true;
            }

            // Warm pool pending-delete short-circuit: mutations up to here still apply, but
            // min/max/subnets are left untouched so as not to fight the teardown in progress.
            if group.warm_pool_status == Some(WarmPoolStatus::PendingDelete) {
                return Ok(PlanOutcome {
                    rotation_needed,
                    short_circuited: true,
                    role_arn: Some(role_arn),
                });
            }
        }

        let name = ig.metadata.name.clone().unwrap_or_default();
        let config_name = discovered.scaling_config.name().unwrap_or_default().to_string();

        if let Some(group) = &discovered.scaling_group {
            if group_needs_update(group, eks, &config_name, &subnets) {
                let template_version = template_version_of(discovered.scaling_config.identity());
                self.clients
                    .scaling
                    .update_group(
                        &name,
                        eks.min_size,
                        eks.max_size,
                        &subnets,
                        &desired,
                        &config_name,
                        template_version.as_deref(),
                    )
                    .await
                    .context(CloudWriteSnafu)?;
            }

            let namespace = ig.namespace_or_err().ok().context(NoNamespaceSnafu)?;
            let mut desired_tags =
                tags::owned_tags(&name, self.cluster_name, &namespace, &name, &eks.ec2_spec.additional_tags);
            let annotations = annotations_of(ig);
            if annotations.cluster_autoscaler_enabled() {
                desired_tags.extend(tags::autoscaler_tags(&eks.ec2_spec.labels, &eks.ec2_spec.taints));
            }
            let diff = tags::diff_tags(&group.tags, &desired_tags);
            if !diff.added.is_empty() {
                self.clients
                    .scaling
                    .create_or_update_tags(&name, &diff.added)
                    .await
                    .context(CloudWriteSnafu)?;
            }
            if !diff.removed.is_empty() {
                self.clients
                    .scaling
                    .delete_tags(&name, &diff.removed)
                    .await
                    .context(CloudWriteSnafu)?;
            }
        }

        self.reconcile_lifecycle_hooks(&name, eks, &discovered.lifecycle_hooks).await?;
        self.configure_metrics_suspend_warmpool(&name, eks).await?;

        Ok(PlanOutcome {
            rotation_needed,
            short_circuited: false,
            role_arn: Some(role_arn),
        })
    }

    async fn reconcile_lifecycle_hooks(
        &self,
        group_name: &str,
        eks: &EksSpec,
        existing: &[crate::aws::model::LifecycleHook],
    ) -> Result<()> {
        let desired_names: std::collections::BTreeSet<&str> =
            eks.ec2_spec.lifecycle_hooks.iter().map(|h| h.name.as_str()).collect();
        let existing_names: std::collections::BTreeSet<&str> =
            existing.iter().map(|h| h.name.as_str()).collect();

        let removed: Vec<String> = existing_names
            .difference(&desired_names)
            .map(|s| s.to_string())
            .collect();
        if !removed.is_empty() {
            self.clients
                .scaling
                .delete_lifecycle_hooks(group_name, &removed)
                .await
                .context(CloudWriteSnafu)?;
        }

        let added: Vec<crate::aws::model::LifecycleHook> = eks
            .ec2_spec
            .lifecycle_hooks
            .iter()
            .filter(|h| !existing_names.contains(h.name.as_str()))
            .map(lifecycle_hook_from_spec)
            .collect();
        if !added.is_empty() {
            self.clients
                .scaling
                .put_lifecycle_hooks(group_name, &added)
                .await
                .context(CloudWriteSnafu)?;
        }
        Ok(())
    }

    /// The delete path. Returns `true` once the group is fully torn down.
    pub async fn delete(&self, discovered: &DiscoveredState) -> Result<bool> {
        if let Some(group) = &discovered.scaling_group {
            self.clients.scaling.delete_group(&group.name).await.context(CloudWriteSnafu)?;
            tracing::info!(scaling_group = group.name, "deleting scaling group, requeuing until it is gone");
            return Ok(false);
        }

        let role_is_controller_owned = discovered.role.is_some();
        if role_is_controller_owned {
            if let Some(role) = &discovered.role {
                for policy in &discovered.attached_policies {
                    let _ = self.clients.iam.detach_policy(&role.name, policy).await;
                }
                self.clients.iam.delete_role(&role.name).await.context(CloudWriteSnafu)?;
            }
            if let Some(profile) = &discovered.instance_profile {
                self.clients
                    .iam
                    .delete_instance_profile(&profile.name)
                    .await
                    .context(CloudWriteSnafu)?;
            }
            tracing::info!("deleted controller-owned role and instance profile");
        }

        Ok(true)
    }
}

fn lifecycle_hook_from_spec(h: &crate::crd::LifecycleHookSpec) -> crate::aws::model::LifecycleHook {
    crate::aws::model::LifecycleHook {
        name: h.name.clone(),
        transition: h.transition.clone(),
        role_arn: h.role_arn.clone(),
        notification_target_arn: h.notification_target_arn.clone(),
        heartbeat_timeout: h.heartbeat_timeout,
    }
}

fn group_needs_update(
    group: &ScalingGroup,
    eks: &EksSpec,
    config_name: &str,
    desired_subnets: &[String],
) -> bool {
    if group.min_size != eks.min_size || group.max_size != eks.max_size {
        return true;
    }
    let current_config_name = match &group.config_identity {
        crate::aws::model::ScalingConfigIdentity::LaunchConfiguration(name) => name.clone(),
        crate::aws::model::ScalingConfigIdentity::LaunchTemplate { name, .. } => name.clone(),
        crate::aws::model::ScalingConfigIdentity::Mixed(_) => String::new(),
    };
    if current_config_name != config_name {
        return true;
    }
    let current: std::collections::BTreeSet<String> =
        group.subnets.iter().map(|s| s.to_lowercase()).collect();
    let desired: std::collections::BTreeSet<String> =
        desired_subnets.iter().map(|s| s.to_lowercase()).collect();
    current != desired
}

pub struct PolicyDiff {
    pub attach: Vec<String>,
    pub detach: Vec<String>,
}

/// `spec.md` §8 scenarios 4-5: the set of policies to attach/detach to bring `attached` in line
/// with `desired`, order-independent on both sides.
fn managed_policy_diff(attached: &[String], desired: &[String]) -> PolicyDiff {
    let attached: std::collections::BTreeSet<&String> = attached.iter().collect();
    let desired: std::collections::BTreeSet<&String> = desired.iter().collect();
    PolicyDiff {
        attach: desired.difference(&attached).map(|p| (*p).clone()).collect(),
        detach: attached.difference(&desired).map(|p| (*p).clone()).collect(),
    }
}

fn template_version_of(identity: Option<&crate::scaling_config::ConfigIdentity>) -> Option<String> {
    match identity {
        Some(crate::scaling_config::ConfigIdentity::Template { version, .. }) => Some(version.clone()),
        _ => None,
    }
}

/// `spec.md` §8 scenario 3: explicit overrides in spec order, then the primary instance type
/// itself, deduplicated by instance-type name.
fn mixed_instances_overrides(
    primary: &str,
    explicit: &[crate::crd::InstanceTypeOverride],
) -> Vec<crate::aws::model::InstanceTypeOverride> {
    let mut seen = std::collections::BTreeSet::new();
    let mut overrides = Vec::new();
    for o in explicit {
        if seen.insert(o.instance_type.clone()) {
            overrides.push(crate::aws::model::InstanceTypeOverride {
                instance_type: o.instance_type.clone(),
                weighted_capacity: o.weighted_capacity,
            });
        }
    }
    if seen.insert(primary.to_string()) {
        overrides.push(crate::aws::model::InstanceTypeOverride {
            instance_type: primary.to_string(),
            weighted_capacity: 1,
        });
    }
    overrides
}

/// Approximates the ENI/IP-per-ENI max-pods formula without a full instance-type
/// ENI table: treats vCPU count as an ENI-count proxy. `custom-networking.prefix-assignment`
/// caps the result at 110; `custom-networking.host-pods` reserves N pods for host networking.
fn compute_max_pods(annotations: &Annotations, discovered: &DiscoveredState) -> Option<u32> {
    if !annotations.custom_networking_enabled() {
        return None;
    }
    let enis = discovered
        .instance_type_info
        .first()
        .map(|i| i.vcpus.max(1) as u32)
        .unwrap_or(4);
    let ips_per_eni = 8u32;
    let mut max_pods = enis * (ips_per_eni - 1) + 2;
    if annotations.custom_networking_prefix_assignment_enabled() {
        max_pods = max_pods.min(110);
    }
    if let Some(host_pods) = annotations.custom_networking_host_pods() {
        max_pods = max_pods.saturating_sub(host_pods);
    }
    Some(max_pods)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policies_omit_cni_when_irsa_enabled() {
        let policies = default_policies(true, false);
        assert!(!policies.contains(&CNI_POLICY));
        assert!(policies.contains(&WORKER_NODE_POLICY));
    }

    #[test]
    fn default_policies_include_cni_when_irsa_disabled() {
        let policies = default_policies(false, false);
        assert!(policies.contains(&CNI_POLICY));
    }

    fn arn(name: &str) -> String {
        discovery::policy_arn(name)
    }

    #[test]
    fn managed_policy_reconciliation_detaches_extra_policy_only() {
        let attached = vec![
            arn(WORKER_NODE_POLICY),
            arn(CNI_POLICY),
            arn(ECR_READONLY_POLICY),
            arn("extra-1"),
        ];
        let desired: Vec<String> = default_policies(false, false)
            .into_iter()
            .map(discovery::policy_arn)
            .collect();
        let diff = managed_policy_diff(&attached, &desired);
        assert!(diff.attach.is_empty());
        assert_eq!(diff.detach, vec![arn("extra-1")]);
    }

    #[test]
    fn irsa_toggle_detaches_cni_only() {
        let attached: Vec<String> = default_policies(false, false)
            .into_iter()
            .map(discovery::policy_arn)
            .collect();
        let desired: Vec<String> = default_policies(true, false)
            .into_iter()
            .map(discovery::policy_arn)
            .collect();
        let diff = managed_policy_diff(&attached, &desired);
        assert!(diff.attach.is_empty());
        assert_eq!(diff.detach, vec![arn(CNI_POLICY)]);
    }

    #[test]
    fn warm_pool_forces_worker_node_policy() {
        let policies = default_policies(false, true);
        assert!(policies.contains(&WORKER_NODE_POLICY));
    }

    #[test]
    fn mixed_instances_overrides_explicit_list_then_primary() {
        let explicit = vec![
            crate::crd::InstanceTypeOverride {
                instance_type: "m5a.xlarge".to_string(),
                weighted_capacity: 1,
            },
            crate::crd::InstanceTypeOverride {
                instance_type: "m5g.xlarge".to_string(),
                weighted_capacity: 1,
            },
        ];
        let overrides = mixed_instances_overrides("m5.xlarge", &explicit);
        let names: Vec<&str> = overrides.iter().map(|o| o.instance_type.as_str()).collect();
        assert_eq!(names, vec!["m5a.xlarge", "m5g.xlarge", "m5.xlarge"]);
    }

    #[test]
    fn mixed_instances_overrides_dedupes_primary_if_also_explicit() {
        let explicit = vec![crate::crd::InstanceTypeOverride {
            instance_type: "m5.xlarge".to_string(),
            weighted_capacity: 2,
        }];
        let overrides = mixed_instances_overrides("m5.xlarge", &explicit);
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].weighted_capacity, 2);
    }
}
