//! Thin pass-through implementations of the trait interfaces in [`super::client`] against the
//! real `aws-sdk-*` clients. Retry policy, throttling backoff, and pagination live entirely in
//! this boundary, not in the reconciler core — only the shape of the call matters there.

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_autoscaling::types::{Tag, TagDescription};

use super::{
    client::{ClusterApi, Ec2Api, IamApi, ScalingGroupsApi, SdkError, SdkResult, SsmApi},
    model::{
        BlockDevice, ClusterMetadata, DesiredConfigInput, GroupInstance, InstanceConfigRef,
        InstanceProfile, InstanceTypeInfo, LaunchTemplateDescription, LifecycleHook,
        LifecycleState, MetadataOptions, Placement, Role, ScalingConfigIdentity, ScalingGroup,
        WarmPoolStatus,
    },
};

fn transient_if_throttled(message: impl std::fmt::Display) -> SdkError {
    let message = message.to_string();
    let is_transient = message.contains("Throttling")
        || message.contains("RequestLimitExceeded")
        || message.contains("ScalingActivityInProgress")
        || message.contains("timeout")
        || message.contains("timed out");
    SdkError {
        message,
        is_transient,
    }
}

fn launch_template_spec(
    template_name: &str,
    template_version: Option<&str>,
) -> aws_sdk_autoscaling::types::LaunchTemplateSpecification {
    aws_sdk_autoscaling::types::LaunchTemplateSpecification::builder()
        .launch_template_name(template_name)
        .set_version(template_version.map(str::to_string))
        .build()
}

fn mixed_instances_policy_request(
    template_name: &str,
    template_version: Option<&str>,
    policy: &super::model::MixedInstancesPolicy,
) -> aws_sdk_autoscaling::types::MixedInstancesPolicy {
    let overrides: Vec<_> = policy
        .overrides
        .iter()
        .map(|o| {
            aws_sdk_autoscaling::types::LaunchTemplateOverrides::builder()
                .instance_type(&o.instance_type)
                .weighted_capacity(o.weighted_capacity.to_string())
                .build()
        })
        .collect();

    let launch_template = aws_sdk_autoscaling::types::LaunchTemplate::builder()
        .launch_template_specification(launch_template_spec(template_name, template_version))
        .set_overrides(Some(overrides))
        .build();

    let distribution = aws_sdk_autoscaling::types::InstancesDistribution::builder()
        .on_demand_base_capacity(policy.on_demand_base_capacity)
        .on_demand_percentage_above_base_capacity(policy.on_demand_percentage_above_base_capacity)
        .set_spot_allocation_strategy(policy.spot_allocation_strategy.clone())
        .build();

    aws_sdk_autoscaling::types::MixedInstancesPolicy::builder()
        .launch_template(launch_template)
        .instances_distribution(distribution)
        .build()
}

fn apply_identity(
    request: aws_sdk_autoscaling::operation::create_auto_scaling_group::builders::CreateAutoScalingGroupFluentBuilder,
    config_identity_name: &str,
    template_version: Option<&str>,
    config: &DesiredConfigInput,
) -> aws_sdk_autoscaling::operation::create_auto_scaling_group::builders::CreateAutoScalingGroupFluentBuilder {
    if let Some(policy) = &config.mixed_instances_policy {
        request.mixed_instances_policy(mixed_instances_policy_request(config_identity_name, template_version, policy))
    } else if template_version.is_some() {
        request.launch_template(launch_template_spec(config_identity_name, template_version))
    } else {
        request.launch_configuration_name(config_identity_name)
    }
}

fn apply_identity_update(
    request: aws_sdk_autoscaling::operation::update_auto_scaling_group::builders::UpdateAutoScalingGroupFluentBuilder,
    config_identity_name: &str,
    template_version: Option<&str>,
    config: &DesiredConfigInput,
) -> aws_sdk_autoscaling::operation::update_auto_scaling_group::builders::UpdateAutoScalingGroupFluentBuilder {
    if let Some(policy) = &config.mixed_instances_policy {
        request.mixed_instances_policy(mixed_instances_policy_request(config_identity_name, template_version, policy))
    } else if template_version.is_some() {
        request.launch_template(launch_template_spec(config_identity_name, template_version))
    } else {
        request.launch_configuration_name(config_identity_name)
    }
}

pub struct LiveScalingGroupsApi {
    pub client: aws_sdk_autoscaling::Client,
    pub ec2: aws_sdk_ec2::Client,
}

#[async_trait]
impl ScalingGroupsApi for LiveScalingGroupsApi {
    async fn find_group_by_tags(
        &self,
        cluster_name: &str,
        namespace: &str,
        name: &str,
    ) -> SdkResult<Vec<ScalingGroup>> {
        let resp = self
            .client
            .describe_tags()
            .filters(
                aws_sdk_autoscaling::types::Filter::builder()
                    .name("key")
                    .values("instancegroups.keikoproj.io/InstanceGroup")
                    .build(),
            )
            .filters(
                aws_sdk_autoscaling::types::Filter::builder()
                    .name("value")
                    .values(name)
                    .build(),
            )
            .send()
            .await
            .map_err(transient_if_throttled)?;

        let group_names: Vec<String> = resp
            .tags()
            .iter()
            .filter(|t: &&TagDescription| t.resource_type().map(String::from) == Some("auto-scaling-group".to_string()))
            .map(|t| t.resource_id().unwrap_or_default().to_string())
            .collect();

        if group_names.is_empty() {
            return Ok(Vec::new());
        }

        let resp = self
            .client
            .describe_auto_scaling_groups()
            .set_auto_scaling_group_names(Some(group_names))
            .send()
            .await
            .map_err(transient_if_throttled)?;

        let groups = resp
            .auto_scaling_groups()
            .iter()
            .filter(|g| {
                let tags: BTreeMap<_, _> = g
                    .tags()
                    .iter()
                    .map(|t| (t.key().unwrap_or_default().to_string(), t.value().unwrap_or_default().to_string()))
                    .collect();
                tags.get("instancegroups.keikoproj.io/ClusterName").map(String::as_str) == Some(cluster_name)
                    && tags.get("instancegroups.keikoproj.io/Namespace").map(String::as_str) == Some(namespace)
            })
            .map(convert_group)
            .collect();

        Ok(groups)
    }

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
        tags: &BTreeMap<String, String>,
    ) -> SdkResult<()> {
        let tags: Vec<Tag> = tags
            .iter()
            .map(|(k, v)| {
                Tag::builder()
                    .resource_id(name)
                    .resource_type("auto-scaling-group")
                    .key(k)
                    .value(v)
                    .propagate_at_launch(true)
                    .build()
            })
            .collect();

        let mut request = self
            .client
            .create_auto_scaling_group()
            .auto_scaling_group_name(name)
            .min_size(min_size)
            .max_size(max_size)
            .desired_capacity(desired_capacity)
            .set_vpc_zone_identifier(Some(subnets.join(",")))
            .set_tags(Some(tags));

        request = apply_identity(request, config_identity_name, template_version, config);

        request.send().await.map_err(transient_if_throttled)?;
        Ok(())
    }

    async fn update_group(
        &self,
        name: &str,
        min_size: i32,
        max_size: i32,
        subnets: &[String],
        config: &DesiredConfigInput,
        config_identity_name: &str,
        template_version: Option<&str>,
    ) -> SdkResult<()> {
        let mut request = self
            .client
            .update_auto_scaling_group()
            .auto_scaling_group_name(name)
            .min_size(min_size)
            .max_size(max_size)
            .set_vpc_zone_identifier(Some(subnets.join(",")));

        request = apply_identity_update(request, config_identity_name, template_version, config);

        request.send().await.map_err(transient_if_throttled)?;
        Ok(())
    }

    async fn delete_group(&self, name: &str) -> SdkResult<()> {
        self.client
            .delete_auto_scaling_group()
            .auto_scaling_group_name(name)
            .send()
            .await
            .map_err(transient_if_throttled)?;
        Ok(())
    }

    async fn create_launch_configuration(
        &self,
        name: &str,
        config: &DesiredConfigInput,
    ) -> SdkResult<()> {
        use base64::Engine;
        let block_devices: Vec<_> = config
            .block_devices
            .iter()
            .map(|b| {
                aws_sdk_autoscaling::types::BlockDeviceMapping::builder()
                    .device_name(&b.device_name)
                    .ebs(
                        aws_sdk_autoscaling::types::Ebs::builder()
                            .volume_type(&b.volume_type)
                            .volume_size(b.size)
                            .set_iops(b.iops)
                            .set_throughput(b.throughput)
                            .build(),
                    )
                    .build()
            })
            .collect();
        self.client
            .create_launch_configuration()
            .launch_configuration_name(name)
            .image_id(&config.image_id)
            .instance_type(&config.instance_type)
            .iam_instance_profile(&config.instance_profile_arn)
            .set_key_name(config.key_name.clone())
            .set_spot_price(config.spot_price.clone())
            .set_security_groups(Some(config.security_groups.clone()))
            .set_block_device_mappings(Some(block_devices))
            .user_data(base64::engine::general_purpose::STANDARD.encode(&config.user_data))
            .send()
            .await
            .map_err(transient_if_throttled)?;
        Ok(())
    }

    async fn create_launch_template_version(
        &self,
        template_name: &str,
        config: &DesiredConfigInput,
    ) -> SdkResult<String> {
        use base64::Engine;
        let block_devices: Vec<_> = config
            .block_devices
            .iter()
            .map(|b| {
                aws_sdk_ec2::types::LaunchTemplateBlockDeviceMappingRequest::builder()
                    .device_name(&b.device_name)
                    .ebs(
                        aws_sdk_ec2::types::LaunchTemplateEbsBlockDeviceRequest::builder()
                            .volume_type(b.volume_type.as_str().into())
                            .volume_size(b.size)
                            .set_iops(b.iops)
                            .set_throughput(b.throughput)
                            .build(),
                    )
                    .build()
            })
            .collect();

        let metadata_options = config.metadata_options.as_ref().map(|m| {
            aws_sdk_ec2::types::LaunchTemplateInstanceMetadataOptionsRequest::builder()
                .http_tokens(m.http_tokens.as_str().into())
                .http_put_response_hop_limit(m.http_put_response_hop_limit)
                .build()
        });

        let placement = config.placement.as_ref().map(|p| {
            aws_sdk_ec2::types::LaunchTemplatePlacementRequest::builder()
                .set_tenancy(p.tenancy.as_deref().map(|t| t.into()))
                .set_availability_zone(p.availability_zone.clone())
                .build()
        });

        let data = aws_sdk_ec2::types::RequestLaunchTemplateData::builder()
            .image_id(&config.image_id)
            .instance_type(config.instance_type.as_str().into())
            .iam_instance_profile(
                aws_sdk_ec2::types::LaunchTemplateIamInstanceProfileSpecificationRequest::builder()
                    .arn(&config.instance_profile_arn)
                    .build(),
            )
            .set_key_name(config.key_name.clone())
            .set_security_group_ids(Some(config.security_groups.clone()))
            .set_block_device_mappings(Some(block_devices))
            .set_metadata_options(metadata_options)
            .set_placement(placement)
            .user_data(base64::engine::general_purpose::STANDARD.encode(&config.user_data))
            .build();

        let resp = self
            .ec2
            .create_launch_template_version()
            .launch_template_name(template_name)
            .launch_template_data(data)
            .send()
            .await
            .map_err(transient_if_throttled)?;

        let version = resp
            .launch_template_version()
            .and_then(|v| v.version_number())
            .ok_or_else(|| SdkError::permanent("create_launch_template_version returned no version"))?;

        self.ec2
            .modify_launch_template()
            .launch_template_name(template_name)
            .default_version(version.to_string())
            .send()
            .await
            .map_err(transient_if_throttled)?;

        Ok(version.to_string())
    }

    async fn describe_launch_configuration(&self, name: &str) -> SdkResult<Option<DesiredConfigInput>> {
        let resp = self
            .client
            .describe_launch_configurations()
            .launch_configuration_names(name)
            .send()
            .await
            .map_err(transient_if_throttled)?;
        let Some(lc) = resp.launch_configurations().first() else {
            return Ok(None);
        };
        use base64::Engine;
        let user_data = lc
            .user_data()
            .and_then(|d| base64::engine::general_purpose::STANDARD.decode(d).ok())
            .unwrap_or_default();
        let block_devices = lc
            .block_device_mappings()
            .iter()
            .filter_map(|b| {
                let ebs = b.ebs()?;
                Some(BlockDevice {
                    device_name: b.device_name().unwrap_or_default().to_string(),
                    volume_type: ebs.volume_type().unwrap_or_default().to_string(),
                    size: ebs.volume_size().unwrap_or_default(),
                    iops: ebs.iops(),
                    throughput: ebs.throughput(),
                })
            })
            .collect();
        Ok(Some(DesiredConfigInput {
            image_id: lc.image_id().unwrap_or_default().to_string(),
            instance_type: lc.instance_type().unwrap_or_default().to_string(),
            instance_profile_arn: lc.iam_instance_profile().unwrap_or_default().to_string(),
            key_name: lc.key_name().map(str::to_string),
            spot_price: lc.spot_price().map(str::to_string),
            user_data,
            security_groups: lc.security_groups().to_vec(),
            block_devices,
            metadata_options: None,
            placement: None,
            license_specifications: Vec::new(),
            mixed_instances_policy: None,
        }))
    }

    async fn describe_launch_template(&self, name: &str) -> SdkResult<Option<LaunchTemplateDescription>> {
        let resp = match self
            .ec2
            .describe_launch_template_versions()
            .launch_template_name(name)
            .versions("$Default")
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) if e.to_string().contains("NotFound") => return Ok(None),
            Err(e) => return Err(transient_if_throttled(e)),
        };
        let Some(version) = resp.launch_template_versions().first() else {
            return Ok(None);
        };
        let Some(data) = version.launch_template_data() else {
            return Ok(None);
        };

        use base64::Engine;
        let user_data = data
            .user_data()
            .and_then(|d| base64::engine::general_purpose::STANDARD.decode(d).ok())
            .unwrap_or_default();

        let block_devices = data
            .block_device_mappings()
            .iter()
            .filter_map(|b| {
                let ebs = b.ebs()?;
                Some(BlockDevice {
                    device_name: b.device_name().unwrap_or_default().to_string(),
                    volume_type: ebs
                        .volume_type()
                        .map(|v| v.as_str().to_string())
                        .unwrap_or_default(),
                    size: ebs.volume_size().unwrap_or_default(),
                    iops: ebs.iops(),
                    throughput: ebs.throughput(),
                })
            })
            .collect();

        let metadata_options = data.metadata_options().map(|m| MetadataOptions {
            http_tokens: m.http_tokens().map(|t| t.as_str().to_string()).unwrap_or_default(),
            http_put_response_hop_limit: m.http_put_response_hop_limit().unwrap_or_default(),
        });

        let placement = data.placement().map(|p| Placement {
            tenancy: p.tenancy().map(|t| t.as_str().to_string()),
            availability_zone: p.availability_zone().map(str::to_string),
        });

        let resolved = DesiredConfigInput {
            image_id: data.image_id().unwrap_or_default().to_string(),
            instance_type: data
                .instance_type()
                .map(|t| t.as_str().to_string())
                .unwrap_or_default(),
            instance_profile_arn: data
                .iam_instance_profile()
                .and_then(|p| p.arn())
                .unwrap_or_default()
                .to_string(),
            key_name: data.key_name().map(str::to_string),
            spot_price: None,
            user_data,
            security_groups: data.security_group_ids().to_vec(),
            block_devices,
            metadata_options,
            placement,
            license_specifications: Vec::new(),
            mixed_instances_policy: None,
        };

        Ok(Some(LaunchTemplateDescription {
            resolved,
            latest_version: version.version_number().unwrap_or_default().to_string(),
        }))
    }

    async fn create_or_update_tags(
        &self,
        group_name: &str,
        tags: &BTreeMap<String, String>,
    ) -> SdkResult<()> {
        let tags: Vec<Tag> = tags
            .iter()
            .map(|(k, v)| {
                Tag::builder()
                    .resource_id(group_name)
                    .resource_type("auto-scaling-group")
                    .key(k)
                    .value(v)
                    .propagate_at_launch(true)
                    .build()
            })
            .collect();
        self.client
            .create_or_update_tags()
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(transient_if_throttled)?;
        Ok(())
    }

    async fn delete_tags(&self, group_name: &str, keys: &[String]) -> SdkResult<()> {
        let tags: Vec<Tag> = keys
            .iter()
            .map(|k| {
                Tag::builder()
                    .resource_id(group_name)
                    .resource_type("auto-scaling-group")
                    .key(k)
                    .build()
            })
            .collect();
        self.client
            .delete_tags()
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(transient_if_throttled)?;
        Ok(())
    }

    async fn put_lifecycle_hooks(&self, group_name: &str, hooks: &[LifecycleHook]) -> SdkResult<()> {
        for hook in hooks {
            self.client
                .put_lifecycle_hook()
                .auto_scaling_group_name(group_name)
                .lifecycle_hook_name(&hook.name)
                .lifecycle_transition(&hook.transition)
                .set_role_arn(hook.role_arn.clone())
                .set_notification_target_arn(hook.notification_target_arn.clone())
                .set_heartbeat_timeout(hook.heartbeat_timeout)
                .send()
                .await
                .map_err(transient_if_throttled)?;
        }
        Ok(())
    }

    async fn delete_lifecycle_hooks(&self, group_name: &str, names: &[String]) -> SdkResult<()> {
        for name in names {
            self.client
                .delete_lifecycle_hook()
                .auto_scaling_group_name(group_name)
                .lifecycle_hook_name(name)
                .send()
                .await
                .map_err(transient_if_throttled)?;
        }
        Ok(())
    }

    async fn describe_lifecycle_hooks(&self, group_name: &str) -> SdkResult<Vec<LifecycleHook>> {
        let resp = self
            .client
            .describe_lifecycle_hooks()
            .auto_scaling_group_name(group_name)
            .send()
            .await
            .map_err(transient_if_throttled)?;
        Ok(resp
            .lifecycle_hooks()
            .iter()
            .map(|h| LifecycleHook {
                name: h.lifecycle_hook_name().unwrap_or_default().to_string(),
                transition: h.lifecycle_transition().unwrap_or_default().to_string(),
                role_arn: h.role_arn().map(str::to_string),
                notification_target_arn: h.notification_target_arn().map(str::to_string),
                heartbeat_timeout: h.heartbeat_timeout(),
            })
            .collect())
    }

    async fn update_metrics_collection(
        &self,
        group_name: &str,
        enable: &[String],
        disable: &[String],
    ) -> SdkResult<()> {
        if !enable.is_empty() {
            self.client
                .enable_metrics_collection()
                .auto_scaling_group_name(group_name)
                .set_metrics(Some(enable.to_vec()))
                .granularity("1Minute")
                .send()
                .await
                .map_err(transient_if_throttled)?;
        }
        if !disable.is_empty() {
            self.client
                .disable_metrics_collection()
                .auto_scaling_group_name(group_name)
                .set_metrics(Some(disable.to_vec()))
                .send()
                .await
                .map_err(transient_if_throttled)?;
        }
        Ok(())
    }

    async fn suspend_processes(&self, group_name: &str, processes: &[String]) -> SdkResult<()> {
        self.client
            .suspend_processes()
            .auto_scaling_group_name(group_name)
            .set_scaling_processes(Some(processes.to_vec()))
            .send()
            .await
            .map_err(transient_if_throttled)?;
        Ok(())
    }

    async fn resume_processes(&self, group_name: &str, processes: &[String]) -> SdkResult<()> {
        self.client
            .resume_processes()
            .auto_scaling_group_name(group_name)
            .set_scaling_processes(Some(processes.to_vec()))
            .send()
            .await
            .map_err(transient_if_throttled)?;
        Ok(())
    }

    async fn terminate_instances(&self, group_name: &str, instance_ids: &[String]) -> SdkResult<()> {
        for instance_id in instance_ids {
            self.client
                .terminate_instance_in_auto_scaling_group()
                .instance_id(instance_id)
                .should_decrement_desired_capacity(false)
                .send()
                .await
                .map_err(transient_if_throttled)?;
        }
        let _ = group_name;
        Ok(())
    }

    async fn put_warm_pool(&self, group_name: &str, min_size: i32, max_size: i32) -> SdkResult<()> {
        self.client
            .put_warm_pool()
            .auto_scaling_group_name(group_name)
            .min_size(min_size)
            .max_group_prepared_capacity(max_size)
            .send()
            .await
            .map_err(transient_if_throttled)?;
        Ok(())
    }
}

fn convert_group(g: &aws_sdk_autoscaling::types::AutoScalingGroup) -> ScalingGroup {
    let tags = g
        .tags()
        .iter()
        .map(|t| (t.key().unwrap_or_default().to_string(), t.value().unwrap_or_default().to_string()))
        .collect();

    let config_identity = if let Some(lc) = g.launch_configuration_name() {
        ScalingConfigIdentity::LaunchConfiguration(lc.to_string())
    } else if let Some(lt) = g.launch_template() {
        ScalingConfigIdentity::LaunchTemplate {
            name: lt.launch_template_name().unwrap_or_default().to_string(),
            version: lt.version().unwrap_or_default().to_string(),
        }
    } else {
        ScalingConfigIdentity::LaunchConfiguration(String::new())
    };

    let instances = g
        .instances()
        .iter()
        .map(|i| GroupInstance {
            instance_id: i.instance_id().unwrap_or_default().to_string(),
            availability_zone: i.availability_zone().unwrap_or_default().to_string(),
            lifecycle_state: i
                .lifecycle_state()
                .map(|s| LifecycleState::from_api_str(s.as_str()))
                .unwrap_or(LifecycleState::Pending),
            config_ref: if let Some(lc) = i.launch_configuration_name() {
                InstanceConfigRef::LaunchConfiguration(lc.to_string())
            } else if let Some(lt) = i.launch_template() {
                InstanceConfigRef::LaunchTemplate {
                    name: lt.launch_template_name().unwrap_or_default().to_string(),
                    version: lt.version().unwrap_or_default().to_string(),
                }
            } else {
                InstanceConfigRef::None
            },
        })
        .collect();

    ScalingGroup {
        name: g.auto_scaling_group_name().unwrap_or_default().to_string(),
        min_size: g.min_size().unwrap_or_default(),
        max_size: g.max_size().unwrap_or_default(),
        desired_capacity: g.desired_capacity().unwrap_or_default(),
        subnets: g
            .vpc_zone_identifier()
            .map(|s| s.split(',').map(str::to_string).collect())
            .unwrap_or_default(),
        config_identity,
        instances,
        tags,
        suspended_processes: g
            .suspended_processes()
            .iter()
            .filter_map(|p| p.process_name().map(str::to_string))
            .collect(),
        warm_pool_status: g.warm_pool_configuration().map(|wp| {
            if wp.status().map(|s| s.as_str()) == Some("PendingDelete") {
                WarmPoolStatus::PendingDelete
            } else {
                WarmPoolStatus::Stable
            }
        }),
    }
}

pub struct LiveIamApi {
    pub client: aws_sdk_iam::Client,
}

#[async_trait]
impl IamApi for LiveIamApi {
    async fn get_role(&self, name: &str) -> SdkResult<Option<Role>> {
        match self.client.get_role().role_name(name).send().await {
            Ok(resp) => Ok(resp.role().map(|r| Role {
                arn: r.arn().to_string(),
                name: r.role_name().to_string(),
            })),
            Err(e) if e.as_service_error().map(|e| e.is_no_such_entity_exception()) == Some(true) => Ok(None),
            Err(e) => Err(transient_if_throttled(e)),
        }
    }

    async fn get_role_by_arn(&self, arn: &str) -> SdkResult<Option<Role>> {
        let name = arn.rsplit('/').next().unwrap_or(arn);
        self.get_role(name).await
    }

    async fn create_role(&self, name: &str) -> SdkResult<Role> {
        let trust_policy = indoc::formatdoc! {r#"
            {{
              "Version": "2012-10-17",
              "Statement": [{{"Effect": "Allow", "Principal": {{"Service": "ec2.amazonaws.com"}}, "Action": "sts:AssumeRole"}}]
            }}
        "#};
        let resp = self
            .client
            .create_role()
            .role_name(name)
            .assume_role_policy_document(trust_policy)
            .send()
            .await
            .map_err(transient_if_throttled)?;
        let role = resp.role().ok_or_else(|| SdkError::permanent("create_role returned no role"))?;
        Ok(Role {
            arn: role.arn().to_string(),
            name: role.role_name().to_string(),
        })
    }

    async fn delete_role(&self, name: &str) -> SdkResult<()> {
        self.client
            .delete_role()
            .role_name(name)
            .send()
            .await
            .map_err(transient_if_throttled)?;
        Ok(())
    }

    async fn get_instance_profile(&self, name: &str) -> SdkResult<Option<InstanceProfile>> {
        match self.client.get_instance_profile().instance_profile_name(name).send().await {
            Ok(resp) => Ok(resp.instance_profile().map(|p| InstanceProfile {
                arn: p.arn().to_string(),
                name: p.instance_profile_name().to_string(),
            })),
            Err(e) if e.as_service_error().map(|e| e.is_no_such_entity_exception()) == Some(true) => Ok(None),
            Err(e) => Err(transient_if_throttled(e)),
        }
    }

    async fn create_instance_profile(&self, name: &str, role_name: &str) -> SdkResult<InstanceProfile> {
        let resp = self
            .client
            .create_instance_profile()
            .instance_profile_name(name)
            .send()
            .await
            .map_err(transient_if_throttled)?;
        self.client
            .add_role_to_instance_profile()
            .instance_profile_name(name)
            .role_name(role_name)
            .send()
            .await
            .map_err(transient_if_throttled)?;
        let profile = resp
            .instance_profile()
            .ok_or_else(|| SdkError::permanent("create_instance_profile returned no profile"))?;
        Ok(InstanceProfile {
            arn: profile.arn().to_string(),
            name: profile.instance_profile_name().to_string(),
        })
    }

    async fn delete_instance_profile(&self, name: &str) -> SdkResult<()> {
        self.client
            .delete_instance_profile()
            .instance_profile_name(name)
            .send()
            .await
            .map_err(transient_if_throttled)?;
        Ok(())
    }

    async fn list_attached_policies(&self, role_name: &str) -> SdkResult<Vec<String>> {
        let resp = self
            .client
            .list_attached_role_policies()
            .role_name(role_name)
            .send()
            .await
            .map_err(transient_if_throttled)?;
        Ok(resp
            .attached_policies()
            .iter()
            .filter_map(|p| p.policy_arn().map(str::to_string))
            .collect())
    }

    async fn attach_policy(&self, role_name: &str, policy_arn: &str) -> SdkResult<()> {
        self.client
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(transient_if_throttled)?;
        Ok(())
    }

    async fn detach_policy(&self, role_name: &str, policy_arn: &str) -> SdkResult<()> {
        self.client
            .detach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(transient_if_throttled)?;
        Ok(())
    }
}

pub struct LiveEc2Api {
    pub client: aws_sdk_ec2::Client,
}

#[async_trait]
impl Ec2Api for LiveEc2Api {
    async fn resolve_security_groups(&self, refs: &[String]) -> SdkResult<Vec<String>> {
        resolve_by_id_or_name_tag(
            refs,
            |r| r.starts_with("sg-"),
            |ids, names| {
                let client = self.client.clone();
                async move {
                    let mut resolved = Vec::new();
                    if !ids.is_empty() {
                        resolved.extend(ids);
                    }
                    if !names.is_empty() {
                        let resp = client
                            .describe_security_groups()
                            .filters(
                                aws_sdk_ec2::types::Filter::builder()
                                    .name("tag:Name")
                                    .set_values(Some(names.clone()))
                                    .build(),
                            )
                            .send()
                            .await
                            .map_err(transient_if_throttled)?;
                        for sg in resp.security_groups() {
                            if let Some(id) = sg.group_id() {
                                resolved.push(id.to_string());
                            }
                        }
                    }
                    Ok(resolved)
                }
            },
        )
        .await
    }

    async fn resolve_subnets(&self, refs: &[String]) -> SdkResult<Vec<String>> {
        resolve_by_id_or_name_tag(
            refs,
            |r| r.starts_with("subnet-"),
            |ids, names| {
                let client = self.client.clone();
                async move {
                    let mut resolved = Vec::new();
                    if !ids.is_empty() {
                        resolved.extend(ids);
                    }
                    if !names.is_empty() {
                        let resp = client
                            .describe_subnets()
                            .filters(
                                aws_sdk_ec2::types::Filter::builder()
                                    .name("tag:Name")
                                    .set_values(Some(names.clone()))
                                    .build(),
                            )
                            .send()
                            .await
                            .map_err(transient_if_throttled)?;
                        for subnet in resp.subnets() {
                            if let Some(id) = subnet.subnet_id() {
                                resolved.push(id.to_string());
                            }
                        }
                    }
                    Ok(resolved)
                }
            },
        )
        .await
    }

    async fn describe_instance_types(&self, instance_types: &[String]) -> SdkResult<Vec<InstanceTypeInfo>> {
        let resp = self
            .client
            .describe_instance_types()
            .set_instance_types(Some(
                instance_types
                    .iter()
                    .filter_map(|s| s.as_str().try_into().ok())
                    .collect(),
            ))
            .send()
            .await
            .map_err(transient_if_throttled)?;
        Ok(resp
            .instance_types()
            .iter()
            .map(|it| InstanceTypeInfo {
                instance_type: it.instance_type().map(|t| t.as_str().to_string()).unwrap_or_default(),
                vcpus: it
                    .v_cpu_info()
                    .and_then(|v| v.default_v_cpus())
                    .unwrap_or_default(),
                memory_mib: it
                    .memory_info()
                    .and_then(|m| m.size_in_mi_b())
                    .unwrap_or_default(),
            })
            .collect())
    }
}

/// Each requested value is an id if it matches a known id pattern, otherwise a Name-tag
/// lookup; any unresolvable item fails the whole call.
async fn resolve_by_id_or_name_tag<F, Fut>(
    refs: &[String],
    is_id: impl Fn(&str) -> bool,
    lookup: F,
) -> SdkResult<Vec<String>>
where
    F: FnOnce(Vec<String>, Vec<String>) -> Fut,
    Fut: std::future::Future<Output = SdkResult<Vec<String>>>,
{
    let (ids, names): (Vec<String>, Vec<String>) =
        refs.iter().cloned().partition(|r| is_id(r));
    let resolved = lookup(ids, names.clone()).await?;
    if resolved.len() != refs.len() {
        return Err(SdkError::permanent(format!(
            "could not resolve all references: requested {:?}, resolved {} entries",
            refs,
            resolved.len()
        )));
    }
    Ok(resolved)
}

pub struct LiveSsmApi {
    pub client: aws_sdk_ssm::Client,
}

#[async_trait]
impl SsmApi for LiveSsmApi {
    async fn get_parameter(&self, path: &str) -> SdkResult<String> {
        let resp = self
            .client
            .get_parameter()
            .name(path)
            .send()
            .await
            .map_err(transient_if_throttled)?;
        resp.parameter()
            .and_then(|p| p.value())
            .map(str::to_string)
            .ok_or_else(|| SdkError::permanent(format!("parameter {path} has no value")))
    }
}

pub struct LiveClusterApi {
    pub client: aws_sdk_eks::Client,
}

#[async_trait]
impl ClusterApi for LiveClusterApi {
    async fn describe_cluster(&self, name: &str) -> SdkResult<ClusterMetadata> {
        let resp = self
            .client
            .describe_cluster()
            .name(name)
            .send()
            .await
            .map_err(transient_if_throttled)?;
        let cluster = resp
            .cluster()
            .ok_or_else(|| SdkError::permanent(format!("cluster {name} not found")))?;
        Ok(ClusterMetadata {
            version: cluster.version().unwrap_or_default().to_string(),
            endpoint: cluster.endpoint().unwrap_or_default().to_string(),
            certificate_authority: cluster
                .certificate_authority()
                .and_then(|ca| ca.data())
                .unwrap_or_default()
                .to_string(),
        })
    }
}
