// TODO: Look into how to properly resolve `clippy::large_enum_variant`.
// This will need changes in our and upstream error types.
#![allow(clippy::result_large_err)]

mod authconfig;
mod aws;
mod controller;
mod crd;
mod crd_strategy;
mod discovery;
mod drift;
mod error;
mod events;
mod instance_types;
mod planner;
mod readiness;
mod rolling_update;
mod scaling_config;
mod state;
mod tags;
mod userdata;

use std::sync::Arc;

use clap::Parser;
use futures::stream::StreamExt;
use snafu::{ResultExt, Snafu};
use stackable_operator::{
    YamlSchema,
    cli::{Command, RunArguments},
    kube::runtime::{Controller, events::{Recorder, Reporter}, watcher},
    logging::controller::report_controller_reconciled,
    shared::yaml::SerializeOptions,
    telemetry::Tracing,
};

use crate::{
    aws::{
        client::CloudClients,
        live::{LiveClusterApi, LiveEc2Api, LiveIamApi, LiveScalingGroupsApi, LiveSsmApi},
    },
    controller::FULL_CONTROLLER_NAME,
    crd::v1alpha1::{InstanceGroup, InstanceGroupVersion},
};

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

const OPERATOR_NAME: &str = "instancegroups.keikoproj.io";

#[derive(Snafu, Debug)]
enum StartupError {
    #[snafu(display("CLUSTER_NAME environment variable is not set"))]
    MissingClusterName { source: std::env::VarError },
}

#[derive(Parser)]
#[clap(about, author)]
struct Opts {
    #[clap(subcommand)]
    cmd: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    match opts.cmd {
        Command::Crd => InstanceGroup::merged_crd(InstanceGroupVersion::V1Alpha1)?
            .print_yaml_schema(built_info::PKG_VERSION, SerializeOptions::default())?,
        Command::Run(RunArguments {
            operator_environment: _,
            watch_namespace,
            product_config: _,
            maintenance: _,
            common,
        }) => {
            let _tracing_guard =
                Tracing::pre_configured(built_info::PKG_NAME, common.telemetry).init()?;

            tracing::info!(
                built_info.pkg_version = built_info::PKG_VERSION,
                built_info.git_version = built_info::GIT_VERSION,
                built_info.target = built_info::TARGET,
                built_info.built_time_utc = built_info::BUILT_TIME_UTC,
                built_info.rustc_version = built_info::RUSTC_VERSION,
                "Starting {description}",
                description = built_info::PKG_DESCRIPTION
            );

            let cluster_name =
                std::env::var("CLUSTER_NAME").context(MissingClusterNameSnafu)?;

            let client = stackable_operator::client::initialize_operator(
                Some(OPERATOR_NAME.to_string()),
                &common.cluster_info,
            )
            .await?;

            let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .load()
                .await;
            let clients = CloudClients {
                scaling: Arc::new(LiveScalingGroupsApi {
                    client: aws_sdk_autoscaling::Client::new(&aws_config),
                    ec2: aws_sdk_ec2::Client::new(&aws_config),
                }),
                iam: Arc::new(LiveIamApi {
                    client: aws_sdk_iam::Client::new(&aws_config),
                }),
                ec2: Arc::new(LiveEc2Api {
                    client: aws_sdk_ec2::Client::new(&aws_config),
                }),
                ssm: Arc::new(LiveSsmApi {
                    client: aws_sdk_ssm::Client::new(&aws_config),
                }),
                cluster: Arc::new(LiveClusterApi {
                    client: aws_sdk_eks::Client::new(&aws_config),
                }),
            };

            let event_recorder = Arc::new(Recorder::new(
                client.as_kube_client(),
                Reporter {
                    controller: FULL_CONTROLLER_NAME.to_string(),
                    instance: None,
                },
            ));

            let instance_group_controller = Controller::new(
                watch_namespace.get_api::<InstanceGroup>(&client),
                watcher::Config::default(),
            );
            instance_group_controller
                .shutdown_on_signal()
                .run(
                    controller::reconcile_instance_group,
                    controller::error_policy,
                    Arc::new(controller::Ctx::new(
                        client.clone(),
                        clients,
                        cluster_name,
                        event_recorder.clone(),
                    )),
                )
                // We can let the reporting happen in the background
                .for_each_concurrent(
                    16, // concurrency limit
                    |result| {
                        // The event_recorder needs to be shared across all invocations, so that
                        // events are correctly aggregated
                        let event_recorder = event_recorder.clone();
                        async move {
                            report_controller_reconciled(
                                &event_recorder,
                                FULL_CONTROLLER_NAME,
                                &result,
                            )
                            .await;
                        }
                    },
                )
                .await;
        }
    }

    Ok(())
}
