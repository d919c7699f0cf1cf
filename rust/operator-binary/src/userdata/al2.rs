//! Amazon Linux 2: a bash bootstrap script invoking `/etc/eks/bootstrap.sh`.

use super::{sorted_labels, sorted_taints, UserDataContext};

pub(super) fn render(ctx: &UserDataContext<'_>) -> Vec<u8> {
    let mut script = String::new();
    script.push_str("#!/bin/bash\nset -o xtrace\n");

    if let Some(pre) = ctx.pre_bootstrap {
        script.push_str(&String::from_utf8_lossy(pre));
        script.push('\n');
    }

    let mut args = vec![format!("--apiserver-endpoint {}", ctx.api_endpoint)];
    if !ctx.certificate_authority.is_empty() {
        args.push(format!("--b64-cluster-ca {}", ctx.certificate_authority));
    }
    if let Some(runtime) = ctx.container_runtime {
        args.push(format!("--container-runtime {runtime}"));
    }
    let labels = sorted_labels(ctx.labels);
    let taints = sorted_taints(ctx.taints);
    let mut kubelet_args = Vec::new();
    if !labels.is_empty() {
        kubelet_args.push(format!("--node-labels={}", labels.join(",")));
    }
    if !taints.is_empty() {
        kubelet_args.push(format!("--register-with-taints={}", taints.join(",")));
    }
    if !kubelet_args.is_empty() {
        args.push(format!("--kubelet-extra-args '{}'", kubelet_args.join(" ")));
    }
    if let Some(max_pods) = ctx.max_pods {
        args.push(format!("--use-max-pods {max_pods}"));
    }
    for extra in ctx.bootstrap_arguments {
        args.push(extra.clone());
    }

    script.push_str(&format!(
        "/etc/eks/bootstrap.sh {} {}\n",
        ctx.cluster_name,
        args.join(" ")
    ));

    if let Some(post) = ctx.post_bootstrap {
        script.push_str(&String::from_utf8_lossy(post));
        script.push('\n');
    }

    script.into_bytes()
}

