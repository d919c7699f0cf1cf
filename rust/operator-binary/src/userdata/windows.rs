//! Windows: a PowerShell bootstrap script invoking `EKS-Bootstrap.ps1`.

use super::{sorted_labels, sorted_taints, UserDataContext};

pub(super) fn render(ctx: &UserDataContext<'_>) -> Vec<u8> {
    let mut script = String::new();
    script.push_str("<powershell>\n");

    if let Some(pre) = ctx.pre_bootstrap {
        script.push_str(&String::from_utf8_lossy(pre));
        script.push('\n');
    }

    let mut args = vec![format!("-EKSClusterName {}", ctx.cluster_name)];
    args.push(format!("-APIServerEndpoint {}", ctx.api_endpoint));
    if !ctx.certificate_authority.is_empty() {
        args.push(format!("-Base64ClusterCA {}", ctx.certificate_authority));
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
        args.push(format!("-KubeletExtraArgs '{}'", kubelet_args.join(" ")));
    }
    for extra in ctx.bootstrap_arguments {
        args.push(extra.clone());
    }

    script.push_str(&format!("& $EKSBootstrapScriptFile {}\n", args.join(" ")));

    if let Some(post) = ctx.post_bootstrap {
        script.push_str(&String::from_utf8_lossy(post));
        script.push('\n');
    }

    script.push_str("</powershell>\n");
    script.into_bytes()
}

