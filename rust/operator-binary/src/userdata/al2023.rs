//! Amazon Linux 2023: a MIME multipart document carrying a `node.eks.aws` NodeConfig YAML
//! stage alongside an optional shell pre/post stage, per the nodeadm bootstrap contract.

use super::{sorted_labels, sorted_taints, UserDataContext};

const BOUNDARY: &str = "==INSTANCE-GROUP-BOUNDARY==";

pub(super) fn render(ctx: &UserDataContext<'_>) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(&format!(
        "Content-Type: multipart/mixed; boundary=\"{BOUNDARY}\"\nMIME-Version: 1.0\n\n"
    ));

    if let Some(pre) = ctx.pre_bootstrap {
        push_part(&mut out, "text/x-shellscript", &String::from_utf8_lossy(pre));
    }

    push_part(&mut out, "application/node.eks.aws", &node_config_yaml(ctx));

    if let Some(post) = ctx.post_bootstrap {
        push_part(&mut out, "text/x-shellscript", &String::from_utf8_lossy(post));
    }

    out.push_str(&format!("--{BOUNDARY}--\n"));
    out.into_bytes()
}

fn push_part(out: &mut String, content_type: &str, body: &str) {
    out.push_str(&format!("--{BOUNDARY}\nContent-Type: {content_type}\n\n{body}\n\n"));
}

fn node_config_yaml(ctx: &UserDataContext<'_>) -> String {
    if let Some(yaml) = ctx.node_config_yaml {
        return String::from_utf8_lossy(yaml).into_owned();
    }

    let mut yaml = String::new();
    yaml.push_str("apiVersion: node.eks.aws/v1alpha1\nkind: NodeConfig\nspec:\n");
    yaml.push_str("  cluster:\n");
    yaml.push_str(&format!("    name: {}\n", ctx.cluster_name));
    yaml.push_str(&format!("    apiServerEndpoint: {}\n", ctx.api_endpoint));
    yaml.push_str(&format!("    certificateAuthority: {}\n", ctx.certificate_authority));

    let labels = sorted_labels(ctx.labels);
    let taints = sorted_taints(ctx.taints);
    if !labels.is_empty() || !taints.is_empty() || ctx.max_pods.is_some() {
        yaml.push_str("  kubelet:\n    config:\n");
        if !labels.is_empty() {
            yaml.push_str("      labels:\n");
            for label in &labels {
                if let Some((k, v)) = label.split_once('=') {
                    yaml.push_str(&format!("        {k}: {v}\n"));
                }
            }
        }
        if let Some(max_pods) = ctx.max_pods {
            yaml.push_str(&format!("      maxPods: {max_pods}\n"));
        }
        if !taints.is_empty() {
            yaml.push_str("      registerWithTaints:\n");
            for taint in &taints {
                yaml.push_str(&format!("        - {taint}\n"));
            }
        }
    }
    yaml
}

