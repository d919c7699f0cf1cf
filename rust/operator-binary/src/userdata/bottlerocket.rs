//! Bottlerocket: a TOML settings document consumed by the Bottlerocket API server on first
//! boot, rather than a shell script.

use super::{sorted_labels, UserDataContext};

pub(super) fn render(ctx: &UserDataContext<'_>) -> Vec<u8> {
    let mut toml = String::new();
    toml.push_str("[settings.kubernetes]\n");
    toml.push_str(&format!("cluster-name = \"{}\"\n", ctx.cluster_name));
    toml.push_str(&format!("api-server = \"{}\"\n", ctx.api_endpoint));
    toml.push_str(&format!(
        "cluster-certificate = \"{}\"\n",
        ctx.certificate_authority
    ));

    let labels = sorted_labels(ctx.labels);
    if !labels.is_empty() {
        toml.push_str("\n[settings.kubernetes.node-labels]\n");
        for label in &labels {
            if let Some((k, v)) = label.split_once('=') {
                toml.push_str(&format!("\"{k}\" = \"{v}\"\n"));
            }
        }
    }

    if !ctx.taints.is_empty() {
        let mut taints: Vec<&crate::crd::Taint> = ctx.taints.iter().collect();
        taints.sort_by(|a, b| a.key.cmp(&b.key));
        toml.push_str("\n[settings.kubernetes.node-taints]\n");
        for taint in taints {
            toml.push_str(&format!("\"{}\" = [\"{}:{}\"]\n", taint.key, taint.value, taint.effect));
        }
    }

    if let Some(max_pods) = ctx.max_pods {
        toml.push_str(&format!("\nmax-pods = {max_pods}\n"));
    }

    if let Some(pre) = ctx.pre_bootstrap {
        toml.push_str("\n[settings.bootstrap-commands.pre]\ncommands = [\n");
        toml.push_str(&format!("  \"\"\"\n{}\n\"\"\"\n", String::from_utf8_lossy(pre)));
        toml.push_str("]\n");
    }
    if let Some(post) = ctx.post_bootstrap {
        toml.push_str("\n[settings.bootstrap-commands.post]\ncommands = [\n");
        toml.push_str(&format!("  \"\"\"\n{}\n\"\"\"\n", String::from_utf8_lossy(post)));
        toml.push_str("]\n");
    }

    toml.into_bytes()
}

