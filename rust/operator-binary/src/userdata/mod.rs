//! User-data producers. Four OS-family-specific black-box producers, each
//! consuming a [`UserDataContext`] and returning an opaque byte blob. Drift detection compares
//! this blob byte-for-byte, so every producer must be deterministic: no timestamps, no
//! map-iteration ordering, labels and taints sorted before rendering.

mod al2;
mod al2023;
mod bottlerocket;
mod windows;

use std::collections::BTreeMap;

use crate::crd::{annotations::OsFamily, Taint};

/// Inputs available to every producer. Fields not used by a given OS family are simply
/// ignored by that producer.
pub struct UserDataContext<'a> {
    pub cluster_name: &'a str,
    pub api_endpoint: &'a str,
    pub certificate_authority: &'a str,
    pub kubernetes_version: &'a str,
    pub container_runtime: Option<&'a str>,
    pub bootstrap_arguments: &'a [String],
    pub pre_bootstrap: Option<&'a [u8]>,
    pub post_bootstrap: Option<&'a [u8]>,
    pub node_config_yaml: Option<&'a [u8]>,
    pub labels: &'a BTreeMap<String, String>,
    pub taints: &'a [Taint],
    pub max_pods: Option<u32>,
}

/// Dispatches to the producer selected by the `os-family` annotation.
pub fn produce(os_family: OsFamily, ctx: &UserDataContext<'_>) -> Vec<u8> {
    match os_family {
        OsFamily::AmazonLinux2 => al2::render(ctx),
        OsFamily::AmazonLinux2023 => al2023::render(ctx),
        OsFamily::Bottlerocket => bottlerocket::render(ctx),
        OsFamily::Windows => windows::render(ctx),
    }
}

/// Sorted `key=value` label pairs, used by every producer so rendering never depends on a
/// `BTreeMap`'s (already sorted, but we keep this explicit) iteration order.
pub(crate) fn sorted_labels(labels: &BTreeMap<String, String>) -> Vec<String> {
    labels.iter().map(|(k, v)| format!("{k}={v}")).collect()
}

pub(crate) fn sorted_taints(taints: &[Taint]) -> Vec<String> {
    let mut rendered: Vec<String> = taints
        .iter()
        .map(|t| format!("{}={}:{}", t.key, t.value, t.effect))
        .collect();
    rendered.sort();
    rendered
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn ctx() -> UserDataContext<'static> {
        UserDataContext {
            cluster_name: "test-cluster",
            api_endpoint: "https://example.invalid",
            certificate_authority: "ca-data",
            kubernetes_version: "1.29",
            container_runtime: Some("containerd"),
            bootstrap_arguments: &[],
            pre_bootstrap: None,
            post_bootstrap: None,
            node_config_yaml: None,
            labels: Box::leak(Box::new(BTreeMap::new())),
            taints: &[],
            max_pods: None,
        }
    }

    #[test]
    fn determinism_across_os_families() {
        for family in [
            OsFamily::AmazonLinux2,
            OsFamily::AmazonLinux2023,
            OsFamily::Bottlerocket,
            OsFamily::Windows,
        ] {
            let a = produce(family, &ctx());
            let b = produce(family, &ctx());
            assert_eq!(a, b);
        }
    }

    /// One producer-specific marker per OS family, collapsed into a single table instead of a
    /// near-identical `#[test]` fn per `userdata/*.rs` module.
    #[rstest]
    #[case::al2(
        OsFamily::AmazonLinux2,
        (|out: &str| out.contains("test-cluster") && out.contains("--apiserver-endpoint https://example.invalid")) as fn(&str) -> bool
    )]
    #[case::al2023(
        OsFamily::AmazonLinux2023,
        (|out: &str| out.contains("application/node.eks.aws") && out.contains("kind: NodeConfig")) as fn(&str) -> bool
    )]
    #[case::bottlerocket(
        OsFamily::Bottlerocket,
        (|out: &str| out.contains("[settings.kubernetes]") && out.contains("cluster-name = \"test-cluster\"")) as fn(&str) -> bool
    )]
    #[case::windows(
        OsFamily::Windows,
        (|out: &str| out.starts_with("<powershell>") && out.trim_end().ends_with("</powershell>")) as fn(&str) -> bool
    )]
    fn produces_os_specific_bootstrap_markers(#[case] family: OsFamily, #[case] matches: fn(&str) -> bool) {
        let out = String::from_utf8(produce(family, &ctx())).unwrap();
        assert!(matches(&out), "unexpected {family:?} output: {out}");
    }
}
