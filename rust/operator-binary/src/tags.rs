//! Tagging vocabulary and the single comma-join helper the mutation planner uses for
//! lifecycle-hook and tag diffing.

use std::collections::BTreeMap;

pub const TAG_NAME: &str = "Name";
pub const TAG_KUBERNETES_CLUSTER: &str = "KubernetesCluster";
pub const TAG_CLUSTER_NAME: &str = "instancegroups.keikoproj.io/ClusterName";
pub const TAG_NAMESPACE: &str = "instancegroups.keikoproj.io/Namespace";
pub const TAG_INSTANCE_GROUP: &str = "instancegroups.keikoproj.io/InstanceGroup";
pub const TAG_CLUSTER_OWNED_PREFIX: &str = "kubernetes.io/cluster/";
pub const TAG_CLUSTER_AUTOSCALER_PREFIX: &str = "k8s.io/cluster-autoscaler/";

/// Builds the controller-owned tag set for a scaling group.
pub fn owned_tags(
    scaling_group_name: &str,
    cluster_name: &str,
    namespace: &str,
    name: &str,
    additional: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    tags.insert(TAG_NAME.to_string(), scaling_group_name.to_string());
    tags.insert(TAG_KUBERNETES_CLUSTER.to_string(), cluster_name.to_string());
    tags.insert(TAG_CLUSTER_NAME.to_string(), cluster_name.to_string());
    tags.insert(TAG_NAMESPACE.to_string(), namespace.to_string());
    tags.insert(TAG_INSTANCE_GROUP.to_string(), name.to_string());
    tags.insert(
        format!("{TAG_CLUSTER_OWNED_PREFIX}{cluster_name}"),
        "owned".to_string(),
    );
    tags.extend(additional.iter().map(|(k, v)| (k.clone(), v.clone())));
    tags
}

/// Autoscaler hint tags derived from node labels/taints, emitted only
/// when `cluster-autoscaler.enabled` is `"true"`.
pub fn autoscaler_tags(
    labels: &BTreeMap<String, String>,
    taints: &[crate::crd::Taint],
) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    for (k, v) in labels {
        tags.insert(format!("{TAG_CLUSTER_AUTOSCALER_PREFIX}node-template/label/{k}"), v.clone());
    }
    for taint in taints {
        tags.insert(
            format!("{TAG_CLUSTER_AUTOSCALER_PREFIX}node-template/taint/{}", taint.key),
            format!("{}:{}", taint.value, taint.effect),
        );
    }
    tags
}

/// added = desired − existing, removed = existing − desired.
pub struct TagDiff {
    pub added: BTreeMap<String, String>,
    pub removed: Vec<String>,
}

pub fn diff_tags(existing: &BTreeMap<String, String>, desired: &BTreeMap<String, String>) -> TagDiff {
    let added = desired
        .iter()
        .filter(|(k, v)| existing.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let removed = existing
        .keys()
        .filter(|k| !desired.contains_key(*k))
        .cloned()
        .collect();
    TagDiff { added, removed }
}

/// The one place a comma-joined identifier list is built.
pub fn join_identifiers<I: IntoIterator<Item = S>, S: AsRef<str>>(ids: I) -> String {
    ids.into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn tag_diff_added_and_removed() {
        let existing = BTreeMap::from([
            ("keep".to_string(), "1".to_string()),
            ("drop".to_string(), "2".to_string()),
        ]);
        let desired = BTreeMap::from([
            ("keep".to_string(), "1".to_string()),
            ("new".to_string(), "3".to_string()),
        ]);
        let diff = diff_tags(&existing, &desired);
        assert_eq!(diff.added.get("new"), Some(&"3".to_string()));
        assert!(!diff.added.contains_key("keep"));
        assert_eq!(diff.removed, vec!["drop".to_string()]);
    }

    #[rstest]
    #[case::multiple(vec!["a", "b", "c"], "a, b, c")]
    #[case::empty(Vec::<&str>::new(), "")]
    #[case::single(vec!["only"], "only")]
    fn join_identifiers_comma_separates(#[case] ids: Vec<&str>, #[case] expected: &str) {
        assert_eq!(join_identifiers(ids), expected);
    }
}
