//! Feature-flag annotations. These are read straight off the resource's
//! `metadata.annotations` map rather than modeled as typed spec fields, matching how the
//! source system treats them: opt-in toggles that don't participate in drift detection.

use std::collections::BTreeMap;

pub const CLUSTER_AUTOSCALER_ENABLED: &str = "cluster-autoscaler.enabled";
pub const CUSTOM_NETWORKING_ENABLED: &str = "custom-networking.enabled";
pub const CUSTOM_NETWORKING_PREFIX_ASSIGNMENT_ENABLED: &str =
    "custom-networking.prefix-assignment.enabled";
pub const CUSTOM_NETWORKING_HOST_PODS: &str = "custom-networking.host-pods";
pub const IRSA_ENABLED: &str = "irsa.enabled";
pub const OS_FAMILY: &str = "os-family";
pub const OVERRIDE_DEFAULT_LABELS: &str = "override-default-labels";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OsFamily {
    AmazonLinux2,
    AmazonLinux2023,
    Bottlerocket,
    Windows,
}

impl OsFamily {
    fn from_annotation(value: &str) -> Self {
        match value {
            "amazonlinux2023" => OsFamily::AmazonLinux2023,
            "bottlerocket" => OsFamily::Bottlerocket,
            "windows" => OsFamily::Windows,
            _ => OsFamily::AmazonLinux2,
        }
    }
}

/// Thin, read-only view over an object's annotation map. Kept separate from the typed spec
/// so that flipping a flag never participates in drift comparison.
pub struct Annotations<'a>(pub &'a BTreeMap<String, String>);

impl<'a> Annotations<'a> {
    fn flag(&self, key: &str) -> bool {
        self.0.get(key).map(String::as_str) == Some("true")
    }

    pub fn cluster_autoscaler_enabled(&self) -> bool {
        self.flag(CLUSTER_AUTOSCALER_ENABLED)
    }

    pub fn custom_networking_enabled(&self) -> bool {
        self.flag(CUSTOM_NETWORKING_ENABLED)
    }

    pub fn custom_networking_prefix_assignment_enabled(&self) -> bool {
        self.flag(CUSTOM_NETWORKING_PREFIX_ASSIGNMENT_ENABLED)
    }

    pub fn custom_networking_host_pods(&self) -> Option<u32> {
        self.0
            .get(CUSTOM_NETWORKING_HOST_PODS)
            .and_then(|v| v.parse().ok())
    }

    pub fn irsa_enabled(&self) -> bool {
        self.flag(IRSA_ENABLED)
    }

    pub fn os_family(&self) -> OsFamily {
        self.0
            .get(OS_FAMILY)
            .map(|v| OsFamily::from_annotation(v))
            .unwrap_or(OsFamily::AmazonLinux2)
    }

    pub fn override_default_labels(&self) -> Option<&str> {
        self.0.get(OVERRIDE_DEFAULT_LABELS).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_flags_default_false() {
        let map = BTreeMap::new();
        let a = Annotations(&map);
        assert!(!a.irsa_enabled());
        assert!(!a.cluster_autoscaler_enabled());
        assert_eq!(a.os_family(), OsFamily::AmazonLinux2);
    }

    #[test]
    fn only_literal_true_counts() {
        let mut map = BTreeMap::new();
        map.insert(IRSA_ENABLED.to_string(), "yes".to_string());
        let a = Annotations(&map);
        assert!(!a.irsa_enabled());

        map.insert(IRSA_ENABLED.to_string(), "true".to_string());
        let a = Annotations(&map);
        assert!(a.irsa_enabled());
    }
}
