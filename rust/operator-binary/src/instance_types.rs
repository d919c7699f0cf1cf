//! Sub-family flexible instance pool: when a
//! mixed-instances policy is requested without an explicit override list, the controller picks
//! same-generation instance types within the primary type's family whose vCPU/memory ratio is
//! close enough to be a safe substitute, and appends them after the explicit overrides.

use crate::aws::model::InstanceTypeInfo;

/// `<family>.<generation>.<size>`, e.g. `m5.large` -> family `m5`.
fn family_of(instance_type: &str) -> &str {
    instance_type.split('.').next().unwrap_or(instance_type)
}

fn ratio(info: &InstanceTypeInfo) -> f64 {
    if info.vcpus == 0 {
        0.0
    } else {
        info.memory_mib as f64 / info.vcpus as f64
    }
}

/// Returns instance types in the same family as `primary` whose memory-per-vCPU ratio is
/// within 10% of the primary's, sorted for determinism. The primary type itself is excluded;
/// callers that need it present append it separately.
pub fn sub_family_pool(primary: &str, catalog: &[InstanceTypeInfo]) -> Vec<String> {
    let family = family_of(primary);
    let Some(primary_info) = catalog.iter().find(|i| i.instance_type == primary) else {
        return Vec::new();
    };
    let primary_ratio = ratio(primary_info);
    if primary_ratio == 0.0 {
        return Vec::new();
    }

    let mut pool: Vec<String> = catalog
        .iter()
        .filter(|i| i.instance_type != primary)
        .filter(|i| family_of(&i.instance_type) == family)
        .filter(|i| {
            let delta = (ratio(i) - primary_ratio).abs() / primary_ratio;
            delta <= 0.10
        })
        .map(|i| i.instance_type.clone())
        .collect();
    pool.sort();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(instance_type: &str, vcpus: i32, memory_mib: i64) -> InstanceTypeInfo {
        InstanceTypeInfo {
            instance_type: instance_type.to_string(),
            vcpus,
            memory_mib,
        }
    }

    #[test]
    fn same_family_similar_ratio_included() {
        let catalog = vec![
            info("m5.large", 2, 8192),
            info("m5.xlarge", 4, 16384),
            info("c5.large", 2, 4096),
        ];
        let pool = sub_family_pool("m5.large", &catalog);
        assert_eq!(pool, vec!["m5.xlarge".to_string()]);
    }

    #[test]
    fn unknown_primary_yields_empty_pool() {
        let catalog = vec![info("m5.xlarge", 4, 16384)];
        assert!(sub_family_pool("m5.large", &catalog).is_empty());
    }
}
