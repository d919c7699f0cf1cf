//! A pure function comparing a resolved `ScalingConfig`'s fields against the
//! desired input. Stable, commutative, and reflexive.

use std::collections::BTreeSet;

use crate::aws::model::DesiredConfigInput;

fn case_insensitive_set(items: &[String]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

/// `true` iff any compared field differs. Classic configs compare image/instance
/// type/profile/key/spot price/user-data/security-groups/block-devices; templates add
/// metadata options, placement, license specifications, and the mixed-instances policy.
pub fn drifted(current: &DesiredConfigInput, desired: &DesiredConfigInput) -> bool {
    if current.image_id != desired.image_id {
        return true;
    }
    if current.instance_type != desired.instance_type {
        return true;
    }
    if current.instance_profile_arn != desired.instance_profile_arn {
        return true;
    }
    if current.key_name != desired.key_name {
        return true;
    }
    if current.spot_price != desired.spot_price {
        return true;
    }
    if current.user_data != desired.user_data {
        return true;
    }
    if case_insensitive_set(&current.security_groups) != case_insensitive_set(&desired.security_groups) {
        return true;
    }
    if block_devices_differ(current, desired) {
        return true;
    }

    // Template-only fields. Absent on classic configs (both sides `None`), so this is a no-op
    // there.
    if current.metadata_options != desired.metadata_options {
        return true;
    }
    if current.placement != desired.placement {
        return true;
    }
    if case_insensitive_set(&current.license_specifications)
        != case_insensitive_set(&desired.license_specifications)
    {
        return true;
    }
    if current.mixed_instances_policy != desired.mixed_instances_policy {
        return true;
    }

    false
}

fn block_devices_differ(current: &DesiredConfigInput, desired: &DesiredConfigInput) -> bool {
    if current.block_devices.len() != desired.block_devices.len() {
        return true;
    }
    let mut current_sorted = current.block_devices.clone();
    let mut desired_sorted = desired.block_devices.clone();
    current_sorted.sort_by(|a, b| a.device_name.cmp(&b.device_name));
    desired_sorted.sort_by(|a, b| a.device_name.cmp(&b.device_name));
    current_sorted != desired_sorted
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::aws::model::BlockDevice;

    fn base() -> DesiredConfigInput {
        DesiredConfigInput {
            image_id: "ami-a".to_string(),
            instance_type: "m5.large".to_string(),
            instance_profile_arn: "arn:aws:iam::1:instance-profile/ig".to_string(),
            key_name: Some("key".to_string()),
            spot_price: None,
            user_data: b"hello".to_vec(),
            security_groups: vec!["sg-1".to_string(), "sg-2".to_string()],
            block_devices: vec![BlockDevice {
                device_name: "/dev/xvda".to_string(),
                volume_type: "gp3".to_string(),
                size: 20,
                iops: None,
                throughput: None,
            }],
            metadata_options: None,
            placement: None,
            license_specifications: vec![],
            mixed_instances_policy: None,
        }
    }

    #[test]
    fn reflexive() {
        let a = base();
        assert!(!drifted(&a, &a));
    }

    #[test]
    fn commutative_on_image_change() {
        let a = base();
        let mut b = base();
        b.image_id = "ami-b".to_string();
        assert_eq!(drifted(&a, &b), drifted(&b, &a));
        assert!(drifted(&a, &b));
    }

    #[rstest]
    #[case::security_groups_order_insensitive_case_insensitive(
        (|c: &mut DesiredConfigInput| c.security_groups = vec!["SG-2".to_string(), "sg-1".to_string()]) as fn(&mut DesiredConfigInput),
        false
    )]
    #[case::user_data_is_byte_exact(
        (|c: &mut DesiredConfigInput| c.user_data = b"hellp".to_vec()) as fn(&mut DesiredConfigInput),
        true
    )]
    #[case::block_device_field_differences_detected(
        (|c: &mut DesiredConfigInput| c.block_devices[0].size = 30) as fn(&mut DesiredConfigInput),
        true
    )]
    #[case::metadata_options_differ(
        (|c: &mut DesiredConfigInput| {
            c.metadata_options = Some(crate::aws::model::MetadataOptions {
                http_tokens: "required".to_string(),
                http_put_response_hop_limit: 2,
            })
        }) as fn(&mut DesiredConfigInput),
        true
    )]
    fn field_mutations_detect_expected_drift(
        #[case] mutate: fn(&mut DesiredConfigInput),
        #[case] expect_drift: bool,
    ) {
        let a = base();
        let mut b = base();
        mutate(&mut b);
        assert_eq!(drifted(&a, &b), expect_drift);
    }
}
