//! Checks whether an externally-driven rollout (`AwsUpgradeStrategy.crd`) is still in progress
//! for this instance group, `spec.md` §4.4 update-path step 5: "If a drain/upgrade CR is
//! already active for this group, mark rotationNeeded." The controller never creates or drives
//! this resource itself; it only reads the named custom resource's status to decide whether a
//! rotation is still pending.

use snafu::{ResultExt, Snafu};
use stackable_operator::kube::{
    api::{Api, DynamicObject},
    core::{ApiResource, GroupVersionKind},
};

use crate::crd::CrdStrategy;

/// Group of the external rolling-upgrade CRD this strategy delegates to. Not part of
/// `CrdStrategy` itself since every instance in this controller's fleet delegates to the same
/// companion controller.
const GROUP: &str = "upgrademgr.keikoproj.io";
const VERSION: &str = "v1alpha1";

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to look up external upgrade resource {name}"))]
    Lookup {
        name: String,
        source: stackable_operator::kube::Error,
    },
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// `true` while the named external upgrade resource exists and its status hasn't yet reached
/// `statusSuccessString`/`statusFailureString` at `statusJsonPath`. A resource that was never
/// created, or has already been cleaned up by its own controller, counts as "not active".
pub async fn is_active(
    client: &stackable_operator::client::Client,
    namespace: &str,
    name: &str,
    strategy: &CrdStrategy,
) -> Result<bool> {
    let gvk = GroupVersionKind {
        group: GROUP.to_string(),
        version: VERSION.to_string(),
        kind: strategy.crd_name.clone(),
    };
    let plural = format!("{}s", strategy.crd_name.to_lowercase());
    let api_resource = ApiResource::from_gvk_with_plural(&gvk, &plural);
    let api: Api<DynamicObject> =
        Api::namespaced_with(client.as_kube_client(), namespace, &api_resource);

    let resource = match api.get_opt(name).await.context(LookupSnafu { name })? {
        Some(resource) => resource,
        None => return Ok(false),
    };

    match json_path(&resource.data, &strategy.status_json_path) {
        Some(value) => {
            let status = value.as_str().unwrap_or_default();
            Ok(status != strategy.status_success_string && status != strategy.status_failure_string)
        }
        // Status not populated yet: the companion controller hasn't reported a terminal state.
        None => Ok(true),
    }
}

/// Resolves a dotted field path (`status.currentStatus`) against a JSON value. No array
/// indices: `CrdStrategy.statusJsonPath` only ever names plain object fields.
fn json_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.trim_start_matches('.')
        .split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |v, segment| v.get(segment))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn json_path_resolves_nested_field() {
        let v = json!({"status": {"currentStatus": "running"}});
        assert_eq!(json_path(&v, "status.currentStatus").unwrap(), "running");
    }

    #[test]
    fn json_path_missing_segment_returns_none() {
        let v = json!({"status": {}});
        assert!(json_path(&v, "status.currentStatus").is_none());
    }

    #[test]
    fn json_path_leading_dot_is_tolerated() {
        let v = json!({"status": {"currentStatus": "ok"}});
        assert_eq!(json_path(&v, ".status.currentStatus").unwrap(), "ok");
    }
}
