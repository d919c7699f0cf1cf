//! The node-authorization `ConfigMap` (`kube-system/aws-auth`) is the one shared mutable
//! Kubernetes object in this controller. Reads-then-writes are guarded by a process-wide mutex
//! and retried under optimistic concurrency (resource version) on conflict, since many instance
//! groups' ticks race to patch the same object.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use stackable_operator::kube::api::{Api, Patch, PatchParams};
use tokio::sync::Mutex;

const NAMESPACE: &str = "kube-system";
const NAME: &str = "aws-auth";
const MAP_ROLES_KEY: &str = "mapRoles";
const MAX_RETRIES: u32 = 5;
const FIELD_MANAGER: &str = "instance-group-operator";

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to read the {NAMESPACE}/{NAME} config map"))]
    Read { source: stackable_operator::kube::Error },

    #[snafu(display("failed to parse mapRoles as yaml"))]
    ParseMapRoles { source: serde_yaml::Error },

    #[snafu(display("failed to serialize mapRoles as yaml"))]
    SerializeMapRoles { source: serde_yaml::Error },

    #[snafu(display("optimistic-concurrency retries exceeded while updating {NAMESPACE}/{NAME}"))]
    RetriesExceeded { source: stackable_operator::kube::Error },
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct MapRoleEntry {
    pub rolearn: String,
    pub username: String,
    pub groups: Vec<String>,
}

fn node_role_entry(role_arn: &str) -> MapRoleEntry {
    MapRoleEntry {
        rolearn: role_arn.to_string(),
        username: "system:node:{{EC2PrivateDNSName}}".to_string(),
        groups: vec!["system:bootstrappers".to_string(), "system:nodes".to_string()],
    }
}

/// One mutex shared by every instance group's reconcile tick in this process. A single
/// reconciler binary serves many `InstanceGroup`s, so this must not be per-instance-group state.
pub struct AuthConfig {
    lock: Arc<Mutex<()>>,
    client: stackable_operator::kube::Client,
}

impl AuthConfig {
    pub fn new(client: &stackable_operator::client::Client) -> Self {
        AuthConfig { lock: Arc::new(Mutex::new(())), client: client.as_kube_client() }
    }

    fn api(&self) -> Api<stackable_operator::k8s_openapi::api::core::v1::ConfigMap> {
        Api::namespaced(self.client.clone(), NAMESPACE)
    }

    /// Idempotently ensures `role_arn` has a `mapRoles` entry. Best-effort: callers log and
    /// retry next tick on failure rather than failing the whole tick.
    pub async fn ensure_role(&self, role_arn: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.retry_patch(|mut roles| {
            if !roles.iter().any(|r| r.rolearn == role_arn) {
                roles.push(node_role_entry(role_arn));
                roles.sort_by(|a, b| a.rolearn.cmp(&b.rolearn));
            }
            roles
        })
        .await
    }

    /// Removes the entry only when called — the peer scan deciding *whether* to call this
    /// lives in `discovery::role_arn_shared_with_other_group`.
    pub async fn remove_role(&self, role_arn: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.retry_patch(|roles| roles.into_iter().filter(|r| r.rolearn != role_arn).collect())
            .await
    }

    async fn retry_patch(&self, mutate: impl Fn(Vec<MapRoleEntry>) -> Vec<MapRoleEntry>) -> Result<()> {
        let api = self.api();
        for attempt in 0..MAX_RETRIES {
            // A brand-new cluster may not have `aws-auth` yet; server-side apply below creates
            // it, so a missing config map is treated as an empty role list rather than an error.
            let roles = match api.get(NAME).await {
                Ok(current) => read_map_roles(&current)?,
                Err(stackable_operator::kube::Error::Api(e)) if e.code == 404 => Vec::new(),
                Err(source) => return Err(Error::Read { source }),
            };
            let updated = mutate(roles);
            let yaml = serde_yaml::to_string(&updated).context(SerializeMapRolesSnafu)?;

            let patch = serde_json::json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": { "name": NAME, "namespace": NAMESPACE },
                "data": { MAP_ROLES_KEY: yaml },
            });

            match api
                .patch(NAME, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&patch))
                .await
            {
                Ok(_) => return Ok(()),
                Err(err) if attempt + 1 == MAX_RETRIES => return Err(Error::RetriesExceeded { source: err }),
                Err(_) => continue,
            }
        }
        unreachable!("loop always returns on its final iteration")
    }
}

fn read_map_roles(
    config_map: &stackable_operator::k8s_openapi::api::core::v1::ConfigMap,
) -> Result<Vec<MapRoleEntry>> {
    let Some(data) = &config_map.data else {
        return Ok(Vec::new());
    };
    match data.get(MAP_ROLES_KEY) {
        Some(yaml) => serde_yaml::from_str(yaml).context(ParseMapRolesSnafu),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_role_entry_has_bootstrapper_groups() {
        let entry = node_role_entry("arn:aws:iam::111122223333:role/ig-test-role");
        assert_eq!(entry.groups, vec!["system:bootstrappers", "system:nodes"]);
        assert_eq!(entry.username, "system:node:{{EC2PrivateDNSName}}");
    }

    #[test]
    fn ensure_role_mutation_is_idempotent() {
        let existing = vec![node_role_entry("arn:a")];
        let mutate = |mut roles: Vec<MapRoleEntry>| {
            if !roles.iter().any(|r| r.rolearn == "arn:a") {
                roles.push(node_role_entry("arn:a"));
            }
            roles
        };
        let result = mutate(existing.clone());
        assert_eq!(result, existing);
    }

    #[test]
    fn remove_role_drops_matching_entry() {
        let existing = vec![node_role_entry("arn:a"), node_role_entry("arn:b")];
        let result: Vec<MapRoleEntry> = existing.into_iter().filter(|r| r.rolearn != "arn:a").collect();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].rolearn, "arn:b");
    }
}
