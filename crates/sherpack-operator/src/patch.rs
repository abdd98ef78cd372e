//! Patching the declared object's status back to the API server (spec §6).
//!
//! The status write goes through server-side apply with a dedicated field
//! manager, mirroring `sherpack_kube::crd::apply`'s `CRD_FIELD_MANAGER`
//! pattern: the operator only ever owns the fields it sets, so a human
//! editing other parts of `status` (or another controller owning a
//! different field) is never clobbered.

use async_trait::async_trait;
use kube::api::{Api, Patch as KubePatch, PatchParams};

use crate::crd::{SherpackRelease, API_VERSION, KIND};
use crate::error::PatchError;

pub const FIELD_MANAGER: &str = "sherpack-operator";

/// Writes a status patch for a `SherpackRelease` back to the API server.
#[async_trait]
pub trait Patcher: Send + Sync {
    async fn patch_status(
        &self,
        name: &str,
        namespace: &str,
        status: serde_json::Value,
        field_manager: &str,
    ) -> Result<(), PatchError>;
}

/// Default implementation, backed by `kube::Api::patch_status` with
/// server-side apply forced (so the field manager always wins a conflict,
/// per spec §6's "patch is the only write path" invariant).
pub struct KubeApiPatcher {
    client: kube::Client,
}

impl KubeApiPatcher {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Patcher for KubeApiPatcher {
    async fn patch_status(
        &self,
        name: &str,
        namespace: &str,
        status: serde_json::Value,
        field_manager: &str,
    ) -> Result<(), PatchError> {
        let api: Api<SherpackRelease> = Api::namespaced(self.client.clone(), namespace);
        let params = PatchParams::apply(field_manager).force();
        let patch = serde_json::json!({
            "apiVersion": API_VERSION,
            "kind": KIND,
            "status": status,
        });
        api.patch_status(name, &params, &KubePatch::Apply(&patch))
            .await
            .map_err(PatchError::Api)?;
        Ok(())
    }
}
