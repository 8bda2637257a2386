mod memory;

pub use memory::MemoryStore;

use crate::error::{Error, Result};
use crate::models::{ImagePolicy, ImagePolicyStatus, ImageRepository, ImageRepositoryStatus};
use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt::Debug;
use tracing::debug;

pub const REPOSITORY_KIND: &str = "ImageRepository";
pub const POLICY_KIND: &str = "ImagePolicy";

/// Persistent home of the declared resources and their status.
///
/// Status writes are conditional on the resourceVersion of the object that
/// was reconciled; a concurrent change fails with [`Error::Conflict`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_repository(&self, namespace: &str, name: &str) -> Result<Option<ImageRepository>>;

    async fn update_repository_status(
        &self,
        repository: &ImageRepository,
        status: &ImageRepositoryStatus,
    ) -> Result<()>;

    async fn update_policy_status(&self, policy: &ImagePolicy, status: &ImagePolicyStatus) -> Result<()>;
}

/// `namespace/name` of an object, for logs and error messages
pub fn object_key<K: ResourceExt>(obj: &K) -> Result<(String, String)> {
    let namespace = obj
        .namespace()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
    let name = obj
        .meta()
        .name
        .clone()
        .ok_or(Error::MissingObjectKey("metadata.name"))?;
    Ok((namespace, name))
}

/// Object store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn patch_status<K, S>(&self, kind: &'static str, obj: &K, status: &S) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
        S: Serialize + Sync,
    {
        let (namespace, name) = object_key(obj)?;
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);

        // resourceVersion turns the merge patch into a conditional write
        let patch = json!({
            "metadata": { "resourceVersion": obj.resource_version() },
            "status": status,
        });

        match api
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => {
                debug!("Updated status of {} {}/{}", kind, namespace, name);
                Ok(())
            },
            Err(kube::Error::Api(response)) if response.code == 409 => Err(Error::Conflict {
                kind,
                key: format!("{}/{}", namespace, name),
            }),
            Err(kube::Error::Api(response)) if response.code == 404 => Err(Error::NotFound {
                kind,
                key: format!("{}/{}", namespace, name),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get_repository(&self, namespace: &str, name: &str) -> Result<Option<ImageRepository>> {
        let api: Api<ImageRepository> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn update_repository_status(
        &self,
        repository: &ImageRepository,
        status: &ImageRepositoryStatus,
    ) -> Result<()> {
        self.patch_status(REPOSITORY_KIND, repository, status).await
    }

    async fn update_policy_status(&self, policy: &ImagePolicy, status: &ImagePolicyStatus) -> Result<()> {
        self.patch_status(POLICY_KIND, policy, status).await
    }
}
