use super::{ObjectStore, POLICY_KIND, REPOSITORY_KIND, object_key};
use crate::error::{Error, Result};
use crate::models::{ImagePolicy, ImagePolicyStatus, ImageRepository, ImageRepositoryStatus};
use async_trait::async_trait;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type Key = (String, String);

#[derive(Default)]
struct State {
    repositories: BTreeMap<Key, ImageRepository>,
    policies: BTreeMap<Key, ImagePolicy>,
    revision: u64,
}

impl State {
    fn next_revision(&mut self) -> String {
        self.revision += 1;
        self.revision.to_string()
    }
}

/// In-process object store with API-server-like bookkeeping.
///
/// `apply_*` behaves like a spec update: the generation increases when the
/// spec changes and the stored status is kept. Every write bumps the
/// resourceVersion, and status writes carrying a stale one are rejected.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn apply_repository(&self, repository: ImageRepository) -> Result<ImageRepository> {
        let key = object_key(&repository)?;
        let mut state = self.state.write().await;
        let revision = state.next_revision();

        let mut stored = repository;
        match state.repositories.get(&key) {
            Some(existing) => {
                let generation = existing.metadata.generation.unwrap_or(1);
                stored.metadata.generation = Some(if existing.spec == stored.spec {
                    generation
                } else {
                    generation + 1
                });
                stored.status = existing.status.clone();
            },
            None => stored.metadata.generation = Some(1),
        }
        stored.metadata.resource_version = Some(revision);

        state.repositories.insert(key, stored.clone());
        Ok(stored)
    }

    pub async fn apply_policy(&self, policy: ImagePolicy) -> Result<ImagePolicy> {
        let key = object_key(&policy)?;
        let mut state = self.state.write().await;
        let revision = state.next_revision();

        let mut stored = policy;
        match state.policies.get(&key) {
            Some(existing) => {
                let generation = existing.metadata.generation.unwrap_or(1);
                stored.metadata.generation = Some(if existing.spec == stored.spec {
                    generation
                } else {
                    generation + 1
                });
                stored.status = existing.status.clone();
            },
            None => stored.metadata.generation = Some(1),
        }
        stored.metadata.resource_version = Some(revision);

        state.policies.insert(key, stored.clone());
        Ok(stored)
    }

    pub async fn repository(&self, namespace: &str, name: &str) -> Option<ImageRepository> {
        let state = self.state.read().await;
        state
            .repositories
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub async fn policy(&self, namespace: &str, name: &str) -> Option<ImagePolicy> {
        let state = self.state.read().await;
        state
            .policies
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub async fn delete_repository(&self, namespace: &str, name: &str) -> Option<ImageRepository> {
        let mut state = self.state.write().await;
        state
            .repositories
            .remove(&(namespace.to_string(), name.to_string()))
    }

    pub async fn delete_policy(&self, namespace: &str, name: &str) -> Option<ImagePolicy> {
        let mut state = self.state.write().await;
        state
            .policies
            .remove(&(namespace.to_string(), name.to_string()))
    }
}

fn check_revision(
    kind: &'static str,
    key: &Key,
    stored: Option<&String>,
    given: Option<String>,
) -> Result<()> {
    let key_str = || format!("{}/{}", key.0, key.1);
    match stored {
        None => Err(Error::NotFound {
            kind,
            key: key_str(),
        }),
        Some(current) if given.as_ref() != Some(current) => Err(Error::Conflict {
            kind,
            key: key_str(),
        }),
        Some(_) => Ok(()),
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_repository(&self, namespace: &str, name: &str) -> Result<Option<ImageRepository>> {
        Ok(self.repository(namespace, name).await)
    }

    async fn update_repository_status(
        &self,
        repository: &ImageRepository,
        status: &ImageRepositoryStatus,
    ) -> Result<()> {
        let key = object_key(repository)?;
        let mut state = self.state.write().await;
        let stored_revision = state
            .repositories
            .get(&key)
            .and_then(|r| r.metadata.resource_version.clone());
        check_revision(
            REPOSITORY_KIND,
            &key,
            stored_revision.as_ref(),
            repository.resource_version(),
        )?;

        let revision = state.next_revision();
        if let Some(stored) = state.repositories.get_mut(&key) {
            stored.status = Some(status.clone());
            stored.metadata.resource_version = Some(revision);
        }
        Ok(())
    }

    async fn update_policy_status(&self, policy: &ImagePolicy, status: &ImagePolicyStatus) -> Result<()> {
        let key = object_key(policy)?;
        let mut state = self.state.write().await;
        let stored_revision = state
            .policies
            .get(&key)
            .and_then(|p| p.metadata.resource_version.clone());
        check_revision(
            POLICY_KIND,
            &key,
            stored_revision.as_ref(),
            policy.resource_version(),
        )?;

        let revision = state.next_revision();
        if let Some(stored) = state.policies.get_mut(&key) {
            stored.status = Some(status.clone());
            stored.metadata.resource_version = Some(revision);
        }
        Ok(())
    }
}
