// Common test utilities for integration tests
//
// This module provides fixtures for running both reconcilers against an
// in-memory object store and a fake registry, without a cluster
#![allow(dead_code)]

use async_trait::async_trait;
use reflector::cache::ScanCache;
use reflector::config::ReflectorConfig;
use reflector::controller::{PolicyReconciler, RepositoryReconciler};
use reflector::models::{
    AlphabeticalPolicy, ImagePolicy, ImagePolicyChoice, ImagePolicySpec, ImagePolicyStatus,
    ImageRepository, ImageRepositorySpec, ImageRepositoryStatus, LocalObjectReference,
    NumericalPolicy, SemVerPolicy, SortOrder, TagFilterSpec,
};
use reflector::registry::{ScanRequest, TagLister};
use reflector::store::MemoryStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const NAMESPACE: &str = "default";

/// Registry stand-in: tags per canonical image, with a switch to fail scans
#[derive(Default)]
pub struct FakeRegistry {
    tags: Mutex<HashMap<String, Vec<String>>>,
    failing: Mutex<bool>,
    scans: Mutex<usize>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, image: &str, tags: &[&str]) {
        self.tags.lock().unwrap().insert(
            image.to_string(),
            tags.iter().map(|t| t.to_string()).collect(),
        );
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn scans(&self) -> usize {
        *self.scans.lock().unwrap()
    }
}

#[async_trait]
impl TagLister for FakeRegistry {
    async fn list_tags(&self, request: &ScanRequest) -> anyhow::Result<Vec<String>> {
        *self.scans.lock().unwrap() += 1;

        if *self.failing.lock().unwrap() {
            anyhow::bail!("connection refused by {}", request.location.registry());
        }

        self.tags
            .lock()
            .unwrap()
            .get(&request.location.to_string())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("repository {} not found", request.location))
    }
}

/// Both reconcilers wired to one store, one cache and one fake registry
pub struct Harness {
    pub store: MemoryStore,
    pub cache: ScanCache,
    pub registry: Arc<FakeRegistry>,
    pub repositories: RepositoryReconciler,
    pub policies: PolicyReconciler,
}

impl Harness {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let cache = ScanCache::new();
        let registry = Arc::new(FakeRegistry::new());
        let config = ReflectorConfig::default();

        Self {
            repositories: RepositoryReconciler::new(
                Arc::new(store.clone()),
                registry.clone(),
                cache.clone(),
                config.clone(),
            ),
            policies: PolicyReconciler::new(Arc::new(store.clone()), cache.clone(), config),
            store,
            cache,
            registry,
        }
    }

    /// Create or update an ImageRepository and reconcile it once
    pub async fn apply_repository(&self, name: &str, image: &str) -> ImageRepositoryStatus {
        let repository = self
            .store
            .apply_repository(create_test_repository(name, image))
            .await
            .unwrap();
        self.repositories.reconcile(&repository).await.unwrap();
        self.repository_status(name).await
    }

    /// Reconcile the stored ImageRepository again
    pub async fn rescan(&self, name: &str) -> ImageRepositoryStatus {
        let repository = self.store.repository(NAMESPACE, name).await.unwrap();
        self.repositories.reconcile(&repository).await.unwrap();
        self.repository_status(name).await
    }

    /// Create or update an ImagePolicy and reconcile it once
    pub async fn apply_policy(&self, policy: ImagePolicy) -> ImagePolicyStatus {
        let name = policy.metadata.name.clone().unwrap();
        let policy = self.store.apply_policy(policy).await.unwrap();
        self.policies.reconcile(&policy).await.unwrap();
        self.policy_status(&name).await
    }

    /// Reconcile the stored ImagePolicy again
    pub async fn reevaluate(&self, name: &str) -> ImagePolicyStatus {
        let policy = self.store.policy(NAMESPACE, name).await.unwrap();
        self.policies.reconcile(&policy).await.unwrap();
        self.policy_status(name).await
    }

    pub async fn repository_status(&self, name: &str) -> ImageRepositoryStatus {
        self.store
            .repository(NAMESPACE, name)
            .await
            .and_then(|r| r.status)
            .unwrap_or_default()
    }

    pub async fn policy_status(&self, name: &str) -> ImagePolicyStatus {
        self.store
            .policy(NAMESPACE, name)
            .await
            .and_then(|p| p.status)
            .unwrap_or_default()
    }
}

/// Creates a sample ImageRepository for testing
pub fn create_test_repository(name: &str, image: &str) -> ImageRepository {
    let mut repository = ImageRepository::new(
        name,
        ImageRepositorySpec {
            image: image.to_string(),
            interval: "5m".to_string(),
            timeout: None,
            secret_ref: None,
            insecure: false,
            suspend: false,
            exclusion_list: reflector::models::default_exclusion_list(),
        },
    );
    repository.metadata.namespace = Some(NAMESPACE.to_string());
    repository
}

/// Creates a sample ImagePolicy for testing
pub fn create_test_policy(
    name: &str,
    repository: &str,
    policy: ImagePolicyChoice,
    filter: Option<TagFilterSpec>,
) -> ImagePolicy {
    let mut image_policy = ImagePolicy::new(
        name,
        ImagePolicySpec {
            image_repository_ref: LocalObjectReference {
                name: repository.to_string(),
            },
            filter_tags: filter,
            policy,
        },
    );
    image_policy.metadata.namespace = Some(NAMESPACE.to_string());
    image_policy
}

pub fn semver(range: &str) -> ImagePolicyChoice {
    ImagePolicyChoice {
        semver: Some(SemVerPolicy {
            range: range.to_string(),
        }),
        ..Default::default()
    }
}

pub fn alphabetical(order: SortOrder) -> ImagePolicyChoice {
    ImagePolicyChoice {
        alphabetical: Some(AlphabeticalPolicy { order }),
        ..Default::default()
    }
}

pub fn numerical(order: SortOrder) -> ImagePolicyChoice {
    ImagePolicyChoice {
        numerical: Some(NumericalPolicy { order }),
        ..Default::default()
    }
}

pub fn filter(pattern: &str, extract: &str) -> Option<TagFilterSpec> {
    Some(TagFilterSpec {
        pattern: pattern.to_string(),
        extract: extract.to_string(),
    })
}

pub fn tags(values: &[&str]) -> Vec<String> {
    values.iter().map(|t| t.to_string()).collect()
}
