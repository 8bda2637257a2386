use crate::cache::ScanCache;
use crate::config::ReflectorConfig;
use crate::error::{Error, Result};
use crate::filter::{Candidate, TagFilter};
use crate::metrics::POLICY_OUTCOMES;
use crate::models::{Condition, ImagePolicy, ImagePolicyStatus, reasons, set_condition};
use crate::policy::Policy;
use crate::store::{ObjectStore, object_key};
use kube::ResourceExt;
use kube::runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Result of evaluating one policy against the cached scan
#[derive(Debug)]
enum Evaluation {
    Ready {
        latest_image: String,
        tag: String,
    },
    NotReady {
        reason: &'static str,
        message: String,
        requeue: Duration,
    },
}

/// Selects the latest image for each ImagePolicy from the scan cache
pub struct PolicyReconciler {
    store: Arc<dyn ObjectStore>,
    cache: ScanCache,
    config: ReflectorConfig,
}

impl PolicyReconciler {
    pub fn new(store: Arc<dyn ObjectStore>, cache: ScanCache, config: ReflectorConfig) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    #[instrument(skip(self, policy), fields(policy = %policy.name_any()))]
    pub async fn reconcile(&self, policy: &ImagePolicy) -> Result<Action> {
        let (namespace, name) = object_key(policy)?;
        let generation = policy.metadata.generation;
        let current = policy.status.clone().unwrap_or_default();

        debug!("Reconciling ImagePolicy {}/{}", namespace, name);

        let evaluation = self.evaluate(&namespace, policy).await?;

        let mut status = current.clone();
        status.observed_generation = generation;

        let action = match evaluation {
            Evaluation::Ready { latest_image, tag } => {
                POLICY_OUTCOMES
                    .with_label_values(&[reasons::SUCCEEDED])
                    .inc();

                if current.latest_image.as_deref() != Some(latest_image.as_str()) {
                    info!(
                        "Latest image for ImagePolicy {}/{} is now {} (was {})",
                        namespace,
                        name,
                        latest_image,
                        current.latest_image.as_deref().unwrap_or("none")
                    );
                }

                set_condition(
                    &mut status.conditions,
                    Condition::ready(
                        reasons::SUCCEEDED,
                        format!("Latest image tag for '{}' resolved to {}", latest_image, tag),
                    )
                    .with_generation(generation),
                );
                status.latest_image = Some(latest_image);
                Action::requeue(self.config.policy_interval)
            },
            Evaluation::NotReady {
                reason,
                message,
                requeue,
            } => {
                POLICY_OUTCOMES.with_label_values(&[reason]).inc();
                warn!("ImagePolicy {}/{} is not ready: {}", namespace, name, message);

                set_condition(
                    &mut status.conditions,
                    Condition::not_ready(reason, message).with_generation(generation),
                );
                status.latest_image = None;
                Action::requeue(requeue)
            },
        };

        if status != current {
            self.store.update_policy_status(policy, &status).await?;
        } else {
            debug!("Status unchanged, skipping write");
        }

        Ok(action)
    }

    /// Resolve and evaluate a policy.
    ///
    /// Only object store failures are returned as errors; everything caused by
    /// the resources themselves ends up in the evaluation.
    async fn evaluate(&self, namespace: &str, policy: &ImagePolicy) -> Result<Evaluation> {
        let steady = self.config.policy_interval;
        let retry = self.config.retry_interval;

        let selector = match Policy::from_choice(&policy.spec.policy) {
            Ok(selector) => selector,
            Err(e) => return Ok(not_ready(reasons::INVALID_POLICY, e.to_string(), steady)),
        };

        let filter = match TagFilter::from_spec(policy.spec.filter_tags.as_ref()) {
            Ok(filter) => filter,
            Err(e @ Error::InvalidPattern { .. }) => {
                return Ok(not_ready(reasons::INVALID_PATTERN, e.to_string(), steady));
            },
            Err(e) => return Err(e),
        };

        let repository_name = &policy.spec.image_repository_ref.name;
        let Some(repository) = self.store.get_repository(namespace, repository_name).await? else {
            return Ok(not_ready(
                reasons::REPOSITORY_NOT_FOUND,
                format!("referenced ImageRepository {}/{} not found", namespace, repository_name),
                retry,
            ));
        };

        let Some(canonical) = repository
            .status
            .as_ref()
            .and_then(|s| s.canonical_image_name.clone())
        else {
            return Ok(not_ready(
                reasons::REPOSITORY_NOT_SCANNED,
                format!("ImageRepository {}/{} has not been scanned yet", namespace, repository_name),
                retry,
            ));
        };

        let Some(scan) = self.cache.get(&canonical).await else {
            return Ok(not_ready(
                reasons::REPOSITORY_NOT_SCANNED,
                format!("no scan of {} is available yet", canonical),
                retry,
            ));
        };

        let candidates: Vec<Candidate> = match &filter {
            Some(filter) => filter.apply(&scan.tags),
            None => scan.tags.iter().map(|t| Candidate::unfiltered(t)).collect(),
        };

        match selector.latest(&candidates) {
            Some(winner) => Ok(Evaluation::Ready {
                latest_image: format!("{}:{}", canonical, winner.tag),
                tag: winner.tag.clone(),
            }),
            None => Ok(not_ready(
                reasons::NO_MATCHING_TAG,
                format!(
                    "no tag of {} satisfies the {} policy ({} scanned, {} after filtering)",
                    canonical,
                    selector.kind(),
                    scan.tag_count,
                    candidates.len()
                ),
                steady,
            )),
        }
    }
}

fn not_ready(reason: &'static str, message: String, requeue: Duration) -> Evaluation {
    Evaluation::NotReady {
        reason,
        message,
        requeue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ScanResult;
    use crate::models::{
        ImagePolicyChoice, ImagePolicySpec, ImageRepository, ImageRepositorySpec,
        ImageRepositoryStatus, LocalObjectReference, READY, SemVerPolicy, TagFilterSpec,
        find_condition,
    };
    use crate::store::MemoryStore;

    async fn setup(tags: &[&str]) -> (MemoryStore, ScanCache, PolicyReconciler) {
        let store = MemoryStore::new();
        let cache = ScanCache::new();

        let mut repo = ImageRepository::new(
            "app",
            ImageRepositorySpec {
                image: "ghcr.io/org/app".to_string(),
                interval: "5m".to_string(),
                timeout: None,
                secret_ref: None,
                insecure: false,
                suspend: false,
                exclusion_list: Vec::new(),
            },
        );
        repo.metadata.namespace = Some("default".to_string());
        let repo = store.apply_repository(repo).await.unwrap();
        store
            .update_repository_status(
                &repo,
                &ImageRepositoryStatus {
                    canonical_image_name: Some("ghcr.io/org/app".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        cache
            .put(ScanResult::new(
                "ghcr.io/org/app",
                tags.iter().map(|t| t.to_string()),
            ))
            .await;

        let reconciler = PolicyReconciler::new(
            Arc::new(store.clone()),
            cache.clone(),
            ReflectorConfig::default(),
        );
        (store, cache, reconciler)
    }

    async fn apply(
        store: &MemoryStore,
        repository: &str,
        choice: ImagePolicyChoice,
        filter: Option<TagFilterSpec>,
    ) -> ImagePolicy {
        let mut policy = ImagePolicy::new(
            "app-policy",
            ImagePolicySpec {
                image_repository_ref: LocalObjectReference {
                    name: repository.to_string(),
                },
                filter_tags: filter,
                policy: choice,
            },
        );
        policy.metadata.namespace = Some("default".to_string());
        store.apply_policy(policy).await.unwrap()
    }

    fn semver(range: &str) -> ImagePolicyChoice {
        ImagePolicyChoice {
            semver: Some(SemVerPolicy {
                range: range.to_string(),
            }),
            ..Default::default()
        }
    }

    async fn status(store: &MemoryStore) -> ImagePolicyStatus {
        store
            .policy("default", "app-policy")
            .await
            .unwrap()
            .status
            .unwrap()
    }

    #[tokio::test]
    async fn test_ready_with_latest_image() {
        let (store, _cache, reconciler) = setup(&["1.0.0", "1.0.1", "1.1.0"]).await;
        let policy = apply(&store, "app", semver("1.0.x"), None).await;

        let action = reconciler.reconcile(&policy).await.unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(300)));

        let status = status(&store).await;
        assert_eq!(status.latest_image.as_deref(), Some("ghcr.io/org/app:1.0.1"));
        assert_eq!(status.observed_generation, Some(1));
        assert!(find_condition(&status.conditions, READY).unwrap().is_true());
    }

    #[tokio::test]
    async fn test_unchanged_outcome_skips_write() {
        let (store, _cache, reconciler) = setup(&["1.0.0"]).await;
        let policy = apply(&store, "app", semver(">=1.0.0"), None).await;

        reconciler.reconcile(&policy).await.unwrap();
        let after_first = store.policy("default", "app-policy").await.unwrap();
        reconciler.reconcile(&after_first).await.unwrap();
        let after_second = store.policy("default", "app-policy").await.unwrap();

        assert_eq!(after_first.resource_version(), after_second.resource_version());
    }

    #[tokio::test]
    async fn test_invalid_policy_kind() {
        let (store, _cache, reconciler) = setup(&["1.0.0"]).await;
        let policy = apply(&store, "app", ImagePolicyChoice::default(), None).await;

        reconciler.reconcile(&policy).await.unwrap();

        let status = status(&store).await;
        let ready = find_condition(&status.conditions, READY).unwrap();
        assert_eq!(ready.reason, reasons::INVALID_POLICY);
        assert!(status.latest_image.is_none());
    }

    #[tokio::test]
    async fn test_invalid_range() {
        let (store, _cache, reconciler) = setup(&["1.0.0"]).await;
        let policy = apply(&store, "app", semver("not a range"), None).await;

        reconciler.reconcile(&policy).await.unwrap();

        let status = status(&store).await;
        let ready = find_condition(&status.conditions, READY).unwrap();
        assert_eq!(ready.reason, reasons::INVALID_POLICY);
        assert!(ready.message.contains("not a range"));
    }

    #[tokio::test]
    async fn test_configuration_checked_before_repository() {
        let (store, _cache, reconciler) = setup(&["1.0.0"]).await;
        let filter = TagFilterSpec {
            pattern: "^test-(.*".to_string(),
            extract: "$1".to_string(),
        };
        let policy = apply(&store, "missing", semver(">=0.x"), Some(filter)).await;

        reconciler.reconcile(&policy).await.unwrap();

        let status = status(&store).await;
        let ready = find_condition(&status.conditions, READY).unwrap();
        assert_eq!(ready.reason, reasons::INVALID_PATTERN);
        assert!(ready.message.contains("invalid regular expression pattern"));
    }

    #[tokio::test]
    async fn test_not_scanned_requeues_at_retry_interval() {
        let (store, cache, reconciler) = setup(&["1.0.0"]).await;
        cache.remove("ghcr.io/org/app").await;
        let policy = apply(&store, "app", semver(">=1.0.0"), None).await;

        let action = reconciler.reconcile(&policy).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(10)));
        let status = status(&store).await;
        let ready = find_condition(&status.conditions, READY).unwrap();
        assert_eq!(ready.reason, reasons::REPOSITORY_NOT_SCANNED);
    }

    #[tokio::test]
    async fn test_no_matching_tag() {
        let (store, _cache, reconciler) = setup(&["latest", "main"]).await;
        let policy = apply(&store, "app", semver(">=1.0.0"), None).await;

        reconciler.reconcile(&policy).await.unwrap();

        let status = status(&store).await;
        let ready = find_condition(&status.conditions, READY).unwrap();
        assert_eq!(ready.reason, reasons::NO_MATCHING_TAG);
        assert!(status.latest_image.is_none());
    }

    #[tokio::test]
    async fn test_latest_image_cleared_when_repository_disappears() {
        let (store, _cache, reconciler) = setup(&["1.0.0"]).await;
        let policy = apply(&store, "app", semver(">=1.0.0"), None).await;
        reconciler.reconcile(&policy).await.unwrap();
        assert!(status(&store).await.latest_image.is_some());

        store.delete_repository("default", "app").await;
        let policy = store.policy("default", "app-policy").await.unwrap();
        reconciler.reconcile(&policy).await.unwrap();

        let status = status(&store).await;
        let ready = find_condition(&status.conditions, READY).unwrap();
        assert_eq!(ready.reason, reasons::REPOSITORY_NOT_FOUND);
        assert!(status.latest_image.is_none());
    }
}
