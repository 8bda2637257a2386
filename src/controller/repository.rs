use crate::cache::{ScanCache, ScanResult};
use crate::config::ReflectorConfig;
use crate::error::{Error, Result};
use crate::metrics::{CACHED_IMAGES, SCAN_FAILURES, SCANS_TOTAL, TAGS_DISCOVERED};
use crate::models::{
    Condition, ImageLocation, ImageRepository, ImageRepositoryStatus, READY, ScanResultSummary,
    find_condition, parse_duration, reasons, set_condition,
};
use crate::registry::{ScanRequest, TagLister};
use crate::store::{ObjectStore, object_key};
use chrono::Utc;
use kube::ResourceExt;
use kube::runtime::controller::Action;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Finalizer guarding removal of a repository's cached scan
pub const FINALIZER: &str = "reflector.headwind.sh/finalizer";

/// Settings derived from an ImageRepository spec before scanning
struct ScanPlan {
    location: ImageLocation,
    interval: Duration,
    timeout: Duration,
    exclusions: Vec<Regex>,
}

/// Scans image locations and publishes the tags to the scan cache
pub struct RepositoryReconciler {
    store: Arc<dyn ObjectStore>,
    lister: Arc<dyn TagLister>,
    cache: ScanCache,
    config: ReflectorConfig,
}

impl RepositoryReconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        lister: Arc<dyn TagLister>,
        cache: ScanCache,
        config: ReflectorConfig,
    ) -> Self {
        Self {
            store,
            lister,
            cache,
            config,
        }
    }

    #[instrument(skip(self, repository), fields(repository = %repository.name_any()))]
    pub async fn reconcile(&self, repository: &ImageRepository) -> Result<Action> {
        let (namespace, name) = object_key(repository)?;
        let generation = repository.metadata.generation;
        let current = repository.status.clone().unwrap_or_default();

        debug!("Reconciling ImageRepository {}/{}", namespace, name);

        if repository.spec.suspend {
            info!("ImageRepository {}/{} is suspended, skipping scan", namespace, name);
            let mut status = current.clone();
            status.observed_generation = generation;
            set_condition(
                &mut status.conditions,
                Condition::not_ready(reasons::SUSPENDED, "scanning is suspended")
                    .with_generation(generation),
            );
            self.write_status(repository, &current, status).await?;
            return Ok(Action::await_change());
        }

        let plan = match self.plan(repository) {
            Ok(plan) => plan,
            Err(e) if e.is_configuration() => {
                warn!("ImageRepository {}/{} is misconfigured: {}", namespace, name, e);
                let mut status = current.clone();
                status.observed_generation = generation;
                set_condition(
                    &mut status.conditions,
                    Condition::not_ready(configuration_reason(&e), e.to_string())
                        .with_generation(generation),
                );
                self.write_status(repository, &current, status).await?;
                return Ok(Action::requeue(self.config.policy_interval));
            },
            Err(e) => return Err(e),
        };

        if let Some(remaining) = self.time_until_due(repository, &current, &plan).await {
            debug!(
                "ImageRepository {}/{} was scanned recently, next scan in {:?}",
                namespace, name, remaining
            );
            return Ok(Action::requeue(remaining));
        }

        let canonical = plan.location.to_string();
        let request = ScanRequest {
            location: plan.location.clone(),
            namespace: namespace.clone(),
            secret_name: repository.spec.secret_ref.as_ref().map(|r| r.name.clone()),
            insecure: repository.spec.insecure,
        };

        SCANS_TOTAL.inc();
        let outcome = match tokio::time::timeout(plan.timeout, self.lister.list_tags(&request)).await {
            Ok(Ok(tags)) => Ok(tags),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(_) => Err(format!("scan timed out after {:?}", plan.timeout)),
        };

        let mut status = current.clone();
        status.observed_generation = generation;
        status.canonical_image_name = Some(canonical.clone());

        match outcome {
            Ok(tags) => {
                let result = ScanResult::new(
                    canonical.clone(),
                    tags.into_iter()
                        .filter(|tag| !plan.exclusions.iter().any(|re| re.is_match(tag))),
                );
                let tag_count = result.tag_count;

                status.last_scan_result = Some(ScanResultSummary {
                    tag_count,
                    scan_time: result.scanned_at,
                });
                set_condition(
                    &mut status.conditions,
                    Condition::ready(
                        reasons::SUCCEEDED,
                        format!("successful scan: found {} tags", tag_count),
                    )
                    .with_generation(generation),
                );

                self.cache.put(result).await;
                CACHED_IMAGES.set(self.cache.len().await as i64);
                TAGS_DISCOVERED
                    .with_label_values(&[canonical.as_str()])
                    .set(tag_count as i64);

                info!(
                    "Scanned {} for ImageRepository {}/{}: {} tags",
                    canonical, namespace, name, tag_count
                );
            },
            Err(message) => {
                SCAN_FAILURES.inc();
                warn!(
                    "Scan of {} for ImageRepository {}/{} failed: {}",
                    canonical, namespace, name, message
                );
                set_condition(
                    &mut status.conditions,
                    Condition::not_ready(reasons::SCAN_FAILED, message).with_generation(generation),
                );
            },
        }

        self.write_status(repository, &current, status).await?;
        Ok(Action::requeue(plan.interval))
    }

    /// Drop the cached scan of a repository that is being deleted
    pub async fn cleanup(&self, repository: &ImageRepository) -> Result<Action> {
        let (namespace, name) = object_key(repository)?;

        let canonical = repository
            .status
            .as_ref()
            .and_then(|s| s.canonical_image_name.clone())
            .or_else(|| {
                ImageLocation::parse(&repository.spec.image)
                    .ok()
                    .map(|location| location.to_string())
            });

        if let Some(canonical) = canonical {
            if self.cache.remove(&canonical).await.is_some() {
                info!(
                    "Removed cached scan of {} for deleted ImageRepository {}/{}",
                    canonical, namespace, name
                );
            }
            let _ = TAGS_DISCOVERED.remove_label_values(&[canonical.as_str()]);
            CACHED_IMAGES.set(self.cache.len().await as i64);
        }

        Ok(Action::await_change())
    }

    fn plan(&self, repository: &ImageRepository) -> Result<ScanPlan> {
        let location = ImageLocation::parse(&repository.spec.image)?;

        let interval = parse_duration(&repository.spec.interval)?;
        if interval.is_zero() {
            return Err(Error::InvalidInterval(repository.spec.interval.clone()));
        }

        let timeout = match &repository.spec.timeout {
            Some(raw) => parse_duration(raw)?,
            None => self.config.scan_timeout,
        };

        let exclusions = repository
            .spec
            .exclusion_list
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| Error::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ScanPlan {
            location,
            interval,
            timeout,
            exclusions,
        })
    }

    /// Time left before the next scan is due, or `None` when a scan should run now.
    ///
    /// A scan is not due while the last successful one covers the current
    /// generation, is younger than the interval and is still in the cache.
    async fn time_until_due(
        &self,
        repository: &ImageRepository,
        current: &ImageRepositoryStatus,
        plan: &ScanPlan,
    ) -> Option<Duration> {
        if current.observed_generation != repository.metadata.generation {
            return None;
        }

        let ready = find_condition(&current.conditions, READY).is_some_and(Condition::is_true);
        if !ready {
            return None;
        }

        let canonical = plan.location.to_string();
        if current.canonical_image_name.as_deref() != Some(canonical.as_str()) {
            return None;
        }

        let last_scan = current.last_scan_result.as_ref()?;
        self.cache.get(&canonical).await?;

        let elapsed = (Utc::now() - last_scan.scan_time).to_std().unwrap_or_default();
        plan.interval.checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    async fn write_status(
        &self,
        repository: &ImageRepository,
        current: &ImageRepositoryStatus,
        status: ImageRepositoryStatus,
    ) -> Result<()> {
        if *current == status {
            debug!("Status unchanged, skipping write");
            return Ok(());
        }
        self.store
            .update_repository_status(repository, &status)
            .await
    }
}

fn configuration_reason(err: &Error) -> &'static str {
    match err {
        Error::InvalidImage { .. } => reasons::INVALID_IMAGE,
        Error::InvalidInterval(_) => reasons::INVALID_INTERVAL,
        Error::InvalidPattern { .. } => reasons::INVALID_PATTERN,
        _ => reasons::SCAN_FAILED,
    }
}
