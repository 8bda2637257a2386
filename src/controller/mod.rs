mod policy;
mod repository;

pub use policy::PolicyReconciler;
pub use repository::{FINALIZER, RepositoryReconciler};

use crate::cache::ScanCache;
use crate::config::ReflectorConfig;
use crate::error::{Error, Result};
use crate::metrics::{RECONCILE_DURATION, RECONCILE_ERRORS};
use crate::models::{ImagePolicy, ImageRepository};
use crate::registry::{CredentialResolver, OciTagLister, TagLister};
use crate::store::{KubeStore, ObjectStore};
use futures::StreamExt;
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::finalizer::{self, Event, finalizer};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Shared state of both controllers
pub struct Context {
    client: Client,
    repositories: RepositoryReconciler,
    policies: PolicyReconciler,
    config: ReflectorConfig,
}

impl Context {
    pub fn new(client: Client, cache: ScanCache, config: ReflectorConfig) -> Self {
        let store: Arc<dyn ObjectStore> = Arc::new(KubeStore::new(client.clone()));
        let lister: Arc<dyn TagLister> =
            Arc::new(OciTagLister::new(CredentialResolver::new(client.clone())));

        Self {
            repositories: RepositoryReconciler::new(
                store.clone(),
                lister,
                cache.clone(),
                config.clone(),
            ),
            policies: PolicyReconciler::new(store, cache, config.clone()),
            client,
            config,
        }
    }
}

pub async fn start_controllers(
    config: ReflectorConfig,
    cache: ScanCache,
) -> anyhow::Result<JoinHandle<()>> {
    info!("Starting Kubernetes controllers");

    let client = Client::try_default().await?;
    let ctx = Arc::new(Context::new(client, cache, config));

    let handle = tokio::spawn(async move {
        run(ctx).await;
        info!("Controllers stopped");
    });

    Ok(handle)
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = kube::core::NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Run the ImageRepository and ImagePolicy controllers until shutdown
pub async fn run(ctx: Arc<Context>) {
    let namespace = ctx.config.watch_namespace.clone();
    let repositories: Api<ImageRepository> = scoped_api(&ctx.client, namespace.as_deref());
    let policies: Api<ImagePolicy> = scoped_api(&ctx.client, namespace.as_deref());
    let controller_config = controller::Config::default().concurrency(ctx.config.concurrency);

    let repository_controller = Controller::new(repositories.clone(), watcher::Config::default())
        .with_config(controller_config.clone())
        .shutdown_on_signal()
        .run(reconcile_repository, error_policy, ctx.clone())
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, _action)) => debug!(
                    "Reconciled ImageRepository {}/{}",
                    obj_ref.namespace.as_deref().unwrap_or_default(),
                    obj_ref.name
                ),
                Err(e) => warn!("ImageRepository reconciliation error: {}", e),
            }
        });

    let policy_controller = Controller::new(policies, watcher::Config::default());
    let policy_store = policy_controller.store();
    let policy_controller = policy_controller
        // A repository change re-enqueues the policies that reference it
        .watches(repositories, watcher::Config::default(), move |repository| {
            let namespace = repository.namespace();
            let name = repository.name_any();
            policy_store
                .state()
                .into_iter()
                .filter(|policy| {
                    policy.namespace() == namespace && policy.spec.image_repository_ref.name == name
                })
                .map(|policy| ObjectRef::from_obj(&*policy))
                .collect::<Vec<_>>()
        })
        .with_config(controller_config)
        .shutdown_on_signal()
        .run(reconcile_policy, error_policy, ctx.clone())
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, _action)) => debug!(
                    "Reconciled ImagePolicy {}/{}",
                    obj_ref.namespace.as_deref().unwrap_or_default(),
                    obj_ref.name
                ),
                Err(e) => warn!("ImagePolicy reconciliation error: {}", e),
            }
        });

    info!(
        "Controllers running (concurrency {}, namespace {})",
        ctx.config.concurrency,
        namespace.as_deref().unwrap_or("<all>")
    );
    tokio::join!(repository_controller, policy_controller);
}

#[instrument(skip(repository, ctx), fields(repository = %repository.name_any()))]
async fn reconcile_repository(repository: Arc<ImageRepository>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = RECONCILE_DURATION
        .with_label_values(&["ImageRepository"])
        .start_timer();

    let namespace = repository
        .namespace()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
    let api: Api<ImageRepository> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, FINALIZER, repository, |event| async move {
        match event {
            Event::Apply(repository) => ctx.repositories.reconcile(&repository).await,
            Event::Cleanup(repository) => ctx.repositories.cleanup(&repository).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

#[instrument(skip(policy, ctx), fields(policy = %policy.name_any()))]
async fn reconcile_policy(policy: Arc<ImagePolicy>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = RECONCILE_DURATION
        .with_label_values(&["ImagePolicy"])
        .start_timer();

    ctx.policies.reconcile(&policy).await
}

fn error_policy<K>(obj: Arc<K>, err: &Error, ctx: Arc<Context>) -> Action
where
    K: Resource<DynamicType = ()>,
{
    let kind = K::kind(&());
    RECONCILE_ERRORS.with_label_values(&[kind.as_ref()]).inc();
    warn!(
        "Reconciling {} {}/{} failed: {}",
        kind,
        obj.meta().namespace.as_deref().unwrap_or_default(),
        obj.meta().name.as_deref().unwrap_or_default(),
        err
    );

    Action::requeue(requeue_after(err, &ctx.config))
}

/// Conflicts retry quickly against a fresh read; everything else waits a full interval
pub fn requeue_after(err: &Error, config: &ReflectorConfig) -> std::time::Duration {
    if is_conflict(err) {
        config.retry_interval
    } else {
        config.policy_interval
    }
}

fn is_conflict(err: &Error) -> bool {
    match err {
        Error::Conflict { .. } => true,
        Error::Kube(kube::Error::Api(response)) => response.code == 409,
        Error::Finalizer(inner) => match inner.as_ref() {
            finalizer::Error::ApplyFailed(e) | finalizer::Error::CleanupFailed(e) => is_conflict(e),
            finalizer::Error::AddFinalizer(kube::Error::Api(response))
            | finalizer::Error::RemoveFinalizer(kube::Error::Api(response)) => response.code == 409,
            _ => false,
        },
        _ => false,
    }
}
