mod auth;

pub use auth::{CredentialResolver, RegistryCredentials, credentials_from_secret};

use crate::models::ImageLocation;
use anyhow::{Context, Result};
use async_trait::async_trait;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::Client as OciClient;
use std::collections::BTreeSet;
use std::future::Future;
use tracing::debug;

/// Tags requested per page from the registry
const PAGE_SIZE: usize = 1000;

/// Everything needed to list the tags of one image location
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub location: ImageLocation,
    /// Namespace of the ImageRepository, used to resolve `secret_name`
    pub namespace: String,
    pub secret_name: Option<String>,
    pub insecure: bool,
}

/// Lists the tags published at an image location.
///
/// Authentication, pagination and protocol details stay behind this trait.
#[async_trait]
pub trait TagLister: Send + Sync {
    async fn list_tags(&self, request: &ScanRequest) -> Result<Vec<String>>;
}

/// Lists tags through the OCI distribution API
pub struct OciTagLister {
    credentials: Option<CredentialResolver>,
}

impl OciTagLister {
    pub fn new(credentials: CredentialResolver) -> Self {
        Self {
            credentials: Some(credentials),
        }
    }

    /// Lister that only ever uses anonymous access
    pub fn anonymous() -> Self {
        Self { credentials: None }
    }

    fn client_for(request: &ScanRequest) -> OciClient {
        let protocol = if request.insecure {
            ClientProtocol::HttpsExcept(vec![request.location.registry().to_string()])
        } else {
            ClientProtocol::Https
        };

        OciClient::new(ClientConfig {
            protocol,
            ..Default::default()
        })
    }

    async fn auth_for(&self, request: &ScanRequest) -> Result<RegistryAuth> {
        match (&self.credentials, &request.secret_name) {
            (Some(resolver), Some(secret_name)) => {
                resolver
                    .resolve(
                        &request.namespace,
                        secret_name,
                        request.location.registry(),
                    )
                    .await
            },
            (None, Some(secret_name)) => Err(anyhow::anyhow!(
                "secret {} requested but no credential resolver is configured",
                secret_name
            )),
            (_, None) => Ok(RegistryAuth::Anonymous),
        }
    }
}

#[async_trait]
impl TagLister for OciTagLister {
    async fn list_tags(&self, request: &ScanRequest) -> Result<Vec<String>> {
        let auth = self.auth_for(request).await?;
        let client = Self::client_for(request);
        let reference = request.location.reference();

        debug!(
            "Listing tags for {} (insecure: {})",
            request.location, request.insecure
        );

        let client = &client;
        let auth = &auth;
        let reference = &reference;
        let location = &request.location;

        collect_pages(|last| async move {
            let page = client
                .list_tags(reference, auth, Some(PAGE_SIZE), last.as_deref())
                .await
                .with_context(|| format!("Failed to list tags for {}", location))?;
            debug!("Received page of {} tags for {}", page.tags.len(), location);
            Ok::<_, anyhow::Error>(page.tags)
        })
        .await
    }
}

/// Follow `last` pagination until the registry stops returning new tags.
///
/// Pages shorter than requested don't end the listing: registries cap the
/// page size on their side. A registry that ignores `last` keeps returning
/// the same tags, which ends the loop on the next round.
async fn collect_pages<F, Fut>(mut fetch: F) -> Result<Vec<String>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Vec<String>>>,
{
    let mut tags = BTreeSet::new();
    let mut last: Option<String> = None;

    loop {
        let page = fetch(last.clone()).await?;
        let page_last = page.last().cloned();
        let before = tags.len();
        tags.extend(page);

        if page_last.is_none() || tags.len() == before || page_last == last {
            break;
        }
        last = page_last;
    }

    Ok(tags.into_iter().collect())
}
