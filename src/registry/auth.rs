use anyhow::{Context, Result};
use base64::prelude::*;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use oci_distribution::secrets::RegistryAuth;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// Docker config.json structure
#[derive(Debug, Deserialize)]
struct DockerConfig {
    auths: HashMap<String, DockerAuthEntry>,
}

/// Auth entry in docker config
#[derive(Debug, Deserialize)]
struct DockerAuthEntry {
    #[serde(default)]
    auth: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// Credentials for a specific registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

impl From<RegistryCredentials> for RegistryAuth {
    fn from(creds: RegistryCredentials) -> Self {
        RegistryAuth::Basic(creds.username, creds.password)
    }
}

/// Reads registry credentials from the Secret an ImageRepository references
#[derive(Clone)]
pub struct CredentialResolver {
    client: Client,
}

impl CredentialResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Resolve auth for `registry` from `namespace/secret_name`.
    ///
    /// A missing or unreadable Secret is an error, since the user asked for
    /// it explicitly. A Secret without an entry for the registry falls back
    /// to anonymous access.
    pub async fn resolve(
        &self,
        namespace: &str,
        secret_name: &str,
        registry: &str,
    ) -> Result<RegistryAuth> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = secrets
            .get(secret_name)
            .await
            .with_context(|| format!("Failed to get secret {}/{}", namespace, secret_name))?;

        match credentials_from_secret(&secret, registry)? {
            Some(creds) => {
                debug!("Using credentials from {}/{} for {}", namespace, secret_name, registry);
                Ok(creds.into())
            },
            None => {
                debug!(
                    "Secret {}/{} has no entry for {}, using anonymous access",
                    namespace, secret_name, registry
                );
                Ok(RegistryAuth::Anonymous)
            },
        }
    }
}

/// Extract credentials for `registry` from a dockerconfigjson or legacy dockercfg Secret
pub fn credentials_from_secret(secret: &Secret, registry: &str) -> Result<Option<RegistryCredentials>> {
    let data = match &secret.data {
        Some(d) => d,
        None => return Ok(None),
    };

    if let Some(dockerconfigjson) = data.get(".dockerconfigjson") {
        let config: DockerConfig = serde_json::from_slice(&dockerconfigjson.0)
            .context("Failed to parse .dockerconfigjson")?;
        return find_entry(&config.auths, registry);
    }

    if let Some(dockercfg) = data.get(".dockercfg") {
        let auths: HashMap<String, DockerAuthEntry> =
            serde_json::from_slice(&dockercfg.0).context("Failed to parse .dockercfg")?;
        return find_entry(&auths, registry);
    }

    Ok(None)
}

fn find_entry(
    auths: &HashMap<String, DockerAuthEntry>,
    registry: &str,
) -> Result<Option<RegistryCredentials>> {
    match auths.iter().find(|(key, _)| registry_matches(key, registry)) {
        Some((_, entry)) => parse_auth_entry(entry),
        None => Ok(None),
    }
}

fn parse_auth_entry(entry: &DockerAuthEntry) -> Result<Option<RegistryCredentials>> {
    if !entry.username.is_empty() && !entry.password.is_empty() {
        return Ok(Some(RegistryCredentials {
            username: entry.username.clone(),
            password: entry.password.clone(),
        }));
    }

    // base64 encoded username:password
    if !entry.auth.is_empty() {
        let decoded = BASE64_STANDARD
            .decode(entry.auth.as_bytes())
            .context("Failed to decode auth token")?;
        let auth_str = String::from_utf8(decoded).context("Auth token is not valid UTF-8")?;

        if let Some((username, password)) = auth_str.split_once(':') {
            return Ok(Some(RegistryCredentials {
                username: username.to_string(),
                password: password.to_string(),
            }));
        }
    }

    Ok(None)
}

/// Check if a docker config key names the target registry
fn registry_matches(key: &str, target: &str) -> bool {
    let key_clean = key
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    let key_host = key_clean.split('/').next().unwrap_or(key_clean);

    if key_host == target {
        return true;
    }

    // Docker Hub aliases
    target == "docker.io" && matches!(key_host, "index.docker.io" | "registry-1.docker.io")
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    fn secret_with(key: &str, value: serde_json::Value) -> Secret {
        let mut data = BTreeMap::new();
        data.insert(
            key.to_string(),
            ByteString(serde_json::to_vec(&value).unwrap()),
        );
        Secret {
            data: Some(data),
            ..Default::default()
        }
    }

    #[test]
    fn test_registry_matches() {
        assert!(registry_matches("ghcr.io", "ghcr.io"));
        assert!(registry_matches("https://ghcr.io", "ghcr.io"));
        assert!(registry_matches("https://index.docker.io/v1/", "docker.io"));
        assert!(registry_matches("registry-1.docker.io", "docker.io"));
        assert!(registry_matches("localhost:5000", "localhost:5000"));

        assert!(!registry_matches("gcr.io", "docker.io"));
        assert!(!registry_matches("ghcr.io", "gcr.io"));
    }

    #[test]
    fn test_dockerconfigjson_username_password() {
        let secret = secret_with(
            ".dockerconfigjson",
            serde_json::json!({
                "auths": { "ghcr.io": { "username": "bot", "password": "s3cret" } }
            }),
        );

        let creds = credentials_from_secret(&secret, "ghcr.io").unwrap().unwrap();
        assert_eq!(creds.username, "bot");
        assert_eq!(creds.password, "s3cret");
    }

    #[test]
    fn test_dockerconfigjson_auth_token() {
        let token = BASE64_STANDARD.encode("bot:s3cret");
        let secret = secret_with(
            ".dockerconfigjson",
            serde_json::json!({
                "auths": { "https://index.docker.io/v1/": { "auth": token } }
            }),
        );

        let creds = credentials_from_secret(&secret, "docker.io").unwrap().unwrap();
        assert_eq!(
            creds,
            RegistryCredentials {
                username: "bot".to_string(),
                password: "s3cret".to_string(),
            }
        );
    }

    #[test]
    fn test_legacy_dockercfg() {
        let secret = secret_with(
            ".dockercfg",
            serde_json::json!({ "quay.io": { "username": "u", "password": "p" } }),
        );

        assert!(credentials_from_secret(&secret, "quay.io").unwrap().is_some());
        assert!(credentials_from_secret(&secret, "ghcr.io").unwrap().is_none());
    }

    #[test]
    fn test_secret_without_data() {
        let secret = Secret::default();
        assert!(credentials_from_secret(&secret, "ghcr.io").unwrap().is_none());
    }

    #[test]
    fn test_malformed_dockerconfigjson() {
        let mut data = BTreeMap::new();
        data.insert(".dockerconfigjson".to_string(), ByteString(b"{not json".to_vec()));
        let secret = Secret {
            data: Some(data),
            ..Default::default()
        };

        assert!(credentials_from_secret(&secret, "ghcr.io").is_err());
    }
}
