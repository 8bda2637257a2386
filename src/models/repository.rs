use super::condition::Condition;
use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ImageRepository declares an image location to scan for tags on a fixed interval
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "reflector.headwind.sh",
    version = "v1alpha1",
    kind = "ImageRepository",
    plural = "imagerepositories",
    shortname = "imgrepo",
    namespaced,
    status = "ImageRepositoryStatus",
    printcolumn = r#"{"name":"Image", "type":"string", "jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Tags", "type":"integer", "jsonPath":".status.lastScanResult.tagCount"}"#,
    printcolumn = r#"{"name":"Last Scan", "type":"date", "jsonPath":".status.lastScanResult.scanTime"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ImageRepositorySpec {
    /// Image location to scan, without tag or digest (e.g. ghcr.io/org/app)
    pub image: String,

    /// How often to scan the registry (e.g. 1m, 1h30m)
    pub interval: String,

    /// Upper bound for a single scan, defaults to the controller scan timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Secret of type kubernetes.io/dockerconfigjson holding registry credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<LocalObjectReference>,

    /// Talk to the registry over plain HTTP
    #[serde(default)]
    pub insecure: bool,

    /// Stop scanning while set
    #[serde(default)]
    pub suspend: bool,

    /// Regular expressions; matching tags are never cached
    #[serde(default = "default_exclusion_list")]
    pub exclusion_list: Vec<String>,
}

pub fn default_exclusion_list() -> Vec<String> {
    vec![r"^.*\.sig$".to_string()]
}

/// Reference to an object in the same namespace
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct LocalObjectReference {
    pub name: String,
}

/// Summary of the last successful scan
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanResultSummary {
    /// Number of tags found (after exclusions)
    pub tag_count: usize,

    /// When the scan finished
    pub scan_time: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageRepositoryStatus {
    /// Canonical form of spec.image, used as the scan cache key
    #[serde(default)]
    pub canonical_image_name: Option<String>,

    /// Result of the last successful scan
    #[serde(default)]
    pub last_scan_result: Option<ScanResultSummary>,

    /// Generation of the spec the status was computed from
    #[serde(default)]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}
