use super::condition::Condition;
use super::repository::LocalObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ImagePolicy selects the latest tag of a scanned ImageRepository
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "reflector.headwind.sh",
    version = "v1alpha1",
    kind = "ImagePolicy",
    plural = "imagepolicies",
    shortname = "imgpol",
    namespaced,
    status = "ImagePolicyStatus",
    printcolumn = r#"{"name":"Repository", "type":"string", "jsonPath":".spec.imageRepositoryRef.name"}"#,
    printcolumn = r#"{"name":"Latest", "type":"string", "jsonPath":".status.latestImage"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ImagePolicySpec {
    /// ImageRepository in the same namespace whose tags are evaluated
    pub image_repository_ref: LocalObjectReference,

    /// Optional pattern filter applied before the policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_tags: Option<TagFilterSpec>,

    /// Exactly one policy kind
    pub policy: ImagePolicyChoice,
}

/// Regex filter with optional capture-group extraction
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct TagFilterSpec {
    /// Regular expression tags must match
    pub pattern: String,

    /// Template such as "$1" building the value handed to the policy
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub extract: String,
}

/// Mutually exclusive policy kinds, as written by the user
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct ImagePolicyChoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semver: Option<SemVerPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alphabetical: Option<AlphabeticalPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numerical: Option<NumericalPolicy>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct SemVerPolicy {
    /// Version range such as "1.0.x" or ">=1.2, <2"
    pub range: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct AlphabeticalPolicy {
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct NumericalPolicy {
    #[serde(default)]
    pub order: SortOrder,
}

/// `asc` picks the greatest value, `desc` the smallest
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImagePolicyStatus {
    /// `<canonical image>:<tag>` of the selected tag, cleared when not ready
    #[serde(default)]
    pub latest_image: Option<String>,

    #[serde(default)]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}
