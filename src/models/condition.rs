use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type reported by both reconcilers
pub const READY: &str = "Ready";

/// Condition reasons
pub mod reasons {
    pub const SUCCEEDED: &str = "Succeeded";
    pub const SCAN_FAILED: &str = "ScanFailed";
    pub const SUSPENDED: &str = "Suspended";
    pub const INVALID_IMAGE: &str = "InvalidImage";
    pub const INVALID_INTERVAL: &str = "InvalidInterval";
    pub const INVALID_POLICY: &str = "InvalidPolicy";
    pub const INVALID_PATTERN: &str = "InvalidPattern";
    pub const REPOSITORY_NOT_FOUND: &str = "RepositoryNotFound";
    pub const REPOSITORY_NOT_SCANNED: &str = "RepositoryNotScanned";
    pub const NO_MATCHING_TAG: &str = "NoMatchingTag";
}

/// Status condition, shaped like the Kubernetes metav1.Condition
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of the condition
    #[serde(rename = "type")]
    pub condition_type: String,

    /// Status of the condition (True, False, Unknown)
    pub status: String,

    /// Machine-readable reason for the last transition
    pub reason: String,

    /// Human-readable details
    pub message: String,

    /// Last time the status flipped
    pub last_transition_time: DateTime<Utc>,

    /// Generation the condition was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    pub fn ready(reason: &str, message: impl Into<String>) -> Self {
        Self::new(READY, true, reason, message)
    }

    pub fn not_ready(reason: &str, message: impl Into<String>) -> Self {
        Self::new(READY, false, reason, message)
    }

    fn new(condition_type: &str, status: bool, reason: &str, message: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.to_string(),
            status: if status { "True" } else { "False" }.to_string(),
            reason: reason.to_string(),
            message: message.into(),
            last_transition_time: Utc::now(),
            observed_generation: None,
        }
    }

    pub fn with_generation(mut self, generation: Option<i64>) -> Self {
        self.observed_generation = generation;
        self
    }

    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

/// Insert or replace a condition by type.
///
/// The transition time of an existing condition is kept when its status is
/// unchanged, so that re-applying the same outcome is a no-op.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions
        .iter_mut()
        .find(|c| c.condition_type == condition.condition_type)
    {
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
            *existing = condition;
        },
        None => conditions.push(condition),
    }
}

pub fn find_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions
        .iter()
        .find(|c| c.condition_type == condition_type)
}
