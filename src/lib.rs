// Library exports for integration testing
//
// This file exposes internal modules for integration tests while keeping
// the binary entrypoint in main.rs

pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod models;
pub mod policy;
pub mod registry;
pub mod store;

// Re-export commonly used types for testing
pub use cache::{ScanCache, ScanResult};
pub use error::{Error, Result};
pub use filter::{Candidate, TagFilter, filter_tags};
pub use policy::Policy;

/// Filter `tags` and select the winner in one step.
///
/// Returns the original tag of the winning candidate.
pub fn select_latest_tag(
    tags: &[String],
    filter: Option<&models::TagFilterSpec>,
    choice: &models::ImagePolicyChoice,
) -> Result<Option<String>> {
    let policy = Policy::from_choice(choice)?;
    let candidates = filter_tags(tags, filter)?;
    Ok(policy.latest(&candidates).map(|c| c.tag.clone()))
}
