mod ordered;
mod semver_range;

pub use ordered::{Alphabetical, Numerical};
pub use semver_range::{SemVerRange, parse_version};

use crate::error::{Error, Result};
use crate::filter::Candidate;
use crate::models::ImagePolicyChoice;
use tracing::debug;

/// A validated selection policy.
///
/// Built from the user-facing [`ImagePolicyChoice`], which allows any
/// combination of fields; exactly one must be set.
#[derive(Debug, Clone)]
pub enum Policy {
    SemVer(SemVerRange),
    Alphabetical(Alphabetical),
    Numerical(Numerical),
}

impl Policy {
    pub fn from_choice(choice: &ImagePolicyChoice) -> Result<Self> {
        match (&choice.semver, &choice.alphabetical, &choice.numerical) {
            (Some(semver), None, None) => Ok(Policy::SemVer(SemVerRange::new(&semver.range)?)),
            (None, Some(alphabetical), None) => {
                Ok(Policy::Alphabetical(Alphabetical::new(alphabetical.order)))
            },
            (None, None, Some(numerical)) => Ok(Policy::Numerical(Numerical::new(numerical.order))),
            (None, None, None) => Err(Error::InvalidPolicy(
                "no policy kind set, expected one of semver, alphabetical, numerical".to_string(),
            )),
            _ => Err(Error::InvalidPolicy(
                "more than one policy kind set, expected exactly one".to_string(),
            )),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Policy::SemVer(_) => "semver",
            Policy::Alphabetical(_) => "alphabetical",
            Policy::Numerical(_) => "numerical",
        }
    }

    /// Pick the winning candidate.
    ///
    /// Values the policy cannot interpret are skipped. `None` means no
    /// candidate was eligible.
    pub fn latest<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        let winner = match self {
            Policy::SemVer(range) => range.latest(candidates),
            Policy::Alphabetical(alphabetical) => alphabetical.latest(candidates),
            Policy::Numerical(numerical) => numerical.latest(candidates),
        };

        debug!(
            "Policy {} selected {:?} from {} candidates",
            self.kind(),
            winner.map(|c| c.tag.as_str()),
            candidates.len()
        );

        winner
    }
}
