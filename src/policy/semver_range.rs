use crate::error::{Error, Result};
use crate::filter::Candidate;
use semver::{Version, VersionReq};

/// Picks the highest version satisfying a range
///
/// A range is one or more `||` alternatives. Comparators inside an
/// alternative may be separated by commas or whitespace.
#[derive(Debug, Clone)]
pub struct SemVerRange {
    ranges: Vec<VersionReq>,
}

impl SemVerRange {
    pub fn new(range: &str) -> Result<Self> {
        let invalid = |source| Error::InvalidRange {
            range: range.to_string(),
            source,
        };

        let ranges = range
            .split("||")
            .map(|alternative| parse_alternative(alternative).map_err(invalid))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { ranges })
    }

    fn matches(&self, version: &Version) -> bool {
        self.ranges.iter().any(|range| range.matches(version))
    }

    pub fn latest<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        candidates
            .iter()
            .filter_map(|c| parse_version(&c.value).map(|v| (v, c)))
            .filter(|(version, _)| self.matches(version))
            .max_by(|(va, a), (vb, b)| va.cmp(vb).then_with(|| a.tag.cmp(&b.tag)))
            .map(|(_, candidate)| candidate)
    }
}

fn parse_alternative(alternative: &str) -> std::result::Result<VersionReq, semver::Error> {
    let normalized = join_comparators(alternative);
    VersionReq::parse(&normalized).or_else(|source| {
        let relaxed = drop_operator_wildcards(&normalized);
        if relaxed == normalized {
            return Err(source);
        }
        VersionReq::parse(&relaxed).map_err(|_| source)
    })
}

// `>=1.0.0 <2.0.0` and `>= 1.0.0, < 2.0.0` both become `>=1.0.0, <2.0.0`
fn join_comparators(alternative: &str) -> String {
    let mut comparators: Vec<String> = Vec::new();
    let mut pending = String::new();

    for token in alternative
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^')) {
            pending.push_str(token);
            continue;
        }
        comparators.push(format!("{}{}", pending, token));
        pending.clear();
    }
    if !pending.is_empty() {
        comparators.push(pending);
    }

    comparators.join(", ")
}

/// Parse a tag as a semantic version, leniently.
///
/// A leading `v` is ignored and missing minor or patch components are
/// treated as zero, so `v1.2` reads as `1.2.0`.
pub fn parse_version(value: &str) -> Option<Version> {
    let clean = value.trim().strip_prefix('v').unwrap_or(value.trim());

    if let Ok(version) = Version::parse(clean) {
        return Some(version);
    }

    let split = clean.find(['-', '+']).unwrap_or(clean.len());
    let (core, suffix) = clean.split_at(split);
    let padded = match core.split('.').count() {
        1 => format!("{}.0.0{}", core, suffix),
        2 => format!("{}.0{}", core, suffix),
        _ => return None,
    };

    Version::parse(&padded).ok()
}
