use crate::error::{Error, Result};
use crate::models::TagFilterSpec;
use regex::{Captures, Regex};
use tracing::debug;

/// A tag that survived filtering, paired with the value the policy evaluates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Tag as published in the registry
    pub tag: String,
    /// Raw tag, or the extraction template expanded with its capture groups
    pub value: String,
}

impl Candidate {
    pub fn unfiltered(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            value: tag.to_string(),
        }
    }
}

/// Compiled form of a [`TagFilterSpec`]
#[derive(Debug, Clone)]
pub struct TagFilter {
    pattern: Regex,
    extract: String,
}

impl TagFilter {
    pub fn new(spec: &TagFilterSpec) -> Result<Self> {
        let pattern = Regex::new(&spec.pattern).map_err(|source| Error::InvalidPattern {
            pattern: spec.pattern.clone(),
            source,
        })?;

        Ok(Self {
            pattern,
            extract: spec.extract.clone(),
        })
    }

    /// Compile an optional spec; `None` means every tag passes unchanged.
    pub fn from_spec(spec: Option<&TagFilterSpec>) -> Result<Option<Self>> {
        spec.map(Self::new).transpose()
    }

    /// Apply the pattern to a single tag
    pub fn candidate(&self, tag: &str) -> Option<Candidate> {
        let captures = self.pattern.captures(tag)?;
        let value = if self.extract.is_empty() {
            tag.to_string()
        } else {
            expand_template(&self.extract, &captures)
        };

        Some(Candidate {
            tag: tag.to_string(),
            value,
        })
    }

    pub fn apply<'a, I>(&self, tags: I) -> Vec<Candidate>
    where
        I: IntoIterator<Item = &'a String>,
    {
        tags.into_iter()
            .filter_map(|tag| {
                let candidate = self.candidate(tag);
                if candidate.is_none() {
                    debug!("Tag {} does not match pattern {}", tag, self.pattern);
                }
                candidate
            })
            .collect()
    }
}

/// Filter tags with an optional spec.
///
/// Fails only when the pattern does not compile; an empty result is not an error.
pub fn filter_tags<'a, I>(tags: I, spec: Option<&TagFilterSpec>) -> Result<Vec<Candidate>>
where
    I: IntoIterator<Item = &'a String>,
{
    match TagFilter::from_spec(spec)? {
        Some(filter) => Ok(filter.apply(tags)),
        None => Ok(tags.into_iter().map(|t| Candidate::unfiltered(t)).collect()),
    }
}

/// Expand numbered capture references in `template`.
///
/// Supports `$N`, `${N}` and `$$`. Groups that did not participate expand to
/// nothing; anything else after `$` is copied literally.
pub fn expand_template(template: &str, captures: &Captures<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 1..];

        if let Some(after) = rest.strip_prefix('$') {
            out.push('$');
            rest = after;
            continue;
        }

        let (digits, after) = match rest.strip_prefix('{') {
            Some(braced) => match braced.find('}') {
                Some(end) if is_group_number(&braced[..end]) => (&braced[..end], &braced[end + 1..]),
                _ => {
                    out.push('$');
                    continue;
                },
            },
            None => {
                let end = rest
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(rest.len());
                (&rest[..end], &rest[end..])
            },
        };

        if digits.is_empty() {
            out.push('$');
            continue;
        }

        if let Some(group) = digits
            .parse::<usize>()
            .ok()
            .and_then(|index| captures.get(index))
        {
            out.push_str(group.as_str());
        }
        rest = after;
    }

    out.push_str(rest);
    out
}

fn is_group_number(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(pattern: &str, extract: &str) -> TagFilterSpec {
        TagFilterSpec {
            pattern: pattern.to_string(),
            extract: extract.to_string(),
        }
    }

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_spec_passes_everything() {
        let input = tags(&["1.0.0", "latest"]);
        let candidates = filter_tags(&input, None).unwrap();

        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.tag == c.value));
    }

    #[test]
    fn test_pattern_with_extract() {
        let input = tags(&[
            "test-0.1.0",
            "test-0.1.1",
            "dev-0.2.0",
            "1.0.0",
            "1.1.0-alpha",
        ]);
        let filter_spec = spec("^test-(.*)$", "$1");
        let mut candidates = filter_tags(&input, Some(&filter_spec)).unwrap();
        candidates.sort_by(|a, b| a.tag.cmp(&b.tag));

        assert_eq!(
            candidates,
            vec![
                Candidate {
                    tag: "test-0.1.0".to_string(),
                    value: "0.1.0".to_string()
                },
                Candidate {
                    tag: "test-0.1.1".to_string(),
                    value: "0.1.1".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_pattern_without_extract_keeps_tag() {
        let input = tags(&["main-abc123-1", "pr-12-def456-2"]);
        let filter_spec = spec("^main-", "");
        let candidates = filter_tags(&input, Some(&filter_spec)).unwrap();

        assert_eq!(candidates, vec![Candidate::unfiltered("main-abc123-1")]);
    }

    #[test]
    fn test_invalid_pattern() {
        let input = tags(&["test-0.1.0"]);
        let filter_spec = spec("^test-(.*", "$1");
        let err = filter_tags(&input, Some(&filter_spec)).unwrap_err();

        assert!(matches!(err, Error::InvalidPattern { .. }));
        assert!(err.to_string().contains("invalid regular expression pattern"));
    }

    #[test]
    fn test_expand_template_forms() {
        let re = Regex::new(r"^(\w+)-(\d+)-(\w+)?").unwrap();
        let caps = re.captures("main-42-").unwrap();

        assert_eq!(expand_template("$2", &caps), "42");
        assert_eq!(expand_template("${1}.${2}", &caps), "main.42");
        assert_eq!(expand_template("$1$2", &caps), "main42");
        assert_eq!(expand_template("$$1", &caps), "$1");
        assert_eq!(expand_template("$3", &caps), "");
        assert_eq!(expand_template("$9", &caps), "");
        assert_eq!(expand_template("cost: $", &caps), "cost: $");
        assert_eq!(expand_template("${name}", &caps), "${name}");
    }
}
