use crate::filter::Candidate;
use crate::models::SortOrder;
use std::cmp::Ordering;

/// Byte-wise lexicographic ordering of the evaluated values
#[derive(Debug, Clone, Copy)]
pub struct Alphabetical {
    order: SortOrder,
}

impl Alphabetical {
    pub fn new(order: SortOrder) -> Self {
        Self { order }
    }

    pub fn latest<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        select(
            self.order,
            candidates.iter().map(|c| (c.value.as_bytes(), c)),
        )
    }
}

/// Integer ordering; values that are not integers are ignored
#[derive(Debug, Clone, Copy)]
pub struct Numerical {
    order: SortOrder,
}

impl Numerical {
    pub fn new(order: SortOrder) -> Self {
        Self { order }
    }

    pub fn latest<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        select(
            self.order,
            candidates
                .iter()
                .filter_map(|c| c.value.trim().parse::<i64>().ok().map(|n| (n, c))),
        )
    }
}

// asc: greatest key wins, desc: smallest key wins; equal keys fall back to the tag
fn select<'a, K, I>(order: SortOrder, keyed: I) -> Option<&'a Candidate>
where
    K: Ord,
    I: Iterator<Item = (K, &'a Candidate)>,
{
    let compare = |(ka, a): &(K, &Candidate), (kb, b): &(K, &Candidate)| -> Ordering {
        ka.cmp(kb).then_with(|| a.tag.cmp(&b.tag))
    };

    let winner = match order {
        SortOrder::Asc => keyed.max_by(compare),
        SortOrder::Desc => keyed.min_by(compare),
    };

    winner.map(|(_, candidate)| candidate)
}
