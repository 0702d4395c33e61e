use std::cmp::Ordering;

use keyword_types::KeywordRecord;

/// Ordering in which records compete to represent a cluster.
///
/// Higher score first, then the shorter raw key (in characters), then the
/// lexicographically smaller raw key.
pub fn precedence(a: &KeywordRecord, b: &KeywordRecord) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.key.chars().count().cmp(&b.key.chars().count()))
        .then_with(|| a.key.cmp(&b.key))
}

/// Pick the representative among `members`; `None` only when empty.
pub fn reconcile<'a, I>(members: I) -> Option<&'a KeywordRecord>
where
    I: IntoIterator<Item = &'a KeywordRecord>,
{
    members.into_iter().min_by(|a, b| precedence(a, b))
}
