//! In-process query evaluation shared by the memory and file backends.

use crate::model::record::Record;
use crate::query::spec::QuerySpec;

/// Filters, stably sorts and slices `records` according to `spec`.
///
/// Input order is kept for ties, so an unordered query returns records in
/// the order the table yields them.
pub fn execute(spec: &QuerySpec, records: impl IntoIterator<Item = Record>) -> Vec<Record> {
    if spec.empty {
        return Vec::new();
    }

    let mut matched = records
        .into_iter()
        .filter(|record| spec.predicates.iter().all(|predicate| predicate.matches(record)))
        .collect::<Vec<_>>();

    if !spec.ordering.is_empty() {
        matched.sort_by(|left, right| spec.compare(left, right));
    }

    spec.slice.apply(matched)
}

/// Counts the records `execute` would return.
pub fn count<'a>(spec: &QuerySpec, records: impl IntoIterator<Item = &'a Record>) -> usize {
    if spec.empty {
        return 0;
    }

    let matched = records
        .into_iter()
        .filter(|record| spec.predicates.iter().all(|predicate| predicate.matches(record)))
        .count();
    let remaining = matched.saturating_sub(spec.slice.start);
    spec.slice
        .limit()
        .map_or(remaining, |limit| remaining.min(limit))
}
