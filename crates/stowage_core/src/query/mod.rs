//! Lazy, immutable, memoizing queries over a repository's entities.
//!
//! # Responsibility
//! - Build query descriptions immutably (`filter`, `order_by`, `slice`).
//! - Materialize through a backend `QueryExecutor` at most once per query.
//!
//! # Invariants
//! - Builder methods never touch the backend; they return new queries.
//! - The result cache and the count cache are filled at most once and are
//!   never invalidated, even when the backing store changes afterwards.
//! - Unknown fields are rejected while building, before any backend call.

pub mod scan;
pub mod spec;

use crate::model::schema::{Entity, EntitySchema};
use crate::model::value::FieldValue;
use crate::repo::error::{RepoError, RepoResult};
use log::debug;
use once_cell::unsync::OnceCell;
use std::fmt::{Debug, Display, Formatter};
use std::time::Instant;

pub use spec::{Operator, OrderKey, Predicate, QuerySpec, SliceBounds};

/// Maximum number of cached entities rendered by a query representation.
const REPR_OUTPUT_SIZE: usize = 3;
const REPR_NOT_RUN: &str = "'...Query has not run...'";
const REPR_TRUNCATED: &str = "'...(remaining elements truncated)...'";

/// Backend-specific materialization strategy for queries.
///
/// Executors are cheap handles onto a backend view; queries clone them
/// whenever a new query is derived.
pub trait QueryExecutor<E: Entity>: Clone {
    /// Label used in query representations and log events.
    fn backend_name(&self) -> &'static str;

    /// Returns the entities selected by `spec`, in query order.
    fn fetch(&self, spec: &QuerySpec) -> RepoResult<Vec<E>>;

    /// Returns the number of entities `fetch` would return.
    fn count(&self, spec: &QuerySpec) -> RepoResult<usize>;
}

/// Immutable, lazily evaluated, cacheable selection of entities.
pub struct Query<E: Entity, X: QueryExecutor<E>> {
    executor: X,
    spec: QuerySpec,
    cache: OnceCell<Vec<E>>,
    count: OnceCell<usize>,
}

impl<E: Entity, X: QueryExecutor<E>> Query<E, X> {
    /// Creates an unfiltered query over every entity of `E`'s table.
    pub fn new(executor: X) -> Self {
        Self::with_spec(executor, QuerySpec::new(E::schema()))
    }

    fn with_spec(executor: X, spec: QuerySpec) -> Self {
        Self {
            executor,
            spec,
            cache: OnceCell::new(),
            count: OnceCell::new(),
        }
    }

    fn derive(&self, spec: QuerySpec) -> Self {
        Self::with_spec(self.executor.clone(), spec)
    }

    pub fn schema(&self) -> &'static EntitySchema {
        self.spec.schema
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    /// Returns a fresh copy of this query with empty caches.
    pub fn all(&self) -> Self {
        self.derive(self.spec.clone())
    }

    /// Narrows the query with a `field` or `field__op` lookup.
    ///
    /// # Errors
    /// - `InvalidField` when the lookup names an undeclared field, an
    ///   unknown operator, or carries an ill-typed value.
    pub fn filter(&self, lookup: &str, value: impl Into<FieldValue>) -> RepoResult<Self> {
        let predicate = Predicate::parse(self.spec.schema, lookup, value.into())?;
        Ok(self.with_predicate(predicate))
    }

    /// Narrows the query with an explicit operator.
    pub fn filter_by(
        &self,
        field: &str,
        op: Operator,
        value: impl Into<FieldValue>,
    ) -> RepoResult<Self> {
        let predicate = Predicate::new(self.spec.schema, field, op, value.into())?;
        Ok(self.with_predicate(predicate))
    }

    fn with_predicate(&self, predicate: Predicate) -> Self {
        let mut spec = self.spec.clone();
        spec.predicates.push(predicate);
        self.derive(spec)
    }

    /// Replaces the ordering; `-field` sorts descending, earlier keys win.
    pub fn order_by(&self, fields: &[&str]) -> RepoResult<Self> {
        let ordering = fields
            .iter()
            .map(|name| OrderKey::parse(self.spec.schema, name))
            .collect::<RepoResult<Vec<_>>>()?;
        let mut spec = self.spec.clone();
        spec.ordering = ordering;
        Ok(self.derive(spec))
    }

    /// Restricts the query to `[start, stop)` of its current results.
    ///
    /// Bounds past the end truncate silently. When this query is already
    /// materialized the new query reuses the cached entities.
    pub fn slice(&self, start: usize, stop: Option<usize>) -> Self {
        let mut spec = self.spec.clone();
        spec.slice = spec.slice.narrow(start, stop);
        let sliced = self.derive(spec);

        if let Some(cached) = self.cache.get() {
            let window = SliceBounds::default().narrow(start, stop);
            let _ = sliced.cache.set(window.apply(cached.clone()));
        }
        sliced
    }

    /// Returns an always-empty query that never reaches the backend.
    pub fn none(&self) -> Self {
        let mut spec = self.spec.clone();
        spec.empty = true;
        self.derive(spec)
    }

    /// True when an explicit ordering was applied in this query's lineage.
    pub fn ordered(&self) -> bool {
        !self.spec.ordering.is_empty()
    }

    /// True once the result set has been materialized.
    pub fn is_cached(&self) -> bool {
        self.cache.get().is_some()
    }

    /// Number of matching entities.
    ///
    /// Uses the materialized results when present; otherwise asks the
    /// backend once and remembers the answer.
    pub fn count(&self) -> RepoResult<usize> {
        if let Some(cached) = self.cache.get() {
            return Ok(cached.len());
        }
        self.count
            .get_or_try_init(|| {
                if self.spec.empty {
                    return Ok(0);
                }
                self.executor.count(&self.spec)
            })
            .copied()
    }

    /// Materialized results, running the backend on first use.
    pub fn results(&self) -> RepoResult<&[E]> {
        self.cache
            .get_or_try_init(|| self.materialize())
            .map(Vec::as_slice)
    }

    pub fn iter(&self) -> RepoResult<std::slice::Iter<'_, E>> {
        Ok(self.results()?.iter())
    }

    pub fn as_list(&self) -> RepoResult<Vec<E>> {
        Ok(self.results()?.to_vec())
    }

    /// Returns the single entity matching the lookup.
    ///
    /// # Errors
    /// - `NotFound` when nothing matches.
    /// - `MultipleResultsFound` when more than one entity matches.
    pub fn get(&self, lookup: &str, value: impl Into<FieldValue>) -> RepoResult<E> {
        let narrowed = self.filter(lookup, value)?;
        let results = narrowed.results()?;
        match results {
            [entity] => Ok(entity.clone()),
            [] => Err(RepoError::NotFound(format!(
                "{} matching {}",
                self.spec.schema.table,
                describe_predicates(&narrowed.spec)
            ))),
            many => Err(RepoError::MultipleResultsFound(many.len())),
        }
    }

    /// First entity in query order, or `None` when nothing matches.
    pub fn first(&self) -> RepoResult<Option<E>> {
        if let Some(cached) = self.cache.get() {
            return Ok(cached.first().cloned());
        }
        let head = self.slice(0, Some(1));
        Ok(head.results()?.first().cloned())
    }

    /// Positional access into the materialized results.
    ///
    /// # Errors
    /// - `InvalidIndexType` when `index` is not an integer.
    /// - `IndexOutOfRange` for negative or past-the-end positions.
    pub fn getitem(&self, index: impl Into<FieldValue>) -> RepoResult<E> {
        let index = match index.into() {
            FieldValue::Integer(index) => index,
            other => return Err(RepoError::InvalidIndexType(other.kind().to_string())),
        };
        let results = self.results()?;
        usize::try_from(index)
            .ok()
            .and_then(|position| results.get(position))
            .cloned()
            .ok_or(RepoError::IndexOutOfRange {
                index,
                len: results.len(),
            })
    }

    fn materialize(&self) -> RepoResult<Vec<E>> {
        if self.spec.empty {
            return Ok(Vec::new());
        }

        let started_at = Instant::now();
        let entities = self.executor.fetch(&self.spec)?;
        debug!(
            "event=query_materialize module=query status=ok backend={} table={} predicates={} rows={} duration_ms={}",
            self.executor.backend_name(),
            self.spec.schema.table,
            self.spec.predicates.len(),
            entities.len(),
            started_at.elapsed().as_millis()
        );
        Ok(entities)
    }

    fn render(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<{}Query {} [",
            self.executor.backend_name(),
            self.spec.schema.table
        )?;
        match self.cache.get() {
            None => f.write_str(REPR_NOT_RUN)?,
            Some(entities) => {
                for (position, entity) in entities.iter().take(REPR_OUTPUT_SIZE).enumerate() {
                    if position > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{entity:?}")?;
                }
                if entities.len() > REPR_OUTPUT_SIZE {
                    write!(f, ", {REPR_TRUNCATED}")?;
                }
            }
        }
        f.write_str("]>")
    }
}

fn describe_predicates(spec: &QuerySpec) -> String {
    spec.predicates
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" AND ")
}

impl<E: Entity, X: QueryExecutor<E>> Debug for Query<E, X> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.render(f)
    }
}

impl<E: Entity, X: QueryExecutor<E>> Display for Query<E, X> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.render(f)
    }
}
