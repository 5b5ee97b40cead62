//! Age based reclamation of cluster resources.
//!
//! A [`Reclaimer`] lists every resource of one kind in one namespace, keeps
//! those whose name contains the query, and deletes the ones whose creation
//! date lies more than `interval_days` calendar days before today (UTC).
//! Resources without a usable creation timestamp are never touched.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{DeleteError, Error, Result};

/// Identifies a resource by kind, namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(kind: impl Into<String>, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.kind, self.name)
    }
}

/// One listed resource. `handle` is whatever the store needs to delete it again.
#[derive(Debug, Clone)]
pub struct ResourceRecord<H> {
    pub reference: ResourceRef,
    pub creation_timestamp: Option<String>,
    pub handle: H,
}

/// Composite identifiers (`namespace:kind:name`) of deleted resources, in deletion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReclaimResult(Vec<String>);

impl ReclaimResult {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }

    /// Appends the deletions of a later pass.
    pub fn append(&mut self, other: ReclaimResult) {
        self.0.extend(other.0);
    }

    fn push(&mut self, reference: &ResourceRef) {
        self.0.push(reference.to_string());
    }
}

/// List/delete capability backed by a cluster API.
///
/// `kind` is passed through untouched; implementations fill
/// [`ResourceRef::kind`] with that same string. `list` returns the complete
/// set, paging internally if the backend paginates.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    type Handle: Send + Sync;

    async fn list(&self, kind: &str, namespace: &str) -> Result<Vec<ResourceRecord<Self::Handle>>>;

    async fn delete(&self, record: &ResourceRecord<Self::Handle>) -> std::result::Result<(), DeleteError>;
}

/// Observability hook for per-resource outcomes.
pub trait Reporter: Send + Sync {
    fn deleted(&self, resource: &ResourceRef);

    fn delete_failed(&self, resource: &ResourceRef, error: &DeleteError);

    fn skipped(&self, _resource: &ResourceRef, _reason: &str) {}
}

/// Default reporter, writes `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn deleted(&self, resource: &ResourceRef) {
        info!(resource = %resource, "removed resource");
    }

    fn delete_failed(&self, resource: &ResourceRef, error: &DeleteError) {
        warn!(resource = %resource, %error, "failed to remove resource");
    }

    fn skipped(&self, resource: &ResourceRef, reason: &str) {
        debug!(resource = %resource, reason, "skipping resource");
    }
}

/// Calendar-day age of `created` as seen on `today`, both in UTC.
///
/// Returns `None` when `created` is not an RFC 3339 instant
/// (e.g. `2016-08-16T15:23:01Z`). The time of day is dropped before
/// subtracting, so 23:59 yesterday is one day old at 00:01 today.
pub fn age_in_days(created: &str, today: NaiveDate) -> Option<i64> {
    let instant = DateTime::parse_from_rfc3339(created).ok()?.with_timezone(&Utc);
    Some((today - instant.date_naive()).num_days())
}

pub struct Reclaimer<S, R = TracingReporter> {
    store: S,
    reporter: R,
}

impl<S: ResourceStore> Reclaimer<S> {
    pub fn new(store: S) -> Self {
        Self::with_reporter(store, TracingReporter)
    }
}

impl<S: ResourceStore, R: Reporter> Reclaimer<S, R> {
    pub fn with_reporter(store: S, reporter: R) -> Self {
        Self { store, reporter }
    }

    /// Deletes resources of `kind` in `namespace` whose name contains `query`
    /// and whose age exceeds `interval_days`.
    ///
    /// Only a failure to list surfaces as an error. Per-resource delete
    /// failures are reported and left out of the result.
    pub async fn reclaim(&self, kind: &str, namespace: &str, interval_days: u64, query: &str) -> Result<ReclaimResult> {
        self.reclaim_on(Utc::now().date_naive(), kind, namespace, interval_days, query)
            .await
    }

    /// Same as [`Reclaimer::reclaim`], with "today" fixed by the caller.
    pub async fn reclaim_on(
        &self,
        today: NaiveDate,
        kind: &str,
        namespace: &str,
        interval_days: u64,
        query: &str,
    ) -> Result<ReclaimResult> {
        if kind.is_empty() {
            return Err(Error::InvalidArgument("kind must not be empty".to_string()));
        }
        if namespace.is_empty() {
            return Err(Error::InvalidArgument("namespace must not be empty".to_string()));
        }

        let threshold = i64::try_from(interval_days).unwrap_or(i64::MAX);
        let records = self.store.list(kind, namespace).await?;
        debug!(kind, namespace, listed = records.len(), "listed resources");

        let mut result = ReclaimResult::default();
        for record in records.iter().filter(|r| r.reference.name.contains(query)) {
            let Some(created) = record.creation_timestamp.as_deref() else {
                self.reporter.skipped(&record.reference, "no creation timestamp");
                continue;
            };
            let Some(days) = age_in_days(created, today) else {
                self.reporter.skipped(&record.reference, "unparseable creation timestamp");
                continue;
            };
            if days <= threshold {
                continue;
            }

            match self.store.delete(record).await {
                Ok(()) => {
                    self.reporter.deleted(&record.reference);
                    result.push(&record.reference);
                }
                Err(e) => self.reporter.delete_failed(&record.reference, &e),
            }
        }

        Ok(result)
    }
}
