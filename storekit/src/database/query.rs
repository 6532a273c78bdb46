use std::fmt;
use std::marker::PhantomData;

use uuid::Uuid;

use super::factory::BackendKind;
use crate::types::{Filter, StoreKey};

/// Describes which records to read: an inclusive key range, a field
/// projection, field filters and a row limit.
///
/// Obtained from [`StoreHandle::new_query`](super::handle::StoreHandle::new_query)
/// and only executable by that same handle. Builder methods consume the
/// query; execution borrows it, so an executed query cannot change.
pub struct Query<K, T> {
    handle_id: Uuid,
    backend: BackendKind,
    start_key: Option<K>,
    end_key: Option<K>,
    fields: Option<Vec<String>>,
    filters: Vec<Filter>,
    limit: Option<usize>,
    _record: PhantomData<fn() -> T>,
}

impl<K: StoreKey, T> Query<K, T> {
    pub(crate) fn new(handle_id: Uuid, backend: BackendKind) -> Self {
        Self {
            handle_id,
            backend,
            start_key: None,
            end_key: None,
            fields: None,
            filters: Vec::new(),
            limit: None,
            _record: PhantomData,
        }
    }

    pub fn with_start_key(mut self, key: K) -> Self {
        self.start_key = Some(key);
        self
    }

    pub fn with_end_key(mut self, key: K) -> Self {
        self.end_key = Some(key);
        self
    }

    pub fn with_key_range(self, start: K, end: K) -> Self {
        self.with_start_key(start).with_end_key(end)
    }

    pub fn with_key(self, key: K) -> Self {
        self.with_key_range(key.clone(), key)
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn handle_id(&self) -> Uuid {
        self.handle_id
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn start_key(&self) -> Option<&K> {
        self.start_key.as_ref()
    }

    pub fn end_key(&self) -> Option<&K> {
        self.end_key.as_ref()
    }

    pub fn fields(&self) -> Option<&[String]> {
        self.fields.as_deref()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Whether the key range is empty by construction.
    pub(crate) fn is_inverted(&self) -> bool {
        matches!((&self.start_key, &self.end_key), (Some(start), Some(end)) if start > end)
    }
}

impl<K: Clone, T> Clone for Query<K, T> {
    fn clone(&self) -> Self {
        Self {
            handle_id: self.handle_id,
            backend: self.backend,
            start_key: self.start_key.clone(),
            end_key: self.end_key.clone(),
            fields: self.fields.clone(),
            filters: self.filters.clone(),
            limit: self.limit,
            _record: PhantomData,
        }
    }
}

impl<K: fmt::Debug, T> fmt::Debug for Query<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("handle_id", &self.handle_id)
            .field("backend", &self.backend)
            .field("start_key", &self.start_key)
            .field("end_key", &self.end_key)
            .field("fields", &self.fields)
            .field("filters", &self.filters)
            .field("limit", &self.limit)
            .finish()
    }
}
