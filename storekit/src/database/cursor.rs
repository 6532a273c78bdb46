use tracing::debug;

use super::backend::{RowSource, ScanSpec};
use super::handle::StoreHandle;
use super::query::Query;
use crate::errors::StoreError;
use crate::types::{Filter, Persistent, RawRow, Row, StoreKey};

/// Stateful iterator over the rows matched by one query on one handle.
///
/// Driven by a single task at a time (`&mut self`). Once exhausted it stays
/// exhausted: `has_next` keeps returning `false` and `next` keeps failing
/// with [`StoreError::ExhaustionError`]. Backend errors are returned as-is.
pub struct ResultCursor<'h, K: StoreKey, T: Persistent> {
    handle: &'h StoreHandle<K, T>,
    source: Option<Box<dyn RowSource<K>>>,
    filters: Vec<Filter>,
    projection: Option<Vec<String>>,
    limit: Option<usize>,
    peeked: Option<RawRow<K>>,
    returned: usize,
    exhausted: bool,
    closed: bool,
}

impl<'h, K: StoreKey, T: Persistent> ResultCursor<'h, K, T> {
    /// Open a cursor for `query` on `handle`.
    pub async fn open(handle: &'h StoreHandle<K, T>, query: &Query<K, T>) -> Result<Self, StoreError> {
        handle.ensure_open()?;
        if query.handle_id() != handle.id() {
            return Err(StoreError::InvalidArgument(format!(
                "query was created by store handle {}, not {}",
                query.handle_id(),
                handle.id()
            )));
        }
        if let Some(fields) = query.fields() {
            handle.validate_fields(fields)?;
        }
        if query.is_inverted() {
            return Err(StoreError::InvalidArgument(format!(
                "start key {:?} is after end key {:?}",
                query.start_key(),
                query.end_key()
            )));
        }

        let filters = query.filters().to_vec();
        let projection = query.fields().map(|fields| fields.to_vec());
        let fetched = projection.as_ref().map(|fields| fetched_fields(handle, fields, &filters));
        let spec = ScanSpec {
            start_key: query.start_key(),
            end_key: query.end_key(),
            fields: fetched.as_deref(),
            limit: if filters.is_empty() { query.limit() } else { None },
        };
        let source = handle.backend().scan(spec).await?;
        debug!("Opened {} cursor on {}", handle.backend_kind(), handle.mapping().table);

        Ok(Self {
            handle,
            source: Some(source),
            filters,
            projection,
            limit: query.limit(),
            peeked: None,
            returned: 0,
            exhausted: false,
            closed: false,
        })
    }

    /// Whether another row is available. Does not consume it; may fetch
    /// the next page from the backend.
    pub async fn has_next(&mut self) -> Result<bool, StoreError> {
        if self.peeked.is_some() {
            self.handle.ensure_open()?;
            return Ok(true);
        }
        self.fill().await
    }

    /// Advance and return the next row.
    pub async fn next(&mut self) -> Result<Row<K, T>, StoreError> {
        let row = self.next_raw().await?.ok_or_else(|| {
            StoreError::ExhaustionError(format!(
                "no more rows in {} after {} returned",
                self.handle.mapping().table,
                self.returned
            ))
        })?;
        Ok(Row {
            key: row.key,
            value: StoreHandle::<K, T>::decode(row.fields)?,
        })
    }

    /// Drain the remaining rows.
    pub async fn collect_rows(&mut self) -> Result<Vec<Row<K, T>>, StoreError> {
        let mut rows = Vec::new();
        while self.has_next().await? {
            rows.push(self.next().await?);
        }
        Ok(rows)
    }

    /// Number of rows handed out so far.
    pub fn returned(&self) -> usize {
        self.returned
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release backend iteration resources. Idempotent.
    pub async fn close(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.exhausted = true;
        self.peeked = None;
        self.release().await
    }

    pub(crate) async fn next_raw(&mut self) -> Result<Option<RawRow<K>>, StoreError> {
        if self.peeked.is_some() {
            self.handle.ensure_open()?;
        } else if !self.fill().await? {
            return Ok(None);
        }
        let row = self.peeked.take();
        if row.is_some() {
            self.returned += 1;
        }
        Ok(row)
    }

    async fn fill(&mut self) -> Result<bool, StoreError> {
        if self.exhausted {
            return Ok(false);
        }
        if matches!(self.limit, Some(limit) if self.returned >= limit) {
            self.finish().await?;
            return Ok(false);
        }
        self.handle.ensure_open()?;

        loop {
            let next = match self.source.as_mut() {
                Some(source) => source.next_row().await?,
                None => None,
            };
            match next {
                Some(mut row) => {
                    if self.filters.iter().all(|filter| filter.accepts(&row.fields)) {
                        if let Some(projection) = &self.projection {
                            let key_column = &self.handle.mapping().key.name;
                            row.fields
                                .retain(|name, _| name == key_column || projection.iter().any(|field| field == name));
                        }
                        self.peeked = Some(row);
                        return Ok(true);
                    }
                }
                None => {
                    self.finish().await?;
                    return Ok(false);
                }
            }
        }
    }

    async fn finish(&mut self) -> Result<(), StoreError> {
        self.exhausted = true;
        self.release().await
    }

    async fn release(&mut self) -> Result<(), StoreError> {
        match self.source.take() {
            Some(mut source) => source.close().await,
            None => Ok(()),
        }
    }
}

/// Projected fields plus the mapped fields the filters read; filtering
/// happens before rows are trimmed back to the projection.
fn fetched_fields<K: StoreKey, T: Persistent>(
    handle: &StoreHandle<K, T>,
    projection: &[String],
    filters: &[Filter],
) -> Vec<String> {
    let mut fields = projection.to_vec();
    for filter in filters {
        if handle.mapping().has_column(&filter.field) && !fields.contains(&filter.field) {
            fields.push(filter.field.clone());
        }
    }
    fields
}
