// In-memory buyer cache with substring search over a remote table

use crate::error::{CacheError, RemoteError, Result};
use crate::filter::Filter;
use crate::record::BuyerRecord;
use crate::remote::RemoteTable;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::cmp::Reverse;
use tracing::{debug, error, info, warn};

/// Table the hosted deployment stores buyers in
pub const DEFAULT_TABLE: &str = "poshbuyer";

/// Borrowed state handed to subscribers after every change
#[derive(Debug, Clone, Copy)]
pub struct CacheView<'a> {
    /// Filtered records in display order
    pub records: &'a [BuyerRecord],
    pub search_term: &'a str,
    pub loading: bool,
    /// Number of records before filtering
    pub total: usize,
}

/// Owned copy of the cache contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSnapshot {
    pub all: Vec<BuyerRecord>,
    pub filtered: Vec<BuyerRecord>,
    pub search_term: String,
}

pub type Subscriber = Box<dyn FnMut(&CacheView<'_>) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Cache of every buyer row plus the view filtered by the current search term
///
/// The full list is kept sorted by last purchase (newest first, then username)
/// and every cached record carries a fresh search index. Local state changes
/// only after the remote write it mirrors has succeeded. Mutations take
/// `&mut self`, so at most one remote write is in flight per cache.
pub struct BuyerCache<R: RemoteTable> {
    remote: R,
    table: String,
    all: Vec<BuyerRecord>,
    filtered: Vec<BuyerRecord>,
    search_term: String,
    loading: bool,
    last_load_error: Option<String>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl<R: RemoteTable> BuyerCache<R> {
    /// Create a cache over the default table and run the initial load
    pub fn new(remote: R) -> Self {
        Self::with_table(remote, DEFAULT_TABLE)
    }

    pub fn with_table(remote: R, table: impl Into<String>) -> Self {
        let mut cache = Self {
            remote,
            table: table.into(),
            all: Vec::new(),
            filtered: Vec::new(),
            search_term: String::new(),
            loading: true,
            last_load_error: None,
            subscribers: Vec::new(),
            next_subscription: 0,
        };
        cache.load();
        cache
    }

    /// Replace the cache with the full remote table
    ///
    /// Read failures are logged and leave the previous records in place;
    /// `last_load_error` reports them.
    pub fn load(&mut self) {
        self.loading = true;
        self.notify();

        info!(table = %self.table, "Loading buyers");
        match self.remote.select_all(&self.table) {
            Ok(records) => {
                self.all = records;
                self.reindex();
                self.last_load_error = None;
                info!(table = %self.table, count = self.all.len(), "Buyers loaded");
            }
            Err(e) => {
                error!(table = %self.table, error = %e, "Error fetching buyers");
                self.last_load_error = Some(e.to_string());
            }
        }

        self.loading = false;
        self.refilter();
    }

    /// Set the case-insensitive search term; empty shows everything
    pub fn set_search_term(&mut self, term: &str) {
        self.search_term = term.to_lowercase();
        debug!(term = %self.search_term, "Search term set");
        self.refilter();
    }

    /// Insert a new buyer after checking the username is free
    ///
    /// Any `id` on the input is ignored; the remote assigns one.
    pub fn add_user(&mut self, record: &BuyerRecord) -> Result<BuyerRecord> {
        let username = record.username.clone();
        if username.trim().is_empty() {
            return Err(CacheError::InvalidRecord("username must not be empty".to_string()));
        }

        let existing = self
            .remote
            .find_by_field(&self.table, &Filter::username(&username))
            .map_err(CacheError::RemoteRead)?;
        if existing.is_some() {
            warn!(username = %username, "Username already exists");
            return Err(CacheError::DuplicateUsername(username));
        }

        let mut created = self
            .remote
            .insert(&self.table, &record.fields())
            .map_err(|e| match e {
                RemoteError::Conflict(_) => CacheError::DuplicateUsername(username.clone()),
                other => {
                    error!(username = %username, error = %other, "Error adding buyer");
                    CacheError::RemoteWrite(other)
                }
            })?;
        created.refresh_search_index();

        info!(id = ?created.id, username = %created.username, "Buyer added");
        self.all.push(created.clone());
        self.reindex();
        self.refilter();

        Ok(created)
    }

    /// Write the record's fields to the row with its id and cache the result
    pub fn update_user(&mut self, record: &BuyerRecord) -> Result<()> {
        let id = record
            .id
            .ok_or_else(|| CacheError::InvalidRecord("cannot update a record without an id".to_string()))?;

        let mut updated = self
            .remote
            .update(&self.table, id, &record.fields())
            .map_err(|e| {
                error!(id, error = %e, "Error updating buyer");
                CacheError::RemoteWrite(e)
            })?;
        updated.refresh_search_index();

        match self.all.iter_mut().find(|r| r.id == Some(id)) {
            Some(slot) => *slot = updated,
            None => warn!(id, "Updated buyer was not cached"),
        }

        info!(id, "Buyer updated");
        sort_records(&mut self.all);
        self.refilter();
        Ok(())
    }

    /// Delete the row with the record's id and drop it from the cache
    pub fn delete_user(&mut self, record: &BuyerRecord) -> Result<()> {
        let id = record
            .id
            .ok_or_else(|| CacheError::InvalidRecord("cannot delete a record without an id".to_string()))?;

        self.remote.delete(&self.table, id).map_err(|e| {
            error!(id, error = %e, "Error deleting buyer");
            CacheError::RemoteWrite(e)
        })?;

        info!(id, "Buyer deleted");
        self.all.retain(|r| r.id != Some(id));
        self.refilter();
        Ok(())
    }

    /// Records matching the current search term
    pub fn users(&self) -> &[BuyerRecord] {
        &self.filtered
    }

    /// Every cached record, sorted
    pub fn all_users(&self) -> &[BuyerRecord] {
        &self.all
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    /// Message from the most recent failed load, cleared by a successful one
    pub fn last_load_error(&self) -> Option<&str> {
        self.last_load_error.as_deref()
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            all: self.all.clone(),
            filtered: self.filtered.clone(),
            search_term: self.search_term.clone(),
        }
    }

    /// Register a callback run after every state change
    pub fn subscribe(&mut self, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, subscriber));
        id
    }

    /// Returns false if the subscription was already removed
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    fn reindex(&mut self) {
        for record in &mut self.all {
            record.refresh_search_index();
        }
        sort_records(&mut self.all);
    }

    fn refilter(&mut self) {
        self.filtered = self
            .all
            .iter()
            .filter(|r| r.matches(&self.search_term))
            .cloned()
            .collect();
        self.notify();
    }

    fn notify(&mut self) {
        let view = CacheView {
            records: &self.filtered,
            search_term: &self.search_term,
            loading: self.loading,
            total: self.all.len(),
        };
        for (_, subscriber) in self.subscribers.iter_mut() {
            subscriber(&view);
        }
    }
}

/// Sort by last purchase, newest first, then by username
///
/// Dates that do not parse sort after all parseable ones.
pub fn sort_records(records: &mut [BuyerRecord]) {
    records.sort_by_cached_key(|r| (Reverse(purchase_timestamp(&r.last_purchase)), r.username.clone()));
}

/// Milliseconds since the epoch for an ISO date or timestamp
///
/// Values without an offset, including naive `YYYY-MM-DDTHH:MM:SS`
/// timestamps, are read as UTC rather than in the host's local time zone.
/// A browser `Date` reads naive timestamps as local time, so two clients in
/// different zones can order same-day purchases differently; this ordering
/// does not depend on the host.
pub fn purchase_timestamp(value: &str) -> Option<i64> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}
