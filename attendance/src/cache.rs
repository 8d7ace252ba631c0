//! Client-side projection cache with optimistic transactions.
//!
//! Entries exist only while a screen showing them is mounted. Every write
//! to an entry takes a fresh version from a cache-wide counter, so a version
//! observed once is never reused, not even after evict and re-hydrate.

use crate::types::{AttendanceRecord, EventDetail, EventId, EventSummary, EventVibe, UpcomingCheckIn, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Names one cached view.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectionKey {
    /// The user's event list
    MyEvents(UserId),
    /// One event with rosters
    EventDetail(EventId),
    /// The RSVP list of one event
    Rsvps(EventId),
    /// The user's "today or next" check-in view
    TodayOrNext(UserId),
    /// The vibe aggregate of one event
    EventVibe(EventId),
}

impl ProjectionKey {
    /// Every view that changes when `user_id` RSVPs to `event_id`
    #[must_use]
    pub fn affected_by(event_id: &EventId, user_id: &UserId) -> [Self; 5] {
        [
            Self::MyEvents(user_id.clone()),
            Self::EventDetail(event_id.clone()),
            Self::Rsvps(event_id.clone()),
            Self::TodayOrNext(user_id.clone()),
            Self::EventVibe(event_id.clone()),
        ]
    }

    /// Short label for logs and metrics
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MyEvents(_) => "my_events",
            Self::EventDetail(_) => "event_detail",
            Self::Rsvps(_) => "rsvps",
            Self::TodayOrNext(_) => "today_or_next",
            Self::EventVibe(_) => "event_vibe",
        }
    }
}

/// Value of one cached view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projection {
    /// For [`ProjectionKey::MyEvents`]
    MyEvents(Vec<EventSummary>),
    /// For [`ProjectionKey::EventDetail`]
    EventDetail(EventDetail),
    /// For [`ProjectionKey::Rsvps`]
    Rsvps(Vec<AttendanceRecord>),
    /// For [`ProjectionKey::TodayOrNext`]
    TodayOrNext(Option<UpcomingCheckIn>),
    /// For [`ProjectionKey::EventVibe`]
    EventVibe(EventVibe),
}

impl Projection {
    /// Whether this value has the shape `key` expects
    #[must_use]
    pub const fn fits(&self, key: &ProjectionKey) -> bool {
        matches!(
            (key, self),
            (ProjectionKey::MyEvents(_), Self::MyEvents(_))
                | (ProjectionKey::EventDetail(_), Self::EventDetail(_))
                | (ProjectionKey::Rsvps(_), Self::Rsvps(_))
                | (ProjectionKey::TodayOrNext(_), Self::TodayOrNext(_))
                | (ProjectionKey::EventVibe(_), Self::EventVibe(_))
        )
    }
}

/// One mounted view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Current value
    pub projection: Projection,
    /// An authoritative refetch is scheduled
    pub stale: bool,
    /// Version of the last write
    pub version: u64,
    /// Time of the last write
    pub updated_at: DateTime<Utc>,
    /// Identifies the mount this entry belongs to
    pub mount: u64,
}

/// What happened to a refetch result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefetchApply {
    /// The entry now holds the authoritative value
    Applied,
    /// The entry was evicted or written since the refetch was scheduled
    Discarded,
}

/// Mounted views keyed by [`ProjectionKey`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProjectionCache {
    entries: HashMap<ProjectionKey, CacheEntry>,
    clock: u64,
}

impl ProjectionCache {
    /// Empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Mount `key` with `projection`, or overwrite it if already mounted.
    ///
    /// Returns `false` (and changes nothing) if the value does not fit the key.
    pub fn hydrate(&mut self, key: ProjectionKey, projection: Projection, now: DateTime<Utc>) -> bool {
        if !projection.fits(&key) {
            tracing::warn!(kind = key.kind(), "Refusing projection of the wrong shape");
            return false;
        }

        let version = self.tick();
        let mount = self.entries.get(&key).map_or(version, |entry| entry.mount);
        self.entries.insert(
            key,
            CacheEntry {
                projection,
                stale: false,
                version,
                updated_at: now,
                mount,
            },
        );
        true
    }

    /// Unmount `key`
    pub fn evict(&mut self, key: &ProjectionKey) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    /// The entry for `key`, if mounted
    #[must_use]
    pub fn get(&self, key: &ProjectionKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Whether `key` is mounted
    #[must_use]
    pub fn is_mounted(&self, key: &ProjectionKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of mounted entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is mounted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Patch a mounted entry in place. Returns the new version, or `None`
    /// if `key` is not mounted.
    pub fn update<F>(&mut self, key: &ProjectionKey, now: DateTime<Utc>, patch: F) -> Option<u64>
    where
        F: FnOnce(&mut Projection),
    {
        let version = self.clock + 1;
        let entry = self.entries.get_mut(key)?;
        patch(&mut entry.projection);
        entry.version = version;
        entry.updated_at = now;
        self.clock = version;
        Some(version)
    }

    /// Mark a mounted entry for refetch. Returns its current version.
    pub fn invalidate(&mut self, key: &ProjectionKey) -> Option<u64> {
        let entry = self.entries.get_mut(key)?;
        entry.stale = true;
        Some(entry.version)
    }

    /// Apply an authoritative value if the entry is still at `expected_version`.
    pub fn apply_refetch(
        &mut self,
        key: &ProjectionKey,
        expected_version: u64,
        projection: Projection,
        now: DateTime<Utc>,
    ) -> RefetchApply {
        let fits = projection.fits(key);
        let version = self.clock + 1;
        match self.entries.get_mut(key) {
            Some(entry) if fits && entry.version == expected_version => {
                entry.projection = projection;
                entry.stale = false;
                entry.version = version;
                entry.updated_at = now;
                self.clock = version;
                RefetchApply::Applied
            },
            _ => RefetchApply::Discarded,
        }
    }

    /// Write a snapshot back into the mount it was taken from.
    fn restore(&mut self, key: &ProjectionKey, snapshot: &CacheEntry, now: DateTime<Utc>) -> Option<u64> {
        let version = self.clock + 1;
        let entry = self.entries.get_mut(key).filter(|e| e.mount == snapshot.mount)?;
        entry.projection = snapshot.projection.clone();
        entry.stale = snapshot.stale;
        entry.version = version;
        entry.updated_at = now;
        self.clock = version;
        Some(version)
    }
}

/// Snapshot-patch-rollback helper for one optimistic mutation.
///
/// ```ignore
/// let mut tx = OptimisticTransaction::begin(&cache, ProjectionKey::affected_by(&event, &user));
/// tx.patch(&mut cache, &ProjectionKey::Rsvps(event.clone()), now, |p| { /* ... */ });
///
/// // later, on failure
/// let reverted = tx.rollback(&mut cache, now);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptimisticTransaction {
    snapshots: Vec<(ProjectionKey, Option<CacheEntry>)>,
    patched: Vec<(ProjectionKey, u64)>,
}

/// A key restored by [`OptimisticTransaction::rollback`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Restored {
    /// Restored key
    pub key: ProjectionKey,
    /// Someone else wrote the entry after this transaction patched it
    pub overwritten: bool,
    /// The snapshot was already awaiting a refetch when it was taken
    pub was_stale: bool,
}

impl OptimisticTransaction {
    /// Snapshot every key (unmounted keys are remembered as absent).
    #[must_use]
    pub fn begin<I>(cache: &ProjectionCache, keys: I) -> Self
    where
        I: IntoIterator<Item = ProjectionKey>,
    {
        let snapshots = keys
            .into_iter()
            .map(|key| {
                let snapshot = cache.get(&key).cloned();
                (key, snapshot)
            })
            .collect();
        Self {
            snapshots,
            patched: Vec::new(),
        }
    }

    /// Keys covered by this transaction
    pub fn keys(&self) -> impl Iterator<Item = &ProjectionKey> {
        self.snapshots.iter().map(|(key, _)| key)
    }

    /// Keys this transaction has written
    pub fn patched_keys(&self) -> impl Iterator<Item = &ProjectionKey> {
        self.patched.iter().map(|(key, _)| key)
    }

    /// The snapshot taken for `key`
    #[must_use]
    pub fn snapshot(&self, key: &ProjectionKey) -> Option<&CacheEntry> {
        self.snapshots
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, snapshot)| snapshot.as_ref())
    }

    /// Patch `key` if it is mounted and was snapshotted. Returns whether it was patched.
    pub fn patch<F>(&mut self, cache: &mut ProjectionCache, key: &ProjectionKey, now: DateTime<Utc>, patch: F) -> bool
    where
        F: FnOnce(&mut Projection),
    {
        if self.snapshot(key).is_none() {
            return false;
        }
        let Some(version) = cache.update(key, now, patch) else {
            return false;
        };
        self.patched.retain(|(k, _)| k != key);
        self.patched.push((key.clone(), version));
        true
    }

    /// Mark every covered, mounted key for refetch. Returns `(key, version)` pairs to refetch.
    pub fn commit(self, cache: &mut ProjectionCache) -> Vec<(ProjectionKey, u64)> {
        self.snapshots
            .into_iter()
            .filter_map(|(key, _)| cache.invalidate(&key).map(|version| (key, version)))
            .collect()
    }

    /// Restore every snapshot whose mount is still present.
    ///
    /// Keys that were unmounted at `begin`, or evicted since, are left alone.
    pub fn rollback(self, cache: &mut ProjectionCache, now: DateTime<Utc>) -> Vec<Restored> {
        let Self { snapshots, patched } = self;
        snapshots
            .into_iter()
            .filter_map(|(key, snapshot)| {
                let snapshot = snapshot?;
                let current = cache.get(&key)?.version;
                let unchanged = snapshot.version == current
                    || patched.iter().any(|(k, v)| k == &key && *v == current);
                cache.restore(&key, &snapshot, now)?;
                Some(Restored {
                    key,
                    overwritten: !unchanged,
                    was_stale: snapshot.stale,
                })
            })
            .collect()
    }
}
