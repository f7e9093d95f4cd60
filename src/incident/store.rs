use std::cmp::Ordering;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate};
use tracing::{debug, info, warn};

use super::{parse_timestamp, Incident, IncidentCandidate, IncidentStats, IncidentStatus, StoreError};
use crate::storage::SnapshotBackend;

struct Inner {
    incidents: Vec<Incident>,
    next_id: u64,
}

/// The incident log: sole owner of the collection and its durable copy.
///
/// Mutations hold the write lock across ID assignment, the in-memory change
/// and the snapshot write, so IDs are never handed out twice and snapshot
/// writes never interleave. Reads share the lock.
pub struct IncidentStore {
    inner: RwLock<Inner>,
    backend: Box<dyn SnapshotBackend>,
    slow_write: Duration,
}

impl IncidentStore {
    /// Load the collection from `backend`; an empty backend yields an empty store.
    pub fn open(backend: Box<dyn SnapshotBackend>) -> Result<Self, StoreError> {
        let snapshot = backend.load()?;
        let max_id = snapshot.incidents.iter().map(|i| i.id).max().unwrap_or(0);
        let next_id = snapshot.next_id.unwrap_or(1).max(max_id + 1);

        info!(
            backend = %backend.describe(),
            count = snapshot.incidents.len(),
            next_id,
            "Loaded incident log"
        );

        Ok(Self {
            inner: RwLock::new(Inner {
                incidents: snapshot.incidents,
                next_id,
            }),
            backend,
            slow_write: Duration::from_millis(250),
        })
    }

    /// Log snapshot writes slower than `threshold`.
    pub fn with_slow_write_threshold(mut self, threshold: Duration) -> Self {
        self.slow_write = threshold;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, inner: &Inner) -> Result<(), StoreError> {
        let started = Instant::now();
        self.backend.persist(&inner.incidents, inner.next_id)?;

        let elapsed = started.elapsed();
        if elapsed > self.slow_write {
            warn!(
                backend = %self.backend.describe(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Slow incident log write"
            );
        }
        Ok(())
    }

    /// Assign the next ID, store the incident and persist. Nothing changes if
    /// the write fails.
    pub fn append(&self, candidate: IncidentCandidate) -> Result<Incident, StoreError> {
        let mut inner = self.write();

        let id = inner.next_id;
        let incident = candidate.into_incident(id);
        inner.incidents.push(incident.clone());
        inner.next_id = id + 1;

        if let Err(e) = self.persist(&inner) {
            inner.incidents.pop();
            inner.next_id = id;
            return Err(e);
        }

        info!(id, persons = incident.persons, kind = ?incident.kind, "Incident recorded");
        Ok(incident)
    }

    /// All incidents, newest timestamp first. Equal timestamps keep insertion order.
    pub fn list_all(&self) -> Vec<Incident> {
        let mut incidents = self.read().incidents.clone();
        incidents.sort_by(newest_first);
        incidents
    }

    pub fn get(&self, id: u64) -> Result<Incident, StoreError> {
        self.read()
            .incidents
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    /// Remove one incident. IDs of the others are untouched and `id` is
    /// never handed out again.
    pub fn delete(&self, id: u64) -> Result<(), StoreError> {
        let mut inner = self.write();

        let pos = inner
            .incidents
            .iter()
            .position(|i| i.id == id)
            .ok_or(StoreError::NotFound(id))?;
        let removed = inner.incidents.remove(pos);

        if let Err(e) = self.persist(&inner) {
            inner.incidents.insert(pos, removed);
            return Err(e);
        }

        info!(id, "Incident deleted");
        Ok(())
    }

    pub fn stats(&self) -> IncidentStats {
        self.stats_on(Local::now().date_naive())
    }

    /// Counters with `today` bucketed against `date` (local calendar).
    pub fn stats_on(&self, date: NaiveDate) -> IncidentStats {
        let inner = self.read();
        let mut stats = IncidentStats {
            total: inner.incidents.len(),
            ..IncidentStats::default()
        };

        for incident in &inner.incidents {
            if incident.status == IncidentStatus::Active {
                stats.active += 1;
            }
            match parse_timestamp(&incident.timestamp) {
                Some(ts) if ts.date() == date => stats.today += 1,
                Some(_) => {}
                None => {
                    let err = StoreError::MalformedTimestamp {
                        id: incident.id,
                        timestamp: incident.timestamp.clone(),
                    };
                    warn!(error = %err, "Skipping incident in daily count");
                    stats.malformed.push(incident.id);
                }
            }
        }

        debug!(?stats, "Computed incident stats");
        stats
    }

    pub fn len(&self) -> usize {
        self.read().incidents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Descending by parsed timestamp. Unparseable timestamps sort as oldest.
fn newest_first(a: &Incident, b: &Incident) -> Ordering {
    match (parse_timestamp(&a.timestamp), parse_timestamp(&b.timestamp)) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => b.timestamp.cmp(&a.timestamp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::policy::evaluate_manual;
    use crate::incident::IncidentKind;
    use crate::storage::{JsonFileBackend, PersistError, Snapshot};
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
    use std::sync::Arc;

    /// Backend that can be told to fail writes.
    #[derive(Default)]
    struct FlakyBackend {
        fail: Arc<AtomicBool>,
        written: std::sync::Mutex<Vec<Incident>>,
    }

    impl SnapshotBackend for FlakyBackend {
        fn load(&self) -> Result<Snapshot, PersistError> {
            Ok(Snapshot::default())
        }

        fn persist(&self, incidents: &[Incident], _next_id: u64) -> Result<(), PersistError> {
            if self.fail.load(AtomicOrdering::SeqCst) {
                return Err(PersistError::Io(std::io::Error::other("disk full")));
            }
            *self.written.lock().unwrap() = incidents.to_vec();
            Ok(())
        }

        fn describe(&self) -> String {
            "flaky".into()
        }
    }

    fn manual(persons: u32, ts: &str) -> IncidentCandidate {
        let mut location = serde_json::Map::new();
        location.insert("gate".into(), serde_json::json!("A"));
        evaluate_manual(persons, location, Some(ts.to_string()))
    }

    fn json_store(dir: &tempfile::TempDir) -> IncidentStore {
        let backend = JsonFileBackend::new(dir.path().join("incidents.json"));
        IncidentStore::open(Box::new(backend)).unwrap()
    }

    #[test]
    fn test_ids_are_sequential_from_one() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = json_store(&dir);

        let a = store.append(manual(3, "2024-01-01T10:00:00")).unwrap();
        let b = store.append(manual(2, "2024-01-02T10:00:00")).unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(a.kind, IncidentKind::ManualReport);
    }

    #[test]
    fn test_list_is_newest_first() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = json_store(&dir);

        store.append(manual(3, "2024-01-01T10:00:00")).unwrap();
        store.append(manual(2, "2024-01-02T10:00:00")).unwrap();

        let ids: Vec<u64> = store.list_all().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn test_list_ties_keep_insertion_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = json_store(&dir);

        store.append(manual(2, "2024-01-01T10:00:00")).unwrap();
        store.append(manual(2, "2024-01-03T10:00:00")).unwrap();
        store.append(manual(2, "2024-01-01T10:00:00")).unwrap();
        store.append(manual(2, "2024-01-01T10:00:00")).unwrap();

        let ids: Vec<u64> = store.list_all().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![2, 1, 3, 4]);
    }

    #[test]
    fn test_list_compares_instants_not_strings() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = json_store(&dir);

        store.append(manual(2, "2024-01-01T09:00:00")).unwrap();
        store.append(manual(2, "2024-01-01T10:00:00.5")).unwrap();
        store.append(manual(2, "not a date")).unwrap();

        let ids: Vec<u64> = store.list_all().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn test_get_and_delete() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = json_store(&dir);

        let a = store.append(manual(3, "2024-01-01T10:00:00")).unwrap();
        assert_eq!(store.get(a.id).unwrap(), a);
        assert!(matches!(store.get(99), Err(StoreError::NotFound(99))));

        store.delete(a.id).unwrap();
        assert!(matches!(store.get(a.id), Err(StoreError::NotFound(1))));
        assert!(matches!(store.delete(a.id), Err(StoreError::NotFound(1))));
    }

    #[test]
    fn test_deleted_ids_are_not_reused() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = json_store(&dir);

        store.append(manual(2, "2024-01-01T10:00:00")).unwrap();
        store.append(manual(2, "2024-01-01T11:00:00")).unwrap();
        store.append(manual(2, "2024-01-01T12:00:00")).unwrap();
        store.delete(2).unwrap();
        store.delete(3).unwrap();

        let next = store.append(manual(2, "2024-01-01T13:00:00")).unwrap();
        assert_eq!(next.id, 4);
        assert_eq!(store.get(1).unwrap().id, 1);
    }

    #[test]
    fn test_reload_is_field_for_field_identical() {
        let dir = tempfile::TempDir::new().unwrap();
        let before = {
            let store = json_store(&dir);
            store.append(manual(3, "2024-01-01T10:00:00")).unwrap();
            store.append(manual(4, "2024-01-02T10:00:00")).unwrap();
            store.delete(1).unwrap();
            store.list_all()
        };

        let reopened = json_store(&dir);
        assert_eq!(reopened.list_all(), before);
        assert_eq!(reopened.append(manual(1, "2024-01-03T10:00:00")).unwrap().id, 3);
    }

    #[test]
    fn test_failed_append_rolls_back() {
        let backend = FlakyBackend::default();
        let fail = backend.fail.clone();
        let store = IncidentStore::open(Box::new(backend)).unwrap();

        store.append(manual(2, "2024-01-01T10:00:00")).unwrap();

        fail.store(true, AtomicOrdering::SeqCst);
        let err = store.append(manual(5, "2024-01-02T10:00:00")).unwrap_err();
        assert!(matches!(err, StoreError::Persistence(_)));
        assert_eq!(store.len(), 1);

        fail.store(false, AtomicOrdering::SeqCst);
        let next = store.append(manual(5, "2024-01-02T10:00:00")).unwrap();
        assert_eq!(next.id, 2);
    }

    #[test]
    fn test_failed_delete_rolls_back() {
        let backend = FlakyBackend::default();
        let fail = backend.fail.clone();
        let store = IncidentStore::open(Box::new(backend)).unwrap();

        store.append(manual(2, "2024-01-01T10:00:00")).unwrap();
        store.append(manual(2, "2024-01-02T10:00:00")).unwrap();
        let before = store.list_all();

        fail.store(true, AtomicOrdering::SeqCst);
        assert!(matches!(store.delete(1), Err(StoreError::Persistence(_))));
        assert_eq!(store.list_all(), before);
        assert!(store.get(1).is_ok());
    }

    #[test]
    fn test_stats_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = json_store(&dir);
        assert_eq!(store.stats(), IncidentStats::default());
        assert!(store.is_empty());
    }

    #[test]
    fn test_stats_today_and_active() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = json_store(&dir);
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        store.append(manual(2, "2024-01-01T23:59:59")).unwrap();
        store.append(manual(2, "2024-01-02T00:00:00")).unwrap();
        store.append(manual(2, "2024-01-02T18:30:00.250000")).unwrap();

        let stats = store.stats_on(day);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.today, 2);
        assert_eq!(stats.active, 0);
        assert!(stats.malformed.is_empty());
    }

    #[test]
    fn test_stats_counts_active_status() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut active = manual(2, "2024-01-01T10:00:00");
        active.status = IncidentStatus::Active;
        let store = json_store(&dir);
        store.append(active).unwrap();
        store.append(manual(2, "2024-01-01T11:00:00")).unwrap();

        let stats = store.stats_on(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(stats.active, 1);
        assert_eq!(stats.today, 2);
    }

    #[test]
    fn test_stats_skips_malformed_timestamps() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = json_store(&dir);
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        store.append(manual(2, "2024-01-01T10:00:00")).unwrap();
        store.append(manual(2, "garbage")).unwrap();

        let stats = store.stats_on(day);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.today, 1);
        assert_eq!(stats.malformed, vec![2]);
    }

    #[test]
    fn test_concurrent_appends_get_unique_ids() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(json_store(&dir));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .map(|_| store.append(manual(2, "2024-01-01T10:00:00")).unwrap().id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=80).collect::<Vec<_>>());

        let reopened = json_store(&dir);
        assert_eq!(reopened.len(), 80);
    }
}
