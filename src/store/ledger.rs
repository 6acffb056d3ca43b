use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex};
use ulid::Ulid;

use crate::layout::Layout;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

use super::{AdjustmentStore, EventRepository, LayoutResolver, ReservationStore, StoreError};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        change: Change,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        snapshot: Vec<Change>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the WAL. Appends that queue up while a flush is pending are written
/// together and share one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch = match cmd {
            WalCommand::Append { change, response } => vec![(change, response)],
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { change, response }) => batch.push((change, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Change, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let appended = batch
        .iter()
        .try_for_each(|(change, _)| wal.append_buffered(change));
    // Flush even after a failed append so half-written bytes don't end up
    // in the next batch.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { snapshot, response } => {
            let result = Wal::write_compact_file(wal.path(), &snapshot).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

// ── Store ────────────────────────────────────────────────

/// Reservations, adjustments, events and tables of one venue, held in
/// memory and made durable through the WAL.
pub struct LedgerStore {
    reservations: DashMap<Ulid, Reservation>,
    /// Date → reservation ids in creation order.
    by_date: DashMap<NaiveDate, Vec<Ulid>>,
    by_event: DashMap<Ulid, Vec<Ulid>>,
    /// Reservation code → owning reservation.
    codes: DashMap<String, Ulid>,
    adjustments: DashMap<NaiveDate, AdjustmentMap>,
    events: DashMap<Ulid, Event>,
    layout: Layout,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Held from uniqueness check through WAL append and apply, so the log
    /// order is the apply order.
    commit: Mutex<()>,
    notify: Arc<NotifyHub>,
}

impl LedgerStore {
    /// Replay the log at `wal_path` and start its writer task. Must be
    /// called inside a tokio runtime.
    pub fn open(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let changes = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = Self {
            reservations: DashMap::new(),
            by_date: DashMap::new(),
            by_event: DashMap::new(),
            codes: DashMap::new(),
            adjustments: DashMap::new(),
            events: DashMap::new(),
            layout: Layout::new(),
            wal_tx,
            commit: Mutex::new(()),
            notify,
        };
        for change in &changes {
            store.apply(change);
        }
        tracing::debug!("replayed {} changes from {}", changes.len(), wal_path.display());
        Ok(store)
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    pub async fn save_table(&self, table: Table) -> Result<(), StoreError> {
        let _guard = self.commit.lock().await;
        self.persist_and_apply(Change::TableSaved(table)).await
    }

    async fn wal_append(&self, change: &Change) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                change: change.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WalError(e.to_string()))
    }

    /// WAL-append + apply + notify. Caller holds `commit`.
    async fn persist_and_apply(&self, change: Change) -> Result<(), StoreError> {
        self.wal_append(&change).await?;
        let moved_from = self.apply(&change);
        for date in affected_dates(&change).into_iter().chain(moved_from) {
            self.notify.send(date, &change);
        }
        Ok(())
    }

    /// Apply a change to the in-memory state. Returns the previous date of a
    /// reservation that moved to another date.
    fn apply(&self, change: &Change) -> Option<NaiveDate> {
        match change {
            Change::ReservationSaved(r) => self.apply_reservation(r),
            Change::AdjustmentUpserted {
                date,
                reservation_id,
                adjustment,
            } => {
                // An empty adjustment resets to the estimated window.
                if adjustment.is_empty() {
                    if let Some(mut by_id) = self.adjustments.get_mut(date) {
                        by_id.remove(reservation_id);
                    }
                    self.adjustments.remove_if(date, |_, by_id| by_id.is_empty());
                } else {
                    self.adjustments
                        .entry(*date)
                        .or_default()
                        .insert(*reservation_id, *adjustment);
                }
                None
            }
            Change::EventSaved(event) => {
                self.events.insert(event.id, event.clone());
                None
            }
            Change::TableSaved(table) => {
                self.layout.insert(table.clone());
                None
            }
        }
    }

    fn apply_reservation(&self, r: &Reservation) -> Option<NaiveDate> {
        let previous = self.reservations.insert(r.id, r.clone());
        let mut moved_from = None;

        match &previous {
            Some(old) if old.date != r.date => {
                if let Some(mut ids) = self.by_date.get_mut(&old.date) {
                    ids.retain(|id| *id != r.id);
                }
                self.by_date.entry(r.date).or_default().push(r.id);
                moved_from = Some(old.date);
            }
            Some(_) => {}
            None => self.by_date.entry(r.date).or_default().push(r.id),
        }

        let old_event = previous.as_ref().and_then(|o| o.stream.event_id());
        if old_event != r.stream.event_id() {
            if let Some(eid) = old_event
                && let Some(mut ids) = self.by_event.get_mut(&eid)
            {
                ids.retain(|id| *id != r.id);
            }
            if let Some(eid) = r.stream.event_id() {
                self.by_event.entry(eid).or_default().push(r.id);
            }
        }

        if let Some(old_code) = previous.as_ref().and_then(|o| o.code.as_ref())
            && r.code.as_ref() != Some(old_code)
        {
            self.codes.remove_if(old_code, |_, owner| *owner == r.id);
        }
        if let Some(code) = &r.code {
            self.codes.insert(code.clone(), r.id);
        }

        moved_from
    }

    fn check_code(&self, r: &Reservation) -> Result<(), StoreError> {
        if let Some(code) = &r.code
            && let Some(owner) = self.codes.get(code)
            && *owner != r.id
        {
            return Err(StoreError::DuplicateCode(code.clone()));
        }
        Ok(())
    }

    fn collect(&self, ids: &[Ulid]) -> Vec<Reservation> {
        ids.iter()
            .filter_map(|id| self.reservations.get(id).map(|e| e.value().clone()))
            .collect()
    }

    /// Rewrite the WAL with only the changes needed to recreate the
    /// current state.
    pub async fn compact_wal(&self) -> Result<(), StoreError> {
        let _guard = self.commit.lock().await;
        let mut snapshot: Vec<Change> = Vec::new();

        snapshot.extend(self.layout.tables().into_iter().map(Change::TableSaved));
        snapshot.extend(self.events.iter().map(|e| Change::EventSaved(e.value().clone())));
        // Per-date creation order is the conflict scan order; keep it.
        for entry in self.by_date.iter() {
            snapshot.extend(self.collect(entry.value()).into_iter().map(Change::ReservationSaved));
        }
        for entry in self.adjustments.iter() {
            for (reservation_id, adjustment) in entry.value() {
                snapshot.push(Change::AdjustmentUpserted {
                    date: *entry.key(),
                    reservation_id: *reservation_id,
                    adjustment: *adjustment,
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { snapshot, response: tx })
            .await
            .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

fn affected_dates(change: &Change) -> Option<NaiveDate> {
    match change {
        Change::ReservationSaved(r) => Some(r.date),
        Change::AdjustmentUpserted { date, .. } => Some(*date),
        Change::EventSaved(event) => Some(event.date),
        Change::TableSaved(_) => None,
    }
}

#[async_trait]
impl ReservationStore for LedgerStore {
    async fn list_active(&self, date: NaiveDate, stream: StreamKind) -> Result<Vec<Reservation>, StoreError> {
        let ids = self.by_date.get(&date).map(|e| e.value().clone()).unwrap_or_default();
        let mut rs = self.collect(&ids);
        rs.retain(|r| !r.deleted && r.stream.kind() == stream);
        Ok(rs)
    }

    async fn list_for_event(&self, event_id: Ulid) -> Result<Vec<Reservation>, StoreError> {
        let ids = self.by_event.get(&event_id).map(|e| e.value().clone()).unwrap_or_default();
        Ok(self.collect(&ids))
    }

    async fn get(&self, id: Ulid) -> Result<Option<Reservation>, StoreError> {
        Ok(self.reservations.get(&id).map(|e| e.value().clone()))
    }

    async fn create(&self, reservation: Reservation) -> Result<(), StoreError> {
        let _guard = self.commit.lock().await;
        // Re-creating the same id is a retry, not a second reservation.
        if let Some(existing) = self.reservations.get(&reservation.id) {
            if *existing == reservation {
                return Ok(());
            }
            return Err(StoreError::AlreadyExists(reservation.id));
        }
        self.check_code(&reservation)?;
        self.persist_and_apply(Change::ReservationSaved(reservation)).await
    }

    async fn update(&self, reservation: Reservation) -> Result<(), StoreError> {
        let _guard = self.commit.lock().await;
        if !self.reservations.contains_key(&reservation.id) {
            return Err(StoreError::NotFound(reservation.id));
        }
        self.check_code(&reservation)?;
        self.persist_and_apply(Change::ReservationSaved(reservation)).await
    }
}

#[async_trait]
impl AdjustmentStore for LedgerStore {
    async fn get_by_date(&self, date: NaiveDate) -> Result<AdjustmentMap, StoreError> {
        Ok(self.adjustments.get(&date).map(|e| e.value().clone()).unwrap_or_default())
    }

    async fn get_one(&self, date: NaiveDate, reservation_id: Ulid) -> Result<Option<Adjustment>, StoreError> {
        Ok(self
            .adjustments
            .get(&date)
            .and_then(|e| e.value().get(&reservation_id).copied()))
    }

    async fn upsert(&self, date: NaiveDate, reservation_id: Ulid, adjustment: Adjustment) -> Result<(), StoreError> {
        let _guard = self.commit.lock().await;
        let current = self
            .adjustments
            .get(&date)
            .and_then(|e| e.value().get(&reservation_id).copied());
        if current == Some(adjustment) || (current.is_none() && adjustment.is_empty()) {
            return Ok(());
        }
        self.persist_and_apply(Change::AdjustmentUpserted {
            date,
            reservation_id,
            adjustment,
        })
        .await
    }
}

#[async_trait]
impl EventRepository for LedgerStore {
    async fn get_event(&self, id: Ulid) -> Result<Option<Event>, StoreError> {
        Ok(self.events.get(&id).map(|e| e.value().clone()))
    }

    async fn save_event(&self, event: Event) -> Result<(), StoreError> {
        let _guard = self.commit.lock().await;
        self.persist_and_apply(Change::EventSaved(event)).await
    }
}

impl LayoutResolver for LedgerStore {
    fn resolve_table(&self, name_or_number: &str) -> Option<TableId> {
        self.layout.resolve_table(name_or_number)
    }
}
