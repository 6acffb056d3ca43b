//! Collaborator interfaces consumed by the booking layer, plus the
//! WAL-backed in-memory implementation.

mod ledger;

pub use ledger::LedgerStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

#[derive(Debug)]
pub enum StoreError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Another reservation already holds this code.
    DuplicateCode(String),
    WalError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "not found: {id}"),
            StoreError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            StoreError::DuplicateCode(code) => write!(f, "reservation code already in use: {code}"),
            StoreError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Non-deleted reservations of `date` in one stream, in creation order.
    async fn list_active(&self, date: NaiveDate, stream: StreamKind) -> Result<Vec<Reservation>, StoreError>;

    async fn list_with_status(
        &self,
        date: NaiveDate,
        stream: StreamKind,
        statuses: &[Status],
    ) -> Result<Vec<Reservation>, StoreError> {
        let mut rs = self.list_active(date, stream).await?;
        rs.retain(|r| statuses.contains(&r.status));
        Ok(rs)
    }

    /// Every reservation of an event, including cancelled and deleted ones.
    async fn list_for_event(&self, event_id: Ulid) -> Result<Vec<Reservation>, StoreError>;

    async fn get(&self, id: Ulid) -> Result<Option<Reservation>, StoreError>;

    async fn create(&self, reservation: Reservation) -> Result<(), StoreError>;

    async fn update(&self, reservation: Reservation) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AdjustmentStore: Send + Sync {
    async fn get_by_date(&self, date: NaiveDate) -> Result<AdjustmentMap, StoreError>;

    async fn get_one(&self, date: NaiveDate, reservation_id: Ulid) -> Result<Option<Adjustment>, StoreError> {
        Ok(self.get_by_date(date).await?.remove(&reservation_id))
    }

    /// Insert or replace. Idempotent, safe to retry.
    async fn upsert(&self, date: NaiveDate, reservation_id: Ulid, adjustment: Adjustment) -> Result<(), StoreError>;
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn get_event(&self, id: Ulid) -> Result<Option<Event>, StoreError>;

    async fn save_event(&self, event: Event) -> Result<(), StoreError>;
}

/// Maps user-entered table references (id, name or number) to canonical ids.
pub trait LayoutResolver: Send + Sync {
    fn resolve_table(&self, name_or_number: &str) -> Option<TableId>;
}
