//! Persistence seam.
//!
//! Every collection the API touches sits behind the [`Store`] trait so the
//! HTTP layer never sees a driver type. Production runs on MongoDB
//! ([`MongoStore`]); tests and the `STORE=memory` dev mode run on an
//! in-process map ([`MemoryStore`]).
//!
//! The inventory ledger lives here on purpose: stock mutation is expressed as
//! an atomic delta at the storage layer (upsert-and-increment for donations,
//! compare-and-decrement for requests) rather than a read-modify-write round
//! trip in handler code, so concurrent traffic on the same
//! (hospitalId, bloodType) pair cannot lose updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    BloodType, ContactMessage, DailyBucket, Donation, DonationRecord, EventRequest, GroupBucket,
    Hospital, InventoryRow, RequestRecord, User,
};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("malformed document: {0}")]
    Document(String),
}

/// Fresh document id, hex-encoded so both backends speak the same key type.
pub fn new_id() -> String {
    mongodb::bson::oid::ObjectId::new().to_hex()
}

#[async_trait]
pub trait Store: Send + Sync {
    // Users.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn user_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;
    /// Bumps the donor's lifetime donation counter and returns the new value.
    /// Atomic, so two concurrent donations never share a frequency.
    async fn next_donation_frequency(&self, user_id: &str) -> Result<i64, StoreError>;

    // Legacy donation log.
    async fn insert_donation(&self, donation: &Donation) -> Result<(), StoreError>;
    async fn donations_for_donor(&self, donor: &str) -> Result<Vec<Donation>, StoreError>;

    // Hospitals, keyed by hospitalId. Returns the stored document and whether
    // an existing registration was overwritten.
    async fn upsert_hospital(&self, hospital: &Hospital) -> Result<(Hospital, bool), StoreError>;
    async fn hospital(&self, hospital_id: &str) -> Result<Option<Hospital>, StoreError>;

    // Contact messages.
    async fn insert_contact(&self, message: &ContactMessage) -> Result<(), StoreError>;

    // Event-camp requests, read back newest first.
    async fn insert_event_request(&self, request: &EventRequest) -> Result<(), StoreError>;
    async fn event_requests(&self) -> Result<Vec<EventRequest>, StoreError>;

    // Real-time records.
    async fn insert_donation_record(&self, record: &DonationRecord) -> Result<(), StoreError>;
    async fn insert_request_record(&self, record: &RequestRecord) -> Result<(), StoreError>;
    async fn mark_request_fulfilled(
        &self,
        id: &str,
        units: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // Inventory ledger.
    /// Upsert-and-increment: creates the row at stock 0 when absent, adds
    /// `units`, stamps `lastUpdated`, returns the updated row.
    async fn add_stock(
        &self,
        hospital_id: &str,
        blood_type: BloodType,
        units: i64,
    ) -> Result<InventoryRow, StoreError>;
    /// Compare-and-decrement: subtracts `units` iff current stock covers
    /// them. Returns whether the reservation took; stock is untouched
    /// otherwise.
    async fn reserve_stock(
        &self,
        hospital_id: &str,
        blood_type: BloodType,
        units: i64,
    ) -> Result<bool, StoreError>;
    async fn stock_level(
        &self,
        hospital_id: &str,
        blood_type: BloodType,
    ) -> Result<i64, StoreError>;
    async fn hospital_inventory(&self, hospital_id: &str) -> Result<Vec<InventoryRow>, StoreError>;

    // Dashboard reads, computed fresh on every call.
    async fn donations_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError>;
    async fn requests_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError>;
    /// Daily (date, count, summed units) buckets, ascending by day.
    async fn donation_trend(&self, since: DateTime<Utc>) -> Result<Vec<DailyBucket>, StoreError>;
    async fn request_trend(&self, since: DateTime<Utc>) -> Result<Vec<DailyBucket>, StoreError>;
    async fn blood_type_distribution(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<GroupBucket>, StoreError>;
    /// Top `limit` cities by summed units, descending.
    async fn city_distribution(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<GroupBucket>, StoreError>;
    /// Unfulfilled requests at high or critical urgency.
    async fn critical_request_count(&self) -> Result<i64, StoreError>;
}
