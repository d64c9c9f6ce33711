//! In-process store used by tests and the `STORE=memory` dev mode.
//!
//! One mutex over the whole dataset makes every operation, including the
//! ledger deltas, single-writer by construction.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{Store, StoreError};
use crate::models::{
    BloodType, ContactMessage, DailyBucket, Donation, DonationRecord, EventRequest, GroupBucket,
    Hospital, InventoryRow, RequestRecord, Urgency, User,
};

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    donations: Vec<Donation>,
    hospitals: HashMap<String, Hospital>,
    contacts: Vec<ContactMessage>,
    events: Vec<EventRequest>,
    donation_records: Vec<DonationRecord>,
    request_records: Vec<RequestRecord>,
    inventory: HashMap<(String, BloodType), InventoryRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn day_key(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn trend<R>(
    records: &[R],
    since: DateTime<Utc>,
    date_of: impl Fn(&R) -> DateTime<Utc>,
    units_of: impl Fn(&R) -> i64,
) -> Vec<DailyBucket> {
    let mut days: BTreeMap<String, (i64, i64)> = BTreeMap::new();
    for record in records.iter().filter(|r| date_of(r) >= since) {
        let entry = days.entry(day_key(&date_of(record))).or_default();
        entry.0 += 1;
        entry.1 += units_of(record);
    }
    days.into_iter()
        .map(|(date, (count, units))| DailyBucket { date, count, units })
        .collect()
}

fn distribution(
    records: &[DonationRecord],
    since: DateTime<Utc>,
    key_of: impl Fn(&DonationRecord) -> String,
) -> Vec<GroupBucket> {
    let mut groups: HashMap<String, (i64, i64)> = HashMap::new();
    for record in records.iter().filter(|r| r.donation_date >= since) {
        let entry = groups.entry(key_of(record)).or_default();
        entry.0 += 1;
        entry.1 += record.units_collected;
    }
    groups
        .into_iter()
        .map(|(key, (donations, units))| GroupBucket {
            key,
            donations,
            units,
        })
        .collect()
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.inner.lock().await.users.push(user.clone());
        Ok(())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.iter().find(|u| u.username == username).cloned())
    }

    async fn user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    async fn next_donation_frequency(&self, user_id: &str) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.users.iter_mut().find(|u| u.id == user_id) {
            Some(user) => {
                user.donation_count += 1;
                Ok(user.donation_count)
            }
            None => Ok(1),
        }
    }

    async fn insert_donation(&self, donation: &Donation) -> Result<(), StoreError> {
        self.inner.lock().await.donations.push(donation.clone());
        Ok(())
    }

    async fn donations_for_donor(&self, donor: &str) -> Result<Vec<Donation>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .donations
            .iter()
            .filter(|d| d.donor == donor)
            .cloned()
            .collect())
    }

    async fn upsert_hospital(&self, hospital: &Hospital) -> Result<(Hospital, bool), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.hospitals.get_mut(&hospital.hospital_id) {
            let mut updated = hospital.clone();
            // A re-registration keeps the original id and timestamp.
            updated.id = existing.id.clone();
            updated.registered_at = existing.registered_at;
            *existing = updated.clone();
            return Ok((updated, true));
        }
        inner
            .hospitals
            .insert(hospital.hospital_id.clone(), hospital.clone());
        Ok((hospital.clone(), false))
    }

    async fn hospital(&self, hospital_id: &str) -> Result<Option<Hospital>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.hospitals.get(hospital_id).cloned())
    }

    async fn insert_contact(&self, message: &ContactMessage) -> Result<(), StoreError> {
        self.inner.lock().await.contacts.push(message.clone());
        Ok(())
    }

    async fn insert_event_request(&self, request: &EventRequest) -> Result<(), StoreError> {
        self.inner.lock().await.events.push(request.clone());
        Ok(())
    }

    async fn event_requests(&self) -> Result<Vec<EventRequest>, StoreError> {
        let inner = self.inner.lock().await;
        let mut events = inner.events.clone();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(events)
    }

    async fn insert_donation_record(&self, record: &DonationRecord) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .donation_records
            .push(record.clone());
        Ok(())
    }

    async fn insert_request_record(&self, record: &RequestRecord) -> Result<(), StoreError> {
        self.inner.lock().await.request_records.push(record.clone());
        Ok(())
    }

    async fn mark_request_fulfilled(
        &self,
        id: &str,
        units: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(record) = inner.request_records.iter_mut().find(|r| r.id == id) {
            record.is_fulfilled = true;
            record.fulfilled_date = Some(at);
            record.fulfilled_units = units;
        }
        Ok(())
    }

    async fn add_stock(
        &self,
        hospital_id: &str,
        blood_type: BloodType,
        units: i64,
    ) -> Result<InventoryRow, StoreError> {
        let mut inner = self.inner.lock().await;
        let row = inner
            .inventory
            .entry((hospital_id.to_string(), blood_type))
            .or_insert_with(|| InventoryRow::empty(hospital_id, blood_type));
        row.current_stock += units;
        row.last_updated = Utc::now();
        Ok(row.clone())
    }

    async fn reserve_stock(
        &self,
        hospital_id: &str,
        blood_type: BloodType,
        units: i64,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner
            .inventory
            .get_mut(&(hospital_id.to_string(), blood_type))
        {
            Some(row) if row.current_stock >= units => {
                row.current_stock -= units;
                row.last_updated = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn stock_level(
        &self,
        hospital_id: &str,
        blood_type: BloodType,
    ) -> Result<i64, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .inventory
            .get(&(hospital_id.to_string(), blood_type))
            .map(|row| row.current_stock)
            .unwrap_or(0))
    }

    async fn hospital_inventory(&self, hospital_id: &str) -> Result<Vec<InventoryRow>, StoreError> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<InventoryRow> = inner
            .inventory
            .values()
            .filter(|row| row.hospital_id == hospital_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.blood_type.as_str());
        Ok(rows)
    }

    async fn donations_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .donation_records
            .iter()
            .filter(|r| r.donation_date >= since)
            .count() as i64)
    }

    async fn requests_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .request_records
            .iter()
            .filter(|r| r.request_date >= since)
            .count() as i64)
    }

    async fn donation_trend(&self, since: DateTime<Utc>) -> Result<Vec<DailyBucket>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(trend(
            &inner.donation_records,
            since,
            |r| r.donation_date,
            |r| r.units_collected,
        ))
    }

    async fn request_trend(&self, since: DateTime<Utc>) -> Result<Vec<DailyBucket>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(trend(
            &inner.request_records,
            since,
            |r| r.request_date,
            |r| r.units_required,
        ))
    }

    async fn blood_type_distribution(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<GroupBucket>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(distribution(&inner.donation_records, since, |r| {
            r.blood_type.as_str().to_string()
        }))
    }

    async fn city_distribution(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<GroupBucket>, StoreError> {
        let inner = self.inner.lock().await;
        let mut groups = distribution(&inner.donation_records, since, |r| r.city.clone());
        groups.sort_by(|a, b| b.units.cmp(&a.units));
        groups.truncate(limit as usize);
        Ok(groups)
    }

    async fn critical_request_count(&self) -> Result<i64, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .request_records
            .iter()
            .filter(|r| {
                !r.is_fulfilled
                    && matches!(r.urgency_level, Urgency::High | Urgency::Critical)
            })
            .count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DonationType, EventKind, Gender, Weather};
    use crate::store::new_id;
    use chrono::Duration;

    fn donation_record(city: &str, blood_type: BloodType, units: i64, date: DateTime<Utc>) -> DonationRecord {
        DonationRecord {
            id: new_id(),
            donor_id: new_id(),
            donor_name: "Donor".into(),
            blood_type,
            city: city.into(),
            state: "State".into(),
            hospital_id: "H1".into(),
            hospital_name: "General".into(),
            donation_date: date,
            units_collected: units,
            donation_type: DonationType::WholeBlood,
            donor_age: 30,
            donor_gender: Gender::Other,
            is_emergency: false,
            weather: Weather::Sunny,
            event_type: EventKind::Regular,
            created_at: date,
        }
    }

    fn request_record(urgency: Urgency, fulfilled: bool) -> RequestRecord {
        RequestRecord {
            id: new_id(),
            requester_id: new_id(),
            requester_name: "Requester".into(),
            blood_type: BloodType::OPositive,
            city: "City".into(),
            state: "State".into(),
            hospital_id: "H1".into(),
            hospital_name: "General".into(),
            request_date: Utc::now(),
            units_required: 2,
            urgency_level: urgency,
            patient_age: 45,
            patient_gender: Gender::Other,
            medical_condition: "surgery".into(),
            is_fulfilled: fulfilled,
            fulfilled_date: None,
            fulfilled_units: 0,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn stock_is_sum_of_donations_minus_fulfilled_requests() {
        let store = MemoryStore::new();
        store.add_stock("H1", BloodType::OPositive, 3).await.unwrap();
        store.add_stock("H1", BloodType::OPositive, 4).await.unwrap();
        assert!(store.reserve_stock("H1", BloodType::OPositive, 5).await.unwrap());
        // Insufficient stock leaves the counter untouched.
        assert!(!store.reserve_stock("H1", BloodType::OPositive, 3).await.unwrap());
        assert_eq!(store.stock_level("H1", BloodType::OPositive).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn concurrent_first_writes_share_one_inventory_row() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.add_stock("H1", BloodType::OPositive, 1).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let rows = store.hospital_inventory("H1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].current_stock, 8);
    }

    #[tokio::test]
    async fn reserve_fulfills_iff_stock_covers_the_request() {
        let store = MemoryStore::new();
        store.add_stock("H1", BloodType::ANegative, 5).await.unwrap();
        assert!(store.reserve_stock("H1", BloodType::ANegative, 5).await.unwrap());
        assert_eq!(store.stock_level("H1", BloodType::ANegative).await.unwrap(), 0);
        assert!(!store.reserve_stock("H1", BloodType::ANegative, 1).await.unwrap());
        // A pair with no row reads as zero stock.
        assert_eq!(store.stock_level("H2", BloodType::ANegative).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn trend_groups_by_day_in_ascending_order() {
        let store = MemoryStore::new();
        let day1 = Utc::now() - Duration::days(2);
        let day2 = Utc::now() - Duration::days(1);
        for units in [2, 3] {
            store
                .insert_donation_record(&donation_record("Delhi", BloodType::OPositive, units, day1))
                .await
                .unwrap();
        }
        store
            .insert_donation_record(&donation_record("Delhi", BloodType::OPositive, 5, day2))
            .await
            .unwrap();

        let trend = store
            .donation_trend(Utc::now() - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(trend.len(), 2);
        assert_eq!((trend[0].count, trend[0].units), (2, 5));
        assert_eq!((trend[1].count, trend[1].units), (1, 5));
        assert!(trend[0].date < trend[1].date);
    }

    #[tokio::test]
    async fn city_distribution_is_top_n_by_units_descending() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for (city, units) in [("A", 10), ("B", 50), ("C", 5)] {
            store
                .insert_donation_record(&donation_record(city, BloodType::BPositive, units, now))
                .await
                .unwrap();
        }

        let cities = store
            .city_distribution(now - Duration::days(30), 10)
            .await
            .unwrap();
        let order: Vec<&str> = cities.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(order, ["B", "A", "C"]);
    }

    #[tokio::test]
    async fn critical_count_ignores_fulfilled_requests() {
        let store = MemoryStore::new();
        store
            .insert_request_record(&request_record(Urgency::Critical, false))
            .await
            .unwrap();
        store
            .insert_request_record(&request_record(Urgency::High, false))
            .await
            .unwrap();
        store
            .insert_request_record(&request_record(Urgency::Critical, true))
            .await
            .unwrap();
        store
            .insert_request_record(&request_record(Urgency::Low, false))
            .await
            .unwrap();
        assert_eq!(store.critical_request_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn donation_frequency_is_a_monotonic_per_donor_counter() {
        let store = MemoryStore::new();
        let user = User {
            id: "u1".into(),
            fullname: "Donor".into(),
            username: "donor".into(),
            password: "hash".into(),
            phone: "1".into(),
            address: "a".into(),
            preferred_hospital: None,
            donation_count: 0,
            created_at: Utc::now(),
        };
        store.insert_user(&user).await.unwrap();
        assert_eq!(store.next_donation_frequency("u1").await.unwrap(), 1);
        assert_eq!(store.next_donation_frequency("u1").await.unwrap(), 2);
        assert_eq!(store.next_donation_frequency("u1").await.unwrap(), 3);
    }
}
