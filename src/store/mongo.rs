//! MongoDB-backed [`Store`].
//!
//! Collection names match the existing `donation_app` database so a live
//! deployment keeps working. Dates are stored as BSON datetimes
//! (the dashboard pipelines depend on `$dateToString` and range matches), so
//! documents are built and read by hand here instead of leaning on derived
//! serde.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, DateTime as BsonDateTime, Document},
    options::{IndexOptions, ReturnDocument},
    Client, Collection, Database, IndexModel,
};

use super::{Store, StoreError};
use crate::models::{
    BloodType, ContactMessage, DailyBucket, Donation, DonationRecord, EventRequest, GroupBucket,
    Hospital, InventoryRow, RequestRecord, Urgency, User, DEFAULT_MAXIMUM_CAPACITY,
    DEFAULT_MINIMUM_THRESHOLD,
};

const USERS: &str = "users";
const DONATIONS: &str = "donations";
const HOSPITALS: &str = "hospitals";
const CONTACTS: &str = "contacts";
const EVENT_REQUESTS: &str = "eventrequests";
const DONATION_RECORDS: &str = "blooddonationrecords";
const REQUEST_RECORDS: &str = "bloodrequestrecords";
const INVENTORY: &str = "bloodinventories";

pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    /// Connects and pings, so a dead database fails the boot instead of the
    /// first request.
    pub async fn connect(url: &str, db_name: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(url).await?;
        let db = client.database(db_name);
        db.run_command(doc! { "ping": 1 }).await?;
        let store = Self { db };
        store.ensure_indexes().await?;
        Ok(store)
    }

    /// Unique indexes backing the upsert filters. Without them, concurrent
    /// upserts for a key with no document yet can each take the insert path
    /// and leave duplicate rows.
    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        self.coll(HOSPITALS)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "hospitalId": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;
        self.coll(INVENTORY)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "hospitalId": 1, "bloodType": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;
        Ok(())
    }

    fn coll(&self, name: &str) -> Collection<Document> {
        self.db.collection(name)
    }
}

/// The losing side of a concurrent upsert surfaces as a duplicate-key error
/// once the unique index is in place; a single retry then takes the update
/// path against the winner's document.
fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    match &*err.kind {
        ErrorKind::Write(WriteFailure::WriteError(write)) => write.code == 11000,
        ErrorKind::Command(command) => command.code == 11000,
        _ => false,
    }
}

fn bdt(date: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_chrono(date)
}

fn missing(key: &str) -> StoreError {
    StoreError::Document(format!("missing or mistyped field `{key}`"))
}

fn get_str(document: &Document, key: &str) -> Result<String, StoreError> {
    document
        .get_str(key)
        .map(str::to_string)
        .map_err(|_| missing(key))
}

fn opt_str(document: &Document, key: &str) -> Option<String> {
    document.get_str(key).ok().map(str::to_string)
}

fn get_date(document: &Document, key: &str) -> Result<DateTime<Utc>, StoreError> {
    document
        .get_datetime(key)
        .map(|dt| dt.to_chrono())
        .map_err(|_| missing(key))
}

/// Numeric fields may come back as Int32, Int64 or Double depending on who
/// wrote them; `$sum` in particular widens.
fn get_number(document: &Document, key: &str) -> Result<i64, StoreError> {
    match document.get(key) {
        Some(Bson::Int32(n)) => Ok(i64::from(*n)),
        Some(Bson::Int64(n)) => Ok(*n),
        Some(Bson::Double(n)) => Ok(*n as i64),
        _ => Err(missing(key)),
    }
}

fn number_or(document: &Document, key: &str, default: i64) -> i64 {
    get_number(document, key).unwrap_or(default)
}

fn get_enum<T>(
    document: &Document,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, StoreError> {
    document
        .get_str(key)
        .ok()
        .and_then(parse)
        .ok_or_else(|| missing(key))
}

fn user_to_doc(user: &User) -> Document {
    doc! {
        "_id": &user.id,
        "fullname": &user.fullname,
        "username": &user.username,
        "password": &user.password,
        "phone": &user.phone,
        "address": &user.address,
        "preferredHospital": user.preferred_hospital.as_deref().map(Bson::from).unwrap_or(Bson::Null),
        "donationCount": user.donation_count,
        "createdAt": bdt(user.created_at),
    }
}

fn user_from_doc(document: &Document) -> Result<User, StoreError> {
    Ok(User {
        id: get_str(document, "_id")?,
        fullname: get_str(document, "fullname")?,
        username: get_str(document, "username")?,
        password: get_str(document, "password")?,
        phone: get_str(document, "phone")?,
        address: get_str(document, "address")?,
        preferred_hospital: opt_str(document, "preferredHospital"),
        donation_count: number_or(document, "donationCount", 0),
        created_at: get_date(document, "createdAt")?,
    })
}

fn donation_to_doc(donation: &Donation) -> Document {
    doc! {
        "_id": &donation.id,
        "donor": &donation.donor,
        "blood_type": &donation.blood_type,
        "units": donation.units,
        "donation_date": bdt(donation.donation_date),
        "hospital": &donation.hospital,
        "frequency": donation.frequency,
    }
}

fn donation_from_doc(document: &Document) -> Result<Donation, StoreError> {
    Ok(Donation {
        id: get_str(document, "_id")?,
        donor: get_str(document, "donor")?,
        blood_type: get_str(document, "blood_type")?,
        units: get_number(document, "units")?,
        donation_date: get_date(document, "donation_date")?,
        hospital: opt_str(document, "hospital").unwrap_or_default(),
        frequency: number_or(document, "frequency", 1),
    })
}

fn hospital_fields(hospital: &Hospital) -> Document {
    doc! {
        "name": &hospital.name,
        "email": &hospital.email,
        "phone": &hospital.phone,
        "address": &hospital.address,
        "city": &hospital.city,
        "state": &hospital.state,
        "pincode": &hospital.pincode,
        "beds": hospital.beds,
        "rooms": hospital.rooms,
        "status": &hospital.status,
    }
}

fn hospital_from_doc(document: &Document) -> Result<Hospital, StoreError> {
    Ok(Hospital {
        id: get_str(document, "_id")?,
        hospital_id: get_str(document, "hospitalId")?,
        name: get_str(document, "name")?,
        email: get_str(document, "email")?,
        phone: get_str(document, "phone")?,
        address: get_str(document, "address")?,
        city: get_str(document, "city")?,
        state: get_str(document, "state")?,
        pincode: get_str(document, "pincode")?,
        beds: number_or(document, "beds", 0),
        rooms: number_or(document, "rooms", 0),
        status: opt_str(document, "status").unwrap_or_else(|| "active".to_string()),
        registered_at: get_date(document, "registeredAt")?,
    })
}

fn event_request_from_doc(document: &Document) -> Result<EventRequest, StoreError> {
    Ok(EventRequest {
        id: get_str(document, "_id")?,
        hospital_name: get_str(document, "hospitalName")?,
        hospital_address: get_str(document, "hospitalAddress")?,
        preferred_date: get_str(document, "preferredDate")?,
        contact_name: get_str(document, "contactName")?,
        contact_phone: get_str(document, "contactPhone")?,
        additional_details: opt_str(document, "additionalDetails"),
        created_at: get_date(document, "createdAt")?,
    })
}

fn donation_record_to_doc(record: &DonationRecord) -> Document {
    doc! {
        "_id": &record.id,
        "donorId": &record.donor_id,
        "donorName": &record.donor_name,
        "bloodType": record.blood_type.as_str(),
        "city": &record.city,
        "state": &record.state,
        "hospitalId": &record.hospital_id,
        "hospitalName": &record.hospital_name,
        "donationDate": bdt(record.donation_date),
        "unitsCollected": record.units_collected,
        "donationType": record.donation_type.as_str(),
        "donorAge": record.donor_age,
        "donorGender": record.donor_gender.as_str(),
        "isEmergency": record.is_emergency,
        "weather": record.weather.as_str(),
        "eventType": record.event_type.as_str(),
        "createdAt": bdt(record.created_at),
    }
}

fn request_record_to_doc(record: &RequestRecord) -> Document {
    doc! {
        "_id": &record.id,
        "requesterId": &record.requester_id,
        "requesterName": &record.requester_name,
        "bloodType": record.blood_type.as_str(),
        "city": &record.city,
        "state": &record.state,
        "hospitalId": &record.hospital_id,
        "hospitalName": &record.hospital_name,
        "requestDate": bdt(record.request_date),
        "unitsRequired": record.units_required,
        "urgencyLevel": record.urgency_level.as_str(),
        "patientAge": record.patient_age,
        "patientGender": record.patient_gender.as_str(),
        "medicalCondition": &record.medical_condition,
        "isFulfilled": record.is_fulfilled,
        "fulfilledDate": record.fulfilled_date.map(bdt).map(Bson::from).unwrap_or(Bson::Null),
        "fulfilledUnits": record.fulfilled_units,
        "createdAt": bdt(record.created_at),
    }
}

fn inventory_from_doc(document: &Document) -> Result<InventoryRow, StoreError> {
    Ok(InventoryRow {
        hospital_id: get_str(document, "hospitalId")?,
        blood_type: get_enum(document, "bloodType", BloodType::parse)?,
        current_stock: number_or(document, "currentStock", 0),
        last_updated: get_date(document, "lastUpdated")?,
        minimum_threshold: number_or(document, "minimumThreshold", DEFAULT_MINIMUM_THRESHOLD),
        maximum_capacity: number_or(document, "maximumCapacity", DEFAULT_MAXIMUM_CAPACITY),
    })
}

fn daily_bucket_from_doc(document: &Document) -> Result<DailyBucket, StoreError> {
    Ok(DailyBucket {
        date: get_str(document, "_id")?,
        count: get_number(document, "count")?,
        units: get_number(document, "units")?,
    })
}

fn group_bucket_from_doc(document: &Document) -> Result<GroupBucket, StoreError> {
    Ok(GroupBucket {
        key: get_str(document, "_id")?,
        donations: get_number(document, "donations")?,
        units: get_number(document, "units")?,
    })
}

fn trend_pipeline(date_field: &str, units_field: &str, since: DateTime<Utc>) -> Vec<Document> {
    vec![
        doc! { "$match": { date_field: { "$gte": bdt(since) } } },
        doc! { "$group": {
            "_id": { "$dateToString": { "format": "%Y-%m-%d", "date": format!("${date_field}") } },
            "count": { "$sum": 1 },
            "units": { "$sum": format!("${units_field}") },
        } },
        doc! { "$sort": { "_id": 1 } },
    ]
}

impl MongoStore {
    async fn upsert_hospital_once(
        &self,
        hospital: &Hospital,
    ) -> Result<(Hospital, bool), StoreError> {
        let coll = self.coll(HOSPITALS);
        let filter = doc! { "hospitalId": &hospital.hospital_id };
        // Existence check only decides the response message; the upsert below
        // is what guarantees a single document per hospitalId.
        let existed = coll.find_one(filter.clone()).await?.is_some();
        let stored = coll
            .find_one_and_update(
                filter,
                doc! {
                    "$set": hospital_fields(hospital),
                    // The filter equality materializes hospitalId on insert.
                    "$setOnInsert": {
                        "_id": &hospital.id,
                        "registeredAt": bdt(hospital.registered_at),
                    },
                },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?
            .ok_or_else(|| StoreError::Document("hospital upsert returned no document".into()))?;
        Ok((hospital_from_doc(&stored)?, existed))
    }

    async fn add_stock_once(
        &self,
        hospital_id: &str,
        blood_type: BloodType,
        units: i64,
    ) -> Result<InventoryRow, StoreError> {
        let row = self
            .coll(INVENTORY)
            .find_one_and_update(
                doc! { "hospitalId": hospital_id, "bloodType": blood_type.as_str() },
                doc! {
                    "$inc": { "currentStock": units },
                    "$set": { "lastUpdated": bdt(Utc::now()) },
                    "$setOnInsert": {
                        "minimumThreshold": DEFAULT_MINIMUM_THRESHOLD,
                        "maximumCapacity": DEFAULT_MAXIMUM_CAPACITY,
                    },
                },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?
            .ok_or_else(|| StoreError::Document("inventory upsert returned no document".into()))?;
        inventory_from_doc(&row)
    }

    async fn collect_buckets<T>(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        from_doc: impl Fn(&Document) -> Result<T, StoreError>,
    ) -> Result<Vec<T>, StoreError> {
        let mut cursor = self.coll(collection).aggregate(pipeline).await?;
        let mut out = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            out.push(from_doc(&document)?);
        }
        Ok(out)
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.coll(USERS).insert_one(user_to_doc(user)).await?;
        Ok(())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.coll(USERS)
            .find_one(doc! { "username": username })
            .await?
            .as_ref()
            .map(user_from_doc)
            .transpose()
    }

    async fn user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.coll(USERS)
            .find_one(doc! { "_id": id })
            .await?
            .as_ref()
            .map(user_from_doc)
            .transpose()
    }

    async fn next_donation_frequency(&self, user_id: &str) -> Result<i64, StoreError> {
        let updated = self
            .coll(USERS)
            .find_one_and_update(
                doc! { "_id": user_id },
                doc! { "$inc": { "donationCount": 1i64 } },
            )
            .return_document(ReturnDocument::After)
            .await?;
        match updated {
            Some(document) => get_number(&document, "donationCount"),
            None => Ok(1),
        }
    }

    async fn insert_donation(&self, donation: &Donation) -> Result<(), StoreError> {
        self.coll(DONATIONS)
            .insert_one(donation_to_doc(donation))
            .await?;
        Ok(())
    }

    async fn donations_for_donor(&self, donor: &str) -> Result<Vec<Donation>, StoreError> {
        let mut cursor = self.coll(DONATIONS).find(doc! { "donor": donor }).await?;
        let mut donations = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            donations.push(donation_from_doc(&document)?);
        }
        Ok(donations)
    }

    async fn upsert_hospital(&self, hospital: &Hospital) -> Result<(Hospital, bool), StoreError> {
        match self.upsert_hospital_once(hospital).await {
            Err(StoreError::Database(err)) if is_duplicate_key(&err) => {
                self.upsert_hospital_once(hospital).await
            }
            result => result,
        }
    }

    async fn hospital(&self, hospital_id: &str) -> Result<Option<Hospital>, StoreError> {
        self.coll(HOSPITALS)
            .find_one(doc! { "hospitalId": hospital_id })
            .await?
            .as_ref()
            .map(hospital_from_doc)
            .transpose()
    }

    async fn insert_contact(&self, message: &ContactMessage) -> Result<(), StoreError> {
        self.coll(CONTACTS)
            .insert_one(doc! {
                "_id": &message.id,
                "name": &message.name,
                "email": &message.email,
                "message": &message.message,
                "createdAt": bdt(message.created_at),
            })
            .await?;
        Ok(())
    }

    async fn insert_event_request(&self, request: &EventRequest) -> Result<(), StoreError> {
        self.coll(EVENT_REQUESTS)
            .insert_one(doc! {
                "_id": &request.id,
                "hospitalName": &request.hospital_name,
                "hospitalAddress": &request.hospital_address,
                "preferredDate": &request.preferred_date,
                "contactName": &request.contact_name,
                "contactPhone": &request.contact_phone,
                "additionalDetails": request.additional_details.as_deref().map(Bson::from).unwrap_or(Bson::Null),
                "createdAt": bdt(request.created_at),
            })
            .await?;
        Ok(())
    }

    async fn event_requests(&self) -> Result<Vec<EventRequest>, StoreError> {
        let mut cursor = self
            .coll(EVENT_REQUESTS)
            .find(doc! {})
            .sort(doc! { "createdAt": -1 })
            .await?;
        let mut requests = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            requests.push(event_request_from_doc(&document)?);
        }
        Ok(requests)
    }

    async fn insert_donation_record(&self, record: &DonationRecord) -> Result<(), StoreError> {
        self.coll(DONATION_RECORDS)
            .insert_one(donation_record_to_doc(record))
            .await?;
        Ok(())
    }

    async fn insert_request_record(&self, record: &RequestRecord) -> Result<(), StoreError> {
        self.coll(REQUEST_RECORDS)
            .insert_one(request_record_to_doc(record))
            .await?;
        Ok(())
    }

    async fn mark_request_fulfilled(
        &self,
        id: &str,
        units: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.coll(REQUEST_RECORDS)
            .update_one(
                doc! { "_id": id },
                doc! { "$set": {
                    "isFulfilled": true,
                    "fulfilledDate": bdt(at),
                    "fulfilledUnits": units,
                } },
            )
            .await?;
        Ok(())
    }

    async fn add_stock(
        &self,
        hospital_id: &str,
        blood_type: BloodType,
        units: i64,
    ) -> Result<InventoryRow, StoreError> {
        match self.add_stock_once(hospital_id, blood_type, units).await {
            Err(StoreError::Database(err)) if is_duplicate_key(&err) => {
                self.add_stock_once(hospital_id, blood_type, units).await
            }
            result => result,
        }
    }

    async fn reserve_stock(
        &self,
        hospital_id: &str,
        blood_type: BloodType,
        units: i64,
    ) -> Result<bool, StoreError> {
        // The stock guard lives in the filter, so the decrement and the check
        // are one atomic operation and the counter can never go negative.
        let result = self
            .coll(INVENTORY)
            .update_one(
                doc! {
                    "hospitalId": hospital_id,
                    "bloodType": blood_type.as_str(),
                    "currentStock": { "$gte": units },
                },
                doc! {
                    "$inc": { "currentStock": -units },
                    "$set": { "lastUpdated": bdt(Utc::now()) },
                },
            )
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn stock_level(
        &self,
        hospital_id: &str,
        blood_type: BloodType,
    ) -> Result<i64, StoreError> {
        let row = self
            .coll(INVENTORY)
            .find_one(doc! { "hospitalId": hospital_id, "bloodType": blood_type.as_str() })
            .await?;
        Ok(row.map(|d| number_or(&d, "currentStock", 0)).unwrap_or(0))
    }

    async fn hospital_inventory(&self, hospital_id: &str) -> Result<Vec<InventoryRow>, StoreError> {
        let mut cursor = self
            .coll(INVENTORY)
            .find(doc! { "hospitalId": hospital_id })
            .sort(doc! { "bloodType": 1 })
            .await?;
        let mut rows = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            rows.push(inventory_from_doc(&document)?);
        }
        Ok(rows)
    }

    async fn donations_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError> {
        let count = self
            .coll(DONATION_RECORDS)
            .count_documents(doc! { "donationDate": { "$gte": bdt(since) } })
            .await?;
        Ok(count as i64)
    }

    async fn requests_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError> {
        let count = self
            .coll(REQUEST_RECORDS)
            .count_documents(doc! { "requestDate": { "$gte": bdt(since) } })
            .await?;
        Ok(count as i64)
    }

    async fn donation_trend(&self, since: DateTime<Utc>) -> Result<Vec<DailyBucket>, StoreError> {
        self.collect_buckets(
            DONATION_RECORDS,
            trend_pipeline("donationDate", "unitsCollected", since),
            daily_bucket_from_doc,
        )
        .await
    }

    async fn request_trend(&self, since: DateTime<Utc>) -> Result<Vec<DailyBucket>, StoreError> {
        self.collect_buckets(
            REQUEST_RECORDS,
            trend_pipeline("requestDate", "unitsRequired", since),
            daily_bucket_from_doc,
        )
        .await
    }

    async fn blood_type_distribution(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<GroupBucket>, StoreError> {
        self.collect_buckets(
            DONATION_RECORDS,
            vec![
                doc! { "$match": { "donationDate": { "$gte": bdt(since) } } },
                doc! { "$group": {
                    "_id": "$bloodType",
                    "donations": { "$sum": 1 },
                    "units": { "$sum": "$unitsCollected" },
                } },
            ],
            group_bucket_from_doc,
        )
        .await
    }

    async fn city_distribution(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<GroupBucket>, StoreError> {
        self.collect_buckets(
            DONATION_RECORDS,
            vec![
                doc! { "$match": { "donationDate": { "$gte": bdt(since) } } },
                doc! { "$group": {
                    "_id": "$city",
                    "donations": { "$sum": 1 },
                    "units": { "$sum": "$unitsCollected" },
                } },
                doc! { "$sort": { "units": -1 } },
                doc! { "$limit": limit },
            ],
            group_bucket_from_doc,
        )
        .await
    }

    async fn critical_request_count(&self) -> Result<i64, StoreError> {
        let count = self
            .coll(REQUEST_RECORDS)
            .count_documents(doc! {
                "isFulfilled": false,
                "urgencyLevel": { "$in": [Urgency::High.as_str(), Urgency::Critical.as_str()] },
            })
            .await?;
        Ok(count as i64)
    }
}
