//! Document types shared by the HTTP layer and the store.
//!
//! Field names serialize exactly as the API exposes them (camelCase for the
//! real-time records and hospitals, snake_case for the legacy donation log),
//! so the same structs double as response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! closed_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant,)+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

closed_enum!(BloodType {
    OPositive => "O+",
    APositive => "A+",
    BPositive => "B+",
    AbPositive => "AB+",
    ONegative => "O-",
    ANegative => "A-",
    BNegative => "B-",
    AbNegative => "AB-",
});

closed_enum!(DonationType {
    WholeBlood => "whole_blood",
    Platelets => "platelets",
    Plasma => "plasma",
    RedCells => "red_cells",
});

closed_enum!(Urgency {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

closed_enum!(Gender {
    Male => "male",
    Female => "female",
    Other => "other",
});

closed_enum!(Weather {
    Sunny => "sunny",
    Rainy => "rainy",
    Cloudy => "cloudy",
    Stormy => "stormy",
    Cold => "cold",
});

closed_enum!(EventKind {
    Regular => "regular",
    Camp => "camp",
    Emergency => "emergency",
    Festival => "festival",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub fullname: String,
    pub username: String,
    /// bcrypt hash, never serialized back to clients.
    #[serde(skip_serializing)]
    pub password: String,
    pub phone: String,
    pub address: String,
    #[serde(rename = "preferredHospital")]
    pub preferred_hospital: Option<String>,
    /// Lifetime donation counter, bumped atomically per recorded donation.
    #[serde(skip)]
    pub donation_count: i64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Legacy donation log entry written by `POST /api/donate`. Blood type is a
/// free-form string here; only the real-time records constrain it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donation {
    pub id: String,
    pub donor: String,
    pub blood_type: String,
    pub units: i64,
    pub donation_date: DateTime<Utc>,
    pub hospital: String,
    pub frequency: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hospital {
    pub id: String,
    pub hospital_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub beds: i64,
    pub rooms: i64,
    pub status: String,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessage {
    pub id: String,
    pub name: String,
    pub email: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    pub id: String,
    pub hospital_name: String,
    pub hospital_address: String,
    pub preferred_date: String,
    pub contact_name: String,
    pub contact_phone: String,
    pub additional_details: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationRecord {
    pub id: String,
    pub donor_id: String,
    pub donor_name: String,
    pub blood_type: BloodType,
    pub city: String,
    pub state: String,
    pub hospital_id: String,
    pub hospital_name: String,
    pub donation_date: DateTime<Utc>,
    pub units_collected: i64,
    pub donation_type: DonationType,
    pub donor_age: i64,
    pub donor_gender: Gender,
    pub is_emergency: bool,
    pub weather: Weather,
    pub event_type: EventKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub id: String,
    pub requester_id: String,
    pub requester_name: String,
    pub blood_type: BloodType,
    pub city: String,
    pub state: String,
    pub hospital_id: String,
    pub hospital_name: String,
    pub request_date: DateTime<Utc>,
    pub units_required: i64,
    pub urgency_level: Urgency,
    pub patient_age: i64,
    pub patient_gender: Gender,
    pub medical_condition: String,
    pub is_fulfilled: bool,
    pub fulfilled_date: Option<DateTime<Utc>>,
    pub fulfilled_units: i64,
    pub created_at: DateTime<Utc>,
}

/// One stock counter per (hospitalId, bloodType) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRow {
    pub hospital_id: String,
    pub blood_type: BloodType,
    pub current_stock: i64,
    pub last_updated: DateTime<Utc>,
    pub minimum_threshold: i64,
    pub maximum_capacity: i64,
}

pub const DEFAULT_MINIMUM_THRESHOLD: i64 = 10;
pub const DEFAULT_MAXIMUM_CAPACITY: i64 = 100;

impl InventoryRow {
    pub fn empty(hospital_id: &str, blood_type: BloodType) -> Self {
        Self {
            hospital_id: hospital_id.to_string(),
            blood_type,
            current_stock: 0,
            last_updated: Utc::now(),
            minimum_threshold: DEFAULT_MINIMUM_THRESHOLD,
            maximum_capacity: DEFAULT_MAXIMUM_CAPACITY,
        }
    }
}

/// One day of the weekly dashboard trend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyBucket {
    pub date: String,
    pub count: i64,
    pub units: i64,
}

/// One blood-type or city group of the monthly dashboard distributions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupBucket {
    pub key: String,
    pub donations: i64,
    pub units: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blood_type_round_trips_through_wire_names() {
        for text in ["O+", "A+", "B+", "AB+", "O-", "A-", "B-", "AB-"] {
            let parsed = BloodType::parse(text).unwrap();
            assert_eq!(parsed.as_str(), text);
            let json = serde_json::to_string(&parsed).unwrap();
            assert_eq!(json, format!("\"{text}\""));
        }
        assert!(BloodType::parse("C+").is_none());
    }

    #[test]
    fn password_is_never_serialized() {
        let user = User {
            id: "u1".into(),
            fullname: "Test User".into(),
            username: "test".into(),
            password: "$2b$10$secret".into(),
            phone: "123".into(),
            address: "nowhere".into(),
            preferred_hospital: None,
            donation_count: 0,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("password"));
    }
}
