// lib/src/services/seed.rs

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use models::medical::{Identity, MedicalRecord, NewMedicalRecord, RecordType, User};
use models::AadhaarNumber;

use crate::errors::{Result, ServiceError, StoreError};
use crate::storage_engine::Datastore;

pub const DEMO_PATIENT_NAME: &str = "Demo Patient";
pub const DEMO_AADHAAR: &str = "123456789012";

struct DemoRecord {
    id: &'static str,
    record_type: RecordType,
    title: &'static str,
    date: (i32, u32, u32),
    hospital: &'static str,
    doctor: &'static str,
}

const DEMO_RECORDS: [DemoRecord; 5] = [
    DemoRecord {
        id: "rec-001",
        record_type: RecordType::LabReport,
        title: "Complete Blood Count (CBC)",
        date: (2023, 10, 15),
        hospital: "City General Hospital",
        doctor: "Dr. Sharma",
    },
    DemoRecord {
        id: "rec-002",
        record_type: RecordType::Prescription,
        title: "General Medicine Prescription",
        date: (2023, 11, 5),
        hospital: "Apollo Clinic",
        doctor: "Dr. Patel",
    },
    DemoRecord {
        id: "rec-003",
        record_type: RecordType::Imaging,
        title: "Chest X-Ray Report",
        date: (2023, 9, 22),
        hospital: "City General Hospital",
        doctor: "Dr. Kumar",
    },
    DemoRecord {
        id: "rec-004",
        record_type: RecordType::DischargeSummary,
        title: "Post-Surgery Discharge",
        date: (2023, 8, 10),
        hospital: "Max Super Speciality Hospital",
        doctor: "Dr. Singh",
    },
    DemoRecord {
        id: "rec-005",
        record_type: RecordType::Vaccination,
        title: "COVID-19 Vaccination Certificate",
        date: (2023, 6, 30),
        hospital: "Government Vaccination Center",
        doctor: "Dr. Gupta",
    },
];

/// Ensures the demo patient and its five records exist. Safe to run on
/// every start; nothing already present is touched.
pub async fn seed_demo_data(store: &Arc<dyn Datastore>, now: DateTime<Utc>) -> Result<User> {
    let identity = Identity::Aadhaar(AadhaarNumber::new(DEMO_AADHAAR)?);
    let patient = match store.find_user_by_identity(&identity).await? {
        Some(user) => user,
        None => {
            let user = User::new(DEMO_PATIENT_NAME, identity.clone(), now);
            match store.insert_user(&user).await {
                Ok(()) => user,
                Err(StoreError::Conflict(_)) => store
                    .find_user_by_identity(&identity)
                    .await?
                    .ok_or_else(|| ServiceError::Internal("demo patient vanished while seeding".to_string()))?,
                Err(e) => return Err(e.into()),
            }
        }
    };

    let mut inserted = 0;
    for demo in &DEMO_RECORDS {
        if store.get_record(demo.id).await?.is_some() {
            continue;
        }
        let (y, m, d) = demo.date;
        let date = NaiveDate::from_ymd_opt(y, m, d)
            .ok_or_else(|| ServiceError::Internal(format!("bad demo date for {}", demo.id)))?;
        let mut record = MedicalRecord::new(
            patient.id.as_str(),
            NewMedicalRecord {
                record_type: demo.record_type,
                title: demo.title.to_string(),
                date,
                hospital: Some(demo.hospital.to_string()),
                doctor: Some(demo.doctor.to_string()),
                notes: None,
            },
            now,
        );
        record.id = demo.id.to_string();
        store.insert_record(&record).await?;
        inserted += 1;
    }
    if inserted > 0 {
        info!("Seeded {} demo record(s) for {}", inserted, patient.id);
    }
    Ok(patient)
}
