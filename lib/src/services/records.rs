// lib/src/services/records.rs

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use models::errors::ValidationError;
use models::medical::{
    validate_upload, AccessAction, AccessContext, AccessWindow, AccessLogEntry, FileAttachment, GrantAccess, MedicalRecord,
    NewMedicalRecord, RecordType, RecordUpdate, SharedGrant, StoredFile,
};

use crate::clock::Clock;
use crate::errors::{Result, ServiceError};
use crate::services::access_log::AccessLogRecorder;
use crate::storage_engine::{edit, BlobStorage, Datastore};

fn visible(record: Option<MedicalRecord>) -> Option<MedicalRecord> {
    record.filter(|r| !r.pending_deletion)
}

fn newest_first(records: &mut [MedicalRecord]) {
    records.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
}

/// A downloaded attachment: its metadata row and the bytes.
#[derive(Debug, Clone)]
pub struct FileDownload {
    pub file: StoredFile,
    pub bytes: Vec<u8>,
}

/// Owner-scoped record CRUD, attachments and per-user grants.
#[derive(Clone)]
pub struct RecordService {
    store: Arc<dyn Datastore>,
    blobs: Arc<dyn BlobStorage>,
    log: AccessLogRecorder,
    clock: Arc<dyn Clock>,
    max_file_size: u64,
}

impl RecordService {
    pub fn new(
        store: Arc<dyn Datastore>,
        blobs: Arc<dyn BlobStorage>,
        log: AccessLogRecorder,
        clock: Arc<dyn Clock>,
        max_file_size: u64,
    ) -> Self {
        RecordService { store, blobs, log, clock, max_file_size }
    }

    async fn load_visible(&self, id: &str) -> Result<MedicalRecord> {
        visible(self.store.get_record(id).await?).ok_or_else(|| ServiceError::not_found("Record"))
    }

    /// The record, provided `user` owns it.
    async fn load_owned(&self, user: &str, id: &str, action: &str) -> Result<MedicalRecord> {
        let record = self.load_visible(id).await?;
        if !record.is_owned_by(user) {
            warn!("User {} denied {} on record {}", user, action, id);
            return Err(ServiceError::forbidden(format!("Not authorized to {} this record", action)));
        }
        Ok(record)
    }

    pub async fn list_records(&self, user: &str, ctx: &AccessContext) -> Result<Vec<MedicalRecord>> {
        let mut records: Vec<MedicalRecord> = self
            .store
            .records_by_owner(user)
            .await?
            .into_iter()
            .filter(|r| !r.pending_deletion)
            .collect();
        newest_first(&mut records);
        self.log
            .record(
                AccessLogEntry::new(user, AccessAction::RecordViewed, ctx, self.clock.now())
                    .by(user)
                    .details("Viewed all records"),
            )
            .await?;
        Ok(records)
    }

    /// Own records of one category. The category name is matched loosely.
    pub async fn records_by_category(&self, user: &str, category: &str) -> Result<Vec<MedicalRecord>> {
        let wanted: RecordType = category.parse()?;
        let mut records: Vec<MedicalRecord> = self
            .store
            .records_by_owner(user)
            .await?
            .into_iter()
            .filter(|r| !r.pending_deletion && r.record_type == wanted)
            .collect();
        newest_first(&mut records);
        Ok(records)
    }

    pub async fn get_record(&self, user: &str, id: &str, ctx: &AccessContext) -> Result<MedicalRecord> {
        let now = self.clock.now();
        let record = self.load_visible(id).await?;
        if !record.can_be_read_by(user, now) {
            warn!("User {} denied read on record {}", user, id);
            return Err(ServiceError::forbidden("Not authorized to access this record"));
        }
        self.log
            .record(
                AccessLogEntry::new(&record.owner, AccessAction::RecordViewed, ctx, now)
                    .by(user)
                    .on_record(&record.id)
                    .details(format!("Viewed record: {}", record.title)),
            )
            .await?;
        Ok(record)
    }

    pub async fn create_record(&self, user: &str, input: NewMedicalRecord, ctx: &AccessContext) -> Result<MedicalRecord> {
        input.validate()?;
        let now = self.clock.now();
        let record = MedicalRecord::new(user, input, now);
        self.store.insert_record(&record).await?;
        info!("User {} created record {}", user, record.id);
        self.log
            .record(
                AccessLogEntry::new(user, AccessAction::RecordCreated, ctx, now)
                    .by(user)
                    .on_record(&record.id)
                    .details(format!("Created record: {}", record.title)),
            )
            .await?;
        Ok(record)
    }

    pub async fn update_record(
        &self,
        user: &str,
        id: &str,
        update: RecordUpdate,
        ctx: &AccessContext,
    ) -> Result<MedicalRecord> {
        self.load_owned(user, id, "update").await?;
        let now = self.clock.now();
        let record = self
            .store
            .update_record_with(
                id,
                edit(move |record: &mut MedicalRecord| {
                    if record.pending_deletion {
                        return Err(ServiceError::not_found("Record"));
                    }
                    record.apply(update.clone(), now)?;
                    Ok(())
                }),
            )
            .await?
            .ok_or_else(|| ServiceError::not_found("Record"))?;
        self.log
            .record(
                AccessLogEntry::new(user, AccessAction::RecordUpdated, ctx, now)
                    .by(user)
                    .on_record(&record.id)
                    .details(format!("Updated record: {}", record.title)),
            )
            .await?;
        Ok(record)
    }

    /// Two-phase delete: tombstone, then remove blobs, file rows and the
    /// record row. A failure in the second phase is left to the purge.
    pub async fn delete_record(&self, user: &str, id: &str, ctx: &AccessContext) -> Result<()> {
        self.load_owned(user, id, "delete").await?;
        let now = self.clock.now();
        let record = self
            .store
            .update_record_with(
                id,
                edit(|record: &mut MedicalRecord| {
                    record.pending_deletion = true;
                    Ok(())
                }),
            )
            .await?
            .ok_or_else(|| ServiceError::not_found("Record"))?;

        self.log
            .record(
                AccessLogEntry::new(user, AccessAction::RecordDeleted, ctx, now)
                    .by(user)
                    .on_record(&record.id)
                    .details(format!("Deleted record: {}", record.title)),
            )
            .await?;

        if let Err(e) = self.finish_deletion(&record).await {
            warn!("Record {} left tombstoned, purge will retry: {}", record.id, e);
            return Ok(());
        }
        info!("User {} deleted record {}", user, record.id);

        // Retry tombstones an earlier delete of this owner left behind.
        for stale in self.store.records_by_owner(user).await? {
            if stale.pending_deletion {
                if let Err(e) = self.finish_deletion(&stale).await {
                    warn!("Retrying deletion of record {} failed: {}", stale.id, e);
                }
            }
        }
        Ok(())
    }

    async fn finish_deletion(&self, record: &MedicalRecord) -> Result<()> {
        for attachment in &record.files {
            self.blobs.delete_blob(&record.owner, &attachment.filename).await?;
            self.store.delete_file(&attachment.file_id).await?;
        }
        self.store.delete_record(&record.id).await?;
        Ok(())
    }

    /// Completes every interrupted delete. Returns how many records were
    /// removed.
    pub async fn purge_pending_deletions(&self) -> Result<usize> {
        let mut purged = 0;
        for record in self.store.pending_deletions().await? {
            match self.finish_deletion(&record).await {
                Ok(()) => purged += 1,
                Err(e) => warn!("Could not purge record {}: {}", record.id, e),
            }
        }
        if purged > 0 {
            info!("Purged {} tombstoned record(s)", purged);
        }
        Ok(purged)
    }

    pub async fn attach_file(
        &self,
        user: &str,
        record_id: &str,
        original_name: &str,
        content_type: &str,
        bytes: &[u8],
        ctx: &AccessContext,
    ) -> Result<FileAttachment> {
        let record = self.load_owned(user, record_id, "upload to").await?;
        if bytes.is_empty() {
            return Err(ValidationError::MissingField("file").into());
        }
        if bytes.len() as u64 > self.max_file_size {
            return Err(ServiceError::PayloadTooLarge { limit: self.max_file_size });
        }
        validate_upload(original_name, content_type)?;

        let now = self.clock.now();
        let file = StoredFile::new(user, record_id, original_name, content_type, bytes.len() as u64, now);
        self.blobs.put_blob(user, &file.filename, bytes).await?;
        self.store.insert_file(&file).await?;

        let attachment = file.attachment();
        let pushed = attachment.clone();
        let updated = self
            .store
            .update_record_with(
                record_id,
                edit(move |record: &mut MedicalRecord| {
                    if record.pending_deletion {
                        return Err(ServiceError::not_found("Record"));
                    }
                    record.files.push(pushed.clone());
                    record.updated_at = now;
                    Ok(())
                }),
            )
            .await;
        if !matches!(updated, Ok(Some(_))) {
            self.blobs.delete_blob(user, &file.filename).await?;
            self.store.delete_file(&file.id).await?;
            updated?;
            return Err(ServiceError::not_found("Record"));
        }

        self.log
            .record(
                AccessLogEntry::new(user, AccessAction::FileUploaded, ctx, now)
                    .by(user)
                    .on_record(record_id)
                    .details(format!("Uploaded file: {} to record: {}", original_name, record.title)),
            )
            .await?;
        Ok(attachment)
    }

    pub async fn download_file(
        &self,
        user: &str,
        record_id: &str,
        file_id: &str,
        ctx: &AccessContext,
    ) -> Result<FileDownload> {
        let now = self.clock.now();
        let record = self.load_visible(record_id).await?;
        if !record.can_be_downloaded_by(user, now) {
            warn!("User {} denied download on record {}", user, record_id);
            return Err(ServiceError::forbidden("Not authorized to access this file"));
        }
        let file = self
            .store
            .get_file(file_id)
            .await?
            .filter(|f| f.record == record.id)
            .ok_or_else(|| ServiceError::not_found("File"))?;
        let bytes = self
            .blobs
            .get_blob(&file.owner, &file.filename)
            .await?
            .ok_or_else(|| ServiceError::not_found("File"))?;

        self.log
            .record(
                AccessLogEntry::new(&record.owner, AccessAction::FileDownloaded, ctx, now)
                    .by(user)
                    .on_record(&record.id)
                    .details(format!("Downloaded file: {} from record: {}", file.original_name, record.title)),
            )
            .await?;
        Ok(FileDownload { file, bytes })
    }

    pub async fn delete_file(&self, user: &str, record_id: &str, file_id: &str, ctx: &AccessContext) -> Result<()> {
        let record = self.load_owned(user, record_id, "delete files from").await?;
        let file = self
            .store
            .get_file(file_id)
            .await?
            .filter(|f| f.record == record.id)
            .ok_or_else(|| ServiceError::not_found("File"))?;

        let now = self.clock.now();
        let detached = file.id.clone();
        self.store
            .update_record_with(
                record_id,
                edit(move |record: &mut MedicalRecord| {
                    record.files.retain(|f| f.file_id != detached);
                    record.updated_at = now;
                    Ok(())
                }),
            )
            .await?;
        self.blobs.delete_blob(&file.owner, &file.filename).await?;
        self.store.delete_file(&file.id).await?;

        self.log
            .record(
                AccessLogEntry::new(user, AccessAction::FileDeleted, ctx, now)
                    .by(user)
                    .on_record(record_id)
                    .details(format!("Deleted file: {} from record: {}", file.original_name, record.title)),
            )
            .await?;
        Ok(())
    }

    /// Grants `grantee` access to one record. `expires_at: None` means the
    /// grant lasts until revoked.
    pub async fn share_with_user(
        &self,
        owner: &str,
        record_id: &str,
        grantee: &str,
        access_type: GrantAccess,
        expires_at: Option<DateTime<Utc>>,
        ctx: &AccessContext,
    ) -> Result<SharedGrant> {
        self.load_owned(owner, record_id, "share").await?;
        let now = self.clock.now();
        if matches!(expires_at, Some(at) if at <= now) {
            return Err(ValidationError::ExpiryInPast.into());
        }
        let grantee_user = self
            .store
            .get_user(grantee)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))?;

        let grant = SharedGrant {
            grantee: grantee_user.id.clone(),
            access_type,
            expires_at: expires_at.map(AccessWindow::until).unwrap_or_else(AccessWindow::permanent),
            granted_at: now,
        };
        let added = grant.clone();
        let record = self
            .store
            .update_record_with(
                record_id,
                edit(move |record: &mut MedicalRecord| {
                    record.add_grant(added.clone(), now)?;
                    Ok(())
                }),
            )
            .await?
            .ok_or_else(|| ServiceError::not_found("Record"))?;

        info!("User {} shared record {} with {}", owner, record_id, grantee_user.id);
        self.log
            .record(
                AccessLogEntry::new(owner, AccessAction::GrantCreated, ctx, now)
                    .by(owner)
                    .on_record(record_id)
                    .details(format!("Shared record: {} with user: {}", record.title, grantee_user.name)),
            )
            .await?;
        Ok(grant)
    }

    /// Removing a grant that does not exist succeeds without a log entry.
    pub async fn revoke_grant(&self, owner: &str, record_id: &str, grantee: &str, ctx: &AccessContext) -> Result<()> {
        let current = self.load_owned(owner, record_id, "modify sharing for").await?;
        if current.shared_with.iter().all(|g| g.grantee != grantee) {
            return Ok(());
        }
        let now = self.clock.now();
        let target = grantee.to_string();
        let record = self
            .store
            .update_record_with(
                record_id,
                edit(move |record: &mut MedicalRecord| {
                    record.remove_grant(&target, now);
                    Ok(())
                }),
            )
            .await?
            .ok_or_else(|| ServiceError::not_found("Record"))?;
        self.log
            .record(
                AccessLogEntry::new(owner, AccessAction::GrantRevoked, ctx, now)
                    .by(owner)
                    .on_record(record_id)
                    .details(format!("Revoked access to record: {} for user ID: {}", record.title, grantee)),
            )
            .await?;
        Ok(())
    }

    pub async fn shared_by_me(&self, owner: &str) -> Result<Vec<MedicalRecord>> {
        let mut records: Vec<MedicalRecord> = self
            .store
            .records_by_owner(owner)
            .await?
            .into_iter()
            .filter(|r| !r.pending_deletion && r.is_shared)
            .collect();
        newest_first(&mut records);
        Ok(records)
    }

    /// Records other users shared with `user` through a grant that is still live.
    pub async fn shared_with_me(&self, user: &str) -> Result<Vec<MedicalRecord>> {
        let now = self.clock.now();
        let mut records: Vec<MedicalRecord> = self
            .store
            .records_shared_with(user)
            .await?
            .into_iter()
            .filter(|r| !r.pending_deletion && r.live_grant_for(user, now).is_some())
            .collect();
        newest_first(&mut records);
        Ok(records)
    }

    /// Fails `Forbidden` unless every id names a live record owned by `owner`.
    pub async fn ensure_owned(&self, owner: &str, ids: &[String]) -> Result<()> {
        let found = self.store.get_records(ids).await?;
        let owned: HashSet<&str> = found
            .iter()
            .filter(|r| !r.pending_deletion && r.is_owned_by(owner))
            .map(|r| r.id.as_str())
            .collect();
        if ids.iter().all(|id| owned.contains(id.as_str())) {
            Ok(())
        } else {
            warn!("User {} referenced records they do not own", owner);
            Err(ServiceError::forbidden("You can only include your own records"))
        }
    }

    pub async fn flag_emergency_accessible(&self, ids: &[String]) -> Result<()> {
        let now = self.clock.now();
        for id in ids {
            self.store
                .update_record_with(
                    id,
                    edit(move |record: &mut MedicalRecord| {
                        record.is_emergency_accessible = true;
                        record.updated_at = now;
                        Ok(())
                    }),
                )
                .await?;
        }
        Ok(())
    }

    /// Looks up token-referenced records in token order. Ids whose record is
    /// gone are returned separately instead of failing the lookup.
    pub async fn records_for_token(&self, ids: &[String]) -> Result<(Vec<MedicalRecord>, Vec<String>)> {
        let found: Vec<MedicalRecord> = self
            .store
            .get_records(ids)
            .await?
            .into_iter()
            .filter(|r| !r.pending_deletion)
            .collect();
        let present: HashSet<&str> = found.iter().map(|r| r.id.as_str()).collect();
        let missing = ids
            .iter()
            .filter(|id| !present.contains(id.as_str()))
            .cloned()
            .collect();
        Ok((found, missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::AppConfig;
    use crate::services::{seed, Services};
    use crate::storage_engine::Storage;
    use chrono::{Duration, NaiveDate, TimeZone};
    use models::identifiers::AadhaarNumber;
    use models::medical::{Identity, User};

    struct Fixture {
        services: Services,
        clock: Arc<ManualClock>,
        patient: User,
        doctor: User,
        ctx: AccessContext,
    }

    async fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()));
        let mut config = AppConfig::default();
        config.uploads.max_file_size = 16;
        let services = Services::new(Storage::in_memory(), &config, clock.clone());
        let patient = seed::seed_demo_data(&services.store, clock.now()).await.unwrap();
        let doctor = User::new(
            "Dr. Rao",
            Identity::Aadhaar(AadhaarNumber::new("987654321098").unwrap()),
            clock.now(),
        );
        services.store.insert_user(&doctor).await.unwrap();
        Fixture {
            services,
            clock,
            patient,
            doctor,
            ctx: AccessContext::default(),
        }
    }

    fn ids(records: &[MedicalRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test]
    async fn should_list_own_records_newest_first() {
        let f = fixture().await;
        let records = f.services.records.list_records(&f.patient.id, &f.ctx).await.unwrap();
        assert_eq!(ids(&records), vec!["rec-002", "rec-001", "rec-003", "rec-004", "rec-005"]);

        let labs = f.services.records.records_by_category(&f.patient.id, "lab-report").await.unwrap();
        assert_eq!(ids(&labs), vec!["rec-001"]);
        assert!(f.services.records.records_by_category(&f.patient.id, "x-ray").await.is_err());

        assert!(f.services.records.list_records(&f.doctor.id, &f.ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_keep_strangers_out_until_granted() {
        let f = fixture().await;
        let records = &f.services.records;
        assert!(matches!(
            records.get_record(&f.doctor.id, "rec-001", &f.ctx).await,
            Err(ServiceError::Forbidden(_))
        ));

        let until = f.clock.now() + Duration::minutes(30);
        records
            .share_with_user(&f.patient.id, "rec-001", &f.doctor.id, GrantAccess::View, Some(until), &f.ctx)
            .await
            .unwrap();
        assert_eq!(records.get_record(&f.doctor.id, "rec-001", &f.ctx).await.unwrap().id, "rec-001");
        assert_eq!(ids(&records.shared_with_me(&f.doctor.id).await.unwrap()), vec!["rec-001"]);
        assert_eq!(ids(&records.shared_by_me(&f.patient.id).await.unwrap()), vec!["rec-001"]);

        f.clock.advance(Duration::minutes(30));
        assert!(matches!(
            records.get_record(&f.doctor.id, "rec-001", &f.ctx).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(records.shared_with_me(&f.doctor.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_reject_bad_grants() {
        let f = fixture().await;
        let records = &f.services.records;
        let past = f.clock.now() - Duration::minutes(1);
        assert!(matches!(
            records
                .share_with_user(&f.patient.id, "rec-001", &f.doctor.id, GrantAccess::View, Some(past), &f.ctx)
                .await,
            Err(ServiceError::Validation(ValidationError::ExpiryInPast))
        ));
        assert!(matches!(
            records
                .share_with_user(&f.patient.id, "rec-001", "nobody", GrantAccess::View, None, &f.ctx)
                .await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            records
                .share_with_user(&f.doctor.id, "rec-001", &f.patient.id, GrantAccess::View, None, &f.ctx)
                .await,
            Err(ServiceError::Forbidden(_))
        ));

        records
            .share_with_user(&f.patient.id, "rec-002", &f.doctor.id, GrantAccess::Download, None, &f.ctx)
            .await
            .unwrap();
        assert!(matches!(
            records
                .share_with_user(&f.patient.id, "rec-002", &f.doctor.id, GrantAccess::View, None, &f.ctx)
                .await,
            Err(ServiceError::Validation(ValidationError::AlreadyShared))
        ));

        records.revoke_grant(&f.patient.id, "rec-002", &f.doctor.id, &f.ctx).await.unwrap();
        records.revoke_grant(&f.patient.id, "rec-002", &f.doctor.id, &f.ctx).await.unwrap();
        let revocations = f
            .services
            .log
            .entries_for(&f.patient.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.action == AccessAction::GrantRevoked)
            .count();
        assert_eq!(revocations, 1);
    }

    #[tokio::test]
    async fn should_update_only_own_records() {
        let f = fixture().await;
        let records = &f.services.records;
        let update = RecordUpdate {
            title: Some("CBC (repeat)".into()),
            date: Some(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
            ..RecordUpdate::default()
        };
        assert!(matches!(
            records.update_record(&f.doctor.id, "rec-001", update.clone(), &f.ctx).await,
            Err(ServiceError::Forbidden(_))
        ));
        let updated = records.update_record(&f.patient.id, "rec-001", update, &f.ctx).await.unwrap();
        assert_eq!(updated.title, "CBC (repeat)");
        assert_eq!(updated.hospital.as_deref(), Some("City General Hospital"));

        let blank = RecordUpdate { title: Some("  ".into()), ..RecordUpdate::default() };
        assert!(matches!(
            records.update_record(&f.patient.id, "rec-001", blank, &f.ctx).await,
            Err(ServiceError::Validation(ValidationError::MissingField("title")))
        ));
    }

    #[tokio::test]
    async fn should_store_and_serve_attachments() {
        let f = fixture().await;
        let records = &f.services.records;
        let attachment = records
            .attach_file(&f.patient.id, "rec-003", "chest.png", "image/png", b"png-bytes", &f.ctx)
            .await
            .unwrap();
        assert!(attachment.filename.ends_with(".png"));
        assert_eq!(attachment.file_size, 9);

        let download = records
            .download_file(&f.patient.id, "rec-003", &attachment.file_id, &f.ctx)
            .await
            .unwrap();
        assert_eq!(download.bytes, b"png-bytes");
        assert_eq!(download.file.original_name, "chest.png");

        assert!(matches!(
            records.download_file(&f.doctor.id, "rec-003", &attachment.file_id, &f.ctx).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            records.download_file(&f.patient.id, "rec-001", &attachment.file_id, &f.ctx).await,
            Err(ServiceError::NotFound(_))
        ));

        records
            .delete_file(&f.patient.id, "rec-003", &attachment.file_id, &f.ctx)
            .await
            .unwrap();
        assert!(f.services.store.get_file(&attachment.file_id).await.unwrap().is_none());
        assert!(f
            .services
            .blobs
            .get_blob(&f.patient.id, &attachment.filename)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn should_refuse_oversized_empty_and_foreign_uploads() {
        let f = fixture().await;
        let records = &f.services.records;
        assert!(matches!(
            records
                .attach_file(&f.patient.id, "rec-001", "big.pdf", "application/pdf", &[0u8; 17], &f.ctx)
                .await,
            Err(ServiceError::PayloadTooLarge { limit: 16 })
        ));
        assert!(matches!(
            records
                .attach_file(&f.patient.id, "rec-001", "empty.pdf", "application/pdf", b"", &f.ctx)
                .await,
            Err(ServiceError::Validation(ValidationError::MissingField("file")))
        ));
        assert!(matches!(
            records
                .attach_file(&f.patient.id, "rec-001", "run.exe", "application/x-msdownload", b"MZ", &f.ctx)
                .await,
            Err(ServiceError::Validation(ValidationError::UnsupportedFileType))
        ));
        assert!(matches!(
            records
                .attach_file(&f.doctor.id, "rec-001", "note.txt", "text/plain", b"hi", &f.ctx)
                .await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn should_delete_record_with_its_files() {
        let f = fixture().await;
        let records = &f.services.records;
        let attachment = records
            .attach_file(&f.patient.id, "rec-004", "summary.pdf", "application/pdf", b"%PDF", &f.ctx)
            .await
            .unwrap();

        records.delete_record(&f.patient.id, "rec-004", &f.ctx).await.unwrap();
        assert!(f.services.store.get_record("rec-004").await.unwrap().is_none());
        assert!(f.services.store.get_file(&attachment.file_id).await.unwrap().is_none());
        assert!(matches!(
            records.get_record(&f.patient.id, "rec-004", &f.ctx).await,
            Err(ServiceError::NotFound(_))
        ));
        assert_eq!(records.purge_pending_deletions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn should_hide_and_purge_tombstoned_records() {
        let f = fixture().await;
        let records = &f.services.records;
        f.services
            .store
            .update_record_with(
                "rec-005",
                edit(|record: &mut MedicalRecord| {
                    record.pending_deletion = true;
                    Ok(())
                }),
            )
            .await
            .unwrap();

        let listed = records.list_records(&f.patient.id, &f.ctx).await.unwrap();
        assert!(!ids(&listed).contains(&"rec-005"));
        let (found, missing) = records
            .records_for_token(&["rec-005".to_string(), "rec-001".to_string()])
            .await
            .unwrap();
        assert_eq!(ids(&found), vec!["rec-001"]);
        assert_eq!(missing, vec!["rec-005".to_string()]);

        assert_eq!(records.purge_pending_deletions().await.unwrap(), 1);
        assert!(f.services.store.get_record("rec-005").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_require_ownership_of_every_selected_record() {
        let f = fixture().await;
        let records = &f.services.records;
        let own = vec!["rec-001".to_string(), "rec-002".to_string()];
        records.ensure_owned(&f.patient.id, &own).await.unwrap();
        assert!(matches!(
            records.ensure_owned(&f.doctor.id, &own).await,
            Err(ServiceError::Forbidden(_))
        ));
        let with_unknown = vec!["rec-001".to_string(), "rec-999".to_string()];
        assert!(matches!(
            records.ensure_owned(&f.patient.id, &with_unknown).await,
            Err(ServiceError::Forbidden(_))
        ));
    }
}
