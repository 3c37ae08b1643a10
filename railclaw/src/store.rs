//! Payment Record Store (spec §4.B, §6)
//!
//! Content-addressed per-payment files on a shared filesystem:
//!
//! ```text
//! <data_dir>/pending/<payment_id>.json
//! <data_dir>/notifications/<payment_id>.json
//! <data_dir>/wallets/<business_id>.enc.json
//! ```
//!
//! Writes go through a temp-file-then-rename so a reader never observes a
//! partially written record (spec §4.B "writes must be atomic").

use crate::errors::RecordError;
use crate::record::{Notification, PaymentRecord};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Clone)]
pub struct RecordStore {
    root: PathBuf,
}

/// `{business_id, email, address, encrypted_private_key, derivation_path,
/// created_at}` (spec §6). Written with file mode `0600`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WalletKeystore {
    pub business_id: String,
    pub email: String,
    pub address: String,
    pub encrypted_private_key: String,
    pub derivation_path: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl RecordStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, RecordError> {
        let root = data_dir.into();
        fs::create_dir_all(root.join("pending"))?;
        fs::create_dir_all(root.join("notifications"))?;
        fs::create_dir_all(root.join("wallets"))?;
        Ok(Self { root })
    }

    fn record_path(&self, payment_id: &str) -> PathBuf {
        self.root.join("pending").join(format!("{payment_id}.json"))
    }

    fn notification_path(&self, payment_id: &str) -> PathBuf {
        self.root
            .join("notifications")
            .join(format!("{payment_id}.json"))
    }

    fn wallet_path(&self, business_id: &str) -> PathBuf {
        self.root
            .join("wallets")
            .join(format!("{business_id}.enc.json"))
    }

    /// Write `bytes` to `path` atomically: a temp file in the same
    /// directory, flushed, then renamed over the target. `rename` within a
    /// filesystem is atomic, so readers see either the old or the new
    /// content, never a partial write.
    fn write_atomic(path: &Path, bytes: &[u8], mode: Option<u32>) -> Result<(), RecordError> {
        let dir = path.parent().ok_or_else(|| {
            RecordError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "record path has no parent directory",
            ))
        })?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;

        #[cfg(unix)]
        if let Some(mode) = mode {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(mode))?;
        }
        #[cfg(not(unix))]
        let _ = mode;

        tmp.persist(path)
            .map_err(|e| RecordError::Io(e.error))?;
        Ok(())
    }

    pub fn create(&self, record: &PaymentRecord) -> Result<(), RecordError> {
        let path = self.record_path(record.payment_id());
        if path.exists() {
            return Err(RecordError::Conflict {
                payment_id: record.payment_id().to_string(),
            });
        }
        let bytes = serde_json::to_vec_pretty(record)?;
        Self::write_atomic(&path, &bytes, None)
    }

    pub fn get(&self, payment_id: &str) -> Result<PaymentRecord, RecordError> {
        let path = self.record_path(payment_id);
        let bytes = fs::read(&path).map_err(|_| RecordError::NotFound {
            payment_id: payment_id.to_string(),
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Read-modify-write. The store does not itself arbitrate concurrent
    /// writers beyond this read-then-atomic-write; spec §5 guarantees a
    /// single writer per payment by convention (the owning monitor), so no
    /// additional locking is required here.
    pub fn update(
        &self,
        payment_id: &str,
        mutator: impl FnOnce(&mut PaymentRecord),
    ) -> Result<PaymentRecord, RecordError> {
        let mut record = self.get(payment_id)?;
        mutator(&mut record);
        let bytes = serde_json::to_vec_pretty(&record)?;
        Self::write_atomic(&self.record_path(payment_id), &bytes, None)?;
        Ok(record)
    }

    /// Bounded scan of every record under `pending/`, keeping those that
    /// satisfy `filter`. `limit` bounds the number of records returned, not
    /// the number scanned.
    pub fn list(
        &self,
        filter: impl Fn(&PaymentRecord) -> bool,
        limit: usize,
    ) -> Result<Vec<PaymentRecord>, RecordError> {
        let mut out = Vec::new();
        let dir = self.root.join("pending");
        let mut entries: Vec<_> = fs::read_dir(&dir)?.filter_map(|e| e.ok()).collect();
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            if out.len() >= limit {
                break;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = match fs::read(&path) {
                Ok(b) => b,
                Err(_) => continue,
            };
            if let Ok(record) = serde_json::from_slice::<PaymentRecord>(&bytes) {
                if filter(&record) {
                    out.push(record);
                }
            }
        }
        Ok(out)
    }

    pub fn enqueue_notification(
        &self,
        payment_id: &str,
        payload: &Notification,
    ) -> Result<(), RecordError> {
        let bytes = serde_json::to_vec_pretty(payload)?;
        Self::write_atomic(&self.notification_path(payment_id), &bytes, None)
    }

    /// Drain every queued notification, deleting each file as it is read.
    /// Single-producer/single-consumer per spec §3.
    pub fn drain_notifications(&self) -> Result<Vec<Notification>, RecordError> {
        let dir = self.root.join("notifications");
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir)?.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path)?;
            if let Ok(payload) = serde_json::from_slice::<Notification>(&bytes) {
                out.push(payload);
            }
            fs::remove_file(&path)?;
        }
        Ok(out)
    }

    pub fn write_wallet_keystore(&self, keystore: &WalletKeystore) -> Result<(), RecordError> {
        let bytes = serde_json::to_vec_pretty(keystore)?;
        Self::write_atomic(&self.wallet_path(&keystore.business_id), &bytes, Some(0o600))
    }

    pub fn read_wallet_keystore(&self, business_id: &str) -> Result<WalletKeystore, RecordError> {
        let path = self.wallet_path(business_id);
        let bytes = fs::read(&path).map_err(|_| RecordError::NotFound {
            payment_id: business_id.to_string(),
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DirectFields, PaymentStatus, RecordHeader};
    use chrono::Utc;

    fn store() -> (RecordStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path()).unwrap();
        (store, dir)
    }

    fn sample_record(id: &str) -> PaymentRecord {
        PaymentRecord::Direct(DirectFields {
            amount: "100.00".into(),
            header: RecordHeader {
                payment_id: id.to_string(),
                business_id: "biz_1".into(),
                business_name: "Example".into(),
                settlement_wallet: "0xabc".into(),
                chat_id: None,
                token: "USDC".into(),
                settlement_chain: "polygon".into(),
                status: PaymentStatus::Pending,
                created_at: Utc::now(),
                expires_at: Utc::now(),
                tx_hash: None,
                confirmations: None,
                confirmed_at: None,
                expired_at: None,
                error: None,
            },
        })
    }

    #[test]
    fn test_create_then_get_roundtrips() {
        let (store, _dir) = store();
        let record = sample_record("pay_1");
        store.create(&record).unwrap();
        let fetched = store.get("pay_1").unwrap();
        assert_eq!(fetched.payment_id(), "pay_1");
    }

    #[test]
    fn test_create_conflict_on_duplicate_id() {
        let (store, _dir) = store();
        store.create(&sample_record("pay_1")).unwrap();
        let err = store.create(&sample_record("pay_1")).unwrap_err();
        assert!(matches!(err, RecordError::Conflict { .. }));
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let (store, _dir) = store();
        let err = store.get("pay_missing").unwrap_err();
        assert!(matches!(err, RecordError::NotFound { .. }));
    }

    #[test]
    fn test_update_mutates_and_persists() {
        let (store, _dir) = store();
        store.create(&sample_record("pay_1")).unwrap();
        store
            .update("pay_1", |r| r.set_status(PaymentStatus::Confirming))
            .unwrap();
        let fetched = store.get("pay_1").unwrap();
        assert_eq!(fetched.status(), PaymentStatus::Confirming);
    }

    #[test]
    fn test_list_applies_filter_and_limit() {
        let (store, _dir) = store();
        for i in 0..5 {
            store.create(&sample_record(&format!("pay_{i}"))).unwrap();
        }
        let all = store.list(|_| true, 100).unwrap();
        assert_eq!(all.len(), 5);
        let capped = store.list(|_| true, 2).unwrap();
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn test_notification_drain_deletes_on_read() {
        let (store, _dir) = store();
        let note = Notification::DirectConfirmed {
            payment_id: "pay_1".into(),
            tx_hash: "0xdead".into(),
            token: "USDC".into(),
            chain: "polygon".into(),
            confirmations: 20,
            confirmed_at: Utc::now(),
        };
        store.enqueue_notification("pay_1", &note).unwrap();
        let drained = store.drain_notifications().unwrap();
        assert_eq!(drained.len(), 1);
        let drained_again = store.drain_notifications().unwrap();
        assert!(drained_again.is_empty());
    }

    #[test]
    fn test_wallet_keystore_roundtrip() {
        let (store, _dir) = store();
        let keystore = WalletKeystore {
            business_id: "biz_1".into(),
            email: "ops@example.com".into(),
            address: "So1anaPubkey".into(),
            encrypted_private_key: "deadbeef".into(),
            derivation_path: "m/44'/501'/0'/0'".into(),
            created_at: Utc::now(),
        };
        store.write_wallet_keystore(&keystore).unwrap();
        let fetched = store.read_wallet_keystore("biz_1").unwrap();
        assert_eq!(fetched.address, "So1anaPubkey");
    }
}
