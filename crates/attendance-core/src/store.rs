//! Durable account and invitation records.
//!
//! [`RecordStore`] is the interface the rest of the workspace depends on.
//! [`JsonRecordStore`] keeps two pretty-printed JSON maps on disk,
//! `students.json` (accounts keyed by id) and `invitations.json` (keyed by
//! code). Every read-modify-write runs under one process-wide mutex; the
//! operations are rare, so a coarse lock is enough.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{AttendanceError, Result};
use crate::models::{Account, AccountId, AccountUpdate, Invitation};

/// File name of the account map inside the data directory.
pub const STUDENTS_FILE: &str = "students.json";

/// File name of the invitation map inside the data directory.
pub const INVITATIONS_FILE: &str = "invitations.json";

/// Length of a generated invitation code.
pub const INVITATION_CODE_LEN: usize = 8;

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// ── RecordStore ───────────────────────────────────────────────────────────────

/// Persistent mapping of accounts and invitations.
pub trait RecordStore: Send + Sync {
    fn get_account(&self, id: AccountId) -> Result<Option<Account>>;

    /// All accounts, ordered by id.
    fn get_all_accounts(&self) -> Result<Vec<Account>>;

    /// Create (or overwrite) the account for `id` with default mode and
    /// `monitoring = false`.
    fn add_account(
        &self,
        id: AccountId,
        username: &str,
        password: &str,
        invitation_code: &str,
    ) -> Result<Account>;

    /// Apply `update` to the account. Returns `false` when no account exists.
    fn update_account(&self, id: AccountId, update: AccountUpdate) -> Result<bool>;

    fn get_invitation(&self, code: &str) -> Result<Option<Invitation>>;

    fn get_all_invitations(&self) -> Result<BTreeMap<String, Invitation>>;

    /// Mint a fresh unused code on behalf of `creator`.
    fn create_invitation(&self, creator: AccountId) -> Result<String>;

    /// Mark `code` as used by `id`. Returns `false` without mutating anything
    /// when the code is unknown or already used.
    fn use_invitation(&self, code: &str, id: AccountId) -> Result<bool>;

    /// Consume `code` and create the account in one step.
    ///
    /// Fails with [`AttendanceError::InvalidInvitation`] or
    /// [`AttendanceError::InvitationUsed`] without touching anything. When
    /// either write fails, neither the account nor the consumed invitation
    /// is left behind.
    fn register(
        &self,
        id: AccountId,
        username: &str,
        password: &str,
        code: &str,
    ) -> Result<Account>;

    /// Clear `monitoring` flags left over from a previous process and return
    /// the accounts that were reset.
    fn reset_monitoring_flags(&self) -> Result<Vec<Account>> {
        let mut reset = Vec::new();
        for account in self.get_all_accounts()? {
            if account.monitoring {
                self.update_account(account.telegram_id, AccountUpdate::monitoring(false))?;
                reset.push(account);
            }
        }
        Ok(reset)
    }
}

// ── JsonRecordStore ───────────────────────────────────────────────────────────

/// [`RecordStore`] backed by two JSON files in one directory.
pub struct JsonRecordStore {
    students_file: PathBuf,
    invitations_file: PathBuf,
    lock: Mutex<()>,
}

impl JsonRecordStore {
    /// Open the store in `data_dir`, creating the directory and empty maps
    /// when absent.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let store = Self {
            students_file: data_dir.join(STUDENTS_FILE),
            invitations_file: data_dir.join(INVITATIONS_FILE),
            lock: Mutex::new(()),
        };
        for path in [&store.students_file, &store.invitations_file] {
            if !path.exists() {
                write_map::<Account>(path, &BTreeMap::new())?;
            }
        }
        Ok(store)
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordStore for JsonRecordStore {
    fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let _guard = self.guard();
        let mut accounts = read_map::<Account>(&self.students_file);
        Ok(accounts.remove(&id.to_string()))
    }

    fn get_all_accounts(&self) -> Result<Vec<Account>> {
        let _guard = self.guard();
        let mut accounts: Vec<Account> = read_map::<Account>(&self.students_file)
            .into_values()
            .collect();
        accounts.sort_by_key(|a| a.telegram_id);
        Ok(accounts)
    }

    fn add_account(
        &self,
        id: AccountId,
        username: &str,
        password: &str,
        invitation_code: &str,
    ) -> Result<Account> {
        let _guard = self.guard();
        let mut accounts = read_map::<Account>(&self.students_file);
        let account = Account::new(id, username, password, invitation_code);
        accounts.insert(id.to_string(), account.clone());
        write_map(&self.students_file, &accounts)?;
        tracing::info!(account = id, username, "account registered");
        Ok(account)
    }

    fn update_account(&self, id: AccountId, update: AccountUpdate) -> Result<bool> {
        let _guard = self.guard();
        let mut accounts = read_map::<Account>(&self.students_file);
        let Some(account) = accounts.get_mut(&id.to_string()) else {
            return Ok(false);
        };
        account.apply(&update);
        write_map(&self.students_file, &accounts)?;
        Ok(true)
    }

    fn get_invitation(&self, code: &str) -> Result<Option<Invitation>> {
        let _guard = self.guard();
        let mut invitations = read_map::<Invitation>(&self.invitations_file);
        Ok(invitations.remove(code))
    }

    fn get_all_invitations(&self) -> Result<BTreeMap<String, Invitation>> {
        let _guard = self.guard();
        Ok(read_map::<Invitation>(&self.invitations_file))
    }

    fn create_invitation(&self, creator: AccountId) -> Result<String> {
        let _guard = self.guard();
        let mut invitations = read_map::<Invitation>(&self.invitations_file);
        let code = loop {
            let candidate = generate_code();
            if !invitations.contains_key(&candidate) {
                break candidate;
            }
        };
        invitations.insert(code.clone(), Invitation::new(creator));
        write_map(&self.invitations_file, &invitations)?;
        tracing::info!(creator, code = %code, "invitation created");
        Ok(code)
    }

    fn register(
        &self,
        id: AccountId,
        username: &str,
        password: &str,
        code: &str,
    ) -> Result<Account> {
        let _guard = self.guard();
        let mut invitations = read_map::<Invitation>(&self.invitations_file);
        let Some(invitation) = invitations.get_mut(code) else {
            return Err(AttendanceError::InvalidInvitation(code.to_string()));
        };
        if invitation.is_used() {
            return Err(AttendanceError::InvitationUsed(code.to_string()));
        }

        // Account first: a half-done registration must not burn the code.
        let previous = read_map::<Account>(&self.students_file);
        let mut accounts = previous.clone();
        let account = Account::new(id, username, password, code);
        accounts.insert(id.to_string(), account.clone());
        write_map(&self.students_file, &accounts)?;

        invitation.used_by = Some(id);
        invitation.used_at = Some(Utc::now());
        if let Err(e) = write_map(&self.invitations_file, &invitations) {
            if let Err(undo) = write_map(&self.students_file, &previous) {
                tracing::error!(account = id, error = %undo, "failed to roll back account after registration error");
            }
            return Err(e);
        }

        tracing::info!(account = id, username, code, "account registered");
        Ok(account)
    }

    fn use_invitation(&self, code: &str, id: AccountId) -> Result<bool> {
        let _guard = self.guard();
        let mut invitations = read_map::<Invitation>(&self.invitations_file);
        let Some(invitation) = invitations.get_mut(code) else {
            return Ok(false);
        };
        if invitation.is_used() {
            return Ok(false);
        }
        invitation.used_by = Some(id);
        invitation.used_at = Some(Utc::now());
        write_map(&self.invitations_file, &invitations)?;
        Ok(true)
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Random code of [`INVITATION_CODE_LEN`] uppercase letters and digits.
fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..INVITATION_CODE_LEN)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

/// Load a keyed map from `path`; a missing or malformed file reads as empty.
fn read_map<T: DeserializeOwned>(path: &Path) -> BTreeMap<String, T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "failed to read store file; using empty map");
            return BTreeMap::new();
        }
    };
    match serde_json::from_str(&content) {
        Ok(map) => map,
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "malformed store file; using empty map");
            BTreeMap::new()
        }
    }
}

/// Atomically write `map` to `path` (temp file, then rename).
fn write_map<T: Serialize>(path: &Path, map: &BTreeMap<String, T>) -> Result<()> {
    let json = serde_json::to_string_pretty(map)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|source| AttendanceError::FileWrite {
        path: tmp.clone(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| AttendanceError::FileWrite {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Mode;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open_store() -> (JsonRecordStore, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let store = JsonRecordStore::open(dir.path()).expect("open store");
        (store, dir)
    }

    /// Seed a known invitation code directly into the file.
    fn seed_invitation(dir: &TempDir, code: &str) {
        let path = dir.path().join(INVITATIONS_FILE);
        let mut map = read_map::<Invitation>(&path);
        map.insert(code.to_string(), Invitation::new(1));
        write_map(&path, &map).expect("seed");
    }

    // ── open ──────────────────────────────────────────────────────────────

    #[test]
    fn test_open_creates_empty_files() {
        let (_store, dir) = open_store();
        let students = std::fs::read_to_string(dir.path().join(STUDENTS_FILE)).unwrap();
        let invitations = std::fs::read_to_string(dir.path().join(INVITATIONS_FILE)).unwrap();
        assert_eq!(students.trim(), "{}");
        assert_eq!(invitations.trim(), "{}");
    }

    #[test]
    fn test_open_keeps_existing_records() {
        let dir = TempDir::new().unwrap();
        {
            let store = JsonRecordStore::open(dir.path()).unwrap();
            store.add_account(10, "u", "p", "C").unwrap();
        }
        let store = JsonRecordStore::open(dir.path()).unwrap();
        assert!(store.get_account(10).unwrap().is_some());
    }

    // ── accounts ──────────────────────────────────────────────────────────

    #[test]
    fn test_add_then_get_account_round_trip() {
        let (store, _dir) = open_store();
        store
            .add_account(42, "student@kbtu.kz", "hunter2", "ABCD1234")
            .unwrap();

        let acc = store.get_account(42).unwrap().expect("account stored");
        assert_eq!(acc.telegram_id, 42);
        assert_eq!(acc.username, "student@kbtu.kz");
        assert_eq!(acc.password, "hunter2");
        assert_eq!(acc.invitation_code, "ABCD1234");
        assert_eq!(acc.mode, Mode::Automatic);
        assert!(!acc.monitoring);
    }

    #[test]
    fn test_get_missing_account_is_none() {
        let (store, _dir) = open_store();
        assert!(store.get_account(1).unwrap().is_none());
    }

    #[test]
    fn test_update_account_fields() {
        let (store, _dir) = open_store();
        store.add_account(5, "u", "p", "C").unwrap();

        assert!(store.update_account(5, AccountUpdate::mode(Mode::Manual)).unwrap());
        assert!(store.update_account(5, AccountUpdate::monitoring(true)).unwrap());

        let acc = store.get_account(5).unwrap().unwrap();
        assert_eq!(acc.mode, Mode::Manual);
        assert!(acc.monitoring);
    }

    #[test]
    fn test_update_missing_account_returns_false() {
        let (store, _dir) = open_store();
        assert!(!store.update_account(99, AccountUpdate::monitoring(true)).unwrap());
    }

    #[test]
    fn test_get_all_accounts_sorted() {
        let (store, _dir) = open_store();
        store.add_account(30, "c", "p", "C").unwrap();
        store.add_account(10, "a", "p", "A").unwrap();
        store.add_account(20, "b", "p", "B").unwrap();

        let ids: Vec<_> = store
            .get_all_accounts()
            .unwrap()
            .iter()
            .map(|a| a.telegram_id)
            .collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test]
    fn test_reset_monitoring_flags() {
        let (store, _dir) = open_store();
        store.add_account(1, "a", "p", "A").unwrap();
        store.add_account(2, "b", "p", "B").unwrap();
        store.update_account(2, AccountUpdate::monitoring(true)).unwrap();

        let reset = store.reset_monitoring_flags().unwrap();
        assert_eq!(reset.len(), 1);
        assert_eq!(reset[0].telegram_id, 2);
        assert!(!store.get_account(2).unwrap().unwrap().monitoring);
    }

    // ── corruption ────────────────────────────────────────────────────────

    #[test]
    fn test_corrupt_students_file_reads_as_empty() {
        let (store, dir) = open_store();
        std::fs::write(dir.path().join(STUDENTS_FILE), "{not json").unwrap();

        assert!(store.get_all_accounts().unwrap().is_empty());
        // The store stays usable and overwrites the bad file.
        store.add_account(3, "u", "p", "C").unwrap();
        assert!(store.get_account(3).unwrap().is_some());
    }

    // ── invitations ───────────────────────────────────────────────────────

    #[test]
    fn test_create_invitation_code_shape() {
        let (store, _dir) = open_store();
        let code = store.create_invitation(1).unwrap();

        assert_eq!(code.len(), INVITATION_CODE_LEN);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

        let inv = store.get_invitation(&code).unwrap().expect("stored");
        assert_eq!(inv.created_by, 1);
        assert!(!inv.is_used());
    }

    #[test]
    fn test_created_codes_are_unique() {
        let (store, _dir) = open_store();
        let a = store.create_invitation(1).unwrap();
        let b = store.create_invitation(1).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.get_all_invitations().unwrap().len(), 2);
    }

    #[test]
    fn test_use_invitation_exactly_once() {
        let (store, dir) = open_store();
        seed_invitation(&dir, "ABCD1234");

        assert!(store.use_invitation("ABCD1234", 7).unwrap());
        let first = store.get_invitation("ABCD1234").unwrap().unwrap();
        assert_eq!(first.used_by, Some(7));
        assert!(first.used_at.is_some());

        // Second use fails and leaves the record untouched.
        assert!(!store.use_invitation("ABCD1234", 8).unwrap());
        let second = store.get_invitation("ABCD1234").unwrap().unwrap();
        assert_eq!(second, first);
    }

    #[test]
    fn test_use_unknown_invitation_fails() {
        let (store, _dir) = open_store();
        assert!(!store.use_invitation("NOPE0000", 7).unwrap());
    }

    // ── register ──────────────────────────────────────────────────────────

    #[test]
    fn test_register_consumes_invitation() {
        let (store, dir) = open_store();
        seed_invitation(&dir, "ABCD1234");

        let acc = store.register(1001, "u1", "pw", "ABCD1234").unwrap();
        assert_eq!(acc.telegram_id, 1001);
        assert_eq!(
            store.get_invitation("ABCD1234").unwrap().unwrap().used_by,
            Some(1001)
        );
    }

    #[test]
    fn test_register_with_used_code_fails() {
        let (store, dir) = open_store();
        seed_invitation(&dir, "ABCD1234");
        store.register(1001, "u1", "pw", "ABCD1234").unwrap();

        let err = store.register(1002, "u2", "pw", "ABCD1234").unwrap_err();
        assert!(matches!(err, AttendanceError::InvitationUsed(_)));
        assert!(err.to_string().contains("already used"));
        assert!(store.get_account(1002).unwrap().is_none());
    }

    #[test]
    fn test_register_with_unknown_code_fails() {
        let (store, _dir) = open_store();
        let err = store.register(1, "u", "p", "ZZZZ9999").unwrap_err();
        assert!(matches!(err, AttendanceError::InvalidInvitation(_)));
    }

    #[test]
    fn test_failed_registration_keeps_invitation_unused() {
        let (store, dir) = open_store();
        let code = store.create_invitation(1).unwrap();

        // The account map can no longer be replaced.
        let students = dir.path().join(STUDENTS_FILE);
        std::fs::remove_file(&students).unwrap();
        std::fs::create_dir(&students).unwrap();

        let err = store.register(42, "u", "pw", &code).unwrap_err();
        assert!(matches!(err, AttendanceError::FileWrite { .. }));
        let invitation = store.get_invitation(&code).unwrap().unwrap();
        assert_eq!(invitation.used_by, None);
        assert!(invitation.used_at.is_none());

        // Once the store is writable again the same code still works.
        std::fs::remove_dir(&students).unwrap();
        let acc = store.register(42, "u", "pw", &code).unwrap();
        assert_eq!(acc.invitation_code, code);
        assert_eq!(
            store.get_invitation(&code).unwrap().unwrap().used_by,
            Some(42)
        );
    }

    #[test]
    fn test_concurrent_register_single_account() {
        let (store, dir) = open_store();
        seed_invitation(&dir, "RACE0002");
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.register(100 + i, "u", "pw", "RACE0002").is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(store.get_all_accounts().unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_use_invitation_single_winner() {
        let (store, dir) = open_store();
        seed_invitation(&dir, "RACE0001");
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.use_invitation("RACE0001", i).unwrap())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
