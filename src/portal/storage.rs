//! Backend seams: object storage, tables, and the auth session.
//!
//! The portal only ever talks to its hosted backend through these traits.
//! In-memory implementations back the tests and the command-line tool.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

/// Failures reported by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The request never reached the backend (network down, aborted fetch)
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The backend refused the object because of its size
    #[error("Object exceeds the maximum allowed size")]
    PayloadTooLarge,

    /// No row or object with that key
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend answered with an error status
    #[error("Rejected by backend ({status}): {message}")]
    Rejected {
        /// Status code returned by the backend
        status: u16,
        /// Response body
        message: String,
    },

    /// Any other backend failure
    #[error("Backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Classify an error response from the storage API.
    pub fn from_response(status: u16, body: &str) -> Self {
        if status == 413 || body.contains("maximum allowed size") {
            StorageError::PayloadTooLarge
        } else {
            StorageError::Rejected {
                status,
                message: body.to_string(),
            }
        }
    }

    /// Whether retrying through another transport could help.
    pub fn is_transport(&self) -> bool {
        matches!(self, StorageError::Transport(_))
    }
}

type StorageResult<T> = std::result::Result<T, StorageError>;

fn lock<T>(mutex: &Mutex<T>) -> StorageResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StorageError::Backend("storage lock poisoned".to_string()))
}

/// Bucketed blob storage with public URLs.
pub trait ObjectStore {
    /// Store `bytes` at `bucket/path`, replacing any existing object.
    fn put(&self, bucket: &str, path: &str, bytes: &[u8], content_type: &str) -> StorageResult<()>;

    /// Public URL an object is (or will be) reachable at.
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

impl<S: ObjectStore + ?Sized> ObjectStore for &S {
    fn put(&self, bucket: &str, path: &str, bytes: &[u8], content_type: &str) -> StorageResult<()> {
        (**self).put(bucket, path, bytes, content_type)
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        (**self).public_url(bucket, path)
    }
}

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object contents
    pub bytes: Vec<u8>,
    /// MIME type given at upload
    pub content_type: String,
}

/// Object store kept in memory.
#[derive(Debug)]
pub struct InMemoryObjectStore {
    base_url: String,
    max_object_bytes: Option<usize>,
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
}

impl InMemoryObjectStore {
    /// Create a store whose public URLs start with `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_object_bytes: None,
            objects: Mutex::new(BTreeMap::new()),
        }
    }

    /// Reject objects larger than `limit` the way a hosted bucket does.
    pub fn with_max_object_bytes(mut self, limit: usize) -> Self {
        self.max_object_bytes = Some(limit);
        self
    }

    /// Fetch a stored object.
    pub fn get(&self, bucket: &str, path: &str) -> StorageResult<StoredObject> {
        lock(&self.objects)?
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", bucket, path)))
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        lock(&self.objects).map(|objects| objects.len()).unwrap_or(0)
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put(&self, bucket: &str, path: &str, bytes: &[u8], content_type: &str) -> StorageResult<()> {
        if let Some(limit) = self.max_object_bytes {
            if bytes.len() > limit {
                return Err(StorageError::from_response(
                    400,
                    "The object exceeded the maximum allowed size",
                ));
            }
        }
        lock(&self.objects)?.insert(
            (bucket.to_string(), path.to_string()),
            StoredObject {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        log::debug!("Stored {} bytes at {}/{}", bytes.len(), bucket, path);
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, bucket, path)
    }
}

/// Uploads through a primary store and retries once through a fallback
/// store when the primary cannot be reached.
///
/// Only transport failures are retried; a rejection from the backend is
/// final.
#[derive(Debug)]
pub struct RobustUploader<P, F> {
    primary: P,
    fallback: F,
}

impl<P: ObjectStore, F: ObjectStore> RobustUploader<P, F> {
    /// Pair a primary store with its fallback.
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P: ObjectStore, F: ObjectStore> ObjectStore for RobustUploader<P, F> {
    fn put(&self, bucket: &str, path: &str, bytes: &[u8], content_type: &str) -> StorageResult<()> {
        match self.primary.put(bucket, path, bytes, content_type) {
            Err(err) if err.is_transport() => {
                log::warn!("Upload of {}/{} failed ({}), retrying via fallback", bucket, path, err);
                self.fallback.put(bucket, path, bytes, content_type)
            },
            other => other,
        }
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.primary.public_url(bucket, path)
    }
}

/// A row with a string primary key.
pub trait Row: Clone {
    /// Primary key.
    fn key(&self) -> &str;
}

/// A relational table.
pub trait Table<R: Row> {
    /// Rows matching `filter`, in insertion order.
    fn query(&self, filter: &dyn Fn(&R) -> bool) -> StorageResult<Vec<R>>;

    /// Insert a row; fails if its key is taken.
    fn insert(&self, row: R) -> StorageResult<R>;

    /// Apply `change` to the row with `key` and return the updated row.
    fn update(&self, key: &str, change: &mut dyn FnMut(&mut R)) -> StorageResult<R>;

    /// Delete the row with `key`.
    fn delete(&self, key: &str) -> StorageResult<()>;

    /// Fetch one row by key.
    fn get(&self, key: &str) -> StorageResult<R> {
        self.query(&|row: &R| row.key() == key)?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

/// Table kept in memory.
#[derive(Debug)]
pub struct InMemoryTable<R> {
    rows: Mutex<Vec<R>>,
}

impl<R> Default for InMemoryTable<R> {
    fn default() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }
}

impl<R: Row> InMemoryTable<R> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        lock(&self.rows).map(|rows| rows.len()).unwrap_or(0)
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R: Row> Table<R> for InMemoryTable<R> {
    fn query(&self, filter: &dyn Fn(&R) -> bool) -> StorageResult<Vec<R>> {
        Ok(lock(&self.rows)?.iter().filter(|row| filter(row)).cloned().collect())
    }

    fn insert(&self, row: R) -> StorageResult<R> {
        let mut rows = lock(&self.rows)?;
        if rows.iter().any(|existing| existing.key() == row.key()) {
            return Err(StorageError::Rejected {
                status: 409,
                message: format!("duplicate key {}", row.key()),
            });
        }
        rows.push(row.clone());
        Ok(row)
    }

    fn update(&self, key: &str, change: &mut dyn FnMut(&mut R)) -> StorageResult<R> {
        let mut rows = lock(&self.rows)?;
        let row = rows
            .iter_mut()
            .find(|row| row.key() == key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        change(row);
        Ok(row.clone())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        let mut rows = lock(&self.rows)?;
        let before = rows.len();
        rows.retain(|row| row.key() != key);
        if rows.len() == before {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(())
    }
}

/// A signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Backend user id
    pub user_id: String,
    /// Sign-in email
    pub email: String,
    /// When the session stops being valid, if it expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a session that does not expire.
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            expires_at: None,
        }
    }

    /// Set the expiry.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the session is still valid at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expiry| now < expiry)
    }
}

/// Listener called with the new session whenever it changes.
pub type SessionListener = Box<dyn Fn(Option<&Session>) + Send + Sync>;

/// The current authentication state.
pub trait AuthSession {
    /// The active session, if any.
    fn current(&self) -> Option<Session>;

    /// Register a listener for sign-in and sign-out.
    fn on_change(&self, listener: SessionListener);
}

/// Auth state kept in memory.
#[derive(Default)]
pub struct InMemoryAuth {
    session: Mutex<Option<Session>>,
    listeners: Mutex<Vec<Arc<dyn Fn(Option<&Session>) + Send + Sync>>>,
}

impl std::fmt::Debug for InMemoryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryAuth")
            .field("session", &self.current())
            .finish_non_exhaustive()
    }
}

impl InMemoryAuth {
    /// Create a signed-out auth state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an auth state that is already signed in.
    pub fn signed_in(session: Session) -> Self {
        let auth = Self::new();
        auth.sign_in(session);
        auth
    }

    /// Replace the session and notify listeners.
    pub fn sign_in(&self, session: Session) {
        self.set(Some(session));
    }

    /// Clear the session and notify listeners.
    pub fn sign_out(&self) {
        self.set(None);
    }

    fn set(&self, session: Option<Session>) {
        if let Ok(mut current) = self.session.lock() {
            *current = session.clone();
        }
        // Listeners run without the session lock held so they may call current().
        let listeners = self.listeners.lock().map(|l| l.clone()).unwrap_or_default();
        for listener in listeners {
            listener(session.as_ref());
        }
    }
}

impl AuthSession for InMemoryAuth {
    fn current(&self) -> Option<Session> {
        let session = self.session.lock().ok()?.clone()?;
        session.is_active_at(Utc::now()).then_some(session)
    }

    fn on_change(&self, listener: SessionListener) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(Arc::from(listener));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: String,
        count: u32,
    }

    impl Row for Item {
        fn key(&self) -> &str {
            &self.id
        }
    }

    fn item(id: &str) -> Item {
        Item {
            id: id.to_string(),
            count: 0,
        }
    }

    /// Store whose every upload fails with the given error.
    struct BrokenStore(StorageError);

    impl ObjectStore for BrokenStore {
        fn put(&self, _: &str, _: &str, _: &[u8], _: &str) -> StorageResult<()> {
            Err(self.0.clone())
        }

        fn public_url(&self, bucket: &str, path: &str) -> String {
            format!("broken://{}/{}", bucket, path)
        }
    }

    #[test]
    fn test_from_response() {
        assert_eq!(
            StorageError::from_response(400, "The object exceeded the maximum allowed size"),
            StorageError::PayloadTooLarge
        );
        assert_eq!(StorageError::from_response(413, ""), StorageError::PayloadTooLarge);
        assert!(matches!(
            StorageError::from_response(500, "boom"),
            StorageError::Rejected { status: 500, .. }
        ));
    }

    #[test]
    fn test_object_store_roundtrip() {
        let store = InMemoryObjectStore::new("https://backend.example/");
        store.put("videos", "a/b.mp4", b"data", "video/mp4").unwrap();
        let object = store.get("videos", "a/b.mp4").unwrap();
        assert_eq!(object.bytes, b"data");
        assert_eq!(object.content_type, "video/mp4");
        assert_eq!(
            store.public_url("videos", "a/b.mp4"),
            "https://backend.example/storage/v1/object/public/videos/a/b.mp4"
        );
        assert!(matches!(store.get("videos", "missing"), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_object_store_size_limit() {
        let store = InMemoryObjectStore::new("mem://").with_max_object_bytes(3);
        let err = store.put("b", "p", b"four", "application/pdf").unwrap_err();
        assert_eq!(err, StorageError::PayloadTooLarge);
        assert!(store.is_empty());
    }

    #[test]
    fn test_uploader_falls_back_on_transport_error() {
        let fallback = InMemoryObjectStore::new("mem://");
        let uploader = RobustUploader::new(
            BrokenStore(StorageError::Transport("Failed to fetch".into())),
            &fallback,
        );
        uploader.put("videos", "x.mp4", b"v", "video/mp4").unwrap();
        assert_eq!(fallback.len(), 1);
        assert_eq!(uploader.public_url("videos", "x.mp4"), "broken://videos/x.mp4");
    }

    #[test]
    fn test_uploader_does_not_retry_rejections() {
        let fallback = InMemoryObjectStore::new("mem://");
        let uploader = RobustUploader::new(BrokenStore(StorageError::PayloadTooLarge), &fallback);
        let err = uploader.put("videos", "x.mp4", b"v", "video/mp4").unwrap_err();
        assert_eq!(err, StorageError::PayloadTooLarge);
        assert!(fallback.is_empty());
    }

    #[test]
    fn test_table_crud() {
        let table = InMemoryTable::new();
        table.insert(item("a")).unwrap();
        table.insert(item("b")).unwrap();
        assert!(matches!(table.insert(item("a")), Err(StorageError::Rejected { status: 409, .. })));

        let updated = table.update("a", &mut |row: &mut Item| row.count += 2).unwrap();
        assert_eq!(updated.count, 2);
        assert_eq!(table.get("a").unwrap().count, 2);

        table.delete("b").unwrap();
        assert_eq!(table.len(), 1);
        assert!(matches!(table.delete("b"), Err(StorageError::NotFound(_))));
        assert!(matches!(table.update("zz", &mut |_: &mut Item| {}), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_auth_notifies_listeners() {
        let auth = InMemoryAuth::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        auth.on_change(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(auth.current().is_none());
        auth.sign_in(Session::new("u1", "admin@firm.example"));
        assert_eq!(auth.current().unwrap().user_id, "u1");
        auth.sign_out();
        assert!(auth.current().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_expired_session_is_not_current() {
        let past = Utc::now() - chrono::Duration::hours(1);
        let auth = InMemoryAuth::signed_in(Session::new("u1", "a@b.example").with_expiry(past));
        assert!(auth.current().is_none());
    }
}
