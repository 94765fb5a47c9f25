//! Session-wide preference cache.
//!
//! # Responsibilities
//! - Hold the one in-memory copy of the preference document
//! - Coalesce concurrent bulk loads into a single request
//! - Apply writes optimistically, then persist the whole document
//! - Degrade to the local fallback store on 401 or network failure
//!
//! # Design Decisions
//! - Cache is an `ArcSwap`: readers never block, loads swap wholesale
//! - The single-flight load is a stored `Shared` future, cleared by the
//!   load itself when it finishes
//! - Nothing here returns an error to the caller; outcomes are reported
//!   for diagnostics only

use arc_swap::ArcSwap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

use crate::observability::metrics;
use crate::preferences::backend::PreferencesBackend;
use crate::preferences::fallback::FallbackStore;
use crate::preferences::types::{AuthState, LoadOutcome, PreferenceError, PreferenceSet, SaveOutcome};

type SharedLoad = Shared<BoxFuture<'static, LoadOutcome>>;

impl From<u8> for AuthState {
    fn from(val: u8) -> Self {
        match val {
            1 => AuthState::Authenticated,
            2 => AuthState::Unauthenticated,
            _ => AuthState::Unknown,
        }
    }
}

impl From<AuthState> for u8 {
    fn from(state: AuthState) -> Self {
        match state {
            AuthState::Unknown => 0,
            AuthState::Authenticated => 1,
            AuthState::Unauthenticated => 2,
        }
    }
}

struct Inner {
    backend: Arc<dyn PreferencesBackend>,
    fallback: Arc<dyn FallbackStore>,
    fallback_prefix: String,
    cache: ArcSwap<PreferenceSet>,
    in_flight: Mutex<Option<SharedLoad>>,
    auth: AtomicU8,
}

/// Shared preference cache. Cloning yields another handle to the same cache.
#[derive(Clone)]
pub struct PreferenceStore {
    inner: Arc<Inner>,
}

impl PreferenceStore {
    /// Create an empty store.
    pub fn new(
        backend: Arc<dyn PreferencesBackend>,
        fallback: Arc<dyn FallbackStore>,
        fallback_prefix: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                fallback,
                fallback_prefix: fallback_prefix.into(),
                cache: ArcSwap::from_pointee(PreferenceSet::new()),
                in_flight: Mutex::new(None),
                auth: AtomicU8::new(AuthState::Unknown.into()),
            }),
        }
    }

    /// Load the whole document from the server.
    ///
    /// Callers arriving while a load is pending await that load instead of
    /// issuing their own request, and all observe the same outcome.
    pub async fn load_all(&self) -> LoadOutcome {
        let load = {
            let mut slot = self.lock_in_flight();
            match slot.as_ref() {
                Some(pending) => {
                    tracing::debug!("Joining in-flight preferences load");
                    pending.clone()
                }
                None => {
                    let pending = self.clone().fetch_and_install().boxed().shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };
        load.await
    }

    async fn fetch_and_install(self) -> LoadOutcome {
        let outcome = match self.inner.backend.fetch().await {
            Ok(document) => {
                let keys = document.len();
                self.inner.cache.store(Arc::new(document));
                self.set_auth(AuthState::Authenticated);
                metrics::record_preference_load("loaded");
                tracing::debug!(keys, "Preferences loaded");
                LoadOutcome::Loaded { keys }
            }
            Err(PreferenceError::Unauthorized) => {
                self.set_auth(AuthState::Unauthenticated);
                metrics::record_preference_load("unauthenticated");
                tracing::info!("Not authenticated, using fallback store for preferences");
                LoadOutcome::Unauthenticated
            }
            Err(e) => {
                metrics::record_preference_load("failed");
                tracing::error!(error = %e, "Failed to load preferences");
                LoadOutcome::Failed(e)
            }
        };

        *self.lock_in_flight() = None;
        outcome
    }

    /// Read a preference without touching the network.
    ///
    /// Lookup order: cache, fallback store, `default`.
    pub fn get(&self, key: &str, default: Value) -> Value {
        self.lookup(key).unwrap_or(default)
    }

    /// Read a preference and deserialize it into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.lookup(key)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                tracing::debug!(key, error = %e, "Preference has unexpected shape");
                None
            }
        }
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.inner.cache.load().get(key) {
            return Some(value.clone());
        }
        self.read_fallback(key)
    }

    fn read_fallback(&self, key: &str) -> Option<Value> {
        let raw = self.inner.fallback.get(&self.fallback_key(key))?;
        if raw.is_empty() {
            return None;
        }
        Some(serde_json::from_str(&raw).unwrap_or(Value::String(raw)))
    }

    /// Write a preference.
    ///
    /// The cache is updated before this returns. Persisting the whole merged
    /// document runs on a spawned task; await the handle to observe the
    /// outcome or drop it to fire and forget. Must be called within a Tokio
    /// runtime.
    pub fn set(&self, key: impl Into<String>, value: Value) -> JoinHandle<SaveOutcome> {
        let key = key.into();
        let document = self.merge(&key, &value);
        let store = self.clone();
        tokio::spawn(async move { store.persist(key, value, document).await })
    }

    fn merge(&self, key: &str, value: &Value) -> Arc<PreferenceSet> {
        let mut merged = Arc::new(PreferenceSet::new());
        self.inner.cache.rcu(|current| {
            let mut next = (**current).clone();
            next.insert(key.to_string(), value.clone());
            merged = Arc::new(next);
            Arc::clone(&merged)
        });
        merged
    }

    async fn persist(self, key: String, value: Value, document: Arc<PreferenceSet>) -> SaveOutcome {
        match self.inner.backend.replace(&document).await {
            Ok(()) => {
                self.set_auth(AuthState::Authenticated);
                metrics::record_preference_save("persisted");
                tracing::debug!(key = %key, "Preference saved");
                SaveOutcome::Persisted
            }
            Err(e) if e.uses_fallback() => {
                if e == PreferenceError::Unauthorized {
                    self.set_auth(AuthState::Unauthenticated);
                }
                metrics::record_preference_save("mirrored");
                tracing::warn!(key = %key, error = %e, "Failed to save preference, mirroring locally");
                self.mirror(&key, &value);
                SaveOutcome::MirroredLocally(e)
            }
            Err(e) => {
                metrics::record_preference_save("failed");
                tracing::warn!(key = %key, error = %e, "Failed to save preference");
                SaveOutcome::Failed(e)
            }
        }
    }

    fn mirror(&self, key: &str, value: &Value) {
        match serde_json::to_string(value) {
            Ok(raw) => {
                self.inner.fallback.set(&self.fallback_key(key), raw);
                metrics::record_fallback_write();
            }
            Err(e) => tracing::warn!(key, error = %e, "Failed to encode preference for fallback store"),
        }
    }

    fn fallback_key(&self, key: &str) -> String {
        format!("{}{}", self.inner.fallback_prefix, key)
    }

    /// Current cached document.
    pub fn snapshot(&self) -> Arc<PreferenceSet> {
        self.inner.cache.load_full()
    }

    /// Whether a bulk load is pending.
    pub fn is_loading(&self) -> bool {
        self.lock_in_flight().is_some()
    }

    /// What the last server response said about the session.
    pub fn auth_state(&self) -> AuthState {
        AuthState::from(self.inner.auth.load(Ordering::Relaxed))
    }

    fn set_auth(&self, state: AuthState) {
        self.inner.auth.store(state.into(), Ordering::Relaxed);
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<SharedLoad>> {
        self.inner.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::fallback::MemoryFallbackStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct ScriptedBackend {
        fetch_result: Mutex<Result<PreferenceSet, PreferenceError>>,
        replace_result: Mutex<Result<(), PreferenceError>>,
        fetch_gate: Option<Arc<Notify>>,
        replace_gate: Option<Arc<Notify>>,
        fetch_calls: AtomicUsize,
        replaced: Mutex<Vec<PreferenceSet>>,
    }

    impl ScriptedBackend {
        fn new() -> Self {
            Self {
                fetch_result: Mutex::new(Ok(PreferenceSet::new())),
                replace_result: Mutex::new(Ok(())),
                fetch_gate: None,
                replace_gate: None,
                fetch_calls: AtomicUsize::new(0),
                replaced: Mutex::new(Vec::new()),
            }
        }

        fn with_document(self, document: serde_json::Value) -> Self {
            let map = document.as_object().cloned().unwrap();
            *self.fetch_result.lock().unwrap() = Ok(map);
            self
        }

        fn fetch_fails(self, error: PreferenceError) -> Self {
            *self.fetch_result.lock().unwrap() = Err(error);
            self
        }

        fn replace_fails(self, error: PreferenceError) -> Self {
            *self.replace_result.lock().unwrap() = Err(error);
            self
        }
    }

    #[async_trait]
    impl PreferencesBackend for ScriptedBackend {
        async fn fetch(&self) -> Result<PreferenceSet, PreferenceError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.fetch_gate {
                gate.notified().await;
            }
            self.fetch_result.lock().unwrap().clone()
        }

        async fn replace(&self, document: &PreferenceSet) -> Result<(), PreferenceError> {
            if let Some(gate) = &self.replace_gate {
                gate.notified().await;
            }
            self.replaced.lock().unwrap().push(document.clone());
            self.replace_result.lock().unwrap().clone()
        }
    }

    fn store_with(backend: ScriptedBackend) -> (PreferenceStore, Arc<ScriptedBackend>, MemoryFallbackStore) {
        let backend = Arc::new(backend);
        let fallback = MemoryFallbackStore::new();
        let store = PreferenceStore::new(backend.clone(), Arc::new(fallback.clone()), "pref_");
        (store, backend, fallback)
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_request() {
        let gate = Arc::new(Notify::new());
        let mut backend = ScriptedBackend::new().with_document(json!({"theme": "dark", "volume": 3}));
        backend.fetch_gate = Some(gate.clone());
        let (store, backend, _) = store_with(backend);

        let loads = futures_util::future::join_all((0..5).map(|_| store.load_all()));
        let release = async {
            while backend.fetch_calls.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
            assert!(store.is_loading());
            gate.notify_one();
        };
        let (outcomes, ()) = tokio::join!(loads, release);

        assert_eq!(backend.fetch_calls.load(Ordering::SeqCst), 1);
        for outcome in outcomes {
            assert_eq!(outcome, LoadOutcome::Loaded { keys: 2 });
        }
        assert_eq!(store.get("theme", Value::Null), json!("dark"));
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn test_sequential_loads_issue_new_requests() {
        let (store, backend, _) = store_with(ScriptedBackend::new().with_document(json!({"a": 1})));

        store.load_all().await;
        store.load_all().await;

        assert_eq!(backend.fetch_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_load_keeps_cache() {
        let (store, backend, _) = store_with(ScriptedBackend::new().with_document(json!({"theme": "dark"})));
        store.load_all().await;

        *backend.fetch_result.lock().unwrap() = Err(PreferenceError::Network("connection refused".into()));
        let outcome = store.load_all().await;

        assert!(matches!(outcome, LoadOutcome::Failed(PreferenceError::Network(_))));
        assert_eq!(store.get("theme", Value::Null), json!("dark"));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_a_failed_load() {
        let (store, _, _) = store_with(
            ScriptedBackend::new().fetch_fails(PreferenceError::Malformed("expected value".into())),
        );

        let outcome = store.load_all().await;
        assert!(matches!(outcome, LoadOutcome::Failed(PreferenceError::Malformed(_))));
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_load_reads_fallback() {
        let (store, _, fallback) = store_with(ScriptedBackend::new().fetch_fails(PreferenceError::Unauthorized));
        fallback.set("pref_theme", "\"light\"".into());

        assert_eq!(store.load_all().await, LoadOutcome::Unauthenticated);
        assert_eq!(store.auth_state(), AuthState::Unauthenticated);
        assert_eq!(store.get("theme", json!("dark")), json!("light"));
    }

    #[tokio::test]
    async fn test_get_fallback_parsing() {
        let (store, _, fallback) = store_with(ScriptedBackend::new());
        fallback.set("pref_volume", "0.8".into());
        fallback.set("pref_name", "not json".into());
        fallback.set("pref_empty", String::new());

        assert_eq!(store.get("volume", Value::Null), json!(0.8));
        assert_eq!(store.get("name", Value::Null), json!("not json"));
        assert_eq!(store.get("empty", json!("default")), json!("default"));
        assert_eq!(store.get("missing", json!(42)), json!(42));
    }

    #[tokio::test]
    async fn test_cache_wins_over_fallback() {
        let (store, _, fallback) = store_with(ScriptedBackend::new().with_document(json!({"theme": null})));
        fallback.set("pref_theme", "\"light\"".into());
        store.load_all().await;

        assert_eq!(store.get("theme", json!("default")), Value::Null);
    }

    #[tokio::test]
    async fn test_set_is_visible_before_persist_completes() {
        let gate = Arc::new(Notify::new());
        let mut backend = ScriptedBackend::new();
        backend.replace_gate = Some(gate.clone());
        let (store, backend, _) = store_with(backend);

        let pending = store.set("ai_critique_enabled", json!(true));
        assert_eq!(store.get("ai_critique_enabled", json!(false)), json!(true));
        assert!(backend.replaced.lock().unwrap().is_empty());

        gate.notify_one();
        assert_eq!(pending.await.unwrap(), SaveOutcome::Persisted);
        assert_eq!(store.auth_state(), AuthState::Authenticated);
    }

    #[tokio::test]
    async fn test_set_persists_whole_document() {
        let (store, backend, _) = store_with(ScriptedBackend::new().with_document(json!({"theme": "dark"})));
        store.load_all().await;

        store.set("volume", json!(7)).await.unwrap();
        store.set("layout", json!({"grid": true})).await.unwrap();

        let replaced = backend.replaced.lock().unwrap();
        assert_eq!(replaced.len(), 2);
        assert_eq!(Value::Object(replaced[0].clone()), json!({"theme": "dark", "volume": 7}));
        assert_eq!(
            Value::Object(replaced[1].clone()),
            json!({"theme": "dark", "volume": 7, "layout": {"grid": true}})
        );
    }

    #[tokio::test]
    async fn test_unauthorized_save_mirrors_locally() {
        let (store, _, fallback) = store_with(ScriptedBackend::new().replace_fails(PreferenceError::Unauthorized));

        let outcome = store.set("theme", json!("dark")).await.unwrap();

        assert_eq!(outcome, SaveOutcome::MirroredLocally(PreferenceError::Unauthorized));
        assert_eq!(fallback.get("pref_theme").as_deref(), Some("\"dark\""));
        assert_eq!(store.get("theme", Value::Null), json!("dark"));
    }

    #[tokio::test]
    async fn test_network_failure_save_mirrors_locally() {
        let (store, _, fallback) = store_with(
            ScriptedBackend::new().replace_fails(PreferenceError::Network("timed out".into())),
        );

        let outcome = store.set("volume", json!(0.25)).await.unwrap();

        assert!(matches!(outcome, SaveOutcome::MirroredLocally(PreferenceError::Network(_))));
        assert_eq!(fallback.get("pref_volume").as_deref(), Some("0.25"));
    }

    #[tokio::test]
    async fn test_server_error_save_is_not_mirrored() {
        let (store, _, fallback) = store_with(ScriptedBackend::new().replace_fails(PreferenceError::Status(500)));

        let outcome = store.set("theme", json!("dark")).await.unwrap();

        assert_eq!(outcome, SaveOutcome::Failed(PreferenceError::Status(500)));
        assert!(fallback.is_empty());
        // The optimistic write is not rolled back.
        assert_eq!(store.get("theme", Value::Null), json!("dark"));
    }

    #[tokio::test]
    async fn test_get_as_typed() {
        let (store, _, _) = store_with(ScriptedBackend::new());
        store.set("accent", json!({"hue": 210, "saturation": 0.5}));

        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Accent {
            hue: u16,
            saturation: f32,
        }

        assert_eq!(
            store.get_as::<Accent>("accent"),
            Some(Accent { hue: 210, saturation: 0.5 })
        );
        assert_eq!(store.get_as::<u16>("accent"), None);
        assert_eq!(store.get_as::<bool>("missing"), None);
    }

    #[tokio::test]
    async fn test_clones_share_the_cache() {
        let (store, _, _) = store_with(ScriptedBackend::new());
        let other_surface = store.clone();

        store.set("theme", json!("dark"));
        assert_eq!(other_surface.get("theme", Value::Null), json!("dark"));
    }
}
