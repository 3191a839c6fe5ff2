//! Key-value stores kept in a single keychain entry
//!
//! A [`Store`] serializes its whole mapping into the payload of one entry
//! whose key is the project name. Every read fetches and parses the entry
//! again; every write is read-modify-write of the full mapping with no
//! conflict detection, so the last writer wins.

mod registry;
mod serializer;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::MellonConfig;
use crate::error::{MellonError, MellonResult};
use crate::keychain::Keychain;
use crate::shell::Security;

pub use registry::{
    create_serializer, list_serializers, register_serializer, unregister_serializer,
    SerializerDefinition, SerializerFactory,
};
pub use serializer::{JsonSerializer, Serializer, YamlSerializer};

/// Deserialized contents of a store
pub type StoreData = BTreeMap<String, Value>;

/// Which keychain a store lives in
#[derive(Debug, Clone, Default)]
pub enum KeychainSelector {
    /// Use this keychain
    Keychain(Keychain),
    /// The first keychain whose name matches (see [`Keychain::find`])
    Named(String),
    /// The keychain already holding the project's entry, else the default
    #[default]
    Search,
}

impl From<Keychain> for KeychainSelector {
    fn from(keychain: Keychain) -> Self {
        Self::Keychain(keychain)
    }
}

impl From<&str> for KeychainSelector {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl KeychainSelector {
    /// Resolve to a concrete keychain for `project_name`
    pub fn resolve(self, security: &Security, project_name: &str) -> MellonResult<Keychain> {
        match self {
            Self::Keychain(keychain) => Ok(keychain),
            Self::Named(name) => Keychain::find(security, &name),
            Self::Search => match Keychain::search(security, project_name)? {
                Some(keychain) => Ok(keychain),
                None => Keychain::default(security),
            },
        }
    }

    /// Resolve like [`resolve`](Self::resolve), binding explicit and named
    /// keychains through [`Keychain::bind`] so `config.verify_keychains`
    /// applies to them
    pub fn resolve_with(
        self,
        security: &Security,
        config: &MellonConfig,
        project_name: &str,
    ) -> MellonResult<Keychain> {
        match self {
            Self::Search => Self::Search.resolve(security, project_name),
            other => {
                let keychain = other.resolve(security, project_name)?;
                Keychain::bind(security, config, keychain.path())
            }
        }
    }
}

/// Many values stored in one keychain entry
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use mellon_core::{FakeSecurity, Keychain, Security, Store};
///
/// let security = Security::with_runner(Arc::new(
///     FakeSecurity::new().with_keychain("/k/projects.keychain"),
/// ));
/// let store = Store::new("myapp", Keychain::new(&security, "/k/projects.keychain"));
///
/// store.set("database_url", "postgres://localhost/myapp")?;
/// assert_eq!(
///     store.get("database_url")?.and_then(|v| v.as_str().map(str::to_string)),
///     Some("postgres://localhost/myapp".to_string())
/// );
/// assert_eq!(store.fetch_or("pool", 5)?, 5);
/// # Ok::<(), mellon_core::MellonError>(())
/// ```
#[derive(Clone)]
pub struct Store {
    project_name: String,
    keychain: Keychain,
    serializer: Arc<dyn Serializer>,
}

impl Store {
    /// A YAML store in the given keychain
    pub fn new(project_name: impl Into<String>, keychain: Keychain) -> Self {
        Self {
            project_name: project_name.into(),
            keychain,
            serializer: Arc::new(YamlSerializer),
        }
    }

    /// A YAML store in the keychain chosen by `selector`
    pub fn open(
        security: &Security,
        project_name: impl Into<String>,
        selector: impl Into<KeychainSelector>,
    ) -> MellonResult<Self> {
        let project_name = project_name.into();
        let selector: KeychainSelector = selector.into();
        let keychain = selector.resolve(security, &project_name)?;
        debug!(project = %project_name, keychain = %keychain, "opened store");
        Ok(Self::new(project_name, keychain))
    }

    /// Open with the serializer named in `config`
    pub fn from_config(
        security: &Security,
        config: &MellonConfig,
        project_name: impl Into<String>,
        selector: impl Into<KeychainSelector>,
    ) -> MellonResult<Self> {
        let serializer = create_serializer(&config.serializer)
            .ok_or_else(|| MellonError::UnknownSerializer(config.serializer.clone()))?;
        let project_name = project_name.into();
        let selector: KeychainSelector = selector.into();
        let keychain = selector.resolve_with(security, config, &project_name)?;
        debug!(project = %project_name, keychain = %keychain, serializer = serializer.name(), "opened store");
        Ok(Self::new(project_name, keychain).with_serializer(serializer))
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn keychain(&self) -> &Keychain {
        &self.keychain
    }

    pub fn serializer(&self) -> &dyn Serializer {
        self.serializer.as_ref()
    }

    /// Value stored under `key`
    pub fn get(&self, key: &str) -> MellonResult<Option<Value>> {
        Ok(self.data()?.remove(key))
    }

    /// Store `value` under `key`, rewriting the whole entry
    pub fn set(&self, key: &str, value: impl Into<Value>) -> MellonResult<()> {
        let mut data = self.data()?;
        data.insert(key.to_string(), value.into());
        self.dump(&data)
    }

    /// Remove `key`, rewriting the whole entry if it was present
    pub fn delete(&self, key: &str) -> MellonResult<()> {
        let mut data = self.data()?;
        if data.remove(key).is_some() {
            self.dump(&data)?;
        }
        Ok(())
    }

    pub fn contains_key(&self, key: &str) -> MellonResult<bool> {
        Ok(self.data()?.contains_key(key))
    }

    /// Value under `key`, failing with [`MellonError::KeyNotFound`] if absent
    pub fn fetch(&self, key: &str) -> MellonResult<Value> {
        self.get(key)?
            .ok_or_else(|| MellonError::KeyNotFound(key.to_string()))
    }

    /// Value under `key`, or `default` if absent
    pub fn fetch_or(&self, key: &str, default: impl Into<Value>) -> MellonResult<Value> {
        Ok(self.get(key)?.unwrap_or_else(|| default.into()))
    }

    /// Value under `key`, or the result of `fallback(key)` if absent
    pub fn fetch_or_else<F>(&self, key: &str, fallback: F) -> MellonResult<Value>
    where
        F: FnOnce(&str) -> Value,
    {
        Ok(self.get(key)?.unwrap_or_else(|| fallback(key)))
    }

    /// Snapshot of the whole mapping
    pub fn to_map(&self) -> MellonResult<StoreData> {
        self.data()
    }

    fn data(&self) -> MellonResult<StoreData> {
        match self.keychain.get(&self.project_name)? {
            Some(payload) => self.serializer.load(&payload),
            None => Ok(StoreData::new()),
        }
    }

    fn dump(&self, data: &StoreData) -> MellonResult<()> {
        let payload = self.serializer.dump(data)?;
        self.keychain.set(&self.project_name, Some(&payload))
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("project_name", &self.project_name)
            .field("keychain", &self.keychain)
            .field("serializer", &self.serializer.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::{CommandOutput, FakeEntry, FakeSecurity, ScriptedRunner};
    use serde_json::json;

    const PROJECTS: &str = "/Users/me/Library/Keychains/projects.keychain";
    const LOGIN: &str = "/Users/me/Library/Keychains/login.keychain";

    fn fixture() -> (Security, Keychain) {
        let fake = FakeSecurity::new()
            .with_default(LOGIN)
            .with_keychain(PROJECTS)
            .with_entry(
                PROJECTS,
                FakeEntry::note("yaml store", "---\nsome value: This is some yaml value\n"),
            )
            .with_entry(
                PROJECTS,
                FakeEntry::note("json store", r#"{"some value":"This is some json value"}"#),
            )
            .with_entry(PROJECTS, FakeEntry::note("empty", ""));
        let security = Security::with_runner(Arc::new(fake));
        let keychain = Keychain::new(&security, PROJECTS);
        (security, keychain)
    }

    #[test]
    fn test_get_existing_value() {
        let (_, keychain) = fixture();
        let store = Store::new("yaml store", keychain);
        assert_eq!(store.get("some value").unwrap(), Some(json!("This is some yaml value")));
        assert_eq!(store.get("other").unwrap(), None);
    }

    #[test]
    fn test_missing_entry_is_empty_store() {
        let (_, keychain) = fixture();
        let store = Store::new("missing project", keychain);
        assert_eq!(store.get("some value").unwrap(), None);
        assert!(store.to_map().unwrap().is_empty());

        store.set("some value", "That value").unwrap();
        assert_eq!(store.get("some value").unwrap(), Some(json!("That value")));
    }

    #[test]
    fn test_empty_entry_is_empty_store() {
        let (_, keychain) = fixture();
        let store = Store::new("empty", keychain);
        assert_eq!(store.get("some value").unwrap(), None);
        store.set("some value", "New value").unwrap();
        assert_eq!(store.get("some value").unwrap(), Some(json!("New value")));
    }

    #[test]
    fn test_set_keeps_other_keys() {
        let (_, keychain) = fixture();
        let store = Store::new("yaml store", keychain.clone());
        store.set("some value", "This is a new value").unwrap();
        store.set("port", 5432).unwrap();

        let map = store.to_map().unwrap();
        assert_eq!(map["some value"], json!("This is a new value"));
        assert_eq!(map["port"], json!(5432));

        let payload = keychain.get("yaml store").unwrap().unwrap();
        assert!(payload.contains("port: 5432"));
    }

    #[test]
    fn test_to_map_is_a_snapshot() {
        let (_, keychain) = fixture();
        let store = Store::new("yaml store", keychain);
        let mut snapshot = store.to_map().unwrap();
        snapshot.insert("local".into(), json!(true));
        assert!(!store.contains_key("local").unwrap());
    }

    #[test]
    fn test_delete_key() {
        let (_, keychain) = fixture();
        let store = Store::new("yaml store", keychain);
        store.set("temp", 1).unwrap();
        store.delete("temp").unwrap();
        assert!(!store.contains_key("temp").unwrap());
        assert!(store.contains_key("some value").unwrap());
        store.delete("never there").unwrap();
    }

    #[test]
    fn test_fetch() {
        let (_, keychain) = fixture();
        let store = Store::new("yaml store", keychain);
        assert_eq!(store.fetch("some value").unwrap(), json!("This is some yaml value"));
        assert_eq!(store.fetch_or("missing", "d").unwrap(), json!("d"));
        assert_eq!(
            store.fetch_or_else("missing", |_| json!("b")).unwrap(),
            json!("b")
        );
        assert_eq!(
            store
                .fetch_or_else("missing", |key| json!(format!("no {}", key)))
                .unwrap(),
            json!("no missing")
        );

        let err = store.fetch("missing").unwrap_err();
        assert!(matches!(err, MellonError::KeyNotFound(ref k) if k == "missing"));
    }

    #[test]
    fn test_json_serializer() {
        let (_, keychain) = fixture();
        let store = Store::new("json store", keychain.clone()).with_serializer(Arc::new(JsonSerializer));
        assert_eq!(store.get("some value").unwrap(), Some(json!("This is some json value")));
        store.set("some value", "New value").unwrap();
        assert_eq!(store.get("some value").unwrap(), Some(json!("New value")));
        assert!(keychain.get("json store").unwrap().unwrap().starts_with('{'));
    }

    #[test]
    fn test_open_with_explicit_keychain() {
        let (security, keychain) = fixture();
        let store = Store::open(&security, "yaml store", keychain.clone()).unwrap();
        assert_eq!(store.keychain(), &keychain);
        assert_eq!(store.project_name(), "yaml store");
        assert_eq!(store.serializer().name(), "yaml");
    }

    #[test]
    fn test_open_by_keychain_name() {
        let (security, keychain) = fixture();
        let store = Store::open(&security, "anything", "PROJ").unwrap();
        assert_eq!(store.keychain(), &keychain);
    }

    #[test]
    fn test_open_searches_for_project() {
        let (security, keychain) = fixture();
        let store = Store::open(&security, "json store", KeychainSelector::Search).unwrap();
        assert_eq!(store.keychain(), &keychain);
    }

    #[test]
    fn test_open_falls_back_to_default() {
        let (security, _) = fixture();
        let store = Store::open(&security, "brand new project", KeychainSelector::Search).unwrap();
        assert_eq!(store.keychain().path(), LOGIN);
    }

    #[test]
    fn test_open_search_propagates_failures() {
        let runner = ScriptedRunner::new().respond(
            "security find-generic-password -l app",
            CommandOutput::failed(51, "security: User interaction is not allowed."),
        );
        let security = Security::with_runner(Arc::new(runner));
        assert!(matches!(
            Store::open(&security, "app", KeychainSelector::Search),
            Err(MellonError::Command { .. })
        ));
    }

    #[test]
    fn test_from_config_verifies_keychains() {
        let (security, _) = fixture();
        let stale = Keychain::new(&security, "/Users/me/Library/Keychains/gone.keychain");

        let strict = MellonConfig::default();
        let err = Store::from_config(&security, &strict, "app", stale.clone()).unwrap_err();
        assert!(matches!(err, MellonError::MissingKeychain { ref path } if path.ends_with("gone.keychain")));

        let store = Store::from_config(&security, &strict, "app", "proj").unwrap();
        assert_eq!(store.keychain().path(), PROJECTS);

        let lenient = MellonConfig {
            verify_keychains: false,
            ..Default::default()
        };
        let store = Store::from_config(&security, &lenient, "app", stale.clone()).unwrap();
        assert_eq!(store.keychain(), &stale);
    }

    #[test]
    fn test_from_config_picks_serializer() {
        let (security, keychain) = fixture();
        let config = MellonConfig {
            serializer: "json".to_string(),
            ..Default::default()
        };
        let store = Store::from_config(&security, &config, "json store", keychain.clone()).unwrap();
        assert_eq!(store.serializer().name(), "json");

        let config = MellonConfig {
            serializer: "xml".to_string(),
            ..Default::default()
        };
        let err = Store::from_config(&security, &config, "json store", keychain).unwrap_err();
        assert!(matches!(err, MellonError::UnknownSerializer(ref s) if s == "xml"));
    }
}
