//! Entry metadata and the entry type registry

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use crate::error::{MellonError, MellonResult};

/// Symbolic name of the entry type used when none is requested
pub const DEFAULT_ENTRY_TYPE: &str = "note";

/// How one kind of keychain item is described to the tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryType {
    /// Symbolic name, e.g. `note`
    pub name: &'static str,
    /// Human-readable kind (`-D`), e.g. `secure note`
    pub kind: &'static str,
    /// Short type code (`-C`) correlated with the kind
    pub type_tag: &'static str,
}

/// Entry types this crate creates and recognizes when enumerating
pub static ENTRY_TYPES: Lazy<BTreeMap<&'static str, EntryType>> = Lazy::new(|| {
    let mut map = BTreeMap::new();
    map.insert(
        "note",
        EntryType {
            name: "note",
            kind: "secure note",
            type_tag: "note",
        },
    );
    map
});

/// Look up a registered entry type by symbolic name
pub fn entry_type(name: &str) -> Option<&'static EntryType> {
    ENTRY_TYPES.get(name)
}

/// Whether a type code read back from the tool belongs to a registered type
pub fn is_known_type_tag(type_tag: &str) -> bool {
    ENTRY_TYPES.values().any(|t| t.type_tag == type_tag)
}

/// Metadata of one keychain item
///
/// Within a keychain an item is identified by `account_name` together with
/// `service_name`; the label is only what lookups by key match on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EntryInfo {
    pub account_name: String,
    pub service_name: String,
    pub label: String,
    pub kind: String,
    pub type_tag: String,
}

/// Overrides for the metadata of newly created entries
#[derive(Debug, Clone, Default)]
pub struct EntryOptions {
    /// Symbolic entry type, defaults to [`DEFAULT_ENTRY_TYPE`]
    pub entry_type: Option<String>,
    pub account_name: Option<String>,
    pub service_name: Option<String>,
    pub label: Option<String>,
}

impl EntryOptions {
    pub fn account_name(mut self, account_name: impl Into<String>) -> Self {
        self.account_name = Some(account_name.into());
        self
    }

    pub fn service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn entry_type(mut self, entry_type: impl Into<String>) -> Self {
        self.entry_type = Some(entry_type.into());
        self
    }
}

impl EntryInfo {
    /// Default metadata for a new entry stored under `key`
    ///
    /// Account name defaults to empty, service name to `key`, and label to
    /// the service name.
    pub fn build(key: &str, options: &EntryOptions) -> MellonResult<Self> {
        let type_name = options.entry_type.as_deref().unwrap_or(DEFAULT_ENTRY_TYPE);
        let entry_type = entry_type(type_name)
            .ok_or_else(|| MellonError::UnknownEntryType(type_name.to_string()))?;

        let service_name = options
            .service_name
            .clone()
            .unwrap_or_else(|| key.to_string());
        let label = options
            .label
            .clone()
            .unwrap_or_else(|| service_name.clone());

        Ok(Self {
            account_name: options.account_name.clone().unwrap_or_default(),
            service_name,
            label,
            kind: entry_type.kind.to_string(),
            type_tag: entry_type.type_tag.to_string(),
        })
    }

    /// Whether the type code belongs to a registered entry type
    pub fn is_recognized(&self) -> bool {
        is_known_type_tag(&self.type_tag)
    }
}
