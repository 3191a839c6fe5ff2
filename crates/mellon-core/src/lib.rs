//! Mellon Core
//!
//! Secure notes and key-value stores kept in macOS keychains.
//! Everything goes through the `security` command-line tool: this crate
//! builds its invocations, runs them, and parses the loosely structured
//! text they print.
//!
//! ## Layers
//!
//! - `shell`: runs the tool and turns non-zero exits into errors
//! - `parser`: keychain listings, attribute dumps and payloads to data
//! - `keychain`: find keychains and read, write, delete and list entries
//! - `store`: a whole serialized mapping inside one entry
//!
//! ```rust,no_run
//! use mellon_core::{KeychainSelector, Security, Store};
//!
//! let security = Security::new();
//!
//! // Keychain already holding "myapp", else the default keychain
//! let store = Store::open(&security, "myapp", KeychainSelector::Search)?;
//! store.set("api_key", "sk-test")?;
//! let key = store.fetch("api_key")?;
//! # Ok::<(), mellon_core::MellonError>(())
//! ```

pub mod config;
pub mod entry;
pub mod error;
pub mod keychain;
pub mod logging;
pub mod parser;
pub mod shell;
pub mod store;

pub use config::MellonConfig;
pub use entry::{EntryInfo, EntryOptions, EntryType, ENTRY_TYPES};
pub use error::{MellonError, MellonResult, ITEM_NOT_FOUND, KEYCHAIN_NOT_FOUND};
pub use keychain::Keychain;
pub use shell::{
    CommandOutput, CommandRunner, FakeEntry, FakeSecurity, ScriptedRunner, Security, SystemRunner,
};
pub use store::{JsonSerializer, KeychainSelector, Serializer, Store, StoreData, YamlSerializer};
