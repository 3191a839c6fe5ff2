//! Configuration for the keychain layer
//!
//! Sources, lowest precedence first:
//! - built-in defaults
//! - YAML file (`~/.config/mellon/config.yaml` or an explicit path)
//! - `MELLON_*` environment variables

mod file;

pub use file::{MellonConfig, ENV_PROGRAM, ENV_SERIALIZER, ENV_VERIFY_KEYCHAINS};
