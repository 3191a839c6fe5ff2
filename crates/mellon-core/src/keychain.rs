//! Keychains and the entries inside them
//!
//! A [`Keychain`] is a path plus a [`Security`] handle. Every operation is a
//! fresh invocation of the tool; nothing is cached between calls.

use std::hash::{Hash, Hasher};
use std::path::Path;

use tracing::debug;

use crate::config::MellonConfig;
use crate::entry::{EntryInfo, EntryOptions};
use crate::error::{absent_if_missing, MellonError, MellonResult};
use crate::parser;
use crate::shell::Security;

/// One keychain file known to the `security` tool
///
/// Equality and hashing consider only the path, so two handles on the same
/// file compare equal and can be used interchangeably as map keys.
///
/// # Example
///
/// ```no_run
/// use mellon_core::{Keychain, Security};
///
/// let security = Security::new();
/// let keychain = Keychain::find(&security, "projects")?;
///
/// keychain.set("api token", Some("s3cret"))?;
/// assert_eq!(keychain.get("api token")?.as_deref(), Some("s3cret"));
///
/// keychain.set("api token", None)?;
/// assert_eq!(keychain.get("api token")?, None);
/// # Ok::<(), mellon_core::MellonError>(())
/// ```
#[derive(Clone)]
pub struct Keychain {
    path: String,
    security: Security,
}

impl Keychain {
    /// Bind to a path without checking that the keychain exists
    ///
    /// Used for paths the tool itself reported.
    pub fn new(security: &Security, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            security: security.clone(),
        }
    }

    /// Bind to a path, failing fast if the tool does not know the keychain
    pub fn open(security: &Security, path: impl Into<String>) -> MellonResult<Self> {
        let keychain = Self::new(security, path);
        keychain.ensure_exists()?;
        Ok(keychain)
    }

    /// Bind to a path, probing it first when `config.verify_keychains` is set
    pub fn bind(
        security: &Security,
        config: &MellonConfig,
        path: impl Into<String>,
    ) -> MellonResult<Self> {
        if config.verify_keychains {
            Self::open(security, path)
        } else {
            Ok(Self::new(security, path))
        }
    }

    /// All keychains on the search list, in the tool's order
    pub fn list(security: &Security) -> MellonResult<Vec<Keychain>> {
        let output = security.run(&["list-keychains"])?;
        Ok(parser::parse_keychain_list(&output)
            .into_iter()
            .map(|path| Self::new(security, path))
            .collect())
    }

    /// The user's default keychain
    pub fn default(security: &Security) -> MellonResult<Keychain> {
        let output = security.run(&["default-keychain"])?;
        let path = parser::parse_default_keychain(&output).ok_or_else(|| {
            MellonError::UnexpectedOutput {
                command: format!("{} default-keychain", security.program()),
                output: output.clone(),
            }
        })?;
        Ok(Self::new(security, path))
    }

    /// First listed keychain whose name contains `name`, ignoring case
    pub fn find(security: &Security, name: &str) -> MellonResult<Keychain> {
        let mut keychains = Self::list(security)?;
        match keychains.iter().position(|k| k.matches(name)) {
            Some(index) => Ok(keychains.swap_remove(index)),
            None => Err(MellonError::keychain_not_found(
                name,
                keychains.iter().map(Keychain::name).collect(),
            )),
        }
    }

    /// First keychain, in the tool's search order, holding an entry labelled `key`
    ///
    /// Returns `None` when no keychain has such an entry; any other failure
    /// of the tool is returned as an error.
    pub fn search(security: &Security, key: &str) -> MellonResult<Option<Keychain>> {
        let output = absent_if_missing(security.run(&["find-generic-password", "-l", key]))?;
        Ok(output
            .as_deref()
            .and_then(parser::parse_keychain_path)
            .map(|path| Self::new(security, path)))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// File name without its extension, e.g. `login` for `login.keychain-db`
    pub fn name(&self) -> String {
        Path::new(&self.path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Case-insensitive substring match against [`name`](Self::name)
    pub fn matches(&self, name: &str) -> bool {
        self.name().to_lowercase().contains(&name.to_lowercase())
    }

    /// Payload of the entry labelled `key`, or `None` if there is none
    pub fn get(&self, key: &str) -> MellonResult<Option<String>> {
        Ok(self.read(key)?.map(|(_, payload)| payload))
    }

    /// Metadata and payload of the entry labelled `key`
    pub fn read(&self, key: &str) -> MellonResult<Option<(EntryInfo, String)>> {
        let output = absent_if_missing(self.command(&["find-generic-password", "-g", "-l", key]))?;
        Ok(output.map(|output| {
            // -g prints the attributes on stdout and the payload on stderr
            (
                parser::parse_info(&output.stdout),
                parser::parse_contents(&output.stderr),
            )
        }))
    }

    /// Write `payload` under `key`, or delete the entry when `payload` is `None`
    ///
    /// An existing entry keeps its account, service, label and type; a new
    /// one gets the defaults from the entry type registry. Deleting an entry
    /// that does not exist is not an error.
    pub fn set(&self, key: &str, payload: Option<&str>) -> MellonResult<()> {
        self.set_with(key, payload, &EntryOptions::default())
    }

    /// Like [`set`](Self::set), with metadata overrides for new entries
    pub fn set_with(
        &self,
        key: &str,
        payload: Option<&str>,
        options: &EntryOptions,
    ) -> MellonResult<()> {
        let info = match self.read(key)? {
            Some((info, _)) => info,
            None => EntryInfo::build(key, options)?,
        };

        match payload {
            Some(payload) => self.write(&info, payload),
            None => self.remove(&info),
        }
    }

    /// Delete the entry labelled `key` if present
    pub fn delete(&self, key: &str) -> MellonResult<()> {
        self.set(key, None)
    }

    /// Labels of every recognized entry, in dump order
    pub fn keys(&self) -> MellonResult<Vec<String>> {
        let dump = self.command(&["dump-keychain"])?;
        Ok(parser::parse_dump(&dump.stdout)
            .into_iter()
            .map(|(_, info)| info.label)
            .collect())
    }

    fn write(&self, info: &EntryInfo, payload: &str) -> MellonResult<()> {
        debug!(keychain = %self.path, label = %info.label, "writing entry");
        self.command(&[
            "add-generic-password",
            "-a",
            &info.account_name,
            "-s",
            &info.service_name,
            "-l",
            &info.label,
            "-D",
            &info.kind,
            "-C",
            &info.type_tag,
            // no application gets access without confirmation
            "-T",
            "",
            // update in place if the item exists
            "-U",
            "-w",
            payload,
        ])?;
        Ok(())
    }

    fn remove(&self, info: &EntryInfo) -> MellonResult<()> {
        debug!(keychain = %self.path, label = %info.label, "deleting entry");
        absent_if_missing(self.command(&[
            "delete-generic-password",
            "-a",
            &info.account_name,
            "-s",
            &info.service_name,
            "-l",
            &info.label,
            "-D",
            &info.kind,
            "-C",
            &info.type_tag,
        ]))?;
        Ok(())
    }

    fn ensure_exists(&self) -> MellonResult<()> {
        match self.command(&["show-keychain-info"]) {
            Ok(_) => Ok(()),
            Err(e) if e.is_keychain_not_found() => Err(MellonError::MissingKeychain {
                path: self.path.clone(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Run a subcommand scoped to this keychain
    fn command(&self, args: &[&str]) -> MellonResult<crate::shell::CommandOutput> {
        let mut scoped = args.to_vec();
        scoped.push(&self.path);
        self.security.run_full(&scoped)
    }
}

impl PartialEq for Keychain {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Keychain {}

impl Hash for Keychain {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl std::fmt::Debug for Keychain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keychain").field("path", &self.path).finish()
    }
}

impl std::fmt::Display for Keychain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path)
    }
}
