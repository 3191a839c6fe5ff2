//! In-process stand-ins for the `security` tool
//!
//! `FakeSecurity` keeps keychains in memory and answers the subset of
//! subcommands the keychain layer issues, printing the same text the real
//! tool prints. `ScriptedRunner` replays canned output for exact command
//! lines and records what was called.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{CommandOutput, CommandRunner};
use crate::error::ITEM_NOT_FOUND;

const EXIT_ITEM_NOT_FOUND: i32 = 44;
const EXIT_DUPLICATE_ITEM: i32 = 45;
const EXIT_NO_SUCH_KEYCHAIN: i32 = 50;

/// One generic-password item held by [`FakeSecurity`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeEntry {
    pub label: String,
    pub account: String,
    pub service: String,
    pub kind: String,
    pub type_tag: String,
    pub data: Vec<u8>,
}

impl FakeEntry {
    /// A secure note whose label and service are both `label`
    pub fn note(label: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let label = label.into();
        Self {
            service: label.clone(),
            label,
            account: String::new(),
            kind: "secure note".to_string(),
            type_tag: "note".to_string(),
            data: data.into(),
        }
    }

    pub fn with_type(mut self, kind: impl Into<String>, type_tag: impl Into<String>) -> Self {
        self.kind = kind.into();
        self.type_tag = type_tag.into();
        self
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = account.into();
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }
}

#[derive(Debug, Default)]
struct FakeState {
    /// Keychain paths in search order
    order: Vec<String>,
    entries: HashMap<String, Vec<FakeEntry>>,
    default: Option<String>,
    /// Subcommand -> stderr to fail with
    failures: HashMap<String, String>,
}

/// In-memory emulation of the `security` command-line tool
///
/// ```
/// use std::sync::Arc;
/// use mellon_core::{FakeSecurity, FakeEntry, Keychain, Security};
///
/// let fake = FakeSecurity::new()
///     .with_keychain("/k/projects.keychain")
///     .with_entry("/k/projects.keychain", FakeEntry::note("simple", "Simple note"));
/// let security = Security::with_runner(Arc::new(fake));
///
/// let keychain = Keychain::new(&security, "/k/projects.keychain");
/// assert_eq!(keychain.get("simple").unwrap().as_deref(), Some("Simple note"));
/// ```
#[derive(Debug, Default)]
pub struct FakeSecurity {
    state: Mutex<FakeState>,
}

impl FakeSecurity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a keychain; the first one registered becomes the default
    pub fn with_keychain(self, path: impl Into<String>) -> Self {
        let path = path.into();
        {
            let mut state = self.state.lock();
            if !state.order.contains(&path) {
                state.order.push(path.clone());
                state.entries.entry(path.clone()).or_default();
            }
            if state.default.is_none() {
                state.default = Some(path);
            }
        }
        self
    }

    pub fn with_default(self, path: impl Into<String>) -> Self {
        let path = path.into();
        let this = self.with_keychain(path.clone());
        this.state.lock().default = Some(path);
        this
    }

    pub fn with_entry(self, path: impl Into<String>, entry: FakeEntry) -> Self {
        let path = path.into();
        let this = self.with_keychain(path.clone());
        this.state.lock().entries.entry(path).or_default().push(entry);
        this
    }

    /// Make every invocation of `subcommand` fail with `stderr`
    pub fn fail(self, subcommand: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.state
            .lock()
            .failures
            .insert(subcommand.into(), stderr.into());
        self
    }

    /// Snapshot of the items stored in one keychain
    pub fn entries(&self, path: &str) -> Vec<FakeEntry> {
        self.state
            .lock()
            .entries
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    fn dispatch(&self, args: &[String]) -> CommandOutput {
        let Some((subcommand, rest)) = args.split_first() else {
            return CommandOutput::failed(2, "usage: security [-h] command [opt ...]");
        };

        let mut state = self.state.lock();
        if let Some(stderr) = state.failures.get(subcommand.as_str()) {
            return CommandOutput::failed(1, stderr.clone());
        }

        let opts = Options::parse(rest);
        match subcommand.as_str() {
            "list-keychains" => CommandOutput::ok(
                state
                    .order
                    .iter()
                    .map(|path| format!("    \"{}\"\n", path))
                    .collect::<String>(),
            ),
            "default-keychain" => match &state.default {
                Some(path) => CommandOutput::ok(format!("    \"{}\"\n", path)),
                None => CommandOutput::failed(
                    EXIT_NO_SUCH_KEYCHAIN,
                    "security: SecKeychainCopyDefault: A default keychain could not be found.",
                ),
            },
            "show-keychain-info" => {
                let path = opts.positional.first().cloned().unwrap_or_default();
                if state.entries.contains_key(&path) {
                    CommandOutput::ok("").with_stderr(format!("Keychain \"{}\" no-timeout\n", path))
                } else {
                    no_such_keychain("SecKeychainCopySettings", &path)
                }
            }
            "find-generic-password" => state.find(&opts),
            "add-generic-password" => state.add(&opts),
            "delete-generic-password" => state.delete(&opts),
            "dump-keychain" => state.dump(&opts),
            other => CommandOutput::failed(
                2,
                format!("security: unknown command \"{}\"", other),
            ),
        }
    }
}

impl CommandRunner for FakeSecurity {
    fn run(&self, _program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        Ok(self.dispatch(args))
    }
}

impl FakeState {
    /// Keychains an operation applies to: the ones named, else all in order
    fn scope(&self, opts: &Options) -> Result<Vec<String>, CommandOutput> {
        if opts.positional.is_empty() {
            return Ok(self.order.clone());
        }
        for path in &opts.positional {
            if !self.entries.contains_key(path) {
                return Err(no_such_keychain("SecKeychainOpen", path));
            }
        }
        Ok(opts.positional.clone())
    }

    fn find(&self, opts: &Options) -> CommandOutput {
        let scope = match self.scope(opts) {
            Ok(scope) => scope,
            Err(failure) => return failure,
        };
        for path in &scope {
            let found = self.entries[path].iter().find(|e| opts.selects(e));
            if let Some(entry) = found {
                let mut output = CommandOutput::ok(render_item(path, entry));
                if opts.flag('g') {
                    output.stderr = render_password(&entry.data);
                }
                return output;
            }
        }
        item_not_found()
    }

    fn add(&mut self, opts: &Options) -> CommandOutput {
        let scope = match self.scope(opts) {
            Ok(scope) => scope,
            Err(failure) => return failure,
        };
        let Some(path) = scope.first().or(self.default.as_ref()).cloned() else {
            return no_such_keychain("SecKeychainItemCreateFromContent", "");
        };

        let account = opts.value('a').unwrap_or_default();
        let service = opts.value('s').unwrap_or_default();
        let entry = FakeEntry {
            label: opts.value('l').unwrap_or_else(|| service.clone()),
            account: account.clone(),
            service: service.clone(),
            kind: opts.value('D').unwrap_or_default(),
            type_tag: opts.value('C').unwrap_or_default(),
            data: opts.value('w').unwrap_or_default().into_bytes(),
        };

        let items = self.entries.entry(path).or_default();
        match items
            .iter()
            .position(|e| e.account == account && e.service == service)
        {
            Some(index) if opts.flag('U') => items[index] = entry,
            Some(_) => {
                return CommandOutput::failed(
                    EXIT_DUPLICATE_ITEM,
                    "security: SecKeychainItemCreateFromContent (<default>): The specified item already exists in the keychain.",
                )
            }
            None => items.push(entry),
        }
        CommandOutput::ok("")
    }

    fn delete(&mut self, opts: &Options) -> CommandOutput {
        let scope = match self.scope(opts) {
            Ok(scope) => scope,
            Err(failure) => return failure,
        };
        for path in &scope {
            let Some(items) = self.entries.get_mut(path) else {
                continue;
            };
            if let Some(index) = items.iter().position(|e| opts.selects(e)) {
                let entry = items.remove(index);
                return CommandOutput::ok(render_item(path, &entry))
                    .with_stderr("password has been deleted.");
            }
        }
        item_not_found()
    }

    fn dump(&self, opts: &Options) -> CommandOutput {
        let scope = match self.scope(opts) {
            Ok(scope) => scope,
            Err(failure) => return failure,
        };
        let mut out = String::new();
        for path in &scope {
            for entry in &self.entries[path] {
                out.push_str(&render_item(path, entry));
            }
        }
        CommandOutput::ok(out)
    }
}

/// Parsed argv: single-letter options plus trailing keychain paths
#[derive(Debug, Default)]
struct Options {
    values: HashMap<char, String>,
    flags: Vec<char>,
    positional: Vec<String>,
}

impl Options {
    const WITH_VALUE: &'static [char] = &['a', 's', 'l', 'D', 'C', 'T', 'w', 'c', 'j', 'G'];

    fn parse(args: &[String]) -> Self {
        let mut opts = Self::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            let letter = arg
                .strip_prefix('-')
                .filter(|rest| rest.chars().count() == 1)
                .and_then(|rest| rest.chars().next());
            match letter {
                Some(c) if Self::WITH_VALUE.contains(&c) => {
                    let value = iter.next().cloned().unwrap_or_default();
                    opts.values.insert(c, value);
                }
                Some(c) => opts.flags.push(c),
                None => opts.positional.push(arg.clone()),
            }
        }
        opts
    }

    fn value(&self, c: char) -> Option<String> {
        self.values.get(&c).cloned()
    }

    fn flag(&self, c: char) -> bool {
        self.flags.contains(&c)
    }

    /// Whether every attribute given on the command line matches `entry`
    fn selects(&self, entry: &FakeEntry) -> bool {
        let checks = [
            ('a', &entry.account),
            ('s', &entry.service),
            ('l', &entry.label),
            ('D', &entry.kind),
            ('C', &entry.type_tag),
        ];
        checks
            .iter()
            .all(|(c, actual)| self.values.get(c).map_or(true, |want| want == *actual))
    }
}

fn item_not_found() -> CommandOutput {
    CommandOutput::failed(
        EXIT_ITEM_NOT_FOUND,
        format!("security: SecKeychainSearchCopyNext: {}", ITEM_NOT_FOUND),
    )
}

fn no_such_keychain(call: &str, path: &str) -> CommandOutput {
    CommandOutput::failed(
        EXIT_NO_SUCH_KEYCHAIN,
        format!(
            "security: {} {}: The specified keychain could not be found.",
            call, path
        ),
    )
}

fn is_printable(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| (0x20..0x7f).contains(b) && *b != b'"')
}

/// Octal-escaped rendering used next to hex values
fn escape(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| match b {
            0x20..=0x7e if b != b'"' && b != b'\\' => (b as char).to_string(),
            _ => format!("\\{:03o}", b),
        })
        .collect()
}

fn render_blob(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.is_empty() {
        "<NULL>".to_string()
    } else if is_printable(bytes) {
        format!("\"{}\"", value)
    } else {
        format!("0x{}  \"{}\"", hex::encode_upper(bytes), escape(bytes))
    }
}

fn render_password(data: &[u8]) -> String {
    if data.is_empty() {
        "password: ".to_string()
    } else if is_printable(data) {
        format!("password: \"{}\"", String::from_utf8_lossy(data))
    } else {
        format!("password: 0x{}  \"{}\"", hex::encode_upper(data), escape(data))
    }
}

fn render_item(path: &str, entry: &FakeEntry) -> String {
    let stamp = "0x32303133303933303132303030305A00  \"20130930120000Z\\000\"";
    let mut out = String::new();
    out.push_str(&format!("keychain: \"{}\"\n", path));
    out.push_str("version: 512\n");
    out.push_str("class: \"genp\"\n");
    out.push_str("attributes:\n");
    out.push_str(&format!("    0x00000007 <blob>={}\n", render_blob(&entry.label)));
    out.push_str("    0x00000008 <blob>=<NULL>\n");
    out.push_str(&format!("    \"acct\"<blob>={}\n", render_blob(&entry.account)));
    out.push_str(&format!("    \"cdat\"<timedate>={}\n", stamp));
    out.push_str("    \"crtr\"<uint32>=<NULL>\n");
    out.push_str("    \"cusi\"<sint32>=<NULL>\n");
    out.push_str(&format!("    \"desc\"<blob>={}\n", render_blob(&entry.kind)));
    out.push_str("    \"gena\"<blob>=<NULL>\n");
    out.push_str("    \"icmt\"<blob>=<NULL>\n");
    out.push_str("    \"invi\"<sint32>=<NULL>\n");
    out.push_str(&format!("    \"mdat\"<timedate>={}\n", stamp));
    out.push_str("    \"nega\"<sint32>=<NULL>\n");
    out.push_str("    \"prot\"<blob>=<NULL>\n");
    out.push_str("    \"scrp\"<sint32>=<NULL>\n");
    out.push_str(&format!("    \"svce\"<blob>={}\n", render_blob(&entry.service)));
    out.push_str(&format!("    \"type\"<uint32>={}\n", render_blob(&entry.type_tag)));
    out
}

/// Runner that replays canned output for exact command lines
///
/// Keys are the program followed by its arguments, joined by single
/// spaces. Unscripted commands fail to spawn.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: HashMap<String, CommandOutput>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, command: impl Into<String>, output: CommandOutput) -> Self {
        self.responses.insert(command.into(), output);
        self
    }

    /// Command lines received so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        let line = std::iter::once(program)
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.lock().push(line.clone());
        self.responses.get(&line).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no scripted response for `{}`", line),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_options_parse() {
        let opts = Options::parse(&args(&["-a", "", "-s", "svc", "-T", "", "-U", "-w", "x", "/k.keychain"]));
        assert_eq!(opts.value('a').as_deref(), Some(""));
        assert_eq!(opts.value('s').as_deref(), Some("svc"));
        assert_eq!(opts.value('w').as_deref(), Some("x"));
        assert!(opts.flag('U'));
        assert_eq!(opts.positional, vec!["/k.keychain".to_string()]);
    }

    #[test]
    fn test_render_password_forms() {
        assert_eq!(render_password(b"Simple note"), "password: \"Simple note\"");
        assert_eq!(
            render_password(b"a\nb"),
            "password: 0x610A62  \"a\\012b\""
        );
        assert_eq!(render_password(b""), "password: ");
    }

    #[test]
    fn test_find_reports_item_not_found() {
        let fake = FakeSecurity::new().with_keychain("/k/a.keychain");
        let out = fake.dispatch(&args(&["find-generic-password", "-l", "nope", "/k/a.keychain"]));
        assert!(!out.success());
        assert!(out.stderr.contains(ITEM_NOT_FOUND));
    }

    #[test]
    fn test_add_without_upsert_rejects_duplicates() {
        let fake = FakeSecurity::new().with_keychain("/k/a.keychain");
        let add = args(&["add-generic-password", "-a", "", "-s", "x", "-w", "1", "/k/a.keychain"]);
        assert!(fake.dispatch(&add).success());
        assert_eq!(fake.dispatch(&add).code, Some(EXIT_DUPLICATE_ITEM));
    }

    #[test]
    fn test_scripted_runner_records_calls() {
        let runner = ScriptedRunner::new().respond("security list-keychains", CommandOutput::ok(""));
        runner.run("security", &args(&["list-keychains"])).unwrap();
        assert!(runner.run("security", &args(&["dump-keychain"])).is_err());
        assert_eq!(
            runner.calls(),
            vec!["security list-keychains".to_string(), "security dump-keychain".to_string()]
        );
    }
}
