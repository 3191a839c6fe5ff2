//! Parsers for `security` output
//!
//! The tool's text is treated as a loosely versioned wire format. Each
//! function here is total: anything it cannot make sense of comes back as
//! an empty value rather than an error.
//!
//! Attribute dumps look like this:
//!
//! ```text
//! keychain: "/Users/me/Library/Keychains/projects.keychain"
//! version: 512
//! class: "genp"
//! attributes:
//!     0x00000007 <blob>="simple"
//!     "acct"<blob>=<NULL>
//!     "desc"<blob>="secure note"
//!     "svce"<blob>="simple"
//!     "type"<uint32>="note"
//! ```
//!
//! and `find-generic-password -g` prints the payload on stderr as either
//! `password: "text"` or `password: 0x48656C6C6F  "Hello"`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::entry::EntryInfo;

/// Attribute codes of the fields carried in [`EntryInfo`]
pub mod attr {
    pub const ACCOUNT: &str = "acct";
    pub const KIND: &str = "desc";
    pub const TYPE: &str = "type";
    pub const LABEL: &str = "0x00000007";
    pub const SERVICE: &str = "svce";
}

/// Key of the plist field wrapping a secure note's text
pub const NOTE_FIELD: &str = "NOTE";

static QUOTED_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r#""(.+)""#).expect("valid regex"));

static KEYCHAIN_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"keychain: "(.+)""#).expect("valid regex"));

static ATTRIBUTES_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*attributes:").expect("valid regex"));

static ATTRIBUTE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*(?:"(?P<quoted>[^"]+)"|(?P<bare>0x[0-9A-Fa-f]+))\s*<[^>]*>=(?P<value>.*)$"#)
        .expect("valid regex")
});

static HEX_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^0x(?P<hex>[0-9A-Fa-f]+)(?:\s+"(?P<shown>.*)")?\s*$"#).expect("valid regex")
});

static PAYLOAD_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^password: ").expect("valid regex"));

static HEX_PAYLOAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\A0x([a-f0-9]+)(?:\s|\z)").expect("valid regex"));

static QUOTED_PAYLOAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)\A"(.+)""#).expect("valid regex"));

/// Keychain paths from `security list-keychains`, in listed order
pub fn parse_keychain_list(output: &str) -> Vec<String> {
    QUOTED_PATH
        .captures_iter(output)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Path from `security default-keychain`
pub fn parse_default_keychain(output: &str) -> Option<String> {
    QUOTED_PATH
        .captures(output)
        .map(|caps| caps[1].to_string())
}

/// Owning keychain path from an attribute dump (`keychain: "…"`)
pub fn parse_keychain_path(output: &str) -> Option<String> {
    KEYCHAIN_LINE
        .captures(output)
        .map(|caps| caps[1].to_string())
}

/// Value of the first attribute line with the given code
///
/// `<NULL>` and missing attributes both yield an empty string. Hex-encoded
/// values are decoded; when they are not valid UTF-8 the tool's own quoted
/// rendering is used instead.
pub fn attribute(info: &str, code: &str) -> String {
    info.lines()
        .filter_map(|line| ATTRIBUTE_LINE.captures(line))
        .find(|caps| {
            caps.name("quoted")
                .or_else(|| caps.name("bare"))
                .map_or(false, |m| m.as_str() == code)
        })
        .map(|caps| attribute_value(caps.name("value").map_or("", |m| m.as_str())))
        .unwrap_or_default()
}

fn attribute_value(raw: &str) -> String {
    let raw = raw.trim_end();
    if raw == "<NULL>" {
        return String::new();
    }
    if let Some(caps) = HEX_VALUE.captures(raw) {
        let decoded = hex::decode(&caps["hex"])
            .ok()
            .map(|mut bytes| {
                while bytes.last() == Some(&0) {
                    bytes.pop();
                }
                bytes
            })
            .and_then(|bytes| String::from_utf8(bytes).ok());
        return match decoded {
            Some(text) => text,
            None => caps
                .name("shown")
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        };
    }
    raw.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or_default()
        .to_string()
}

/// Entry metadata from an attribute dump
pub fn parse_info(info: &str) -> EntryInfo {
    EntryInfo {
        account_name: attribute(info, attr::ACCOUNT),
        kind: attribute(info, attr::KIND),
        type_tag: attribute(info, attr::TYPE),
        label: attribute(info, attr::LABEL),
        service_name: attribute(info, attr::SERVICE),
    }
}

/// Raw payload bytes from a `password: …` line
///
/// Only the first line starting with `password: ` is the tool's marker;
/// anything after it belongs to the payload, even text that looks like
/// another marker. Hex takes precedence over the quoted form; the quoted
/// form may span several lines. No marker means an empty payload.
pub fn parse_payload_bytes(password: &str) -> Vec<u8> {
    let Some(marker) = PAYLOAD_MARKER.find(password) else {
        return Vec::new();
    };
    let value = &password[marker.end()..];
    if let Some(caps) = HEX_PAYLOAD.captures(value) {
        if let Ok(bytes) = hex::decode(&caps[1]) {
            return bytes;
        }
    }
    QUOTED_PAYLOAD
        .captures(value)
        .map(|caps| caps[1].as_bytes().to_vec())
        .unwrap_or_default()
}

/// Text content of an entry
///
/// Secure notes created by Keychain Access store their text inside a plist
/// dictionary under [`NOTE_FIELD`]; such payloads are unwrapped, anything
/// else is returned as text verbatim.
pub fn parse_contents(password: &str) -> String {
    let raw = parse_payload_bytes(password);
    unwrap_note(&raw).unwrap_or_else(|| String::from_utf8_lossy(&raw).into_owned())
}

fn unwrap_note(raw: &[u8]) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let value = plist::Value::from_reader(std::io::Cursor::new(raw)).ok()?;
    value
        .as_dictionary()?
        .get(NOTE_FIELD)?
        .as_string()
        .map(str::to_string)
}

/// Recognized entries from `security dump-keychain`, with their keychain path
///
/// Attribute lines are grouped under the most recent `keychain:` line that
/// precedes their `attributes:` marker. Groups whose type code is not in the
/// entry type registry are dropped.
pub fn parse_dump(dump: &str) -> Vec<(String, EntryInfo)> {
    let mut entries = Vec::new();
    let mut keychain: Option<String> = None;
    let mut in_attributes = false;
    let mut chunk = String::new();

    let mut flush = |keychain: &Option<String>, chunk: &mut String| {
        if let Some(path) = keychain {
            if !chunk.is_empty() {
                let info = parse_info(chunk.as_str());
                if info.is_recognized() {
                    entries.push((path.clone(), info));
                }
            }
        }
        chunk.clear();
    };

    for line in dump.lines() {
        if ATTRIBUTES_START.is_match(line) {
            flush(&keychain, &mut chunk);
            in_attributes = true;
        } else if let Some(path) = line
            .starts_with("keychain:")
            .then(|| parse_keychain_path(line))
            .flatten()
        {
            flush(&keychain, &mut chunk);
            in_attributes = false;
            keychain = Some(path);
        } else if in_attributes {
            chunk.push_str(line);
            chunk.push('\n');
        }
    }
    flush(&keychain, &mut chunk);

    entries
}
