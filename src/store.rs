// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Flat key/value configuration storage.
//!
//! Envkeep keeps all of its configuration in simple dotenv-like files. Each
//! line holds exactly one `KEY=VALUE` assignment. Keys are case-insensitive,
//! and always normalized to upper-case. Values are plain strings with any
//! surrounding whitespace trimmed off.
//!
//! # Accepted Syntax
//!
//! ```text
//! # comment lines and blank lines are skipped
//! PRIMARY_VERSION=1
//! export GC_AUTO=yes
//! remote_storage="git@example.com:me/config.git"
//! ```
//!
//! Single-quoted values are taken literally. Double-quoted values understand
//! the escapes `\n`, `\r`, `\"`, and `\\`.
//!
//! Writing a store always replaces the target file in full. Serialization is
//! sorted by key. Values that would not read back unchanged, e.g., values
//! holding a line break or starting with a quote, are written double-quoted
//! and escaped.

use std::{
    borrow::Cow,
    collections::{btree_map, BTreeMap},
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read_to_string, write},
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::warn;

/// Ordered mapping of configuration keys to string values.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KeyValueStore {
    entries: BTreeMap<String, String>,
}

impl KeyValueStore {
    /// Construct new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load store from file.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Read`] if file cannot be read.
    /// - Return [`StoreError::Malformed`] if any line is not an assignment.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = read_to_string(path).map_err(|err| StoreError::Read {
            source: err,
            path: path.to_path_buf(),
        })?;

        content.parse().map_err(|err| StoreError::Malformed {
            source: err,
            path: path.to_path_buf(),
        })
    }

    /// Write store to file, replacing whatever the file contained before.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Write`] if file cannot be written.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        write(path, self.to_string().as_bytes()).map_err(|err| StoreError::Write {
            source: err,
            path: path.to_path_buf(),
        })
    }

    /// Get value of key, case-insensitive.
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        self.entries
            .get(&normalize_key(key.as_ref()))
            .map(String::as_str)
    }

    /// Get value of key, or empty string if key is not set.
    pub fn get_or_empty(&self, key: impl AsRef<str>) -> &str {
        self.get(key).unwrap_or_default()
    }

    /// Set key to value.
    ///
    /// Key is upper-cased, and both key and value are trimmed of surrounding
    /// whitespace.
    ///
    /// # Errors
    ///
    /// - Return [`InvalidKey`] if key cannot be written as an assignment, see
    ///   [`check_key`]. Store is left untouched.
    pub fn set(
        &mut self,
        key: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> std::result::Result<(), InvalidKey> {
        check_key(key.as_ref())?;
        self.entries
            .insert(normalize_key(key.as_ref()), value.as_ref().trim().to_owned());

        Ok(())
    }

    /// Remove key, returning its old value.
    pub fn remove(&mut self, key: impl AsRef<str>) -> Option<String> {
        self.entries.remove(&normalize_key(key.as_ref()))
    }

    /// Check if key is set.
    pub fn contains_key(&self, key: impl AsRef<str>) -> bool {
        self.entries.contains_key(&normalize_key(key.as_ref()))
    }

    /// Overlay every entry of another store on top of this one.
    ///
    /// Conflicting keys take the value from `other`. Keys only present in
    /// `self` are left alone.
    pub fn overlay(&mut self, other: &KeyValueStore) {
        for (key, value) in other.iter() {
            self.entries.insert(key.to_owned(), value.to_owned());
        }
    }

    /// Iterate over entries sorted by key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Amount of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if store has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromStr for KeyValueStore {
    type Err = MalformedLine;

    fn from_str(data: &str) -> std::result::Result<Self, Self::Err> {
        let mut store = KeyValueStore::new();
        for (index, line) in data.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let assignment = trimmed.strip_prefix("export ").unwrap_or(trimmed);
            let Some((key, value)) = assignment.split_once('=') else {
                return Err(MalformedLine::new(index + 1, line));
            };

            store
                .set(key, unquote(value.trim()))
                .map_err(|_| MalformedLine::new(index + 1, line))?;
        }

        Ok(store)
    }
}

impl Display for KeyValueStore {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for (key, value) in self.iter() {
            writeln!(fmt, "{key}={}", quote(value))?;
        }

        Ok(())
    }
}

/// Collect assignments into a store.
///
/// Entries with an invalid key are skipped with a warning. Use
/// [`KeyValueStore::set`] to treat them as errors.
impl<K, V> FromIterator<(K, V)> for KeyValueStore
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut store = KeyValueStore::new();
        for (key, value) in iter {
            if let Err(err) = store.set(key, value) {
                warn!("skipping entry: {err}");
            }
        }
        store
    }
}

impl IntoIterator for KeyValueStore {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Check that a key can be written as an assignment and read back.
///
/// A key must not be blank, must not contain `=` or line breaks, and must not
/// start with `#`.
///
/// # Errors
///
/// - Return [`InvalidKey`] naming the broken rule.
pub fn check_key(key: &str) -> std::result::Result<(), InvalidKey> {
    let trimmed = key.trim();
    let reason = if trimmed.is_empty() {
        "key is empty"
    } else if trimmed.contains('=') {
        "key contains '='"
    } else if trimmed.contains(['\n', '\r']) {
        "key contains a line break"
    } else if trimmed.starts_with('#') {
        "key starts with '#'"
    } else {
        return Ok(());
    };

    Err(InvalidKey {
        key: key.to_owned(),
        reason,
    })
}

fn normalize_key(key: &str) -> String {
    key.trim().to_uppercase()
}

fn is_quoted(value: &str, quote: char) -> bool {
    value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote)
}

fn unquote(value: &str) -> Cow<'_, str> {
    if is_quoted(value, '\'') {
        return Cow::Borrowed(&value[1..value.len() - 1]);
    }

    if is_quoted(value, '"') {
        return Cow::Owned(unescape(&value[1..value.len() - 1]));
    }

    Cow::Borrowed(value)
}

fn unescape(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            output.push(ch);
            continue;
        }

        match chars.next() {
            Some('n') => output.push('\n'),
            Some('r') => output.push('\r'),
            Some('"') => output.push('"'),
            Some('\\') => output.push('\\'),
            Some(other) => {
                output.push('\\');
                output.push(other);
            }
            None => output.push('\\'),
        }
    }

    output
}

// INVARIANT: unquote(quote(value)) == value for every trimmed value.
fn quote(value: &str) -> Cow<'_, str> {
    let plain = !value.contains(['\n', '\r'])
        && !value.starts_with(['"', '\''])
        && value.trim() == value;
    if plain {
        return Cow::Borrowed(value);
    }

    let mut output = String::with_capacity(value.len() + 2);
    output.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => output.push_str("\\\\"),
            '"' => output.push_str("\\\""),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            ch => output.push(ch),
        }
    }
    output.push('"');

    Cow::Owned(output)
}

/// Line that is not a valid `KEY=VALUE` assignment.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("line {line} is not a KEY=VALUE assignment: {content:?}")]
pub struct MalformedLine {
    pub line: usize,
    pub content: String,
}

/// Key that cannot be written as an assignment.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid configuration key {key:?}: {reason}")]
pub struct InvalidKey {
    pub key: String,
    pub reason: &'static str,
}

impl MalformedLine {
    fn new(line: usize, content: impl Into<String>) -> Self {
        Self {
            line,
            content: content.into(),
        }
    }
}

/// Key/value file I/O error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Configuration file cannot be read.
    #[error("failed to read configuration file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Configuration file cannot be written.
    #[error("failed to write configuration file at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Configuration file contains something other than assignments.
    #[error("malformed configuration file at {:?}", path.display())]
    Malformed {
        #[source]
        source: MalformedLine,
        path: PathBuf,
    },
}

impl StoreError {
    /// Check if error was caused by a missing file.
    ///
    /// Lets callers decide whether a missing file means "absent" or "fatal".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Read { source, .. } if source.kind() == ErrorKind::NotFound)
    }
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
