// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ordered, deduplicated environment variable map.

use lp_error::{ErrorCode, LaunchError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde::ser::SerializeMap;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// EnvCase
// ---------------------------------------------------------------------------

/// How variable names are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvCase {
    /// Byte-exact comparison (POSIX).
    Sensitive,
    /// Case-insensitive comparison (Windows). `Path` and `PATH` collide.
    Insensitive,
}

impl EnvCase {
    /// The rule used by the host platform.
    pub const fn native() -> Self {
        if cfg!(windows) {
            Self::Insensitive
        } else {
            Self::Sensitive
        }
    }

    /// Separator between entries of a path-list variable such as `PATH`.
    pub const fn path_separator(self) -> char {
        match self {
            Self::Sensitive => ':',
            Self::Insensitive => ';',
        }
    }

    fn sort_key(self, name: &str) -> String {
        match self {
            Self::Sensitive => name.to_owned(),
            Self::Insensitive => name.chars().map(fold_char).collect(),
        }
    }
}

// Per-character upper-casing, as Windows compares names. Mappings that
// expand (`ß` -> `SS`) leave the character unchanged.
fn fold_char(c: char) -> char {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) => u,
        _ => c,
    }
}

impl Default for EnvCase {
    fn default() -> Self {
        Self::native()
    }
}

// ---------------------------------------------------------------------------
// EnvVar
// ---------------------------------------------------------------------------

/// A single `name=value` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvVar {
    /// Variable name.
    pub name: String,
    /// Variable value, possibly empty.
    pub value: String,
}

impl EnvVar {
    /// Create a pair from its parts.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parse a `name=value` line.
    ///
    /// The split happens at the first `=` after the first character, so the
    /// hidden per-drive entries Windows keeps (`=C:=C:\work`) retain their
    /// leading `=`. A line without a separator yields an empty value.
    pub fn parse(line: &str) -> Self {
        let split = line
            .char_indices()
            .skip(1)
            .find(|&(_, c)| c == '=')
            .map(|(i, _)| i);
        match split {
            Some(i) => Self::new(&line[..i], &line[i + 1..]),
            None => Self::new(line, ""),
        }
    }
}

impl FromStr for EnvVar {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

// ---------------------------------------------------------------------------
// EnvironmentMap
// ---------------------------------------------------------------------------

/// Ordered-by-key collection of environment variables with unique names.
///
/// Entries are kept sorted by their comparison key, which is the name itself
/// for [`EnvCase::Sensitive`] maps and the upper-cased name for
/// [`EnvCase::Insensitive`] maps. On an insensitive map the displayed name is
/// the casing passed to the most recent [`set`](Self::set).
///
/// Mutators never reject input. Names that no platform accepts (empty, or
/// containing `=` or NUL) are reported by [`validate`](Self::validate), which
/// the executor runs before touching any OS resource.
///
/// Empty values are preserved. POSIX children see them as defined-but-empty;
/// Windows children cannot tell them apart from unset variables.
#[derive(Clone, PartialEq, Eq)]
pub struct EnvironmentMap {
    case: EnvCase,
    entries: BTreeMap<String, EnvVar>,
}

impl EnvironmentMap {
    /// An empty map using the host platform's comparison rule.
    pub fn new() -> Self {
        Self::with_case(EnvCase::native())
    }

    /// An empty map; the child starts with no variables at all.
    pub fn clean() -> Self {
        Self::new()
    }

    /// An empty map with an explicit comparison rule.
    pub fn with_case(case: EnvCase) -> Self {
        Self {
            case,
            entries: BTreeMap::new(),
        }
    }

    /// Snapshot the calling process's environment.
    ///
    /// The OS environment is read once, inside this call, and never cached.
    pub fn derive() -> Result<Self, LaunchError> {
        crate::snapshot::capture()
    }

    /// The comparison rule of this map.
    pub fn case(&self) -> EnvCase {
        self.case
    }

    /// Separator used by [`append_path`](Self::append_path) and
    /// [`prepend_path`](Self::prepend_path).
    pub fn path_separator(&self) -> char {
        self.case.path_separator()
    }

    /// Insert or overwrite a variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let var = EnvVar::new(name, value);
        self.entries.insert(self.case.sort_key(&var.name), var);
        self
    }

    /// Parse a `name=value` line and [`set`](Self::set) it.
    pub fn set_line(&mut self, line: &str) -> &mut Self {
        let var = EnvVar::parse(line);
        self.set(var.name, var.value)
    }

    /// Remove a variable, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries
            .remove(&self.case.sort_key(name))
            .map(|var| var.value)
    }

    /// `value + text` when `name` exists, otherwise `set(name, text)`.
    pub fn append(&mut self, name: impl Into<String>, text: impl Into<String>) -> &mut Self {
        self.edit(name.into(), text.into(), |cur, text| cur.push_str(&text))
    }

    /// Like [`append`](Self::append), inserting the path-list separator
    /// between the existing value and `path`.
    pub fn append_path(&mut self, name: impl Into<String>, path: impl Into<String>) -> &mut Self {
        let sep = self.path_separator();
        self.edit(name.into(), path.into(), move |cur, path| {
            cur.push(sep);
            cur.push_str(&path);
        })
    }

    /// `text + value` when `name` exists, otherwise `set(name, text)`.
    pub fn prepend(&mut self, name: impl Into<String>, text: impl Into<String>) -> &mut Self {
        self.edit(name.into(), text.into(), |cur, text| cur.insert_str(0, &text))
    }

    /// Like [`prepend`](Self::prepend), inserting the path-list separator
    /// between `path` and the existing value.
    pub fn prepend_path(&mut self, name: impl Into<String>, path: impl Into<String>) -> &mut Self {
        let sep = self.path_separator();
        self.edit(name.into(), path.into(), move |cur, path| {
            cur.insert(0, sep);
            cur.insert_str(0, &path);
        })
    }

    // Absent variables are set outright; existing ones keep their casing.
    fn edit(
        &mut self,
        name: String,
        text: String,
        combine: impl FnOnce(&mut String, String),
    ) -> &mut Self {
        match self.entries.get_mut(&self.case.sort_key(&name)) {
            Some(var) => combine(&mut var.value, text),
            None => {
                self.set(name, text);
            }
        }
        self
    }

    /// Value of `name`, compared with this map's rule.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&self.case.sort_key(name))
            .map(|var| var.value.as_str())
    }

    /// Whether `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&self.case.sort_key(name))
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when the map holds no variables.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(name, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries
            .values()
            .map(|var| (var.name.as_str(), var.value.as_str()))
    }

    /// Lazy, restartable sequence of `name=value` lines in key order.
    pub fn to_lines(&self) -> Lines<'_> {
        Lines {
            inner: self.entries.values(),
        }
    }

    /// Check that every entry can be handed to a platform creation call.
    pub fn validate(&self) -> Result<(), LaunchError> {
        for var in self.entries.values() {
            if var.name.is_empty() {
                return Err(LaunchError::new(
                    ErrorCode::ValidationInvalidVariable,
                    "environment variable name must not be empty",
                ));
            }
            if var.name.contains('\0') || var.value.contains('\0') {
                return Err(LaunchError::new(
                    ErrorCode::ValidationInvalidVariable,
                    "environment variable contains a NUL character",
                )
                .with_context("name", var.name.replace('\0', "\\0")));
            }
            if var.name.chars().skip(1).any(|c| c == '=') {
                return Err(LaunchError::new(
                    ErrorCode::ValidationInvalidVariable,
                    "environment variable name must not contain '='",
                )
                .with_context("name", &var.name));
            }
        }
        Ok(())
    }
}

impl Default for EnvironmentMap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EnvironmentMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentMap")
            .field("case", &self.case)
            .field("vars", &self.iter().collect::<BTreeMap<_, _>>())
            .finish()
    }
}

impl fmt::Display for EnvironmentMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.to_lines().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            f.write_str(&line)?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvironmentMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for EnvironmentMap {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.set(k, v);
        }
    }
}

impl Serialize for EnvironmentMap {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        let mut map = ser.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EnvironmentMap {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, String>::deserialize(de)?;
        Ok(raw.into_iter().collect())
    }
}

/// Iterator returned by [`EnvironmentMap::to_lines`].
#[derive(Clone)]
pub struct Lines<'a> {
    inner: btree_map::Values<'a, String, EnvVar>,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.inner.next().map(EnvVar::to_string)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Lines<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(case: EnvCase) -> EnvironmentMap {
        EnvironmentMap::with_case(case)
    }

    // ── EnvVar parsing ──────────────────────────────────────────────

    #[test]
    fn parse_splits_at_first_equals() {
        assert_eq!(EnvVar::parse("env1=6"), EnvVar::new("env1", "6"));
        assert_eq!(EnvVar::parse("A=b=c"), EnvVar::new("A", "b=c"));
        assert_eq!(EnvVar::parse("EMPTY="), EnvVar::new("EMPTY", ""));
    }

    #[test]
    fn parse_without_separator_yields_empty_value() {
        assert_eq!(EnvVar::parse("LONELY"), EnvVar::new("LONELY", ""));
    }

    #[test]
    fn parse_keeps_leading_equals_of_drive_entries() {
        let var = EnvVar::parse("=C:=C:\\work");
        assert_eq!(var.name, "=C:");
        assert_eq!(var.value, "C:\\work");
    }

    #[test]
    fn env_var_display() {
        assert_eq!(EnvVar::new("env1", "val1").to_string(), "env1=val1");
    }

    // ── ordering & display ──────────────────────────────────────────

    #[test]
    fn lines_are_sorted_regardless_of_insertion_order() {
        let mut env = clean(EnvCase::Sensitive);
        env.set("env3", "val3").set("env2", "val2").set("env1", "val1");
        assert_eq!(env.to_string(), "env1=val1\nenv2=val2\nenv3=val3");
    }

    #[test]
    fn empty_map_displays_as_empty_string() {
        assert_eq!(clean(EnvCase::Sensitive).to_string(), "");
    }

    #[test]
    fn to_lines_is_restartable() {
        let mut env = clean(EnvCase::Sensitive);
        env.set("B", "2").set("A", "1");
        let lines = env.to_lines();
        let first: Vec<_> = lines.clone().collect();
        let second: Vec<_> = lines.collect();
        assert_eq!(first, vec!["A=1", "B=2"]);
        assert_eq!(first, second);
        assert_eq!(env.to_lines().len(), 2);
    }

    #[test]
    fn insensitive_map_sorts_case_insensitively() {
        let mut env = clean(EnvCase::Insensitive);
        env.set("b", "2").set("A", "1").set("c", "3");
        let names: Vec<_> = env.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["A", "b", "c"]);
    }

    // ── set ─────────────────────────────────────────────────────────

    #[test]
    fn set_twice_keeps_single_entry_with_second_value() {
        let mut env = clean(EnvCase::Sensitive);
        env.set("X", "1").set("X", "2");
        assert_eq!(env.len(), 1);
        assert_eq!(env.get("X"), Some("2"));
    }

    #[test]
    fn sensitive_map_keeps_distinct_casings() {
        let mut env = clean(EnvCase::Sensitive);
        env.set("Path", "a").set("PATH", "b");
        assert_eq!(env.len(), 2);
        assert_eq!(env.get("Path"), Some("a"));
    }

    #[test]
    fn insensitive_map_collides_and_keeps_latest_casing() {
        let mut env = clean(EnvCase::Insensitive);
        env.set("Path", "a").set("PATH", "b");
        assert_eq!(env.len(), 1);
        assert_eq!(env.get("path"), Some("b"));
        assert_eq!(env.to_string(), "PATH=b");
    }

    #[test]
    fn insensitive_map_folds_non_ascii_letters() {
        let mut env = clean(EnvCase::Insensitive);
        env.set("café", "a").set("CAFÉ", "b");
        assert_eq!(env.len(), 1);
        assert_eq!(env.get("Café"), Some("b"));
    }

    #[test]
    fn expanding_case_mappings_do_not_collide() {
        let mut env = clean(EnvCase::Insensitive);
        env.set("ß", "1").set("SS", "2");
        assert_eq!(env.len(), 2);
        assert_eq!(env.get("ß"), Some("1"));
        assert_eq!(env.get("ss"), Some("2"));
        assert_eq!(env.to_string(), "SS=2\nß=1");
    }

    #[test]
    fn set_line_parses_pair() {
        let mut env = clean(EnvCase::Sensitive);
        env.set_line("env1=val1").set_line("env2=val2");
        assert_eq!(env.to_string(), "env1=val1\nenv2=val2");
    }

    #[test]
    fn remove_uses_map_rule() {
        let mut env = clean(EnvCase::Insensitive);
        env.set("Path", "a");
        assert_eq!(env.remove("PATH").as_deref(), Some("a"));
        assert!(env.is_empty());
    }

    // ── append / prepend ────────────────────────────────────────────

    #[test]
    fn append_concatenates_existing_value() {
        let mut env = clean(EnvCase::Sensitive);
        env.set("env2", "val2").set("env1", "val1");
        env.append("env1", "app1");
        assert_eq!(env.to_string(), "env1=val1app1\nenv2=val2");
        env.append("env2", "app2");
        assert_eq!(env.to_string(), "env1=val1app1\nenv2=val2app2");
    }

    #[test]
    fn append_to_absent_variable_sets_it() {
        let mut env = clean(EnvCase::Insensitive);
        env.append("env1", "app1");
        assert_eq!(env.to_string(), "env1=app1");
        env.prepend("env2", "pre2");
        assert_eq!(env.to_string(), "env1=app1\nenv2=pre2");
    }

    #[test]
    fn prepend_puts_text_first() {
        let mut env = clean(EnvCase::Sensitive);
        env.set("env1", "val1");
        env.prepend("env1", "pre1");
        assert_eq!(env.get("env1"), Some("pre1val1"));
    }

    #[test]
    fn append_path_on_unset_has_no_separator() {
        let mut env = clean(EnvCase::Sensitive);
        env.append_path("PATH", "x");
        assert_eq!(env.get("PATH"), Some("x"));
    }

    #[test]
    fn append_path_uses_posix_separator() {
        let mut env = clean(EnvCase::Sensitive);
        env.set("PATH", "/a").append_path("PATH", "x");
        assert_eq!(env.get("PATH"), Some("/a:x"));
    }

    #[test]
    fn append_path_uses_windows_separator() {
        let mut env = clean(EnvCase::Insensitive);
        env.set("PATH", "/a").append_path("PATH", "x");
        assert_eq!(env.get("PATH"), Some("/a;x"));
    }

    #[test]
    fn prepend_path_mirrors_append_path() {
        let mut env = clean(EnvCase::Sensitive);
        env.prepend_path("PATH", "/b");
        assert_eq!(env.get("PATH"), Some("/b"));
        env.prepend_path("PATH", "/a");
        assert_eq!(env.get("PATH"), Some("/a:/b"));
    }

    #[test]
    fn append_on_insensitive_map_keeps_existing_casing() {
        let mut env = clean(EnvCase::Insensitive);
        env.set("Path", "a").append_path("PATH", "b");
        assert_eq!(env.to_string(), "Path=a;b");
    }

    // ── validation ──────────────────────────────────────────────────

    #[test]
    fn validate_rejects_empty_name() {
        let mut env = clean(EnvCase::Sensitive);
        env.set("", "value");
        let err = env.validate().unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationInvalidVariable);
    }

    #[test]
    fn validate_rejects_nul_and_embedded_equals() {
        let mut env = clean(EnvCase::Sensitive);
        env.set("A", "x\0y");
        assert!(env.validate().is_err());

        let mut env = clean(EnvCase::Sensitive);
        env.set("A=B", "x");
        assert!(env.validate().is_err());
    }

    #[test]
    fn validate_accepts_empty_values_and_drive_entries() {
        let mut env = clean(EnvCase::Insensitive);
        env.set("EMPTY", "").set("=C:", "C:\\work");
        assert!(env.validate().is_ok());
    }

    // ── serde ───────────────────────────────────────────────────────

    #[test]
    fn serializes_as_plain_map() {
        let mut env = EnvironmentMap::new();
        env.set("B", "2").set("A", "1");
        let json = serde_json::to_string(&env).unwrap();
        assert_eq!(json, r#"{"A":"1","B":"2"}"#);
        let back: EnvironmentMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn collects_from_pairs() {
        let env: EnvironmentMap = [("B", "2"), ("A", "1")].into_iter().collect();
        assert_eq!(env.case(), EnvCase::native());
        assert_eq!(env.len(), 2);
    }
}
