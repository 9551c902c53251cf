//! School and program alias tables.
//!
//! Tables are data, not code: the built-in set is `data/aliases.toml`,
//! compiled into the binary, and an operator can merge extra entries from
//! another file of the same shape.

use anyhow::Context;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const BUILTIN_ALIASES: &str = include_str!("../data/aliases.toml");

/// On-disk shape of an alias file.
#[derive(Debug, Default, Deserialize)]
struct AliasFile {
    #[serde(default)]
    schools: BTreeMap<String, String>,
    #[serde(default)]
    programs: BTreeMap<String, String>,
}

/// Case-insensitive alias -> canonical name lookup.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: HashMap<String, String>,
}

impl AliasTable {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut table = Self::default();
        table.extend(pairs);
        table
    }

    pub fn extend<I, K, V>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (alias, canonical) in pairs {
            let canonical: String = canonical.into();
            let canonical = canonical.trim().to_string();
            if canonical.is_empty() {
                continue;
            }
            self.entries
                .entry(lookup_key(&canonical))
                .or_insert_with(|| canonical.clone());
            self.entries.insert(lookup_key(alias.as_ref()), canonical);
        }
    }

    pub fn lookup(&self, raw: &str) -> Option<&str> {
        self.entries.get(&lookup_key(raw)).map(String::as_str)
    }

    /// Canonical name for `raw`, or `raw` trimmed when it is not a known alias.
    pub fn canonicalize(&self, raw: &str) -> String {
        self.lookup(raw)
            .map(str::to_string)
            .unwrap_or_else(|| raw.trim().to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn lookup_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[derive(Debug, Clone, Default)]
pub struct Aliases {
    pub schools: AliasTable,
    pub programs: AliasTable,
}

impl Aliases {
    /// The tables shipped with the crate.
    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_toml_str(BUILTIN_ALIASES).context("Built-in alias table is invalid")
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let file: AliasFile = toml::from_str(content)?;
        Ok(Self {
            schools: AliasTable::from_pairs(file.schools),
            programs: AliasTable::from_pairs(file.programs),
        })
    }

    /// Built-in tables, with entries from `extra` (if given) taking precedence.
    pub fn load(extra: Option<&Path>) -> anyhow::Result<Self> {
        let mut aliases = Self::builtin()?;
        if let Some(path) = extra {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read alias file: {}", path.display()))?;
            let file: AliasFile = toml::from_str(&content)
                .with_context(|| format!("Invalid alias file: {}", path.display()))?;
            tracing::info!(
                path = %path.display(),
                schools = file.schools.len(),
                programs = file.programs.len(),
                "merged extra aliases"
            );
            aliases.schools.extend(file.schools);
            aliases.programs.extend(file.programs);
        }
        Ok(aliases)
    }
}
