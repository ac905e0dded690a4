use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One line of an explained plan: the operator name followed by its
/// properties, rendered as `Name (key = value, ...)`.
///
/// Properties are kept sorted by key so output is stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainEntry {
    pub name: String,
    pub items: BTreeMap<String, String>,
}

impl ExplainEntry {
    pub fn new(name: impl Into<String>) -> Self {
        ExplainEntry {
            name: name.into(),
            items: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.items.insert(key.into(), value.to_string());
        self
    }

    /// Lists render as `[a, b, c]`.
    pub fn with_values<S: fmt::Display>(
        mut self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        let rendered: Vec<String> = values.into_iter().map(|v| v.to_string()).collect();
        self.items
            .insert(key.into(), format!("[{}]", rendered.join(", ")));
        self
    }
}

impl fmt::Display for ExplainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        let mut sep = " (";
        for (key, value) in &self.items {
            write!(f, "{sep}{key} = {value}")?;
            sep = ", ";
        }
        if !self.items.is_empty() {
            f.write_str(")")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExplainConfig {
    /// Include node ids, output metadata, field names and other details.
    pub verbose: bool,
}

pub trait Explainable {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry;
}

/// Builds an [`ExplainEntry`], dropping the `*_if_verbose` properties unless
/// the config asks for them.
#[derive(Debug)]
pub struct EntryBuilder {
    verbose: bool,
    entry: ExplainEntry,
}

impl EntryBuilder {
    pub fn new(name: impl Into<String>, conf: ExplainConfig) -> Self {
        EntryBuilder {
            verbose: conf.verbose,
            entry: ExplainEntry::new(name),
        }
    }

    pub fn with_value(self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.map(|entry| entry.with_value(key, value))
    }

    pub fn with_values<S: fmt::Display>(
        self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        self.map(|entry| entry.with_values(key, values))
    }

    pub fn with_value_if_verbose(self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        if self.verbose {
            self.with_value(key, value)
        } else {
            self
        }
    }

    pub fn with_values_if_verbose<S: fmt::Display>(
        self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        if self.verbose {
            self.with_values(key, values)
        } else {
            self
        }
    }

    pub fn build(self) -> ExplainEntry {
        self.entry
    }

    fn map(mut self, f: impl FnOnce(ExplainEntry) -> ExplainEntry) -> Self {
        self.entry = f(self.entry);
        self
    }
}

/// Positional column list, rendered as `#0, #2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnIndexes<'a>(pub &'a [usize]);

impl fmt::Display for ColumnIndexes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        for col in self.0 {
            write!(f, "{sep}#{col}")?;
            sep = ", ";
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_without_items() {
        assert_eq!("Scan", ExplainEntry::new("Scan").to_string());
    }

    #[test]
    fn items_sorted_by_key() {
        let entry = ExplainEntry::new("Sort")
            .with_values("collation", ["#1 ASC", "#0 DESC"])
            .with_value("limit", 10);
        assert_eq!(
            "Sort (collation = [#1 ASC, #0 DESC], limit = 10)",
            entry.to_string()
        );
    }

    #[test]
    fn verbose_items_need_verbose_config() {
        let terse = EntryBuilder::new("Aggregate", ExplainConfig::default())
            .with_value("group_count", 1)
            .with_values_if_verbose("fields", ["a", "n"])
            .build();
        assert_eq!("Aggregate (group_count = 1)", terse.to_string());

        let verbose = EntryBuilder::new("Aggregate", ExplainConfig { verbose: true })
            .with_value_if_verbose("operands", ColumnIndexes(&[1, 3]))
            .build();
        assert_eq!("Aggregate (operands = #1, #3)", verbose.to_string());
    }
}
