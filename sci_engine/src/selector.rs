use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use sci_formats::{decode_selector_names, ByteSpan};

use crate::error::VmError;

/// The game's selector dictionary. Built once and read-only afterwards, so
/// it can be shared behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct SelectorTable {
    names: Vec<String>,
    by_name: HashMap<String, u16>,
}

impl SelectorTable {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut by_name = HashMap::with_capacity(names.len());
        for (id, name) in names.iter().enumerate() {
            // First registration of a duplicated name wins.
            by_name.entry(name.clone()).or_insert(id as u16);
        }
        SelectorTable { names, by_name }
    }

    /// Decodes the selector vocabulary resource.
    pub fn from_vocab(vocab: &ByteSpan) -> Result<Self> {
        let names = decode_selector_names(vocab).context("decoding selector vocabulary")?;
        Ok(Self::from_names(names))
    }

    /// Reads a JSON array of selector names; index = selector ID.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read selector list: {}", path.display()))?;
        let names: Vec<String> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse selector list: {}", path.display()))?;
        Ok(Self::from_names(names))
    }

    pub fn name_of(&self, selector: u16) -> Result<&str, VmError> {
        self.names
            .get(selector as usize)
            .map(String::as_str)
            .ok_or(VmError::UnknownSelector(selector))
    }

    pub fn count_registered(&self) -> usize {
        self.names.len()
    }

    pub fn selector_by_name(&self, name: &str) -> Option<u16> {
        self.by_name.get(name).copied()
    }

    /// Name for diagnostics, falling back to the numeric ID.
    pub fn describe(&self, selector: u16) -> String {
        match self.name_of(selector) {
            Ok(name) => name.to_string(),
            Err(_) => format!("<selector {selector:#x}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_both_directions() {
        let table = SelectorTable::from_names(["species", "superClass", "-info-", "name"]);
        assert_eq!(table.count_registered(), 4);
        assert_eq!(table.name_of(3).unwrap(), "name");
        assert_eq!(table.selector_by_name("-info-"), Some(2));
        assert!(matches!(table.name_of(9), Err(VmError::UnknownSelector(9))));
        assert_eq!(table.describe(9), "<selector 0x9>");
    }

    #[test]
    fn duplicate_names_keep_first_id() {
        let table = SelectorTable::from_names(["x", "y", "x"]);
        assert_eq!(table.selector_by_name("x"), Some(0));
        assert_eq!(table.name_of(2).unwrap(), "x");
    }

    #[test]
    fn loads_json_list() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        fs::write(file.path(), r#"["species", "name"]"#)?;
        let table = SelectorTable::from_json_file(file.path())?;
        assert_eq!(table.selector_by_name("name"), Some(1));
        Ok(())
    }
}
