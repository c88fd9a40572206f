//! Vocabulary resources the object model depends on.

use anyhow::{Context, Result};

use crate::span::ByteSpan;

/// Vocabulary number holding selector names.
pub const SELECTOR_VOCAB: u16 = 997;
/// Vocabulary number mapping species to the script that defines them.
pub const CLASS_VOCAB: u16 = 996;

/// Decodes the selector-name table: a count word (one less than the number
/// of names), a word offset per name, and each name stored as a length word
/// followed by its bytes. Selector IDs are the table indices.
pub fn decode_selector_names(vocab: &ByteSpan) -> Result<Vec<String>> {
    let count = vocab.read_u16_le(0).context("selector vocabulary count")? as usize + 1;
    let mut names = Vec::with_capacity(count);
    for index in 0..count {
        let offset = vocab
            .read_u16_le(2 + index * 2)
            .with_context(|| format!("offset of selector {index}"))? as usize;
        let len = vocab
            .read_u16_le(offset)
            .with_context(|| format!("length of selector {index}"))? as usize;
        let text = vocab
            .subspan(offset + 2, Some(len))
            .with_context(|| format!("name of selector {index}"))?;
        names.push(String::from_utf8_lossy(text.as_slice()).into_owned());
    }
    Ok(names)
}

/// Decodes the class table: four bytes per species, the defining script
/// number in the second word.
pub fn decode_class_scripts(vocab: &ByteSpan) -> Result<Vec<u16>> {
    let count = vocab.len() / 4;
    (0..count)
        .map(|species| {
            vocab
                .read_u16_le(species * 4 + 2)
                .with_context(|| format!("class table entry {species}"))
        })
        .collect()
}
