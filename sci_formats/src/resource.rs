use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use bytes::Bytes;
use memmap2::MmapOptions;
use serde_repr::{Deserialize_repr, Serialize_repr};
use walkdir::WalkDir;

use crate::span::ByteSpan;

/// Resource kinds, numbered the way patch files tag them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize_repr, Deserialize_repr,
)]
#[repr(u8)]
pub enum ResourceType {
    View = 0x80,
    Pic = 0x81,
    Script = 0x82,
    Text = 0x83,
    Sound = 0x84,
    Memory = 0x85,
    Vocab = 0x86,
    Font = 0x87,
    Cursor = 0x88,
    Patch = 0x89,
    Bitmap = 0x8a,
    Palette = 0x8b,
    CdAudio = 0x8c,
    Audio = 0x8d,
    Sync = 0x8e,
    Message = 0x8f,
    Map = 0x90,
    Heap = 0x91,
}

impl ResourceType {
    pub const ALL: [ResourceType; 18] = [
        ResourceType::View,
        ResourceType::Pic,
        ResourceType::Script,
        ResourceType::Text,
        ResourceType::Sound,
        ResourceType::Memory,
        ResourceType::Vocab,
        ResourceType::Font,
        ResourceType::Cursor,
        ResourceType::Patch,
        ResourceType::Bitmap,
        ResourceType::Palette,
        ResourceType::CdAudio,
        ResourceType::Audio,
        ResourceType::Sync,
        ResourceType::Message,
        ResourceType::Map,
        ResourceType::Heap,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ResourceType::View => "view",
            ResourceType::Pic => "pic",
            ResourceType::Script => "script",
            ResourceType::Text => "text",
            ResourceType::Sound => "sound",
            ResourceType::Memory => "memory",
            ResourceType::Vocab => "vocab",
            ResourceType::Font => "font",
            ResourceType::Cursor => "cursor",
            ResourceType::Patch => "patch",
            ResourceType::Bitmap => "bitmap",
            ResourceType::Palette => "palette",
            ResourceType::CdAudio => "cdaudio",
            ResourceType::Audio => "audio",
            ResourceType::Sync => "sync",
            ResourceType::Message => "message",
            ResourceType::Map => "map",
            ResourceType::Heap => "heap",
        }
    }
}

impl TryFrom<u8> for ResourceType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        ResourceType::ALL
            .into_iter()
            .find(|kind| *kind as u8 == value)
            .ok_or(value)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResourceType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        ResourceType::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(value))
            .ok_or_else(|| anyhow!("unknown resource type '{value}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId {
    pub kind: ResourceType,
    pub number: u16,
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.kind, self.number)
    }
}

impl FromStr for ResourceId {
    type Err = anyhow::Error;

    /// Parses `script.012` style names.
    fn from_str(value: &str) -> Result<Self> {
        let (kind, number) = value
            .split_once('.')
            .ok_or_else(|| anyhow!("expected <type>.<number>, got '{value}'"))?;
        let number = number
            .parse::<u16>()
            .with_context(|| format!("resource number in '{value}'"))?;
        Ok(ResourceId {
            kind: kind.parse()?,
            number,
        })
    }
}

/// Game resources stored as individual patch-style files in one directory.
#[derive(Debug, Clone, Default)]
pub struct ResourceDir {
    root: PathBuf,
    entries: BTreeMap<ResourceId, Bytes>,
}

impl ResourceDir {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            bail!("resource directory {} does not exist", root.display());
        }

        let mut entries = BTreeMap::new();
        for entry in WalkDir::new(&root).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("failed to traverse {}: {err}", root.display());
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            let Ok(id) = name.parse::<ResourceId>() else {
                log::debug!("skipping non-resource file {name}");
                continue;
            };
            let data = read_resource_file(entry.path(), id.kind)
                .with_context(|| format!("loading {}", entry.path().display()))?;
            entries.insert(id, data);
        }

        log::info!("indexed {} resources in {}", entries.len(), root.display());
        Ok(ResourceDir { root, entries })
    }

    /// Builds a directory view from in-memory resources.
    pub fn from_entries(entries: impl IntoIterator<Item = (ResourceId, Vec<u8>)>) -> Self {
        ResourceDir {
            root: PathBuf::new(),
            entries: entries
                .into_iter()
                .map(|(id, data)| (id, Bytes::from(data)))
                .collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, kind: ResourceType, number: u16) -> Option<ByteSpan> {
        self.entries
            .get(&ResourceId { kind, number })
            .map(|data| ByteSpan::new(data.clone()))
    }

    pub fn ids(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.entries.keys().copied()
    }

    /// Resource numbers available for one type, ascending.
    pub fn numbers(&self, kind: ResourceType) -> Vec<u16> {
        self.entries
            .keys()
            .filter(|id| id.kind == kind)
            .map(|id| id.number)
            .collect()
    }
}

fn read_resource_file(path: &Path, kind: ResourceType) -> Result<Bytes> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(Bytes::new());
    }
    let mmap = unsafe { MmapOptions::new().map(&file) }
        .with_context(|| format!("memory-mapping {}", path.display()))?;
    Ok(strip_patch_header(&mmap, kind))
}

/// Patch files open with the type byte and the length of any extra header.
fn strip_patch_header(data: &[u8], kind: ResourceType) -> Bytes {
    if data.len() >= 2 && data[0] & 0x7f == (kind as u8) & 0x7f {
        let skip = 2 + data[1] as usize;
        if skip <= data.len() {
            return Bytes::copy_from_slice(&data[skip..]);
        }
    }
    Bytes::copy_from_slice(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn resource_ids_round_trip_names() {
        let id: ResourceId = "script.012".parse().unwrap();
        assert_eq!(id.kind, ResourceType::Script);
        assert_eq!(id.number, 12);
        assert_eq!(id.to_string(), "script.012");
        assert!("script".parse::<ResourceId>().is_err());
        assert!("bogus.1".parse::<ResourceId>().is_err());
    }

    #[test]
    fn patch_header_is_stripped() {
        let raw = [0x82, 0x01, 0xee, 0x10, 0x20];
        assert_eq!(strip_patch_header(&raw, ResourceType::Script).as_ref(), &[0x10, 0x20]);
        let plain = [0x01, 0x00, 0x10];
        assert_eq!(strip_patch_header(&plain, ResourceType::Script).as_ref(), &plain);
    }

    #[test]
    fn opens_directory_of_patch_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut script = File::create(dir.path().join("script.003")).unwrap();
        script.write_all(&[0x82, 0x00, 0xaa, 0xbb]).unwrap();
        let mut vocab = File::create(dir.path().join("vocab.997")).unwrap();
        vocab.write_all(&[0x86, 0x00, 0x01]).unwrap();
        File::create(dir.path().join("readme.txt")).unwrap();

        let resources = ResourceDir::open(dir.path()).unwrap();
        assert_eq!(resources.len(), 2);
        let span = resources.get(ResourceType::Script, 3).unwrap();
        assert_eq!(span.as_slice(), &[0xaa, 0xbb]);
        assert_eq!(resources.numbers(ResourceType::Vocab), vec![997]);
        assert!(resources.get(ResourceType::Script, 4).is_none());
    }

    #[test]
    fn type_bytes_convert() {
        assert_eq!(ResourceType::try_from(0x91), Ok(ResourceType::Heap));
        assert_eq!(ResourceType::try_from(0x7f), Err(0x7f));
        assert_eq!("VOCAB".parse::<ResourceType>().unwrap(), ResourceType::Vocab);
    }
}
