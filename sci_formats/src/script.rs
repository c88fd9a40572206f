//! Script resource scanning.
//!
//! A script image is the byte buffer an instantiated script segment is built
//! from. Scanning finds the object and class records, the local variable
//! block and the pointer relocation entries; it does not parse the object
//! records themselves (see [`crate::layout`]).

use anyhow::{Context, Result, bail, ensure};
use serde::Serialize;

use crate::layout::{Layout3, OBJECT_MAGIC};
use crate::span::ByteSpan;
use crate::version::{Endian, LayoutKind, SciVersion};

const SCI0_BLOCK_END: u16 = 0;
const SCI0_BLOCK_OBJECT: u16 = 1;
const SCI0_BLOCK_CLASS: u16 = 6;
const SCI0_BLOCK_RELOCATION: u16 = 8;
const SCI0_BLOCK_LOCALS: u16 = 10;

/// Offset from an SCI0 object/class block start to the object body.
const SCI0_BODY_OFFSET: usize = 12;

const SCI11_INFO_OFFSET: usize = 14;
const SCI11_SPECIES_OFFSET: usize = 10;

const SCI3_RELOC_TABLE: usize = 8;
const SCI3_LOCAL_COUNT: usize = 12;
const SCI3_RELOC_COUNT: usize = 18;
const SCI3_EXPORT_COUNT: usize = 20;
const SCI3_EXPORTS: usize = 22;
const SCI3_RELOC_ENTRY_SIZE: usize = 10;

pub const INFO_FLAG_CLASS: u16 = 0x8000;

/// Raw resources of one script: the script resource and, from SCI1.1 on,
/// its companion heap resource.
#[derive(Debug, Clone)]
pub struct ScriptResource {
    pub number: u16,
    pub script: ByteSpan,
    pub heap: Option<ByteSpan>,
}

impl ScriptResource {
    pub fn new(number: u16, script: ByteSpan) -> Self {
        ScriptResource {
            number,
            script,
            heap: None,
        }
    }

    pub fn with_heap(number: u16, script: ByteSpan, heap: ByteSpan) -> Self {
        ScriptResource {
            number,
            script,
            heap: Some(heap),
        }
    }
}

/// One object or class record found while scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ObjectRecord {
    /// Offset of the object body within [`ScriptImage::buf`].
    pub offset: usize,
    pub is_class: bool,
    /// Raw species word; for classes this is the class number.
    pub species: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LocalsBlock {
    pub offset: usize,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Sci3Relocation {
    pub location: u32,
    pub addend: u32,
}

/// Pointer fix-ups a script needs once its segment is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relocations {
    /// Buffer offsets of pointer slots (pre-SCI3).
    Slots(Vec<usize>),
    /// Exact property locations plus an addend (SCI3).
    Sci3(Vec<Sci3Relocation>),
}

impl Relocations {
    pub fn len(&self) -> usize {
        match self {
            Relocations::Slots(slots) => slots.len(),
            Relocations::Sci3(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct ScriptImage {
    pub number: u16,
    pub version: SciVersion,
    pub endian: Endian,
    /// Script bytes, followed by the heap bytes for SCI1.1 to SCI2.1.
    pub buf: ByteSpan,
    /// Size of the static script part; heap offsets are relative to it.
    pub script_size: usize,
    pub locals: Option<LocalsBlock>,
    pub objects: Vec<ObjectRecord>,
    pub relocations: Relocations,
}

impl ScriptImage {
    pub fn classes(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.objects.iter().filter(|record| record.is_class)
    }

    pub fn heap_start(&self) -> usize {
        self.script_size
    }
}

pub fn scan_script(resource: &ScriptResource, version: SciVersion, endian: Endian) -> Result<ScriptImage> {
    let image = match version.layout() {
        LayoutKind::Pre11 => scan_sci0(resource, version, endian),
        LayoutKind::Sci11 => scan_sci11(resource, version, endian),
        LayoutKind::Sci3 => scan_sci3(resource, version, endian),
    };
    image.with_context(|| format!("scanning script {}", resource.number))
}

fn scan_sci0(resource: &ScriptResource, version: SciVersion, endian: Endian) -> Result<ScriptImage> {
    let buf = resource.script.clone();
    let mut objects = Vec::new();
    let mut locals = None;
    let mut relocations = Vec::new();

    // Block headers are little-endian regardless of platform. Early SCI0
    // scripts open with the local variable count.
    let mut pos = if version == SciVersion::Sci0Early { 2 } else { 0 };
    while pos + 2 <= buf.len() {
        let block_type = buf.read_u16_le(pos)?;
        if block_type == SCI0_BLOCK_END {
            break;
        }
        let size = buf.read_u16_le(pos + 2)? as usize;
        ensure!(size >= 4, "block at {pos:#x} has impossible size {size}");
        ensure!(
            pos + size <= buf.len(),
            "block at {pos:#x} (size {size}) runs past the end of the script"
        );

        match block_type {
            SCI0_BLOCK_OBJECT | SCI0_BLOCK_CLASS => {
                let body = pos + SCI0_BODY_OFFSET;
                let magic = buf.read_u16_le(pos + 4)?;
                ensure!(magic == OBJECT_MAGIC, "object block at {pos:#x} lacks the object magic");
                let species = buf.read_u16_le(body)?;
                objects.push(ObjectRecord {
                    offset: body,
                    is_class: block_type == SCI0_BLOCK_CLASS,
                    species,
                });
            }
            SCI0_BLOCK_RELOCATION => {
                let count = buf.read_u16_le(pos + 4)? as usize;
                for index in 0..count {
                    relocations.push(buf.read_u16_le(pos + 6 + index * 2)? as usize);
                }
            }
            SCI0_BLOCK_LOCALS => {
                locals = Some(LocalsBlock {
                    offset: pos + 4,
                    count: (size - 4) / 2,
                });
            }
            _ => {}
        }
        pos += size;
    }

    Ok(ScriptImage {
        number: resource.number,
        version,
        endian,
        script_size: buf.len(),
        buf,
        locals,
        objects,
        relocations: Relocations::Slots(relocations),
    })
}

fn scan_sci11(resource: &ScriptResource, version: SciVersion, endian: Endian) -> Result<ScriptImage> {
    let Some(heap) = resource.heap.as_ref() else {
        bail!("script {} has no heap resource", resource.number);
    };

    // The heap is placed on a word boundary after the script bytes.
    let script_size = resource.script.len() + (resource.script.len() & 1);
    let mut combined = Vec::with_capacity(script_size + heap.len());
    combined.extend_from_slice(resource.script.as_slice());
    combined.resize(script_size, 0);
    combined.extend_from_slice(heap.as_slice());
    let buf = ByteSpan::new(combined);

    let relocation_table = heap.read_u16(0, endian)? as usize;
    let local_count = heap.read_u16(2, endian)? as usize;
    let locals_offset = script_size + 4;

    let mut objects = Vec::new();
    let mut pos = locals_offset + local_count * 2;
    while pos + 2 <= buf.len() && buf.read_u16(pos, endian)? == OBJECT_MAGIC {
        let size_words = buf.read_u16(pos + 2, endian)? as usize;
        ensure!(size_words > 0, "object at {pos:#x} has zero size");
        let info = buf.read_u16(pos + SCI11_INFO_OFFSET, endian)?;
        let species = buf.read_u16(pos + SCI11_SPECIES_OFFSET, endian)?;
        objects.push(ObjectRecord {
            offset: pos,
            is_class: info & INFO_FLAG_CLASS != 0,
            species,
        });
        pos += size_words * 2;
    }

    let mut relocations = Vec::new();
    if relocation_table != 0 {
        let count = heap.read_u16(relocation_table, endian)? as usize;
        for index in 0..count {
            let entry = heap.read_u16(relocation_table + 2 + index * 2, endian)? as usize;
            relocations.push(script_size + entry);
        }
    }

    Ok(ScriptImage {
        number: resource.number,
        version,
        endian,
        buf,
        script_size,
        locals: (local_count > 0).then_some(LocalsBlock {
            offset: locals_offset,
            count: local_count,
        }),
        objects,
        relocations: Relocations::Slots(relocations),
    })
}

fn scan_sci3(resource: &ScriptResource, version: SciVersion, endian: Endian) -> Result<ScriptImage> {
    let buf = resource.script.clone();

    let relocation_table = buf.read_u32(SCI3_RELOC_TABLE, endian)? as usize;
    let relocation_count = buf.read_u16(SCI3_RELOC_COUNT, endian)? as usize;
    let local_count = buf.read_u16(SCI3_LOCAL_COUNT, endian)? as usize;
    let export_count = buf.read_u16(SCI3_EXPORT_COUNT, endian)? as usize;

    let mut locals_offset = SCI3_EXPORTS + export_count * 2;
    if locals_offset % 4 != 0 {
        locals_offset += 2;
    }
    let mut pos = locals_offset + local_count * 2;
    if pos % 4 != 0 {
        pos += 2;
    }

    let mut objects = Vec::new();
    while pos + 2 <= buf.len() && buf.read_u16(pos, endian)? == OBJECT_MAGIC {
        let size = buf.read_u16(pos + 2, endian)? as usize;
        ensure!(size > 0, "object at {pos:#x} has zero size");
        let info = buf.read_u16(pos + Layout3::OFFSET_INFO, endian)?;
        let species = buf.read_u16(pos + Layout3::OFFSET_SPECIES, endian)?;
        objects.push(ObjectRecord {
            offset: pos,
            is_class: info & INFO_FLAG_CLASS != 0,
            species,
        });
        pos += size;
    }

    let mut relocations = Vec::with_capacity(relocation_count);
    for index in 0..relocation_count {
        let entry = relocation_table + index * SCI3_RELOC_ENTRY_SIZE;
        relocations.push(Sci3Relocation {
            location: buf.read_u32(entry, endian)?,
            addend: buf.read_u32(entry + 4, endian)?,
        });
    }

    Ok(ScriptImage {
        number: resource.number,
        version,
        endian,
        script_size: buf.len(),
        buf,
        locals: (local_count > 0).then_some(LocalsBlock {
            offset: locals_offset,
            count: local_count,
        }),
        objects,
        relocations: Relocations::Sci3(relocations),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_words(out: &mut Vec<u8>, words: &[u16]) {
        for word in words {
            out.extend_from_slice(&word.to_le_bytes());
        }
    }

    fn sci0_block(out: &mut Vec<u8>, block_type: u16, payload: &[u16]) -> usize {
        let start = out.len();
        push_words(out, &[block_type, 4 + payload.len() as u16 * 2]);
        push_words(out, payload);
        start
    }

    #[test]
    fn sci0_scan_finds_blocks() {
        let mut data = Vec::new();
        let locals = sci0_block(&mut data, SCI0_BLOCK_LOCALS, &[0, 0, 0]);
        // magic, header words, then a three variable body and empty method area
        let class = sci0_block(
            &mut data,
            SCI0_BLOCK_CLASS,
            &[OBJECT_MAGIC, 0, 14, 3, 4, 0xffff, 0x8000, 0, 0, 0, 0, 0, 0],
        );
        let object = sci0_block(
            &mut data,
            SCI0_BLOCK_OBJECT,
            &[OBJECT_MAGIC, 0, 14, 3, 4, 4, 0, 0, 0, 0, 0, 0, 0],
        );
        sci0_block(&mut data, SCI0_BLOCK_RELOCATION, &[2, 0x20, 0x22]);
        push_words(&mut data, &[SCI0_BLOCK_END]);

        let resource = ScriptResource::new(4, ByteSpan::new(data));
        let image = scan_script(&resource, SciVersion::Sci0Late, Endian::Little).unwrap();

        assert_eq!(image.locals, Some(LocalsBlock { offset: locals + 4, count: 3 }));
        assert_eq!(image.objects.len(), 2);
        assert_eq!(
            image.objects[0],
            ObjectRecord { offset: class + SCI0_BODY_OFFSET, is_class: true, species: 4 }
        );
        assert!(!image.objects[1].is_class);
        assert_eq!(image.objects[1].offset, object + SCI0_BODY_OFFSET);
        assert_eq!(image.relocations, Relocations::Slots(vec![0x20, 0x22]));
        assert_eq!(image.classes().count(), 1);
    }

    #[test]
    fn sci0_rejects_undersized_blocks() {
        let mut data = Vec::new();
        push_words(&mut data, &[SCI0_BLOCK_OBJECT, 2, 0]);
        let resource = ScriptResource::new(1, ByteSpan::new(data));
        let err = scan_script(&resource, SciVersion::Sci0Late, Endian::Little).unwrap_err();
        assert!(format!("{err:#}").contains("impossible size"));
    }

    #[test]
    fn sci11_appends_heap_after_padded_script() {
        let script = ByteSpan::new(vec![0u8; 5]);
        let mut heap = Vec::new();
        // relocation table at 28, two locals
        push_words(&mut heap, &[28, 2, 0, 0]);
        // one class object of 9 words at heap offset 8
        push_words(&mut heap, &[OBJECT_MAGIC, 9, 0, 0, 0, 7, 0xffff, 0x8000, 0]);
        push_words(&mut heap, &[0]);
        // relocation table: two entries
        push_words(&mut heap, &[2, 4, 8]);

        let resource = ScriptResource::with_heap(12, script, ByteSpan::new(heap));
        let image = scan_script(&resource, SciVersion::Sci11, Endian::Little).unwrap();

        assert_eq!(image.script_size, 6);
        assert_eq!(image.locals, Some(LocalsBlock { offset: 10, count: 2 }));
        assert_eq!(
            image.objects,
            vec![ObjectRecord { offset: 14, is_class: true, species: 7 }]
        );
        assert_eq!(image.relocations, Relocations::Slots(vec![10, 14]));
    }

    #[test]
    fn sci11_requires_heap() {
        let resource = ScriptResource::new(3, ByteSpan::new(vec![0u8; 4]));
        assert!(scan_script(&resource, SciVersion::Sci2, Endian::Little).is_err());
    }

    #[test]
    fn sci3_locals_and_objects_are_dword_aligned() {
        let mut data = vec![0u8; 22];
        data[12..14].copy_from_slice(&1u16.to_le_bytes()); // one local
        data[20..22].copy_from_slice(&1u16.to_le_bytes()); // one export
        data.extend_from_slice(&[0, 0]); // export
        data.extend_from_slice(&[0, 0]); // local at 24
        data.extend_from_slice(&[0, 0]); // padding
        let object = data.len();
        assert_eq!(object, 28);
        let mut body = vec![0u8; 16];
        body[0..2].copy_from_slice(&OBJECT_MAGIC.to_le_bytes());
        body[2..4].copy_from_slice(&16u16.to_le_bytes());
        body[4..6].copy_from_slice(&9u16.to_le_bytes());
        body[10..12].copy_from_slice(&INFO_FLAG_CLASS.to_le_bytes());
        data.extend_from_slice(&body);
        let relocation_table = data.len() as u32;
        data.extend_from_slice(&0x30u32.to_le_bytes());
        data.extend_from_slice(&0x100u32.to_le_bytes());
        data.extend_from_slice(&[0, 0]);
        data[8..12].copy_from_slice(&relocation_table.to_le_bytes());
        data[18..20].copy_from_slice(&1u16.to_le_bytes());

        let resource = ScriptResource::new(30, ByteSpan::new(data));
        let image = scan_script(&resource, SciVersion::Sci3, Endian::Little).unwrap();
        assert_eq!(image.locals, Some(LocalsBlock { offset: 24, count: 1 }));
        assert_eq!(
            image.objects,
            vec![ObjectRecord { offset: 28, is_class: true, species: 9 }]
        );
        assert_eq!(
            image.relocations,
            Relocations::Sci3(vec![Sci3Relocation { location: 0x30, addend: 0x100 }])
        );
    }
}
