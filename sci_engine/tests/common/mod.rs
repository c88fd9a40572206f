#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use sci_engine::{SegManager, SelectorTable, VmConfig};
use sci_formats::{ByteSpan, SciVersion, ScriptResource};

pub const MAGIC: u16 = 0x1234;
pub const NO_CLASS: u16 = 0xffff;

/// Selector names used by every fixture; IDs are the indices.
pub const SELECTOR_NAMES: [&str; 12] = [
    "species", "superClass", "-info-", "name", "x", "y", "view", "loop", "cel", "init", "doit",
    "dispose",
];

#[derive(Debug, Clone)]
pub struct ObjectSpec {
    pub class: bool,
    pub species: u16,
    pub superclass: u16,
    pub name: Option<&'static str>,
    /// Values of the variables after the fixed ones.
    pub extra: Vec<u16>,
    /// `(selector, code offset)` pairs.
    pub methods: Vec<(u16, u16)>,
}

impl ObjectSpec {
    pub fn class(species: u16, name: &'static str) -> Self {
        ObjectSpec {
            class: true,
            species,
            superclass: NO_CLASS,
            name: Some(name),
            extra: vec![0, 0],
            methods: vec![(9, 0x40), (10, 0x60)],
        }
    }

    pub fn instance(species: u16, name: &'static str) -> Self {
        ObjectSpec {
            class: false,
            species,
            superclass: species,
            name: Some(name),
            extra: vec![0, 0],
            methods: Vec::new(),
        }
    }

    pub fn with_extra(mut self, extra: &[u16]) -> Self {
        self.extra = extra.to_vec();
        self
    }

    fn info(&self) -> u16 {
        if self.class {
            0x8000
        } else {
            0
        }
    }
}

fn push_words(out: &mut Vec<u8>, words: &[u16]) {
    for word in words {
        out.extend_from_slice(&word.to_le_bytes());
    }
}

fn push_block(out: &mut Vec<u8>, block_type: u16, payload: &[u8]) -> usize {
    let start = out.len();
    push_words(out, &[block_type, 4 + payload.len() as u16]);
    out.extend_from_slice(payload);
    start
}

/// Where things ended up in a built script.
#[derive(Debug, Clone, Default)]
pub struct Sci0Layout {
    pub locals: Option<usize>,
    /// Body offset of every object, in declaration order.
    pub objects: Vec<u32>,
}

/// Builds a pre-SCI1.1 script: locals, a string block, the object and class
/// blocks, then the relocation block. Named objects get their name slot
/// relocated; `local_pointers` lists local indices to relocate as well.
pub fn sci0_script(
    locals: &[u16],
    local_pointers: &[usize],
    objects: &[ObjectSpec],
) -> (Vec<u8>, Sci0Layout) {
    let mut out = Vec::new();
    let mut layout = Sci0Layout::default();
    let mut relocations: Vec<u16> = Vec::new();

    if !locals.is_empty() {
        let mut payload = Vec::new();
        push_words(&mut payload, locals);
        let start = push_block(&mut out, 10, &payload);
        layout.locals = Some(start + 4);
        for index in local_pointers {
            relocations.push((start + 4 + index * 2) as u16);
        }
    }

    let mut name_offsets = Vec::new();
    let mut strings = Vec::new();
    let strings_start = out.len() + 4;
    for spec in objects {
        match spec.name {
            Some(name) => {
                name_offsets.push((strings_start + strings.len()) as u16);
                strings.extend_from_slice(name.as_bytes());
                strings.push(0);
            }
            None => name_offsets.push(0),
        }
    }
    if !strings.is_empty() {
        if strings.len() % 2 == 1 {
            strings.push(0);
        }
        push_block(&mut out, 5, &strings);
    }

    for (spec, name_offset) in objects.iter().zip(name_offsets) {
        let mut values = vec![spec.species, spec.superclass, spec.info(), name_offset];
        values.extend_from_slice(&spec.extra);
        let var_count = values.len() as u16;
        let selectors: Vec<u16> = (0..var_count).collect();
        let function_area = var_count * 4 + 2;

        let mut words = vec![MAGIC, 0, function_area, var_count];
        words.extend_from_slice(&values);
        words.extend_from_slice(&selectors);
        words.push(spec.methods.len() as u16);
        words.extend(spec.methods.iter().map(|(selector, _)| *selector));
        words.push(0);
        words.extend(spec.methods.iter().map(|(_, code)| *code));
        words.push(0);

        let mut payload = Vec::new();
        push_words(&mut payload, &words);
        let block_type = if spec.class { 6 } else { 1 };
        let start = push_block(&mut out, block_type, &payload);
        let body = start + 12;
        layout.objects.push(body as u32);
        if spec.name.is_some() {
            relocations.push((body + 6) as u16);
        }
    }

    if !relocations.is_empty() {
        let mut payload = Vec::new();
        push_words(&mut payload, &[relocations.len() as u16]);
        push_words(&mut payload, &relocations);
        push_block(&mut out, 8, &payload);
    }
    push_words(&mut out, &[0]);
    (out, layout)
}

/// Builds an SCI1.1 script/heap pair. The script resource holds the property
/// and method dictionaries; the heap holds locals, objects and names.
pub fn sci11_script(
    locals: &[u16],
    local_pointers: &[usize],
    objects: &[ObjectSpec],
) -> (Vec<u8>, Vec<u8>) {
    // Script resource: dictionaries after a small preamble, odd length.
    let mut script = vec![0u8; 8];
    let mut dicts = Vec::new();
    for spec in objects {
        let var_count = 9 + spec.extra.len() as u16;
        let property_dict = script.len() as u16;
        push_words(&mut script, &(0..var_count).collect::<Vec<_>>());
        let method_dict = script.len() as u16;
        let mut words = vec![spec.methods.len() as u16];
        for (selector, code) in &spec.methods {
            words.push(*selector);
            words.push(*code);
        }
        words.extend_from_slice(&[0, 0]);
        push_words(&mut script, &words);
        dicts.push((property_dict, method_dict));
    }
    script.push(0xff);

    let objects_start = 4 + locals.len() * 2;
    let objects_size: usize = objects.iter().map(|spec| (9 + spec.extra.len()) * 2).sum();
    let strings_start = objects_start + objects_size + 2;

    let mut strings = Vec::new();
    let mut name_offsets = Vec::new();
    for spec in objects {
        match spec.name {
            Some(name) => {
                name_offsets.push((strings_start + strings.len()) as u16);
                strings.extend_from_slice(name.as_bytes());
                strings.push(0);
            }
            None => name_offsets.push(0),
        }
    }
    if strings.len() % 2 == 1 {
        strings.push(0);
    }
    let relocation_table = strings_start + strings.len();

    let mut relocations: Vec<u16> = local_pointers
        .iter()
        .map(|index| (4 + index * 2) as u16)
        .collect();
    let mut heap = Vec::new();
    push_words(&mut heap, &[relocation_table as u16, locals.len() as u16]);
    push_words(&mut heap, locals);
    for ((spec, (property_dict, method_dict)), name_offset) in
        objects.iter().zip(dicts).zip(name_offsets)
    {
        let object_start = heap.len();
        let var_count = 9 + spec.extra.len() as u16;
        let mut words = vec![
            MAGIC,
            var_count,
            property_dict,
            method_dict,
            0,
            spec.species,
            spec.superclass,
            spec.info(),
            name_offset,
        ];
        words.extend_from_slice(&spec.extra);
        push_words(&mut heap, &words);
        if spec.name.is_some() {
            relocations.push((object_start + 16) as u16);
        }
    }
    push_words(&mut heap, &[0]);
    heap.extend_from_slice(&strings);
    push_words(&mut heap, &[relocations.len() as u16]);
    push_words(&mut heap, &relocations);
    (script, heap)
}

/// Offset of the group 0 selector block inside an SCI3 object: the header,
/// the group location table, then the unused block at location 0.
const SCI3_GROUP_BLOCK: usize = 16 + 192 + 64;
const SCI3_OBJECT_SIZE: usize = SCI3_GROUP_BLOCK + 64;

/// Where things ended up in a built SCI3 script.
#[derive(Debug, Clone, Default)]
pub struct Sci3Layout {
    pub locals: usize,
    pub objects: Vec<u32>,
    /// Script offset of each named object's name string.
    pub names: Vec<u32>,
    /// Buffer offset of each object's `name` property value.
    pub name_properties: Vec<u32>,
}

/// Builds an SCI3 script. Every object keeps its properties in selector
/// group 0: `name` (selector 3), then the extras from selector 4 on. Name
/// properties hold zero and reach their string through a relocation entry
/// whose addend is the string offset. `stray_relocations` adds entries at
/// locations no property occupies.
pub fn sci3_script(
    locals: &[u16],
    objects: &[ObjectSpec],
    stray_relocations: &[u32],
) -> (Vec<u8>, Sci3Layout) {
    // Header, no exports, so locals start at the first dword after it.
    let mut out = vec![0u8; 24];
    out[12..14].copy_from_slice(&(locals.len() as u16).to_le_bytes());
    let mut layout = Sci3Layout {
        locals: out.len(),
        ..Sci3Layout::default()
    };
    push_words(&mut out, locals);
    while out.len() % 4 != 0 {
        out.push(0);
    }

    for spec in objects {
        let start = out.len();
        layout.objects.push(start as u32);
        push_words(
            &mut out,
            &[
                MAGIC,
                SCI3_OBJECT_SIZE as u16,
                spec.species,
                0,
                spec.superclass,
                spec.info(),
                0,
                0,
            ],
        );
        let mut groups = [0u8; 192];
        groups[0] = 1;
        out.extend_from_slice(&groups);
        out.resize(start + SCI3_GROUP_BLOCK, 0);

        let mut words = [NO_CLASS; 32];
        let mut mask: u32 = 1 << 3;
        words[3] = 0;
        for (index, value) in spec.extra.iter().enumerate() {
            words[4 + index] = *value;
            mask |= 1 << (4 + index);
        }
        for (selector, code) in &spec.methods {
            words[*selector as usize] = *code;
        }
        let block = out.len();
        push_words(&mut out, &words);
        out[block..block + 4].copy_from_slice(&mask.to_le_bytes());
        layout.name_properties.push((block + 6) as u32);
    }

    let mut relocations = Vec::new();
    for (spec, property) in objects.iter().zip(&layout.name_properties) {
        if let Some(name) = spec.name {
            let string = out.len() as u32;
            layout.names.push(string);
            relocations.push((*property, string));
            out.extend_from_slice(name.as_bytes());
            out.push(0);
        }
    }
    if out.len() % 2 == 1 {
        out.push(0);
    }
    relocations.extend(stray_relocations.iter().map(|location| (*location, 0x100)));

    let table = out.len() as u32;
    for (location, addend) in &relocations {
        out.extend_from_slice(&location.to_le_bytes());
        out.extend_from_slice(&addend.to_le_bytes());
        out.extend_from_slice(&[0, 0]);
    }
    out[8..12].copy_from_slice(&table.to_le_bytes());
    out[18..20].copy_from_slice(&(relocations.len() as u16).to_le_bytes());
    (out, layout)
}

/// Species-to-script table in the vocab.996 format.
pub fn class_vocab(scripts: &[u16]) -> ByteSpan {
    let mut out = Vec::new();
    for script in scripts {
        push_words(&mut out, &[0, *script]);
    }
    ByteSpan::new(out)
}

pub fn config(version: SciVersion) -> VmConfig {
    VmConfig {
        version,
        ..VmConfig::default()
    }
}

pub fn selectors() -> Arc<SelectorTable> {
    Arc::new(SelectorTable::from_names(SELECTOR_NAMES))
}

/// A heap whose scripts come from an in-memory map.
pub fn heap_with(config: &VmConfig, scripts: BTreeMap<u16, ScriptResource>) -> SegManager {
    SegManager::new(config, selectors()).with_source(Box::new(scripts))
}

pub fn sci0_resource(number: u16, data: Vec<u8>) -> ScriptResource {
    ScriptResource::new(number, ByteSpan::new(data))
}
