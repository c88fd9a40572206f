//! Raw object record layouts.
//!
//! Each interpreter generation stores a script object differently. The three
//! parsers here only decode what the bytes say; binding the result to a heap
//! address and resolving class references is the engine's job.

use serde::Serialize;

use crate::span::{ByteSpan, SpanError};
use crate::version::{Endian, LayoutKind, SciVersion};

/// Marker word that opens every object record.
pub const OBJECT_MAGIC: u16 = 0x1234;

/// Species/superclass value meaning "none".
pub const NO_CLASS: u16 = 0xffff;

/// Selectors per version-3 group.
pub const SELECTOR_GROUP_SIZE: usize = 32;

/// Group slots reserved in the version-3 group-location table before the
/// selector blocks start.
const EXTRA_GROUPS: usize = 3;

/// A decoded method-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MethodEntry {
    pub selector: u16,
    pub code_offset: u32,
}

/// Where the property selector IDs of an object live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarSelectors {
    /// A table of 16-bit IDs inside the script buffer.
    Span(ByteSpan),
    /// IDs collected from version-3 group tables.
    Ids(Vec<u16>),
}

impl Default for VarSelectors {
    fn default() -> Self {
        VarSelectors::Ids(Vec::new())
    }
}

impl VarSelectors {
    /// Selector ID of property `index`.
    pub fn get(&self, index: usize, endian: Endian) -> Result<u16, SpanError> {
        self.read_at_byte(index * 2, endian)
    }

    /// Reads the ID stored at a byte offset into the table, which is how
    /// compiled code addresses properties.
    pub fn read_at_byte(&self, offset: usize, endian: Endian) -> Result<u16, SpanError> {
        match self {
            VarSelectors::Span(span) => span.read_u16(offset, endian),
            VarSelectors::Ids(ids) => ids.get(offset / 2).copied().ok_or(SpanError {
                offset,
                width: 2,
                len: ids.len() * 2,
                base: 0,
            }),
        }
    }
}

/// Everything the object model needs from one raw record.
#[derive(Debug, Clone)]
pub struct ParsedObjectHeader {
    pub layout: LayoutKind,
    /// The object body, starting at the object's address.
    pub base_obj: ByteSpan,
    pub var_count: usize,
    pub var_selectors: VarSelectors,
    pub methods: Vec<MethodEntry>,
    /// Initial variable values; `None` when values were not requested.
    pub values: Option<Vec<u16>>,
    /// Version 3: absolute buffer offset of each property value.
    pub property_offsets: Option<Vec<u32>>,
    /// Version 3: per selector group, whether the view-visible bit is set.
    pub view_visible_groups: Vec<bool>,
    /// Version 3 keeps these outside the property list.
    pub species: Option<u16>,
    pub superclass: Option<u16>,
    pub info: Option<u16>,
}

impl ParsedObjectHeader {
    fn empty(layout: LayoutKind, base_obj: ByteSpan) -> Self {
        ParsedObjectHeader {
            layout,
            base_obj,
            var_count: 0,
            var_selectors: VarSelectors::default(),
            methods: Vec::new(),
            values: None,
            property_offsets: None,
            view_visible_groups: Vec::new(),
            species: None,
            superclass: None,
            info: None,
        }
    }
}

fn read_words(
    span: &ByteSpan,
    start: usize,
    count: usize,
    endian: Endian,
) -> Result<Vec<u16>, SpanError> {
    (0..count)
        .map(|index| span.read_u16(start + index * 2, endian))
        .collect()
}

fn offset_before(span: &ByteSpan, offset: usize, distance: usize) -> Result<usize, SpanError> {
    offset.checked_sub(distance).ok_or(SpanError {
        offset,
        width: distance,
        len: span.len(),
        base: span.base_offset(),
    })
}

/// SCI0 and SCI1: a six-byte header sits in front of the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutPre11;

impl LayoutPre11 {
    pub const HEADER_SIZE: usize = 6;
    pub const HEADER_LOCAL_VARIABLES: usize = 0;
    pub const HEADER_FUNCTION_AREA: usize = 2;
    pub const HEADER_SELECTOR_COUNTER: usize = 4;

    pub fn parse(
        &self,
        buf: &ByteSpan,
        offset: usize,
        endian: Endian,
        read_values: bool,
    ) -> Result<ParsedObjectHeader, SpanError> {
        let data = buf.subspan(offset, None)?;
        let header_start = offset_before(buf, offset, Self::HEADER_SIZE)?;
        let header = buf.subspan(header_start, None)?;

        let var_count = header.read_u16_le(Self::HEADER_SELECTOR_COUNTER)? as usize;
        let function_area = header.read_u16_le(Self::HEADER_FUNCTION_AREA)? as usize;
        let var_selectors = VarSelectors::Span(data.subspan(var_count * 2, None)?);

        let method_count =
            data.read_u16_le(offset_before(&data, function_area, 2)?)? as usize;
        // Selectors, a separator word, then code offsets, plus one trailing word.
        let words = read_words(&data, function_area, method_count * 2 + 2, endian)?;
        let methods = (0..method_count)
            .map(|index| MethodEntry {
                selector: words[index],
                code_offset: u32::from(words[method_count + 1 + index]),
            })
            .collect();

        let values = if read_values {
            Some(read_words(&data, 0, var_count, endian)?)
        } else {
            None
        };

        let mut parsed = ParsedObjectHeader::empty(LayoutKind::Pre11, data);
        parsed.var_count = var_count;
        parsed.var_selectors = var_selectors;
        parsed.methods = methods;
        parsed.values = values;
        Ok(parsed)
    }
}

/// SCI1.1 through SCI2.1: the body itself carries the variable count and
/// pointers to the property and method dictionaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct Layout11to21;

impl Layout11to21 {
    pub const OFFSET_VAR_COUNT: usize = 2;
    pub const OFFSET_PROPERTY_DICT: usize = 4;
    pub const OFFSET_METHOD_DICT: usize = 6;

    pub fn parse(
        &self,
        buf: &ByteSpan,
        offset: usize,
        endian: Endian,
        read_values: bool,
    ) -> Result<ParsedObjectHeader, SpanError> {
        let data = buf.subspan(offset, None)?;
        let var_count = data.read_u16(Self::OFFSET_VAR_COUNT, endian)? as usize;
        let property_dict = data.read_u16(Self::OFFSET_PROPERTY_DICT, endian)? as usize;
        let var_selectors = VarSelectors::Span(buf.subspan(property_dict, Some(var_count * 2))?);

        let method_dict = data.read_u16(Self::OFFSET_METHOD_DICT, endian)? as usize;
        let method_count = buf.read_u16(method_dict, endian)? as usize;
        // Count word, selector/code pairs, plus two trailing words.
        let words = read_words(buf, method_dict, method_count * 2 + 3, endian)?;
        let methods = (0..method_count)
            .map(|index| MethodEntry {
                selector: words[index * 2 + 1],
                code_offset: u32::from(words[index * 2 + 2]),
            })
            .collect();

        let values = if read_values {
            Some(read_words(&data, 0, var_count, endian)?)
        } else {
            None
        };

        let mut parsed = ParsedObjectHeader::empty(LayoutKind::Sci11, data);
        parsed.var_count = var_count;
        parsed.var_selectors = var_selectors;
        parsed.methods = methods;
        parsed.values = values;
        Ok(parsed)
    }
}

/// SCI3: selectors are grouped by 32; a byte table says where (if anywhere)
/// each group's block of type mask plus values lives.
#[derive(Debug, Clone, Copy)]
pub struct Layout3 {
    pub selector_count: usize,
}

impl Layout3 {
    pub const OFFSET_SPECIES: usize = 4;
    pub const OFFSET_SUPERCLASS: usize = 8;
    pub const OFFSET_INFO: usize = 10;
    pub const OFFSET_GROUP_INFO: usize = 16;

    pub fn group_count(&self) -> usize {
        self.selector_count.div_ceil(SELECTOR_GROUP_SIZE)
    }

    pub fn parse(
        &self,
        buf: &ByteSpan,
        offset: usize,
        endian: Endian,
        read_values: bool,
    ) -> Result<ParsedObjectHeader, SpanError> {
        let base_obj = buf.subspan(offset, None)?;
        let group_info = base_obj.subspan(Self::OFFSET_GROUP_INFO, None)?;
        let selector_base = group_info.subspan(EXTRA_GROUPS * SELECTOR_GROUP_SIZE * 2, None)?;
        let groups = self.group_count();

        let mut view_visible_groups = vec![false; groups];
        let mut properties = 0usize;
        let mut methods = 0usize;

        // The first two selectors of each group are never defined: their
        // storage holds the 32-bit type mask.
        for (group, visible) in view_visible_groups.iter_mut().enumerate() {
            let Some(seeker) = Self::group_block(&group_info, &selector_base, group)? else {
                continue;
            };
            let type_mask = seeker.read_u32(0, endian)?;
            *visible = type_mask & 1 != 0;
            for bit in 2..SELECTOR_GROUP_SIZE {
                let value = seeker.read_u16(bit * 2, endian)?;
                if type_mask & (1 << bit) != 0 {
                    properties += 1;
                } else if value != NO_CLASS {
                    methods += 1;
                }
            }
        }

        let mut property_ids = Vec::with_capacity(properties);
        let mut property_offsets = Vec::with_capacity(properties);
        let mut values = Vec::with_capacity(properties);
        let mut method_table = Vec::with_capacity(methods);
        let code_base = buf.read_u32(0, endian)?;

        for group in 0..groups {
            let Some(seeker) = Self::group_block(&group_info, &selector_base, group)? else {
                continue;
            };
            let type_mask = seeker.read_u32(0, endian)?;
            let group_base_id = group * SELECTOR_GROUP_SIZE;
            for bit in 2..SELECTOR_GROUP_SIZE {
                let value = seeker.read_u16(bit * 2, endian)?;
                let selector = (group_base_id + bit) as u16;
                if type_mask & (1 << bit) != 0 {
                    property_ids.push(selector);
                    values.push(value);
                    let absolute = seeker.base_offset() + bit * 2 - buf.base_offset();
                    property_offsets.push(absolute as u32);
                } else if value != NO_CLASS {
                    method_table.push(MethodEntry {
                        selector,
                        code_offset: u32::from(value).wrapping_add(code_base),
                    });
                }
            }
        }

        let species = base_obj.read_u16(Self::OFFSET_SPECIES, endian)?;
        let superclass = base_obj.read_u16(Self::OFFSET_SUPERCLASS, endian)?;
        let info = if read_values {
            Some(base_obj.read_u16(Self::OFFSET_INFO, endian)?)
        } else {
            None
        };

        let mut parsed = ParsedObjectHeader::empty(LayoutKind::Sci3, base_obj);
        parsed.var_count = property_ids.len();
        parsed.var_selectors = VarSelectors::Ids(property_ids);
        parsed.methods = method_table;
        parsed.values = Some(values);
        parsed.property_offsets = Some(property_offsets);
        parsed.view_visible_groups = view_visible_groups;
        parsed.species = Some(species);
        parsed.superclass = Some(superclass);
        parsed.info = info;
        Ok(parsed)
    }

    fn group_block(
        group_info: &ByteSpan,
        selector_base: &ByteSpan,
        group: usize,
    ) -> Result<Option<ByteSpan>, SpanError> {
        let location = group_info.read_u8(group)? as usize;
        if location == 0 {
            return Ok(None);
        }
        let block = selector_base.subspan(
            location * SELECTOR_GROUP_SIZE * 2,
            Some(SELECTOR_GROUP_SIZE * 2),
        )?;
        Ok(Some(block))
    }
}

/// Layout selected for one interpreter version.
#[derive(Debug, Clone, Copy)]
pub enum ObjectLayout {
    Pre11(LayoutPre11),
    Sci11(Layout11to21),
    Sci3(Layout3),
}

impl ObjectLayout {
    /// `selector_count` is the size of the game's selector vocabulary; only
    /// version 3 needs it, to know how many groups to walk.
    pub fn for_version(version: SciVersion, selector_count: usize) -> Self {
        match version.layout() {
            LayoutKind::Pre11 => ObjectLayout::Pre11(LayoutPre11),
            LayoutKind::Sci11 => ObjectLayout::Sci11(Layout11to21),
            LayoutKind::Sci3 => ObjectLayout::Sci3(Layout3 { selector_count }),
        }
    }

    pub fn kind(&self) -> LayoutKind {
        match self {
            ObjectLayout::Pre11(_) => LayoutKind::Pre11,
            ObjectLayout::Sci11(_) => LayoutKind::Sci11,
            ObjectLayout::Sci3(_) => LayoutKind::Sci3,
        }
    }

    pub fn parse(
        &self,
        buf: &ByteSpan,
        offset: usize,
        endian: Endian,
        read_values: bool,
    ) -> Result<ParsedObjectHeader, SpanError> {
        match self {
            ObjectLayout::Pre11(layout) => layout.parse(buf, offset, endian, read_values),
            ObjectLayout::Sci11(layout) => layout.parse(buf, offset, endian, read_values),
            ObjectLayout::Sci3(layout) => layout.parse(buf, offset, endian, read_values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_words(out: &mut Vec<u8>, words: &[u16]) {
        for word in words {
            out.extend_from_slice(&word.to_le_bytes());
        }
    }

    /// Header at 0, body at 6: three variables, three selector IDs, then a
    /// method area with two methods.
    fn pre11_class() -> Vec<u8> {
        let mut data = Vec::new();
        let function_area = 3 * 2 + 3 * 2 + 2;
        push_words(&mut data, &[0, function_area, 3]);
        push_words(&mut data, &[7, 0xffff, 0x8000]);
        push_words(&mut data, &[0x10, 0x11, 0x12]);
        push_words(&mut data, &[2]);
        push_words(&mut data, &[0x40, 0x41, 0, 0x200, 0x210, 0]);
        data
    }

    #[test]
    fn pre11_counts_match_header_fields() {
        let buf = ByteSpan::new(pre11_class());
        let parsed = LayoutPre11.parse(&buf, 6, Endian::Little, true).unwrap();
        assert_eq!(parsed.var_count, 3);
        assert_eq!(parsed.values.as_deref(), Some(&[7, 0xffff, 0x8000][..]));
        assert_eq!(
            parsed.methods,
            vec![
                MethodEntry { selector: 0x40, code_offset: 0x200 },
                MethodEntry { selector: 0x41, code_offset: 0x210 },
            ]
        );
        assert_eq!(parsed.var_selectors.get(2, Endian::Little).unwrap(), 0x12);
    }

    #[test]
    fn pre11_without_values_skips_variable_reads() {
        let buf = ByteSpan::new(pre11_class());
        let parsed = LayoutPre11.parse(&buf, 6, Endian::Little, false).unwrap();
        assert!(parsed.values.is_none());
        assert_eq!(parsed.var_count, 3);
    }

    #[test]
    fn pre11_requires_room_for_the_header() {
        let buf = ByteSpan::new(pre11_class());
        assert!(LayoutPre11.parse(&buf, 4, Endian::Little, true).is_err());
    }

    #[test]
    fn pre11_truncated_method_area_fails() {
        let mut data = pre11_class();
        data.truncate(data.len() - 2);
        let buf = ByteSpan::new(data);
        assert!(LayoutPre11.parse(&buf, 6, Endian::Little, true).is_err());
    }

    #[test]
    fn sci11_reads_dictionaries_from_the_buffer() {
        let mut data = Vec::new();
        // property dictionary at 0: nine selector IDs
        push_words(&mut data, &[0, 1, 2, 3, 4, 5, 6, 7, 8]);
        // method dictionary at 18: count 1, one pair, two trailing words
        push_words(&mut data, &[1, 0x33, 0x120, 0, 0]);
        // object body at 28
        push_words(&mut data, &[OBJECT_MAGIC, 9, 0, 18, 0, 4, 4, 0x8000, 0]);
        let buf = ByteSpan::new(data);
        let parsed = Layout11to21.parse(&buf, 28, Endian::Little, true).unwrap();
        assert_eq!(parsed.var_count, 9);
        assert_eq!(parsed.methods.len(), 1);
        assert_eq!(parsed.methods[0].selector, 0x33);
        assert_eq!(parsed.methods[0].code_offset, 0x120);
        assert_eq!(parsed.values.as_ref().unwrap()[7], 0x8000);
        assert_eq!(parsed.var_selectors.get(8, Endian::Little).unwrap(), 8);
    }

    #[test]
    fn sci11_honours_big_endian_words() {
        let mut data = Vec::new();
        for word in [0u16, 1, 2, 0, 0, 0, OBJECT_MAGIC, 3, 0, 6] {
            data.extend_from_slice(&word.to_be_bytes());
        }
        let buf = ByteSpan::new(data);
        let parsed = Layout11to21.parse(&buf, 12, Endian::Big, true).unwrap();
        assert_eq!(parsed.var_count, 3);
        assert!(parsed.methods.is_empty());
        assert_eq!(parsed.var_selectors.get(1, Endian::Big).unwrap(), 1);
    }

    fn sci3_object(group_locations: &[u8], blocks: &[(u32, [u16; 32])]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&0x1000u32.to_le_bytes());
        data.resize(8, 0);
        // body at 8
        push_words(&mut data, &[OBJECT_MAGIC, 0, 12, 0, 0xffff, 0x8000, 0, 0]);
        let mut table = [0u8; 192];
        table[..group_locations.len()].copy_from_slice(group_locations);
        data.extend_from_slice(&table);
        // location 0 is never used, so block N sits N*64 bytes in
        data.resize(data.len() + 64, 0);
        for (mask, words) in blocks {
            let start = data.len();
            push_words(&mut data, words);
            data[start..start + 4].copy_from_slice(&mask.to_le_bytes());
        }
        data
    }

    #[test]
    fn sci3_two_pass_group_parse() {
        let mut words = [0xffffu16; 32];
        words[2] = 0x10;
        words[3] = 0x20;
        words[4] = 0x40;
        let mask = 1 | (1 << 2) | (1 << 3);
        let buf = ByteSpan::new(sci3_object(&[1, 0], &[(mask, words)]));
        let layout = Layout3 { selector_count: 64 };
        let parsed = layout.parse(&buf, 8, Endian::Little, true).unwrap();

        assert_eq!(parsed.var_count, 2);
        assert_eq!(parsed.values.as_deref(), Some(&[0x10, 0x20][..]));
        assert_eq!(parsed.var_selectors, VarSelectors::Ids(vec![2, 3]));
        assert_eq!(
            parsed.methods,
            vec![MethodEntry { selector: 4, code_offset: 0x1040 }]
        );
        assert_eq!(parsed.view_visible_groups, vec![true, false]);
        let block_start = 8 + 16 + 192 + 64;
        assert_eq!(
            parsed.property_offsets,
            Some(vec![block_start as u32 + 4, block_start as u32 + 6])
        );
        assert_eq!(parsed.species, Some(12));
        assert_eq!(parsed.superclass, Some(0xffff));
        assert_eq!(parsed.info, Some(0x8000));
    }

    #[test]
    fn sci3_without_groups_yields_nothing() {
        let buf = ByteSpan::new(sci3_object(&[0, 0], &[]));
        let layout = Layout3 { selector_count: 64 };
        let parsed = layout.parse(&buf, 8, Endian::Little, false).unwrap();
        assert_eq!(parsed.var_count, 0);
        assert!(parsed.methods.is_empty());
        assert_eq!(parsed.view_visible_groups, vec![false, false]);
        assert_eq!(parsed.info, None);
    }

    #[test]
    fn sci3_group_count_rounds_up() {
        assert_eq!(Layout3 { selector_count: 0 }.group_count(), 0);
        assert_eq!(Layout3 { selector_count: 32 }.group_count(), 1);
        assert_eq!(Layout3 { selector_count: 33 }.group_count(), 2);
    }
}
