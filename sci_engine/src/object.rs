//! Script objects: classes and their instances.
//!
//! An [`Object`] is parsed from a script image according to the configured
//! interpreter version. Species and superclass references start out as raw
//! class numbers and are bound to heap addresses through a [`ClassResolver`]
//! while the owning script is instantiated.

use sci_formats::{
    ByteSpan, Endian, LayoutKind, MethodEntry, ObjectLayout, SciVersion, VarSelectors, NO_CLASS,
};
use serde::Serialize;

use crate::error::{VmError, VmResult};
use crate::heap::ScriptLock;
use crate::reg::{Reg, SegmentId};

pub const INFO_FLAG_CLONE: u16 = 0x0001;
pub const INFO_FLAG_VIEW_VISIBLE: u16 = 0x0008;
pub const INFO_FLAG_CLASS: u16 = 0x8000;

const VIEW_VISIBLE_RANGE: (usize, usize) = (26, 44);
const VIEW_VISIBLE_RANGE_ALT: (usize, usize) = (24, 43);

/// Version-dependent parameters every object is parsed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectFormat {
    pub version: SciVersion,
    pub endian: Endian,
    /// Size of the selector vocabulary; bounds the version 3 group walk.
    pub selector_count: usize,
    /// Selector ID of `name`, when the vocabulary has one.
    pub name_selector: Option<u16>,
    pub alternate_selectors: bool,
}

impl ObjectFormat {
    pub fn new(version: SciVersion, endian: Endian) -> Self {
        ObjectFormat {
            version,
            endian,
            selector_count: 0,
            name_selector: None,
            alternate_selectors: false,
        }
    }

    pub fn layout(&self) -> ObjectLayout {
        ObjectLayout::for_version(self.version, self.selector_count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectState {
    /// Layout known, variables not yet read.
    Parsed,
    Initialized,
    Relocating,
    /// Freed clone slot or unloaded script.
    Invalidated,
}

/// What an instance borrows from its species.
#[derive(Debug, Clone)]
pub struct ClassLayout {
    pub base_obj: ByteSpan,
    pub var_count: usize,
}

/// Read access to live objects by address.
pub trait ObjectLookup {
    fn object(&self, addr: Reg) -> Option<&Object>;
}

/// Everything object initialisation needs from the heap.
pub trait ClassResolver: ObjectLookup {
    /// Address of the class object for `species`, loading its script when
    /// `lock` allows. Yields `Reg::NULL` when the class cannot be found and
    /// `lock` is [`ScriptLock::DontLoad`].
    fn class_address(&mut self, species: u16, lock: ScriptLock, caller: Reg) -> VmResult<Reg>;

    fn script_number(&self, segment: SegmentId) -> Option<u16>;

    fn deref_string(&self, addr: Reg) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct Object {
    format: ObjectFormat,
    pos: Reg,
    base_obj: ByteSpan,
    base_vars: VarSelectors,
    variables: Vec<Reg>,
    methods: Vec<MethodEntry>,
    property_offsets: Vec<u32>,
    view_visible_groups: Vec<bool>,
    species_sci3: Reg,
    superclass_sci3: Reg,
    info_sci3: Reg,
    state: ObjectState,
}

impl Object {
    /// Parses the object whose body starts at `pos.offset` in `buf`.
    pub fn init(
        format: &ObjectFormat,
        buf: &ByteSpan,
        pos: Reg,
        init_variables: bool,
    ) -> VmResult<Object> {
        let parsed = format
            .layout()
            .parse(buf, pos.offset as usize, format.endian, init_variables)?;

        let mut variables = vec![Reg::NULL; parsed.var_count];
        if let Some(values) = &parsed.values {
            for (slot, value) in variables.iter_mut().zip(values) {
                *slot = Reg::number(*value);
            }
        }

        let mut state = if init_variables {
            ObjectState::Initialized
        } else {
            ObjectState::Parsed
        };
        if parsed.layout == LayoutKind::Sci3 {
            // Property values come with the group tables.
            state = ObjectState::Initialized;
        }

        Ok(Object {
            format: *format,
            pos,
            base_obj: parsed.base_obj,
            base_vars: parsed.var_selectors,
            variables,
            methods: parsed.methods,
            property_offsets: parsed.property_offsets.unwrap_or_default(),
            view_visible_groups: parsed.view_visible_groups,
            species_sci3: Reg::number(parsed.species.unwrap_or(0)),
            superclass_sci3: Reg::number(parsed.superclass.unwrap_or(0)),
            info_sci3: Reg::number(parsed.info.unwrap_or(0)),
            state,
        })
    }

    pub fn pos(&self) -> Reg {
        self.pos
    }

    pub(crate) fn set_pos(&mut self, pos: Reg) {
        self.pos = pos;
    }

    pub fn format(&self) -> &ObjectFormat {
        &self.format
    }

    pub fn state(&self) -> ObjectState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ObjectState) {
        self.state = state;
    }

    pub fn base_obj(&self) -> &ByteSpan {
        &self.base_obj
    }

    pub fn class_layout(&self) -> ClassLayout {
        ClassLayout {
            base_obj: self.base_obj.clone(),
            var_count: self.variables.len(),
        }
    }

    fn is_sci3(&self) -> bool {
        self.format.version.layout() == LayoutKind::Sci3
    }

    fn base_index(&self) -> usize {
        self.format.version.selector_base_index()
    }

    fn fixed_variable(&self, slot: usize) -> Reg {
        self.variables
            .get(self.base_index() + slot)
            .copied()
            .unwrap_or(Reg::NULL)
    }

    fn set_fixed_variable(&mut self, slot: usize, value: Reg) {
        let index = self.base_index() + slot;
        if let Some(var) = self.variables.get_mut(index) {
            *var = value;
        }
    }

    pub fn species_selector(&self) -> Reg {
        if self.is_sci3() {
            self.species_sci3
        } else {
            self.fixed_variable(0)
        }
    }

    pub fn set_species_selector(&mut self, value: Reg) {
        if self.is_sci3() {
            self.species_sci3 = value;
        } else {
            self.set_fixed_variable(0, value);
        }
    }

    pub fn superclass_selector(&self) -> Reg {
        if self.is_sci3() {
            self.superclass_sci3
        } else {
            self.fixed_variable(1)
        }
    }

    pub fn set_superclass_selector(&mut self, value: Reg) {
        if self.is_sci3() {
            self.superclass_sci3 = value;
        } else {
            self.set_fixed_variable(1, value);
        }
    }

    pub fn info_selector(&self) -> Reg {
        if self.is_sci3() {
            self.info_sci3
        } else {
            self.fixed_variable(2)
        }
    }

    pub fn set_info_selector(&mut self, value: Reg) {
        if self.is_sci3() {
            self.info_sci3 = value;
        } else {
            self.set_fixed_variable(2, value);
        }
    }

    /// Address of the object's name string; null when it has none.
    pub fn name_selector(&self) -> Reg {
        if self.is_sci3() {
            let Some(name) = self.format.name_selector else {
                return Reg::NULL;
            };
            return match self.own_var_index(name) {
                Some(index) => self.variables[index],
                None => Reg::NULL,
            };
        }
        self.fixed_variable(3)
    }

    fn own_var_index(&self, selector: u16) -> Option<usize> {
        (0..self.variables.len())
            .find(|&index| self.base_vars.get(index, self.format.endian).ok() == Some(selector))
    }

    pub fn is_class(&self) -> bool {
        self.info_selector().to_u16() & INFO_FLAG_CLASS != 0
    }

    pub fn is_clone(&self) -> bool {
        self.info_selector().to_u16() & INFO_FLAG_CLONE != 0
    }

    pub fn mark_as_clone(&mut self) {
        let info = (self.info_selector().to_u16() & !INFO_FLAG_CLASS) | INFO_FLAG_CLONE;
        self.set_info_selector(Reg::number(info));
    }

    pub fn mark_as_freed(&mut self) {
        self.state = ObjectState::Invalidated;
    }

    pub fn is_freed(&self) -> bool {
        self.state == ObjectState::Invalidated
    }

    pub fn var_count(&self) -> usize {
        self.variables.len()
    }

    pub fn variables(&self) -> &[Reg] {
        &self.variables
    }

    pub fn variable(&self, index: usize) -> Option<Reg> {
        self.variables.get(index).copied()
    }

    pub fn set_variable(&mut self, index: usize, value: Reg) -> bool {
        match self.variables.get_mut(index) {
            Some(var) => {
                *var = value;
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear_variables(&mut self) {
        self.variables.iter_mut().for_each(|var| *var = Reg::NULL);
    }

    /// Selector ID of variable `index` from this object's own table. Only
    /// classes carry meaningful tables before version 3.
    pub fn var_selector(&self, index: usize) -> VmResult<u16> {
        Ok(self.base_vars.get(index, self.format.endian)?)
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    pub fn methods(&self) -> &[MethodEntry] {
        &self.methods
    }

    pub fn func_selector(&self, index: usize) -> Option<u16> {
        self.methods.get(index).map(|method| method.selector)
    }

    /// Code address of method `index`, in the object's own script.
    pub fn function(&self, index: usize) -> Option<Reg> {
        self.methods
            .get(index)
            .map(|method| Reg::new(self.pos.segment, method.code_offset))
    }

    pub fn func_selector_position(&self, selector: u16) -> Option<usize> {
        self.methods
            .iter()
            .position(|method| method.selector == selector)
    }

    /// Whether writing variable `index` should flag the view as visible.
    pub fn must_set_view_visible(&self, index: usize) -> VmResult<bool> {
        if self.is_sci3() {
            if index >= self.variables.len() {
                return Ok(false);
            }
            let selector = self.var_selector(index)? as usize;
            return Ok(self
                .view_visible_groups
                .get(selector / sci_formats::layout::SELECTOR_GROUP_SIZE)
                .copied()
                .unwrap_or(false));
        }
        let (min, max) = if self.format.alternate_selectors {
            VIEW_VISIBLE_RANGE_ALT
        } else {
            VIEW_VISIBLE_RANGE
        };
        Ok((min..=max).contains(&index))
    }

    /// The object that owns the selector table: itself for classes, its
    /// superclass otherwise.
    pub fn get_class<'a, L: ObjectLookup + ?Sized>(&'a self, lookup: &'a L) -> VmResult<&'a Object> {
        if self.is_class() {
            return Ok(self);
        }
        let superclass = self.superclass_selector();
        lookup.object(superclass).ok_or(VmError::InvalidAddress {
            addr: superclass,
            reason: "superclass is not an object",
        })
    }

    /// Variable index holding `selector`, or `None` when the object has no
    /// such property.
    pub fn locate_var_selector<L: ObjectLookup + ?Sized>(
        &self,
        lookup: &L,
        selector: u16,
    ) -> VmResult<Option<usize>> {
        let endian = self.format.endian;
        let (table, count) = match self.format.version.layout() {
            LayoutKind::Sci3 => (&self.base_vars, self.variables.len()),
            layout => {
                let class = self.get_class(lookup)?;
                let count = if layout == LayoutKind::Pre11 {
                    self.variables.len()
                } else {
                    class.variable(1).map(Reg::to_u16).unwrap_or(0) as usize
                };
                (&class.base_vars, count)
            }
        };
        for index in 0..count {
            if table.get(index, endian)? == selector {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Maps a compiled-in property byte offset to the selector it names.
    pub fn property_offset_to_id<L: ObjectLookup + ?Sized>(
        &self,
        lookup: &L,
        property_offset: i32,
    ) -> VmResult<u16> {
        let selectors = self.variables.len();
        if property_offset < 0 || (property_offset >> 1) as usize >= selectors {
            return Err(VmError::PropertyOffset {
                object: self.pos,
                offset: property_offset,
                var_count: selectors,
            });
        }
        let offset = property_offset as usize;
        let endian = self.format.endian;
        if self.format.version < SciVersion::Sci11 {
            let table = self.base_obj.subspan(selectors * 2, None)?;
            return Ok(table.read_u16(offset, endian)?);
        }
        let class = self.get_class(lookup)?;
        Ok(class.base_vars.read_at_byte(offset, endian)?)
    }

    /// Relocates the pointer slot at `location` if it falls inside this
    /// object's variable block.
    pub(crate) fn relocate(
        &mut self,
        segment: SegmentId,
        location: u32,
        script_size: usize,
    ) -> VmResult<bool> {
        relocate_block(
            &mut self.variables,
            self.pos.offset,
            segment,
            location,
            script_size,
            self.format.version,
            self.pos,
        )
    }

    /// Version 3: relocates the property recorded at exactly `location`.
    pub(crate) fn relocate_sci3(&mut self, segment: SegmentId, location: u32, addend: u32) -> bool {
        for (var, property) in self.variables.iter_mut().zip(&self.property_offsets) {
            if *property == location {
                var.set_segment(segment);
                var.inc_offset(i64::from(addend));
                return true;
            }
        }
        false
    }

    fn resolve_class_number<R: ClassResolver + ?Sized>(
        &self,
        resolver: &mut R,
        raw: Reg,
        addr: Reg,
    ) -> VmResult<Reg> {
        let class_number = raw.to_u16();
        if class_number == NO_CLASS {
            return Ok(Reg::NULL);
        }
        resolver.class_address(class_number, ScriptLock::Lock, addr)
    }

    pub fn init_species<R: ClassResolver + ?Sized>(
        &mut self,
        resolver: &mut R,
        addr: Reg,
    ) -> VmResult<()> {
        let species = self.resolve_class_number(resolver, self.species_selector(), addr)?;
        self.set_species_selector(species);
        Ok(())
    }

    pub fn init_super_class<R: ClassResolver + ?Sized>(
        &mut self,
        resolver: &mut R,
        addr: Reg,
    ) -> VmResult<()> {
        let superclass = self.resolve_class_number(resolver, self.superclass_selector(), addr)?;
        self.set_superclass_selector(superclass);
        Ok(())
    }

    /// Adopts the species' layout. Returns `false` when the species is not
    /// a live object. A variable count that disagrees with the species is
    /// forced to the species' count and reported.
    pub fn init_base_object<R: ClassResolver + ?Sized>(
        &mut self,
        resolver: &mut R,
        addr: Reg,
        do_init_super_class: bool,
    ) -> VmResult<bool> {
        let species = self.species_selector();
        let base = if species == self.pos {
            Some(self.class_layout())
        } else {
            resolver.object(species).map(Object::class_layout)
        };
        let Some(base) = base else {
            return Ok(false);
        };

        let original_var_count = self.variables.len();
        if original_var_count != base.var_count {
            self.variables.resize(base.var_count, Reg::NULL);
        }
        self.base_obj = base.base_obj;
        if do_init_super_class {
            self.init_super_class(resolver, addr)?;
        }

        if self.variables.len() != original_var_count {
            let script = resolver
                .script_number(self.pos.segment)
                .map(|number| number.to_string())
                .unwrap_or_else(|| String::from("?"));
            let mut name_reg = self.name_selector();
            let name = if name_reg.is_null() {
                String::from("<no name>")
            } else {
                name_reg.set_segment(self.pos.segment);
                resolver
                    .deref_string(name_reg)
                    .unwrap_or_else(|| String::from("<invalid name>"))
            };
            log::warn!(
                "object {} (name {}, script {}) variable count doesn't match its species: object {}, species {}",
                self.pos,
                name,
                script,
                original_var_count,
                base.var_count
            );
        }
        Ok(true)
    }
}

/// Shared by objects and local variable blocks: relocates the slot at byte
/// `location` of a block starting at `block_location`.
pub(crate) fn relocate_block(
    block: &mut [Reg],
    block_location: u32,
    segment: SegmentId,
    location: u32,
    script_size: usize,
    version: SciVersion,
    owner: Reg,
) -> VmResult<bool> {
    let rel = i64::from(location) - i64::from(block_location);
    if rel < 0 {
        return Ok(false);
    }
    let index = (rel >> 1) as usize;
    if index >= block.len() {
        return Ok(false);
    }
    if rel & 1 != 0 {
        log::error!(
            "attempt to relocate odd variable #{}.5 (relative to {:04x}) in {}",
            index,
            block_location,
            owner
        );
        return Err(VmError::RelocationAlignment {
            object: owner,
            index: rel >> 1,
            block_location,
        });
    }
    let slot = &mut block[index];
    slot.set_segment(segment);
    if version.relocates_past_script() {
        slot.inc_offset(script_size as i64);
    }
    log::debug!("relocated {owner} slot {index} to {slot}");
    Ok(true)
}
