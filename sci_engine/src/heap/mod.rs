//! The segment manager: owns every heap segment and the class table.

mod clone_table;
mod script;
mod snapshot;
mod strings;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use sci_formats::{
    decode_class_scripts, scan_script, ByteSpan, LayoutKind, ResourceDir, ResourceType,
    SciVersion, ScriptResource,
};
use serde::Serialize;

pub use clone_table::CloneTable;
pub use script::ScriptSegment;
pub use snapshot::{
    CloneSnapshot, HeapSnapshot, ObjectSnapshot, SavedReg, ScriptSnapshot, StringSnapshot,
};
pub use strings::StringHeap;

use crate::config::VmConfig;
use crate::error::{VmError, VmResult};
use crate::object::{ClassResolver, Object, ObjectFormat, ObjectLookup};
use crate::reg::{Reg, SegmentId};
use crate::selector::SelectorTable;

/// How far class resolution may go to find a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptLock {
    /// Only look at scripts already loaded.
    DontLoad,
    /// Load the defining script if needed.
    Load,
    /// Load it and pin it against unloading.
    Lock,
}

impl ScriptLock {
    fn loads(self) -> bool {
        self != ScriptLock::DontLoad
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Script,
    Clones,
    Strings,
}

#[derive(Debug)]
pub enum Segment {
    Script(ScriptSegment),
    Clones(CloneTable),
    Strings(StringHeap),
}

impl Segment {
    pub fn kind(&self) -> SegmentKind {
        match self {
            Segment::Script(_) => SegmentKind::Script,
            Segment::Clones(_) => SegmentKind::Clones,
            Segment::Strings(_) => SegmentKind::Strings,
        }
    }
}

/// What an address points at.
#[derive(Debug)]
pub enum SegmentRef<'a> {
    /// Raw script bytes from the addressed offset onwards.
    Raw(ByteSpan),
    Object(&'a Object),
    Text(&'a str),
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentSummary {
    pub id: SegmentId,
    pub kind: SegmentKind,
    pub description: String,
}

/// Where script resources come from.
pub trait ScriptSource {
    fn load_script(&self, number: u16, version: SciVersion) -> VmResult<ScriptResource>;
}

impl ScriptSource for ResourceDir {
    fn load_script(&self, number: u16, version: SciVersion) -> VmResult<ScriptResource> {
        let script = self
            .get(ResourceType::Script, number)
            .ok_or_else(|| VmError::ScriptLoad {
                script: number,
                reason: String::from("script resource not found"),
            })?;
        if version.layout() != LayoutKind::Sci11 {
            return Ok(ScriptResource::new(number, script));
        }
        let heap = self
            .get(ResourceType::Heap, number)
            .ok_or_else(|| VmError::ScriptLoad {
                script: number,
                reason: String::from("heap resource not found"),
            })?;
        Ok(ScriptResource::with_heap(number, script, heap))
    }
}

impl ScriptSource for BTreeMap<u16, ScriptResource> {
    fn load_script(&self, number: u16, _version: SciVersion) -> VmResult<ScriptResource> {
        self.get(&number).cloned().ok_or_else(|| VmError::ScriptLoad {
            script: number,
            reason: String::from("script not registered"),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ClassEntry {
    script: Option<u16>,
    reg: Reg,
}

#[derive(Debug, Default)]
struct SegmentSlot {
    generation: u16,
    segment: Option<Segment>,
}

pub struct SegManager {
    format: ObjectFormat,
    pin_segments: bool,
    selectors: Arc<SelectorTable>,
    slots: Vec<SegmentSlot>,
    free_slots: Vec<u16>,
    script_segments: BTreeMap<u16, SegmentId>,
    classes: Vec<ClassEntry>,
    clones_segment: Option<SegmentId>,
    strings_segment: Option<SegmentId>,
    source: Option<Box<dyn ScriptSource>>,
}

impl SegManager {
    pub fn new(config: &VmConfig, selectors: Arc<SelectorTable>) -> Self {
        SegManager {
            format: config.object_format(&selectors),
            pin_segments: config.pin_segments,
            selectors,
            // slot 0 is the null segment
            slots: vec![SegmentSlot::default()],
            free_slots: Vec::new(),
            script_segments: BTreeMap::new(),
            classes: Vec::new(),
            clones_segment: None,
            strings_segment: None,
            source: None,
        }
    }

    pub fn with_source(mut self, source: Box<dyn ScriptSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn set_source(&mut self, source: Box<dyn ScriptSource>) {
        self.source = Some(source);
    }

    pub fn format(&self) -> &ObjectFormat {
        &self.format
    }

    pub fn selectors(&self) -> &SelectorTable {
        &self.selectors
    }

    /// Loads the species-to-script table (vocabulary 996).
    pub fn load_class_table(&mut self, vocab: &ByteSpan) -> anyhow::Result<()> {
        let scripts = decode_class_scripts(vocab).context("decoding class table")?;
        log::info!("class table lists {} species", scripts.len());
        for (species, script) in scripts.into_iter().enumerate() {
            self.class_entry_mut(species as u16).script = Some(script);
        }
        Ok(())
    }

    fn class_entry_mut(&mut self, species: u16) -> &mut ClassEntry {
        let index = species as usize;
        if self.classes.len() <= index {
            self.classes.resize(index + 1, ClassEntry::default());
        }
        &mut self.classes[index]
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Allocates an empty segment of `kind`. Script segments are created by
    /// [`SegManager::instantiate_script`] instead.
    pub fn allocate(&mut self, kind: SegmentKind) -> VmResult<SegmentId> {
        let segment = match kind {
            SegmentKind::Clones => Segment::Clones(CloneTable::default()),
            SegmentKind::Strings => Segment::Strings(StringHeap::default()),
            SegmentKind::Script => {
                return Err(VmError::InvalidAddress {
                    addr: Reg::NULL,
                    reason: "script segments are allocated by instantiating a script",
                })
            }
        };
        Ok(self.allocate_segment(segment))
    }

    fn allocate_segment(&mut self, segment: Segment) -> SegmentId {
        let index = match self.free_slots.pop() {
            Some(index) => index,
            None => {
                self.slots.push(SegmentSlot::default());
                (self.slots.len() - 1) as u16
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.segment = Some(segment);
        let id = SegmentId {
            index,
            generation: slot.generation,
        };
        log::debug!("allocated segment {id} (generation {})", id.generation);
        id
    }

    /// Frees a segment. Any `Reg` still naming it stops resolving.
    pub fn free(&mut self, id: SegmentId) -> VmResult<()> {
        self.check_segment(Reg::new(id, 0))?;
        let slot = &mut self.slots[id.index as usize];
        let segment = slot.segment.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free_slots.push(id.index);

        match segment {
            Some(Segment::Script(mut script)) => {
                script.invalidate_objects();
                self.script_segments.remove(&script.number());
                for entry in &mut self.classes {
                    if entry.reg.segment == id {
                        entry.reg = Reg::NULL;
                    }
                }
                for held in script.take_held_scripts() {
                    self.uninstantiate_script(held)?;
                }
            }
            Some(Segment::Clones(_)) => self.clones_segment = None,
            Some(Segment::Strings(_)) => self.strings_segment = None,
            None => {}
        }
        log::debug!("freed segment {id}");
        Ok(())
    }

    pub fn is_valid(&self, id: SegmentId) -> bool {
        self.check_segment(Reg::new(id, 0)).is_ok()
    }

    /// Errors name the full address that was being resolved.
    fn check_segment(&self, addr: Reg) -> VmResult<()> {
        let id = addr.segment;
        if id.is_null() {
            return Err(VmError::InvalidAddress {
                addr,
                reason: "null segment",
            });
        }
        match self.slots.get(id.index as usize) {
            Some(slot) if slot.segment.is_some() && slot.generation == id.generation => Ok(()),
            Some(slot) if slot.segment.is_some() => Err(VmError::InvalidAddress {
                addr,
                reason: "stale segment generation",
            }),
            _ => Err(VmError::InvalidAddress {
                addr,
                reason: "segment is not allocated",
            }),
        }
    }

    pub fn segment(&self, id: SegmentId) -> VmResult<&Segment> {
        self.segment_at(Reg::new(id, 0))
    }

    pub fn segment_mut(&mut self, id: SegmentId) -> VmResult<&mut Segment> {
        self.segment_at_mut(Reg::new(id, 0))
    }

    fn segment_at(&self, addr: Reg) -> VmResult<&Segment> {
        self.check_segment(addr)?;
        self.slots[addr.segment.index as usize]
            .segment
            .as_ref()
            .ok_or(VmError::InvalidAddress {
                addr,
                reason: "segment is not allocated",
            })
    }

    fn segment_at_mut(&mut self, addr: Reg) -> VmResult<&mut Segment> {
        self.check_segment(addr)?;
        self.slots[addr.segment.index as usize]
            .segment
            .as_mut()
            .ok_or(VmError::InvalidAddress {
                addr,
                reason: "segment is not allocated",
            })
    }

    /// Live segment handles in table order.
    pub fn segment_ids(&self) -> Vec<SegmentId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.segment.is_some())
            .map(|(index, slot)| SegmentId {
                index: index as u16,
                generation: slot.generation,
            })
            .collect()
    }

    /// Handle of whatever currently occupies table slot `index`.
    pub fn segment_id_at(&self, index: u16) -> Option<SegmentId> {
        let slot = self.slots.get(index as usize)?;
        slot.segment.as_ref()?;
        Some(SegmentId {
            index,
            generation: slot.generation,
        })
    }

    pub fn segment_summaries(&self) -> Vec<SegmentSummary> {
        self.segment_ids()
            .into_iter()
            .filter_map(|id| {
                let segment = self.segment(id).ok()?;
                let description = match segment {
                    Segment::Script(script) => format!(
                        "script.{:03} ({} objects, {} locals, {} lockers)",
                        script.number(),
                        script.object_count(),
                        script.locals().len(),
                        script.lockers()
                    ),
                    Segment::Clones(table) => format!("clones ({} live)", table.live_count()),
                    Segment::Strings(heap) => format!("strings ({} live)", heap.live_count()),
                };
                Some(SegmentSummary {
                    id,
                    kind: segment.kind(),
                    description,
                })
            })
            .collect()
    }

    pub fn script(&self, id: SegmentId) -> VmResult<&ScriptSegment> {
        match self.segment(id)? {
            Segment::Script(script) => Ok(script),
            _ => Err(VmError::InvalidAddress {
                addr: Reg::new(id, 0),
                reason: "not a script segment",
            }),
        }
    }

    fn script_mut(&mut self, id: SegmentId) -> VmResult<&mut ScriptSegment> {
        match self.segment_mut(id)? {
            Segment::Script(script) => Ok(script),
            _ => Err(VmError::InvalidAddress {
                addr: Reg::new(id, 0),
                reason: "not a script segment",
            }),
        }
    }

    /// Segment of a loaded script.
    pub fn script_segment_id(&self, number: u16) -> Option<SegmentId> {
        self.script_segments.get(&number).copied()
    }

    pub fn loaded_scripts(&self) -> impl Iterator<Item = (u16, SegmentId)> + '_ {
        self.script_segments.iter().map(|(number, id)| (*number, *id))
    }

    /// Segment of script `number`, loading and/or locking it as `lock`
    /// requests. `None` when the script is not loaded and may not be.
    pub fn script_segment(&mut self, number: u16, lock: ScriptLock) -> VmResult<Option<SegmentId>> {
        if lock.loads() {
            self.instantiate_script(number)?;
        }
        let Some(id) = self.script_segment_id(number) else {
            return Ok(None);
        };
        if lock == ScriptLock::Lock && self.pin_segments {
            self.script_mut(id)?.increment_lockers();
        }
        Ok(Some(id))
    }

    pub fn resolve(&self, addr: Reg) -> VmResult<SegmentRef<'_>> {
        let invalid = |reason| VmError::InvalidAddress { addr, reason };
        match self.segment_at(addr)? {
            Segment::Script(script) => {
                if let Some(object) = script.object(addr.offset) {
                    return Ok(SegmentRef::Object(object));
                }
                let offset = addr.offset as usize;
                if offset >= script.buf().len() {
                    return Err(invalid("offset beyond the script"));
                }
                Ok(SegmentRef::Raw(script.buf().subspan(offset, None)?))
            }
            Segment::Clones(table) => table
                .get(addr.offset as usize)
                .map(SegmentRef::Object)
                .ok_or_else(|| invalid("clone slot is not in use")),
            Segment::Strings(heap) => heap
                .get(addr.offset as usize)
                .map(SegmentRef::Text)
                .ok_or_else(|| invalid("string slot is not in use")),
        }
    }

    pub fn get_object(&self, addr: Reg) -> Option<&Object> {
        match self.segment(addr.segment).ok()? {
            Segment::Script(script) => script.object(addr.offset).filter(|obj| !obj.is_freed()),
            Segment::Clones(table) => table.get(addr.offset as usize),
            Segment::Strings(_) => None,
        }
    }

    pub fn get_object_mut(&mut self, addr: Reg) -> Option<&mut Object> {
        match self.segment_mut(addr.segment).ok()? {
            Segment::Script(script) => script
                .object_mut(addr.offset)
                .filter(|obj| !obj.is_freed()),
            Segment::Clones(table) => table.get_mut(addr.offset as usize),
            Segment::Strings(_) => None,
        }
    }

    pub fn is_object(&self, addr: Reg) -> bool {
        self.get_object(addr).is_some()
    }

    /// All live objects: script objects by segment and offset, then clones.
    pub fn objects(&self) -> impl Iterator<Item = &Object> + '_ {
        self.slots
            .iter()
            .filter_map(|slot| slot.segment.as_ref())
            .flat_map(segment_objects)
    }

    /// Addresses of live objects whose name is `name`.
    pub fn find_objects_by_name(&self, name: &str) -> Vec<Reg> {
        self.objects()
            .filter(|object| self.deref_name(object).as_deref() == Some(name))
            .map(Object::pos)
            .collect()
    }

    fn deref_name(&self, object: &Object) -> Option<String> {
        let name = object.name_selector();
        if name.is_null() {
            return None;
        }
        self.deref_string(name)
    }

    /// Printable object name for diagnostics.
    pub fn object_name(&self, addr: Reg) -> String {
        let Some(object) = self.get_object(addr) else {
            return String::from("<no such object>");
        };
        if object.name_selector().is_null() {
            return String::from("<no name>");
        }
        self.deref_name(object)
            .unwrap_or_else(|| String::from("<invalid name>"))
    }

    pub fn deref_string(&self, addr: Reg) -> Option<String> {
        match self.segment_at(addr).ok()? {
            Segment::Script(script) => script.buf().read_c_string(addr.offset as usize).ok(),
            Segment::Strings(heap) => heap.get(addr.offset as usize).map(str::to_string),
            Segment::Clones(_) => None,
        }
    }

    pub fn alloc_string(&mut self, text: impl Into<String>) -> VmResult<Reg> {
        let id = self.strings_segment()?;
        match self.segment_mut(id)? {
            Segment::Strings(heap) => Ok(Reg::new(id, heap.alloc(text.into()) as u32)),
            _ => Err(VmError::InvalidAddress {
                addr: Reg::new(id, 0),
                reason: "not a string heap",
            }),
        }
    }

    pub fn free_string(&mut self, addr: Reg) -> VmResult<()> {
        let freed = match self.segment_at_mut(addr)? {
            Segment::Strings(heap) => heap.free(addr.offset as usize),
            _ => false,
        };
        if !freed {
            return Err(VmError::InvalidAddress {
                addr,
                reason: "not a live string",
            });
        }
        Ok(())
    }

    fn strings_segment(&mut self) -> VmResult<SegmentId> {
        match self.strings_segment {
            Some(id) => Ok(id),
            None => {
                let id = self.allocate(SegmentKind::Strings)?;
                self.strings_segment = Some(id);
                Ok(id)
            }
        }
    }

    fn clones_segment(&mut self) -> VmResult<SegmentId> {
        match self.clones_segment {
            Some(id) => Ok(id),
            None => {
                let id = self.allocate(SegmentKind::Clones)?;
                self.clones_segment = Some(id);
                Ok(id)
            }
        }
    }

    fn clone_table_mut(&mut self) -> VmResult<(SegmentId, &mut CloneTable)> {
        let id = self.clones_segment()?;
        match self.segment_mut(id)? {
            Segment::Clones(table) => Ok((id, table)),
            _ => Err(VmError::InvalidAddress {
                addr: Reg::new(id, 0),
                reason: "not a clone table",
            }),
        }
    }

    /// Makes a runtime copy of `parent` with one reference.
    pub fn clone_object(&mut self, parent: Reg) -> VmResult<Reg> {
        let parent_object = self.get_object(parent).ok_or(VmError::InvalidAddress {
            addr: parent,
            reason: "clone parent is not an object",
        })?;
        let parent_is_class = parent_object.is_class();
        let mut clone = parent_object.clone();
        clone.mark_as_clone();
        clone.set_species_selector(parent);
        if parent_is_class {
            clone.set_superclass_selector(parent);
        }

        let (id, table) = self.clone_table_mut()?;
        let index = table.alloc(clone);
        let addr = Reg::new(id, index as u32);
        if let Some(object) = table.get_mut(index) {
            object.set_pos(addr);
        }
        log::debug!("cloned {parent} into {addr}");
        Ok(addr)
    }

    pub fn retain(&mut self, addr: Reg) -> VmResult<()> {
        let retained = match self.segment_at_mut(addr)? {
            Segment::Clones(table) => table.retain(addr.offset as usize),
            _ => false,
        };
        if !retained {
            return Err(VmError::InvalidAddress {
                addr,
                reason: "not a live clone",
            });
        }
        Ok(())
    }

    /// Drops one reference to a clone; returns `true` when its slot was
    /// recycled.
    pub fn release(&mut self, addr: Reg) -> VmResult<bool> {
        match self.segment_at_mut(addr)? {
            Segment::Clones(table) if table.is_valid(addr.offset as usize) => {
                Ok(table.release(addr.offset as usize))
            }
            _ => Err(VmError::InvalidAddress {
                addr,
                reason: "not a live clone",
            }),
        }
    }

    /// Loads script `number` into a fresh segment, or returns the segment
    /// it already occupies.
    pub fn instantiate_script(&mut self, number: u16) -> VmResult<SegmentId> {
        if let Some(id) = self.script_segment_id(number) {
            return Ok(id);
        }
        let source = self.source.as_ref().ok_or(VmError::NoScriptSource)?;
        let resource = source.load_script(number, self.format.version)?;
        let image = scan_script(&resource, self.format.version, self.format.endian).map_err(
            |err| VmError::ScriptLoad {
                script: number,
                reason: format!("{err:#}"),
            },
        )?;

        let id = self.allocate_segment(Segment::Script(ScriptSegment::new(image)?));
        self.script_segments.insert(number, id);
        log::info!("instantiating script {number} in segment {id}");

        match self.populate_script(id) {
            Ok(()) => Ok(id),
            Err(err) => {
                log::error!("script {number} failed to instantiate: {err}");
                if self.is_valid(id) {
                    self.free(id)?;
                }
                Err(err)
            }
        }
    }

    fn populate_script(&mut self, id: SegmentId) -> VmResult<()> {
        let format = self.format;
        let (number, records, buf) = {
            let script = self.script(id)?;
            (
                script.number(),
                script.image().objects.clone(),
                script.buf().clone(),
            )
        };

        for record in records.iter().filter(|record| record.is_class) {
            let entry = self.class_entry_mut(record.species);
            entry.script = Some(number);
            entry.reg = Reg::new(id, record.offset as u32);
        }

        for record in &records {
            let addr = Reg::new(id, record.offset as u32);
            let object = Object::init(&format, &buf, addr, true)?;
            self.script_mut(id)?.insert_object(object);
        }

        // Each pass works on a copy: resolving a class can load another
        // script whose objects need this one's originals in place.
        let sci3 = format.version.layout() == LayoutKind::Sci3;
        for record in &records {
            let addr = Reg::new(id, record.offset as u32);
            let mut object = self.script_object(addr)?;
            object.init_species(self, addr)?;
            if sci3 {
                object.init_super_class(self, addr)?;
            }
            self.script_mut(id)?.insert_object(object);
        }

        for record in &records {
            let addr = Reg::new(id, record.offset as u32);
            let mut object = self.script_object(addr)?;
            if !object.init_base_object(self, addr, !sci3)? {
                return Err(VmError::MissingBaseObject {
                    object: addr,
                    name: self.unrelocated_name(addr),
                    script: number,
                });
            }
            self.script_mut(id)?.insert_object(object);
        }

        self.script_mut(id)?.relocate(id)
    }

    /// Remembers that the script at `caller` pinned `script`, so unloading
    /// the caller unpins it again.
    fn record_hold(&mut self, caller: Reg, script: u16) {
        if let Ok(caller_script) = self.script_mut(caller.segment) {
            caller_script.hold(script);
        }
    }

    fn script_object(&self, addr: Reg) -> VmResult<Object> {
        self.script(addr.segment)?
            .object(addr.offset)
            .cloned()
            .ok_or(VmError::InvalidAddress {
                addr,
                reason: "object vanished during instantiation",
            })
    }

    /// Name of a script object whose name slot may still hold the raw
    /// offset it had before relocation.
    fn unrelocated_name(&self, addr: Reg) -> String {
        let Some(object) = self.get_object(addr) else {
            return String::from("<no such object>");
        };
        let mut name = object.name_selector();
        if name.is_null() {
            return String::from("<no name>");
        }
        if name.segment.is_null() {
            name.set_segment(addr.segment);
            if self.format.version.relocates_past_script() {
                if let Ok(script) = self.script(addr.segment) {
                    name.inc_offset(script.script_size() as i64);
                }
            }
        }
        self.deref_string(name)
            .unwrap_or_else(|| String::from("<invalid name>"))
    }

    /// Drops one locker of script `number`, freeing its segment at zero.
    pub fn uninstantiate_script(&mut self, number: u16) -> VmResult<()> {
        let Some(id) = self.script_segment_id(number) else {
            log::debug!("script {number} is not loaded");
            return Ok(());
        };
        let remaining = self.script_mut(id)?.decrement_lockers();
        if remaining == 0 {
            log::info!("unloading script {number} from segment {id}");
            self.free(id)?;
        }
        Ok(())
    }
}

fn segment_objects(segment: &Segment) -> Box<dyn Iterator<Item = &Object> + '_> {
    match segment {
        Segment::Script(script) => Box::new(script.objects()),
        Segment::Clones(table) => Box::new(table.iter().map(|(_, object)| object)),
        Segment::Strings(_) => Box::new(std::iter::empty()),
    }
}

impl ObjectLookup for SegManager {
    fn object(&self, addr: Reg) -> Option<&Object> {
        self.get_object(addr)
    }
}

impl ClassResolver for SegManager {
    fn class_address(&mut self, species: u16, lock: ScriptLock, caller: Reg) -> VmResult<Reg> {
        let entry = self.classes.get(species as usize).copied().unwrap_or_default();
        let Some(script) = entry.script else {
            log::error!(
                "attempt to dereference class {species:#x}, which doesn't exist (max {:#x})",
                self.classes.len()
            );
            return Err(VmError::MissingClass { species, caller });
        };

        let pins = lock == ScriptLock::Lock && self.pin_segments;
        if entry.reg.segment.is_null() {
            self.script_segment(script, lock)?;
            let reg = self.classes[species as usize].reg;
            if reg.segment.is_null() {
                if lock == ScriptLock::DontLoad {
                    return Ok(Reg::NULL);
                }
                return Err(VmError::MissingClass { species, caller });
            }
            if pins {
                self.record_hold(caller, script);
            }
            return Ok(reg);
        }

        if caller.segment != entry.reg.segment && pins {
            self.script_mut(entry.reg.segment)?.increment_lockers();
            self.record_hold(caller, script);
        }
        Ok(entry.reg)
    }

    fn script_number(&self, segment: SegmentId) -> Option<u16> {
        self.script(segment).ok().map(ScriptSegment::number)
    }

    fn deref_string(&self, addr: Reg) -> Option<String> {
        SegManager::deref_string(self, addr)
    }
}

#[cfg(test)]
mod tests {
    use sci_formats::OBJECT_MAGIC;

    use super::*;

    fn push_words(out: &mut Vec<u8>, words: &[u16]) {
        for word in words {
            out.extend_from_slice(&word.to_le_bytes());
        }
    }

    /// One named class and no relocation block, so the name slot keeps its
    /// raw script offset after loading.
    fn unrelocated_class(name: &str) -> (ScriptResource, u32) {
        let mut strings = name.as_bytes().to_vec();
        strings.push(0);
        if strings.len() % 2 == 1 {
            strings.push(0);
        }
        let mut data = Vec::new();
        push_words(&mut data, &[5, 4 + strings.len() as u16]);
        data.extend_from_slice(&strings);

        let class = data.len();
        let words = [
            OBJECT_MAGIC, 0, 18, 4, 0, 0xffff, 0x8000, 4, 0, 1, 2, 3, 0, 0, 0,
        ];
        push_words(&mut data, &[6, 4 + words.len() as u16 * 2]);
        push_words(&mut data, &words);
        push_words(&mut data, &[0]);
        (
            ScriptResource::new(1, ByteSpan::new(data)),
            (class + 12) as u32,
        )
    }

    #[test]
    fn names_read_before_relocation_are_rebased_onto_the_script() {
        let (resource, body) = unrelocated_class("Door");
        let selectors = SelectorTable::from_names(["species", "superClass", "-info-", "name"]);
        let mut heap = SegManager::new(&VmConfig::default(), Arc::new(selectors))
            .with_source(Box::new(BTreeMap::from([(1, resource)])));
        let id = heap.instantiate_script(1).unwrap();
        let door = Reg::new(id, body);

        assert_eq!(heap.get_object(door).unwrap().name_selector(), Reg::number(4));
        assert_eq!(heap.object_name(door), "<invalid name>");
        assert_eq!(heap.unrelocated_name(door), "Door");
        assert_eq!(heap.unrelocated_name(Reg::new(id, 2)), "<no such object>");
    }
}
