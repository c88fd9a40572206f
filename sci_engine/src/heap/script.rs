use std::collections::BTreeMap;

use sci_formats::{ByteSpan, Relocations, ScriptImage};

use crate::error::{VmError, VmResult};
use crate::object::{relocate_block, Object, ObjectState};
use crate::reg::{Reg, SegmentId};

/// A loaded script: its image, the objects parsed from it and its local
/// variables.
#[derive(Debug)]
pub struct ScriptSegment {
    image: ScriptImage,
    objects: BTreeMap<u32, Object>,
    locals: Vec<Reg>,
    lockers: u32,
    /// Scripts whose lockers this script raised while resolving classes.
    held_scripts: Vec<u16>,
}

impl ScriptSegment {
    pub(crate) fn new(image: ScriptImage) -> VmResult<Self> {
        let mut locals = Vec::new();
        if let Some(block) = image.locals {
            locals.reserve(block.count);
            for index in 0..block.count {
                let value = image.buf.read_u16(block.offset + index * 2, image.endian)?;
                locals.push(Reg::number(value));
            }
        }
        Ok(ScriptSegment {
            image,
            objects: BTreeMap::new(),
            locals,
            lockers: 1,
            held_scripts: Vec::new(),
        })
    }

    pub fn number(&self) -> u16 {
        self.image.number
    }

    pub fn image(&self) -> &ScriptImage {
        &self.image
    }

    pub fn buf(&self) -> &ByteSpan {
        &self.image.buf
    }

    pub fn script_size(&self) -> usize {
        self.image.script_size
    }

    pub fn lockers(&self) -> u32 {
        self.lockers
    }

    pub(crate) fn increment_lockers(&mut self) {
        self.lockers += 1;
    }

    pub(crate) fn decrement_lockers(&mut self) -> u32 {
        self.lockers = self.lockers.saturating_sub(1);
        self.lockers
    }

    pub(crate) fn hold(&mut self, script: u16) {
        self.held_scripts.push(script);
    }

    pub(crate) fn take_held_scripts(&mut self) -> Vec<u16> {
        std::mem::take(&mut self.held_scripts)
    }

    pub fn locals(&self) -> &[Reg] {
        &self.locals
    }

    pub fn locals_mut(&mut self) -> &mut [Reg] {
        &mut self.locals
    }

    pub fn locals_offset(&self) -> Option<usize> {
        self.image.locals.map(|block| block.offset)
    }

    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.values()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn object(&self, offset: u32) -> Option<&Object> {
        self.objects.get(&offset)
    }

    pub fn object_mut(&mut self, offset: u32) -> Option<&mut Object> {
        self.objects.get_mut(&offset)
    }

    pub(crate) fn insert_object(&mut self, object: Object) {
        self.objects.insert(object.pos().offset, object);
    }

    pub(crate) fn invalidate_objects(&mut self) {
        for object in self.objects.values_mut() {
            object.mark_as_freed();
        }
    }

    /// Applies the image's relocation table now that the segment is known.
    pub(crate) fn relocate(&mut self, segment: SegmentId) -> VmResult<()> {
        for object in self.objects.values_mut() {
            object.set_state(ObjectState::Relocating);
        }
        let relocations = self.image.relocations.clone();
        let result = match &relocations {
            Relocations::Slots(slots) => self.relocate_slots(segment, slots),
            Relocations::Sci3(entries) => {
                for entry in entries {
                    let done = self
                        .objects
                        .values_mut()
                        .any(|object| object.relocate_sci3(segment, entry.location, entry.addend));
                    if !done {
                        log::debug!(
                            "script {}: no property at relocation {:#x}",
                            self.image.number,
                            entry.location
                        );
                    }
                }
                Ok(())
            }
        };
        for object in self.objects.values_mut() {
            object.set_state(ObjectState::Initialized);
        }
        result
    }

    fn relocate_slots(&mut self, segment: SegmentId, slots: &[usize]) -> VmResult<()> {
        let script_size = self.image.script_size;
        let version = self.image.version;
        let owner = Reg::new(segment, 0);
        for (position, &location) in slots.iter().enumerate() {
            let location = location as u32;
            if let Some(locals_offset) = self.locals_offset() {
                let block_location = locals_offset as u32;
                if relocate_block(
                    &mut self.locals,
                    block_location,
                    segment,
                    location,
                    script_size,
                    version,
                    owner,
                )? {
                    continue;
                }
            }

            let mut done = false;
            for object in self.objects.values_mut() {
                if object.relocate(segment, location, script_size)? {
                    done = true;
                    break;
                }
            }
            if done {
                continue;
            }
            if version < sci_formats::SciVersion::Sci11 {
                log::error!(
                    "script {}: relocation failed for index {:04x} ({}/{})",
                    self.image.number,
                    location,
                    position + 1,
                    slots.len()
                );
                return Err(VmError::InvalidAddress {
                    addr: Reg::new(segment, location),
                    reason: "relocation target is not a local or object variable",
                });
            }
            log::debug!(
                "script {}: relocation {:04x} outside locals and objects",
                self.image.number,
                location
            );
        }
        Ok(())
    }
}
