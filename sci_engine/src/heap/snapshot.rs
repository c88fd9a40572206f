//! Heap snapshots for save and restore.
//!
//! Segment ids are not stable across sessions, so pointers are recorded by
//! what they point into (a script number, a clone slot, a string slot) and
//! remapped onto the freshly allocated segments when restoring.

use sci_formats::SciVersion;
use serde::{Deserialize, Serialize};

use super::{Segment, SegManager};
use crate::error::{VmError, VmResult};
use crate::reg::{Reg, SegmentId};

/// A `Reg` with its segment replaced by a stable description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SavedReg {
    Number { value: u32 },
    Script { script: u16, offset: u32 },
    Clone { index: u32 },
    String { index: u32 },
    /// The segment was already gone when the snapshot was taken.
    Unresolved { segment: u16, offset: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    pub offset: u32,
    pub variables: Vec<SavedReg>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSnapshot {
    pub number: u16,
    pub lockers: u32,
    pub locals: Vec<SavedReg>,
    pub objects: Vec<ObjectSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneSnapshot {
    pub index: u32,
    pub refs: u32,
    /// Script object the clone's layout was copied from.
    pub origin: SavedReg,
    pub species: SavedReg,
    pub superclass: SavedReg,
    pub info: u16,
    pub variables: Vec<SavedReg>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringSnapshot {
    pub index: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapSnapshot {
    pub version: SciVersion,
    pub scripts: Vec<ScriptSnapshot>,
    pub clones: Vec<CloneSnapshot>,
    pub strings: Vec<StringSnapshot>,
}

impl SegManager {
    fn save_reg(&self, reg: Reg) -> SavedReg {
        if reg.segment.is_null() {
            return SavedReg::Number { value: reg.offset };
        }
        match self.segment(reg.segment) {
            Ok(Segment::Script(script)) => SavedReg::Script {
                script: script.number(),
                offset: reg.offset,
            },
            Ok(Segment::Clones(_)) => SavedReg::Clone { index: reg.offset },
            Ok(Segment::Strings(_)) => SavedReg::String { index: reg.offset },
            Err(_) => SavedReg::Unresolved {
                segment: reg.segment.index,
                offset: reg.offset,
            },
        }
    }

    fn load_reg(&self, saved: SavedReg) -> Reg {
        let mapped = match saved {
            SavedReg::Number { value } => return Reg::new(SegmentId::NULL, value),
            SavedReg::Script { script, offset } => {
                self.script_segment_id(script).map(|id| Reg::new(id, offset))
            }
            SavedReg::Clone { index } => self.clones_segment.map(|id| Reg::new(id, index)),
            SavedReg::String { index } => self.strings_segment.map(|id| Reg::new(id, index)),
            SavedReg::Unresolved { .. } => None,
        };
        mapped.unwrap_or_else(|| {
            log::warn!("dropping unresolvable pointer {saved:?} while restoring");
            Reg::NULL
        })
    }

    /// The script object a clone ultimately derives from.
    fn clone_origin(&self, clone: Reg) -> Reg {
        let mut current = clone;
        // Clone chains are short; the bound only guards against cycles.
        for _ in 0..64 {
            match self.segment(current.segment) {
                Ok(Segment::Clones(table)) => match table.get(current.offset as usize) {
                    Some(object) => current = object.species_selector(),
                    None => break,
                },
                _ => return current,
            }
        }
        Reg::NULL
    }

    pub fn snapshot(&self) -> HeapSnapshot {
        let mut scripts = Vec::new();
        for (number, id) in self.loaded_scripts() {
            let Ok(script) = self.script(id) else {
                continue;
            };
            scripts.push(ScriptSnapshot {
                number,
                lockers: script.lockers(),
                locals: script.locals().iter().map(|reg| self.save_reg(*reg)).collect(),
                objects: script
                    .objects()
                    .map(|object| ObjectSnapshot {
                        offset: object.pos().offset,
                        variables: object
                            .variables()
                            .iter()
                            .map(|reg| self.save_reg(*reg))
                            .collect(),
                    })
                    .collect(),
            });
        }

        let mut clones = Vec::new();
        if let Some(Ok(Segment::Clones(table))) = self.clones_segment.map(|id| self.segment(id)) {
            for (index, object) in table.iter() {
                clones.push(CloneSnapshot {
                    index: index as u32,
                    refs: table.refs(index).unwrap_or(1),
                    origin: self.save_reg(self.clone_origin(object.pos())),
                    species: self.save_reg(object.species_selector()),
                    superclass: self.save_reg(object.superclass_selector()),
                    info: object.info_selector().to_u16(),
                    variables: object
                        .variables()
                        .iter()
                        .map(|reg| self.save_reg(*reg))
                        .collect(),
                });
            }
        }

        let mut strings = Vec::new();
        if let Some(Ok(Segment::Strings(heap))) = self.strings_segment.map(|id| self.segment(id)) {
            for (index, text) in heap.iter() {
                strings.push(StringSnapshot {
                    index: index as u32,
                    text: text.to_string(),
                });
            }
        }

        HeapSnapshot {
            version: self.format.version,
            scripts,
            clones,
            strings,
        }
    }

    /// Replaces the whole heap with `snapshot`: scripts are instantiated
    /// into new segments and every saved pointer is remapped onto them.
    pub fn restore(&mut self, snapshot: &HeapSnapshot) -> VmResult<()> {
        if snapshot.version != self.format.version {
            return Err(VmError::ScriptLoad {
                script: 0,
                reason: format!(
                    "snapshot was taken with {} but the heap runs {}",
                    snapshot.version, self.format.version
                ),
            });
        }

        for id in self.segment_ids() {
            if self.is_valid(id) {
                self.free(id)?;
            }
        }
        debug_assert!(self.script_segments.is_empty());

        for script in &snapshot.scripts {
            self.instantiate_script(script.number)?;
        }

        if !snapshot.clones.is_empty() {
            let id = self.clones_segment()?;
            for saved in &snapshot.clones {
                let origin = self.load_reg(saved.origin);
                let mut object = self
                    .get_object(origin)
                    .cloned()
                    .ok_or(VmError::InvalidAddress {
                        addr: origin,
                        reason: "clone origin is not an object",
                    })?;
                object.set_pos(Reg::new(id, saved.index));
                if let Ok(Segment::Clones(table)) = self.segment_mut(id) {
                    table.insert_at(saved.index as usize, object, saved.refs);
                }
            }
        }

        if !snapshot.strings.is_empty() {
            let id = self.strings_segment()?;
            if let Ok(Segment::Strings(heap)) = self.segment_mut(id) {
                for saved in &snapshot.strings {
                    heap.insert_at(saved.index as usize, saved.text.clone());
                }
            }
        }

        for saved in &snapshot.scripts {
            let id = self.script_segment_id(saved.number).ok_or(VmError::ScriptLoad {
                script: saved.number,
                reason: String::from("vanished while restoring"),
            })?;
            let locals: Vec<Reg> = saved.locals.iter().map(|reg| self.load_reg(*reg)).collect();
            let objects: Vec<(u32, Vec<Reg>)> = saved
                .objects
                .iter()
                .map(|object| {
                    let values = object.variables.iter().map(|reg| self.load_reg(*reg)).collect();
                    (object.offset, values)
                })
                .collect();

            let script = self.script_mut(id)?;
            for (slot, value) in script.locals_mut().iter_mut().zip(locals) {
                *slot = value;
            }
            for (offset, values) in objects {
                let Some(object) = script.object_mut(offset) else {
                    log::warn!("script {} has no object at {offset:#x} to restore", saved.number);
                    continue;
                };
                for (index, value) in values.into_iter().enumerate() {
                    object.set_variable(index, value);
                }
            }
            while script.lockers() < saved.lockers {
                script.increment_lockers();
            }
        }

        for saved in &snapshot.clones {
            let addr = match self.clones_segment {
                Some(id) => Reg::new(id, saved.index),
                None => continue,
            };
            let values: Vec<Reg> = saved.variables.iter().map(|reg| self.load_reg(*reg)).collect();
            let species = self.load_reg(saved.species);
            let superclass = self.load_reg(saved.superclass);
            let Some(object) = self.get_object_mut(addr) else {
                continue;
            };
            for (index, value) in values.into_iter().enumerate() {
                object.set_variable(index, value);
            }
            object.set_species_selector(species);
            object.set_superclass_selector(superclass);
            object.set_info_selector(Reg::number(saved.info));
        }

        log::info!(
            "restored {} scripts, {} clones, {} strings",
            snapshot.scripts.len(),
            snapshot.clones.len(),
            snapshot.strings.len()
        );
        Ok(())
    }
}
