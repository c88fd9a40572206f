use crate::object::Object;

#[derive(Debug)]
struct CloneEntry {
    object: Object,
    refs: u32,
}

/// Runtime copies of script objects, addressed by slot index. Slots whose
/// reference count drops to zero are cleared and handed out again.
#[derive(Debug, Default)]
pub struct CloneTable {
    entries: Vec<CloneEntry>,
    free: Vec<usize>,
}

impl CloneTable {
    /// Stores `object` with one reference and returns its slot. The caller
    /// fixes up the object's position afterwards.
    pub fn alloc(&mut self, object: Object) -> usize {
        let entry = CloneEntry { object, refs: 1 };
        match self.free.pop() {
            Some(index) => {
                self.entries[index] = entry;
                index
            }
            None => {
                self.entries.push(entry);
                self.entries.len() - 1
            }
        }
    }

    /// Places `object` at a specific slot, growing the table with freed
    /// placeholders as needed. Used when restoring snapshots.
    pub(crate) fn insert_at(&mut self, index: usize, object: Object, refs: u32) {
        while self.entries.len() < index {
            let mut filler = object.clone();
            filler.clear_variables();
            filler.mark_as_freed();
            self.free.push(self.entries.len());
            self.entries.push(CloneEntry {
                object: filler,
                refs: 0,
            });
        }
        self.free.retain(|&slot| slot != index);
        let entry = CloneEntry { object, refs };
        if index < self.entries.len() {
            self.entries[index] = entry;
        } else {
            self.entries.push(entry);
        }
    }

    pub fn is_valid(&self, index: usize) -> bool {
        self.entries
            .get(index)
            .is_some_and(|entry| !entry.object.is_freed())
    }

    pub fn get(&self, index: usize) -> Option<&Object> {
        self.entries
            .get(index)
            .filter(|entry| !entry.object.is_freed())
            .map(|entry| &entry.object)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Object> {
        self.entries
            .get_mut(index)
            .filter(|entry| !entry.object.is_freed())
            .map(|entry| &mut entry.object)
    }

    pub fn refs(&self, index: usize) -> Option<u32> {
        self.entries
            .get(index)
            .filter(|entry| !entry.object.is_freed())
            .map(|entry| entry.refs)
    }

    pub fn retain(&mut self, index: usize) -> bool {
        match self.entries.get_mut(index) {
            Some(entry) if !entry.object.is_freed() => {
                entry.refs += 1;
                true
            }
            _ => false,
        }
    }

    /// Drops one reference. Returns `true` when the slot was freed.
    pub fn release(&mut self, index: usize) -> bool {
        let Some(entry) = self.entries.get_mut(index) else {
            return false;
        };
        if entry.object.is_freed() {
            return false;
        }
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs > 0 {
            return false;
        }
        entry.object.clear_variables();
        entry.object.mark_as_freed();
        self.free.push(index);
        true
    }

    /// Live clones with their slot index.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Object)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.object.is_freed())
            .map(|(index, entry)| (index, &entry.object))
    }

    pub fn live_count(&self) -> usize {
        self.iter().count()
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }
}
