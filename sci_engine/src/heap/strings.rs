/// Strings allocated at runtime, addressed by slot index.
#[derive(Debug, Default)]
pub struct StringHeap {
    entries: Vec<Option<String>>,
    free: Vec<usize>,
}

impl StringHeap {
    pub fn alloc(&mut self, text: String) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.entries[index] = Some(text);
                index
            }
            None => {
                self.entries.push(Some(text));
                self.entries.len() - 1
            }
        }
    }

    pub(crate) fn insert_at(&mut self, index: usize, text: String) {
        if self.entries.len() <= index {
            for slot in self.entries.len()..index {
                self.free.push(slot);
            }
            self.entries.resize(index + 1, None);
        }
        self.free.retain(|&slot| slot != index);
        self.entries[index] = Some(text);
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).and_then(|entry| entry.as_deref())
    }

    pub fn set(&mut self, index: usize, text: String) -> bool {
        match self.entries.get_mut(index) {
            Some(entry @ Some(_)) => {
                *entry = Some(text);
                true
            }
            _ => false,
        }
    }

    pub fn free(&mut self, index: usize) -> bool {
        match self.entries.get_mut(index) {
            Some(entry) if entry.is_some() => {
                *entry = None;
                self.free.push(index);
                true
            }
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.as_deref().map(|text| (index, text)))
    }

    pub fn live_count(&self) -> usize {
        self.iter().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freed_slots_are_reused() {
        let mut heap = StringHeap::default();
        let first = heap.alloc(String::from("a"));
        let second = heap.alloc(String::from("b"));
        assert!(heap.free(first));
        assert!(!heap.free(first));
        assert_eq!(heap.get(first), None);
        assert_eq!(heap.alloc(String::from("c")), first);
        assert_eq!(heap.get(second), Some("b"));
        assert_eq!(heap.live_count(), 2);
    }

    #[test]
    fn insert_at_pads_with_free_slots() {
        let mut heap = StringHeap::default();
        heap.insert_at(2, String::from("x"));
        assert_eq!(heap.get(2), Some("x"));
        assert_eq!(heap.alloc(String::from("y")), 1);
        assert!(heap.set(2, String::from("z")));
        assert!(!heap.set(0, String::from("nope")));
    }
}
