//! Generation-checked slot table.
//!
//! Commands and device sessions are addressed by `(index, generation)` keys.
//! Removing an entry bumps the slot's generation, so a key kept across a
//! delete or close no longer resolves, even after the slot is reused.

/// Key into a [`SlotTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    index: u32,
    generation: u32,
}

impl SlotKey {
    /// Slot index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation the key was issued for.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Arena of values addressed by generation-checked keys.
#[derive(Debug)]
pub struct SlotTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for SlotTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SlotTable<T> {
    /// Create an empty table.
    pub fn new() -> Self {
        SlotTable {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the table has no live entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store a value and return its key. Free slots are reused first.
    pub fn insert(&mut self, value: T) -> SlotKey {
        self.len += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return SlotKey {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        SlotKey {
            index,
            generation: 0,
        }
    }

    /// Whether `key` refers to a live entry.
    pub fn contains(&self, key: SlotKey) -> bool {
        self.get(key).is_some()
    }

    /// Get the value for a live key.
    pub fn get(&self, key: SlotKey) -> Option<&T> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Get the value for a live key, mutably.
    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut T> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Remove a live entry and hand it back. The key is invalid afterwards.
    pub fn remove(&mut self, key: SlotKey) -> Option<T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.len -= 1;
        Some(value)
    }

    /// Iterate live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotKey, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    SlotKey {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    /// Iterate live entries in slot order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SlotKey, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value.as_mut().map(|value| {
                (
                    SlotKey {
                        index: index as u32,
                        generation,
                    },
                    value,
                )
            })
        })
    }

    /// Keys of all live entries.
    pub fn keys(&self) -> Vec<SlotKey> {
        self.iter().map(|(key, _)| key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get() {
        let mut table = SlotTable::new();
        let a = table.insert("a");
        let b = table.insert("b");
        assert_eq!(table.get(a), Some(&"a"));
        assert_eq!(table.get(b), Some(&"b"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_stale_key_after_remove() {
        let mut table = SlotTable::new();
        let a = table.insert(1);
        assert_eq!(table.remove(a), Some(1));
        assert!(table.get(a).is_none());
        assert!(table.remove(a).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_reused_slot_rejects_old_key() {
        let mut table = SlotTable::new();
        let old = table.insert(1);
        table.remove(old);
        let new = table.insert(2);

        assert_eq!(old.index(), new.index());
        assert_ne!(old.generation(), new.generation());
        assert!(table.get(old).is_none());
        assert_eq!(table.get(new), Some(&2));
    }

    #[test]
    fn test_iter_skips_free_slots() {
        let mut table = SlotTable::new();
        let a = table.insert('a');
        let b = table.insert('b');
        let c = table.insert('c');
        table.remove(b);

        let keys = table.keys();
        assert_eq!(keys, vec![a, c]);
        let values: Vec<char> = table.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec!['a', 'c']);
    }
}
