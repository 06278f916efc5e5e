//! Slot storage for the containers of one tree.
//!
//! Containers reference each other (child values, parent links) through
//! [`BagId`] handles instead of pointers. A handle carries the generation of
//! its slot; once the slot is freed and reused the old handle stops resolving.

use std::fmt;

/// Handle to a container inside a [`Bag`](super::Bag) tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BagId {
    index: u32,
    generation: u32,
}

impl BagId {
    /// Slot index of this handle
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of this handle
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for BagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    item: Option<T>,
}

/// Generational slot arena.
#[derive(Debug)]
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Arena<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Stores `item`, reusing a freed slot when one is available.
    pub(crate) fn insert(&mut self, item: T) -> BagId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.item = Some(item);
            BagId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                item: Some(item),
            });
            BagId {
                index,
                generation: 0,
            }
        }
    }

    pub(crate) fn get(&self, id: BagId) -> Option<&T> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.item.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: BagId) -> Option<&mut T> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.item.as_mut())
    }

    /// Removes the item, freeing its slot for reuse.
    pub(crate) fn remove(&mut self, id: BagId) -> Option<T> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let item = slot.item.take()?;
        self.free.push(id.index);
        Some(item)
    }

    pub(crate) fn contains(&self, id: BagId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live items
    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}
