//! Generational slot storage used for bodies, shapes, constraints and
//! arbiters.

/// Position of an element in an [`Arena`] together with the generation
/// of the slot at insertion time. A slot's generation is bumped every
/// time its element is removed, so an `Index` kept past removal no
/// longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Index {
    slot: u32,
    generation: u32,
}

impl Index {
    pub fn slot(self) -> usize {
        self.slot as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Clone, Debug)]
enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

/// A `Vec` that keeps a free list of vacant slots and reuses them for
/// new elements.
#[derive(Clone, Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Number of live elements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `value`, reusing a vacant slot when one exists.
    pub fn insert(&mut self, value: T) -> Index {
        self.len += 1;
        match self.free_list.pop() {
            Some(slot) => {
                let entry = &mut self.slots[slot as usize];
                let generation = match *entry {
                    Slot::Vacant { generation } => generation,
                    Slot::Occupied { generation, .. } => generation,
                };
                *entry = Slot::Occupied { generation, value };
                Index { slot, generation }
            }
            None => {
                let slot = self.slots.len() as u32;
                self.slots.push(Slot::Occupied {
                    generation: 0,
                    value,
                });
                Index {
                    slot,
                    generation: 0,
                }
            }
        }
    }

    /// Removes and returns the element at `index`, or `None` if the index
    /// is stale.
    pub fn remove(&mut self, index: Index) -> Option<T> {
        let entry = self.slots.get_mut(index.slot())?;
        let generation = match entry {
            Slot::Occupied { generation, .. } => *generation,
            Slot::Vacant { .. } => return None,
        };
        if generation != index.generation {
            return None;
        }
        let next = Slot::Vacant {
            generation: generation.wrapping_add(1),
        };
        match std::mem::replace(entry, next) {
            Slot::Occupied { value, .. } => {
                self.free_list.push(index.slot);
                self.len -= 1;
                Some(value)
            }
            Slot::Vacant { .. } => None,
        }
    }

    pub fn contains(&self, index: Index) -> bool {
        self.get(index).is_some()
    }

    pub fn get(&self, index: Index) -> Option<&T> {
        match self.slots.get(index.slot())? {
            Slot::Occupied { generation, value } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, index: Index) -> Option<&mut T> {
        match self.slots.get_mut(index.slot())? {
            Slot::Occupied { generation, value } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// Mutable access to two distinct elements at once. Returns `None`
    /// if either index is stale or both name the same slot.
    pub fn get2_mut(&mut self, a: Index, b: Index) -> Option<(&mut T, &mut T)> {
        if a.slot == b.slot {
            return None;
        }
        let (low, high, swapped) = if a.slot < b.slot {
            (a, b, false)
        } else {
            (b, a, true)
        };
        let (head, tail) = self.slots.split_at_mut(high.slot());
        let first = match &mut head[low.slot()] {
            Slot::Occupied { generation, value } if *generation == low.generation => value,
            _ => return None,
        };
        let second = match &mut tail[0] {
            Slot::Occupied { generation, value } if *generation == high.generation => value,
            _ => return None,
        };
        if swapped {
            Some((second, first))
        } else {
            Some((first, second))
        }
    }

    /// Iterates over live elements with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (Index, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| match entry {
                Slot::Occupied { generation, value } => Some((
                    Index {
                        slot: slot as u32,
                        generation: *generation,
                    },
                    value,
                )),
                Slot::Vacant { .. } => None,
            })
    }
}

impl<T> std::ops::Index<Index> for Arena<T> {
    type Output = T;

    /// # Panics
    /// If the index is stale.
    fn index(&self, index: Index) -> &T {
        match self.get(index) {
            Some(value) => value,
            None => panic!("stale arena index {index:?}"),
        }
    }
}

impl<T> std::ops::IndexMut<Index> for Arena<T> {
    fn index_mut(&mut self, index: Index) -> &mut T {
        match self.get_mut(index) {
            Some(value) => value,
            None => panic!("stale arena index {index:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_reuses_slots_with_new_generation() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.len(), 2);

        assert_eq!(arena.remove(a), Some("a"));
        assert_eq!(arena.remove(a), None);
        assert!(!arena.contains(a));

        let c = arena.insert("c");
        assert_eq!(c.slot(), a.slot());
        assert_ne!(c.generation(), a.generation());
        assert_eq!(arena.get(a), None);
        assert_eq!(arena[c], "c");
        assert_eq!(arena[b], "b");
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_arena_get2_mut() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);

        {
            let (x, y) = arena.get2_mut(b, a).unwrap();
            assert_eq!((*x, *y), (2, 1));
            *x += 10;
            *y += 20;
        }
        assert_eq!(arena[a], 21);
        assert_eq!(arena[b], 12);
        assert!(arena.get2_mut(a, a).is_none());
    }

    #[test]
    fn test_arena_iter_skips_vacant() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        arena.insert(2);
        arena.insert(3);
        arena.remove(a);
        let values: Vec<i32> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![2, 3]);
    }
}
