//! Generation-checked slots for open connections.

/// An opaque reference to an open RFCOMM connection.
///
/// A handle stays valid until the connection is closed. After that every operation given the handle fails with
/// [`InvalidHandle`][crate::error::ErrorKind::InvalidHandle], even if the slot has been reused by a newer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionHandle {
    index: u32,
    generation: u32,
}

impl ConnectionHandle {
    /// Packs the handle into a single integer.
    pub fn into_raw(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    /// Unpacks a handle created by [`into_raw`][Self::into_raw].
    ///
    /// Any value is accepted; values that never named a connection are rejected when used. `0` never names a
    /// connection.
    pub fn from_raw(raw: u64) -> Self {
        ConnectionHandle {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

impl std::fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    // Odd while occupied, even while vacant. Starts at 0 so no live handle has generation 0.
    generation: u32,
    value: Option<T>,
}

#[derive(Debug)]
pub(crate) struct Registry<T> {
    slots: Vec<Slot<T>>,
    vacant: Vec<u32>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Registry {
            slots: Vec::new(),
            vacant: Vec::new(),
        }
    }

    pub fn insert(&mut self, value: T) -> ConnectionHandle {
        let index = match self.vacant.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        slot.value = Some(value);
        ConnectionHandle {
            index,
            generation: slot.generation,
        }
    }

    pub fn get(&self, handle: ConnectionHandle) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn remove(&mut self, handle: ConnectionHandle) -> Option<T> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.vacant.push(handle.index);
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.vacant.len()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|slot| slot.value.as_ref())
    }
}
