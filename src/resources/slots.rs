// Fixed-capacity, bounds-checked slot storage
//
// Capacity is set once at construction. Every access validates the index.

use crate::error::{ErrorKind, RenderError, RenderResult};

#[derive(Debug)]
pub struct FixedSlots<T> {
    slots: Box<[T]>,
}

impl<T> FixedSlots<T> {
    /// Build `capacity` slots, each produced by `init(index)`
    pub fn from_fn(capacity: usize, init: impl FnMut(usize) -> T) -> Self {
        Self {
            slots: (0..capacity).map(init).collect(),
        }
    }

    pub fn from_vec(values: Vec<T>) -> Self {
        Self {
            slots: values.into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Recoverable error if `index` is outside the fixed capacity
    pub fn check(&self, index: usize) -> RenderResult<()> {
        if index < self.slots.len() {
            Ok(())
        } else {
            Err(RenderError::warning(ErrorKind::SlotOutOfRange {
                index,
                capacity: self.slots.len(),
            }))
        }
    }

    pub fn get(&self, index: usize) -> RenderResult<&T> {
        self.check(index)?;
        Ok(&self.slots[index])
    }

    pub fn get_mut(&mut self, index: usize) -> RenderResult<&mut T> {
        self.check(index)?;
        Ok(&mut self.slots[index])
    }

    /// Store `value` at `index` and hand back what was there
    pub fn replace(&mut self, index: usize, value: T) -> RenderResult<T> {
        Ok(std::mem::replace(self.get_mut(index)?, value))
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.slots.into_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_fixed() {
        let slots = FixedSlots::from_fn(3, |i| i * 10);
        assert_eq!(slots.capacity(), 3);
        assert_eq!(*slots.get(2).unwrap(), 20);
    }

    #[test]
    fn test_out_of_range_access_is_rejected() {
        let mut slots: FixedSlots<Option<u32>> = FixedSlots::from_fn(2, |_| None);

        let err = slots.get(2).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::SlotOutOfRange { index: 2, capacity: 2 }));
        assert!(slots.replace(5, Some(1)).is_err());
        assert!(slots.iter().all(Option::is_none));
    }

    #[test]
    fn test_replace_returns_previous() {
        let mut slots = FixedSlots::from_vec(vec!["a", "b"]);
        assert_eq!(slots.replace(1, "c").unwrap(), "b");
        assert_eq!(slots.into_vec(), vec!["a", "c"]);
    }
}
