//! Sequential id generation for engine handles

use std::marker::PhantomData;
use std::sync::atomic::{self, AtomicU32};

/// Hands out non-zero ids in increasing order, wrapping past `u32::MAX`.
///
/// Zero is reserved so that `0` can mean "no id" in host interfaces.
pub struct IdGenerator<T: From<u32>> {
    next_id: AtomicU32,
    phantom: PhantomData<fn() -> T>,
}

impl<T: From<u32>> IdGenerator<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            phantom: PhantomData,
        }
    }

    /// Get the next available id
    pub fn next_id(&self) -> T {
        loop {
            let id = self.next_id.fetch_add(1, atomic::Ordering::Relaxed);
            if id != 0 {
                return T::from(id);
            }
        }
    }
}

impl<T: From<u32>> Default for IdGenerator<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StateId;

    #[test]
    fn test_id_generation() {
        let gen = IdGenerator::<StateId>::new();
        let id1 = gen.next_id();
        let id2 = gen.next_id();
        assert_ne!(id1, id2);
        assert_eq!(id1, StateId(1));
    }

    #[test]
    fn test_zero_is_skipped_on_wrap() {
        let gen = IdGenerator::<StateId>::new();
        gen.next_id.store(u32::MAX, atomic::Ordering::Relaxed);
        assert_eq!(gen.next_id(), StateId(u32::MAX));
        assert_eq!(gen.next_id(), StateId(1));
    }
}
