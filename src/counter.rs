//! Index allocation shared by the inode and descriptor tables.

use std::collections::BTreeSet;

/// Hands out the lowest unused index at or above `start`.
///
/// Freed indices are recycled before the high-water mark grows.
#[derive(Debug, Clone)]
pub struct IndexCounter {
    next: u64,
    free: BTreeSet<u64>,
}

impl IndexCounter {
    pub fn new(start: u64) -> Self {
        Self { next: start, free: BTreeSet::new() }
    }

    pub fn allocate(&mut self) -> u64 {
        if let Some(index) = self.free.pop_first() {
            return index;
        }
        let index = self.next;
        self.next += 1;
        index
    }

    pub fn deallocate(&mut self, index: u64) {
        if index >= self.next {
            return;
        }
        if index + 1 == self.next {
            self.next = index;
            // shrink past any trailing free run
            while self.next > 0 && self.free.remove(&(self.next - 1)) {
                self.next -= 1;
            }
        } else {
            self.free.insert(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocates_from_start() {
        let mut counter = IndexCounter::new(1);
        assert_eq!(counter.allocate(), 1);
        assert_eq!(counter.allocate(), 2);
        assert_eq!(counter.allocate(), 3);
    }

    #[test]
    fn test_recycles_lowest_free() {
        let mut counter = IndexCounter::new(1);
        for _ in 0..5 {
            counter.allocate();
        }
        counter.deallocate(4);
        counter.deallocate(2);
        assert_eq!(counter.allocate(), 2);
        assert_eq!(counter.allocate(), 4);
        assert_eq!(counter.allocate(), 6);
    }

    #[test]
    fn test_deallocating_tail_shrinks() {
        let mut counter = IndexCounter::new(0);
        for _ in 0..4 {
            counter.allocate();
        }
        counter.deallocate(2);
        counter.deallocate(3);
        assert_eq!(counter.allocate(), 2);
        assert_eq!(counter.allocate(), 3);
        assert_eq!(counter.allocate(), 4);
    }
}
