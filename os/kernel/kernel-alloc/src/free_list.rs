use crate::FrameIndex;
use alloc::vec;
use alloc::vec::Vec;

/// End-of-list marker in the link table.
const NIL: u32 = u32::MAX;

/// Link value of a frame that is currently not on the list.
const DETACHED: u32 = u32::MAX - 1;

/// LIFO list of free frames.
///
/// The classic kernel layout keeps the `next` pointer inside the free frame
/// itself. Here the links live in a side table with one slot per frame of the
/// index space, which keeps frame contents untouched (they hold the scrub
/// pattern) and lets a push detect a frame that is already linked.
///
/// ```text
/// head ─► #517 ─► #516 ─► #515 ─► NIL
/// links:  [.., 515: NIL, 516: 515, 517: 516, 518: DETACHED, ..]
/// ```
///
/// # Invariants
/// - A frame is on the list iff its link is not `DETACHED`.
/// - `len` equals the number of linked frames.
pub(crate) struct FreeList {
    head: u32,
    links: Vec<u32>,
    len: usize,
}

impl FreeList {
    /// An empty list able to hold frames `0..index_space`.
    pub(crate) fn new(index_space: usize) -> Self {
        Self {
            head: NIL,
            links: vec![DETACHED; index_space],
            len: 0,
        }
    }

    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    fn contains(&self, frame: FrameIndex) -> bool {
        self.links
            .get(frame.as_usize())
            .is_some_and(|&l| l != DETACHED)
    }

    /// Push `frame` onto the head of the list.
    ///
    /// Returns `Err(())` if the frame is already linked (double free).
    pub(crate) fn push(&mut self, frame: FrameIndex) -> Result<(), ()> {
        let slot = &mut self.links[frame.as_usize()];
        if *slot != DETACHED {
            return Err(());
        }
        *slot = self.head;
        self.head = frame.as_u32();
        self.len += 1;
        Ok(())
    }

    /// Unlink and return the head of the list.
    pub(crate) fn pop(&mut self) -> Option<FrameIndex> {
        if self.head == NIL {
            return None;
        }
        let frame = self.head;
        let slot = &mut self.links[frame as usize];
        self.head = *slot;
        *slot = DETACHED;
        self.len -= 1;
        Some(FrameIndex::new(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifo_order() {
        let mut l = FreeList::new(16);
        for i in 3..6 {
            l.push(FrameIndex::new(i)).unwrap();
        }
        assert_eq!(l.len(), 3);
        assert_eq!(l.pop(), Some(FrameIndex::new(5)));
        assert_eq!(l.pop(), Some(FrameIndex::new(4)));
        assert_eq!(l.pop(), Some(FrameIndex::new(3)));
        assert_eq!(l.pop(), None);
        assert_eq!(l.len(), 0);
    }

    #[test]
    fn double_push_is_rejected() {
        let mut l = FreeList::new(4);
        l.push(FrameIndex::new(2)).unwrap();
        assert!(l.contains(FrameIndex::new(2)));
        assert_eq!(l.push(FrameIndex::new(2)), Err(()));
        assert_eq!(l.len(), 1);

        l.pop();
        assert!(!l.contains(FrameIndex::new(2)));
        assert_eq!(l.push(FrameIndex::new(2)), Ok(()));
    }
}
