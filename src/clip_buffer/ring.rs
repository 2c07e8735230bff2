//! Fixed-capacity frame ring
//!
//! Index-addressed ring over a preallocated slot vector. Capacity never
//! changes after construction, so `len <= capacity` holds mechanically;
//! arming shrinks the *content* via `truncate_to_suffix` without touching
//! the container.

use crate::frame_source::Frame;

pub struct FrameRing {
    slots: Vec<Option<Frame>>,
    head: usize,
    len: usize,
}

impl FrameRing {
    /// Capacity must be positive; validated by the engine's config before
    /// construction.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Append a frame, evicting the oldest when full (FIFO)
    pub fn push(&mut self, frame: Frame) {
        let cap = self.capacity();
        if self.len == cap {
            self.slots[self.head] = Some(frame);
            self.head = (self.head + 1) % cap;
        } else {
            self.slots[(self.head + self.len) % cap] = Some(frame);
            self.len += 1;
        }
    }

    /// Keep only the newest `n` frames, discarding older history
    pub fn truncate_to_suffix(&mut self, n: usize) {
        if self.len <= n {
            return;
        }
        let cap = self.capacity();
        let drop = self.len - n;
        for i in 0..drop {
            self.slots[(self.head + i) % cap] = None;
        }
        self.head = (self.head + drop) % cap;
        self.len = n;
    }

    /// Most recently pushed frame
    pub fn latest(&self) -> Option<Frame> {
        if self.len == 0 {
            return None;
        }
        let cap = self.capacity();
        self.slots[(self.head + self.len - 1) % cap].clone()
    }

    /// Point-in-time copy in capture order (oldest first)
    pub fn snapshot(&self) -> Vec<Frame> {
        let cap = self.capacity();
        (0..self.len)
            .filter_map(|i| self.slots[(self.head + i) % cap].clone())
            .collect()
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn frame(tag: u8) -> Frame {
        Frame {
            data: Bytes::from(vec![tag]),
            width: 1,
            height: 1,
        }
    }

    fn tags(frames: &[Frame]) -> Vec<u8> {
        frames.iter().map(|f| f.data[0]).collect()
    }

    #[test]
    fn test_len_never_exceeds_capacity() {
        let mut ring = FrameRing::new(5);
        for i in 0..100 {
            ring.push(frame(i));
            assert!(ring.len() <= ring.capacity());
        }
        assert_eq!(ring.len(), 5);
    }

    #[test]
    fn test_fifo_eviction_order() {
        let mut ring = FrameRing::new(3);
        for i in 0..5 {
            ring.push(frame(i));
        }
        assert_eq!(tags(&ring.snapshot()), vec![2, 3, 4]);
    }

    #[test]
    fn test_truncate_to_suffix_keeps_newest() {
        let mut ring = FrameRing::new(10);
        for i in 0..8 {
            ring.push(frame(i));
        }
        ring.truncate_to_suffix(3);
        assert_eq!(ring.len(), 3);
        assert_eq!(tags(&ring.snapshot()), vec![5, 6, 7]);

        // Capacity unchanged: the window can refill to the full cap
        for i in 8..15 {
            ring.push(frame(i));
        }
        assert_eq!(ring.len(), 10);
        assert_eq!(tags(&ring.snapshot()), (5..15).collect::<Vec<u8>>());
    }

    #[test]
    fn test_truncate_noop_when_shorter() {
        let mut ring = FrameRing::new(10);
        ring.push(frame(1));
        ring.truncate_to_suffix(5);
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_truncate_after_wraparound() {
        let mut ring = FrameRing::new(4);
        for i in 0..7 {
            ring.push(frame(i));
        }
        // Window is [3, 4, 5, 6] with head mid-vector
        ring.truncate_to_suffix(2);
        assert_eq!(tags(&ring.snapshot()), vec![5, 6]);
        ring.push(frame(7));
        assert_eq!(tags(&ring.snapshot()), vec![5, 6, 7]);
    }

    #[test]
    fn test_latest_and_clear() {
        let mut ring = FrameRing::new(3);
        assert!(ring.latest().is_none());

        ring.push(frame(9));
        ring.push(frame(10));
        assert_eq!(ring.latest().map(|f| f.data[0]), Some(10));

        ring.clear();
        assert!(ring.is_empty());
        assert!(ring.latest().is_none());
        assert_eq!(ring.capacity(), 3);
    }
}
