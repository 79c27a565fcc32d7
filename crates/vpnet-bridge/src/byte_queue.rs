//! Ordered queue of received byte chunks.
//!
//! Chunks are kept exactly as the transport delivered them. Draining copies
//! out whole chunks first and only slices the head chunk when the caller asks
//! for fewer bytes than it holds; the unread tail stays at the front.

use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};

/// FIFO of pending received chunks with partial-consumption semantics.
#[derive(Debug, Default)]
pub struct ByteQueue {
    chunks: VecDeque<Bytes>,
    /// Total bytes across all chunks.
    len: usize,
}

impl ByteQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Empty chunks are ignored.
    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Whether no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total number of buffered bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Number of discrete chunks currently held.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Remove and return up to `max` bytes.
    ///
    /// When the head chunk alone satisfies the request it is split without
    /// copying; otherwise the drained chunks are concatenated.
    pub fn drain(&mut self, max: usize) -> Bytes {
        let want = max.min(self.len);
        if want == 0 {
            return Bytes::new();
        }

        if let Some(head) = self.chunks.front_mut()
            && head.len() >= want
        {
            let out = if head.len() == want {
                self.chunks.pop_front().unwrap_or_default()
            } else {
                head.split_to(want)
            };
            self.len -= want;
            return out;
        }

        let mut out = BytesMut::with_capacity(want);
        while out.len() < want {
            let Some(head) = self.chunks.front_mut() else {
                break;
            };
            let take = (want - out.len()).min(head.len());
            if take == head.len() {
                out.extend_from_slice(head);
                self.chunks.pop_front();
            } else {
                out.extend_from_slice(&head.split_to(take));
            }
        }
        self.len -= out.len();
        out.freeze()
    }

    /// Copy up to `dest.len()` bytes into `dest`, returning how many were
    /// written.
    pub fn drain_into(&mut self, dest: &mut [u8]) -> usize {
        let mut written = 0;
        while written < dest.len() {
            let Some(head) = self.chunks.front_mut() else {
                break;
            };
            let take = (dest.len() - written).min(head.len());
            dest[written..written + take].copy_from_slice(&head[..take]);
            written += take;
            if take == head.len() {
                self.chunks.pop_front();
            } else {
                head.advance(take);
            }
        }
        self.len -= written;
        written
    }

    /// Drop every buffered chunk.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn queue_of(chunks: &[&[u8]]) -> ByteQueue {
        let mut queue = ByteQueue::new();
        for chunk in chunks {
            queue.push(Bytes::copy_from_slice(chunk));
        }
        queue
    }

    #[test]
    fn test_empty_queue_drains_nothing() {
        let mut queue = ByteQueue::new();
        assert!(queue.is_empty());
        assert!(queue.drain(16).is_empty());
        let mut buf = [0u8; 8];
        assert_eq!(queue.drain_into(&mut buf), 0);
    }

    #[test]
    fn test_drain_zero_leaves_queue_intact() {
        let mut queue = queue_of(&[b"abc"]);
        assert!(queue.drain(0).is_empty());
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_empty_chunk_ignored() {
        let mut queue = ByteQueue::new();
        queue.push(Bytes::new());
        assert!(queue.is_empty());
        assert_eq!(queue.chunk_count(), 0);
    }

    #[test]
    fn test_partial_drain_keeps_remainder_at_front() {
        let mut queue = queue_of(&[b"hello", b"world"]);
        assert_eq!(&queue.drain(3)[..], b"hel");
        assert_eq!(queue.len(), 7);
        assert_eq!(queue.chunk_count(), 2);
        assert_eq!(&queue.drain(4)[..], b"lowo");
        assert_eq!(&queue.drain(100)[..], b"rld");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_spanning_chunks_concatenates() {
        let mut queue = queue_of(&[b"ab", b"cd", b"ef"]);
        assert_eq!(&queue.drain(5)[..], b"abcde");
        assert_eq!(queue.chunk_count(), 1);
        assert_eq!(&queue.drain(5)[..], b"f");
    }

    #[test]
    fn test_drain_into_partial_buffer() {
        let mut queue = queue_of(&[b"0123456789"]);
        let mut buf = [0u8; 4];
        assert_eq!(queue.drain_into(&mut buf), 4);
        assert_eq!(&buf, b"0123");
        assert_eq!(queue.drain_into(&mut buf), 4);
        assert_eq!(&buf, b"4567");
        assert_eq!(queue.drain_into(&mut buf), 2);
        assert_eq!(&buf[..2], b"89");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut queue = queue_of(&[b"x", b"yz"]);
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.chunk_count(), 0);
    }

    proptest! {
        #[test]
        fn prop_drain_preserves_order(
            chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..32), 0..16),
            sizes in proptest::collection::vec(1usize..48, 1..32),
        ) {
            let mut queue = ByteQueue::new();
            let mut expected = Vec::new();
            for chunk in &chunks {
                expected.extend_from_slice(chunk);
                queue.push(Bytes::copy_from_slice(chunk));
            }
            prop_assert_eq!(queue.len(), expected.len());

            let mut drained = Vec::new();
            let mut sizes = sizes.into_iter().cycle();
            while !queue.is_empty() {
                let n = sizes.next().unwrap_or(1);
                let out = queue.drain(n);
                prop_assert!(out.len() <= n);
                drained.extend_from_slice(&out);
            }
            prop_assert_eq!(drained, expected);
        }

        #[test]
        fn prop_drain_into_preserves_order(
            chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 1..32), 0..16),
            window in 1usize..40,
        ) {
            let mut queue = ByteQueue::new();
            let mut expected = Vec::new();
            for chunk in &chunks {
                expected.extend_from_slice(chunk);
                queue.push(Bytes::copy_from_slice(chunk));
            }

            let mut drained = Vec::new();
            let mut buf = vec![0u8; window];
            loop {
                let n = queue.drain_into(&mut buf);
                if n == 0 {
                    break;
                }
                drained.extend_from_slice(&buf[..n]);
            }
            prop_assert_eq!(drained, expected);
        }
    }
}
