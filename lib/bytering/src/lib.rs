// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![cfg_attr(not(test), no_std)]

/// A circular byte buffer backed by borrowed memory, using the classic
/// spare-slot convention: an `n`-byte backing slice stores at most `n - 1`
/// bytes, so that `head == tail` always means "empty" and no auxiliary
/// fill counter or "full" flag is needed.
///
/// Transfers are all-or-nothing blocks: an enqueue or dequeue either moves
/// the entire requested span or fails without touching the buffer. This is
/// what lets a caller retry the identical request later without partial-
/// transfer bookkeeping.
///
/// # Design goals
///
/// 1. `no_std`.
/// 2. Use borrowed memory, so that a ring can be backed by a named `static`
///    for debug visibility, rather than some random location on the stack.
/// 3. Exact-or-nothing block transfers with slice copies, no per-byte loop.
/// 4. Head and tail are plain indices in `0..len`; the fill level is derived
///    from them alone.
///
/// Non-goals:
///
/// - Concurrent access or sharing. The ring must always be accessed using
///   `&mut`; callers that share one (say, across interrupt handlers) bring
///   their own mutual exclusion.
#[derive(Debug)]
pub struct ByteRing<'s> {
    backing: &'s mut [u8],
    /// Next slot to write. Also called "in" in older circular-buffer code.
    head: usize,
    /// Next slot to read. Also called "out".
    tail: usize,
}

/// Error returned when the ring lacks room for an entire block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RingFull;

/// Error returned when the ring doesn't hold enough data to read out an
/// entire block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NotEnoughData;

impl<'s> ByteRing<'s> {
    /// Creates a ring over `backing`. The ring is initially empty and its
    /// usable capacity is `backing.len() - 1`. A backing shorter than two
    /// bytes leaves no usable capacity: the ring is well-formed but accepts
    /// only empty blocks. Callers that need real capacity should check
    /// [`Self::capacity`] after construction.
    pub fn new(backing: &'s mut [u8]) -> Self {
        Self {
            backing,
            head: 0,
            tail: 0,
        }
    }

    /// Returns the number of bytes the ring can hold, i.e. one less than
    /// the backing length.
    pub fn capacity(&self) -> usize {
        self.backing.len().saturating_sub(1)
    }

    /// Returns the number of bytes currently stored.
    pub fn len(&self) -> usize {
        if self.backing.is_empty() {
            return 0;
        }
        // head and tail are both in 0..backing.len(), so adding the size
        // before the modulo keeps the subtraction from underflowing.
        (self.head + self.backing.len() - self.tail) % self.backing.len()
    }

    /// Checks whether the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Returns the number of bytes that can be enqueued without dequeuing.
    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Enqueues all of `data`, or nothing.
    pub fn enqueue(&mut self, data: &[u8]) -> Result<(), RingFull> {
        if data.len() > self.free() {
            return Err(RingFull);
        }
        if data.is_empty() {
            // Keeps the index arithmetic below away from degenerate
            // backings, which only ever get this far with empty blocks.
            return Ok(());
        }

        let size = self.backing.len();
        // The block may wrap; split it at the end of backing memory.
        let contiguous = (size - self.head).min(data.len());
        let (d1, d2) = data.split_at(contiguous);
        self.backing[self.head..self.head + contiguous].copy_from_slice(d1);
        self.backing[..d2.len()].copy_from_slice(d2);
        self.head = (self.head + data.len()) % size;
        Ok(())
    }

    /// Dequeues exactly `dest.len()` bytes into `dest`, or nothing.
    pub fn dequeue_into(&mut self, dest: &mut [u8]) -> Result<(), NotEnoughData> {
        if dest.len() > self.len() {
            return Err(NotEnoughData);
        }
        if dest.is_empty() {
            return Ok(());
        }

        let size = self.backing.len();
        let contiguous = (size - self.tail).min(dest.len());
        let (d1, d2) = dest.split_at_mut(contiguous);
        d1.copy_from_slice(&self.backing[self.tail..self.tail + contiguous]);
        d2.copy_from_slice(&self.backing[..d2.len()]);
        self.tail = (self.tail + dest.len()) % size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_of(n: usize) -> ByteRing<'static> {
        ByteRing::new(Box::leak(vec![0u8; n].into_boxed_slice()))
    }

    #[test]
    fn capacity_is_one_less_than_backing() {
        let r = ring_of(6);
        assert_eq!(r.capacity(), 5);
        assert_eq!(r.len(), 0);
        assert_eq!(r.free(), 5);
        assert!(r.is_empty());
    }

    #[test]
    fn degenerate_backings_have_zero_capacity() {
        for n in [0, 1] {
            let mut r = ring_of(n);
            assert_eq!(r.capacity(), 0);
            assert_eq!(r.len(), 0);
            assert_eq!(r.free(), 0);
            // Only the empty block fits.
            assert_eq!(r.enqueue(b""), Ok(()));
            assert_eq!(r.enqueue(b"x"), Err(RingFull));
            let mut none = [0u8; 0];
            assert_eq!(r.dequeue_into(&mut none), Ok(()));
        }
    }

    #[test]
    fn fill_to_capacity_but_not_past_it() {
        let mut r = ring_of(6);
        assert_eq!(r.enqueue(b"abcde"), Ok(()));
        assert_eq!(r.len(), 5);
        assert_eq!(r.free(), 0);
        // The spare slot is not usable.
        assert_eq!(r.enqueue(b"f"), Err(RingFull));
    }

    #[test]
    fn block_transfer_is_all_or_nothing() {
        let mut r = ring_of(6);
        r.enqueue(b"abc").unwrap();
        // Three free; a four-byte block must not partially land.
        assert_eq!(r.enqueue(b"wxyz"), Err(RingFull));
        assert_eq!(r.len(), 3);

        let mut four = [0; 4];
        assert_eq!(r.dequeue_into(&mut four), Err(NotEnoughData));
        assert_eq!(r.len(), 3);

        let mut three = [0; 3];
        r.dequeue_into(&mut three).unwrap();
        assert_eq!(&three, b"abc");
        assert!(r.is_empty());
    }

    #[test]
    fn round_trips_across_the_wrap_point() {
        let mut r = ring_of(6);
        // Walk head and tail all the way around several times with blocks
        // sized to hit every split position.
        let mut out = [0u8; 4];
        for i in 0..32u8 {
            let block = [i, i ^ 0x55, i ^ 0xaa, !i];
            r.enqueue(&block).unwrap();
            r.dequeue_into(&mut out).unwrap();
            assert_eq!(out, block, "mismatch on pass {i}");
        }
    }

    #[test]
    fn interleaved_sizes_preserve_fifo_order() {
        let mut r = ring_of(8);
        r.enqueue(b"ab").unwrap();
        r.enqueue(b"cde").unwrap();
        let mut one = [0u8; 1];
        r.dequeue_into(&mut one).unwrap();
        assert_eq!(&one, b"a");
        r.enqueue(b"fg").unwrap();
        let mut six = [0u8; 6];
        r.dequeue_into(&mut six).unwrap();
        assert_eq!(&six, b"bcdefg");
    }

    #[test]
    fn empty_block_always_succeeds() {
        let mut r = ring_of(2);
        r.enqueue(b"").unwrap();
        let mut none = [0u8; 0];
        r.dequeue_into(&mut none).unwrap();
        assert!(r.is_empty());
    }
}
