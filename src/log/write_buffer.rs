//! Write Buffer
//!
//! Multi-producer ring buffer with a two-phase claim/commit protocol.
//!
//! ## Protocol
//! 1. A producer claims space for one record (`try_claim` / `claim`)
//! 2. It fills the claimed slot
//! 3. It commits (or aborts, or simply drops) the claim
//!
//! The drainer sees slots strictly in claim order: a claim that was issued
//! first but commits last holds back everything claimed after it. That keeps
//! position assignment gap-free.
//!
//! ## Space Accounting
//! ```text
//!   head                                   tail
//!    │                                       │
//!    ▼                                       ▼
//!  ┌──────────┬──────────┬─────────┬─────────┬───────────────┐
//!  │committed │ claimed  │ aborted │committed│     free      │
//!  └──────────┴──────────┴─────────┴─────────┴───────────────┘
//! ```
//! `head` and `tail` are logical offsets that only grow; the physical offset
//! is `offset % capacity`. A record never wraps: if it does not fit before
//! the physical end, the remainder is filled with a padding slot. Space is
//! accounted in frame lengths (payload + record header).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::error::{LogError, Result};

use super::frame::frame_length;

/// Claim/commit ring buffer in front of the log stream controller
pub struct WriteBuffer {
    /// Ring capacity in bytes
    capacity: usize,

    /// Largest payload a single claim may request
    max_fragment_length: usize,

    /// Slot queue and offsets
    state: Mutex<BufferState>,

    /// Signalled when the drainer releases slots
    space_freed: Condvar,

    /// Signalled when a claim is committed or aborted
    claim_done: Condvar,

    /// Wakes the drainer after a commit (capacity 1, extra rings are dropped)
    doorbell_tx: Sender<()>,
    doorbell_rx: Receiver<()>,
}

struct BufferState {
    /// Slots in claim order, oldest first
    slots: VecDeque<Slot>,

    /// Logical offset of the oldest undrained byte
    head: u64,

    /// Logical offset of the next claim
    tail: u64,

    /// Id of the next slot; ids are contiguous across the queue
    next_slot_id: u64,

    /// Claims handed out but neither committed nor aborted
    outstanding: usize,

    /// No new claims are accepted while closed
    closed: bool,
}

struct Slot {
    id: u64,
    reserved: usize,
    state: SlotState,
}

enum SlotState {
    Claimed,
    Committed(Bytes),
    Aborted,
    Padding,
}

/// A run of drainable slots at the head of the buffer
#[derive(Debug, Default)]
pub struct DrainBlock {
    /// Committed payloads, in claim order
    pub fragments: Vec<Bytes>,

    /// Slots covered by this block, including padding and aborted claims
    pub slot_count: usize,

    /// Sum of the frame lengths of `fragments`
    pub frame_bytes: usize,
}

impl BufferState {
    fn used(&self) -> usize {
        (self.tail - self.head) as usize
    }

    fn push_slot(&mut self, reserved: usize, state: SlotState) -> (u64, u64) {
        let id = self.next_slot_id;
        let offset = self.tail;
        self.next_slot_id += 1;
        self.tail += reserved as u64;
        self.slots.push_back(Slot {
            id,
            reserved,
            state,
        });
        (id, offset)
    }

    /// Reserve `frame_len` contiguous bytes; returns (slot id, logical offset)
    fn reserve(&mut self, frame_len: usize, capacity: usize) -> Result<(u64, u64)> {
        let physical = (self.tail % capacity as u64) as usize;
        let mut padding = if physical + frame_len > capacity {
            capacity - physical
        } else {
            0
        };

        // Nothing buffered: restart at the physical beginning instead of padding
        if padding > 0 && self.used() == 0 {
            self.head += padding as u64;
            self.tail += padding as u64;
            padding = 0;
        }

        let used = self.used();
        if used + padding + frame_len > capacity {
            return Err(LogError::Backpressure {
                requested: frame_len,
                available: capacity - used,
            });
        }

        if padding > 0 {
            self.push_slot(padding, SlotState::Padding);
        }
        let reserved = self.push_slot(frame_len, SlotState::Claimed);
        self.outstanding += 1;
        Ok(reserved)
    }

    fn slot_mut(&mut self, id: u64) -> Option<&mut Slot> {
        let first = self.slots.front()?.id;
        let index = id.checked_sub(first)? as usize;
        self.slots.get_mut(index)
    }
}

impl WriteBuffer {
    /// Create a buffer of `capacity` bytes accepting payloads up to
    /// `max_fragment_length` bytes
    pub fn new(capacity: usize, max_fragment_length: usize) -> Result<Self> {
        if max_fragment_length == 0 || frame_length(max_fragment_length) > capacity {
            return Err(LogError::Config(format!(
                "max fragment length {} does not fit a write buffer of {} bytes",
                max_fragment_length, capacity
            )));
        }

        let (doorbell_tx, doorbell_rx) = bounded(1);
        Ok(Self {
            capacity,
            max_fragment_length,
            state: Mutex::new(BufferState {
                slots: VecDeque::new(),
                head: 0,
                tail: 0,
                next_slot_id: 0,
                outstanding: 0,
                closed: false,
            }),
            space_freed: Condvar::new(),
            claim_done: Condvar::new(),
            doorbell_tx,
            doorbell_rx,
        })
    }

    // =========================================================================
    // Producer Side
    // =========================================================================

    /// Claim space for a record of `length` bytes without waiting
    ///
    /// Fails with `Backpressure` if there is no contiguous free space.
    pub fn try_claim(&self, length: usize) -> Result<Claim<'_>> {
        self.check_length(length)?;

        let mut state = self.state.lock();
        if state.closed {
            return Err(LogError::InvalidState("write buffer is closed".to_string()));
        }
        let (slot_id, offset) = state.reserve(frame_length(length), self.capacity)?;
        Ok(self.new_claim(slot_id, offset, length))
    }

    /// Claim space for a record of `length` bytes, waiting up to `timeout`
    /// for the drainer to free space
    pub fn claim(&self, length: usize, timeout: Duration) -> Result<Claim<'_>> {
        self.check_length(length)?;

        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(LogError::InvalidState("write buffer is closed".to_string()));
            }
            match state.reserve(frame_length(length), self.capacity) {
                Ok((slot_id, offset)) => return Ok(self.new_claim(slot_id, offset, length)),
                Err(e @ LogError::Backpressure { .. }) => {
                    if self.space_freed.wait_until(&mut state, deadline).timed_out() {
                        if state.closed {
                            return Err(LogError::InvalidState(
                                "write buffer is closed".to_string(),
                            ));
                        }
                        let (slot_id, offset) = state
                            .reserve(frame_length(length), self.capacity)
                            .map_err(|_| e)?;
                        return Ok(self.new_claim(slot_id, offset, length));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn check_length(&self, length: usize) -> Result<()> {
        if length == 0 {
            return Err(LogError::InvalidArgument(
                "cannot claim an empty record".to_string(),
            ));
        }
        if length > self.max_fragment_length {
            return Err(LogError::InvalidArgument(format!(
                "record of {} bytes exceeds max fragment length {}",
                length, self.max_fragment_length
            )));
        }
        Ok(())
    }

    fn new_claim(&self, slot_id: u64, offset: u64, length: usize) -> Claim<'_> {
        Claim {
            buffer: self,
            slot_id,
            offset,
            data: BytesMut::zeroed(length),
            done: false,
        }
    }

    fn finish_claim(&self, slot_id: u64, outcome: SlotState) {
        {
            let mut state = self.state.lock();
            if let Some(slot) = state.slot_mut(slot_id) {
                slot.state = outcome;
            }
            state.outstanding = state.outstanding.saturating_sub(1);
        }
        self.claim_done.notify_all();
        let _ = self.doorbell_tx.try_send(());
    }

    // =========================================================================
    // Drainer Side
    // =========================================================================

    /// Receiver that is signalled whenever a claim completes
    pub fn doorbell(&self) -> Receiver<()> {
        self.doorbell_rx.clone()
    }

    /// Collect the drainable slots at the head, up to `max_bytes` of frames
    ///
    /// Stops at the first claim that is still in flight. At least one committed
    /// fragment is returned when available. Returns `None` if nothing at the
    /// head is drainable. Slots stay in the buffer until `release` is called.
    pub fn poll_block(&self, max_bytes: usize) -> Option<DrainBlock> {
        let state = self.state.lock();
        let mut block = DrainBlock::default();

        for slot in &state.slots {
            match &slot.state {
                SlotState::Claimed => break,
                SlotState::Padding | SlotState::Aborted => block.slot_count += 1,
                SlotState::Committed(data) => {
                    let len = frame_length(data.len());
                    if !block.fragments.is_empty() && block.frame_bytes + len > max_bytes {
                        break;
                    }
                    block.frame_bytes += len;
                    block.fragments.push(data.clone());
                    block.slot_count += 1;
                }
            }
        }

        if block.slot_count == 0 {
            None
        } else {
            Some(block)
        }
    }

    /// Drop the first `slot_count` slots after they were written to storage
    pub fn release(&self, slot_count: usize) {
        {
            let mut state = self.state.lock();
            for _ in 0..slot_count {
                match state.slots.pop_front() {
                    Some(slot) => state.head += slot.reserved as u64,
                    None => break,
                }
            }
        }
        self.space_freed.notify_all();
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Stop accepting claims and wait for in-flight claims to complete
    ///
    /// Fails with `Cancelled` if claims are still outstanding after `grace`.
    /// Committed but undrained slots are kept.
    pub fn close(&self, grace: Duration) -> Result<()> {
        let deadline = Instant::now() + grace;
        let mut state = self.state.lock();
        state.closed = true;
        // Wake producers blocked in claim() so they observe the close
        self.space_freed.notify_all();

        while state.outstanding > 0 {
            if self.claim_done.wait_until(&mut state, deadline).timed_out() && state.outstanding > 0 {
                return Err(LogError::Cancelled(format!(
                    "{} claims still outstanding after {:?}",
                    state.outstanding, grace
                )));
            }
        }
        Ok(())
    }

    /// Accept claims again; undrained content is kept
    pub fn reopen(&self) {
        self.state.lock().closed = false;
    }

    /// Wait until every slot has been drained
    pub fn wait_until_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.slots.is_empty() {
            if self.space_freed.wait_until(&mut state, deadline).timed_out() {
                return state.slots.is_empty();
            }
        }
        true
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Ring capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest payload a single claim may request
    pub fn max_fragment_length(&self) -> usize {
        self.max_fragment_length
    }

    /// Bytes reserved and not yet drained (including padding)
    pub fn pending_bytes(&self) -> usize {
        self.state.lock().used()
    }

    /// Claims handed out but not yet committed or aborted
    pub fn outstanding_claims(&self) -> usize {
        self.state.lock().outstanding
    }

    /// Whether no slot is waiting to be drained
    pub fn is_empty(&self) -> bool {
        self.state.lock().slots.is_empty()
    }

    /// Whether new claims are rejected
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Space reserved in the write buffer for one record
///
/// Dropping a claim without committing aborts it; the drainer then skips the
/// slot without assigning a position.
pub struct Claim<'a> {
    buffer: &'a WriteBuffer,
    slot_id: u64,
    offset: u64,
    data: BytesMut,
    done: bool,
}

impl Claim<'_> {
    /// Claimed slot id (claim order)
    pub fn slot_id(&self) -> u64 {
        self.slot_id
    }

    /// Physical offset of the slot inside the ring
    pub fn buffer_offset(&self) -> usize {
        (self.offset % self.buffer.capacity as u64) as usize
    }

    /// Claimed payload length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The claimed payload bytes, to be filled by the producer
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Publish the record to the drainer
    pub fn commit(mut self) {
        self.done = true;
        let data = std::mem::take(&mut self.data).freeze();
        self.buffer.finish_claim(self.slot_id, SlotState::Committed(data));
    }

    /// Give the slot back without publishing anything
    pub fn abort(mut self) {
        self.done = true;
        self.buffer.finish_claim(self.slot_id, SlotState::Aborted);
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.buffer.finish_claim(self.slot_id, SlotState::Aborted);
        }
    }
}
