//! Single-slot handoff between the audio callback and the spectrum consumer.
//!
//! The mailbox holds exactly one block. A publish overwrites whatever the
//! consumer has not taken yet (latest wins), so the producer never waits for
//! anything except the lock around a fixed-size copy. The consumer copies the
//! block out and releases the lock before doing any work on it.

use std::sync::{Condvar, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::{Result, SpectrumError};

/// Counters describing the traffic through a [`Mailbox`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxStats {
    /// Blocks written by the producer.
    pub published: u64,
    /// Blocks handed to the consumer.
    pub delivered: u64,
    /// Blocks replaced before the consumer took them.
    pub overwritten: u64,
}

#[derive(Debug)]
struct Slot {
    buffer: Vec<f32>,
    ready: bool,
    closed: bool,
    stats: MailboxStats,
}

/// Latest-wins slot shared by one producer and one consumer.
#[derive(Debug)]
pub struct Mailbox {
    slot: Mutex<Slot>,
    available: Condvar,
    block_size: usize,
}

impl Mailbox {
    /// Creates an empty, open mailbox holding blocks of `block_size` samples.
    pub fn new(block_size: usize) -> Self {
        Self {
            slot: Mutex::new(Slot {
                buffer: vec![0.0; block_size],
                ready: false,
                closed: false,
                stats: MailboxStats::default(),
            }),
            available: Condvar::new(),
            block_size,
        }
    }

    /// Length every published and taken block must have.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Replaces the pending block with `block` and wakes one waiting consumer.
    ///
    /// Safe to call from the audio callback: it never allocates and holds the
    /// lock only for the copy. Publishing after [`Mailbox::close`] is a no-op.
    pub fn publish(&self, block: &[f32]) -> Result<()> {
        if block.len() != self.block_size {
            return Err(SpectrumError::SizeMismatch {
                expected: self.block_size,
                actual: block.len(),
            });
        }

        {
            let mut slot = self.lock()?;
            if slot.closed {
                return Ok(());
            }
            slot.buffer.copy_from_slice(block);
            if slot.ready {
                slot.stats.overwritten += 1;
            }
            slot.ready = true;
            slot.stats.published += 1;
        }
        self.available.notify_one();
        Ok(())
    }

    /// Waits for a block and copies it into `out`.
    ///
    /// Returns `Ok(false)` once the mailbox is closed and no block is pending.
    /// A block published before the close is still delivered.
    pub fn take_into(&self, out: &mut [f32]) -> Result<bool> {
        if out.len() != self.block_size {
            return Err(SpectrumError::SizeMismatch {
                expected: self.block_size,
                actual: out.len(),
            });
        }

        let mut slot = self.lock()?;
        while !slot.ready && !slot.closed {
            slot = self
                .available
                .wait(slot)
                .map_err(|_| SpectrumError::Poisoned("mailbox"))?;
        }

        if !slot.ready {
            return Ok(false);
        }
        out.copy_from_slice(&slot.buffer);
        slot.ready = false;
        slot.stats.delivered += 1;
        Ok(true)
    }

    /// Allocating variant of [`Mailbox::take_into`]. `None` signals shutdown.
    pub fn take(&self) -> Result<Option<Vec<f32>>> {
        let mut block = vec![0.0; self.block_size];
        Ok(self.take_into(&mut block)?.then_some(block))
    }

    /// Shuts the mailbox down and wakes every blocked consumer.
    pub fn close(&self) {
        // A poisoned slot is still closed so that waiters can observe it.
        let mut slot = match self.slot.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.closed = true;
        drop(slot);
        self.available.notify_all();
    }

    /// Whether [`Mailbox::close`] has run. A poisoned mailbox counts as closed.
    pub fn is_closed(&self) -> bool {
        self.lock().map(|slot| slot.closed).unwrap_or(true)
    }

    /// Snapshot of the traffic counters.
    pub fn stats(&self) -> Result<MailboxStats> {
        Ok(self.lock()?.stats)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Slot>> {
        self.slot
            .lock()
            .map_err(|_| SpectrumError::Poisoned("mailbox"))
    }
}
