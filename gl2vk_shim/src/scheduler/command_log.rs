//! Per-node command log
//!
//! Fixed-capacity single-producer / single-consumer ring of command slots.
//! Each slot's opcode doubles as its "ready" flag: the producer writes the
//! record, then publishes the opcode; the consumer copies the record out,
//! then clears the opcode back to `OpCode::None`. A non-empty opcode is the
//! only signal the consumer trusts.
//!
//! Opcode stores and loads are `SeqCst` so that the store/load pairs used by
//! the sleep protocol in `command_node` cannot be reordered.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use crate::scheduler::command::{Command, OpCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// The next slot has not been consumed yet
    Full,
    /// `OpCode::None` commands cannot be published
    Empty,
}

struct Slot {
    opcode: AtomicU8,
    command: UnsafeCell<Command>,
}

/// Bounded SPSC command ring
pub struct CommandLog {
    slots: Box<[Slot]>,
    write_pos: AtomicU64,
    read_pos: AtomicU64,
}

// A slot's command is written only while its opcode is None (producer side)
// and read only while it is non-None (consumer side).
unsafe impl Send for CommandLog {}
unsafe impl Sync for CommandLog {}

impl CommandLog {
    /// Create a log with `capacity` slots (at least one)
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity.max(1))
            .map(|_| Slot {
                opcode: AtomicU8::new(OpCode::None as u8),
                command: UnsafeCell::new(Command::default()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            write_pos: AtomicU64::new(0),
            read_pos: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, position: u64) -> &Slot {
        &self.slots[(position % self.slots.len() as u64) as usize]
    }

    // ===== PRODUCER SIDE =====

    /// Publish a command in the next slot
    ///
    /// Must only be called from the single producer thread.
    pub fn try_push(&self, command: Command) -> Result<(), PushError> {
        if command.op == OpCode::None {
            return Err(PushError::Empty);
        }
        let position = self.write_pos.load(Ordering::Relaxed);
        let slot = self.slot(position);
        if slot.opcode.load(Ordering::SeqCst) != OpCode::None as u8 {
            return Err(PushError::Full);
        }
        unsafe {
            *slot.command.get() = command;
        }
        slot.opcode.store(command.op as u8, Ordering::SeqCst);
        self.write_pos.store(position + 1, Ordering::Release);
        Ok(())
    }

    /// Whether the slot the producer writes next has been consumed
    pub fn next_slot_free(&self) -> bool {
        let position = self.write_pos.load(Ordering::Relaxed);
        self.slot(position).opcode.load(Ordering::SeqCst) == OpCode::None as u8
    }

    // ===== CONSUMER SIDE =====

    /// Take the command in the current slot, if one is published
    ///
    /// Must only be called from the single consumer thread.
    pub fn try_pop(&self) -> Option<Command> {
        let position = self.read_pos.load(Ordering::Relaxed);
        let slot = self.slot(position);
        let raw = slot.opcode.load(Ordering::SeqCst);
        let op = OpCode::from_u8(raw)?;
        if op == OpCode::None {
            return None;
        }
        let mut command = unsafe { *slot.command.get() };
        command.op = op;
        slot.opcode.store(OpCode::None as u8, Ordering::SeqCst);
        self.read_pos.store(position + 1, Ordering::Release);
        Some(command)
    }

    /// Whether the consumer's current slot holds a published command
    pub fn has_pending(&self) -> bool {
        let position = self.read_pos.load(Ordering::Relaxed);
        self.slot(position).opcode.load(Ordering::SeqCst) != OpCode::None as u8
    }

    // ===== COUNTERS =====

    /// Total commands published
    pub fn pushed(&self) -> u64 {
        self.write_pos.load(Ordering::Acquire)
    }

    /// Total commands consumed
    pub fn popped(&self) -> u64 {
        self.read_pos.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.pushed().saturating_sub(self.popped()) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "command_log_tests.rs"]
mod tests;
