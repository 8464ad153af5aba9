// SPDX-License-Identifier: GPL-3.0
// code_buffer.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use super::host::HostOp;

/// Address of a host instruction inside the code buffer.
pub type CodeAddr = u32;

/// Append-only arena of host instructions. The first `reserved` slots hold the
/// trampolines and survive a reset; everything after them is compiled blocks.
pub struct CodeBuffer {
    ops: Vec<HostOp>,
    capacity: usize,
    reserved: usize,
}

impl CodeBuffer {

    /// Creates an empty buffer with room for `capacity` instructions.
    pub fn new(capacity: usize) -> Self {
        CodeBuffer {
            ops: Vec::with_capacity(capacity),
            capacity,
            reserved: 0,
        }
    }

    /// Address the next instruction will be written to.
    #[inline(always)]
    pub fn cursor(&self) -> CodeAddr {
        self.ops.len() as CodeAddr
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots left before the buffer is considered full. The limit is soft:
    /// a compile that started below it may run past it.
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.ops.len())
    }

    /// Appends an instruction and returns its address.
    #[inline(always)]
    pub fn push(&mut self, op: HostOp) -> CodeAddr {
        let addr = self.cursor();
        self.ops.push(op);
        addr
    }

    #[inline(always)]
    pub fn get(&self, addr: CodeAddr) -> Option<&HostOp> {
        self.ops.get(addr as usize)
    }

    /// Points the control transfer at `site` to `target`. Returns false if
    /// there is no control transfer there.
    pub fn patch_target(&mut self, site: CodeAddr, target: CodeAddr) -> bool {
        match self.ops.get_mut(site as usize) {
            Some(op) => op.retarget(target),
            None => false,
        }
    }

    /// Marks everything written so far as the reserved trampoline region.
    pub fn reserve_trampolines(&mut self) {
        self.reserved = self.ops.len();
    }

    /// Discards every compiled block, keeping the trampolines.
    pub fn reset(&mut self) {
        self.ops.truncate(self.reserved);
    }
}
