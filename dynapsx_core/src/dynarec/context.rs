// SPDX-License-Identifier: GPL-3.0
// context.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use super::block_cache::{BlockCache, JumpHashTable, PatchSiteList};
use super::code_buffer::{CodeAddr, CodeBuffer};
use super::consts::ConstTracker;
use super::emitter::{InstructionEmitter, ThreadedEmitter};
use super::host::{HostOp, StateField, PINNED_REGISTERS};
use log::info;

/// Everything the translator owns: code, the block index, the jump hash
/// table, pending links and the constant tracker. One instance per machine.
pub struct TranslatorContext {
    pub(crate) code: CodeBuffer,
    pub(crate) cache: BlockCache,
    pub(crate) jump_table: JumpHashTable,
    pub(crate) patches: PatchSiteList,
    pub(crate) tracker: ConstTracker,

    /// The exit trampoline: writes the pinned registers back and returns.
    pub(crate) exit: CodeAddr,
}

impl TranslatorContext {

    /// Creates a context with a code buffer of `capacity` host instructions
    /// and emits the trampolines into its reserved region.
    pub fn new(capacity: usize) -> Self {

        let mut code = CodeBuffer::new(capacity);
        let exit = code.cursor();
        {
            let mut emitter = ThreadedEmitter::new(&mut code);
            for (guest, host) in PINNED_REGISTERS {
                emitter.emit(HostOp::StoreState { rt: host, field: StateField::Gpr(guest as u8) });
            }
            emitter.emit(HostOp::Return);
        }
        code.reserve_trampolines();

        TranslatorContext {
            code,
            cache: BlockCache::new(),
            jump_table: JumpHashTable::new(),
            patches: PatchSiteList::new(),
            tracker: ConstTracker::new(),
            exit,
        }
    }

    /// Throws every compiled block away: code buffer, index, hash table and
    /// pending links go together.
    pub fn reset(&mut self) {
        info!(
            "flushing code buffer ({} of {} ops used, {} blocks)",
            self.code.len(), self.code.capacity(), self.cache.len()
        );
        self.code.reset();
        self.cache.clear();
        self.jump_table.clear();
        self.patches.clear();
    }

    pub fn cache(&self) -> &BlockCache {
        &self.cache
    }

    pub fn code(&self) -> &CodeBuffer {
        &self.code
    }
}
