// SPDX-License-Identifier: GPL-3.0
// emitter.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use super::code_buffer::{CodeAddr, CodeBuffer};
use super::host::{AluImmOp, BranchCond, HostOp, HostReg};
use crate::error::DynarecError;

/// A forward-referencable position in the block being emitted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Label(u32);

/// This trait is the only way the block compiler produces host code. A port to
/// another host architecture implements it (and an executor for its output);
/// the compiler itself does not change.
pub trait InstructionEmitter {

    /// Address of the next instruction.
    fn cursor(&self) -> CodeAddr;

    /// Writes one host instruction.
    fn emit(&mut self, op: HostOp) -> CodeAddr;

    /// Creates an unbound label.
    fn new_label(&mut self) -> Label;

    /// Binds a label to the current cursor.
    fn bind(&mut self, label: Label);

    /// Conditional branch to a label.
    fn branch_to(&mut self, cond: BranchCond, lhs: HostReg, rhs: HostReg, label: Label);

    /// Unconditional jump to a label.
    fn jump_to_label(&mut self, label: Label);

    /// Page generation guard that continues at `stale` on a mismatch.
    fn guard_page(&mut self, page: u16, generation: u32, stale: Label);

    /// Unconditional jump to a known address. The returned site can be patched
    /// later to point elsewhere.
    fn jump_to(&mut self, target: CodeAddr) -> CodeAddr;

    /// Materializes a 32-bit constant with the fewest instructions.
    fn load_imm32(&mut self, rt: HostReg, value: u32);

    /// True when the host can merge unaligned words inline (LWL/LWR/SWL/SWR).
    fn supports_unaligned_merge(&self) -> bool;

    /// Resolves every label reference. Fails if a referenced label was never bound.
    fn finish(&mut self, block_pc: u32) -> Result<(), DynarecError>;
}

/// Emits the virtual host ISA straight into a code buffer, one `HostOp` per
/// host instruction.
pub struct ThreadedEmitter<'a> {
    buffer: &'a mut CodeBuffer,
    labels: Vec<Option<CodeAddr>>,
    fixups: Vec<(CodeAddr, Label)>,
}

impl<'a> ThreadedEmitter<'a> {

    pub fn new(buffer: &'a mut CodeBuffer) -> Self {
        ThreadedEmitter {
            buffer,
            labels: Vec::new(),
            fixups: Vec::new(),
        }
    }

    /// Emits a control transfer towards a label, recording a fixup when the
    /// label is still unbound.
    fn emit_to_label(&mut self, mut op: HostOp, label: Label) {
        match self.labels.get(label.0 as usize).copied().flatten() {
            Some(target) => {
                op.retarget(target);
                self.buffer.push(op);
            },
            None => {
                let site = self.buffer.push(op);
                self.fixups.push((site, label));
            },
        }
    }
}

impl InstructionEmitter for ThreadedEmitter<'_> {

    fn cursor(&self) -> CodeAddr {
        self.buffer.cursor()
    }

    fn emit(&mut self, op: HostOp) -> CodeAddr {
        self.buffer.push(op)
    }

    fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    fn bind(&mut self, label: Label) {
        let cursor = self.buffer.cursor();
        if let Some(slot) = self.labels.get_mut(label.0 as usize) {
            *slot = Some(cursor);
        }
    }

    fn branch_to(&mut self, cond: BranchCond, lhs: HostReg, rhs: HostReg, label: Label) {
        self.emit_to_label(HostOp::Branch { cond, lhs, rhs, target: 0 }, label);
    }

    fn jump_to_label(&mut self, label: Label) {
        self.emit_to_label(HostOp::Jump { target: 0 }, label);
    }

    fn guard_page(&mut self, page: u16, generation: u32, stale: Label) {
        self.emit_to_label(HostOp::GuardPage { page, generation, stale: 0 }, stale);
    }

    fn jump_to(&mut self, target: CodeAddr) -> CodeAddr {
        self.buffer.push(HostOp::Jump { target })
    }

    fn load_imm32(&mut self, rt: HostReg, value: u32) {
        let signed = value as i32;
        if (-0x8000..0x8000).contains(&signed) {
            self.buffer.push(HostOp::AluImm { op: AluImmOp::Addiu, rt, rs: HostReg::ZERO, imm: value as u16 });
        } else if value <= 0xFFFF {
            self.buffer.push(HostOp::AluImm { op: AluImmOp::Ori, rt, rs: HostReg::ZERO, imm: value as u16 });
        } else {
            self.buffer.push(HostOp::Lui { rt, imm: (value >> 16) as u16 });
            if value & 0xFFFF != 0 {
                self.buffer.push(HostOp::AluImm { op: AluImmOp::Ori, rt, rs: rt, imm: value as u16 });
            }
        }
    }

    fn supports_unaligned_merge(&self) -> bool {
        true
    }

    fn finish(&mut self, block_pc: u32) -> Result<(), DynarecError> {
        for (site, label) in self.fixups.drain(..) {
            let target = self.labels.get(label.0 as usize).copied().flatten()
                .ok_or(DynarecError::UnboundLabel { pc: block_pc, label: label.0 })?;
            self.buffer.patch_target(site, target);
        }
        Ok(())
    }
}
