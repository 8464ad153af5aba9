// SPDX-License-Identifier: GPL-3.0
// host.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

// The virtual host instruction set translated blocks are expressed in. It is
// a small 32-register load/store machine with MIPS register naming, plus a few
// compound operations (guarded RAM access, helper calls, indirect dispatch)
// that a native backend would expand into short instruction sequences.

use super::code_buffer::CodeAddr;
use crate::cpu::r3051::mips_exception::MIPSExceptionReason;

/// Number of host registers.
pub const HOST_REGISTER_COUNT: usize = 32;

/// A host register.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct HostReg(pub u8);

impl HostReg {
    pub const ZERO: HostReg = HostReg(0);
    pub const AT: HostReg = HostReg(1);
    pub const V0: HostReg = HostReg(2);
    pub const V1: HostReg = HostReg(3);
    pub const A0: HostReg = HostReg(4);
    pub const A1: HostReg = HostReg(5);
    pub const A2: HostReg = HostReg(6);
    pub const A3: HostReg = HostReg(7);
    pub const T0: HostReg = HostReg(8);
    pub const T1: HostReg = HostReg(9);
    pub const T2: HostReg = HostReg(10);
    pub const T3: HostReg = HostReg(11);
    pub const T4: HostReg = HostReg(12);
    pub const T5: HostReg = HostReg(13);
    pub const S0: HostReg = HostReg(16);

    /// Branch condition, or the target of a register jump.
    pub const COND: HostReg = HostReg(17);

    /// Remaining cycle budget, signed.
    pub const CYC: HostReg = HostReg(18);

    /// Physical address mask, 0x1FFFFFFF.
    pub const MASK: HostReg = HostReg(19);

    pub const S4: HostReg = HostReg(20);
    pub const S5: HostReg = HostReg(21);
    pub const S6: HostReg = HostReg(22);
    pub const S7: HostReg = HostReg(23);

    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize & (HOST_REGISTER_COUNT - 1)
    }
}

/// Guest registers held in host registers for the whole life of a block,
/// paired with their host register: sp, ra, v0 and fp.
pub const PINNED_REGISTERS: [(usize, HostReg); 4] = [
    (29, HostReg::S4),
    (31, HostReg::S5),
    (2, HostReg::S6),
    (30, HostReg::S7),
];

/// Returns the host register a guest register is pinned to, if any.
#[inline(always)]
pub fn pinned_host_reg(guest: usize) -> Option<HostReg> {
    match guest {
        29 => Some(HostReg::S4),
        31 => Some(HostReg::S5),
        2 => Some(HostReg::S6),
        30 => Some(HostReg::S7),
        _ => None,
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AluOp {
    Addu,
    Subu,
    And,
    Or,
    Xor,
    Nor,
    Slt,
    Sltu,
}

/// Immediate forms. `Addiu`, `Slti` and `Sltiu` sign-extend the immediate,
/// the logical ones zero-extend it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AluImmOp {
    Addiu,
    Slti,
    Sltiu,
    Andi,
    Ori,
    Xori,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShiftOp {
    Sll,
    Srl,
    Sra,
}

/// Branch conditions. The single-operand forms compare `lhs` against zero.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BranchCond {
    Eq,
    Ne,
    Ltz,
    Gez,
    Gtz,
    Lez,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemWidth {
    Byte,
    Half,
    Word,
}

impl MemWidth {
    pub fn bytes(self) -> u32 {
        match self {
            MemWidth::Byte => 1,
            MemWidth::Half => 2,
            MemWidth::Word => 4,
        }
    }
}

/// Hardware registers with an inline fast path.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IoRegister {
    InterruptStatus,
    InterruptMask,
    GpuStatus,
}

/// Fields of the guest CPU state reachable from translated code.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StateField {
    Gpr(u8),
    Hi,
    Lo,
    Pc,
    CurrentPc,
    Cop0(u8),
    LoadDelayReg,
    LoadDelayValue,
    Aborted,
}

/// Host helper routines. Arguments travel in A0 and A1, results come back in V0.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Helper {
    BusRead { width: MemWidth, signed: bool },
    BusWrite { width: MemWidth },
    LoadMerge { left: bool },
    StoreMerge { left: bool },
    Divide { signed: bool },
    Exception { reason: MIPSExceptionReason, coprocessor: u32 },
    ReadCop0 { reg: u8 },
    WriteCop0 { reg: u8 },
    ReturnFromException,
    GteRead { control: bool, reg: u8 },
    GteWrite { control: bool, reg: u8 },
    GteCommand { command: u32 },
}

impl Helper {

    /// True for helpers that can raise a guest exception or depend on the
    /// full register file, and so need the full calling convention.
    pub fn needs_full_call(self) -> bool {
        matches!(self, Helper::Exception { .. } | Helper::WriteCop0 { .. } | Helper::ReturnFromException)
    }
}

/// The guest instruction a helper call was emitted for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CallSite {
    pub guest_pc: u32,
    pub delay_slot: bool,
}

/// One host instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HostOp {
    Lui { rt: HostReg, imm: u16 },
    AluImm { op: AluImmOp, rt: HostReg, rs: HostReg, imm: u16 },
    Alu { op: AluOp, rd: HostReg, rs: HostReg, rt: HostReg },
    Shift { op: ShiftOp, rd: HostReg, rt: HostReg, shamt: u8 },
    ShiftVar { op: ShiftOp, rd: HostReg, rt: HostReg, rs: HostReg },
    MulWide { signed: bool, hi: HostReg, lo: HostReg, lhs: HostReg, rhs: HostReg },
    LoadState { rt: HostReg, field: StateField },
    StoreState { rt: HostReg, field: StateField },

    /// Access to main RAM; `addr` holds a physical address below the mirror end.
    RamLoad { rt: HostReg, addr: HostReg, width: MemWidth, signed: bool },
    RamStore { rt: HostReg, addr: HostReg, width: MemWidth },
    ScratchLoad { rt: HostReg, addr: HostReg, width: MemWidth, signed: bool },
    ScratchStore { rt: HostReg, addr: HostReg, width: MemWidth },

    /// Unaligned LWL/LWR and SWL/SWR against RAM.
    RamLoadMerge { rt: HostReg, addr: HostReg, left: bool },
    RamStoreMerge { rt: HostReg, addr: HostReg, left: bool },

    IoLoad { rt: HostReg, reg: IoRegister },
    IoStore { rt: HostReg, reg: IoRegister },

    Branch { cond: BranchCond, lhs: HostReg, rhs: HostReg, target: CodeAddr },
    Jump { target: CodeAddr },

    /// Looks the guest PC in `key` up in the jump hash table and enters the
    /// block found, or continues at `miss`.
    JumpIndirect { key: HostReg, miss: CodeAddr },

    /// Continues at `stale` when the RAM page's generation moved on.
    GuardPage { page: u16, generation: u32, stale: CodeAddr },

    Call { helper: Helper, site: CallSite },
    Return,
}

impl HostOp {

    /// Rewrites the code address this op transfers control to. Returns false
    /// for ops without one.
    pub fn retarget(&mut self, new_target: CodeAddr) -> bool {
        match self {
            HostOp::Branch { target, .. } | HostOp::Jump { target } => {
                *target = new_target;
                true
            },
            HostOp::JumpIndirect { miss, .. } => {
                *miss = new_target;
                true
            },
            HostOp::GuardPage { stale, .. } => {
                *stale = new_target;
                true
            },
            _ => false,
        }
    }
}
