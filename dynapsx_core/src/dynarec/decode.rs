// SPDX-License-Identifier: GPL-3.0
// decode.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use dynapsx_utility::InstructionFields;

/// A set of guest registers, one bit per register. Bit 0 is never set.
pub type RegSet = u32;

/// Every register but r0.
pub const ALL_REGISTERS: RegSet = 0xFFFF_FFFE;

/// Builds a set holding one register (empty for r0).
#[inline(always)]
pub fn reg_bit(reg: usize) -> RegSet {
    (1u32 << (reg & 31)) & ALL_REGISTERS
}

/// Three-register ALU operations (SPECIAL funct group).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AluKind {
    Add,
    Addu,
    Sub,
    Subu,
    And,
    Or,
    Xor,
    Nor,
    Slt,
    Sltu,
}

/// Immediate ALU operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ImmKind {
    Addi,
    Addiu,
    Slti,
    Sltiu,
    Andi,
    Ori,
    Xori,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShiftKind {
    Sll,
    Srl,
    Sra,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MulDivKind {
    Mult,
    Multu,
    Div,
    Divu,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BranchKind {
    Beq,
    Bne,
    Blez,
    Bgtz,
    Bltz,
    Bgez,
    Bltzal,
    Bgezal,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoadKind {
    Lb,
    Lbu,
    Lh,
    Lhu,
    Lw,
    Lwl,
    Lwr,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Sb,
    Sh,
    Sw,
    Swl,
    Swr,
}

/// A decoded R3000A instruction. Register fields are guest register numbers,
/// offsets are already sign-extended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    Shift { kind: ShiftKind, rd: usize, rt: usize, shamt: u32 },
    ShiftVariable { kind: ShiftKind, rd: usize, rt: usize, rs: usize },
    Alu { kind: AluKind, rd: usize, rs: usize, rt: usize },
    Imm { kind: ImmKind, rt: usize, rs: usize, imm: u16 },
    Lui { rt: usize, imm: u16 },
    MoveFromHi { rd: usize },
    MoveToHi { rs: usize },
    MoveFromLo { rd: usize },
    MoveToLo { rs: usize },
    MulDiv { kind: MulDivKind, rs: usize, rt: usize },
    Jump { target: u32, link: bool },
    JumpRegister { rs: usize, link_rd: Option<usize> },
    Branch { kind: BranchKind, rs: usize, rt: usize, offset: u32 },
    Syscall,
    Break,
    MoveFromCop0 { rt: usize, rd: usize },
    MoveToCop0 { rt: usize, rd: usize },
    ReturnFromException,
    MoveFromCop2 { rt: usize, rd: usize },
    MoveControlFromCop2 { rt: usize, rd: usize },
    MoveToCop2 { rt: usize, rd: usize },
    MoveControlToCop2 { rt: usize, rd: usize },
    Cop2Command { command: u32 },
    CopUnusable { cop: u32 },
    Load { kind: LoadKind, rt: usize, base: usize, offset: u32 },
    Store { kind: StoreKind, rt: usize, base: usize, offset: u32 },
    LoadCop2 { rt: usize, base: usize, offset: u32 },
    StoreCop2 { rt: usize, base: usize, offset: u32 },
    Unknown { word: u32 },
}

/// Decodes one instruction word.
pub fn decode(word: u32) -> Instruction {

    let rs = word.rs();
    let rt = word.rt();
    let rd = word.rd();

    match word.opcode() {
        0x00 => decode_special(word),
        0x01 => {
            // BLTZ/BGEZ are selected by bit 16, linking by bits 20..17 == 0x8.
            let link = rt & 0x1E == 0x10;
            let kind = match (rt & 1 != 0, link) {
                (false, false) => BranchKind::Bltz,
                (true, false) => BranchKind::Bgez,
                (false, true) => BranchKind::Bltzal,
                (true, true) => BranchKind::Bgezal,
            };
            Instruction::Branch { kind, rs, rt: 0, offset: word.simm16() }
        },
        0x02 => Instruction::Jump { target: word.jump_target(), link: false },
        0x03 => Instruction::Jump { target: word.jump_target(), link: true },
        0x04 => Instruction::Branch { kind: BranchKind::Beq, rs, rt, offset: word.simm16() },
        0x05 => Instruction::Branch { kind: BranchKind::Bne, rs, rt, offset: word.simm16() },
        0x06 => Instruction::Branch { kind: BranchKind::Blez, rs, rt: 0, offset: word.simm16() },
        0x07 => Instruction::Branch { kind: BranchKind::Bgtz, rs, rt: 0, offset: word.simm16() },
        0x08 => Instruction::Imm { kind: ImmKind::Addi, rt, rs, imm: word.imm16() },
        0x09 => Instruction::Imm { kind: ImmKind::Addiu, rt, rs, imm: word.imm16() },
        0x0A => Instruction::Imm { kind: ImmKind::Slti, rt, rs, imm: word.imm16() },
        0x0B => Instruction::Imm { kind: ImmKind::Sltiu, rt, rs, imm: word.imm16() },
        0x0C => Instruction::Imm { kind: ImmKind::Andi, rt, rs, imm: word.imm16() },
        0x0D => Instruction::Imm { kind: ImmKind::Ori, rt, rs, imm: word.imm16() },
        0x0E => Instruction::Imm { kind: ImmKind::Xori, rt, rs, imm: word.imm16() },
        0x0F => Instruction::Lui { rt, imm: word.imm16() },
        0x10 => match rs {
            0x00 => Instruction::MoveFromCop0 { rt, rd },
            0x04 => Instruction::MoveToCop0 { rt, rd },
            0x10 if word.funct() == 0x10 => Instruction::ReturnFromException,
            _ => Instruction::Unknown { word },
        },
        0x12 => match rs {
            0x00 => Instruction::MoveFromCop2 { rt, rd },
            0x02 => Instruction::MoveControlFromCop2 { rt, rd },
            0x04 => Instruction::MoveToCop2 { rt, rd },
            0x06 => Instruction::MoveControlToCop2 { rt, rd },
            r if r & 0x10 != 0 => Instruction::Cop2Command { command: word & 0x01FF_FFFF },
            _ => Instruction::Unknown { word },
        },
        op @ (0x11 | 0x13) => Instruction::CopUnusable { cop: op & 3 },
        0x20 => Instruction::Load { kind: LoadKind::Lb, rt, base: rs, offset: word.simm16() },
        0x21 => Instruction::Load { kind: LoadKind::Lh, rt, base: rs, offset: word.simm16() },
        0x22 => Instruction::Load { kind: LoadKind::Lwl, rt, base: rs, offset: word.simm16() },
        0x23 => Instruction::Load { kind: LoadKind::Lw, rt, base: rs, offset: word.simm16() },
        0x24 => Instruction::Load { kind: LoadKind::Lbu, rt, base: rs, offset: word.simm16() },
        0x25 => Instruction::Load { kind: LoadKind::Lhu, rt, base: rs, offset: word.simm16() },
        0x26 => Instruction::Load { kind: LoadKind::Lwr, rt, base: rs, offset: word.simm16() },
        0x28 => Instruction::Store { kind: StoreKind::Sb, rt, base: rs, offset: word.simm16() },
        0x29 => Instruction::Store { kind: StoreKind::Sh, rt, base: rs, offset: word.simm16() },
        0x2A => Instruction::Store { kind: StoreKind::Swl, rt, base: rs, offset: word.simm16() },
        0x2B => Instruction::Store { kind: StoreKind::Sw, rt, base: rs, offset: word.simm16() },
        0x2E => Instruction::Store { kind: StoreKind::Swr, rt, base: rs, offset: word.simm16() },
        0x32 => Instruction::LoadCop2 { rt, base: rs, offset: word.simm16() },
        0x3A => Instruction::StoreCop2 { rt, base: rs, offset: word.simm16() },
        op @ (0x30 | 0x31 | 0x33 | 0x38 | 0x39 | 0x3B) => Instruction::CopUnusable { cop: op & 3 },
        _ => Instruction::Unknown { word },
    }
}

/// Decodes the SPECIAL (opcode 0) group.
fn decode_special(word: u32) -> Instruction {

    let rs = word.rs();
    let rt = word.rt();
    let rd = word.rd();

    match word.funct() {
        0x00 => Instruction::Shift { kind: ShiftKind::Sll, rd, rt, shamt: word.shamt() },
        0x02 => Instruction::Shift { kind: ShiftKind::Srl, rd, rt, shamt: word.shamt() },
        0x03 => Instruction::Shift { kind: ShiftKind::Sra, rd, rt, shamt: word.shamt() },
        0x04 => Instruction::ShiftVariable { kind: ShiftKind::Sll, rd, rt, rs },
        0x06 => Instruction::ShiftVariable { kind: ShiftKind::Srl, rd, rt, rs },
        0x07 => Instruction::ShiftVariable { kind: ShiftKind::Sra, rd, rt, rs },
        0x08 => Instruction::JumpRegister { rs, link_rd: None },
        0x09 => Instruction::JumpRegister { rs, link_rd: Some(rd) },
        0x0C => Instruction::Syscall,
        0x0D => Instruction::Break,
        0x10 => Instruction::MoveFromHi { rd },
        0x11 => Instruction::MoveToHi { rs },
        0x12 => Instruction::MoveFromLo { rd },
        0x13 => Instruction::MoveToLo { rs },
        0x18 => Instruction::MulDiv { kind: MulDivKind::Mult, rs, rt },
        0x19 => Instruction::MulDiv { kind: MulDivKind::Multu, rs, rt },
        0x1A => Instruction::MulDiv { kind: MulDivKind::Div, rs, rt },
        0x1B => Instruction::MulDiv { kind: MulDivKind::Divu, rs, rt },
        0x20 => Instruction::Alu { kind: AluKind::Add, rd, rs, rt },
        0x21 => Instruction::Alu { kind: AluKind::Addu, rd, rs, rt },
        0x22 => Instruction::Alu { kind: AluKind::Sub, rd, rs, rt },
        0x23 => Instruction::Alu { kind: AluKind::Subu, rd, rs, rt },
        0x24 => Instruction::Alu { kind: AluKind::And, rd, rs, rt },
        0x25 => Instruction::Alu { kind: AluKind::Or, rd, rs, rt },
        0x26 => Instruction::Alu { kind: AluKind::Xor, rd, rs, rt },
        0x27 => Instruction::Alu { kind: AluKind::Nor, rd, rs, rt },
        0x2A => Instruction::Alu { kind: AluKind::Slt, rd, rs, rt },
        0x2B => Instruction::Alu { kind: AluKind::Sltu, rd, rs, rt },
        _ => Instruction::Unknown { word },
    }
}

impl Instruction {

    /// General purpose registers this instruction reads.
    pub fn reads(&self) -> RegSet {
        match *self {
            Instruction::Shift { rt, .. } => reg_bit(rt),
            Instruction::ShiftVariable { rt, rs, .. } => reg_bit(rt) | reg_bit(rs),
            Instruction::Alu { rs, rt, .. } => reg_bit(rs) | reg_bit(rt),
            Instruction::Imm { rs, .. } => reg_bit(rs),
            Instruction::MoveToHi { rs } | Instruction::MoveToLo { rs } => reg_bit(rs),
            Instruction::MulDiv { rs, rt, .. } => reg_bit(rs) | reg_bit(rt),
            Instruction::JumpRegister { rs, .. } => reg_bit(rs),
            Instruction::Branch { rs, rt, .. } => reg_bit(rs) | reg_bit(rt),
            Instruction::MoveToCop0 { rt, .. }
            | Instruction::MoveToCop2 { rt, .. }
            | Instruction::MoveControlToCop2 { rt, .. } => reg_bit(rt),
            Instruction::Load { kind: LoadKind::Lwl | LoadKind::Lwr, rt, base, .. } => reg_bit(rt) | reg_bit(base),
            Instruction::Load { base, .. } => reg_bit(base),
            Instruction::Store { rt, base, .. } => reg_bit(rt) | reg_bit(base),
            Instruction::LoadCop2 { base, .. } | Instruction::StoreCop2 { base, .. } => reg_bit(base),
            _ => 0,
        }
    }

    /// General purpose registers this instruction writes.
    pub fn writes(&self) -> RegSet {
        match *self {
            Instruction::Shift { rd, .. }
            | Instruction::ShiftVariable { rd, .. }
            | Instruction::Alu { rd, .. }
            | Instruction::MoveFromHi { rd }
            | Instruction::MoveFromLo { rd } => reg_bit(rd),
            Instruction::Imm { rt, .. } | Instruction::Lui { rt, .. } => reg_bit(rt),
            Instruction::Jump { link: true, .. } => reg_bit(31),
            Instruction::JumpRegister { link_rd: Some(rd), .. } => reg_bit(rd),
            Instruction::Branch { kind: BranchKind::Bltzal | BranchKind::Bgezal, .. } => reg_bit(31),
            Instruction::MoveFromCop0 { rt, .. }
            | Instruction::MoveFromCop2 { rt, .. }
            | Instruction::MoveControlFromCop2 { rt, .. } => reg_bit(rt),
            Instruction::Load { rt, .. } => reg_bit(rt),
            _ => 0,
        }
    }

    /// The destination of a general purpose register load (load delay applies).
    pub fn load_target(&self) -> Option<usize> {
        match *self {
            Instruction::Load { rt, .. } if rt != 0 => Some(rt),
            _ => None,
        }
    }

    pub fn is_load(&self) -> bool {
        matches!(self, Instruction::Load { .. })
    }

    pub fn is_store(&self) -> bool {
        matches!(self, Instruction::Store { .. } | Instruction::StoreCop2 { .. })
    }

    /// Branches and jumps, all of which have a delay slot.
    pub fn is_control_transfer(&self) -> bool {
        matches!(self, Instruction::Jump { .. } | Instruction::JumpRegister { .. } | Instruction::Branch { .. })
    }

    /// Conditional branches, the only transfers a block may continue past.
    pub fn is_conditional_branch(&self) -> bool {
        matches!(self, Instruction::Branch { .. })
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, Instruction::Syscall | Instruction::Break)
    }

    /// True when the instruction may raise a guest exception, which makes the
    /// whole register file observable at that point.
    pub fn can_fault(&self) -> bool {
        matches!(
            self,
            Instruction::Alu { kind: AluKind::Add | AluKind::Sub, .. }
                | Instruction::Imm { kind: ImmKind::Addi, .. }
                | Instruction::Load { .. }
                | Instruction::Store { .. }
                | Instruction::LoadCop2 { .. }
                | Instruction::StoreCop2 { .. }
                | Instruction::Syscall
                | Instruction::Break
                | Instruction::CopUnusable { .. }
        ) || self.is_coprocessor_access()
    }

    /// A register-to-register or immediate computation with no effect beyond
    /// its destination register, which can be omitted when that register is dead.
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            Instruction::Shift { .. }
                | Instruction::ShiftVariable { .. }
                | Instruction::Alu { kind: AluKind::Addu | AluKind::Subu | AluKind::And | AluKind::Or
                    | AluKind::Xor | AluKind::Nor | AluKind::Slt | AluKind::Sltu, .. }
                | Instruction::Imm { kind: ImmKind::Addiu | ImmKind::Slti | ImmKind::Sltiu | ImmKind::Andi
                    | ImmKind::Ori | ImmKind::Xori, .. }
                | Instruction::Lui { .. }
                | Instruction::MoveFromHi { .. }
                | Instruction::MoveFromLo { .. }
        )
    }

    /// Coprocessor 0/2 transfers and GTE commands.
    pub fn is_coprocessor_access(&self) -> bool {
        matches!(
            self,
            Instruction::MoveFromCop0 { .. }
                | Instruction::MoveToCop0 { .. }
                | Instruction::ReturnFromException
                | Instruction::MoveFromCop2 { .. }
                | Instruction::MoveControlFromCop2 { .. }
                | Instruction::MoveToCop2 { .. }
                | Instruction::MoveControlToCop2 { .. }
                | Instruction::Cop2Command { .. }
                | Instruction::LoadCop2 { .. }
                | Instruction::StoreCop2 { .. }
        )
    }

    /// Instructions that read a GTE result and so wait for a running command.
    pub fn reads_gte(&self) -> bool {
        matches!(
            self,
            Instruction::MoveFromCop2 { .. } | Instruction::MoveControlFromCop2 { .. } | Instruction::StoreCop2 { .. }
        )
    }

    /// Instructions that use HI/LO, which the loop analysis does not track.
    pub fn uses_hi_lo(&self) -> bool {
        matches!(
            self,
            Instruction::MulDiv { .. }
                | Instruction::MoveFromHi { .. }
                | Instruction::MoveToHi { .. }
                | Instruction::MoveFromLo { .. }
                | Instruction::MoveToLo { .. }
        )
    }

    /// The branch target of a direct control transfer at `pc`.
    pub fn static_target(&self, pc: u32) -> Option<u32> {
        match *self {
            Instruction::Jump { target, .. } => Some((pc.wrapping_add(4) & 0xF000_0000) | (target << 2)),
            Instruction::Branch { offset, .. } => Some(pc.wrapping_add(4).wrapping_add(offset << 2)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn decode_should_recognise_common_instructions() {

        // addiu r1, r1, 1
        assert_eq!(decode(0x2421_0001), Instruction::Imm { kind: ImmKind::Addiu, rt: 1, rs: 1, imm: 1 });

        // lw r2, -4(r3)
        assert_eq!(
            decode(0x8C62_FFFC),
            Instruction::Load { kind: LoadKind::Lw, rt: 2, base: 3, offset: 0xFFFF_FFFC }
        );

        // jr ra
        assert_eq!(decode(0x03E0_0008), Instruction::JumpRegister { rs: 31, link_rd: None });

        // bgezal r4, +2
        assert_eq!(
            decode(0x0491_0002),
            Instruction::Branch { kind: BranchKind::Bgezal, rs: 4, rt: 0, offset: 2 }
        );

        // rfe
        assert_eq!(decode(0x4200_0010), Instruction::ReturnFromException);

        // lwc1 is unusable on this machine
        assert_eq!(decode(0xC400_0000), Instruction::CopUnusable { cop: 1 });
    }

    #[test]
    fn register_sets_should_exclude_r0() {

        let addu = decode(0x0000_0821); // addu r1, r0, r0
        assert_eq!(addu.reads(), 0);
        assert_eq!(addu.writes(), reg_bit(1));

        let lwl = decode(0x8862_0000); // lwl r2, 0(r3)
        assert_eq!(lwl.reads(), reg_bit(2) | reg_bit(3));
        assert_eq!(lwl.load_target(), Some(2));
    }

    #[test]
    fn static_target_should_follow_segment_and_offset() {

        let j = decode(0x0800_0040); // j 0x100
        assert_eq!(j.static_target(0x8001_0000), Some(0x8000_0100));

        let b = decode(0x1000_FFFF); // b -1
        assert_eq!(b.static_target(0x8001_0000), Some(0x8001_0000));
    }
}
