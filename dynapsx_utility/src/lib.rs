// SPDX-License-Identifier: GPL-3.0
// lib.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

// This crate contains useful utility functions that can be used throughout the codebase.

/// Exists to allow us to define custom trait operations on `u32`.
type CustomWord = u32;

/// Exists to allow us to define custom trait operations on `i32`.
type CustomInt32 = i32;

/// This trait exists to allow us to implement `logical_rshift` and `sign_extend`
/// in the same way across the integer widths used by the guest CPU.
pub trait CustomInteger {

    type Output;

    /// This function should return a value logically right-shifted by the
    /// specified amount and of the same width as the original, without sign-extension.
    fn logical_rshift(self, shift_by: u32) -> Self::Output;

    /// This function should return sign-extended version of the original value, based
    /// on extension from the n-th most significant bit as specified. It can be used
    /// for arbitrary widths within the type (for example 16-bit values).
    fn sign_extend(self, from_bit: u32) -> Self::Output;
}

impl CustomInteger for CustomWord {

    type Output = u32;

    /// Logically shifts right by specified amount, returning `u32`.
    #[inline(always)]
    fn logical_rshift(self, shift_by: u32) -> Self::Output {
        self >> shift_by
    }

    /// Sign extends based on the specified bit, with 31 being most significant and
    /// 0 being least significant.
    #[inline(always)]
    fn sign_extend(self, from_bit: u32) -> Self::Output {

        let bit_pattern_to_test = 0x1_u32 << from_bit;
        let extension_pattern = 0xFFFFFFFE_u32 << from_bit;

        if self & bit_pattern_to_test == 0 {
            self & !extension_pattern
        } else {
            self | extension_pattern
        }
    }
}

impl CustomInteger for CustomInt32 {

    type Output = i32;

    /// Logically shifts right by specified amount, returning `i32`.
    #[inline(always)]
    fn logical_rshift(self, shift_by: u32) -> Self::Output {
        ((self as u32) >> shift_by) as Self::Output
    }

    /// Sign extends based on the specified bit, with 31 being most significant and
    /// 0 being least significant.
    #[inline(always)]
    fn sign_extend(self, from_bit: u32) -> Self::Output {
        (self as u32).sign_extend(from_bit) as Self::Output
    }
}

/// This trait extracts the standard MIPS-I encoding fields from a raw
/// instruction word. Register fields are returned as `usize` so they can
/// index register files directly.
pub trait InstructionFields {

    /// Primary opcode, bits 31..26.
    fn opcode(self) -> u32;

    /// Source register, bits 25..21.
    fn rs(self) -> usize;

    /// Target register, bits 20..16.
    fn rt(self) -> usize;

    /// Destination register, bits 15..11.
    fn rd(self) -> usize;

    /// Shift amount, bits 10..6.
    fn shamt(self) -> u32;

    /// Function field for SPECIAL instructions, bits 5..0.
    fn funct(self) -> u32;

    /// Raw 16-bit immediate.
    fn imm16(self) -> u16;

    /// Sign-extended 16-bit immediate.
    fn simm16(self) -> u32;

    /// 26-bit jump target field.
    fn jump_target(self) -> u32;
}

impl InstructionFields for CustomWord {

    #[inline(always)]
    fn opcode(self) -> u32 {
        self.logical_rshift(26)
    }

    #[inline(always)]
    fn rs(self) -> usize {
        (self.logical_rshift(21) & 0x1F) as usize
    }

    #[inline(always)]
    fn rt(self) -> usize {
        (self.logical_rshift(16) & 0x1F) as usize
    }

    #[inline(always)]
    fn rd(self) -> usize {
        (self.logical_rshift(11) & 0x1F) as usize
    }

    #[inline(always)]
    fn shamt(self) -> u32 {
        self.logical_rshift(6) & 0x1F
    }

    #[inline(always)]
    fn funct(self) -> u32 {
        self & 0x3F
    }

    #[inline(always)]
    fn imm16(self) -> u16 {
        (self & 0xFFFF) as u16
    }

    #[inline(always)]
    fn simm16(self) -> u32 {
        (self & 0xFFFF).sign_extend(15)
    }

    #[inline(always)]
    fn jump_target(self) -> u32 {
        self & 0x03FFFFFF
    }
}

#[cfg(test)]
mod tests {

    use super::{CustomInteger, InstructionFields};

    #[test]
    fn logical_rshift_should_work_as_expected_for_i32() {

        let input = 0xFFFFFFFF_u32 as i32;
        let output = input.logical_rshift(1);

        assert_eq!(output, 0x7FFFFFFF);
    }

    #[test]
    fn logical_rshift_should_work_as_expected_for_u32() {

        let input = 0x80000000_u32;
        let output = input.logical_rshift(31);

        assert_eq!(output, 1);
    }

    #[test]
    fn sign_extend_should_extend_8_bit_value_if_bit_7_is_set() {

        let input = 0x80_u32;
        let output = input.sign_extend(7);

        assert_eq!(output, 0xFFFFFF80);
    }

    #[test]
    fn sign_extend_should_leave_8_bit_value_if_bit_7_is_unset() {

        let input = 0x70_u32;
        let output = input.sign_extend(7);

        assert_eq!(output, 0x70);
    }

    #[test]
    fn sign_extend_should_clear_bits_above_a_clear_sign_bit() {

        // Given garbage above the 16-bit field and a clear sign bit,
        let input = 0xABCD7000_u32;

        // extension should yield only the low half.
        let output = input.sign_extend(15);

        assert_eq!(output, 0x7000);
    }

    #[test]
    fn sign_extend_should_extend_16_bit_value_if_bit_15_is_set_for_i32() {

        let input = 0x8000_i32;
        let output = input.sign_extend(15);

        assert_eq!(output, 0xFFFF8000_u32 as i32);
    }

    #[test]
    fn instruction_fields_should_decode_r_type_layout() {

        // Given ADDU r3, r1, r2 (0x00221821),
        let word = 0x00221821_u32;

        // each field should land in the right place.
        assert_eq!(word.opcode(), 0);
        assert_eq!(word.rs(), 1);
        assert_eq!(word.rt(), 2);
        assert_eq!(word.rd(), 3);
        assert_eq!(word.shamt(), 0);
        assert_eq!(word.funct(), 0x21);
    }

    #[test]
    fn instruction_fields_should_sign_extend_negative_immediates() {

        // Given ADDIU r2, r1, -1,
        let word = 0x2422FFFF_u32;

        assert_eq!(word.opcode(), 0x09);
        assert_eq!(word.imm16(), 0xFFFF);
        assert_eq!(word.simm16(), 0xFFFFFFFF);
    }

    #[test]
    fn instruction_fields_should_extract_jump_target() {

        // Given JAL 0x80010000,
        let word = 0x0C004000_u32;

        assert_eq!(word.opcode(), 0x03);
        assert_eq!(word.jump_target() << 2, 0x00010000);
    }
}
