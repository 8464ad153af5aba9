// SPDX-License-Identifier: GPL-3.0
// tests.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use super::{CP2, Gte};

// Tests for the CP2 / Geometry Transformation Engine register file.

#[test]
fn read_control_reg_should_work() {

    let mut cp2 = CP2::new();
    for i in [25, 31] {
        cp2.control_registers[i] = 0x8000;
        let output = cp2.read_control_reg(i);
        assert_eq!(output, 0x8000);
    }

    for i in 26..=30 {
        cp2.control_registers[i] = 0x8000;
        let output = cp2.read_control_reg(i);
        assert_eq!(output, 0xFFFF8000);

        cp2.control_registers[i] = 0x7000;
        let output = cp2.read_control_reg(i);
        assert_eq!(output, 0x7000);
    }
}

#[test]
fn read_data_reg_should_work() {

    let mut cp2 = CP2::new();
    for i in [1, 3, 5, 8, 9, 10, 11] {
        cp2.data_registers[i] = 0x8000;
        let output = cp2.read_data_reg(i);
        assert_eq!(output, 0xFFFF8000);

        cp2.data_registers[i] = 0x7000;
        let output = cp2.read_data_reg(i);
        assert_eq!(output, 0x7000);
    }

    for i in [23, 28] {
        cp2.data_registers[i] = 1;
        let output = cp2.read_data_reg(i);
        assert_eq!(output, 0);
    }

    cp2.data_registers[29] = 123;
    cp2.data_registers[11] = 0xF80;
    cp2.data_registers[10] = 0xF80;
    cp2.data_registers[9] = 0xF80;
    let output = cp2.read_data_reg(29);
    assert_eq!(output, 0x7FFF);

    cp2.data_registers[30] = 0xFFFE7FFF;
    let output = cp2.read_data_reg(31);
    assert_eq!(output, 15);

    cp2.data_registers[30] = 0x7FFF;
    let output = cp2.read_data_reg(31);
    assert_eq!(output, 17);

    cp2.data_registers[2] = 0x8000;
    let output = cp2.read_data_reg(2);
    assert_eq!(output, 0x8000);
}

#[test]
fn write_control_reg_should_work() {

    let mut cp2 = CP2::new();
    for i in 0..32 {
        cp2.write_control_reg(i, 0x8000);
        let output = cp2.control_registers[i];
        assert_eq!(output, 0x8000);
    }
}

#[test]
fn writing_sxyp_should_push_the_screen_fifo() {

    let mut cp2 = CP2::new();
    cp2.write_data_reg(14, 1);
    cp2.write_data_reg(15, 2);
    cp2.write_data_reg(15, 3);

    assert_eq!(cp2.data_registers[12], 1);
    assert_eq!(cp2.data_registers[13], 2);
    assert_eq!(cp2.data_registers[14], 3);
    assert_eq!(cp2.read_data_reg(15), 3);
}

#[test]
fn writing_irgb_should_expand_into_ir_registers() {

    let mut cp2 = CP2::new();
    cp2.write_data_reg(28, 0x7FFF);

    assert_eq!(cp2.data_registers[9], 0xF80);
    assert_eq!(cp2.data_registers[10], 0xF80);
    assert_eq!(cp2.data_registers[11], 0xF80);
    assert_eq!(cp2.read_data_reg(29), 0x7FFF);
}

#[test]
fn execute_should_clear_flag_register() {

    let mut cp2 = CP2::new();
    cp2.write_control(31, 0x8000_0000);
    cp2.execute(0x0018_0001);

    assert_eq!(cp2.read_control(31), 0);
}
