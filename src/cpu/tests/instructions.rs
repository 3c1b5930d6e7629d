//! Instruction set tests

use super::*;
use crate::cpu::Exception;

#[test]
fn test_mov_immediate_and_add() {
    let (mut cpu, mut bus) = rig();
    load(&mut bus, &[0x74, 0x05, 0x24, 0x03]); // MOV A,#5; ADD A,#3
    step_n(&mut cpu, &mut bus, 2);
    assert_eq!(acc(&bus), 8);
    assert_eq!(psw(&bus) & sfr::PSW_CY, 0);
}

#[test]
fn test_add_sets_carry_and_aux() {
    let (mut cpu, mut bus) = rig();
    load(&mut bus, &[0x74, 0xFF, 0x24, 0x01]); // MOV A,#0xFF; ADD A,#1
    step_n(&mut cpu, &mut bus, 2);
    assert_eq!(acc(&bus), 0);
    assert_ne!(psw(&bus) & sfr::PSW_CY, 0);
    assert_ne!(psw(&bus) & sfr::PSW_AC, 0);
    assert_eq!(psw(&bus) & sfr::PSW_OV, 0);
}

#[test]
fn test_add_signed_overflow() {
    let (mut cpu, mut bus) = rig();
    load(&mut bus, &[0x74, 0x7F, 0x24, 0x01]); // 127 + 1
    step_n(&mut cpu, &mut bus, 2);
    assert_eq!(acc(&bus), 0x80);
    assert_ne!(psw(&bus) & sfr::PSW_OV, 0);
    assert_eq!(psw(&bus) & sfr::PSW_CY, 0);
}

#[test]
fn test_addc_uses_carry() {
    let (mut cpu, mut bus) = rig();
    // SETB C; MOV A,#1; ADDC A,#1
    load(&mut bus, &[0xD3, 0x74, 0x01, 0x34, 0x01]);
    step_n(&mut cpu, &mut bus, 3);
    assert_eq!(acc(&bus), 3);
}

#[test]
fn test_subb_borrow() {
    let (mut cpu, mut bus) = rig();
    // CLR C; MOV A,#3; SUBB A,#5
    load(&mut bus, &[0xC3, 0x74, 0x03, 0x94, 0x05]);
    step_n(&mut cpu, &mut bus, 3);
    assert_eq!(acc(&bus), 0xFE);
    assert_ne!(psw(&bus) & sfr::PSW_CY, 0);
}

#[test]
fn test_mul_ab() {
    let (mut cpu, mut bus) = rig();
    // MOV A,#0x12; MOV B,#0x34; MUL AB
    load(&mut bus, &[0x74, 0x12, 0x75, sfr::REG_B, 0x34, 0xA4]);
    step_n(&mut cpu, &mut bus, 3);
    assert_eq!(acc(&bus), 0xA8);
    assert_eq!(bus.sfr[idx(sfr::REG_B)], 0x03);
    assert_ne!(psw(&bus) & sfr::PSW_OV, 0);
    assert_eq!(psw(&bus) & sfr::PSW_CY, 0);
    assert_eq!(cpu.tick_delay(), 4);
}

#[test]
fn test_div_ab() {
    let (mut cpu, mut bus) = rig();
    // MOV A,#100; MOV B,#7; DIV AB
    load(&mut bus, &[0x74, 100, 0x75, sfr::REG_B, 7, 0x84]);
    step_n(&mut cpu, &mut bus, 3);
    assert_eq!(acc(&bus), 14);
    assert_eq!(bus.sfr[idx(sfr::REG_B)], 2);
    assert_eq!(psw(&bus) & (sfr::PSW_CY | sfr::PSW_OV), 0);
}

#[test]
fn test_div_by_zero_sets_ov() {
    let (mut cpu, mut bus) = rig();
    load(&mut bus, &[0x74, 10, 0x75, sfr::REG_B, 0, 0x84]);
    step_n(&mut cpu, &mut bus, 3);
    assert_ne!(psw(&bus) & sfr::PSW_OV, 0);
}

#[test]
fn test_da_adjusts_bcd() {
    let (mut cpu, mut bus) = rig();
    // MOV A,#0x09; ADD A,#0x08; DA A -> BCD 17
    load(&mut bus, &[0x74, 0x09, 0x24, 0x08, 0xD4]);
    step_n(&mut cpu, &mut bus, 3);
    assert_eq!(acc(&bus), 0x17);
}

#[test]
fn test_logic_ops() {
    let (mut cpu, mut bus) = rig();
    // MOV A,#0xF0; ORL A,#0x0C; ANL A,#0xAF; XRL A,#0xFF
    load(&mut bus, &[0x74, 0xF0, 0x44, 0x0C, 0x54, 0xAF, 0x64, 0xFF]);
    step_n(&mut cpu, &mut bus, 4);
    // ((0xF0 | 0x0C) & 0xAF) ^ 0xFF
    assert_eq!(acc(&bus), !0xAC);
}

#[test]
fn test_rotates() {
    let (mut cpu, mut bus) = rig();
    // MOV A,#0x81; RL A -> 0x03; RRC A with C=1 from nothing..
    load(&mut bus, &[0x74, 0x81, 0x23]);
    step_n(&mut cpu, &mut bus, 2);
    assert_eq!(acc(&bus), 0x03);

    let (mut cpu, mut bus) = rig();
    // CLR C; MOV A,#0x01; RRC A -> A=0, C=1
    load(&mut bus, &[0xC3, 0x74, 0x01, 0x13]);
    step_n(&mut cpu, &mut bus, 3);
    assert_eq!(acc(&bus), 0x00);
    assert_ne!(psw(&bus) & sfr::PSW_CY, 0);
}

#[test]
fn test_swap() {
    let (mut cpu, mut bus) = rig();
    load(&mut bus, &[0x74, 0xA5, 0xC4]); // MOV A,#0xA5; SWAP A
    step_n(&mut cpu, &mut bus, 2);
    assert_eq!(acc(&bus), 0x5A);
}

#[test]
fn test_register_banks() {
    let (mut cpu, mut bus) = rig();
    // MOV R0,#0x11 in bank 0; switch to bank 1; MOV R0,#0x22
    load(
        &mut bus,
        &[0x78, 0x11, 0x75, sfr::REG_PSW, 0x08, 0x78, 0x22],
    );
    step_n(&mut cpu, &mut bus, 3);
    assert_eq!(bus.data[0x00], 0x11);
    assert_eq!(bus.data[0x08], 0x22);
}

#[test]
fn test_indirect_addressing() {
    let (mut cpu, mut bus) = rig();
    // MOV R0,#0x40; MOV @R0,#0x99; MOV A,@R0
    load(&mut bus, &[0x78, 0x40, 0x76, 0x99, 0xE6]);
    step_n(&mut cpu, &mut bus, 3);
    assert_eq!(bus.data[0x40], 0x99);
    assert_eq!(acc(&bus), 0x99);
}

#[test]
fn test_indirect_reaches_upper_idata() {
    let (mut cpu, mut bus) = rig();
    // Direct 0x90 hits the SFR P1, indirect 0x90 hits IDATA
    load(&mut bus, &[0x78, 0x90, 0x76, 0x77]); // MOV R0,#0x90; MOV @R0,#0x77
    step_n(&mut cpu, &mut bus, 2);
    assert_eq!(bus.data[0x90], 0x77);
    assert_eq!(bus.sfr[idx(sfr::REG_P1)], 0xFF);
}

#[test]
fn test_sjmp_loop() {
    let (mut cpu, mut bus) = rig();
    load(&mut bus, &[0x80, 0xFE]); // SJMP self
    step_n(&mut cpu, &mut bus, 3);
    assert_eq!(cpu.pc, 0);
}

#[test]
fn test_ljmp_and_ajmp() {
    let (mut cpu, mut bus) = rig();
    load(&mut bus, &[0x02, 0x12, 0x34]); // LJMP 0x1234
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.pc, 0x1234);

    let (mut cpu, mut bus) = rig();
    load(&mut bus, &[0x41, 0x55]); // AJMP 0x255
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.pc, 0x0255);
}

#[test]
fn test_lcall_ret() {
    let (mut cpu, mut bus) = rig();
    let mut program = vec![0x12, 0x00, 0x10]; // LCALL 0x0010
    program.resize(0x10, 0);
    program.push(0x22); // RET at 0x10
    load(&mut bus, &program);

    step(&mut cpu, &mut bus);
    assert_eq!(cpu.pc, 0x0010);
    assert_eq!(bus.sfr[idx(sfr::REG_SP)], 9);

    step(&mut cpu, &mut bus);
    assert_eq!(cpu.pc, 0x0003);
    assert_eq!(bus.sfr[idx(sfr::REG_SP)], 7);
}

#[test]
fn test_push_pop() {
    let (mut cpu, mut bus) = rig();
    // MOV A,#0x5A; PUSH ACC; MOV A,#0; POP B
    load(
        &mut bus,
        &[0x74, 0x5A, 0xC0, sfr::REG_ACC, 0x74, 0x00, 0xD0, sfr::REG_B],
    );
    step_n(&mut cpu, &mut bus, 4);
    assert_eq!(bus.sfr[idx(sfr::REG_B)], 0x5A);
    assert_eq!(bus.sfr[idx(sfr::REG_SP)], 7);
}

#[test]
fn test_djnz_counts() {
    let (mut cpu, mut bus) = rig();
    load(&mut bus, &[0x7A, 0x03, 0xDA, 0xFE]); // MOV R2,#3; DJNZ R2,self
    step(&mut cpu, &mut bus);
    step_n(&mut cpu, &mut bus, 3);
    assert_eq!(bus.data[2], 0);
    assert_eq!(cpu.pc, 4);
}

#[test]
fn test_cjne_sets_carry_on_less() {
    let (mut cpu, mut bus) = rig();
    load(&mut bus, &[0x74, 0x03, 0xB4, 0x05, 0x10]); // MOV A,#3; CJNE A,#5,+0x10
    step_n(&mut cpu, &mut bus, 2);
    assert_ne!(psw(&bus) & sfr::PSW_CY, 0);
    assert_eq!(cpu.pc, 0x15);
}

#[test]
fn test_bit_operations() {
    let (mut cpu, mut bus) = rig();
    // SETB 0x08 (bit 0 of IDATA 0x21); JB 0x08,+2; (skipped MOV) target: CPL 0x08
    load(&mut bus, &[0xD2, 0x08, 0x20, 0x08, 0x01, 0x00, 0xB2, 0x08]);
    step(&mut cpu, &mut bus);
    assert_eq!(bus.data[0x21] & 1, 1);

    step(&mut cpu, &mut bus); // JB taken over the NOP
    assert_eq!(cpu.pc, 6);
    step(&mut cpu, &mut bus); // CPL clears it
    assert_eq!(bus.data[0x21] & 1, 0);
}

#[test]
fn test_jbc_clears_and_jumps() {
    let (mut cpu, mut bus) = rig();
    load(&mut bus, &[0xD2, 0x00, 0x10, 0x00, 0x10]); // SETB 0x00; JBC 0x00,+0x10
    step_n(&mut cpu, &mut bus, 2);
    assert_eq!(bus.data[0x20], 0);
    assert_eq!(cpu.pc, 0x15);
}

#[test]
fn test_movx_round_trip() {
    let (mut cpu, mut bus) = rig();
    // MOV DPTR,#0x0123; MOV A,#0x77; MOVX @DPTR,A; CLR A; MOVX A,@DPTR
    load(
        &mut bus,
        &[0x90, 0x01, 0x23, 0x74, 0x77, 0xF0, 0xE4, 0xE0],
    );
    step_n(&mut cpu, &mut bus, 5);
    assert_eq!(bus.xdata[0x123], 0x77);
    assert_eq!(acc(&bus), 0x77);
}

#[test]
fn test_movx_out_of_range_faults() {
    let (mut cpu, mut bus) = rig();
    // MOV DPTR,#0x8000; MOVX A,@DPTR
    load(&mut bus, &[0x90, 0x80, 0x00, 0xE0]);
    step_n(&mut cpu, &mut bus, 2);
    assert_eq!(acc(&bus), 0xFF);
    assert_eq!(cpu.exception_count(), 1);
}

#[test]
fn test_movc_dptr() {
    let (mut cpu, mut bus) = rig();
    // MOV DPTR,#0x0100; MOV A,#2; MOVC A,@A+DPTR
    load(&mut bus, &[0x90, 0x01, 0x00, 0x74, 0x02, 0x93]);
    bus.code[0x102] = 0xEE;
    step_n(&mut cpu, &mut bus, 3);
    assert_eq!(acc(&bus), 0xEE);
}

#[test]
fn test_dual_dptr() {
    let (mut cpu, mut bus) = rig();
    // MOV DPTR,#0x1111; DPS=1; MOV DPTR,#0x2222; INC DPTR; DPS=0
    load(
        &mut bus,
        &[
            0x90, 0x11, 0x11, // MOV DPTR,#0x1111
            0x75, sfr::REG_DPS, 0x01, // MOV DPS,#1
            0x90, 0x22, 0x22, // MOV DPTR,#0x2222 (second pointer)
            0xA3, // INC DPTR
            0x75, sfr::REG_DPS, 0x00, // MOV DPS,#0
        ],
    );
    step_n(&mut cpu, &mut bus, 5);
    assert_eq!(bus.sfr[idx(sfr::REG_DPL1)], 0x23);
    assert_eq!(bus.sfr[idx(sfr::REG_DPH1)], 0x22);
    assert_eq!(bus.sfr[idx(sfr::REG_DPL)], 0x11);
}

#[test]
fn test_xch_and_xchd() {
    let (mut cpu, mut bus) = rig();
    // MOV R0,#0x30; MOV @R0,#0xAB; MOV A,#0xCD; XCHD A,@R0
    load(&mut bus, &[0x78, 0x30, 0x76, 0xAB, 0x74, 0xCD, 0xD6]);
    step_n(&mut cpu, &mut bus, 4);
    assert_eq!(acc(&bus), 0xCB);
    assert_eq!(bus.data[0x30], 0xAD);
}

#[test]
fn test_illegal_opcode_is_nop_with_exception() {
    let (mut cpu, mut bus) = rig();
    load(&mut bus, &[0xA5, 0x74, 0x42]); // illegal; MOV A,#0x42
    step_n(&mut cpu, &mut bus, 2);
    assert_eq!(cpu.exception_count(), 1);
    assert_eq!(acc(&bus), 0x42);
}

#[test]
fn test_acc_to_a_flagged() {
    let (mut cpu, mut bus) = rig();
    load(&mut bus, &[0xE5, sfr::REG_ACC]); // MOV A,ACC
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.exception_count(), 1);
}

#[test]
fn test_stack_overflow_flagged() {
    let (mut cpu, mut bus) = rig();
    // MOV SP,#0xFF; PUSH ACC
    load(&mut bus, &[0x75, sfr::REG_SP, 0xFF, 0xC0, sfr::REG_ACC]);
    step_n(&mut cpu, &mut bus, 2);
    assert_eq!(cpu.exception_count(), 1);
}

#[test]
fn test_cycle_counts() {
    let (mut cpu, mut bus) = rig();
    load(&mut bus, &[0x00, 0x74, 0x01, 0x80, 0xFE]); // NOP; MOV A,#1; SJMP
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.tick_delay(), 1); // NOP
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.tick_delay(), 1); // MOV A,#imm
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.tick_delay(), 2); // SJMP

    // A two-cycle instruction takes two ticks end to end
    let cycles = step(&mut cpu, &mut bus);
    assert_eq!(cycles, 2);
}

#[test]
fn test_psw_parity_tracks_acc() {
    let (mut cpu, mut bus) = rig();
    // MOV A,#7 (three bits set); MOV B,PSW
    load(&mut bus, &[0x74, 0x07, 0x85, sfr::REG_PSW, sfr::REG_B]);
    step_n(&mut cpu, &mut bus, 2);
    assert_eq!(bus.sfr[idx(sfr::REG_B)] & sfr::PSW_P, sfr::PSW_P);
}

#[test]
fn test_jmp_a_dptr() {
    let (mut cpu, mut bus) = rig();
    // MOV DPTR,#0x0200; MOV A,#4; JMP @A+DPTR
    load(&mut bus, &[0x90, 0x02, 0x00, 0x74, 0x04, 0x73]);
    step_n(&mut cpu, &mut bus, 3);
    assert_eq!(cpu.pc, 0x0204);
}

#[test]
fn test_exception_kinds_reported() {
    let (mut cpu, mut bus) = rig();
    let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    cpu.set_except_hook(Box::new(move |kind| sink.lock().unwrap().push(kind)));

    load(&mut bus, &[0xA5]);
    step(&mut cpu, &mut bus);
    assert_eq!(&*seen.lock().unwrap(), &[Exception::IllegalOpcodeA5]);
}
