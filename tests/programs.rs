//! Whole-program tests over the bundled demos.

use ls8::{assemble, parse_image, CmpMode, Cpu, CpuError, CpuState, MachineConfig};

/// Run `bytes` to completion, returning the machine and everything PRN printed.
fn run_bytes(bytes: &[u8], config: &MachineConfig) -> (Cpu, Result<u64, CpuError>, String) {
    let mut cpu = Cpu::with_config(config).unwrap();
    cpu.load_program(bytes).unwrap();
    let mut out = Vec::new();
    let result = cpu.run_limited(10_000, &mut out);
    (cpu, result, String::from_utf8(out).unwrap())
}

fn run_image(text: &str) -> (Cpu, String) {
    let image = parse_image(text).unwrap();
    let (cpu, result, out) = run_bytes(&image.bytes, &MachineConfig::default());
    result.unwrap();
    (cpu, out)
}

fn run_asm(source: &str) -> (Cpu, String) {
    let bytes = assemble(source).unwrap();
    let (cpu, result, out) = run_bytes(&bytes, &MachineConfig::default());
    result.unwrap();
    (cpu, out)
}

#[test]
fn test_print8() {
    let (cpu, out) = run_image(include_str!("../demos/print8.ls8"));
    assert_eq!(out, "8\n");
    assert_eq!(cpu.state, CpuState::Halted);
    assert_eq!(cpu.cycles, 3);
}

#[test]
fn test_mult() {
    let (cpu, out) = run_image(include_str!("../demos/mult.ls8"));
    assert_eq!(out, "72\n");
    assert!(cpu.is_halted());
}

#[test]
fn test_stack() {
    let (cpu, out) = run_image(include_str!("../demos/stack.ls8"));
    assert_eq!(out, "3\n2\n1\n");
    // Every push was popped
    assert_eq!(cpu.regs.sp(), 0xFF);
}

#[test]
fn test_call() {
    let (cpu, out) = run_image(include_str!("../demos/call.ls8"));
    assert_eq!(out, "20\n30\n36\n60\n");
    assert_eq!(cpu.regs.sp(), 0xFF);
    // HLT at 23 still advances the PC
    assert_eq!(cpu.regs.pc, 24);
}

#[test]
fn test_cmp_branches() {
    let (_, out) = run_image(include_str!("../demos/cmp.ls8"));
    assert_eq!(out, "1\n2\n");
}

#[test]
fn test_cmp_branches_legacy() {
    // Equal and less-than compares behave the same in both modes
    let image = parse_image(include_str!("../demos/cmp.ls8")).unwrap();
    let config = MachineConfig { cmp_mode: CmpMode::Legacy, ..MachineConfig::default() };
    let (_, result, out) = run_bytes(&image.bytes, &config);
    result.unwrap();
    assert_eq!(out, "1\n2\n");
}

#[test]
fn test_count_loop() {
    let (cpu, out) = run_asm(include_str!("../demos/count.asm"));
    assert_eq!(out, "1\n2\n3\n4\n5\n");
    assert_eq!(cpu.regs.get(0).unwrap(), 6);
}

#[test]
fn test_bitwise() {
    let (_, out) = run_asm(include_str!("../demos/bits.asm"));
    assert_eq!(out, "8\n14\n6\n243\n48\n3\n");
}

#[test]
fn test_assembled_matches_image() {
    let source = "LDI R0, 8\nLDI R1, 9\nMUL R0, R1\nPRN R0\nHLT\n";
    let image = parse_image(include_str!("../demos/mult.ls8")).unwrap();
    assert_eq!(assemble(source).unwrap(), image.bytes);
}

#[test]
fn test_unknown_opcode_stops() {
    // LDI R0,1; <0xFF>; PRN R0; HLT
    let bytes = [0x82, 0x00, 0x01, 0xFF, 0x47, 0x00, 0x01];
    let (cpu, result, out) = run_bytes(&bytes, &MachineConfig::default());

    let err = result.unwrap_err();
    assert!(err.to_string().contains("unknown instruction"));
    assert_eq!(cpu.state, CpuState::Error);
    assert_eq!(cpu.regs.pc, 3);
    assert_eq!(out, "");
}

#[test]
fn test_program_too_large() {
    let config = MachineConfig { memory_size: 32, ..MachineConfig::default() };
    let mut cpu = Cpu::with_config(&config).unwrap();
    assert!(cpu.load_program(&[0u8; 33]).is_err());
    assert!(cpu.load_program(&[0u8; 32]).is_ok());
}

#[test]
fn test_minimal_memory_stack() {
    // A 32-cell machine starts SP at 31
    let config = MachineConfig { memory_size: 32, ..MachineConfig::default() };
    let source = "LDI R0, 7\nPUSH R0\nPOP R1\nPRN R1\nHLT\n";
    let bytes = assemble(source).unwrap();
    let (cpu, result, out) = run_bytes(&bytes, &config);
    result.unwrap();
    assert_eq!(out, "7\n");
    assert_eq!(cpu.regs.sp(), 31);
}

#[test]
fn test_state_dump_round_trip() {
    let (cpu, _) = run_image(include_str!("../demos/call.ls8"));
    let json = serde_json::to_string(&cpu).unwrap();
    let restored: Cpu = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.regs, cpu.regs);
    assert_eq!(restored.mem, cpu.mem);
    assert_eq!(restored.cycles, cpu.cycles);
    assert_eq!(restored.state, CpuState::Halted);
}
