use super::*;

#[test]
fn test_direct_x_wraps_in_page_zero() {
    let (mut cpu, mut bus, mut irq) = setup_cpu();
    cpu.x = 0x10;
    bus.memory[0x000F] = 0x5A;
    // LDA $FF,X -> $000F
    bus.load_program(&[0xB5, 0xFF], 0x8000);
    assert_eq!(cpu.step(&mut bus, &mut irq), 4);
    assert_eq!(cpu.a, 0x5A);
}

#[test]
fn test_absolute_x_page_cross_penalty() {
    let (mut cpu, mut bus, mut irq) = setup_cpu();
    cpu.x = 0x01;
    bus.memory[0x2100] = 0x11;
    bus.memory[0x2081] = 0x22;
    // LDA $20FF,X crosses; LDA $2080,X does not
    bus.load_program(&[0xBD, 0xFF, 0x20, 0xBD, 0x80, 0x20], 0x8000);
    assert_eq!(cpu.step(&mut bus, &mut irq), 5);
    assert_eq!(cpu.a, 0x11);
    assert_eq!(cpu.step(&mut bus, &mut irq), 4);
    assert_eq!(cpu.a, 0x22);
}

#[test]
fn test_store_absolute_x_has_fixed_cost() {
    let (mut cpu, mut bus, mut irq) = setup_cpu();
    cpu.x = 0x01;
    cpu.a = 0x99;
    bus.load_program(&[0x9D, 0xFF, 0x20], 0x8000);
    assert_eq!(cpu.step(&mut bus, &mut irq), 5);
    assert_eq!(bus.memory[0x2100], 0x99);
}

#[test]
fn test_absolute_y() {
    let (mut cpu, mut bus, mut irq) = setup_cpu();
    cpu.y = 0x04;
    bus.memory[0x3004] = 0x77;
    bus.load_program(&[0xB9, 0x00, 0x30], 0x8000);
    assert_eq!(cpu.step(&mut bus, &mut irq), 4);
    assert_eq!(cpu.a, 0x77);
}

#[test]
fn test_indexed_indirect() {
    let (mut cpu, mut bus, mut irq) = setup_cpu();
    cpu.x = 0x04;
    bus.memory[0x24] = 0x00;
    bus.memory[0x25] = 0x40;
    bus.memory[0x4000] = 0xC3;
    // LDA ($20,X)
    bus.load_program(&[0xA1, 0x20], 0x8000);
    assert_eq!(cpu.step(&mut bus, &mut irq), 6);
    assert_eq!(cpu.a, 0xC3);
}

#[test]
fn test_indirect_indexed_with_page_cross() {
    let (mut cpu, mut bus, mut irq) = setup_cpu();
    cpu.y = 0x10;
    bus.memory[0x40] = 0xF8;
    bus.memory[0x41] = 0x40;
    bus.memory[0x4108] = 0x3C;
    // LDA ($40),Y -> $40F8 + $10 = $4108
    bus.load_program(&[0xB1, 0x40], 0x8000);
    assert_eq!(cpu.step(&mut bus, &mut irq), 6);
    assert_eq!(cpu.a, 0x3C);
}

#[test]
fn test_direct_indirect() {
    let (mut cpu, mut bus, mut irq) = setup_cpu();
    cpu.a = 0x5E;
    bus.memory[0x30] = 0x34;
    bus.memory[0x31] = 0x12;
    // STA ($30)
    bus.load_program(&[0x92, 0x30], 0x8000);
    assert_eq!(cpu.step(&mut bus, &mut irq), 5);
    assert_eq!(bus.memory[0x1234], 0x5E);
}

#[test]
fn test_jmp_indirect() {
    let (mut cpu, mut bus, mut irq) = setup_cpu();
    bus.memory[0x0200] = 0x00;
    bus.memory[0x0201] = 0x90;
    bus.load_program(&[0x6C, 0x00, 0x02], 0x8000);
    assert_eq!(cpu.step(&mut bus, &mut irq), 5);
    assert_eq!(cpu.pc, 0x9000);
}

#[test]
fn test_jmp_absolute_indexed_indirect() {
    let (mut cpu, mut bus, mut irq) = setup_cpu();
    cpu.x = 0x02;
    bus.memory[0x0302] = 0x56;
    bus.memory[0x0303] = 0x34;
    bus.load_program(&[0x7C, 0x00, 0x03], 0x8000);
    cpu.step(&mut bus, &mut irq);
    assert_eq!(cpu.pc, 0x3456);
}

#[test]
fn test_accumulator_mode_leaves_memory() {
    let (mut cpu, mut bus, mut irq) = setup_cpu();
    cpu.a = 0x02;
    bus.load_program(&[0x4A], 0x8000);
    assert_eq!(cpu.step(&mut bus, &mut irq), 2);
    assert_eq!(cpu.a, 0x01);
    assert_eq!(cpu.pc, 0x8001);
}

#[test]
fn test_tsb_trb() {
    let (mut cpu, mut bus, mut irq) = setup_cpu();
    cpu.a = 0x0F;
    bus.memory[0x50] = 0xF0;
    bus.load_program(&[0x04, 0x50, 0x14, 0x50], 0x8000);
    cpu.step(&mut bus, &mut irq);
    assert_eq!(bus.memory[0x50], 0xFF);
    assert!(cpu.status.contains(StatusFlags::ZERO));
    cpu.step(&mut bus, &mut irq);
    assert_eq!(bus.memory[0x50], 0xF0);
    assert!(!cpu.status.contains(StatusFlags::ZERO));
}

#[test]
fn test_operand_lengths() {
    assert_eq!(AddressingMode::Implied.operand_len(), 0);
    assert_eq!(AddressingMode::Relative.operand_len(), 1);
    assert_eq!(AddressingMode::AbsoluteIndexedIndirect.operand_len(), 2);
}
