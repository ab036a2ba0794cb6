use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicU32;

use crate::cpu_bus::CpuBus;
use crate::debug_flags;
use crate::interrupts::{InterruptKind, InterruptSystem};

pub mod instruction;

pub use instruction::{decode, AddressingMode, Instruction, Mnemonic};


bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u8 {
        const CARRY = 0b00000001;
        const ZERO = 0b00000010;
        const INTERRUPT_DISABLE = 0b00000100;
        const DECIMAL = 0b00001000;
        const BREAK = 0b00010000;
        const UNUSED = 0b00100000;
        const OVERFLOW = 0b01000000;
        const NEGATIVE = 0b10000000;
    }
}

pub const POWER_ON_STATUS: u8 = 0x34;
const IDLE_CYCLES: u32 = 2;

/// Register copy handed to debuggers and the save-state writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub pc: u16,
    pub p: u8,
}

#[derive(Debug, Clone, Copy)]
enum Operand {
    None,
    Accumulator,
    Immediate(u8),
    Address(u16),
}

static UNKNOWN_OPCODE_LOG: AtomicU32 = AtomicU32::new(0);

pub struct Cpu {
    pub a: u8,  // Accumulator
    pub x: u8,  // X register
    pub y: u8,  // Y register
    pub sp: u8, // Stack pointer
    pub pc: u16,
    pub status: StatusFlags,
    cycles: u64,
    stopped: bool,
    waiting: bool,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Cpu {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFF,
            pc: 0,
            status: StatusFlags::from_bits_truncate(POWER_ON_STATUS),
            cycles: 0,
            stopped: false,
            waiting: false,
        }
    }

    /// Clears registers. The PC is loaded when the queued RESET is serviced.
    pub fn reset(&mut self) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.sp = 0xFF;
        self.status = StatusFlags::from_bits_truncate(POWER_ON_STATUS);
        self.stopped = false;
        self.waiting = false;
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn resume(&mut self) {
        self.stopped = false;
        self.waiting = false;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    pub fn total_cycles(&self) -> u64 {
        self.cycles
    }

    pub fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot {
            a: self.a,
            x: self.x,
            y: self.y,
            sp: self.sp,
            pc: self.pc,
            p: self.status.bits(),
        }
    }

    pub fn restore(&mut self, s: &CpuSnapshot) {
        self.a = s.a;
        self.x = s.x;
        self.y = s.y;
        self.sp = s.sp;
        self.pc = s.pc;
        self.status = StatusFlags::from_bits_truncate(s.p);
    }

    /// Runs one instruction (or interrupt entry) and returns the cycles it took.
    pub fn step(&mut self, bus: &mut dyn CpuBus, interrupts: &mut InterruptSystem) -> u32 {
        if self.stopped {
            return IDLE_CYCLES;
        }

        let serviced = self.service_pending(bus, interrupts);
        if serviced > 0 {
            self.cycles += serviced as u64;
            return serviced;
        }

        if self.waiting {
            return IDLE_CYCLES;
        }

        let opcode_pc = self.pc;
        let opcode = self.read_byte(bus);
        let cycles = match decode(opcode) {
            Some(instr) => self.execute(instr, bus, interrupts),
            None => {
                if debug_flags::cpu() || debug_flags::first_n(&UNKNOWN_OPCODE_LOG, 32) {
                    log::warn!("Unknown opcode 0x{:02X} at 0x{:04X}", opcode, opcode_pc);
                }
                IDLE_CYCLES
            }
        };
        let cycles = cycles + bus.take_stall_cycles();
        self.cycles += cycles as u64;
        cycles
    }

    /// Drains every interrupt that may run now, highest priority first.
    pub fn service_pending(&mut self, bus: &mut dyn CpuBus, interrupts: &mut InterruptSystem) -> u32 {
        if !interrupts.has_pending() || !interrupts.begin_service() {
            return 0;
        }
        let mut cycles = 0;
        while let Some(kind) =
            interrupts.next_serviceable(self.status.contains(StatusFlags::INTERRUPT_DISABLE))
        {
            cycles += self.enter_interrupt(kind, bus);
        }
        interrupts.end_service();
        cycles
    }

    fn enter_interrupt(&mut self, kind: InterruptKind, bus: &mut dyn CpuBus) -> u32 {
        self.waiting = false;
        if kind == InterruptKind::Reset {
            self.sp = 0xFF;
            self.stopped = false;
        } else {
            self.push(bus, (self.pc >> 8) as u8);
            self.push(bus, self.pc as u8);
            let mut p = self.status | StatusFlags::UNUSED;
            p.set(StatusFlags::BREAK, kind == InterruptKind::Brk);
            self.push(bus, p.bits());
        }
        self.status.insert(StatusFlags::INTERRUPT_DISABLE);
        self.status.remove(StatusFlags::DECIMAL);
        self.pc = bus.read_u16(kind.vector() as u32);
        kind.cycles()
    }

    fn execute(
        &mut self,
        instr: Instruction,
        bus: &mut dyn CpuBus,
        interrupts: &mut InterruptSystem,
    ) -> u32 {
        let (operand, page_crossed) = self.resolve(instr.mode, bus);
        let mut cycles = instr.cycles as u32;
        if page_crossed && instr.mnemonic.pays_page_penalty() {
            cycles += 1;
        }

        match instr.mnemonic {
            Mnemonic::Adc => {
                let v = self.load(operand, bus);
                self.adc(v);
            }
            Mnemonic::Sbc => {
                let v = self.load(operand, bus);
                self.sbc(v);
            }
            Mnemonic::And => {
                self.a &= self.load(operand, bus);
                self.set_zero_negative_flags(self.a);
            }
            Mnemonic::Eor => {
                self.a ^= self.load(operand, bus);
                self.set_zero_negative_flags(self.a);
            }
            Mnemonic::Ora => {
                self.a |= self.load(operand, bus);
                self.set_zero_negative_flags(self.a);
            }
            Mnemonic::Cmp => {
                let v = self.load(operand, bus);
                self.compare(self.a, v);
            }
            Mnemonic::Cpx => {
                let v = self.load(operand, bus);
                self.compare(self.x, v);
            }
            Mnemonic::Cpy => {
                let v = self.load(operand, bus);
                self.compare(self.y, v);
            }
            Mnemonic::Bit => {
                let v = self.load(operand, bus);
                self.status.set(StatusFlags::ZERO, self.a & v == 0);
                // BIT #imm only touches Z
                if !matches!(operand, Operand::Immediate(_)) {
                    self.status.set(StatusFlags::NEGATIVE, v & 0x80 != 0);
                    self.status.set(StatusFlags::OVERFLOW, v & 0x40 != 0);
                }
            }
            Mnemonic::Tsb => {
                let v = self.load(operand, bus);
                self.status.set(StatusFlags::ZERO, self.a & v == 0);
                self.store(operand, bus, v | self.a);
            }
            Mnemonic::Trb => {
                let v = self.load(operand, bus);
                self.status.set(StatusFlags::ZERO, self.a & v == 0);
                self.store(operand, bus, v & !self.a);
            }
            Mnemonic::Asl => self.modify(operand, bus, |cpu, v| {
                cpu.status.set(StatusFlags::CARRY, v & 0x80 != 0);
                v << 1
            }),
            Mnemonic::Lsr => self.modify(operand, bus, |cpu, v| {
                cpu.status.set(StatusFlags::CARRY, v & 0x01 != 0);
                v >> 1
            }),
            Mnemonic::Rol => self.modify(operand, bus, |cpu, v| {
                let carry_in = cpu.status.contains(StatusFlags::CARRY) as u8;
                cpu.status.set(StatusFlags::CARRY, v & 0x80 != 0);
                (v << 1) | carry_in
            }),
            Mnemonic::Ror => self.modify(operand, bus, |cpu, v| {
                let carry_in = (cpu.status.contains(StatusFlags::CARRY) as u8) << 7;
                cpu.status.set(StatusFlags::CARRY, v & 0x01 != 0);
                (v >> 1) | carry_in
            }),
            Mnemonic::Inc => self.modify(operand, bus, |_, v| v.wrapping_add(1)),
            Mnemonic::Dec => self.modify(operand, bus, |_, v| v.wrapping_sub(1)),
            Mnemonic::Inx => {
                self.x = self.x.wrapping_add(1);
                self.set_zero_negative_flags(self.x);
            }
            Mnemonic::Dex => {
                self.x = self.x.wrapping_sub(1);
                self.set_zero_negative_flags(self.x);
            }
            Mnemonic::Iny => {
                self.y = self.y.wrapping_add(1);
                self.set_zero_negative_flags(self.y);
            }
            Mnemonic::Dey => {
                self.y = self.y.wrapping_sub(1);
                self.set_zero_negative_flags(self.y);
            }
            Mnemonic::Lda => {
                self.a = self.load(operand, bus);
                self.set_zero_negative_flags(self.a);
            }
            Mnemonic::Ldx => {
                self.x = self.load(operand, bus);
                self.set_zero_negative_flags(self.x);
            }
            Mnemonic::Ldy => {
                self.y = self.load(operand, bus);
                self.set_zero_negative_flags(self.y);
            }
            Mnemonic::Sta => self.store(operand, bus, self.a),
            Mnemonic::Stx => self.store(operand, bus, self.x),
            Mnemonic::Sty => self.store(operand, bus, self.y),
            Mnemonic::Stz => self.store(operand, bus, 0),
            Mnemonic::Tax => {
                self.x = self.a;
                self.set_zero_negative_flags(self.x);
            }
            Mnemonic::Tay => {
                self.y = self.a;
                self.set_zero_negative_flags(self.y);
            }
            Mnemonic::Tsx => {
                self.x = self.sp;
                self.set_zero_negative_flags(self.x);
            }
            Mnemonic::Txa => {
                self.a = self.x;
                self.set_zero_negative_flags(self.a);
            }
            Mnemonic::Txs => self.sp = self.x,
            Mnemonic::Tya => {
                self.a = self.y;
                self.set_zero_negative_flags(self.a);
            }
            Mnemonic::Pha => self.push(bus, self.a),
            Mnemonic::Phx => self.push(bus, self.x),
            Mnemonic::Phy => self.push(bus, self.y),
            Mnemonic::Php => {
                let p = self.status | StatusFlags::BREAK | StatusFlags::UNUSED;
                self.push(bus, p.bits());
            }
            Mnemonic::Pla => {
                self.a = self.pull(bus);
                self.set_zero_negative_flags(self.a);
            }
            Mnemonic::Plx => {
                self.x = self.pull(bus);
                self.set_zero_negative_flags(self.x);
            }
            Mnemonic::Ply => {
                self.y = self.pull(bus);
                self.set_zero_negative_flags(self.y);
            }
            Mnemonic::Plp => {
                let p = self.pull(bus);
                self.set_status_from_stack(p);
            }
            Mnemonic::Clc => self.status.remove(StatusFlags::CARRY),
            Mnemonic::Sec => self.status.insert(StatusFlags::CARRY),
            Mnemonic::Cli => self.status.remove(StatusFlags::INTERRUPT_DISABLE),
            Mnemonic::Sei => self.status.insert(StatusFlags::INTERRUPT_DISABLE),
            Mnemonic::Clv => self.status.remove(StatusFlags::OVERFLOW),
            Mnemonic::Cld => self.status.remove(StatusFlags::DECIMAL),
            Mnemonic::Sed => self.status.insert(StatusFlags::DECIMAL),
            Mnemonic::Bpl => cycles += self.branch(operand, !self.status.contains(StatusFlags::NEGATIVE), page_crossed),
            Mnemonic::Bmi => cycles += self.branch(operand, self.status.contains(StatusFlags::NEGATIVE), page_crossed),
            Mnemonic::Bvc => cycles += self.branch(operand, !self.status.contains(StatusFlags::OVERFLOW), page_crossed),
            Mnemonic::Bvs => cycles += self.branch(operand, self.status.contains(StatusFlags::OVERFLOW), page_crossed),
            Mnemonic::Bcc => cycles += self.branch(operand, !self.status.contains(StatusFlags::CARRY), page_crossed),
            Mnemonic::Bcs => cycles += self.branch(operand, self.status.contains(StatusFlags::CARRY), page_crossed),
            Mnemonic::Bne => cycles += self.branch(operand, !self.status.contains(StatusFlags::ZERO), page_crossed),
            Mnemonic::Beq => cycles += self.branch(operand, self.status.contains(StatusFlags::ZERO), page_crossed),
            Mnemonic::Bra => cycles += self.branch(operand, true, page_crossed),
            Mnemonic::Jmp => {
                if let Operand::Address(target) = operand {
                    self.pc = target;
                }
            }
            Mnemonic::Jsr => {
                if let Operand::Address(target) = operand {
                    let ret = self.pc.wrapping_sub(1);
                    self.push(bus, (ret >> 8) as u8);
                    self.push(bus, ret as u8);
                    self.pc = target;
                }
            }
            Mnemonic::Rts => {
                let lo = self.pull(bus) as u16;
                let hi = self.pull(bus) as u16;
                self.pc = ((hi << 8) | lo).wrapping_add(1);
            }
            Mnemonic::Rti => {
                let p = self.pull(bus);
                self.set_status_from_stack(p);
                let lo = self.pull(bus) as u16;
                let hi = self.pull(bus) as u16;
                self.pc = (hi << 8) | lo;
            }
            // The signature byte was skipped by the immediate operand; the
            // stack frame is pushed when the queued BRK is serviced.
            Mnemonic::Brk => interrupts.request(InterruptKind::Brk),
            Mnemonic::Nop => {}
            Mnemonic::Wai => self.waiting = true,
            Mnemonic::Stp => self.stopped = true,
        }

        cycles
    }

    /// Effective operand for `mode`, plus whether indexing crossed a page.
    fn resolve(&mut self, mode: AddressingMode, bus: &mut dyn CpuBus) -> (Operand, bool) {
        match mode {
            AddressingMode::Implied => (Operand::None, false),
            AddressingMode::Accumulator => (Operand::Accumulator, false),
            AddressingMode::Immediate => (Operand::Immediate(self.read_byte(bus)), false),
            AddressingMode::Direct => (Operand::Address(self.read_byte(bus) as u16), false),
            AddressingMode::DirectX => {
                let base = self.read_byte(bus);
                (Operand::Address(base.wrapping_add(self.x) as u16), false)
            }
            AddressingMode::DirectY => {
                let base = self.read_byte(bus);
                (Operand::Address(base.wrapping_add(self.y) as u16), false)
            }
            AddressingMode::Absolute => (Operand::Address(self.read_word(bus)), false),
            AddressingMode::AbsoluteX => {
                let base = self.read_word(bus);
                let addr = base.wrapping_add(self.x as u16);
                (Operand::Address(addr), crosses_page(base, addr))
            }
            AddressingMode::AbsoluteY => {
                let base = self.read_word(bus);
                let addr = base.wrapping_add(self.y as u16);
                (Operand::Address(addr), crosses_page(base, addr))
            }
            AddressingMode::Indirect => {
                let ptr = self.read_word(bus);
                (Operand::Address(bus.read_u16(ptr as u32)), false)
            }
            AddressingMode::AbsoluteIndexedIndirect => {
                let ptr = self.read_word(bus).wrapping_add(self.x as u16);
                (Operand::Address(bus.read_u16(ptr as u32)), false)
            }
            AddressingMode::DirectIndexedIndirect => {
                let zp = self.read_byte(bus).wrapping_add(self.x);
                (Operand::Address(self.read_direct_pointer(bus, zp)), false)
            }
            AddressingMode::DirectIndirectIndexed => {
                let zp = self.read_byte(bus);
                let base = self.read_direct_pointer(bus, zp);
                let addr = base.wrapping_add(self.y as u16);
                (Operand::Address(addr), crosses_page(base, addr))
            }
            AddressingMode::DirectIndirect => {
                let zp = self.read_byte(bus);
                (Operand::Address(self.read_direct_pointer(bus, zp)), false)
            }
            AddressingMode::Relative => {
                let offset = self.read_byte(bus) as i8;
                let target = self.pc.wrapping_add(offset as u16);
                (Operand::Address(target), crosses_page(self.pc, target))
            }
        }
    }

    fn load(&mut self, operand: Operand, bus: &mut dyn CpuBus) -> u8 {
        match operand {
            Operand::None => 0,
            Operand::Accumulator => self.a,
            Operand::Immediate(v) => v,
            Operand::Address(addr) => bus.read_u8(addr as u32),
        }
    }

    fn store(&mut self, operand: Operand, bus: &mut dyn CpuBus, value: u8) {
        match operand {
            Operand::Accumulator => self.a = value,
            Operand::Address(addr) => bus.write_u8(addr as u32, value),
            Operand::None | Operand::Immediate(_) => {}
        }
    }

    // Read-modify-write; N/Z follow the written value.
    fn modify<F>(&mut self, operand: Operand, bus: &mut dyn CpuBus, f: F)
    where
        F: FnOnce(&mut Self, u8) -> u8,
    {
        let value = self.load(operand, bus);
        let result = f(self, value);
        self.store(operand, bus, result);
        self.set_zero_negative_flags(result);
    }

    fn branch(&mut self, operand: Operand, condition: bool, page_crossed: bool) -> u32 {
        match operand {
            Operand::Address(target) if condition => {
                self.pc = target;
                if page_crossed {
                    2
                } else {
                    1
                }
            }
            _ => 0,
        }
    }

    fn adc(&mut self, value: u8) {
        let carry = self.status.contains(StatusFlags::CARRY) as u16;
        let a = self.a as u16;
        let v = value as u16;

        if self.status.contains(StatusFlags::DECIMAL) {
            let mut lo = (a & 0x0F) + (v & 0x0F) + carry;
            if lo > 0x09 {
                lo += 0x06;
            }
            let mut hi = (a >> 4) + (v >> 4) + (lo > 0x0F) as u16;
            let binary = (((hi << 4) | (lo & 0x0F)) & 0xFF) as u8;
            self.status.set(
                StatusFlags::OVERFLOW,
                (!(self.a ^ value) & (self.a ^ binary) & 0x80) != 0,
            );
            if hi > 0x09 {
                hi += 0x06;
            }
            self.status.set(StatusFlags::CARRY, hi > 0x0F);
            self.a = (((hi << 4) | (lo & 0x0F)) & 0xFF) as u8;
        } else {
            let result = a + v + carry;
            self.status.set(StatusFlags::CARRY, result > 0xFF);
            self.status.set(
                StatusFlags::OVERFLOW,
                (self.a ^ result as u8) & (value ^ result as u8) & 0x80 != 0,
            );
            self.a = result as u8;
        }
        self.set_zero_negative_flags(self.a);
    }

    fn sbc(&mut self, value: u8) {
        let borrow = !self.status.contains(StatusFlags::CARRY) as i16;
        let binary = self.a as i16 - value as i16 - borrow;
        let result8 = binary as u8;
        self.status.set(
            StatusFlags::OVERFLOW,
            ((self.a ^ value) & (self.a ^ result8) & 0x80) != 0,
        );
        self.status.set(StatusFlags::CARRY, binary >= 0);

        if self.status.contains(StatusFlags::DECIMAL) {
            let mut lo = (self.a & 0x0F) as i16 - (value & 0x0F) as i16 - borrow;
            let mut hi = (self.a >> 4) as i16 - (value >> 4) as i16;
            if lo < 0 {
                lo -= 0x06;
                hi -= 1;
            }
            if hi < 0 {
                hi -= 0x06;
            }
            self.a = (((hi << 4) | (lo & 0x0F)) & 0xFF) as u8;
        } else {
            self.a = result8;
        }
        self.set_zero_negative_flags(self.a);
    }

    fn compare(&mut self, register: u8, value: u8) {
        let result = register.wrapping_sub(value);
        self.status.set(StatusFlags::CARRY, register >= value);
        self.set_zero_negative_flags(result);
    }

    fn set_status_from_stack(&mut self, p: u8) {
        self.status = StatusFlags::from_bits_truncate(p & !StatusFlags::BREAK.bits()) | StatusFlags::UNUSED;
    }

    fn read_byte(&mut self, bus: &mut dyn CpuBus) -> u8 {
        let v = bus.read_u8(self.pc as u32);
        self.pc = self.pc.wrapping_add(1);
        v
    }

    fn read_word(&mut self, bus: &mut dyn CpuBus) -> u16 {
        let lo = self.read_byte(bus) as u16;
        let hi = self.read_byte(bus) as u16;
        (hi << 8) | lo
    }

    // Pointer fetch that wraps inside the direct page.
    fn read_direct_pointer(&mut self, bus: &mut dyn CpuBus, zp: u8) -> u16 {
        let lo = bus.read_u8(zp as u32) as u16;
        let hi = bus.read_u8(zp.wrapping_add(1) as u32) as u16;
        (hi << 8) | lo
    }

    fn push(&mut self, bus: &mut dyn CpuBus, value: u8) {
        bus.write_u8(0x0100 | self.sp as u32, value);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pull(&mut self, bus: &mut dyn CpuBus) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        bus.read_u8(0x0100 | self.sp as u32)
    }

    fn set_zero_negative_flags(&mut self, value: u8) {
        self.status.set(StatusFlags::ZERO, value == 0);
        self.status.set(StatusFlags::NEGATIVE, value & 0x80 != 0);
    }
}

fn crosses_page(a: u16, b: u16) -> bool {
    (a & 0xFF00) != (b & 0xFF00)
}
