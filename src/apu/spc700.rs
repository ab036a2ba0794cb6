//! SPC700 sound CPU core.
//!
//! Opcodes are decoded by field where the map is regular (the ALU block, the shift/INC/DEC
//! block, branches, bit ops) and individually elsewhere.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicU32;

use crate::debug_flags;

/// Memory seen by the SPC700 (RAM, IPL ROM and the $F0-$FF I/O page).
pub trait SpcBus {
    fn read(&mut self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, value: u8);
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Psw: u8 {
        const CARRY = 0x01;
        const ZERO = 0x02;
        const INTERRUPT = 0x04;
        const HALF_CARRY = 0x08;
        const BREAK = 0x10;
        const DIRECT_PAGE = 0x20;
        const OVERFLOW = 0x40;
        const NEGATIVE = 0x80;
    }
}

pub const RESET_VECTOR: u16 = 0xFFFE;

#[rustfmt::skip]
const CYCLES: [u8; 256] = [
    2,8,4,5,3,4,3,6,2,6,5,4,5,4,6,8,
    2,8,4,5,4,5,5,6,5,5,6,5,2,2,4,6,
    2,8,4,5,3,4,3,6,2,6,5,4,5,4,5,4,
    2,8,4,5,4,5,5,6,5,5,6,5,2,2,3,8,
    2,8,4,5,3,4,3,6,2,6,4,4,5,4,6,6,
    2,8,4,5,4,5,5,6,5,5,4,5,2,2,4,3,
    2,8,4,5,3,4,3,6,2,6,4,4,5,4,5,5,
    2,8,4,5,4,5,5,6,5,5,5,5,2,2,3,6,
    2,8,4,5,3,4,3,6,2,6,5,4,5,2,4,5,
    2,8,4,5,4,5,5,6,5,5,5,5,2,2,12,5,
    3,8,4,5,3,4,3,6,2,6,4,4,5,2,4,4,
    2,8,4,5,4,5,5,6,5,5,5,5,2,2,3,4,
    3,8,4,5,4,5,4,7,2,5,6,4,5,2,4,9,
    2,8,4,5,5,6,6,7,4,5,5,5,2,2,6,3,
    2,8,4,5,3,4,3,6,2,4,5,3,4,3,4,3,
    2,8,4,5,4,5,5,6,3,4,5,4,2,2,4,3,
];

const BRANCH_TAKEN_CYCLES: u32 = 2;

static UNKNOWN_OPCODE_LOG: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AluOp {
    Or,
    And,
    Eor,
    Cmp,
    Adc,
    Sbc,
}

impl AluOp {
    fn from_row(op: u8) -> Self {
        match op >> 5 {
            0 => AluOp::Or,
            1 => AluOp::And,
            2 => AluOp::Eor,
            3 => AluOp::Cmp,
            4 => AluOp::Adc,
            _ => AluOp::Sbc,
        }
    }
}

/// Register block for debuggers and save states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpcSnapshot {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub pc: u16,
    pub psw: u8,
}

#[derive(Debug, Clone)]
pub struct Spc700 {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub pc: u16,
    pub psw: Psw,
    stopped: bool,
}

impl Default for Spc700 {
    fn default() -> Self {
        Self::new()
    }
}

impl Spc700 {
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xEF,
            pc: 0xFFC0,
            psw: Psw::ZERO,
            stopped: false,
        }
    }

    /// Loads PC from the reset vector (the IPL ROM must be mapped).
    pub fn reset(&mut self, bus: &mut dyn SpcBus) {
        *self = Self::new();
        self.pc = read16(bus, RESET_VECTOR);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn snapshot(&self) -> SpcSnapshot {
        SpcSnapshot {
            a: self.a,
            x: self.x,
            y: self.y,
            sp: self.sp,
            pc: self.pc,
            psw: self.psw.bits(),
        }
    }

    pub fn restore(&mut self, s: &SpcSnapshot) {
        self.a = s.a;
        self.x = s.x;
        self.y = s.y;
        self.sp = s.sp;
        self.pc = s.pc;
        self.psw = Psw::from_bits_truncate(s.psw);
        self.stopped = false;
    }

    fn ya(&self) -> u16 {
        ((self.y as u16) << 8) | self.a as u16
    }

    fn set_ya(&mut self, v: u16) {
        self.a = v as u8;
        self.y = (v >> 8) as u8;
    }

    fn set_nz(&mut self, v: u8) {
        self.psw.set(Psw::ZERO, v == 0);
        self.psw.set(Psw::NEGATIVE, v & 0x80 != 0);
    }

    fn set_nz16(&mut self, v: u16) {
        self.psw.set(Psw::ZERO, v == 0);
        self.psw.set(Psw::NEGATIVE, v & 0x8000 != 0);
    }

    fn carry(&self) -> u8 {
        self.psw.contains(Psw::CARRY) as u8
    }

    // --- operand fetch ---

    fn fetch(&mut self, bus: &mut dyn SpcBus) -> u8 {
        let v = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        v
    }

    fn fetch16(&mut self, bus: &mut dyn SpcBus) -> u16 {
        let lo = self.fetch(bus) as u16;
        let hi = self.fetch(bus) as u16;
        (hi << 8) | lo
    }

    /// Direct-page address of an 8-bit offset.
    fn dp(&self, offset: u8) -> u16 {
        if self.psw.contains(Psw::DIRECT_PAGE) {
            0x100 | offset as u16
        } else {
            offset as u16
        }
    }

    // ページ内で折り返す16ビット読み出し
    fn read_dp16(&self, bus: &mut dyn SpcBus, offset: u8) -> u16 {
        let lo = bus.read(self.dp(offset)) as u16;
        let hi = bus.read(self.dp(offset.wrapping_add(1))) as u16;
        (hi << 8) | lo
    }

    fn write_dp16(&self, bus: &mut dyn SpcBus, offset: u8, v: u16) {
        bus.write(self.dp(offset), v as u8);
        bus.write(self.dp(offset.wrapping_add(1)), (v >> 8) as u8);
    }

    fn addr_dp(&mut self, bus: &mut dyn SpcBus) -> u16 {
        let d = self.fetch(bus);
        self.dp(d)
    }

    fn addr_dp_x(&mut self, bus: &mut dyn SpcBus) -> u16 {
        let d = self.fetch(bus);
        self.dp(d.wrapping_add(self.x))
    }

    fn addr_dp_y(&mut self, bus: &mut dyn SpcBus) -> u16 {
        let d = self.fetch(bus);
        self.dp(d.wrapping_add(self.y))
    }

    fn addr_abs(&mut self, bus: &mut dyn SpcBus) -> u16 {
        self.fetch16(bus)
    }

    fn addr_abs_x(&mut self, bus: &mut dyn SpcBus) -> u16 {
        self.fetch16(bus).wrapping_add(self.x as u16)
    }

    fn addr_abs_y(&mut self, bus: &mut dyn SpcBus) -> u16 {
        self.fetch16(bus).wrapping_add(self.y as u16)
    }

    // [d+X]
    fn addr_ind_x(&mut self, bus: &mut dyn SpcBus) -> u16 {
        let d = self.fetch(bus).wrapping_add(self.x);
        self.read_dp16(bus, d)
    }

    // [d]+Y
    fn addr_ind_y(&mut self, bus: &mut dyn SpcBus) -> u16 {
        let d = self.fetch(bus);
        self.read_dp16(bus, d).wrapping_add(self.y as u16)
    }

    /// `m.b` operand: 13-bit address and bit number.
    fn addr_bit(&mut self, bus: &mut dyn SpcBus) -> (u16, u8) {
        let w = self.fetch16(bus);
        (w & 0x1FFF, (w >> 13) as u8)
    }

    // --- stack ---

    fn push(&mut self, bus: &mut dyn SpcBus, v: u8) {
        bus.write(0x100 | self.sp as u16, v);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pop(&mut self, bus: &mut dyn SpcBus) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        bus.read(0x100 | self.sp as u16)
    }

    fn push16(&mut self, bus: &mut dyn SpcBus, v: u16) {
        self.push(bus, (v >> 8) as u8);
        self.push(bus, v as u8);
    }

    fn pop16(&mut self, bus: &mut dyn SpcBus) -> u16 {
        let lo = self.pop(bus) as u16;
        let hi = self.pop(bus) as u16;
        (hi << 8) | lo
    }

    // --- arithmetic ---

    fn adc(&mut self, a: u8, b: u8) -> u8 {
        let r = a as u16 + b as u16 + self.carry() as u16;
        let r8 = r as u8;
        self.psw.set(Psw::CARRY, r > 0xFF);
        self.psw.set(Psw::HALF_CARRY, (a ^ b ^ r8) & 0x10 != 0);
        self.psw.set(Psw::OVERFLOW, (!(a ^ b) & (a ^ r8) & 0x80) != 0);
        self.set_nz(r8);
        r8
    }

    fn compare(&mut self, a: u8, b: u8) {
        let r = a.wrapping_sub(b);
        self.psw.set(Psw::CARRY, a >= b);
        self.set_nz(r);
    }

    fn alu(&mut self, op: AluOp, a: u8, b: u8) -> u8 {
        match op {
            AluOp::Or => {
                let r = a | b;
                self.set_nz(r);
                r
            }
            AluOp::And => {
                let r = a & b;
                self.set_nz(r);
                r
            }
            AluOp::Eor => {
                let r = a ^ b;
                self.set_nz(r);
                r
            }
            AluOp::Cmp => {
                self.compare(a, b);
                a
            }
            AluOp::Adc => self.adc(a, b),
            AluOp::Sbc => self.adc(a, !b),
        }
    }

    /// Rows $00-$BF, columns 4-9: OR/AND/EOR/CMP/ADC/SBC over twelve operand forms.
    fn exec_alu(&mut self, op: u8, bus: &mut dyn SpcBus) {
        let kind = AluOp::from_row(op);
        let writes_back = kind != AluOp::Cmp;

        // A を相手にする形式
        let operand_addr = match op & 0x1F {
            0x04 => Some(self.addr_dp(bus)),
            0x05 => Some(self.addr_abs(bus)),
            0x06 => Some(self.dp(self.x)),
            0x07 => Some(self.addr_ind_x(bus)),
            0x14 => Some(self.addr_dp_x(bus)),
            0x15 => Some(self.addr_abs_x(bus)),
            0x16 => Some(self.addr_abs_y(bus)),
            0x17 => Some(self.addr_ind_y(bus)),
            _ => None,
        };
        if let Some(addr) = operand_addr {
            let b = bus.read(addr);
            self.a = self.alu(kind, self.a, b);
            return;
        }

        match op & 0x1F {
            0x08 => {
                let b = self.fetch(bus);
                self.a = self.alu(kind, self.a, b);
            }
            // dd,ds
            0x09 => {
                let src = self.addr_dp(bus);
                let dst = self.addr_dp(bus);
                let b = bus.read(src);
                let a = bus.read(dst);
                let r = self.alu(kind, a, b);
                if writes_back {
                    bus.write(dst, r);
                }
            }
            // d,#imm
            0x18 => {
                let b = self.fetch(bus);
                let dst = self.addr_dp(bus);
                let a = bus.read(dst);
                let r = self.alu(kind, a, b);
                if writes_back {
                    bus.write(dst, r);
                }
            }
            // (X),(Y)
            _ => {
                let dst = self.dp(self.x);
                let b = bus.read(self.dp(self.y));
                let a = bus.read(dst);
                let r = self.alu(kind, a, b);
                if writes_back {
                    bus.write(dst, r);
                }
            }
        }
    }

    fn shift(&mut self, row: u8, v: u8) -> u8 {
        let r = match row {
            0 => {
                self.psw.set(Psw::CARRY, v & 0x80 != 0);
                v << 1
            }
            1 => {
                let c = self.carry();
                self.psw.set(Psw::CARRY, v & 0x80 != 0);
                (v << 1) | c
            }
            2 => {
                self.psw.set(Psw::CARRY, v & 0x01 != 0);
                v >> 1
            }
            3 => {
                let c = self.carry();
                self.psw.set(Psw::CARRY, v & 0x01 != 0);
                (v >> 1) | (c << 7)
            }
            4 => v.wrapping_sub(1),
            _ => v.wrapping_add(1),
        };
        self.set_nz(r);
        r
    }

    /// Rows $00-$BF, columns B/C: ASL/ROL/LSR/ROR/DEC/INC on d, !a, d+X and A.
    fn exec_read_modify_write(&mut self, op: u8, bus: &mut dyn SpcBus) {
        let row = op >> 5;
        let addr = match op & 0x1F {
            0x0B => self.addr_dp(bus),
            0x0C => self.addr_abs(bus),
            0x1B => self.addr_dp_x(bus),
            _ => {
                self.a = self.shift(row, self.a);
                return;
            }
        };
        let v = bus.read(addr);
        let r = self.shift(row, v);
        bus.write(addr, r);
    }

    fn branch(&mut self, bus: &mut dyn SpcBus, taken: bool) -> u32 {
        let rel = self.fetch(bus) as i8;
        if taken {
            self.pc = self.pc.wrapping_add(rel as u16);
            BRANCH_TAKEN_CYCLES
        } else {
            0
        }
    }

    fn bit_op(&mut self, op: u8, bus: &mut dyn SpcBus) {
        let (addr, bit) = self.addr_bit(bus);
        let value = bus.read(addr);
        let set = (value >> bit) & 1 != 0;
        let c = self.psw.contains(Psw::CARRY);
        match op {
            0x0A => self.psw.set(Psw::CARRY, c | set),
            0x2A => self.psw.set(Psw::CARRY, c | !set),
            0x4A => self.psw.set(Psw::CARRY, c & set),
            0x6A => self.psw.set(Psw::CARRY, c & !set),
            0x8A => self.psw.set(Psw::CARRY, c ^ set),
            0xAA => self.psw.set(Psw::CARRY, set),
            0xCA => {
                let v = if c { value | (1 << bit) } else { value & !(1 << bit) };
                bus.write(addr, v);
            }
            _ => bus.write(addr, value ^ (1 << bit)), // NOT1
        }
    }

    fn call(&mut self, bus: &mut dyn SpcBus, target: u16) {
        let pc = self.pc;
        self.push16(bus, pc);
        self.pc = target;
    }

    fn divide(&mut self) {
        let ya = self.ya() as u32;
        let x = self.x as u32;
        self.psw.set(Psw::OVERFLOW, self.y as u32 >= x);
        self.psw.set(Psw::HALF_CARRY, (self.y & 0x0F) >= (self.x & 0x0F));
        if (self.y as u32) < (x << 1) {
            self.a = (ya / x) as u8;
            self.y = (ya % x) as u8;
        } else {
            let rem = ya - (x << 9);
            self.a = (255 - rem / (256 - x)) as u8;
            self.y = (x + rem % (256 - x)) as u8;
        }
        self.set_nz(self.a);
    }

    /// Executes one instruction and returns its SPC cycle count.
    pub fn step(&mut self, bus: &mut dyn SpcBus) -> u32 {
        if self.stopped {
            return 2;
        }
        let opcode_pc = self.pc;
        let op = self.fetch(bus);
        let mut cycles = CYCLES[op as usize] as u32;

        match op {
            _ if op < 0xC0 && (0x04..=0x09).contains(&(op & 0x0F)) => self.exec_alu(op, bus),
            _ if op < 0xC0 && matches!(op & 0x0F, 0x0B | 0x0C) => {
                self.exec_read_modify_write(op, bus)
            }

            // TCALL n
            _ if op & 0x0F == 0x01 => {
                let vector = 0xFFDE - ((op >> 4) as u16) * 2;
                let target = read16(bus, vector);
                self.call(bus, target);
            }
            // SET1 / CLR1 d.b
            _ if op & 0x0F == 0x02 => {
                let addr = self.addr_dp(bus);
                let mask = 1u8 << (op >> 5);
                let v = bus.read(addr);
                let v = if op & 0x10 == 0 { v | mask } else { v & !mask };
                bus.write(addr, v);
            }
            // BBS / BBC d.b,r
            _ if op & 0x0F == 0x03 => {
                let addr = self.addr_dp(bus);
                let set = bus.read(addr) & (1 << (op >> 5)) != 0;
                let want = op & 0x10 == 0;
                cycles += self.branch(bus, set == want);
            }
            // 条件分岐
            _ if op & 0x1F == 0x10 => {
                let flag = match op >> 6 {
                    0 => Psw::NEGATIVE,
                    1 => Psw::OVERFLOW,
                    2 => Psw::CARRY,
                    _ => Psw::ZERO,
                };
                let want = (op >> 5) & 1 != 0;
                let taken = self.psw.contains(flag) == want;
                cycles += self.branch(bus, taken);
            }
            0x0A | 0x2A | 0x4A | 0x6A | 0x8A | 0xAA | 0xCA | 0xEA => self.bit_op(op, bus),

            0x00 => {}
            0x2F => cycles += self.branch(bus, true),

            // flags
            0x20 => self.psw.remove(Psw::DIRECT_PAGE),
            0x40 => self.psw.insert(Psw::DIRECT_PAGE),
            0x60 => self.psw.remove(Psw::CARRY),
            0x80 => self.psw.insert(Psw::CARRY),
            0xA0 => self.psw.insert(Psw::INTERRUPT),
            0xC0 => self.psw.remove(Psw::INTERRUPT),
            0xE0 => self.psw.remove(Psw::OVERFLOW | Psw::HALF_CARRY),
            0xED => self.psw.toggle(Psw::CARRY),

            // stack
            0x0D => {
                let p = self.psw.bits();
                self.push(bus, p);
            }
            0x2D => {
                let a = self.a;
                self.push(bus, a);
            }
            0x4D => {
                let x = self.x;
                self.push(bus, x);
            }
            0x6D => {
                let y = self.y;
                self.push(bus, y);
            }
            0x8E => self.psw = Psw::from_bits_truncate(self.pop(bus)),
            0xAE => self.a = self.pop(bus),
            0xCE => self.x = self.pop(bus),
            0xEE => self.y = self.pop(bus),

            // TSET1 / TCLR1 !a
            0x0E | 0x4E => {
                let addr = self.addr_abs(bus);
                let v = bus.read(addr);
                self.set_nz(self.a.wrapping_sub(v));
                let r = if op == 0x0E { v | self.a } else { v & !self.a };
                bus.write(addr, r);
            }
            0x0F => {
                let pc = self.pc;
                self.push16(bus, pc);
                let p = self.psw.bits();
                self.push(bus, p);
                self.psw.insert(Psw::BREAK);
                self.psw.remove(Psw::INTERRUPT);
                self.pc = read16(bus, 0xFFDE);
            }

            // 16-bit
            0x1A | 0x3A => {
                let d = self.fetch(bus);
                let v = self.read_dp16(bus, d);
                let r = if op == 0x1A { v.wrapping_sub(1) } else { v.wrapping_add(1) };
                self.write_dp16(bus, d, r);
                self.set_nz16(r);
            }
            0x5A => {
                let d = self.fetch(bus);
                let w = self.read_dp16(bus, d);
                let ya = self.ya();
                self.psw.set(Psw::CARRY, ya >= w);
                self.set_nz16(ya.wrapping_sub(w));
            }
            0x7A => {
                let d = self.fetch(bus);
                let w = self.read_dp16(bus, d);
                let ya = self.ya();
                let r = ya as u32 + w as u32;
                let r16 = r as u16;
                self.psw.set(Psw::CARRY, r > 0xFFFF);
                self.psw.set(Psw::HALF_CARRY, (ya ^ w ^ r16) & 0x1000 != 0);
                self.psw.set(Psw::OVERFLOW, (!(ya ^ w) & (ya ^ r16) & 0x8000) != 0);
                self.set_ya(r16);
                self.set_nz16(r16);
            }
            0x9A => {
                let d = self.fetch(bus);
                let w = self.read_dp16(bus, d);
                let ya = self.ya();
                let r = ya.wrapping_sub(w);
                self.psw.set(Psw::CARRY, ya >= w);
                self.psw.set(Psw::HALF_CARRY, (ya ^ w ^ r) & 0x1000 == 0);
                self.psw.set(Psw::OVERFLOW, ((ya ^ w) & (ya ^ r) & 0x8000) != 0);
                self.set_ya(r);
                self.set_nz16(r);
            }
            0xBA => {
                let d = self.fetch(bus);
                let v = self.read_dp16(bus, d);
                self.set_ya(v);
                self.set_nz16(v);
            }
            0xDA => {
                let d = self.fetch(bus);
                let ya = self.ya();
                self.write_dp16(bus, d, ya);
            }

            // INC/DEC/shift on registers outside the regular block
            0x1D => {
                self.x = self.x.wrapping_sub(1);
                self.set_nz(self.x);
            }
            0x3D => {
                self.x = self.x.wrapping_add(1);
                self.set_nz(self.x);
            }
            0xDC => {
                self.y = self.y.wrapping_sub(1);
                self.set_nz(self.y);
            }
            0xFC => {
                self.y = self.y.wrapping_add(1);
                self.set_nz(self.y);
            }

            // CMP X / CMP Y
            0x1E | 0x3E | 0xC8 | 0x5E | 0x7E | 0xAD => {
                let b = match op {
                    0x1E | 0x5E => {
                        let addr = self.addr_abs(bus);
                        bus.read(addr)
                    }
                    0x3E | 0x7E => {
                        let addr = self.addr_dp(bus);
                        bus.read(addr)
                    }
                    _ => self.fetch(bus),
                };
                let reg = if matches!(op, 0x1E | 0x3E | 0xC8) { self.x } else { self.y };
                self.compare(reg, b);
            }

            // jumps and calls
            0x1F => {
                let base = self.fetch16(bus).wrapping_add(self.x as u16);
                self.pc = read16(bus, base);
            }
            0x5F => self.pc = self.fetch16(bus),
            0x3F => {
                let target = self.fetch16(bus);
                self.call(bus, target);
            }
            0x4F => {
                let target = 0xFF00 | self.fetch(bus) as u16;
                self.call(bus, target);
            }
            0x6F => self.pc = self.pop16(bus),
            0x7F => {
                self.psw = Psw::from_bits_truncate(self.pop(bus));
                self.pc = self.pop16(bus);
            }

            // CBNE / DBNZ
            0x2E | 0xDE => {
                let addr = if op == 0x2E {
                    self.addr_dp(bus)
                } else {
                    self.addr_dp_x(bus)
                };
                let v = bus.read(addr);
                cycles += self.branch(bus, self.a != v);
            }
            0x6E => {
                let addr = self.addr_dp(bus);
                let v = bus.read(addr).wrapping_sub(1);
                bus.write(addr, v);
                cycles += self.branch(bus, v != 0);
            }
            0xFE => {
                self.y = self.y.wrapping_sub(1);
                let taken = self.y != 0;
                cycles += self.branch(bus, taken);
            }

            // register transfers
            0x5D => {
                self.x = self.a;
                self.set_nz(self.x);
            }
            0x7D => {
                self.a = self.x;
                self.set_nz(self.a);
            }
            0x9D => {
                self.x = self.sp;
                self.set_nz(self.x);
            }
            0xBD => self.sp = self.x,
            0xDD => {
                self.a = self.y;
                self.set_nz(self.a);
            }
            0xFD => {
                self.y = self.a;
                self.set_nz(self.y);
            }

            // MUL / DIV / decimal / nibble swap
            0xCF => {
                let r = self.y as u16 * self.a as u16;
                self.set_ya(r);
                self.set_nz(self.y);
            }
            0x9E => self.divide(),
            0xDF => {
                if self.psw.contains(Psw::CARRY) || self.a > 0x99 {
                    self.a = self.a.wrapping_add(0x60);
                    self.psw.insert(Psw::CARRY);
                }
                if self.psw.contains(Psw::HALF_CARRY) || (self.a & 0x0F) > 9 {
                    self.a = self.a.wrapping_add(6);
                }
                self.set_nz(self.a);
            }
            0xBE => {
                if !self.psw.contains(Psw::CARRY) || self.a > 0x99 {
                    self.a = self.a.wrapping_sub(0x60);
                    self.psw.remove(Psw::CARRY);
                }
                if !self.psw.contains(Psw::HALF_CARRY) || (self.a & 0x0F) > 9 {
                    self.a = self.a.wrapping_sub(6);
                }
                self.set_nz(self.a);
            }
            0x9F => {
                self.a = self.a.rotate_left(4);
                self.set_nz(self.a);
            }

            // loads
            0x8D | 0xCD | 0xE8 => {
                let v = self.fetch(bus);
                match op {
                    0x8D => self.y = v,
                    0xCD => self.x = v,
                    _ => self.a = v,
                }
                self.set_nz(v);
            }
            0xE4 | 0xE5 | 0xE6 | 0xE7 | 0xF4 | 0xF5 | 0xF6 | 0xF7 | 0xBF => {
                let addr = match op {
                    0xE4 => self.addr_dp(bus),
                    0xE5 => self.addr_abs(bus),
                    0xE6 | 0xBF => self.dp(self.x),
                    0xE7 => self.addr_ind_x(bus),
                    0xF4 => self.addr_dp_x(bus),
                    0xF5 => self.addr_abs_x(bus),
                    0xF6 => self.addr_abs_y(bus),
                    _ => self.addr_ind_y(bus),
                };
                self.a = bus.read(addr);
                self.set_nz(self.a);
                if op == 0xBF {
                    self.x = self.x.wrapping_add(1);
                }
            }
            0xF8 | 0xF9 | 0xE9 => {
                let addr = match op {
                    0xF8 => self.addr_dp(bus),
                    0xF9 => self.addr_dp_y(bus),
                    _ => self.addr_abs(bus),
                };
                self.x = bus.read(addr);
                self.set_nz(self.x);
            }
            0xEB | 0xFB | 0xEC => {
                let addr = match op {
                    0xEB => self.addr_dp(bus),
                    0xFB => self.addr_dp_x(bus),
                    _ => self.addr_abs(bus),
                };
                self.y = bus.read(addr);
                self.set_nz(self.y);
            }

            // stores (no flags)
            0xC4 | 0xC5 | 0xC6 | 0xC7 | 0xD4 | 0xD5 | 0xD6 | 0xD7 | 0xAF => {
                let addr = match op {
                    0xC4 => self.addr_dp(bus),
                    0xC5 => self.addr_abs(bus),
                    0xC6 | 0xAF => self.dp(self.x),
                    0xC7 => self.addr_ind_x(bus),
                    0xD4 => self.addr_dp_x(bus),
                    0xD5 => self.addr_abs_x(bus),
                    0xD6 => self.addr_abs_y(bus),
                    _ => self.addr_ind_y(bus),
                };
                bus.write(addr, self.a);
                if op == 0xAF {
                    self.x = self.x.wrapping_add(1);
                }
            }
            0xD8 | 0xD9 | 0xC9 => {
                let addr = match op {
                    0xD8 => self.addr_dp(bus),
                    0xD9 => self.addr_dp_y(bus),
                    _ => self.addr_abs(bus),
                };
                bus.write(addr, self.x);
            }
            0xCB | 0xDB | 0xCC => {
                let addr = match op {
                    0xCB => self.addr_dp(bus),
                    0xDB => self.addr_dp_x(bus),
                    _ => self.addr_abs(bus),
                };
                bus.write(addr, self.y);
            }
            0x8F => {
                let v = self.fetch(bus);
                let addr = self.addr_dp(bus);
                bus.write(addr, v);
            }
            0xFA => {
                let src = self.addr_dp(bus);
                let dst = self.addr_dp(bus);
                let v = bus.read(src);
                bus.write(dst, v);
            }

            0xEF | 0xFF => {
                self.stopped = true;
                log::debug!("SPC700 halted by ${:02X} at ${:04X}", op, opcode_pc);
            }

            _ => {
                if debug_flags::apu() || debug_flags::first_n(&UNKNOWN_OPCODE_LOG, 32) {
                    log::warn!("SPC700 unknown opcode 0x{:02X} at 0x{:04X}", op, opcode_pc);
                }
                cycles = 2;
            }
        }
        cycles
    }
}

fn read16(bus: &mut dyn SpcBus, addr: u16) -> u16 {
    let lo = bus.read(addr) as u16;
    let hi = bus.read(addr.wrapping_add(1)) as u16;
    (hi << 8) | lo
}
