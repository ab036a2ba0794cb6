//! Opcode table: every byte the core understands decodes to a mnemonic, an
//! addressing mode and a base cycle cost. Bytes missing here are treated as
//! 2-cycle no-ops by the executor.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    Implied,
    Accumulator,
    Immediate,
    Direct,
    DirectX,
    DirectY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    /// `(dp,X)`
    DirectIndexedIndirect,
    /// `(dp),Y`
    DirectIndirectIndexed,
    /// `(dp)`
    DirectIndirect,
    /// `(abs,X)`, JMP only
    AbsoluteIndexedIndirect,
    Relative,
}

impl AddressingMode {
    /// Operand bytes following the opcode.
    pub fn operand_len(self) -> u16 {
        match self {
            AddressingMode::Implied | AddressingMode::Accumulator => 0,
            AddressingMode::Immediate
            | AddressingMode::Direct
            | AddressingMode::DirectX
            | AddressingMode::DirectY
            | AddressingMode::DirectIndexedIndirect
            | AddressingMode::DirectIndirectIndexed
            | AddressingMode::DirectIndirect
            | AddressingMode::Relative => 1,
            AddressingMode::Absolute
            | AddressingMode::AbsoluteX
            | AddressingMode::AbsoluteY
            | AddressingMode::Indirect
            | AddressingMode::AbsoluteIndexedIndirect => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Adc,
    And,
    Asl,
    Bcc,
    Bcs,
    Beq,
    Bit,
    Bmi,
    Bne,
    Bpl,
    Bra,
    Brk,
    Bvc,
    Bvs,
    Clc,
    Cld,
    Cli,
    Clv,
    Cmp,
    Cpx,
    Cpy,
    Dec,
    Dex,
    Dey,
    Eor,
    Inc,
    Inx,
    Iny,
    Jmp,
    Jsr,
    Lda,
    Ldx,
    Ldy,
    Lsr,
    Nop,
    Ora,
    Pha,
    Php,
    Phx,
    Phy,
    Pla,
    Plp,
    Plx,
    Ply,
    Rol,
    Ror,
    Rti,
    Rts,
    Sbc,
    Sec,
    Sed,
    Sei,
    Sta,
    Stp,
    Stx,
    Sty,
    Stz,
    Tax,
    Tay,
    Trb,
    Tsb,
    Tsx,
    Txa,
    Txs,
    Tya,
    Wai,
}

impl Mnemonic {
    /// Read-type instructions pay one extra cycle when indexing crosses a page.
    pub fn pays_page_penalty(self) -> bool {
        matches!(
            self,
            Mnemonic::Adc
                | Mnemonic::And
                | Mnemonic::Bit
                | Mnemonic::Cmp
                | Mnemonic::Eor
                | Mnemonic::Lda
                | Mnemonic::Ldx
                | Mnemonic::Ldy
                | Mnemonic::Ora
                | Mnemonic::Sbc
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub mode: AddressingMode,
    pub cycles: u8,
}

const fn op(mnemonic: Mnemonic, mode: AddressingMode, cycles: u8) -> Option<Instruction> {
    Some(Instruction {
        mnemonic,
        mode,
        cycles,
    })
}

pub fn decode(opcode: u8) -> Option<Instruction> {
    use AddressingMode::*;
    use Mnemonic::*;

    match opcode {
        // ADC
        0x69 => op(Adc, Immediate, 2),
        0x65 => op(Adc, Direct, 3),
        0x75 => op(Adc, DirectX, 4),
        0x6D => op(Adc, Absolute, 4),
        0x7D => op(Adc, AbsoluteX, 4),
        0x79 => op(Adc, AbsoluteY, 4),
        0x61 => op(Adc, DirectIndexedIndirect, 6),
        0x71 => op(Adc, DirectIndirectIndexed, 5),
        0x72 => op(Adc, DirectIndirect, 5),
        // SBC
        0xE9 => op(Sbc, Immediate, 2),
        0xE5 => op(Sbc, Direct, 3),
        0xF5 => op(Sbc, DirectX, 4),
        0xED => op(Sbc, Absolute, 4),
        0xFD => op(Sbc, AbsoluteX, 4),
        0xF9 => op(Sbc, AbsoluteY, 4),
        0xE1 => op(Sbc, DirectIndexedIndirect, 6),
        0xF1 => op(Sbc, DirectIndirectIndexed, 5),
        0xF2 => op(Sbc, DirectIndirect, 5),
        // AND
        0x29 => op(And, Immediate, 2),
        0x25 => op(And, Direct, 3),
        0x35 => op(And, DirectX, 4),
        0x2D => op(And, Absolute, 4),
        0x3D => op(And, AbsoluteX, 4),
        0x39 => op(And, AbsoluteY, 4),
        0x21 => op(And, DirectIndexedIndirect, 6),
        0x31 => op(And, DirectIndirectIndexed, 5),
        0x32 => op(And, DirectIndirect, 5),
        // EOR
        0x49 => op(Eor, Immediate, 2),
        0x45 => op(Eor, Direct, 3),
        0x55 => op(Eor, DirectX, 4),
        0x4D => op(Eor, Absolute, 4),
        0x5D => op(Eor, AbsoluteX, 4),
        0x59 => op(Eor, AbsoluteY, 4),
        0x41 => op(Eor, DirectIndexedIndirect, 6),
        0x51 => op(Eor, DirectIndirectIndexed, 5),
        0x52 => op(Eor, DirectIndirect, 5),
        // ORA
        0x09 => op(Ora, Immediate, 2),
        0x05 => op(Ora, Direct, 3),
        0x15 => op(Ora, DirectX, 4),
        0x0D => op(Ora, Absolute, 4),
        0x1D => op(Ora, AbsoluteX, 4),
        0x19 => op(Ora, AbsoluteY, 4),
        0x01 => op(Ora, DirectIndexedIndirect, 6),
        0x11 => op(Ora, DirectIndirectIndexed, 5),
        0x12 => op(Ora, DirectIndirect, 5),
        // CMP / CPX / CPY
        0xC9 => op(Cmp, Immediate, 2),
        0xC5 => op(Cmp, Direct, 3),
        0xD5 => op(Cmp, DirectX, 4),
        0xCD => op(Cmp, Absolute, 4),
        0xDD => op(Cmp, AbsoluteX, 4),
        0xD9 => op(Cmp, AbsoluteY, 4),
        0xC1 => op(Cmp, DirectIndexedIndirect, 6),
        0xD1 => op(Cmp, DirectIndirectIndexed, 5),
        0xD2 => op(Cmp, DirectIndirect, 5),
        0xE0 => op(Cpx, Immediate, 2),
        0xE4 => op(Cpx, Direct, 3),
        0xEC => op(Cpx, Absolute, 4),
        0xC0 => op(Cpy, Immediate, 2),
        0xC4 => op(Cpy, Direct, 3),
        0xCC => op(Cpy, Absolute, 4),
        // BIT / TSB / TRB
        0x89 => op(Bit, Immediate, 2),
        0x24 => op(Bit, Direct, 3),
        0x34 => op(Bit, DirectX, 4),
        0x2C => op(Bit, Absolute, 4),
        0x3C => op(Bit, AbsoluteX, 4),
        0x04 => op(Tsb, Direct, 5),
        0x0C => op(Tsb, Absolute, 6),
        0x14 => op(Trb, Direct, 5),
        0x1C => op(Trb, Absolute, 6),
        // Shifts and rotates
        0x0A => op(Asl, Accumulator, 2),
        0x06 => op(Asl, Direct, 5),
        0x16 => op(Asl, DirectX, 6),
        0x0E => op(Asl, Absolute, 6),
        0x1E => op(Asl, AbsoluteX, 7),
        0x4A => op(Lsr, Accumulator, 2),
        0x46 => op(Lsr, Direct, 5),
        0x56 => op(Lsr, DirectX, 6),
        0x4E => op(Lsr, Absolute, 6),
        0x5E => op(Lsr, AbsoluteX, 7),
        0x2A => op(Rol, Accumulator, 2),
        0x26 => op(Rol, Direct, 5),
        0x36 => op(Rol, DirectX, 6),
        0x2E => op(Rol, Absolute, 6),
        0x3E => op(Rol, AbsoluteX, 7),
        0x6A => op(Ror, Accumulator, 2),
        0x66 => op(Ror, Direct, 5),
        0x76 => op(Ror, DirectX, 6),
        0x6E => op(Ror, Absolute, 6),
        0x7E => op(Ror, AbsoluteX, 7),
        // INC / DEC
        0x1A => op(Inc, Accumulator, 2),
        0xE6 => op(Inc, Direct, 5),
        0xF6 => op(Inc, DirectX, 6),
        0xEE => op(Inc, Absolute, 6),
        0xFE => op(Inc, AbsoluteX, 7),
        0x3A => op(Dec, Accumulator, 2),
        0xC6 => op(Dec, Direct, 5),
        0xD6 => op(Dec, DirectX, 6),
        0xCE => op(Dec, Absolute, 6),
        0xDE => op(Dec, AbsoluteX, 7),
        0xE8 => op(Inx, Implied, 2),
        0xCA => op(Dex, Implied, 2),
        0xC8 => op(Iny, Implied, 2),
        0x88 => op(Dey, Implied, 2),
        // Loads
        0xA9 => op(Lda, Immediate, 2),
        0xA5 => op(Lda, Direct, 3),
        0xB5 => op(Lda, DirectX, 4),
        0xAD => op(Lda, Absolute, 4),
        0xBD => op(Lda, AbsoluteX, 4),
        0xB9 => op(Lda, AbsoluteY, 4),
        0xA1 => op(Lda, DirectIndexedIndirect, 6),
        0xB1 => op(Lda, DirectIndirectIndexed, 5),
        0xB2 => op(Lda, DirectIndirect, 5),
        0xA2 => op(Ldx, Immediate, 2),
        0xA6 => op(Ldx, Direct, 3),
        0xB6 => op(Ldx, DirectY, 4),
        0xAE => op(Ldx, Absolute, 4),
        0xBE => op(Ldx, AbsoluteY, 4),
        0xA0 => op(Ldy, Immediate, 2),
        0xA4 => op(Ldy, Direct, 3),
        0xB4 => op(Ldy, DirectX, 4),
        0xAC => op(Ldy, Absolute, 4),
        0xBC => op(Ldy, AbsoluteX, 4),
        // Stores
        0x85 => op(Sta, Direct, 3),
        0x95 => op(Sta, DirectX, 4),
        0x8D => op(Sta, Absolute, 4),
        0x9D => op(Sta, AbsoluteX, 5),
        0x99 => op(Sta, AbsoluteY, 5),
        0x81 => op(Sta, DirectIndexedIndirect, 6),
        0x91 => op(Sta, DirectIndirectIndexed, 6),
        0x92 => op(Sta, DirectIndirect, 5),
        0x86 => op(Stx, Direct, 3),
        0x96 => op(Stx, DirectY, 4),
        0x8E => op(Stx, Absolute, 4),
        0x84 => op(Sty, Direct, 3),
        0x94 => op(Sty, DirectX, 4),
        0x8C => op(Sty, Absolute, 4),
        0x64 => op(Stz, Direct, 3),
        0x74 => op(Stz, DirectX, 4),
        0x9C => op(Stz, Absolute, 4),
        0x9E => op(Stz, AbsoluteX, 5),
        // Transfers
        0xAA => op(Tax, Implied, 2),
        0xA8 => op(Tay, Implied, 2),
        0xBA => op(Tsx, Implied, 2),
        0x8A => op(Txa, Implied, 2),
        0x9A => op(Txs, Implied, 2),
        0x98 => op(Tya, Implied, 2),
        // Stack
        0x48 => op(Pha, Implied, 3),
        0x08 => op(Php, Implied, 3),
        0xDA => op(Phx, Implied, 3),
        0x5A => op(Phy, Implied, 3),
        0x68 => op(Pla, Implied, 4),
        0x28 => op(Plp, Implied, 4),
        0xFA => op(Plx, Implied, 4),
        0x7A => op(Ply, Implied, 4),
        // Flags
        0x18 => op(Clc, Implied, 2),
        0x38 => op(Sec, Implied, 2),
        0x58 => op(Cli, Implied, 2),
        0x78 => op(Sei, Implied, 2),
        0xB8 => op(Clv, Implied, 2),
        0xD8 => op(Cld, Implied, 2),
        0xF8 => op(Sed, Implied, 2),
        // Branches
        0x10 => op(Bpl, Relative, 2),
        0x30 => op(Bmi, Relative, 2),
        0x50 => op(Bvc, Relative, 2),
        0x70 => op(Bvs, Relative, 2),
        0x80 => op(Bra, Relative, 2),
        0x90 => op(Bcc, Relative, 2),
        0xB0 => op(Bcs, Relative, 2),
        0xD0 => op(Bne, Relative, 2),
        0xF0 => op(Beq, Relative, 2),
        // Jumps, calls, returns
        0x4C => op(Jmp, Absolute, 3),
        0x6C => op(Jmp, Indirect, 5),
        0x7C => op(Jmp, AbsoluteIndexedIndirect, 6),
        0x20 => op(Jsr, Absolute, 6),
        0x60 => op(Rts, Implied, 6),
        0x40 => op(Rti, Implied, 6),
        // System
        0x00 => op(Brk, Immediate, 2),
        0xEA => op(Nop, Implied, 2),
        0xCB => op(Wai, Implied, 3),
        0xDB => op(Stp, Implied, 3),
        _ => None,
    }
}
