// Declarative (cpu requirement, mnemonic, mode, opcode, length) table.
//
// Opcode values are the real, well-known 6502/65C02 encodings; the
// 65816 rows cover only the handful of bank/register-width and stack
// instructions implemented by this crate (full 65816 24-bit addressing
// is out of scope — this assembler targets the 6502 family per spec §1,
// and 65816 selection mainly exists so `.CPU 65816` doesn't reject the
// base instruction set).

use super::CpuReq;
use crate::operand::AddrMode;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Entry {
    pub cpu:      CpuReq,
    pub mnemonic: &'static str,
    pub mode:     AddrMode,
    pub opcode:   u8,
    pub length:   u8,
}

use AddrMode::*;
use CpuReq::*;

macro_rules! row {
    ($cpu:expr, $mnem:expr, $mode:expr, $op:expr, $len:expr) => {
        Entry { cpu: $cpu, mnemonic: $mnem, mode: $mode, opcode: $op, length: $len }
    };
}

pub static TABLE: &[Entry] = &[
    // --- implied / single-byte ---
    row!(Base, "BRK", Implied, 0x00, 1),
    row!(Base, "RTI", Implied, 0x40, 1),
    row!(Base, "RTS", Implied, 0x60, 1),
    row!(Base, "PHP", Implied, 0x08, 1),
    row!(Base, "PLP", Implied, 0x28, 1),
    row!(Base, "PHA", Implied, 0x48, 1),
    row!(Base, "PLA", Implied, 0x68, 1),
    row!(Base, "DEY", Implied, 0x88, 1),
    row!(Base, "TAY", Implied, 0xA8, 1),
    row!(Base, "INY", Implied, 0xC8, 1),
    row!(Base, "INX", Implied, 0xE8, 1),
    row!(Base, "CLC", Implied, 0x18, 1),
    row!(Base, "SEC", Implied, 0x38, 1),
    row!(Base, "CLI", Implied, 0x58, 1),
    row!(Base, "SEI", Implied, 0x78, 1),
    row!(Base, "TYA", Implied, 0x98, 1),
    row!(Base, "CLV", Implied, 0xB8, 1),
    row!(Base, "CLD", Implied, 0xD8, 1),
    row!(Base, "SED", Implied, 0xF8, 1),
    row!(Base, "TXA", Implied, 0x8A, 1),
    row!(Base, "TXS", Implied, 0x9A, 1),
    row!(Base, "TAX", Implied, 0xAA, 1),
    row!(Base, "TSX", Implied, 0xBA, 1),
    row!(Base, "DEX", Implied, 0xCA, 1),
    row!(Base, "NOP", Implied, 0xEA, 1),

    // --- 65C02 implied additions ---
    row!(C02Plus, "PHX", Implied, 0xDA, 1),
    row!(C02Plus, "PHY", Implied, 0x5A, 1),
    row!(C02Plus, "PLX", Implied, 0xFA, 1),
    row!(C02Plus, "PLY", Implied, 0x7A, 1),

    // --- relative branches (short) ---
    row!(Base, "BPL", RelativeShort, 0x10, 2),
    row!(Base, "BMI", RelativeShort, 0x30, 2),
    row!(Base, "BVC", RelativeShort, 0x50, 2),
    row!(Base, "BVS", RelativeShort, 0x70, 2),
    row!(Base, "BCC", RelativeShort, 0x90, 2),
    row!(Base, "BCS", RelativeShort, 0xB0, 2),
    row!(Base, "BNE", RelativeShort, 0xD0, 2),
    row!(Base, "BEQ", RelativeShort, 0xF0, 2),
    row!(C02Plus, "BRA", RelativeShort, 0x80, 2),

    // --- long (45GS02) branches: opcode is the short form OR 3 ---
    row!(Gs02Only, "BPL", RelativeLong, 0x13, 3),
    row!(Gs02Only, "BMI", RelativeLong, 0x33, 3),
    row!(Gs02Only, "BVC", RelativeLong, 0x53, 3),
    row!(Gs02Only, "BVS", RelativeLong, 0x73, 3),
    row!(Gs02Only, "BCC", RelativeLong, 0x93, 3),
    row!(Gs02Only, "BCS", RelativeLong, 0xB3, 3),
    row!(Gs02Only, "BNE", RelativeLong, 0xD3, 3),
    row!(Gs02Only, "BEQ", RelativeLong, 0xF3, 3),
    row!(Gs02Only, "BRA", RelativeLong, 0x83, 3),

    // --- ADC ---
    row!(Base, "ADC", Immediate,   0x69, 2),
    row!(Base, "ADC", DirectPage,  0x65, 2),
    row!(Base, "ADC", DirectPageX, 0x75, 2),
    row!(Base, "ADC", Absolute,    0x6D, 3),
    row!(Base, "ADC", AbsoluteX,   0x7D, 3),
    row!(Base, "ADC", AbsoluteY,   0x79, 3),
    row!(Base, "ADC", IndirectX,   0x61, 2),
    row!(Base, "ADC", IndirectY,   0x71, 2),
    row!(C02Plus, "ADC", IndirectZ, 0x72, 2),

    // --- AND ---
    row!(Base, "AND", Immediate,   0x29, 2),
    row!(Base, "AND", DirectPage,  0x25, 2),
    row!(Base, "AND", DirectPageX, 0x35, 2),
    row!(Base, "AND", Absolute,    0x2D, 3),
    row!(Base, "AND", AbsoluteX,   0x3D, 3),
    row!(Base, "AND", AbsoluteY,   0x39, 3),
    row!(Base, "AND", IndirectX,   0x21, 2),
    row!(Base, "AND", IndirectY,   0x31, 2),
    row!(C02Plus, "AND", IndirectZ, 0x32, 2),

    // --- ASL ---
    row!(Base, "ASL", Accumulator, 0x0A, 1),
    row!(Base, "ASL", DirectPage,  0x06, 2),
    row!(Base, "ASL", DirectPageX, 0x16, 2),
    row!(Base, "ASL", Absolute,    0x0E, 3),
    row!(Base, "ASL", AbsoluteX,   0x1E, 3),

    // --- BIT ---
    row!(Base, "BIT", DirectPage,  0x24, 2),
    row!(Base, "BIT", Absolute,    0x2C, 3),
    row!(C02Plus, "BIT", Immediate,   0x89, 2),
    row!(C02Plus, "BIT", DirectPageX, 0x34, 2),
    row!(C02Plus, "BIT", AbsoluteX,   0x3C, 3),

    // --- CMP ---
    row!(Base, "CMP", Immediate,   0xC9, 2),
    row!(Base, "CMP", DirectPage,  0xC5, 2),
    row!(Base, "CMP", DirectPageX, 0xD5, 2),
    row!(Base, "CMP", Absolute,    0xCD, 3),
    row!(Base, "CMP", AbsoluteX,   0xDD, 3),
    row!(Base, "CMP", AbsoluteY,   0xD9, 3),
    row!(Base, "CMP", IndirectX,   0xC1, 2),
    row!(Base, "CMP", IndirectY,   0xD1, 2),
    row!(C02Plus, "CMP", IndirectZ, 0xD2, 2),

    // --- CPX / CPY ---
    row!(Base, "CPX", Immediate,  0xE0, 2),
    row!(Base, "CPX", DirectPage, 0xE4, 2),
    row!(Base, "CPX", Absolute,   0xEC, 3),
    row!(Base, "CPY", Immediate,  0xC0, 2),
    row!(Base, "CPY", DirectPage, 0xC4, 2),
    row!(Base, "CPY", Absolute,   0xCC, 3),

    // --- DEC / INC (memory) ---
    row!(Base, "DEC", DirectPage,  0xC6, 2),
    row!(Base, "DEC", DirectPageX, 0xD6, 2),
    row!(Base, "DEC", Absolute,    0xCE, 3),
    row!(Base, "DEC", AbsoluteX,   0xDE, 3),
    row!(C02Plus, "DEC", Accumulator, 0x3A, 1),
    row!(Base, "INC", DirectPage,  0xE6, 2),
    row!(Base, "INC", DirectPageX, 0xF6, 2),
    row!(Base, "INC", Absolute,    0xEE, 3),
    row!(Base, "INC", AbsoluteX,   0xFE, 3),
    row!(C02Plus, "INC", Accumulator, 0x1A, 1),

    // --- EOR ---
    row!(Base, "EOR", Immediate,   0x49, 2),
    row!(Base, "EOR", DirectPage,  0x45, 2),
    row!(Base, "EOR", DirectPageX, 0x55, 2),
    row!(Base, "EOR", Absolute,    0x4D, 3),
    row!(Base, "EOR", AbsoluteX,   0x5D, 3),
    row!(Base, "EOR", AbsoluteY,   0x59, 3),
    row!(Base, "EOR", IndirectX,   0x41, 2),
    row!(Base, "EOR", IndirectY,   0x51, 2),
    row!(C02Plus, "EOR", IndirectZ, 0x52, 2),

    // --- JMP / JSR ---
    row!(Base, "JMP", Absolute, 0x4C, 3),
    row!(Base, "JMP", Indirect, 0x6C, 3),
    row!(C02Plus, "JMP", IndirectX, 0x7C, 3),
    row!(Base, "JSR", Absolute, 0x20, 3),
    row!(Base, "JSR", IndirectX, 0xFC, 3),

    // --- LDA / LDX / LDY ---
    row!(Base, "LDA", Immediate,   0xA9, 2),
    row!(Base, "LDA", DirectPage,  0xA5, 2),
    row!(Base, "LDA", DirectPageX, 0xB5, 2),
    row!(Base, "LDA", Absolute,    0xAD, 3),
    row!(Base, "LDA", AbsoluteX,   0xBD, 3),
    row!(Base, "LDA", AbsoluteY,   0xB9, 3),
    row!(Base, "LDA", IndirectX,   0xA1, 2),
    row!(Base, "LDA", IndirectY,   0xB1, 2),
    row!(C02Plus, "LDA", IndirectZ, 0xB2, 2),
    row!(Base, "LDX", Immediate,   0xA2, 2),
    row!(Base, "LDX", DirectPage,  0xA6, 2),
    row!(Base, "LDX", DirectPageY, 0xB6, 2),
    row!(Base, "LDX", Absolute,    0xAE, 3),
    row!(Base, "LDX", AbsoluteY,   0xBE, 3),
    row!(Base, "LDY", Immediate,   0xA0, 2),
    row!(Base, "LDY", DirectPage,  0xA4, 2),
    row!(Base, "LDY", DirectPageX, 0xB4, 2),
    row!(Base, "LDY", Absolute,    0xAC, 3),
    row!(Base, "LDY", AbsoluteX,   0xBC, 3),

    // --- LSR ---
    row!(Base, "LSR", Accumulator, 0x4A, 1),
    row!(Base, "LSR", DirectPage,  0x46, 2),
    row!(Base, "LSR", DirectPageX, 0x56, 2),
    row!(Base, "LSR", Absolute,    0x4E, 3),
    row!(Base, "LSR", AbsoluteX,   0x5E, 3),

    // --- ORA ---
    row!(Base, "ORA", Immediate,   0x09, 2),
    row!(Base, "ORA", DirectPage,  0x05, 2),
    row!(Base, "ORA", DirectPageX, 0x15, 2),
    row!(Base, "ORA", Absolute,    0x0D, 3),
    row!(Base, "ORA", AbsoluteX,   0x1D, 3),
    row!(Base, "ORA", AbsoluteY,   0x19, 3),
    row!(Base, "ORA", IndirectX,   0x01, 2),
    row!(Base, "ORA", IndirectY,   0x11, 2),
    row!(C02Plus, "ORA", IndirectZ, 0x12, 2),

    // --- ROL / ROR ---
    row!(Base, "ROL", Accumulator, 0x2A, 1),
    row!(Base, "ROL", DirectPage,  0x26, 2),
    row!(Base, "ROL", DirectPageX, 0x36, 2),
    row!(Base, "ROL", Absolute,    0x2E, 3),
    row!(Base, "ROL", AbsoluteX,   0x3E, 3),
    row!(Base, "ROR", Accumulator, 0x6A, 1),
    row!(Base, "ROR", DirectPage,  0x66, 2),
    row!(Base, "ROR", DirectPageX, 0x76, 2),
    row!(Base, "ROR", Absolute,    0x6E, 3),
    row!(Base, "ROR", AbsoluteX,   0x7E, 3),

    // --- SBC ---
    row!(Base, "SBC", Immediate,   0xE9, 2),
    row!(Base, "SBC", DirectPage,  0xE5, 2),
    row!(Base, "SBC", DirectPageX, 0xF5, 2),
    row!(Base, "SBC", Absolute,    0xED, 3),
    row!(Base, "SBC", AbsoluteX,   0xFD, 3),
    row!(Base, "SBC", AbsoluteY,   0xF9, 3),
    row!(Base, "SBC", IndirectX,   0xE1, 2),
    row!(Base, "SBC", IndirectY,   0xF1, 2),
    row!(C02Plus, "SBC", IndirectZ, 0xF2, 2),

    // --- STA / STX / STY / STZ ---
    row!(Base, "STA", DirectPage,  0x85, 2),
    row!(Base, "STA", DirectPageX, 0x95, 2),
    row!(Base, "STA", Absolute,    0x8D, 3),
    row!(Base, "STA", AbsoluteX,   0x9D, 3),
    row!(Base, "STA", AbsoluteY,   0x99, 3),
    row!(Base, "STA", IndirectX,   0x81, 2),
    row!(Base, "STA", IndirectY,   0x91, 2),
    row!(C02Plus, "STA", IndirectZ, 0x92, 2),
    row!(Base, "STX", DirectPage,  0x86, 2),
    row!(Base, "STX", DirectPageY, 0x96, 2),
    row!(Base, "STX", Absolute,    0x8E, 3),
    row!(Base, "STY", DirectPage,  0x84, 2),
    row!(Base, "STY", DirectPageX, 0x94, 2),
    row!(Base, "STY", Absolute,    0x8C, 3),
    row!(C02Plus, "STZ", DirectPage,  0x64, 2),
    row!(C02Plus, "STZ", DirectPageX, 0x74, 2),
    row!(C02Plus, "STZ", Absolute,    0x9C, 3),
    row!(C02Plus, "STZ", AbsoluteX,   0x9E, 3),

    // --- TRB / TSB (65C02) ---
    row!(C02Plus, "TRB", DirectPage, 0x14, 2),
    row!(C02Plus, "TRB", Absolute,   0x1C, 3),
    row!(C02Plus, "TSB", DirectPage, 0x04, 2),
    row!(C02Plus, "TSB", Absolute,   0x0C, 3),

    // --- 65816 additions (subset) ---
    row!(W65816Only, "REP", Immediate, 0xC2, 2),
    row!(W65816Only, "SEP", Immediate, 0xE2, 2),
    row!(W65816Only, "XCE", Implied,   0xFB, 1),
    row!(W65816Only, "XBA", Implied,   0xEB, 1),
    row!(W65816Only, "TCD", Implied,   0x5B, 1),
    row!(W65816Only, "TDC", Implied,   0x7B, 1),
    row!(W65816Only, "TCS", Implied,   0x1B, 1),
    row!(W65816Only, "TSC", Implied,   0x3B, 1),
    row!(W65816Only, "PHB", Implied,   0x8B, 1),
    row!(W65816Only, "PLB", Implied,   0xAB, 1),
    row!(W65816Only, "PHD", Implied,   0x0B, 1),
    row!(W65816Only, "PLD", Implied,   0x2B, 1),
    row!(W65816Only, "PHK", Implied,   0x4B, 1),

    // --- 45GS02 test-bit-branch and 32-bit indirect ---
    row!(Gs02Only, "BBR0", TestBitBranch, 0x0F, 3),
    row!(Gs02Only, "BBR1", TestBitBranch, 0x1F, 3),
    row!(Gs02Only, "BBR2", TestBitBranch, 0x2F, 3),
    row!(Gs02Only, "BBR3", TestBitBranch, 0x3F, 3),
    row!(Gs02Only, "BBR4", TestBitBranch, 0x4F, 3),
    row!(Gs02Only, "BBR5", TestBitBranch, 0x5F, 3),
    row!(Gs02Only, "BBR6", TestBitBranch, 0x6F, 3),
    row!(Gs02Only, "BBR7", TestBitBranch, 0x7F, 3),
    row!(Gs02Only, "BBS0", TestBitBranch, 0x8F, 3),
    row!(Gs02Only, "BBS1", TestBitBranch, 0x9F, 3),
    row!(Gs02Only, "BBS2", TestBitBranch, 0xAF, 3),
    row!(Gs02Only, "BBS3", TestBitBranch, 0xBF, 3),
    row!(Gs02Only, "BBS4", TestBitBranch, 0xCF, 3),
    row!(Gs02Only, "BBS5", TestBitBranch, 0xDF, 3),
    row!(Gs02Only, "BBS6", TestBitBranch, 0xEF, 3),
    row!(Gs02Only, "BBS7", TestBitBranch, 0xFF, 3),
    // Indirect32 carries the *base* indirect-Z opcode here; the encoder
    // prepends the 0xEA escape byte and emits a single zero-page operand
    // byte, not the two bytes `length` would imply for a plain table row.
    row!(Gs02Only, "LDA", Indirect32, 0xB2, 3),
    row!(Gs02Only, "STA", Indirect32, 0x92, 3),
];
