//! Bytecode
//!
//! Instruction set and the compiled code unit. Instructions are one opcode
//! byte followed by an operand whose shape depends on the opcode:
//!
//! | opcode | operand |
//! |--------|---------|
//! | `Int`  | zigzag varint, 7 bits per byte, little-endian |
//! | `Name`, `Pos` | 3-byte little-endian symbol id / offset |
//! | `Str`  | raw bytes terminated by NUL |
//! | others | none |

use crate::interner::Interner;
use crate::vars::RegDb;
use mapscript_core::UnitId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Write;

/// Largest offset or symbol id a 3-byte operand can carry
pub const MAX_OPERAND: u32 = 0x00FF_FFFF;

/// Script opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// End of script
    Nop = 0,
    /// End of statement
    Eol,
    Int,
    Pos,
    Name,
    Str,
    /// Argument-list marker
    Arg,
    /// Invoke the native below the nearest `Arg`
    Func,
    /// The next binary operator keeps its left reference
    Ref,

    // Ternary
    Op3,

    // Logical
    LOr,
    LAnd,

    // Comparison
    Le,
    Lt,
    Ge,
    Gt,
    Eq,
    Ne,

    // Bitwise
    Xor,
    Or,
    And,
    RShift,
    LShift,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Unary
    Neg,
    LNot,
    Not,

    // Increment/decrement
    AddPost,
    SubPost,
    AddPre,
    SubPre,
}

impl OpCode {
    const ALL: [OpCode; 35] = [
        OpCode::Nop,
        OpCode::Eol,
        OpCode::Int,
        OpCode::Pos,
        OpCode::Name,
        OpCode::Str,
        OpCode::Arg,
        OpCode::Func,
        OpCode::Ref,
        OpCode::Op3,
        OpCode::LOr,
        OpCode::LAnd,
        OpCode::Le,
        OpCode::Lt,
        OpCode::Ge,
        OpCode::Gt,
        OpCode::Eq,
        OpCode::Ne,
        OpCode::Xor,
        OpCode::Or,
        OpCode::And,
        OpCode::RShift,
        OpCode::LShift,
        OpCode::Add,
        OpCode::Sub,
        OpCode::Mul,
        OpCode::Div,
        OpCode::Mod,
        OpCode::Neg,
        OpCode::LNot,
        OpCode::Not,
        OpCode::AddPost,
        OpCode::SubPost,
        OpCode::AddPre,
        OpCode::SubPre,
    ];

    /// Convert opcode to byte
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Convert byte to opcode
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }

    /// Operators taking two operands
    pub fn is_binary(self) -> bool {
        (OpCode::LOr as u8..=OpCode::Mod as u8).contains(&(self as u8))
    }
}

/// Read a 3-byte little-endian operand
pub fn read_u24(buf: &[u8], pos: usize) -> Option<u32> {
    let bytes = buf.get(pos..pos + 3)?;
    Some(bytes[0] as u32 | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16)
}

/// Read a zigzag varint; returns the value and the offset after it
pub fn read_varint(buf: &[u8], pos: usize) -> Option<(i64, usize)> {
    let mut raw: u64 = 0;
    let mut shift = 0;
    let mut at = pos;
    loop {
        let byte = *buf.get(at)?;
        at += 1;
        if shift < 64 {
            raw |= ((byte & 0x7f) as u64) << shift;
        }
        shift += 7;
        if byte & 0x80 == 0 {
            break;
        }
    }
    let value = (raw >> 1) as i64 ^ -((raw & 1) as i64);
    Some((value, at))
}

/// Read NUL-terminated text; returns it and the offset after the NUL
pub fn read_cstr(buf: &[u8], pos: usize) -> Option<(&str, usize)> {
    let len = buf.get(pos..)?.iter().position(|&b| b == 0)?;
    let text = std::str::from_utf8(&buf[pos..pos + len]).ok()?;
    Some((text, pos + len + 1))
}

/// Append-only bytecode buffer used by the compiler
#[derive(Debug, Default)]
pub(crate) struct CodeWriter {
    buf: Vec<u8>,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn emit_op(&mut self, op: OpCode) {
        self.buf.push(op.to_byte());
    }

    pub fn emit_u24(&mut self, value: u32) {
        debug_assert!(value <= MAX_OPERAND);
        self.buf.extend_from_slice(&[value as u8, (value >> 8) as u8, (value >> 16) as u8]);
    }

    /// `Int` instruction
    pub fn emit_int(&mut self, value: i64) {
        self.emit_op(OpCode::Int);
        let mut raw = ((value << 1) ^ (value >> 63)) as u64;
        loop {
            let byte = (raw & 0x7f) as u8;
            raw >>= 7;
            if raw == 0 {
                self.buf.push(byte);
                break;
            }
            self.buf.push(byte | 0x80);
        }
    }

    /// `Str` instruction; text must not contain NUL
    pub fn emit_str(&mut self, text: &str) {
        self.emit_op(OpCode::Str);
        self.buf.extend_from_slice(text.as_bytes());
        self.buf.push(0);
    }

    pub fn read_u24(&self, pos: usize) -> u32 {
        read_u24(&self.buf, pos).unwrap_or(MAX_OPERAND)
    }

    /// Overwrite an operand and the opcode byte in front of it
    pub fn patch(&mut self, operand_pos: usize, op: OpCode, value: u32) {
        self.buf[operand_pos - 1] = op.to_byte();
        self.buf[operand_pos] = value as u8;
        self.buf[operand_pos + 1] = (value >> 8) as u8;
        self.buf[operand_pos + 2] = (value >> 16) as u8;
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Output of one successful compilation
#[derive(Debug, Default)]
pub struct CompiledCode {
    pub bytes: Vec<u8>,
    /// Author-visible labels and functions
    pub labels: HashMap<String, usize>,
    /// (offset, line) at each statement start, ascending
    pub lines: Vec<(usize, usize)>,
}

/// A compiled unit of bytecode
///
/// # Purpose
/// Immutable code plus the unit-instance (`.name`) variables every run of
/// this unit shares.
///
/// # Thread Safety
/// Units are shared through `Rc` by the engine and its execution states and
/// never cross threads.
#[derive(Debug)]
pub struct ScriptCode {
    id: UnitId,
    name: String,
    code: Box<[u8]>,
    labels: HashMap<String, usize>,
    lines: Vec<(usize, usize)>,
    pub(crate) locals: RefCell<RegDb>,
}

impl ScriptCode {
    pub fn new(id: UnitId, name: impl Into<String>, compiled: CompiledCode) -> Self {
        Self {
            id,
            name: name.into(),
            code: compiled.bytes.into_boxed_slice(),
            labels: compiled.labels,
            lines: compiled.lines,
            locals: RefCell::new(RegDb::new()),
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Offset of a label or function defined in this unit
    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(&name.to_ascii_lowercase()).copied()
    }

    /// Source line of the statement containing `pos`
    pub fn line_at(&self, pos: usize) -> Option<usize> {
        let idx = self.lines.partition_point(|&(offset, _)| offset <= pos);
        idx.checked_sub(1).map(|i| self.lines[i].1)
    }

    /// Disassemble the unit for debugging
    pub fn disassemble(&self, interner: &Interner) -> String {
        let mut output = format!("== {} ({}) ==\n", self.name, self.id);
        let code = &self.code[..];
        let mut offset = 0;

        while offset < code.len() {
            let Some(op) = OpCode::from_byte(code[offset]) else {
                let _ = writeln!(output, "{:05} ?? {:#04x}", offset, code[offset]);
                offset += 1;
                continue;
            };
            let _ = write!(output, "{:05} {:?}", offset, op);
            offset += 1;

            match op {
                OpCode::Int => match read_varint(code, offset) {
                    Some((value, next)) => {
                        let _ = write!(output, " {}", value);
                        offset = next;
                    }
                    None => break,
                },
                OpCode::Pos => {
                    let _ = write!(output, " @{}", read_u24(code, offset).unwrap_or(0));
                    offset += 3;
                }
                OpCode::Name => {
                    let id = read_u24(code, offset).unwrap_or(0);
                    let _ = write!(output, " {} ({})", interner.name(id), id);
                    offset += 3;
                }
                OpCode::Str => match read_cstr(code, offset) {
                    Some((text, next)) => {
                        let _ = write!(output, " {:?}", text);
                        offset = next;
                    }
                    None => break,
                },
                _ => {}
            }
            output.push('\n');
        }

        output
    }
}
