//! Compiler
//!
//! Single-pass: statements and expressions are turned into bytecode as
//! they are parsed, with no syntax tree in between. Control flow is
//! lowered to calls of the `goto`, `jump_zero` and `callsub` natives
//! targeting labels.
//!
//! # Labels
//! A name used before it is known to be a label is emitted as a `Name`
//! whose operand links to the previous unresolved use of the same symbol.
//! Defining the label walks that chain and rewrites every use to a `Pos`.
//! Chains still open at the end of the unit are plain variables and get
//! their symbol id written in.

use crate::builtins::{NativeTable, Signature};
use crate::error::CompileError;
use crate::interner::{Interner, SymbolId, SymbolKind, MAX_SYMBOLS};
use crate::lang::bytecode::{CodeWriter, CompiledCode, OpCode, MAX_OPERAND};
use crate::lang::lexer::{Lexer, Token};
use mapscript_config::ScriptConfig;
use std::collections::HashMap;

pub(crate) type CResult<T> = std::result::Result<T, CompileError>;

/// End of a backpatch chain
const NO_LINK: u32 = MAX_OPERAND;

/// Natives the compiler lowers syntax into
#[derive(Debug, Clone, Copy)]
pub(super) struct CoreNatives {
    pub set: SymbolId,
    pub goto: SymbolId,
    pub jump_zero: SymbolId,
    pub callsub: SymbolId,
    pub ret: SymbolId,
    pub element: SymbolId,
}

/// Open construct for `break`/`continue`/`case`
#[derive(Debug)]
pub(super) enum Nest {
    Loop {
        brk: SymbolId,
        cont: SymbolId,
    },
    Switch {
        id: u32,
        brk: SymbolId,
        cases: Vec<(i64, SymbolId)>,
        default: Option<SymbolId>,
    },
    Function,
}

/// What an expression turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ExprKind {
    Value,
    /// Indexed variable or actor parameter
    Variable,
    /// A lone identifier: variable or label
    Ident(SymbolId),
}

impl ExprKind {
    pub fn is_variable(self) -> bool {
        matches!(self, ExprKind::Variable | ExprKind::Ident(_))
    }
}

/// Script compiler
pub(crate) struct Compiler<'a> {
    pub(super) lexer: Lexer<'a>,
    pub(super) source: &'a str,
    pub(super) tok: Token,
    pub(super) tok_start: usize,
    pub(super) code: CodeWriter,
    pub(super) interner: &'a mut Interner,
    pub(super) natives: &'a NativeTable,
    pub(super) config: &'a ScriptConfig,
    pub(super) core: CoreNatives,
    pub(super) nest: Vec<Nest>,
    next_label: u32,
    touched: Vec<SymbolId>,
    /// Identifiers passed where a label is expected
    pub(super) label_uses: Vec<(SymbolId, usize)>,
    /// Calls to functions only declared so far
    pub(super) func_uses: Vec<(SymbolId, usize)>,
    labels: HashMap<String, usize>,
    /// (code offset, source offset) per statement
    lines: Vec<(usize, usize)>,
}

/// Compile one unit of source
pub fn compile(
    source: &str,
    interner: &mut Interner,
    natives: &NativeTable,
    config: &ScriptConfig,
) -> Result<CompiledCode, CompileError> {
    let mut compiler = Compiler::new(source, interner, natives, config)?;
    let result = compiler.compile_unit();
    compiler.reset_symbols();
    result
}

impl<'a> Compiler<'a> {
    fn new(
        source: &'a str,
        interner: &'a mut Interner,
        natives: &'a NativeTable,
        config: &'a ScriptConfig,
    ) -> Result<Self, CompileError> {
        let lookup = |interner: &Interner, name: &str| -> CResult<SymbolId> {
            interner
                .lookup(name)
                .filter(|&id| interner.kind(id) == SymbolKind::Native)
                .ok_or_else(|| CompileError::at(source, 0, format!("native '{}' is not registered", name)))
        };
        let core = CoreNatives {
            set: lookup(interner, "set")?,
            goto: lookup(interner, "goto")?,
            jump_zero: lookup(interner, "jump_zero")?,
            callsub: lookup(interner, "callsub")?,
            ret: lookup(interner, "return")?,
            element: lookup(interner, "getelementofarray")?,
        };

        let mut compiler = Self {
            lexer: Lexer::new(source),
            source,
            tok: Token::EOF,
            tok_start: 0,
            code: CodeWriter::new(),
            interner,
            natives,
            config,
            core,
            nest: Vec::new(),
            next_label: 0,
            touched: Vec::new(),
            label_uses: Vec::new(),
            func_uses: Vec::new(),
            labels: HashMap::new(),
            lines: Vec::new(),
        };
        compiler.advance()?;
        Ok(compiler)
    }

    fn compile_unit(&mut self) -> CResult<CompiledCode> {
        if self.config.require_outer_braces {
            if self.tok != Token::LBrace {
                return Err(self.error("'{' expected at start of script"));
            }
            self.advance()?;
            while self.tok != Token::RBrace {
                if self.tok == Token::EOF {
                    return Err(self.error("'}' expected"));
                }
                self.parse_statement()?;
            }
            self.advance()?;
            if self.tok != Token::EOF {
                return Err(self.error("unexpected text after script body"));
            }
        } else {
            while self.tok != Token::EOF {
                self.parse_statement()?;
            }
        }

        self.code.emit_op(OpCode::Nop);
        self.finalize()
    }

    // ========== Tokens ==========

    pub(super) fn advance(&mut self) -> CResult<()> {
        let (token, start) = self.lexer.next_token()?;
        self.tok = token;
        self.tok_start = start;
        Ok(())
    }

    pub(super) fn expect(&mut self, token: Token, what: &str) -> CResult<()> {
        if self.tok != token {
            return Err(self.error(format!("'{}' expected, found {}", what, self.tok.describe())));
        }
        self.advance()
    }

    pub(super) fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.tok, Token::Ident(name) if name == keyword)
    }

    pub(super) fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::at(self.source, self.tok_start, message)
    }

    pub(super) fn error_at(&self, offset: usize, message: impl Into<String>) -> CompileError {
        CompileError::at(self.source, offset, message)
    }

    pub(super) fn mark_line(&mut self) {
        let pos = self.code.len();
        match self.lines.last_mut() {
            Some(last) if last.0 == pos => last.1 = self.tok_start,
            _ => self.lines.push((pos, self.tok_start)),
        }
    }

    // ========== Symbols ==========

    pub(super) fn intern(&mut self, name: &str, offset: usize) -> CResult<SymbolId> {
        let id = self.interner.intern(name);
        if id >= MAX_SYMBOLS {
            return Err(self.error_at(offset, "too many symbols"));
        }
        Ok(id)
    }

    pub(super) fn kind(&self, symbol: SymbolId) -> SymbolKind {
        self.interner.kind(symbol)
    }

    pub(super) fn value(&self, symbol: SymbolId) -> i64 {
        self.interner.get(symbol).map_or(0, |s| s.value)
    }

    pub(super) fn name(&self, symbol: SymbolId) -> String {
        self.interner.name(symbol).to_string()
    }

    pub(super) fn signature(&self, native: SymbolId) -> Option<&'a Signature> {
        let natives: &'a NativeTable = self.natives;
        natives.get(self.value(native) as usize).map(|def| &def.signature)
    }

    /// Synthesized label for a construct
    pub(super) fn synth(&mut self, tag: &str, id: u32, part: &str) -> CResult<SymbolId> {
        let name = format!("__{}{}_{}", tag, id, part);
        let offset = self.tok_start;
        self.intern(&name, offset)
    }

    pub(super) fn next_id(&mut self) -> u32 {
        let id = self.next_label;
        self.next_label += 1;
        id
    }

    // ========== Emission ==========

    /// Direct symbol reference (natives, params)
    pub(super) fn emit_symbol(&mut self, symbol: SymbolId) {
        self.code.emit_op(OpCode::Name);
        self.code.emit_u24(symbol);
    }

    /// `Name(native) Arg`
    pub(super) fn emit_call_begin(&mut self, native: SymbolId) {
        self.emit_symbol(native);
        self.code.emit_op(OpCode::Arg);
    }

    /// Reference that may turn out to be a label
    pub(super) fn emit_reference(&mut self, symbol: SymbolId) -> CResult<()> {
        self.check_size()?;
        match self.kind(symbol) {
            SymbolKind::Label | SymbolKind::UserFunction => {
                self.code.emit_op(OpCode::Pos);
                self.code.emit_u24(self.value(symbol) as u32);
            }
            SymbolKind::Unresolved | SymbolKind::UserFunctionDeclared => {
                self.code.emit_op(OpCode::Name);
                let at = self.code.len();
                let Some(entry) = self.interner.get_mut(symbol) else {
                    return Err(self.error("unknown symbol"));
                };
                let link = entry.backpatch.replace(at).map_or(NO_LINK, |p| p as u32);
                self.code.emit_u24(link);
                self.touched.push(symbol);
            }
            SymbolKind::Constant => self.code.emit_int(self.value(symbol)),
            SymbolKind::Param | SymbolKind::Native | SymbolKind::Str => self.emit_symbol(symbol),
        }
        Ok(())
    }

    pub(super) fn emit_goto(&mut self, label: SymbolId) -> CResult<()> {
        self.emit_call_begin(self.core.goto);
        self.emit_reference(label)?;
        self.code.emit_op(OpCode::Func);
        self.code.emit_op(OpCode::Eol);
        Ok(())
    }

    fn check_size(&self) -> CResult<()> {
        if self.code.len() + 4 >= MAX_OPERAND as usize {
            return Err(self.error("script too large"));
        }
        Ok(())
    }

    /// Define `symbol` at the current offset and resolve its pending uses
    pub(super) fn set_label(&mut self, symbol: SymbolId, kind: SymbolKind, offset: usize) -> CResult<()> {
        self.check_size()?;
        let name = self.name(symbol);
        match self.kind(symbol) {
            SymbolKind::Constant => {
                return Err(self.error_at(offset, format!("label '{}' conflicts with a constant", name)));
            }
            SymbolKind::Native | SymbolKind::Param | SymbolKind::Str => {
                return Err(self.error_at(offset, format!("'{}' is a reserved name", name)));
            }
            SymbolKind::Label | SymbolKind::UserFunction => {
                return Err(self.error_at(offset, format!("duplicate label '{}'", name)));
            }
            SymbolKind::UserFunctionDeclared if kind == SymbolKind::Label => {
                return Err(self.error_at(offset, format!("'{}' is declared as a function", name)));
            }
            SymbolKind::Unresolved | SymbolKind::UserFunctionDeclared => {}
        }

        let pos = self.code.len();
        let Some(entry) = self.interner.get_mut(symbol) else {
            return Err(self.error_at(offset, "unknown symbol"));
        };
        let mut link = entry.backpatch.take();
        entry.kind = kind;
        entry.value = pos as i64;

        while let Some(at) = link {
            let next = self.code.read_u24(at);
            self.code.patch(at, OpCode::Pos, pos as u32);
            link = (next != NO_LINK).then_some(next as usize);
        }

        self.touched.push(symbol);
        if !name.starts_with("__") {
            self.labels.insert(name.to_ascii_lowercase(), pos);
        }
        Ok(())
    }

    /// Mark a name as a function declared ahead of its body
    pub(super) fn declare_function(&mut self, symbol: SymbolId, offset: usize) -> CResult<()> {
        match self.kind(symbol) {
            SymbolKind::Unresolved => {
                if let Some(entry) = self.interner.get_mut(symbol) {
                    entry.kind = SymbolKind::UserFunctionDeclared;
                }
                self.touched.push(symbol);
                Ok(())
            }
            SymbolKind::UserFunctionDeclared | SymbolKind::UserFunction => Ok(()),
            _ => {
                let name = self.name(symbol);
                Err(self.error_at(offset, format!("'{}' cannot be declared as a function", name)))
            }
        }
    }

    // ========== Finish ==========

    fn finalize(&mut self) -> CResult<CompiledCode> {
        for (symbol, offset) in std::mem::take(&mut self.label_uses) {
            if !matches!(self.kind(symbol), SymbolKind::Label | SymbolKind::UserFunction) {
                let name = self.name(symbol);
                return Err(self.error_at(offset, format!("label '{}' is not defined", name)));
            }
        }
        for (symbol, offset) in std::mem::take(&mut self.func_uses) {
            if self.kind(symbol) == SymbolKind::UserFunctionDeclared {
                let name = self.name(symbol);
                return Err(self.error_at(offset, format!("function '{}' is declared but never defined", name)));
            }
        }

        // whatever is still chained is a variable
        for symbol in self.touched.clone() {
            let Some(entry) = self.interner.get_mut(symbol) else {
                continue;
            };
            let mut link = entry.backpatch.take();
            while let Some(at) = link {
                let next = self.code.read_u24(at);
                self.code.patch(at, OpCode::Name, symbol);
                link = (next != NO_LINK).then_some(next as usize);
            }
        }

        let newlines: Vec<usize> = self.source.match_indices('\n').map(|(i, _)| i).collect();
        let lines = self
            .lines
            .iter()
            .map(|&(pos, offset)| (pos, newlines.partition_point(|&nl| nl < offset) + 1))
            .collect();

        Ok(CompiledCode {
            bytes: std::mem::take(&mut self.code).into_bytes(),
            labels: std::mem::take(&mut self.labels),
            lines,
        })
    }

    /// Labels and functions are per unit; forget them and any open chains
    fn reset_symbols(&mut self) {
        for &symbol in &self.touched {
            if let Some(entry) = self.interner.get_mut(symbol) {
                entry.backpatch = None;
                if matches!(
                    entry.kind,
                    SymbolKind::Label | SymbolKind::UserFunction | SymbolKind::UserFunctionDeclared
                ) {
                    entry.kind = SymbolKind::Unresolved;
                    entry.value = 0;
                }
            }
        }
        self.touched.clear();
    }
}
