//! Expression parsing
//!
//! Precedence climbing, lowest to highest:
//! `?:`, `||`, `&&`, `|`, `^`, `&`, `== !=`, `< <= > >=`, `<< >>`,
//! `+ -`, `* / %`, unary. Both sides of `&&`/`||` are always evaluated.

use super::compiler::{CResult, Compiler, ExprKind};
use crate::builtins::ArgType;
use crate::interner::{SymbolId, SymbolKind};
use crate::lang::bytecode::OpCode;
use crate::lang::lexer::Token;

const UNARY_PRECEDENCE: i8 = 11;

/// Statement and construct keywords, never valid inside expressions
pub(super) const KEYWORDS: &[&str] = &[
    "if", "else", "while", "do", "for", "switch", "case", "default", "break", "continue", "function",
];

fn binary_op(token: &Token) -> Option<(OpCode, i8)> {
    let op = match token {
        Token::Question => (OpCode::Op3, 0),
        Token::Or => (OpCode::LOr, 1),
        Token::And => (OpCode::LAnd, 2),
        Token::BitOr => (OpCode::Or, 3),
        Token::BitXor => (OpCode::Xor, 4),
        Token::BitAnd => (OpCode::And, 5),
        Token::Equal => (OpCode::Eq, 6),
        Token::NotEqual => (OpCode::Ne, 6),
        Token::Less => (OpCode::Lt, 7),
        Token::LessEqual => (OpCode::Le, 7),
        Token::Greater => (OpCode::Gt, 7),
        Token::GreaterEqual => (OpCode::Ge, 7),
        Token::LeftShift => (OpCode::LShift, 8),
        Token::RightShift => (OpCode::RShift, 8),
        Token::Plus => (OpCode::Add, 9),
        Token::Minus => (OpCode::Sub, 9),
        Token::Star => (OpCode::Mul, 10),
        Token::Slash => (OpCode::Div, 10),
        Token::Percent => (OpCode::Mod, 10),
        _ => return None,
    };
    Some(op)
}

/// Operator behind a compound assignment token
pub(super) fn compound_op(token: &Token) -> Option<OpCode> {
    let op = match token {
        Token::PlusEqual => OpCode::Add,
        Token::MinusEqual => OpCode::Sub,
        Token::StarEqual => OpCode::Mul,
        Token::SlashEqual => OpCode::Div,
        Token::PercentEqual => OpCode::Mod,
        Token::AndEqual => OpCode::And,
        Token::OrEqual => OpCode::Or,
        Token::XorEqual => OpCode::Xor,
        Token::ShlEqual => OpCode::LShift,
        Token::ShrEqual => OpCode::RShift,
        _ => return None,
    };
    Some(op)
}

impl Compiler<'_> {
    /// Parse a full expression
    pub(super) fn parse_expr(&mut self) -> CResult<ExprKind> {
        self.parse_subexpr(-1)
    }

    fn parse_subexpr(&mut self, limit: i8) -> CResult<ExprKind> {
        let mut kind = match self.tok {
            Token::Minus => {
                self.advance()?;
                if let Token::Int(n) = self.tok {
                    self.advance()?;
                    self.code.emit_int(-n);
                } else {
                    self.parse_subexpr(UNARY_PRECEDENCE)?;
                    self.code.emit_op(OpCode::Neg);
                }
                ExprKind::Value
            }
            Token::Not | Token::BitNot => {
                let op = if self.tok == Token::Not { OpCode::LNot } else { OpCode::Not };
                self.advance()?;
                self.parse_subexpr(UNARY_PRECEDENCE)?;
                self.code.emit_op(op);
                ExprKind::Value
            }
            Token::Increment | Token::Decrement => {
                let op = if self.tok == Token::Increment { OpCode::AddPre } else { OpCode::SubPre };
                let start = self.tok_start;
                self.advance()?;
                if !self.parse_subexpr(UNARY_PRECEDENCE)?.is_variable() {
                    return Err(self.error_at(start, "'++'/'--' needs a variable"));
                }
                self.code.emit_op(op);
                ExprKind::Value
            }
            _ => self.parse_simple_expr()?,
        };

        while let Some((op, precedence)) = binary_op(&self.tok) {
            if precedence <= limit {
                break;
            }
            self.advance()?;
            if op == OpCode::Op3 {
                self.parse_subexpr(-1)?;
                self.expect(Token::Colon, ":")?;
                self.parse_subexpr(-1)?;
            } else {
                self.parse_subexpr(precedence)?;
            }
            self.code.emit_op(op);
            kind = ExprKind::Value;
        }

        Ok(kind)
    }

    fn parse_simple_expr(&mut self) -> CResult<ExprKind> {
        match self.tok.clone() {
            Token::Int(n) => {
                self.advance()?;
                self.code.emit_int(n);
                Ok(ExprKind::Value)
            }
            Token::Str(text) => {
                self.advance()?;
                self.interner.intern_literal(&text);
                self.code.emit_str(&text);
                Ok(ExprKind::Value)
            }
            Token::LParen => {
                self.advance()?;
                self.parse_expr()?;
                self.expect(Token::RParen, ")")?;
                Ok(ExprKind::Value)
            }
            Token::Ident(name) => {
                let start = self.tok_start;
                self.advance()?;
                self.parse_identifier(&name, start)
            }
            other => Err(self.error(format!("expression expected, found {}", other.describe()))),
        }
    }

    fn parse_identifier(&mut self, name: &str, start: usize) -> CResult<ExprKind> {
        if KEYWORDS.contains(&name) {
            return Err(self.error_at(start, format!("unexpected '{}'", name)));
        }
        let symbol = self.intern(name, start)?;

        let kind = match self.kind(symbol) {
            SymbolKind::Constant => {
                self.code.emit_int(self.value(symbol));
                ExprKind::Value
            }
            SymbolKind::Native => {
                if self.tok == Token::LParen {
                    self.parse_call(symbol, start)?;
                    if ["getd", "getarg", "getelementofarray"].iter().any(|f| name.eq_ignore_ascii_case(f)) {
                        // may evaluate to a variable reference
                        return Ok(ExprKind::Variable);
                    }
                } else if self.signature(symbol).map_or(false, |sig| sig.required() == 0) {
                    self.emit_call_begin(symbol);
                    self.code.emit_op(OpCode::Func);
                } else {
                    return Err(self.error(format!("'(' expected after '{}'", name)));
                }
                ExprKind::Value
            }
            SymbolKind::UserFunction | SymbolKind::UserFunctionDeclared if self.tok == Token::LParen => {
                self.parse_user_call(symbol, start)?;
                ExprKind::Value
            }
            SymbolKind::Unresolved if self.tok == Token::LParen => {
                return Err(self.error_at(start, format!("undefined function '{}'", name)));
            }
            SymbolKind::Param => {
                self.emit_symbol(symbol);
                ExprKind::Variable
            }
            SymbolKind::Label | SymbolKind::UserFunction | SymbolKind::UserFunctionDeclared => {
                self.emit_reference(symbol)?;
                ExprKind::Ident(symbol)
            }
            SymbolKind::Unresolved | SymbolKind::Str => self.emit_variable(symbol)?,
        };

        if kind.is_variable() {
            if let Some(op) = match self.tok {
                Token::Increment => Some(OpCode::AddPost),
                Token::Decrement => Some(OpCode::SubPost),
                _ => None,
            } {
                self.advance()?;
                self.code.emit_op(op);
                return Ok(ExprKind::Value);
            }
        }
        Ok(kind)
    }

    /// Variable reference with an optional `[index]`
    pub(super) fn emit_variable(&mut self, symbol: SymbolId) -> CResult<ExprKind> {
        if self.tok != Token::LBracket {
            self.emit_reference(symbol)?;
            return Ok(ExprKind::Ident(symbol));
        }
        self.emit_call_begin(self.core.element);
        self.emit_reference(symbol)?;
        self.advance()?;
        self.parse_expr()?;
        self.expect(Token::RBracket, "]")?;
        self.code.emit_op(OpCode::Func);
        Ok(ExprKind::Variable)
    }

    /// `native(args...)`
    pub(super) fn parse_call(&mut self, native: SymbolId, start: usize) -> CResult<()> {
        self.emit_call_begin(native);
        self.expect(Token::LParen, "(")?;
        let argc = self.parse_arguments(native, Token::RParen)?;
        self.expect(Token::RParen, ")")?;
        self.code.emit_op(OpCode::Func);
        self.check_arity(native, argc, start)
    }

    /// Comma-separated arguments up to (not including) `terminator`
    pub(super) fn parse_arguments(&mut self, native: SymbolId, terminator: Token) -> CResult<usize> {
        let mut argc = 0;
        if self.tok == terminator {
            return Ok(0);
        }
        loop {
            self.parse_argument(native, argc)?;
            argc += 1;
            if self.tok != Token::Comma {
                break;
            }
            self.advance()?;
        }
        Ok(argc)
    }

    fn parse_argument(&mut self, native: SymbolId, index: usize) -> CResult<()> {
        let start = self.tok_start;
        let kind = self.parse_expr()?;
        match self.signature(native).and_then(|sig| sig.arg_type(index)) {
            Some(ArgType::Ref) if !kind.is_variable() => {
                let name = self.name(native);
                Err(self.error_at(start, format!("'{}' expects a variable as argument {}", name, index + 1)))
            }
            Some(ArgType::Label) => {
                if let ExprKind::Ident(label) = kind {
                    self.label_uses.push((label, start));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub(super) fn check_arity(&self, native: SymbolId, argc: usize, start: usize) -> CResult<()> {
        let Some(sig) = self.signature(native) else {
            return Ok(());
        };
        let name = self.name(native);
        if argc < sig.required() {
            return Err(self.error_at(
                start,
                format!("'{}' expects at least {} argument(s), got {}", name, sig.required(), argc),
            ));
        }
        if let Some(max) = sig.max() {
            if argc > max {
                return Err(self.error_at(
                    start,
                    format!("'{}' takes at most {} argument(s), got {}", name, max, argc),
                ));
            }
        }
        Ok(())
    }

    /// `Function(args...)` lowered to `callsub`
    pub(super) fn parse_user_call(&mut self, function: SymbolId, start: usize) -> CResult<()> {
        if self.kind(function) == SymbolKind::UserFunctionDeclared {
            self.func_uses.push((function, start));
        }
        self.emit_call_begin(self.core.callsub);
        self.emit_reference(function)?;
        self.expect(Token::LParen, "(")?;
        if self.tok != Token::RParen {
            loop {
                self.parse_expr()?;
                if self.tok != Token::Comma {
                    break;
                }
                self.advance()?;
            }
        }
        self.expect(Token::RParen, ")")?;
        self.code.emit_op(OpCode::Func);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::lang::bytecode::OpCode;
    use crate::testing::compile_ops;

    #[test]
    fn test_precedence_mul_before_add() {
        // 1 + 2 * 3  =>  1 2 3 * +
        let ops = compile_ops("{ set .@a, 1 + 2 * 3; }");
        let arith: Vec<_> = ops.iter().filter(|op| op.is_binary()).collect();
        assert_eq!(arith, vec![&OpCode::Mul, &OpCode::Add]);
    }

    #[test]
    fn test_left_associative_subtraction() {
        // 10 - 3 - 2  =>  10 3 - 2 -
        let ops = compile_ops("{ set .@a, 10 - 3 - 2; }");
        let subs = ops.iter().filter(|op| **op == OpCode::Sub).count();
        assert_eq!(subs, 2);
    }

    #[test]
    fn test_ternary_emits_op3() {
        let ops = compile_ops("{ set .@a, .@b ? 1 : 2; }");
        assert!(ops.contains(&OpCode::Op3));
    }

    #[test]
    fn test_compound_assignment_uses_ref() {
        let ops = compile_ops("{ .@a += 5; }");
        let ref_at = ops.iter().position(|op| *op == OpCode::Ref).unwrap();
        assert_eq!(ops[ref_at + 1], OpCode::Int);
        assert_eq!(ops[ref_at + 2], OpCode::Add);
    }

    #[test]
    fn test_negative_literal_folds() {
        let ops = compile_ops("{ set .@a, -5; }");
        assert!(!ops.contains(&OpCode::Neg));
    }
}
