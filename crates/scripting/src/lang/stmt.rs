//! Statement parsing and control-flow lowering

use super::compiler::{CResult, Compiler, Nest};
use super::expr::{compound_op, KEYWORDS};
use crate::interner::{SymbolId, SymbolKind};
use crate::lang::bytecode::OpCode;
use crate::lang::lexer::Token;

fn is_plain_identifier(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') && !name.ends_with('$')
}

impl Compiler<'_> {
    /// Parse one statement
    pub(super) fn parse_statement(&mut self) -> CResult<()> {
        self.mark_line();

        match self.tok.clone() {
            Token::LBrace => {
                self.advance()?;
                self.parse_block_body()
            }
            Token::Semicolon => self.advance(),
            Token::Ident(name) => match name.as_str() {
                "if" => self.parse_if(),
                "while" => self.parse_while(),
                "do" => self.parse_do(),
                "for" => self.parse_for(),
                "switch" => self.parse_switch(),
                "case" => self.parse_case(),
                "default" => self.parse_default(),
                "break" => self.parse_break(),
                "continue" => self.parse_continue(),
                "function" => self.parse_function(),
                "else" => Err(self.error("'else' without 'if'")),
                _ => {
                    let start = self.tok_start;
                    self.advance()?;
                    if self.tok == Token::Colon && is_plain_identifier(&name) {
                        self.advance()?;
                        let symbol = self.intern(&name, start)?;
                        return self.set_label(symbol, SymbolKind::Label, start);
                    }
                    self.parse_simple_statement(&name, start, Token::Semicolon)
                }
            },
            Token::Increment | Token::Decrement => {
                self.parse_expr()?;
                self.expect(Token::Semicolon, ";")?;
                self.code.emit_op(OpCode::Eol);
                Ok(())
            }
            other => Err(self.error(format!("statement expected, found {}", other.describe()))),
        }
    }

    /// Statements up to the closing `}`, which is consumed
    fn parse_block_body(&mut self) -> CResult<()> {
        while self.tok != Token::RBrace {
            if self.tok == Token::EOF {
                return Err(self.error("'}' expected"));
            }
            self.parse_statement()?;
        }
        self.advance()
    }

    /// Command, function call or assignment; the identifier is consumed
    fn parse_simple_statement(&mut self, name: &str, start: usize, terminator: Token) -> CResult<()> {
        let symbol = self.intern(name, start)?;
        match self.kind(symbol) {
            SymbolKind::Native => self.parse_command(symbol, start, terminator),
            SymbolKind::UserFunction | SymbolKind::UserFunctionDeclared => {
                if self.tok != Token::LParen {
                    return Err(self.error(format!("'(' expected after '{}'", name)));
                }
                self.parse_user_call(symbol, start)?;
                self.finish_statement(terminator)
            }
            SymbolKind::Constant => Err(self.error_at(start, format!("cannot assign to constant '{}'", name))),
            SymbolKind::Label => Err(self.error_at(start, format!("'{}' is a label", name))),
            SymbolKind::Unresolved if self.tok == Token::LParen => {
                Err(self.error_at(start, format!("undefined function '{}'", name)))
            }
            SymbolKind::Param | SymbolKind::Unresolved | SymbolKind::Str => {
                self.parse_assignment(symbol, terminator)
            }
        }
    }

    fn finish_statement(&mut self, terminator: Token) -> CResult<()> {
        let what = if terminator == Token::RParen { ")" } else { ";" };
        self.expect(terminator, what)?;
        self.code.emit_op(OpCode::Eol);
        Ok(())
    }

    /// `cmd arg, arg;` or `cmd(arg, arg);`
    fn parse_command(&mut self, native: SymbolId, start: usize, terminator: Token) -> CResult<()> {
        if self.tok == Token::LParen && self.parens_wrap_arguments(&terminator) {
            self.parse_call(native, start)?;
            return self.finish_statement(terminator);
        }

        self.emit_call_begin(native);
        let argc = self.parse_arguments(native, terminator.clone())?;
        self.code.emit_op(OpCode::Func);
        self.check_arity(native, argc, start)?;
        self.finish_statement(terminator)
    }

    /// Whether the `(` at the current token closes right before the terminator
    fn parens_wrap_arguments(&self, terminator: &Token) -> bool {
        let mut lexer = self.lexer.clone();
        let mut depth = 1usize;
        loop {
            match lexer.next_token() {
                Ok((Token::LParen, _)) => depth += 1,
                Ok((Token::RParen, _)) => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(lexer.next_token(), Ok((ref t, _)) if t == terminator);
                    }
                }
                Ok((Token::EOF, _)) | Err(_) => return false,
                Ok(_) => {}
            }
        }
    }

    /// `var = expr`, `var op= expr`, `var++`
    fn parse_assignment(&mut self, symbol: SymbolId, terminator: Token) -> CResult<()> {
        self.emit_call_begin(self.core.set);
        if self.kind(symbol) == SymbolKind::Param {
            self.emit_symbol(symbol);
        } else {
            self.emit_variable(symbol)?;
        }

        match self.tok.clone() {
            Token::Assign => {
                self.advance()?;
                self.parse_expr()?;
            }
            Token::Increment | Token::Decrement => {
                let op = if self.tok == Token::Increment { OpCode::Add } else { OpCode::Sub };
                self.advance()?;
                self.code.emit_op(OpCode::Ref);
                self.code.emit_int(1);
                self.code.emit_op(op);
            }
            token => {
                let Some(op) = compound_op(&token) else {
                    return Err(self.error(format!("'=' expected, found {}", token.describe())));
                };
                self.advance()?;
                self.code.emit_op(OpCode::Ref);
                self.parse_expr()?;
                self.code.emit_op(op);
            }
        }

        self.code.emit_op(OpCode::Func);
        self.finish_statement(terminator)
    }

    /// `jump_zero((cond), label);`
    fn emit_condition_jump(&mut self, target: SymbolId) -> CResult<()> {
        self.emit_call_begin(self.core.jump_zero);
        self.expect(Token::LParen, "(")?;
        self.parse_expr()?;
        self.expect(Token::RParen, ")")?;
        self.emit_reference(target)?;
        self.code.emit_op(OpCode::Func);
        self.code.emit_op(OpCode::Eol);
        Ok(())
    }

    fn place(&mut self, label: SymbolId) -> CResult<()> {
        let offset = self.tok_start;
        self.set_label(label, SymbolKind::Label, offset)
    }

    // ========== Conditionals ==========

    fn parse_if(&mut self) -> CResult<()> {
        self.advance()?;
        let id = self.next_id();
        let else_label = self.synth("if", id, "else")?;
        let end_label = self.synth("if", id, "end")?;

        self.emit_condition_jump(else_label)?;
        self.parse_statement()?;

        if self.is_keyword("else") {
            self.advance()?;
            self.emit_goto(end_label)?;
            self.place(else_label)?;
            self.parse_statement()?;
            self.place(end_label)
        } else {
            self.place(else_label)
        }
    }

    fn parse_switch(&mut self) -> CResult<()> {
        self.advance()?;
        let id = self.next_id();
        let offset = self.tok_start;
        let value_var = self.intern(&format!(".@__sw{}", id), offset)?;
        let dispatch = self.synth("sw", id, "dispatch")?;
        let end_label = self.synth("sw", id, "end")?;

        // .@swN_value = (expr);
        self.emit_call_begin(self.core.set);
        self.emit_reference(value_var)?;
        self.expect(Token::LParen, "(")?;
        self.parse_expr()?;
        self.expect(Token::RParen, ")")?;
        self.code.emit_op(OpCode::Func);
        self.code.emit_op(OpCode::Eol);
        self.emit_goto(dispatch)?;

        self.expect(Token::LBrace, "{")?;
        self.nest.push(Nest::Switch {
            id,
            brk: end_label,
            cases: Vec::new(),
            default: None,
        });
        let body = self.parse_block_body();
        let Some(Nest::Switch { cases, default, .. }) = self.nest.pop() else {
            return Err(self.error("switch nesting corrupted"));
        };
        body?;

        self.emit_goto(end_label)?;
        self.place(dispatch)?;
        for (value, label) in cases {
            // jump_zero(value != case, label) jumps when they are equal
            self.emit_call_begin(self.core.jump_zero);
            self.emit_reference(value_var)?;
            self.code.emit_int(value);
            self.code.emit_op(OpCode::Ne);
            self.emit_reference(label)?;
            self.code.emit_op(OpCode::Func);
            self.code.emit_op(OpCode::Eol);
        }
        self.emit_goto(default.unwrap_or(end_label))?;
        self.place(end_label)
    }

    /// Case list and default of the innermost construct, if it is a switch
    fn open_switch(&mut self) -> Option<(u32, &mut Vec<(i64, SymbolId)>, &mut Option<SymbolId>)> {
        match self.nest.last_mut() {
            Some(Nest::Switch { id, cases, default, .. }) => Some((*id, cases, default)),
            _ => None,
        }
    }

    fn parse_case(&mut self) -> CResult<()> {
        let Some((id, _, _)) = self.open_switch() else {
            return Err(self.error("'case' outside switch"));
        };
        self.advance()?;
        let start = self.tok_start;
        let value = self.parse_case_value()?;
        self.expect(Token::Colon, ":")?;

        let (duplicate, count) = match self.open_switch() {
            Some((_, cases, _)) => (cases.iter().any(|&(v, _)| v == value), cases.len()),
            None => (false, 0),
        };
        if duplicate {
            return Err(self.error_at(start, format!("duplicate case {}", value)));
        }
        let label = self.synth("sw", id, &format!("case{}", count))?;
        if let Some((_, cases, _)) = self.open_switch() {
            cases.push((value, label));
        }
        self.place(label)
    }

    fn parse_case_value(&mut self) -> CResult<i64> {
        let negative = self.tok == Token::Minus;
        if negative {
            self.advance()?;
        }
        let value = match self.tok.clone() {
            Token::Int(n) => n,
            Token::Ident(name) => {
                let start = self.tok_start;
                let symbol = self.intern(&name, start)?;
                if self.kind(symbol) != SymbolKind::Constant {
                    return Err(self.error("case value must be a constant"));
                }
                self.value(symbol)
            }
            _ => return Err(self.error("case value must be a constant")),
        };
        self.advance()?;
        Ok(if negative { -value } else { value })
    }

    fn parse_default(&mut self) -> CResult<()> {
        let Some((id, _, default)) = self.open_switch() else {
            return Err(self.error("'default' outside switch"));
        };
        let duplicate = default.is_some();
        let start = self.tok_start;
        if duplicate {
            return Err(self.error_at(start, "duplicate default"));
        }
        self.advance()?;
        self.expect(Token::Colon, ":")?;

        let label = self.synth("sw", id, "default")?;
        if let Some((_, _, default)) = self.open_switch() {
            *default = Some(label);
        }
        self.place(label)
    }

    // ========== Loops ==========

    fn parse_while(&mut self) -> CResult<()> {
        self.advance()?;
        let id = self.next_id();
        let cont = self.synth("while", id, "cont")?;
        let brk = self.synth("while", id, "end")?;

        self.place(cont)?;
        self.emit_condition_jump(brk)?;
        self.loop_body(brk, cont)?;
        self.emit_goto(cont)?;
        self.place(brk)
    }

    fn parse_do(&mut self) -> CResult<()> {
        self.advance()?;
        let id = self.next_id();
        let top = self.synth("do", id, "top")?;
        let cont = self.synth("do", id, "cont")?;
        let brk = self.synth("do", id, "end")?;

        self.place(top)?;
        self.loop_body(brk, cont)?;
        if !self.is_keyword("while") {
            return Err(self.error("'while' expected"));
        }
        self.advance()?;
        self.place(cont)?;
        self.emit_condition_jump(brk)?;
        self.expect(Token::Semicolon, ";")?;
        self.emit_goto(top)?;
        self.place(brk)
    }

    fn parse_for(&mut self) -> CResult<()> {
        self.advance()?;
        let id = self.next_id();
        let test = self.synth("for", id, "test")?;
        let next = self.synth("for", id, "next")?;
        let body = self.synth("for", id, "body")?;
        let brk = self.synth("for", id, "end")?;

        self.expect(Token::LParen, "(")?;
        self.parse_for_clause(Token::Semicolon)?;

        self.place(test)?;
        if self.tok != Token::Semicolon {
            self.emit_call_begin(self.core.jump_zero);
            self.parse_expr()?;
            self.emit_reference(brk)?;
            self.code.emit_op(OpCode::Func);
            self.code.emit_op(OpCode::Eol);
        }
        self.expect(Token::Semicolon, ";")?;
        self.emit_goto(body)?;

        self.place(next)?;
        self.parse_for_clause(Token::RParen)?;
        self.emit_goto(test)?;

        self.place(body)?;
        self.loop_body(brk, next)?;
        self.emit_goto(next)?;
        self.place(brk)
    }

    /// Init or step clause of a `for`, including its terminator
    fn parse_for_clause(&mut self, terminator: Token) -> CResult<()> {
        match self.tok.clone() {
            t if t == terminator => self.advance(),
            Token::Ident(name) if !KEYWORDS.contains(&name.as_str()) => {
                let start = self.tok_start;
                self.advance()?;
                self.parse_simple_statement(&name, start, terminator)
            }
            Token::Increment | Token::Decrement => {
                self.parse_expr()?;
                self.finish_statement(terminator)
            }
            other => Err(self.error(format!("statement expected, found {}", other.describe()))),
        }
    }

    fn loop_body(&mut self, brk: SymbolId, cont: SymbolId) -> CResult<()> {
        self.nest.push(Nest::Loop { brk, cont });
        let result = self.parse_statement();
        self.nest.pop();
        result
    }

    fn parse_break(&mut self) -> CResult<()> {
        let start = self.tok_start;
        self.advance()?;
        self.expect(Token::Semicolon, ";")?;
        let target = self.nest.iter().rev().find_map(|n| match n {
            Nest::Loop { brk, .. } | Nest::Switch { brk, .. } => Some(Some(*brk)),
            Nest::Function => Some(None),
        });
        match target.flatten() {
            Some(label) => self.emit_goto(label),
            None => Err(self.error_at(start, "'break' outside loop or switch")),
        }
    }

    fn parse_continue(&mut self) -> CResult<()> {
        let start = self.tok_start;
        self.advance()?;
        self.expect(Token::Semicolon, ";")?;
        let target = self.nest.iter().rev().find_map(|n| match n {
            Nest::Loop { cont, .. } => Some(Some(*cont)),
            Nest::Switch { .. } => None,
            Nest::Function => Some(None),
        });
        match target.flatten() {
            Some(label) => self.emit_goto(label),
            None => Err(self.error_at(start, "'continue' outside loop")),
        }
    }

    // ========== Functions ==========

    fn parse_function(&mut self) -> CResult<()> {
        self.advance()?;
        let start = self.tok_start;
        let Token::Ident(name) = self.tok.clone() else {
            return Err(self.error("function name expected"));
        };
        if !is_plain_identifier(&name) || KEYWORDS.contains(&name.as_str()) {
            return Err(self.error(format!("invalid function name '{}'", name)));
        }
        let symbol = self.intern(&name, start)?;
        self.advance()?;

        match self.tok {
            Token::Semicolon => {
                self.advance()?;
                self.declare_function(symbol, start)
            }
            Token::LBrace => {
                if !self.nest.is_empty() {
                    return Err(self.error_at(start, "functions must be defined at top level"));
                }
                let id = self.next_id();
                let skip = self.synth("fn", id, "end")?;
                self.emit_goto(skip)?;
                self.set_label(symbol, SymbolKind::UserFunction, start)?;

                self.advance()?;
                self.nest.push(Nest::Function);
                let body = self.parse_block_body();
                self.nest.pop();
                body?;

                // falling off the end returns nothing
                self.emit_call_begin(self.core.ret);
                self.code.emit_op(OpCode::Func);
                self.code.emit_op(OpCode::Eol);
                self.place(skip)
            }
            _ => Err(self.error("'{' or ';' expected")),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::compile_error;

    #[test]
    fn test_break_outside_loop() {
        assert!(compile_error("{ break; }").contains("'break' outside"));
    }

    #[test]
    fn test_continue_in_switch_without_loop() {
        assert!(compile_error("{ switch (1) { case 1: continue; } }").contains("'continue' outside"));
    }

    #[test]
    fn test_case_outside_switch() {
        assert!(compile_error("{ case 1: end; }").contains("outside switch"));
    }

    #[test]
    fn test_duplicate_case() {
        assert!(compile_error("{ switch (1) { case 1: case 1: end; } }").contains("duplicate case"));
    }

    #[test]
    fn test_else_without_if() {
        assert!(compile_error("{ else end; }").contains("'else' without 'if'"));
    }

    #[test]
    fn test_nested_function_rejected() {
        assert!(compile_error("{ function A { function B { end; } } }").contains("top level"));
    }

    #[test]
    fn test_assign_to_label() {
        assert!(compile_error("{ L_A: L_A = 1; }").contains("is a label"));
    }

    #[test]
    fn test_missing_assignment_operator() {
        assert!(compile_error("{ .@a 5; }").contains("'=' expected"));
    }
}
