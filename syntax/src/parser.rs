use crate::node::NodeType;
use crate::token::{Lexer, ParseError, Token};
use crate::writer::{self, ConstantPool, Program};

/// Parse a whole source file into its packed representation.
pub fn parse_source(source: &str) -> Result<Program, ParseError> {
    let mut parser = Parser::new(source)?;
    let mut statements = Vec::new();
    while parser.current != Token::Eof {
        statements.push(parser.parse_statement()?);
    }
    Ok(Program {
        data: writer::file(&statements),
        constants: parser.constants.into_constants(),
    })
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    line: u32,
    column: u32,
    constants: ConstantPool,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(source);
        let (current, line, column) = lexer.next_token()?;
        Ok(Self {
            lexer,
            current,
            line,
            column,
            constants: ConstantPool::new(),
        })
    }

    fn advance(&mut self) -> Result<Token, ParseError> {
        let (next, line, column) = self.lexer.next_token()?;
        self.line = line;
        self.column = column;
        Ok(core::mem::replace(&mut self.current, next))
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.line, self.column)
    }

    fn expect(&mut self, token: Token) -> Result<(), ParseError> {
        if self.current == token {
            self.advance()?;
            Ok(())
        } else {
            Err(self.error(format!("expected {token}, found {}", self.current)))
        }
    }

    fn expect_name(&mut self) -> Result<u32, ParseError> {
        match self.current.clone() {
            Token::Name(name) => {
                self.advance()?;
                Ok(self.constants.constant_id(&name))
            }
            other => Err(self.error(format!("expected name, found {other}"))),
        }
    }

    /// Consume a statement terminator. `;` is accepted anywhere and
    /// optional before `}` or the end of input.
    fn finish_statement(&mut self) -> Result<(), ParseError> {
        match self.current {
            Token::Semi => {
                self.advance()?;
                Ok(())
            }
            Token::RBrace | Token::Eof => Ok(()),
            _ => Err(self.error(format!(
                "expected `;` after statement, found {}",
                self.current
            ))),
        }
    }

    // ── Statements ─────────────────────────────────────────────────

    fn parse_statement(&mut self) -> Result<Vec<u32>, ParseError> {
        match self.current {
            Token::Semi => {
                self.advance()?;
                Ok(writer::empty_stmt())
            }
            Token::Var => self.parse_bindings(NodeType::VarStmt),
            Token::Const => self.parse_bindings(NodeType::ConstStmt),
            Token::Def => self.parse_def(),
            Token::Return => self.parse_return(),
            Token::If => self.parse_if(),
            Token::Loop => self.parse_loop(),
            _ => {
                let expr = self.parse_expression()?;
                self.finish_statement()?;
                Ok(writer::expr_stmt(&expr))
            }
        }
    }

    fn parse_bindings(&mut self, node_type: NodeType) -> Result<Vec<u32>, ParseError> {
        let is_const = node_type == NodeType::ConstStmt;
        self.advance()?;
        let mut bindings = Vec::new();
        loop {
            let name_cid = self.expect_name()?;
            let init = if self.current == Token::Assign {
                self.advance()?;
                Some(self.parse_expression()?)
            } else if is_const {
                return Err(self.error("`const` binding requires an initializer"));
            } else {
                None
            };
            bindings.push((name_cid, init));
            if self.current == Token::Comma {
                self.advance()?;
                continue;
            }
            break;
        }
        self.finish_statement()?;
        Ok(writer::binding_stmt(node_type, &bindings))
    }

    fn parse_def(&mut self) -> Result<Vec<u32>, ParseError> {
        self.advance()?;
        let name_cid = self.expect_name()?;
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        if self.current != Token::RParen {
            loop {
                params.push(self.expect_name()?);
                if self.current == Token::Comma {
                    self.advance()?;
                    continue;
                }
                break;
            }
        }
        self.expect(Token::RParen)?;
        let body = self.parse_braced_statements()?;
        Ok(writer::def_stmt(name_cid, &params, &writer::sized_block(&body)))
    }

    fn parse_return(&mut self) -> Result<Vec<u32>, ParseError> {
        self.advance()?;
        if matches!(self.current, Token::Semi | Token::RBrace | Token::Eof) {
            self.finish_statement()?;
            return Ok(writer::return_stmt(None));
        }
        let expr = self.parse_expression()?;
        self.finish_statement()?;
        Ok(writer::return_stmt(Some(&expr)))
    }

    fn parse_if(&mut self) -> Result<Vec<u32>, ParseError> {
        self.advance()?;
        self.expect(Token::LParen)?;
        let cond = self.parse_expression()?;
        self.expect(Token::RParen)?;
        let if_block = writer::sized_block(&self.parse_braced_statements()?);

        let mut elsifs = Vec::new();
        while self.current == Token::Elsif {
            self.advance()?;
            self.expect(Token::LParen)?;
            let elsif_cond = self.parse_expression()?;
            self.expect(Token::RParen)?;
            let elsif_block = writer::sized_block(&self.parse_braced_statements()?);
            elsifs.push((elsif_cond, elsif_block));
        }

        let else_block = if self.current == Token::Else {
            self.advance()?;
            Some(writer::sized_block(&self.parse_braced_statements()?))
        } else {
            None
        };

        Ok(writer::if_stmt(
            &cond,
            &if_block,
            &elsifs,
            else_block.as_deref(),
        ))
    }

    fn parse_loop(&mut self) -> Result<Vec<u32>, ParseError> {
        self.advance()?;
        let body = self.parse_braced_statements()?;
        Ok(writer::loop_stmt(&body))
    }

    fn parse_braced_statements(&mut self) -> Result<Vec<Vec<u32>>, ParseError> {
        self.expect(Token::LBrace)?;
        let mut statements = Vec::new();
        while self.current != Token::RBrace {
            if self.current == Token::Eof {
                return Err(self.error("unterminated block"));
            }
            statements.push(self.parse_statement()?);
        }
        self.advance()?;
        Ok(statements)
    }

    // ── Expressions ────────────────────────────────────────────────
    // additive < multiplicative < unary < postfix < primary

    fn parse_expression(&mut self) -> Result<Vec<u32>, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let node_type = match self.current {
                Token::Plus => NodeType::AddExpr,
                Token::Minus => NodeType::SubExpr,
                _ => break,
            };
            self.advance()?;
            let rhs = self.parse_multiplicative()?;
            lhs = writer::binary_expr(node_type, &lhs, &rhs);
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Vec<u32>, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let node_type = match self.current {
                Token::Star => NodeType::MulExpr,
                Token::Slash => NodeType::DivExpr,
                _ => break,
            };
            self.advance()?;
            let rhs = self.parse_unary()?;
            lhs = writer::binary_expr(node_type, &lhs, &rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Vec<u32>, ParseError> {
        match self.current {
            Token::Plus => {
                self.advance()?;
                let sub = self.parse_unary()?;
                Ok(writer::unary_expr(NodeType::PosExpr, &sub))
            }
            Token::Minus => {
                self.advance()?;
                let sub = self.parse_unary()?;
                Ok(writer::unary_expr(NodeType::NegExpr, &sub))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Vec<u32>, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current {
                Token::LParen => {
                    self.advance()?;
                    let mut args = Vec::new();
                    if self.current != Token::RParen {
                        loop {
                            args.push(self.parse_expression()?);
                            if self.current == Token::Comma {
                                self.advance()?;
                                continue;
                            }
                            break;
                        }
                    }
                    self.expect(Token::RParen)?;
                    expr = writer::call_expr(&expr, &args);
                }
                Token::Dot => {
                    self.advance()?;
                    let name_cid = self.expect_name()?;
                    expr = writer::access_expr(NodeType::DotExpr, name_cid, &expr);
                }
                Token::Arrow => {
                    self.advance()?;
                    let name_cid = self.expect_name()?;
                    expr = writer::access_expr(NodeType::ArrowExpr, name_cid, &expr);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Vec<u32>, ParseError> {
        match self.current.clone() {
            Token::LParen => {
                self.advance()?;
                let inner = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(writer::unary_expr(NodeType::ParenExpr, &inner))
            }
            Token::Name(name) => {
                self.advance()?;
                let cid = self.constants.constant_id(&name);
                Ok(writer::name_expr(cid))
            }
            Token::Int(value) => {
                self.advance()?;
                Ok(writer::integer_expr(value))
            }
            other => Err(self.error(format!("expected expression, found {other}"))),
        }
    }
}
