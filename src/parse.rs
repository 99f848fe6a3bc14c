use rtmc_types::PrimitiveType;

use crate::ast::*;
use crate::error::ParseError;
use crate::token::{Token, TokenKind};

/// A recursive-descent parser with explicit precedence climbing for
/// expressions. Holds no state beyond the token cursor: every production
/// is a plain method that consumes tokens and returns an AST node or a
/// `ParseError`.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse_program(mut self) -> PResult<Program> {
        let mut decls = Vec::new();
        while !self.at_eof() {
            decls.push(self.parse_decl()?);
        }
        Ok(Program { decls })
    }

    // ---- cursor helpers ----

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn pos_of_current(&self) -> Pos {
        self.peek().pos
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind)
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(ParseError::UnexpectedToken {
                pos: self.pos_of_current(),
                expected: format!("{kind}"),
                found: format!("{}", self.peek_kind()),
            })
        }
    }

    fn expect_ident(&mut self) -> PResult<String> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(ParseError::UnexpectedToken {
                pos: self.pos_of_current(),
                expected: "identifier".to_string(),
                found: format!("{other}"),
            }),
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    // ---- declarations ----

    fn parse_decl(&mut self) -> PResult<Decl> {
        match self.peek_kind() {
            TokenKind::Struct => Ok(Decl::Struct(self.parse_aggregate(false)?)),
            TokenKind::Union => Ok(Decl::Union(self.parse_aggregate(true)?)),
            TokenKind::Message => Ok(Decl::Message(self.parse_message()?)),
            _ => self.parse_function_or_global(),
        }
    }

    fn parse_aggregate(&mut self, is_union: bool) -> PResult<AggregateDecl> {
        let pos = self.pos_of_current();
        self.advance(); // 'struct' | 'union'
        let name = if let TokenKind::Ident(_) = self.peek_kind() {
            Some(self.expect_ident()?)
        } else {
            None
        };
        self.expect(TokenKind::LBrace)?;
        let mut members = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            members.push(self.parse_aggregate_member()?);
        }
        self.expect(TokenKind::RBrace)?;
        self.eat(&TokenKind::Semi);
        Ok(AggregateDecl {
            name,
            is_union,
            members,
            pos,
        })
    }

    fn parse_aggregate_member(&mut self) -> PResult<AggregateMember> {
        match self.peek_kind() {
            TokenKind::Struct => Ok(AggregateMember::Anonymous(self.parse_aggregate(false)?)),
            TokenKind::Union => Ok(AggregateMember::Anonymous(self.parse_aggregate(true)?)),
            _ => {
                let pos = self.pos_of_current();
                let ty = self.parse_type()?;
                let name = self.expect_ident()?;
                let bit_width = if self.eat(&TokenKind::Colon) {
                    Some(Box::new(self.parse_expr()?))
                } else {
                    None
                };
                self.expect(TokenKind::Semi)?;
                Ok(AggregateMember::Field(FieldDecl {
                    name,
                    ty,
                    bit_width,
                    pos,
                }))
            }
        }
    }

    fn parse_message(&mut self) -> PResult<MessageDecl> {
        let pos = self.pos_of_current();
        self.advance(); // 'message'
        self.expect(TokenKind::Lt)?;
        let element_type = self.parse_type()?;
        self.expect(TokenKind::Gt)?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::Semi)?;
        Ok(MessageDecl {
            name,
            element_type,
            pos,
        })
    }

    fn parse_function_or_global(&mut self) -> PResult<Decl> {
        let pos = self.pos_of_current();
        let is_const = self.eat(&TokenKind::Const);
        let ty = self.parse_type()?;
        let name = self.expect_ident()?;

        if self.check(&TokenKind::LParen) {
            self.advance();
            let params = self.parse_param_list()?;
            self.expect(TokenKind::RParen)?;
            let body = self.parse_block()?;
            return Ok(Decl::Function(FunctionDecl {
                name,
                return_type: ty,
                params,
                body,
                pos,
            }));
        }

        let array_len = if self.eat(&TokenKind::LBracket) {
            let len = self.parse_expr()?;
            self.expect(TokenKind::RBracket)?;
            Some(Box::new(len))
        } else {
            None
        };
        let init = if self.eat(&TokenKind::Assign) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect(TokenKind::Semi)?;
        Ok(Decl::Global(GlobalDecl {
            name,
            ty,
            array_len,
            init,
            is_const,
            pos,
        }))
    }

    fn parse_param_list(&mut self) -> PResult<Vec<Param>> {
        let mut params = Vec::new();
        if self.check(&TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            let pos = self.pos_of_current();
            let ty = self.parse_type()?;
            let name = self.expect_ident()?;
            params.push(Param { name, ty, pos });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_type(&mut self) -> PResult<TypeExpr> {
        let mut base = match self.peek_kind().clone() {
            TokenKind::Int => {
                self.advance();
                TypeExpr::Primitive(PrimitiveType::Int)
            }
            TokenKind::Float => {
                self.advance();
                TypeExpr::Primitive(PrimitiveType::Float)
            }
            TokenKind::Char => {
                self.advance();
                TypeExpr::Primitive(PrimitiveType::Char)
            }
            TokenKind::Bool => {
                self.advance();
                TypeExpr::Primitive(PrimitiveType::Bool)
            }
            TokenKind::Void => {
                self.advance();
                TypeExpr::Primitive(PrimitiveType::Void)
            }
            TokenKind::Struct | TokenKind::Union => {
                self.advance();
                let name = self.expect_ident()?;
                TypeExpr::Named(name)
            }
            TokenKind::Ident(name) => {
                self.advance();
                TypeExpr::Named(name)
            }
            other => {
                return Err(ParseError::UnexpectedToken {
                    pos: self.pos_of_current(),
                    expected: "type".to_string(),
                    found: format!("{other}"),
                })
            }
        };
        while self.eat(&TokenKind::Star) {
            base = TypeExpr::Pointer(Box::new(base));
        }
        Ok(base)
    }

    // ---- statements ----

    fn parse_block(&mut self) -> PResult<Block> {
        let pos = self.pos_of_current();
        self.expect(TokenKind::LBrace)?;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            statements.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Block { statements, pos })
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        match self.peek_kind() {
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Break => {
                let pos = self.pos_of_current();
                self.advance();
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Break(pos))
            }
            TokenKind::Continue => {
                let pos = self.pos_of_current();
                self.advance();
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Continue(pos))
            }
            TokenKind::Return => {
                let pos = self.pos_of_current();
                self.advance();
                let value = if self.check(&TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Return { value, pos })
            }
            _ if self.looks_like_local_decl() => {
                let decl = self.parse_local_decl()?;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::LocalDecl(decl))
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn looks_like_local_decl(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Int
                | TokenKind::Float
                | TokenKind::Char
                | TokenKind::Bool
                | TokenKind::Void
                | TokenKind::Struct
                | TokenKind::Union
                | TokenKind::Const
        )
    }

    fn parse_local_decl(&mut self) -> PResult<LocalDecl> {
        let pos = self.pos_of_current();
        let is_const = self.eat(&TokenKind::Const);
        let ty = self.parse_type()?;
        let name = self.expect_ident()?;
        let array_len = if self.eat(&TokenKind::LBracket) {
            let len = self.parse_expr()?;
            self.expect(TokenKind::RBracket)?;
            Some(Box::new(len))
        } else {
            None
        };
        let init = if self.eat(&TokenKind::Assign) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        Ok(LocalDecl {
            name,
            ty,
            array_len,
            init,
            is_const,
            pos,
        })
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let pos = self.pos_of_current();
        self.advance();
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let then_branch = Box::new(self.parse_stmt()?);
        let else_branch = if self.eat(&TokenKind::Else) {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
            pos,
        })
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let pos = self.pos_of_current();
        self.advance();
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::While { cond, body, pos })
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        let pos = self.pos_of_current();
        self.advance();
        self.expect(TokenKind::LParen)?;

        let init = if self.check(&TokenKind::Semi) {
            None
        } else if self.looks_like_local_decl() {
            Some(Box::new(ForInit::Decl(self.parse_local_decl()?)))
        } else {
            Some(Box::new(ForInit::Expr(self.parse_expr()?)))
        };
        self.expect(TokenKind::Semi)?;

        let cond = if self.check(&TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semi)?;

        let step = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::RParen)?;

        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
            pos,
        })
    }

    // ---- expressions: precedence climbing ----

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        let lhs = self.parse_logical_or()?;
        let op = match self.peek_kind() {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusEq => AssignOp::AddAssign,
            TokenKind::MinusEq => AssignOp::SubAssign,
            TokenKind::StarEq => AssignOp::MulAssign,
            TokenKind::SlashEq => AssignOp::DivAssign,
            TokenKind::PercentEq => AssignOp::ModAssign,
            TokenKind::AmpEq => AssignOp::AndAssign,
            TokenKind::PipeEq => AssignOp::OrAssign,
            TokenKind::CaretEq => AssignOp::XorAssign,
            TokenKind::ShlEq => AssignOp::ShlAssign,
            TokenKind::ShrEq => AssignOp::ShrAssign,
            _ => return Ok(lhs),
        };
        let pos = self.pos_of_current();
        self.advance();
        let value = Box::new(self.parse_assignment()?);
        Ok(Expr::Assign {
            op,
            target: Box::new(lhs),
            value,
            pos,
        })
    }

    fn parse_logical_or(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_logical_and()?;
        while self.check(&TokenKind::PipePipe) {
            let pos = self.pos_of_current();
            self.advance();
            let rhs = self.parse_logical_and()?;
            lhs = Expr::Binary { op: BinaryOp::Or, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_bit_or()?;
        while self.check(&TokenKind::AmpAmp) {
            let pos = self.pos_of_current();
            self.advance();
            let rhs = self.parse_bit_or()?;
            lhs = Expr::Binary { op: BinaryOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
        }
        Ok(lhs)
    }

    fn parse_bit_or(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_bit_xor()?;
        while self.check(&TokenKind::Pipe) {
            let pos = self.pos_of_current();
            self.advance();
            let rhs = self.parse_bit_xor()?;
            lhs = Expr::Binary { op: BinaryOp::BitOr, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
        }
        Ok(lhs)
    }

    fn parse_bit_xor(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_bit_and()?;
        while self.check(&TokenKind::Caret) {
            let pos = self.pos_of_current();
            self.advance();
            let rhs = self.parse_bit_and()?;
            lhs = Expr::Binary { op: BinaryOp::BitXor, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
        }
        Ok(lhs)
    }

    fn parse_bit_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.check(&TokenKind::Amp) {
            let pos = self.pos_of_current();
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary { op: BinaryOp::BitAnd, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Neq,
                _ => break,
            };
            let pos = self.pos_of_current();
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Lte => BinaryOp::Lte,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Gte => BinaryOp::Gte,
                _ => break,
            };
            let pos = self.pos_of_current();
            self.advance();
            let rhs = self.parse_shift()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Shl => BinaryOp::Shl,
                TokenKind::Shr => BinaryOp::Shr,
                _ => break,
            };
            let pos = self.pos_of_current();
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let pos = self.pos_of_current();
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let pos = self.pos_of_current();
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let pos = self.pos_of_current();
        let op = match self.peek_kind() {
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::PlusPlus => Some(UnaryOp::PreInc),
            TokenKind::MinusMinus => Some(UnaryOp::PreDec),
            TokenKind::Amp => Some(UnaryOp::AddrOf),
            TokenKind::Star => Some(UnaryOp::Deref),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = Box::new(self.parse_unary()?);
            return Ok(Expr::Unary { op, expr, pos });
        }

        if self.check(&TokenKind::Sizeof) {
            return self.parse_sizeof();
        }

        if self.check(&TokenKind::LParen) && self.looks_like_cast() {
            self.advance();
            let ty = self.parse_type()?;
            self.expect(TokenKind::RParen)?;
            let expr = Box::new(self.parse_unary()?);
            return Ok(Expr::Cast { ty, expr, pos });
        }

        self.parse_postfix()
    }

    /// Disambiguates `(type)expr` casts from parenthesized expressions by
    /// checking whether the token after `(` starts a type.
    fn looks_like_cast(&self) -> bool {
        matches!(
            self.tokens.get(self.pos + 1).map(|t| &t.kind),
            Some(TokenKind::Int)
                | Some(TokenKind::Float)
                | Some(TokenKind::Char)
                | Some(TokenKind::Bool)
                | Some(TokenKind::Void)
                | Some(TokenKind::Struct)
                | Some(TokenKind::Union)
        )
    }

    fn parse_sizeof(&mut self) -> PResult<Expr> {
        let pos = self.pos_of_current();
        self.advance();
        self.expect(TokenKind::LParen)?;
        let target = if self.looks_like_type_start() {
            SizeofTarget::Type(self.parse_type()?)
        } else {
            SizeofTarget::Expr(Box::new(self.parse_expr()?))
        };
        self.expect(TokenKind::RParen)?;
        Ok(Expr::Sizeof { target, pos })
    }

    fn looks_like_type_start(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Int
                | TokenKind::Float
                | TokenKind::Char
                | TokenKind::Bool
                | TokenKind::Void
                | TokenKind::Struct
                | TokenKind::Union
        )
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::PlusPlus => {
                    let pos = self.pos_of_current();
                    self.advance();
                    expr = Expr::Unary { op: UnaryOp::PostInc, expr: Box::new(expr), pos };
                }
                TokenKind::MinusMinus => {
                    let pos = self.pos_of_current();
                    self.advance();
                    expr = Expr::Unary { op: UnaryOp::PostDec, expr: Box::new(expr), pos };
                }
                TokenKind::LBracket => {
                    let pos = self.pos_of_current();
                    self.advance();
                    let index = Box::new(self.parse_expr()?);
                    self.expect(TokenKind::RBracket)?;
                    expr = Expr::Index { base: Box::new(expr), index, pos };
                }
                TokenKind::Dot | TokenKind::Arrow => {
                    let arrow = matches!(self.peek_kind(), TokenKind::Arrow);
                    let pos = self.pos_of_current();
                    self.advance();

                    if self.peek_field_name().as_deref() == Some("send") {
                        self.advance();
                        self.expect(TokenKind::LParen)?;
                        let value = Box::new(self.parse_expr()?);
                        self.expect(TokenKind::RParen)?;
                        expr = Expr::Send { channel: Box::new(expr), value, pos };
                        continue;
                    }
                    if self.peek_field_name().as_deref() == Some("recv") {
                        self.advance();
                        self.expect(TokenKind::LParen)?;
                        let timeout = if self.check(&TokenKind::RParen) {
                            None
                        } else if self.peek_field_name().as_deref() == Some("timeout") {
                            self.advance();
                            self.expect(TokenKind::Colon)?;
                            Some(Box::new(self.parse_expr()?))
                        } else {
                            Some(Box::new(self.parse_expr()?))
                        };
                        self.expect(TokenKind::RParen)?;
                        expr = Expr::Recv { channel: Box::new(expr), timeout, pos };
                        continue;
                    }

                    let field = self.expect_ident()?;
                    expr = Expr::Member { base: Box::new(expr), field, arrow, pos };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn peek_field_name(&self) -> Option<String> {
        match self.peek_kind() {
            TokenKind::Ident(name) => Some(name.clone()),
            _ => None,
        }
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let pos = self.pos_of_current();
        match self.peek_kind().clone() {
            TokenKind::IntLiteral(v) => {
                self.advance();
                Ok(Expr::IntLiteral(v, pos))
            }
            TokenKind::FloatLiteral(v) => {
                self.advance();
                Ok(Expr::FloatLiteral(v, pos))
            }
            TokenKind::CharLiteral(v) => {
                self.advance();
                Ok(Expr::CharLiteral(v, pos))
            }
            TokenKind::StringLiteral(v) => {
                self.advance();
                Ok(Expr::StringLiteral(v, pos))
            }
            TokenKind::BoolLiteral(v) => {
                self.advance();
                Ok(Expr::BoolLiteral(v, pos))
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    Ok(Expr::Call { callee: name, args, pos })
                } else {
                    Ok(Expr::Ident(name, pos))
                }
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBrace => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check(&TokenKind::RBrace) {
                    loop {
                        elements.push(self.parse_expr()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBrace)?;
                Ok(Expr::ArrayLiteral { elements, pos })
            }
            other => Err(ParseError::UnexpectedToken {
                pos,
                expected: "expression".to_string(),
                found: format!("{other}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::Lexer;

    fn parse(src: &str) -> Program {
        let tokens = Lexer::new(src).tokenize().unwrap();
        Parser::new(tokens).parse_program().unwrap()
    }

    #[test]
    fn parses_global_and_function() {
        let prog = parse("int x = 5;\nvoid main(){ return; }");
        assert_eq!(prog.decls.len(), 2);
        assert!(matches!(prog.decls[0], Decl::Global(_)));
        assert!(matches!(prog.decls[1], Decl::Function(_)));
    }

    #[test]
    fn parses_struct_with_anonymous_union() {
        let prog = parse(
            "struct S { union { struct { int a:16; int b:16; }; int value; }; };",
        );
        let Decl::Struct(s) = &prog.decls[0] else { panic!() };
        assert_eq!(s.members.len(), 1);
        assert!(matches!(s.members[0], AggregateMember::Anonymous(_)));
    }

    #[test]
    fn precedence_climbs_correctly() {
        let prog = parse("void f(){ int x = 2+3*4; }");
        let Decl::Function(f) = &prog.decls[0] else { panic!() };
        let Stmt::LocalDecl(decl) = &f.body.statements[0] else { panic!() };
        let Some(init) = &decl.init else { panic!() };
        let Expr::Binary { op: BinaryOp::Add, rhs, .. } = init.as_ref() else { panic!() };
        assert!(matches!(rhs.as_ref(), Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn parses_message_send_and_recv() {
        let prog = parse("message<int> Q; void f(){ Q.send(1); int x = Q.recv(timeout:500); }");
        assert!(matches!(prog.decls[0], Decl::Message(_)));
        let Decl::Function(f) = &prog.decls[1] else { panic!() };
        assert!(matches!(f.body.statements[0], Stmt::Expr(Expr::Send { .. })));
    }

    #[test]
    fn parses_pointer_cast_and_deref_chain() {
        let prog = parse("void f(){ int a=10; int *p=&a; int **pp=&p; int r=**pp; }");
        let Decl::Function(f) = &prog.decls[0] else { panic!() };
        assert_eq!(f.body.statements.len(), 4);
    }

    #[test]
    fn rejects_unexpected_token() {
        let tokens = Lexer::new("int x = ;").tokenize().unwrap();
        let err = Parser::new(tokens).parse_program();
        assert!(matches!(err, Err(ParseError::UnexpectedToken { .. })));
    }
}
