use crate::ast::Pos;
use crate::error::LexError;
use crate::token::{keyword, Token, TokenKind};

/// Scans preprocessed source text into a token stream. Whitespace and
/// comments are skipped entirely; the parser sees only meaningful tokens
/// and never newlines, so both K&R and same-line brace styles fall out of
/// the grammar for free.
pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if done {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn pos_mark(&self) -> Pos {
        Pos::new(self.line, self.column)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.advance();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    self.advance();
                    self.advance();
                    loop {
                        match self.peek() {
                            None => break,
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            _ => {
                                self.advance();
                            }
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia();
        let start_pos = self.pos_mark();

        let Some(c) = self.peek() else {
            return Ok(Token::new(TokenKind::Eof, "", start_pos));
        };

        if c.is_ascii_digit() {
            return self.scan_number(start_pos);
        }
        if is_ident_start(c) {
            return self.scan_ident(start_pos);
        }
        if c == b'"' {
            return self.scan_string(start_pos);
        }
        if c == b'\'' {
            return self.scan_char(start_pos);
        }

        self.scan_punct(start_pos)
    }

    fn scan_number(&mut self, start_pos: Pos) -> Result<Token, LexError> {
        let start = self.pos;

        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
            self.advance();
            self.advance();
            let hex_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.advance();
            }
            if self.pos == hex_start {
                let lexeme = self.slice(start);
                return Err(LexError::BadNumber(start_pos, lexeme));
            }
            let lexeme = self.slice(start);
            let digits = &lexeme[2..];
            let value = i64::from_str_radix(digits, 16)
                .map_err(|_| LexError::BadNumber(start_pos, lexeme.clone()))?;
            return Ok(Token::new(TokenKind::IntLiteral(value), lexeme, start_pos));
        }

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        let mut is_float = false;
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
            if matches!(self.peek(), Some(b'e') | Some(b'E')) {
                self.advance();
                if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                    self.advance();
                }
                let exp_start = self.pos;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
                if self.pos == exp_start {
                    let lexeme = self.slice(start);
                    return Err(LexError::BadNumber(start_pos, lexeme));
                }
            }
        }

        let lexeme = self.slice(start);
        if is_float {
            let value: f32 = lexeme
                .parse()
                .map_err(|_| LexError::BadNumber(start_pos, lexeme.clone()))?;
            Ok(Token::new(TokenKind::FloatLiteral(value), lexeme, start_pos))
        } else {
            let value: i64 = lexeme
                .parse()
                .map_err(|_| LexError::BadNumber(start_pos, lexeme.clone()))?;
            Ok(Token::new(TokenKind::IntLiteral(value), lexeme, start_pos))
        }
    }

    fn scan_ident(&mut self, start_pos: Pos) -> Result<Token, LexError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| is_ident_continue(c)) {
            self.advance();
        }
        let lexeme = self.slice(start);
        let kind = keyword(&lexeme).unwrap_or_else(|| TokenKind::Ident(lexeme.clone()));
        Ok(Token::new(kind, lexeme, start_pos))
    }

    fn scan_string(&mut self, start_pos: Pos) -> Result<Token, LexError> {
        self.advance();
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(LexError::UnterminatedLiteral(start_pos)),
                Some(b'"') => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    let escaped = self.scan_escape(start_pos)?;
                    value.push(escaped as char);
                }
                Some(b'\n') => return Err(LexError::UnterminatedLiteral(start_pos)),
                Some(_) => {
                    let c = self.advance().unwrap();
                    value.push(c as char);
                }
            }
        }
        Ok(Token::new(TokenKind::StringLiteral(value.clone()), value, start_pos))
    }

    fn scan_char(&mut self, start_pos: Pos) -> Result<Token, LexError> {
        self.advance();
        let value = match self.peek() {
            None => return Err(LexError::UnterminatedLiteral(start_pos)),
            Some(b'\\') => {
                self.advance();
                self.scan_escape(start_pos)?
            }
            Some(c) => {
                self.advance();
                c
            }
        };
        if self.peek() != Some(b'\'') {
            return Err(LexError::UnterminatedLiteral(start_pos));
        }
        self.advance();
        Ok(Token::new(
            TokenKind::CharLiteral(value),
            (value as char).to_string(),
            start_pos,
        ))
    }

    fn scan_escape(&mut self, start_pos: Pos) -> Result<u8, LexError> {
        let c = self.peek().ok_or(LexError::UnterminatedLiteral(start_pos))?;
        self.advance();
        Ok(match c {
            b'n' => b'\n',
            b't' => b'\t',
            b'r' => b'\r',
            b'0' => 0,
            b'\\' => b'\\',
            b'\'' => b'\'',
            b'"' => b'"',
            b'x' => {
                let hi = self.hex_digit(start_pos)?;
                let lo = self.hex_digit(start_pos)?;
                hi * 16 + lo
            }
            other => return Err(LexError::BadChar(start_pos, other as char)),
        })
    }

    fn hex_digit(&mut self, start_pos: Pos) -> Result<u8, LexError> {
        let c = self.peek().ok_or(LexError::UnterminatedLiteral(start_pos))?;
        if !c.is_ascii_hexdigit() {
            return Err(LexError::BadChar(start_pos, c as char));
        }
        self.advance();
        Ok((c as char).to_digit(16).unwrap() as u8)
    }

    fn scan_punct(&mut self, start_pos: Pos) -> Result<Token, LexError> {
        macro_rules! two {
            ($second:expr, $two_kind:expr, $one_kind:expr, $lex1:expr, $lex2:expr) => {{
                self.advance();
                if self.peek() == Some($second) {
                    self.advance();
                    Ok(Token::new($two_kind, $lex2, start_pos))
                } else {
                    Ok(Token::new($one_kind, $lex1, start_pos))
                }
            }};
        }

        let c = self.peek().unwrap();
        match c {
            b'(' => self.single(TokenKind::LParen, start_pos),
            b')' => self.single(TokenKind::RParen, start_pos),
            b'{' => self.single(TokenKind::LBrace, start_pos),
            b'}' => self.single(TokenKind::RBrace, start_pos),
            b'[' => self.single(TokenKind::LBracket, start_pos),
            b']' => self.single(TokenKind::RBracket, start_pos),
            b';' => self.single(TokenKind::Semi, start_pos),
            b',' => self.single(TokenKind::Comma, start_pos),
            b':' => self.single(TokenKind::Colon, start_pos),
            b'~' => self.single(TokenKind::Tilde, start_pos),
            b'.' => self.single(TokenKind::Dot, start_pos),
            b'-' => {
                self.advance();
                match self.peek() {
                    Some(b'>') => {
                        self.advance();
                        Ok(Token::new(TokenKind::Arrow, "->", start_pos))
                    }
                    Some(b'-') => {
                        self.advance();
                        Ok(Token::new(TokenKind::MinusMinus, "--", start_pos))
                    }
                    Some(b'=') => {
                        self.advance();
                        Ok(Token::new(TokenKind::MinusEq, "-=", start_pos))
                    }
                    _ => Ok(Token::new(TokenKind::Minus, "-", start_pos)),
                }
            }
            b'+' => {
                self.advance();
                match self.peek() {
                    Some(b'+') => {
                        self.advance();
                        Ok(Token::new(TokenKind::PlusPlus, "++", start_pos))
                    }
                    Some(b'=') => {
                        self.advance();
                        Ok(Token::new(TokenKind::PlusEq, "+=", start_pos))
                    }
                    _ => Ok(Token::new(TokenKind::Plus, "+", start_pos)),
                }
            }
            b'*' => two!(b'=', TokenKind::StarEq, TokenKind::Star, "*", "*="),
            b'/' => two!(b'=', TokenKind::SlashEq, TokenKind::Slash, "/", "/="),
            b'%' => two!(b'=', TokenKind::PercentEq, TokenKind::Percent, "%", "%="),
            b'^' => two!(b'=', TokenKind::CaretEq, TokenKind::Caret, "^", "^="),
            b'!' => two!(b'=', TokenKind::NotEq, TokenKind::Bang, "!", "!="),
            b'=' => two!(b'=', TokenKind::EqEq, TokenKind::Assign, "=", "=="),
            b'&' => {
                self.advance();
                match self.peek() {
                    Some(b'&') => {
                        self.advance();
                        Ok(Token::new(TokenKind::AmpAmp, "&&", start_pos))
                    }
                    Some(b'=') => {
                        self.advance();
                        Ok(Token::new(TokenKind::AmpEq, "&=", start_pos))
                    }
                    _ => Ok(Token::new(TokenKind::Amp, "&", start_pos)),
                }
            }
            b'|' => {
                self.advance();
                match self.peek() {
                    Some(b'|') => {
                        self.advance();
                        Ok(Token::new(TokenKind::PipePipe, "||", start_pos))
                    }
                    Some(b'=') => {
                        self.advance();
                        Ok(Token::new(TokenKind::PipeEq, "|=", start_pos))
                    }
                    _ => Ok(Token::new(TokenKind::Pipe, "|", start_pos)),
                }
            }
            b'<' => {
                self.advance();
                match self.peek() {
                    Some(b'=') => {
                        self.advance();
                        Ok(Token::new(TokenKind::Lte, "<=", start_pos))
                    }
                    Some(b'<') => {
                        self.advance();
                        if self.peek() == Some(b'=') {
                            self.advance();
                            Ok(Token::new(TokenKind::ShlEq, "<<=", start_pos))
                        } else {
                            Ok(Token::new(TokenKind::Shl, "<<", start_pos))
                        }
                    }
                    _ => Ok(Token::new(TokenKind::Lt, "<", start_pos)),
                }
            }
            b'>' => {
                self.advance();
                match self.peek() {
                    Some(b'=') => {
                        self.advance();
                        Ok(Token::new(TokenKind::Gte, ">=", start_pos))
                    }
                    Some(b'>') => {
                        self.advance();
                        if self.peek() == Some(b'=') {
                            self.advance();
                            Ok(Token::new(TokenKind::ShrEq, ">>=", start_pos))
                        } else {
                            Ok(Token::new(TokenKind::Shr, ">>", start_pos))
                        }
                    }
                    _ => Ok(Token::new(TokenKind::Gt, ">", start_pos)),
                }
            }
            other => Err(LexError::BadChar(start_pos, other as char)),
        }
    }

    fn single(&mut self, kind: TokenKind, start_pos: Pos) -> Result<Token, LexError> {
        let c = self.advance().unwrap();
        Ok(Token::new(kind, (c as char).to_string(), start_pos))
    }

    fn slice(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn hex_and_decimal_literals() {
        assert_eq!(kinds("0xFF")[0], TokenKind::IntLiteral(255));
        assert_eq!(kinds("0x0")[0], TokenKind::IntLiteral(0));
        assert_eq!(kinds("0x7FFFFFFF")[0], TokenKind::IntLiteral(2147483647));
        assert_eq!(kinds("0XABCD")[0], TokenKind::IntLiteral(43981));
    }

    #[test]
    fn boolean_keywords() {
        assert_eq!(kinds("true")[0], TokenKind::BoolLiteral(true));
        assert_eq!(kinds("false")[0], TokenKind::BoolLiteral(false));
    }

    #[test]
    fn float_literal_with_exponent() {
        assert_eq!(kinds("1.5e2")[0], TokenKind::FloatLiteral(150.0));
    }

    #[test]
    fn string_and_char_escapes() {
        let ks = kinds(r#" "a\nb" '\t' "#);
        assert_eq!(ks[0], TokenKind::StringLiteral("a\nb".to_string()));
        assert_eq!(ks[1], TokenKind::CharLiteral(b'\t'));
    }

    #[test]
    fn comments_are_skipped() {
        let ks = kinds("int x; // trailing\n/* block */ int y;");
        assert_eq!(ks.len(), 7); // int x ; int y ; EOF
    }

    #[test]
    fn unterminated_string_is_reported() {
        let err = Lexer::new("\"abc").tokenize();
        assert!(matches!(err, Err(LexError::UnterminatedLiteral(_))));
    }

    #[test]
    fn arrow_and_member_operators() {
        let ks = kinds("p->f.g");
        assert_eq!(ks[1], TokenKind::Arrow);
        assert_eq!(ks[3], TokenKind::Dot);
    }

    #[test]
    fn lexeme_round_trips_to_same_kind() {
        for src in ["123", "0x1A", "3.5", "ident_42", "\"hi\"", "'x'", "<<=", "->", "!="] {
            let first = Lexer::new(src).tokenize().unwrap().remove(0);
            let second = Lexer::new(&first.lexeme).tokenize();
            if let Ok(mut toks) = second {
                let reparsed = toks.remove(0);
                if !matches!(first.kind, TokenKind::StringLiteral(_) | TokenKind::CharLiteral(_)) {
                    assert_eq!(std::mem::discriminant(&first.kind), std::mem::discriminant(&reparsed.kind));
                }
            }
        }
    }
}
