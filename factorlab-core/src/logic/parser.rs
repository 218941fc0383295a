//! Tokenizer and recursive-descent parser.
//!
//! ```text
//! or      := and ("or" and)*
//! and     := not ("and" not)*
//! not     := "not" not | cmp
//! cmp     := sum (("<" | "<=" | ">" | ">=" | "==" | "!=") sum)?
//! sum     := product (("+" | "-") product)*
//! product := unary (("*" | "/") unary)*
//! unary   := "-" unary | atom
//! atom    := number | ident | ident "(" or ("," integer)? ")" | "(" or ")"
//! ```

use super::{ArithOp, CmpOp, Connective, Expr, Func, LogicError, MAX_WINDOW};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64, String),
    Ident(String),
    And,
    Or,
    Not,
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Cmp(CmpOp),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Number(_, raw) => format!("number '{raw}'"),
            Self::Ident(name) => format!("identifier '{name}'"),
            Self::And => "'and'".into(),
            Self::Or => "'or'".into(),
            Self::Not => "'not'".into(),
            Self::LParen => "'('".into(),
            Self::RParen => "')'".into(),
            Self::Comma => "','".into(),
            Self::Plus => "'+'".into(),
            Self::Minus => "'-'".into(),
            Self::Star => "'*'".into(),
            Self::Slash => "'/'".into(),
            Self::Cmp(op) => format!("'{}'", op.symbol()),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, LogicError> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, ch) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);
        match ch {
            c if c.is_whitespace() => {
                i += 1;
            }
            c if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                    i += 1;
                }
                let raw: String = chars[start..i].iter().map(|(_, c)| c).collect();
                let value = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| LogicError::InvalidNumber(raw.clone()))?;
                tokens.push((Token::Number(value, raw), pos));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].1.is_ascii_alphanumeric() || chars[i].1 == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().map(|(_, c)| c).collect();
                let token = match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(word),
                };
                tokens.push((token, pos));
            }
            _ => {
                let (token, width) = match (ch, next) {
                    ('<', Some('=')) => (Token::Cmp(CmpOp::Le), 2),
                    ('>', Some('=')) => (Token::Cmp(CmpOp::Ge), 2),
                    ('=', Some('=')) => (Token::Cmp(CmpOp::Eq), 2),
                    ('!', Some('=')) => (Token::Cmp(CmpOp::Ne), 2),
                    ('<', _) => (Token::Cmp(CmpOp::Lt), 1),
                    ('>', _) => (Token::Cmp(CmpOp::Gt), 1),
                    ('(', _) => (Token::LParen, 1),
                    (')', _) => (Token::RParen, 1),
                    (',', _) => (Token::Comma, 1),
                    ('+', _) => (Token::Plus, 1),
                    ('-', _) => (Token::Minus, 1),
                    ('*', _) => (Token::Star, 1),
                    ('/', _) => (Token::Slash, 1),
                    _ => return Err(LogicError::UnexpectedChar { ch, pos }),
                };
                tokens.push((token, pos));
                i += width;
            }
        }
    }
    Ok(tokens)
}

/// Parse expression source into an AST.
pub fn parse(src: &str) -> Result<Expr, LogicError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.or()?;
    match parser.peek() {
        None => Ok(expr),
        Some((tok, pos)) => Err(LogicError::UnexpectedToken {
            found: tok.describe(),
            pos: *pos,
            expected: "end of input".into(),
        }),
    }
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(Token, usize)> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<(Token, usize)> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, want: Token, expected: &str) -> Result<(), LogicError> {
        match self.advance() {
            Some((tok, _)) if tok == want => Ok(()),
            Some((tok, pos)) => Err(LogicError::UnexpectedToken {
                found: tok.describe(),
                pos,
                expected: expected.into(),
            }),
            None => Err(LogicError::UnexpectedEnd(expected.into())),
        }
    }

    fn or(&mut self) -> Result<Expr, LogicError> {
        let mut lhs = self.and()?;
        while self.peek_token() == Some(&Token::Or) {
            self.advance();
            let rhs = self.and()?;
            lhs = Expr::Logical {
                op: Connective::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, LogicError> {
        let mut lhs = self.not()?;
        while self.peek_token() == Some(&Token::And) {
            self.advance();
            let rhs = self.not()?;
            lhs = Expr::Logical {
                op: Connective::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn not(&mut self) -> Result<Expr, LogicError> {
        if self.peek_token() == Some(&Token::Not) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.cmp()
    }

    fn cmp(&mut self) -> Result<Expr, LogicError> {
        let lhs = self.sum()?;
        if let Some(Token::Cmp(op)) = self.peek_token() {
            let op = *op;
            self.advance();
            let rhs = self.sum()?;
            return Ok(Expr::Compare {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
        Ok(lhs)
    }

    fn sum(&mut self) -> Result<Expr, LogicError> {
        let mut lhs = self.product()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.product()?;
            lhs = Expr::Arith {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn product(&mut self) -> Result<Expr, LogicError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Star) => ArithOp::Mul,
                Some(Token::Slash) => ArithOp::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = Expr::Arith {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, LogicError> {
        if self.peek_token() == Some(&Token::Minus) {
            self.advance();
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Expr, LogicError> {
        match self.advance() {
            Some((Token::Number(v, _), _)) => Ok(Expr::Number(v)),
            Some((Token::Ident(name), _)) => {
                if self.peek_token() == Some(&Token::LParen) {
                    self.advance();
                    self.call(name)
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Some((Token::LParen, _)) => {
                let inner = self.or()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Some((tok, pos)) => Err(LogicError::UnexpectedToken {
                found: tok.describe(),
                pos,
                expected: "number, identifier or '('".into(),
            }),
            None => Err(LogicError::UnexpectedEnd("number, identifier or '('".into())),
        }
    }

    /// Function call; the opening parenthesis is already consumed.
    fn call(&mut self, name: String) -> Result<Expr, LogicError> {
        let func = Func::from_name(&name).ok_or_else(|| LogicError::UnknownFunction(name.clone()))?;
        let arg = self.or()?;

        let mut extra = Vec::new();
        while self.peek_token() == Some(&Token::Comma) {
            self.advance();
            match self.advance() {
                Some((tok, _)) => extra.push(tok),
                None => return Err(LogicError::UnexpectedEnd("window argument".into())),
            }
        }
        self.expect(Token::RParen, "')'")?;

        let expected = if func.is_windowed() { 2 } else { 1 };
        if extra.len() + 1 != expected {
            return Err(LogicError::Arity {
                func: name,
                expected,
                got: extra.len() + 1,
            });
        }

        let window = match extra.first() {
            None => None,
            Some(Token::Number(v, raw)) => {
                if v.fract() != 0.0 || *v < 1.0 || *v > MAX_WINDOW as f64 {
                    return Err(LogicError::InvalidWindow {
                        func: name,
                        got: raw.clone(),
                    });
                }
                Some(*v as usize)
            }
            Some(other) => {
                return Err(LogicError::InvalidWindow {
                    func: name,
                    got: other.describe(),
                })
            }
        };

        Ok(Expr::Call {
            func,
            arg: Box::new(arg),
            window,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_binds_and_tighter_than_or() {
        let ast = parse("a > 1 or b > 2 and c > 3").unwrap();
        match ast {
            Expr::Logical {
                op: Connective::Or,
                rhs,
                ..
            } => assert!(matches!(
                *rhs,
                Expr::Logical {
                    op: Connective::And,
                    ..
                }
            )),
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn arithmetic_is_left_associative() {
        assert_eq!(parse("a - b - c").unwrap().to_string(), "a - b - c");
        assert_eq!(parse("a - (b - c)").unwrap().to_string(), "a - (b - c)");
    }

    #[test]
    fn canonical_rendering_normalizes_whitespace_and_parens() {
        let ast = parse("((close>sma( close ,20)))and(volume>0)").unwrap();
        assert_eq!(ast.to_string(), "close > sma(close, 20) and volume > 0");
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(parse("close >"), Err(LogicError::UnexpectedEnd(_))));
        assert!(matches!(parse("close $ 1"), Err(LogicError::UnexpectedChar { ch: '$', .. })));
        assert!(matches!(parse("(a > 1"), Err(LogicError::UnexpectedEnd(_))));
        assert!(matches!(parse("a > 1 b"), Err(LogicError::UnexpectedToken { .. })));
        assert!(matches!(parse("a < b < c"), Err(LogicError::UnexpectedToken { .. })));
        assert!(matches!(parse("1.2.3 > a"), Err(LogicError::InvalidNumber(_))));
    }

    #[test]
    fn overflowing_literal_is_rejected() {
        let source = format!("close > 1{}", "0".repeat(400));
        match parse(&source) {
            Err(LogicError::InvalidNumber(raw)) => assert_eq!(raw.len(), 401),
            other => panic!("expected InvalidNumber, got {other:?}"),
        }
        // Large but finite literals still render back to the same tree.
        let ast = parse(&format!("close > 1{}", "0".repeat(300))).unwrap();
        assert_eq!(parse(&ast.to_string()).unwrap(), ast);
    }

    #[test]
    fn validates_function_calls() {
        assert!(matches!(parse("ema(close, 3) > 1"), Err(LogicError::UnknownFunction(_))));
        assert!(matches!(
            parse("sma(close) > 1"),
            Err(LogicError::Arity { expected: 2, got: 1, .. })
        ));
        assert!(matches!(
            parse("abs(close, 2) > 1"),
            Err(LogicError::Arity { expected: 1, got: 2, .. })
        ));
        assert!(matches!(parse("sma(close, 2.5) > 1"), Err(LogicError::InvalidWindow { .. })));
        assert!(matches!(parse("sma(close, 0) > 1"), Err(LogicError::InvalidWindow { .. })));
        assert!(matches!(parse("sma(close, n) > 1"), Err(LogicError::InvalidWindow { .. })));
    }

    #[test]
    fn unary_minus_and_not() {
        assert_eq!(parse("-a > -1").unwrap().to_string(), "-a > -1");
        assert_eq!(parse("not not a > 1").unwrap().to_string(), "not not a > 1");
        assert_eq!(parse("-(a + b) > 0").unwrap().to_string(), "-(a + b) > 0");
    }
}
