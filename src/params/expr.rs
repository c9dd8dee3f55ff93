//! Parameter constraint expressions.
//!
//! A parameter may be tied to others through an arithmetic expression over
//! their full names, e.g. `dw__g23n * 0.5` or `sqrt(r_nz__g23n__b600.0__t25.0)`.
//!
//! Supported: numbers, identifiers, `+ - * /`, `^` (or `**`), parentheses,
//! unary minus and the functions `sqrt`, `exp`, `ln`, `abs`.

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Var(String),
    Neg(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Sqrt,
    Exp,
    Ln,
    Abs,
}

impl Func {
    fn from_name(name: &str) -> Option<Func> {
        match name {
            "sqrt" => Some(Func::Sqrt),
            "exp" => Some(Func::Exp),
            "ln" | "log" => Some(Func::Ln),
            "abs" => Some(Func::Abs),
            _ => None,
        }
    }

    fn apply(self, x: f64) -> f64 {
        match self {
            Func::Sqrt => x.sqrt(),
            Func::Exp => x.exp(),
            Func::Ln => x.ln(),
            Func::Abs => x.abs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<Token>, AppError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| AppError::config(format!("Invalid number '{text}' in expression '{src}'.")))?;
            tokens.push(Token::Num(value));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            tokens.push(Token::Ident(ident.to_ascii_lowercase()));
        } else if c == '*' && chars.get(i + 1) == Some(&'*') {
            tokens.push(Token::Op('^'));
            i += 2;
        } else if matches!(c, '+' | '-' | '*' | '/' | '^') {
            tokens.push(Token::Op(c));
            i += 1;
        } else if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else {
            return Err(AppError::config(format!(
                "Unexpected character '{c}' in expression '{src}'."
            )));
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn error(&self, what: &str) -> AppError {
        AppError::config(format!("Invalid expression '{}': {what}.", self.src))
    }

    fn expr(&mut self) -> Result<Expr, AppError> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            let op = if *op == '+' { BinOp::Add } else { BinOp::Sub };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, AppError> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            let op = if *op == '*' { BinOp::Mul } else { BinOp::Div };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, AppError> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, AppError> {
        let base = self.atom()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            // Right associative.
            let exponent = self.unary()?;
            return Ok(Expr::Bin(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, AppError> {
        match self.next() {
            Some(Token::Num(v)) => Ok(Expr::Num(v)),
            Some(Token::Ident(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    let func = Func::from_name(&name)
                        .ok_or_else(|| self.error(&format!("unknown function '{name}'")))?;
                    self.pos += 1;
                    let arg = self.expr()?;
                    match self.next() {
                        Some(Token::RParen) => Ok(Expr::Call(func, Box::new(arg))),
                        _ => Err(self.error("missing ')'")),
                    }
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(self.error("missing ')'")),
                }
            }
            Some(t) => Err(self.error(&format!("unexpected token {t:?}"))),
            None => Err(self.error("unexpected end of input")),
        }
    }
}

impl Expr {
    pub fn parse(src: &str) -> Result<Expr, AppError> {
        let mut parser = Parser {
            src,
            tokens: tokenize(src)?,
            pos: 0,
        };
        let expr = parser.expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("trailing input"));
        }
        Ok(expr)
    }

    /// Evaluate with `lookup` resolving identifiers to values.
    pub fn eval(&self, lookup: &dyn Fn(&str) -> Option<f64>) -> Result<f64, AppError> {
        Ok(match self {
            Expr::Num(v) => *v,
            Expr::Var(name) => lookup(name)
                .ok_or_else(|| AppError::config(format!("Unknown parameter '{name}' in expression.")))?,
            Expr::Neg(e) => -e.eval(lookup)?,
            Expr::Call(f, e) => f.apply(e.eval(lookup)?),
            Expr::Bin(op, a, b) => {
                let a = a.eval(lookup)?;
                let b = b.eval(lookup)?;
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                }
            }
        })
    }

    /// Identifiers referenced by the expression, in first-use order.
    pub fn identifiers(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_identifiers(&mut out);
        out
    }

    fn collect_identifiers(&self, out: &mut Vec<String>) {
        match self {
            Expr::Num(_) => {}
            Expr::Var(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::Neg(e) | Expr::Call(_, e) => e.collect_identifiers(out),
            Expr::Bin(_, a, b) => {
                a.collect_identifiers(out);
                b.collect_identifiers(out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<f64> {
        match name {
            "dw__g23n" => Some(2.0),
            "r_nz__g23n__b600.0__t25.0" => Some(1.5),
            _ => None,
        }
    }

    #[test]
    fn precedence_and_associativity() {
        let e = Expr::parse("1 + 2 * 3 ^ 2 ^ 0.5 - -1").unwrap();
        let expected = 1.0 + 2.0 * 3f64.powf(2f64.powf(0.5)) + 1.0;
        assert!((e.eval(&lookup).unwrap() - expected).abs() < 1e-12);
        assert_eq!(Expr::parse("2**3").unwrap().eval(&lookup).unwrap(), 8.0);
        assert!((Expr::parse("1e-3 * 2E2").unwrap().eval(&lookup).unwrap() - 0.2).abs() < 1e-15);
    }

    #[test]
    fn identifiers_with_dots_and_functions() {
        let e = Expr::parse("sqrt(r_nz__g23n__b600.0__t25.0 * 6) + dw__g23n / 2").unwrap();
        assert_eq!(e.eval(&lookup).unwrap(), 3.0 + 1.0);
        assert_eq!(e.identifiers(), vec!["r_nz__g23n__b600.0__t25.0", "dw__g23n"]);
    }

    #[test]
    fn errors_are_configuration_errors() {
        assert!(Expr::parse("(1 + 2").is_err());
        assert!(Expr::parse("foo(1)").is_err());
        assert!(Expr::parse("1 $ 2").is_err());
        let err = Expr::parse("kex__t30.0").unwrap().eval(&lookup).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
    }
}
