//! Logic expressions — the source-level transform of `rule` factors.
//!
//! A rule's behavior is a small expression over named matrices:
//!
//! ```text
//! close > sma(close, 20) and volume > 1.5 * sma(volume, 20)
//! ```
//!
//! Comparisons and connectives evaluate cell-wise to 1.0/0.0 (NaN propagates).
//! Expressions render back to canonical source, so an edited tree can be
//! re-parsed to prove it is still syntactically valid. Every comparison and
//! connective is an addressable *edit site* for logic-level mutation.

mod eval;
mod parser;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use eval::evaluate;
pub use parser::parse;

/// Upper bound for window literals.
pub const MAX_WINDOW: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LogicError {
    #[error("unexpected character '{ch}' at offset {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("unexpected {found} at offset {pos}, expected {expected}")]
    UnexpectedToken {
        found: String,
        pos: usize,
        expected: String,
    },
    #[error("unexpected end of input, expected {0}")]
    UnexpectedEnd(String),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{func}' expects {expected} argument(s), got {got}")]
    Arity {
        func: String,
        expected: usize,
        got: usize,
    },
    #[error("window for '{func}' must be an integer literal in [1, {MAX_WINDOW}], got {got}")]
    InvalidWindow { func: String, got: String },
    #[error("edit site {0} does not exist")]
    NoSuchSite(usize),
    #[error("edit site {site} holds {found}, cannot substitute {requested}")]
    SiteMismatch {
        site: usize,
        found: String,
        requested: String,
    },
}

// ─── Operators ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Sub => PREC_SUM,
            Self::Mul | Self::Div => PREC_PRODUCT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    /// Operators a logic mutation may substitute for this one.
    ///
    /// Boundary relaxation/tightening first (`<` ↔ `<=`), then direction flip.
    pub fn substitutes(self) -> &'static [CmpOp] {
        match self {
            Self::Lt => &[Self::Le, Self::Gt],
            Self::Le => &[Self::Lt, Self::Ge],
            Self::Gt => &[Self::Ge, Self::Lt],
            Self::Ge => &[Self::Gt, Self::Le],
            Self::Eq => &[Self::Ne],
            Self::Ne => &[Self::Eq],
        }
    }

    pub(crate) fn apply(self, a: f64, b: f64) -> bool {
        match self {
            Self::Lt => a < b,
            Self::Le => a <= b,
            Self::Gt => a > b,
            Self::Ge => a >= b,
            Self::Eq => a == b,
            Self::Ne => a != b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Connective {
    And,
    Or,
}

impl Connective {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Self::And => Self::Or,
            Self::Or => Self::And,
        }
    }

    fn precedence(self) -> u8 {
        match self {
            Self::Or => PREC_OR,
            Self::And => PREC_AND,
        }
    }
}

/// Built-in functions. Windowed functions take `(series, window)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Func {
    Sma,
    Max,
    Min,
    Lag,
    Std,
    Abs,
}

impl Func {
    pub fn name(self) -> &'static str {
        match self {
            Self::Sma => "sma",
            Self::Max => "max",
            Self::Min => "min",
            Self::Lag => "lag",
            Self::Std => "std",
            Self::Abs => "abs",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sma" => Some(Self::Sma),
            "max" => Some(Self::Max),
            "min" => Some(Self::Min),
            "lag" => Some(Self::Lag),
            "std" => Some(Self::Std),
            "abs" => Some(Self::Abs),
            _ => None,
        }
    }

    pub fn is_windowed(self) -> bool {
        !matches!(self, Self::Abs)
    }
}

// ─── AST ─────────────────────────────────────────────────────────────

const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_NOT: u8 = 3;
const PREC_CMP: u8 = 4;
const PREC_SUM: u8 = 5;
const PREC_PRODUCT: u8 = 6;
const PREC_UNARY: u8 = 7;
const PREC_ATOM: u8 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Number(f64),
    Ident(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Arith {
        op: ArithOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Compare {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Logical {
        op: Connective,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        func: Func,
        arg: Box<Expr>,
        window: Option<usize>,
    },
}

/// An operator position that a logic mutation can rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SiteOp {
    Compare(CmpOp),
    Connective(Connective),
}

impl fmt::Display for SiteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare(op) => f.write_str(op.symbol()),
            Self::Connective(op) => f.write_str(op.symbol()),
        }
    }
}

/// Substitute the operator at pre-order edit site `site` with `replacement`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicEdit {
    pub site: usize,
    pub replacement: SiteOp,
}

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Self::Number(_) | Self::Ident(_) | Self::Call { .. } => PREC_ATOM,
            Self::Neg(_) => PREC_UNARY,
            Self::Not(_) => PREC_NOT,
            Self::Arith { op, .. } => op.precedence(),
            Self::Compare { .. } => PREC_CMP,
            Self::Logical { op, .. } => op.precedence(),
        }
    }

    /// Matrix names referenced, in first-appearance order.
    pub fn identifiers(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_identifiers(&mut out);
        out
    }

    fn collect_identifiers(&self, out: &mut Vec<String>) {
        match self {
            Self::Number(_) => {}
            Self::Ident(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Self::Neg(e) | Self::Not(e) => e.collect_identifiers(out),
            Self::Call { arg, .. } => arg.collect_identifiers(out),
            Self::Arith { lhs, rhs, .. }
            | Self::Compare { lhs, rhs, .. }
            | Self::Logical { lhs, rhs, .. } => {
                lhs.collect_identifiers(out);
                rhs.collect_identifiers(out);
            }
        }
    }

    /// Every comparison and connective, in pre-order.
    pub fn edit_sites(&self) -> Vec<SiteOp> {
        let mut out = Vec::new();
        self.collect_sites(&mut out);
        out
    }

    fn collect_sites(&self, out: &mut Vec<SiteOp>) {
        match self {
            Self::Number(_) | Self::Ident(_) => {}
            Self::Neg(e) | Self::Not(e) => e.collect_sites(out),
            Self::Call { arg, .. } => arg.collect_sites(out),
            Self::Arith { lhs, rhs, .. } => {
                lhs.collect_sites(out);
                rhs.collect_sites(out);
            }
            Self::Compare { op, lhs, rhs } => {
                out.push(SiteOp::Compare(*op));
                lhs.collect_sites(out);
                rhs.collect_sites(out);
            }
            Self::Logical { op, lhs, rhs } => {
                out.push(SiteOp::Connective(*op));
                lhs.collect_sites(out);
                rhs.collect_sites(out);
            }
        }
    }

    /// Return a copy with one operator substituted.
    ///
    /// The replacement must be of the same kind as the site (comparison for
    /// comparison, connective for connective).
    pub fn apply_edit(&self, edit: LogicEdit) -> Result<Expr, LogicError> {
        let mut copy = self.clone();
        let mut counter = 0usize;
        match copy.edit_in_place(edit, &mut counter)? {
            true => Ok(copy),
            false => Err(LogicError::NoSuchSite(edit.site)),
        }
    }

    fn edit_in_place(&mut self, edit: LogicEdit, counter: &mut usize) -> Result<bool, LogicError> {
        match self {
            Self::Number(_) | Self::Ident(_) => Ok(false),
            Self::Neg(e) | Self::Not(e) => e.edit_in_place(edit, counter),
            Self::Call { arg, .. } => arg.edit_in_place(edit, counter),
            Self::Arith { lhs, rhs, .. } => {
                Ok(lhs.edit_in_place(edit, counter)? || rhs.edit_in_place(edit, counter)?)
            }
            Self::Compare { op, lhs, rhs } => {
                if *counter == edit.site {
                    match edit.replacement {
                        SiteOp::Compare(new_op) => *op = new_op,
                        other => {
                            return Err(LogicError::SiteMismatch {
                                site: edit.site,
                                found: op.symbol().into(),
                                requested: other.to_string(),
                            })
                        }
                    }
                    return Ok(true);
                }
                *counter += 1;
                Ok(lhs.edit_in_place(edit, counter)? || rhs.edit_in_place(edit, counter)?)
            }
            Self::Logical { op, lhs, rhs } => {
                if *counter == edit.site {
                    match edit.replacement {
                        SiteOp::Connective(new_op) => *op = new_op,
                        other => {
                            return Err(LogicError::SiteMismatch {
                                site: edit.site,
                                found: op.symbol().into(),
                                requested: other.to_string(),
                            })
                        }
                    }
                    return Ok(true);
                }
                *counter += 1;
                Ok(lhs.edit_in_place(edit, counter)? || rhs.edit_in_place(edit, counter)?)
            }
        }
    }

    fn fmt_child(&self, f: &mut fmt::Formatter<'_>, min_prec: u8) -> fmt::Result {
        if self.precedence() < min_prec {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

/// Canonical source rendering. `parse(expr.to_string())` yields `expr` again.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Ident(name) => f.write_str(name),
            Self::Neg(e) => {
                f.write_str("-")?;
                e.fmt_child(f, PREC_UNARY)
            }
            Self::Not(e) => {
                f.write_str("not ")?;
                e.fmt_child(f, PREC_NOT)
            }
            Self::Arith { op, lhs, rhs } => {
                let p = op.precedence();
                lhs.fmt_child(f, p)?;
                write!(f, " {} ", op.symbol())?;
                rhs.fmt_child(f, p + 1)
            }
            Self::Compare { op, lhs, rhs } => {
                lhs.fmt_child(f, PREC_SUM)?;
                write!(f, " {} ", op.symbol())?;
                rhs.fmt_child(f, PREC_SUM)
            }
            Self::Logical { op, lhs, rhs } => {
                let p = op.precedence();
                lhs.fmt_child(f, p)?;
                write!(f, " {} ", op.symbol())?;
                rhs.fmt_child(f, p + 1)
            }
            Self::Call { func, arg, window } => match window {
                Some(n) => write!(f, "{}({arg}, {n})", func.name()),
                None => write!(f, "{}({arg})", func.name()),
            },
        }
    }
}
