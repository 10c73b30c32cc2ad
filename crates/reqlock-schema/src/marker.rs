//! PEP 508 environment markers: parsing, canonical display and evaluation.

use crate::environment::MarkerEnvironment;
use crate::specifier::Specifier;
use crate::version::Version;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Marker variables a platform can supply values for.
pub const MARKER_VARIABLES: [&str; 11] = [
    "implementation_name",
    "implementation_version",
    "os_name",
    "platform_machine",
    "platform_python_implementation",
    "platform_release",
    "platform_system",
    "platform_version",
    "python_full_version",
    "python_version",
    "sys_platform",
];

const EXTRA: &str = "extra";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MarkerError {
    #[error("invalid marker '{input}': {reason}")]
    Parse { input: String, reason: String },
    #[error("marker variable '{0}' is not defined for this environment")]
    UndefinedVariable(String),
    #[error("cannot compare '{lhs}' {op} '{rhs}'")]
    InvalidComparison { lhs: String, op: String, rhs: String },
    #[error("unknown marker variable '{0}'")]
    UnknownVariable(String),
}

fn canonical_variable(word: &str) -> Option<&'static str> {
    let name = match word {
        "os.name" => "os_name",
        "sys.platform" => "sys_platform",
        "platform.version" => "platform_version",
        "platform.machine" => "platform_machine",
        "platform.python_implementation" | "python_implementation" => {
            "platform_python_implementation"
        }
        other => other,
    };
    if name == EXTRA {
        return Some(EXTRA);
    }
    MARKER_VARIABLES.iter().copied().find(|v| *v == name)
}

pub fn is_marker_variable(name: &str) -> bool {
    MARKER_VARIABLES.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarkerOperand {
    Variable(&'static str),
    Literal(String),
}

impl fmt::Display for MarkerOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(name) => f.write_str(name),
            Self::Literal(value) if value.contains('"') => write!(f, "'{value}'"),
            Self::Literal(value) => write!(f, "\"{value}\""),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerOp {
    Compare(&'static str),
    In,
    NotIn,
}

impl fmt::Display for MarkerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare(op) => f.write_str(op),
            Self::In => f.write_str("in"),
            Self::NotIn => f.write_str("not in"),
        }
    }
}

/// A parsed marker expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Marker {
    Expr {
        lhs: MarkerOperand,
        op: MarkerOp,
        rhs: MarkerOperand,
    },
    And(Vec<Marker>),
    Or(Vec<Marker>),
}

impl Marker {
    pub fn parse(input: &str) -> Result<Self, MarkerError> {
        let tokens = tokenize(input)?;
        let mut parser = MarkerParser {
            input,
            tokens,
            pos: 0,
        };
        let marker = parser.or_expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(marker)
    }

    /// Conjunction of `markers`, flattening nested conjunctions.
    pub fn all(markers: impl IntoIterator<Item = Marker>) -> Option<Self> {
        let mut parts = Vec::new();
        for marker in markers {
            match marker {
                Self::And(inner) => parts.extend(inner),
                other => parts.push(other),
            }
        }
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(Self::And(parts)),
        }
    }

    /// Every variable the expression reads, in canonical spelling.
    pub fn variables(&self) -> BTreeSet<&'static str> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut BTreeSet<&'static str>) {
        match self {
            Self::Expr { lhs, rhs, .. } => {
                for side in [lhs, rhs] {
                    if let MarkerOperand::Variable(name) = side {
                        out.insert(*name);
                    }
                }
            }
            Self::And(parts) | Self::Or(parts) => {
                for part in parts {
                    part.collect_variables(out);
                }
            }
        }
    }

    /// Evaluate against `env`, with `extras` as the requested extras.
    pub fn evaluate(
        &self,
        env: &MarkerEnvironment,
        extras: &BTreeSet<String>,
    ) -> Result<bool, MarkerError> {
        match self {
            Self::And(parts) => {
                for part in parts {
                    if !part.evaluate(env, extras)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Or(parts) => {
                for part in parts {
                    if part.evaluate(env, extras)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Expr { lhs, op, rhs } => evaluate_expr(lhs, *op, rhs, env, extras),
        }
    }
}

fn evaluate_expr(
    lhs: &MarkerOperand,
    op: MarkerOp,
    rhs: &MarkerOperand,
    env: &MarkerEnvironment,
    extras: &BTreeSet<String>,
) -> Result<bool, MarkerError> {
    let is_extra = |side: &MarkerOperand| matches!(side, MarkerOperand::Variable(EXTRA));
    if is_extra(lhs) || is_extra(rhs) {
        let literal = match (lhs, rhs) {
            (MarkerOperand::Literal(value), _) | (_, MarkerOperand::Literal(value)) => {
                crate::types::canonicalize_name(value)
            }
            _ => String::new(),
        };
        let requested = extras
            .iter()
            .any(|e| crate::types::canonicalize_name(e) == literal);
        return match op {
            MarkerOp::Compare("==") | MarkerOp::In => Ok(requested),
            MarkerOp::Compare("!=") | MarkerOp::NotIn => Ok(!requested),
            other => Err(MarkerError::InvalidComparison {
                lhs: lhs.to_string(),
                op: other.to_string(),
                rhs: rhs.to_string(),
            }),
        };
    }

    let resolve = |side: &MarkerOperand| -> Result<String, MarkerError> {
        match side {
            MarkerOperand::Literal(value) => Ok(value.clone()),
            MarkerOperand::Variable(name) => env
                .get(name)
                .map(str::to_owned)
                .ok_or_else(|| MarkerError::UndefinedVariable((*name).to_owned())),
        }
    };
    let left = resolve(lhs)?;
    let right = resolve(rhs)?;

    match op {
        MarkerOp::In => Ok(right.contains(&left)),
        MarkerOp::NotIn => Ok(!right.contains(&left)),
        MarkerOp::Compare(cmp) => {
            if let (Ok(spec), Ok(version)) = (
                Specifier::parse(&format!("{cmp}{right}")),
                Version::parse(&left),
            ) {
                return Ok(spec.contains(&version, true));
            }
            match cmp {
                "==" | "===" => Ok(left == right),
                "!=" => Ok(left != right),
                _ => Err(MarkerError::InvalidComparison {
                    lhs: left,
                    op: cmp.to_owned(),
                    rhs: right,
                }),
            }
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expr { lhs, op, rhs } => write!(f, "{lhs} {op} {rhs}"),
            Self::And(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" and ")?;
                    }
                    if matches!(part, Self::Or(_)) {
                        write!(f, "({part})")?;
                    } else {
                        write!(f, "{part}")?;
                    }
                }
                Ok(())
            }
            Self::Or(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" or ")?;
                    }
                    write!(f, "{part}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Marker {
    type Err = MarkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Str(String),
    Op(&'static str),
    Word(String),
}

const COMPARISONS: [&str; 8] = ["===", "==", "!=", "<=", ">=", "~=", "<", ">"];

fn tokenize(input: &str) -> Result<Vec<Token>, MarkerError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '(' {
            tokens.push(Token::Open);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::Close);
            i += 1;
        } else if c == '"' || c == '\'' {
            let end = chars[i + 1..]
                .iter()
                .position(|&ch| ch == c)
                .ok_or_else(|| MarkerError::Parse {
                    input: input.to_owned(),
                    reason: "unterminated string".to_owned(),
                })?;
            tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
            i += end + 2;
        } else if let Some(op) = COMPARISONS.iter().find(|op| {
            let len = op.len();
            i + len <= chars.len() && chars[i..i + len].iter().copied().eq(op.chars())
        }) {
            tokens.push(Token::Op(*op));
            i += op.len();
        } else if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
            {
                i += 1;
            }
            tokens.push(Token::Word(chars[start..i].iter().collect()));
        } else {
            return Err(MarkerError::Parse {
                input: input.to_owned(),
                reason: format!("unexpected character '{c}'"),
            });
        }
    }
    Ok(tokens)
}

struct MarkerParser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl MarkerParser<'_> {
    fn error(&self, reason: &str) -> MarkerError {
        MarkerError::Parse {
            input: self.input.to_owned(),
            reason: reason.to_owned(),
        }
    }

    fn peek_word(&self, word: &str) -> bool {
        matches!(self.tokens.get(self.pos), Some(Token::Word(w)) if w == word)
    }

    fn or_expr(&mut self) -> Result<Marker, MarkerError> {
        let mut parts = vec![self.and_expr()?];
        while self.peek_word("or") {
            self.pos += 1;
            parts.push(self.and_expr()?);
        }
        Ok(flatten(parts, true))
    }

    fn and_expr(&mut self) -> Result<Marker, MarkerError> {
        let mut parts = vec![self.atom()?];
        while self.peek_word("and") {
            self.pos += 1;
            parts.push(self.atom()?);
        }
        Ok(flatten(parts, false))
    }

    fn atom(&mut self) -> Result<Marker, MarkerError> {
        if self.tokens.get(self.pos) == Some(&Token::Open) {
            self.pos += 1;
            let inner = self.or_expr()?;
            if self.tokens.get(self.pos) != Some(&Token::Close) {
                return Err(self.error("expected ')'"));
            }
            self.pos += 1;
            return Ok(inner);
        }
        let lhs = self.operand()?;
        let op = self.operator()?;
        let rhs = self.operand()?;
        Ok(Marker::Expr { lhs, op, rhs })
    }

    fn operand(&mut self) -> Result<MarkerOperand, MarkerError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| self.error("expected a variable or string"))?;
        self.pos += 1;
        match token {
            Token::Str(value) => Ok(MarkerOperand::Literal(value)),
            Token::Word(word) => canonical_variable(&word)
                .map(MarkerOperand::Variable)
                .ok_or(MarkerError::UnknownVariable(word)),
            _ => Err(self.error("expected a variable or string")),
        }
    }

    fn operator(&mut self) -> Result<MarkerOp, MarkerError> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        match token {
            Some(Token::Op(op)) => Ok(MarkerOp::Compare(op)),
            Some(Token::Word(w)) if w == "in" => Ok(MarkerOp::In),
            Some(Token::Word(w)) if w == "not" => {
                if self.peek_word("in") {
                    self.pos += 1;
                    Ok(MarkerOp::NotIn)
                } else {
                    Err(self.error("expected 'in' after 'not'"))
                }
            }
            _ => Err(self.error("expected a comparison operator")),
        }
    }
}

fn flatten(mut parts: Vec<Marker>, or: bool) -> Marker {
    if parts.len() == 1 {
        return parts.remove(0);
    }
    let mut flat = Vec::with_capacity(parts.len());
    for part in parts {
        match (part, or) {
            (Marker::Or(inner), true) | (Marker::And(inner), false) => flat.extend(inner),
            (other, _) => flat.push(other),
        }
    }
    if or {
        Marker::Or(flat)
    } else {
        Marker::And(flat)
    }
}
