//! PEP 440 version parsing and ordering.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid version '{0}'")]
pub struct VersionError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreRelease {
    Alpha,
    Beta,
    Rc,
}

impl PreRelease {
    fn as_str(self) -> &'static str {
        match self {
            Self::Alpha => "a",
            Self::Beta => "b",
            Self::Rc => "rc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocalSegment {
    Text(String),
    Number(u64),
}

impl PartialOrd for LocalSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Numeric local segments sort after alphanumeric ones.
impl Ord for LocalSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Text(_), Self::Number(_)) => Ordering::Less,
            (Self::Number(_), Self::Text(_)) => Ordering::Greater,
        }
    }
}

/// A parsed PEP 440 version.
#[derive(Debug, Clone)]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(PreRelease, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Vec<LocalSegment>,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum PreKey {
    DevOnly,
    Pre(PreRelease, u64),
    Final,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum DevKey {
    Dev(u64),
    None,
}

impl Version {
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        Parser::new(input).parse()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn release(&self) -> &[u64] {
        &self.release
    }

    pub fn local(&self) -> &[LocalSegment] {
        &self.local
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    pub fn is_postrelease(&self) -> bool {
        self.post.is_some()
    }

    pub fn has_local(&self) -> bool {
        !self.local.is_empty()
    }

    /// The version without its local label.
    #[must_use]
    pub fn public(&self) -> Self {
        Self {
            local: Vec::new(),
            ..self.clone()
        }
    }

    /// Epoch and release only, e.g. `1.2.0rc1.post3` -> `1.2.0`.
    #[must_use]
    pub fn base(&self) -> Self {
        Self {
            epoch: self.epoch,
            release: self.release.clone(),
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }
    }

    fn trimmed_release(&self) -> &[u64] {
        let end = self
            .release
            .iter()
            .rposition(|&n| n != 0)
            .map_or(0, |i| i + 1);
        &self.release[..end]
    }

    fn pre_key(&self) -> PreKey {
        match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => PreKey::DevOnly,
            (Some((kind, n)), _, _) => PreKey::Pre(kind, n),
            _ => PreKey::Final,
        }
    }

    fn dev_key(&self) -> DevKey {
        self.dev.map_or(DevKey::None, DevKey::Dev)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.trimmed_release().cmp(other.trimmed_release()))
            .then_with(|| self.pre_key().cmp(&other.pre_key()))
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| self.dev_key().cmp(&other.dev_key()))
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        self.trimmed_release().hash(state);
        self.pre.hash(state);
        self.post.hash(state);
        self.dev.hash(state);
        self.local.hash(state);
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release: Vec<String> = self.release.iter().map(u64::to_string).collect();
        f.write_str(&release.join("."))?;
        if let Some((kind, n)) = self.pre {
            write!(f, "{}{n}", kind.as_str())?;
        }
        if let Some(n) = self.post {
            write!(f, ".post{n}")?;
        }
        if let Some(n) = self.dev {
            write!(f, ".dev{n}")?;
        }
        if !self.local.is_empty() {
            let local: Vec<String> = self
                .local
                .iter()
                .map(|seg| match seg {
                    LocalSegment::Text(s) => s.clone(),
                    LocalSegment::Number(n) => n.to_string(),
                })
                .collect();
            write!(f, "+{}", local.join("."))?;
        }
        Ok(())
    }
}

struct Parser {
    input: String,
    text: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        let normalized = input.trim().to_ascii_lowercase();
        Self {
            text: normalized.chars().collect(),
            input: input.to_owned(),
            pos: 0,
        }
    }

    fn error(&self) -> VersionError {
        VersionError(self.input.clone())
    }

    fn peek(&self) -> Option<char> {
        self.text.get(self.pos).copied()
    }

    fn eat(&mut self, literal: &str) -> bool {
        let end = self.pos + literal.chars().count();
        if end <= self.text.len() && self.text[self.pos..end].iter().copied().eq(literal.chars()) {
            self.pos = end;
            true
        } else {
            false
        }
    }

    fn eat_separator(&mut self) -> bool {
        if matches!(self.peek(), Some('-' | '_' | '.')) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn number(&mut self) -> Result<Option<u64>, VersionError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Ok(None);
        }
        let digits: String = self.text[start..self.pos].iter().collect();
        digits.parse().map(Some).map_err(|_| self.error())
    }

    fn keyword(&mut self, words: &[&str]) -> Option<String> {
        let save = self.pos;
        self.eat_separator();
        for word in words {
            if self.eat(word) {
                return Some((*word).to_owned());
            }
        }
        self.pos = save;
        None
    }

    fn parse(mut self) -> Result<Version, VersionError> {
        self.eat("v");

        let mut epoch = 0;
        let mut release = vec![self.number()?.ok_or_else(|| self.error())?];
        if self.peek() == Some('!') {
            self.pos += 1;
            epoch = release[0];
            release[0] = self.number()?.ok_or_else(|| self.error())?;
        }
        while self.peek() == Some('.')
            && self.text.get(self.pos + 1).is_some_and(char::is_ascii_digit)
        {
            self.pos += 1;
            release.push(self.number()?.ok_or_else(|| self.error())?);
        }

        let mut pre = None;
        if let Some(word) = self.keyword(&["alpha", "beta", "preview", "pre", "rc", "a", "b", "c"]) {
            let kind = match word.as_str() {
                "alpha" | "a" => PreRelease::Alpha,
                "beta" | "b" => PreRelease::Beta,
                _ => PreRelease::Rc,
            };
            self.eat_separator();
            pre = Some((kind, self.number()?.unwrap_or(0)));
        }

        let mut post = None;
        let save = self.pos;
        if self.eat("-") {
            post = self.number()?;
            if post.is_none() {
                self.pos = save;
            }
        }
        if post.is_none() && self.keyword(&["post", "rev", "r"]).is_some() {
            self.eat_separator();
            post = Some(self.number()?.unwrap_or(0));
        }

        let mut dev = None;
        if self.keyword(&["dev"]).is_some() {
            self.eat_separator();
            dev = Some(self.number()?.unwrap_or(0));
        }

        let mut local = Vec::new();
        if self.peek() == Some('+') {
            self.pos += 1;
            let rest: String = self.text[self.pos..].iter().collect();
            for segment in rest.split(['.', '-', '_']) {
                if segment.is_empty() || !segment.chars().all(|c| c.is_ascii_alphanumeric()) {
                    return Err(self.error());
                }
                local.push(match segment.parse::<u64>() {
                    Ok(n) => LocalSegment::Number(n),
                    Err(_) => LocalSegment::Text(segment.to_owned()),
                });
            }
            self.pos = self.text.len();
        }

        if self.pos != self.text.len() {
            return Err(self.error());
        }

        Ok(Version {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }
}
