use std::str::FromStr;

use crate::error::ConfigError;

const DETOK_PUNCTUATION: [char; 6] = ['.', ',', '!', '?', ';', ':'];

/// Pure string to string post-processing step.
pub trait TextFilter: Send + Sync {
    fn apply(&self, text: &str) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Joins BPE subword units marked with a trailing `@@`.
    Bpe,
    /// Reverts compound splitting (`a ##AT##-##AT## b` becomes `a-b`).
    Compound,
    /// Removes the space tokenization put before sentence punctuation.
    Detokenize,
}

impl FilterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bpe => "bpe",
            Self::Compound => "compound",
            Self::Detokenize => "detok",
        }
    }
}

impl FromStr for FilterKind {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bpe" => Ok(Self::Bpe),
            "compound" => Ok(Self::Compound),
            "detok" | "detokenize" => Ok(Self::Detokenize),
            other => Err(ConfigError::UnknownFilter(other.to_string())),
        }
    }
}

impl TextFilter for FilterKind {
    fn apply(&self, text: &str) -> String {
        match self {
            Self::Bpe => {
                let joined = text.replace("@@ ", "");
                joined
                    .strip_suffix("@@")
                    .map(str::to_string)
                    .unwrap_or(joined)
            }
            Self::Compound => text.replace(" ##AT##-##AT## ", "-"),
            Self::Detokenize => {
                let mut out = String::with_capacity(text.len());
                let mut chars = text.chars().peekable();
                while let Some(c) = chars.next() {
                    if c == ' ' && chars.peek().is_some_and(|n| DETOK_PUNCTUATION.contains(n)) {
                        continue;
                    }
                    out.push(c);
                }
                out
            }
        }
    }
}

/// Filters applied in configured order.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn TextFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_kinds(kinds: &[FilterKind]) -> Self {
        let mut chain = Self::new();
        for &kind in kinds {
            chain.push(Box::new(kind));
        }
        chain
    }

    pub fn push(&mut self, filter: Box<dyn TextFilter>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn apply(&self, text: &str) -> String {
        self.filters
            .iter()
            .fold(text.to_string(), |acc, filter| filter.apply(&acc))
    }
}
