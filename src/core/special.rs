//! Special-token registry and scanning.
//!
//! Special tokens are reserved literal strings with fixed ids that bypass
//! BPE merging and carry structural meaning (sequence boundaries, role
//! headers, turn markers). Scanning splits raw input into literal spans
//! and special-token spans; whether a literal special token may appear in
//! the input at all is controlled by a caller-supplied allow-list, so
//! untrusted text cannot inject control tokens.

use aho_corasick::{AhoCorasick, BuildError, MatchKind};
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

/// A literal special token was found in input that does not allow it.
///
/// Recoverable by the caller: re-encode with `encode_ordinary`, or widen
/// the allow-list if the token is intentional.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Disallowed special token {literal:?} at byte offset {position}")]
pub struct DisallowedSpecialToken {
    pub literal: String,
    pub position: usize,
}

/// Allow-list policy for literal special tokens in input text.
#[derive(Debug, Clone)]
pub enum AllowedSpecial {
    /// Every registered special token may appear literally.
    All,
    /// No special token may appear literally.
    None,
    /// Only the named literals may appear.
    Only(FxHashSet<String>),
}

impl AllowedSpecial {
    /// Build an `Only` policy from literal strings.
    pub fn only<I, S>(literals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(literals.into_iter().map(Into::into).collect())
    }

    fn permits(&self, literal: &str) -> bool {
        match self {
            Self::All => true,
            Self::None => false,
            Self::Only(set) => set.contains(literal),
        }
    }
}

/// One span of scanned input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialSpan<'t> {
    /// Ordinary text, routed to pre-tokenization and BPE merging.
    Literal(&'t str),
    /// A matched special token, contributing its fixed id directly.
    Special(u32),
}

/// Fixed set of special-token literals with ids, plus the scanning
/// automaton over them. Immutable once built.
#[derive(Clone)]
pub struct SpecialTokens {
    encoder: FxHashMap<String, u32>,
    decoder: FxHashMap<u32, String>,
    literals: Vec<String>,
    matcher: Option<AhoCorasick>,
}

impl SpecialTokens {
    /// Build the registry and its scanning automaton.
    ///
    /// The automaton matches leftmost-longest so that a literal which is a
    /// prefix of another (e.g. `<|eot|>` vs `<|eot_id|>`) never shadows
    /// the longer one.
    pub fn new(tokens: FxHashMap<String, u32>) -> Result<Self, BuildError> {
        let decoder: FxHashMap<u32, String> =
            tokens.iter().map(|(k, v)| (*v, k.clone())).collect();
        let literals: Vec<String> = tokens.keys().cloned().collect();
        let matcher = if literals.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::builder()
                    .match_kind(MatchKind::LeftmostLongest)
                    .build(&literals)?,
            )
        };

        Ok(Self {
            encoder: tokens,
            decoder,
            literals,
            matcher,
        })
    }

    /// Split `text` into literal and special spans, in input order.
    ///
    /// Every matched special token is checked against `allowed`; a match
    /// outside the allow-list fails with the offending literal and its
    /// byte offset.
    pub fn scan<'t>(
        &self,
        text: &'t str,
        allowed: &AllowedSpecial,
    ) -> Result<Vec<SpecialSpan<'t>>, DisallowedSpecialToken> {
        let Some(ref matcher) = self.matcher else {
            if text.is_empty() {
                return Ok(Vec::new());
            }
            return Ok(vec![SpecialSpan::Literal(text)]);
        };

        let mut spans = Vec::new();
        let mut last_end = 0;

        for m in matcher.find_iter(text.as_bytes()) {
            let literal = &self.literals[m.pattern().as_usize()];
            if !allowed.permits(literal) {
                return Err(DisallowedSpecialToken {
                    literal: literal.clone(),
                    position: m.start(),
                });
            }

            if m.start() > last_end {
                spans.push(SpecialSpan::Literal(&text[last_end..m.start()]));
            }
            spans.push(SpecialSpan::Special(self.encoder[literal]));
            last_end = m.end();
        }

        if last_end < text.len() {
            spans.push(SpecialSpan::Literal(&text[last_end..]));
        }

        Ok(spans)
    }

    /// Look up the id of a special-token literal.
    pub fn id_of(&self, literal: &str) -> Option<u32> {
        self.encoder.get(literal).copied()
    }

    /// Look up the literal of a special-token id.
    pub fn literal_of(&self, id: u32) -> Option<&str> {
        self.decoder.get(&id).map(|s| s.as_str())
    }

    /// Number of registered special tokens.
    pub fn len(&self) -> usize {
        self.encoder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoder.is_empty()
    }

    /// Highest special-token id in use.
    pub fn max_id(&self) -> Option<u32> {
        self.encoder.values().max().copied()
    }

    /// Borrow the literal → id map.
    pub fn encoder(&self) -> &FxHashMap<String, u32> {
        &self.encoder
    }
}

/// Ids of the structural special tokens in the default registry.
pub mod special_ids {
    pub const BEGIN_OF_TEXT: u32 = 128000;
    pub const END_OF_TEXT: u32 = 128001;
    pub const FINETUNE_RIGHT_PAD: u32 = 128004;
    pub const STEP: u32 = 128005;
    pub const START_HEADER: u32 = 128006;
    pub const END_HEADER: u32 = 128007;
    pub const EOM: u32 = 128008;
    pub const EOT: u32 = 128009;
    pub const PYTHON_TAG: u32 = 128010;
}

/// Number of ids in the default special-token block.
pub const NUM_SPECIAL_TOKENS: u32 = 256;

/// The default special-token registry: a 256-id block starting at 128000.
///
/// Structural tokens come first; the remainder of the block is filled with
/// `<|reserved_special_token_N|>` placeholders so ids stay stable when new
/// structural tokens are assigned later.
pub fn default_special_tokens() -> FxHashMap<String, u32> {
    let base = special_ids::BEGIN_OF_TEXT;
    let mut special = FxHashMap::default();
    special.insert("<|begin_of_text|>".to_string(), base);
    special.insert("<|end_of_text|>".to_string(), base + 1);
    special.insert("<|reserved_special_token_0|>".to_string(), base + 2);
    special.insert("<|reserved_special_token_1|>".to_string(), base + 3);
    special.insert("<|finetune_right_pad_id|>".to_string(), base + 4);
    special.insert("<|step_id|>".to_string(), base + 5);
    special.insert("<|start_header_id|>".to_string(), base + 6);
    special.insert("<|end_header_id|>".to_string(), base + 7);
    special.insert("<|eom_id|>".to_string(), base + 8);
    special.insert("<|eot_id|>".to_string(), base + 9);
    special.insert("<|python_tag|>".to_string(), base + 10);

    // Reserved placeholders fill out the rest of the block.
    for offset in 11..NUM_SPECIAL_TOKENS {
        special.insert(
            format!("<|reserved_special_token_{}|>", offset - 9),
            base + offset,
        );
    }

    special
}
