//! chatbpe - byte-level BPE tokenizer with chat dialog framing.
//!
//! Features:
//! - Validated vocabulary loading with a guaranteed single-byte fallback
//!   block, so every possible input byte is representable
//! - Regex pre-tokenization (fancy-regex by default, optional PCRE2 with
//!   JIT behind the `pcre2` feature)
//! - Rank-ordered byte-pair merging, bit-exact against reference ranks
//! - Aho-Corasick special-token scanning with an allow-list gate against
//!   control-token injection
//! - Role-tagged chat message and dialog framing
//! - Rayon parallelism for batch encoding, LRU chunk caching, and a
//!   UTF-8 safe streaming decoder for model output

pub mod core;

pub use core::{
    default_special_tokens, special_ids, AllowedSpecial, ChatFormat, DisallowedSpecialToken,
    LoadError, Message, Role, SpecialSpan, SpecialTokens, StreamingDecoder, Tokenizer,
    TokenizerError, Vocabulary, SPLIT_PATTERN,
};
