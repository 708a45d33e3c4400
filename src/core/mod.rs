//! Core tokenization engine.
//!
//! The engine converts raw text into token ids for a language model and
//! back. Encoding runs three layers in order: a special-token scan that
//! separates control literals from ordinary text, a regex pre-tokenizer
//! that splits ordinary text into chunks along linguistic boundaries, and
//! a byte-pair merge pass per chunk. Chat framing sits on top, emitting
//! role-tagged turns and dialog prompts.
//!
//! # Components
//!
//! - [`Vocabulary`]: validated, immutable token ↔ id mapping with a
//!   complete single-byte fallback block
//! - [`bpe`]: rank-ordered greedy pair merging per chunk
//! - [`SpecialTokens`]: control-token registry with leftmost-longest
//!   scanning and an allow-list gate for untrusted input
//! - [`Tokenizer`]: encode/decode orchestration, LRU chunk cache, rayon
//!   batch APIs
//! - [`ChatFormat`]: role headers, turn markers, and dialog priming
//! - [`StreamingDecoder`]: UTF-8 safe assembly of streamed output

mod bpe;
mod chat;
mod special;
mod streaming;
mod tokenizer;
mod vocab;

pub use bpe::{byte_pair_encode, byte_pair_split};
pub use chat::{ChatFormat, Message, Role};
pub use special::{
    default_special_tokens, special_ids, AllowedSpecial, DisallowedSpecialToken, SpecialSpan,
    SpecialTokens, NUM_SPECIAL_TOKENS,
};
pub use streaming::StreamingDecoder;
pub use tokenizer::{Tokenizer, TokenizerError, SPLIT_PATTERN};
pub use vocab::{LoadError, Vocabulary};
