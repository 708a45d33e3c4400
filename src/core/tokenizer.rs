//! Tokenizer orchestration: special-token scanning, pre-tokenization,
//! byte-pair merging, and decoding.
//!
//! The tokenizer is configuration data around one generic engine: a
//! [`Vocabulary`], a [`SpecialTokens`] registry, and a pre-tokenization
//! pattern. Construction is fallible; afterwards the tokenizer is
//! immutable apart from an interior LRU chunk cache, so a shared
//! reference can encode and decode from any number of threads.

use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHasher};
use thiserror::Error;

#[cfg(feature = "pcre2")]
use pcre2::bytes::Regex as Pcre2Regex;

use super::bpe::byte_pair_encode;
use super::special::{AllowedSpecial, DisallowedSpecialToken, SpecialSpan, SpecialTokens};
use super::vocab::{LoadError, Vocabulary};

/// Errors surfaced by tokenizer construction, encoding, and decoding.
#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("Regex compilation error: {0}")]
    Regex(#[from] fancy_regex::Error),
    #[cfg(feature = "pcre2")]
    #[error("Regex compilation error (PCRE2): {0}")]
    Pcre2(#[from] pcre2::Error),
    #[error("Vocabulary error: {0}")]
    Load(#[from] LoadError),
    #[error("Special-token matcher build error: {0}")]
    SpecialMatcher(#[from] aho_corasick::BuildError),
    #[error(transparent)]
    DisallowedSpecial(#[from] DisallowedSpecialToken),
    #[error("Unknown token id: {0}")]
    UnknownId(u32),
    #[error("Decoding error: invalid UTF-8")]
    InvalidUtf8,
    #[error("Special-token registry has no entry for {0}")]
    MissingSpecialToken(String),
    #[error("PCRE2 feature not enabled. Compile with --features pcre2")]
    Pcre2NotEnabled,
}

/// Default pre-tokenization pattern.
///
/// Splits text along linguistic boundaries before merging: English
/// contractions as standalone chunks, contiguous letter runs, digit runs
/// capped at three characters, punctuation runs with optional leading
/// space and trailing newlines, then whitespace. Alternation order is
/// load-bearing: chunk boundaries determine merge results bit-for-bit.
pub const SPLIT_PATTERN: &str = r"(?i:'s|'t|'re|'ve|'m|'ll|'d)|[^\r\n\p{L}\p{N}]?\p{L}+|\p{N}{1,3}| ?[^\s\p{L}\p{N}]+[\r\n]*|\s*[\r\n]+|\s+(?!\S)|\s+";

/// Default size of the LRU cache for encoded chunks.
const DEFAULT_CACHE_SIZE: usize = 4096;

/// Regex backend: fancy-regex by default, PCRE2 with JIT behind a feature.
/// The pattern needs lookahead support, which rules out plain `regex`.
enum RegexBackend {
    Fancy(Box<fancy_regex::Regex>),
    #[cfg(feature = "pcre2")]
    Pcre2(Pcre2Regex),
}

impl RegexBackend {
    fn fancy(pattern: &str) -> Result<Self, TokenizerError> {
        Ok(Self::Fancy(Box::new(fancy_regex::Regex::new(pattern)?)))
    }

    #[cfg(feature = "pcre2")]
    fn pcre2(pattern: &str) -> Result<Self, TokenizerError> {
        let mut builder = pcre2::bytes::RegexBuilder::new();
        builder.jit_if_available(true);
        builder.utf(true);
        builder.ucp(true);
        Ok(Self::Pcre2(builder.build(pattern)?))
    }

    /// All matches in `text` as (start, end) byte offsets.
    fn find_iter(&self, text: &str) -> Vec<(usize, usize)> {
        match self {
            RegexBackend::Fancy(regex) => regex
                .find_iter(text)
                .filter_map(|m| m.ok())
                .map(|m| (m.start(), m.end()))
                .collect(),
            #[cfg(feature = "pcre2")]
            RegexBackend::Pcre2(regex) => regex
                .find_iter(text.as_bytes())
                .filter_map(|m| m.ok())
                .map(|m| (m.start(), m.end()))
                .collect(),
        }
    }
}

/// Byte-level BPE tokenizer with special-token scanning.
///
/// Encoding walks three layers in order: special-token scan (splitting
/// input into literal and control spans), pre-tokenization of literal
/// spans into chunks, and rank-ordered pair merging per chunk. Decoding
/// concatenates the byte-strings of ordinary and special ids.
///
/// Frequently encoded chunks are served from an LRU cache keyed by chunk
/// hash; batch APIs parallelize across texts with rayon, never within a
/// single text.
pub struct Tokenizer {
    vocab: Vocabulary,
    special: SpecialTokens,
    regex: RegexBackend,
    pattern: String,
    chunk_cache: Mutex<LruCache<u64, Vec<u32>>>,
    cache_size: usize,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("pattern", &self.pattern)
            .field("cache_size", &self.cache_size)
            .finish_non_exhaustive()
    }
}

impl Tokenizer {
    /// Create a tokenizer from a vocabulary, special-token map, and
    /// pre-tokenization pattern.
    pub fn new(
        vocab: Vocabulary,
        special_tokens: FxHashMap<String, u32>,
        pattern: &str,
    ) -> Result<Self, TokenizerError> {
        Self::with_cache_size(vocab, special_tokens, pattern, DEFAULT_CACHE_SIZE)
    }

    /// Create a tokenizer with a custom chunk-cache size.
    pub fn with_cache_size(
        vocab: Vocabulary,
        special_tokens: FxHashMap<String, u32>,
        pattern: &str,
        cache_size: usize,
    ) -> Result<Self, TokenizerError> {
        let special = SpecialTokens::new(special_tokens)?;
        let regex = RegexBackend::fancy(pattern)?;

        let cache_size_nz = NonZeroUsize::new(cache_size.max(1))
            .expect("cache size is clamped to at least 1");
        let chunk_cache = Mutex::new(LruCache::new(cache_size_nz));

        Ok(Self {
            vocab,
            special,
            regex,
            pattern: pattern.to_string(),
            chunk_cache,
            cache_size,
        })
    }

    /// Create a tokenizer with the default special-token registry and
    /// split pattern.
    pub fn with_default_special(vocab: Vocabulary) -> Result<Self, TokenizerError> {
        Self::new(vocab, super::special::default_special_tokens(), SPLIT_PATTERN)
    }

    /// Create a tokenizer from raw rank-table bytes.
    pub fn from_bytes(
        vocab_data: &[u8],
        special_tokens: FxHashMap<String, u32>,
        pattern: &str,
    ) -> Result<Self, TokenizerError> {
        Self::new(Vocabulary::from_bytes(vocab_data)?, special_tokens, pattern)
    }

    /// Create a tokenizer from a rank-table file.
    pub fn from_file(
        vocab_path: &str,
        special_tokens: FxHashMap<String, u32>,
        pattern: &str,
    ) -> Result<Self, TokenizerError> {
        Self::new(Vocabulary::from_file(vocab_path)?, special_tokens, pattern)
    }

    /// Switch to the PCRE2 regex backend.
    #[cfg(feature = "pcre2")]
    pub fn pcre2(mut self, use_pcre2: bool) -> Result<Self, TokenizerError> {
        self.regex = if use_pcre2 {
            RegexBackend::pcre2(&self.pattern)?
        } else {
            RegexBackend::fancy(&self.pattern)?
        };
        Ok(self)
    }

    /// Switch to the PCRE2 regex backend (stub when the feature is off).
    #[cfg(not(feature = "pcre2"))]
    pub fn pcre2(self, use_pcre2: bool) -> Result<Self, TokenizerError> {
        if use_pcre2 {
            Err(TokenizerError::Pcre2NotEnabled)
        } else {
            Ok(self)
        }
    }

    #[inline]
    fn hash_chunk(chunk: &[u8]) -> u64 {
        let mut hasher = FxHasher::default();
        chunk.hash(&mut hasher);
        hasher.finish()
    }

    /// Encode one pre-tokenized chunk, consulting the LRU cache.
    fn encode_chunk(&self, chunk: &[u8]) -> Vec<u32> {
        // Fast path: the whole chunk is a known token.
        if let Some(id) = self.vocab.id_of(chunk) {
            return vec![id];
        }

        let hash = Self::hash_chunk(chunk);
        if let Ok(mut cache) = self.chunk_cache.lock() {
            if let Some(cached) = cache.get(&hash) {
                return cached.clone();
            }
        }

        let ids = byte_pair_encode(chunk, self.vocab.encoder());

        if let Ok(mut cache) = self.chunk_cache.lock() {
            cache.put(hash, ids.clone());
        }

        ids
    }

    /// Encode text with no special-token interpretation, appending ids to
    /// a caller-owned buffer.
    ///
    /// The buffer form lets callers reuse one allocation across many
    /// calls; [`encode_ordinary`](Self::encode_ordinary) wraps it.
    pub fn encode_ordinary_into(&self, text: &str, out: &mut Vec<u32>) {
        let bytes = text.as_bytes();
        for (start, end) in self.regex.find_iter(text) {
            out.extend(self.encode_chunk(&bytes[start..end]));
        }
    }

    /// Encode text with no special-token interpretation.
    ///
    /// Special-token literals in the input are treated as ordinary text
    /// and merged like anything else. Use this for untrusted content that
    /// must never be parsed as control tokens.
    pub fn encode_ordinary(&self, text: &str) -> Vec<u32> {
        let mut ids = Vec::new();
        self.encode_ordinary_into(text, &mut ids);
        ids
    }

    /// Encode text, resolving special-token literals against `allowed`.
    ///
    /// Literal spans go through pre-tokenization and merging; matched
    /// special tokens contribute their fixed id. A special token outside
    /// the allow-list fails with
    /// [`TokenizerError::DisallowedSpecial`].
    pub fn encode(
        &self,
        text: &str,
        allowed: &AllowedSpecial,
    ) -> Result<Vec<u32>, TokenizerError> {
        let spans = self.special.scan(text, allowed)?;
        let mut ids = Vec::new();
        for span in spans {
            match span {
                SpecialSpan::Literal(literal) => self.encode_ordinary_into(literal, &mut ids),
                SpecialSpan::Special(id) => ids.push(id),
            }
        }
        Ok(ids)
    }

    /// Decode token ids to raw bytes.
    ///
    /// Special ids contribute their literal's bytes. The result is not
    /// guaranteed to be valid UTF-8; textual interpretation is the
    /// caller's concern. Fails on the first id outside the vocabulary and
    /// registry rather than dropping it.
    pub fn decode_bytes(&self, ids: &[u32]) -> Result<Vec<u8>, TokenizerError> {
        let mut out = Vec::with_capacity(ids.len() * 4);
        for &id in ids {
            if let Some(bytes) = self.vocab.bytes_of(id) {
                out.extend_from_slice(bytes);
            } else if let Some(literal) = self.special.literal_of(id) {
                out.extend_from_slice(literal.as_bytes());
            } else {
                return Err(TokenizerError::UnknownId(id));
            }
        }
        Ok(out)
    }

    /// Decode token ids to a string, failing on invalid UTF-8.
    pub fn decode(&self, ids: &[u32]) -> Result<String, TokenizerError> {
        let bytes = self.decode_bytes(ids)?;
        String::from_utf8(bytes).map_err(|_| TokenizerError::InvalidUtf8)
    }

    /// Decode token ids to a string, replacing invalid UTF-8 with U+FFFD.
    pub fn decode_lossy(&self, ids: &[u32]) -> Result<String, TokenizerError> {
        let bytes = self.decode_bytes(ids)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Batch-encode texts in parallel with special-token resolution.
    pub fn encode_batch(
        &self,
        texts: &[String],
        allowed: &AllowedSpecial,
    ) -> Result<Vec<Vec<u32>>, TokenizerError> {
        texts
            .par_iter()
            .map(|text| self.encode(text, allowed))
            .collect()
    }

    /// Batch-encode texts in parallel with no special-token
    /// interpretation.
    pub fn encode_ordinary_batch(&self, texts: &[String]) -> Vec<Vec<u32>> {
        texts
            .par_iter()
            .map(|text| self.encode_ordinary(text))
            .collect()
    }

    /// Batch-decode id sequences in parallel.
    pub fn decode_batch(&self, id_lists: &[Vec<u32>]) -> Result<Vec<String>, TokenizerError> {
        id_lists.par_iter().map(|ids| self.decode(ids)).collect()
    }

    /// Batch-decode id sequences in parallel, replacing invalid UTF-8.
    pub fn decode_batch_lossy(
        &self,
        id_lists: &[Vec<u32>],
    ) -> Result<Vec<String>, TokenizerError> {
        id_lists
            .par_iter()
            .map(|ids| self.decode_lossy(ids))
            .collect()
    }

    /// Total id range: one past the highest ordinary or special id.
    pub fn vocab_size(&self) -> usize {
        let max_vocab = self.vocab.max_id().unwrap_or(0);
        let max_special = self.special.max_id().unwrap_or(0);
        (max_vocab.max(max_special) + 1) as usize
    }

    /// Borrow the vocabulary.
    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Borrow the special-token registry.
    pub fn special_tokens(&self) -> &SpecialTokens {
        &self.special
    }

    /// The pre-tokenization pattern in use.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Drop all cached chunk encodings.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.chunk_cache.lock() {
            cache.clear();
        }
    }

    /// Number of chunk encodings currently cached.
    pub fn cache_len(&self) -> usize {
        self.chunk_cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl Clone for Tokenizer {
    fn clone(&self) -> Self {
        // The pattern compiled at construction, so recompiling the same
        // string cannot fail. Caches are not shared between clones.
        let regex = match &self.regex {
            RegexBackend::Fancy(_) => RegexBackend::fancy(&self.pattern),
            #[cfg(feature = "pcre2")]
            RegexBackend::Pcre2(_) => RegexBackend::pcre2(&self.pattern),
        }
        .expect("pattern compiled previously");

        let cache_size_nz = NonZeroUsize::new(self.cache_size.max(1))
            .expect("cache size is clamped to at least 1");

        Self {
            vocab: self.vocab.clone(),
            special: self.special.clone(),
            regex,
            pattern: self.pattern.clone(),
            chunk_cache: Mutex::new(LruCache::new(cache_size_nz)),
            cache_size: self.cache_size,
        }
    }
}
