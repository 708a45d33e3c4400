//! Vocabulary loading and validation.
//!
//! A vocabulary is a sequence of `(token_bytes, rank)` records where each
//! line holds a base64-encoded byte string followed by a space and an
//! integer rank:
//!
//! ```text
//! SGVsbG8= 256
//! V29ybGQ= 257
//! ```
//!
//! Ranks double as token ids and as merge priority: a lower rank merges
//! first during BPE encoding. The first 256 records are reserved for the
//! single-byte fallback tokens in byte order, so byte `b` always resolves
//! to id `b` and every possible input byte has a representable token.
//!
//! Construction validates the whole table up front and fails with
//! [`LoadError`] on a malformed file; after that the vocabulary is
//! immutable and safe to share across threads without locking.

use base64::{engine::general_purpose::STANDARD, Engine};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Errors detected while loading a vocabulary rank table.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Invalid base64 encoding: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Invalid line format: {0}")]
    Parse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Duplicate token at rank {rank}")]
    DuplicateToken { rank: u32 },
    #[error("Rank {rank} is not greater than its predecessor {previous}")]
    NonMonotonicRank { rank: u32, previous: u32 },
    #[error("Missing single-byte fallback token for byte {byte:#04x}")]
    MissingByteFallback { byte: u8 },
}

/// Immutable bidirectional mapping between token byte-strings and ids.
///
/// Built once from a rank table, read-only afterward. Both directions are
/// total and injective over the ids in use.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    encoder: FxHashMap<Vec<u8>, u32>,
    decoder: FxHashMap<u32, Vec<u8>>,
}

impl Vocabulary {
    /// Parse and validate a rank table from raw bytes.
    ///
    /// Fails if ranks are not strictly increasing, a token byte-string
    /// appears twice, or the first 256 records are not the single bytes
    /// `0..=255` in byte order.
    pub fn from_bytes(data: &[u8]) -> Result<Self, LoadError> {
        let mut encoder: FxHashMap<Vec<u8>, u32> = FxHashMap::default();
        let mut decoder: FxHashMap<u32, Vec<u8>> = FxHashMap::default();
        let mut previous: Option<u32> = None;

        for line in data.split(|&b| b == b'\n') {
            if line.is_empty() {
                continue;
            }

            // The token is base64 and never contains a space, so the last
            // space on the line separates token from rank.
            let space_pos = line
                .iter()
                .rposition(|&b| b == b' ')
                .ok_or_else(|| LoadError::Parse("Missing space separator".to_string()))?;

            let token_b64 = &line[..space_pos];
            let rank_str = &line[space_pos + 1..];

            let token = STANDARD.decode(token_b64)?;

            let rank_str = std::str::from_utf8(rank_str)
                .map_err(|_| LoadError::Parse("Invalid UTF-8 in rank".to_string()))?;
            let rank: u32 = rank_str
                .trim()
                .parse()
                .map_err(|_| LoadError::Parse(format!("Invalid rank: {}", rank_str)))?;

            if let Some(previous) = previous {
                if rank <= previous {
                    return Err(LoadError::NonMonotonicRank { rank, previous });
                }
            }
            previous = Some(rank);

            // Fallback block: record `b` must be exactly the byte `b`.
            if rank < 256 && token.as_slice() != [rank as u8] {
                return Err(LoadError::MissingByteFallback { byte: rank as u8 });
            }

            if encoder.contains_key(&token) {
                return Err(LoadError::DuplicateToken { rank });
            }

            decoder.insert(rank, token.clone());
            encoder.insert(token, rank);
        }

        for byte in 0u8..=255 {
            if !encoder.contains_key([byte].as_slice()) {
                return Err(LoadError::MissingByteFallback { byte });
            }
        }

        Ok(Self { encoder, decoder })
    }

    /// Load a rank table from a file path.
    pub fn from_file(path: &str) -> Result<Self, LoadError> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Look up the id of a token byte-string.
    #[inline]
    pub fn id_of(&self, bytes: &[u8]) -> Option<u32> {
        self.encoder.get(bytes).copied()
    }

    /// Look up the byte-string of a token id.
    #[inline]
    pub fn bytes_of(&self, id: u32) -> Option<&[u8]> {
        self.decoder.get(&id).map(|b| b.as_slice())
    }

    /// Number of tokens in the vocabulary.
    pub fn len(&self) -> usize {
        self.encoder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoder.is_empty()
    }

    /// Highest token id in use.
    pub fn max_id(&self) -> Option<u32> {
        self.decoder.keys().max().copied()
    }

    /// Borrow the rank map for the merge engine.
    pub(crate) fn encoder(&self) -> &FxHashMap<Vec<u8>, u32> {
        &self.encoder
    }
}
