//! Byte-pair merge engine.
//!
//! Operates on one pre-tokenized chunk at a time: the chunk starts as a
//! run of single bytes and adjacent pieces are greedily merged in rank
//! order (lowest rank first, leftmost on ties) until no adjacent pair
//! resolves to a vocabulary entry. The surviving pieces are then mapped to
//! ids. Tie-break and rank ordering are a bit-exact contract: any
//! divergence produces ids incompatible with a reference vocabulary.

use rustc_hash::FxHashMap;

/// Merge `piece` down to its final boundaries.
///
/// Returns a `(start, rank)` vector with one entry per surviving piece
/// plus a terminating sentinel; the rank stored at each entry is the rank
/// of the pair beginning at that boundary, used to pick the next merge.
fn byte_pair_merge(piece: &[u8], ranks: &FxHashMap<Vec<u8>, u32>) -> Vec<(usize, u32)> {
    // One boundary per byte plus the end sentinel. Rank lookups hash raw
    // byte slices, not piece pairs; the two are equivalent as long as the
    // vocabulary was trained with merge priority equal to token id.
    let mut parts = Vec::with_capacity(piece.len() + 1);

    let mut min_rank: (u32, usize) = (u32::MAX, usize::MAX);
    for i in 0..piece.len() - 1 {
        let rank = *ranks.get(&piece[i..i + 2]).unwrap_or(&u32::MAX);
        if rank < min_rank.0 {
            min_rank = (rank, i);
        }
        parts.push((i, rank));
    }
    parts.push((piece.len() - 1, u32::MAX));
    parts.push((piece.len(), u32::MAX));

    let get_rank = {
        #[inline(always)]
        |parts: &Vec<(usize, u32)>, i: usize| {
            if (i + 3) < parts.len() {
                // The +3 skips the boundary that is about to be deleted,
                // see the removal order in the main loop.
                *ranks
                    .get(&piece[parts[i].0..parts[i + 3].0])
                    .unwrap_or(&u32::MAX)
            } else {
                u32::MAX
            }
        }
    };

    // With n parts and m merges this is O(mn). Chunks are bounded by
    // pre-tokenizer granularity, so the linear rescan beats a heap in
    // practice; the leftmost-minimum scan is also what fixes the
    // tie-break order.
    while min_rank.0 != u32::MAX {
        let i = min_rank.1;
        // Repair the neighbor ranks before removing parts[i + 1].
        if i > 0 {
            parts[i - 1].1 = get_rank(&parts, i - 1);
        }
        parts[i].1 = get_rank(&parts, i);
        parts.remove(i + 1);

        min_rank = (u32::MAX, usize::MAX);
        for (i, &(_, rank)) in parts[..parts.len() - 1].iter().enumerate() {
            if rank < min_rank.0 {
                min_rank = (rank, i);
            }
        }
    }
    parts
}

/// Encode one chunk to token ids.
///
/// Every piece left after merging is a vocabulary entry: either a merge
/// result (present by construction) or a single byte covered by the
/// fallback block the loader enforces.
pub fn byte_pair_encode(piece: &[u8], ranks: &FxHashMap<Vec<u8>, u32>) -> Vec<u32> {
    if piece.len() == 1 {
        return vec![*ranks
            .get(piece)
            .expect("single-byte fallback tokens are enforced at vocabulary load")];
    }

    byte_pair_merge(piece, ranks)
        .windows(2)
        .map(|part| {
            *ranks
                .get(&piece[part[0].0..part[1].0])
                .expect("merged piece is a vocabulary entry by construction")
        })
        .collect()
}

/// Split one chunk into its final piece boundaries without resolving ids.
pub fn byte_pair_split<'a>(piece: &'a [u8], ranks: &FxHashMap<Vec<u8>, u32>) -> Vec<&'a [u8]> {
    if piece.len() == 1 {
        return vec![piece];
    }
    byte_pair_merge(piece, ranks)
        .windows(2)
        .map(|part| &piece[part[0].0..part[1].0])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranks_with(extra: &[(&[u8], u32)]) -> FxHashMap<Vec<u8>, u32> {
        let mut ranks = FxHashMap::default();
        for b in 0u8..=255 {
            ranks.insert(vec![b], b as u32);
        }
        for &(bytes, rank) in extra {
            ranks.insert(bytes.to_vec(), rank);
        }
        ranks
    }

    #[test]
    fn test_single_byte() {
        let ranks = ranks_with(&[]);
        assert_eq!(byte_pair_encode(b"a", &ranks), vec![b'a' as u32]);
    }

    #[test]
    fn test_no_merges_falls_back_to_bytes() {
        let ranks = ranks_with(&[]);
        assert_eq!(
            byte_pair_encode(b"abc", &ranks),
            vec![b'a' as u32, b'b' as u32, b'c' as u32]
        );
    }

    #[test]
    fn test_ranked_pair_merges() {
        let ranks = ranks_with(&[(b"ab", 256)]);
        assert_eq!(byte_pair_encode(b"ab", &ranks), vec![256]);
    }

    #[test]
    fn test_lowest_rank_merges_first() {
        // "bc" outranks "ab", so "abc" becomes "a" + "bc".
        let ranks = ranks_with(&[(b"bc", 256), (b"ab", 257)]);
        assert_eq!(
            byte_pair_encode(b"abc", &ranks),
            vec![b'a' as u32, 256]
        );
    }

    #[test]
    fn test_leftmost_wins_ties() {
        // "ab" can merge at two positions; the leftmost goes first and
        // the cascade "abab" -> "ab"+"ab" -> "abab" needs both merges.
        let ranks = ranks_with(&[(b"ab", 256), (b"abab", 257)]);
        assert_eq!(byte_pair_encode(b"abab", &ranks), vec![257]);
    }

    #[test]
    fn test_merge_cascade() {
        let ranks = ranks_with(&[(b"ab", 256), (b"abc", 257)]);
        assert_eq!(byte_pair_encode(b"abc", &ranks), vec![257]);
    }

    #[test]
    fn test_split_matches_encode_boundaries() {
        let ranks = ranks_with(&[(b"he", 256), (b"ll", 257), (b"llo", 258)]);
        let pieces = byte_pair_split(b"hello", &ranks);
        assert_eq!(pieces, vec![b"he".as_slice(), b"llo".as_slice()]);
    }
}
