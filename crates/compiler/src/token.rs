//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 bytes per token, rounded up.
//! Close enough for BPE tokenizers on English text, and fully
//! deterministic, which the cache depends on.

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Estimated cost of one atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomCost {
    pub tokens: usize,
    /// The content was longer than the cap and was costed at the cap.
    pub capped: bool,
}

/// Cost an atom's content, capping its length at `max_len` bytes first so
/// one pathological entry cannot dominate the computation. The cap falls
/// back to the nearest char boundary.
pub fn atom_cost(content: &str, max_len: usize) -> AtomCost {
    if content.len() <= max_len {
        return AtomCost {
            tokens: estimate_tokens(content),
            capped: false,
        };
    }
    let mut end = max_len;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    AtomCost {
        tokens: estimate_tokens(&content[..end]),
        capped: true,
    }
}
