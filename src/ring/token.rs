use serde::{Deserialize, Serialize};

use super::hash;

/// One point on the ring: a position in hash space and the endpoint that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub endpoint: String,
    pub value: u64,
}

/// Finds the token owning `key`.
///
/// The owner is the token with the smallest value at or above the key's
/// position; a position above every token wraps around to the first token.
/// Returns `None` only for an empty ring.
pub fn find_token<'a>(tokens: &'a [Token], key: &str) -> Option<&'a Token> {
    find_by_position(tokens, hash::position(key))
}

/// Ring lookup by raw position. `tokens` must be sorted by value.
pub fn find_by_position(tokens: &[Token], position: u64) -> Option<&Token> {
    if tokens.is_empty() {
        return None;
    }

    let index = tokens.partition_point(|token| token.value < position);
    if index == tokens.len() {
        Some(&tokens[0])
    } else {
        Some(&tokens[index])
    }
}
