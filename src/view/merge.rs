//! Token Merge
//!
//! Rebuilds the ring for a new membership: tokens of removed nodes are
//! dropped, freshly generated tokens for added nodes are woven in by
//! position, and each affected node gets a `Change` record describing which
//! ring positions it must rescan. Inserting a token at position `p` steals
//! the arc between its predecessor and `p` from whichever token owned that
//! arc before, so the predecessor's owner is recorded as changed too.

use std::collections::{HashMap, HashSet};

use rand::Rng;

use crate::ring::hash::{MAX_HASH, NUM_TOKENS};
use crate::ring::token::Token;

use super::diff::node_diff;
use super::types::{Change, View};

/// Two ring positions collided while merging. The caller redraws the added
/// tokens and retries; never user-visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collision;

/// Generates [`NUM_TOKENS`] random ring positions for every added node,
/// sorted by position. Added nodes are visited in sorted order so a seeded
/// generator produces reproducible output.
pub fn generate_tokens<R: Rng>(added_nodes: &HashSet<String>, rng: &mut R) -> Vec<Token> {
    let mut endpoints: Vec<&String> = added_nodes.iter().collect();
    endpoints.sort();

    let mut tokens = Vec::with_capacity(endpoints.len() * NUM_TOKENS);
    for endpoint in endpoints {
        for _ in 0..NUM_TOKENS {
            tokens.push(Token {
                endpoint: endpoint.clone(),
                value: rng.gen_range(0..MAX_HASH),
            });
        }
    }

    tokens.sort_by_key(|token| token.value);
    tokens
}

fn record_change(changes: &mut HashMap<String, Change>, endpoint: &str, value: u64) {
    changes
        .entry(endpoint.to_string())
        .or_default()
        .tokens
        .push(value);
}

/// Merges the existing ring with tokens generated for added nodes.
///
/// Walks both sorted sequences with two pointers, producing the new ring in
/// position order. Tokens owned by removed nodes are skipped, recording a
/// single removal `Change` per owner. Every placed added token records a
/// change for its own owner and for the owner of its ring predecessor,
/// unless that predecessor belongs to a node that is itself newly added.
/// An added token landing at index 0 steals its arc from the token that ends
/// up last on the ring; that is remembered and resolved once the final token
/// is known.
///
/// Returns [`Collision`] when an added position equals the current ring
/// token's position or the previously placed added position; the caller
/// retries with fresh tokens.
pub fn merge_tokens(
    old: &[Token],
    added_tokens: &[Token],
    added_nodes: &HashSet<String>,
    removed_nodes: &HashSet<String>,
) -> Result<(Vec<Token>, HashMap<String, Change>), Collision> {
    let mut tokens: Vec<Token> = Vec::with_capacity(old.len() + added_tokens.len());
    let mut changes: HashMap<String, Change> = HashMap::new();
    let mut last_was_changed = false;

    let mut v_iter = old.iter().peekable();
    let mut a_index = 0usize;

    loop {
        // Skip over tokens whose owner left the view, recording the removal once.
        while let Some(v_token) = v_iter.peek() {
            if !removed_nodes.contains(&v_token.endpoint) {
                break;
            }
            changes
                .entry(v_token.endpoint.clone())
                .or_insert_with(Change::removed);
            v_iter.next();
        }

        let v_token = v_iter.peek().copied();
        let a_token = added_tokens.get(a_index);

        match (a_token, v_token) {
            (None, None) => break,
            (Some(added), current) if current.is_none_or(|v| added.value <= v.value) => {
                // Collision with the current ring token or the previous added token.
                if current.is_some_and(|v| v.value == added.value)
                    || (a_index > 0 && added_tokens[a_index - 1].value == added.value)
                {
                    return Err(Collision);
                }

                record_change(&mut changes, &added.endpoint, added.value);

                match tokens.last() {
                    Some(prev) => {
                        if !added_nodes.contains(&prev.endpoint) {
                            record_change(&mut changes, &prev.endpoint, prev.value);
                        }
                    }
                    None => last_was_changed = true,
                }

                tokens.push(added.clone());
                a_index += 1;
            }
            (_, Some(current)) => {
                tokens.push(current.clone());
                v_iter.next();
            }
            (Some(_), None) => unreachable!("covered by the added-token arm"),
        }
    }

    // A token placed at index 0 stole its arc from whichever token ended up
    // last; if that final token survives from the old ring, record it now.
    if last_was_changed
        && let Some(last) = tokens.last()
        && !added_nodes.contains(&last.endpoint)
    {
        record_change(&mut changes, &last.endpoint, last.value);
    }

    Ok((tokens, changes))
}

impl View {
    /// Rebuilds this view's membership and ring for `nodes`.
    ///
    /// Diffs the membership, draws random tokens for added nodes and merges
    /// them in, redrawing on position collisions until the merge succeeds.
    /// Returns the per-node change records and the set of added nodes.
    pub fn change_view(&mut self, nodes: Vec<String>) -> (HashMap<String, Change>, HashSet<String>) {
        let (added_nodes, removed_nodes) = node_diff(&self.nodes, &nodes);
        let mut rng = rand::thread_rng();

        let (tokens, changes) = loop {
            let added_tokens = generate_tokens(&added_nodes, &mut rng);
            match merge_tokens(&self.tokens, &added_tokens, &added_nodes, &removed_nodes) {
                Ok(merged) => break merged,
                Err(Collision) => {
                    tracing::debug!("Token position collision, regenerating tokens");
                }
            }
        };

        self.nodes = nodes;
        self.tokens = tokens;
        (changes, added_nodes)
    }
}
