#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap, HashSet};

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::ring::hash::NUM_TOKENS;
    use crate::ring::token::Token;
    use crate::view::diff::node_diff;
    use crate::view::merge::{Collision, generate_tokens, merge_tokens};
    use crate::view::shards::recompute_shards;
    use crate::view::types::{Change, View};

    fn nodes(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn node_set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn ring(entries: &[(&str, u64)]) -> Vec<Token> {
        entries
            .iter()
            .map(|(endpoint, value)| Token {
                endpoint: endpoint.to_string(),
                value: *value,
            })
            .collect()
    }

    fn token_changes(entries: &[(&str, &[u64])]) -> HashMap<String, Change> {
        entries
            .iter()
            .map(|(endpoint, values)| {
                (
                    endpoint.to_string(),
                    Change {
                        removed: false,
                        tokens: values.to_vec(),
                    },
                )
            })
            .collect()
    }

    fn replica_map(entries: &[(u64, &[&str])]) -> BTreeMap<u64, Vec<String>> {
        entries
            .iter()
            .map(|(shard, replicas)| (*shard, nodes(replicas)))
            .collect()
    }

    // ============================================================
    // NODE DIFF TESTS
    // ============================================================

    #[test]
    fn test_diff_no_change() {
        let (added, removed) = node_diff(&nodes(&["1", "2", "3"]), &nodes(&["1", "2", "3"]));
        assert!(added.is_empty());
        assert!(removed.is_empty());
    }

    #[test]
    fn test_diff_all_added() {
        let (added, removed) = node_diff(&[], &nodes(&["1", "2", "3"]));
        assert_eq!(added, node_set(&["1", "2", "3"]));
        assert!(removed.is_empty());
    }

    #[test]
    fn test_diff_all_removed() {
        let (added, removed) = node_diff(&nodes(&["1", "2", "3"]), &[]);
        assert!(added.is_empty());
        assert_eq!(removed, node_set(&["1", "2", "3"]));
    }

    #[test]
    fn test_diff_some_added() {
        let (added, removed) =
            node_diff(&nodes(&["1", "2", "4"]), &nodes(&["1", "2", "3", "4", "5"]));
        assert_eq!(added, node_set(&["3", "5"]));
        assert!(removed.is_empty());
    }

    #[test]
    fn test_diff_some_removed() {
        let (added, removed) = node_diff(&nodes(&["1", "2", "3"]), &nodes(&["1"]));
        assert!(added.is_empty());
        assert_eq!(removed, node_set(&["2", "3"]));
    }

    #[test]
    fn test_diff_added_and_removed() {
        let (added, removed) = node_diff(&nodes(&["1", "2", "4"]), &nodes(&["3", "4", "5"]));
        assert_eq!(added, node_set(&["3", "5"]));
        assert_eq!(removed, node_set(&["1", "2"]));
    }

    #[test]
    fn test_diff_sets_are_disjoint() {
        let (added, removed) = node_diff(&nodes(&["a", "b", "c"]), &nodes(&["b", "c", "d"]));
        assert!(added.is_disjoint(&removed));
    }

    // ============================================================
    // TOKEN MERGE TESTS
    // ============================================================

    #[test]
    fn test_merge_no_change() {
        let old = ring(&[("1", 10)]);
        let (tokens, changes) =
            merge_tokens(&old, &[], &HashSet::new(), &HashSet::new()).unwrap();

        assert_eq!(tokens, old);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_merge_initial_population() {
        let added = ring(&[("1", 10), ("1", 20), ("1", 30)]);
        let (tokens, changes) =
            merge_tokens(&[], &added, &node_set(&["1"]), &HashSet::new()).unwrap();

        assert_eq!(tokens, added);
        assert_eq!(changes, token_changes(&[("1", &[10, 20, 30])]));
    }

    #[test]
    fn test_merge_remove_last_node() {
        let old = ring(&[("1", 10), ("1", 20), ("1", 30)]);
        let (tokens, changes) =
            merge_tokens(&old, &[], &HashSet::new(), &node_set(&["1"])).unwrap();

        assert!(tokens.is_empty());
        assert_eq!(changes.len(), 1);
        assert_eq!(changes["1"], Change::removed());
    }

    #[test]
    fn test_merge_add_one_node() {
        let old = ring(&[
            ("3", 10),
            ("1", 15),
            ("1", 20),
            ("3", 25),
            ("1", 30),
            ("3", 40),
        ]);
        let added = ring(&[("2", 12), ("2", 35), ("2", 37)]);

        let (tokens, changes) =
            merge_tokens(&old, &added, &node_set(&["2"]), &HashSet::new()).unwrap();

        assert_eq!(
            tokens,
            ring(&[
                ("3", 10),
                ("2", 12),
                ("1", 15),
                ("1", 20),
                ("3", 25),
                ("1", 30),
                ("2", 35),
                ("2", 37),
                ("3", 40),
            ])
        );
        assert_eq!(
            changes,
            token_changes(&[("1", &[30]), ("2", &[12, 35, 37]), ("3", &[10])])
        );
    }

    #[test]
    fn test_merge_added_token_at_ring_start() {
        // The token at position 2 lands at index 0 and steals its arc from
        // the token that ends up last, so the old last token is recorded.
        let old = ring(&[
            ("3", 10),
            ("1", 15),
            ("1", 20),
            ("3", 25),
            ("1", 30),
            ("3", 40),
        ]);
        let added = ring(&[("2", 2), ("2", 35), ("2", 37)]);

        let (tokens, changes) =
            merge_tokens(&old, &added, &node_set(&["2"]), &HashSet::new()).unwrap();

        assert_eq!(
            tokens,
            ring(&[
                ("2", 2),
                ("3", 10),
                ("1", 15),
                ("1", 20),
                ("3", 25),
                ("1", 30),
                ("2", 35),
                ("2", 37),
                ("3", 40),
            ])
        );
        assert_eq!(
            changes,
            token_changes(&[("1", &[30]), ("2", &[2, 35, 37]), ("3", &[40])])
        );
    }

    #[test]
    fn test_merge_add_one_remove_one() {
        let old = ring(&[
            ("3", 10),
            ("1", 15),
            ("1", 20),
            ("3", 25),
            ("1", 30),
            ("3", 40),
        ]);
        let added = ring(&[("2", 12), ("2", 17), ("2", 25)]);

        let (tokens, changes) =
            merge_tokens(&old, &added, &node_set(&["2"]), &node_set(&["3"])).unwrap();

        assert_eq!(
            tokens,
            ring(&[
                ("2", 12),
                ("1", 15),
                ("2", 17),
                ("1", 20),
                ("2", 25),
                ("1", 30),
            ])
        );

        let mut expected = token_changes(&[("1", &[15, 20, 30]), ("2", &[12, 17, 25])]);
        expected.insert("3".to_string(), Change::removed());
        assert_eq!(changes, expected);
    }

    #[test]
    fn test_merge_collision_with_ring_token() {
        let old = ring(&[("1", 10), ("1", 20), ("1", 30)]);
        let added = ring(&[("2", 20)]);

        let result = merge_tokens(&old, &added, &node_set(&["2"]), &HashSet::new());
        assert_eq!(result.unwrap_err(), Collision);
    }

    #[test]
    fn test_merge_collision_between_added_tokens() {
        let old = ring(&[("1", 10), ("1", 20), ("1", 30)]);
        let added = ring(&[("2", 15), ("2", 15)]);

        let result = merge_tokens(&old, &added, &node_set(&["2"]), &HashSet::new());
        assert_eq!(result.unwrap_err(), Collision);
    }

    #[test]
    fn test_merge_length_and_order_invariants() {
        let old = ring(&[
            ("3", 10),
            ("1", 15),
            ("1", 20),
            ("3", 25),
            ("1", 30),
            ("3", 40),
        ]);
        let added = ring(&[("2", 12), ("2", 17), ("2", 26)]);

        let (tokens, changes) =
            merge_tokens(&old, &added, &node_set(&["2"]), &node_set(&["3"])).unwrap();

        // len(new) = len(old) + len(added) - tokens_per_removed_node
        assert_eq!(tokens.len(), old.len() + added.len() - 3);

        for window in tokens.windows(2) {
            assert!(
                window[0].value < window[1].value,
                "Ring must be strictly increasing"
            );
        }

        // Every recorded position of a surviving node appears in the new ring.
        let positions: HashSet<u64> = tokens.iter().map(|token| token.value).collect();
        for (endpoint, change) in &changes {
            if change.removed {
                continue;
            }
            for value in &change.tokens {
                assert!(
                    positions.contains(value),
                    "Change position {} for {} not on the ring",
                    value,
                    endpoint
                );
            }
        }
    }

    #[test]
    fn test_generate_tokens_is_seeded_and_sorted() {
        let added = node_set(&["a", "b"]);

        let first = generate_tokens(&added, &mut StdRng::seed_from_u64(7));
        let second = generate_tokens(&added, &mut StdRng::seed_from_u64(7));

        assert_eq!(first, second, "Same seed should give the same tokens");
        assert_eq!(first.len(), 2 * NUM_TOKENS);
        for window in first.windows(2) {
            assert!(window[0].value <= window[1].value);
        }
    }

    // ============================================================
    // CHANGE VIEW TESTS
    // ============================================================

    #[test]
    fn test_change_view_identical_membership_is_noop() {
        let mut view = View {
            nodes: nodes(&["a", "b"]),
            tokens: ring(&[("a", 10), ("b", 20)]),
            shards: BTreeMap::new(),
        };
        let before = view.tokens.clone();

        let (changes, added) = view.change_view(nodes(&["a", "b"]));

        assert!(changes.is_empty());
        assert!(added.is_empty());
        assert_eq!(view.tokens, before);
    }

    #[test]
    fn test_change_view_from_empty() {
        let mut view = View::default();
        let (changes, added) = view.change_view(nodes(&["a", "b"]));

        assert_eq!(added, node_set(&["a", "b"]));
        assert_eq!(view.tokens.len(), 2 * NUM_TOKENS);
        for window in view.tokens.windows(2) {
            assert!(window[0].value < window[1].value);
        }

        // Every node's change lists exactly its own token positions.
        for endpoint in ["a", "b"] {
            let owned: Vec<u64> = view
                .tokens
                .iter()
                .filter(|token| token.endpoint == endpoint)
                .map(|token| token.value)
                .collect();
            assert_eq!(changes[endpoint].tokens, owned);
        }
    }

    #[test]
    fn test_change_view_remove_everything() {
        let mut view = View::default();
        view.change_view(nodes(&["a", "b"]));

        let (changes, added) = view.change_view(Vec::new());

        assert!(added.is_empty());
        assert!(view.tokens.is_empty());
        assert_eq!(changes.len(), 2);
        assert!(changes.values().all(|change| change.removed));
    }

    // ============================================================
    // SHARD RECOMPUTE TESTS
    // ============================================================

    #[test]
    fn test_recompute_noop() {
        let current = replica_map(&[(100, &["a", "b"]), (200, &["c", "d"])]);

        let result = recompute_shards(&current, &nodes(&["a", "b", "c", "d"]), 2);

        assert_eq!(result.shards, current);
        assert!(result.added.is_empty());
        assert!(result.removed.is_empty());
        assert!(result.modified.is_empty());
    }

    #[test]
    fn test_recompute_shrinking_replica_factor() {
        // Six nodes in two shards of three; four survivors under r = 2.
        let current = replica_map(&[(100, &["1", "2", "3"]), (200, &["4", "5", "6"])]);

        let result = recompute_shards(&current, &nodes(&["1", "4", "5", "7"]), 2);

        assert_eq!(result.shards.len(), 2, "Both shards should be retained");
        assert!(result.added.is_empty());
        assert!(result.removed.is_empty());
        assert_eq!(result.modified.len(), 2, "Both replica lists changed");

        for replicas in result.shards.values() {
            assert_eq!(replicas.len(), 2);
        }
        assert_eq!(result.shards[&100], nodes(&["1", "7"]));
        assert_eq!(result.shards[&200], nodes(&["4", "5"]));
    }

    #[test]
    fn test_recompute_growing_shard_count() {
        // One shard of six becomes three shards of two.
        let current = replica_map(&[(100, &["1", "2", "3", "4", "5", "6"])]);
        let new_nodes = nodes(&["1", "2", "5", "6", "7", "8"]);

        let result = recompute_shards(&current, &new_nodes, 2);

        assert_eq!(result.shards.len(), 3);
        assert_eq!(result.added.len(), 2, "Two fresh shard ids generated");
        assert!(result.removed.is_empty());
        assert_eq!(result.modified, vec![100]);

        assert_eq!(result.shards[&100], nodes(&["1", "2"]));
        for shard in &result.added {
            assert_eq!(result.shards[shard].len(), 2);
        }

        // Every new node is placed exactly once.
        let mut placed: Vec<&String> = result.shards.values().flatten().collect();
        placed.sort();
        assert_eq!(placed.len(), 6);
        let mut expected: Vec<&String> = new_nodes.iter().collect();
        expected.sort();
        assert_eq!(placed, expected);
    }

    #[test]
    fn test_recompute_shrinking_shard_count() {
        let current = replica_map(&[(100, &["a", "b"]), (200, &["c", "d"])]);

        // Only two nodes remain: a single shard survives.
        let result = recompute_shards(&current, &nodes(&["a", "b"]), 2);

        assert_eq!(result.shards, replica_map(&[(100, &["a", "b"])]));
        assert_eq!(result.removed, vec![200]);
        assert!(result.modified.contains(&200));
        assert!(result.added.is_empty());
    }

    #[test]
    fn test_recompute_prefers_shards_with_more_survivors() {
        let current = replica_map(&[(100, &["a", "b"]), (200, &["c", "d"])]);

        // Shard 200 keeps both replicas, shard 100 keeps one; 200 must win.
        let result = recompute_shards(&current, &nodes(&["b", "c", "d"]), 2);

        assert_eq!(result.shards.len(), 1);
        assert!(result.shards.contains_key(&200));
        assert_eq!(result.removed, vec![100]);
    }

    #[test]
    fn test_recompute_tie_breaks_by_insertion_order() {
        // Equal survivor counts: the shard visited first (ascending id) wins.
        let current = replica_map(&[(100, &["a", "b"]), (200, &["c", "d"])]);

        let result = recompute_shards(&current, &nodes(&["a", "c"]), 2);

        assert_eq!(result.shards.len(), 1);
        assert!(result.shards.contains_key(&100));
        assert_eq!(result.removed, vec![200]);
    }

    #[test]
    fn test_recompute_is_deterministic() {
        let current = replica_map(&[(100, &["1", "2", "3", "4", "5", "6"])]);
        let new_nodes = nodes(&["1", "2", "5", "6", "7", "8"]);

        let first = recompute_shards(&current, &new_nodes, 2);
        let second = recompute_shards(&current, &new_nodes, 2);

        assert_eq!(first, second);
    }
}
