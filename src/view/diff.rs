use std::collections::HashSet;

/// Added and removed node sets between the current membership and a proposed
/// one: `added = new - old`, `removed = old - new`. The two sets are disjoint
/// by construction.
pub fn node_diff(old: &[String], new: &[String]) -> (HashSet<String>, HashSet<String>) {
    let old_set: HashSet<&str> = old.iter().map(String::as_str).collect();
    let new_set: HashSet<&str> = new.iter().map(String::as_str).collect();

    let added = new_set
        .difference(&old_set)
        .map(|node| node.to_string())
        .collect();
    let removed = old_set
        .difference(&new_set)
        .map(|node| node.to_string())
        .collect();

    (added, removed)
}
