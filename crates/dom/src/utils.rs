//! Utility functions over node sets

use crate::arena::DomArena;
use crate::types::NodeId;
use ahash::AHashSet;

/// Cap text length for display, on a char boundary
pub fn cap_text_length(text: &str, max_len: usize) -> String {
    match text.char_indices().nth(max_len) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}...", &text[..cut]),
    }
}

/// Nodes of `nodes` that have no proper ancestor in `nodes`, in input order
/// and without duplicates
pub fn get_roots(arena: &DomArena, nodes: &[NodeId]) -> Vec<NodeId> {
    let set: AHashSet<NodeId> = nodes.iter().copied().collect();
    let mut seen = AHashSet::new();
    nodes
        .iter()
        .copied()
        .filter(|node| seen.insert(*node))
        .filter(|node| !arena.lineage(*node).skip(1).any(|a| set.contains(&a)))
        .collect()
}

/// Deepest node that is in the lineage of every node of `nodes`
pub fn lowest_common_ancestor(arena: &DomArena, nodes: &[NodeId]) -> Option<NodeId> {
    let (first, rest) = nodes.split_first()?;
    // Root-first path of the first node, trimmed to the common prefix
    let mut common: Vec<NodeId> = arena.lineage(*first).collect();
    common.reverse();
    if common.is_empty() {
        return None;
    }

    for node in rest {
        let mut path: Vec<NodeId> = arena.lineage(*node).collect();
        path.reverse();
        let shared = common
            .iter()
            .zip(&path)
            .take_while(|(a, b)| a == b)
            .count();
        common.truncate(shared);
        if common.is_empty() {
            return None;
        }
    }
    common.last().copied()
}

/// `base_N` with the smallest N >= 1 that `taken` rejects
pub fn unique_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    (1..)
        .map(|n| format!("{base}_{n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}
