//! Structure reduction for derivation trees.
//!
//! [`ConfigTrimmer`] is a generic minimizing delta debugger;
//! [`ContentTrimmer`] adds content-hash deduplication and a step budget.
//! The helpers below apply them to trees: the reducible units are the
//! repetitions a quantifier carries beyond its minimum, and nesting between
//! such repetitions becomes the trimmer's link map (removing an outer
//! repetition takes the inner ones with it).

mod config;
mod content;

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use grafl_runtime::codec::encode_wire;
use grafl_runtime::tree::NodeKind;
use grafl_runtime::{NodeId, Tree};

pub use config::ConfigTrimmer;
pub use content::ContentTrimmer;

/// Collects the removable quantified nodes of `tree` and their nesting
/// links. The first `start` repetitions of every quantifier are pinned so
/// any reduced tree still satisfies the quantifier arity invariant.
pub fn removable_quantifieds(tree: &Tree) -> (Vec<NodeId>, HashMap<NodeId, Vec<NodeId>>) {
    let mut units: Vec<NodeId> = Vec::new();
    for id in tree.descendants(tree.root()) {
        if let NodeKind::Quantifier { start, .. } = *tree.kind(id) {
            units.extend(tree.children(id).iter().skip(start));
        }
    }
    let mut links: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for &outer in &units {
        for &inner in &units {
            if outer != inner && tree.is_ancestor_or_self(outer, inner) {
                links.entry(outer).or_default().push(inner);
            }
        }
    }
    (units, links)
}

/// Builds a copy of `tree` keeping only the removable repetitions listed in
/// `keep` (pinned repetitions always stay).
pub fn reduce_tree(tree: &Tree, keep: &[NodeId]) -> Tree {
    let keep: HashSet<NodeId> = keep.iter().copied().collect();
    let (units, _) = removable_quantifieds(tree);
    let mut reduced = tree.clone();
    for unit in units {
        if !keep.contains(&unit) {
            reduced.remove(unit);
        }
    }
    reduced
}

/// A [`ContentTrimmer`] session over the removable repetitions of `tree`,
/// serializing candidates through the wire codec.
pub fn tree_trimmer(tree: &Tree, max_steps: usize) -> ContentTrimmer<NodeId> {
    let (units, links) = removable_quantifieds(tree);
    let source = tree.clone();
    ContentTrimmer::new(
        units,
        links,
        move |keep: &[NodeId]| encode_wire(&reduce_tree(&source, keep)),
        |bytes| {
            let mut hasher = DefaultHasher::new();
            bytes.hash(&mut hasher);
            hasher.finish()
        },
    )
    .max_steps(max_steps)
}
