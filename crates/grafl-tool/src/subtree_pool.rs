use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use grafl_runtime::codec::encode_wire;
use grafl_runtime::{node_key, Annotations, NodeKey, Size, Tree};
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::Rng;

struct Entry {
    tree: Tree,
    size: Size,
    refs: usize,
}

/// Interns subtrees by content, keyed by node compatibility key.
///
/// Every eligible subtree of an added tree is deduplicated by the hash of its
/// wire encoding, with a reference count per distinct content. Selection
/// samples candidates with weight `1/refcount`, so frequently seen subtrees
/// do not dominate, and always returns a fresh deep copy; interned trees
/// are never mutated in place.
#[derive(Default)]
pub struct SubTreePopulation {
    pool: BTreeMap<NodeKey, IndexMap<u64, Entry>>,
    subtrees: usize,
}

impl SubTreePopulation {
    pub fn new() -> SubTreePopulation {
        SubTreePopulation::default()
    }

    /// Interns every keyed subtree of `tree`.
    pub fn add_tree(&mut self, tree: &Tree) {
        let annotations = Annotations::build(tree);
        for id in tree.descendants(tree.root()) {
            let Some(key) = node_key(tree, id) else {
                continue;
            };
            let subtree = tree.extract(id);
            let mut hasher = DefaultHasher::new();
            encode_wire(&subtree).hash(&mut hasher);
            let content = hasher.finish();
            let slot = self.pool.entry(key).or_default();
            match slot.get_mut(&content) {
                Some(entry) => entry.refs += 1,
                None => {
                    let info = annotations.info(id);
                    slot.insert(
                        content,
                        Entry {
                            tree: subtree,
                            size: info.size(),
                            refs: 1,
                        },
                    );
                    self.subtrees += 1;
                }
            }
        }
    }

    /// Samples one interned subtree compatible with `key` that fits within
    /// the given bounds, with probability proportional to `1/refcount`.
    /// Returns a deep copy.
    pub fn select_by_key(
        &self,
        key: &NodeKey,
        max_depth: usize,
        max_tokens: usize,
        rng: &mut StdRng,
    ) -> Option<Tree> {
        let slot = self.pool.get(key)?;
        let candidates: Vec<&Entry> = slot
            .values()
            .filter(|entry| entry.size.depth <= max_depth && entry.size.tokens <= max_tokens)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let total: f64 = candidates.iter().map(|e| 1.0 / e.refs as f64).sum();
        let mut draw = rng.gen::<f64>() * total;
        for entry in &candidates {
            draw -= 1.0 / entry.refs as f64;
            if draw <= 0.0 {
                return Some(entry.tree.clone());
            }
        }
        candidates.last().map(|entry| entry.tree.clone())
    }

    /// Number of distinct interned subtrees.
    pub fn len(&self) -> usize {
        self.subtrees
    }

    pub fn is_empty(&self) -> bool {
        self.subtrees == 0
    }
}
