//! Cross-tree recombiners.
//!
//! Donor material is always deep-copied into the recipient; the donor tree
//! is never mutated. Like the mutators, recombiners only commit once a
//! size-respecting site has been found.

use std::collections::HashSet;

use grafl_runtime::tree::NodeKind;
use grafl_runtime::{Individual, NodeId, NodeKey};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::engine::Engine;
use crate::mutate::MAX_PAIR_CHECKS;

impl<'g> Engine<'g> {
    /// Replaces a recipient node with a copy of a donor node of the same
    /// key, within the size limits.
    pub(crate) fn replace_node(
        &mut self,
        recipient: &mut Individual,
        donor: &mut Individual,
    ) -> bool {
        let plan = {
            let (_, donor_annotations) = donor.parts();
            let (tree, annotations) = recipient.parts();
            let donor_keys: HashSet<NodeKey> = donor_annotations.keys().into_iter().collect();
            let mut keys: Vec<NodeKey> = annotations
                .keys()
                .into_iter()
                .filter(|key| donor_keys.contains(key))
                .collect();
            keys.shuffle(&mut self.rng);
            let root_tokens = annotations.info(tree.root()).tokens;
            let mut found = None;
            let mut checked = 0;
            'keys: for key in keys {
                let mut targets: Vec<NodeId> = annotations
                    .nodes_for_key(&key)
                    .iter()
                    .copied()
                    .filter(|&node| tree.parent(node).is_some())
                    .collect();
                let mut sources = donor_annotations.nodes_for_key(&key).to_vec();
                targets.shuffle(&mut self.rng);
                sources.shuffle(&mut self.rng);
                for &target in &targets {
                    let target_info = annotations.info(target);
                    for &source in &sources {
                        checked += 1;
                        if checked > MAX_PAIR_CHECKS {
                            break 'keys;
                        }
                        let source_info = donor_annotations.info(source);
                        let fits = root_tokens - target_info.tokens + source_info.tokens
                            <= self.limit.tokens
                            && target_info.level + source_info.depth <= self.limit.depth;
                        if fits {
                            found = Some((target, source));
                            break 'keys;
                        }
                    }
                }
            }
            found
        };
        let Some((target, source)) = plan else {
            return false;
        };
        let tree = recipient.tree_mut();
        let imported = tree.import(donor.tree(), source);
        tree.replace(target, imported);
        true
    }

    /// Copies one repetition of a donor quantifier into a non-full
    /// recipient quantifier of the same key.
    pub(crate) fn insert_quantified(
        &mut self,
        recipient: &mut Individual,
        donor: &mut Individual,
    ) -> bool {
        let plan = {
            let (donor_tree, donor_annotations) = donor.parts();
            let (tree, annotations) = recipient.parts();
            let root_tokens = annotations.info(tree.root()).tokens;
            let mut keys: Vec<(String, usize)> = annotations
                .quantifiers()
                .keys()
                .filter(|key| donor_annotations.quantifiers().contains_key(*key))
                .cloned()
                .collect();
            keys.shuffle(&mut self.rng);
            let mut found = None;
            'keys: for key in keys {
                let mut targets: Vec<NodeId> = annotations.quantifiers()[&key].clone();
                targets.shuffle(&mut self.rng);
                let mut sources: Vec<NodeId> = donor_annotations.quantifiers()[&key]
                    .iter()
                    .copied()
                    .filter(|&quant| !donor_tree.children(quant).is_empty())
                    .collect();
                sources.shuffle(&mut self.rng);
                for &target in &targets {
                    let NodeKind::Quantifier { stop, .. } = *tree.kind(target) else {
                        continue;
                    };
                    if stop.is_some_and(|stop| tree.children(target).len() >= stop) {
                        continue;
                    }
                    let target_info = annotations.info(target);
                    for &source in &sources {
                        let &candidate = donor_tree
                            .children(source)
                            .choose(&mut self.rng)
                            .expect("source quantifier has children");
                        let info = donor_annotations.info(candidate);
                        let fits = root_tokens + info.tokens <= self.limit.tokens
                            && target_info.level + info.depth <= self.limit.depth;
                        if fits {
                            found = Some((target, candidate));
                            break 'keys;
                        }
                    }
                }
            }
            found
        };
        let Some((target, candidate)) = plan else {
            return false;
        };
        let tree = recipient.tree_mut();
        let imported = tree.import(donor.tree(), candidate);
        let position = self.rng.gen_range(0..=tree.children(target).len());
        tree.insert_child(target, position, imported);
        true
    }
}
