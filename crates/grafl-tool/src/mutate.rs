//! Intra-tree mutators.
//!
//! Every mutator discovers its candidate sites through the recipient's
//! annotations first and only then commits, so a failing mutator leaves the
//! recipient untouched. Each one validates the engine's `(depth, tokens)`
//! limit before committing.

use grafl_runtime::tree::NodeKind;
use grafl_runtime::{Individual, NodeId, NodeKey, Size};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::engine::Engine;
use crate::error::Result;

/// Upper bound on candidate-pair probes per mutation attempt, so huge trees
/// cannot stall a single creator call.
pub(crate) const MAX_PAIR_CHECKS: usize = 4096;

impl<'g> Engine<'g> {
    /// Replaces a rule node with a freshly generated subtree for the same
    /// rule, provided the static minimum still fits at that position.
    pub(crate) fn regenerate_rule(&mut self, recipient: &mut Individual) -> Result<bool> {
        let plan = {
            let (tree, annotations) = recipient.parts();
            let root_tokens = annotations.info(tree.root()).tokens;
            let mut candidates: Vec<(NodeId, usize, usize, String)> = Vec::new();
            for (name, nodes) in annotations.rules() {
                if !self.grammar.has_rule(name) {
                    continue;
                }
                let min = self.grammar.rule_size(name);
                for &node in nodes {
                    let info = annotations.info(node);
                    let fits = info.level + min.depth <= self.limit.depth
                        && root_tokens - info.tokens + min.tokens <= self.limit.tokens;
                    if fits {
                        candidates.push((node, info.level, info.tokens, name.clone()));
                    }
                }
            }
            candidates.choose(&mut self.rng).cloned()
        };
        let Some((node, level, tokens, name)) = plan else {
            return Ok(false);
        };
        let root = recipient.tree().root();
        let root_tokens = recipient.annotations().info(root).tokens;
        let replacement =
            self.generate_rule_at(&name, Size::new(level, root_tokens - tokens))?;
        let tree = recipient.tree_mut();
        let imported = tree.import(&replacement, replacement.root());
        tree.replace(node, imported);
        Ok(true)
    }

    /// Removes one repetition of a quantifier that still has more children
    /// than its minimum.
    pub(crate) fn delete_quantified(&mut self, recipient: &mut Individual) -> bool {
        let victim = {
            let (tree, annotations) = recipient.parts();
            let candidates: Vec<NodeId> = annotations
                .quantifieds()
                .values()
                .flatten()
                .copied()
                .filter(|&rep| {
                    tree.parent(rep).is_some_and(|quant| match tree.kind(quant) {
                        NodeKind::Quantifier { start, .. } => tree.children(quant).len() > *start,
                        _ => false,
                    })
                })
                .collect();
            candidates.choose(&mut self.rng).copied()
        };
        match victim {
            Some(rep) => {
                recipient.tree_mut().remove(rep);
                true
            }
            None => false,
        }
    }

    /// Clones one repetition of a non-full quantifier into random sibling
    /// positions, as many times as the token budget allows.
    pub(crate) fn replicate_quantified(&mut self, recipient: &mut Individual) -> bool {
        let plan = {
            let (tree, annotations) = recipient.parts();
            let root_tokens = annotations.info(tree.root()).tokens;
            let headroom = self.limit.tokens.saturating_sub(root_tokens);
            let candidates: Vec<(NodeId, NodeId, usize, Option<usize>)> = annotations
                .quantifieds()
                .values()
                .flatten()
                .copied()
                .filter_map(|rep| {
                    let quant = tree.parent(rep)?;
                    let NodeKind::Quantifier { stop, .. } = *tree.kind(quant) else {
                        return None;
                    };
                    let arity = tree.children(quant).len();
                    if stop.is_some_and(|stop| arity >= stop) {
                        return None;
                    }
                    let tokens = annotations.info(rep).tokens;
                    if tokens == 0 || tokens > headroom {
                        return None;
                    }
                    Some((rep, quant, tokens, stop.map(|stop| stop - arity)))
                })
                .collect();
            candidates.choose(&mut self.rng).copied()
        };
        let Some((rep, quant, tokens, slots)) = plan else {
            return false;
        };
        let headroom = {
            let (tree, annotations) = recipient.parts();
            self.limit
                .tokens
                .saturating_sub(annotations.info(tree.root()).tokens)
        };
        let mut copies = self.rng.gen_range(1..=(headroom / tokens).max(1));
        if let Some(slots) = slots {
            copies = copies.min(slots);
        }
        let tree = recipient.tree_mut();
        for _ in 0..copies {
            let clone = tree.clone_subtree(rep);
            let position = self.rng.gen_range(0..=tree.children(quant).len());
            tree.insert_child(quant, position, clone);
        }
        true
    }

    /// Randomly permutes the repetitions of a quantifier with at least two
    /// children.
    pub(crate) fn shuffle_quantifieds(&mut self, recipient: &mut Individual) -> bool {
        let target = {
            let (tree, annotations) = recipient.parts();
            let candidates: Vec<NodeId> = annotations
                .quantifiers()
                .values()
                .flatten()
                .copied()
                .filter(|&quant| tree.children(quant).len() >= 2)
                .collect();
            candidates.choose(&mut self.rng).copied()
        };
        match target {
            Some(quant) => {
                let mut order = recipient.tree().children(quant).to_vec();
                order.shuffle(&mut self.rng);
                recipient.tree_mut().reorder_children(quant, order);
                true
            }
            None => false,
        }
    }

    /// Replaces a non-root ancestor with a same-named descendant rule,
    /// cutting out the derivation between them.
    pub(crate) fn hoist_rule(&mut self, recipient: &mut Individual) -> bool {
        let plan = {
            let (tree, annotations) = recipient.parts();
            let mut candidates: Vec<(NodeId, NodeId)> = Vec::new();
            for (name, nodes) in annotations.rules() {
                for &node in nodes {
                    for ancestor in tree.ancestors(node) {
                        if tree.parent(ancestor).is_some()
                            && tree.kind(ancestor).name() == Some(name)
                        {
                            candidates.push((ancestor, node));
                        }
                    }
                }
            }
            candidates.choose(&mut self.rng).copied()
        };
        match plan {
            Some((ancestor, node)) => {
                recipient.tree_mut().replace(ancestor, node);
                true
            }
            None => false,
        }
    }

    /// Exchanges two disjoint, non-token-equivalent subtrees of the same
    /// key, when the swap keeps the depth limit in both directions.
    pub(crate) fn swap_local_nodes(&mut self, recipient: &mut Individual) -> bool {
        let plan = {
            let (tree, annotations) = recipient.parts();
            let mut keys = annotations.keys();
            keys.shuffle(&mut self.rng);
            let mut found = None;
            let mut checked = 0;
            'keys: for key in keys {
                let mut nodes = annotations.nodes_for_key(&key).to_vec();
                if nodes.len() < 2 {
                    continue;
                }
                nodes.shuffle(&mut self.rng);
                for i in 0..nodes.len() {
                    for j in (i + 1)..nodes.len() {
                        checked += 1;
                        if checked > MAX_PAIR_CHECKS {
                            break 'keys;
                        }
                        let (a, b) = (nodes[i], nodes[j]);
                        if tree.is_ancestor_or_self(a, b) || tree.is_ancestor_or_self(b, a) {
                            continue;
                        }
                        let (info_a, info_b) = (annotations.info(a), annotations.info(b));
                        if info_a.level + info_b.depth > self.limit.depth
                            || info_b.level + info_a.depth > self.limit.depth
                        {
                            continue;
                        }
                        if tree.tokens_eq(a, tree, b) {
                            continue;
                        }
                        found = Some((a, b));
                        break 'keys;
                    }
                }
            }
            found
        };
        match plan {
            Some((a, b)) => {
                recipient.tree_mut().swap_subtrees(a, b);
                true
            }
            None => false,
        }
    }

    /// Clones a repetition from one quantifier into another quantifier of
    /// the same key elsewhere in the same tree.
    pub(crate) fn insert_local_node(&mut self, recipient: &mut Individual) -> bool {
        let plan = {
            let (tree, annotations) = recipient.parts();
            let root_tokens = annotations.info(tree.root()).tokens;
            let mut keys: Vec<(String, usize)> =
                annotations.quantifiers().keys().cloned().collect();
            keys.shuffle(&mut self.rng);
            let mut found = None;
            'keys: for key in keys {
                let nodes = &annotations.quantifiers()[&key];
                if nodes.len() < 2 {
                    continue;
                }
                let mut pairs: Vec<(NodeId, NodeId)> = Vec::new();
                for &donor in nodes {
                    for &target in nodes {
                        if donor != target {
                            pairs.push((donor, target));
                        }
                    }
                }
                pairs.shuffle(&mut self.rng);
                for (donor, target) in pairs {
                    if tree.children(donor).is_empty() {
                        continue;
                    }
                    let NodeKind::Quantifier { stop, .. } = *tree.kind(target) else {
                        continue;
                    };
                    if stop.is_some_and(|stop| tree.children(target).len() >= stop) {
                        continue;
                    }
                    let &candidate = tree
                        .children(donor)
                        .choose(&mut self.rng)
                        .expect("donor has children");
                    let info = annotations.info(candidate);
                    if root_tokens + info.tokens > self.limit.tokens {
                        continue;
                    }
                    if annotations.info(target).level + info.depth > self.limit.depth {
                        continue;
                    }
                    found = Some((candidate, target));
                    break 'keys;
                }
            }
            found
        };
        let Some((candidate, target)) = plan else {
            return false;
        };
        let tree = recipient.tree_mut();
        let clone = tree.clone_subtree(candidate);
        let position = self.rng.gen_range(0..=tree.children(target).len());
        tree.insert_child(target, position, clone);
        true
    }

    /// Grammar-violating: removes an arbitrary non-root rule node.
    pub(crate) fn unrestricted_delete(&mut self, recipient: &mut Individual) -> bool {
        let victim = {
            let (tree, annotations) = recipient.parts();
            let candidates: Vec<NodeId> = annotations
                .rules()
                .values()
                .flatten()
                .copied()
                .filter(|&node| tree.parent(node).is_some())
                .collect();
            candidates.choose(&mut self.rng).copied()
        };
        match victim {
            Some(node) => {
                recipient.tree_mut().remove(node);
                true
            }
            None => false,
        }
    }

    /// Grammar-violating: replaces a multi-child parser-rule ancestor with
    /// any of its rule-node descendants, regardless of names.
    pub(crate) fn unrestricted_hoist_rule(&mut self, recipient: &mut Individual) -> bool {
        let plan = {
            let (tree, annotations) = recipient.parts();
            let mut candidates: Vec<(NodeId, NodeId)> = Vec::new();
            for &node in annotations.rules().values().flatten() {
                for ancestor in tree.ancestors(node) {
                    let is_branchy_rule = matches!(tree.kind(ancestor), NodeKind::Rule { .. })
                        && tree.children(ancestor).len() > 1
                        && tree.parent(ancestor).is_some();
                    if is_branchy_rule && !tree.tokens_eq(ancestor, tree, node) {
                        candidates.push((ancestor, node));
                    }
                }
            }
            candidates.choose(&mut self.rng).copied()
        };
        match plan {
            Some((ancestor, node)) => {
                recipient.tree_mut().replace(ancestor, node);
                true
            }
            None => false,
        }
    }

    /// Replaces a keyed node with a size-compatible subtree drawn from the
    /// interned pool.
    pub(crate) fn replace_from_pool(&mut self, recipient: &mut Individual) -> bool {
        if self.pool.is_none() {
            return false;
        }
        let plan = {
            let (tree, annotations) = recipient.parts();
            let root_tokens = annotations.info(tree.root()).tokens;
            let mut keys = annotations.keys();
            keys.shuffle(&mut self.rng);
            let mut found = None;
            'keys: for key in keys {
                let mut nodes: Vec<NodeId> = annotations
                    .nodes_for_key(&key)
                    .iter()
                    .copied()
                    .filter(|&node| tree.parent(node).is_some())
                    .collect();
                nodes.shuffle(&mut self.rng);
                for &node in &nodes {
                    let info = annotations.info(node);
                    let max_depth = self.limit.depth.saturating_sub(info.level);
                    let max_tokens = self
                        .limit
                        .tokens
                        .saturating_sub(root_tokens - info.tokens);
                    let pool = self.pool.as_ref().expect("pool checked above");
                    if let Some(subtree) =
                        pool.select_by_key(&key, max_depth, max_tokens, &mut self.rng)
                    {
                        found = Some((node, subtree));
                        break 'keys;
                    }
                }
            }
            found
        };
        let Some((node, subtree)) = plan else {
            return false;
        };
        let tree = recipient.tree_mut();
        let imported = tree.import(&subtree, subtree.root());
        tree.replace(node, imported);
        true
    }

    /// Inserts a pooled repetition into a non-full quantifier of the same
    /// key.
    pub(crate) fn insert_quantified_from_pool(&mut self, recipient: &mut Individual) -> bool {
        if self.pool.is_none() {
            return false;
        }
        let plan = {
            let (tree, annotations) = recipient.parts();
            let root_tokens = annotations.info(tree.root()).tokens;
            let max_tokens = self.limit.tokens.saturating_sub(root_tokens);
            let mut targets: Vec<NodeId> = annotations
                .quantifiers()
                .values()
                .flatten()
                .copied()
                .filter(|&quant| match tree.kind(quant) {
                    NodeKind::Quantifier { stop, .. } => {
                        stop.map_or(true, |stop| tree.children(quant).len() < stop)
                    }
                    _ => false,
                })
                .collect();
            targets.shuffle(&mut self.rng);
            let mut found = None;
            for &target in &targets {
                let Some(NodeKey::Quantifier(rule, idx)) =
                    grafl_runtime::node_key(tree, target)
                else {
                    continue;
                };
                let key = NodeKey::Quantified(rule, idx);
                let info = annotations.info(target);
                let max_depth = self.limit.depth.saturating_sub(info.level);
                let pool = self.pool.as_ref().expect("pool checked above");
                if let Some(subtree) =
                    pool.select_by_key(&key, max_depth, max_tokens, &mut self.rng)
                {
                    found = Some((target, subtree));
                    break;
                }
            }
            found
        };
        let Some((target, subtree)) = plan else {
            return false;
        };
        let tree = recipient.tree_mut();
        let imported = tree.import(&subtree, subtree.root());
        let position = self.rng.gen_range(0..=tree.children(target).len());
        tree.insert_child(target, position, imported);
        true
    }
}
