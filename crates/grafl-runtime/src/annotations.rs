use std::collections::{BTreeMap, HashMap};

use crate::tree::{NodeId, NodeKind, Size, Tree, INVALID_NAME, ROOT_NAME};

/// Compatibility key for structural rewriting: two nodes may stand in for
/// each other only when their keys agree. A parser rule and a same-named
/// lexer leaf share a key; alternatives, quantifiers and quantifieds match
/// only when the rule name and the position index both agree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKey {
    Rule(String),
    Alternative(String, usize),
    Quantifier(String, usize),
    Quantified(String, usize),
}

/// Returns the key of `id`, or `None` for nodes that take no part in
/// evolution (immutable leaves, synthetic names).
pub fn node_key(tree: &Tree, id: NodeId) -> Option<NodeKey> {
    fn enclosing_rule(tree: &Tree, id: NodeId) -> Option<String> {
        tree.ancestors(id).find_map(|a| match tree.kind(a) {
            NodeKind::Rule { name } | NodeKind::LexerLeaf { name, .. } => Some(name.clone()),
            _ => None,
        })
    }

    match tree.kind(id) {
        NodeKind::LexerLeaf { immutable: true, .. } => None,
        NodeKind::LexerLeaf { name, .. } | NodeKind::Rule { name } => {
            if name == ROOT_NAME || name == INVALID_NAME {
                None
            } else {
                Some(NodeKey::Rule(name.clone()))
            }
        }
        NodeKind::Alternative { idx, .. } => {
            Some(NodeKey::Alternative(enclosing_rule(tree, id)?, *idx))
        }
        NodeKind::Quantifier { idx, .. } => {
            Some(NodeKey::Quantifier(enclosing_rule(tree, id)?, *idx))
        }
        NodeKind::Quantified => {
            let parent = tree.parent(id)?;
            match tree.kind(parent) {
                NodeKind::Quantifier { idx, .. } => {
                    Some(NodeKey::Quantified(enclosing_rule(tree, id)?, *idx))
                }
                _ => None,
            }
        }
    }
}

/// Per-node placement and measure: distance from the root in rule levels,
/// and the `(depth, tokens)` of the node's own subtree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub level: usize,
    pub depth: usize,
    pub tokens: usize,
}

impl NodeInfo {
    pub fn size(self) -> Size {
        Size::new(self.depth, self.tokens)
    }
}

/// Lazily built indices over one tree.
///
/// All name-keyed maps iterate in sorted key order, which keeps runs
/// reproducible under a fixed seed. The synthetic `<ROOT>`/`<INVALID>` names
/// and immutable lexer leaves are excluded from every index (but not from
/// `info`, which covers every reachable node).
#[derive(Debug, Default)]
pub struct Annotations {
    rules: BTreeMap<String, Vec<NodeId>>,
    alternatives: BTreeMap<(String, usize), Vec<NodeId>>,
    quantifiers: BTreeMap<(String, usize), Vec<NodeId>>,
    quantifieds: BTreeMap<(String, usize), Vec<NodeId>>,
    info: HashMap<NodeId, NodeInfo>,
}

impl Annotations {
    pub fn build(tree: &Tree) -> Annotations {
        let mut annotations = Annotations::default();
        // One traversal computes levels on the way down and subtree measures
        // on the way back up.
        let mut open: Vec<(NodeId, usize, usize, Size)> = vec![(tree.root(), 0, 0, Size::ZERO)];
        let mut rule_names: Vec<String> = Vec::new();
        while let Some(&(node, level, next_child, acc)) = open.last() {
            let children = tree.children(node);
            if next_child == 0 {
                if let NodeKind::Rule { name } = tree.kind(node) {
                    rule_names.push(name.clone());
                }
            }
            if next_child < children.len() {
                open.last_mut().expect("just read").2 += 1;
                let child_level = match tree.kind(node) {
                    NodeKind::Rule { .. } => level + 1,
                    _ => level,
                };
                open.push((children[next_child], child_level, 0, Size::ZERO));
                continue;
            }
            open.pop();
            let own = match tree.kind(node) {
                NodeKind::LexerLeaf { src, size, .. } => {
                    if src.is_empty() {
                        Size::new(size.depth, 0)
                    } else {
                        *size
                    }
                }
                NodeKind::Rule { .. } => {
                    rule_names.pop();
                    Size::new(acc.depth + 1, acc.tokens)
                }
                _ => acc,
            };
            annotations.info.insert(
                node,
                NodeInfo {
                    level,
                    depth: own.depth,
                    tokens: own.tokens,
                },
            );
            annotations.index(tree, node, &rule_names);
            if let Some(parent) = open.last_mut() {
                parent.3 = Size::new(parent.3.depth.max(own.depth), parent.3.tokens + own.tokens);
            }
        }
        annotations
    }

    fn index(&mut self, tree: &Tree, node: NodeId, rule_names: &[String]) {
        let enclosing = || rule_names.last().cloned();
        match tree.kind(node) {
            NodeKind::LexerLeaf { immutable: true, .. } => {}
            NodeKind::LexerLeaf { name, .. } | NodeKind::Rule { name } => {
                if name != ROOT_NAME && name != INVALID_NAME {
                    self.rules.entry(name.clone()).or_default().push(node);
                }
            }
            NodeKind::Alternative { idx, .. } => {
                if let Some(rule) = enclosing() {
                    self.alternatives.entry((rule, *idx)).or_default().push(node);
                }
            }
            NodeKind::Quantifier { idx, .. } => {
                if let Some(rule) = enclosing() {
                    self.quantifiers.entry((rule, *idx)).or_default().push(node);
                }
            }
            NodeKind::Quantified => {
                if let (Some(parent), Some(rule)) = (tree.parent(node), enclosing()) {
                    if let NodeKind::Quantifier { idx, .. } = tree.kind(parent) {
                        self.quantifieds.entry((rule, *idx)).or_default().push(node);
                    }
                }
            }
        }
    }

    pub fn info(&self, id: NodeId) -> NodeInfo {
        self.info.get(&id).copied().unwrap_or_default()
    }

    /// Rule and lexer-leaf nodes by name, sorted by name.
    pub fn rules(&self) -> &BTreeMap<String, Vec<NodeId>> {
        &self.rules
    }

    pub fn rule_nodes(&self, name: &str) -> &[NodeId] {
        self.rules.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Quantifier nodes by `(rule, index)`, sorted by key.
    pub fn quantifiers(&self) -> &BTreeMap<(String, usize), Vec<NodeId>> {
        &self.quantifiers
    }

    /// Alternative nodes by `(rule, index)`, sorted by key.
    pub fn alternatives(&self) -> &BTreeMap<(String, usize), Vec<NodeId>> {
        &self.alternatives
    }

    /// Quantified nodes by `(rule, quantifier index)`, sorted by key.
    pub fn quantifieds(&self) -> &BTreeMap<(String, usize), Vec<NodeId>> {
        &self.quantifieds
    }

    /// All keys with at least one node, in sorted order.
    pub fn keys(&self) -> Vec<NodeKey> {
        let mut keys: Vec<NodeKey> = Vec::new();
        keys.extend(self.rules.keys().map(|name| NodeKey::Rule(name.clone())));
        keys.extend(
            self.alternatives
                .keys()
                .map(|(rule, idx)| NodeKey::Alternative(rule.clone(), *idx)),
        );
        keys.extend(
            self.quantifiers
                .keys()
                .map(|(rule, idx)| NodeKey::Quantifier(rule.clone(), *idx)),
        );
        keys.extend(
            self.quantifieds
                .keys()
                .map(|(rule, idx)| NodeKey::Quantified(rule.clone(), *idx)),
        );
        keys.sort();
        keys
    }

    pub fn nodes_for_key(&self, key: &NodeKey) -> &[NodeId] {
        let slot = match key {
            NodeKey::Rule(name) => self.rules.get(name),
            NodeKey::Alternative(rule, idx) => self.alternatives.get(&(rule.clone(), *idx)),
            NodeKey::Quantifier(rule, idx) => self.quantifiers.get(&(rule.clone(), *idx)),
            NodeKey::Quantified(rule, idx) => self.quantifieds.get(&(rule.clone(), *idx)),
        };
        slot.map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeKind;

    fn sample() -> Tree {
        let mut tree = Tree::new(NodeKind::rule("start"));
        let root = tree.root();
        let quant = tree.add_node(NodeKind::Quantifier {
            idx: 0,
            start: 0,
            stop: None,
        });
        tree.append_child(root, quant);
        for src in ["a", "b"] {
            let rep = tree.add_node(NodeKind::Quantified);
            tree.append_child(quant, rep);
            let element = tree.add_node(NodeKind::rule("element"));
            tree.append_child(rep, element);
            let leaf = tree.add_node(NodeKind::leaf("A", src));
            tree.append_child(element, leaf);
        }
        tree
    }

    #[test]
    fn levels_and_sizes_match_a_fresh_traversal() {
        let tree = sample();
        let annotations = Annotations::build(&tree);
        let root_info = annotations.info(tree.root());
        assert_eq!(root_info.level, 0);
        assert_eq!(root_info.size(), tree.subtree_size(tree.root()));
        for id in tree.descendants(tree.root()) {
            assert_eq!(annotations.info(id).size(), tree.subtree_size(id));
        }
        let element = annotations.rule_nodes("element")[0];
        assert_eq!(annotations.info(element).level, 1);
        let leaf = annotations.rule_nodes("A")[0];
        assert_eq!(annotations.info(leaf).level, 2);
    }

    #[test]
    fn indices_cover_all_four_kinds() {
        let tree = sample();
        let annotations = Annotations::build(&tree);
        assert_eq!(annotations.rule_nodes("start").len(), 1);
        assert_eq!(annotations.rule_nodes("element").len(), 2);
        assert_eq!(annotations.rule_nodes("A").len(), 2);
        assert_eq!(
            annotations.quantifiers()[&("start".to_owned(), 0)].len(),
            1
        );
        assert_eq!(
            annotations.quantifieds()[&("start".to_owned(), 0)].len(),
            2
        );
        let keys = annotations.keys();
        assert!(keys.contains(&NodeKey::Rule("element".to_owned())));
        assert!(keys.contains(&NodeKey::Quantifier("start".to_owned(), 0)));
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn immutable_and_synthetic_nodes_are_excluded() {
        let mut tree = sample();
        let root = tree.root();
        let frozen = tree.add_node(NodeKind::LexerLeaf {
            name: "A".to_owned(),
            src: "frozen".to_owned(),
            size: Size::new(1, 1),
            immutable: true,
        });
        tree.append_child(root, frozen);
        let synthetic = tree.add_node(NodeKind::rule(ROOT_NAME));
        tree.append_child(root, synthetic);
        let annotations = Annotations::build(&tree);
        assert_eq!(annotations.rule_nodes("A").len(), 2);
        assert!(!annotations.rules().contains_key(ROOT_NAME));
        assert_eq!(node_key(&tree, frozen), None);
        assert_eq!(node_key(&tree, synthetic), None);
        // Excluded from indices, still measured.
        assert_eq!(annotations.info(frozen).tokens, 1);
    }
}
