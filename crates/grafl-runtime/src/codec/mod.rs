//! Stable encodings of derivation trees.
//!
//! Two formats round-trip the full data model: a compact binary wire format
//! and a JSON form with short keys. Both reject malformed input with
//! [`Error::CorruptTree`](crate::Error::CorruptTree) instead of panicking.

mod json;
mod wire;

pub use json::{decode_json, encode_json};
pub use wire::{decode_wire, encode_wire};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{NodeKind, Size, Tree};

    pub(crate) fn sample_tree() -> Tree {
        let mut tree = Tree::new(NodeKind::rule("start"));
        let root = tree.root();
        let alt = tree.add_node(NodeKind::Alternative { idx: 0, chosen: 1 });
        tree.append_child(root, alt);
        let quant = tree.add_node(NodeKind::Quantifier {
            idx: 0,
            start: 1,
            stop: None,
        });
        tree.append_child(alt, quant);
        let rep = tree.add_node(NodeKind::Quantified);
        tree.append_child(quant, rep);
        let leaf = tree.add_node(NodeKind::leaf("A", "a"));
        tree.append_child(rep, leaf);
        let frozen = tree.add_node(NodeKind::LexerLeaf {
            name: "EOF".to_owned(),
            src: String::new(),
            size: Size::new(1, 0),
            immutable: true,
        });
        tree.append_child(root, frozen);
        tree
    }

    #[test]
    fn wire_round_trips() {
        let tree = sample_tree();
        let decoded = decode_wire(&encode_wire(&tree)).unwrap();
        assert!(tree.subtree_eq(tree.root(), &decoded, decoded.root()));
    }

    #[test]
    fn json_round_trips() {
        let tree = sample_tree();
        let decoded = decode_json(&encode_json(&tree)).unwrap();
        assert!(tree.subtree_eq(tree.root(), &decoded, decoded.root()));
    }

    #[test]
    fn codecs_agree_on_token_streams() {
        let tree = sample_tree();
        let wire = decode_wire(&encode_wire(&tree)).unwrap();
        let json = decode_json(&encode_json(&tree)).unwrap();
        assert!(wire.subtree_eq(wire.root(), &json, json.root()));
    }
}
