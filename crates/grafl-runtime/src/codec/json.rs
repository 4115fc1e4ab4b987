//! JSON tree encoding: the wire record under short keys.
//!
//! `t` kind, `n` name, `s` source text, `z` size pair, `m` immutable flag,
//! `i` quantifier/alternation index, `ai` chosen alternative, `b`/`e`
//! quantifier bounds (`e == -1` for ∞), `c` children.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tree::{NodeId, NodeKind, Size, Tree};

#[derive(Serialize, Deserialize)]
struct JsonNode {
    t: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    s: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    z: Option<[u64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    m: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    i: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ai: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    b: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    e: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    c: Option<Vec<JsonNode>>,
}

pub fn encode_json(tree: &Tree) -> String {
    serde_json::to_string(&to_json(tree, tree.root())).expect("tree serialization is infallible")
}

pub fn decode_json(text: &str) -> Result<Tree> {
    let node: JsonNode =
        serde_json::from_str(text).map_err(|e| Error::CorruptTree(e.to_string()))?;
    let kind = node_kind(&node)?;
    let mut tree = Tree::new(kind);
    let root = tree.root();
    for child in node.c.unwrap_or_default() {
        attach(&mut tree, root, child)?;
    }
    tree.check_invariants().map_err(Error::CorruptTree)?;
    Ok(tree)
}

fn to_json(tree: &Tree, id: NodeId) -> JsonNode {
    let children = || {
        let children: Vec<JsonNode> = tree
            .children(id)
            .iter()
            .map(|&child| to_json(tree, child))
            .collect();
        (!children.is_empty()).then_some(children)
    };
    match tree.kind(id) {
        NodeKind::LexerLeaf {
            name,
            src,
            size,
            immutable,
        } => JsonNode {
            t: 0,
            n: Some(name.clone()),
            s: Some(src.clone()),
            z: Some([size.depth as u64, size.tokens as u64]),
            m: immutable.then_some(true),
            i: None,
            ai: None,
            b: None,
            e: None,
            c: None,
        },
        NodeKind::Rule { name } => JsonNode {
            t: 1,
            n: Some(name.clone()),
            s: None,
            z: None,
            m: None,
            i: None,
            ai: None,
            b: None,
            e: None,
            c: children(),
        },
        NodeKind::Quantifier { idx, start, stop } => JsonNode {
            t: 2,
            n: None,
            s: None,
            z: None,
            m: None,
            i: Some(*idx as u64),
            ai: None,
            b: Some(*start as u64),
            e: Some(stop.map_or(-1, |s| s as i64)),
            c: children(),
        },
        NodeKind::Quantified => JsonNode {
            t: 3,
            n: None,
            s: None,
            z: None,
            m: None,
            i: None,
            ai: None,
            b: None,
            e: None,
            c: children(),
        },
        NodeKind::Alternative { idx, chosen } => JsonNode {
            t: 4,
            n: None,
            s: None,
            z: None,
            m: None,
            i: Some(*idx as u64),
            ai: Some(*chosen as u64),
            b: None,
            e: None,
            c: children(),
        },
    }
}

fn attach(tree: &mut Tree, parent: NodeId, node: JsonNode) -> Result<()> {
    let kind = node_kind(&node)?;
    let id = tree.add_node(kind);
    tree.append_child(parent, id);
    for child in node.c.unwrap_or_default() {
        attach(tree, id, child)?;
    }
    Ok(())
}

fn node_kind(node: &JsonNode) -> Result<NodeKind> {
    fn missing(field: &str, kind: &str) -> Error {
        Error::CorruptTree(format!("missing {field} on {kind} record"))
    }

    match node.t {
        0 => {
            let [depth, tokens] = node.z.ok_or_else(|| missing("z", "leaf"))?;
            Ok(NodeKind::LexerLeaf {
                name: node.n.clone().ok_or_else(|| missing("n", "leaf"))?,
                src: node.s.clone().ok_or_else(|| missing("s", "leaf"))?,
                size: Size::new(depth as usize, tokens as usize),
                immutable: node.m.unwrap_or(false),
            })
        }
        1 => Ok(NodeKind::Rule {
            name: node.n.clone().ok_or_else(|| missing("n", "rule"))?,
        }),
        2 => {
            let stop = match node.e.ok_or_else(|| missing("e", "quantifier"))? {
                -1 => None,
                s if s >= 0 => Some(s as usize),
                s => {
                    return Err(Error::CorruptTree(format!("bad quantifier stop {s}")));
                }
            };
            Ok(NodeKind::Quantifier {
                idx: node.i.ok_or_else(|| missing("i", "quantifier"))? as usize,
                start: node.b.ok_or_else(|| missing("b", "quantifier"))? as usize,
                stop,
            })
        }
        3 => Ok(NodeKind::Quantified),
        4 => Ok(NodeKind::Alternative {
            idx: node.i.ok_or_else(|| missing("i", "alternative"))? as usize,
            chosen: node.ai.ok_or_else(|| missing("ai", "alternative"))? as usize,
        }),
        other => Err(Error::CorruptTree(format!("unknown node kind {other}"))),
    }
}
