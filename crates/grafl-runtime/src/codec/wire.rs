//! Binary tree encoding: a length-prefixed, self-describing record per node.
//!
//! Layout: a 4-byte magic, a format version, then the root record. Each
//! record starts with a kind tag that determines its fields; child counts
//! precede child records, so both directions run without recursion.
//! `stop == -1` encodes an unbounded quantifier.

use crate::error::{Error, Result};
use crate::tree::{NodeId, NodeKind, Size, Tree};

const MAGIC: &[u8; 4] = b"GRFT";
const VERSION: u8 = 1;

const KIND_LEAF: u8 = 0;
const KIND_RULE: u8 = 1;
const KIND_QUANTIFIER: u8 = 2;
const KIND_QUANTIFIED: u8 = 3;
const KIND_ALTERNATIVE: u8 = 4;

pub fn encode_wire(tree: &Tree) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    let mut stack: Vec<NodeId> = vec![tree.root()];
    while let Some(id) = stack.pop() {
        match tree.kind(id) {
            NodeKind::LexerLeaf {
                name,
                src,
                size,
                immutable,
            } => {
                out.push(KIND_LEAF);
                write_str(&mut out, name);
                write_str(&mut out, src);
                write_u64(&mut out, size.depth as u64);
                write_u64(&mut out, size.tokens as u64);
                out.push(u8::from(*immutable));
            }
            NodeKind::Rule { name } => {
                out.push(KIND_RULE);
                write_str(&mut out, name);
                write_u32(&mut out, tree.children(id).len() as u32);
            }
            NodeKind::Quantifier { idx, start, stop } => {
                out.push(KIND_QUANTIFIER);
                write_u64(&mut out, *idx as u64);
                write_u64(&mut out, *start as u64);
                write_i64(&mut out, stop.map_or(-1, |s| s as i64));
                write_u32(&mut out, tree.children(id).len() as u32);
            }
            NodeKind::Quantified => {
                out.push(KIND_QUANTIFIED);
                write_u32(&mut out, tree.children(id).len() as u32);
            }
            NodeKind::Alternative { idx, chosen } => {
                out.push(KIND_ALTERNATIVE);
                write_u64(&mut out, *idx as u64);
                write_u64(&mut out, *chosen as u64);
                write_u32(&mut out, tree.children(id).len() as u32);
            }
        }
        stack.extend(tree.children(id).iter().rev());
    }
    out
}

pub fn decode_wire(bytes: &[u8]) -> Result<Tree> {
    let mut reader = Reader { bytes, at: 0 };
    let magic = reader.take(4)?;
    if magic != MAGIC {
        return Err(corrupt("bad magic"));
    }
    if reader.u8()? != VERSION {
        return Err(corrupt("unsupported version"));
    }

    let (kind, count) = read_record(&mut reader)?;
    let mut tree = Tree::new(kind);
    // (parent, children still to read); the stack replaces recursion so
    // deeply nested input cannot overflow.
    let mut pending: Vec<(NodeId, u32)> = Vec::new();
    if count > 0 {
        pending.push((tree.root(), count));
    }
    while let Some(top) = pending.last_mut() {
        if top.1 == 0 {
            pending.pop();
            continue;
        }
        top.1 -= 1;
        let parent = top.0;
        let (kind, count) = read_record(&mut reader)?;
        let node = tree.add_node(kind);
        tree.append_child(parent, node);
        if count > 0 {
            pending.push((node, count));
        }
    }
    if reader.at != bytes.len() {
        return Err(corrupt("trailing bytes"));
    }
    tree.check_invariants().map_err(Error::CorruptTree)?;
    Ok(tree)
}

fn read_record(reader: &mut Reader<'_>) -> Result<(NodeKind, u32)> {
    match reader.u8()? {
        KIND_LEAF => {
            let name = reader.string()?;
            let src = reader.string()?;
            let depth = reader.u64()? as usize;
            let tokens = reader.u64()? as usize;
            let immutable = match reader.u8()? {
                0 => false,
                1 => true,
                other => return Err(corrupt(format!("bad immutable flag {other}"))),
            };
            Ok((
                NodeKind::LexerLeaf {
                    name,
                    src,
                    size: Size::new(depth, tokens),
                    immutable,
                },
                0,
            ))
        }
        KIND_RULE => {
            let name = reader.string()?;
            let count = reader.u32()?;
            Ok((NodeKind::Rule { name }, count))
        }
        KIND_QUANTIFIER => {
            let idx = reader.u64()? as usize;
            let start = reader.u64()? as usize;
            let stop = match reader.i64()? {
                -1 => None,
                s if s >= 0 => Some(s as usize),
                s => return Err(corrupt(format!("bad quantifier stop {s}"))),
            };
            let count = reader.u32()?;
            Ok((NodeKind::Quantifier { idx, start, stop }, count))
        }
        KIND_QUANTIFIED => Ok((NodeKind::Quantified, reader.u32()?)),
        KIND_ALTERNATIVE => {
            let idx = reader.u64()? as usize;
            let chosen = reader.u64()? as usize;
            let count = reader.u32()?;
            Ok((NodeKind::Alternative { idx, chosen }, count))
        }
        other => Err(corrupt(format!("unknown node kind {other}"))),
    }
}

fn corrupt(message: impl Into<String>) -> Error {
    Error::CorruptTree(message.into())
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_str(out: &mut Vec<u8>, value: &str) {
    write_u32(out, value.len() as u32);
    out.extend_from_slice(value.as_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .at
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| corrupt("truncated input"))?;
        let slice = &self.bytes[self.at..end];
        self.at = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().expect("4 bytes")))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().expect("8 bytes")))
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().expect("8 bytes")))
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| corrupt("invalid utf-8"))
    }
}
