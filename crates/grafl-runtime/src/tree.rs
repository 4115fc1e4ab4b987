use std::fmt;

/// Name of the synthetic node used as an attachment point for partial trees.
/// Nodes with this name are excluded from every annotation index.
pub const ROOT_NAME: &str = "<ROOT>";

/// Name assigned to nodes recovered from unrecognizable input. Like
/// [`ROOT_NAME`], it never participates in evolution.
pub const INVALID_NAME: &str = "<INVALID>";

/// A `(depth, tokens)` measure. Used both for budgets ("limit") and for the
/// cost of subtrees.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub depth: usize,
    pub tokens: usize,
}

impl Size {
    pub const ZERO: Size = Size {
        depth: 0,
        tokens: 0,
    };

    /// An effectively unbounded budget.
    pub const MAX: Size = Size {
        depth: usize::MAX,
        tokens: usize::MAX,
    };

    pub const fn new(depth: usize, tokens: usize) -> Size {
        Size { depth, tokens }
    }

    /// Component-wise `<=`.
    pub fn fits_within(self, limit: Size) -> bool {
        self.depth <= limit.depth && self.tokens <= limit.tokens
    }

    pub fn saturating_add(self, other: Size) -> Size {
        Size {
            depth: self.depth.saturating_add(other.depth),
            tokens: self.tokens.saturating_add(other.tokens),
        }
    }
}

impl fmt::Debug for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(depth: {}, tokens: {})", self.depth, self.tokens)
    }
}

/// Index of a node inside its owning [`Tree`]. Ids are never reused while the
/// tree is alive, so they stay valid across detach/replace operations.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn new(index: usize) -> NodeId {
        NodeId(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// The five node variants of a derivation tree.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// A terminal carrying the emitted text. `immutable` leaves come from
    /// tokens that must not be rewritten by any evolution operator.
    LexerLeaf {
        name: String,
        src: String,
        size: Size,
        immutable: bool,
    },
    /// A parser rule application.
    Rule { name: String },
    /// A `?`/`*`/`+` grouping; `idx` is the quantifier's position inside its
    /// containing rule, `stop == None` encodes an unbounded repeat count.
    Quantifier {
        idx: usize,
        start: usize,
        stop: Option<usize>,
    },
    /// One repetition of a quantifier. Always a child of a `Quantifier`.
    Quantified,
    /// One resolved alternation: `idx` identifies the alternation inside its
    /// rule, `chosen` the alternative that was taken.
    Alternative { idx: usize, chosen: usize },
}

impl NodeKind {
    pub fn rule(name: impl Into<String>) -> NodeKind {
        NodeKind::Rule { name: name.into() }
    }

    pub fn leaf(name: impl Into<String>, src: impl Into<String>) -> NodeKind {
        let src = src.into();
        let tokens = if src.is_empty() { 0 } else { 1 };
        NodeKind::LexerLeaf {
            name: name.into(),
            src,
            size: Size::new(1, tokens),
            immutable: false,
        }
    }

    /// The rule name carried by this node, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            NodeKind::LexerLeaf { name, .. } | NodeKind::Rule { name } => Some(name),
            _ => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeKind::LexerLeaf { .. })
    }

    pub fn is_immutable(&self) -> bool {
        matches!(self, NodeKind::LexerLeaf { immutable: true, .. })
    }
}

#[derive(Clone, Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An arena-backed derivation tree.
///
/// Nodes are owned by the tree and addressed by [`NodeId`]; `parent` is a
/// back-reference, not ownership, so the structure is a strict single-parent
/// forest. Detached nodes stay in the arena until the tree is dropped.
/// Cross-tree sharing is impossible by construction: moving a subtree into
/// another tree goes through [`Tree::import`], which deep-copies.
#[derive(Clone, Debug)]
pub struct Tree {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl Tree {
    pub fn new(kind: NodeKind) -> Tree {
        let root = NodeId::new(0);
        Tree {
            nodes: vec![NodeData {
                kind,
                parent: None,
                children: Vec::new(),
            }],
            root,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.index()].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    /// Creates a new, detached node.
    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Detaches `id` from its parent, leaving it parentless in the arena.
    pub fn remove(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.index()].parent.take() {
            self.nodes[parent.index()].children.retain(|&c| c != id);
        }
    }

    /// Detaches `child` from any prior parent and inserts it at `index` in
    /// `parent`'s child list.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        debug_assert!(parent != child);
        self.remove(child);
        self.nodes[parent.index()].children.insert(index, child);
        self.nodes[child.index()].parent = Some(parent);
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let index = self.nodes[parent.index()].children.len();
        self.insert_child(parent, index, child);
    }

    /// Replaces `old` with `new` in `old`'s parent, detaching `new` from any
    /// prior parent. When `old` is the root, `new` becomes the new root.
    /// Returns `new`; `replace(x, x)` is a no-op.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> NodeId {
        if old == new {
            return new;
        }
        self.remove(new);
        match self.nodes[old.index()].parent.take() {
            Some(parent) => {
                let slot = self.nodes[parent.index()]
                    .children
                    .iter()
                    .position(|&c| c == old)
                    .expect("parent/child links out of sync");
                self.nodes[parent.index()].children[slot] = new;
                self.nodes[new.index()].parent = Some(parent);
            }
            None => {
                if self.root == old {
                    self.root = new;
                }
            }
        }
        new
    }

    /// Deep-copies the subtree rooted at `id` inside this arena. The copy is
    /// detached.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let mut stack = vec![(id, None::<NodeId>)];
        let mut copy_root = None;
        while let Some((source, target_parent)) = stack.pop() {
            let kind = self.nodes[source.index()].kind.clone();
            let copy = self.add_node(kind);
            match target_parent {
                Some(parent) => {
                    self.nodes[parent.index()].children.push(copy);
                    self.nodes[copy.index()].parent = Some(parent);
                }
                None => copy_root = Some(copy),
            }
            // Reversed so the children of `copy` end up in source order.
            for child_index in (0..self.nodes[source.index()].children.len()).rev() {
                let child = self.nodes[source.index()].children[child_index];
                stack.push((child, Some(copy)));
            }
        }
        copy_root.expect("clone of at least one node")
    }

    /// Deep-copies a subtree of `other` into this arena. The copy is
    /// detached.
    pub fn import(&mut self, other: &Tree, id: NodeId) -> NodeId {
        let mut stack = vec![(id, None::<NodeId>)];
        let mut copy_root = None;
        while let Some((source, target_parent)) = stack.pop() {
            let copy = self.add_node(other.nodes[source.index()].kind.clone());
            match target_parent {
                Some(parent) => {
                    self.nodes[parent.index()].children.push(copy);
                    self.nodes[copy.index()].parent = Some(parent);
                }
                None => copy_root = Some(copy),
            }
            for &child in other.nodes[source.index()].children.iter().rev() {
                stack.push((child, Some(copy)));
            }
        }
        copy_root.expect("import of at least one node")
    }

    /// Reorders `parent`'s children. `order` must be a permutation of the
    /// current child list.
    pub fn reorder_children(&mut self, parent: NodeId, order: Vec<NodeId>) {
        debug_assert_eq!(order.len(), self.nodes[parent.index()].children.len());
        debug_assert!(order
            .iter()
            .all(|id| self.nodes[id.index()].parent == Some(parent)));
        self.nodes[parent.index()].children = order;
    }

    /// Exchanges two disjoint subtrees in their parents' child lists. Both
    /// nodes must have parents, and neither may contain the other.
    pub fn swap_subtrees(&mut self, a: NodeId, b: NodeId) {
        debug_assert!(!self.is_ancestor_or_self(a, b) && !self.is_ancestor_or_self(b, a));
        let parent_a = self.nodes[a.index()].parent.expect("swap of a detached node");
        let parent_b = self.nodes[b.index()].parent.expect("swap of a detached node");
        let slot_a = self.nodes[parent_a.index()]
            .children
            .iter()
            .position(|&c| c == a)
            .expect("parent/child links out of sync");
        let slot_b = self.nodes[parent_b.index()]
            .children
            .iter()
            .position(|&c| c == b)
            .expect("parent/child links out of sync");
        self.nodes[parent_a.index()].children[slot_a] = b;
        self.nodes[parent_b.index()].children[slot_b] = a;
        self.nodes[a.index()].parent = Some(parent_b);
        self.nodes[b.index()].parent = Some(parent_a);
    }

    /// Deep-copies the subtree at `id` into a new tree of its own.
    pub fn extract(&self, id: NodeId) -> Tree {
        let mut out = Tree::new(self.kind(id).clone());
        let root = out.root();
        for &child in self.children(id) {
            let copy = out.import(self, child);
            out.append_child(root, copy);
        }
        out
    }

    /// In-order iterator over the non-empty leaf texts of the subtree at
    /// `id`.
    pub fn tokens(&self, id: NodeId) -> Tokens<'_> {
        Tokens {
            tree: self,
            stack: vec![id],
        }
    }

    /// Token-sequence equivalence of two subtrees, possibly from different
    /// trees.
    pub fn tokens_eq(&self, id: NodeId, other: &Tree, other_id: NodeId) -> bool {
        self.tokens(id).eq(other.tokens(other_id))
    }

    /// Whether `ancestor` is `id` itself or an ancestor of `id`.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(node) = cursor {
            if node == ancestor {
                return true;
            }
            cursor = self.parent(node);
        }
        false
    }

    /// Ancestors of `id`, nearest first, not including `id`.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&n| self.parent(n))
    }

    /// Pre-order iterator over the subtree at `id`.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            tree: self,
            stack: vec![id],
        }
    }

    /// Recomputes the `(depth, tokens)` measure of the subtree at `id` by a
    /// fresh traversal. Rule nodes and lexer leaves contribute to depth;
    /// quantifier/quantified/alternative wrappers are transparent.
    pub fn subtree_size(&self, id: NodeId) -> Size {
        // Post-order without recursion: `sizes` holds the running measure of
        // every open node, indexed by position in `open`.
        let mut open: Vec<(NodeId, usize, Size)> = vec![(id, 0, Size::ZERO)];
        loop {
            let (node, next_child, acc) = *open.last().expect("non-empty traversal stack");
            let children = self.children(node);
            if next_child < children.len() {
                open.last_mut().expect("just read").1 += 1;
                open.push((children[next_child], 0, Size::ZERO));
                continue;
            }
            open.pop();
            let own = match self.kind(node) {
                NodeKind::LexerLeaf { src, size, .. } => {
                    if src.is_empty() {
                        Size::new(size.depth, 0)
                    } else {
                        *size
                    }
                }
                NodeKind::Rule { .. } => Size::new(acc.depth + 1, acc.tokens),
                NodeKind::Quantifier { .. } | NodeKind::Quantified | NodeKind::Alternative { .. } => {
                    acc
                }
            };
            match open.last_mut() {
                Some(parent) => {
                    parent.2 = Size::new(parent.2.depth.max(own.depth), parent.2.tokens + own.tokens);
                }
                None => return own,
            }
        }
    }

    /// Structural validation used by tests and fuzz targets: parent/child
    /// symmetry, single membership in the parent's child list, quantifier
    /// arity within `[start, stop]`, and quantifier children all being
    /// `Quantified`.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        for id in self.descendants(self.root) {
            for &child in self.children(id) {
                if self.parent(child) != Some(id) {
                    return Err(format!("{child:?} is a child of {id:?} but points elsewhere"));
                }
                let occurrences = self.children(id).iter().filter(|&&c| c == child).count();
                if occurrences != 1 {
                    return Err(format!("{child:?} appears {occurrences} times under {id:?}"));
                }
            }
            if let NodeKind::Quantifier { start, stop, .. } = *self.kind(id) {
                let arity = self.children(id).len();
                if arity < start || stop.is_some_and(|stop| arity > stop) {
                    return Err(format!(
                        "quantifier {id:?} has {arity} children outside [{start}, {stop:?}]"
                    ));
                }
                for &child in self.children(id) {
                    if !matches!(self.kind(child), NodeKind::Quantified) {
                        return Err(format!("quantifier {id:?} has a non-quantified child"));
                    }
                }
            }
            if let NodeKind::Quantified = self.kind(id) {
                match self.parent(id) {
                    Some(parent) if matches!(self.kind(parent), NodeKind::Quantifier { .. }) => {}
                    _ => return Err(format!("{id:?} is quantified but not under a quantifier")),
                }
            }
        }
        if self.parent(self.root).is_some() {
            return Err("root has a parent".into());
        }
        Ok(())
    }

    /// Structural equality of two subtrees (kinds, fields and child order).
    pub fn subtree_eq(&self, id: NodeId, other: &Tree, other_id: NodeId) -> bool {
        let mut stack = vec![(id, other_id)];
        while let Some((a, b)) = stack.pop() {
            if self.kind(a) != other.kind(b) {
                return false;
            }
            let (ca, cb) = (self.children(a), other.children(b));
            if ca.len() != cb.len() {
                return false;
            }
            stack.extend(ca.iter().copied().zip(cb.iter().copied()));
        }
        true
    }
}

/// See [`Tree::tokens`].
pub struct Tokens<'a> {
    tree: &'a Tree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        while let Some(id) = self.stack.pop() {
            match self.tree.kind(id) {
                NodeKind::LexerLeaf { src, .. } => {
                    if !src.is_empty() {
                        return Some(src);
                    }
                }
                _ => self.stack.extend(self.tree.children(id).iter().rev()),
            }
        }
        None
    }
}

/// See [`Tree::descendants`].
pub struct Descendants<'a> {
    tree: &'a Tree,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack.extend(self.tree.children(id).iter().rev());
        Some(id)
    }
}
