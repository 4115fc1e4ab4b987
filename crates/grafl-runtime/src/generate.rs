use std::mem;

use rand::rngs::StdRng;

use crate::error::{Error, Result};
use crate::grammar::Grammar;
use crate::listener::Listener;
use crate::model::{Model, DEFAULT_QUANTIFY_PROB};
use crate::tree::{NodeId, NodeKind, Size, Tree, ROOT_NAME};

/// Builds a fresh derivation tree for `rule`.
///
/// `start` is the `(depth, tokens)` measure already consumed outside the
/// subtree being generated: zero for a whole-tree generation, and the
/// node's level plus the rest of the tree's tokens when regenerating a
/// subtree in place.
pub fn generate(
    grammar: &Grammar,
    model: &mut dyn Model,
    listeners: &mut [Box<dyn Listener>],
    rng: &mut StdRng,
    rule: &str,
    limit: Size,
    start: Size,
) -> Result<Tree> {
    let rule_fn = grammar
        .rule_fn(rule)
        .ok_or_else(|| Error::UnknownRule(rule.to_owned()))?;
    let tree = Tree::new(NodeKind::rule(ROOT_NAME));
    let anchor = tree.root();
    let mut ctx = GenCtx {
        grammar,
        model,
        listeners,
        rng,
        tree,
        parent: anchor,
        rule_stack: Vec::new(),
        lexer: None,
        depth: start.depth,
        tokens: start.tokens,
        reserve: 0,
        limit,
    };
    rule_fn(&mut ctx)?;
    let mut tree = ctx.tree;
    if tree.children(anchor).len() == 1 {
        let only = tree.children(anchor)[0];
        tree.replace(anchor, only);
    }
    Ok(tree)
}

struct LexerScope {
    node: NodeId,
    entry_depth: usize,
    max_depth: usize,
}

/// The state threaded through per-rule generator functions.
///
/// Rule functions drive tree construction exclusively through this context:
/// scoped rule entry, alternation selection, quantifier stepping, token
/// emission and reserves. Every scope fires its exit actions on failing
/// paths too, so listener enter/exit events always pair up.
pub struct GenCtx<'a> {
    grammar: &'a Grammar,
    model: &'a mut dyn Model,
    listeners: &'a mut [Box<dyn Listener>],
    rng: &'a mut StdRng,
    tree: Tree,
    parent: NodeId,
    rule_stack: Vec<NodeId>,
    lexer: Option<LexerScope>,
    depth: usize,
    tokens: usize,
    reserve: usize,
    limit: Size,
}

impl<'a> GenCtx<'a> {
    /// Current rule nesting depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Tokens emitted so far, including the starting offset.
    pub fn tokens_emitted(&self) -> usize {
        self.tokens
    }

    /// The current budget. May have been raised by relaxation.
    pub fn limit(&self) -> Size {
        self.limit
    }

    /// Invokes the registered generator function for `rule`.
    pub fn invoke(&mut self, rule: &str) -> Result<()> {
        let rule_fn = self
            .grammar
            .rule_fn(rule)
            .ok_or_else(|| Error::UnknownRule(rule.to_owned()))?;
        rule_fn(self)
    }

    /// Opens a parser-rule scope: appends a `Rule` node under the current
    /// parent, bumps the depth, and brackets `f` with listener events.
    pub fn rule<F>(&mut self, name: &str, f: F) -> Result<NodeId>
    where
        F: FnOnce(&mut GenCtx<'_>) -> Result<()>,
    {
        debug_assert!(self.lexer.is_none(), "parser rule inside a lexer scope");
        let node = self.tree.add_node(NodeKind::rule(name));
        self.tree.append_child(self.parent, node);
        let saved_parent = mem::replace(&mut self.parent, node);
        self.rule_stack.push(node);
        self.depth += 1;
        for listener in self.listeners.iter_mut() {
            listener.enter_rule(&self.tree, node);
        }
        let result = f(self);
        for listener in self.listeners.iter_mut().rev() {
            listener.exit_rule(&self.tree, node);
        }
        self.depth -= 1;
        self.rule_stack.pop();
        self.parent = saved_parent;
        result.map(|()| node)
    }

    /// Opens a lexer-rule scope. The outermost lexer rule creates one
    /// `LexerLeaf` that accumulates all text emitted inside it; a lexer rule
    /// invoked while a scope is already active creates no node and only
    /// retargets the leaf's name for the duration of the call.
    pub fn lexer_rule<F>(&mut self, name: &str, f: F) -> Result<NodeId>
    where
        F: FnOnce(&mut GenCtx<'_>) -> Result<()>,
    {
        match &self.lexer {
            Some(scope) => {
                let node = scope.node;
                let previous = match self.tree.kind_mut(node) {
                    NodeKind::LexerLeaf { name: current, .. } => {
                        mem::replace(current, name.to_owned())
                    }
                    _ => unreachable!("lexer scope points at a non-leaf"),
                };
                self.depth += 1;
                if let Some(scope) = &mut self.lexer {
                    scope.max_depth = scope.max_depth.max(self.depth);
                }
                for listener in self.listeners.iter_mut() {
                    listener.enter_rule(&self.tree, node);
                }
                let result = f(self);
                for listener in self.listeners.iter_mut().rev() {
                    listener.exit_rule(&self.tree, node);
                }
                self.depth -= 1;
                if let NodeKind::LexerLeaf { name: current, .. } = self.tree.kind_mut(node) {
                    *current = previous;
                }
                result.map(|()| node)
            }
            None => {
                let node = self.tree.add_node(NodeKind::LexerLeaf {
                    name: name.to_owned(),
                    src: String::new(),
                    size: Size::new(1, 1),
                    immutable: false,
                });
                self.tree.append_child(self.parent, node);
                self.depth += 1;
                self.tokens += 1;
                self.lexer = Some(LexerScope {
                    node,
                    entry_depth: self.depth,
                    max_depth: self.depth,
                });
                for listener in self.listeners.iter_mut() {
                    listener.enter_rule(&self.tree, node);
                }
                let result = f(self);
                for listener in self.listeners.iter_mut().rev() {
                    listener.exit_rule(&self.tree, node);
                }
                let scope = self.lexer.take().expect("lexer scope still open");
                let nested_depth = scope.max_depth - scope.entry_depth + 1;
                self.depth -= 1;
                let empty = match self.tree.kind_mut(node) {
                    NodeKind::LexerLeaf { src, size, .. } => {
                        *size = Size::new(nested_depth, if src.is_empty() { 0 } else { 1 });
                        src.is_empty()
                    }
                    _ => unreachable!("lexer scope points at a non-leaf"),
                };
                if empty {
                    self.tokens -= 1;
                }
                result.map(|()| node)
            }
        }
    }

    /// Emits a literal token. Inside a lexer scope the text is appended to
    /// the active leaf; otherwise a standalone leaf is created.
    pub fn token(&mut self, name: &str, src: &str) -> Result<NodeId> {
        if let Some(scope) = &self.lexer {
            let node = scope.node;
            self.emit(src);
            return Ok(node);
        }
        let node = self.tree.add_node(NodeKind::leaf(name, src));
        self.tree.append_child(self.parent, node);
        if !src.is_empty() {
            self.tokens += 1;
        }
        Ok(node)
    }

    /// Appends text to the active lexer leaf.
    pub fn emit(&mut self, text: &str) {
        let node = match &self.lexer {
            Some(scope) => scope.node,
            None => {
                debug_assert!(false, "emit outside a lexer scope");
                return;
            }
        };
        if let NodeKind::LexerLeaf { src, .. } = self.tree.kind_mut(node) {
            src.push_str(text);
        }
    }

    /// Consults the model for one character of a charset and emits it.
    pub fn emit_charset(&mut self, set_idx: usize, chars: &[char]) -> Result<()> {
        let node = self.decision_node();
        let picked = self
            .model
            .charset(self.rng, &self.tree, node, set_idx, chars);
        let mut buffer = [0u8; 4];
        let text = picked.encode_utf8(&mut buffer);
        if self.lexer.is_some() {
            self.emit(text);
        } else {
            let name = self.current_rule_name();
            self.token(&name, text)?;
        }
        Ok(())
    }

    /// Accounts for tokens a construct's tail will mandate, for the duration
    /// of `f`, so inner decisions cannot spend the whole remaining budget.
    pub fn with_reserve<R, F>(&mut self, tokens: usize, f: F) -> Result<R>
    where
        F: FnOnce(&mut GenCtx<'_>) -> Result<R>,
    {
        self.reserve += tokens;
        let result = f(self);
        self.reserve -= tokens;
        result
    }

    /// Selects an alternative of the current rule's alternation `alt_set`.
    ///
    /// `conditions` carries the inlined semantic-predicate weights, 1.0 for
    /// unguarded alternatives. Alternatives whose static minimum does not fit
    /// the remaining budget weigh zero; if that zeroes every alternative, the
    /// budget is relaxed to exactly admit the cheapest one and a warning is
    /// logged. The final pick is delegated to the model.
    pub fn select_alternative(&mut self, alt_set: usize, conditions: &[f64]) -> Result<usize> {
        let node = self.decision_node();
        let rule = self.current_rule_name();
        let mins: Vec<Size> = {
            let table = self.grammar.alt_sizes(&rule, alt_set);
            (0..conditions.len())
                .map(|alt| table.get(alt).copied().unwrap_or(Size::ZERO))
                .collect()
        };
        let mut weights = self.feasible_weights(conditions, &mins);
        if weights.iter().all(|&w| w <= 0.0) {
            let mut candidates: Vec<usize> = (0..conditions.len())
                .filter(|&alt| conditions[alt] > 0.0)
                .collect();
            if candidates.is_empty() {
                candidates = (0..conditions.len()).collect();
            }
            if let Some(&pick) = candidates
                .iter()
                .min_by_key(|&&alt| (mins[alt].depth, mins[alt].tokens))
            {
                let need = mins[pick];
                let depth = self.limit.depth.max(self.depth.saturating_add(need.depth));
                let tokens = self
                    .limit
                    .tokens
                    .max(self.tokens.saturating_add(self.reserve).saturating_add(need.tokens));
                log::warn!(
                    "no alternative of {rule:?} (alternation {alt_set}) fits the size limit; \
                     raising it to (depth: {depth}, tokens: {tokens})"
                );
                self.limit = Size::new(depth, tokens);
                weights = self.feasible_weights(conditions, &mins);
            }
        }
        Ok(self
            .model
            .choice(self.rng, &self.tree, node, alt_set, &weights))
    }

    fn feasible_weights(&self, conditions: &[f64], mins: &[Size]) -> Vec<f64> {
        conditions
            .iter()
            .zip(mins)
            .map(|(&condition, &min)| {
                let fits = self.depth.saturating_add(min.depth) <= self.limit.depth
                    && self.tokens.saturating_add(self.reserve).saturating_add(min.tokens)
                        <= self.limit.tokens;
                if fits {
                    condition
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Runs `f` inside an `Alternative` wrapper recording the chosen index.
    /// In lexer scopes no node is created.
    pub fn alternative<F>(&mut self, alt_set: usize, chosen: usize, f: F) -> Result<()>
    where
        F: FnOnce(&mut GenCtx<'_>) -> Result<()>,
    {
        if self.lexer.is_some() {
            return f(self);
        }
        let node = self.tree.add_node(NodeKind::Alternative {
            idx: alt_set,
            chosen,
        });
        self.tree.append_child(self.parent, node);
        let saved_parent = mem::replace(&mut self.parent, node);
        let result = f(self);
        self.parent = saved_parent;
        result
    }

    /// Opens a quantifier at position `quant` of the current rule. In parser
    /// rules a `Quantifier` node is created; lexer scopes track repetitions
    /// without nodes.
    pub fn quantifier(&mut self, quant: usize, start: usize, stop: Option<usize>) -> QuantCtx {
        let node = if self.lexer.is_some() {
            None
        } else {
            let q = self.tree.add_node(NodeKind::Quantifier { idx: quant, start, stop });
            self.tree.append_child(self.parent, q);
            Some(q)
        };
        let rule = self.current_rule_name();
        QuantCtx {
            node,
            quant,
            start,
            stop,
            count: 0,
            min_one: self.grammar.quant_size(&rule, quant),
        }
    }

    fn decision_node(&self) -> NodeId {
        match &self.lexer {
            Some(scope) => scope.node,
            None => self.rule_stack.last().copied().unwrap_or_else(|| self.tree.root()),
        }
    }

    fn current_rule_name(&self) -> String {
        self.tree
            .kind(self.decision_node())
            .name()
            .unwrap_or(ROOT_NAME)
            .to_owned()
    }
}

/// Repetition stepper for one quantifier, a plain state machine: `more`
/// answers whether to run another repetition, `repetition` wraps one
/// expansion in a `Quantified` node.
pub struct QuantCtx {
    node: Option<NodeId>,
    quant: usize,
    start: usize,
    stop: Option<usize>,
    count: usize,
    min_one: Size,
}

impl QuantCtx {
    /// True while the minimum is unmet; beyond it, requires both a fitting
    /// budget and the model's consent. A `start == stop == 0` quantifier
    /// never yields.
    pub fn more(&mut self, ctx: &mut GenCtx<'_>) -> bool {
        if self.stop.is_some_and(|stop| self.count >= stop) {
            return false;
        }
        if self.count < self.start {
            self.count += 1;
            return true;
        }
        let fits = ctx.depth.saturating_add(self.min_one.depth) <= ctx.limit.depth
            && ctx
                .tokens
                .saturating_add(ctx.reserve)
                .saturating_add(self.min_one.tokens)
                <= ctx.limit.tokens;
        if !fits {
            return false;
        }
        let node = ctx.decision_node();
        let go = ctx.model.quantify(
            ctx.rng,
            &ctx.tree,
            node,
            self.quant,
            self.count,
            self.start,
            self.stop,
            DEFAULT_QUANTIFY_PROB,
        );
        if go {
            self.count += 1;
        }
        go
    }

    /// Runs one repetition body inside a `Quantified` wrapper.
    pub fn repetition<F>(&self, ctx: &mut GenCtx<'_>, f: F) -> Result<()>
    where
        F: FnOnce(&mut GenCtx<'_>) -> Result<()>,
    {
        match self.node {
            Some(quantifier) => {
                let rep = ctx.tree.add_node(NodeKind::Quantified);
                ctx.tree.append_child(quantifier, rep);
                let saved_parent = mem::replace(&mut ctx.parent, rep);
                let result = f(ctx);
                ctx.parent = saved_parent;
                result
            }
            None => f(ctx),
        }
    }
}
