use std::collections::HashMap;

use crate::tree::{NodeId, Tree};

/// Observes rule boundaries during generation.
///
/// `enter_rule` callbacks fire in listener registration order, `exit_rule` in
/// reverse registration order, and exits are delivered on every path out of a
/// rule, including failing ones.
pub trait Listener {
    fn enter_rule(&mut self, tree: &Tree, node: NodeId) {
        let _ = (tree, node);
    }

    fn exit_rule(&mut self, tree: &Tree, node: NodeId) {
        let _ = (tree, node);
    }
}

/// Routes rule events to per-rule handlers by the entered rule's name.
/// Events for rules without a registered handler are dropped.
#[derive(Default)]
pub struct DispatchingListener {
    handlers: HashMap<String, Box<dyn Listener>>,
}

impl DispatchingListener {
    pub fn new() -> DispatchingListener {
        DispatchingListener::default()
    }

    pub fn on(mut self, rule: &str, handler: impl Listener + 'static) -> DispatchingListener {
        self.handlers.insert(rule.to_owned(), Box::new(handler));
        self
    }
}

impl Listener for DispatchingListener {
    fn enter_rule(&mut self, tree: &Tree, node: NodeId) {
        if let Some(handler) = tree.kind(node).name().and_then(|n| self.handlers.get_mut(n)) {
            handler.enter_rule(tree, node);
        }
    }

    fn exit_rule(&mut self, tree: &Tree, node: NodeId) {
        if let Some(handler) = tree.kind(node).name().and_then(|n| self.handlers.get_mut(n)) {
            handler.exit_rule(tree, node);
        }
    }
}
