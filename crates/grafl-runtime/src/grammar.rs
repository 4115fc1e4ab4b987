use std::collections::HashMap;

use indexmap::IndexMap;

use crate::generate::GenCtx;
use crate::tree::Size;

/// A per-rule generator routine, as emitted by the grammar front-end.
pub type RuleFn = fn(&mut GenCtx<'_>) -> crate::Result<()>;

/// The compiled form of a grammar: one generator function per rule plus the
/// static size tables used to prune infeasible decisions.
///
/// Size conventions:
/// - `rule_sizes[name]` is the minimum `(depth, tokens)` of a complete
///   subtree for `name`, counting the rule's own level (a rule expanding to
///   a single token has depth 2: the rule plus the leaf).
/// - `alt_sizes[(rule, alt_set)][alt]` is the minimum size of the given
///   alternative relative to its rule: depth is the deepest mandatory symbol
///   of the alternative, tokens the sum of mandatory tokens.
/// - `quant_sizes[(rule, quant)]` is the minimum size of a single expansion
///   of the quantifier, relative to its rule.
pub struct Grammar {
    default_rule: String,
    rules: IndexMap<String, RuleFn>,
    rule_sizes: HashMap<String, Size>,
    alt_sizes: HashMap<(String, usize), Vec<Size>>,
    quant_sizes: HashMap<(String, usize), Size>,
}

impl Grammar {
    pub fn builder(default_rule: &str) -> GrammarBuilder {
        GrammarBuilder {
            grammar: Grammar {
                default_rule: default_rule.to_owned(),
                rules: IndexMap::new(),
                rule_sizes: HashMap::new(),
                alt_sizes: HashMap::new(),
                quant_sizes: HashMap::new(),
            },
        }
    }

    pub fn default_rule(&self) -> &str {
        &self.default_rule
    }

    pub fn has_rule(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    pub(crate) fn rule_fn(&self, name: &str) -> Option<RuleFn> {
        self.rules.get(name).copied()
    }

    /// Minimum size of a complete subtree for `name`. Unknown names cost
    /// nothing, which keeps budget checks permissive for foreign trees.
    pub fn rule_size(&self, name: &str) -> Size {
        self.rule_sizes.get(name).copied().unwrap_or(Size::ZERO)
    }

    pub fn alt_sizes(&self, rule: &str, alt_set: usize) -> &[Size] {
        self.alt_sizes
            .get(&(rule.to_owned(), alt_set))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn quant_size(&self, rule: &str, quant: usize) -> Size {
        self.quant_sizes
            .get(&(rule.to_owned(), quant))
            .copied()
            .unwrap_or(Size::ZERO)
    }
}

pub struct GrammarBuilder {
    grammar: Grammar,
}

impl GrammarBuilder {
    /// Registers a rule's generator function and its minimum subtree size.
    pub fn rule(mut self, name: &str, f: RuleFn, min_size: Size) -> GrammarBuilder {
        self.grammar.rules.insert(name.to_owned(), f);
        self.grammar.rule_sizes.insert(name.to_owned(), min_size);
        self
    }

    /// Registers the per-alternative minimum sizes of one alternation.
    pub fn alternation(mut self, rule: &str, alt_set: usize, sizes: &[Size]) -> GrammarBuilder {
        self.grammar
            .alt_sizes
            .insert((rule.to_owned(), alt_set), sizes.to_vec());
        self
    }

    /// Registers the minimum size of one expansion of a quantifier.
    pub fn quantifier(mut self, rule: &str, quant: usize, size: Size) -> GrammarBuilder {
        self.grammar
            .quant_sizes
            .insert((rule.to_owned(), quant), size);
        self
    }

    pub fn build(self) -> Grammar {
        self.grammar
    }
}
