use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::Rng;

use crate::error::{Error, Result};
use crate::tree::{NodeId, Tree};

/// Probability used for quantifier continuation when no weights file
/// overrides it.
pub const DEFAULT_QUANTIFY_PROB: f64 = 0.5;

/// The decision oracle consulted during generation.
///
/// All three operations have stateless defaults: weighted random alternative
/// selection, Bernoulli quantifier continuation, and uniform charset picks.
/// The `node` argument is the rule node (or lexer leaf) the decision is made
/// for, so implementations can inspect the partially built tree.
pub trait Model {
    /// Chooses an alternative given effective weights. A zero weight marks an
    /// infeasible alternative. If the weights sum to zero, the last index is
    /// returned.
    fn choice(
        &mut self,
        rng: &mut StdRng,
        tree: &Tree,
        node: NodeId,
        alternation_idx: usize,
        weights: &[f64],
    ) -> usize {
        let _ = (tree, node, alternation_idx);
        weighted_choice(rng, weights)
    }

    /// Decides whether to take one more repetition beyond the quantifier's
    /// minimum. Only consulted while `start <= count` and the budget still
    /// admits another repetition.
    #[allow(clippy::too_many_arguments)]
    fn quantify(
        &mut self,
        rng: &mut StdRng,
        tree: &Tree,
        node: NodeId,
        quant_idx: usize,
        count: usize,
        start: usize,
        stop: Option<usize>,
        prob: f64,
    ) -> bool {
        let _ = (tree, node, quant_idx, count, start, stop);
        rng.gen_bool(prob.clamp(0.0, 1.0))
    }

    /// Picks one character from a charset.
    fn charset(
        &mut self,
        rng: &mut StdRng,
        tree: &Tree,
        node: NodeId,
        set_idx: usize,
        chars: &[char],
    ) -> char {
        let _ = (tree, node, set_idx);
        debug_assert!(!chars.is_empty());
        chars
            .get(rng.gen_range(0..chars.len().max(1)))
            .copied()
            .unwrap_or('\u{fffd}')
    }
}

pub(crate) fn weighted_choice(rng: &mut StdRng, weights: &[f64]) -> usize {
    let total: f64 = weights.iter().filter(|w| w.is_finite() && **w > 0.0).sum();
    if total <= 0.0 {
        return weights.len().saturating_sub(1);
    }
    let mut draw = rng.gen::<f64>() * total;
    for (i, &w) in weights.iter().enumerate() {
        if w.is_finite() && w > 0.0 {
            draw -= w;
            if draw <= 0.0 {
                return i;
            }
        }
    }
    weights.len() - 1
}

/// The stateless default oracle.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultModel;

impl Model for DefaultModel {}

/// Static weight overrides, usually loaded from a weights file:
///
/// ```json
/// {"alts": {"rule": {"0": {"1": 10.0}}}, "quants": {"rule": {"0": 0.9}}}
/// ```
#[derive(Debug, Default, Clone)]
pub struct WeightTable {
    alts: HashMap<(String, usize, usize), f64>,
    quants: HashMap<(String, usize), f64>,
}

impl WeightTable {
    pub fn from_json(text: &str) -> Result<WeightTable> {
        #[derive(serde::Deserialize)]
        struct Raw {
            #[serde(default)]
            alts: HashMap<String, HashMap<String, HashMap<String, f64>>>,
            #[serde(default)]
            quants: HashMap<String, HashMap<String, f64>>,
        }

        fn index(key: &str) -> Result<usize> {
            key.parse()
                .map_err(|_| Error::InvalidConfig(format!("non-numeric weight key: {key:?}")))
        }

        let raw: Raw =
            serde_json::from_str(text).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let mut table = WeightTable::default();
        for (rule, alt_sets) in raw.alts {
            for (alt_set, alts) in alt_sets {
                let alt_set = index(&alt_set)?;
                for (alt, weight) in alts {
                    table
                        .alts
                        .insert((rule.clone(), alt_set, index(&alt)?), weight);
                }
            }
        }
        for (rule, quants) in raw.quants {
            for (quant, prob) in quants {
                table.quants.insert((rule.clone(), index(&quant)?), prob);
            }
        }
        Ok(table)
    }

    pub fn set_alt_weight(&mut self, rule: &str, alt_set: usize, alt: usize, weight: f64) {
        self.alts.insert((rule.to_owned(), alt_set, alt), weight);
    }

    pub fn set_quantify_prob(&mut self, rule: &str, quant: usize, prob: f64) {
        self.quants.insert((rule.to_owned(), quant), prob);
    }

    pub fn alt_weight(&self, rule: &str, alt_set: usize, alt: usize) -> Option<f64> {
        self.alts.get(&(rule.to_owned(), alt_set, alt)).copied()
    }

    pub fn quantify_prob(&self, rule: &str, quant: usize) -> Option<f64> {
        self.quants.get(&(rule.to_owned(), quant)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.alts.is_empty() && self.quants.is_empty()
    }
}

/// Pre-multiplies `choice` weights by a per-`(rule, alt_set, alt)` table and
/// overrides the `quantify` probability per `(rule, quant)`, then delegates
/// to the wrapped model.
pub struct WeightedModel<M> {
    inner: M,
    table: WeightTable,
}

impl<M: Model> WeightedModel<M> {
    pub fn new(inner: M, table: WeightTable) -> WeightedModel<M> {
        WeightedModel { inner, table }
    }
}

impl<M: Model> Model for WeightedModel<M> {
    fn choice(
        &mut self,
        rng: &mut StdRng,
        tree: &Tree,
        node: NodeId,
        alternation_idx: usize,
        weights: &[f64],
    ) -> usize {
        let scaled: Vec<f64> = match tree.kind(node).name() {
            Some(rule) => weights
                .iter()
                .enumerate()
                .map(|(alt, &w)| {
                    w * self
                        .table
                        .alt_weight(rule, alternation_idx, alt)
                        .unwrap_or(1.0)
                })
                .collect(),
            None => weights.to_vec(),
        };
        self.inner.choice(rng, tree, node, alternation_idx, &scaled)
    }

    #[allow(clippy::too_many_arguments)]
    fn quantify(
        &mut self,
        rng: &mut StdRng,
        tree: &Tree,
        node: NodeId,
        quant_idx: usize,
        count: usize,
        start: usize,
        stop: Option<usize>,
        prob: f64,
    ) -> bool {
        let prob = tree
            .kind(node)
            .name()
            .and_then(|rule| self.table.quantify_prob(rule, quant_idx))
            .unwrap_or(prob);
        self.inner
            .quantify(rng, tree, node, quant_idx, count, start, stop, prob)
    }

    fn charset(
        &mut self,
        rng: &mut StdRng,
        tree: &Tree,
        node: NodeId,
        set_idx: usize,
        chars: &[char],
    ) -> char {
        self.inner.charset(rng, tree, node, set_idx, chars)
    }
}

/// Routes decisions to a per-rule override model by the rule name of the
/// deciding node, falling back to a default model for everything else.
pub struct DispatchingModel {
    default: Box<dyn Model>,
    by_rule: HashMap<String, Box<dyn Model>>,
}

impl DispatchingModel {
    pub fn new(default: impl Model + 'static) -> DispatchingModel {
        DispatchingModel {
            default: Box::new(default),
            by_rule: HashMap::new(),
        }
    }

    pub fn override_rule(mut self, rule: &str, model: impl Model + 'static) -> DispatchingModel {
        self.by_rule.insert(rule.to_owned(), Box::new(model));
        self
    }

    fn target(&mut self, tree: &Tree, node: NodeId) -> &mut dyn Model {
        match tree.kind(node).name().and_then(|n| self.by_rule.get_mut(n)) {
            Some(model) => model.as_mut(),
            None => self.default.as_mut(),
        }
    }
}

impl Model for DispatchingModel {
    fn choice(
        &mut self,
        rng: &mut StdRng,
        tree: &Tree,
        node: NodeId,
        alternation_idx: usize,
        weights: &[f64],
    ) -> usize {
        self.target(tree, node)
            .choice(rng, tree, node, alternation_idx, weights)
    }

    #[allow(clippy::too_many_arguments)]
    fn quantify(
        &mut self,
        rng: &mut StdRng,
        tree: &Tree,
        node: NodeId,
        quant_idx: usize,
        count: usize,
        start: usize,
        stop: Option<usize>,
        prob: f64,
    ) -> bool {
        self.target(tree, node)
            .quantify(rng, tree, node, quant_idx, count, start, stop, prob)
    }

    fn charset(
        &mut self,
        rng: &mut StdRng,
        tree: &Tree,
        node: NodeId,
        set_idx: usize,
        chars: &[char],
    ) -> char {
        self.target(tree, node).charset(rng, tree, node, set_idx, chars)
    }
}
