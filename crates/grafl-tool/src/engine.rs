use grafl_runtime::{
    generate, DefaultModel, Grammar, Individual, Listener, Model, Serializer, Size, Tree,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::Result;
use crate::memo::Memo;
use crate::population::Population;
use crate::subtree_pool::SubTreePopulation;

/// Post-processing hook applied to every created tree, in registration
/// order.
pub type Transformer = fn(&mut Tree);

/// Creator names accepted by the allowlist/blocklist, grouped by role.
pub const GENERATORS: &[&str] = &["generate"];
pub const MUTATORS: &[&str] = &[
    "regenerate_rule",
    "delete_quantified",
    "replicate_quantified",
    "shuffle_quantifieds",
    "hoist_rule",
    "swap_local_nodes",
    "insert_local_node",
    "unrestricted_delete",
    "unrestricted_hoist_rule",
    "replace_from_pool",
    "insert_quantified_from_pool",
];
pub const RECOMBINERS: &[&str] = &["replace_node", "insert_quantified"];

const POOL_MUTATORS: &[&str] = &["replace_from_pool", "insert_quantified_from_pool"];

/// The evolution engine: creates trees by generation, mutation and
/// recombination, post-processes them, and memoizes emitted outputs.
///
/// One engine instance is single-threaded and owns a single seeded random
/// engine; re-seed it per call for externally driven determinism.
pub struct Engine<'g> {
    pub(crate) grammar: &'g Grammar,
    pub(crate) model: Box<dyn Model>,
    pub(crate) listeners: Vec<Box<dyn Listener>>,
    pub(crate) rng: StdRng,
    pub(crate) limit: Size,
    serializer: Serializer,
    transformers: Vec<Transformer>,
    population: Option<Box<dyn Population>>,
    pub(crate) pool: Option<SubTreePopulation>,
    memo: Memo,
    unique_attempts: usize,
    allowlist: Vec<String>,
    blocklist: Vec<String>,
}

impl<'g> Engine<'g> {
    pub fn new(grammar: &'g Grammar) -> Engine<'g> {
        Engine {
            grammar,
            model: Box::new(DefaultModel),
            listeners: Vec::new(),
            rng: StdRng::seed_from_u64(0),
            limit: Size::MAX,
            serializer: grafl_runtime::concat_serializer,
            transformers: Vec::new(),
            population: None,
            pool: None,
            memo: Memo::new(4096),
            unique_attempts: 8,
            allowlist: Vec::new(),
            blocklist: Vec::new(),
        }
    }

    pub fn model(mut self, model: impl Model + 'static) -> Engine<'g> {
        self.model = Box::new(model);
        self
    }

    pub fn listener(mut self, listener: impl Listener + 'static) -> Engine<'g> {
        self.listeners.push(Box::new(listener));
        self
    }

    pub fn seed(mut self, seed: u64) -> Engine<'g> {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Engine<'g> {
        self.limit.depth = depth;
        self
    }

    pub fn max_tokens(mut self, tokens: usize) -> Engine<'g> {
        self.limit.tokens = tokens;
        self
    }

    pub fn serializer(mut self, serializer: Serializer) -> Engine<'g> {
        self.serializer = serializer;
        self
    }

    pub fn transformer(mut self, transformer: Transformer) -> Engine<'g> {
        self.transformers.push(transformer);
        self
    }

    pub fn population(mut self, population: impl Population + 'static) -> Engine<'g> {
        self.population = Some(Box::new(population));
        self
    }

    pub fn subtree_pool(mut self, pool: SubTreePopulation) -> Engine<'g> {
        self.pool = Some(pool);
        self
    }

    pub fn memo_size(mut self, capacity: usize) -> Engine<'g> {
        self.memo = Memo::new(capacity);
        self
    }

    pub fn unique_attempts(mut self, attempts: usize) -> Engine<'g> {
        self.unique_attempts = attempts.max(1);
        self
    }

    /// Restricts creators to the given names. An empty allowlist admits
    /// every creator not blocklisted.
    pub fn allowlist(mut self, names: &[&str]) -> Engine<'g> {
        self.allowlist = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Disables the given creators. Applied after the allowlist.
    pub fn blocklist(mut self, names: &[&str]) -> Engine<'g> {
        self.blocklist
            .extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }

    pub fn limit(&self) -> Size {
        self.limit
    }

    pub fn memo_len(&self) -> usize {
        self.memo.len()
    }

    pub fn serialize(&self, tree: &Tree) -> String {
        (self.serializer)(tree)
    }

    /// Deterministically re-seeds the engine's random engine.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn pool_mut(&mut self) -> Option<&mut SubTreePopulation> {
        self.pool.as_mut()
    }

    /// Stores a tree in the population, when one is attached.
    pub fn keep_tree(&mut self, tree: Tree) -> Result<()> {
        match &mut self.population {
            Some(population) => population.add(Individual::new(tree)),
            None => Ok(()),
        }
    }

    /// Generates a fresh tree for the default rule under the current limit.
    pub fn generate_tree(&mut self) -> Result<Tree> {
        self.generate_rule_at(self.grammar.default_rule(), Size::ZERO)
    }

    pub(crate) fn generate_rule_at(&mut self, rule: &str, start: Size) -> Result<Tree> {
        let rule = rule.to_owned();
        let tree = generate(
            self.grammar,
            self.model.as_mut(),
            &mut self.listeners,
            &mut self.rng,
            &rule,
            self.limit,
            start,
        )?;
        Ok(tree)
    }

    /// One pass of the creation pipeline: pick a creator set based on what
    /// the population can supply, try creators in uniformly random order
    /// until one succeeds, then apply the transformers.
    pub fn create_tree(&mut self) -> Result<Tree> {
        let recipient = self.select_individual();
        let donor = match &recipient {
            Some(_) => self.select_individual(),
            None => None,
        };
        let mut names = self.active_generators();
        if recipient.is_some() {
            names.extend(self.active_mutators());
            if donor.is_some() {
                names.extend(self.active_recombiners());
            }
        }
        self.run_creators(names, recipient, donor)
    }

    /// Mutation-only creation over a caller-supplied recipient.
    pub fn mutate(&mut self, recipient: Individual) -> Result<Tree> {
        let names = self.active_mutators();
        self.run_creators(names, Some(recipient), None)
    }

    /// Recombination-only creation over caller-supplied individuals.
    pub fn recombine(&mut self, recipient: Individual, donor: Individual) -> Result<Tree> {
        let names = self.active_recombiners();
        self.run_creators(names, Some(recipient), Some(donor))
    }

    /// Creates a tree and serializes it, retrying on memoized duplicates up
    /// to the configured number of unique attempts.
    pub fn emit(&mut self) -> Result<(Tree, String)> {
        let mut last = None;
        for attempt in 1..=self.unique_attempts {
            let tree = self.create_tree()?;
            let text = (self.serializer)(&tree);
            if self.memo.insert(text.as_bytes()) {
                return Ok((tree, text));
            }
            log::debug!("duplicate test case (attempt {attempt}/{})", self.unique_attempts);
            last = Some((tree, text));
        }
        Ok(last.expect("at least one attempt runs"))
    }

    fn run_creators(
        &mut self,
        mut names: Vec<&'static str>,
        mut recipient: Option<Individual>,
        mut donor: Option<Individual>,
    ) -> Result<Tree> {
        names.shuffle(&mut self.rng);
        for name in names {
            if name == "generate" {
                let mut tree = self.generate_tree()?;
                self.apply_transformers(&mut tree);
                return Ok(tree);
            }
            let success = match recipient.as_mut() {
                Some(recipient) => self.run_mutation(name, recipient, donor.as_mut())?,
                None => false,
            };
            if success {
                let mut tree = recipient.take().expect("recipient present").into_tree();
                self.apply_transformers(&mut tree);
                return Ok(tree);
            }
            log::debug!("creator {name} found no feasible site");
        }
        // Creator set exhausted: hand back the untouched recipient, or fall
        // back to plain generation when there is nothing to hand back.
        let mut tree = match recipient {
            Some(recipient) => recipient.into_tree(),
            None => self.generate_tree()?,
        };
        self.apply_transformers(&mut tree);
        Ok(tree)
    }

    fn run_mutation(
        &mut self,
        name: &str,
        recipient: &mut Individual,
        donor: Option<&mut Individual>,
    ) -> Result<bool> {
        match name {
            "regenerate_rule" => self.regenerate_rule(recipient),
            "delete_quantified" => Ok(self.delete_quantified(recipient)),
            "replicate_quantified" => Ok(self.replicate_quantified(recipient)),
            "shuffle_quantifieds" => Ok(self.shuffle_quantifieds(recipient)),
            "hoist_rule" => Ok(self.hoist_rule(recipient)),
            "swap_local_nodes" => Ok(self.swap_local_nodes(recipient)),
            "insert_local_node" => Ok(self.insert_local_node(recipient)),
            "unrestricted_delete" => Ok(self.unrestricted_delete(recipient)),
            "unrestricted_hoist_rule" => Ok(self.unrestricted_hoist_rule(recipient)),
            "replace_from_pool" => Ok(self.replace_from_pool(recipient)),
            "insert_quantified_from_pool" => Ok(self.insert_quantified_from_pool(recipient)),
            "replace_node" => Ok(donor.is_some_and(|donor| self.replace_node(recipient, donor))),
            "insert_quantified" => {
                Ok(donor.is_some_and(|donor| self.insert_quantified(recipient, donor)))
            }
            other => {
                log::debug!("ignoring unknown creator {other:?}");
                Ok(false)
            }
        }
    }

    fn apply_transformers(&self, tree: &mut Tree) {
        for transformer in &self.transformers {
            transformer(tree);
        }
    }

    fn select_individual(&mut self) -> Option<Individual> {
        let population = self.population.as_mut()?;
        if population.is_empty() {
            return None;
        }
        population.select(&mut self.rng)
    }

    fn enabled(&self, name: &str) -> bool {
        (self.allowlist.is_empty() || self.allowlist.iter().any(|allowed| allowed == name))
            && !self.blocklist.iter().any(|blocked| blocked == name)
    }

    fn active_generators(&self) -> Vec<&'static str> {
        GENERATORS
            .iter()
            .copied()
            .filter(|name| self.enabled(name))
            .collect()
    }

    fn active_mutators(&self) -> Vec<&'static str> {
        MUTATORS
            .iter()
            .copied()
            .filter(|name| self.enabled(name))
            .filter(|name| self.pool.is_some() || !POOL_MUTATORS.contains(name))
            .collect()
    }

    fn active_recombiners(&self) -> Vec<&'static str> {
        RECOMBINERS
            .iter()
            .copied()
            .filter(|name| self.enabled(name))
            .collect()
    }
}
