use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Minimizing delta debugging over a set of units.
///
/// The caller drives the loop: `next_candidate` proposes a reduced
/// configuration, the caller tests it against its oracle, and `post`
/// advances. On an accepted step the trimmer rebases onto the smaller
/// configuration and restarts at split factor 2; on exhaustion of one
/// granularity the split factor doubles until singleton granularity has
/// been tried.
///
/// The optional link map encodes removal dependencies: `a -> [b, c]` means
/// dropping `a` from a candidate forces dropping `b` and `c` too.
pub struct ConfigTrimmer<T> {
    config: Vec<T>,
    links: HashMap<T, Vec<T>>,
    split: usize,
    step: usize,
    cache: HashSet<Vec<T>>,
    candidate: Option<Vec<T>>,
}

impl<T: Copy + Eq + Hash + Ord> ConfigTrimmer<T> {
    pub fn new(units: Vec<T>, links: HashMap<T, Vec<T>>) -> ConfigTrimmer<T> {
        let split = 2.min(units.len().max(1));
        ConfigTrimmer {
            config: units,
            links,
            split,
            step: 0,
            cache: HashSet::new(),
            candidate: None,
        }
    }

    /// Rough upper bound on the oracle queries left at the current
    /// granularity; drivers report it to their host.
    pub fn estimated_steps(&self) -> usize {
        self.config.len().saturating_mul(2)
    }

    /// The currently accepted (best-so-far) configuration.
    pub fn config(&self) -> &[T] {
        &self.config
    }

    /// Proposes the next untested configuration, or `None` once every
    /// granularity down to singletons has been exhausted.
    pub fn next_candidate(&mut self) -> Option<&[T]> {
        if self.config.len() <= 1 {
            return None;
        }
        loop {
            if self.step >= 2 * self.split {
                if self.split >= self.config.len() {
                    self.candidate = None;
                    return None;
                }
                self.split = (self.split * 2).min(self.config.len());
                self.step = 0;
            }
            let step = self.step;
            self.step += 1;
            let candidate = self.build_candidate(step);
            if candidate.is_empty() || candidate.len() >= self.config.len() {
                continue;
            }
            let mut normalized = candidate.clone();
            normalized.sort();
            if !self.cache.insert(normalized) {
                continue;
            }
            self.candidate = Some(candidate);
            return self.candidate.as_deref();
        }
    }

    /// Reports the oracle's verdict on the last proposed candidate and
    /// returns the updated step estimate.
    pub fn post(&mut self, success: bool) -> usize {
        if success {
            if let Some(accepted) = self.candidate.take() {
                // Anything at least as large as the accepted configuration
                // is stale now.
                self.cache.retain(|tested| tested.len() < accepted.len());
                self.config = accepted;
                self.split = 2.min(self.config.len().max(1));
                self.step = 0;
            }
        } else {
            self.candidate = None;
        }
        self.estimated_steps()
    }

    fn build_candidate(&self, step: usize) -> Vec<T> {
        let len = self.config.len();
        let bounds = |i: usize| (i * len / self.split, (i + 1) * len / self.split);
        let kept: Vec<T> = if step < self.split {
            let (lo, hi) = bounds(step);
            self.config[lo..hi].to_vec()
        } else {
            let (lo, hi) = bounds(step - self.split);
            let dropped: HashSet<T> = self.config[lo..hi].iter().copied().collect();
            self.config
                .iter()
                .copied()
                .filter(|unit| !dropped.contains(unit))
                .collect()
        };
        self.close(kept)
    }

    fn close(&self, kept: Vec<T>) -> Vec<T> {
        let mut kept_set: HashSet<T> = kept.into_iter().collect();
        loop {
            let mut changed = false;
            for (unit, forced) in &self.links {
                if !kept_set.contains(unit) {
                    for dependent in forced {
                        changed |= kept_set.remove(dependent);
                    }
                }
            }
            if !changed {
                break;
            }
        }
        // Keep the original unit order for deterministic chunking.
        self.config
            .iter()
            .copied()
            .filter(|unit| kept_set.contains(unit))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trim_to_witness(
        units: Vec<u32>,
        links: HashMap<u32, Vec<u32>>,
        witness: &[u32],
    ) -> Vec<u32> {
        let witness: HashSet<u32> = witness.iter().copied().collect();
        let mut trimmer = ConfigTrimmer::new(units, links);
        let mut queries = 0;
        while let Some(candidate) = trimmer.next_candidate() {
            let success = witness.iter().all(|w| candidate.contains(w));
            trimmer.post(success);
            queries += 1;
            assert!(queries < 10_000, "trimming does not terminate");
        }
        trimmer.config().to_vec()
    }

    #[test]
    fn converges_to_a_single_witness() {
        let result = trim_to_witness((0..16).collect(), HashMap::new(), &[11]);
        assert_eq!(result, vec![11]);
    }

    #[test]
    fn converges_to_a_scattered_witness_set() {
        let result = trim_to_witness((0..12).collect(), HashMap::new(), &[1, 7, 10]);
        assert_eq!(result, vec![1, 7, 10]);
    }

    #[test]
    fn links_keep_forcing_units_alive() {
        // Dropping 0 forces dropping 3; the witness is {3}, so 0 must stay.
        let mut links = HashMap::new();
        links.insert(0, vec![3]);
        let result = trim_to_witness((0..6).collect(), links, &[3]);
        assert_eq!(result, vec![0, 3]);
    }

    #[test]
    fn trivial_inputs_terminate_immediately() {
        let mut trimmer = ConfigTrimmer::<u32>::new(vec![], HashMap::new());
        assert!(trimmer.next_candidate().is_none());
        let mut trimmer = ConfigTrimmer::new(vec![5], HashMap::new());
        assert!(trimmer.next_candidate().is_none());
        assert_eq!(trimmer.config(), &[5]);
    }

    #[test]
    fn candidates_are_never_proposed_twice() {
        let mut trimmer = ConfigTrimmer::new((0..8).collect::<Vec<u32>>(), HashMap::new());
        let mut seen = HashSet::new();
        while let Some(candidate) = trimmer.next_candidate() {
            let mut sorted = candidate.to_vec();
            sorted.sort();
            assert!(seen.insert(sorted), "duplicate candidate {candidate:?}");
            trimmer.post(false);
        }
    }
}
