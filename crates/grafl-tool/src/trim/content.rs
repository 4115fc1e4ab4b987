use std::collections::HashMap;
use std::hash::Hash;

use indexmap::IndexMap;

use super::config::ConfigTrimmer;

const DEFAULT_CACHE_BYTES: usize = 1 << 20;
const DEFAULT_MAX_STEPS: usize = 1024;

/// Content-aware layer over [`ConfigTrimmer`].
///
/// Candidates are serialized with a caller-supplied function and
/// deduplicated by a caller-supplied hash: two configurations producing the
/// same content are tested at most once. The content cache is bounded by
/// accumulated byte size with FIFO eviction, and the whole session is capped
/// at a step budget; once the budget is hit, the best-so-far configuration
/// stands.
pub struct ContentTrimmer<T> {
    inner: ConfigTrimmer<T>,
    serializer: Box<dyn FnMut(&[T]) -> Vec<u8>>,
    hasher: Box<dyn Fn(&[u8]) -> u64>,
    seen: IndexMap<u64, usize>,
    seen_bytes: usize,
    cache_limit: usize,
    steps: usize,
    max_steps: usize,
}

impl<T: Copy + Eq + Hash + Ord> ContentTrimmer<T> {
    pub fn new(
        units: Vec<T>,
        links: HashMap<T, Vec<T>>,
        serializer: impl FnMut(&[T]) -> Vec<u8> + 'static,
        hasher: impl Fn(&[u8]) -> u64 + 'static,
    ) -> ContentTrimmer<T> {
        ContentTrimmer {
            inner: ConfigTrimmer::new(units, links),
            serializer: Box::new(serializer),
            hasher: Box::new(hasher),
            seen: IndexMap::new(),
            seen_bytes: 0,
            cache_limit: DEFAULT_CACHE_BYTES,
            steps: 0,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn max_steps(mut self, max_steps: usize) -> ContentTrimmer<T> {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn cache_limit(mut self, bytes: usize) -> ContentTrimmer<T> {
        self.cache_limit = bytes;
        self
    }

    /// Step estimate for host trim protocols.
    pub fn estimated_steps(&self) -> usize {
        self.inner.estimated_steps().min(self.max_steps)
    }

    pub fn steps_taken(&self) -> usize {
        self.steps
    }

    /// The currently accepted configuration.
    pub fn config(&self) -> &[T] {
        self.inner.config()
    }

    /// Serialized content of the next candidate the oracle should judge, or
    /// `None` when trimming is over (exhaustion or step bound).
    pub fn next(&mut self) -> Option<Vec<u8>> {
        loop {
            if self.steps >= self.max_steps {
                log::debug!(
                    "trim step bound of {} reached, committing best-so-far",
                    self.max_steps
                );
                return None;
            }
            let candidate = self.inner.next_candidate()?.to_vec();
            let bytes = (self.serializer)(&candidate);
            let hash = (self.hasher)(&bytes);
            if self.seen.contains_key(&hash) {
                // Same content as an earlier candidate; no new information.
                self.inner.post(false);
                continue;
            }
            self.seen.insert(hash, bytes.len());
            self.seen_bytes += bytes.len();
            while self.seen_bytes > self.cache_limit && !self.seen.is_empty() {
                let (_, evicted) = self.seen.shift_remove_index(0).expect("cache not empty");
                self.seen_bytes -= evicted;
            }
            self.steps += 1;
            return Some(bytes);
        }
    }

    /// Verdict for the candidate returned by the last `next` call.
    pub fn post(&mut self, success: bool) -> usize {
        self.inner.post(success).min(self.max_steps)
    }
}
