use indexmap::IndexSet;

/// FIFO-bounded set of recently emitted outputs, used to reject duplicate
/// test cases. A capacity of zero disables deduplication entirely.
#[derive(Debug, Default)]
pub struct Memo {
    seen: IndexSet<Vec<u8>>,
    capacity: usize,
}

impl Memo {
    pub fn new(capacity: usize) -> Memo {
        Memo {
            seen: IndexSet::new(),
            capacity,
        }
    }

    /// Records `bytes`; returns `false` when it was already present. With a
    /// zero capacity everything counts as fresh.
    pub fn insert(&mut self, bytes: &[u8]) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if self.seen.contains(bytes) {
            return false;
        }
        while self.seen.len() >= self.capacity {
            self.seen.shift_remove_index(0);
        }
        self.seen.insert(bytes.to_vec());
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
