use std::fs;
use std::path::PathBuf;

use crate::engine::Engine;
use crate::error::Result;

/// Standalone test generation: create, serialize, optionally persist.
pub struct BlackboxDriver<'g> {
    engine: Engine<'g>,
    out_pattern: Option<String>,
    keep_trees: bool,
}

impl<'g> BlackboxDriver<'g> {
    pub fn new(engine: Engine<'g>) -> BlackboxDriver<'g> {
        BlackboxDriver {
            engine,
            out_pattern: None,
            keep_trees: false,
        }
    }

    /// Output file pattern; every `%d` is replaced with the test index.
    /// Without a pattern, tests are only returned to the caller.
    pub fn out_pattern(mut self, pattern: impl Into<String>) -> BlackboxDriver<'g> {
        self.out_pattern = Some(pattern.into());
        self
    }

    /// Also store every created tree in the engine's population.
    pub fn keep_trees(mut self, keep: bool) -> BlackboxDriver<'g> {
        self.keep_trees = keep;
        self
    }

    pub fn engine_mut(&mut self) -> &mut Engine<'g> {
        &mut self.engine
    }

    /// Creates the `index`-th test case. Returns the serialized test and,
    /// when an output pattern is configured, the path it was written to.
    pub fn create_test(&mut self, index: usize) -> Result<(String, Option<PathBuf>)> {
        let (tree, test) = self.engine.emit()?;
        if self.keep_trees {
            self.engine.keep_tree(tree)?;
        }
        let path = match &self.out_pattern {
            Some(pattern) => {
                let path = PathBuf::from(pattern.replace("%d", &index.to_string()));
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        fs::create_dir_all(parent)?;
                    }
                }
                fs::write(&path, &test)?;
                Some(path)
            }
            None => None,
        };
        Ok((test, path))
    }
}
