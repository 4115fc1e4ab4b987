use grafl_runtime::codec::{decode_wire, encode_wire};
use grafl_runtime::tree::NodeKind;
use grafl_runtime::{Individual, Tree};

use crate::engine::Engine;

/// libFuzzer-facing surface: the host hands encoded trees back and forth,
/// the driver decodes, evolves through the engine, and re-encodes into the
/// host's buffer.
///
/// The last `(bytes, tree)` pair is cached so the common
/// mutate-then-execute cycle decodes each input once.
pub struct LibFuzzerDriver<'g> {
    engine: Engine<'g>,
    last: Option<(Vec<u8>, Tree)>,
}

impl<'g> LibFuzzerDriver<'g> {
    pub fn new(engine: Engine<'g>) -> LibFuzzerDriver<'g> {
        LibFuzzerDriver { engine, last: None }
    }

    pub fn engine_mut(&mut self) -> &mut Engine<'g> {
        &mut self.engine
    }

    /// Decodes an incoming buffer, falling back to an empty root of the
    /// default rule when the bytes are not a valid tree.
    fn decode_cached(&mut self, data: &[u8]) -> Tree {
        if let Some((bytes, tree)) = &self.last {
            if bytes.as_slice() == data {
                return tree.clone();
            }
        }
        match decode_wire(data) {
            Ok(tree) => {
                self.last = Some((data.to_vec(), tree.clone()));
                tree
            }
            Err(error) => {
                log::debug!("undecodable input ({error}); starting from an empty root");
                Tree::new(NodeKind::rule(self.engine.grammar().default_rule()))
            }
        }
    }

    /// Serializes the tree carried by `data` for execution by the target.
    pub fn test_one_input(&mut self, data: &[u8]) -> String {
        let tree = self.decode_cached(data);
        self.engine.serialize(&tree)
    }

    /// `LLVMFuzzerCustomMutator` backend. Returns the encoded mutant, or an
    /// empty buffer when the result would not fit in `max_size`.
    pub fn custom_mutator(&mut self, data: &[u8], max_size: usize, seed: u64) -> Vec<u8> {
        self.engine.reseed(seed);
        let recipient = Individual::new(self.decode_cached(data));
        let tree = match self.engine.mutate(recipient) {
            Ok(tree) => tree,
            Err(error) => {
                log::warn!("mutation failed: {error}");
                return Vec::new();
            }
        };
        self.encode_bounded(tree, max_size)
    }

    /// `LLVMFuzzerCustomCrossOver` backend.
    pub fn custom_cross_over(
        &mut self,
        data: &[u8],
        other: &[u8],
        max_size: usize,
        seed: u64,
    ) -> Vec<u8> {
        self.engine.reseed(seed);
        let recipient = Individual::new(self.decode_cached(data));
        let donor = Individual::new(match decode_wire(other) {
            Ok(tree) => tree,
            Err(_) => Tree::new(NodeKind::rule(self.engine.grammar().default_rule())),
        });
        let tree = match self.engine.recombine(recipient, donor) {
            Ok(tree) => tree,
            Err(error) => {
                log::warn!("recombination failed: {error}");
                return Vec::new();
            }
        };
        self.encode_bounded(tree, max_size)
    }

    fn encode_bounded(&mut self, tree: Tree, max_size: usize) -> Vec<u8> {
        let encoded = encode_wire(&tree);
        if encoded.len() > max_size {
            // A truncated encoding would only decode as corrupt, so skip.
            log::debug!(
                "encoded tree ({} bytes) exceeds the host buffer ({max_size})",
                encoded.len()
            );
            return Vec::new();
        }
        self.last = Some((encoded.clone(), tree));
        encoded
    }
}
