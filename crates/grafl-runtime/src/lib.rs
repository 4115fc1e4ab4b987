#![doc = include_str!("../README.md")]

pub mod annotations;
pub mod codec;
mod error;
mod generate;
mod grammar;
mod individual;
mod listener;
mod model;
mod serializer;
pub mod tree;

pub use annotations::{node_key, Annotations, NodeInfo, NodeKey};
pub use error::{Error, Result};
pub use generate::{generate, GenCtx, QuantCtx};
pub use grammar::{Grammar, GrammarBuilder, RuleFn};
pub use individual::Individual;
pub use listener::{DispatchingListener, Listener};
pub use model::{
    DefaultModel, DispatchingModel, Model, WeightTable, WeightedModel, DEFAULT_QUANTIFY_PROB,
};
pub use serializer::{concat_serializer, space_serializer, Serializer};
pub use tree::{NodeId, NodeKind, Size, Tree, INVALID_NAME, ROOT_NAME};
