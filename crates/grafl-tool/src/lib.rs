#![doc = include_str!("../README.md")]

pub mod config;
pub mod drivers;
mod engine;
mod error;
mod memo;
mod mutate;
mod population;
mod recombine;
mod subtree_pool;
pub mod trim;

pub use config::ToolConfig;
pub use engine::{Engine, Transformer, GENERATORS, MUTATORS, RECOMBINERS};
pub use error::{Error, Result};
pub use population::{DirPopulation, MemoryPopulation, Population};
pub use subtree_pool::SubTreePopulation;
pub use trim::{ConfigTrimmer, ContentTrimmer};
