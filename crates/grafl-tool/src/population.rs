use std::fs;
use std::path::{Path, PathBuf};

use grafl_runtime::codec::{decode_wire, encode_wire};
use grafl_runtime::Individual;
use rand::rngs::StdRng;
use rand::Rng;

use crate::error::Result;

/// Supplies donor and recipient individuals to the engine.
///
/// Selection always hands out an owned individual, cloned or decoded from
/// the shared store; stored trees are never mutated in place.
pub trait Population {
    fn is_empty(&self) -> bool;

    fn add(&mut self, individual: Individual) -> Result<()>;

    fn select(&mut self, rng: &mut StdRng) -> Option<Individual>;
}

/// In-process population, mostly useful for tests and short-lived runs.
#[derive(Default)]
pub struct MemoryPopulation {
    individuals: Vec<Individual>,
}

impl MemoryPopulation {
    pub fn new() -> MemoryPopulation {
        MemoryPopulation::default()
    }

    pub fn with_individuals(individuals: Vec<Individual>) -> MemoryPopulation {
        MemoryPopulation { individuals }
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }
}

impl Population for MemoryPopulation {
    fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    fn add(&mut self, individual: Individual) -> Result<()> {
        self.individuals.push(individual);
        Ok(())
    }

    fn select(&mut self, rng: &mut StdRng) -> Option<Individual> {
        if self.individuals.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..self.individuals.len());
        Some(self.individuals[index].clone())
    }
}

/// File-backed population: one wire-encoded tree per file in a directory.
pub struct DirPopulation {
    directory: PathBuf,
    files: Vec<PathBuf>,
}

const TREE_EXTENSION: &str = "grft";

impl DirPopulation {
    /// Opens (and creates if needed) a population directory, picking up any
    /// trees already stored there.
    pub fn open(directory: impl AsRef<Path>) -> Result<DirPopulation> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;
        let mut files: Vec<PathBuf> = fs::read_dir(&directory)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == TREE_EXTENSION))
            .collect();
        files.sort();
        Ok(DirPopulation { directory, files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

impl Population for DirPopulation {
    fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn add(&mut self, individual: Individual) -> Result<()> {
        let bytes = encode_wire(individual.tree());
        let mut index = self.files.len();
        let path = loop {
            let candidate = self
                .directory
                .join(format!("test-{index:06}.{TREE_EXTENSION}"));
            if !candidate.exists() {
                break candidate;
            }
            index += 1;
        };
        fs::write(&path, bytes)?;
        self.files.push(path);
        Ok(())
    }

    fn select(&mut self, rng: &mut StdRng) -> Option<Individual> {
        while !self.files.is_empty() {
            let index = rng.gen_range(0..self.files.len());
            let path = &self.files[index];
            let bytes = match fs::read(path) {
                Ok(bytes) => bytes,
                Err(error) => {
                    log::warn!("dropping unreadable tree {}: {error}", path.display());
                    self.files.remove(index);
                    continue;
                }
            };
            match decode_wire(&bytes) {
                Ok(tree) => return Some(Individual::new(tree)),
                Err(error) => {
                    log::warn!("dropping corrupt tree {}: {error}", path.display());
                    self.files.remove(index);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grafl_runtime::tree::{NodeKind, Tree};
    use rand::SeedableRng;

    fn leafy(src: &str) -> Individual {
        let mut tree = Tree::new(NodeKind::rule("start"));
        let root = tree.root();
        let leaf = tree.add_node(NodeKind::leaf("A", src));
        tree.append_child(root, leaf);
        Individual::new(tree)
    }

    #[test]
    fn directory_population_round_trips_trees() {
        let dir = tempfile::tempdir().unwrap();
        let mut population = DirPopulation::open(dir.path()).unwrap();
        assert!(population.is_empty());
        population.add(leafy("a")).unwrap();
        population.add(leafy("b")).unwrap();

        let mut reopened = DirPopulation::open(dir.path()).unwrap();
        assert_eq!(reopened.len(), 2);
        let mut rng = StdRng::seed_from_u64(0);
        let individual = reopened.select(&mut rng).unwrap();
        let text: String = individual
            .tree()
            .tokens(individual.tree().root())
            .collect();
        assert!(text == "a" || text == "b");
    }

    #[test]
    fn corrupt_files_are_dropped_not_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("test-000099.grft"), b"garbage").unwrap();

        let mut population = DirPopulation::open(dir.path()).unwrap();
        assert_eq!(population.len(), 1);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(population.select(&mut rng).is_none());
        assert!(population.is_empty());
    }
}
