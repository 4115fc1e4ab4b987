use crate::annotations::Annotations;
use crate::tree::Tree;

/// A tree paired with lazily computed [`Annotations`].
///
/// Any mutable access to the tree invalidates the annotations; they are
/// rebuilt on the next request.
#[derive(Debug)]
pub struct Individual {
    tree: Tree,
    annotations: Option<Annotations>,
}

impl Individual {
    pub fn new(tree: Tree) -> Individual {
        Individual {
            tree,
            annotations: None,
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Mutable access to the tree. Drops the cached annotations.
    pub fn tree_mut(&mut self) -> &mut Tree {
        self.annotations = None;
        &mut self.tree
    }

    pub fn into_tree(self) -> Tree {
        self.tree
    }

    pub fn annotations(&mut self) -> &Annotations {
        let tree = &self.tree;
        self.annotations
            .get_or_insert_with(|| Annotations::build(tree))
    }

    /// Borrows the tree and its annotations together, building the
    /// annotations first if needed. Useful when candidate discovery needs
    /// both at once.
    pub fn parts(&mut self) -> (&Tree, &Annotations) {
        if self.annotations.is_none() {
            self.annotations = Some(Annotations::build(&self.tree));
        }
        (
            &self.tree,
            self.annotations.as_ref().expect("annotations just built"),
        )
    }
}

impl Clone for Individual {
    fn clone(&self) -> Individual {
        Individual::new(self.tree.clone())
    }
}
