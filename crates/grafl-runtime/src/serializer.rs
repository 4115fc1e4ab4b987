use crate::tree::Tree;

/// Turns a derivation tree into the emitted test case.
pub type Serializer = fn(&Tree) -> String;

/// Concatenates the tree's tokens without separators. The default.
pub fn concat_serializer(tree: &Tree) -> String {
    tree.tokens(tree.root()).collect()
}

/// Joins the tree's tokens with single spaces.
pub fn space_serializer(tree: &Tree) -> String {
    tree.tokens(tree.root()).collect::<Vec<_>>().join(" ")
}
