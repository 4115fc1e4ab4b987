#![no_main]
use grafl_runtime::codec::{decode_wire, encode_wire};
use libfuzzer_sys::fuzz_target;

// Hostile bytes must either decode into a tree satisfying every structural
// invariant, or fail cleanly; valid trees must round-trip the codec.
fuzz_target!(|data: &[u8]| {
    drop(env_logger::try_init());

    if let Ok(tree) = decode_wire(data) {
        tree.check_invariants().expect("decoded tree violates invariants");
        let bytes = encode_wire(&tree);
        let again = decode_wire(&bytes).expect("re-encoded tree must decode");
        assert!(tree.subtree_eq(tree.root(), &again, again.root()));
    }
});
