//! Exercises the generated `afl_custom_*` entry points end to end.

use std::ptr;

use grafl_runtime::codec::{decode_wire, encode_wire};
use grafl_runtime::tree::Size;
use grafl_runtime::{GenCtx, Grammar};
use grafl_tool::Engine;

fn word(ctx: &mut GenCtx<'_>) -> grafl_runtime::Result<()> {
    ctx.rule("word", |ctx| {
        let mut more = ctx.quantifier(0, 1, None);
        while more.more(ctx) {
            more.repetition(ctx, |ctx| ctx.token("A", "a").map(|_| ()))?;
        }
        Ok(())
    })?;
    Ok(())
}

fn build_grammar() -> Grammar {
    Grammar::builder("word")
        .rule("word", word, Size::new(2, 1))
        .quantifier("word", 0, Size::new(1, 1))
        .build()
}

grafl_afl::afl_custom_mutator!(build_grammar);

#[test]
fn the_c_abi_surface_mutates_and_trims() {
    let seed = {
        let grammar = build_grammar();
        let mut engine = Engine::new(&grammar).seed(4).max_tokens(16);
        encode_wire(&engine.generate_tree().unwrap())
    };

    unsafe {
        let state = afl_custom_init(ptr::null_mut(), 42);
        assert!(!state.is_null());

        let mut out: *mut u8 = ptr::null_mut();
        let len = afl_custom_fuzz(
            state,
            seed.as_ptr() as *mut u8,
            seed.len(),
            &mut out,
            ptr::null_mut(),
            0,
            1 << 16,
        );
        assert!(len > 0);
        let mutant = std::slice::from_raw_parts(out, len);
        decode_wire(mutant).unwrap().check_invariants().unwrap();

        let total = afl_custom_init_trim(state, seed.as_ptr() as *mut u8, seed.len());
        assert!(total >= 1);
        let mut step = 0;
        while step < total {
            let mut trim_out: *mut u8 = ptr::null_mut();
            let trim_len = afl_custom_trim(state, &mut trim_out);
            assert!(trim_len > 0);
            let candidate = std::slice::from_raw_parts(trim_out, trim_len);
            let tree = decode_wire(candidate).unwrap();
            let success = tree.subtree_size(tree.root()).tokens >= 1;
            step = afl_custom_post_trim(state, u8::from(success));
        }

        afl_custom_deinit(state);
    }
}

#[test]
fn state_is_a_reusable_opaque_pointer() {
    unsafe {
        let state = afl_custom_init(ptr::null_mut(), 7);
        let garbage = b"definitely not a tree";
        let mut out: *mut u8 = ptr::null_mut();
        // Corrupt input falls back to an empty root, which mutation regrows.
        let len = afl_custom_fuzz(
            state,
            garbage.as_ptr() as *mut u8,
            garbage.len(),
            &mut out,
            ptr::null_mut(),
            0,
            1 << 16,
        );
        assert!(len > 0);
        decode_wire(std::slice::from_raw_parts(out, len))
            .unwrap()
            .check_invariants()
            .unwrap();
        afl_custom_deinit(state);
    }
}

#[test]
fn queue_entries_feed_the_pool_via_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue-entry");
    let seed = {
        let grammar = build_grammar();
        let mut engine = Engine::new(&grammar).seed(9).max_tokens(16);
        encode_wire(&engine.generate_tree().unwrap())
    };
    std::fs::write(&path, &seed).unwrap();
    let c_path = std::ffi::CString::new(path.to_str().unwrap()).unwrap();

    unsafe {
        let state = afl_custom_init(ptr::null_mut(), 1);
        let status = afl_custom_queue_new_entry(state, c_path.as_ptr(), ptr::null());
        assert_eq!(status, 0);
        afl_custom_deinit(state);
    }
}
