#![no_main]
use std::sync::Mutex;

use grafl_fuzz::grammar;
use grafl_runtime::Grammar;
use grafl_tool::drivers::LibFuzzerDriver;
use grafl_tool::{Engine, ToolConfig};
use libfuzzer_sys::{fuzz_crossover, fuzz_mutator, fuzz_target};
use once_cell::sync::Lazy;

static GRAMMAR: Lazy<Grammar> = Lazy::new(grammar);
static DRIVER: Lazy<Mutex<LibFuzzerDriver<'static>>> = Lazy::new(|| {
    drop(env_logger::try_init());
    let config = ToolConfig::from_env().unwrap_or_else(|error| {
        log::warn!("invalid GRAFL_* configuration ({error}); using defaults");
        ToolConfig::default()
    });
    Mutex::new(LibFuzzerDriver::new(config.configure(Engine::new(&GRAMMAR))))
});

fuzz_target!(|data: &[u8]| {
    let test = DRIVER.lock().unwrap().test_one_input(data);
    // The demo grammar only emits ASCII arithmetic.
    assert!(test.is_ascii());
});

fuzz_mutator!(|data: &mut [u8], size: usize, max_size: usize, seed: u32| {
    let mut driver = DRIVER.lock().unwrap();
    let budget = max_size.min(data.len());
    let input = data[..size.min(data.len())].to_vec();
    let out = driver.custom_mutator(&input, budget, seed as u64);
    if out.is_empty() {
        return size;
    }
    data[..out.len()].copy_from_slice(&out);
    out.len()
});

fuzz_crossover!(|data1: &[u8], data2: &[u8], out: &mut [u8], seed: u32| {
    let mut driver = DRIVER.lock().unwrap();
    let bytes = driver.custom_cross_over(data1, data2, out.len(), seed as u64);
    let copied = bytes.len().min(out.len());
    out[..copied].copy_from_slice(&bytes[..copied]);
    copied
});
