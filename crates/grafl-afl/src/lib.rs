//! AFL++ custom mutator surface.
//!
//! [`AflDriver`] is the safe core: grammar-aware mutation over encoded
//! trees, a subtree pool fed from the queue, and a grammar-aware trimmer
//! wired to AFL++'s `init_trim`/`trim`/`post_trim` protocol. The
//! [`afl_custom_mutator!`] macro instantiates the `extern "C"` entry points
//! for one grammar so the crate can be loaded via `AFL_CUSTOM_MUTATOR_LIBRARY`.
//!
//! The engine here deliberately blocklists the population recombiners
//! (`replace_node`, `insert_quantified`); cross-pollination happens through
//! the pool-backed mutators instead, fed by `queue_new_entry`.

use grafl_runtime::codec::{decode_wire, encode_wire};
use grafl_runtime::tree::NodeKind;
use grafl_runtime::{Individual, NodeId, Tree};
use grafl_tool::trim::{reduce_tree, tree_trimmer, ContentTrimmer};
use grafl_tool::{Engine, SubTreePopulation};

/// Recombiners that are replaced by the pool-backed variants under AFL++.
const BLOCKED_RECOMBINERS: &[&str] = &["replace_node", "insert_quantified"];

struct TrimSession {
    trimmer: ContentTrimmer<NodeId>,
    source: Tree,
    total: i32,
    step: i32,
    candidate: Vec<u8>,
    exhausted: bool,
}

/// Safe backend behind the AFL++ custom-mutator ABI.
pub struct AflDriver<'g> {
    engine: Engine<'g>,
    trim: Option<TrimSession>,
    max_trim_steps: usize,
    buffer: Vec<u8>,
}

impl<'g> AflDriver<'g> {
    pub fn new(grammar: &'g Grammar, config: &ToolConfig) -> AflDriver<'g> {
        let engine = config
            .configure(Engine::new(grammar))
            .blocklist(BLOCKED_RECOMBINERS)
            .subtree_pool(SubTreePopulation::new());
        AflDriver {
            engine,
            trim: None,
            max_trim_steps: config.max_trim_steps,
            buffer: Vec::new(),
        }
    }

    pub fn engine_mut(&mut self) -> &mut Engine<'g> {
        &mut self.engine
    }

    fn decode_or_root(&self, data: &[u8]) -> Tree {
        decode_wire(data).unwrap_or_else(|error| {
            log::debug!("undecodable queue entry ({error}); starting from an empty root");
            Tree::new(NodeKind::rule(self.engine.grammar().default_rule()))
        })
    }

    /// Interns the subtrees of a queue entry into the pool.
    pub fn queue_new_entry(&mut self, data: &[u8]) {
        if let Ok(tree) = decode_wire(data) {
            if let Some(pool) = self.engine.pool_mut() {
                pool.add_tree(&tree);
            }
        }
    }

    /// One `afl_custom_fuzz` round: decode, mutate, re-encode. Returns the
    /// encoded mutant, or an empty slice when nothing fitting `max_size`
    /// came out.
    pub fn fuzz(&mut self, data: &[u8], max_size: usize) -> &[u8] {
        let recipient = Individual::new(self.decode_or_root(data));
        let tree = match self.engine.mutate(recipient) {
            Ok(tree) => tree,
            Err(error) => {
                log::warn!("mutation failed: {error}");
                self.buffer.clear();
                return &self.buffer;
            }
        };
        let encoded = encode_wire(&tree);
        if encoded.len() > max_size {
            log::debug!(
                "mutant ({} bytes) exceeds the host buffer ({max_size})",
                encoded.len()
            );
            self.buffer.clear();
        } else {
            self.buffer = encoded;
        }
        &self.buffer
    }

    /// Starts a trim session over the removable repetitions of the input.
    /// Returns the step count reported to AFL++.
    pub fn init_trim(&mut self, data: &[u8]) -> i32 {
        let source = self.decode_or_root(data);
        let trimmer = tree_trimmer(&source, self.max_trim_steps);
        let total = trimmer.estimated_steps().max(1) as i32;
        self.trim = Some(TrimSession {
            trimmer,
            source,
            total,
            step: 0,
            candidate: Vec::new(),
            exhausted: false,
        });
        total
    }

    /// Produces the buffer AFL++ should test next: the next candidate, or
    /// the best-so-far reduction once the session is over.
    pub fn trim(&mut self) -> &[u8] {
        let Some(session) = self.trim.as_mut() else {
            self.buffer.clear();
            return &self.buffer;
        };
        match session.trimmer.next() {
            Some(candidate) => session.candidate = candidate,
            None => {
                session.exhausted = true;
                session.candidate =
                    encode_wire(&reduce_tree(&session.source, session.trimmer.config()));
            }
        }
        &session.candidate
    }

    /// Reports the oracle verdict for the last `trim` buffer; returns the
    /// next step index (`total` ends the session on the AFL++ side).
    pub fn post_trim(&mut self, success: bool) -> i32 {
        let Some(session) = self.trim.as_mut() else {
            return 0;
        };
        if session.exhausted {
            return session.total;
        }
        session.trimmer.post(success);
        session.step += 1;
        session.step.min(session.total)
    }

    /// The best reduction accepted so far.
    pub fn trimmed(&self) -> Option<Vec<u8>> {
        let session = self.trim.as_ref()?;
        Some(encode_wire(&reduce_tree(
            &session.source,
            session.trimmer.config(),
        )))
    }
}

/// Initializes logging for the host process. Called by the generated
/// `afl_custom_init`.
pub fn init_logging() {
    let _ = env_logger::try_init();
}

/// Instantiates the AFL++ custom-mutator entry points for a grammar.
///
/// The argument is a function returning the compiled [`Grammar`]; it is
/// leaked once at `afl_custom_init` so the driver can borrow it for the
/// process lifetime.
///
/// ```ignore
/// fn build_grammar() -> grafl_runtime::Grammar { /* processor output */ }
/// grafl_afl::afl_custom_mutator!(build_grammar);
/// ```
#[macro_export]
macro_rules! afl_custom_mutator {
    ($build:path) => {
        #[no_mangle]
        pub extern "C" fn afl_custom_init(
            _afl: *mut ::std::os::raw::c_void,
            seed: u32,
        ) -> *mut ::std::os::raw::c_void {
            $crate::init_logging();
            let grammar: &'static $crate::Grammar = ::std::boxed::Box::leak(
                ::std::boxed::Box::new($build()),
            );
            let config = match $crate::ToolConfig::from_env() {
                Ok(config) => config,
                Err(error) => {
                    $crate::log::error!("invalid GRAFL_* configuration: {error}");
                    ::std::process::exit(1);
                }
            };
            let mut driver = $crate::AflDriver::new(grammar, &config);
            driver.engine_mut().reseed(seed as u64);
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(driver))
                as *mut ::std::os::raw::c_void
        }

        /// # Safety
        /// `data` must come from `afl_custom_init`; `buf` must be readable
        /// for `buf_size` bytes; `out_buf` must be writable.
        #[no_mangle]
        pub unsafe extern "C" fn afl_custom_fuzz(
            data: *mut ::std::os::raw::c_void,
            buf: *mut u8,
            buf_size: usize,
            out_buf: *mut *mut u8,
            _add_buf: *mut u8,
            _add_buf_size: usize,
            max_size: usize,
        ) -> usize {
            let driver = &mut *(data as *mut $crate::AflDriver<'static>);
            let input = ::std::slice::from_raw_parts(buf, buf_size);
            let output = driver.fuzz(input, max_size);
            *out_buf = output.as_ptr() as *mut u8;
            output.len()
        }

        /// # Safety
        /// See `afl_custom_fuzz`.
        #[no_mangle]
        pub unsafe extern "C" fn afl_custom_queue_new_entry(
            data: *mut ::std::os::raw::c_void,
            filename_new_queue: *const ::std::os::raw::c_char,
            _filename_orig_queue: *const ::std::os::raw::c_char,
        ) -> u8 {
            let driver = &mut *(data as *mut $crate::AflDriver<'static>);
            let path = ::std::ffi::CStr::from_ptr(filename_new_queue);
            if let Ok(path) = path.to_str() {
                if let Ok(bytes) = ::std::fs::read(path) {
                    driver.queue_new_entry(&bytes);
                }
            }
            0
        }

        /// # Safety
        /// See `afl_custom_fuzz`.
        #[no_mangle]
        pub unsafe extern "C" fn afl_custom_init_trim(
            data: *mut ::std::os::raw::c_void,
            buf: *mut u8,
            buf_size: usize,
        ) -> i32 {
            let driver = &mut *(data as *mut $crate::AflDriver<'static>);
            let input = ::std::slice::from_raw_parts(buf, buf_size);
            driver.init_trim(input)
        }

        /// # Safety
        /// See `afl_custom_fuzz`.
        #[no_mangle]
        pub unsafe extern "C" fn afl_custom_trim(
            data: *mut ::std::os::raw::c_void,
            out_buf: *mut *mut u8,
        ) -> usize {
            let driver = &mut *(data as *mut $crate::AflDriver<'static>);
            let output = driver.trim();
            *out_buf = output.as_ptr() as *mut u8;
            output.len()
        }

        /// # Safety
        /// See `afl_custom_fuzz`.
        #[no_mangle]
        pub unsafe extern "C" fn afl_custom_post_trim(
            data: *mut ::std::os::raw::c_void,
            success: u8,
        ) -> i32 {
            let driver = &mut *(data as *mut $crate::AflDriver<'static>);
            driver.post_trim(success != 0)
        }

        /// # Safety
        /// `data` must come from `afl_custom_init` and not be used again.
        #[no_mangle]
        pub unsafe extern "C" fn afl_custom_deinit(data: *mut ::std::os::raw::c_void) {
            drop(::std::boxed::Box::from_raw(
                data as *mut $crate::AflDriver<'static>,
            ));
        }
    };
}

// Re-exported for the macro expansion.
pub use grafl_runtime::Grammar;
pub use grafl_tool::ToolConfig;
pub use log;
