use thiserror::Error;

/// Errors surfaced by the runtime.
///
/// Infeasible size budgets are not represented here: the generator recovers
/// from them by relaxing the budget (with a warning) and continuing. Only
/// conditions the caller has to act on become errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A generator was invoked for a rule name that is not registered in the
    /// grammar.
    #[error("unknown rule: {0}")]
    UnknownRule(String),

    /// Decoding produced an invalid or incomplete tree. Callers typically
    /// recover by synthesizing an empty root of the start rule.
    #[error("corrupt tree: {0}")]
    CorruptTree(String),

    /// A weights file or other configuration input could not be interpreted.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
