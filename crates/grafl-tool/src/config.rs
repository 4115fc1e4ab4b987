use std::env;
use std::fs;

use grafl_runtime::{DefaultModel, WeightTable, WeightedModel};

use crate::engine::Engine;
use crate::error::{Error, Result};

pub const ENV_MAX_DEPTH: &str = "GRAFL_MAX_DEPTH";
pub const ENV_MAX_TOKENS: &str = "GRAFL_MAX_TOKENS";
pub const ENV_MEMO_SIZE: &str = "GRAFL_MEMO_SIZE";
pub const ENV_RANDOM_MUTATORS: &str = "GRAFL_RANDOM_MUTATORS";
pub const ENV_WEIGHTS: &str = "GRAFL_WEIGHTS";
pub const ENV_MAX_TRIM_STEPS: &str = "GRAFL_MAX_TRIM_STEPS";

/// The grammar-violating creators gated behind [`ENV_RANDOM_MUTATORS`].
const RESTRICTED_MUTATORS: &[&str] = &["unrestricted_delete", "unrestricted_hoist_rule"];

/// Driver-level configuration, usually read from the environment.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub max_depth: usize,
    pub max_tokens: usize,
    pub memo_size: usize,
    /// Enables the grammar-violating mutators. Off by default.
    pub random_mutators: bool,
    pub weights: Option<WeightTable>,
    pub max_trim_steps: usize,
}

impl Default for ToolConfig {
    fn default() -> ToolConfig {
        ToolConfig {
            max_depth: usize::MAX,
            max_tokens: usize::MAX,
            memo_size: 4096,
            random_mutators: false,
            weights: None,
            max_trim_steps: 1024,
        }
    }
}

impl ToolConfig {
    /// Reads the `GRAFL_*` environment surface. Unset variables keep their
    /// defaults; malformed values are surfaced as option errors.
    pub fn from_env() -> Result<ToolConfig> {
        let mut config = ToolConfig::default();
        if let Some(depth) = read_usize(ENV_MAX_DEPTH)? {
            config.max_depth = depth;
        }
        if let Some(tokens) = read_usize(ENV_MAX_TOKENS)? {
            config.max_tokens = tokens;
        }
        if let Some(memo) = read_usize(ENV_MEMO_SIZE)? {
            config.memo_size = memo;
        }
        if let Some(flag) = read_bool(ENV_RANDOM_MUTATORS)? {
            config.random_mutators = flag;
        }
        if let Ok(path) = env::var(ENV_WEIGHTS) {
            let text = fs::read_to_string(&path)?;
            config.weights = Some(WeightTable::from_json(&text)?);
        }
        if let Some(steps) = read_usize(ENV_MAX_TRIM_STEPS)? {
            config.max_trim_steps = steps;
        }
        Ok(config)
    }

    /// Applies the configuration to an engine under construction.
    pub fn configure<'g>(&self, engine: Engine<'g>) -> Engine<'g> {
        let mut engine = engine
            .max_depth(self.max_depth)
            .max_tokens(self.max_tokens)
            .memo_size(self.memo_size);
        if let Some(weights) = &self.weights {
            engine = engine.model(WeightedModel::new(DefaultModel, weights.clone()));
        }
        if !self.random_mutators {
            engine = engine.blocklist(RESTRICTED_MUTATORS);
        }
        engine
    }
}

fn read_usize(name: &str) -> Result<Option<usize>> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidOption(format!("{name}={value:?}"))),
        Err(_) => Ok(None),
    }
}

fn read_bool(name: &str) -> Result<Option<bool>> {
    match env::var(name) {
        Ok(value) => match value.trim() {
            "1" | "true" => Ok(Some(true)),
            "0" | "false" | "" => Ok(Some(false)),
            _ => Err(Error::InvalidOption(format!("{name}={value:?}"))),
        },
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test owns every GRAFL_* variable; the harness runs tests in one
    // process, so splitting this up would race on the environment.
    #[test]
    fn environment_round_trip() {
        let config = ToolConfig::from_env().unwrap();
        assert_eq!(config.max_depth, usize::MAX);
        assert_eq!(config.memo_size, 4096);
        assert!(!config.random_mutators);

        env::set_var(ENV_MAX_DEPTH, "12");
        env::set_var(ENV_MAX_TOKENS, "300");
        env::set_var(ENV_MEMO_SIZE, "0");
        env::set_var(ENV_RANDOM_MUTATORS, "1");
        env::set_var(ENV_MAX_TRIM_STEPS, "99");
        let config = ToolConfig::from_env().unwrap();
        assert_eq!(config.max_depth, 12);
        assert_eq!(config.max_tokens, 300);
        assert_eq!(config.memo_size, 0);
        assert!(config.random_mutators);
        assert_eq!(config.max_trim_steps, 99);

        env::set_var(ENV_MAX_DEPTH, "not-a-number");
        assert!(matches!(
            ToolConfig::from_env(),
            Err(Error::InvalidOption(_))
        ));
        env::set_var(ENV_MAX_DEPTH, "12");

        let weights = tempfile::NamedTempFile::new().unwrap();
        fs::write(
            weights.path(),
            r#"{"quants": {"start": {"0": 0.75}}}"#,
        )
        .unwrap();
        env::set_var(ENV_WEIGHTS, weights.path());
        let config = ToolConfig::from_env().unwrap();
        assert_eq!(
            config.weights.as_ref().and_then(|w| w.quantify_prob("start", 0)),
            Some(0.75)
        );

        fs::write(weights.path(), "{").unwrap();
        assert!(ToolConfig::from_env().is_err());

        for name in [
            ENV_MAX_DEPTH,
            ENV_MAX_TOKENS,
            ENV_MEMO_SIZE,
            ENV_RANDOM_MUTATORS,
            ENV_WEIGHTS,
            ENV_MAX_TRIM_STEPS,
        ] {
            env::remove_var(name);
        }
    }
}
