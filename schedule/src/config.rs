//! Pass configuration.
//!
//! Typed configuration with bon builders and environment variable fallbacks.

use bon::bon;
use snafu::ResultExt;
use strata_ir::Placement;
use tracing::warn;

use crate::error::{InvalidConfigSnafu, IrSnafu, Result};

/// Argument combinations tried per expression before truncating.
pub const DEFAULT_MAX_CANDIDATES: usize = 256;

/// Innermost tile extent per grid axis.
pub const DEFAULT_TILE: usize = 32;

/// Configuration of auto-distribution and kernel selection.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributeConfig {
    /// Device hierarchy every distributed candidate is laid out on.
    pub placement: Placement,
    /// Ceiling on argument combinations per expression.
    pub max_candidates: usize,
    /// Requested tile extents, aligned to the trailing grid axes.
    pub tile: Vec<usize>,
}

impl Default for DistributeConfig {
    fn default() -> Self {
        Self { placement: Placement::single(), max_candidates: DEFAULT_MAX_CANDIDATES, tile: vec![DEFAULT_TILE] }
    }
}

#[bon]
impl DistributeConfig {
    #[builder]
    pub fn builder(
        placement: Placement,
        #[builder(default = DEFAULT_MAX_CANDIDATES)] max_candidates: usize,
        #[builder(default = vec![DEFAULT_TILE])] tile: Vec<usize>,
    ) -> Self {
        Self { placement, max_candidates: max_candidates.max(1), tile }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `STRATA_PLACEMENT` - Hierarchy and axis names, e.g. `2x4:bt` or `2x4:batch,tensor`
    ///   (default: one device)
    /// * `STRATA_MAX_CANDIDATES` - Combination ceiling (default: 256)
    /// * `STRATA_TILE` - Tile extents, e.g. `32` or `8x32` (default: 32)
    ///
    /// Unparsable values fall back to the default with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let placement = from_env_or("STRATA_PLACEMENT", parse_placement, defaults.placement);
        let max_candidates = from_env_or("STRATA_MAX_CANDIDATES", parse_max_candidates, defaults.max_candidates);
        let tile = from_env_or("STRATA_TILE", parse_tile, defaults.tile);
        Self { placement, max_candidates, tile }
    }
}

fn from_env_or<T>(key: &'static str, parse: fn(&str) -> Result<T>, default: T) -> T {
    let Ok(value) = std::env::var(key) else { return default };
    match parse(&value) {
        Ok(parsed) => parsed,
        Err(error) => {
            warn!(key, %error, "config.fallback");
            default
        }
    }
}

fn parse_extents(key: &'static str, text: &str) -> Result<Vec<usize>> {
    text.split('x')
        .map(|part| match part.trim().parse::<usize>() {
            Ok(0) => InvalidConfigSnafu { key, value: text, reason: "extents must be positive" }.fail(),
            Ok(n) => Ok(n),
            Err(e) => InvalidConfigSnafu { key, value: text, reason: e.to_string() }.fail(),
        })
        .collect()
}

/// Parses `2x4`, `2x4:bt` or `2x4:batch,tensor`.
///
/// Without names the axes are called `h0`, `h1`, ... A names string without commas gives
/// one single-character name per axis.
pub fn parse_placement(text: &str) -> Result<Placement> {
    let (sizes, names) = match text.split_once(':') {
        Some((sizes, names)) => (sizes, Some(names)),
        None => (text, None),
    };
    let hierarchy = parse_extents("STRATA_PLACEMENT", sizes)?;
    let names: Vec<String> = match names {
        None => (0..hierarchy.len()).map(|i| format!("h{i}")).collect(),
        Some(names) if names.contains(',') => names.split(',').map(|n| n.trim().to_string()).collect(),
        Some(names) => names.chars().map(String::from).collect(),
    };
    Placement::new(hierarchy, names).context(IrSnafu)
}

pub fn parse_tile(text: &str) -> Result<Vec<usize>> {
    parse_extents("STRATA_TILE", text)
}

pub fn parse_max_candidates(text: &str) -> Result<usize> {
    match text.trim().parse::<usize>() {
        Ok(0) => InvalidConfigSnafu { key: "STRATA_MAX_CANDIDATES", value: text, reason: "must be positive" }.fail(),
        Ok(n) => Ok(n),
        Err(e) => InvalidConfigSnafu { key: "STRATA_MAX_CANDIDATES", value: text, reason: e.to_string() }.fail(),
    }
}
