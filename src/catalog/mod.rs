//! Static registries loaded once at startup.
//!
//! ## Design
//! - Directions, tiers, access codes and UI languages come from config
//! - Immutable after construction; shared as `Arc<Catalogs>`
//! - Consumed by the session store, quota policy, pipeline, and by the
//!   messaging collaborator when it renders selection menus

pub mod directions;
pub mod tiers;

pub use directions::{default_directions, Direction, DirectionCatalog};
pub use tiers::{Quota, Tier, TierCatalog};

use anyhow::{bail, Context, Result};

use crate::config::Config;

/// All read-only lookup tables of the assistant.
#[derive(Debug, Clone)]
pub struct Catalogs {
    pub directions: DirectionCatalog,
    pub tiers: TierCatalog,
    ui_languages: Vec<String>,
    default_direction: Direction,
    default_ui_language: String,
}

impl Catalogs {
    pub fn new(
        directions: DirectionCatalog,
        tiers: TierCatalog,
        ui_languages: Vec<String>,
        default_direction: &str,
        default_ui_language: &str,
    ) -> Result<Self> {
        let Some(default) = directions.get(default_direction).cloned() else {
            bail!("Default direction '{default_direction}' is not a configured direction");
        };
        if !ui_languages.iter().any(|l| l == default_ui_language) {
            bail!("Default UI language '{default_ui_language}' is not in ui_languages");
        }

        Ok(Self {
            directions,
            tiers,
            ui_languages,
            default_direction: default,
            default_ui_language: default_ui_language.to_string(),
        })
    }

    /// Build every catalog from a loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let directions = DirectionCatalog::new(config.directions.clone())
            .context("Invalid [[directions]] table")?;

        let tiers = config.tiers.iter().map(|t| t.to_tier()).collect();
        let tiers = TierCatalog::new(
            tiers,
            config.access_codes.clone(),
            &config.general.default_tier,
        )
        .context("Invalid [[tiers]] / [access_codes] tables")?;

        Self::new(
            directions,
            tiers,
            config.ui_languages.clone(),
            &config.general.default_direction,
            &config.general.default_ui_language,
        )
    }

    pub fn default_direction(&self) -> &Direction {
        &self.default_direction
    }

    /// Resolve a session's direction, falling back to the default for codes
    /// that are no longer configured.
    pub fn direction_or_default(&self, code: &str) -> &Direction {
        self.directions
            .get(code)
            .unwrap_or_else(|| self.default_direction())
    }

    pub fn default_ui_language(&self) -> &str {
        &self.default_ui_language
    }

    pub fn is_ui_language(&self, code: &str) -> bool {
        self.ui_languages.iter().any(|l| l == code)
    }

    pub fn ui_languages(&self) -> &[String] {
        &self.ui_languages
    }
}
