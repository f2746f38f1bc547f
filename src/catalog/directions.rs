//! Translation directions: ordered language pairs plus the locales the
//! recognition and synthesis stages need.

use anyhow::{bail, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One ordered language pair, e.g. `ru_de` (Russian → German).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Direction {
    /// Stable identifier referenced by sessions (e.g. "ru_de").
    pub code: String,
    /// Source language tag for the translation service (e.g. "ru").
    pub source: String,
    /// Target language tag for the translation service (e.g. "de").
    pub target: String,
    /// Locale for speech recognition (e.g. "ru-RU").
    pub recognition_locale: String,
    /// Language tag for speech synthesis of the translation (e.g. "de").
    pub synthesis_language: String,
    /// Display label offered by selection menus.
    pub label: String,
}

impl Direction {
    pub fn new(
        code: &str,
        source: &str,
        target: &str,
        recognition_locale: &str,
        synthesis_language: &str,
        label: &str,
    ) -> Self {
        Self {
            code: code.into(),
            source: source.into(),
            target: target.into(),
            recognition_locale: recognition_locale.into(),
            synthesis_language: synthesis_language.into(),
            label: label.into(),
        }
    }

    /// Whether `other` translates the opposite way.
    pub fn is_reverse_of(&self, other: &Direction) -> bool {
        self.source == other.target && self.target == other.source
    }
}

/// Built-in direction table: every supported language paired with German
/// in both directions, in menu order.
pub fn default_directions() -> Vec<Direction> {
    vec![
        Direction::new("ru_de", "ru", "de", "ru-RU", "de", "🇷🇺 RU → 🇩🇪 DE"),
        Direction::new("de_ru", "de", "ru", "de-DE", "ru", "🇩🇪 DE → 🇷🇺 RU"),
        Direction::new("en_de", "en", "de", "en-US", "de", "🇬🇧 EN → 🇩🇪 DE"),
        Direction::new("de_en", "de", "en", "de-DE", "en", "🇩🇪 DE → 🇬🇧 EN"),
        Direction::new("tr_de", "tr", "de", "tr-TR", "de", "🇹🇷 TR → 🇩🇪 DE"),
        Direction::new("de_tr", "de", "tr", "de-DE", "tr", "🇩🇪 DE → 🇹🇷 TR"),
        Direction::new("ro_de", "ro", "de", "ro-RO", "de", "🇷🇴 RO → 🇩🇪 DE"),
        Direction::new("de_ro", "de", "ro", "de-DE", "ro", "🇩🇪 DE → 🇷🇴 RO"),
        Direction::new("pl_de", "pl", "de", "pl-PL", "de", "🇵🇱 PL → 🇩🇪 DE"),
        Direction::new("de_pl", "de", "pl", "de-DE", "pl", "🇩🇪 DE → 🇵🇱 PL"),
        Direction::new("ar_de", "ar", "de", "ar-SY", "de", "🇸🇾 AR(SY) → 🇩🇪 DE"),
        Direction::new("de_ar", "de", "ar", "de-DE", "ar", "🇩🇪 DE → 🇸🇾 AR(SY)"),
    ]
}

/// Read-only registry of directions, in configured order.
#[derive(Debug, Clone)]
pub struct DirectionCatalog {
    entries: Vec<Direction>,
    index: HashMap<String, usize>,
}

impl DirectionCatalog {
    /// Build a catalog, rejecting empty tables and duplicate codes.
    pub fn new(entries: Vec<Direction>) -> Result<Self> {
        if entries.is_empty() {
            bail!("At least one translation direction must be configured");
        }

        let mut index = HashMap::with_capacity(entries.len());
        for (i, direction) in entries.iter().enumerate() {
            if direction.code.trim().is_empty() {
                bail!("Direction #{} has an empty code", i + 1);
            }
            if index.insert(direction.code.clone(), i).is_some() {
                bail!("Duplicate direction code '{}'", direction.code);
            }
        }

        Ok(Self { entries, index })
    }

    pub fn get(&self, code: &str) -> Option<&Direction> {
        self.index.get(code).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, code: &str) -> bool {
        self.index.contains_key(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Direction> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The direction translating the opposite way, if configured.
    pub fn reverse_of(&self, code: &str) -> Option<&Direction> {
        let direction = self.get(code)?;
        self.entries.iter().find(|d| d.is_reverse_of(direction))
    }

    /// Menu layout: each direction paired with its reverse, first
    /// appearance wins, in configured order.
    pub fn menu_rows(&self) -> Vec<Vec<&Direction>> {
        let mut placed = vec![false; self.entries.len()];
        let mut rows = Vec::new();

        for (i, direction) in self.entries.iter().enumerate() {
            if placed[i] {
                continue;
            }
            placed[i] = true;
            let mut row = vec![direction];

            if let Some(j) = self
                .entries
                .iter()
                .enumerate()
                .position(|(j, d)| !placed[j] && d.is_reverse_of(direction))
            {
                placed[j] = true;
                row.push(&self.entries[j]);
            }
            rows.push(row);
        }

        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_is_valid() {
        let catalog = DirectionCatalog::new(default_directions()).unwrap();
        assert_eq!(catalog.len(), 12);
        let ru_de = catalog.get("ru_de").unwrap();
        assert_eq!(ru_de.source, "ru");
        assert_eq!(ru_de.target, "de");
        assert_eq!(ru_de.recognition_locale, "ru-RU");
        assert_eq!(ru_de.synthesis_language, "de");
    }

    #[test]
    fn rejects_duplicates() {
        let mut entries = default_directions();
        entries.push(entries[0].clone());
        let err = DirectionCatalog::new(entries).unwrap_err();
        assert!(err.to_string().contains("Duplicate direction code"));
    }

    #[test]
    fn rejects_empty_table() {
        assert!(DirectionCatalog::new(vec![]).is_err());
    }

    #[test]
    fn unknown_code_is_absent() {
        let catalog = DirectionCatalog::new(default_directions()).unwrap();
        assert!(catalog.get("xx_yy").is_none());
        assert!(!catalog.contains("xx_yy"));
    }

    #[test]
    fn reverse_lookup() {
        let catalog = DirectionCatalog::new(default_directions()).unwrap();
        assert_eq!(catalog.reverse_of("tr_de").unwrap().code, "de_tr");
        assert!(catalog.reverse_of("nope").is_none());
    }

    #[test]
    fn menu_rows_pair_directions_with_reverse() {
        let catalog = DirectionCatalog::new(default_directions()).unwrap();
        let rows = catalog.menu_rows();
        assert_eq!(rows.len(), 6);
        let codes: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r[0].code.as_str(), r[1].code.as_str()))
            .collect();
        assert_eq!(codes[0], ("ru_de", "de_ru"));
        assert_eq!(codes[5], ("ar_de", "de_ar"));
    }

    #[test]
    fn menu_rows_keep_unpaired_directions_alone() {
        let catalog = DirectionCatalog::new(vec![
            Direction::new("en_de", "en", "de", "en-US", "de", "EN → DE"),
            Direction::new("fr_de", "fr", "de", "fr-FR", "de", "FR → DE"),
            Direction::new("de_en", "de", "en", "de-DE", "en", "DE → EN"),
        ])
        .unwrap();
        let rows = catalog.menu_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[1][0].code, "fr_de");
        assert_eq!(rows[1].len(), 1);
    }
}
