//! Access tiers, their daily quotas, and the shared-secret code table.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Daily allowance of a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quota {
    /// At most this many chargeable requests per day.
    Limited(u32),
    /// Exempt from counting.
    Unlimited,
}

impl Quota {
    pub fn is_unlimited(self) -> bool {
        matches!(self, Self::Unlimited)
    }

    /// Numeric limit, `None` when unlimited.
    pub fn limit(self) -> Option<u32> {
        match self {
            Self::Limited(n) => Some(n),
            Self::Unlimited => None,
        }
    }

    /// Requests left today given `used`, `None` when unlimited.
    pub fn remaining(self, used: u32) -> Option<u32> {
        self.limit().map(|limit| limit.saturating_sub(used))
    }
}

impl std::fmt::Display for Quota {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limited(n) => write!(f, "{n}/day"),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// A named access level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub name: String,
    pub label: String,
    pub quota: Quota,
}

/// Read-only registry of tiers plus the access-code → tier table.
#[derive(Debug, Clone)]
pub struct TierCatalog {
    tiers: Vec<Tier>,
    index: HashMap<String, usize>,
    codes: HashMap<String, String>,
    default_tier: String,
}

impl TierCatalog {
    /// Build the catalog. Every access code must name a known tier and the
    /// default tier must exist.
    pub fn new(
        tiers: Vec<Tier>,
        codes: HashMap<String, String>,
        default_tier: &str,
    ) -> Result<Self> {
        if tiers.is_empty() {
            bail!("At least one tier must be configured");
        }

        let mut index = HashMap::with_capacity(tiers.len());
        for (i, tier) in tiers.iter().enumerate() {
            if tier.quota == Quota::Limited(0) {
                bail!("Tier '{}' has a zero daily quota", tier.name);
            }
            if index.insert(tier.name.clone(), i).is_some() {
                bail!("Duplicate tier name '{}'", tier.name);
            }
        }

        if !index.contains_key(default_tier) {
            bail!("Default tier '{default_tier}' is not a configured tier");
        }

        let mut normalized = HashMap::with_capacity(codes.len());
        for (code, tier) in codes {
            let code = code.trim().to_string();
            if code.is_empty() {
                bail!("Access code for tier '{tier}' is empty");
            }
            if !index.contains_key(&tier) {
                bail!("Access code maps to unknown tier '{tier}'");
            }
            normalized.insert(code, tier);
        }

        Ok(Self {
            tiers,
            index,
            codes: normalized,
            default_tier: default_tier.to_string(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&Tier> {
        self.index.get(name).map(|&i| &self.tiers[i])
    }

    /// Quota of the named tier, `None` for an unknown name.
    pub fn quota_for(&self, name: &str) -> Option<Quota> {
        self.get(name).map(|t| t.quota)
    }

    /// The tier new sessions start in.
    pub fn default_tier(&self) -> &Tier {
        // Presence is checked in `new`.
        &self.tiers[self.index[&self.default_tier]]
    }

    /// Look up a tier, falling back to the default tier for names that are
    /// no longer configured.
    pub fn get_or_default(&self, name: &str) -> &Tier {
        self.get(name).unwrap_or_else(|| self.default_tier())
    }

    /// Tier granted by an access code. Surrounding whitespace is ignored;
    /// matching is otherwise exact.
    pub fn resolve_code(&self, code: &str) -> Option<&Tier> {
        self.codes.get(code.trim()).and_then(|name| self.get(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tier> {
        self.tiers.iter()
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn code_count(&self) -> usize {
        self.codes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(name: &str, quota: Quota) -> Tier {
        Tier {
            name: name.into(),
            label: name.to_uppercase(),
            quota,
        }
    }

    fn catalog() -> TierCatalog {
        let codes = HashMap::from([
            ("secret-a1".to_string(), "a1".to_string()),
            ("secret-vip".to_string(), "pro".to_string()),
        ]);
        TierCatalog::new(
            vec![
                tier("free", Quota::Limited(30)),
                tier("a1", Quota::Limited(30)),
                tier("b1", Quota::Limited(100)),
                tier("pro", Quota::Unlimited),
            ],
            codes,
            "free",
        )
        .unwrap()
    }

    #[test]
    fn quota_lookup() {
        let c = catalog();
        assert_eq!(c.quota_for("b1"), Some(Quota::Limited(100)));
        assert_eq!(c.quota_for("pro"), Some(Quota::Unlimited));
        assert_eq!(c.quota_for("gold"), None);
    }

    #[test]
    fn resolve_code_trims_and_is_exact() {
        let c = catalog();
        assert_eq!(c.resolve_code("  secret-a1 ").unwrap().name, "a1");
        assert!(c.resolve_code("SECRET-A1").is_none());
        assert!(c.resolve_code("").is_none());
    }

    #[test]
    fn unknown_tier_falls_back_to_default() {
        let c = catalog();
        assert_eq!(c.get_or_default("retired").name, "free");
        assert_eq!(c.default_tier().quota, Quota::Limited(30));
    }

    #[test]
    fn rejects_code_for_unknown_tier() {
        let codes = HashMap::from([("x".to_string(), "gold".to_string())]);
        let err = TierCatalog::new(vec![tier("free", Quota::Limited(5))], codes, "free")
            .unwrap_err();
        assert!(err.to_string().contains("unknown tier 'gold'"));
    }

    #[test]
    fn rejects_missing_default() {
        assert!(TierCatalog::new(vec![tier("a1", Quota::Limited(5))], HashMap::new(), "free")
            .is_err());
    }

    #[test]
    fn rejects_zero_quota() {
        assert!(TierCatalog::new(vec![tier("free", Quota::Limited(0))], HashMap::new(), "free")
            .is_err());
    }

    #[test]
    fn quota_remaining_and_display() {
        assert_eq!(Quota::Limited(30).remaining(25), Some(5));
        assert_eq!(Quota::Limited(30).remaining(31), Some(0));
        assert_eq!(Quota::Unlimited.remaining(1000), None);
        assert_eq!(Quota::Limited(60).to_string(), "60/day");
        assert_eq!(Quota::Unlimited.to_string(), "unlimited");
    }

    #[test]
    fn quota_serializes_with_sentinel() {
        assert_eq!(serde_json::to_string(&Quota::Unlimited).unwrap(), "\"unlimited\"");
        assert_eq!(
            serde_json::to_string(&Quota::Limited(30)).unwrap(),
            "{\"limited\":30}"
        );
    }
}
