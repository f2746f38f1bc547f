//! Quota metering and tier upgrades.
//!
//! ## Design
//! - `QuotaManager` is the admission gate: one atomic check-and-increment
//!   per chargeable request, under the user's session lock
//! - Unlimited users and unlimited tiers are admitted without counting
//! - `TierResolver` maps shared-secret access codes to tiers; a valid code
//!   switches the tier and clears the day's usage
//! - A failing session backend is the only fatal error here; every other
//!   outcome is a value the caller turns into a notice

pub mod quota;
pub mod tier;

pub use quota::{Admission, QuotaManager, QuotaOutcome, StatusReport};
pub use tier::{TierChange, TierResolver};
