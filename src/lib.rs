//! Voice and text translation assistant core.
//!
//! Meters per-user usage against tiered daily quotas and runs messages
//! through a transcode → recognize → translate → synthesize pipeline.
//! The chat transport stays outside: it feeds [`InboundEvent`]s to an
//! [`Assistant`] and delivers the [`OutboundEvent`]s it returns.

pub mod billing;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod session;
pub mod util;
pub mod voice;

pub use config::Config;
pub use dispatch::{Assistant, InboundEvent, Notice, OutboundEvent};
