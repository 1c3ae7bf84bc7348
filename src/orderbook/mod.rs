//! Order book module.
//!
//! This module handles:
//! - Order book types and data structures
//! - Normalization of raw sides into cumulative depth
//! - Per-coin sessions fed by the streaming connection

pub mod normalizer;
pub mod session;
pub mod types;

pub use normalizer::{normalize_book, normalize_levels, MAX_LEVELS};
pub use session::OrderbookSession;
pub use types::{BookLevel, DepthLevel, OrderbookSnapshot, PriceLevel};
