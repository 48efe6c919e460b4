//! Seeded synthetic OHLCV data, used as a labeled fallback when the
//! exchange is unreachable and as a deterministic input for tests.

pub mod generator;

pub use common::parse_interval;
pub use generator::{SyntheticConfig, SyntheticMarketData};
