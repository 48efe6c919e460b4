pub mod config;
pub mod error;
pub mod market;
pub mod types;
pub mod window;

pub use config::Config;
pub use error::{Error, Result};
pub use market::{parse_interval, MarketDataSource};
pub use types::*;
pub use window::CandleWindow;
