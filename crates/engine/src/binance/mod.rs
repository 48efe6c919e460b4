pub mod kline;
pub mod rest;
pub mod stream;

pub use kline::{parse_kline_event, parse_klines};
pub use rest::BinanceMarketData;
pub use stream::BinanceStream;
