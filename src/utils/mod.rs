pub mod chain;
pub mod config_loader;
pub mod fanout;

pub use chain::Chain;
pub use config_loader::*;
pub use fanout::{FanOut, gather_partitioned};
