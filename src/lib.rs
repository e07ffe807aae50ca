pub mod cli;
pub mod cluster;
pub mod diff;
pub mod encode;
pub mod error;
pub mod expression;
pub mod input;
pub mod mbtiles;
pub mod options;
pub mod output;
pub mod tiler;
pub mod worker;

pub use crate::error::{Result, TilerError};
