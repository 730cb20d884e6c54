pub mod config;
pub mod error;
pub mod lane;

pub use lane::LaneKey;
