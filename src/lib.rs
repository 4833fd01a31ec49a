pub mod assembler;
pub mod catalog;
pub mod config;
pub mod data_io;
pub mod inspect;
pub mod math;
pub mod retrieval;
pub mod time_utils;
pub mod units;

pub use time_utils::*;
