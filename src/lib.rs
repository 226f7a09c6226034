#![allow(clippy::needless_range_loop)]

#[cfg(test)]
#[macro_use]
extern crate quickcheck;

pub mod adamw;
pub mod baseline;
pub mod config;
pub mod error;
pub mod math;
pub mod matrix;
pub mod model;
pub mod rnn;
pub mod stop_condition;
pub mod task;
pub mod train;

pub use crate::adamw::*;
pub use crate::baseline::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::model::*;
pub use crate::rnn::*;
pub use crate::stop_condition::*;
pub use crate::task::*;
pub use crate::train::*;
