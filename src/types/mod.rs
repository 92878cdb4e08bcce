//! Shared vocabulary types used across the data model, primitives, and the
//! recipe engine.

mod data_level;
mod param_value;

pub use data_level::DataLevel;
pub use param_value::{ParamKind, ParamValue};
