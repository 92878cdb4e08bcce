//! This file is the root of the `echelle_drp` Rust crate.
//!
//! The crate reduces echelle spectrograph exposures through three product
//! levels: Level 0 (raw detector frames), Level 1 (extracted, calibrated
//! spectra), and Level 2 (derived radial-velocity measurements). Runs are
//! declared as recipes over a registry of primitives and driven by the
//! pipeline controller.

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//==================================================================================
// 1. Module Declarations
//==================================================================================
#[macro_use]
pub mod observability; // Make the run_event! macro available throughout the crate

pub mod calib;
pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod models;
pub mod primitives;
pub mod recipe;
pub mod types;

//==================================================================================
// 2. Public Surface
//==================================================================================
pub use config::DrpConfig;
pub use context::ExecutionContext;
pub use controller::PipelineController;
pub use error::DrpError;
pub use models::DataProduct;
pub use primitives::{Primitive, PrimitiveRegistry};
pub use recipe::{Recipe, RecipeEngine, RunReport};
pub use types::{DataLevel, ParamValue};
