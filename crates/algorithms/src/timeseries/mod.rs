//! Time series construction
//!
//! - **assemble**: reduced slice values to a chronological series
//! - **synthetic**: deterministic demo series used as a fallback

pub mod assemble;
pub mod synthetic;

pub use assemble::assemble;
pub use synthetic::{demo_dates, demo_series, DEMO_STEP_DAYS};
