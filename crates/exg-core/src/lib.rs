//! EXG-Core: Foundation types for multi-channel ExG acquisition
//!
//! Sample blocks, frame layouts, acquisition status and the shared error type.

pub mod critical;
pub mod error;
pub mod layout;
pub mod sample_block;
pub mod status;

pub use error::{ExgError, ExgResult};
pub use layout::{Calibration, Endianness, FrameLayout};
pub use sample_block::*;
pub use status::AcquisitionStatus;
