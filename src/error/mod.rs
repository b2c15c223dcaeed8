//! Error handling module for chip
//!
//! One error enum covers the configuration, dispatch, decoration, transport,
//! authentication and persistence failures of the gateway.

mod error;

pub use error::{ChipError, Result};
