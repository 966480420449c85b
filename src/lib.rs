//! Railpoint - model railway command station control core
//!
//! Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod protocol;
pub mod services;
