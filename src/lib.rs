//! ISS tracker library
//!
//! Polls a position endpoint and renders the tracked object on a map.
//! Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
