//! Core types and utilities for the OPC UA binary client
//!
//! This crate provides the built-in data types, status codes and the error
//! type used throughout the workspace.

pub mod datatypes;
pub mod error;
pub mod status_code;

pub use datatypes::*;
pub use error::{UaError, UaResult};
pub use status_code::StatusCode;
