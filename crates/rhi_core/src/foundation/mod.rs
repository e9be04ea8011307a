//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the crate:
//! - Typed slot-map handles for every resource kind
//! - Lock helpers that tolerate poisoning
//! - Logging utilities

pub mod collections;
pub mod logging;
pub mod sync;
