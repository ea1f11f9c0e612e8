//! # Harbor Support
//!
//! Shared helpers for the Harbor container crates.
//!
//! This crate provides:
//! - Rendering of dependency chains and type names for error messages
//! - "Did you mean?" matching over registered service names

pub mod rendering;
