//! Library exports for the content relay
//!
//! This module exposes internal components for testing and potential library usage.

pub mod config;
pub mod error;
pub mod fetch;
pub mod guard;
pub mod handler;
pub mod model;
pub mod page;
pub mod rewrite;
pub mod route;
