//! Patch Canvas Library
//!
//! A visual patching canvas kept in step with an embedded dataflow engine.

pub mod app;
pub mod canvas;
pub mod config;
pub mod engine;
pub mod patch;
pub mod persistence;
