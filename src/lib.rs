//! CPU specification resolution and merge engine - shared modules for all binaries.

pub mod config;
pub mod engine;
pub mod error;
pub mod group;
pub mod merge;
pub mod model_key;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod quality;
pub mod safety;
pub mod scoring;
pub mod sources;
pub mod storage;
