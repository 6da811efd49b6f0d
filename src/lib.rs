//! Multi-provider image analysis
//!
//! Sends one image to several third-party analysis services (a generative
//! vision model, a content-moderation service and image-recognition taggers)
//! concurrently, tolerates partial failure, and normalises their divergent
//! responses into one `AnalysisResult` per provider.

pub mod config;
pub mod error;
pub mod image;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod providers;

pub use error::{Error, Result};
pub use orchestrator::Orchestrator;
