//! # PeelPack Gen
//!
//! Generation core for character sticker packs: one description becomes
//! sixteen portraits (nine emotions, seven surprise scenarios) produced by
//! an unreliable image provider.
//!
//! ## Features
//!
//! - Detached fan-out: [`Orchestrator::create()`] returns a project id at once
//! - Bounded concurrency across all running projects
//! - One retry per image with a perturbed seed
//! - SQLite persistence of projects, images and style presets
//! - Live progress snapshots multicast to any number of subscribers
//! - Mock and Gemini providers behind one [`ImageProvider`] trait
//!
//! ## Quick Start
//!
//! 1. Build a [`GenConfig`] (or load one with [`GenConfig::from_env()`])
//! 2. Create an [`Orchestrator`] with a [`Storage`] and an [`ImageProvider`]
//! 3. Call [`Orchestrator::create()`] and [`Orchestrator::subscribe()`] to the returned id
//!
//! See the `demos/` directory for complete usage examples.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod executor;
pub mod logging;
pub mod orchestrator;
pub mod progress;
pub mod prompt;
pub mod provider;
pub mod pubsub;
pub mod storage;
pub mod types;

pub use config::{GenConfig, GenConfigBuilder};
pub use db::Database;
pub use error::{GenError, ProviderError};
pub use events::{channel_name, ProgressEvent};
pub use orchestrator::Orchestrator;
pub use progress::ProgressPublisher;
pub use provider::{
    GeminiConfig, GeminiProvider, GeneratedImage, GenerationRequest, ImageProvider, MockProvider,
    MockProviderConfig,
};
pub use pubsub::{PubSub, Subscription};
pub use storage::{FsStorage, Storage};
pub use types::{
    CreateProjectRequest, Emotion, Image, ImageCategory, ImageStatus, InputKind, Project,
    ProjectStatus, Style,
};
