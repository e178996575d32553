pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod state;

// Re-export main types for convenience
pub use api::{ConnectionTest, GenerateParams, Generation, ModelInfo, ModelList, Usage};
pub use client::{Action, PlaygroundClient};
pub use config::{Config, PanelLayout, Settings};
pub use error::ClientError;
pub use session::{ChatSession, PendingGeneration, Ticket};
pub use state::{ChatMessage, ChatRole, WireMessage};
