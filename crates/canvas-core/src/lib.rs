//! Streaming classification, code normalization and live preview for
//! AI-generated UI code.

pub mod config;
pub mod framework;
pub mod markup;
pub mod normalize;
pub mod request;
pub mod sandbox;
pub mod session;
pub mod stream;

pub use config::{NormalizerConfig, SandboxConfig, SessionConfig};
pub use framework::Framework;
pub use normalize::{CodeNormalizer, NormalizedArtifact};
pub use sandbox::PreviewSandbox;
pub use session::{GenerationSession, SessionEvent, TerminalSnapshot, spawn_session};
