//! Target framework taxonomy.
//!
//! The framework is always supplied by the caller; nothing in the core infers
//! it from content. Every per-framework decision goes through an exhaustive
//! `match` on [`Framework`], so adding a variant fails to compile until each
//! strategy handles it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Framework the generated code targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framework {
    /// Plain markup injected into an isolated document.
    Html,
    /// JSX-style components evaluated against the binding table.
    #[default]
    #[serde(alias = "react")]
    ReactLike,
    /// Single-file-component source shown read-only.
    #[serde(alias = "vue")]
    VueLike,
    /// Framework-flavoured JSX components (e.g. page components).
    #[serde(alias = "nextjs")]
    FrameworkComponent,
}

/// How a framework's buffer is turned into source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationStrategy {
    /// Cosmetic substitutions only; tags are never rewritten.
    Markup,
    /// Definition detection or the fragment step pipeline.
    Component,
    /// The buffer is returned untouched.
    Passthrough,
}

/// How a normalized artifact is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// Script-capable document with no same-origin or storage access.
    IsolatedDocument,
    /// Compiled by an evaluator against an explicit binding table.
    Evaluated,
    /// Never executed; presented as source.
    ReadOnly,
}

impl Framework {
    /// Every known framework, in selector order.
    pub const ALL: [Framework; 4] = [
        Framework::Html,
        Framework::ReactLike,
        Framework::FrameworkComponent,
        Framework::VueLike,
    ];

    pub fn normalization(self) -> NormalizationStrategy {
        match self {
            Self::Html => NormalizationStrategy::Markup,
            Self::ReactLike | Self::FrameworkComponent => NormalizationStrategy::Component,
            Self::VueLike => NormalizationStrategy::Passthrough,
        }
    }

    pub fn execution(self) -> ExecutionStrategy {
        match self {
            Self::Html => ExecutionStrategy::IsolatedDocument,
            Self::ReactLike | Self::FrameworkComponent => ExecutionStrategy::Evaluated,
            Self::VueLike => ExecutionStrategy::ReadOnly,
        }
    }

    /// Whether artifacts for this framework may be executed at all.
    pub fn is_executable(self) -> bool {
        self.execution() != ExecutionStrategy::ReadOnly
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Html => "html",
            Self::ReactLike => "react-like",
            Self::VueLike => "vue-like",
            Self::FrameworkComponent => "framework-component",
        };
        f.write_str(s)
    }
}

impl FromStr for Framework {
    type Err = FrameworkParseError;

    /// Accepts the selector values plus the short names used by the
    /// generation backend's request schema (`react`, `nextjs`, `vue`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "react-like" | "react" => Ok(Self::ReactLike),
            "vue-like" | "vue" => Ok(Self::VueLike),
            "framework-component" | "nextjs" => Ok(Self::FrameworkComponent),
            _ => Err(FrameworkParseError(s.to_owned())),
        }
    }
}

/// Error returned when parsing an unknown framework selector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid framework {0:?} (expected html, react-like, framework-component, or vue-like)")]
pub struct FrameworkParseError(pub String);
