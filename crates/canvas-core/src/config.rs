//! Runtime configuration for the normalizer, sandbox, and session.
//!
//! Every struct deserializes with defaults so a partial TOML table (or
//! none at all) is valid.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::framework::Framework;

/// Name of the synthetic component wrapped around raw fragments.
pub const DEFAULT_COMPONENT_NAME: &str = "GeneratedComponent";

/// Host UI primitives exposed to generated components by default.
pub const DEFAULT_HOST_PRIMITIVES: &[&str] = &["Button", "Card", "Badge", "Input"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    pub component_name: String,
    /// HTML attribute name -> component attribute name.
    pub attribute_renames: BTreeMap<String, String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        let attribute_renames = [("class", "className"), ("for", "htmlFor")]
            .into_iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        Self {
            attribute_renames,
            component_name: DEFAULT_COMPONENT_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Allow-list of host primitives bound into component scope.
    pub host_primitives: Vec<String>,
    /// Maximum element nesting while rendering a component tree.
    pub max_render_depth: usize,
    /// Extra utility classes for the HTML style shim (class -> CSS).
    pub extra_shim_classes: BTreeMap<String, String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            host_primitives: DEFAULT_HOST_PRIMITIVES.iter().map(|s| s.to_string()).collect(),
            extra_shim_classes: BTreeMap::new(),
            max_render_depth: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub framework: Framework,
    /// Capacity of the lifecycle event channel created by `spawn_session`.
    pub event_capacity: usize,
    pub normalizer: NormalizerConfig,
    pub sandbox: SandboxConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            framework: Framework::default(),
            event_capacity: 64,
            normalizer: NormalizerConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn for_framework(framework: Framework) -> Self {
        Self {
            framework,
            ..Self::default()
        }
    }
}
