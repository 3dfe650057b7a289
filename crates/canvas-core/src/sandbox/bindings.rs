//! The explicit binding scope handed to generated components.
//!
//! Nothing outside this table is resolvable: there is no module lookup and
//! no ambient global scope.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use super::RenderFault;
use crate::config::SandboxConfig;

/// Attribute map passed to a host primitive (HTML attribute names, raw
/// unescaped values).
pub type Props = BTreeMap<String, String>;

/// A host UI primitive: props plus rendered children to markup.
pub type Primitive = Arc<dyn Fn(&Props, &str) -> Result<String, RenderFault> + Send + Sync>;

/// Core primitives of the rendering library, always in scope.
pub const LIBRARY_PRIMITIVES: &[&str] = &[
    "React",
    "Fragment",
    "useState",
    "useEffect",
    "useMemo",
    "useRef",
    "useCallback",
    "render",
];

/// Library primitives plus allow-listed host primitives.
#[derive(Clone, Default)]
pub struct BindingTable {
    library: BTreeSet<String>,
    host: BTreeMap<String, Primitive>,
}

impl BindingTable {
    /// An empty table: not even library primitives are bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Library primitives plus the built-in host primitives named in the
    /// config's allow-list. Unknown names are ignored.
    pub fn standard(config: &SandboxConfig) -> Self {
        let mut table = Self {
            library: LIBRARY_PRIMITIVES.iter().map(|s| s.to_string()).collect(),
            host: BTreeMap::new(),
        };
        for name in &config.host_primitives {
            match builtin_primitive(name) {
                Some(primitive) => {
                    table.host.insert(name.clone(), primitive);
                }
                None => warn!(primitive = %name, "unknown host primitive in allow-list, ignoring"),
            }
        }
        table
    }

    /// Bind a host primitive, replacing and returning any previous one.
    pub fn register(&mut self, name: impl Into<String>, primitive: Primitive) -> Option<Primitive> {
        self.host.insert(name.into(), primitive)
    }

    pub fn get(&self, name: &str) -> Option<&Primitive> {
        self.host.get(name)
    }

    pub fn is_library(&self, name: &str) -> bool {
        self.library.contains(name)
    }

    /// Whether `name` resolves to anything in scope.
    pub fn is_bound(&self, name: &str) -> bool {
        self.is_library(name) || self.host.contains_key(name)
    }

    pub fn host_names(&self) -> Vec<&str> {
        self.host.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.library.len() + self.host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.library.is_empty() && self.host.is_empty()
    }
}

impl fmt::Debug for BindingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingTable")
            .field("library", &self.library)
            .field("host", &self.host.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Built-in host primitives
// ---------------------------------------------------------------------------

fn builtin_primitive(name: &str) -> Option<Primitive> {
    let primitive: Primitive = match name {
        "Button" => Arc::new(|props: &Props, children: &str| {
            Ok(element("button", "canvas-button", props, Some(children)))
        }),
        "Card" => Arc::new(|props: &Props, children: &str| {
            Ok(element("div", "canvas-card", props, Some(children)))
        }),
        "Badge" => Arc::new(|props: &Props, children: &str| {
            Ok(element("span", "canvas-badge", props, Some(children)))
        }),
        "Input" => Arc::new(|props: &Props, _: &str| {
            Ok(element("input", "canvas-input", props, None))
        }),
        _ => return None,
    };
    Some(primitive)
}

fn element(tag: &str, base_class: &str, props: &Props, children: Option<&str>) -> String {
    let mut props = props.clone();
    let class = match props.remove("class") {
        Some(extra) if !extra.trim().is_empty() => format!("{base_class} {}", extra.trim()),
        _ => base_class.to_string(),
    };
    props.insert("class".to_string(), class);

    let attrs = html_attrs(&props);
    match children {
        Some(children) => format!("<{tag}{attrs}>{children}</{tag}>"),
        None => format!("<{tag}{attrs}>"),
    }
}

/// Render attributes as ` name="value"` pairs (leading space included).
/// An empty value renders as a bare attribute.
pub fn html_attrs(props: &Props) -> String {
    let mut out = String::new();
    for (name, value) in props {
        out.push(' ');
        out.push_str(name);
        if !value.is_empty() {
            out.push_str("=\"");
            out.push_str(&escape_html(value));
            out.push('"');
        }
    }
    out
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_respects_allow_list() {
        let config = SandboxConfig {
            host_primitives: vec!["Button".into(), "Card".into(), "Rocket".into()],
            ..SandboxConfig::default()
        };
        let table = BindingTable::standard(&config);
        assert!(table.is_bound("Button"));
        assert!(table.is_bound("useState"));
        assert!(!table.is_bound("Badge"));
        assert!(!table.is_bound("Rocket"));
        assert_eq!(table.host_names(), vec!["Button", "Card"]);
        assert_eq!(table.len(), LIBRARY_PRIMITIVES.len() + 2);
    }

    #[test]
    fn empty_table_binds_nothing() {
        let table = BindingTable::new();
        assert!(table.is_empty());
        assert!(!table.is_bound("React"));
    }

    #[test]
    fn register_replaces_existing() {
        let mut table = BindingTable::standard(&SandboxConfig::default());
        let custom: Primitive =
            Arc::new(|_: &Props, children: &str| Ok(format!("<b>{children}</b>")));
        assert!(table.register("Button", custom).is_some());
        let rendered = (table.get("Button").unwrap())(&Props::new(), "x").unwrap();
        assert_eq!(rendered, "<b>x</b>");
    }

    #[test]
    fn builtin_button_merges_classes_and_escapes() {
        let table = BindingTable::standard(&SandboxConfig::default());
        let mut props = Props::new();
        props.insert("class".into(), "primary".into());
        props.insert("title".into(), "a \"quote\"".into());
        let html = (table.get("Button").unwrap())(&props, "Go").unwrap();
        assert_eq!(
            html,
            "<button class=\"canvas-button primary\" title=\"a &quot;quote&quot;\">Go</button>"
        );
    }

    #[test]
    fn builtin_input_has_no_children() {
        let table = BindingTable::standard(&SandboxConfig::default());
        let mut props = Props::new();
        props.insert("disabled".into(), String::new());
        let html = (table.get("Input").unwrap())(&props, "ignored").unwrap();
        assert_eq!(html, "<input class=\"canvas-input\" disabled>");
    }
}
