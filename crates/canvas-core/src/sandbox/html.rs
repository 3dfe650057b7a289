//! Isolated documents for the HTML target.
//!
//! The document is meant for an iframe `srcdoc` with
//! `sandbox="allow-scripts"`: scripts run, but without same-origin access
//! the frame gets no storage, cookies, or reach into the host page. The CSP
//! additionally blocks every network fetch.

use std::collections::BTreeMap;

use tracing::warn;

/// The iframe sandbox attribute value.
pub const SANDBOX_POLICY: &str = "allow-scripts";

/// Content security policy injected into every document.
pub const CONTENT_SECURITY_POLICY: &str =
    "default-src 'none'; script-src 'unsafe-inline'; style-src 'unsafe-inline'; img-src data:";

const DEFAULT_CLASSES: &[(&str, &str)] = &[
    ("block", "display: block"),
    ("inline-block", "display: inline-block"),
    ("hidden", "display: none"),
    ("flex", "display: flex"),
    ("grid", "display: grid"),
    ("flex-col", "flex-direction: column"),
    ("flex-row", "flex-direction: row"),
    ("flex-wrap", "flex-wrap: wrap"),
    ("items-center", "align-items: center"),
    ("justify-center", "justify-content: center"),
    ("justify-between", "justify-content: space-between"),
    ("gap-2", "gap: 0.5rem"),
    ("gap-4", "gap: 1rem"),
    ("p-2", "padding: 0.5rem"),
    ("p-4", "padding: 1rem"),
    ("p-6", "padding: 1.5rem"),
    ("px-4", "padding-left: 1rem; padding-right: 1rem"),
    ("py-2", "padding-top: 0.5rem; padding-bottom: 0.5rem"),
    ("m-2", "margin: 0.5rem"),
    ("m-4", "margin: 1rem"),
    ("mx-auto", "margin-left: auto; margin-right: auto"),
    ("mt-4", "margin-top: 1rem"),
    ("mb-4", "margin-bottom: 1rem"),
    ("w-full", "width: 100%"),
    ("h-full", "height: 100%"),
    ("min-h-screen", "min-height: 100vh"),
    ("max-w-md", "max-width: 28rem"),
    ("text-left", "text-align: left"),
    ("text-center", "text-align: center"),
    ("text-sm", "font-size: 0.875rem"),
    ("text-lg", "font-size: 1.125rem"),
    ("text-xl", "font-size: 1.25rem"),
    ("text-2xl", "font-size: 1.5rem"),
    ("font-semibold", "font-weight: 600"),
    ("font-bold", "font-weight: 700"),
    ("text-white", "color: #ffffff"),
    ("text-gray-500", "color: #6b7280"),
    ("text-gray-700", "color: #374151"),
    ("bg-white", "background-color: #ffffff"),
    ("bg-gray-100", "background-color: #f3f4f6"),
    ("bg-blue-500", "background-color: #3b82f6"),
    ("border", "border: 1px solid #e5e7eb"),
    ("rounded", "border-radius: 0.25rem"),
    ("rounded-lg", "border-radius: 0.5rem"),
    ("shadow", "box-shadow: 0 1px 3px rgba(0,0,0,0.1)"),
    ("shadow-lg", "box-shadow: 0 10px 15px rgba(0,0,0,0.1)"),
];

/// Maps a fixed table of utility classes to inline CSS once the document
/// loads. Classes outside the table are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleShim {
    classes: BTreeMap<String, String>,
}

impl Default for StyleShim {
    fn default() -> Self {
        Self {
            classes: DEFAULT_CLASSES
                .iter()
                .map(|(class, css)| (class.to_string(), css.to_string()))
                .collect(),
        }
    }
}

impl StyleShim {
    /// Add or override table entries.
    pub fn with_extra(mut self, extra: BTreeMap<String, String>) -> Self {
        self.classes.extend(extra);
        self
    }

    pub fn css_for(&self, class: &str) -> Option<&str> {
        self.classes.get(class).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Inline CSS for a whole `class` attribute value.
    pub fn resolve(&self, class_list: &str) -> String {
        class_list
            .split_whitespace()
            .filter_map(|class| self.css_for(class))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// The script body that applies the table on load.
    pub fn script(&self) -> String {
        let table = serde_json::to_string(&self.classes).unwrap_or_else(|e| {
            warn!(error = %e, "failed to encode style shim table");
            "{}".to_string()
        });
        // `</` would terminate the script element early.
        let table = table.replace("</", "<\\/");
        format!(
            "(function () {{\n\
             \x20 var table = {table};\n\
             \x20 function apply() {{\n\
             \x20   document.querySelectorAll('[class]').forEach(function (el) {{\n\
             \x20     el.classList.forEach(function (name) {{\n\
             \x20       var css = table[name];\n\
             \x20       if (css) {{ el.style.cssText += ';' + css; }}\n\
             \x20     }});\n\
             \x20   }});\n\
             \x20 }}\n\
             \x20 if (document.readyState === 'loading') {{\n\
             \x20   document.addEventListener('DOMContentLoaded', apply);\n\
             \x20 }} else {{\n\
             \x20   apply();\n\
             \x20 }}\n\
             }})();"
        )
    }
}

/// A complete, self-contained document for an isolated frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxDocument {
    pub srcdoc: String,
}

impl SandboxDocument {
    /// Inject `markup` unchanged together with the CSP and style shim.
    ///
    /// Full documents keep their own structure; fragments get a minimal
    /// document around them.
    pub fn build(markup: &str, shim: &StyleShim) -> Self {
        let csp = format!(
            "<meta http-equiv=\"Content-Security-Policy\" content=\"{CONTENT_SECURITY_POLICY}\">"
        );
        let script = format!("<script>{}</script>", shim.script());
        let lower = markup.to_ascii_lowercase();

        let srcdoc = if lower.contains("<html") {
            let mut doc = markup.to_string();
            match lower.find("</body>") {
                Some(at) => doc.insert_str(at, &script),
                None => doc.push_str(&script),
            }
            let head_end = lower
                .find("<head>")
                .or_else(|| lower.find("<head "))
                .or_else(|| lower.find("<html"))
                .and_then(|start| lower[start..].find('>').map(|offset| start + offset + 1));
            match head_end {
                Some(at) => doc.insert_str(at, &csp),
                None => doc.insert_str(0, &csp),
            }
            doc
        } else {
            format!(
                "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n{csp}\n</head>\n<body>\n{markup}\n{script}\n</body>\n</html>\n"
            )
        };

        Self { srcdoc }
    }

    /// An `<iframe>` element carrying this document.
    pub fn iframe(&self) -> String {
        format!(
            "<iframe sandbox=\"{SANDBOX_POLICY}\" srcdoc=\"{}\"></iframe>",
            super::bindings::escape_html(&self.srcdoc)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_gets_minimal_document() {
        let doc = SandboxDocument::build("<div class=\"p-4\">Hi</div>", &StyleShim::default());
        assert!(doc.srcdoc.starts_with("<!DOCTYPE html>"));
        assert!(doc.srcdoc.contains("<div class=\"p-4\">Hi</div>"));
        assert!(doc.srcdoc.contains(CONTENT_SECURITY_POLICY));
        assert!(doc.srcdoc.contains("\"p-4\":\"padding: 1rem\""));
    }

    #[test]
    fn full_document_keeps_its_structure() {
        let markup = "<!DOCTYPE html><html><head><title>t</title></head><body><p>x</p></body></html>";
        let doc = SandboxDocument::build(markup, &StyleShim::default());
        let csp_at = doc.srcdoc.find("Content-Security-Policy").unwrap();
        let title_at = doc.srcdoc.find("<title>").unwrap();
        let script_at = doc.srcdoc.find("<script>").unwrap();
        let body_end = doc.srcdoc.find("</body>").unwrap();
        assert!(csp_at < title_at);
        assert!(script_at < body_end);
        assert_eq!(doc.srcdoc.matches("<html").count(), 1);
    }

    #[test]
    fn iframe_is_sandboxed_and_escaped() {
        let doc = SandboxDocument::build("<p title=\"a\">x</p>", &StyleShim::default());
        let iframe = doc.iframe();
        assert!(iframe.starts_with("<iframe sandbox=\"allow-scripts\" srcdoc=\""));
        assert!(!iframe.contains("allow-same-origin"));
        assert!(iframe.contains("&lt;p title=&quot;a&quot;&gt;"));
    }

    #[test]
    fn shim_resolves_known_classes_only() {
        let shim = StyleShim::default();
        assert_eq!(shim.resolve("p-4 unknown font-bold"), "padding: 1rem; font-weight: 700");
        assert_eq!(shim.resolve("nope"), "");
    }

    #[test]
    fn extra_classes_extend_and_override() {
        let mut extra = BTreeMap::new();
        extra.insert("brand".to_string(), "color: #ff6600".to_string());
        extra.insert("p-4".to_string(), "padding: 2rem".to_string());
        let shim = StyleShim::default().with_extra(extra);
        assert_eq!(shim.css_for("brand"), Some("color: #ff6600"));
        assert_eq!(shim.css_for("p-4"), Some("padding: 2rem"));
        assert_eq!(shim.len(), DEFAULT_CLASSES.len() + 1);
    }

    #[test]
    fn script_cannot_close_its_element() {
        let mut extra = BTreeMap::new();
        extra.insert("x".to_string(), "content: '</script>'".to_string());
        let script = StyleShim::default().with_extra(extra).script();
        assert!(!script.contains("</script>"));
    }
}
