//! The generate request sent to the backend proxy route.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::framework::{Framework, FrameworkParseError};

pub const MAX_PROMPT_CHARS: usize = 5000;
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("prompt cannot be empty")]
    EmptyPrompt,

    #[error("prompt too long ({0} characters, max 5000)")]
    PromptTooLong(usize),

    #[error("invalid base64 image: {0}")]
    InvalidBase64(String),

    #[error("image too large: {:.1}MB (max 10MB)", megabytes(.0))]
    ImageTooLarge(usize),

    #[error("unsupported image format (only JPEG, PNG and GIF)")]
    UnsupportedImage,

    #[error(transparent)]
    Framework(#[from] FrameworkParseError),

    #[error("invalid history role {0:?} (expected user or assistant)")]
    InvalidRole(String),
}

fn megabytes(bytes: &usize) -> f64 {
    *bytes as f64 / 1024.0 / 1024.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
}

impl ImageFormat {
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"\xff\xd8\xff") {
            Some(Self::Jpeg)
        } else if bytes.starts_with(b"\x89PNG") {
            Some(Self::Png)
        } else if bytes.starts_with(b"GIF") {
            Some(Self::Gif)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

/// JSON body of a generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(rename = "base64Image", default, skip_serializing_if = "Option::is_none")]
    pub base64_image: Option<String>,
    #[serde(default = "default_framework")]
    pub framework: String,
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
}

fn default_framework() -> String {
    backend_name(Framework::ReactLike).to_string()
}

/// Framework name in the backend's request schema.
pub fn backend_name(framework: Framework) -> &'static str {
    match framework {
        Framework::Html => "html",
        Framework::ReactLike => "react",
        Framework::VueLike => "vue",
        Framework::FrameworkComponent => "nextjs",
    }
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub request: GenerateRequest,
    pub framework: Framework,
    pub image: Option<ImageFormat>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, framework: Framework) -> Self {
        Self {
            prompt: prompt.into(),
            base64_image: None,
            framework: backend_name(framework).to_string(),
            history: Vec::new(),
        }
    }

    pub fn with_image(mut self, base64_image: impl Into<String>) -> Self {
        self.base64_image = Some(base64_image.into());
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryMessage>) -> Self {
        self.history = history;
        self
    }

    /// Validate and canonicalize. The returned request carries the trimmed
    /// prompt and the backend's framework name.
    pub fn validate(mut self) -> Result<ValidatedRequest, RequestError> {
        if self.prompt.trim().is_empty() {
            return Err(RequestError::EmptyPrompt);
        }
        let chars = self.prompt.chars().count();
        if chars > MAX_PROMPT_CHARS {
            return Err(RequestError::PromptTooLong(chars));
        }
        self.prompt = self.prompt.trim().to_string();

        let image = match self.base64_image.as_deref() {
            Some(encoded) => Some(check_image(encoded)?),
            None => None,
        };

        let framework: Framework = self.framework.parse()?;
        self.framework = backend_name(framework).to_string();

        if let Some(bad) = self
            .history
            .iter()
            .find(|m| !matches!(m.role.as_str(), "user" | "assistant"))
        {
            return Err(RequestError::InvalidRole(bad.role.clone()));
        }

        Ok(ValidatedRequest {
            request: self,
            framework,
            image,
        })
    }
}

fn check_image(encoded: &str) -> Result<ImageFormat, RequestError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| RequestError::InvalidBase64(e.to_string()))?;
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(RequestError::ImageTooLarge(bytes.len()));
    }
    ImageFormat::sniff(&bytes).ok_or(RequestError::UnsupportedImage)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n0000";

    #[test]
    fn prompt_is_trimmed_and_framework_canonicalized() {
        let mut request = GenerateRequest::new("  build a card  ", Framework::Html);
        request.framework = "react-like".into();
        let valid = request.validate().unwrap();
        assert_eq!(valid.request.prompt, "build a card");
        assert_eq!(valid.request.framework, "react");
        assert_eq!(valid.framework, Framework::ReactLike);
        assert_eq!(valid.image, None);
    }

    #[test]
    fn prompt_limits() {
        assert_eq!(
            GenerateRequest::new("   ", Framework::Html).validate(),
            Err(RequestError::EmptyPrompt)
        );
        let long = "x".repeat(MAX_PROMPT_CHARS + 1);
        assert_eq!(
            GenerateRequest::new(long, Framework::Html).validate(),
            Err(RequestError::PromptTooLong(MAX_PROMPT_CHARS + 1))
        );
        let exact = "é".repeat(MAX_PROMPT_CHARS);
        assert!(GenerateRequest::new(exact, Framework::Html).validate().is_ok());

        // Blank beats too long.
        let blank = " ".repeat(MAX_PROMPT_CHARS + 1000);
        assert_eq!(
            GenerateRequest::new(blank, Framework::Html).validate(),
            Err(RequestError::EmptyPrompt)
        );
    }

    #[test]
    fn image_checks() {
        let png = STANDARD.encode(PNG_HEADER);
        let valid = GenerateRequest::new("p", Framework::ReactLike)
            .with_image(png)
            .validate()
            .unwrap();
        assert_eq!(valid.image, Some(ImageFormat::Png));

        let text = STANDARD.encode(b"hello");
        assert_eq!(
            GenerateRequest::new("p", Framework::ReactLike).with_image(text).validate(),
            Err(RequestError::UnsupportedImage)
        );
        assert!(matches!(
            GenerateRequest::new("p", Framework::ReactLike)
                .with_image("not base64!")
                .validate(),
            Err(RequestError::InvalidBase64(_))
        ));
    }

    #[test]
    fn oversized_image_is_rejected() {
        let mut bytes = b"GIF89a".to_vec();
        bytes.resize(MAX_IMAGE_BYTES + 1, 0);
        let err = GenerateRequest::new("p", Framework::Html)
            .with_image(STANDARD.encode(&bytes))
            .validate()
            .unwrap_err();
        assert_eq!(err, RequestError::ImageTooLarge(MAX_IMAGE_BYTES + 1));
        assert!(err.to_string().contains("max 10MB"));
    }

    #[test]
    fn unknown_framework_and_role() {
        let mut request = GenerateRequest::new("p", Framework::Html);
        request.framework = "svelte".into();
        assert!(matches!(request.validate(), Err(RequestError::Framework(_))));

        let request = GenerateRequest::new("p", Framework::Html).with_history(vec![HistoryMessage {
            role: "system".into(),
            content: "x".into(),
        }]);
        assert_eq!(
            request.validate(),
            Err(RequestError::InvalidRole("system".into()))
        );
    }

    #[test]
    fn wire_format_uses_camel_case_image() {
        let request = GenerateRequest::new("p", Framework::FrameworkComponent).with_image("AAAA");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["base64Image"], "AAAA");
        assert_eq!(json["framework"], "nextjs");

        let parsed: GenerateRequest = serde_json::from_str(r#"{"prompt": "hi"}"#).unwrap();
        assert_eq!(parsed.framework, "react");
        assert!(parsed.history.is_empty());
    }
}
