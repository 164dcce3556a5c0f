use serde::Deserialize;
use std::{fs, path::Path};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub extraction: ExtractionSection,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "sessions/invoice_split.db".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extraction: ExtractionSection::default(),
            db_path: default_db_path(),
        }
    }
}

/// Which vision backend turns invoice photos into the encoded text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionBackend {
    Gemini,
    OpenAi,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionSection {
    #[serde(default = "default_backend")]
    pub backend: ExtractionBackend,
    #[serde(default)]
    pub gemini: GeminiEndpoint,
    #[serde(default)]
    pub openai: OpenAiEndpoint,
}

fn default_backend() -> ExtractionBackend {
    ExtractionBackend::Gemini
}

impl Default for ExtractionSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            gemini: GeminiEndpoint::default(),
            openai: OpenAiEndpoint::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiEndpoint {
    #[serde(default = "default_gemini_url")]
    pub base_url: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    /// Env var holding the API key; keys never live in the config file.
    #[serde(default = "default_gemini_key_env")]
    pub api_key_env: String,
}

fn default_gemini_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-1.5-pro".to_string()
}

fn default_gemini_key_env() -> String {
    "API_KEY".to_string()
}

impl Default for GeminiEndpoint {
    fn default() -> Self {
        Self {
            base_url: default_gemini_url(),
            model: default_gemini_model(),
            api_key_env: default_gemini_key_env(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiEndpoint {
    #[serde(default = "default_openai_url")]
    pub base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
}

fn default_openai_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for OpenAiEndpoint {
    fn default() -> Self {
        Self {
            base_url: default_openai_url(),
            model: default_openai_model(),
            api_key_env: default_openai_key_env(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.extraction.backend, ExtractionBackend::Gemini);
        assert_eq!(cfg.db_path, "sessions/invoice_split.db");
        assert_eq!(cfg.extraction.gemini.model, "gemini-1.5-pro");
    }

    #[test]
    fn backend_and_model_are_overridable() {
        let cfg: Config = toml::from_str(
            r#"
            db_path = "elsewhere.db"

            [extraction]
            backend = "openai"

            [extraction.openai]
            model = "gpt-4o"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.extraction.backend, ExtractionBackend::OpenAi);
        assert_eq!(cfg.extraction.openai.model, "gpt-4o");
        assert_eq!(cfg.db_path, "elsewhere.db");
    }
}
