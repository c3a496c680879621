//! Configuration types for the voice web-chat pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the voice chat system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceChatConfig {
    /// Speech capture settings.
    pub capture: CaptureConfig,
    /// Conversation turn-taking settings.
    pub conversation: ConversationConfig,
    /// Page scraping settings.
    pub scrape: ScrapeConfig,
    /// Text generation settings.
    pub llm: LlmConfig,
    /// Speech synthesis settings.
    pub tts: TtsConfig,
}

/// Speech capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// BCP 47 locale tag for the recognizer, fixed for the session.
    pub locale: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            locale: "en-AU".to_owned(),
        }
    }
}

/// Conversation turn-taking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Automatically re-open the microphone after the assistant finishes
    /// speaking.
    pub continuous: bool,
    /// Delay in ms between natural playback end and the next listening
    /// window. Must be nonzero: the platform needs a moment to tear down
    /// the output stream before the microphone reopens.
    pub relisten_delay_ms: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            continuous: true,
            relisten_delay_ms: 300,
        }
    }
}

/// Page scraping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum characters of extracted page text kept as context.
    pub max_content_chars: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            max_content_chars: 100_000,
        }
    }
}

/// Text generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the Gemini-compatible API.
    pub api_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Model used for chat replies.
    pub model: String,
    /// Model used for the grounded-summary fallback when scraping fails.
    pub summary_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://generativelanguage.googleapis.com/v1beta".to_owned(),
            api_key_env: "GEMINI_API_KEY".to_owned(),
            model: "gemini-2.5-flash".to_owned(),
            summary_model: "gemini-2.5-flash".to_owned(),
        }
    }
}

/// Speech synthesis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Model used for speech synthesis.
    pub model: String,
    /// Voice name passed to the synthesis model.
    pub voice: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-preview-tts".to_owned(),
            voice: "Kore".to_owned(),
        }
    }
}

impl VoiceChatConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::ChatError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::ChatError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/sitevoice/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("sitevoice").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("sitevoice")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/sitevoice-config/config.toml")
        }
    }

    /// Resolve the API key from the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is unset or empty.
    pub fn resolve_api_key(&self) -> crate::error::Result<String> {
        match std::env::var(&self.llm.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(crate::error::ChatError::Config(format!(
                "API key environment variable {} is not set",
                self.llm.api_key_env
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = VoiceChatConfig::default();
        assert!(!config.capture.locale.is_empty());
        assert!(config.conversation.continuous);
        assert!(config.conversation.relisten_delay_ms > 0);
        assert!(config.scrape.timeout_secs > 0);
        assert!(config.scrape.max_content_chars > 0);
        assert!(!config.llm.model.is_empty());
        assert!(!config.tts.model.is_empty());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = std::env::temp_dir().join("sitevoice-test-config-roundtrip");
        let path = dir.join("config.toml");

        let mut config = VoiceChatConfig::default();
        config.capture.locale = "en-GB".to_owned();
        config.conversation.continuous = false;
        config.conversation.relisten_delay_ms = 500;

        assert!(config.save_to_file(&path).is_ok());
        assert!(path.exists());

        let loaded = VoiceChatConfig::from_file(&path).unwrap();
        assert_eq!(loaded.capture.locale, "en-GB");
        assert!(!loaded.conversation.continuous);
        assert_eq!(loaded.conversation.relisten_delay_ms, 500);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result =
            VoiceChatConfig::from_file(std::path::Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = std::env::temp_dir().join("sitevoice-test-config-invalid");
        let path = dir.join("bad.toml");
        let _ = std::fs::create_dir_all(&dir);
        std::fs::write(&path, "this is not valid toml {{{").ok();

        let result = VoiceChatConfig::from_file(&path);
        assert!(result.is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: VoiceChatConfig = toml::from_str("[conversation]\ncontinuous = false\n").unwrap();
        assert!(!config.conversation.continuous);
        assert_eq!(config.conversation.relisten_delay_ms, 300);
        assert_eq!(config.capture.locale, "en-AU");
    }

    #[test]
    fn resolve_api_key_missing_env_is_error() {
        let mut config = VoiceChatConfig::default();
        config.llm.api_key_env = "SITEVOICE_TEST_KEY_THAT_DOES_NOT_EXIST".to_owned();
        assert!(config.resolve_api_key().is_err());
    }
}
