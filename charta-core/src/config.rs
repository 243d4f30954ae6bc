use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ChartaConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    pub vision: VisionFileConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; empty means wildcard (development).
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub default_model: String,
    /// Chart Q&A answers can be slow on constrained hardware.
    pub generate_timeout_secs: u64,
    pub tags_timeout_secs: u64,
    pub status_ttl_secs: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            default_model: "llama3".to_string(),
            generate_timeout_secs: 420,
            tags_timeout_secs: 5,
            status_ttl_secs: 30,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Paths to the exported chart-to-text ONNX model and its tokenizer.
#[derive(Debug, Deserialize, Clone)]
pub struct VisionFileConfig {
    pub model_path: String,
    pub tokenizer_path: String,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,
}

fn default_max_new_tokens() -> usize {
    512
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    pub max_bytes: usize,
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 16 * 1024 * 1024,
            allowed_extensions: vec![
                "png".to_string(),
                "jpg".to_string(),
                "jpeg".to_string(),
                "gif".to_string(),
            ],
        }
    }
}

impl ChartaConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_upload_allows_common_image_extensions() {
        let upload = UploadConfig::default();
        for ext in ["png", "jpg", "jpeg", "gif"] {
            assert!(upload.allowed_extensions.iter().any(|e| e == ext));
        }
        assert_eq!(upload.max_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn default_ollama_timeouts_match_service_expectations() {
        let ollama = OllamaConfig::default();
        assert_eq!(ollama.generate_timeout_secs, 420);
        assert_eq!(ollama.status_ttl_secs, 30);
    }
}
