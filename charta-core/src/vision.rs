//! Chart-to-text vision backend.
//!
//! Abstraction over the in-process image-to-text model that turns a chart image
//! into raw table text (rows separated by `<0x0A>`, cells by `|`).

use async_trait::async_trait;
use thiserror::Error;

use crate::config::VisionFileConfig;

/// Instruction prepended to every chart, matching the prompt the model
/// was trained with.
pub const INSTRUCTION: &str = "Generate underlying data table of the figure below:";

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Model not found at {path}")]
    ModelNotFound { path: String },

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
}

/// Image-to-text model producing raw table text from an encoded chart image.
#[async_trait]
pub trait ChartVision: Send + Sync {
    /// Run the model on an encoded image (png/jpeg/gif bytes) and return the
    /// decoded text sequence.
    async fn generate(&self, image_bytes: &[u8]) -> Result<String, VisionError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Create the vision backend from configuration.
pub fn create_vision(config: &VisionFileConfig) -> Result<Box<dyn ChartVision>, VisionError> {
    Ok(Box::new(crate::onnx_vision::OnnxChartVision::new(
        config.clone(),
    )?))
}
