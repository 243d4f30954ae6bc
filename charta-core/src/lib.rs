pub mod config;
pub mod context;
pub mod ollama;
pub mod onnx_vision;
pub mod prompt;
pub mod status;
pub mod table;
pub mod vision;

pub use config::ChartaConfig;
pub use context::ConversationStore;
pub use ollama::{OllamaClient, OllamaError};
pub use onnx_vision::OnnxChartVision;
pub use status::{check_status, OllamaStatus, StatusCache};
pub use table::{extract_table, ChartTable, ExtractedTable};
pub use vision::{create_vision, ChartVision, VisionError};
