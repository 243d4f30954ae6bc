//! ONNX chart-to-text backend — local inference on an exported chart-captioning
//! model (deplot-style encoder/decoder).
//!
//! Uses the `ort` crate for ONNX Runtime and `tokenizers` for the text side.
//! The exported graph takes `pixel_values` (1x3x512x512), the tokenized
//! instruction as `input_ids`, and the decoded-so-far sequence as
//! `decoder_input_ids`; it returns next-token logits. Generation is a greedy
//! argmax loop capped at `max_new_tokens`.

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::config::VisionFileConfig;
use crate::vision::{ChartVision, VisionError, INSTRUCTION};

/// Input image edge length expected by the exported model.
const IMAGE_SIZE: u32 = 512;

/// Local ONNX chart-to-text client.
pub struct OnnxChartVision {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<tokenizers::Tokenizer>,
    max_new_tokens: usize,
}

impl std::fmt::Debug for OnnxChartVision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxChartVision")
            .field("max_new_tokens", &self.max_new_tokens)
            .finish_non_exhaustive()
    }
}

impl OnnxChartVision {
    /// Load the ONNX model and tokenizer from the configured paths.
    ///
    /// Returns `VisionError::ModelNotFound` if either file is missing.
    pub fn new(config: VisionFileConfig) -> Result<Self, VisionError> {
        if !Path::new(&config.model_path).exists() {
            return Err(VisionError::ModelNotFound {
                path: config.model_path,
            });
        }
        if !Path::new(&config.tokenizer_path).exists() {
            return Err(VisionError::ModelNotFound {
                path: config.tokenizer_path,
            });
        }

        let session = Session::builder()
            .and_then(|b| Ok(b.with_intra_threads(1)?))
            .and_then(|mut b| b.commit_from_file(&config.model_path))
            .map_err(|e| VisionError::Inference(e.to_string()))?;

        let tokenizer = tokenizers::Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| VisionError::Tokenizer(e.to_string()))?;

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            max_new_tokens: config.max_new_tokens,
        })
    }
}

#[async_trait]
impl ChartVision for OnnxChartVision {
    async fn generate(&self, image_bytes: &[u8]) -> Result<String, VisionError> {
        // Decoding is CPU-bound — run on the blocking thread pool.
        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let max_new_tokens = self.max_new_tokens;
        let pixels = preprocess_image(image_bytes)?;

        tokio::task::spawn_blocking(move || {
            let mut session_guard = session
                .lock()
                .map_err(|e| VisionError::Inference(format!("session lock poisoned: {e}")))?;
            generate_sync(&mut session_guard, &tokenizer, pixels, max_new_tokens)
        })
        .await
        .map_err(|e| VisionError::Inference(format!("spawn_blocking join error: {e}")))?
    }

    fn name(&self) -> &str {
        "onnx"
    }
}

/// Decode the image and produce a 1x3x512x512 channel-first pixel buffer
/// scaled to [0, 1].
fn preprocess_image(image_bytes: &[u8]) -> Result<Vec<f32>, VisionError> {
    let img = image::load_from_memory(image_bytes)
        .map_err(|e| VisionError::InvalidImage(e.to_string()))?;
    let resized = img
        .resize_exact(IMAGE_SIZE, IMAGE_SIZE, image::imageops::FilterType::Triangle)
        .to_rgb8();

    let size = (IMAGE_SIZE * IMAGE_SIZE) as usize;
    let mut pixels = vec![0.0f32; 3 * size];
    for (i, pixel) in resized.pixels().enumerate() {
        for c in 0..3 {
            pixels[c * size + i] = f32::from(pixel.0[c]) / 255.0;
        }
    }
    Ok(pixels)
}

/// Greedy autoregressive decode.
fn generate_sync(
    session: &mut Session,
    tokenizer: &tokenizers::Tokenizer,
    pixels: Vec<f32>,
    max_new_tokens: usize,
) -> Result<String, VisionError> {
    // Tokenize the fixed instruction for the text encoder input.
    let encoding = tokenizer
        .encode(INSTRUCTION, true)
        .map_err(|e| VisionError::Tokenizer(e.to_string()))?;
    let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| i64::from(id)).collect();

    let pad_id = i64::from(tokenizer.token_to_id("<pad>").unwrap_or(0));
    let eos_id = i64::from(tokenizer.token_to_id("</s>").unwrap_or(1));

    // Decoder starts from the pad token, matching the exported model's generation config.
    let mut decoder_ids: Vec<i64> = vec![pad_id];

    for _ in 0..max_new_tokens {
        let next = decode_step(session, &pixels, &input_ids, &decoder_ids)?;
        if next == eos_id {
            break;
        }
        decoder_ids.push(next);
    }

    let generated: Vec<u32> = decoder_ids[1..]
        .iter()
        .filter_map(|&id| u32::try_from(id).ok())
        .collect();
    tokenizer
        .decode(&generated, true)
        .map_err(|e| VisionError::Tokenizer(e.to_string()))
}

/// Run one forward pass and return the argmax token at the last position.
fn decode_step(
    session: &mut Session,
    pixels: &[f32],
    input_ids: &[i64],
    decoder_ids: &[i64],
) -> Result<i64, VisionError> {
    let pixel_shape = vec![1i64, 3, i64::from(IMAGE_SIZE), i64::from(IMAGE_SIZE)];
    let pixel_tensor = Tensor::from_array((pixel_shape, pixels.to_vec()))
        .map_err(|e| VisionError::Inference(e.to_string()))?;

    let input_tensor = Tensor::from_array((vec![1i64, input_ids.len() as i64], input_ids.to_vec()))
        .map_err(|e| VisionError::Inference(e.to_string()))?;

    let decoder_tensor = Tensor::from_array((
        vec![1i64, decoder_ids.len() as i64],
        decoder_ids.to_vec(),
    ))
    .map_err(|e| VisionError::Inference(e.to_string()))?;

    let inputs = ort::inputs! {
        "pixel_values" => pixel_tensor,
        "input_ids" => input_tensor,
        "decoder_input_ids" => decoder_tensor,
    };

    let outputs = session
        .run(inputs)
        .map_err(|e| VisionError::Inference(e.to_string()))?;

    // Logits shape: [1, decoder_len, vocab]
    let (shape, logits) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| VisionError::Inference(e.to_string()))?;

    if shape.len() != 3 {
        return Err(VisionError::Inference(format!(
            "Expected 3D logits, got {}D",
            shape.len()
        )));
    }
    let seq_len = shape[1] as usize;
    let vocab = shape[2] as usize;
    if seq_len == 0 || vocab == 0 {
        return Err(VisionError::Inference("empty logits".to_string()));
    }

    let last = &logits[(seq_len - 1) * vocab..seq_len * vocab];
    let next = last
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i as i64)
        .unwrap_or(0);

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_file_is_reported() {
        let config = VisionFileConfig {
            model_path: "/nonexistent/chart2table.onnx".to_string(),
            tokenizer_path: "/nonexistent/tokenizer.json".to_string(),
            max_new_tokens: 512,
        };
        let result = OnnxChartVision::new(config);
        match result {
            Err(VisionError::ModelNotFound { path }) => {
                assert!(path.contains("nonexistent"), "path was: {path}");
            }
            other => panic!("Expected ModelNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn preprocess_produces_channel_first_buffer() {
        let mut img = image::RgbImage::new(2, 2);
        img.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");

        let pixels = preprocess_image(&bytes).expect("preprocess");
        assert_eq!(pixels.len(), 3 * (IMAGE_SIZE * IMAGE_SIZE) as usize);
        assert!(pixels.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let result = preprocess_image(b"definitely not an image");
        assert!(matches!(result, Err(VisionError::InvalidImage(_))));
    }
}
