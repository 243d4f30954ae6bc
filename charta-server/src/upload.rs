//! Uploaded chart handling: extension allow-list and temp-file lifecycle.

use charta_core::config::UploadConfig;
use tempfile::NamedTempFile;

/// True when the filename has an extension on the allow-list.
pub fn allowed_extension(filename: &str, config: &UploadConfig) -> bool {
    let Some((_, ext)) = filename.rsplit_once('.') else {
        return false;
    };
    let ext = ext.to_lowercase();
    config.allowed_extensions.iter().any(|a| *a == ext)
}

/// Write the upload to a temp file. The file is deleted when the returned
/// handle drops, so cleanup happens on every exit path.
pub fn save_temp(bytes: &[u8]) -> std::io::Result<NamedTempFile> {
    let file = NamedTempFile::new()?;
    std::fs::write(file.path(), bytes)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> UploadConfig {
        UploadConfig::default()
    }

    #[test]
    fn image_extensions_are_allowed() {
        for name in ["chart.png", "chart.jpg", "chart.jpeg", "chart.gif", "CHART.PNG"] {
            assert!(allowed_extension(name, &config()), "{name} should pass");
        }
    }

    #[test]
    fn other_extensions_are_rejected() {
        for name in ["notes.txt", "chart.pdf", "noextension", ""] {
            assert!(!allowed_extension(name, &config()), "{name} should fail");
        }
    }

    #[test]
    fn temp_file_is_removed_on_drop() {
        let file = save_temp(b"fake image bytes").expect("save");
        let path = file.path().to_path_buf();
        assert_eq!(std::fs::read(&path).expect("read back"), b"fake image bytes");
        drop(file);
        assert!(!path.exists());
    }
}
