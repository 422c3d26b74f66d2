use crate::{config::UploadConfig, error::ValidationError};
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt};

/// URL prefix the upload directory is served under.
pub const PUBLIC_UPLOAD_PATH: &str = "static/uploads";

const FALLBACK_STEM: &str = "upload";
const SUFFIX_LEN: usize = 8;
const MAX_NAME_ATTEMPTS: usize = 3;

/// Lower-cased text after the last `.`, if any.
pub fn extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
}

pub fn allowed_file(filename: &str, allowed: &[String]) -> bool {
    match extension(filename) {
        Some(ext) => allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)),
        None => false,
    }
}

/// Reduces a client-supplied name to `[A-Za-z0-9_.-]` with no path components.
pub fn secure_filename(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

fn random_suffix() -> String {
    format!("{:08x}", rand::random::<u32>())
}

/// Sanitized stem of `filename` plus a random suffix, keeping its extension.
pub fn unique_filename(filename: &str) -> String {
    let (stem, ext) = match filename.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext.to_lowercase())),
        None => (filename, None),
    };

    let mut stem = secure_filename(stem);
    if stem.is_empty() {
        stem = FALLBACK_STEM.to_string();
    }

    let ext = ext
        .map(|e| secure_filename(&e))
        .filter(|e| !e.is_empty());

    let suffix = random_suffix();
    debug_assert_eq!(suffix.len(), SUFFIX_LEN);

    match ext {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext),
        None => format!("{}_{}", stem, suffix),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredUpload {
    pub file_name: String,
    pub path: PathBuf,
    pub size: usize,
}

impl StoredUpload {
    /// Path relative to the site root, as rendered in `<img src>`.
    pub fn public_path(&self) -> String {
        format!("{}/{}", PUBLIC_UPLOAD_PATH, self.file_name)
    }
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    max_bytes: usize,
    allowed_extensions: Vec<String>,
}

impl UploadStore {
    pub async fn new(config: &UploadConfig) -> io::Result<Self> {
        fs::create_dir_all(&config.dir).await?;
        Ok(Self {
            dir: config.dir.clone(),
            max_bytes: config.max_bytes,
            allowed_extensions: config.allowed_extensions.clone(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn validate(&self, filename: &str, size: usize) -> Result<(), ValidationError> {
        if !allowed_file(filename, &self.allowed_extensions) {
            return Err(ValidationError::InvalidExtension(
                extension(filename).unwrap_or_default(),
            ));
        }
        if size > self.max_bytes {
            return Err(ValidationError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Writes `data` under a fresh name derived from `filename`, never overwriting.
    pub async fn save(&self, filename: &str, data: &[u8]) -> io::Result<StoredUpload> {
        let mut last_err = None;
        for _ in 0..MAX_NAME_ATTEMPTS {
            let file_name = unique_filename(filename);
            let path = self.dir.join(&file_name);

            let file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;

            match file {
                Ok(mut file) => {
                    file.write_all(data).await?;
                    file.flush().await?;
                    return Ok(StoredUpload {
                        file_name,
                        path,
                        size: data.len(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::debug!("Upload name {} already taken, retrying", file_name);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| io::Error::other("could not allocate an upload name")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        UploadConfig::default().allowed_extensions
    }

    #[test]
    fn test_allowed_extensions_any_case() {
        let allowed = allowed();
        for ext in ["png", "jpg", "jpeg", "gif", "bmp", "webp"] {
            assert!(allowed_file(&format!("scan.{}", ext), &allowed));
            assert!(allowed_file(&format!("scan.{}", ext.to_uppercase()), &allowed));
        }
        assert!(allowed_file("Chest.X-Ray.JpEg", &allowed));
    }

    #[test]
    fn test_rejected_extensions() {
        let allowed = allowed();
        for name in ["notes.txt", "archive.tar.gz", "scan", "scan.", "png", "scan.jpg.exe"] {
            assert!(!allowed_file(name, &allowed), "{} should be rejected", name);
        }
    }

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("My cool movie.mov"), "My_cool_movie.mov");
        assert_eq!(secure_filename("../../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("..\\windows\\x.png"), "windows_x.png");
        assert_eq!(secure_filename("i contain cool \u{fc}ml\u{e4}uts.txt"), "i_contain_cool_mluts.txt");
        assert_eq!(secure_filename("<script>.png"), "script.png");
        assert_eq!(secure_filename("..."), "");
    }

    #[test]
    fn test_unique_filename_keeps_extension() {
        let name = unique_filename("chest xray.JPG");
        assert!(name.starts_with("chest_xray_"));
        assert!(name.ends_with(".jpg"));
        assert_eq!(name.len(), "chest_xray_".len() + SUFFIX_LEN + ".jpg".len());
    }

    #[test]
    fn test_unique_filename_falls_back_on_empty_stem() {
        let name = unique_filename("\u{444}\u{43e}\u{442}\u{43e}.png");
        assert!(name.starts_with("upload_"));
        assert!(name.ends_with(".png"));
        assert!(!unique_filename("../.png").contains('/'));
    }

    #[test]
    fn test_same_name_gets_distinct_names() {
        let first = unique_filename("scan.png");
        let second = unique_filename("scan.png");
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_store_saves_distinct_files() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        let config = UploadConfig {
            dir: temp.path().join("uploads"),
            ..UploadConfig::default()
        };
        let store = UploadStore::new(&config).await?;

        let first = store.save("scan.png", b"first").await?;
        let second = store.save("scan.png", b"second").await?;

        assert_ne!(first.path, second.path);
        assert_eq!(std::fs::read(&first.path)?, b"first");
        assert_eq!(std::fs::read(&second.path)?, b"second");
        assert_eq!(first.size, 5);
        assert!(first.public_path().starts_with("static/uploads/scan_"));
        Ok(())
    }

    #[tokio::test]
    async fn test_store_validation() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        let config = UploadConfig {
            dir: temp.path().to_path_buf(),
            max_bytes: 10,
            ..UploadConfig::default()
        };
        let store = UploadStore::new(&config).await?;

        assert!(store.validate("scan.png", 10).is_ok());
        assert!(matches!(
            store.validate("scan.png", 11),
            Err(ValidationError::TooLarge { size: 11, limit: 10 })
        ));
        assert!(matches!(
            store.validate("scan.txt", 1),
            Err(ValidationError::InvalidExtension(ext)) if ext == "txt"
        ));
        Ok(())
    }
}
