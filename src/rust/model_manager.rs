use std::path::{Path, PathBuf};
use std::fs;
use std::io;
use std::sync::Arc;
use std::env;
use tokio::sync::Mutex;
use sha2::{Sha256, Digest};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model file not found: {0}")]
    NotFound(PathBuf),
    #[error("Download error: {0}")]
    DownloadError(#[from] reqwest::Error),
    #[error("Download of {url} failed with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Model verification failed for {0}")]
    VerificationFailed(PathBuf),
    #[error("Hash mismatch: expected {expected}, got {actual} for {path}")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

/// Where a missing model file can be downloaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSource {
    pub url: String,
    /// Lowercase or uppercase hex SHA-256 of the file, checked when present
    pub sha256: Option<String>,
}

/// Resolves model files inside a models directory and fetches missing ones.
#[derive(Clone)]
pub struct ModelManager {
    models_dir: PathBuf,
    download_lock: Arc<Mutex<()>>,
}

/// Environment variable naming the cache root.
pub const CACHE_ENV: &str = "LIME_DASHBOARD_CACHE";

impl ModelManager {
    /// Models directory inside a cache root
    pub fn models_dir_in(cache_dir: impl AsRef<Path>) -> PathBuf {
        cache_dir.as_ref().join("models")
    }

    /// Returns the default models directory path
    pub fn default_models_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var(CACHE_ENV) {
            return Self::models_dir_in(path);
        }

        // 2. Use platform-specific cache directory
        if let Some(cache_dir) = dirs::cache_dir() {
            return cache_dir.join("lime-dashboard").join("models");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".cache").join("lime-dashboard").join("models");
        }

        // 4. If all else fails, use system temp directory
        env::temp_dir().join("lime-dashboard").join("models")
    }

    pub fn new<P: AsRef<Path>>(models_dir: P) -> io::Result<Self> {
        let models_dir = models_dir.as_ref().to_path_buf();
        fs::create_dir_all(&models_dir)?;
        Ok(Self {
            models_dir,
            download_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Joins relative paths onto the models directory; absolute paths are kept.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.models_dir.join(path)
        }
    }

    pub fn is_downloaded(&self, path: impl AsRef<Path>) -> bool {
        self.resolve(path).is_file()
    }

    pub fn verify_file(&self, path: impl AsRef<Path>, expected_hash: &str) -> Result<bool, ModelError> {
        let path = self.resolve(path);
        log::debug!("Verifying file: {:?}", path);
        let bytes = fs::read(&path)?;
        let hash = sha256_hex(&bytes);
        log::debug!("Calculated hash: {}, expected: {}", hash, expected_hash);
        Ok(hash.eq_ignore_ascii_case(expected_hash))
    }

    async fn download_and_verify_file(&self, source: &ModelSource, path: &Path) -> Result<(), ModelError> {
        log::info!("Downloading {} to {:?}", source.url, path);
        let response = reqwest::get(&source.url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ModelError::HttpStatus {
                url: source.url.clone(),
                status,
            });
        }
        let bytes = response.bytes().await?;
        log::info!("Downloaded {} bytes", bytes.len());

        if let Some(expected) = &source.sha256 {
            let hash = sha256_hex(&bytes);
            if !hash.eq_ignore_ascii_case(expected) {
                log::error!("Hash mismatch for {:?}: expected {}, got {}", path, expected, hash);
                return Err(ModelError::HashMismatch {
                    path: path.to_path_buf(),
                    expected: expected.clone(),
                    actual: hash,
                });
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &bytes)?;

        if let Some(expected) = &source.sha256 {
            if !self.verify_file(path, expected)? {
                return Err(ModelError::VerificationFailed(path.to_path_buf()));
            }
        }

        log::info!("{:?} downloaded successfully", path);
        Ok(())
    }

    pub fn remove_download(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let path = self.resolve(path);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Ensures that a model file exists and, when a hash is known, matches it.
    ///
    /// Missing or mismatching files are downloaded from `source`. Without a
    /// source a missing file is an error and an unverifiable file is accepted.
    pub async fn ensure_file(
        &self,
        path: impl AsRef<Path>,
        source: Option<&ModelSource>,
    ) -> Result<PathBuf, ModelError> {
        let path = self.resolve(path);
        let _lock = self.download_lock.lock().await;

        if path.is_file() {
            let expected = source.and_then(|s| s.sha256.as_deref());
            match expected {
                Some(expected) if !self.verify_file(&path, expected)? => {
                    log::warn!("{:?} failed verification, downloading again", path);
                }
                _ => {
                    log::debug!("{:?} is present", path);
                    return Ok(path);
                }
            }
        }

        let Some(source) = source else {
            return Err(ModelError::NotFound(path));
        };
        if let Err(e) = self.download_and_verify_file(source, &path).await {
            log::error!("Failed to fetch {:?}: {}", path, e);
            let _ = self.remove_download(&path);
            return Err(e);
        }
        Ok(path)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
