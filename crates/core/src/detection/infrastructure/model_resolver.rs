use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

const APP_DIR: &str = "PrivacyGuard";
const CHUNK_SIZE: usize = 256 * 1024;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("failed to create model directory {path}: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Progress callback: `(bytes_downloaded, total_bytes)`, total 0 when unknown.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Locate the face model, downloading it into the user cache when absent.
///
/// An explicit `bundled_dir` is consulted after the cache and before the
/// network.
pub fn resolve(
    name: &str,
    url: &str,
    bundled_dir: Option<&Path>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    resolve_in(&model_cache_dir()?, name, url, bundled_dir, progress)
}

/// Same as [`resolve`] against an arbitrary cache directory.
pub fn resolve_in(
    cache_dir: &Path,
    name: &str,
    url: &str,
    bundled_dir: Option<&Path>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    let cached = cache_dir.join(name);
    if cached.is_file() {
        log::debug!("Using cached model {}", cached.display());
        return Ok(cached);
    }

    if let Some(bundled) = bundled_dir.map(|d| d.join(name)).filter(|p| p.is_file()) {
        log::debug!("Using bundled model {}", bundled.display());
        return Ok(bundled);
    }

    fs::create_dir_all(cache_dir).map_err(|source| ModelResolveError::CacheDir {
        path: cache_dir.to_path_buf(),
        source,
    })?;
    log::info!("Downloading {name} from {url}");
    download(url, &cached, progress)?;
    Ok(cached)
}

/// `PrivacyGuard/models` under the platform data dir on macOS, the cache
/// dir elsewhere.
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    let base = dirs::data_dir();
    #[cfg(not(target_os = "macos"))]
    let base = dirs::cache_dir();

    base.map(|d| d.join(APP_DIR).join("models"))
        .ok_or(ModelResolveError::NoCacheDir)
}

/// Streams `url` into a `.part` sibling of `dest` and renames on success.
fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let part = dest.with_extension("part");
    let result = stream_to(url, &part, progress)
        .and_then(|()| fs::rename(&part, dest).map_err(write_err(dest)));
    if result.is_err() {
        let _ = fs::remove_file(&part);
    }
    result
}

fn stream_to(url: &str, part: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|source| ModelResolveError::Download {
            url: url.to_string(),
            source,
        })?;
    let total = response.content_length().unwrap_or(0);

    let mut file = fs::File::create(part).map_err(write_err(part))?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        let n = response.read(&mut buf).map_err(write_err(part))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_err(part))?;
        written += n as u64;
        if let Some(cb) = &progress {
            cb(written, total);
        }
    }
    file.flush().map_err(write_err(part))
}

fn write_err(path: &Path) -> impl FnOnce(std::io::Error) -> ModelResolveError + '_ {
    move |source| ModelResolveError::Write {
        path: path.to_path_buf(),
        source,
    }
}
