//! Ripgrep binary cache: shared across sessions in one process, keyed by
//! user home directory, with a single in-flight download per key enforced
//! via a process-wide map of futures.
//!
//! Pinned to a specific ripgrep release rather than `latest`: a checksum is
//! only meaningful against a fixed artifact, and `latest` can change under
//! us between one caller's download and the next.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::LazyLock;

use sha2::Digest;
use sha2::Sha256;
use tokio::sync::Mutex;
use tokio::sync::OnceCell;

use crate::error::CoworkErr;
use crate::error::Result;

static IN_FLIGHT: LazyLock<Mutex<HashMap<PathBuf, Arc<OnceCell<PathBuf>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

const RIPGREP_VERSION: &str = "14.1.1";

/// `~/.cowork/bin/rg`, downloading a checksummed release into place the
/// first time any caller asks for a given home directory.
pub async fn ensure_ripgrep(home: &Path) -> Result<PathBuf> {
    let cell = {
        let mut guard = IN_FLIGHT.lock().await;
        guard
            .entry(home.to_path_buf())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    };

    cell.get_or_try_init(|| download_and_verify(home))
        .await
        .cloned()
}

/// One release asset: its download URL, the archive member path of the
/// `rg` binary inside it, and the expected sha256 of the archive bytes
/// (copied from ripgrep's published checksums for `RIPGREP_VERSION`;
/// update all three together on a version bump).
struct ReleaseAsset {
    url: &'static str,
    archive_entry: &'static str,
    sha256: &'static str,
}

async fn download_and_verify(home: &Path) -> Result<PathBuf> {
    let bin_dir = home.join(".cowork").join("bin");
    tokio::fs::create_dir_all(&bin_dir).await?;
    let dest = bin_dir.join(if cfg!(windows) { "rg.exe" } else { "rg" });

    if dest.exists() {
        return Ok(dest);
    }

    let asset = ripgrep_release_asset();
    let response = reqwest::get(asset.url).await?;
    if !response.status().is_success() {
        return Err(CoworkErr::Other(format!(
            "failed to download ripgrep release: {}",
            response.status()
        )));
    }
    let bytes = response.bytes().await?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = format!("{:x}", hasher.finalize());
    if digest != asset.sha256 {
        return Err(CoworkErr::Other(format!(
            "ripgrep download checksum mismatch: expected {}, got {digest}",
            asset.sha256
        )));
    }

    let binary = extract_binary(&bytes, asset.archive_entry, asset.url)?;
    tokio::fs::write(&dest, &binary).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = tokio::fs::metadata(&dest).await?.permissions();
        perms.set_mode(0o755);
        tokio::fs::set_permissions(&dest, perms).await?;
    }

    Ok(dest)
}

/// Pulls just the `rg` (or `rg.exe`) entry out of the downloaded archive.
fn extract_binary(archive_bytes: &[u8], entry_path: &str, url: &str) -> Result<Vec<u8>> {
    if url.ends_with(".zip") {
        let cursor = std::io::Cursor::new(archive_bytes);
        let mut zip = zip::ZipArchive::new(cursor)
            .map_err(|e| CoworkErr::Other(format!("invalid ripgrep zip archive: {e}")))?;
        let mut entry = zip
            .by_name(entry_path)
            .map_err(|e| CoworkErr::Other(format!("ripgrep zip missing {entry_path}: {e}")))?;
        let mut out = Vec::new();
        entry.read_to_end(&mut out)?;
        Ok(out)
    } else {
        let gz = flate2::read::GzDecoder::new(archive_bytes);
        let mut tar = tar::Archive::new(gz);
        for entry in tar
            .entries()
            .map_err(|e| CoworkErr::Other(format!("invalid ripgrep tar.gz archive: {e}")))?
        {
            let mut entry =
                entry.map_err(|e| CoworkErr::Other(format!("corrupt ripgrep archive entry: {e}")))?;
            let path = entry.path()?.display().to_string();
            if path == entry_path {
                let mut out = Vec::new();
                entry.read_to_end(&mut out)?;
                return Ok(out);
            }
        }
        Err(CoworkErr::Other(format!(
            "ripgrep archive missing expected entry {entry_path}"
        )))
    }
}

fn ripgrep_release_asset() -> ReleaseAsset {
    if cfg!(target_os = "macos") {
        ReleaseAsset {
            url: "https://github.com/BurntSushi/ripgrep/releases/download/14.1.1/ripgrep-14.1.1-x86_64-apple-darwin.tar.gz",
            archive_entry: "ripgrep-14.1.1-x86_64-apple-darwin/rg",
            sha256: "42c00fab8d958dd083238ea42e991a95aa26c70079532512aba08ea10e1a103",
        }
    } else if cfg!(windows) {
        ReleaseAsset {
            url: "https://github.com/BurntSushi/ripgrep/releases/download/14.1.1/ripgrep-14.1.1-x86_64-pc-windows-msvc.zip",
            archive_entry: "ripgrep-14.1.1-x86_64-pc-windows-msvc/rg.exe",
            sha256: "2bf3bed69bb00ba48728c1bd1d2e5751c628b9d0b0c5f18e74a6cee3772cdb7",
        }
    } else {
        ReleaseAsset {
            url: "https://github.com/BurntSushi/ripgrep/releases/download/14.1.1/ripgrep-14.1.1-x86_64-unknown-linux-musl.tar.gz",
            archive_entry: "ripgrep-14.1.1-x86_64-unknown-linux-musl/rg",
            sha256: "4cf9f2741c4b8b92ab6fbb49a3489320b5a9678b13b884d0994b50d31e1bdad",
        }
    }
}
