use crate::core::interfaces::FileSystemService;
use crate::utils::{BuildError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Async file access; writes go through a sibling temp file and a rename so
/// readers never observe a half-written bundle
pub struct TokioFileSystemService;

fn write_error(path: &Path) -> impl FnOnce(std::io::Error) -> BuildError + '_ {
    move |source| BuildError::Write {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait::async_trait]
impl FileSystemService for TokioFileSystemService {
    async fn read_file(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).await.map_err(BuildError::Io)
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(write_error(path))?;
        }

        let mut staging = path.as_os_str().to_owned();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        fs::write(&staging, content).await.map_err(write_error(path))?;
        if let Err(e) = fs::rename(&staging, path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(write_error(path)(e));
        }
        Ok(())
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        std::fs::canonicalize(path).map_err(BuildError::Io)
    }
}
