use crate::error::{CamwatchError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Filesystem store for uploaded images.
///
/// Files live flat under the data directory, named by the server-side
/// receive time: `YYYY-MM-DD HH-MM-SS.jpg`. The date prefix doubles as the
/// listing key, so no index beyond the directory itself is needed. A second
/// upload within the same second overwrites the first.
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File name for an image received at the given instant, server UTC
    pub fn file_name_for(timestamp: DateTime<Utc>) -> String {
        format!("{}.jpg", timestamp.format("%Y-%m-%d %H-%M-%S"))
    }

    /// Reject anything that could escape the data directory
    pub fn sanitize_name(name: &str) -> Option<&str> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
        {
            return None;
        }
        Some(name)
    }

    /// Create the data directory if it does not exist yet
    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        info!("Image store ready at {}", self.root.display());
        Ok(())
    }

    pub async fn save(&self, name: &str, data: &[u8]) -> Result<()> {
        let name = Self::sanitize_name(name).ok_or_else(|| {
            CamwatchError::component("collector", format!("invalid file name: {:?}", name))
        })?;
        let path = self.root.join(name);
        tokio::fs::write(&path, data).await?;
        debug!("Stored {} ({} bytes)", path.display(), data.len());
        Ok(())
    }

    /// Names of all images received on the given date, newest first
    pub async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<String>> {
        let prefix = format!("{} ", date.format("%Y-%m-%d"));
        let mut names = Vec::new();

        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(&prefix) && name.ends_with(".jpg") {
                names.push(name.to_string());
            }
        }

        names.sort_unstable_by(|a, b| b.cmp(a));
        Ok(names)
    }

    /// Delete an image by name. Deleting a name that does not exist is not
    /// an error; the end state is the same.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let name = Self::sanitize_name(name).ok_or_else(|| {
            CamwatchError::component("collector", format!("invalid file name: {:?}", name))
        })?;
        let path = self.root.join(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Delete of absent {} treated as success", path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
