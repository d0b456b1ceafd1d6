//! Relocation of uploaded files to their permanent, sequence-based names

use crate::record::UploadRef;
use crate::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, warn};

/// Longest extension accepted from a filename or content type
const MAX_EXTENSION_LEN: usize = 10;

/// A file received with the request, not yet owned by any record
///
/// The spooled file is deleted when this value is dropped unbound.
#[derive(Debug)]
pub struct TransientUpload {
    pub temp_path: TempPath,
    pub original_name: String,
    pub content_type: Option<String>,
}

impl TransientUpload {
    /// Extension (with leading dot) for the permanent name
    ///
    /// Taken from the original filename, case preserved; falls back to the
    /// declared content type's subtype, then to no extension.
    pub fn extension(&self) -> String {
        let from_name = Path::new(&self.original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| is_plain_extension(ext));
        if let Some(ext) = from_name {
            return format!(".{}", ext);
        }

        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .and_then(|mime| mime.rsplit('/').next())
            .map(|subtype| {
                subtype
                    .trim()
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric())
                    .collect::<String>()
            })
            .filter(|ext| is_plain_extension(ext))
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default()
    }
}

fn is_plain_extension(ext: &str) -> bool {
    !ext.is_empty()
        && ext.len() <= MAX_EXTENSION_LEN
        && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Moves transient uploads into the images directory
#[derive(Debug, Clone)]
pub struct UploadBinder {
    images_dir: PathBuf,
}

impl UploadBinder {
    pub fn new(images_dir: impl Into<PathBuf>) -> Self {
        Self {
            images_dir: images_dir.into(),
        }
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Permanent file name for `sequence`, e.g. `0007.PNG`
    pub fn file_name(sequence: u64, extension: &str) -> String {
        format!("{:04}{}", sequence, extension)
    }

    /// Relocate `upload` to `<images>/<seq:04><ext>`
    ///
    /// Must run inside the commit critical section.
    pub fn bind(&self, upload: TransientUpload, sequence: u64) -> Result<UploadRef> {
        let file_name = Self::file_name(sequence, &upload.extension());
        let target = self.images_dir.join(&file_name);

        self.relocate(upload.temp_path, &target)
            .map_err(|source| Error::UploadRelocation {
                target: target.clone(),
                source,
            })?;

        debug!(
            sequence,
            original = %upload.original_name,
            "Bound upload to {}",
            target.display()
        );
        Ok(UploadRef { file_name })
    }

    fn relocate(&self, temp_path: TempPath, target: &Path) -> io::Result<()> {
        fs::create_dir_all(&self.images_dir)?;
        if let Err(e) = temp_path.persist(target) {
            // Rename fails across filesystems; copy instead. The spooled
            // file is removed when `e.path` drops.
            debug!("Rename failed ({}), copying upload", e.error);
            fs::copy(&e.path, target)?;
        }
        set_readable(target)
    }

    /// Remove a bound file whose ledger row was never written
    pub fn discard(&self, upload: &UploadRef) {
        let path = self.images_dir.join(&upload.file_name);
        if let Err(e) = fs::remove_file(&path) {
            warn!("Could not remove orphaned upload {}: {}", path.display(), e);
        }
    }
}

#[cfg(unix)]
fn set_readable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_readable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn spool(dir: &Path, name: &str, content_type: Option<&str>) -> TransientUpload {
        let mut file = NamedTempFile::new_in(dir).unwrap();
        file.write_all(b"image bytes").unwrap();
        TransientUpload {
            temp_path: file.into_temp_path(),
            original_name: name.to_string(),
            content_type: content_type.map(str::to_string),
        }
    }

    #[test]
    fn test_extension_from_filename_keeps_case() {
        let dir = TempDir::new().unwrap();
        assert_eq!(spool(dir.path(), "photo.PNG", Some("image/png")).extension(), ".PNG");
    }

    #[test]
    fn test_extension_falls_back_to_content_type() {
        let dir = TempDir::new().unwrap();
        assert_eq!(spool(dir.path(), "photo", Some("image/jpeg")).extension(), ".jpeg");
        assert_eq!(
            spool(dir.path(), "drawing", Some("image/svg+xml")).extension(),
            ".svg"
        );
        assert_eq!(spool(dir.path(), "blob", None).extension(), "");
    }

    #[test]
    fn test_odd_filename_extension_uses_content_type() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            spool(dir.path(), "photo.p n/g", Some("image/gif")).extension(),
            ".gif"
        );
    }

    #[test]
    fn test_bind_relocates_to_sequence_name() {
        let dir = TempDir::new().unwrap();
        let spool_dir = TempDir::new_in(dir.path()).unwrap();
        let upload = spool(spool_dir.path(), "photo.PNG", Some("image/png"));
        let temp = upload.temp_path.to_path_buf();

        let binder = UploadBinder::new(dir.path().join("images"));
        let bound = binder.bind(upload, 7).unwrap();

        assert_eq!(bound.file_name, "0007.PNG");
        let target = dir.path().join("images").join("0007.PNG");
        assert_eq!(fs::read(&target).unwrap(), b"image bytes");
        assert!(!temp.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&target).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o644);
        }
    }

    #[test]
    fn test_discard_removes_bound_file() {
        let dir = TempDir::new().unwrap();
        let binder = UploadBinder::new(dir.path().join("images"));
        let bound = binder.bind(spool(dir.path(), "a.jpg", None), 12).unwrap();
        assert!(binder.images_dir().join("0012.jpg").exists());

        binder.discard(&bound);
        assert!(!binder.images_dir().join("0012.jpg").exists());
    }
}
