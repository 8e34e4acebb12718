//! Archive materialization: per-job scratch space, zip extraction with
//! path containment, and file collection for commits.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use github_client::CommitFile;
use tracing::warn;
use uuid::Uuid;
use zip::ZipArchive;

use super::error::PipelineError;

/// Scratch space for one upload job, namespaced so concurrent jobs for the
/// same repository name never collide.
pub struct UploadSession {
    pub archive_path: PathBuf,
    pub extract_dir: PathBuf,
    root: PathBuf,
}

impl UploadSession {
    pub fn create(temp_root: &Path, repo_name: &str) -> Result<Self, PipelineError> {
        let root = temp_root.join(format!("{}-{}", repo_name, Uuid::new_v4()));
        let extract_dir = root.join("extracted");
        fs::create_dir_all(&extract_dir)?;

        Ok(Self {
            archive_path: root.join("archive.zip"),
            extract_dir,
            root,
        })
    }

    /// Remove the whole session directory. Runs on success and on failure.
    pub fn cleanup(&self) {
        if let Err(e) = fs::remove_dir_all(&self.root) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.root.display(), error = %e, "failed to clean up upload session");
            }
        }
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        // Backstop for early returns; cleanup() is idempotent.
        self.cleanup();
    }
}

/// A temp file that is removed when dropped, used for outbound snapshots.
pub struct ScopedFile {
    pub path: PathBuf,
}

impl ScopedFile {
    pub fn write(temp_root: &Path, filename: &str, bytes: &[u8]) -> Result<Self, PipelineError> {
        fs::create_dir_all(temp_root)?;
        let path = temp_root.join(format!("{}-{}", Uuid::new_v4(), filename));
        fs::write(&path, bytes)?;
        Ok(Self { path })
    }
}

impl Drop for ScopedFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove scoped file");
            }
        }
    }
}

/// Extract a zip archive into `dest`, rejecting any entry whose resolved
/// path would land outside it. A single bad entry fails the whole archive;
/// nothing is kept.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<usize, PipelineError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;
    let mut extracted = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let relative = match entry.enclosed_name() {
            Some(path) => path,
            None => {
                return Err(PipelineError::UnsafeArchive(entry.name().to_string()));
            }
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out_path)?;
        io::copy(&mut entry, &mut out_file)?;
        extracted += 1;
    }

    Ok(extracted)
}

/// Walk the extracted tree and gather every file as a commit entry, paths
/// relative to `root` with forward slashes. Sorted for deterministic commits.
pub fn collect_files(root: &Path) -> Result<Vec<CommitFile>, PipelineError> {
    let mut files = Vec::new();
    collect_into(root, root, &mut files)?;
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn collect_into(
    root: &Path,
    dir: &Path,
    files: &mut Vec<CommitFile>,
) -> Result<(), PipelineError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_into(root, &path, files)?;
        } else {
            let relative = path
                .strip_prefix(root)
                .map_err(|_| PipelineError::UnsafeArchive(path.display().to_string()))?;
            let rel_path = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push(CommitFile {
                path: rel_path,
                content: fs::read(&path)?,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        for (name, content) in entries {
            writer
                .start_file(name.to_string(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn extracts_nested_entries() {
        let temp = tempfile::tempdir().unwrap();
        let session = UploadSession::create(temp.path(), "demo").unwrap();
        write_zip(
            &session.archive_path,
            &[("README.md", b"hello".as_slice()), ("src/main.rs", b"fn main() {}")],
        );

        let count = extract_archive(&session.archive_path, &session.extract_dir).unwrap();
        assert_eq!(count, 2);

        let files = collect_files(&session.extract_dir).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "README.md");
        assert_eq!(files[1].path, "src/main.rs");
        assert_eq!(files[1].content, b"fn main() {}");
    }

    #[test]
    fn rejects_path_traversal_entries() {
        let temp = tempfile::tempdir().unwrap();
        let session = UploadSession::create(temp.path(), "demo").unwrap();
        write_zip(
            &session.archive_path,
            &[
                ("ok.txt", b"fine".as_slice()),
                ("../../escape.txt", b"nope"),
            ],
        );

        let err = extract_archive(&session.archive_path, &session.extract_dir).unwrap_err();
        assert!(matches!(err, PipelineError::UnsafeArchive(_)));
        // nothing escaped the session root
        assert!(!temp.path().join("escape.txt").exists());
        assert!(!temp.path().parent().unwrap().join("escape.txt").exists());
    }

    #[test]
    fn corrupt_archive_is_an_archive_error() {
        let temp = tempfile::tempdir().unwrap();
        let session = UploadSession::create(temp.path(), "demo").unwrap();
        fs::write(&session.archive_path, b"this is not a zip").unwrap();

        let err = extract_archive(&session.archive_path, &session.extract_dir).unwrap_err();
        assert!(matches!(err, PipelineError::Archive(_)));
    }

    #[test]
    fn scoped_file_is_removed_on_drop() {
        let temp = tempfile::tempdir().unwrap();
        let file = ScopedFile::write(temp.path(), "demo.zip", b"bytes").unwrap();
        let path = file.path.clone();
        assert!(path.exists());

        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn session_cleanup_removes_scratch_space() {
        let temp = tempfile::tempdir().unwrap();
        let session = UploadSession::create(temp.path(), "demo").unwrap();
        fs::write(&session.archive_path, b"bytes").unwrap();
        let root = session.root.clone();
        assert!(root.exists());

        drop(session);
        assert!(!root.exists());
    }
}
