use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::Language;

/// Hands out one private directory per submission under a shared root
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the submission directory and writes the source file into it
    ///
    /// A directory left over from an earlier run with the same id is wiped first.
    pub fn stage(&self, submission_id: i64, language: Language, code: &str) -> Result<Workspace> {
        // create_dir_all tolerates other submissions creating the root at the same time
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create workspace root {}", self.root.display()))?;

        let dir = self.root.join(submission_id.to_string());
        if dir.exists() {
            log::warn!("Removing stale workspace {}", dir.display());
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir(&dir)
            .with_context(|| format!("Failed to create workspace {}", dir.display()))?;

        let source = dir.join(language.source_file_name());
        let artifacts = language.artifacts(&dir);
        let workspace = Workspace {
            dir,
            source,
            artifacts,
            cleaned: false,
        };

        fs::write(&workspace.source, format!("{code}\n")).with_context(|| {
            format!("Failed to write source file {}", workspace.source.display())
        })?;

        log::debug!(
            "Staged submission {submission_id} at {}",
            workspace.source.display()
        );
        Ok(workspace)
    }
}

/// A staged submission directory, removed when dropped
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    source: PathBuf,
    artifacts: Vec<PathBuf>,
    cleaned: bool,
}

impl Workspace {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// Removes the source, every compiled artifact and the directory itself
    ///
    /// Failures are logged and otherwise ignored.
    pub fn cleanup(mut self) {
        self.remove_all();
    }

    fn remove_all(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;

        for path in std::iter::once(&self.source).chain(self.artifacts.iter()) {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove {}: {e}", path.display()),
            }
        }

        // catches anything else the toolchain dropped, e.g. nested class files
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => log::debug!("Removed workspace {}", self.dir.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove workspace {}: {e}", self.dir.display()),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.remove_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stage_writes_source() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path().join("ws"));

        let workspace = manager.stage(42, Language::Python, "print(1)").unwrap();
        assert_eq!(workspace.dir(), root.path().join("ws").join("42"));
        assert_eq!(workspace.source(), workspace.dir().join("main.py"));
        assert_eq!(fs::read_to_string(workspace.source()).unwrap(), "print(1)\n");
    }

    #[test]
    fn test_fixed_file_name_does_not_collide() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());

        let first = manager.stage(1, Language::Java, "class A {}").unwrap();
        let second = manager.stage(2, Language::Java, "class B {}").unwrap();
        assert!(first.source().ends_with("1/Main.java"));
        assert!(second.source().ends_with("2/Main.java"));
        assert_eq!(fs::read_to_string(first.source()).unwrap(), "class A {}\n");
        assert_eq!(fs::read_to_string(second.source()).unwrap(), "class B {}\n");
    }

    #[test]
    fn test_cleanup_removes_source_and_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());

        let workspace = manager.stage(3, Language::Java, "class Main {}").unwrap();
        for artifact in workspace.artifacts() {
            fs::write(artifact, b"\xca\xfe\xba\xbe").unwrap();
        }
        fs::write(workspace.dir().join("Main$Inner.class"), b"").unwrap();
        let dir = workspace.dir().to_path_buf();

        workspace.cleanup();
        assert!(!dir.exists());
        assert!(root.path().exists());
    }

    #[test]
    fn test_cleanup_tolerates_missing_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());

        // compile never ran, so the executable does not exist
        let workspace = manager.stage(4, Language::Cpp, "int main() {}").unwrap();
        let dir = workspace.dir().to_path_buf();
        workspace.cleanup();
        assert!(!dir.exists());
    }

    #[test]
    fn test_drop_removes_workspace() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());

        let dir = {
            let workspace = manager.stage(5, Language::Cpp, "int main() {}").unwrap();
            workspace.dir().to_path_buf()
        };
        assert!(!dir.exists());
    }

    #[test]
    fn test_stage_replaces_stale_directory() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let stale = root.path().join("6");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("main"), b"old").unwrap();

        let workspace = manager.stage(6, Language::Cpp, "int main() {}").unwrap();
        assert!(!workspace.dir().join("main").exists());
        assert!(workspace.source().exists());
    }

    #[test]
    fn test_concurrent_staging_shares_root() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path().join("shared"));

        let handles: Vec<_> = (0..8)
            .map(|id| {
                let manager = manager.clone();
                std::thread::spawn(move || {
                    let workspace = manager.stage(id, Language::Python, "pass").unwrap();
                    assert!(workspace.source().exists());
                    workspace.cleanup();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(fs::read_dir(root.path().join("shared")).unwrap().count(), 0);
    }
}
