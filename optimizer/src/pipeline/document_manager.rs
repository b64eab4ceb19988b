use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::PipelineError;

use super::types::DocumentJob;

/// Prefix Office uses for lock files next to an open document.
const LOCK_FILE_PREFIX: &str = "~$";

#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;
}

#[derive(Debug, Default, Clone)]
pub struct FsFileRepository;

#[async_trait]
impl FileRepository for FsFileRepository {
    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read file {}", path.display()))
    }
}

#[derive(Clone)]
pub struct DocumentManager {
    input_dir: PathBuf,
    supported_extensions: HashSet<String>,
    file_repo: Arc<dyn FileRepository>,
}

impl DocumentManager {
    pub fn new<P>(input_dir: P, supported_extensions: &[String]) -> Result<Self, PipelineError>
    where
        P: AsRef<Path>,
    {
        Self::with_repository(
            input_dir,
            supported_extensions,
            Arc::new(FsFileRepository),
        )
    }

    /// Fails with a configuration error when the input directory is missing.
    pub fn with_repository<P>(
        input_dir: P,
        supported_extensions: &[String],
        file_repo: Arc<dyn FileRepository>,
    ) -> Result<Self, PipelineError>
    where
        P: AsRef<Path>,
    {
        let input_dir = input_dir.as_ref().to_path_buf();
        if !input_dir.is_dir() {
            return Err(PipelineError::config(format!(
                "input directory {} does not exist or is not a directory",
                input_dir.display()
            )));
        }

        let supported_extensions = supported_extensions
            .iter()
            .map(|ext| normalize_extension(ext))
            .filter(|ext| !ext.is_empty())
            .collect::<HashSet<_>>();
        if supported_extensions.is_empty() {
            return Err(PipelineError::config("no supported extensions configured"));
        }

        Ok(Self {
            input_dir,
            supported_extensions,
            file_repo,
        })
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn file_repo(&self) -> Arc<dyn FileRepository> {
        self.file_repo.clone()
    }

    pub fn is_supported_file(&self, filename: &str) -> bool {
        if filename.starts_with(LOCK_FILE_PREFIX) {
            return false;
        }
        Path::new(filename)
            .extension()
            .and_then(|os| os.to_str())
            .map(normalize_extension)
            .is_some_and(|ext| self.supported_extensions.contains(&ext))
    }

    /// Walks the input tree in file-name order. The returned index is the
    /// discovery position and each job gets an artifact stem unique within
    /// the run.
    pub fn discover(&self) -> Result<Vec<DocumentJob>> {
        let mut jobs = Vec::new();
        let mut taken_stems = HashSet::new();

        for entry in WalkDir::new(&self.input_dir)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = entry.with_context(|| {
                format!("failed to walk input directory {}", self.input_dir.display())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !self.is_supported_file(&file_name) {
                debug!(file = %file_name, "skipping unsupported file");
                continue;
            }

            let stem = entry
                .path()
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| file_name.clone());

            jobs.push(DocumentJob {
                index: jobs.len(),
                path: entry.into_path(),
                file_name,
                stem: unique_stem(&stem, &mut taken_stems),
            });
        }

        info!(
            input_dir = %self.input_dir.display(),
            documents = jobs.len(),
            "discovered documents"
        );
        Ok(jobs)
    }
}

/// Claims `stem`, or the first free `stem_1`, `stem_2`, ...
fn unique_stem(stem: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(stem.to_string()) {
        return stem.to_string();
    }

    let mut counter = 1usize;
    loop {
        let candidate = format!("{stem}_{counter}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim();
    if let Some(stripped) = ext.strip_prefix('.') {
        stripped.to_ascii_lowercase()
    } else {
        ext.to_ascii_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colliding_stems_get_numeric_suffixes() {
        let mut taken = HashSet::new();
        assert_eq!(unique_stem("policy", &mut taken), "policy");
        assert_eq!(unique_stem("policy", &mut taken), "policy_1");
        assert_eq!(unique_stem("policy_1", &mut taken), "policy_1_1");
        assert_eq!(unique_stem("policy", &mut taken), "policy_2");
    }

    #[test]
    fn extensions_compare_case_insensitively() {
        assert_eq!(normalize_extension(".DOCX"), "docx");
        assert_eq!(normalize_extension("docx"), "docx");
    }

    #[test]
    fn discovery_is_sorted_and_skips_lock_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir(dir.path().join("nested"))?;
        for name in ["b.docx", "A.DOCX", "~$b.docx", "notes.txt", "nested/b.docx"] {
            std::fs::write(dir.path().join(name), b"x")?;
        }

        let manager = DocumentManager::new(dir.path(), &[".docx".to_string()])?;
        let jobs = manager.discover()?;
        let names: Vec<(&str, &str)> = jobs
            .iter()
            .map(|j| (j.file_name.as_str(), j.stem.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![("A.DOCX", "A"), ("b.docx", "b"), ("b.docx", "b_1")]
        );
        assert_eq!(jobs.iter().map(|j| j.index).collect::<Vec<_>>(), vec![0, 1, 2]);
        Ok(())
    }

    #[test]
    fn missing_input_directory_is_a_configuration_error() {
        let err = DocumentManager::new("/definitely/not/here", &[".docx".to_string()])
            .err()
            .unwrap();
        assert_eq!(err.kind(), "configuration");
    }
}
