//! Project: ordered Documents plus project-level metadata.
//!
//! # Responsibility
//! - Group Documents that are saved to and opened from one `.xuk` file.
//! - Own project metadata entries.
//!
//! # Invariants
//! - Document order is preserved across save/open.
//! - Provider data directories are resolved relative to the `.xuk` file.

use crate::document::Document;
use crate::model::metadata::{remove_entries, set_entry};
use crate::model::Metadata;
use crate::xuk::{read_project, write_project, XukConfig, XukError, XukResult};
use log::{error, info};
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct Project {
    documents: Vec<Document>,
    metadata: Vec<Metadata>,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a Document and returns its index.
    pub fn add_document(&mut self, document: Document) -> usize {
        self.documents.push(document);
        self.documents.len() - 1
    }

    pub fn document(&self, index: usize) -> Option<&Document> {
        self.documents.get(index)
    }

    pub fn document_mut(&mut self, index: usize) -> Option<&mut Document> {
        self.documents.get_mut(index)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn remove_document(&mut self, index: usize) -> Option<Document> {
        if index < self.documents.len() {
            return Some(self.documents.remove(index));
        }
        None
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn metadata(&self) -> &[Metadata] {
        &self.metadata
    }

    pub fn add_metadata(&mut self, name: &str, content: &str) {
        self.metadata.push(Metadata::new(name, content));
    }

    /// Replaces every entry named `name` with one entry, or appends it.
    pub fn set_metadata(&mut self, name: &str, content: &str) {
        set_entry(&mut self.metadata, name, content);
    }

    pub fn remove_metadata(&mut self, name: &str) -> usize {
        remove_entries(&mut self.metadata, name)
    }

    /// Content of the first entry named `name`.
    pub fn metadata_content(&self, name: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.content.as_str())
    }

    /// Writes the whole project to `path`. Provider files stay where they are.
    pub fn save(&self, path: impl AsRef<Path>, config: &XukConfig) -> XukResult<()> {
        let path = absolute(path.as_ref())?;
        let result = (|| -> XukResult<()> {
            let xuk_dir = parent_dir(&path);
            let markup = write_project(self, &xuk_dir, config)?;
            std::fs::create_dir_all(&xuk_dir)?;
            std::fs::write(&path, markup)?;
            Ok(())
        })();
        match &result {
            Ok(()) => info!(
                "event=project_save module=project status=ok documents={} path={}",
                self.documents.len(),
                path.display()
            ),
            Err(err) => error!(
                "event=project_save module=project status=error path={} error={}",
                path.display(),
                err
            ),
        }
        result
    }

    /// Reads a project from `path`.
    ///
    /// # Errors
    /// - `Io` when the file cannot be read.
    /// - `Xml`, `MissingAttribute`, `MissingChild`, `InvalidValue`,
    ///   `UnresolvedUid` for malformed markup.
    /// - `Document(Data(MissingFile))` when a referenced provider file is absent.
    pub fn open(path: impl AsRef<Path>, config: &XukConfig) -> XukResult<Project> {
        let path = absolute(path.as_ref())?;
        let result = std::fs::read_to_string(&path)
            .map_err(XukError::from)
            .and_then(|text| read_project(&text, &parent_dir(&path), config));
        match &result {
            Ok(project) => info!(
                "event=project_open module=project status=ok documents={} path={}",
                project.documents.len(),
                path.display()
            ),
            Err(err) => error!(
                "event=project_open module=project status=error path={} error={}",
                path.display(),
                err
            ),
        }
        result
    }
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::Project;
    use crate::document::Document;

    #[test]
    fn documents_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = Project::new();
        let first = Document::new(dir.path()).unwrap();
        let first_id = first.id();
        assert_eq!(project.add_document(first), 0);
        assert_eq!(project.add_document(Document::new(dir.path()).unwrap()), 1);
        assert_eq!(project.document(0).unwrap().id(), first_id);

        let removed = project.remove_document(0).unwrap();
        assert_eq!(removed.id(), first_id);
        assert_eq!(project.len(), 1);
        assert!(project.remove_document(5).is_none());
    }

    #[test]
    fn metadata_set_replaces_by_name() {
        let mut project = Project::new();
        project.add_metadata("dc:title", "Draft");
        project.add_metadata("dc:title", "Other");
        project.set_metadata("dc:title", "Final");
        assert_eq!(project.metadata().len(), 1);
        assert_eq!(project.metadata_content("dc:title"), Some("Final"));
        assert_eq!(project.remove_metadata("dc:title"), 1);
        assert!(project.metadata_content("dc:title").is_none());
    }
}
