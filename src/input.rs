//! Transient form state edited by the user before triggering a flow.

use std::path::{Path, PathBuf};

/// A file chosen for upload. Its content is read only when an upload is sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectedFile {
    pub path: PathBuf,
    pub file_name: String,
}

impl SelectedFile {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { path, file_name }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputController {
    file: Option<SelectedFile>,
    instruction: String,
    chat_query: String,
}

impl InputController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the selection wholesale, `None` included.
    pub fn set_file(&mut self, file: Option<SelectedFile>) {
        self.file = file;
    }

    pub fn set_instruction(&mut self, text: impl Into<String>) {
        self.instruction = text.into();
    }

    pub fn set_chat_query(&mut self, text: impl Into<String>) {
        self.chat_query = text.into();
    }

    pub fn file(&self) -> Option<&SelectedFile> {
        self.file.as_ref()
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn chat_query(&self) -> &str {
        &self.chat_query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_replace_without_trimming() {
        let mut input = InputController::new();
        input.set_instruction("  summarize  ");
        input.set_chat_query("");

        assert_eq!(input.instruction(), "  summarize  ");
        assert_eq!(input.chat_query(), "");
    }

    #[test]
    fn set_file_replaces_and_clears() {
        let mut input = InputController::new();
        input.set_file(Some(SelectedFile::from_path("data/report.csv")));
        input.set_file(Some(SelectedFile::from_path("other.txt")));
        assert_eq!(input.file().unwrap().file_name, "other.txt");

        input.set_file(None);
        assert!(input.file().is_none());
    }

    #[test]
    fn file_name_is_last_path_component() {
        let file = SelectedFile::from_path("/tmp/uploads/report.csv");
        assert_eq!(file.file_name, "report.csv");
        assert_eq!(file.path, PathBuf::from("/tmp/uploads/report.csv"));
    }
}
