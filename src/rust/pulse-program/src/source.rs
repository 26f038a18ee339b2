// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Source files and `insert` include expansion.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::PpError;

/// Supplies the text of files named by `insert` directives.
pub trait SourceLoader {
    fn load(&self, name: &str) -> std::io::Result<String>;
}

/// Loads included files relative to a base directory.
#[derive(Debug, Clone)]
pub struct FileLoader {
    base: PathBuf,
}

impl FileLoader {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        FileLoader { base: base.into() }
    }

    pub fn for_file(path: &Path) -> Self {
        FileLoader::new(path.parent().unwrap_or_else(|| Path::new(".")))
    }
}

impl SourceLoader for FileLoader {
    fn load(&self, name: &str) -> std::io::Result<String> {
        std::fs::read_to_string(self.base.join(name))
    }
}

impl SourceLoader for HashMap<String, String> {
    fn load(&self, name: &str) -> std::io::Result<String> {
        self.get(name)
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, name.to_string()))
    }
}

/// No includes available.
impl SourceLoader for () {
    fn load(&self, name: &str) -> std::io::Result<String> {
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            name.to_string(),
        ))
    }
}

/// One line of assembly after include expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub file: Arc<str>,
    /// 1-based line number within `file`.
    pub line: usize,
    pub text: String,
}

/// Files in the order they were first inserted, plus the spliced lines.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    pub files: IndexMap<String, String>,
    pub lines: Vec<SourceLine>,
}

impl SourceSet {
    pub fn expand(name: &str, text: &str, loader: &dyn SourceLoader) -> Result<Self, PpError> {
        let mut set = SourceSet::default();
        let mut stack = Vec::new();
        set.splice(name, text.to_string(), loader, &mut stack)?;
        Ok(set)
    }

    fn splice(
        &mut self,
        name: &str,
        text: String,
        loader: &dyn SourceLoader,
        stack: &mut Vec<String>,
    ) -> Result<(), PpError> {
        stack.push(name.to_string());
        self.files.entry(name.to_string()).or_insert_with(|| text.clone());
        let file: Arc<str> = Arc::from(name);
        for (index, line) in text.lines().enumerate() {
            let code = line.split('#').next().unwrap_or_default().trim();
            if let Some(include) = code.strip_prefix("insert ") {
                let include = include.trim();
                let error = |message: String| PpError {
                    file: name.to_string(),
                    line: index + 1,
                    context: line.to_string(),
                    message,
                };
                if stack.iter().any(|open| open == include) {
                    return Err(error(format!("recursive insert of '{include}'")));
                }
                let included = loader
                    .load(include)
                    .map_err(|err| error(format!("cannot insert '{include}': {err}")))?;
                self.splice(include, included, loader, stack)?;
                continue;
            }
            self.lines.push(SourceLine {
                file: Arc::clone(&file),
                line: index + 1,
                text: line.to_string(),
            });
        }
        stack.pop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_splices_in_place() {
        let mut files = HashMap::new();
        files.insert("defs.pp".to_string(), "var a 1\nvar b 2".to_string());
        let set = SourceSet::expand("main.pp", "var x 0\ninsert defs.pp\nEND", &files).unwrap();
        let texts: Vec<_> = set.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["var x 0", "var a 1", "var b 2", "END"]);
        assert_eq!(set.lines[1].file.as_ref(), "defs.pp");
        assert_eq!(set.lines[3].line, 3);
        assert_eq!(set.files.keys().collect::<Vec<_>>(), ["main.pp", "defs.pp"]);
    }

    #[test]
    fn test_recursive_insert_rejected() {
        let mut files = HashMap::new();
        files.insert("a.pp".to_string(), "insert a.pp".to_string());
        let err = SourceSet::expand("main.pp", "insert a.pp", &files).unwrap_err();
        assert_eq!(err.file, "a.pp");
        assert!(err.message.contains("recursive"));
    }

    #[test]
    fn test_missing_insert() {
        let err = SourceSet::expand("main.pp", "NOP\ninsert gone.pp", &()).unwrap_err();
        assert_eq!(err.line, 2);
    }
}
