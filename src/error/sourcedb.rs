use std::collections::HashMap;
use std::ops::Range;

use codespan_reporting::files::{Error, Files, line_starts};

struct Source {
    name: String,
    src: String,
    /// The starting byte index of each line.
    line_starts: Vec<usize>,
}

/// Owns every source text a session lexes, keyed by the `file_id` carried
/// in spans and diagnostics.
pub struct SourceDB {
    sources: Vec<Source>,
    name_to_index: HashMap<String, usize>,
}

impl Default for SourceDB {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceDB {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            name_to_index: HashMap::new(),
        }
    }

    /// Registers a source and returns its `file_id`.
    pub fn add(&mut self, name: String, src: String) -> usize {
        if self.name_to_index.contains_key(&name) {
            panic!("{name:?} is already in the SourceDB");
        }

        let index = self.sources.len();
        let line_starts = line_starts(&src).collect();

        self.name_to_index.insert(name.clone(), index);
        self.sources.push(Source {
            name,
            src,
            line_starts,
        });

        index
    }

    pub fn index(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    fn get(&self, file_id: usize) -> Result<&Source, Error> {
        self.sources.get(file_id).ok_or(Error::FileMissing)
    }
}

impl<'a> Files<'a> for SourceDB {
    type FileId = usize;
    type Name = &'a str;
    type Source = &'a str;

    fn name(&'a self, file_id: usize) -> Result<&'a str, Error> {
        Ok(&self.get(file_id)?.name)
    }

    fn source(&'a self, file_id: usize) -> Result<&'a str, Error> {
        Ok(&self.get(file_id)?.src)
    }

    fn line_index(&'a self, file_id: usize, byte_index: usize) -> Result<usize, Error> {
        let source = self.get(file_id)?;

        Ok(source
            .line_starts
            .binary_search(&byte_index)
            .unwrap_or_else(|next_line| next_line - 1))
    }

    fn line_range(&'a self, file_id: usize, line_index: usize) -> Result<Range<usize>, Error> {
        let source = self.get(file_id)?;

        let start = *source
            .line_starts
            .get(line_index)
            .ok_or(Error::LineTooLarge {
                given: line_index,
                max: source.line_starts.len() - 1,
            })?;
        let end = source
            .line_starts
            .get(line_index + 1)
            .copied()
            .unwrap_or(source.src.len());

        Ok(start..end)
    }
}
