//! Produced project manifests.
//!
//! A [`ProjectFile`] collects a module set and renders the line format
//! consumed by the external tools: one module per line, dependencies
//! first, filtered by the requested applicability.

use std::fmt::Write as _;

use crate::error::Result;
use crate::repository::{
    sort_modules_by_reference, Applicability, LibraryId, ModuleId, Repository,
};

/// An in-memory project: a set of modules destined for one tool run.
#[derive(Debug, Default)]
pub struct ProjectFile {
    modules: Vec<ModuleId>,
}

impl ProjectFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a project from a single module: its whole library plus
    /// every library that library references.
    pub fn from_module(repo: &Repository, module: ModuleId) -> Self {
        let mut project = Self::new();
        let library = repo.module(module).library;
        project.add_all_in_library(repo, library);
        for reference in repo.library_references(library) {
            project.add_all_in_library(repo, reference);
        }
        project
    }

    /// Add one module; duplicates collapse.
    pub fn add_module(&mut self, module: ModuleId) {
        if !self.modules.contains(&module) {
            self.modules.push(module);
        }
    }

    /// Add every module of a library.
    pub fn add_all_in_library(&mut self, repo: &Repository, library: LibraryId) {
        for &module in repo.library(library).modules() {
            self.add_module(module);
        }
    }

    pub fn modules(&self) -> &[ModuleId] {
        &self.modules
    }

    /// Render the project in dependency order, keeping only modules
    /// whose applicability matches the request.
    ///
    /// Lines have the form `<dialect> <library> "<absolute-path>"`.
    pub fn render(&self, repo: &mut Repository, applicability: Applicability) -> Result<String> {
        let sorted = sort_modules_by_reference(repo, &self.modules)?;

        let mut out = String::new();
        // The sorted list is dependents-first; the manifest wants
        // dependencies first.
        for &module in sorted.iter().rev() {
            if !repo.module(module).applicability.matches(applicability) {
                continue;
            }
            let location = repo.module_file_location(module)?;
            let module = repo.module(module);
            let library = repo.library(module.library);
            writeln!(
                out,
                "{} {} \"{}\"",
                module.language.as_str(),
                library.name,
                location.display(),
            )
            .expect("writing to a String cannot fail");
        }
        Ok(out)
    }
}
