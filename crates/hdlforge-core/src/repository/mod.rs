//! The core repository: libraries, modules, and their reference graph.
//!
//! This module provides:
//! - Lazy, manifest-driven loading of libraries from ranked search roots
//! - The library reference graph and its cycle-safe closure expansion
//! - Reference-order sorting used to emit compile-ordered project files

mod manifest;
mod order;

pub use order::{scan_module_references, sort_modules_by_reference, BUILTIN_LIBRARIES};

use std::fs;
use std::path::PathBuf;

use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

use crate::error::{Error, Result};

/// Unique identifier for a library within a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LibraryId(pub(crate) usize);

/// Unique identifier for a module within a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub(crate) usize);

/// The HDL dialect a module is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HdlLanguage {
    Vhdl,
    Verilog,
}

impl HdlLanguage {
    /// Parse a manifest dialect tag.
    pub fn parse(tag: &str) -> Option<Self> {
        if tag.eq_ignore_ascii_case("vhdl") {
            Some(Self::Vhdl)
        } else if tag.eq_ignore_ascii_case("verilog") {
            Some(Self::Verilog)
        } else {
            None
        }
    }

    /// The tag used in produced project files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vhdl => "vhdl",
            Self::Verilog => "verilog",
        }
    }

    /// Directory component under a library's `hdl` tree.
    fn source_dir(&self) -> &'static str {
        self.as_str()
    }
}

/// Which build flows a module participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applicability {
    All,
    SynthesisOnly,
    SimulationOnly,
}

impl Applicability {
    /// Parse a manifest tool-target tag (`lib`, `synlib`, `simlib`).
    pub fn parse(tag: &str) -> Option<Self> {
        if tag.eq_ignore_ascii_case("lib") {
            Some(Self::All)
        } else if tag.eq_ignore_ascii_case("synlib") {
            Some(Self::SynthesisOnly)
        } else if tag.eq_ignore_ascii_case("simlib") {
            Some(Self::SimulationOnly)
        } else {
            None
        }
    }

    /// Whether a module tagged `self` belongs in a project requesting
    /// `requested`. A module tagged `All` matches every request; a
    /// request for `All` takes every module.
    pub fn matches(&self, requested: Applicability) -> bool {
        matches!(requested, Applicability::All)
            || matches!(self, Applicability::All)
            || *self == requested
    }
}

/// One HDL source unit belonging to a library.
///
/// Immutable once created; the set of modules it textually references
/// is recomputed on demand by [`scan_module_references`].
#[derive(Debug, Clone)]
pub struct Module {
    pub id: ModuleId,
    /// The owning library.
    pub library: LibraryId,
    /// Path relative to the library's per-dialect source directory.
    pub relative_path: String,
    pub language: HdlLanguage,
    pub applicability: Applicability,
}

impl Module {
    /// The module name: the source file stem, compared case-insensitively.
    pub fn name(&self) -> &str {
        let file = self
            .relative_path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.relative_path);
        match file.rfind('.') {
            Some(dot) => &file[..dot],
            None => file,
        }
    }
}

/// A named collection of modules plus references to other libraries.
#[derive(Debug)]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
    modules: Vec<ModuleId>,
    node: NodeIndex,
    /// Resolved library root directory, filled on first use.
    root_path: Option<PathBuf>,
}

impl Library {
    /// Modules owned by this library, in declaration order.
    pub fn modules(&self) -> &[ModuleId] {
        &self.modules
    }
}

/// Repository of libraries, loaded lazily from on-disk manifests.
///
/// Libraries are located across a ranked list of search roots; each
/// root may contain a library directory directly or one level down.
/// A library's manifest is parsed at most once per repository.
pub struct Repository {
    search_paths: Vec<PathBuf>,
    libraries: Vec<Library>,
    modules: Vec<Module>,
    by_name: FxHashMap<String, LibraryId>,
    /// Edges go from a referencing library to the library it depends on.
    graph: DiGraph<LibraryId, ()>,
    /// Expanded library-root candidates, invalidated when a search path
    /// is added.
    expanded_roots: Option<Vec<PathBuf>>,
    manifests_loaded: usize,
}

impl Repository {
    /// Create an empty repository with no search paths.
    pub fn new() -> Self {
        Self {
            search_paths: Vec::new(),
            libraries: Vec::new(),
            modules: Vec::new(),
            by_name: FxHashMap::default(),
            graph: DiGraph::new(),
            expanded_roots: None,
            manifests_loaded: 0,
        }
    }

    /// Add a search root. Invalidates the cached root expansion.
    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.expanded_roots = None;
        self.search_paths.push(path.into());
    }

    /// Get a library by name, loading its manifest on demand.
    ///
    /// Re-requesting an already-known library returns the cached entry
    /// and never re-parses its manifest.
    pub fn get_library(&mut self, name: &str) -> Result<LibraryId> {
        if let Some(&id) = self.by_name.get(name) {
            return Ok(id);
        }

        let manifest_file = self
            .find_manifest_file(name)
            .ok_or_else(|| Error::LibraryNotFound(name.to_string()))?;
        manifest::load_into_repository(self, &manifest_file, name)?;

        // The load pass registered the library under its own name.
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::LibraryNotFound(name.to_string()))
    }

    /// Whether a library is already present in the repository.
    pub fn library_exists(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn library(&self, id: LibraryId) -> &Library {
        &self.libraries[id.0]
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0]
    }

    /// All libraries known to the repository, in creation order.
    pub fn libraries(&self) -> impl Iterator<Item = &Library> {
        self.libraries.iter()
    }

    /// How many manifests have been parsed over this repository's
    /// lifetime. Loading is idempotent, so this counts distinct
    /// manifests.
    pub fn manifests_loaded(&self) -> usize {
        self.manifests_loaded
    }

    /// Get or create a library entry without loading its manifest.
    pub(crate) fn library_auto_create(&mut self, name: &str) -> LibraryId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = LibraryId(self.libraries.len());
        let node = self.graph.add_node(id);
        self.libraries.push(Library {
            id,
            name: name.to_string(),
            modules: Vec::new(),
            node,
            root_path: None,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Add a module to a library unless an equivalent one exists.
    pub(crate) fn add_module(
        &mut self,
        library: LibraryId,
        relative_path: &str,
        language: HdlLanguage,
        applicability: Applicability,
    ) -> ModuleId {
        if let Some(&existing) = self.libraries[library.0].modules.iter().find(|&&m| {
            let module = &self.modules[m.0];
            module.relative_path == relative_path && module.language == language
        }) {
            return existing;
        }

        let id = ModuleId(self.modules.len());
        self.modules.push(Module {
            id,
            library,
            relative_path: relative_path.to_string(),
            language,
            applicability,
        });
        self.libraries[library.0].modules.push(id);
        id
    }

    /// Record that `from` depends on every module of `to`.
    pub(crate) fn add_reference(&mut self, from: LibraryId, to: LibraryId) {
        if from == to {
            return;
        }
        let from_node = self.libraries[from.0].node;
        let to_node = self.libraries[to.0].node;
        if self.graph.find_edge(from_node, to_node).is_none() {
            self.graph.add_edge(from_node, to_node, ());
            tracing::debug!(
                "library '{}' referenced into library '{}'",
                self.libraries[to.0].name,
                self.libraries[from.0].name,
            );
        }
    }

    /// Libraries directly referenced by `id`.
    pub fn library_references(&self, id: LibraryId) -> Vec<LibraryId> {
        self.graph
            .neighbors(self.libraries[id.0].node)
            .map(|n| self.graph[n])
            .collect()
    }

    /// Expand a module set to the modules of every library reachable
    /// from the set's owning libraries via zero-or-more reference hops.
    ///
    /// Terminates under reference cycles; the visited set guards the
    /// worklist.
    pub fn all_referenced_modules(&self, modules: &[ModuleId]) -> Vec<ModuleId> {
        let mut visited: FxHashSet<LibraryId> = FxHashSet::default();
        let mut order: Vec<LibraryId> = Vec::new();
        let mut queue: VecDeque<LibraryId> = VecDeque::new();

        for &m in modules {
            queue.push_back(self.modules[m.0].library);
        }

        while let Some(lib) = queue.pop_front() {
            if visited.insert(lib) {
                order.push(lib);
                for reference in self.library_references(lib) {
                    queue.push_back(reference);
                }
            }
        }

        let mut all = Vec::new();
        for lib in order {
            all.extend_from_slice(&self.libraries[lib.0].modules);
        }
        all
    }

    /// Find a module by dotted name, e.g. `"fifo_lib.fifo_sync"`.
    pub fn find_module_by_name(&mut self, name: &str) -> Result<ModuleId> {
        let mut split = name.trim().splitn(2, '.');
        let library_name = split.next().unwrap_or_default();
        let module_name = split
            .next()
            .ok_or_else(|| Error::ModuleNotFound(name.to_string()))?;

        let library = self.get_library(library_name)?;
        self.libraries[library.0]
            .modules
            .iter()
            .copied()
            .find(|&m| self.modules[m.0].name().eq_ignore_ascii_case(module_name))
            .ok_or_else(|| Error::ModuleNotFound(name.to_string()))
    }

    /// Absolute location of a module's source file:
    /// `<library root>/hdl/<dialect>/<relative path>`.
    pub fn module_file_location(&mut self, id: ModuleId) -> Result<PathBuf> {
        let library = self.modules[id.0].library;
        let root = self.library_root(library)?;
        let module = &self.modules[id.0];
        Ok(root
            .join("hdl")
            .join(module.language.source_dir())
            .join(&module.relative_path))
    }

    /// Resolve (and memoize) the on-disk root directory of a library.
    fn library_root(&mut self, id: LibraryId) -> Result<PathBuf> {
        if let Some(root) = &self.libraries[id.0].root_path {
            return Ok(root.clone());
        }
        let name = self.libraries[id.0].name.clone();
        let root = self
            .find_library_root(&name)
            .ok_or_else(|| Error::LibraryNotFound(name))?;
        self.libraries[id.0].root_path = Some(root.clone());
        Ok(root)
    }

    pub(crate) fn set_library_root(&mut self, id: LibraryId, root: PathBuf) {
        self.libraries[id.0].root_path = Some(root);
    }

    /// Candidate directories that may contain library roots: every
    /// search root itself, plus its immediate subdirectories. Memoized
    /// until a search path is added.
    fn root_candidates(&mut self) -> &[PathBuf] {
        if self.expanded_roots.is_none() {
            let mut candidates = Vec::new();
            for root in &self.search_paths {
                if root.is_dir() {
                    candidates.push(root.clone());
                    let mut children: Vec<PathBuf> = fs::read_dir(root)
                        .into_iter()
                        .flatten()
                        .flatten()
                        .map(|entry| entry.path())
                        .filter(|path| path.is_dir())
                        .collect();
                    children.sort();
                    candidates.extend(children);
                }
            }
            self.expanded_roots = Some(candidates);
        }
        self.expanded_roots.as_deref().unwrap_or_default()
    }

    /// First directory named after the library under any candidate root.
    fn find_library_root(&mut self, name: &str) -> Option<PathBuf> {
        let name = name.to_string();
        self.root_candidates()
            .iter()
            .map(|candidate| candidate.join(&name))
            .find(|path| path.is_dir())
    }

    /// Locate the manifest file for a library: `data/<base>.pao` under
    /// the library root, where `<base>` strips a trailing version tag,
    /// falling back to the first `*.pao` file present.
    fn find_manifest_file(&mut self, name: &str) -> Option<PathBuf> {
        let root = self.find_library_root(name)?;
        let data_dir = root.join("data");

        let expected = data_dir.join(format!("{}.pao", base_library_name(name)));
        if expected.is_file() {
            return Some(expected);
        }

        let mut pao_files: Vec<PathBuf> = fs::read_dir(&data_dir)
            .into_iter()
            .flatten()
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("pao"))
            })
            .collect();
        pao_files.sort();
        pao_files.into_iter().next()
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip a `_vM_m_t` version tag from a library name
/// (`uart_v2_1_a` -> `uart`).
fn base_library_name(name: &str) -> &str {
    static VERSION_TAG: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
        regex::Regex::new(r"^(?P<base>.*)_v\d+_\d+_.*$").unwrap()
    });
    match VERSION_TAG.captures(name) {
        Some(caps) => caps.name("base").map_or(name, |m| {
            let base = m.as_str();
            if base.is_empty() { name } else { base }
        }),
        None => name,
    }
}
