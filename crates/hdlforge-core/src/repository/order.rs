//! Reference-order sorting of modules.
//!
//! Produces the sequence consumed by project-file emission: the list is
//! built dependents-first and emitted in reverse, so every module's own
//! references precede it in the produced manifest.

use std::fs;
use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::repository::{HdlLanguage, ModuleId, Repository};

/// Standard and vendor-supplied libraries that never resolve to
/// repository modules.
pub const BUILTIN_LIBRARIES: &[&str] = &[
    "ieee",
    "std",
    "unisim",
    "unimacro",
    "simprim",
    "xilinxcorelib",
];

static USE_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*use\s+(?P<target>.*?)\s*;").unwrap());

/// Scan a module's source text for `use` declarations and resolve each
/// to a concrete module within the repository.
///
/// Only VHDL modules are scanned; Verilog modules contribute no scanned
/// references. References into built-in libraries are ignored, as are
/// dotted paths that do not resolve to a known module.
pub fn scan_module_references(repo: &mut Repository, module: ModuleId) -> Result<Vec<ModuleId>> {
    if repo.module(module).language != HdlLanguage::Vhdl {
        return Ok(Vec::new());
    }

    let location = repo.module_file_location(module)?;
    let source = fs::read_to_string(&location)?;

    let mut targets: Vec<(String, String)> = Vec::new();
    for captures in USE_CLAUSE.captures_iter(&source) {
        let target = &captures["target"];
        // `use ieee.std_logic_1164.all;` names a unit inside the
        // package; dropping the last section leaves `library.package`.
        let Some(dotted) = target.rsplit_once('.').map(|(head, _)| head) else {
            continue;
        };
        let mut sections = dotted.split('.');
        let (Some(library), Some(unit), None) =
            (sections.next(), sections.next(), sections.next())
        else {
            continue;
        };
        let library = library.to_ascii_lowercase();
        if BUILTIN_LIBRARIES.contains(&library.as_str()) {
            continue;
        }
        targets.push((library, unit.to_ascii_lowercase()));
    }

    let mut references = Vec::new();
    for (library_name, unit) in targets {
        let library = repo.get_library(&library_name)?;
        let found = repo
            .library(library)
            .modules()
            .iter()
            .copied()
            .find(|&m| repo.module(m).name().eq_ignore_ascii_case(&unit));
        if let Some(found) = found {
            if found != module && !references.contains(&found) {
                references.push(found);
            }
        }
    }

    tracing::debug!(
        "module '{}' resolved {} source references",
        repo.module(module).name(),
        references.len(),
    );
    Ok(references)
}

/// Order a module set so that every module is placed before the modules
/// that depend on it, after expanding the set to its full reference
/// closure.
///
/// The placement rule is insertion-based: modules are processed in
/// closure order; each module is inserted immediately after the last
/// already-placed module that references it, or at the very front when
/// nothing placed references it. Consumers emit the result in reverse,
/// dependencies first.
///
/// This is not a proven topological sort: a module referenced by two
/// previously-placed, order-conflicting modules can be mis-ordered, and
/// circular references produce an unspecified (but finite) order.
pub fn sort_modules_by_reference(
    repo: &mut Repository,
    modules: &[ModuleId],
) -> Result<Vec<ModuleId>> {
    let all = repo.all_referenced_modules(modules);

    let mut references: FxHashMap<ModuleId, Vec<ModuleId>> = FxHashMap::default();
    for &module in &all {
        let refs = scan_module_references(repo, module)?;
        references.insert(module, refs);
    }

    let mut placed: Vec<ModuleId> = Vec::new();
    for &module in &all {
        if placed.is_empty() {
            placed.push(module);
            continue;
        }

        let mut inserted = false;
        for i in (0..placed.len()).rev() {
            // A module referenced by a placed module belongs after it in
            // the dependents-first list.
            if references[&placed[i]].contains(&module) {
                placed.insert(i + 1, module);
                inserted = true;
                break;
            }
        }
        if !inserted {
            placed.insert(0, module);
        }
    }

    Ok(placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Applicability;
    use std::path::Path;
    use tempfile::TempDir;

    /// Lay a library on disk: manifest plus VHDL sources.
    fn write_library(root: &Path, name: &str, sources: &[(&str, &str)]) {
        let lib = root.join(name);
        let data = lib.join("data");
        let vhdl = lib.join("hdl").join("vhdl");
        fs::create_dir_all(&data).expect("create data dir");
        fs::create_dir_all(&vhdl).expect("create hdl dir");

        let mut manifest = String::new();
        for (file, contents) in sources {
            manifest.push_str(&format!("lib {} {} vhdl\n", name, file));
            fs::write(vhdl.join(file), contents).expect("write source");
        }
        fs::write(data.join(format!("{}.pao", name)), manifest).expect("write manifest");
    }

    #[test]
    fn chain_orders_dependencies_first() {
        let temp = TempDir::new().expect("temp dir");
        write_library(
            temp.path(),
            "chain",
            &[
                ("a.vhd", "use chain.b.all;\nentity a is end;"),
                ("b.vhd", "use chain.c.all;\nentity b is end;"),
                ("c.vhd", "entity c is end;"),
            ],
        );

        let mut repo = Repository::new();
        repo.add_search_path(temp.path());
        let lib = repo.get_library("chain").expect("load library");
        let modules: Vec<ModuleId> = repo.library(lib).modules().to_vec();
        let by_name = |repo: &Repository, n: &str| {
            modules
                .iter()
                .copied()
                .find(|&m| repo.module(m).name() == n)
                .expect("module")
        };

        let sorted = sort_modules_by_reference(&mut repo, &modules).expect("sort");
        let a = by_name(&repo, "a");
        let b = by_name(&repo, "b");
        let c = by_name(&repo, "c");

        // Dependents-first in the list; emission reverses this.
        let pos = |m| sorted.iter().position(|&x| x == m).expect("placed");
        assert!(pos(a) < pos(b), "a must precede b");
        assert!(pos(b) < pos(c), "b must precede c");
    }

    #[test]
    fn builtin_references_are_ignored() {
        let temp = TempDir::new().expect("temp dir");
        write_library(
            temp.path(),
            "solo",
            &[(
                "top.vhd",
                "library ieee;\nuse ieee.std_logic_1164.all;\nuse unisim.vcomponents.all;\nentity top is end;",
            )],
        );

        let mut repo = Repository::new();
        repo.add_search_path(temp.path());
        let lib = repo.get_library("solo").expect("load library");
        let module = repo.library(lib).modules()[0];

        let refs = scan_module_references(&mut repo, module).expect("scan");
        assert!(refs.is_empty());
    }

    #[test]
    fn cyclic_references_terminate() {
        let temp = TempDir::new().expect("temp dir");
        write_library(
            temp.path(),
            "loopy",
            &[
                ("x.vhd", "use loopy.y.all;\nentity x is end;"),
                ("y.vhd", "use loopy.x.all;\nentity y is end;"),
            ],
        );

        let mut repo = Repository::new();
        repo.add_search_path(temp.path());
        let lib = repo.get_library("loopy").expect("load library");
        let modules: Vec<ModuleId> = repo.library(lib).modules().to_vec();

        let sorted = sort_modules_by_reference(&mut repo, &modules).expect("sort");
        assert_eq!(sorted.len(), 2);
    }
}
