//! Core manifest parsing.
//!
//! A manifest is a whitespace-delimited line format:
//!
//! ```text
//! # comment
//! lib     fifo_lib  rtl/fifo_sync.vhd  vhdl
//! synlib  fifo_lib  rtl/fifo_fast.v    verilog
//! lib     util_lib  all
//! ```
//!
//! Each line declares either one module belonging to a target library,
//! or a whole-library reference (`all`). Parsing a manifest for one
//! library may discover other libraries; those are queued and drained
//! breadth-first so every referenced library's own manifest is loaded
//! exactly once, even under mutual references.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use rustc_hash::FxHashSet;

use crate::error::{Error, Result};
use crate::repository::{Applicability, HdlLanguage, Repository};

/// One parsed manifest line.
#[derive(Debug)]
struct ManifestEntry {
    library: String,
    /// `None` for a whole-library (`all`) reference.
    module: Option<String>,
    language: HdlLanguage,
    applicability: Applicability,
}

/// Load a manifest into the repository, then drain every library it
/// (transitively) discovered.
pub(crate) fn load_into_repository(
    repo: &mut Repository,
    manifest_file: &Path,
    library_name: &str,
) -> Result<()> {
    let mut pending: VecDeque<String> =
        load_single_manifest(repo, manifest_file, library_name)?.into();

    while let Some(expand) = pending.pop_front() {
        let manifest = repo
            .find_manifest_file(&expand)
            .ok_or_else(|| Error::LibraryNotFound(expand.clone()))?;
        let discovered = load_single_manifest(repo, &manifest, &expand)?;
        pending.extend(discovered);
    }

    Ok(())
}

/// Parse one manifest and apply its entries, returning the foreign
/// libraries that still need their own manifests loaded.
fn load_single_manifest(
    repo: &mut Repository,
    manifest_file: &Path,
    library_name: &str,
) -> Result<Vec<String>> {
    let entries = parse_manifest(manifest_file)?;
    repo.manifests_loaded += 1;

    let loading = repo.library_auto_create(library_name);
    if let Some(root) = manifest_file.parent().and_then(Path::parent) {
        repo.set_library_root(loading, root.to_path_buf());
    }

    let mut to_expand: Vec<String> = Vec::new();
    let mut seen: FxHashSet<String> = FxHashSet::default();

    for entry in entries {
        // A library mentioned before it exists needs its own manifest
        // loaded later; checking existence before auto-creating it makes
        // that happen at most once per library.
        if !repo.library_exists(&entry.library)
            && entry.library != library_name
            && seen.insert(entry.library.clone())
        {
            to_expand.push(entry.library.clone());
        }

        let target = repo.library_auto_create(&entry.library);
        match entry.module {
            None => {
                repo.add_reference(loading, target);
            }
            Some(module) => {
                repo.add_module(target, &module, entry.language, entry.applicability);
                if target != loading {
                    repo.add_reference(loading, target);
                }
            }
        }
    }

    Ok(to_expand)
}

fn parse_manifest(path: &Path) -> Result<Vec<ManifestEntry>> {
    let text = fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        entries.push(parse_line(path, index + 1, line)?);
    }

    Ok(entries)
}

fn parse_line(path: &Path, line_number: usize, line: &str) -> Result<ManifestEntry> {
    let malformed = |message: &str| Error::ManifestParse {
        path: path.to_path_buf(),
        line: line_number,
        message: message.to_string(),
    };

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 3 {
        return Err(malformed("expected <applicability> <library> <path> [<dialect>]"));
    }

    let applicability = Applicability::parse(fields[0])
        .ok_or_else(|| malformed(&format!("unknown tool target '{}'", fields[0])))?;
    let library = fields[1].to_string();
    let module = fields[2].trim_matches('"');

    if module.eq_ignore_ascii_case("all") {
        return Ok(ManifestEntry {
            library,
            module: None,
            language: HdlLanguage::Vhdl,
            applicability,
        });
    }

    let dialect = fields
        .get(3)
        .ok_or_else(|| malformed("module entry is missing its dialect tag"))?;
    let language = HdlLanguage::parse(dialect)
        .ok_or_else(|| Error::UnsupportedDialect((*dialect).to_string()))?;

    Ok(ManifestEntry {
        library,
        module: Some(module.to_string()),
        language,
        applicability,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse_one(line: &str) -> Result<ManifestEntry> {
        parse_line(&PathBuf::from("test.pao"), 1, line)
    }

    #[test]
    fn parses_module_entry() {
        let entry = parse_one("lib fifo_lib rtl/fifo_sync.vhd vhdl").expect("parse");
        assert_eq!(entry.library, "fifo_lib");
        assert_eq!(entry.module.as_deref(), Some("rtl/fifo_sync.vhd"));
        assert_eq!(entry.language, HdlLanguage::Vhdl);
        assert_eq!(entry.applicability, Applicability::All);
    }

    #[test]
    fn parses_whole_library_reference() {
        let entry = parse_one("lib util_lib all").expect("parse");
        assert_eq!(entry.library, "util_lib");
        assert!(entry.module.is_none());
    }

    #[test]
    fn parses_simulation_only_verilog() {
        let entry = parse_one("simlib tb_lib tb/top_tb.v verilog").expect("parse");
        assert_eq!(entry.applicability, Applicability::SimulationOnly);
        assert_eq!(entry.language, HdlLanguage::Verilog);
    }

    #[test]
    fn short_line_is_fatal() {
        let err = parse_one("lib fifo_lib").expect_err("must fail");
        assert!(matches!(err, Error::ManifestParse { line: 1, .. }));
    }

    #[test]
    fn unknown_tool_target_is_fatal() {
        let err = parse_one("vlgincdir fifo_lib include").expect_err("must fail");
        assert!(matches!(err, Error::ManifestParse { .. }));
    }

    #[test]
    fn unknown_dialect_is_fatal() {
        let err = parse_one("lib fifo_lib rtl/fifo.sv systemverilog").expect_err("must fail");
        assert!(matches!(err, Error::UnsupportedDialect(_)));
    }

    #[test]
    fn module_entry_without_dialect_is_fatal() {
        let err = parse_one("lib fifo_lib rtl/fifo.vhd").expect_err("must fail");
        assert!(matches!(err, Error::ManifestParse { .. }));
    }
}
