//! Stage contract tests against a scripted stand-in install.
//!
//! Each stage must report success only when the tool exits zero AND the
//! declared artifact exists afterwards; a stale artifact from an
//! earlier run must not mask a nonzero exit.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use hdlforge_core::device::TargetPart;
use hdlforge_core::ise::implement::{BitstreamGenerator, Map, Translate};
use hdlforge_core::ise::IseEnv;
use hdlforge_core::{Error, OutputPath};
use tempfile::TempDir;

/// Build a fake install whose `bitgen`, `map`, and `ngdbuild` are the
/// given shell scripts.
fn fake_install(root: &Path, tools: &[(&str, &str)]) -> Arc<IseEnv> {
    fs::create_dir_all(root.join("common")).expect("common dir");
    fs::write(root.join("common/fileset.txt"), "  version=13.2\n").expect("fileset");
    let bin = root.join("ISE/bin/lin64");
    fs::create_dir_all(&bin).expect("bin dir");
    fs::create_dir_all(root.join("ISE/lib/lin64")).expect("lib dir");

    for (name, body) in tools {
        let path = bin.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("tool script");
        let mut perms = fs::metadata(&path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("chmod");
    }

    IseEnv::from_root(root.to_path_buf()).expect("probe install")
}

fn target() -> TargetPart {
    TargetPart {
        name: "xc3s100evq100-4".to_string(),
        alternate_name: "xc3s100e-4vq100".to_string(),
    }
}

#[test]
fn stage_succeeds_when_exit_zero_and_artifact_exists() {
    let install = TempDir::new().expect("install dir");
    // bitgen receives the ncd path as its last argument.
    let env = fake_install(
        install.path(),
        &[("bitgen", r#"touch "$(basename "$2" .ncd).bit""#)],
    );

    let build = TempDir::new().expect("build dir");
    let output = OutputPath::scoped(build.path()).expect("output layout");
    let ncd = output.temporary_dir.join("top.ncd");
    fs::write(&ncd, "routed design").expect("ncd");

    let stage = BitstreamGenerator::new(&env, &output, ncd);
    assert!(stage.build().expect("stage runs"));
    assert!(output.output_dir.join("top.bit").is_file());
}

#[test]
fn exit_zero_without_artifact_is_a_failure() {
    let install = TempDir::new().expect("install dir");
    let env = fake_install(install.path(), &[("bitgen", "exit 0")]);

    let build = TempDir::new().expect("build dir");
    let output = OutputPath::scoped(build.path()).expect("output layout");
    let ncd = output.temporary_dir.join("top.ncd");
    fs::write(&ncd, "routed design").expect("ncd");

    let stage = BitstreamGenerator::new(&env, &output, ncd);
    assert!(!stage.build().expect("stage runs"));
}

#[test]
fn nonzero_exit_with_stale_artifact_is_a_failure() {
    let install = TempDir::new().expect("install dir");
    let env = fake_install(install.path(), &[("bitgen", "exit 2")]);

    let build = TempDir::new().expect("build dir");
    let output = OutputPath::scoped(build.path()).expect("output layout");
    let ncd = output.temporary_dir.join("top.ncd");
    fs::write(&ncd, "routed design").expect("ncd");
    // Artifact left behind by an earlier run.
    fs::write(output.temporary_dir.join("top.bit"), "stale").expect("stale bit");

    let stage = BitstreamGenerator::new(&env, &output, ncd);
    assert!(!stage.build().expect("stage runs"));
}

#[test]
fn missing_input_artifact_is_fatal() {
    let install = TempDir::new().expect("install dir");
    let env = fake_install(install.path(), &[("map", "exit 0")]);

    let build = TempDir::new().expect("build dir");
    let output = OutputPath::scoped(build.path()).expect("output layout");

    let stage = Map::new(
        &env,
        &output,
        output.temporary_dir.join("absent.ngd"),
        target(),
    );
    let err = stage.build().expect_err("must raise before spawning");
    assert!(matches!(err, Error::MissingArtifact(_)));
}

#[test]
fn missing_constraints_file_is_fatal() {
    let install = TempDir::new().expect("install dir");
    let env = fake_install(install.path(), &[("ngdbuild", "exit 0")]);

    let build = TempDir::new().expect("build dir");
    let output = OutputPath::scoped(build.path()).expect("output layout");
    let netlist = output.temporary_dir.join("top.ngc");
    fs::write(&netlist, "netlist").expect("netlist");

    let stage = Translate::new(
        &env,
        &output,
        netlist,
        Some(output.temporary_dir.join("absent.ucf")),
        target(),
    );
    let err = stage.build().expect_err("must raise before spawning");
    assert!(matches!(err, Error::MissingArtifact(_)));
}

#[test]
fn translate_copies_artifact_and_log() {
    let install = TempDir::new().expect("install dir");
    // ngdbuild writes its .ngd (last argument) and a .bld report.
    let env = fake_install(
        install.path(),
        &[(
            "ngdbuild",
            r#"
for last in "$@"; do :; done
touch "$last"
touch "$(basename "$last" .ngd).bld"
"#,
        )],
    );

    let build = TempDir::new().expect("build dir");
    let output = OutputPath::scoped(build.path()).expect("output layout");
    let netlist = output.temporary_dir.join("top.ngc");
    fs::write(&netlist, "netlist").expect("netlist");

    let stage = Translate::new(&env, &output, netlist, None, target());
    assert!(stage.build().expect("stage runs"));
    assert!(output.output_dir.join("top.ngd").is_file());
    assert!(output.log_dir.join("top.bld").is_file());
}
