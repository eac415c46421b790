//! Device catalog loading via `partgen`.
//!
//! Running `partgen` with no architecture prints the supported family
//! list after a `Valid architectures are:` banner. Running it with
//! `-arch <family>` prints the family's part table: the display name on
//! the first line, then one line per device (with its default speed
//! grades in the third column) followed by indented package lines that
//! may carry an exclusive speed set.

use crate::device::{DeviceManager, Family, ToolchainRef};
use crate::error::Result;
use crate::ise::process::IseProcess;
use crate::ise::IseEnv;

/// Query the tool for every family and merge the results into the
/// catalog, tagging each part-speed with this toolchain's id.
pub fn load_catalog(env: &IseEnv, manager: &mut DeviceManager) -> Result<()> {
    let families = load_family_list(env)?;
    let toolchain_id = env.version.unique_id.clone();
    let manufacture = manager.create_manufacture("Xilinx");

    for short_name in families {
        tracing::debug!("loading parts for the '{}' family", short_name);
        let result = IseProcess::new(env, "partgen", &std::env::current_dir()?)
            .args(["-intstyle", "silent", "-arch", short_name.as_str()])
            .run()?;
        if let Some(family) = parse_family_table(&result.stdout, &short_name, &toolchain_id) {
            manufacture.families.push(family);
        }
    }

    Ok(())
}

/// Ask the tool which families it supports.
pub fn load_family_list(env: &IseEnv) -> Result<Vec<String>> {
    let result = IseProcess::new(env, "partgen", &std::env::current_dir()?).run()?;
    Ok(parse_family_list(&result.stdout))
}

/// Extract the family short names following the architecture banner.
pub fn parse_family_list(stdout: &str) -> Vec<String> {
    let mut families = Vec::new();
    let mut in_list = false;

    for line in stdout.lines() {
        if !in_list {
            if line
                .trim_end()
                .to_ascii_lowercase()
                .ends_with("valid architectures are:")
            {
                in_list = true;
            }
        } else {
            let name = line.trim();
            if !name.is_empty() {
                families.push(name.to_string());
            }
        }
    }

    families
}

/// Parse one family's part table into a catalog family.
///
/// Returns `None` when the output carries no family header at all.
pub fn parse_family_table(stdout: &str, short_name: &str, toolchain_id: &str) -> Option<Family> {
    let mut lines = stdout.lines();
    let display_name = loop {
        let line = lines.next()?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            break trimmed.to_string();
        }
    };

    let mut family = Family::new(&display_name, short_name);
    let mut current_device: Option<String> = None;
    let mut default_speeds: Option<String> = None;

    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if line.starts_with("    ") {
            // Package line under the current device.
            let Some(device_name) = current_device.clone() else {
                continue;
            };
            let fields: Vec<&str> = trimmed.split('\t').filter(|f| !f.is_empty()).collect();
            let Some(package) = fields.first().filter(|name| !name.is_empty()) else {
                continue;
            };

            family.create_package(package);
            // An exclusive speed set on the package line overrides the
            // device's default speeds.
            let speeds = fields
                .get(1)
                .map(|s| s.to_string())
                .or_else(|| default_speeds.clone());
            add_part(&mut family, &device_name, package, speeds, toolchain_id);
        } else {
            // Device line: name plus its default speed column.
            let fields: Vec<&str> = trimmed.split('\t').filter(|f| !f.is_empty()).collect();
            if fields.len() >= 3 && !fields[0].is_empty() {
                current_device = Some(fields[0].to_string());
                default_speeds = Some(fields[2].to_string());
                family.create_device(fields[0]);
            }
        }
    }

    Some(family)
}

fn add_part(
    family: &mut Family,
    device_name: &str,
    package: &str,
    speeds: Option<String>,
    toolchain_id: &str,
) {
    let Some(speeds) = speeds else { return };

    let mut grades = Vec::new();
    for speed in speeds.split("    ") {
        let speed = speed.trim();
        // Parenthesized grades are preview entries the tools reject.
        if speed.is_empty() || speed.starts_with('(') {
            continue;
        }
        family.create_speed(speed);
        grades.push(speed.to_string());
    }

    let device = family.create_device(device_name);
    let part = device.create_part(package);
    for grade in grades {
        part.create_speed(&grade)
            .add_toolchain(ToolchainRef(toolchain_id.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAMILY_LIST: &str = "\
Release 13.2 - PartGen O.61xd (lin64)
Copyright (c) 1995-2011 Xilinx, Inc.  All rights reserved.

partgen: No Architecture specified.  Valid architectures are:
    spartan3e
    spartan6
    virtex5
";

    const FAMILY_TABLE: &str = "\
Spartan3E
xc3s100e\tSLICES=960\t-5    -4    (-6)
    vq100\t
    cp132\t-4
xc3s250e\tSLICES=2448\t-5    -4
    vq100\t
";

    #[test]
    fn parses_family_list_after_banner() {
        let families = parse_family_list(FAMILY_LIST);
        assert_eq!(families, vec!["spartan3e", "spartan6", "virtex5"]);
    }

    #[test]
    fn family_list_is_empty_without_banner() {
        assert!(parse_family_list("some unrelated output\n").is_empty());
    }

    #[test]
    fn parses_family_table() {
        let family = parse_family_table(FAMILY_TABLE, "spartan3e", "tc1").expect("family");
        assert_eq!(family.name, "Spartan3E");
        assert_eq!(family.short_name, "spartan3e");
        assert_eq!(family.devices.len(), 2);

        let device = family.find_device("xc3s100e").expect("device");
        let part = device.find_part("vq100").expect("part");
        // Default speeds apply; the parenthesized grade is skipped.
        assert_eq!(part.speeds.len(), 2);
        assert!(part.find_speed("-5").is_some());
        assert!(part.find_speed("-4").is_some());
        assert!(part.find_speed("-6").is_none());

        // Exclusive package speeds override the defaults.
        let part = device.find_part("cp132").expect("part");
        assert_eq!(part.speeds.len(), 1);
        assert!(part.find_speed("-4").is_some());

        // Speed grades carry the contributing toolchain.
        let speed = device
            .find_part("vq100")
            .and_then(|p| p.find_speed("-5"))
            .expect("speed");
        assert_eq!(speed.toolchains.len(), 1);
        assert!(speed.toolchains[0].matches("tc1"));
    }

    #[test]
    fn family_pools_are_shared_across_devices() {
        let family = parse_family_table(FAMILY_TABLE, "spartan3e", "tc1").expect("family");
        assert_eq!(family.packages.len(), 2);
        assert_eq!(family.speeds.len(), 2);
    }
}
