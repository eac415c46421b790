//! The device catalog: manufacture → family → device → part → speed.
//!
//! The hierarchy is constructed once per load (from a live tool query
//! or from the on-disk cache) and is read-only for the rest of the
//! session. Every level deduplicates children by name.

pub mod cache;

use std::path::Path;

use crate::error::Result;

/// Reference to a toolchain by its unique id. A lookup relation, not
/// ownership: it records which toolchain contributed or can target a
/// piece of the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainRef(pub String);

impl ToolchainRef {
    pub fn matches(&self, id: &str) -> bool {
        self.0.eq_ignore_ascii_case(id)
    }
}

/// Broad device class, decided by a cheap name-pattern test.
///
/// The test avoids the expensive full tool query at the cost of
/// misclassifying unrecognized family names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCategory {
    /// FPGA-class parts (gate arrays).
    GateArray,
    /// CPLD-class parts.
    Cpld,
    Unknown,
}

impl DeviceCategory {
    /// Classify a family by its short name.
    pub fn from_family_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        const GATE_ARRAY: &[&str] = &["spartan", "virtex", "artix", "kintex", "zynq"];
        const CPLD: &[&str] = &["xc9500", "coolrunner", "xbr", "acr", "xpla"];

        if GATE_ARRAY.iter().any(|tag| name.contains(tag)) {
            Self::GateArray
        } else if CPLD.iter().any(|tag| name.contains(tag)) {
            Self::Cpld
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GateArray => "gatearray",
            Self::Cpld => "cpld",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(tag: &str) -> Self {
        match tag {
            "gatearray" => Self::GateArray,
            "cpld" => Self::Cpld,
            _ => Self::Unknown,
        }
    }
}

/// A package name owned by a family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
}

/// A speed-grade name owned by a family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Speed {
    pub name: String,
}

/// The finest-grained device identity: device × package × speed grade.
#[derive(Debug, Clone)]
pub struct PartSpeed {
    /// Vendor primary name: device + package + speed (`xc3s100evq100-5`).
    pub name: String,
    /// Vendor alternate ordering: device + speed + package
    /// (`xc3s100e-5vq100`), used by some tool commands.
    pub alternate_name: String,
    /// The speed-grade name (`-5`).
    pub speed: String,
    /// Toolchains able to target this part.
    pub toolchains: Vec<ToolchainRef>,
}

impl PartSpeed {
    /// Record a targeting toolchain; duplicates collapse.
    pub fn add_toolchain(&mut self, reference: ToolchainRef) {
        if !self.toolchains.iter().any(|t| t.matches(&reference.0)) {
            self.toolchains.push(reference);
        }
    }
}

/// A device in one package.
#[derive(Debug, Clone)]
pub struct Part {
    /// Device name + package name (`xc3s100evq100`).
    pub name: String,
    /// The package name within the owning family.
    pub package: String,
    pub speeds: Vec<PartSpeed>,
    device_name: String,
}

impl Part {
    /// Get or create the speed-grade entry for this part.
    pub fn create_speed(&mut self, speed: &str) -> &mut PartSpeed {
        if let Some(index) = self.speeds.iter().position(|s| s.speed == speed) {
            return &mut self.speeds[index];
        }
        self.speeds.push(PartSpeed {
            name: format!("{}{}", self.name, speed),
            alternate_name: format!("{}{}{}", self.device_name, speed, self.package),
            speed: speed.to_string(),
            toolchains: Vec::new(),
        });
        let last = self.speeds.len() - 1;
        &mut self.speeds[last]
    }

    pub fn find_speed(&self, speed: &str) -> Option<&PartSpeed> {
        self.speeds.iter().find(|s| s.speed == speed)
    }
}

/// A physical device within a family.
#[derive(Debug, Clone)]
pub struct Device {
    pub name: String,
    pub parts: Vec<Part>,
}

impl Device {
    /// Get or create the part for a package.
    pub fn create_part(&mut self, package: &str) -> &mut Part {
        if let Some(index) = self.parts.iter().position(|p| p.package == package) {
            return &mut self.parts[index];
        }
        self.parts.push(Part {
            name: format!("{}{}", self.name, package),
            package: package.to_string(),
            speeds: Vec::new(),
            device_name: self.name.clone(),
        });
        let last = self.parts.len() - 1;
        &mut self.parts[last]
    }

    pub fn find_part(&self, package: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.package == package)
    }
}

/// A device family: short name (`spartan3e`), display name
/// (`Spartan3E`), a device category, and pools of package and speed
/// names shared across the family's devices.
#[derive(Debug, Clone)]
pub struct Family {
    pub name: String,
    pub short_name: String,
    pub category: DeviceCategory,
    pub packages: Vec<Package>,
    pub speeds: Vec<Speed>,
    pub devices: Vec<Device>,
}

impl Family {
    pub fn new(name: &str, short_name: &str) -> Self {
        Self {
            name: name.to_string(),
            short_name: short_name.to_string(),
            category: DeviceCategory::from_family_name(short_name),
            packages: Vec::new(),
            speeds: Vec::new(),
            devices: Vec::new(),
        }
    }

    pub fn create_device(&mut self, name: &str) -> &mut Device {
        if let Some(index) = self.devices.iter().position(|d| d.name == name) {
            return &mut self.devices[index];
        }
        self.devices.push(Device {
            name: name.to_string(),
            parts: Vec::new(),
        });
        let last = self.devices.len() - 1;
        &mut self.devices[last]
    }

    /// Register a package name in the family pool. (Family, package
    /// name) is unique.
    pub fn create_package(&mut self, name: &str) {
        if !self.packages.iter().any(|p| p.name == name) {
            self.packages.push(Package {
                name: name.to_string(),
            });
        }
    }

    /// Register a speed name in the family pool. (Family, speed name)
    /// is unique.
    pub fn create_speed(&mut self, name: &str) {
        if !self.speeds.iter().any(|s| s.name == name) {
            self.speeds.push(Speed {
                name: name.to_string(),
            });
        }
    }

    pub fn find_device(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name == name)
    }
}

/// A device manufacturer.
#[derive(Debug, Clone, Default)]
pub struct Manufacture {
    pub name: String,
    pub families: Vec<Family>,
}

impl Manufacture {
    pub fn find_family(&self, short_name: &str) -> Option<&Family> {
        self.families.iter().find(|f| f.short_name == short_name)
    }

    pub fn find_family_mut(&mut self, short_name: &str) -> Option<&mut Family> {
        self.families.iter_mut().find(|f| f.short_name == short_name)
    }
}

/// One catalog entry matching a lookup query, coarsest to finest.
#[derive(Debug, Clone, Copy)]
pub enum PartMatch<'a> {
    Device(&'a Device),
    Part(&'a Device, &'a Part),
    Speed(&'a Device, &'a Part, &'a PartSpeed),
}

/// The targeting identity a build stage needs: the part-speed names,
/// detached from catalog lifetimes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPart {
    pub name: String,
    pub alternate_name: String,
}

impl From<&PartSpeed> for TargetPart {
    fn from(speed: &PartSpeed) -> Self {
        Self {
            name: speed.name.clone(),
            alternate_name: speed.alternate_name.clone(),
        }
    }
}

/// The process-wide device catalog.
#[derive(Debug, Default)]
pub struct DeviceManager {
    pub manufactures: Vec<Manufacture>,
    /// Toolchains whose capability data has already been merged; avoids
    /// re-scanning a toolchain on every load.
    pub cached_toolchains: Vec<ToolchainRef>,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a manufacture entry.
    pub fn create_manufacture(&mut self, name: &str) -> &mut Manufacture {
        if let Some(index) = self.manufactures.iter().position(|m| m.name == name) {
            return &mut self.manufactures[index];
        }
        self.manufactures.push(Manufacture {
            name: name.to_string(),
            families: Vec::new(),
        });
        let last = self.manufactures.len() - 1;
        &mut self.manufactures[last]
    }

    /// Whether a toolchain's capability data is already in the catalog.
    pub fn has_cached_toolchain(&self, id: &str) -> bool {
        self.cached_toolchains.iter().any(|t| t.matches(id))
    }

    pub fn note_cached_toolchain(&mut self, id: &str) {
        if !self.has_cached_toolchain(id) {
            self.cached_toolchains.push(ToolchainRef(id.to_string()));
        }
    }

    /// Scan the whole catalog for exact (case-insensitive) matches of
    /// `query` against device names, part names, and part-speed
    /// primary/alternate names.
    ///
    /// Matches are returned device matches first, then part matches,
    /// then speed matches; zero matches is a normal outcome.
    pub fn find_part(&self, query: &str) -> Vec<PartMatch<'_>> {
        let mut devices = Vec::new();
        let mut parts = Vec::new();
        let mut speeds = Vec::new();

        for manufacture in &self.manufactures {
            for family in &manufacture.families {
                for device in &family.devices {
                    if device.name.eq_ignore_ascii_case(query) {
                        devices.push(PartMatch::Device(device));
                    }
                    for part in &device.parts {
                        if part.name.eq_ignore_ascii_case(query) {
                            parts.push(PartMatch::Part(device, part));
                        }
                        for speed in &part.speeds {
                            if speed.name.eq_ignore_ascii_case(query)
                                || speed.alternate_name.eq_ignore_ascii_case(query)
                            {
                                speeds.push(PartMatch::Speed(device, part, speed));
                            }
                        }
                    }
                }
            }
        }

        devices.extend(parts);
        devices.extend(speeds);
        devices
    }

    /// Resolve a query to a single part-speed, applying the
    /// prefer-most-specific policy on top of [`find_part`].
    ///
    /// A speed match wins over a part match wins over a device match.
    /// When only a coarser match exists, the first package and first
    /// speed (declaration order) are auto-selected with a warning.
    pub fn resolve_part(&self, query: &str) -> Option<&PartSpeed> {
        let matches = self.find_part(query);

        let mut device_match = None;
        let mut part_match = None;
        for candidate in matches {
            match candidate {
                PartMatch::Device(device) => device_match = device_match.or(Some(device)),
                PartMatch::Part(_, part) => part_match = part_match.or(Some(part)),
                PartMatch::Speed(_, _, speed) => return Some(speed),
            }
        }

        if let Some(part) = part_match {
            let speed = part.speeds.first()?;
            tracing::warn!(
                "query '{}' matched part '{}'; auto-selected speed grade '{}'",
                query,
                part.name,
                speed.speed,
            );
            return Some(speed);
        }

        if let Some(device) = device_match {
            let part = device.parts.first()?;
            let speed = part.speeds.first()?;
            tracing::warn!(
                "query '{}' matched device '{}'; auto-selected package '{}' and speed grade '{}'",
                query,
                device.name,
                part.package,
                speed.speed,
            );
            return Some(speed);
        }

        None
    }

    /// Load the catalog from a cache file if one exists for the
    /// fingerprint, or run `query` against the live tool and cache the
    /// result.
    pub fn load_or_query<F>(&mut self, cache_dir: &Path, fingerprint: &str, query: F) -> Result<()>
    where
        F: FnOnce(&mut DeviceManager) -> Result<()>,
    {
        let cache_file = cache_dir.join(format!("devices-{}.xml", fingerprint));
        if cache_file.is_file() {
            tracing::debug!("loading device catalog from {}", cache_file.display());
            let cached = cache::load(&cache_file)?;
            *self = cached;
            return Ok(());
        }

        query(self)?;
        cache::save(&cache_file, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manager() -> DeviceManager {
        let mut manager = DeviceManager::new();
        let manufacture = manager.create_manufacture("Xilinx");
        let mut family = Family::new("Spartan3E", "spartan3e");
        family.create_package("vq100");
        family.create_package("tq144");
        family.create_speed("-4");
        family.create_speed("-5");
        {
            let device = family.create_device("xc3s100e");
            let part = device.create_part("vq100");
            part.create_speed("-4");
            part.create_speed("-5");
            let part = device.create_part("tq144");
            part.create_speed("-4");
        }
        manufacture.families.push(family);
        manager
    }

    #[test]
    fn speed_names_use_both_orderings() {
        let manager = sample_manager();
        let family = &manager.manufactures[0].families[0];
        let speed = family.devices[0].parts[0].find_speed("-5").expect("speed");
        assert_eq!(speed.name, "xc3s100evq100-5");
        assert_eq!(speed.alternate_name, "xc3s100e-5vq100");
    }

    #[test]
    fn find_part_matches_both_name_orderings() {
        let manager = sample_manager();

        let matches = manager.find_part("xc3s100evq100-5");
        assert_eq!(matches.len(), 1);
        assert!(matches!(matches[0], PartMatch::Speed(_, _, s) if s.speed == "-5"));

        let matches = manager.find_part("XC3S100E-5VQ100");
        assert_eq!(matches.len(), 1);
        assert!(matches!(matches[0], PartMatch::Speed(_, _, s) if s.speed == "-5"));
    }

    #[test]
    fn find_part_ranks_coarse_before_fine() {
        let manager = sample_manager();
        let matches = manager.find_part("xc3s100e");
        assert_eq!(matches.len(), 1);
        assert!(matches!(matches[0], PartMatch::Device(_)));
    }

    #[test]
    fn resolve_auto_selects_first_children() {
        let manager = sample_manager();

        // Device-level query narrows to first package, first speed.
        let speed = manager.resolve_part("xc3s100e").expect("resolved");
        assert_eq!(speed.name, "xc3s100evq100-4");

        // Part-level query narrows to first speed.
        let speed = manager.resolve_part("xc3s100etq144").expect("resolved");
        assert_eq!(speed.name, "xc3s100etq144-4");

        // No match is a normal outcome.
        assert!(manager.resolve_part("xc7z020").is_none());
    }

    #[test]
    fn category_heuristic() {
        assert_eq!(
            DeviceCategory::from_family_name("spartan3e"),
            DeviceCategory::GateArray
        );
        assert_eq!(
            DeviceCategory::from_family_name("xc9500xl"),
            DeviceCategory::Cpld
        );
        assert_eq!(
            DeviceCategory::from_family_name("acr2"),
            DeviceCategory::Cpld
        );
        assert_eq!(
            DeviceCategory::from_family_name("mystery"),
            DeviceCategory::Unknown
        );
    }

    #[test]
    fn duplicate_children_collapse() {
        let mut family = Family::new("Spartan3E", "spartan3e");
        family.create_package("vq100");
        family.create_package("vq100");
        assert_eq!(family.packages.len(), 1);

        let device = family.create_device("xc3s100e");
        device.create_part("vq100");
        let part = device.create_part("vq100");
        part.create_speed("-4");
        part.create_speed("-4");
        assert_eq!(device.parts.len(), 1);
        assert_eq!(device.parts[0].speeds.len(), 1);
    }

    #[test]
    fn toolchain_refs_deduplicate() {
        let mut manager = sample_manager();
        manager.note_cached_toolchain("abc123");
        manager.note_cached_toolchain("ABC123");
        assert_eq!(manager.cached_toolchains.len(), 1);
    }
}
