//! Device lookup resolution and cache round-tripping through the
//! public API.

use hdlforge_core::device::{cache, DeviceManager, Family, PartMatch, ToolchainRef};
use tempfile::TempDir;

fn catalog() -> DeviceManager {
    let mut manager = DeviceManager::new();
    manager.note_cached_toolchain("1234567890abcdef");
    let manufacture = manager.create_manufacture("Xilinx");

    let mut family = Family::new("Spartan3E", "spartan3e");
    family.create_package("vq100");
    family.create_package("cp132");
    family.create_speed("-4");
    family.create_speed("-5");
    {
        let device = family.create_device("xc3s100e");
        let part = device.create_part("vq100");
        part.create_speed("-4")
            .add_toolchain(ToolchainRef("1234567890abcdef".to_string()));
        part.create_speed("-5")
            .add_toolchain(ToolchainRef("1234567890abcdef".to_string()));
        device.create_part("cp132").create_speed("-4");
    }
    manufacture.families.push(family);
    manager
}

#[test]
fn lookup_matches_both_vendor_name_orderings() {
    let manager = catalog();

    let speed = manager.resolve_part("xc3s100evq100-5").expect("resolved");
    assert_eq!(speed.name, "xc3s100evq100-5");

    let speed = manager.resolve_part("xc3s100e-5vq100").expect("resolved");
    assert_eq!(speed.name, "xc3s100evq100-5");
}

#[test]
fn device_query_auto_selects_first_package_and_speed() {
    let manager = catalog();

    let matches = manager.find_part("xc3s100e");
    assert!(matches!(matches.as_slice(), [PartMatch::Device(_)]));

    let speed = manager.resolve_part("xc3s100e").expect("resolved");
    assert_eq!(speed.name, "xc3s100evq100-4");
}

#[test]
fn unknown_query_is_not_found_not_an_error() {
    let manager = catalog();
    assert!(manager.find_part("xc6slx9").is_empty());
    assert!(manager.resolve_part("xc6slx9").is_none());
}

#[test]
fn cache_round_trip_preserves_the_catalog() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("devices-1234567890abcdef.xml");

    let manager = catalog();
    cache::save(&path, &manager).expect("save");
    let reloaded = cache::load(&path).expect("load");

    assert!(reloaded.has_cached_toolchain("1234567890abcdef"));

    let speed = reloaded.resolve_part("xc3s100evq100-5").expect("resolved");
    assert_eq!(speed.alternate_name, "xc3s100e-5vq100");
    assert_eq!(speed.toolchains.len(), 1);

    let family = &reloaded.manufactures[0].families[0];
    let original = &manager.manufactures[0].families[0];
    assert_eq!(family.packages, original.packages);
    assert_eq!(family.speeds, original.speeds);
    assert_eq!(family.category, original.category);
}

#[test]
fn load_or_query_prefers_the_cache() {
    let temp = TempDir::new().expect("temp dir");
    let fingerprint = "1234567890abcdef";

    // First load: no cache, the query closure runs and the result is
    // cached.
    let mut manager = DeviceManager::new();
    manager
        .load_or_query(temp.path(), fingerprint, |m| {
            *m = catalog();
            Ok(())
        })
        .expect("query and cache");
    assert!(manager.resolve_part("xc3s100e").is_some());

    // Second load: the cache file satisfies the request; the closure
    // must not run.
    let mut manager = DeviceManager::new();
    manager
        .load_or_query(temp.path(), fingerprint, |_| {
            panic!("query must not run when the cache is valid");
        })
        .expect("load from cache");
    assert!(manager.resolve_part("xc3s100evq100-4").is_some());
}
