//! On-disk persistence of the device catalog.
//!
//! The catalog is expensive to regenerate (one tool invocation per
//! family), so it is cached as an XML document keyed by a
//! toolchain-version fingerprint. The schema nests elements mirroring
//! the catalog hierarchy, plus the set of toolchain ids whose
//! capability data has already been merged.
//!
//! Saving uses create-new semantics: an existing cache file is never
//! overwritten. Concurrent regeneration from two processes is unsafe
//! by design and out of scope here.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::device::{Device, DeviceCategory, DeviceManager, Family, Manufacture, ToolchainRef};
use crate::error::{Error, Result};

fn malformed(message: impl Into<String>) -> Error {
    Error::CacheFormat(message.into())
}

/// Load a cached catalog from disk.
pub fn load(path: &Path) -> Result<DeviceManager> {
    let text = fs::read_to_string(path)?;
    let mut reader = Reader::from_str(&text);

    loop {
        match read_event(&mut reader)? {
            Event::Start(e) if e.name().as_ref() == b"devicemanager" => {
                return parse_manager(&mut reader);
            }
            Event::Eof => return Err(malformed("missing devicemanager root element")),
            _ => {}
        }
    }
}

/// Save the catalog, keyed by its path. Returns without writing when
/// the cache file already exists.
pub fn save(path: &Path, manager: &DeviceManager) -> Result<()> {
    let document = render(manager)?;

    match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(mut file) => {
            use std::io::Write as _;
            file.write_all(&document)?;
            tracing::debug!("saved device catalog cache to {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            tracing::debug!("device catalog cache already exists at {}", path.display());
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn read_event<'a>(reader: &mut Reader<&'a [u8]>) -> Result<Event<'a>> {
    reader
        .read_event()
        .map_err(|e| malformed(format!("invalid XML: {}", e)))
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| malformed(format!("invalid attribute: {}", e)))?;
        if attr.key.as_ref() == name.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|e| malformed(format!("invalid attribute value: {}", e)))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn required_attribute(element: &BytesStart<'_>, name: &str) -> Result<String> {
    attribute(element, name)?.ok_or_else(|| {
        malformed(format!(
            "element <{}> is missing attribute '{}'",
            String::from_utf8_lossy(element.name().as_ref()),
            name,
        ))
    })
}

fn parse_manager(reader: &mut Reader<&[u8]>) -> Result<DeviceManager> {
    let mut manager = DeviceManager::new();

    loop {
        match read_event(reader)? {
            Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                b"toolchain" => {
                    manager.note_cached_toolchain(&required_attribute(&e, "id")?);
                }
                b"manufacture" => {
                    let name = required_attribute(&e, "name")?;
                    let manufacture = parse_manufacture(reader, name)?;
                    manager.manufactures.push(manufacture);
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"devicemanager" => return Ok(manager),
            Event::Eof => return Err(malformed("unexpected end of cache document")),
            _ => {}
        }
    }
}

fn parse_manufacture(reader: &mut Reader<&[u8]>, name: String) -> Result<Manufacture> {
    let mut manufacture = Manufacture {
        name,
        families: Vec::new(),
    };

    loop {
        match read_event(reader)? {
            Event::Start(e) if e.name().as_ref() == b"family" => {
                let name = required_attribute(&e, "name")?;
                let short_name = required_attribute(&e, "shortname")?;
                let category = attribute(&e, "category")?
                    .map(|tag| DeviceCategory::parse(&tag))
                    .unwrap_or(DeviceCategory::Unknown);
                let mut family = Family::new(&name, &short_name);
                family.category = category;
                parse_family(reader, &mut family)?;
                manufacture.families.push(family);
            }
            Event::End(e) if e.name().as_ref() == b"manufacture" => return Ok(manufacture),
            Event::Eof => return Err(malformed("unexpected end of cache document")),
            _ => {}
        }
    }
}

fn parse_family(reader: &mut Reader<&[u8]>, family: &mut Family) -> Result<()> {
    loop {
        match read_event(reader)? {
            Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                b"package" => family.create_package(&required_attribute(&e, "name")?),
                b"speed" => family.create_speed(&required_attribute(&e, "name")?),
                b"device" => {
                    let name = required_attribute(&e, "name")?;
                    let device = parse_device(reader, family, name)?;
                    family.devices.push(device);
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"family" => return Ok(()),
            Event::Eof => return Err(malformed("unexpected end of cache document")),
            _ => {}
        }
    }
}

fn parse_device(reader: &mut Reader<&[u8]>, family: &Family, name: String) -> Result<Device> {
    let mut device = Device {
        name,
        parts: Vec::new(),
    };

    loop {
        match read_event(reader)? {
            Event::Start(e) if e.name().as_ref() == b"part" => {
                let package = check_package(family, &device, &e)?;
                parse_part(reader, family, &mut device, &package)?;
            }
            Event::Empty(e) if e.name().as_ref() == b"part" => {
                let package = check_package(family, &device, &e)?;
                device.create_part(&package);
            }
            Event::End(e) if e.name().as_ref() == b"device" => return Ok(device),
            Event::Eof => return Err(malformed("unexpected end of cache document")),
            _ => {}
        }
    }
}

fn check_package(family: &Family, device: &Device, element: &BytesStart<'_>) -> Result<String> {
    let package = required_attribute(element, "package")?;
    if !family.packages.iter().any(|p| p.name == package) {
        return Err(malformed(format!(
            "part of device '{}' references unknown package '{}'",
            device.name, package,
        )));
    }
    Ok(package)
}

fn parse_part(
    reader: &mut Reader<&[u8]>,
    family: &Family,
    device: &mut Device,
    package: &str,
) -> Result<()> {
    let device_name = device.name.clone();
    let part = device.create_part(package);

    loop {
        match read_event(reader)? {
            Event::Start(e) if e.name().as_ref() == b"partspeed" => {
                let speed = check_speed(family, &device_name, part.name.clone(), &e)?;
                let part_speed = part.create_speed(&speed);
                loop {
                    match read_event(reader)? {
                        Event::Start(t) | Event::Empty(t) if t.name().as_ref() == b"toolchain" => {
                            part_speed.add_toolchain(ToolchainRef(required_attribute(&t, "id")?));
                        }
                        Event::End(t) if t.name().as_ref() == b"partspeed" => break,
                        Event::Eof => return Err(malformed("unexpected end of cache document")),
                        _ => {}
                    }
                }
            }
            Event::Empty(e) if e.name().as_ref() == b"partspeed" => {
                let speed = check_speed(family, &device_name, part.name.clone(), &e)?;
                part.create_speed(&speed);
            }
            Event::End(e) if e.name().as_ref() == b"part" => return Ok(()),
            Event::Eof => return Err(malformed("unexpected end of cache document")),
            _ => {}
        }
    }
}

fn check_speed(
    family: &Family,
    device_name: &str,
    part_name: String,
    element: &BytesStart<'_>,
) -> Result<String> {
    let speed = required_attribute(element, "speed")?;
    if !family.speeds.iter().any(|s| s.name == speed) {
        return Err(malformed(format!(
            "part '{}' of device '{}' references unknown speed '{}'",
            part_name, device_name, speed,
        )));
    }
    Ok(speed)
}

fn render(manager: &DeviceManager) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    let write =
        |writer: &mut Writer<Vec<u8>>, event: Event<'_>| -> Result<()> {
            writer
                .write_event(event)
                .map_err(|e| malformed(format!("failed to render cache: {}", e)))
        };

    write(&mut writer, Event::Start(BytesStart::new("devicemanager")))?;

    write(
        &mut writer,
        Event::Start(BytesStart::new("cachedtoolchains")),
    )?;
    for toolchain in &manager.cached_toolchains {
        let mut element = BytesStart::new("toolchain");
        element.push_attribute(("id", toolchain.0.as_str()));
        write(&mut writer, Event::Empty(element))?;
    }
    write(&mut writer, Event::End(BytesEnd::new("cachedtoolchains")))?;

    write(&mut writer, Event::Start(BytesStart::new("manufactures")))?;
    for manufacture in &manager.manufactures {
        let mut element = BytesStart::new("manufacture");
        element.push_attribute(("name", manufacture.name.as_str()));
        write(&mut writer, Event::Start(element))?;

        for family in &manufacture.families {
            let mut element = BytesStart::new("family");
            element.push_attribute(("name", family.name.as_str()));
            element.push_attribute(("shortname", family.short_name.as_str()));
            element.push_attribute(("category", family.category.as_str()));
            write(&mut writer, Event::Start(element))?;

            write(&mut writer, Event::Start(BytesStart::new("packages")))?;
            for package in &family.packages {
                let mut element = BytesStart::new("package");
                element.push_attribute(("name", package.name.as_str()));
                write(&mut writer, Event::Empty(element))?;
            }
            write(&mut writer, Event::End(BytesEnd::new("packages")))?;

            write(&mut writer, Event::Start(BytesStart::new("speeds")))?;
            for speed in &family.speeds {
                let mut element = BytesStart::new("speed");
                element.push_attribute(("name", speed.name.as_str()));
                write(&mut writer, Event::Empty(element))?;
            }
            write(&mut writer, Event::End(BytesEnd::new("speeds")))?;

            write(&mut writer, Event::Start(BytesStart::new("devices")))?;
            for device in &family.devices {
                let mut element = BytesStart::new("device");
                element.push_attribute(("name", device.name.as_str()));
                write(&mut writer, Event::Start(element))?;

                for part in &device.parts {
                    let mut element = BytesStart::new("part");
                    element.push_attribute(("package", part.package.as_str()));
                    write(&mut writer, Event::Start(element))?;

                    for speed in &part.speeds {
                        let mut element = BytesStart::new("partspeed");
                        element.push_attribute(("speed", speed.speed.as_str()));
                        write(&mut writer, Event::Start(element))?;
                        for toolchain in &speed.toolchains {
                            let mut element = BytesStart::new("toolchain");
                            element.push_attribute(("id", toolchain.0.as_str()));
                            write(&mut writer, Event::Empty(element))?;
                        }
                        write(&mut writer, Event::End(BytesEnd::new("partspeed")))?;
                    }

                    write(&mut writer, Event::End(BytesEnd::new("part")))?;
                }

                write(&mut writer, Event::End(BytesEnd::new("device")))?;
            }
            write(&mut writer, Event::End(BytesEnd::new("devices")))?;

            write(&mut writer, Event::End(BytesEnd::new("family")))?;
        }

        write(&mut writer, Event::End(BytesEnd::new("manufacture")))?;
    }
    write(&mut writer, Event::End(BytesEnd::new("manufactures")))?;

    write(&mut writer, Event::End(BytesEnd::new("devicemanager")))?;

    Ok(writer.into_inner())
}
