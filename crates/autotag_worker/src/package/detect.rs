use autotag_protocol::defaults::PACKAGE_MANIFEST;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Outcome of inspecting an archive.
///
/// `is_package` is false when the file is not a ZIP or carries no manifest.
/// A package is valid when its manifest parses and has both required
/// sections; otherwise `errors` lists every problem found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDetection {
    pub is_package: bool,
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl PackageDetection {
    fn not_package(error: impl Into<String>) -> Self {
        Self {
            is_package: false,
            is_valid: false,
            errors: vec![error.into()],
        }
    }

    fn package(errors: Vec<String>) -> Self {
        Self {
            is_package: true,
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// Inspect the archive at `zip_path` for a package manifest.
///
/// The manifest may sit at any depth; the first entry whose name ends in
/// `imsmanifest.xml` (any case) is used.
pub fn detect_package(zip_path: &Path) -> PackageDetection {
    let archive = File::open(zip_path)
        .ok()
        .and_then(|file| zip::ZipArchive::new(file).ok());
    let Some(mut archive) = archive else {
        return PackageDetection::not_package("Not a ZIP file");
    };

    let manifest_name = archive
        .file_names()
        .find(|name| name.to_lowercase().ends_with(PACKAGE_MANIFEST))
        .map(String::from);
    let Some(manifest_name) = manifest_name else {
        return PackageDetection::not_package(format!("{} not found", PACKAGE_MANIFEST));
    };

    let mut data = Vec::new();
    let read = archive
        .by_name(&manifest_name)
        .map_err(|e| e.to_string())
        .and_then(|mut entry| entry.read_to_end(&mut data).map_err(|e| e.to_string()));
    if let Err(e) = read {
        return PackageDetection::package(vec![format!("Unreadable {}: {}", PACKAGE_MANIFEST, e)]);
    }

    PackageDetection::package(validate_manifest(&data))
}

/// Problems with a manifest body; empty when valid.
pub(crate) fn validate_manifest(data: &[u8]) -> Vec<String> {
    let text = match decode_text(data) {
        Ok(text) => text,
        Err(e) => return vec![format!("Malformed XML: {}", e)],
    };
    let text = text.trim_start_matches('\u{feff}');
    if text.trim().is_empty() {
        return vec![format!("{} is empty", PACKAGE_MANIFEST)];
    }

    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    let doc = match roxmltree::Document::parse_with_options(text, options) {
        Ok(doc) => doc,
        Err(e) => return vec![format!("Malformed XML: {}", e)],
    };

    // Sections are looked up in the root element's namespace, so both
    // `<manifest>` and `<imscp:manifest>` roots work.
    let root = doc.root_element();
    let namespace = root.tag_name().namespace();
    let has_section = |section: &str| {
        root.children()
            .filter(|n| n.is_element())
            .any(|n| n.tag_name().name() == section && n.tag_name().namespace() == namespace)
    };

    let mut errors = Vec::new();
    if !has_section("resources") {
        errors.push("<resources> missing".to_string());
    }
    if !has_section("organizations") {
        errors.push("<organizations> missing".to_string());
    }
    errors
}

/// Decode a manifest as UTF-16 when it starts with a UTF-16 byte order
/// mark, as UTF-8 otherwise.
fn decode_text(data: &[u8]) -> Result<String, String> {
    let from_units = |units: &[u8], unit: fn([u8; 2]) -> u16| {
        if units.len() % 2 != 0 {
            return Err("odd byte count in UTF-16 document".to_string());
        }
        let units: Vec<u16> = units
            .chunks_exact(2)
            .map(|pair| unit([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units).map_err(|e| e.to_string())
    };

    match data {
        [0xFF, 0xFE, rest @ ..] => from_units(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => from_units(rest, u16::from_be_bytes),
        _ => std::str::from_utf8(data)
            .map(str::to_string)
            .map_err(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotag_test_utils::{manifest, ZipFixture};
    use tempfile::TempDir;

    fn write(dir: &TempDir, fixture: ZipFixture) -> std::path::PathBuf {
        let path = dir.path().join("upload.zip");
        fixture.write_to(&path).unwrap();
        path
    }

    #[test]
    fn test_valid_package() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            ZipFixture::new()
                .file("imsmanifest.xml", manifest::VALID)
                .file("index.html", "<html/>"),
        );

        let detection = detect_package(&path);
        assert!(detection.is_package);
        assert!(detection.is_valid, "{:?}", detection.errors);
    }

    #[test]
    fn test_nested_manifest_any_case() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            ZipFixture::new().file("course/IMSManifest.XML", manifest::VALID),
        );
        assert!(detect_package(&path).is_valid);
    }

    #[test]
    fn test_missing_manifest_is_not_a_package() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, ZipFixture::new().file("index.html", "<html/>"));

        let detection = detect_package(&path);
        assert!(!detection.is_package);
        assert!(!detection.is_valid);
        assert_eq!(detection.errors, vec!["imsmanifest.xml not found"]);
    }

    #[test]
    fn test_non_zip_is_not_a_package() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fake.zip");
        std::fs::write(&path, b"definitely not an archive").unwrap();

        let detection = detect_package(&path);
        assert!(!detection.is_package);
        assert_eq!(detection.errors, vec!["Not a ZIP file"]);
    }

    #[test]
    fn test_missing_organizations_is_invalid() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            ZipFixture::new().file("imsmanifest.xml", manifest::MISSING_ORGANIZATIONS),
        );

        let detection = detect_package(&path);
        assert!(detection.is_package);
        assert!(!detection.is_valid);
        assert_eq!(detection.errors, vec!["<organizations> missing"]);
    }

    #[test]
    fn test_manifest_errors() {
        assert_eq!(validate_manifest(b"  \n"), vec!["imsmanifest.xml is empty"]);
        assert_eq!(
            validate_manifest(manifest::MISSING_BOTH.as_bytes()),
            vec!["<resources> missing", "<organizations> missing"]
        );
        let malformed = validate_manifest(manifest::MALFORMED.as_bytes());
        assert_eq!(malformed.len(), 1);
        assert!(malformed[0].starts_with("Malformed XML: "));
    }

    #[test]
    fn test_prefixed_root_is_accepted() {
        assert!(validate_manifest(manifest::PREFIXED.as_bytes()).is_empty());
    }

    fn utf16(text: &str, unit: fn(u16) -> [u8; 2], bom: [u8; 2]) -> Vec<u8> {
        let mut data = bom.to_vec();
        data.extend(text.encode_utf16().flat_map(unit));
        data
    }

    #[test]
    fn test_utf16_manifest_with_byte_order_mark() {
        let text = manifest::VALID.replace("UTF-8", "UTF-16");
        let le = utf16(&text, u16::to_le_bytes, [0xFF, 0xFE]);
        assert!(validate_manifest(&le).is_empty());

        let be = utf16(&text, u16::to_be_bytes, [0xFE, 0xFF]);
        assert!(validate_manifest(&be).is_empty());

        let dir = TempDir::new().unwrap();
        let path = write(&dir, ZipFixture::new().file("imsmanifest.xml", le));
        assert!(detect_package(&path).is_valid);
    }

    #[test]
    fn test_truncated_utf16_manifest_is_malformed() {
        let mut data = utf16(manifest::VALID, u16::to_le_bytes, [0xFF, 0xFE]);
        data.pop();
        let errors = validate_manifest(&data);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Malformed XML"));
    }

    #[test]
    fn test_utf8_manifest_with_byte_order_mark() {
        let mut data = "\u{feff}".as_bytes().to_vec();
        data.extend_from_slice(manifest::VALID.as_bytes());
        assert!(validate_manifest(&data).is_empty());
    }
}
