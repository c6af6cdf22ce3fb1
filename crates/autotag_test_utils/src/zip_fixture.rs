use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Manifest bodies for package tests.
pub mod manifest {
    /// Namespaced manifest with both required sections.
    pub const VALID: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest identifier="course-1" version="1.0"
    xmlns="http://www.imsglobal.org/xsd/imscp_v1p1"
    xmlns:adlcp="http://www.adlnet.org/xsd/adlcp_v1p3">
  <organizations default="org-1">
    <organization identifier="org-1">
      <title>Real Estate Basics</title>
      <item identifier="item-1" identifierref="res-1"><title>Module 1</title></item>
    </organization>
  </organizations>
  <resources>
    <resource identifier="res-1" type="webcontent" adlcp:scormType="sco" href="index.html">
      <file href="index.html"/>
    </resource>
  </resources>
</manifest>
"#;

    /// Prefixed root element (`<imscp:manifest>`).
    pub const PREFIXED: &str = r#"<?xml version="1.0"?>
<imscp:manifest xmlns:imscp="http://www.imsglobal.org/xsd/imscp_v1p1" identifier="m">
  <imscp:organizations/>
  <imscp:resources/>
</imscp:manifest>
"#;

    pub const MISSING_ORGANIZATIONS: &str = r#"<?xml version="1.0"?>
<manifest identifier="m" xmlns="http://www.imsglobal.org/xsd/imscp_v1p1">
  <resources/>
</manifest>
"#;

    pub const MISSING_BOTH: &str = r#"<manifest identifier="m"><metadata/></manifest>"#;

    pub const MALFORMED: &str = r#"<manifest><organizations></manifest>"#;
}

#[derive(Debug, Clone)]
enum FixtureEntry {
    File { name: String, data: Vec<u8> },
    Dir { name: String },
}

/// Builder for in-memory ZIP archives.
///
/// Entry names are written verbatim, so hostile names such as `../x` or
/// `/etc/x` can be produced for extraction tests.
#[derive(Debug, Clone, Default)]
pub struct ZipFixture {
    entries: Vec<FixtureEntry>,
}

impl ZipFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, name: &str, data: impl AsRef<[u8]>) -> Self {
        self.entries.push(FixtureEntry::File {
            name: name.to_string(),
            data: data.as_ref().to_vec(),
        });
        self
    }

    pub fn dir(mut self, name: &str) -> Self {
        self.entries.push(FixtureEntry::Dir {
            name: name.to_string(),
        });
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for entry in &self.entries {
            match entry {
                FixtureEntry::File { name, data } => {
                    writer
                        .start_file(name.as_str(), options)
                        .expect("start zip entry");
                    writer.write_all(data).expect("write zip entry");
                }
                FixtureEntry::Dir { name } => {
                    writer
                        .add_directory(name.as_str(), options)
                        .expect("add zip directory");
                }
            }
        }

        writer.finish().expect("finish zip").into_inner()
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_bytes())
    }
}
