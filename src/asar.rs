//! Writing the shim `app.asar`.
//!
//! Electron loads application code from an asar archive: a pickled header
//! followed by the concatenated file bodies. The shim archive holds only two
//! entries, an `index.js` that requires the Vencord bundle and a
//! `package.json` naming it as the entry point.
//!
//! Layout, all integers little-endian `u32`:
//!
//! ```text
//! [4][aligned + 8][aligned + 4][json len] json "000" bodies...
//! ```
//!
//! where `aligned` is the JSON length rounded up to a multiple of 4 and the
//! gap is filled with ASCII `'0'` bytes.
use std::{
    collections::BTreeMap,
    fs::File,
    io::Write,
    path::Path,
};

use serde::Serialize;

use crate::error::{AddContext, AddPatchContext, PatchError, PatchErrorKind};

/// Name of the shim entry point inside the archive.
pub const INDEX_JS: &str = "index.js";

/// Name of the package manifest inside the archive.
pub const PACKAGE_JSON: &str = "package.json";

/// Contents of the shim's `package.json`.
pub const PACKAGE_JSON_CONTENTS: &str = r#"{
	"name": "discord",
	"main": "index.js"
}"#;

const PICKLE_SIZE_FIELD: u32 = 4;
const ALIGNMENT: u32 = 4;

#[derive(Serialize)]
struct Header<'a> {
    files: BTreeMap<&'a str, HeaderEntry>,
}

#[derive(Serialize)]
struct HeaderEntry {
    size: i32,
    offset: String,
}

/// Returns the `index.js` source that loads the bundle at `target`.
pub fn index_js(target: &str) -> String {
    // Serializing a str cannot fail.
    let quoted = serde_json::to_string(target).unwrap_or_default();
    format!("require({quoted})")
}

/// An in-memory archive with entries in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimArchive {
    entries: Vec<(String, Vec<u8>)>,
}

impl ShimArchive {
    /// Creates the two entry shim loading the bundle at `target`.
    pub fn new(target: &str) -> Self {
        Self {
            entries: vec![
                (INDEX_JS.to_string(), index_js(target).into_bytes()),
                (
                    PACKAGE_JSON.to_string(),
                    PACKAGE_JSON_CONTENTS.as_bytes().to_vec(),
                ),
            ],
        }
    }

    /// Creates the shim for a bundle path.
    ///
    /// The path must be valid UTF-8 since it is embedded in JavaScript.
    pub fn for_bundle(bundle_path: &Path) -> Result<Self, PatchError> {
        let target = bundle_path.to_str().ok_or_else(|| {
            PatchError::new(PatchErrorKind::InvalidData)
                .with_context(format!("bundle path is not valid UTF-8: {bundle_path:?}"))
        })?;

        Ok(Self::new(target))
    }

    /// Returns the entries as name and content pairs.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(name, content)| (name.as_str(), content.as_slice()))
    }

    /// Serializes the archive.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PatchError> {
        let mut files = BTreeMap::new();
        let mut offset = 0usize;

        for (name, content) in &self.entries {
            let size = i32::try_from(content.len()).map_err(|_| {
                PatchError::new(PatchErrorKind::InvalidData)
                    .with_context(format!("entry {name} too large"))
            })?;
            files.insert(
                name.as_str(),
                HeaderEntry {
                    size,
                    offset: offset.to_string(),
                },
            );
            offset += content.len();
        }

        let header = serde_json::to_string(&Header { files })
            .with_context("failed to serialize asar header")?;
        let header_len = u32::try_from(header.len())
            .map_err(|_| PatchError::new(PatchErrorKind::InvalidData))?;
        let aligned = header_len.div_ceil(ALIGNMENT) * ALIGNMENT;
        let padding = (aligned - header_len) as usize;

        let mut buf = Vec::with_capacity(16 + aligned as usize + offset);

        for value in [PICKLE_SIZE_FIELD, aligned + 8, aligned + 4, header_len] {
            buf.extend_from_slice(&value.to_le_bytes());
        }

        buf.extend_from_slice(header.as_bytes());
        buf.extend(std::iter::repeat(b'0').take(padding));

        for (_, content) in &self.entries {
            buf.extend_from_slice(content);
        }

        Ok(buf)
    }

    /// Writes the archive to a writer.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), PatchError> {
        let bytes = self.to_bytes()?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }
}

/// Creates `out_file` containing a shim archive that loads `target`.
pub fn write_shim_archive(out_file: &Path, target: &str) -> Result<(), PatchError> {
    tracing::debug!(?out_file, target, "writing shim app.asar");

    let file = File::create(out_file)
        .map_err(PatchError::from)
        .patch_contextc(|| format!("failed to create {out_file:?}"))?;
    ShimArchive::new(target).write_to(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u32(bytes: &[u8], index: usize) -> u32 {
        u32::from_le_bytes(bytes[index * 4..index * 4 + 4].try_into().unwrap())
    }

    #[test]
    fn test_index_js_quotes_path() {
        assert_eq!(
            index_js("/home/rust/.config/Vencord/vencord.asar"),
            r#"require("/home/rust/.config/Vencord/vencord.asar")"#
        );
        assert_eq!(
            index_js(r"C:\Users\rust\vencord.asar"),
            r#"require("C:\\Users\\rust\\vencord.asar")"#
        );
    }

    #[test]
    fn test_header_is_consistent() {
        let archive = ShimArchive::new("/opt/vencord/vencord.asar");
        let bytes = archive.to_bytes().unwrap();

        let pickle_size = read_u32(&bytes, 0);
        let header_size = read_u32(&bytes, 1);
        let header_object_size = read_u32(&bytes, 2);
        let header_string_size = read_u32(&bytes, 3);

        assert_eq!(pickle_size, 4);
        assert_eq!(header_size, header_object_size + 4);
        assert_eq!(header_object_size % 4, 0);

        let padding = (header_object_size - 4 - header_string_size) as usize;
        assert!(padding < 4);

        let json_start = 16;
        let json_end = json_start + header_string_size as usize;
        let json = std::str::from_utf8(&bytes[json_start..json_end]).unwrap();
        assert!(bytes[json_end..json_end + padding].iter().all(|&b| b == b'0'));

        let header: serde_json::Value = serde_json::from_str(json).unwrap();
        let files = &header["files"];
        let index = index_js("/opt/vencord/vencord.asar");

        assert_eq!(files["index.js"]["offset"], "0");
        assert_eq!(files["index.js"]["size"], index.len());
        assert_eq!(files["package.json"]["offset"], index.len().to_string());
        assert_eq!(files["package.json"]["size"], PACKAGE_JSON_CONTENTS.len());

        let body = &bytes[json_end + padding..];
        assert_eq!(body.len(), index.len() + PACKAGE_JSON_CONTENTS.len());
        assert_eq!(&body[..index.len()], index.as_bytes());
        assert_eq!(&body[index.len()..], PACKAGE_JSON_CONTENTS.as_bytes());
    }

    #[test]
    fn test_write_shim_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.asar");

        write_shim_archive(&path, "/x/vencord.asar").unwrap();

        let written = std::fs::read(&path).unwrap();
        assert_eq!(
            written,
            ShimArchive::new("/x/vencord.asar").to_bytes().unwrap()
        );
    }

    #[test]
    fn test_write_shim_archive_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("app.asar");

        assert!(write_shim_archive(&path, "/x").is_err());
    }
}
