//! Patch fragment serialization.
//!
//! A fragment is a self-contained piece of a patch: object texts with their
//! positions and widget values, plus the connections among them. Objects are
//! referenced by their position in the fragment, so a fragment can be pasted
//! into any patch. The same format backs the clipboard (copy, paste,
//! duplicate) and whole-patch files, where the patch metadata travels along.
//! Subpatch boxes carry their contents as a nested fragment.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current fragment format version.
/// Increment this when making breaking changes to the format.
pub const FRAGMENT_VERSION: u32 = 1;

/// A serialisable piece of a patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchFragment {
    /// Format version for future compatibility.
    pub version: u32,
    /// Objects, in canonical order.
    pub objects: Vec<ObjectRecord>,
    /// Connections between objects of this fragment.
    pub connections: Vec<ConnectionRecord>,
    /// Patch metadata; only written for whole patches.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub info: BTreeMap<String, String>,
}

impl PatchFragment {
    pub fn new() -> Self {
        Self {
            version: FRAGMENT_VERSION,
            objects: Vec::new(),
            connections: Vec::new(),
            info: BTreeMap::new(),
        }
    }

    /// Check if this fragment version is compatible with the current format.
    pub fn is_compatible(&self) -> bool {
        self.version <= FRAGMENT_VERSION
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Top-left corner of the fragment's objects.
    pub fn origin(&self) -> Option<(i32, i32)> {
        let x = self.objects.iter().map(|o| o.position.0).min()?;
        let y = self.objects.iter().map(|o| o.position.1).min()?;
        Some((x, y))
    }

    /// Serialises to compact JSON (clipboard form).
    pub fn to_json(&self) -> Result<String, FragmentError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses and version-checks a fragment.
    pub fn from_json(text: &str) -> Result<Self, FragmentError> {
        let fragment: PatchFragment = serde_json::from_str(text)?;
        if !fragment.is_compatible() {
            return Err(FragmentError::IncompatibleVersion {
                found: fragment.version,
                expected: FRAGMENT_VERSION,
            });
        }
        Ok(fragment)
    }
}

impl Default for PatchFragment {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialized data for a single object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Full object text, e.g. `"osc~ 440"` or `"msg bang"`.
    pub text: String,
    /// Position in patch coordinates.
    pub position: (i32, i32),
    /// Widget value, if the object has one worth keeping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f32>,
    /// Contents of a subpatch box.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subpatch: Option<PatchFragment>,
}

impl ObjectRecord {
    pub fn new(text: impl Into<String>, position: (i32, i32)) -> Self {
        Self {
            text: text.into(),
            position,
            value: None,
            subpatch: None,
        }
    }
}

/// Serialized data for a connection, by position within the fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub source: usize,
    pub outlet: usize,
    pub sink: usize,
    pub inlet: usize,
}

impl ConnectionRecord {
    pub fn new(source: usize, outlet: usize, sink: usize, inlet: usize) -> Self {
        Self {
            source,
            outlet,
            sink,
            inlet,
        }
    }
}

/// Error type for fragment operations.
#[derive(Debug, Error)]
pub enum FragmentError {
    /// File I/O error.
    #[error("file error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Incompatible fragment version.
    #[error("incompatible patch version: found {found}, expected <= {expected}")]
    IncompatibleVersion { found: u32, expected: u32 },
}

/// Save a fragment to a JSON file.
pub fn save_to_file(fragment: &PatchFragment, path: &Path) -> Result<(), FragmentError> {
    let json = serde_json::to_string_pretty(fragment)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Load a fragment from a JSON file.
pub fn load_from_file(path: &Path) -> Result<PatchFragment, FragmentError> {
    let json = std::fs::read_to_string(path)?;
    PatchFragment::from_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PatchFragment {
        let mut fragment = PatchFragment::new();
        fragment.objects.push(ObjectRecord::new("osc~ 440", (100, 40)));
        fragment.objects.push(ObjectRecord::new("dac~", (90, 120)));
        fragment.connections.push(ConnectionRecord::new(0, 0, 1, 0));
        fragment
    }

    #[test]
    fn test_fragment_creation() {
        let fragment = PatchFragment::new();
        assert_eq!(fragment.version, FRAGMENT_VERSION);
        assert!(fragment.is_empty());
        assert_eq!(fragment.origin(), None);
    }

    #[test]
    fn test_fragment_json() {
        let fragment = sample();
        let json = fragment.to_json().unwrap();
        assert!(!json.contains("info"));
        assert!(!json.contains("value"));

        let loaded = PatchFragment::from_json(&json).unwrap();
        assert_eq!(loaded, fragment);
    }

    #[test]
    fn test_subpatch_contents_nest() {
        let mut voice = ObjectRecord::new("pd voice", (0, 60));
        voice.subpatch = Some(sample());
        let mut fragment = PatchFragment::new();
        fragment.objects.push(ObjectRecord::new("f", (0, 0)));
        fragment.objects.push(voice);
        fragment.connections.push(ConnectionRecord::new(0, 0, 1, 0));

        let json = fragment.to_json().unwrap();
        assert!(json.contains("subpatch"));
        let loaded = PatchFragment::from_json(&json).unwrap();
        assert_eq!(loaded.objects[1].subpatch.as_ref().map(|sub| sub.objects.len()), Some(2));
        assert_eq!(loaded, fragment);
    }

    #[test]
    fn test_origin() {
        assert_eq!(sample().origin(), Some((90, 40)));
    }

    #[test]
    fn test_version_compatibility() {
        let mut fragment = sample();
        assert!(fragment.is_compatible());

        fragment.version = FRAGMENT_VERSION + 1;
        let json = serde_json::to_string(&fragment).unwrap();
        assert!(matches!(
            PatchFragment::from_json(&json),
            Err(FragmentError::IncompatibleVersion { .. })
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            PatchFragment::from_json("not a patch"),
            Err(FragmentError::Serialization(_))
        ));
    }

    #[test]
    fn test_file_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "patch_canvas_fragment_{}.json",
            std::process::id()
        ));
        let mut fragment = sample();
        fragment.info.insert("0_0_1_0/Path".into(), "1,2".into());

        save_to_file(&fragment, &path).unwrap();
        let loaded = load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, fragment);
    }
}
