//! dSYM bundle metadata.

use log::trace;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::properties::PropertyReader;

/// Directory inside a bundle that holds the DWARF binary.
pub const DWARF_DIR: &str = "Contents/Resources/DWARF";
pub const INFO_PLIST: &str = "Contents/Info.plist";
pub const IDENTIFIER_KEY: &str = "CFBundleIdentifier";
pub const VERSION_KEY: &str = "CFBundleShortVersionString";
/// Prefix Xcode puts in front of the identifier of the binary the dSYM belongs to.
pub const DSYM_IDENTIFIER_PREFIX: &str = "com.apple.xcode.dsym.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugBundle {
    pub bundle_path: PathBuf,
    pub binary_name: String,
    pub binary_path: PathBuf,
    pub identifier: String,
    pub version: String,
    pub load_address: Option<u64>,
}

impl DebugBundle {
    /// Reads the bundle at `bundle_path`.
    ///
    /// Never fails hard: anything that makes the bundle unusable is
    /// reported as a [`Rejection`].
    pub fn read(bundle_path: &Path, properties: &dyn PropertyReader) -> Result<DebugBundle, Rejection> {
        let binary_path = find_binary(bundle_path)?;
        let binary_name = binary_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or(Rejection::NoBinary)?;

        let plist = bundle_path.join(INFO_PLIST);
        let identifier = properties
            .read_string(&plist, IDENTIFIER_KEY)
            .ok_or(Rejection::MissingProperty(IDENTIFIER_KEY))?;
        let version = properties
            .read_string(&plist, VERSION_KEY)
            .ok_or(Rejection::MissingProperty(VERSION_KEY))?;

        Ok(DebugBundle {
            bundle_path: bundle_path.to_path_buf(),
            binary_name,
            binary_path,
            identifier: normalize_identifier(&identifier).to_string(),
            version,
            load_address: None,
        })
    }
}

/// Strips the dSYM prefix so the identifier matches the one listed under
/// `Binary Images:`.
pub fn normalize_identifier(identifier: &str) -> &str {
    identifier
        .strip_prefix(DSYM_IDENTIFIER_PREFIX)
        .unwrap_or(identifier)
}

fn find_binary(bundle_path: &Path) -> Result<PathBuf, Rejection> {
    let dwarf_dir = bundle_path.join(DWARF_DIR);
    let entries = fs::read_dir(&dwarf_dir).map_err(|_| Rejection::NoBinary)?;

    let mut candidates = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .map(|entry| entry.path())
        .collect::<Vec<_>>();
    trace!("{} candidate binaries in {}", candidates.len(), dwarf_dir.display());

    match candidates.len() {
        0 => Err(Rejection::NoBinary),
        1 => Ok(candidates.remove(0)),
        n => Err(Rejection::AmbiguousBinary(n)),
    }
}

/// Why a bundle cannot be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NoBinary,
    AmbiguousBinary(usize),
    MissingProperty(&'static str),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Rejection::NoBinary => write!(f, "no binary in {}", DWARF_DIR),
            Rejection::AmbiguousBinary(n) => write!(f, "{} candidate binaries in {}", n, DWARF_DIR),
            Rejection::MissingProperty(key) => write!(f, "{} missing from {}", key, INFO_PLIST),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Props(HashMap<&'static str, &'static str>);

    impl PropertyReader for Props {
        fn read_string(&self, _plist: &Path, key: &str) -> Option<String> {
            self.0.get(key).map(|v| v.to_string())
        }
    }

    fn complete() -> Props {
        let mut map = HashMap::new();
        map.insert(IDENTIFIER_KEY, "com.apple.xcode.dsym.com.example.app");
        map.insert(VERSION_KEY, "1.0");
        Props(map)
    }

    fn bundle_with(binaries: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let dwarf = dir.path().join(DWARF_DIR);
        fs::create_dir_all(&dwarf).unwrap();
        for binary in binaries {
            fs::write(dwarf.join(binary), b"").unwrap();
        }
        dir
    }

    #[test]
    fn reads_complete_bundle() {
        let dir = bundle_with(&["App", ".DS_Store"]);
        let bundle = DebugBundle::read(dir.path(), &complete()).unwrap();
        assert_eq!(bundle.binary_name, "App");
        assert_eq!(bundle.binary_path, dir.path().join(DWARF_DIR).join("App"));
        assert_eq!(bundle.identifier, "com.example.app");
        assert_eq!(bundle.version, "1.0");
        assert_eq!(bundle.load_address, None);
    }

    #[test]
    fn rejects_missing_or_ambiguous_binary() {
        let empty = bundle_with(&[]);
        assert_eq!(DebugBundle::read(empty.path(), &complete()), Err(Rejection::NoBinary));

        let two = bundle_with(&["App", "Other"]);
        assert_eq!(
            DebugBundle::read(two.path(), &complete()),
            Err(Rejection::AmbiguousBinary(2))
        );

        let no_dwarf_dir = tempfile::tempdir().unwrap();
        assert_eq!(
            DebugBundle::read(no_dwarf_dir.path(), &complete()),
            Err(Rejection::NoBinary)
        );
    }

    #[test]
    fn rejects_incomplete_metadata() {
        let dir = bundle_with(&["App"]);
        let mut props = complete();
        props.0.remove(VERSION_KEY);
        assert_eq!(
            DebugBundle::read(dir.path(), &props),
            Err(Rejection::MissingProperty(VERSION_KEY))
        );
    }

    #[test]
    fn identifier_prefix() {
        assert_eq!(normalize_identifier("com.apple.xcode.dsym.org.foo.Bar"), "org.foo.Bar");
        assert_eq!(normalize_identifier("org.foo.Bar"), "org.foo.Bar");
    }
}
