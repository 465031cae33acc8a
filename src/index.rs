//! Index of the dSYM bundles found in the search paths.

use indexmap::IndexMap;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::bundle::DebugBundle;
use crate::properties::PropertyReader;
use crate::report::BinaryImage;
use crate::search_paths::SearchPaths;

pub const BUNDLE_EXTENSION: &str = "dSYM";

/// Bundles keyed by the name of their DWARF binary.
#[derive(Debug, Default)]
pub struct BundleIndex {
    bundles: IndexMap<String, DebugBundle>,
    scanned_dirs: usize,
    skipped: Vec<(PathBuf, String)>,
}

impl BundleIndex {
    pub fn new() -> BundleIndex {
        BundleIndex::default()
    }

    /// Scans every search path in order. Later paths override earlier ones.
    pub fn build(paths: &SearchPaths, properties: &dyn PropertyReader) -> BundleIndex {
        let mut index = BundleIndex::new();
        info!("Scan dSYM paths:");
        for path in paths.iter() {
            info!("    dSYM path {}", path.display());
            index.scan_dir(path, properties);
        }
        index
    }

    /// Adds every usable bundle directly inside `dir`.
    pub fn scan_dir(&mut self, dir: &Path, properties: &dyn PropertyReader) {
        self.scanned_dirs += 1;
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("skipping search path {}: {}", dir.display(), err);
                return;
            }
        };

        let mut bundle_dirs = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| is_bundle_dir(path))
            .collect::<Vec<_>>();
        bundle_dirs.sort();

        for bundle_dir in bundle_dirs {
            match DebugBundle::read(&bundle_dir, properties) {
                Ok(bundle) => {
                    debug!(
                        "found {} {} ({}) in {}",
                        bundle.identifier,
                        bundle.version,
                        bundle.binary_name,
                        bundle_dir.display()
                    );
                    self.insert(bundle);
                }
                Err(rejection) => {
                    warn!("skipping {}: {}", bundle_dir.display(), rejection);
                    self.skipped.push((bundle_dir, rejection.to_string()));
                }
            }
        }
    }

    /// Inserts `bundle`, replacing any bundle for the same binary.
    pub fn insert(&mut self, bundle: DebugBundle) {
        let path = bundle.bundle_path.clone();
        if let Some(previous) = self.bundles.insert(bundle.binary_name.clone(), bundle) {
            debug!(
                "{}: {} overrides {}",
                previous.binary_name,
                path.display(),
                previous.bundle_path.display()
            );
        }
    }

    /// Merges `other` into `self`; bundles from `other` win.
    pub fn merge(&mut self, other: BundleIndex) {
        self.scanned_dirs += other.scanned_dirs;
        self.skipped.extend(other.skipped);
        for (_, bundle) in other.bundles {
            self.insert(bundle);
        }
    }

    pub fn get(&self, binary_name: &str) -> Option<&DebugBundle> {
        self.bundles.get(binary_name)
    }

    pub fn find_by_identifier(&self, identifier: &str) -> Option<&DebugBundle> {
        self.bundles.values().find(|b| b.identifier == identifier)
    }

    fn find_by_identifier_mut(&mut self, identifier: &str) -> Option<&mut DebugBundle> {
        self.bundles.values_mut().find(|b| b.identifier == identifier)
    }

    /// The bundle a stack frame naming `binary` should be resolved against,
    /// provided its load address is known.
    pub fn resolvable(&self, binary: &str) -> Option<&DebugBundle> {
        self.get(binary)
            .or_else(|| self.find_by_identifier(binary))
            .filter(|bundle| bundle.load_address.is_some())
    }

    /// Records the load address of every bundle listed in `images`.
    ///
    /// The first image naming a bundle sets its address. Stops as soon as
    /// every bundle has one. Returns the number of bundles matched.
    pub fn assign_load_addresses<'a, I>(&mut self, images: I) -> usize
    where
        I: IntoIterator<Item = &'a BinaryImage>,
    {
        let mut matched = self.matched();
        if matched == self.len() {
            return matched;
        }
        for image in images {
            if let Some(bundle) = self.find_by_identifier_mut(&image.identifier) {
                if bundle.load_address.is_none() {
                    debug!("{} loaded at {:#x}", bundle.identifier, image.load_address);
                    bundle.load_address = Some(image.load_address);
                    matched += 1;
                    if matched == self.len() {
                        break;
                    }
                }
            }
        }
        matched
    }

    pub fn matched(&self) -> usize {
        self.bundles.values().filter(|b| b.load_address.is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn scanned_dirs(&self) -> usize {
        self.scanned_dirs
    }

    /// Bundle directories that were found but could not be used, with the reason.
    pub fn skipped(&self) -> &[(PathBuf, String)] {
        &self.skipped
    }
}

fn is_bundle_dir(path: &Path) -> bool {
    path.is_dir()
        && path
            .extension()
            .map_or(false, |ext| ext.to_string_lossy().eq_ignore_ascii_case(BUNDLE_EXTENSION))
}
