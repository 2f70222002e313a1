use std::{
    fs,
    path::{Path, PathBuf},
};

use shared::{domain::PairId, error::CatalogError};
use tracing::{debug, warn};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// One comparison unit as found on disk: a subfolder of the data directory
/// holding the candidate images for that pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairEntry {
    pub pair_id: PairId,
    /// Image files found in the pair folder, sorted by filename. A valid
    /// pair has at least two; the first two are the display options.
    pub images: Vec<PathBuf>,
    /// Numeric key extracted from the folder name, used for ordering.
    pub sort_key: u64,
}

impl PairEntry {
    /// A pair without two resolvable images cannot be voted on and is
    /// auto-skipped by the session controller.
    pub fn is_defective(&self) -> bool {
        self.images.len() < 2
    }

    /// The two images shown to the participant, in fixed first/second order.
    /// `None` for defective pairs.
    pub fn options(&self) -> Option<(&Path, &Path)> {
        match self.images.as_slice() {
            [first, second, ..] => Some((first, second)),
            _ => None,
        }
    }
}

/// The ordered pair catalog for one survey, scanned once at startup.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<PairEntry>,
}

impl Catalog {
    /// Scans `data_dir` for pair subfolders. Ordering is numeric-natural on
    /// the digits in each folder name ("2" sorts before "10"), with the
    /// folder name itself as the tie-breaker.
    pub fn scan(data_dir: &Path) -> Result<Self, CatalogError> {
        let dir = fs::read_dir(data_dir)
            .map_err(|_| CatalogError::UnreadableDataDir(data_dir.display().to_string()))?;

        let mut entries = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|e| CatalogError::Io(e.to_string()))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                warn!(path = %path.display(), "skipping pair folder with non-utf8 name");
                continue;
            };
            let images = list_images(&path)?;
            if images.len() < 2 {
                warn!(pair_id = name, images = images.len(), "pair folder is defective");
            }
            entries.push(PairEntry {
                pair_id: PairId(name.to_string()),
                sort_key: natural_sort_key(name),
                images,
            });
        }

        entries.sort_by(catalog_order);
        debug!(pairs = entries.len(), data_dir = %data_dir.display(), "catalog scanned");
        Ok(Self { entries })
    }

    /// Builds a catalog from entries produced by another provider, applying
    /// the same ordering the directory scan uses.
    pub fn from_entries(mut entries: Vec<PairEntry>) -> Self {
        entries.sort_by(catalog_order);
        Self { entries }
    }

    pub fn entries(&self) -> &[PairEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&PairEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn catalog_order(a: &PairEntry, b: &PairEntry) -> std::cmp::Ordering {
    a.sort_key
        .cmp(&b.sort_key)
        .then_with(|| a.pair_id.0.cmp(&b.pair_id.0))
}

fn list_images(pair_dir: &Path) -> Result<Vec<PathBuf>, CatalogError> {
    let mut images: Vec<PathBuf> = fs::read_dir(pair_dir)
        .map_err(|e| CatalogError::Io(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| {
                        IMAGE_EXTENSIONS
                            .iter()
                            .any(|known| ext.eq_ignore_ascii_case(known))
                    })
        })
        .collect();
    images.sort();
    Ok(images)
}

/// Concatenates the digits of `name` and parses them as one number; a name
/// with no digits keys as 0.
fn natural_sort_key(name: &str) -> u64 {
    let digits: String = name.chars().filter(|c| c.is_ascii_digit()).collect();
    // Saturate rather than fail on absurdly long digit runs.
    digits.parse().unwrap_or(if digits.is_empty() { 0 } else { u64::MAX })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
