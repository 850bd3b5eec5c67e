//! Tile version oracles

use crate::core::constants::UNVERSIONED;
use crate::traits::TileVersionOracle;
use fxhash::FxHashMap;
use std::sync::RwLock;

/// Oracle for datasets that never change
#[derive(Debug, Clone, Copy, Default)]
pub struct UnversionedTiles;

impl TileVersionOracle for UnversionedTiles {
    fn version_of(&self, _level: u32, _row: u32, _col: u32) -> u64 {
        UNVERSIONED
    }
}

/// Explicit per-tile versions, updated by whoever writes the tile store.
/// Tiles without an entry report [`UNVERSIONED`].
#[derive(Debug, Default)]
pub struct VersionTable {
    versions: RwLock<FxHashMap<(u32, u32, u32), u64>>,
}

impl VersionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, level: u32, row: u32, col: u32, version: u64) {
        if let Ok(mut versions) = self.versions.write() {
            versions.insert((level, row, col), version);
        }
    }

    /// Increments the tile's version and returns the new value
    pub fn bump(&self, level: u32, row: u32, col: u32) -> u64 {
        match self.versions.write() {
            Ok(mut versions) => {
                let v = versions.entry((level, row, col)).or_insert(UNVERSIONED);
                *v += 1;
                *v
            }
            Err(_) => UNVERSIONED,
        }
    }

    pub fn clear(&self) {
        if let Ok(mut versions) = self.versions.write() {
            versions.clear();
        }
    }
}

impl TileVersionOracle for VersionTable {
    fn version_of(&self, level: u32, row: u32, col: u32) -> u64 {
        self.versions
            .read()
            .ok()
            .and_then(|v| v.get(&(level, row, col)).copied())
            .unwrap_or(UNVERSIONED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unversioned() {
        assert_eq!(UnversionedTiles.version_of(3, 1, 2), 0);
    }

    #[test]
    fn test_version_table() {
        let table = VersionTable::new();
        assert_eq!(table.version_of(1, 0, 0), 0);
        assert_eq!(table.bump(1, 0, 0), 1);
        assert_eq!(table.bump(1, 0, 0), 2);
        table.set(2, 3, 4, 9);
        assert_eq!(table.version_of(2, 3, 4), 9);
        assert_eq!(table.version_of(1, 0, 0), 2);
        table.clear();
        assert_eq!(table.version_of(2, 3, 4), 0);
    }
}
