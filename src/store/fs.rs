//! Directory-backed map store.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex_lite::Regex;

use super::StoreError;
use crate::codec::MapCodec;
use crate::types::{EnergyMap, EnergyMapMetadata, ShapeValidator, Tensor};

/// Directory under the data root that holds all domains.
pub const ENERGY_MAPS_DIR: &str = "energy_maps";

/// Reserved directory for precomputed pyramids.
pub const PYRAMIDS_DIR: &str = "pyramids";

/// Suffix appended to the map id for the metadata sidecar.
pub const METADATA_SUFFIX: &str = "_metadata.json";

const LATEST: &str = "<latest>";

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-][A-Za-z0-9_.-]*$").expect("static pattern"))
}

fn check_name(kind: &'static str, name: &str) -> Result<(), StoreError> {
    if name_regex().is_match(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidName { kind, name: name.to_string() })
    }
}

fn check_domain(domain: &str) -> Result<(), StoreError> {
    check_name("domain", domain)?;
    if domain == PYRAMIDS_DIR {
        return Err(StoreError::InvalidName {
            kind: "domain",
            name: domain.to_string(),
        });
    }
    Ok(())
}

/// A map file found in a domain directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapFile {
    /// File stem.
    pub map_id: String,
    /// Full path.
    pub path: PathBuf,
    /// Format, from the extension.
    pub codec: MapCodec,
}

/// Map files and sidecars under `<data_root>/energy_maps`.
#[derive(Debug, Clone)]
pub struct MapStore {
    root: PathBuf,
}

impl MapStore {
    /// Open a store, creating `energy_maps/` and the reserved `pyramids/`
    /// directory if missing.
    pub fn open(data_root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = data_root.as_ref().join(ENERGY_MAPS_DIR);
        std::fs::create_dir_all(root.join(PYRAMIDS_DIR))?;
        tracing::debug!(root = %root.display(), "Map store opened");
        Ok(Self { root })
    }

    /// The `energy_maps` directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The reserved pyramid directory.
    pub fn pyramid_dir(&self) -> PathBuf {
        self.root.join(PYRAMIDS_DIR)
    }

    /// Directory for `domain`, whether or not it exists.
    pub fn domain_dir(&self, domain: &str) -> Result<PathBuf, StoreError> {
        check_domain(domain)?;
        Ok(self.root.join(domain))
    }

    fn existing_domain_dir(&self, domain: &str) -> Result<PathBuf, StoreError> {
        let dir = self.domain_dir(domain)?;
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(StoreError::DomainNotFound(domain.to_string()))
        }
    }

    /// Whether the domain directory exists.
    pub fn has_domain(&self, domain: &str) -> bool {
        self.existing_domain_dir(domain).is_ok()
    }

    /// Domain names, sorted.
    pub fn list_domains(&self) -> Result<Vec<String>, StoreError> {
        let mut domains = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if check_domain(name).is_ok() {
                    domains.push(name.to_string());
                }
            }
        }
        domains.sort();
        Ok(domains)
    }

    /// All map files of a domain in both formats, sorted by file name.
    ///
    /// An id stored in both formats appears twice.
    pub fn map_files(&self, domain: &str) -> Result<Vec<MapFile>, StoreError> {
        let dir = self.existing_domain_dir(domain)?;
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(codec) = path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(MapCodec::from_extension)
            else {
                continue;
            };
            let Some(map_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            files.push(MapFile { map_id: map_id.to_string(), path, codec });
        }
        files.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
        tracing::debug!(domain, count = files.len(), "Scanned domain");
        Ok(files)
    }

    /// Distinct map ids of a domain, sorted.
    pub fn list_maps(&self, domain: &str) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.map_files(domain)?.into_iter().map(|f| f.map_id).collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Lexicographically last map file.
    pub fn latest(&self, domain: &str) -> Result<MapFile, StoreError> {
        self.map_files(domain)?
            .pop()
            .ok_or_else(|| StoreError::MapNotFound {
                domain: domain.to_string(),
                map_id: LATEST.to_string(),
            })
    }

    /// File for `map_id`, trying the raw tensor before the keyed archive.
    pub fn resolve(&self, domain: &str, map_id: &str) -> Result<MapFile, StoreError> {
        check_name("map id", map_id)?;
        let dir = self.existing_domain_dir(domain)?;
        MapCodec::ALL
            .iter()
            .map(|&codec| MapFile {
                map_id: map_id.to_string(),
                path: dir.join(format!("{map_id}.{}", codec.extension())),
                codec,
            })
            .find(|file| file.path.is_file())
            .ok_or_else(|| StoreError::MapNotFound {
                domain: domain.to_string(),
                map_id: map_id.to_string(),
            })
    }

    /// Latest file when `map_id` is `None`, else the named one.
    pub fn locate(&self, domain: &str, map_id: Option<&str>) -> Result<MapFile, StoreError> {
        match map_id {
            Some(id) => self.resolve(domain, id),
            None => self.latest(domain),
        }
    }

    /// Decode and validate a map file.
    pub fn read_map(&self, file: &MapFile) -> Result<EnergyMap, StoreError> {
        let bytes = std::fs::read(&file.path)?;
        let tensor = file.codec.decode(&bytes)?;
        ShapeValidator::validate(&tensor)?;
        Ok(EnergyMap::try_from(tensor)?)
    }

    /// Write `map` as `<map_id>.npy`, creating the domain directory.
    ///
    /// A `.npt` file with the same id is removed so the id resolves to the
    /// new data.
    pub fn write_map(&self, domain: &str, map_id: &str, map: &EnergyMap) -> Result<PathBuf, StoreError> {
        check_name("map id", map_id)?;
        let dir = self.domain_dir(domain)?;
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{map_id}.{}", MapCodec::RawTensor.extension()));
        MapCodec::RawTensor.write_file(&path, &Tensor::from(map.clone()))?;

        let stale = dir.join(format!("{map_id}.{}", MapCodec::KeyedArchive.extension()));
        if stale.is_file() {
            std::fs::remove_file(&stale)?;
            tracing::debug!(domain, map_id, path = %stale.display(), "Removed stale archive");
        }
        Ok(path)
    }

    fn sidecar_path(&self, domain: &str, map_id: &str) -> Result<PathBuf, StoreError> {
        check_name("map id", map_id)?;
        Ok(self.domain_dir(domain)?.join(format!("{map_id}{METADATA_SUFFIX}")))
    }

    /// Stored sidecar for a map, if present.
    pub fn read_metadata(&self, domain: &str, map_id: &str) -> Result<Option<EnergyMapMetadata>, StoreError> {
        let path = self.sidecar_path(domain, map_id)?;
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Write the sidecar for `metadata.map_id` in `metadata.domain`.
    pub fn write_metadata(&self, metadata: &EnergyMapMetadata) -> Result<PathBuf, StoreError> {
        let path = self.sidecar_path(&metadata.domain, &metadata.map_id)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(metadata)?)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::KeyedArchive;
    use tempfile::TempDir;

    fn store() -> (TempDir, MapStore) {
        let dir = TempDir::new().unwrap();
        let store = MapStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_creates_layout() {
        let (dir, store) = store();
        assert!(dir.path().join("energy_maps").is_dir());
        assert!(store.pyramid_dir().is_dir());
        assert!(store.list_domains().unwrap().is_empty());
    }

    #[test]
    fn test_name_rules() {
        assert!(check_domain("solar_2024").is_ok());
        assert!(check_domain("a.b-c").is_ok());
        assert!(check_domain("pyramids").is_err());
        assert!(check_domain("..").is_err());
        assert!(check_domain(".hidden").is_err());
        assert!(check_domain("a/b").is_err());
        assert!(check_domain("").is_err());
    }

    #[test]
    fn test_missing_domain() {
        let (_dir, store) = store();
        assert!(matches!(store.map_files("nope"), Err(StoreError::DomainNotFound(_))));
        assert!(matches!(store.resolve("nope", "x"), Err(StoreError::DomainNotFound(_))));
    }

    #[test]
    fn test_write_then_resolve() {
        let (_dir, store) = store();
        let map = EnergyMap::filled(64, 64, 2.0);
        store.write_map("solar", "m1", &map).unwrap();

        let file = store.resolve("solar", "m1").unwrap();
        assert_eq!(file.codec, MapCodec::RawTensor);
        assert_eq!(store.read_map(&file).unwrap(), map);
        assert_eq!(store.list_domains().unwrap(), vec!["solar".to_string()]);
    }

    #[test]
    fn test_files_sorted_and_latest() {
        let (_dir, store) = store();
        let map = EnergyMap::filled(64, 64, 1.0);
        for id in ["b", "a", "c"] {
            store.write_map("solar", id, &map).unwrap();
        }
        let ids: Vec<_> = store.map_files("solar").unwrap().into_iter().map(|f| f.map_id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(store.latest("solar").unwrap().map_id, "c");
    }

    #[test]
    fn test_sidecars_are_not_map_files() {
        let (_dir, store) = store();
        let map = EnergyMap::filled(64, 64, 1.0);
        store.write_map("solar", "m1", &map).unwrap();
        store
            .write_metadata(&EnergyMapMetadata::compute(&map, "m1", "solar"))
            .unwrap();
        assert_eq!(store.list_maps("solar").unwrap(), vec!["m1".to_string()]);
        assert_eq!(store.read_metadata("solar", "m1").unwrap().unwrap().map_id, "m1");
        assert!(store.read_metadata("solar", "m2").unwrap().is_none());
    }

    #[test]
    fn test_write_removes_stale_archive() {
        let (_dir, store) = store();
        let old = EnergyMap::filled(64, 64, 9.0);
        let dir = store.domain_dir("solar").unwrap();
        std::fs::create_dir_all(&dir).unwrap();
        let archive = KeyedArchive::new().with_entry("energy", Tensor::from(old));
        std::fs::write(dir.join("m1.npt"), archive.encode().unwrap()).unwrap();

        store.write_map("solar", "m1", &EnergyMap::filled(64, 64, 1.0)).unwrap();
        assert!(!dir.join("m1.npt").exists());
        assert_eq!(store.map_files("solar").unwrap().len(), 1);
    }

    #[test]
    fn test_read_rejects_bad_shape() {
        let (_dir, store) = store();
        let dir = store.domain_dir("solar").unwrap();
        std::fs::create_dir_all(&dir).unwrap();
        let tensor = Tensor::new(vec![100, 100], vec![1.0; 10_000]).unwrap();
        MapCodec::RawTensor.write_file(&dir.join("bad.npy"), &tensor).unwrap();

        let file = store.resolve("solar", "bad").unwrap();
        assert!(matches!(store.read_map(&file), Err(StoreError::Shape(_))));
    }

    #[test]
    fn test_pyramids_dir_is_not_a_domain() {
        let (_dir, store) = store();
        assert!(store.list_domains().unwrap().is_empty());
        assert!(matches!(
            store.write_map("pyramids", "m1", &EnergyMap::filled(64, 64, 1.0)),
            Err(StoreError::InvalidName { .. })
        ));
    }
}
