// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Error;

/// A named excerpt of a track. The start offset and duration are not
/// validated against the actual track length; seeking past the end of the
/// file simply plays out silence until the next loop re-seek.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Scene {
    /// The offset into the track where the scene begins, in seconds.
    pub start: f64,
    /// The length of the looped segment, in seconds.
    pub duration: f64,
    /// The icon file name inside the icon directory. Empty means no icon.
    #[serde(default)]
    pub icon: String,
}

/// The persisted unit binding one audio track to its scenes. Stored as one
/// JSON document per track; the file stem is the mapping id.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct TrackMapping {
    /// The track file name inside the asset directory.
    pub track: String,
    /// The scenes defined for this track, keyed by scene name.
    #[serde(default)]
    pub scenes: BTreeMap<String, Scene>,
}

/// Reads and writes track-mapping records in a directory of JSON documents.
#[derive(Clone)]
pub struct MappingStore {
    dir: PathBuf,
}

impl MappingStore {
    /// Opens the store, creating the mapping directory if needed.
    pub fn open(dir: &Path) -> Result<MappingStore, Error> {
        fs::create_dir_all(dir).map_err(|e| persistence(dir, e))?;
        Ok(MappingStore {
            dir: dir.to_path_buf(),
        })
    }

    /// Lists the ids of all mapping records, sorted for consistent output.
    pub fn mapping_ids(&self) -> Result<Vec<String>, Error> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| persistence(&self.dir, e))? {
            let path = entry.map_err(|e| persistence(&self.dir, e))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Loads the mapping record with the given id.
    pub fn load(&self, id: &str) -> Result<TrackMapping, Error> {
        let path = self.record_path(id);
        let contents = fs::read_to_string(&path).map_err(|e| persistence(&path, e))?;
        serde_json::from_str(&contents).map_err(|e| persistence(&path, e))
    }

    /// Loads every readable mapping record. Malformed or unreadable records
    /// are skipped with a warning rather than failing the listing.
    pub fn load_all(&self) -> Result<Vec<(String, TrackMapping)>, Error> {
        let mut mappings = Vec::new();
        for id in self.mapping_ids()? {
            match self.load(&id) {
                Ok(mapping) => mappings.push((id, mapping)),
                Err(e) => warn!(err = %e, id, "Skipping unreadable mapping record."),
            }
        }
        Ok(mappings)
    }

    /// Saves the mapping record with the given id.
    pub fn save(&self, id: &str, mapping: &TrackMapping) -> Result<(), Error> {
        let path = self.record_path(id);
        let contents =
            serde_json::to_string_pretty(mapping).map_err(|e| persistence(&path, e))?;
        fs::write(&path, contents).map_err(|e| persistence(&path, e))
    }

    /// Creates an empty mapping record for the given track file name and
    /// returns its id. An existing record for the track is left untouched.
    pub fn create(&self, track: &str) -> Result<String, Error> {
        let id = Path::new(track)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(track)
            .to_string();

        if !self.record_path(&id).exists() {
            self.save(
                &id,
                &TrackMapping {
                    track: track.to_string(),
                    scenes: BTreeMap::new(),
                },
            )?;
        }
        Ok(id)
    }

    /// Deletes the mapping record with the given id.
    pub fn delete(&self, id: &str) -> Result<(), Error> {
        let path = self.record_path(id);
        fs::remove_file(&path).map_err(|e| persistence(&path, e))
    }

    /// Adds or replaces a scene in the given mapping record.
    pub fn upsert_scene(&self, id: &str, name: &str, scene: Scene) -> Result<(), Error> {
        let mut mapping = self.load(id)?;
        mapping.scenes.insert(name.to_string(), scene);
        self.save(id, &mapping)
    }

    /// Removes a scene from the given mapping record. Removing a scene that
    /// isn't there is a no-op.
    pub fn remove_scene(&self, id: &str, name: &str) -> Result<(), Error> {
        let mut mapping = self.load(id)?;
        mapping.scenes.remove(name);
        self.save(id, &mapping)
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

fn persistence(path: &Path, err: impl ToString) -> Error {
    Error::Persistence {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;

    fn store() -> (tempfile::TempDir, MappingStore) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let store = MappingStore::open(dir.path()).expect("failed to open store");
        (dir, store)
    }

    #[test]
    fn test_roundtrip() -> Result<(), Error> {
        let (_dir, store) = store();

        let mut mapping = TrackMapping {
            track: "ambient.mp3".to_string(),
            scenes: BTreeMap::new(),
        };
        mapping.scenes.insert(
            "Tavern".to_string(),
            Scene {
                start: 60.0,
                duration: 30.0,
                icon: String::new(),
            },
        );

        store.save("ambient", &mapping)?;
        let loaded = store.load("ambient")?;
        assert_eq!(mapping, loaded);

        let scene = &loaded.scenes["Tavern"];
        assert_eq!(scene.start, 60.0);
        assert_eq!(scene.duration, 30.0);
        assert_eq!(scene.icon, "");
        Ok(())
    }

    #[test]
    fn test_create_and_list() -> Result<(), Error> {
        let (_dir, store) = store();

        assert_eq!(store.create("ambient.mp3")?, "ambient");
        assert_eq!(store.create("forest.mp3")?, "forest");
        assert_eq!(store.mapping_ids()?, vec!["ambient", "forest"]);

        // Creating a record for an existing track leaves it untouched.
        store.upsert_scene(
            "ambient",
            "Tavern",
            Scene {
                start: 60.0,
                duration: 30.0,
                icon: String::new(),
            },
        )?;
        store.create("ambient.mp3")?;
        assert_eq!(store.load("ambient")?.scenes.len(), 1);

        store.delete("forest")?;
        assert_eq!(store.mapping_ids()?, vec!["ambient"]);
        Ok(())
    }

    #[test]
    fn test_scene_upsert_and_remove() -> Result<(), Error> {
        let (_dir, store) = store();
        store.create("ambient.mp3")?;

        store.upsert_scene(
            "ambient",
            "Tavern",
            Scene {
                start: 60.0,
                duration: 30.0,
                icon: String::new(),
            },
        )?;
        store.upsert_scene(
            "ambient",
            "Tavern",
            Scene {
                start: 90.0,
                duration: 45.0,
                icon: "tavern.png".to_string(),
            },
        )?;

        let mapping = store.load("ambient")?;
        assert_eq!(mapping.scenes["Tavern"].start, 90.0);

        store.remove_scene("ambient", "Tavern")?;
        store.remove_scene("ambient", "Tavern")?;
        assert!(store.load("ambient")?.scenes.is_empty());
        Ok(())
    }

    #[test]
    fn test_malformed_record_is_skipped() -> Result<(), Error> {
        let (dir, store) = store();
        store.create("ambient.mp3")?;
        fs::write(dir.path().join("broken.json"), "{not json")
            .expect("failed to write broken record");

        assert!(store.load("broken").is_err());

        // The listing skips the broken record instead of failing.
        let mappings = store.load_all()?;
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].0, "ambient");
        Ok(())
    }

    #[test]
    fn test_load_missing_record() {
        let (_dir, store) = store();
        assert!(store.load("missing").is_err());
    }
}
