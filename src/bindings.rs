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
//! Persisted lookup tables that feed the trigger router: key combinations
//! and macro-pad buttons, each resolving to a (mapping id, scene name) pair.
//! Bindings have no lifecycle coupling to scenes; a binding whose scene was
//! deleted stays in the table and surfaces as SceneNotFound at trigger time.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Error;

/// Keyboard hotkey bindings: mapping id -> scene name -> key combination.
pub struct HotkeyBindings {
    path: PathBuf,
    keys: HashMap<String, HashMap<String, String>>,
}

impl HotkeyBindings {
    /// Loads the hotkey table. A missing or malformed file is treated as an
    /// empty table.
    pub fn load(path: &Path) -> HotkeyBindings {
        HotkeyBindings {
            path: path.to_path_buf(),
            keys: read_table(path),
        }
    }

    /// Binds a key combination to a scene and saves the table.
    pub fn set(&mut self, mapping: &str, scene: &str, key: &str) -> Result<(), Error> {
        self.keys
            .entry(mapping.to_string())
            .or_default()
            .insert(scene.to_string(), key.to_string());
        self.save()
    }

    /// Removes the binding for a scene, if any, and saves the table.
    pub fn remove(&mut self, mapping: &str, scene: &str) -> Result<(), Error> {
        if let Some(scenes) = self.keys.get_mut(mapping) {
            if scenes.remove(scene).is_some() {
                return self.save();
            }
        }
        Ok(())
    }

    /// Resolves a key combination to the scene bound to it.
    pub fn resolve(&self, key: &str) -> Option<(String, String)> {
        for (mapping, scenes) in &self.keys {
            for (scene, bound) in scenes {
                if bound == key {
                    return Some((mapping.clone(), scene.clone()));
                }
            }
        }
        None
    }

    /// Returns true if no keys are bound.
    pub fn is_empty(&self) -> bool {
        self.keys.values().all(|scenes| scenes.is_empty())
    }

    fn save(&self) -> Result<(), Error> {
        write_table(&self.path, &self.keys)
    }
}

/// A macro-pad button binding.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PadBinding {
    /// The mapping record the bound scene belongs to.
    pub mapping: String,
    /// The bound scene name.
    pub scene: String,
}

/// Macro-pad button bindings, keyed by the logical button index. Indices are
/// stored as strings since JSON object keys must be strings.
pub struct PadBindings {
    path: PathBuf,
    buttons: HashMap<String, PadBinding>,
}

impl PadBindings {
    /// Loads the pad table. A missing or malformed file is treated as an
    /// empty table.
    pub fn load(path: &Path) -> PadBindings {
        PadBindings {
            path: path.to_path_buf(),
            buttons: read_table(path),
        }
    }

    /// Binds a button to a scene and saves the table.
    pub fn set(&mut self, button: u8, mapping: &str, scene: &str) -> Result<(), Error> {
        self.buttons.insert(
            button.to_string(),
            PadBinding {
                mapping: mapping.to_string(),
                scene: scene.to_string(),
            },
        );
        self.save()
    }

    /// Removes the binding for a button, if any, and saves the table.
    pub fn remove(&mut self, button: u8) -> Result<(), Error> {
        if self.buttons.remove(&button.to_string()).is_some() {
            return self.save();
        }
        Ok(())
    }

    /// Resolves a button index to the scene bound to it.
    pub fn resolve(&self, button: u8) -> Option<(String, String)> {
        self.buttons
            .get(&button.to_string())
            .map(|binding| (binding.mapping.clone(), binding.scene.clone()))
    }

    fn save(&self) -> Result<(), Error> {
        write_table(&self.path, &self.buttons)
    }
}

/// Reads a JSON binding table, falling back to empty on any failure.
fn read_table<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> T {
    if !path.exists() {
        return T::default();
    }
    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(table) => table,
            Err(e) => {
                warn!(err = %e, path = %path.display(), "Ignoring malformed binding table.");
                T::default()
            }
        },
        Err(e) => {
            warn!(err = %e, path = %path.display(), "Ignoring unreadable binding table.");
            T::default()
        }
    }
}

fn write_table<T: Serialize>(path: &Path, table: &T) -> Result<(), Error> {
    let contents = serde_json::to_string_pretty(table).map_err(|e| Error::Persistence {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    fs::write(path, contents).map_err(|e| Error::Persistence {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;

    #[test]
    fn test_hotkeys_roundtrip() -> Result<(), Error> {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("hotkeys.json");

        let mut bindings = HotkeyBindings::load(&path);
        assert!(bindings.is_empty());
        bindings.set("ambient", "Tavern", "Ctrl+1")?;
        bindings.set("ambient", "Forest", "Ctrl+2")?;

        let bindings = HotkeyBindings::load(&path);
        assert_eq!(
            bindings.resolve("Ctrl+1"),
            Some(("ambient".to_string(), "Tavern".to_string()))
        );
        assert_eq!(bindings.resolve("Ctrl+9"), None);
        Ok(())
    }

    #[test]
    fn test_hotkeys_remove() -> Result<(), Error> {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("hotkeys.json");

        let mut bindings = HotkeyBindings::load(&path);
        bindings.set("ambient", "Tavern", "Ctrl+1")?;
        bindings.remove("ambient", "Tavern")?;
        bindings.remove("ambient", "Missing")?;

        assert_eq!(bindings.resolve("Ctrl+1"), None);
        Ok(())
    }

    #[test]
    fn test_pad_roundtrip() -> Result<(), Error> {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("pad.json");

        let mut bindings = PadBindings::load(&path);
        bindings.set(3, "ambient", "Tavern")?;

        let bindings = PadBindings::load(&path);
        assert_eq!(
            bindings.resolve(3),
            Some(("ambient".to_string(), "Tavern".to_string()))
        );
        assert_eq!(bindings.resolve(4), None);
        Ok(())
    }

    #[test]
    fn test_malformed_table_is_empty() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("hotkeys.json");
        fs::write(&path, "{not json").expect("failed to write table");

        let bindings = HotkeyBindings::load(&path);
        assert!(bindings.is_empty());
    }
}
