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
use std::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::audio;
use crate::bindings::{HotkeyBindings, PadBindings};
use crate::engine::Engine;
use crate::pad;
use crate::router::{self, Router};
use crate::session::Session;
use crate::store::MappingStore;

/// A YAML representation of the soundboard configuration.
#[derive(Default, Deserialize)]
pub struct Config {
    /// The directory holding assets, mapping records and binding tables.
    data_dir: Option<PathBuf>,
    /// The audio output device to play through.
    audio_device: Option<String>,
    /// The macro-pad device to watch, if any.
    pad_device: Option<String>,
}

impl Config {
    /// The data directory, defaulting to the working directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// The audio device name, defaulting to the host default output.
    pub fn audio_device(&self) -> &str {
        self.audio_device.as_deref().unwrap_or("default")
    }
}

/// The directory layout under the data directory: track files in assets/,
/// scene icons in assets/icons/, mapping records in mappings/, binding
/// tables at the top level.
pub struct Dirs {
    data_dir: PathBuf,
}

impl Dirs {
    pub fn new(data_dir: &Path) -> Dirs {
        Dirs {
            data_dir: data_dir.to_path_buf(),
        }
    }

    pub fn asset_dir(&self) -> PathBuf {
        self.data_dir.join("assets")
    }

    pub fn icon_dir(&self) -> PathBuf {
        self.asset_dir().join("icons")
    }

    pub fn mapping_dir(&self) -> PathBuf {
        self.data_dir.join("mappings")
    }

    pub fn hotkeys_file(&self) -> PathBuf {
        self.data_dir.join("hotkeys.json")
    }

    pub fn pad_file(&self) -> PathBuf {
        self.data_dir.join("pad.json")
    }

    /// Creates the directories if they are missing.
    pub fn ensure(&self) -> io::Result<()> {
        for dir in [self.asset_dir(), self.icon_dir(), self.mapping_dir()] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Parses the soundboard configuration from a YAML file.
pub fn parse(file: &Path) -> Result<Config, Box<dyn Error>> {
    Ok(serde_yml::from_str(&fs::read_to_string(file)?)?)
}

/// Initializes the engine and router from the given config and returns the
/// router, which can be waited on until it exits. Realistically, the router
/// is not expected to exit.
pub fn init_router(config: &Config) -> Result<Router, Box<dyn Error>> {
    let dirs = Dirs::new(&config.data_dir());
    dirs.ensure()?;

    let store = MappingStore::open(&dirs.mapping_dir())?;
    let device = audio::get_device(config.audio_device())?;
    let engine = Arc::new(Engine::new(device, dirs.asset_dir(), Session::new()));

    let mut drivers: Vec<Arc<dyn router::Driver>> = vec![Arc::new(
        router::keyboard::Driver::new(HotkeyBindings::load(&dirs.hotkeys_file())),
    )];
    if let Some(pad_name) = &config.pad_device {
        // A missing or disconnected pad degrades to keyboard control.
        match pad::get_device(pad_name) {
            Ok(device) => drivers.push(Arc::new(router::pad::Driver::new(
                device,
                PadBindings::load(&dirs.pad_file()),
            ))),
            Err(e) => warn!(
                err = %e,
                device = pad_name.as_str(),
                "Pad device unavailable, continuing without it."
            ),
        }
    }

    Router::new(engine, store, drivers)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_config() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("soundboard.yaml");

        fs::write(
            &path,
            "data_dir: /var/lib/sceneboard\naudio_device: USB Audio\npad_device: LPD8\n",
        )?;
        let config = parse(&path)?;
        assert_eq!(config.data_dir(), PathBuf::from("/var/lib/sceneboard"));
        assert_eq!(config.audio_device(), "USB Audio");
        assert_eq!(config.pad_device.as_deref(), Some("LPD8"));

        fs::write(&path, "{}")?;
        let config = parse(&path)?;
        assert_eq!(config.data_dir(), PathBuf::from("."));
        assert_eq!(config.audio_device(), "default");
        assert!(config.pad_device.is_none());
        Ok(())
    }

    #[test]
    fn test_dirs_layout() {
        let dirs = Dirs::new(Path::new("/data"));
        assert_eq!(dirs.asset_dir(), PathBuf::from("/data/assets"));
        assert_eq!(dirs.icon_dir(), PathBuf::from("/data/assets/icons"));
        assert_eq!(dirs.mapping_dir(), PathBuf::from("/data/mappings"));
        assert_eq!(dirs.hotkeys_file(), PathBuf::from("/data/hotkeys.json"));
        assert_eq!(dirs.pad_file(), PathBuf::from("/data/pad.json"));
    }
}
