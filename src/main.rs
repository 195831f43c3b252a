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
mod audio;
mod bindings;
mod clock;
mod config;
mod engine;
mod error;
mod importer;
mod pad;
mod playsync;
mod router;
mod session;
mod store;
#[cfg(test)]
mod testutil;
mod util;

use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{crate_version, Parser, Subcommand};

use crate::bindings::{HotkeyBindings, PadBindings};
use crate::config::Dirs;
use crate::engine::Engine;
use crate::importer::{Importer, Progress};
use crate::router::Router;
use crate::session::Session;
use crate::store::{MappingStore, Scene};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A scene-based looping soundboard."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists all track mappings and their scenes.
    Scenes {
        /// The path to the soundboard data directory.
        data_dir: PathBuf,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the available macro-pad devices.
    PadDevices {},
    /// Plays a looped segment of an audio file until interrupted.
    Play {
        /// The device name to play through.
        device_name: String,
        /// The audio file to play.
        file: PathBuf,
        /// The start offset in seconds.
        start: f64,
        /// The loop duration in seconds.
        duration: f64,
    },
    /// Triggers a scene until interrupted. Useful for checking mappings.
    Trigger {
        /// The path to the soundboard data directory.
        data_dir: PathBuf,
        /// The mapping id.
        mapping: String,
        /// The scene name.
        scene: String,
        /// The device name to play through.
        #[arg(short, long, default_value = "default")]
        device_name: String,
    },
    /// Copies a local audio file into the soundboard and creates its mapping record.
    Upload {
        /// The path to the soundboard data directory.
        data_dir: PathBuf,
        /// The audio file to copy.
        file: PathBuf,
    },
    /// Removes a track file together with its mapping record and scenes.
    RemoveTrack {
        /// The path to the soundboard data directory.
        data_dir: PathBuf,
        /// The mapping id or track file name.
        track: String,
    },
    /// Adds or replaces a scene in a mapping record.
    AddScene {
        /// The path to the soundboard data directory.
        data_dir: PathBuf,
        /// The mapping id.
        mapping: String,
        /// The scene name.
        name: String,
        /// The start offset in seconds.
        start: f64,
        /// The loop duration in seconds.
        duration: f64,
        /// The icon file name inside the icon directory.
        #[arg(short, long, default_value = "")]
        icon: String,
    },
    /// Removes a scene from a mapping record.
    RemoveScene {
        /// The path to the soundboard data directory.
        data_dir: PathBuf,
        /// The mapping id.
        mapping: String,
        /// The scene name.
        name: String,
    },
    /// Binds a keyboard hotkey to a scene.
    BindKey {
        /// The path to the soundboard data directory.
        data_dir: PathBuf,
        /// The mapping id.
        mapping: String,
        /// The scene name.
        scene: String,
        /// The key combination.
        key: String,
    },
    /// Binds a macro-pad button to a scene.
    BindPad {
        /// The path to the soundboard data directory.
        data_dir: PathBuf,
        /// The mapping id.
        mapping: String,
        /// The scene name.
        scene: String,
        /// The logical button index.
        button: u8,
    },
    /// Removes the hotkey binding of a scene.
    UnbindKey {
        /// The path to the soundboard data directory.
        data_dir: PathBuf,
        /// The mapping id.
        mapping: String,
        /// The scene name.
        scene: String,
    },
    /// Removes the binding of a macro-pad button.
    UnbindPad {
        /// The path to the soundboard data directory.
        data_dir: PathBuf,
        /// The logical button index.
        button: u8,
    },
    /// Downloads a track from a URL and creates its mapping record.
    Import {
        /// The path to the soundboard data directory.
        data_dir: PathBuf,
        /// The URL to download.
        url: String,
    },
    /// Starts the soundboard.
    Start {
        /// The path to the soundboard config.
        config_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scenes { data_dir } => {
            let store = MappingStore::open(&Dirs::new(&data_dir).mapping_dir())?;
            let mappings = store.load_all()?;

            if mappings.is_empty() {
                println!("No mappings found in {}.", data_dir.display());
                return Ok(());
            }

            println!("Mappings (count: {}):", mappings.len());
            for (id, mapping) in mappings {
                println!("- {} (track: {})", id, mapping.track);
                for (name, scene) in mapping.scenes.iter() {
                    println!(
                        "  - {} (start: {}s, duration: {}s)",
                        name, scene.start, scene.duration
                    );
                }
            }
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::PadDevices {} => {
            let devices = pad::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play {
            device_name,
            file,
            start,
            duration,
        } => {
            if duration <= 0.0 {
                return Err("duration must be positive".into());
            }

            let device = audio::get_device(&device_name)?;
            let asset_dir = file.parent().unwrap_or(Path::new(".")).to_path_buf();
            let track = util::filename_display(&file).to_string();
            let engine = Engine::new(device, asset_dir, Session::new());

            engine.play(
                &track,
                "cli",
                &Scene {
                    start,
                    duration,
                    icon: String::new(),
                },
            )?;
            println!("Looping {} ({}s from {}s), Ctrl+C to stop.", track, duration, start);

            tokio::signal::ctrl_c().await?;
            engine.stop();
        }
        Commands::Trigger {
            data_dir,
            mapping,
            scene,
            device_name,
        } => {
            let dirs = Dirs::new(&data_dir);
            let store = MappingStore::open(&dirs.mapping_dir())?;
            let device = audio::get_device(&device_name)?;
            let engine = Engine::new(device, dirs.asset_dir(), Session::new());

            Router::trigger_scene(&engine, &store, &mapping, &scene)?;
            println!("Playing scene '{}', Ctrl+C to stop.", scene);

            tokio::signal::ctrl_c().await?;
            engine.stop();
        }
        Commands::Upload { data_dir, file } => {
            let dirs = Dirs::new(&data_dir);
            dirs.ensure()?;

            let filename = util::filename_display(&file).to_string();
            let dest = dirs.asset_dir().join(&filename);
            if dest.exists() {
                return Err(format!("track '{}' is already on the board", filename).into());
            }
            fs::copy(&file, &dest)?;

            let store = MappingStore::open(&dirs.mapping_dir())?;
            let id = store.create(&filename)?;
            println!("Uploaded '{}' (mapping id: {}).", filename, id);
        }
        Commands::RemoveTrack { data_dir, track } => {
            let dirs = Dirs::new(&data_dir);
            let store = MappingStore::open(&dirs.mapping_dir())?;

            let id = Path::new(&track)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or(track.as_str())
                .to_string();
            let mapping = store.load(&id)?;

            let path = dirs.asset_dir().join(&mapping.track);
            if path.exists() {
                fs::remove_file(&path)?;
            }
            store.delete(&id)?;
            println!(
                "Removed track '{}' and {} scene(s).",
                mapping.track,
                mapping.scenes.len()
            );
        }
        Commands::AddScene {
            data_dir,
            mapping,
            name,
            start,
            duration,
            icon,
        } => {
            if start < 0.0 {
                return Err("start offset must not be negative".into());
            }
            if duration <= 0.0 {
                return Err("duration must be positive".into());
            }

            let store = MappingStore::open(&Dirs::new(&data_dir).mapping_dir())?;
            store.upsert_scene(
                &mapping,
                &name,
                Scene {
                    start,
                    duration,
                    icon,
                },
            )?;
            println!("Scene '{}' saved to mapping '{}'.", name, mapping);
        }
        Commands::RemoveScene {
            data_dir,
            mapping,
            name,
        } => {
            let store = MappingStore::open(&Dirs::new(&data_dir).mapping_dir())?;
            store.remove_scene(&mapping, &name)?;
            println!("Scene '{}' removed from mapping '{}'.", name, mapping);
        }
        Commands::BindKey {
            data_dir,
            mapping,
            scene,
            key,
        } => {
            let mut bindings = HotkeyBindings::load(&Dirs::new(&data_dir).hotkeys_file());
            bindings.set(&mapping, &scene, &key)?;
            println!("Key '{}' bound to scene '{}'.", key, scene);
        }
        Commands::BindPad {
            data_dir,
            mapping,
            scene,
            button,
        } => {
            let mut bindings = PadBindings::load(&Dirs::new(&data_dir).pad_file());
            bindings.set(button, &mapping, &scene)?;
            println!("Pad button {} bound to scene '{}'.", button, scene);
        }
        Commands::UnbindKey {
            data_dir,
            mapping,
            scene,
        } => {
            let mut bindings = HotkeyBindings::load(&Dirs::new(&data_dir).hotkeys_file());
            bindings.remove(&mapping, &scene)?;
            println!("Hotkey removed from scene '{}'.", scene);
        }
        Commands::UnbindPad { data_dir, button } => {
            let mut bindings = PadBindings::load(&Dirs::new(&data_dir).pad_file());
            bindings.remove(button)?;
            println!("Pad button {} unbound.", button);
        }
        Commands::Import { data_dir, url } => {
            let dirs = Dirs::new(&data_dir);
            dirs.ensure()?;

            let importer = Importer::new(&dirs.asset_dir());
            for progress in importer.download(&url).iter() {
                match progress {
                    Progress::Percent(percent) => {
                        print!("\rDownloading: {}%", percent);
                        std::io::stdout().flush()?;
                    }
                    Progress::Finished(Ok(filename)) => {
                        println!();
                        let store = MappingStore::open(&dirs.mapping_dir())?;
                        let id = store.create(&filename)?;
                        println!("Imported '{}' (mapping id: {}).", filename, id);
                        break;
                    }
                    Progress::Finished(Err(e)) => {
                        println!();
                        return Err(format!("download failed: {}", e).into());
                    }
                }
            }
        }
        Commands::Start { config_path } => {
            config::init_router(&config::parse(&config_path)?)?
                .join()
                .await?;
        }
    }

    Ok(())
}
