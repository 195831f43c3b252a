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
use std::error::Error as StdError;
use std::io;
use std::sync::Arc;

use tokio::sync::mpsc::{self, Sender};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, span, warn, Level};

use crate::engine::Engine;
use crate::error::Error;
use crate::store::MappingStore;

pub mod keyboard;
pub mod pad;

/// Where a trigger came from. All three sources are normalized into the
/// same event and routed identically.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TriggerSource {
    /// A direct UI or CLI action.
    UiClick,
    /// A registered keyboard hotkey.
    Hotkey,
    /// A macro-pad button press.
    PadButton,
}

/// Router events that will trigger behavior in the engine.
#[derive(Debug, PartialEq)]
pub enum Event {
    /// Plays the named scene, or toggles pause if it is already current.
    Trigger {
        source: TriggerSource,
        mapping: String,
        scene: String,
    },

    /// Toggles the pause state of the current scene. If no scene is
    /// current, does nothing.
    Pause,

    /// Stops the current scene. If no scene is current, does nothing.
    Stop,
}

/// An input source that feeds events into the router.
pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Routes trigger events from all input sources into the engine.
pub struct Router {
    handle: JoinHandle<()>,
}

impl Router {
    /// Creates a new router with the given drivers.
    pub fn new(
        engine: Arc<Engine>,
        store: MappingStore,
        drivers: Vec<Arc<dyn Driver>>,
    ) -> Result<Router, Box<dyn StdError>> {
        Ok(Router {
            handle: tokio::spawn(async move { Router::route_events(engine, store, drivers).await }),
        })
    }

    /// Join will block until the router finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Resolves a trigger to its scene and plays it. Re-triggering the
    /// current scene toggles pause instead of restarting it; triggering a
    /// different scene replaces the current one.
    pub fn trigger_scene(
        engine: &Engine,
        store: &MappingStore,
        mapping_id: &str,
        scene_name: &str,
    ) -> Result<(), Error> {
        let mapping = store.load(mapping_id).map_err(|_| Error::SceneNotFound {
            mapping: mapping_id.to_string(),
            scene: scene_name.to_string(),
        })?;
        let scene = mapping
            .scenes
            .get(scene_name)
            .ok_or_else(|| Error::SceneNotFound {
                mapping: mapping_id.to_string(),
                scene: scene_name.to_string(),
            })?;

        if engine.session().is_current(&mapping.track, scene_name) {
            engine.toggle_pause();
            return Ok(());
        }

        engine.play(&mapping.track, scene_name, scene)
    }

    /// Drains events from all drivers and dispatches them to the engine.
    async fn route_events(engine: Arc<Engine>, store: MappingStore, drivers: Vec<Arc<dyn Driver>>) {
        let span = span!(Level::INFO, "router");
        let _enter = span.enter();

        let (events_tx, mut events_rx) = mpsc::channel(16);
        let monitors: Vec<_> = drivers
            .iter()
            .map(|driver| driver.monitor_events(events_tx.clone()))
            .collect();
        drop(events_tx);

        info!(drivers = monitors.len(), "Router started.");

        while let Some(event) = events_rx.recv().await {
            info!(event = format!("{:?}", event), "Received event.");

            match event {
                Event::Trigger {
                    source,
                    mapping,
                    scene,
                } => {
                    if let Err(e) = Self::trigger_scene(&engine, &store, &mapping, &scene) {
                        warn!(err = %e, source = ?source, mapping, scene, "Trigger failed.");
                    }
                }
                Event::Pause => engine.toggle_pause(),
                Event::Stop => engine.stop(),
            }
        }

        info!("Router closing.");
        for monitor in monitors {
            match monitor.await {
                Ok(Err(e)) => error!(err = %e, "Event monitor failed."),
                Err(e) => error!(err = %e, "Error waiting for event monitor to stop."),
                Ok(Ok(())) => {}
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::error::Error as StdError;
    use std::fs;
    use std::sync::{Arc, Barrier, Mutex};

    use tokio::sync::mpsc::Sender;
    use tokio::task::JoinHandle;

    use super::{Driver, Event, Router, TriggerSource};
    use crate::audio::test::{Device, Op};
    use crate::engine::Engine;
    use crate::error::Error;
    use crate::session::Session;
    use crate::store::{MappingStore, Scene};
    use crate::testutil::eventually;

    /// A driver that is explicitly stepped by the test. Sending None closes
    /// the monitor.
    struct TestDriver {
        current_event: Arc<Mutex<Option<Event>>>,
        barrier: Arc<Barrier>,
    }

    impl TestDriver {
        fn new() -> TestDriver {
            TestDriver {
                current_event: Arc::new(Mutex::new(None)),
                barrier: Arc::new(Barrier::new(2)),
            }
        }

        /// Signals the next event to the monitor thread.
        fn next_event(&self, event: Option<Event>) {
            {
                let mut current_event = self.current_event.lock().expect("failed to get lock");
                *current_event = event;
            }
            // Wait until the thread goes to receive the event.
            self.barrier.wait();
            // Wait until the thread has taken the event.
            self.barrier.wait();
        }
    }

    impl Driver for TestDriver {
        fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), std::io::Error>> {
            let barrier = self.barrier.clone();
            let current_event = self.current_event.clone();
            tokio::task::spawn_blocking(move || loop {
                barrier.wait();
                let event = current_event
                    .lock()
                    .expect("failed to get lock")
                    .take();
                barrier.wait();
                match event {
                    Some(event) => assert!(events_tx.blocking_send(event).is_ok()),
                    None => return Ok(()),
                }
            })
        }
    }

    fn trigger(mapping: &str, scene: &str) -> Event {
        Event::Trigger {
            source: TriggerSource::UiClick,
            mapping: mapping.to_string(),
            scene: scene.to_string(),
        }
    }

    /// A store with two mapped tracks, the track files on disk, and an
    /// engine over a mock device.
    fn board() -> Result<(tempfile::TempDir, Arc<Device>, Arc<Engine>, MappingStore), Error> {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let store = MappingStore::open(&dir.path().join("mappings"))?;

        for (track, scene_name, start) in
            [("ambient.mp3", "Tavern", 60.0), ("battle.mp3", "Battle", 0.0)]
        {
            fs::write(dir.path().join(track), b"audio").expect("failed to write track");
            let id = store.create(track)?;
            store.upsert_scene(
                &id,
                scene_name,
                Scene {
                    start,
                    duration: 30.0,
                    icon: String::new(),
                },
            )?;
        }

        let device = Arc::new(Device::get("mock-device"));
        let engine = Arc::new(Engine::new(
            device.clone(),
            dir.path().to_path_buf(),
            Session::new(),
        ));
        Ok((dir, device, engine, store))
    }

    #[test]
    fn test_trigger_toggles_current_scene() -> Result<(), Box<dyn StdError>> {
        let (_dir, device, engine, store) = board()?;

        Router::trigger_scene(&engine, &store, "ambient", "Tavern")?;
        assert!(device.is_playing());
        assert!(!device.is_paused());
        assert_eq!(device.play_count(), 1);

        // Re-triggering the current scene pauses it, it never restarts.
        Router::trigger_scene(&engine, &store, "ambient", "Tavern")?;
        assert!(device.is_paused());
        assert_eq!(device.play_count(), 1);

        // And again resumes it in place.
        Router::trigger_scene(&engine, &store, "ambient", "Tavern")?;
        assert!(!device.is_paused());
        assert_eq!(device.play_count(), 1);

        engine.stop();
        Ok(())
    }

    #[test]
    fn test_trigger_switches_scenes() -> Result<(), Box<dyn StdError>> {
        let (dir, device, engine, store) = board()?;

        Router::trigger_scene(&engine, &store, "ambient", "Tavern")?;
        device.reset_ops();

        Router::trigger_scene(&engine, &store, "battle", "Battle")?;
        assert_eq!(
            device.ops(),
            vec![
                Op::Stop,
                Op::PlayFrom(dir.path().join("battle.mp3"), std::time::Duration::ZERO),
            ]
        );

        engine.stop();
        Ok(())
    }

    #[test]
    fn test_trigger_unknown_scene() -> Result<(), Box<dyn StdError>> {
        let (_dir, device, engine, store) = board()?;

        Router::trigger_scene(&engine, &store, "ambient", "Tavern")?;
        device.reset_ops();

        // Dangling references fail without touching the engine.
        let err = Router::trigger_scene(&engine, &store, "ambient", "Missing");
        assert!(matches!(err, Err(Error::SceneNotFound { .. })));
        let err = Router::trigger_scene(&engine, &store, "missing", "Tavern");
        assert!(matches!(err, Err(Error::SceneNotFound { .. })));

        assert!(device.ops().is_empty());
        assert!(engine.session().is_current("ambient.mp3", "Tavern"));

        engine.stop();
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_router() -> Result<(), Box<dyn StdError>> {
        let (_dir, device, engine, store) = board()?;
        let driver = Arc::new(TestDriver::new());

        let mut router = Router::new(engine.clone(), store, vec![driver.clone()])?;

        driver.next_event(Some(trigger("ambient", "Tavern")));
        eventually(|| device.is_playing(), "Scene never started playing");

        driver.next_event(Some(Event::Pause));
        eventually(|| device.is_paused(), "Scene never paused");

        driver.next_event(Some(Event::Pause));
        eventually(|| !device.is_paused(), "Scene never resumed");

        driver.next_event(Some(trigger("battle", "Battle")));
        eventually(
            || engine.session().is_current("battle.mp3", "Battle"),
            "Scene never switched",
        );

        driver.next_event(Some(Event::Stop));
        eventually(|| !device.is_playing(), "Scene never stopped");

        driver.next_event(None);
        assert!(router.join().await.is_ok(), "Error waiting for router");
        Ok(())
    }
}
