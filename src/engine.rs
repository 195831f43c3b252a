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
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::audio;
use crate::clock::Clock;
use crate::error::Error;
use crate::playsync::CancelHandle;
use crate::session::Session;
use crate::store::Scene;

/// The shortest loop interval a scene can arm.
const MIN_LOOP_DURATION: Duration = Duration::from_millis(10);

/// The handles owned by one playing scene: the loop timer, its join handle
/// and the elapsed clock. Torn down as a unit.
struct ActiveLoop {
    cancel: CancelHandle,
    join: Option<thread::JoinHandle<()>>,
    clock: Clock,
}

/// Drives looped playback of one scene at a time. The audio backend only
/// plays from an offset to the end of the file, so the engine re-issues
/// play_from every scene duration on a timer thread. At most one timer and
/// one loaded track exist at any time; starting a new scene always tears the
/// previous one down first.
pub struct Engine {
    /// The device to play audio through.
    device: Arc<dyn audio::Device>,
    /// The directory holding the track files.
    asset_dir: PathBuf,
    /// The shared session record.
    session: Session,
    /// The currently armed loop, if any. The lock serializes play, pause
    /// and stop, which makes play safe to call from any thread.
    active: Mutex<Option<ActiveLoop>>,
}

impl Engine {
    /// Creates a new engine playing through the given device.
    pub fn new(device: Arc<dyn audio::Device>, asset_dir: PathBuf, session: Session) -> Engine {
        Engine {
            device,
            asset_dir,
            session,
            active: Mutex::new(None),
        }
    }

    /// The session record this engine writes to.
    pub fn session(&self) -> Session {
        self.session.clone()
    }

    /// Plays the given scene of the given track, replacing whatever is
    /// currently playing. A missing track file fails with TrackUnavailable
    /// before any teardown happens; a track that fails to load afterwards
    /// leaves the engine stopped.
    pub fn play(&self, track: &str, scene_name: &str, scene: &Scene) -> Result<(), Error> {
        let path = self.asset_dir.join(track);
        if !path.is_file() {
            return Err(Error::TrackUnavailable(path));
        }

        let mut active = self.active.lock();
        Self::teardown(&self.device, &mut active);
        self.session.reset();

        // Mapping records are not validated, so keep nonsense offsets from
        // panicking the conversion or arming a zero-interval timer.
        let start = Duration::try_from_secs_f64(scene.start.max(0.0)).unwrap_or(Duration::ZERO);
        let duration = Duration::try_from_secs_f64(scene.duration)
            .unwrap_or(Duration::ZERO)
            .max(MIN_LOOP_DURATION);
        self.device.play_from(&path, start)?;

        self.session.begin(track, scene_name, scene.start, scene.duration);

        let cancel = CancelHandle::new();
        let clock = Clock::start(self.session.clone());
        let join = {
            let device = self.device.clone();
            let session = self.session.clone();
            let cancel = cancel.clone();
            let clock_cancel = clock.cancel_handle();
            let path = path.clone();
            thread::spawn(move || {
                Self::run_loop(device, session, path, start, duration, cancel, clock_cancel)
            })
        };
        *active = Some(ActiveLoop {
            cancel,
            join: Some(join),
            clock,
        });

        info!(track, scene = scene_name, "Playing scene.");
        Ok(())
    }

    /// The loop timer: re-issues play_from every scene duration to emulate
    /// segment looping. The wait is wall-clock based and keeps counting
    /// while playback is paused. A failing re-seek becomes an implicit stop.
    fn run_loop(
        device: Arc<dyn audio::Device>,
        session: Session,
        path: PathBuf,
        start: Duration,
        duration: Duration,
        cancel: CancelHandle,
        clock_cancel: CancelHandle,
    ) {
        loop {
            if cancel.wait_timeout(duration) {
                return;
            }
            if let Err(e) = device.play_from(&path, start) {
                error!(err = %e, track = %path.display(), "Loop re-seek failed, stopping playback.");
                device.stop();
                clock_cancel.cancel();
                session.reset();
                return;
            }
            debug!(track = %path.display(), start = ?start, "Loop re-seek.");
        }
    }

    /// Toggles the pause state of the current scene. Does nothing while
    /// idle. The elapsed counter stops accruing while paused; the loop timer
    /// does not.
    pub fn toggle_pause(&self) {
        let _active = self.active.lock();

        let snapshot = self.session.snapshot();
        if !snapshot.is_playing {
            debug!("Engine is idle, nothing to pause.");
            return;
        }

        if snapshot.is_paused {
            self.device.resume();
            self.session.set_paused(false);
            info!(scene = snapshot.scene.as_deref().unwrap_or_default(), "Playback resumed.");
        } else {
            self.device.pause();
            self.session.set_paused(true);
            info!(scene = snapshot.scene.as_deref().unwrap_or_default(), "Playback paused.");
        }
    }

    /// Stops the current scene: cancels the loop timer, stops the clock and
    /// unloads the track. Calling stop while idle is a no-op.
    pub fn stop(&self) {
        let mut active = self.active.lock();
        if active.is_none() {
            debug!("Engine is idle, nothing to stop.");
        } else {
            info!("Stopping playback.");
        }
        Self::teardown(&self.device, &mut active);
        self.session.reset();
    }

    /// Tears down the active loop. The timer thread is cancelled and joined
    /// before the device stops, so the old timer is provably finished before
    /// a new one can be armed.
    fn teardown(device: &Arc<dyn audio::Device>, active: &mut Option<ActiveLoop>) {
        if let Some(mut active) = active.take() {
            active.cancel.cancel();
            if let Some(join) = active.join.take() {
                let _ = join.join();
            }
            active.clock.stop();
            device.stop();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        Self::teardown(&self.device, &mut self.active.lock());
    }
}
