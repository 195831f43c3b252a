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
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::playsync::CancelHandle;
use crate::session::Session;

/// The elapsed-time clock. Ticks once a second while a scene is current,
/// advancing the session's elapsed counter and republishing the status line.
/// Started on play, stopped on stop; ticks are skipped (not deferred) while
/// playback is paused.
pub struct Clock {
    cancel: CancelHandle,
    join: Option<thread::JoinHandle<()>>,
}

impl Clock {
    /// Starts a new clock over the given session.
    pub fn start(session: Session) -> Clock {
        let cancel = CancelHandle::new();

        let join = {
            let cancel = cancel.clone();
            thread::spawn(move || loop {
                if cancel.wait_timeout(Duration::from_secs(1)) {
                    return;
                }
                if let Some(status) = session.tick() {
                    debug!(status = status.as_str(), "Clock tick.");
                }
            })
        };

        Clock {
            cancel,
            join: Some(join),
        }
    }

    /// A handle that stops the clock when cancelled. Used by the loop timer
    /// to shut the clock down on an implicit stop.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Stops the clock. Safe to call more than once.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        self.stop();
    }
}
