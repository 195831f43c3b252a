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
use std::io;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{debug, error, info, span, Level};

use crate::bindings::PadBindings;
use crate::pad;

use super::{Event, TriggerSource};

/// A driver that triggers scenes from a macro-pad. Button presses resolve
/// through the pad binding table; unbound buttons are ignored.
pub struct Driver {
    device: Arc<dyn pad::Device>,
    bindings: Arc<PadBindings>,
}

impl Driver {
    pub fn new(device: Arc<dyn pad::Device>, bindings: PadBindings) -> Driver {
        Driver {
            device,
            bindings: Arc::new(bindings),
        }
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        let (button_tx, mut button_rx) = mpsc::channel::<u8>(16);

        let device = self.device.clone();
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "pad driver");
            let _enter = span.enter();

            info!(device = device.name(), "Pad driver started.");

            if let Err(e) = device.watch_buttons(button_tx) {
                error!(err = %e, "Error watching pad buttons.");
            }
        });

        let device = self.device.clone();
        let bindings = self.bindings.clone();
        tokio::spawn(async move {
            loop {
                let button = match button_rx.recv().await {
                    Some(button) => button,
                    None => {
                        info!("Pad watcher closed.");
                        device.stop_watch();
                        return Ok(());
                    }
                };

                match bindings.resolve(button) {
                    Some((mapping, scene)) => {
                        if events_tx
                            .send(Event::Trigger {
                                source: TriggerSource::PadButton,
                                mapping,
                                scene,
                            })
                            .await
                            .is_err()
                        {
                            device.stop_watch();
                            return Ok(());
                        }
                    }
                    None => debug!(button, "No scene bound to pad button."),
                }
            }
        })
    }
}
