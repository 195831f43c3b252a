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
//! Imports tracks from the network by driving an external `yt-dlp` process
//! on a worker thread. The worker never touches session state; progress and
//! the final result are delivered over a channel and handled by the caller.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use tracing::{info, span, warn, Level};

/// Messages from the download worker.
#[derive(Clone, Debug, PartialEq)]
pub enum Progress {
    /// Download progress, 0-100.
    Percent(u8),
    /// The download finished. On success carries the file name of the
    /// imported track inside the asset directory.
    Finished(Result<String, String>),
}

/// Downloads tracks into an asset directory.
pub struct Importer {
    asset_dir: PathBuf,
}

impl Importer {
    /// Creates an importer targeting the given asset directory.
    pub fn new(asset_dir: &Path) -> Importer {
        Importer {
            asset_dir: asset_dir.to_path_buf(),
        }
    }

    /// Starts downloading the given URL on a worker thread. Progress
    /// messages arrive on the returned receiver, terminated by a Finished
    /// message.
    pub fn download(&self, url: &str) -> Receiver<Progress> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let url = url.to_string();
        let asset_dir = self.asset_dir.clone();

        thread::spawn(move || {
            let span = span!(Level::INFO, "track import");
            let _enter = span.enter();

            info!(url, "Starting track download.");
            let result = Importer::run_download(&url, &asset_dir, &tx);
            let _ = tx.send(Progress::Finished(result));
        });

        rx
    }

    /// Runs yt-dlp and relays its progress lines. Returns the file name of
    /// the extracted audio file.
    fn run_download(
        url: &str,
        asset_dir: &Path,
        tx: &Sender<Progress>,
    ) -> Result<String, String> {
        let mut child = Command::new("yt-dlp")
            .arg("--newline")
            .arg("--no-playlist")
            .arg("--extract-audio")
            .arg("--audio-format")
            .arg("mp3")
            .arg("--output")
            .arg(asset_dir.join("%(title)s.%(ext)s"))
            .arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("failed to run yt-dlp: {}", e))?;

        let stdout = child.stdout.take().ok_or("failed to read yt-dlp output")?;
        let mut downloaded_file: Option<String> = None;
        for line in BufReader::new(stdout).lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!(err = %e, "Error reading yt-dlp output.");
                    break;
                }
            };

            if let Some(percent) = parse_percent(&line) {
                let _ = tx.send(Progress::Percent(percent));
            }
            if let Some(file) = parse_destination(&line) {
                downloaded_file = Some(file);
            }
        }

        let status = child
            .wait()
            .map_err(|e| format!("failed to wait for yt-dlp: {}", e))?;
        if !status.success() {
            return Err(format!("yt-dlp exited with {}", status));
        }

        let _ = tx.send(Progress::Percent(100));
        let path = downloaded_file.ok_or("yt-dlp reported no output file")?;
        let filename = Path::new(&path)
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or("unreadable output file name")?
            .to_string();

        info!(track = filename, "Track download finished.");
        Ok(filename)
    }
}

/// Parses a percentage from a yt-dlp progress line, e.g.
/// `[download]  42.3% of 3.52MiB at 1.23MiB/s ETA 00:02`.
fn parse_percent(line: &str) -> Option<u8> {
    if !line.starts_with("[download]") {
        return None;
    }
    let field = line.split_whitespace().nth(1)?;
    let percent: f64 = field.strip_suffix('%')?.parse().ok()?;
    Some(percent.clamp(0.0, 100.0) as u8)
}

/// Parses the output file from a destination line. The audio extraction
/// destination wins over the raw download destination.
fn parse_destination(line: &str) -> Option<String> {
    let rest = line
        .strip_prefix("[ExtractAudio] Destination: ")
        .or_else(|| line.strip_prefix("[download] Destination: "))?;
    Some(rest.to_string())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_percent() {
        assert_eq!(
            parse_percent("[download]  42.3% of 3.52MiB at 1.23MiB/s ETA 00:02"),
            Some(42)
        );
        assert_eq!(parse_percent("[download] 100% of 3.52MiB"), Some(100));
        assert_eq!(parse_percent("[download] Destination: foo.webm"), None);
        assert_eq!(parse_percent("[ExtractAudio] something"), None);
    }

    #[test]
    fn test_parse_destination() {
        assert_eq!(
            parse_destination("[download] Destination: assets/Tavern Ambience.webm"),
            Some("assets/Tavern Ambience.webm".to_string())
        );
        assert_eq!(
            parse_destination("[ExtractAudio] Destination: assets/Tavern Ambience.mp3"),
            Some("assets/Tavern Ambience.mp3".to_string())
        );
        assert_eq!(parse_destination("[download]  42.3% of 3.52MiB"), None);
    }

    #[test]
    fn test_download_failure_is_reported() {
        // Point the worker at a URL yt-dlp will reject immediately (or at a
        // missing yt-dlp binary); either way the failure arrives as a
        // Finished message rather than a panic.
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let importer = Importer::new(dir.path());

        let rx = importer.download("not-a-url");
        let mut finished = None;
        for progress in rx.iter() {
            if let Progress::Finished(result) = progress {
                finished = Some(result);
                break;
            }
        }
        assert!(matches!(finished, Some(Err(_))));
    }
}
