// ==========================================
// AUDIO SINK
// ==========================================
// Playback output behind a trait so the engine never depends on rodio
// directly. The rodio sink downloads the resolved stream URL into the
// cache directory and decodes from the file, since rodio needs a
// seekable source. Position is tracked with Instants because rodio's
// Sink does not expose one; paused time is subtracted out.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use rodio::{Decoder, OutputStream, Sink};
use tracing::warn;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Stopped,
    Playing,
    Paused,
}

/// What the playback engine needs from an audio output.
pub trait AudioSink: Send {
    /// Load `url` and start playing it from the beginning.
    fn play(&mut self, url: &str, title: &str, duration: f64) -> Result<()>;
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
    /// Restart the current source from zero (the previous-button policy
    /// when more than a few seconds in).
    fn restart(&mut self) -> Result<()>;
    fn state(&self) -> SinkState;
    /// Seconds of actual playback, excluding paused time.
    fn position(&self) -> f64;
    fn duration(&self) -> f64;
    fn set_volume(&mut self, volume: u32);
    fn volume(&self) -> u32;
    /// True once the loaded source has been fully played out.
    fn is_finished(&self) -> bool;
}

pub struct RodioSink {
    /// None when no output device exists (headless); every operation
    /// degrades to a no-op so the rest of the app still works.
    sink: Option<Sink>,
    state: SinkState,
    volume: u32,
    duration: f64,
    current_file: Option<PathBuf>,
    current_title: String,
    cache_dir: PathBuf,
    http: reqwest::blocking::Client,
    start_time: Option<Instant>,
    pause_time: Option<Instant>,
    total_paused: Duration,
}

impl RodioSink {
    pub fn new(cache_dir: PathBuf) -> Self {
        let sink = match OutputStream::try_default() {
            Ok((stream, handle)) => match Sink::try_new(&handle) {
                Ok(sink) => {
                    // The stream must outlive the sink or audio dies; it has
                    // no other owner, so leak it for the process lifetime.
                    std::mem::forget(stream);
                    Some(sink)
                }
                Err(e) => {
                    warn!("audio sink unavailable: {e}");
                    None
                }
            },
            Err(e) => {
                warn!("no audio output device: {e}");
                None
            }
        };

        RodioSink {
            sink,
            state: SinkState::Stopped,
            volume: 100,
            duration: 0.0,
            current_file: None,
            current_title: String::new(),
            cache_dir,
            http: reqwest::blocking::Client::new(),
            start_time: None,
            pause_time: None,
            total_paused: Duration::ZERO,
        }
    }

    /// Download the stream into the cache dir so the decoder has a
    /// seekable file to read from. Stream URLs expire within hours, so
    /// the file is keyed by title hash and overwritten freely. The body
    /// is streamed to disk, never buffered whole in memory.
    fn fetch_to_file(&self, url: &str, title: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.cache_dir)?;
        let mut name = 0u64;
        for b in title.bytes() {
            name = name.wrapping_mul(31).wrapping_add(b as u64);
        }
        let path = self.cache_dir.join(format!("stream-{name:016x}"));

        let mut response = self.http.get(url).send()?.error_for_status()?;
        let mut file = fs::File::create(&path)?;
        response.copy_to(&mut file)?;
        Ok(path)
    }

    /// Track the newly loaded file and delete the one it replaces; old
    /// cache files are never reused, so the directory stays at one entry.
    fn swap_current_file(&mut self, path: PathBuf) {
        if let Some(old) = self.current_file.replace(path) {
            if self.current_file.as_deref() != Some(old.as_path()) {
                let _ = fs::remove_file(old);
            }
        }
    }

    fn load(&mut self, url: &str, title: &str) -> Result<()> {
        let path = self.fetch_to_file(url, title)?;
        self.start_file(&path)?;
        self.swap_current_file(path);
        Ok(())
    }

    fn start_file(&mut self, path: &PathBuf) -> Result<()> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        sink.stop();
        let file = fs::File::open(path)?;
        let decoder =
            Decoder::new(file).map_err(|e| Error::Audio(format!("decode failed: {e}")))?;
        sink.append(decoder);
        sink.play();
        self.state = SinkState::Playing;
        self.start_time = Some(Instant::now());
        self.pause_time = None;
        self.total_paused = Duration::ZERO;
        Ok(())
    }
}

impl AudioSink for RodioSink {
    fn play(&mut self, url: &str, title: &str, duration: f64) -> Result<()> {
        self.current_title = title.to_string();
        self.duration = duration;
        match self.load(url, title) {
            Ok(()) => Ok(()),
            Err(e) => {
                // A failed load must not leave the sink claiming to play.
                self.state = SinkState::Stopped;
                self.start_time = None;
                self.pause_time = None;
                Err(e)
            }
        }
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
        if self.state == SinkState::Playing {
            self.pause_time = Some(Instant::now());
            self.state = SinkState::Paused;
        }
    }

    fn resume(&mut self) {
        if let Some(sink) = &self.sink {
            sink.play();
        }
        if let Some(paused_at) = self.pause_time.take() {
            self.total_paused += paused_at.elapsed();
        }
        if self.state == SinkState::Paused {
            self.state = SinkState::Playing;
        }
    }

    fn stop(&mut self) {
        if let Some(sink) = &self.sink {
            sink.stop();
        }
        self.state = SinkState::Stopped;
        self.start_time = None;
        self.pause_time = None;
        self.total_paused = Duration::ZERO;
    }

    fn restart(&mut self) -> Result<()> {
        if let Some(path) = self.current_file.clone() {
            self.start_file(&path)?;
        }
        Ok(())
    }

    fn state(&self) -> SinkState {
        self.state
    }

    fn position(&self) -> f64 {
        let Some(start) = self.start_time else {
            return 0.0;
        };
        let elapsed = match self.pause_time {
            Some(paused_at) => paused_at.duration_since(start),
            None => start.elapsed(),
        };
        elapsed.saturating_sub(self.total_paused).as_secs_f64()
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn set_volume(&mut self, volume: u32) {
        self.volume = volume.min(100);
        if let Some(sink) = &self.sink {
            sink.set_volume(self.volume as f32 / 100.0);
        }
    }

    fn volume(&self) -> u32 {
        self.volume
    }

    fn is_finished(&self) -> bool {
        let Some(sink) = &self.sink else {
            return false;
        };
        if !sink.empty() || self.state != SinkState::Playing {
            return false;
        }
        // A brief guard keeps an empty sink during loading from being
        // mistaken for a finished track.
        self.start_time.is_some() && self.position() >= 2.0
    }
}
