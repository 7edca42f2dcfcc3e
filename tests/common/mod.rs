//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use image::{DynamicImage, Rgb, RgbImage};
use timeloop::{MediaMetadata, MediaSource, TimeloopError, VideoMetadata};

/// One call observed on a [`FakeSource`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Load,
    Seek(f64),
    Capture,
    Release,
}

/// Scripted in-memory media source that records every call.
pub struct FakeSource {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub fail_load: bool,
    pub failing_seeks: HashSet<usize>,
    pub failing_captures: HashSet<usize>,
    pub seek_delay: Option<Duration>,
    pub panic_on_capture: bool,
    calls: Arc<Mutex<Vec<Call>>>,
    seeks: usize,
    captures: usize,
}

impl FakeSource {
    pub fn new(duration_seconds: f64) -> Self {
        Self {
            duration_seconds,
            width: 8,
            height: 6,
            fail_load: false,
            failing_seeks: HashSet::new(),
            failing_captures: HashSet::new(),
            seek_delay: None,
            panic_on_capture: false,
            calls: Arc::new(Mutex::new(Vec::new())),
            seeks: 0,
            captures: 0,
        }
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// Fail the `n`th seek (zero-based, in call order).
    pub fn fail_seek(mut self, n: usize) -> Self {
        self.failing_seeks.insert(n);
        self
    }

    /// Fail the `n`th capture (zero-based, in call order).
    pub fn fail_capture(mut self, n: usize) -> Self {
        self.failing_captures.insert(n);
        self
    }

    /// Panic inside `capture_frame`, as a crashing decoder would.
    pub fn panicking_capture(mut self) -> Self {
        self.panic_on_capture = true;
        self
    }

    pub fn with_seek_delay(mut self, delay: Duration) -> Self {
        self.seek_delay = Some(delay);
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Handle on the call log that outlives the source.
    pub fn call_log(&self) -> Arc<Mutex<Vec<Call>>> {
        Arc::clone(&self.calls)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl MediaSource for FakeSource {
    fn locator(&self) -> &str {
        "memory://fake"
    }

    fn load_metadata(&mut self) -> Result<MediaMetadata, TimeloopError> {
        self.record(Call::Load);
        if self.fail_load {
            return Err(TimeloopError::MediaOpen {
                locator: "memory://fake".to_string(),
                reason: "scripted load failure".to_string(),
            });
        }
        Ok(MediaMetadata {
            duration: Duration::from_secs_f64(self.duration_seconds),
            format: "fake".to_string(),
            video: VideoMetadata {
                width: self.width,
                height: self.height,
                frames_per_second: 25.0,
                frame_count: (self.duration_seconds * 25.0) as u64,
                codec: "rawvideo".to_string(),
            },
        })
    }

    fn seek(&mut self, position: Duration, deadline: Option<Instant>) -> Result<(), TimeloopError> {
        let started = Instant::now();
        self.record(Call::Seek(position.as_secs_f64()));
        let attempt = self.seeks;
        self.seeks += 1;

        if let Some(delay) = self.seek_delay {
            thread::sleep(delay);
        }
        if let Some(deadline) = deadline {
            if Instant::now() > deadline {
                return Err(TimeloopError::SeekTimeout {
                    position,
                    timeout: deadline.saturating_duration_since(started),
                });
            }
        }
        if self.failing_seeks.contains(&attempt) {
            return Err(TimeloopError::SeekError("scripted seek failure".to_string()));
        }
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<DynamicImage, TimeloopError> {
        self.record(Call::Capture);
        let attempt = self.captures;
        self.captures += 1;

        if self.panic_on_capture {
            panic!("scripted decoder crash");
        }
        if self.failing_captures.contains(&attempt) {
            return Err(TimeloopError::CaptureError("scripted capture failure".to_string()));
        }
        let shade = (attempt * 40 % 256) as u8;
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            self.width,
            self.height,
            Rgb([shade, 128, 255 - shade]),
        )))
    }

    fn release(&mut self) {
        self.record(Call::Release);
    }
}

pub fn seeks(calls: &[Call]) -> Vec<f64> {
    calls
        .iter()
        .filter_map(|call| match call {
            Call::Seek(position) => Some(*position),
            _ => None,
        })
        .collect()
}

pub fn release_count(calls: &[Call]) -> usize {
    calls.iter().filter(|call| **call == Call::Release).count()
}

pub fn segments_at(targets: &[f64]) -> Vec<timeloop::Segment> {
    targets
        .iter()
        .enumerate()
        .map(|(index, target)| timeloop::Segment::new(*target, format!("shot {index}"), format!("prompt {index}")))
        .collect()
}
