//! In-crate fakes for exercising the session without hardware or network.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::audio::{AudioConfig, AudioFrame, CaptureStream, PcmBackend, PlaybackStream, SampleFormat};
use crate::error::{DeviceError, TransportError};
use crate::protocol::{ServerMessage, event};
use crate::session::SessionTimings;
use crate::transport::Transport;

/// Mono s16 with two samples per chunk, so one frame is exactly one u32 tag.
pub fn test_audio_config() -> AudioConfig {
    AudioConfig {
        device: "fake".into(),
        format: "pcm".into(),
        sample_format: SampleFormat::S16,
        channels: 1,
        sample_rate: 16000,
        chunk: 2,
    }
}

pub fn test_timings() -> SessionTimings {
    SessionTimings {
        poll_interval: Duration::from_millis(10),
        capture_yield: Duration::from_millis(1),
        capture_backoff: Duration::from_millis(5),
        playback_idle: Duration::from_millis(5),
        dequeue_timeout: Duration::from_millis(20),
        device_timeout: Duration::from_millis(20),
        finish_wait: Duration::from_millis(300),
        max_receive_errors: 3,
    }
}

pub fn seq_frame(seq: u32) -> AudioFrame {
    AudioFrame::new(seq.to_le_bytes().to_vec())
}

pub fn frame_seq(frame: &AudioFrame) -> u32 {
    let b = frame.as_bytes();
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

pub fn audio_msg(seq: u32) -> ServerMessage {
    ServerMessage::Audio(Bytes::from(seq.to_le_bytes().to_vec()))
}

// ======================== Fake audio backend ========================

#[derive(Default)]
struct TrackerInner {
    capture_closes: AtomicUsize,
    playback_closes: AtomicUsize,
    terminations: AtomicUsize,
    reads: AtomicUsize,
    write_attempts: AtomicUsize,
    written: Mutex<Vec<u32>>,
}

/// Shared view of what the fake devices did.
#[derive(Clone, Default)]
pub struct DeviceTracker(Arc<TrackerInner>);

impl DeviceTracker {
    pub fn capture_closes(&self) -> usize {
        self.0.capture_closes.load(Ordering::SeqCst)
    }

    pub fn playback_closes(&self) -> usize {
        self.0.playback_closes.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> usize {
        self.0.terminations.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.0.reads.load(Ordering::SeqCst)
    }

    pub fn write_attempts(&self) -> usize {
        self.0.write_attempts.load(Ordering::SeqCst)
    }

    /// Tags of every frame written to the fake speaker, in order.
    pub fn written(&self) -> Vec<u32> {
        self.0.written.lock().clone()
    }
}

#[derive(Default)]
pub struct FakeBackend {
    tracker: DeviceTracker,
    fail_capture_open: bool,
    read_errors: usize,
    write_errors: usize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracker(&self) -> DeviceTracker {
        self.tracker.clone()
    }

    pub fn fail_capture_open(mut self) -> Self {
        self.fail_capture_open = true;
        self
    }

    /// The first `n` capture reads fail with an overrun.
    pub fn with_read_errors(mut self, n: usize) -> Self {
        self.read_errors = n;
        self
    }

    /// The first `n` playback writes fail.
    pub fn with_write_errors(mut self, n: usize) -> Self {
        self.write_errors = n;
        self
    }
}

impl PcmBackend for FakeBackend {
    type Capture = FakeCapture;
    type Playback = FakePlayback;

    fn open_capture(&mut self, _config: &AudioConfig) -> Result<FakeCapture, DeviceError> {
        if self.fail_capture_open {
            return Err(DeviceError::Open {
                direction: "capture",
                reason: "device busy".into(),
            });
        }
        Ok(FakeCapture {
            tracker: self.tracker.clone(),
            read_errors: self.read_errors,
            next_seq: 0,
            stopped: false,
        })
    }

    fn open_playback(&mut self, _config: &AudioConfig) -> Result<FakePlayback, DeviceError> {
        Ok(FakePlayback {
            tracker: self.tracker.clone(),
            write_errors: self.write_errors,
            stopped: false,
        })
    }

    fn terminate(&mut self) {
        self.tracker.0.terminations.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeCapture {
    tracker: DeviceTracker,
    read_errors: usize,
    next_seq: u32,
    stopped: bool,
}

impl CaptureStream for FakeCapture {
    fn read_frame(&mut self, _timeout: Duration) -> Result<Option<AudioFrame>, DeviceError> {
        if self.stopped {
            return Err(DeviceError::Closed);
        }
        thread::sleep(Duration::from_millis(2));
        let n = self.tracker.0.reads.fetch_add(1, Ordering::SeqCst);
        if n < self.read_errors {
            return Err(DeviceError::Overrun);
        }
        let frame = seq_frame(self.next_seq);
        self.next_seq += 1;
        Ok(Some(frame))
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.tracker.0.capture_closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakePlayback {
    tracker: DeviceTracker,
    write_errors: usize,
    stopped: bool,
}

impl PlaybackStream for FakePlayback {
    fn write_frame(&mut self, frame: &AudioFrame) -> Result<(), DeviceError> {
        if self.stopped {
            return Err(DeviceError::Closed);
        }
        self.tracker.0.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.write_errors > 0 {
            self.write_errors -= 1;
            return Err(DeviceError::Io("underrun".into()));
        }
        self.tracker.0.written.lock().push(frame_seq(frame));
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.tracker.0.playback_closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ======================== Scripted transport ========================

pub enum Step {
    Msg(ServerMessage),
    Fail(TransportError),
    /// Hold the script until this many frames were sent
    WaitForSent(usize),
    /// Hold the script until the condition holds
    WaitUntil(Box<dyn Fn() -> bool + Send + Sync>),
}

/// Replays a fixed sequence of server messages and records client calls.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    sent: Mutex<Vec<AudioFrame>>,
    calls: Mutex<Vec<&'static str>>,
    ack_session_end: bool,
    fail_connect: bool,
    fail_sends: bool,
    hang_connect: bool,
    hang_teardown: bool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            ..Self::default()
        }
    }

    /// Answer a session-end request with a session-finished event.
    pub fn ack_session_end(mut self) -> Self {
        self.ack_session_end = true;
        self
    }

    pub fn fail_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// `connect` never completes.
    pub fn hang_connect(mut self) -> Self {
        self.hang_connect = true;
        self
    }

    /// Session end, connection end and close never complete.
    pub fn hang_teardown(mut self) -> Self {
        self.hang_teardown = true;
        self
    }

    pub fn fail_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub fn sent(&self) -> Vec<AudioFrame> {
        self.sent.lock().clone()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn remaining_steps(&self) -> usize {
        self.script.lock().len()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.record("connect");
        if self.hang_connect {
            std::future::pending::<()>().await;
        }
        if self.fail_connect {
            return Err(TransportError::Connect("connection refused".into()));
        }
        Ok(())
    }

    async fn send_audio(&self, frame: AudioFrame) -> Result<(), TransportError> {
        if self.fail_sends {
            return Err(TransportError::Send("broken pipe".into()));
        }
        self.sent.lock().push(frame);
        Ok(())
    }

    async fn receive_one(&self) -> Result<ServerMessage, TransportError> {
        tokio::time::sleep(Duration::from_millis(2)).await;

        let mut script = self.script.lock();
        let step = match script.front() {
            None => return Ok(ServerMessage::Empty),
            Some(Step::WaitForSent(n)) => {
                let ready = self.sent.lock().len() >= *n;
                if ready {
                    script.pop_front();
                }
                return Ok(ServerMessage::Empty);
            }
            Some(Step::WaitUntil(cond)) => {
                let ready = cond();
                if ready {
                    script.pop_front();
                }
                return Ok(ServerMessage::Empty);
            }
            Some(_) => script.pop_front(),
        };

        match step {
            Some(Step::Msg(msg)) => Ok(msg),
            Some(Step::Fail(e)) => Err(e),
            _ => Ok(ServerMessage::Empty),
        }
    }

    async fn request_session_end(&self) -> Result<(), TransportError> {
        self.record("request_session_end");
        if self.hang_teardown {
            std::future::pending::<()>().await;
        }
        if self.ack_session_end {
            self.script
                .lock()
                .push_back(Step::Msg(ServerMessage::status(event::SESSION_FINISHED)));
        }
        Ok(())
    }

    async fn request_connection_end(&self) -> Result<(), TransportError> {
        self.record("request_connection_end");
        if self.hang_teardown {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.record("close");
        if self.hang_teardown {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    fn session_id(&self) -> &str {
        "scripted-session"
    }

    fn logid(&self) -> Option<String> {
        Some("scripted-logid".to_string())
    }
}
