//! The session orchestrator.
//!
//! Capture and playback run on dedicated OS threads (blocking device I/O);
//! network forwarding and receive run as tokio tasks. All of them observe
//! one `SessionState`, and every exit path goes through `shutdown`.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;

use super::capture::{CAPTURE_CHANNEL_DEPTH, capture_thread, forward_loop};
use super::playback::playback_thread;
use super::receive::{ReceiveExit, receive_loop};
use super::state::{SessionState, SessionStats};
use super::{SessionPhase, SessionTimings};
use crate::audio::{AudioDeviceManager, PcmBackend, PlaybackQueue, WavDump};
use crate::error::{DeviceError, SessionError, TransportError};
use crate::transport::Transport;

/// Terminal report of a session that closed cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: String,
    pub logid: Option<String>,
    pub interrupted: bool,
    pub frames_captured: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    pub frames_played: u64,
    pub flushes: u64,
}

#[derive(Default)]
struct Activities {
    capture: Option<JoinHandle<()>>,
    forward: Option<tokio::task::JoinHandle<()>>,
    receive: Option<tokio::task::JoinHandle<ReceiveExit>>,
    playback: Option<JoinHandle<()>>,
}

pub struct DialogSession<T: Transport, B: PcmBackend> {
    transport: Arc<T>,
    devices: AudioDeviceManager<B>,
    queue: Arc<PlaybackQueue>,
    state: Arc<SessionState>,
    stats: Arc<SessionStats>,
    timings: SessionTimings,
    wav_dump: Option<PathBuf>,
    phase: SessionPhase,
    connected: bool,
}

impl<T: Transport, B: PcmBackend> DialogSession<T, B> {
    pub fn new(transport: Arc<T>, devices: AudioDeviceManager<B>, timings: SessionTimings) -> Self {
        Self {
            transport,
            devices,
            queue: Arc::new(PlaybackQueue::new()),
            state: Arc::new(SessionState::new()),
            stats: Arc::new(SessionStats::default()),
            timings,
            wav_dump: None,
            phase: SessionPhase::Idle,
            connected: false,
        }
    }

    /// Also write the raw microphone audio to a WAV file.
    pub fn with_wav_dump(mut self, path: impl Into<PathBuf>) -> Self {
        self.wav_dump = Some(path.into());
        self
    }

    /// Handle for the interrupt handler.
    pub fn state(&self) -> Arc<SessionState> {
        self.state.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn session_id(&self) -> &str {
        self.transport.session_id()
    }

    /// Drive the session to its terminal state.
    ///
    /// Devices and transport are released before this returns, whatever the
    /// outcome.
    pub async fn run(&mut self) -> Result<SessionSummary, SessionError> {
        if self.phase != SessionPhase::Idle {
            return Err(SessionError::NotIdle(self.phase));
        }

        self.transition(SessionPhase::Connecting);
        let mut activities = Activities::default();
        match self.start(&mut activities).await {
            Ok(true) => {
                self.transition(SessionPhase::Active);
                self.wait_while_active(&activities).await;
                self.transition(SessionPhase::Finishing);
            }
            Ok(false) => log::info!("Session stopped while connecting"),
            Err(e) => self.state.fail(e),
        }

        self.shutdown(activities).await;

        match self.state.take_failure() {
            Some(e) => {
                self.transition(SessionPhase::Errored);
                Err(e)
            }
            None => {
                self.transition(SessionPhase::Closed);
                Ok(self.summary())
            }
        }
    }

    /// Returns `Ok(false)` when the session was stopped before the transport
    /// finished connecting.
    async fn start(&mut self, activities: &mut Activities) -> Result<bool, SessionError> {
        tokio::select! {
            connected = self.transport.connect() => connected?,
            _ = self.state.stopped(self.timings.poll_interval) => return Ok(false),
        }
        self.connected = true;

        let output = self.devices.open_output()?;
        let input = self.devices.open_input()?;

        activities.playback = Some({
            let queue = self.queue.clone();
            let state = self.state.clone();
            let stats = self.stats.clone();
            let timings = self.timings;
            spawn_named("audio-play", move || {
                playback_thread(output, queue, state, stats, timings)
            })?
        });

        let (frame_tx, frame_rx) = mpsc::channel(CAPTURE_CHANNEL_DEPTH);
        activities.capture = Some({
            let dump = self
                .wav_dump
                .as_ref()
                .map(|path| WavDump::create(path, self.devices.input_config()));
            let state = self.state.clone();
            let stats = self.stats.clone();
            let timings = self.timings;
            spawn_named("audio-record", move || {
                capture_thread(input, frame_tx, dump, state, stats, timings)
            })?
        });

        activities.forward = Some(tokio::spawn(forward_loop(
            self.transport.clone(),
            frame_rx,
            self.state.clone(),
            self.stats.clone(),
        )));

        activities.receive = Some(tokio::spawn(receive_loop(
            self.transport.clone(),
            self.queue.clone(),
            self.state.clone(),
            self.stats.clone(),
            self.timings.max_receive_errors,
        )));

        log::info!("Microphone open, start talking...");
        Ok(true)
    }

    async fn wait_while_active(&self, activities: &Activities) {
        loop {
            if !self.state.is_running() {
                log::info!("Session stop requested");
                break;
            }
            if self.state.is_session_finished() {
                break;
            }
            if activities.receive.as_ref().is_some_and(|h| h.is_finished()) {
                log::warn!("Receive loop exited");
                break;
            }
            if activities.forward.as_ref().is_some_and(|h| h.is_finished()) {
                log::warn!("Audio forwarding exited");
                break;
            }
            self.state.wait_changed(self.timings.poll_interval).await;
        }
    }

    /// The single teardown path: stop capture, end session, wait bounded for
    /// session-finished, end connection, close transport, release devices.
    async fn shutdown(&mut self, mut activities: Activities) {
        let limit = self.timings.finish_wait;

        self.state.stop_recording();
        if let Some(handle) = activities.capture.take() {
            join_thread(handle, "audio-record", limit).await;
        }
        if let Some(mut forward) = activities.forward.take() {
            if tokio::time::timeout(limit, &mut forward).await.is_err() {
                log::warn!("Audio forwarding did not drain within {:?}", limit);
                forward.abort();
            }
        }

        if self.connected {
            bounded("request session end", limit, self.transport.request_session_end()).await;
        }

        if let Some(mut receive) = activities.receive.take() {
            match tokio::time::timeout(limit, &mut receive).await {
                Ok(Ok(exit)) => log::debug!("Receive loop finished: {:?}", exit),
                Ok(Err(e)) => log::error!("Receive task failed: {}", e),
                Err(_) => {
                    log::warn!("No session-finished event within {:?}, giving up", limit);
                    receive.abort();
                }
            }
        }

        if self.connected {
            bounded("request connection end", limit, self.transport.request_connection_end()).await;
            tokio::time::sleep(self.timings.poll_interval).await;
        }
        bounded("close transport", limit, self.transport.close()).await;
        if let Some(logid) = self.transport.logid() {
            log::info!("Dialog request logid: {}", logid);
        }

        self.state.stop_playing();
        self.queue.wake();
        if let Some(handle) = activities.playback.take() {
            join_thread(handle, "audio-play", limit).await;
        }
        let discarded = self.queue.flush();
        if discarded > 0 {
            log::debug!("Discarded {} unplayed frame(s)", discarded);
        }

        self.devices.close_all();
    }

    fn transition(&mut self, next: SessionPhase) {
        log::info!("Session {}: {} -> {}", self.session_id(), self.phase, next);
        self.phase = next;
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id().to_string(),
            logid: self.transport.logid(),
            interrupted: self.state.was_interrupted(),
            frames_captured: SessionStats::get(&self.stats.frames_captured),
            frames_sent: SessionStats::get(&self.stats.frames_sent),
            frames_received: SessionStats::get(&self.stats.frames_received),
            frames_played: SessionStats::get(&self.stats.frames_played),
            flushes: SessionStats::get(&self.stats.flushes),
        }
    }
}

impl<T: Transport, B: PcmBackend> Drop for DialogSession<T, B> {
    fn drop(&mut self) {
        // A cancelled run() must not leave the device threads spinning
        self.state.stop_recording();
        self.state.stop_playing();
        self.queue.wake();
    }
}

fn spawn_named<F>(name: &str, f: F) -> Result<JoinHandle<()>, SessionError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.into())
        .spawn(f)
        .map_err(|e| SessionError::Device(DeviceError::Io(format!("spawn {}: {}", name, e))))
}

/// Await a teardown call for at most `limit`; failures are logged and
/// shutdown carries on.
async fn bounded<F>(what: &str, limit: Duration, call: F)
where
    F: Future<Output = Result<(), TransportError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("Failed to {}: {}", what, e),
        Err(_) => log::warn!("Gave up on {} after {:?}", what, limit),
    }
}

async fn join_thread(handle: JoinHandle<()>, name: &str, limit: Duration) {
    let joined = tokio::task::spawn_blocking(move || handle.join());
    match tokio::time::timeout(limit, joined).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(_))) => log::error!("{} thread panicked", name),
        Ok(Err(e)) => log::error!("Failed to join {} thread: {}", name, e),
        Err(_) => log::warn!("{} thread did not stop within {:?}", name, limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ServerMessage, event};
    use crate::testing::{
        FakeBackend, DeviceTracker, ScriptedTransport, Step, audio_msg, test_audio_config, test_timings,
    };
    use std::time::Instant;

    fn session(
        transport: &Arc<ScriptedTransport>,
        backend: FakeBackend,
    ) -> DialogSession<ScriptedTransport, FakeBackend> {
        let devices = AudioDeviceManager::new(backend, test_audio_config(), test_audio_config());
        DialogSession::new(transport.clone(), devices, test_timings())
    }

    fn assert_released(tracker: &DeviceTracker) {
        assert_eq!(tracker.capture_closes(), 1);
        assert_eq!(tracker.playback_closes(), 1);
        assert_eq!(tracker.terminations(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn end_to_end_dialog_reaches_closed() {
        let backend = FakeBackend::new();
        let tracker = backend.tracker();
        let gate_tracker = tracker.clone();
        let transport = Arc::new(ScriptedTransport::with_script(vec![
            Step::Msg(audio_msg(0)),
            Step::Msg(audio_msg(1)),
            Step::Msg(audio_msg(2)),
            Step::Msg(audio_msg(3)),
            Step::Msg(audio_msg(4)),
            Step::WaitForSent(10),
            Step::WaitUntil(Box::new(move || gate_tracker.written().len() >= 5)),
            Step::Msg(ServerMessage::status(event::SESSION_FINISHED)),
        ]));
        let mut session = session(&transport, backend);

        let start = Instant::now();
        let summary = tokio::time::timeout(Duration::from_secs(5), session.run())
            .await
            .expect("session hung")
            .expect("session failed");

        assert!(start.elapsed() < Duration::from_secs(3));
        assert_eq!(session.phase(), SessionPhase::Closed);
        assert!(transport.sent().len() >= 10);
        assert_eq!(tracker.written(), vec![0, 1, 2, 3, 4]);
        assert_eq!(summary.frames_received, 5);
        assert_eq!(summary.frames_played, 5);
        assert!(!summary.interrupted);
        assert_eq!(summary.logid.as_deref(), Some("scripted-logid"));
        assert_eq!(
            transport.calls(),
            vec!["connect", "request_session_end", "request_connection_end", "close"]
        );
        assert_released(&tracker);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn interrupt_during_active_closes_cleanly() {
        let backend = FakeBackend::new();
        let tracker = backend.tracker();
        let transport = Arc::new(ScriptedTransport::new().ack_session_end());
        let mut session = session(&transport, backend);
        let state = session.state();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            state.interrupt();
        });

        let summary = tokio::time::timeout(Duration::from_secs(5), session.run())
            .await
            .expect("session hung")
            .expect("session failed");

        assert!(summary.interrupted);
        assert_eq!(session.phase(), SessionPhase::Closed);
        assert!(session.state().is_session_finished());
        assert_released(&tracker);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn silent_peer_is_bounded_by_finish_wait() {
        let backend = FakeBackend::new();
        let tracker = backend.tracker();
        let transport = Arc::new(ScriptedTransport::new());
        let mut session = session(&transport, backend);
        let state = session.state();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            state.interrupt();
        });

        let start = Instant::now();
        let result = tokio::time::timeout(Duration::from_secs(5), session.run())
            .await
            .expect("session hung");

        assert!(result.is_ok());
        assert!(start.elapsed() < test_timings().finish_wait + Duration::from_secs(1));
        assert_eq!(session.phase(), SessionPhase::Closed);
        assert!(!session.state().is_session_finished());
        assert!(transport.calls().contains(&"close"));
        assert_released(&tracker);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn interrupt_while_connecting_does_not_wait_for_handshake() {
        let backend = FakeBackend::new();
        let tracker = backend.tracker();
        let transport = Arc::new(ScriptedTransport::new().hang_connect());
        let mut session = session(&transport, backend);
        let state = session.state();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            state.interrupt();
        });

        let start = Instant::now();
        let summary = tokio::time::timeout(Duration::from_secs(3), session.run())
            .await
            .expect("connect ignored the interrupt")
            .expect("session failed");

        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(summary.interrupted);
        assert_eq!(session.phase(), SessionPhase::Closed);
        assert_eq!(transport.calls(), vec!["connect", "close"]);
        assert_eq!(tracker.capture_closes(), 0);
        assert_eq!(tracker.playback_closes(), 0);
        assert_eq!(tracker.terminations(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stalled_teardown_calls_are_bounded() {
        let backend = FakeBackend::new();
        let tracker = backend.tracker();
        let transport = Arc::new(ScriptedTransport::new().hang_teardown());
        let mut session = session(&transport, backend);
        let state = session.state();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            state.interrupt();
        });

        let start = Instant::now();
        let result = tokio::time::timeout(Duration::from_secs(5), session.run())
            .await
            .expect("shutdown hung on the transport");

        assert!(result.is_ok());
        // Four bounded waits of finish_wait each, plus slack
        assert!(start.elapsed() < test_timings().finish_wait * 4 + Duration::from_secs(1));
        assert_eq!(session.phase(), SessionPhase::Closed);
        assert_eq!(
            transport.calls(),
            vec!["connect", "request_session_end", "request_connection_end", "close"]
        );
        assert_released(&tracker);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn remote_error_reaches_errored_with_teardown() {
        let backend = FakeBackend::new();
        let tracker = backend.tracker();
        let transport = Arc::new(ScriptedTransport::with_script(vec![Step::Msg(
            ServerMessage::Error {
                code: 55000001,
                message: "server busy".into(),
            },
        )]));
        let mut session = session(&transport, backend);

        let err = tokio::time::timeout(Duration::from_secs(5), session.run())
            .await
            .expect("session hung")
            .unwrap_err();

        assert!(matches!(err, SessionError::Remote { code: 55000001, .. }));
        assert!(!err.to_string().is_empty());
        assert_eq!(session.phase(), SessionPhase::Errored);
        assert_eq!(
            transport.calls(),
            vec!["connect", "request_session_end", "request_connection_end", "close"]
        );
        assert_released(&tracker);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn device_open_failure_is_errored() {
        let backend = FakeBackend::new().fail_capture_open();
        let tracker = backend.tracker();
        let transport = Arc::new(ScriptedTransport::new());
        let mut session = session(&transport, backend);

        let err = session.run().await.unwrap_err();

        assert!(matches!(err, SessionError::Device(DeviceError::Open { .. })));
        assert_eq!(session.phase(), SessionPhase::Errored);
        // Output was already open and is still released
        assert_eq!(tracker.playback_closes(), 1);
        assert_eq!(tracker.capture_closes(), 0);
        assert_eq!(tracker.terminations(), 1);
        assert!(transport.calls().contains(&"close"));
    }

    #[tokio::test]
    async fn connect_failure_is_errored() {
        let backend = FakeBackend::new();
        let tracker = backend.tracker();
        let transport = Arc::new(ScriptedTransport::new().fail_connect());
        let mut session = session(&transport, backend);

        let err = session.run().await.unwrap_err();

        assert!(matches!(err, SessionError::Transport(TransportError::Connect(_))));
        assert_eq!(session.phase(), SessionPhase::Errored);
        assert_eq!(transport.calls(), vec!["connect", "close"]);
        assert_eq!(tracker.terminations(), 1);
        assert_eq!(tracker.playback_closes(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn transient_capture_errors_keep_the_session_alive() {
        let backend = FakeBackend::new().with_read_errors(5);
        let tracker = backend.tracker();
        let transport = Arc::new(ScriptedTransport::with_script(vec![
            Step::WaitForSent(3),
            Step::Msg(ServerMessage::status(event::SESSION_FINISHED)),
        ]));
        let mut session = session(&transport, backend);

        let summary = tokio::time::timeout(Duration::from_secs(5), session.run())
            .await
            .expect("session hung")
            .expect("session failed");

        assert!(summary.frames_sent >= 3);
        assert!(tracker.reads() > 5);
        assert_eq!(session.phase(), SessionPhase::Closed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn run_is_single_shot() {
        let transport = Arc::new(ScriptedTransport::new().fail_connect());
        let mut session = session(&transport, FakeBackend::new());
        let _ = session.run().await;
        assert!(matches!(session.run().await, Err(SessionError::NotIdle(SessionPhase::Errored))));
    }
}
