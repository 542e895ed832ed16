//! Continuous presence tracking.
//!
//! A [`PresenceTracker`] keeps at most one open presence session: an interval
//! in which the user is judged to be working in the host on one document.
//! Each [`PresenceTracker::tick`] polls the OS probe and closes the session
//! when the user has been idle past the timeout or the host window lost the
//! foreground. Document switches close the session and immediately open the
//! next one.
//!
//! Every closure emits one `Document Work` record.
//!
//! # Concurrency
//!
//! Ticks come from the poller thread while `start`, `change_document` and
//! `stop` come from the host's thread. All presence state sits behind one
//! mutex, held only while state is read and updated. Probe queries happen
//! before the lock is taken and records are emitted after it is released.
//!
//! # Re-arming
//!
//! After an idle or foreground closure the tracker stays inactive until the
//! host calls [`PresenceTracker::start`] or
//! [`PresenceTracker::change_document`] again. Regaining focus alone does not
//! reopen a session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::Clock;
use crate::provider::{HostContext, PresenceProbe};
use crate::telemetry::{self, TelemetryRecord, TelemetrySink};

/// Message template of presence closure records.
pub const PRESENCE_TEMPLATE: &str = "Document Work";

/// Last-input readings closer than this to the previous reading count as unchanged.
pub const INPUT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Why a presence session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Idle,
    NotInHost,
    DocumentChanged,
    Finished,
    ManuallyStopped,
}

impl CloseReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::NotInHost => "Not in host application",
            Self::DocumentChanged => "Document changed",
            Self::Finished => "Finished",
            Self::ManuallyStopped => "Manually stopped",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    /// No open session.
    Inactive,
    /// A session is open.
    Tracking,
}

/// Outcome of evaluating one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Present,
    Away(CloseReason),
}

#[derive(Debug, Clone)]
struct PresenceSession {
    id: Uuid,
    document: Option<String>,
    started_at: DateTime<Utc>,
}

impl PresenceSession {
    fn begin(started_at: DateTime<Utc>, document: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            document,
            started_at,
        }
    }

    #[expect(
        clippy::cast_precision_loss,
        reason = "session lengths are far below f64 integer precision"
    )]
    fn record(&self, reason: CloseReason, ended_at: DateTime<Utc>) -> TelemetryRecord {
        let minutes = (ended_at - self.started_at).num_milliseconds() as f64 / 60_000.0;
        TelemetryRecord::information(PRESENCE_TEMPLATE, ended_at)
            .with_field("Reason", reason.as_str())
            .with_field("Document", self.document.clone())
            .with_field("SessionId", self.id.to_string())
            .with_field("StartTime", self.started_at)
            .with_field("EndTime", ended_at)
            .with_field("WorkTime", minutes)
    }
}

#[derive(Debug)]
struct PresenceState {
    phase: TrackerPhase,
    session: PresenceSession,
    idle_since: Instant,
    previous_last_input: Option<Instant>,
}

impl PresenceState {
    fn open(&mut self, now: DateTime<Utc>, instant: Instant, document: Option<String>) {
        self.phase = TrackerPhase::Tracking;
        self.session = PresenceSession::begin(now, document);
        self.idle_since = instant;
    }

    /// Closes the session and re-anchors bookkeeping at `now`.
    fn close(
        &mut self,
        reason: CloseReason,
        now: DateTime<Utc>,
        next_document: Option<String>,
    ) -> TelemetryRecord {
        let closed = std::mem::replace(
            &mut self.session,
            PresenceSession::begin(now, next_document),
        );
        self.phase = TrackerPhase::Inactive;
        closed.record(reason, now)
    }

    fn observe_input(&mut self, instant: Instant, idle: Duration) {
        let last_input = instant.checked_sub(idle).unwrap_or(instant);
        let unchanged = self
            .previous_last_input
            .is_some_and(|previous| abs_diff(previous, last_input) < INPUT_DEBOUNCE);
        // Session opens count as activity, so an older reading never rewinds idle_since.
        if !unchanged {
            self.idle_since = self.idle_since.max(last_input);
        }
        self.previous_last_input = Some(last_input);
    }

    fn verdict(&self, instant: Instant, idle_timeout: Duration, in_host: Option<bool>) -> Verdict {
        if instant.saturating_duration_since(self.idle_since) > idle_timeout {
            Verdict::Away(CloseReason::Idle)
        } else if in_host == Some(false) {
            Verdict::Away(CloseReason::NotInHost)
        } else {
            Verdict::Present
        }
    }
}

fn abs_diff(a: Instant, b: Instant) -> Duration {
    a.saturating_duration_since(b)
        .max(b.saturating_duration_since(a))
}

/// Tracks user presence in the host and emits session records.
pub struct PresenceTracker {
    idle_timeout: Duration,
    probe: Arc<dyn PresenceProbe>,
    host: Arc<dyn HostContext>,
    sink: Arc<dyn TelemetrySink>,
    clock: Arc<dyn Clock>,
    state: Mutex<PresenceState>,
}

impl PresenceTracker {
    pub fn new(
        idle_timeout: Duration,
        probe: Arc<dyn PresenceProbe>,
        host: Arc<dyn HostContext>,
        sink: Arc<dyn TelemetrySink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = PresenceState {
            phase: TrackerPhase::Inactive,
            session: PresenceSession::begin(clock.now(), None),
            idle_since: clock.instant(),
            previous_last_input: None,
        };
        Self {
            idle_timeout,
            probe,
            host,
            sink,
            clock,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PresenceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> TrackerPhase {
        self.lock().phase
    }

    /// Document the current session is anchored to.
    pub fn session_document(&self) -> Option<String> {
        self.lock().session.document.clone()
    }

    pub const fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    fn host_window_known(&self) -> bool {
        if self.host.main_window().is_some() {
            return true;
        }
        tracing::warn!("host main window unknown, presence tracking unavailable");
        false
    }

    /// Opens a session on the host's active document unless one is open.
    ///
    /// Returns `false` when tracking cannot start because the host has not
    /// provided its main window.
    pub fn start(&self) -> bool {
        if !self.host_window_known() {
            return false;
        }
        let document = self.host.active_document();
        let now = self.clock.now();
        let instant = self.clock.instant();

        let mut state = self.lock();
        if state.phase == TrackerPhase::Tracking {
            return true;
        }
        tracing::debug!(document = ?document, "presence session opened");
        state.open(now, instant, document);
        true
    }

    /// Opens a session only if the host already has an active document.
    ///
    /// Covers tracking being enabled after a document was opened.
    pub fn start_if_document_active(&self) -> bool {
        if self.host.active_document().is_none() {
            tracing::debug!("no active document, presence session not opened");
            return false;
        }
        self.start()
    }

    /// Closes the current session (if any) and opens one on `document`.
    pub fn change_document(&self, document: impl Into<String>) {
        if !self.host_window_known() {
            return;
        }
        let document = document.into();
        let now = self.clock.now();
        let instant = self.clock.instant();

        let record = {
            let mut state = self.lock();
            let record = (state.phase == TrackerPhase::Tracking).then(|| {
                state.close(CloseReason::DocumentChanged, now, Some(document.clone()))
            });
            tracing::debug!(%document, "presence session moved to new document");
            state.open(now, instant, Some(document));
            record
        };

        if let Some(record) = record {
            telemetry::emit(self.sink.as_ref(), &record);
        }
    }

    /// Closes the open session with `reason`. Safe to call repeatedly.
    ///
    /// Returns whether a session was closed.
    pub fn stop(&self, reason: CloseReason) -> bool {
        let active_document = self.host.active_document();
        let now = self.clock.now();

        let record = {
            let mut state = self.lock();
            (state.phase == TrackerPhase::Tracking)
                .then(|| state.close(reason, now, active_document))
        };

        match record {
            Some(record) => {
                telemetry::emit(self.sink.as_ref(), &record);
                true
            }
            None => false,
        }
    }

    /// Whether the host window is the OS foreground window.
    ///
    /// `None` when either title cannot be read.
    fn host_in_foreground(&self) -> Option<bool> {
        let handle = self.host.main_window()?;
        let host_title = self.probe.window_title(handle)?;
        let foreground_title = self.probe.foreground_window_title()?;
        Some(host_title == foreground_title)
    }

    /// Runs one presence poll.
    pub fn tick(&self) {
        let now = self.clock.now();
        let instant = self.clock.instant();
        let idle = self.probe.idle_input_duration();
        let in_host = self.host_in_foreground();
        let active_document = self.host.active_document();

        let record = {
            let mut state = self.lock();
            state.observe_input(instant, idle);
            if state.phase != TrackerPhase::Tracking {
                return;
            }
            // The readings above predate a session opened while they were taken.
            if state.session.started_at > now {
                tracing::trace!("session opened during poll, verdict skipped");
                return;
            }
            match state.verdict(instant, self.idle_timeout, in_host) {
                Verdict::Present => None,
                Verdict::Away(reason) => {
                    tracing::debug!(%reason, "presence session closed by poll");
                    Some(state.close(reason, now, active_document))
                }
            }
        };

        if let Some(record) = record {
            telemetry::emit(self.sink.as_ref(), &record);
        }
    }
}

impl std::fmt::Debug for PresenceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceTracker")
            .field("idle_timeout", &self.idle_timeout)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use chrono::TimeZone;

    use crate::clock::ManualClock;
    use crate::telemetry::{FieldValue, MemorySink};
    use crate::types::WindowHandle;

    pub(crate) const HOST_TITLE: &str = "Host - [A.proj]";

    /// Probe driven by the test: input happens when the test says so.
    pub(crate) struct ScriptedProbe {
        clock: Arc<ManualClock>,
        last_input: Mutex<Duration>,
        jitter: Mutex<Duration>,
        foreground: Mutex<Option<String>>,
    }

    impl ScriptedProbe {
        pub(crate) fn new(clock: Arc<ManualClock>) -> Self {
            Self {
                clock,
                last_input: Mutex::new(Duration::ZERO),
                jitter: Mutex::new(Duration::ZERO),
                foreground: Mutex::new(Some(HOST_TITLE.to_string())),
            }
        }

        pub(crate) fn input(&self) {
            *self.last_input.lock().unwrap() = self.clock.elapsed();
        }

        pub(crate) fn focus(&self, title: Option<&str>) {
            *self.foreground.lock().unwrap() = title.map(String::from);
        }

        fn set_jitter(&self, jitter: Duration) {
            *self.jitter.lock().unwrap() = jitter;
        }
    }

    impl PresenceProbe for ScriptedProbe {
        fn idle_input_duration(&self) -> Duration {
            let idle = self
                .clock
                .elapsed()
                .saturating_sub(*self.last_input.lock().unwrap());
            idle.saturating_sub(*self.jitter.lock().unwrap())
        }

        fn foreground_window_title(&self) -> Option<String> {
            self.foreground.lock().unwrap().clone()
        }

        fn window_title(&self, _handle: WindowHandle) -> Option<String> {
            Some(HOST_TITLE.to_string())
        }
    }

    pub(crate) struct StaticHost {
        document: Mutex<Option<String>>,
        window: Option<WindowHandle>,
    }

    impl StaticHost {
        pub(crate) fn new(document: &str) -> Self {
            Self {
                document: Mutex::new(Some(document.to_string())),
                window: Some(WindowHandle::new(0x1F00)),
            }
        }

        fn without_window(document: &str) -> Self {
            Self {
                document: Mutex::new(Some(document.to_string())),
                window: None,
            }
        }

        pub(crate) fn set_document(&self, document: &str) {
            *self.document.lock().unwrap() = Some(document.to_string());
        }
    }

    impl HostContext for StaticHost {
        fn active_document(&self) -> Option<String> {
            self.document.lock().unwrap().clone()
        }

        fn main_window(&self) -> Option<WindowHandle> {
            self.window
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        probe: Arc<ScriptedProbe>,
        host: Arc<StaticHost>,
        sink: Arc<MemorySink>,
        tracker: Arc<PresenceTracker>,
    }

    impl Fixture {
        fn new(host: StaticHost) -> Self {
            let origin = Utc.with_ymd_and_hms(2025, 2, 3, 9, 0, 0).unwrap();
            let clock = Arc::new(ManualClock::new(origin));
            let probe = Arc::new(ScriptedProbe::new(clock.clone()));
            let host = Arc::new(host);
            let sink = Arc::new(MemorySink::new());
            let tracker = Arc::new(PresenceTracker::new(
                Duration::from_secs(60),
                probe.clone(),
                host.clone(),
                sink.clone(),
                clock.clone(),
            ));
            Self {
                clock,
                probe,
                host,
                sink,
                tracker,
            }
        }

        fn tick_after(&self, secs: u64) {
            self.clock.advance(Duration::from_secs(secs));
            self.tracker.tick();
        }

        fn reasons(&self) -> Vec<String> {
            self.sink
                .records()
                .iter()
                .filter_map(|r| r.field("Reason").and_then(FieldValue::as_str).map(String::from))
                .collect()
        }
    }

    #[test]
    fn idle_past_timeout_closes_once() {
        let fx = Fixture::new(StaticHost::new("A.proj"));
        assert!(fx.tracker.start());

        for _ in 0..6 {
            fx.tick_after(10);
        }
        assert!(fx.sink.is_empty(), "60s idle is not past the timeout");

        fx.tick_after(5);
        assert_eq!(fx.reasons(), ["Idle"]);
        assert_eq!(fx.tracker.phase(), TrackerPhase::Inactive);

        for _ in 0..10 {
            fx.tick_after(10);
        }
        assert_eq!(fx.sink.len(), 1, "no further closures until re-armed");

        let record = &fx.sink.records()[0];
        assert_eq!(record.template, PRESENCE_TEMPLATE);
        assert_eq!(
            record.field("Document").and_then(FieldValue::as_str),
            Some("A.proj")
        );
        let work = record.field("WorkTime").and_then(FieldValue::as_f64).unwrap();
        assert!((work - 65.0 / 60.0).abs() < 1e-9, "work time was {work}");
    }

    #[test]
    fn input_keeps_session_open() {
        let fx = Fixture::new(StaticHost::new("A.proj"));
        fx.tracker.start();

        for _ in 0..20 {
            fx.clock.advance(Duration::from_secs(10));
            fx.probe.input();
            fx.tracker.tick();
        }

        assert!(fx.sink.is_empty());
        assert_eq!(fx.tracker.phase(), TrackerPhase::Tracking);
    }

    #[test]
    fn jitter_below_debounce_counts_as_no_input() {
        let fx = Fixture::new(StaticHost::new("A.proj"));
        fx.tracker.start();

        for i in 0..7_u32 {
            fx.probe
                .set_jitter(Duration::from_millis(if i % 2 == 0 { 0 } else { 120 }));
            fx.tick_after(10);
        }

        assert_eq!(fx.reasons(), ["Idle"]);
    }

    /// Switches the host to another document while a poll reads the focus.
    struct SwitchingProbe {
        clock: Arc<ManualClock>,
        tracker: Mutex<Option<Arc<PresenceTracker>>>,
    }

    impl PresenceProbe for SwitchingProbe {
        fn idle_input_duration(&self) -> Duration {
            Duration::ZERO
        }

        fn foreground_window_title(&self) -> Option<String> {
            if let Some(tracker) = self.tracker.lock().unwrap().take() {
                self.clock.advance(Duration::from_secs(1));
                tracker.change_document("B.proj");
            }
            Some("Other Application".to_string())
        }

        fn window_title(&self, _handle: WindowHandle) -> Option<String> {
            Some(HOST_TITLE.to_string())
        }
    }

    #[test]
    fn session_opened_during_poll_is_not_judged_by_it() {
        let origin = Utc.with_ymd_and_hms(2025, 2, 3, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(origin));
        let probe = Arc::new(SwitchingProbe {
            clock: clock.clone(),
            tracker: Mutex::new(None),
        });
        let sink = Arc::new(MemorySink::new());
        let tracker = Arc::new(PresenceTracker::new(
            Duration::from_secs(60),
            probe.clone(),
            Arc::new(StaticHost::new("A.proj")),
            sink.clone(),
            clock.clone(),
        ));
        tracker.start();
        *probe.tracker.lock().unwrap() = Some(tracker.clone());

        clock.advance(Duration::from_secs(10));
        tracker.tick();

        let reasons: Vec<_> = sink
            .records()
            .iter()
            .filter_map(|r| r.field("Reason").and_then(FieldValue::as_str).map(String::from))
            .collect();
        assert_eq!(reasons, ["Document changed"]);
        assert_eq!(tracker.phase(), TrackerPhase::Tracking);
        assert_eq!(tracker.session_document().as_deref(), Some("B.proj"));
    }

    #[test]
    fn losing_foreground_closes_on_the_same_tick() {
        let fx = Fixture::new(StaticHost::new("A.proj"));
        fx.tracker.start();
        fx.probe.input();
        fx.tick_after(10);
        assert!(fx.sink.is_empty());

        fx.probe.focus(Some("Inbox - Mail"));
        fx.probe.input();
        fx.tick_after(10);

        assert_eq!(fx.reasons(), ["Not in host application"]);
        assert_eq!(fx.tracker.phase(), TrackerPhase::Inactive);
    }

    #[test]
    fn unreadable_foreground_is_no_signal() {
        let fx = Fixture::new(StaticHost::new("A.proj"));
        fx.tracker.start();
        fx.probe.focus(None);
        fx.probe.input();
        fx.tick_after(10);

        assert!(fx.sink.is_empty());
        assert_eq!(fx.tracker.phase(), TrackerPhase::Tracking);
    }

    #[test]
    fn regaining_focus_does_not_rearm() {
        let fx = Fixture::new(StaticHost::new("A.proj"));
        fx.tracker.start();
        fx.probe.focus(Some("Browser"));
        fx.tick_after(10);
        assert_eq!(fx.sink.len(), 1);

        fx.probe.focus(Some(HOST_TITLE));
        for _ in 0..5 {
            fx.clock.advance(Duration::from_secs(10));
            fx.probe.input();
            fx.tracker.tick();
        }
        assert_eq!(fx.tracker.phase(), TrackerPhase::Inactive);

        assert!(fx.tracker.start());
        assert_eq!(fx.tracker.phase(), TrackerPhase::Tracking);
        assert_eq!(fx.sink.len(), 1);
    }

    #[test]
    fn change_document_closes_and_reopens_without_gap() {
        let fx = Fixture::new(StaticHost::new("A.proj"));
        fx.tracker.start();
        fx.clock.advance(Duration::from_secs(50));

        fx.host.set_document("B.proj");
        fx.tracker.change_document("B.proj");

        let records = fx.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].field("Reason").and_then(FieldValue::as_str),
            Some("Document changed")
        );
        assert_eq!(
            records[0].field("Document").and_then(FieldValue::as_str),
            Some("A.proj")
        );
        assert_eq!(fx.tracker.phase(), TrackerPhase::Tracking);
        assert_eq!(fx.tracker.session_document().as_deref(), Some("B.proj"));

        // The switch counts as activity: 50s before it plus 20s after is not idle.
        fx.tick_after(10);
        fx.tick_after(10);
        assert_eq!(fx.sink.len(), 1);

        let next_start = records[0].field("EndTime").cloned();
        fx.tracker.stop(CloseReason::Finished);
        let last = fx.sink.records().pop().unwrap();
        assert_eq!(last.field("StartTime").cloned(), next_start);
        assert_eq!(
            last.field("Document").and_then(FieldValue::as_str),
            Some("B.proj")
        );
    }

    #[test]
    fn change_document_while_inactive_just_opens() {
        let fx = Fixture::new(StaticHost::new("A.proj"));
        fx.tracker.change_document("B.proj");

        assert!(fx.sink.is_empty());
        assert_eq!(fx.tracker.phase(), TrackerPhase::Tracking);
        assert_eq!(fx.tracker.session_document().as_deref(), Some("B.proj"));
    }

    #[test]
    fn arming_needs_an_active_document() {
        let fx = Fixture::new(StaticHost::new("A.proj"));
        *fx.host.document.lock().unwrap() = None;
        assert!(!fx.tracker.start_if_document_active());
        assert_eq!(fx.tracker.phase(), TrackerPhase::Inactive);

        fx.host.set_document("A.proj");
        assert!(fx.tracker.start_if_document_active());
        assert_eq!(fx.tracker.session_document().as_deref(), Some("A.proj"));
    }

    #[test]
    fn stop_is_idempotent() {
        let fx = Fixture::new(StaticHost::new("A.proj"));
        fx.tracker.start();
        fx.clock.advance(Duration::from_secs(30));

        assert!(fx.tracker.stop(CloseReason::Finished));
        assert!(!fx.tracker.stop(CloseReason::Finished));
        assert_eq!(fx.reasons(), ["Finished"]);
    }

    #[test]
    fn start_without_host_window_degrades() {
        let fx = Fixture::new(StaticHost::without_window("A.proj"));
        assert!(!fx.tracker.start());
        fx.tick_after(120);
        assert_eq!(fx.tracker.phase(), TrackerPhase::Inactive);
        assert!(fx.sink.is_empty());
    }

    #[test]
    fn start_reads_document_lazily() {
        let fx = Fixture::new(StaticHost::new("A.proj"));
        fx.host.set_document("Late.proj");
        fx.tracker.start();
        assert_eq!(fx.tracker.session_document().as_deref(), Some("Late.proj"));
    }

    #[test]
    fn ticks_and_document_changes_interleave_safely() {
        let fx = Fixture::new(StaticHost::new("A.proj"));
        fx.tracker.start();

        let tracker = Arc::clone(&fx.tracker);
        let poller = std::thread::spawn(move || {
            for _ in 0..500 {
                tracker.tick();
            }
        });
        for i in 0..100 {
            fx.tracker.change_document(format!("doc-{i}.proj"));
        }
        poller.join().unwrap();

        assert_eq!(fx.reasons().len(), 100);
        assert!(fx.reasons().iter().all(|r| r == "Document changed"));
    }
}
