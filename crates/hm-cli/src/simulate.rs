//! Scripted host used to replay recorded sessions through the engine.
//!
//! A script is JSON lines, one step per line:
//!
//! ```text
//! {"at": 0, "event": "document_opening", "path": "C:/models/A.proj"}
//! {"at": 3, "event": "document_opened", "path": "C:/models/A.proj"}
//! {"at": 20, "event": "input"}
//! {"at": 45, "event": "focus", "target": "other"}
//! {"at": 90, "event": "shutdown"}
//! ```
//!
//! `at` is seconds since the start of the script and never decreases. Host
//! notification steps are dispatched to the [`EventCorrelator`]; `input`,
//! `focus` and `document_closed` change what the simulated machine reports.
//! Presence polls run at the configured interval between steps. Blank lines
//! and lines starting with `#` are ignored.

use std::collections::{BTreeSet, HashMap};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use hm_core::{
    Clock, DocumentRef, DocumentType, ElementId, ElementInfo, EventCorrelator, EventToggles,
    HostContext, HostDocument, HostError, HostEvent, HostEventKind, HostEventSource, ManualClock,
    Notification, PresenceProbe, PresenceTracker, TelemetrySink, UiItem, WindowHandle,
};
use serde::Deserialize;

/// Title the simulated host's main window reports.
pub const HOST_WINDOW_TITLE: &str = "Host Application - [simulated]";
const OTHER_WINDOW_TITLE: &str = "Other Application";
const HOST_WINDOW: WindowHandle = WindowHandle::new(0x0001_0001);

/// Which window the simulated user is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusTarget {
    #[default]
    Host,
    Other,
    /// The foreground title cannot be read.
    Unknown,
}

/// An item in a print job. A `sheet_number` makes it a sheet; no `name`
/// leaves the id unresolved.
#[derive(Debug, Clone, Deserialize)]
pub struct PrintedView {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sheet_number: Option<String>,
}

impl PrintedView {
    fn info(&self) -> Option<ElementInfo> {
        let name = self.name.clone()?;
        Some(match &self.sheet_number {
            Some(number) => ElementInfo::Sheet {
                number: number.clone(),
                name,
            },
            None => ElementInfo::View { name },
        })
    }
}

/// One scripted action.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Step {
    ApplicationInitialized,
    DocumentOpening {
        path: String,
        #[serde(default)]
        document_type: DocumentType,
    },
    DocumentOpened {
        path: String,
    },
    DocumentSaving {
        path: String,
    },
    DocumentSaved {
        path: String,
    },
    DocumentSavingAs {
        path: String,
        target: String,
    },
    DocumentSavedAs {
        path: String,
        original_path: String,
        #[serde(default)]
        master_file: bool,
    },
    DocumentSynchronizing {
        path: String,
        location: String,
        #[serde(default)]
        comments: String,
    },
    DocumentSynchronized {
        path: String,
    },
    DocumentPrinted {
        path: String,
        views: Vec<PrintedView>,
    },
    DocumentChanged {
        path: String,
        #[serde(default)]
        added: usize,
        #[serde(default)]
        modified: usize,
        #[serde(default)]
        deleted: usize,
    },
    FileImported {
        path: String,
        format: String,
        file: String,
    },
    FileExported {
        path: String,
        format: String,
        file: String,
    },
    FamilyLoaded {
        path: String,
        family_name: String,
        family_path: String,
        #[serde(default)]
        overrides: bool,
    },
    ViewActivated {
        path: String,
        view_name: String,
        #[serde(default)]
        previous: Option<String>,
    },
    UiAction {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        id: String,
    },
    /// The user touched keyboard or mouse.
    Input,
    /// The foreground window changed.
    Focus {
        target: FocusTarget,
    },
    /// The document was closed; reads through its references fail until it
    /// is opened again.
    DocumentClosed {
        path: String,
    },
    Shutdown,
}

/// A step with its time.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptLine {
    /// Seconds since the start of the script.
    pub at: f64,
    /// The host's payload validity flag.
    #[serde(default = "valid_by_default")]
    pub valid: bool,
    #[serde(flatten)]
    pub step: Step,
}

const fn valid_by_default() -> bool {
    true
}

impl ScriptLine {
    fn offset(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.at)
            .with_context(|| format!("invalid step time {}", self.at))
    }
}

/// Parses a script, skipping blank lines and `#` comments.
pub fn parse_script(reader: impl BufRead) -> Result<Vec<ScriptLine>> {
    let mut lines = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("failed to read script")?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let step = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid script step on line {}", index + 1))?;
        lines.push(step);
    }
    Ok(lines)
}

/// A document whose references go stale once it is closed.
#[derive(Debug)]
struct ScriptedDocument {
    path: String,
    elements: Mutex<HashMap<ElementId, ElementInfo>>,
    closed: AtomicBool,
}

impl ScriptedDocument {
    fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            elements: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn insert(&self, id: ElementId, info: ElementInfo) {
        self.elements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, info);
    }

    fn ensure_open(&self) -> Result<(), HostError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HostError::InvalidObject(format!("{} is closed", self.path)));
        }
        Ok(())
    }
}

impl HostDocument for ScriptedDocument {
    fn path_name(&self) -> Result<String, HostError> {
        self.ensure_open()?;
        Ok(self.path.clone())
    }

    fn title(&self) -> Result<String, HostError> {
        self.ensure_open()?;
        let name = self.path.rsplit(['/', '\\']).next().unwrap_or(&self.path);
        Ok(name.to_string())
    }

    fn element(&self, id: ElementId) -> Result<Option<ElementInfo>, HostError> {
        self.ensure_open()?;
        Ok(self
            .elements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }
}

/// Input and focus state of the simulated machine.
#[derive(Debug)]
struct ScriptedProbe {
    clock: Arc<ManualClock>,
    last_input: Mutex<Duration>,
    focus: Mutex<FocusTarget>,
}

impl ScriptedProbe {
    fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            last_input: Mutex::new(Duration::ZERO),
            focus: Mutex::new(FocusTarget::Host),
        }
    }

    fn input(&self) {
        *self.last_input.lock().unwrap_or_else(PoisonError::into_inner) = self.clock.elapsed();
    }

    fn focus(&self, target: FocusTarget) {
        *self.focus.lock().unwrap_or_else(PoisonError::into_inner) = target;
    }
}

impl PresenceProbe for ScriptedProbe {
    fn idle_input_duration(&self) -> Duration {
        let last_input = *self.last_input.lock().unwrap_or_else(PoisonError::into_inner);
        self.clock.elapsed().saturating_sub(last_input)
    }

    fn foreground_window_title(&self) -> Option<String> {
        match *self.focus.lock().unwrap_or_else(PoisonError::into_inner) {
            FocusTarget::Host => Some(HOST_WINDOW_TITLE.to_string()),
            FocusTarget::Other => Some(OTHER_WINDOW_TITLE.to_string()),
            FocusTarget::Unknown => None,
        }
    }

    fn window_title(&self, handle: WindowHandle) -> Option<String> {
        (handle == HOST_WINDOW).then(|| HOST_WINDOW_TITLE.to_string())
    }
}

#[derive(Debug, Default)]
struct ScriptedHost {
    active_document: Mutex<Option<String>>,
}

impl ScriptedHost {
    fn activate(&self, path: &str) {
        *self
            .active_document
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(path.to_string());
    }
}

impl HostContext for ScriptedHost {
    fn active_document(&self) -> Option<String> {
        self.active_document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn main_window(&self) -> Option<WindowHandle> {
        Some(HOST_WINDOW)
    }
}

/// Subscription table of the simulated host.
#[derive(Debug, Default)]
struct ScriptedSource {
    subscribed: BTreeSet<HostEventKind>,
}

impl HostEventSource for ScriptedSource {
    fn subscribe(&mut self, kind: HostEventKind) -> Result<(), HostError> {
        self.subscribed.insert(kind);
        Ok(())
    }

    fn unsubscribe(&mut self, kind: HostEventKind) -> Result<(), HostError> {
        if !self.subscribed.remove(&kind) {
            tracing::warn!(event = %kind, "unsubscribed from an event that was never subscribed");
        }
        Ok(())
    }
}

/// Outcome of a replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub steps: usize,
    pub polls: usize,
    pub duration: Duration,
    /// Subscriptions still held after shutdown; always zero for a correct engine.
    pub leaked_subscriptions: usize,
}

/// The engine wired to a scripted host, probe and clock.
pub struct Simulation {
    clock: Arc<ManualClock>,
    probe: Arc<ScriptedProbe>,
    host: Arc<ScriptedHost>,
    source: ScriptedSource,
    correlator: EventCorrelator,
    documents: HashMap<String, Arc<ScriptedDocument>>,
    poll_interval: Option<Duration>,
    next_poll: Duration,
    polls: usize,
    finished: bool,
}

impl Simulation {
    pub fn new(toggles: EventToggles, sink: Arc<dyn TelemetrySink>, start: DateTime<Utc>) -> Self {
        let clock = Arc::new(ManualClock::new(start));
        let probe = Arc::new(ScriptedProbe::new(clock.clone()));
        let host = Arc::new(ScriptedHost::default());
        let tracker = Arc::new(PresenceTracker::new(
            toggles.idle_timeout(),
            probe.clone(),
            host.clone(),
            sink.clone(),
            clock.clone(),
        ));
        let poll_interval = (toggles.time_spent && !toggles.poll_interval().is_zero())
            .then(|| toggles.poll_interval());

        let mut source = ScriptedSource::default();
        let mut correlator = EventCorrelator::new(toggles, sink, clock.clone()).with_presence(tracker);
        correlator.activate(&mut source);
        correlator.arm_presence();

        Self {
            clock,
            probe,
            host,
            source,
            correlator,
            documents: HashMap::new(),
            next_poll: poll_interval.unwrap_or_default(),
            poll_interval,
            polls: 0,
            finished: false,
        }
    }

    /// Current wall-clock time of the simulation.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Moves time forward to `at`, running every presence poll due on the way.
    pub fn advance_to(&mut self, at: Duration) -> Result<()> {
        let current = self.clock.elapsed();
        if at < current {
            bail!(
                "step at {:.3}s is earlier than the previous step at {:.3}s",
                at.as_secs_f64(),
                current.as_secs_f64()
            );
        }
        if let (Some(interval), false) = (self.poll_interval, self.finished) {
            while self.next_poll <= at {
                self.clock.set_elapsed(self.next_poll);
                if let Some(tracker) = self.correlator.tracker() {
                    tracker.tick();
                }
                self.polls += 1;
                self.next_poll += interval;
            }
        }
        self.clock.set_elapsed(at);
        Ok(())
    }

    /// Applies one script line.
    pub fn apply(&mut self, line: &ScriptLine) -> Result<()> {
        self.advance_to(line.offset()?)?;
        if self.finished {
            tracing::warn!(at = line.at, "ignoring step after shutdown");
            return Ok(());
        }

        match &line.step {
            Step::Input => self.probe.input(),
            Step::Focus { target } => self.probe.focus(*target),
            Step::DocumentClosed { path } => {
                if let Some(document) = self.documents.get(path) {
                    document.closed.store(true, Ordering::SeqCst);
                }
            }
            Step::Shutdown => self.finish(),
            step => {
                if let Some(event) = self.host_event(step) {
                    let notification = Notification {
                        event,
                        valid: line.valid,
                    };
                    self.correlator.dispatch(&notification);
                }
            }
        }
        Ok(())
    }

    /// Runs a whole script, shutting down at the end if the script did not.
    pub fn run(mut self, lines: &[ScriptLine]) -> Result<ReplaySummary> {
        for line in lines {
            self.apply(line)?;
        }
        self.finish();

        let summary = ReplaySummary {
            steps: lines.len(),
            polls: self.polls,
            duration: self.clock.elapsed(),
            leaked_subscriptions: self.source.subscribed.len(),
        };
        tracing::debug!(?summary, "replay finished");
        Ok(summary)
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.correlator.shutdown(&mut self.source);
        self.finished = true;
    }

    fn document(&mut self, path: &str) -> Arc<ScriptedDocument> {
        self.documents
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(ScriptedDocument::new(path)))
            .clone()
    }

    fn document_ref(&mut self, path: &str) -> DocumentRef {
        self.document(path)
    }

    fn host_event(&mut self, step: &Step) -> Option<HostEvent> {
        let event = match step {
            Step::ApplicationInitialized => HostEvent::ApplicationInitialized,
            Step::DocumentOpening {
                path,
                document_type,
            } => HostEvent::DocumentOpening {
                path: path.clone(),
                document_type: *document_type,
            },
            Step::DocumentOpened { path } => {
                // Reopening replaces a closed document with a fresh one.
                if self
                    .documents
                    .get(path)
                    .is_some_and(|d| d.closed.load(Ordering::SeqCst))
                {
                    self.documents.remove(path);
                }
                self.host.activate(path);
                HostEvent::DocumentOpened {
                    document: self.document_ref(path),
                }
            }
            Step::DocumentSaving { path } => HostEvent::DocumentSaving {
                document: self.document_ref(path),
            },
            Step::DocumentSaved { path } => HostEvent::DocumentSaved {
                document: self.document_ref(path),
            },
            Step::DocumentSavingAs { path, target } => HostEvent::DocumentSavingAs {
                document: self.document_ref(path),
                path: target.clone(),
            },
            Step::DocumentSavedAs {
                path,
                original_path,
                master_file,
            } => HostEvent::DocumentSavedAs {
                document: self.document_ref(path),
                original_path: original_path.clone(),
                is_master_file: *master_file,
            },
            Step::DocumentSynchronizing {
                path,
                location,
                comments,
            } => HostEvent::DocumentSynchronizing {
                document: self.document_ref(path),
                location: location.clone(),
                comments: comments.clone(),
            },
            Step::DocumentSynchronized { path } => HostEvent::DocumentSynchronized {
                document: self.document_ref(path),
            },
            Step::DocumentPrinted { path, views } => {
                let document = self.document(path);
                for view in views {
                    if let Some(info) = view.info() {
                        document.insert(ElementId::new(view.id), info);
                    }
                }
                HostEvent::DocumentPrinted {
                    document,
                    printed_views: views.iter().map(|v| ElementId::new(v.id)).collect(),
                }
            }
            Step::DocumentChanged {
                path,
                added,
                modified,
                deleted,
            } => HostEvent::DocumentChanged {
                document: self.document_ref(path),
                added: element_ids(*added),
                modified: element_ids(*modified),
                deleted: element_ids(*deleted),
            },
            Step::FileImported { path, format, file } => HostEvent::FileImported {
                document: self.document_ref(path),
                format: format.clone(),
                path: file.clone(),
            },
            Step::FileExported { path, format, file } => HostEvent::FileExported {
                document: self.document_ref(path),
                format: format.clone(),
                path: file.clone(),
            },
            Step::FamilyLoaded {
                path,
                family_name,
                family_path,
                overrides,
            } => HostEvent::FamilyLoaded {
                document: self.document_ref(path),
                family_name: family_name.clone(),
                family_path: family_path.clone(),
                original_family_id: if *overrides {
                    ElementId::INVALID
                } else {
                    ElementId::new(1)
                },
            },
            Step::ViewActivated {
                path,
                view_name,
                previous,
            } => {
                self.host.activate(path);
                let previous_document = previous.as_deref().map(|p| self.document_ref(p));
                HostEvent::ViewActivated {
                    document: self.document_ref(path),
                    view_name: view_name.clone(),
                    previous_document,
                }
            }
            Step::UiAction { text, id } => HostEvent::UiActionExecuted {
                item: text.as_ref().map(|text| UiItem {
                    text: text.clone(),
                    id: id.clone(),
                }),
            },
            Step::Input
            | Step::Focus { .. }
            | Step::DocumentClosed { .. }
            | Step::Shutdown => return None,
        };
        Some(event)
    }
}

/// Sequential element ids `1..=count`.
fn element_ids(count: usize) -> Vec<ElementId> {
    (1..=count)
        .map(|i| ElementId::new(i64::try_from(i).unwrap_or(i64::MAX)))
        .collect()
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("elapsed", &self.clock.elapsed())
            .field("correlator", &self.correlator)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
