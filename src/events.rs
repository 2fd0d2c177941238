//! The event subscription registry (spec §4.4): tracks listeners per
//! event kind, decodes 6xx batches into payloads, and isolates listener
//! failures from the reader loop.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::FutureExt as _;
use tracing::warn;

use crate::collab::DebugSink;
use crate::wire::ReplyBatch;

/// The mandatory event set the library always subscribes to, regardless
/// of what the host has subscribed to (spec §3 "Event subscription").
pub const MANDATORY_EVENTS: &[&str] = &["NOTICE", "CONF_CHANGED"];

/// A decoded asynchronous event (spec §4.4 "Delivery").
#[derive(Clone, Debug)]
pub struct DecodedEvent {
    /// The event kind, e.g. `"NOTICE"` or `"CONF_CHANGED"`.
    pub kind: String,
    /// The decoded payload.
    pub payload: EventPayload,
}

/// The shape of an event's payload, per spec §4.4.
#[derive(Clone, Debug)]
pub enum EventPayload {
    /// A single-line event: the text following `"<kind> "` on its one line,
    /// or the data-block body for a `+`-introduced single-value event.
    Line(String),
    /// A multi-`-`-line event (e.g. `CONF_CHANGED`): each interior line's
    /// value, in wire order, with the terminal `OK` framing line dropped.
    Lines(Vec<String>),
}

/// Decode one asynchronous batch into a [`DecodedEvent`] (spec §4.4).
pub(crate) fn decode_event(batch: &ReplyBatch) -> Option<DecodedEvent> {
    let first = batch.lines.first()?;
    let (kind, rest) = match first.payload.split_once(' ') {
        Some((k, r)) => (k.to_string(), r.to_string()),
        None => (first.payload.clone(), String::new()),
    };

    let payload = if batch.lines.len() == 1 {
        // Single physical line: either plain text after the kind, or (for a
        // `+`-introduced single-value event) the accumulated data block.
        match &first.block {
            Some(block) => EventPayload::Line(block.clone()),
            None => EventPayload::Line(rest),
        }
    } else {
        EventPayload::Lines(batch.leading_values().into_iter().skip(1).map(String::from).collect())
    };

    Some(DecodedEvent { kind, payload })
}

/// One subscriber's callback. Returning `Err` (or panicking) is contained:
/// it is routed to the debug sink and never aborts delivery to the other
/// listeners, and never propagates to the reader loop (spec §4.4
/// "Isolation", §7).
pub type Listener = Arc<dyn Fn(&DecodedEvent) -> std::result::Result<(), String> + Send + Sync>;

/// An opaque handle returned by [`EventRegistry::subscribe`], used to
/// [`EventRegistry::unsubscribe`] later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct Entry {
    id: u64,
    kind: String,
    listener: Listener,
}

struct Inner {
    entries: Vec<Entry>,
    next_id: u64,
}

/// Maintains the active `{kind -> listeners}` map and dispatches decoded
/// events to it.
pub struct EventRegistry {
    inner: Mutex<Inner>,
    on_kinds_changed: Mutex<Option<Box<dyn Fn(HashSet<String>) + Send + Sync>>>,
    debug_sink: Mutex<Option<Arc<dyn DebugSink>>>,
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRegistry {
    /// A fresh, empty registry.
    pub fn new() -> Self {
        EventRegistry {
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                next_id: 0,
            }),
            on_kinds_changed: Mutex::new(None),
            debug_sink: Mutex::new(None),
        }
    }

    /// Install the [`DebugSink`] contained listener failures (error return
    /// or panic) are routed to, in place of the default `tracing::warn!`
    /// (spec §4.7 "registers itself as a debug sink").
    pub(crate) fn set_debug_sink(&self, sink: Arc<dyn DebugSink>) {
        *self.debug_sink.lock().unwrap() = Some(sink);
    }

    /// Install the callback invoked whenever the set of active kinds
    /// changes, so the owning connection can re-issue `SETEVENTS` (spec
    /// §3 "Event subscription" invariant). Connection-internal; not part
    /// of the public API.
    pub(crate) fn set_on_kinds_changed(&self, f: impl Fn(HashSet<String>) + Send + Sync + 'static) {
        *self.on_kinds_changed.lock().unwrap() = Some(Box::new(f));
    }

    /// Register `listener` for `kind`, returning a handle to unsubscribe it.
    pub fn subscribe(&self, kind: impl Into<String>, listener: Listener) -> SubscriptionHandle {
        let kind = kind.into();
        let id;
        {
            let mut inner = self.inner.lock().unwrap();
            id = inner.next_id;
            inner.next_id += 1;
            inner.entries.push(Entry { id, kind, listener });
        }
        self.notify_kinds_changed();
        SubscriptionHandle(id)
    }

    /// Remove a single subscription.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.entries.retain(|e| e.id != handle.0);
        }
        self.notify_kinds_changed();
    }

    /// Remove every listener subscribed to `kind`.
    pub fn unsubscribe_all(&self, kind: &str) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.entries.retain(|e| e.kind != kind);
        }
        self.notify_kinds_changed();
    }

    /// Remove every listener for every kind.
    pub fn clear(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.entries.clear();
        }
        self.notify_kinds_changed();
    }

    /// The set of kinds with at least one active listener, unioned with
    /// the mandatory set (spec §3 invariant).
    pub fn active_kinds(&self) -> HashSet<String> {
        let mut kinds: HashSet<String> = self
            .inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .map(|e| e.kind.clone())
            .collect();
        kinds.extend(MANDATORY_EVENTS.iter().map(|s| s.to_string()));
        kinds
    }

    fn notify_kinds_changed(&self) {
        if let Some(cb) = self.on_kinds_changed.lock().unwrap().as_ref() {
            cb(self.active_kinds());
        }
    }

    /// Deliver one asynchronous batch to every listener subscribed to its
    /// kind. Each invocation runs outside of the registry's lock, and a
    /// failing listener (error return or panic) is reported to the
    /// registered debug sink (or `tracing::warn!` if none is installed)
    /// without affecting the others (spec §4.4, §8.3).
    pub(crate) async fn deliver(&self, batch: ReplyBatch) {
        let Some(event) = decode_event(&batch) else {
            warn!("received an event batch that could not be decoded");
            return;
        };
        let listeners: Vec<Listener> = self
            .inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .filter(|e| e.kind == event.kind)
            .map(|e| e.listener.clone())
            .collect();
        let sink = self.debug_sink.lock().unwrap().clone();

        for listener in listeners {
            let event = event.clone();
            let sink = sink.clone();
            // One notifier task per listener invocation, so a slow or
            // panicking listener cannot stall the reader (spec §5
            // "notifier tasks").
            tokio::spawn(async move {
                let event_for_report = event.clone();
                let outcome = AssertUnwindSafe(async { listener(&event) })
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(msg)) => report_contained_failure(&sink, &event_for_report.kind, &msg),
                    Err(_) => report_contained_failure(&sink, &event_for_report.kind, "listener panicked"),
                }
            });
        }
    }
}

/// Route one contained listener failure to the registered [`DebugSink`],
/// falling back to `tracing::warn!` when none has been installed (spec
/// §4.4 "Isolation", §7).
fn report_contained_failure(sink: &Option<Arc<dyn DebugSink>>, kind: &str, detail: &str) {
    match sink {
        Some(sink) => sink.record(kind, detail),
        None => warn!(kind = %kind, detail = %detail, "event listener failed"),
    }
}
