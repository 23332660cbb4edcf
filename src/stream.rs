//! The streaming updates client.

use std::collections::{BTreeMap, VecDeque};
use std::thread;

use serde::Serialize;
use tracing::{debug, trace};

use crate::cache::KeyCache;
use crate::error::{Result, StreamError};
use crate::spec::SubscriptionSpec;
use crate::transport::{Transport, TransportEvent};
use crate::wire::{ProjectMsg, ProjectsDeleted, SubscribeBlock, SubscribeFrame, SyncFrame};

/// Marks the boundaries of a subscription's catch-up phase.
///
/// `complete == false` means catch-up has started; `complete == true` means
/// the local view is current as of that subscription. The `sync_id` is
/// whatever the caller passed to [`Stream::subscribe`], echoed back
/// unchanged, including across internal reconnects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Sync {
    pub sync_id: Option<String>,
    pub complete: bool,
}

impl Sync {
    pub fn new(sync_id: Option<String>, complete: bool) -> Self {
        Self { sync_id, complete }
    }
}

/// One consumer-visible event pulled from a [`Stream`].
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Sync(Sync),
    Project(ProjectMsg),
    ProjectsDeleted(ProjectsDeleted),
}

/// A client to the streaming updates system featuring auto-reconnects.
///
/// The stream can be iterated to read events related to subscriptions. A
/// subscription is set with [`subscribe`](Stream::subscribe); there is only
/// ever one active subscription at a time. Each call to `subscribe` causes
/// the stream to yield a `Sync` with `complete == false`, followed by any
/// number of subscription-related records, then a `Sync` with
/// `complete == true`. The second `Sync` indicates the client has loaded all
/// state from the server, and further records arrive as the server publishes
/// them, unless another `subscribe` call has been made.
///
/// If another `subscribe` call has been made, the stream ceases to yield
/// records from the first subscription and begins with the start `Sync` of
/// the second, which then continues in the manner of the first:
///
/// 1. Send the subscription frame for A.
/// 2. Ignore all records until the sync-start for A.
/// 3. Collect offline records for A, until the sync-end for A.
/// 4. Collect online records for A until another `subscribe` call is made.
/// 5. Start from step 1 with the new subscription.
///
/// Everything runs inside the caller's pulls: connecting, sending subscribe
/// frames, reading, cache mutation, and backoff sleeps all happen within
/// [`next_event`](Stream::next_event). There are no background threads.
pub struct Stream<T: Transport> {
    transport: T,
    /// In-memory cache of project keys: just enough to reconnect with an
    /// accurate resync cursor. Never reset while the stream lives.
    projects: KeyCache,
    /// Whether a connection attempt is live (its events not yet exhausted).
    connected: bool,
    closed: bool,
    /// Parsed events collected but not yet passed out.
    pending: VecDeque<Event>,

    /// Is the connection in the ready state?
    ready: bool,
    /// Last sync_id sent on this connection.
    sync_sent: Option<String>,
    /// Last sync_id whose sync-start arrived on this connection.
    sync_started: Option<String>,
    /// Last sync_id whose sync-end arrived on this connection.
    sync_complete: Option<String>,
    /// How many subscribe frames this stream has ever sent; mints sync ids.
    num_syncs: u64,

    /// Subscription specs requested but not yet sent.
    specs: VecDeque<(Option<String>, SubscriptionSpec)>,
    /// The most recently sent spec, resent verbatim after reconnects.
    prev_spec: Option<SubscriptionSpec>,
    /// The sync_id the caller supplied for the currently-active subscribe.
    user_sync_id: Option<String>,
    // A single subscription may see several sync-start and sync-end frames
    // due to reconnects; the caller is shown each marker at most once.
    user_sync_start_sent: bool,
    user_sync_end_sent: bool,

    retries: usize,
    last_conn_failure: String,
}

impl<T: Transport> Stream<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            projects: KeyCache::new(),
            connected: false,
            closed: false,
            pending: VecDeque::new(),
            ready: false,
            sync_sent: None,
            sync_started: None,
            sync_complete: None,
            num_syncs: 0,
            specs: VecDeque::new(),
            prev_spec: None,
            user_sync_id: None,
            user_sync_start_sent: false,
            user_sync_end_sent: false,
            retries: 0,
            last_conn_failure: String::new(),
        }
    }

    /// Request a new subscription, superseding any active one.
    ///
    /// The spec is captured now, but `since`/`known` cursors are filled in
    /// from the key caches at the moment the frame is sent. If the
    /// connection is ready and no earlier subscription is mid-catch-up, the
    /// frame goes out immediately; otherwise it is sent as soon as the
    /// connection becomes ready or the prior catch-up completes.
    ///
    /// `sync_id` is an opaque caller-chosen tag echoed back on the
    /// subscription's `Sync` markers.
    pub fn subscribe(
        &mut self,
        sync_id: Option<String>,
        spec: SubscriptionSpec,
    ) -> Result<&mut Self> {
        self.specs.push_back((sync_id, spec));
        // Adding a spec can trigger sending a subscription.
        self.advance_subscription()?;
        Ok(self)
    }

    /// Pull the next event, blocking as needed.
    ///
    /// Returns `Ok(None)` once [`close`](Stream::close) has been called and
    /// buffered events are drained. Fails with
    /// [`StreamError::NotSubscribed`] if no `subscribe` call was ever made,
    /// and with [`StreamError::ConnectionFailed`] when the reconnect
    /// schedule is exhausted.
    pub fn next_event(&mut self) -> Result<Option<Event>> {
        if self.closed {
            // Hand out whatever was already parsed, then end-of-stream.
            return Ok(self.pending.pop_front());
        }
        if self.prev_spec.is_none() && self.specs.is_empty() {
            return Err(StreamError::NotSubscribed);
        }
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if !self.connected {
                debug!("opening streaming connection");
                self.transport.connect();
                self.connected = true;
                self.sync_sent = None;
                self.sync_started = None;
                self.sync_complete = None;
            }
            while let Some(event) = self.transport.next_event() {
                match event {
                    TransportEvent::ConnectFailed(reason)
                    | TransportEvent::Rejected(reason)
                    | TransportEvent::ProtocolError(reason) => {
                        debug!(%reason, "connection failed");
                        self.ready = false;
                        self.last_conn_failure = reason;
                    }
                    TransportEvent::Connecting | TransportEvent::Connected => {}
                    TransportEvent::Ready => {
                        self.ready = true;
                        self.retries = 0;
                        // A fresh connection has sent no subscription yet;
                        // becoming ready triggers sending one.
                        self.advance_subscription()?;
                    }
                    TransportEvent::Text(text) => {
                        if let Some(event) = self.handle_text(&text)? {
                            return Ok(Some(event));
                        }
                    }
                    TransportEvent::Closing => {
                        // server is done writing, but we may still write
                    }
                    TransportEvent::Closed | TransportEvent::Disconnected => {
                        self.ready = false;
                    }
                }
            }
            // Event stream exhausted: the connection is spent. Back off,
            // then reconnect with freshly computed cursors.
            self.connected = false;
            self.backoff()?;
        }
    }

    /// Tear down the connection and make further pulls return end-of-stream.
    ///
    /// Idempotent. Remaining transport events are drained synchronously.
    pub fn close(&mut self) {
        self.closed = true;
        if !self.connected {
            return;
        }
        self.transport.close();
        while self.transport.next_event().is_some() {}
        self.connected = false;
    }

    fn backoff(&mut self) -> Result<()> {
        let Some(delay) = self.transport.backoff(self.retries) else {
            return Err(StreamError::ConnectionFailed(self.last_conn_failure.clone()));
        };
        self.retries += 1;
        debug!(retries = self.retries, ?delay, "reconnecting after backoff");
        thread::sleep(delay);
        Ok(())
    }

    /// Send the next subscribe frame if the connection state allows it:
    /// either nothing has been sent on this connection yet, or the
    /// previously sent subscription has completed its catch-up and another
    /// spec is queued.
    fn advance_subscription(&mut self) -> Result<()> {
        if !self.ready {
            return Ok(());
        }

        if self.sync_sent.is_none() {
            // Resend the current spec, or pick the first requested one.
            let spec = match self.prev_spec.clone() {
                Some(prev) => prev,
                None => match self.specs.pop_front() {
                    Some((sync_id, spec)) => {
                        self.user_sync_id = sync_id;
                        self.user_sync_start_sent = false;
                        self.user_sync_end_sent = false;
                        spec
                    }
                    None => return Ok(()),
                },
            };
            return self.send_spec(spec);
        }

        if self.sync_complete.is_some() && self.sync_complete == self.sync_sent {
            if let Some((sync_id, spec)) = self.specs.pop_front() {
                self.user_sync_id = sync_id;
                self.user_sync_start_sent = false;
                self.user_sync_end_sent = false;
                return self.send_spec(spec);
            }
        }
        Ok(())
    }

    fn send_spec(&mut self, spec: SubscriptionSpec) -> Result<()> {
        self.num_syncs += 1;
        let sync_id = self.num_syncs.to_string();

        // Cursors are computed now, from the caches as they stand at send
        // time. Frames still in flight for a superseded subscription are
        // discarded on arrival, so they cannot move the caches after this
        // point; the frames for this subscription are tailored to exactly
        // this cache state.
        let mut subscribe = SubscribeBlock::default();
        if let Some(projects) = &spec.projects {
            subscribe.projects = Some(projects.to_wire(self.projects.maxseq()));
        }

        let mut known = BTreeMap::new();
        let known_projects = self.projects.known();
        if !known_projects.is_empty() {
            known.insert("projects".to_string(), known_projects);
        }

        let frame = SubscribeFrame {
            sync_id: sync_id.clone(),
            known,
            subscribe,
        };
        debug!(%sync_id, "sending subscribe frame");
        self.transport.send_text(&serde_json::to_string(&frame)?)?;
        self.sync_sent = Some(sync_id);
        self.prev_spec = Some(spec);
        Ok(())
    }

    fn handle_text(&mut self, text: &str) -> Result<Option<Event>> {
        let msg: serde_json::Value = serde_json::from_str(text)?;
        let Some(obj) = msg.as_object() else {
            return Err(StreamError::Protocol(format!(
                "expected an object frame, got: {text}"
            )));
        };

        // Sync markers first.
        if obj.contains_key("sync_id") {
            let frame: SyncFrame = serde_json::from_value(msg.clone())?;
            if !frame.complete {
                self.sync_started = Some(frame.sync_id);
                // Forward the start marker unless a reconnect already did.
                if !self.user_sync_start_sent {
                    self.user_sync_start_sent = true;
                    return Ok(Some(Event::Sync(Sync::new(self.user_sync_id.clone(), false))));
                }
            } else {
                self.sync_complete = Some(frame.sync_id);
                // Capture the finished subscription's bookkeeping before
                // advancing replaces it with the next spec's.
                let finished_sync_id = self.user_sync_id.clone();
                let end_pending = !self.user_sync_end_sent;
                self.user_sync_end_sent = true;
                // Completion can unblock sending the next subscription.
                self.advance_subscription()?;
                if end_pending {
                    return Ok(Some(Event::Sync(Sync::new(finished_sync_id, true))));
                }
            }
            return Ok(None);
        }

        // Records that arrive between sending a new subscription and its
        // sync-start belong to a superseded subscription; applying them
        // would corrupt the cursors the new subscribe frame was computed
        // from.
        let in_sync = matches!(
            (&self.sync_sent, &self.sync_started),
            (Some(sent), Some(started)) if sent == started
        );
        if !in_sync {
            trace!("discarding record for superseded subscription");
            return Ok(None);
        }

        for (key, value) in obj {
            match key.as_str() {
                "project" => {
                    let record: ProjectMsg = serde_json::from_value(value.clone())?;
                    self.projects.upsert(record.id, record.seq);
                    self.pending.push_back(Event::Project(record));
                }
                "projects_deleted" => {
                    let deleted = value.as_str().ok_or_else(|| {
                        StreamError::Protocol(format!(
                            "projects_deleted must be a string, got: {value}"
                        ))
                    })?;
                    // ignore pointless deletion messages
                    if !deleted.is_empty() {
                        self.projects.delete_msg(deleted)?;
                        self.pending
                            .push_back(Event::ProjectsDeleted(ProjectsDeleted(
                                deleted.to_string(),
                            )));
                    }
                }
                other => {
                    return Err(StreamError::Protocol(format!(
                        "unhandled message key {other:?} in {text}"
                    )));
                }
            }
        }
        Ok(self.pending.pop_front())
    }
}

impl<T: Transport> Iterator for Stream<T> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

impl<T: Transport> Drop for Stream<T> {
    fn drop(&mut self) {
        self.close();
    }
}
