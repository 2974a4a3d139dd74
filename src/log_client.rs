//! Reconnecting client for the server's live log feed.
//!
//! [`LogClient`] keeps one [`StreamTransport`] connection alive at a time. When
//! that connection ends, for whatever reason, the client waits for the backoff
//! delay and opens a new one, forever, until [`LogClient::teardown`] is called.
//! Subscribers see a single uninterrupted stream of entries; entries the server
//! produced while the client was disconnected are simply missing.

use crate::backoff::{Backoff, BackoffConfig};
use crate::log_buffer::LogBuffer;
use crate::log_entry::LogEntry;
use crate::transport::{StreamTransport, TransportEvent};
use crate::types::ConnectionState;
use log::{debug, error, info, warn};
use std::cell::Cell;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

pub type SubscriptionId = u64;

type Callback = Arc<dyn Fn(&LogEntry) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: SubscriptionId,
    callbacks: Vec<(SubscriptionId, Callback)>,
    torn_down: bool,
}

thread_local! {
    // address of the `Shared` whose subscribers are running on this thread
    static DISPATCHING: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as delivering for one client until dropped.
struct DispatchGuard {
    previous: usize,
}

impl DispatchGuard {
    fn enter(shared: &Shared) -> Self {
        let previous = DISPATCHING.with(|current| current.replace(shared.address()));
        Self { previous }
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCHING.with(|current| current.set(self.previous));
    }
}

/// State shared between the client handle and its connection task.
///
/// Delivery, state changes and teardown all go through the registry lock, so
/// once `teardown` has taken it nothing else can be observed.
struct Shared {
    registry: Mutex<Registry>,
    state: watch::Sender<ConnectionState>,
}

impl Shared {
    fn address(&self) -> usize {
        self as *const Shared as usize
    }

    /// Panics when called from one of this client's own subscribers, which
    /// would otherwise deadlock on the lock the delivery is holding.
    fn registry(&self) -> MutexGuard<'_, Registry> {
        let reentered = DISPATCHING.with(|current| current.get() == self.address());
        assert!(
            !reentered,
            "LogClient used from inside one of its own subscriber callbacks"
        );
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) -> bool {
        let registry = self.registry();
        if registry.torn_down {
            return false;
        }
        self.state.send_replace(state);
        debug!("Log feed state: {}", state);
        true
    }

    fn dispatch(&self, entry: &LogEntry) -> bool {
        let registry = self.registry();
        if registry.torn_down {
            return false;
        }
        let _dispatching = DispatchGuard::enter(self);
        for (_, callback) in &registry.callbacks {
            callback(entry);
        }
        true
    }
}

pub struct LogClient {
    endpoint: String,
    transport: Arc<dyn StreamTransport>,
    backoff: BackoffConfig,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LogClient {
    pub fn new<T: StreamTransport>(
        endpoint: impl Into<String>,
        transport: T,
        backoff: BackoffConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            endpoint: endpoint.into(),
            transport: Arc::new(transport),
            backoff,
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::default()),
                state,
            }),
            task: Mutex::new(None),
        }
    }

    /// Register a callback for every decoded entry, in arrival order.
    ///
    /// Registering the same callback twice delivers every entry to it twice.
    /// Callbacks run while the client holds its subscriber lock. A callback
    /// that calls back into the same client (`subscribe`, `unsubscribe`,
    /// `start`, `teardown`) panics instead of deadlocking.
    pub fn subscribe<F>(&self, on_entry: F) -> SubscriptionId
    where
        F: Fn(&LogEntry) + Send + Sync + 'static,
    {
        let mut registry = self.shared.registry();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.callbacks.push((id, Arc::new(on_entry)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.shared.registry();
        let before = registry.callbacks.len();
        registry.callbacks.retain(|(existing, _)| *existing != id);
        registry.callbacks.len() != before
    }

    /// Append every entry to `buffer`.
    pub fn attach_buffer(&self, buffer: &LogBuffer) -> SubscriptionId {
        let buffer = buffer.clone();
        self.subscribe(move |entry| buffer.append(entry.clone()))
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Spawn the connection task. Must be called from within a tokio runtime.
    /// Calling it again while running, or after teardown, does nothing.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() || self.shared.registry().torn_down {
            return;
        }

        info!("Starting log feed client for {}", self.endpoint);
        *task = Some(tokio::spawn(run(
            Arc::clone(&self.shared),
            Arc::clone(&self.transport),
            self.endpoint.clone(),
            self.backoff.clone(),
        )));
    }

    /// Stop reconnecting, close the live connection and drop all subscribers.
    ///
    /// No subscriber is invoked after this returns.
    pub fn teardown(&self) {
        {
            let mut registry = self.shared.registry();
            if registry.torn_down {
                return;
            }
            registry.torn_down = true;
            registry.callbacks.clear();
            self.shared.state.send_replace(ConnectionState::Closed);
        }

        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        info!("Log feed client for {} torn down", self.endpoint);
    }
}

impl Drop for LogClient {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn run(
    shared: Arc<Shared>,
    transport: Arc<dyn StreamTransport>,
    endpoint: String,
    backoff: BackoffConfig,
) {
    let mut backoff = Backoff::new(&backoff);

    loop {
        if !shared.set_state(ConnectionState::Connecting) {
            return;
        }

        let mut handle = transport.open(&endpoint);
        let mut received = 0u64;

        while let Some(event) = handle.next().await {
            let live = match event {
                TransportEvent::Open => {
                    info!("Connected to log feed: {}", endpoint);
                    backoff.reset();
                    shared.set_state(ConnectionState::Open)
                }
                TransportEvent::Message(entry) => {
                    received += 1;
                    shared.dispatch(&entry)
                }
                TransportEvent::Error(e) => {
                    error!("Log feed connection error: {}", e);
                    shared.set_state(ConnectionState::Errored)
                }
                TransportEvent::Closed => {
                    info!("Log feed closed by server");
                    shared.set_state(ConnectionState::Closed)
                }
            };
            if !live {
                return;
            }
        }
        drop(handle);

        let delay = backoff.next_delay();
        warn!(
            "Log feed ended after {} entries, reconnecting in {:?}",
            received, delay
        );
        sleep(delay).await;
    }
}
