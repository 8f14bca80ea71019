//! Dispatch pipeline: per-connection bounded buffers drained by one delivery
//! thread per session.
//!
//! ```text
//! conn task ──► ConnectionSink ──► bounded channel ─┐
//! conn task ──► ConnectionSink ──► bounded channel ─┼─► dispatch thread ──► on_msg
//! poll task ──► ConnectionSink ──► bounded channel ─┘
//! ```
//!
//! Producers never block: when a buffer is full the oldest queued message is
//! evicted and counted as dropped. The consumer callback runs on a dedicated
//! OS thread outside the tokio runtime, so a slow consumer cannot stall
//! network reads or pings, and a consumer that never returns cannot hold the
//! runtime open at shutdown. Calls to the callback are serialized; order is
//! preserved within each buffer.

use std::sync::Arc;
use std::time::Duration;

use crawl_core::Message;
use crossbeam_channel::{Receiver, Select, Sender, TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::stats::Counters;

/// Consumer callback. Called from a single thread, never concurrently.
pub type OnMessage = Box<dyn FnMut(Message) + Send>;

/// Producer side of one connection's buffer.
pub struct ConnectionSink {
    label: String,
    tx: Sender<Message>,
    /// Second handle on the buffer, used only to evict the oldest entry.
    evict: Receiver<Message>,
    counters: Arc<Counters>,
}

impl ConnectionSink {
    /// Enqueue without blocking, evicting the oldest message if full.
    pub fn push(&self, msg: Message) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => {
                if self.evict.try_recv().is_ok() {
                    self.counters.record_dropped();
                }
                if self.tx.try_send(msg).is_err() {
                    self.counters.record_dropped();
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("[{}] dispatcher gone, message discarded", self.label);
            }
        }
    }

    /// Messages currently queued for this connection.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// Cloneable handle for creating sinks. The dispatch thread exits once every
/// handle and every sink is dropped and all buffers are drained.
#[derive(Clone)]
pub struct DispatchHandle {
    register: Sender<Receiver<Message>>,
    capacity: usize,
    counters: Arc<Counters>,
}

impl DispatchHandle {
    /// New buffer for one connection.
    pub fn sink(&self, label: &str) -> ConnectionSink {
        let (tx, rx) = crossbeam_channel::bounded(self.capacity);
        let evict = rx.clone();
        if self.register.send(rx).is_err() {
            debug!("[{label}] dispatcher already stopped");
        }
        ConnectionSink { label: label.to_string(), tx, evict, counters: self.counters.clone() }
    }
}

/// Completion signal of a session's delivery thread.
pub struct Dispatcher {
    label: String,
    done: oneshot::Receiver<()>,
}

impl Dispatcher {
    /// Wait up to `grace` for the thread to drain its buffers and exit.
    /// Returns `false` if it is still inside the consumer callback; the
    /// thread is then left detached.
    pub async fn join(self, grace: Duration) -> bool {
        match tokio::time::timeout(grace, self.done).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                warn!("[{}] dispatch thread ended without draining (consumer panicked?)", self.label);
                true
            }
            Err(_) => false,
        }
    }
}

/// Spawn the delivery thread for one session.
pub fn spawn(
    label: &str,
    capacity: usize,
    counters: Arc<Counters>,
    on_msg: OnMessage,
) -> std::io::Result<(DispatchHandle, Dispatcher)> {
    let (register, registrations) = crossbeam_channel::unbounded();
    let handle = DispatchHandle { register, capacity: capacity.max(1), counters: counters.clone() };
    let (done_tx, done) = oneshot::channel();
    let thread_label = label.to_string();
    std::thread::Builder::new().name(format!("dispatch-{label}")).spawn(move || {
        run_dispatch_loop(&thread_label, registrations, on_msg, &counters);
        let _ = done_tx.send(());
    })?;
    Ok((handle, Dispatcher { label: label.to_string(), done }))
}

enum Event {
    Registration(Option<Receiver<Message>>),
    Data(usize, Option<Message>),
}

/// Deliver messages from every registered buffer until all producers are
/// gone and the buffers are empty.
pub fn run_dispatch_loop(
    label: &str,
    registrations: Receiver<Receiver<Message>>,
    mut on_msg: OnMessage,
    counters: &Counters,
) {
    let mut sources: Vec<Receiver<Message>> = Vec::new();
    let mut registering = true;

    info!("[{label}] dispatch loop started");

    while registering || !sources.is_empty() {
        let event = {
            let mut sel = Select::new();
            if registering {
                sel.recv(&registrations);
            }
            for rx in &sources {
                sel.recv(rx);
            }
            let offset = usize::from(registering);

            let op = sel.select();
            let index = op.index();
            if registering && index == 0 {
                Event::Registration(op.recv(&registrations).ok())
            } else {
                let source = index - offset;
                Event::Data(source, op.recv(&sources[source]).ok())
            }
        };

        match event {
            Event::Registration(Some(rx)) => sources.push(rx),
            Event::Registration(None) => registering = false,
            Event::Data(_, Some(msg)) => {
                on_msg(msg);
                counters.record_delivered();
            }
            Event::Data(source, None) => {
                sources.swap_remove(source);
            }
        }
    }

    info!("[{label}] dispatch loop exited");
}
