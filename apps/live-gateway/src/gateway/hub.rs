//! The hub: one control loop that owns the connection registry.
//!
//! Every registry mutation and every fan-out decision happens inside
//! [`Hub::run`]. Connection tasks, the room grant relay, and HTTP routes only
//! talk to it through a cloneable [`HubHandle`].

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::auth::Identity;
use crate::error::HubClosed;

use super::events::Envelope;
use super::registry::{Connection, Member, Registry};

/// Capacity of the broadcast queue. Senders wait when it is full.
const BROADCAST_QUEUE_CAPACITY: usize = 1024;

struct Registration {
    connection: Connection,
    ack: oneshot::Sender<()>,
}

/// Members resolved for the room grant relay. Carries no queue handles, so
/// holding a `Lookup` never keeps an unregistered connection's queue open.
#[derive(Debug, Default)]
pub struct Lookup {
    /// The requesting connection, if still registered.
    pub requester: Option<Member>,
    /// Other registered connections whose identity was asked for.
    pub recipients: Vec<Member>,
}

enum Control {
    Lookup {
        requester: String,
        recipients: Vec<Identity>,
        reply: oneshot::Sender<Lookup>,
    },
    Connection {
        connection_id: String,
        reply: oneshot::Sender<Option<Connection>>,
    },
    Members {
        reply: oneshot::Sender<Vec<Member>>,
    },
    Shutdown {
        reply: oneshot::Sender<usize>,
    },
}

pub struct Hub {
    registry: Registry,
    register_rx: mpsc::UnboundedReceiver<Registration>,
    unregister_rx: mpsc::UnboundedReceiver<String>,
    broadcast_rx: mpsc::Receiver<Envelope>,
    control_rx: mpsc::UnboundedReceiver<Control>,
}

/// Cloneable entry point into the hub. Store in `AppState`.
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::UnboundedSender<Registration>,
    unregister_tx: mpsc::UnboundedSender<String>,
    broadcast_tx: mpsc::Sender<Envelope>,
    control_tx: mpsc::UnboundedSender<Control>,
}

impl Hub {
    pub fn new() -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_QUEUE_CAPACITY);
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let hub = Self {
            registry: Registry::new(),
            register_rx,
            unregister_rx,
            broadcast_rx,
            control_rx,
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            control_tx,
        };
        (hub, handle)
    }

    /// Run the control loop until `shutdown` is requested or every handle
    /// has been dropped. Whichever queue is ready is serviced; no queue has
    /// priority over another.
    pub async fn run(mut self) {
        tracing::info!("hub started");

        loop {
            tokio::select! {
                Some(registration) = self.register_rx.recv() => self.register(registration),
                Some(connection_id) = self.unregister_rx.recv() => self.unregister(&connection_id),
                Some(envelope) = self.broadcast_rx.recv() => self.broadcast(envelope),
                Some(control) = self.control_rx.recv() => {
                    if !self.control(control) {
                        break;
                    }
                }
                else => break,
            }
        }

        let closed = self.registry.clear();
        tracing::info!(closed, "hub stopped");
    }

    fn register(&mut self, registration: Registration) {
        let Registration { connection, ack } = registration;
        let connection_id = connection.id.clone();
        let identity = connection.identity;

        if self.registry.insert(connection) {
            tracing::debug!(
                %connection_id,
                user_id = identity.user_id,
                role = %identity.role,
                total = self.registry.len(),
                "connection registered"
            );
        } else {
            tracing::warn!(%connection_id, "duplicate connection id ignored");
        }
        let _ = ack.send(());
    }

    fn unregister(&mut self, connection_id: &str) {
        // Dropping the removed entry closes its outbound queue.
        if self.registry.remove(connection_id).is_some() {
            tracing::debug!(
                %connection_id,
                total = self.registry.len(),
                "connection unregistered"
            );
        }
    }

    fn broadcast(&mut self, envelope: Envelope) {
        let mut delivered = 0usize;

        for connection_id in self.registry.matching(&envelope.recipients) {
            let Some(connection) = self.registry.get(&connection_id) else {
                continue;
            };
            let identity = connection.identity;

            match connection.outbound.try_send(envelope.payload.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        %connection_id,
                        user_id = identity.user_id,
                        "outbound queue full, evicting slow connection"
                    );
                    self.registry.remove(&connection_id);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(%connection_id, "outbound queue closed, evicting");
                    self.registry.remove(&connection_id);
                }
            }
        }

        tracing::trace!(
            kind = ?envelope.kind,
            recipients = envelope.recipients.len(),
            delivered,
            "broadcast fanned out"
        );
    }

    /// Returns `false` when the loop should stop.
    fn control(&mut self, control: Control) -> bool {
        match control {
            Control::Lookup {
                requester,
                recipients,
                reply,
            } => {
                let lookup = Lookup {
                    requester: self.registry.get(&requester).map(Member::from),
                    recipients: self
                        .registry
                        .matching(&recipients)
                        .into_iter()
                        .filter(|id| *id != requester)
                        .filter_map(|id| self.registry.get(&id).map(Member::from))
                        .collect(),
                };
                let _ = reply.send(lookup);
                true
            }
            Control::Connection {
                connection_id,
                reply,
            } => {
                let _ = reply.send(self.registry.get(&connection_id).cloned());
                true
            }
            Control::Members { reply } => {
                let _ = reply.send(self.registry.members());
                true
            }
            Control::Shutdown { reply } => {
                let closed = self.registry.clear();
                tracing::info!(closed, "hub shutting down");
                let _ = reply.send(closed);
                false
            }
        }
    }
}

impl HubHandle {
    /// Register a connection and wait until the hub has inserted it, so a
    /// later `unregister` can never be processed first.
    pub async fn register(&self, connection: Connection) -> Result<(), HubClosed> {
        let (ack, done) = oneshot::channel();
        self.register_tx
            .send(Registration { connection, ack })
            .map_err(|_| HubClosed)?;
        done.await.map_err(|_| HubClosed)
    }

    /// Request removal of a connection. Unknown ids are ignored.
    pub fn unregister(&self, connection_id: &str) {
        let _ = self.unregister_tx.send(connection_id.to_string());
    }

    /// Queue an envelope for fan-out.
    pub async fn broadcast(&self, envelope: Envelope) -> Result<(), HubClosed> {
        self.broadcast_tx.send(envelope).await.map_err(|_| HubClosed)
    }

    /// Resolve the requester's own connection plus registered connections
    /// for `recipients`.
    pub async fn lookup(
        &self,
        requester: &str,
        recipients: Vec<Identity>,
    ) -> Result<Lookup, HubClosed> {
        let (reply, rx) = oneshot::channel();
        self.control_tx
            .send(Control::Lookup {
                requester: requester.to_string(),
                recipients,
                reply,
            })
            .map_err(|_| HubClosed)?;
        rx.await.map_err(|_| HubClosed)
    }

    /// A registered connection's handle, for a single direct push. Callers
    /// should drop it as soon as the push is done.
    pub async fn connection(&self, connection_id: &str) -> Result<Option<Connection>, HubClosed> {
        let (reply, rx) = oneshot::channel();
        self.control_tx
            .send(Control::Connection {
                connection_id: connection_id.to_string(),
                reply,
            })
            .map_err(|_| HubClosed)?;
        rx.await.map_err(|_| HubClosed)
    }

    /// Snapshot of the registry.
    pub async fn members(&self) -> Result<Vec<Member>, HubClosed> {
        let (reply, rx) = oneshot::channel();
        self.control_tx
            .send(Control::Members { reply })
            .map_err(|_| HubClosed)?;
        rx.await.map_err(|_| HubClosed)
    }

    /// Close every outbound queue and stop the hub. Returns the number of
    /// connections that were closed.
    pub async fn shutdown(&self) -> Result<usize, HubClosed> {
        let (reply, rx) = oneshot::channel();
        self.control_tx
            .send(Control::Shutdown { reply })
            .map_err(|_| HubClosed)?;
        rx.await.map_err(|_| HubClosed)
    }
}
