// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Room Runtime: subscribes to server-pushed rooms and drives their
//! init/join/emit/leave/delete lifecycle. A room is unbound until
//! `join`/`no_join` resolves its id, after which it lives in the
//! client's room registry until `leave`/`delete`.

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};

use async_trait::async_trait;
use rmpv::Value;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, warn};

use crate::{
    client::ClientInner,
    error::{ProtocolError, Result},
};

/// A room's identity before and after server-side resolution.
#[derive(Debug, Clone)]
pub enum RoomIdentity {
    /// A literal room id, or ThingsDB-style code that evaluates to one.
    Code(String),
    /// A resolved numeric room id.
    Id(i64),
}

impl From<i64> for RoomIdentity {
    fn from(id: i64) -> Self {
        RoomIdentity::Id(id)
    }
}
impl From<&str> for RoomIdentity {
    fn from(code: &str) -> Self {
        RoomIdentity::Code(code.to_string())
    }
}
impl From<String> for RoomIdentity {
    fn from(code: String) -> Self {
        RoomIdentity::Code(code)
    }
}

/// Lifecycle state of a room, tracked only for logging/invariant
/// bookkeeping; the authoritative state is "is it in the registry".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoomState {
    Unbound,
    Resolving,
    Joined,
    Active,
    Left,
    Deleted,
}

/// Callbacks a room implements for its own lifecycle and named events it
/// did not register a specific handler for.
#[async_trait]
pub trait RoomHandlers: Send + Sync {
    /// Called exactly once, right after the room is registered (before
    /// any push event can reach it).
    fn on_init(&self) {}
    /// Called on every `ON_ROOM_JOIN` push (first join and any rejoin).
    async fn on_join(&self) {}
    /// Called once when the room is left (locally or removed by the
    /// server) and the room has been dropped from the registry.
    fn on_leave(&self) {}
    /// Called once when the server deletes the room.
    fn on_delete(&self) {}
    /// Fallback for an `ON_ROOM_EMIT` event with no matching entry in the
    /// handler table.
    fn on_emit(&self, event: &str, args: &[Value]) {
        debug!("no emit handler registered for event `{event}` ({} args)", args.len());
    }
}

/// A handler registered for one named event, invoked with that event's
/// argument list. Declarative stand-in for the original's class-level
/// event decorator.
pub type HandlerFn = fn(&dyn RoomHandlers, &[Value]);

pub(crate) struct RoomInner {
    id: Mutex<RoomIdentity>,
    scope: Mutex<Option<String>>,
    client: Mutex<Option<Weak<ClientInner>>>,
    state: Mutex<RoomState>,
    first_join_gate: Mutex<Option<oneshot::Sender<()>>>,
    handlers: Arc<dyn RoomHandlers>,
    handler_table: HashMap<String, HandlerFn>,
}

/// Handle to a subscribed (or not-yet-joined) room.
#[derive(Clone)]
pub struct Room(pub(crate) Arc<RoomInner>);

pub struct RoomBuilder {
    id: RoomIdentity,
    scope: Option<String>,
    handlers: Arc<dyn RoomHandlers>,
    table: HashMap<String, HandlerFn>,
}

impl RoomBuilder {
    pub fn new(id: impl Into<RoomIdentity>, handlers: Arc<dyn RoomHandlers>) -> Self {
        Self {
            id: id.into(),
            scope: None,
            handlers,
            table: HashMap::new(),
        }
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn on_event(mut self, name: impl Into<String>, handler: HandlerFn) -> Self {
        self.table.insert(name.into(), handler);
        self
    }

    pub fn build(self) -> Room {
        Room(Arc::new(RoomInner {
            id: Mutex::new(self.id),
            scope: Mutex::new(self.scope),
            client: Mutex::new(None),
            state: Mutex::new(RoomState::Unbound),
            first_join_gate: Mutex::new(None),
            handlers: self.handlers,
            handler_table: self.table,
        }))
    }
}

impl Room {
    /// The resolved numeric id, if any.
    pub async fn id(&self) -> Option<i64> {
        match &*self.0.id.lock().await {
            RoomIdentity::Id(id) => Some(*id),
            RoomIdentity::Code(_) => None,
        }
    }

    async fn scope_or_default(&self, client: &ClientInner) -> String {
        if let Some(s) = self.0.scope.lock().await.clone() {
            return s;
        }
        let s = client.default_scope();
        *self.0.scope.lock().await = Some(s.clone());
        s
    }

    /// Resolves the room's id and subscribes to its push events. If
    /// `wait` is `Some`, blocks until the first `on_join` has run (or
    /// raised); `None` returns as soon as the JOIN response arrives.
    pub async fn join(
        &self,
        client: &Arc<ClientInner>,
        wait: Option<Duration>,
    ) -> Result<()> {
        let gate_rx = {
            let _guard = client.rooms_lock().lock().await;
            *self.0.state.lock().await = RoomState::Resolving;

            let scope = self.scope_or_default(client).await;

            let id = {
                let current = self.0.id.lock().await.clone();
                match current {
                    RoomIdentity::Id(id) => id,
                    RoomIdentity::Code(code) => {
                        let resolved = client.query(&code, Some(&scope), None, Value::Nil).await?;
                        let id = resolved.as_i64().ok_or_else(|| {
                            ProtocolError::TypeError(format!(
                                "expected room code `{code}` to evaluate to an integer \
                                 id, got {resolved:?}"
                            ))
                        })?;
                        *self.0.id.lock().await = RoomIdentity::Id(id);
                        id
                    },
                }
            };

            let ids = client.raw_join(&scope, &[id]).await?;
            if ids.first().copied().flatten().is_none() {
                return Err(ProtocolError::LookupError(format!(
                    "room with id {id} not found"
                )));
            }

            if let Some(prev) = client.register_room(id, self.clone()) {
                warn!(
                    "room id {id} was already registered; the previous handler is being \
                     replaced"
                );
                let _ = prev;
            }
            *self.0.client.lock().await = Some(Arc::downgrade(client));

            self.0.handlers.on_init();
            *self.0.state.lock().await = RoomState::Joined;

            if wait.is_some() {
                let (tx, rx) = oneshot::channel();
                *self.0.first_join_gate.lock().await = Some(tx);
                Some(rx)
            } else {
                None
            }
        };

        if let (Some(rx), Some(max_wait)) = (gate_rx, wait) {
            tokio::time::timeout(max_wait, rx)
                .await
                .map_err(|_| ProtocolError::Timeout(max_wait))?
                .map_err(|_| ProtocolError::Cancelled)?;
        }

        Ok(())
    }

    /// Resolves the room's id without subscribing; used for emit-only
    /// rooms that never receive push events.
    pub async fn no_join(&self, client: &Arc<ClientInner>) -> Result<()> {
        let _guard = client.rooms_lock().lock().await;
        let scope = self.scope_or_default(client).await;
        let current = self.0.id.lock().await.clone();
        if let RoomIdentity::Code(code) = current {
            let resolved = client.query(&code, Some(&scope), None, Value::Nil).await?;
            let id = resolved.as_i64().ok_or_else(|| {
                ProtocolError::TypeError(format!(
                    "expected room code `{code}` to evaluate to an integer id, got \
                     {resolved:?}"
                ))
            })?;
            *self.0.id.lock().await = RoomIdentity::Id(id);
        }
        Ok(())
    }

    pub async fn leave(&self) -> Result<()> {
        let id = self.id().await.ok_or_else(|| {
            ProtocolError::TypeError("room id is not resolved; join() was never called".into())
        })?;
        let client = self.client_handle().await?;
        let scope = self.0.scope.lock().await.clone().unwrap_or_default();
        let ids = client.raw_leave(&scope, &[id]).await?;
        if ids.first().copied().flatten().is_none() {
            return Err(ProtocolError::LookupError(format!(
                "room id {id} is not found (anymore)"
            )));
        }
        Ok(())
    }

    pub async fn emit(&self, event: &str, args: Vec<Value>) -> Result<()> {
        let id = self.id().await.ok_or_else(|| {
            ProtocolError::TypeError("room id is not resolved; join() was never called".into())
        })?;
        let client = self.client_handle().await?;
        let scope = self.0.scope.lock().await.clone().unwrap_or_default();
        client.raw_emit(&scope, id, event, args).await
    }

    async fn client_handle(&self) -> Result<Arc<ClientInner>> {
        self.0
            .client
            .lock()
            .await
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(ProtocolError::NotConnected)
    }

    /// Dispatches one push event addressed to this room. Called by the
    /// event router under the client's rooms lock.
    pub(crate) async fn handle_event(&self, tp: crate::wire::Proto, data: Value) {
        use crate::wire::Proto;
        match tp {
            Proto::OnRoomJoin => {
                *self.0.state.lock().await = RoomState::Active;
                let gate = self.0.first_join_gate.lock().await.take();
                let handlers = Arc::clone(&self.0.handlers);
                tokio::spawn(async move {
                    handlers.on_join().await;
                    if let Some(tx) = gate {
                        let _ = tx.send(());
                    }
                });
            },
            Proto::OnRoomEmit => {
                let Some(map) = data.as_map() else {
                    warn!("malformed ON_ROOM_EMIT payload: {data:?}");
                    return;
                };
                let event = map
                    .iter()
                    .find(|(k, _)| k.as_str() == Some("event"))
                    .and_then(|(_, v)| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let args: Vec<Value> = map
                    .iter()
                    .find(|(k, _)| k.as_str() == Some("args"))
                    .and_then(|(_, v)| v.as_array())
                    .cloned()
                    .unwrap_or_default();

                if let Some(handler) = self.0.handler_table.get(event.as_str()) {
                    handler(self.0.handlers.as_ref(), &args);
                } else {
                    self.0.handlers.on_emit(&event, &args);
                }
            },
            Proto::OnRoomLeave => {
                *self.0.state.lock().await = RoomState::Left;
                self.0.handlers.on_leave();
            },
            Proto::OnRoomDelete => {
                *self.0.state.lock().await = RoomState::Deleted;
                self.0.handlers.on_delete();
            },
            other => warn!("room received non-room push type {other:?}"),
        }
    }

    pub(crate) fn scope_snapshot(&self) -> Option<String> {
        self.0.scope.try_lock().ok().and_then(|g| g.clone())
    }
}
