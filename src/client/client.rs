// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Connection Manager + Public Client Surface: owns the current
//! transport, drives the connect/reconnect state machine across the
//! node pool, re-authenticates and rejoins rooms, and assembles request
//! payloads for the query/run/emit/join/leave façade.

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};

use once_cell::sync::OnceCell;
use rmpv::Value;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock, mpsc};
use tracing::{debug, info, warn};

use crate::{
    cfg::{
        config::{AuthCredential, Config},
        enums::{TlsSetting, TransportKind, WritePolicy},
    },
    client::pool::NodePool,
    diagnostics::PayloadDumpSink,
    error::{ProtocolError, Result},
    events,
    mux::{self, Multiplexer},
    rooms::Room,
    transport::{LostCallback, PacketCallback, TcpTransport, TlsMode, Transport, WsTransport},
    wire::{Packet, Proto},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    ShuttingDown,
}

/// Shared client state. Cheaply clonable via [`Client`], which is just
/// an `Arc<ClientInner>` with the public-facing methods.
pub struct ClientInner {
    config: Config,
    pool: NodePool,
    mux: Arc<Multiplexer>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    state: AsyncMutex<ConnState>,
    rooms: dashmap::DashMap<i64, Room>,
    rooms_lock: Arc<AsyncMutex<()>>,
    room_events_tx: mpsc::UnboundedSender<events::RoomEvent>,
    reconnect_guard: Arc<AsyncMutex<()>>,
    dump_sink: Option<Arc<dyn PayloadDumpSink>>,
    self_weak: OnceCell<Weak<ClientInner>>,
}

impl std::fmt::Debug for ClientInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientInner").finish()
    }
}

/// A connected client. Cloning shares the same underlying connection,
/// room registry, and pending-request table.
#[derive(Clone)]
pub struct Client(Arc<ClientInner>);

impl Client {
    /// Connects to the configured node pool, authenticating against the
    /// first node that accepts a connection. Blocks (retrying with
    /// backoff) until the connection is `Ready`.
    pub async fn connect(config: Config) -> Result<Self> {
        let dump_sink: Option<Arc<dyn PayloadDumpSink>> = config
            .runtime
            .payload_dump_dir
            .as_ref()
            .map(|dir| {
                Arc::new(crate::diagnostics::FileDumpSink::new(dir)) as Arc<dyn PayloadDumpSink>
            });

        let pool = NodePool::new(config.pool.nodes.clone(), config.pool.random_start);
        let (room_events_tx, room_events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ClientInner {
            config,
            pool,
            mux: Arc::new(Multiplexer::new()),
            transport: RwLock::new(None),
            state: AsyncMutex::new(ConnState::Disconnected),
            rooms: dashmap::DashMap::new(),
            rooms_lock: Arc::new(AsyncMutex::new(())),
            room_events_tx,
            reconnect_guard: Arc::new(AsyncMutex::new(())),
            dump_sink,
            self_weak: OnceCell::new(),
        });
        let _ = inner.self_weak.set(Arc::downgrade(&inner));
        events::spawn_room_event_consumer(Arc::clone(&inner), room_events_rx);

        let guard = Arc::clone(&inner.reconnect_guard).lock_owned().await;
        inner.run_reconnect_loop(guard).await;

        Ok(Self(inner))
    }

    pub fn inner(&self) -> Arc<ClientInner> {
        Arc::clone(&self.0)
    }

    /// Initiates a graceful shutdown: stops auto-reconnect and closes
    /// the current transport.
    pub async fn close(&self) {
        *self.0.state.lock().await = ConnState::ShuttingDown;
        if let Some(t) = self.0.transport.read().await.as_ref() {
            t.close();
        }
    }

    pub async fn wait_closed(&self) {
        let t = self.0.transport.read().await.clone();
        if let Some(t) = t {
            t.wait_closed().await;
        }
    }

    pub async fn query(
        &self,
        code: &str,
        scope: Option<&str>,
        timeout: Option<Duration>,
        vars: Value,
    ) -> Result<Value> {
        self.0.query(code, scope, timeout, vars).await
    }

    pub async fn run(
        &self,
        procedure: &str,
        args: RunArgs,
        scope: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        self.0.run(procedure, args, scope, timeout).await
    }

    /// Builds a room bound to this client and joins it immediately.
    pub async fn join_room(
        &self,
        room: Room,
        wait: Option<Duration>,
    ) -> Result<Room> {
        room.join(&self.0, wait).await?;
        Ok(room)
    }

    pub async fn create_collection(&self, name: &str) -> Result<Value> {
        if !crate::scope::is_name(name) {
            return Err(ProtocolError::ValueError(format!(
                "invalid collection name: {name}"
            )));
        }
        self.0.admin_query("new_collection(name)", &[("name", Value::from(name))]).await
    }

    pub async fn delete_collection(&self, collection: impl Into<CollectionRef>) -> Result<Value> {
        self.0
            .admin_query(
                "del_collection(collection)",
                &[("collection", collection.into().into())],
            )
            .await
    }

    pub async fn rename_collection(
        &self,
        collection: impl Into<CollectionRef>,
        new_name: &str,
    ) -> Result<Value> {
        self.0
            .admin_query(
                "rename_collection(collection, new_name)",
                &[
                    ("collection", collection.into().into()),
                    ("new_name", Value::from(new_name)),
                ],
            )
            .await
    }

    pub async fn collection_info(&self, collection: impl Into<CollectionRef>) -> Result<Value> {
        self.0
            .admin_query("collection_info(collection)", &[("collection", collection.into().into())])
            .await
    }

    pub async fn list_collections(&self) -> Result<Value> {
        self.0.admin_query("collections_info()", &[]).await
    }

    pub async fn has_collection(&self, name: &str) -> Result<Value> {
        self.0.admin_query("has_collection(name)", &[("name", Value::from(name))]).await
    }

    pub async fn create_user(&self, name: &str) -> Result<Value> {
        self.0.admin_query("new_user(name)", &[("name", Value::from(name))]).await
    }

    pub async fn delete_user(&self, name: &str) -> Result<Value> {
        self.0.admin_query("del_user(name)", &[("name", Value::from(name))]).await
    }

    pub async fn rename_user(&self, user: &str, new_name: &str) -> Result<Value> {
        self.0
            .admin_query(
                "rename_user(user, new_name)",
                &[("user", Value::from(user)), ("new_name", Value::from(new_name))],
            )
            .await
    }

    pub async fn set_password(&self, user: &str, new_password: &str) -> Result<Value> {
        self.0
            .admin_query(
                "set_password(user, new_password)",
                &[("user", Value::from(user)), ("new_password", Value::from(new_password))],
            )
            .await
    }

    pub async fn has_user(&self, name: &str) -> Result<Value> {
        self.0.admin_query("has_user(name)", &[("name", Value::from(name))]).await
    }

    pub async fn user_info(&self, user: Option<&str>) -> Result<Value> {
        match user {
            Some(user) => {
                self.0.admin_query("user_info(user)", &[("user", Value::from(user))]).await
            },
            None => self.0.admin_query("user_info()", &[]).await,
        }
    }

    pub async fn users_info(&self) -> Result<Value> {
        self.0.admin_query("users_info()", &[]).await
    }

    pub async fn new_token(
        &self,
        user: &str,
        expiration_unix_secs: Option<i64>,
        description: &str,
    ) -> Result<Value> {
        let expiration = expiration_unix_secs.map(Value::from).unwrap_or(Value::Nil);
        self.0
            .admin_query(
                "new_token(user, expiration_time, description)",
                &[
                    ("user", Value::from(user)),
                    ("expiration_time", expiration),
                    ("description", Value::from(description)),
                ],
            )
            .await
    }

    pub async fn del_token(&self, key: &str) -> Result<Value> {
        self.0.admin_query("del_token(key)", &[("key", Value::from(key))]).await
    }

    pub async fn has_token(&self, token: &str) -> Result<Value> {
        self.0.admin_query("has_token(token)", &[("token", Value::from(token))]).await
    }

    pub async fn grant(
        &self,
        target: impl Into<CollectionRef>,
        user: &str,
        mask: i64,
    ) -> Result<Value> {
        self.0
            .admin_query(
                "grant(target, user, mask)",
                &[
                    ("target", target.into().into()),
                    ("user", Value::from(user)),
                    ("mask", Value::from(mask)),
                ],
            )
            .await
    }

    pub async fn revoke(
        &self,
        target: impl Into<CollectionRef>,
        user: &str,
        mask: i64,
    ) -> Result<Value> {
        self.0
            .admin_query(
                "revoke(target, user, mask)",
                &[
                    ("target", target.into().into()),
                    ("user", Value::from(user)),
                    ("mask", Value::from(mask)),
                ],
            )
            .await
    }

    /// Node/cluster administration. `scope` defaults to `@n` (the node
    /// scope), matching the upstream client's behavior.
    pub async fn node_info(&self, scope: Option<&str>) -> Result<Value> {
        self.0.admin_query_scoped("node_info()", &[], scope.unwrap_or("@n")).await
    }

    pub async fn nodes_info(&self, scope: Option<&str>) -> Result<Value> {
        self.0.admin_query_scoped("nodes_info()", &[], scope.unwrap_or("@n")).await
    }

    pub async fn counters(&self, scope: Option<&str>) -> Result<Value> {
        self.0.admin_query_scoped("counters()", &[], scope.unwrap_or("@n")).await
    }

    pub async fn reset_counters(&self, scope: Option<&str>) -> Result<Value> {
        self.0.admin_query_scoped("reset_counters()", &[], scope.unwrap_or("@n")).await
    }

    pub async fn set_log_level(&self, log_level: &str, scope: Option<&str>) -> Result<Value> {
        self.0
            .admin_query_scoped(
                "set_log_level(log_level)",
                &[("log_level", Value::from(log_level))],
                scope.unwrap_or("@n"),
            )
            .await
    }

    pub async fn shutdown(&self, scope: Option<&str>) -> Result<Value> {
        self.0.admin_query_scoped("shutdown()", &[], scope.unwrap_or("@n")).await
    }

    pub async fn del_expired(&self) -> Result<Value> {
        self.0.admin_query("del_expired()", &[]).await
    }
}

/// Either a resolved collection id or a collection name, as accepted by
/// the administrative helpers that take a `U[int, str]` target in the
/// upstream client (e.g. `del_collection`, `grant`/`revoke`).
#[derive(Debug, Clone)]
pub enum CollectionRef {
    Id(i64),
    Name(String),
}
impl From<i64> for CollectionRef {
    fn from(id: i64) -> Self {
        CollectionRef::Id(id)
    }
}
impl From<&str> for CollectionRef {
    fn from(name: &str) -> Self {
        CollectionRef::Name(name.to_string())
    }
}
impl From<String> for CollectionRef {
    fn from(name: String) -> Self {
        CollectionRef::Name(name)
    }
}
impl From<CollectionRef> for Value {
    fn from(r: CollectionRef) -> Self {
        match r {
            CollectionRef::Id(id) => Value::from(id),
            CollectionRef::Name(name) => Value::from(name),
        }
    }
}

/// Positional or keyword arguments for [`Client::run`].
pub enum RunArgs {
    Positional(Vec<Value>),
    Keyword(HashMap<String, Value>),
    None,
}

impl ClientInner {
    pub(crate) fn rooms_lock(&self) -> &AsyncMutex<()> {
        &self.rooms_lock
    }

    /// Queues a room push for the client's single ordered consumer task.
    /// Fails only once that task has shut down alongside the client.
    pub(crate) fn send_room_event(
        &self,
        event: events::RoomEvent,
    ) -> std::result::Result<(), mpsc::error::SendError<events::RoomEvent>> {
        self.room_events_tx.send(event)
    }

    pub(crate) fn auto_reconnect(&self) -> bool {
        self.config.runtime.auto_reconnect
    }

    pub(crate) fn default_scope(&self) -> String {
        self.config.auth.default_scope.clone().unwrap_or_else(|| "@t".to_string())
    }

    pub(crate) fn register_room(&self, id: i64, room: Room) -> Option<Room> {
        self.rooms.insert(id, room)
    }

    pub(crate) fn unregister_room(&self, id: i64) {
        self.rooms.remove(&id);
    }

    pub(crate) fn lookup_room(&self, id: i64) -> Option<Room> {
        self.rooms.get(&id).map(|r| r.clone())
    }

    /// Runs one of the administrative expressions from ThingsDB's
    /// `buildin` module (`new_user(name)`, `grant(target, user, mask)`,
    /// …) in the `@t` (thingsdb) scope, passing arguments by name as a
    /// `vars` map rather than interpolating them into the code string.
    async fn admin_query(self: &Arc<Self>, code: &str, vars: &[(&str, Value)]) -> Result<Value> {
        self.admin_query_scoped(code, vars, "@t").await
    }

    async fn admin_query_scoped(
        self: &Arc<Self>,
        code: &str,
        vars: &[(&str, Value)],
        scope: &str,
    ) -> Result<Value> {
        let vars = Value::Map(
            vars.iter().map(|(k, v)| (Value::from(*k), v.clone())).collect(),
        );
        self.query(code, Some(scope), None, vars).await
    }

    /// Spawns the reconnect loop in the background if one is not already
    /// in flight; a no-op otherwise.
    pub(crate) fn spawn_reconnect(self: &Arc<Self>) {
        let Ok(guard) = Arc::clone(&self.reconnect_guard).try_lock_owned() else {
            debug!("reconnect already in progress, ignoring trigger");
            return;
        };
        let me = Arc::clone(self);
        tokio::spawn(async move { me.run_reconnect_loop(guard).await });
    }

    async fn current_transport(&self) -> Result<Arc<dyn Transport>> {
        self.transport.read().await.clone().ok_or(ProtocolError::NotConnected)
    }

    /// Connect → authenticate → rejoin loop with exponential backoff.
    /// Runs until a node accepts the full handshake; holds
    /// `reconnect_guard` for its entire duration.
    async fn run_reconnect_loop(self: &Arc<Self>, guard: OwnedMutexGuard<()>) {
        let mut wait_time = self.config.backoff.initial_wait;
        let mut attempt_timeout = self.config.backoff.initial_timeout;
        let max_wait = self.config.backoff.max_wait.max(self.config.backoff.initial_wait);
        let max_timeout =
            self.config.backoff.max_timeout.max(self.config.backoff.initial_timeout);

        loop {
            if *self.state.lock().await == ConnState::ShuttingDown {
                break;
            }
            let node = self.pool.next();
            info!("connecting to {}:{} ({})", node.host, node.port, node.transport);
            match self.try_connect_node(&node, attempt_timeout).await {
                Ok(transport) => {
                    let old = self.transport.write().await.replace(transport);
                    if let Some(old) = old {
                        tokio::spawn(async move {
                            tokio::time::sleep(Duration::from_secs(10)).await;
                            old.close();
                        });
                    }
                    *self.state.lock().await = ConnState::Ready;
                    info!("connected to {}:{}", node.host, node.port);
                    break;
                },
                Err(e) => {
                    warn!("connect attempt to {}:{} failed: {e}", node.host, node.port);
                    tokio::time::sleep(wait_time).await;
                    wait_time = (wait_time * 2).min(max_wait);
                    attempt_timeout = (attempt_timeout + Duration::from_secs(1)).min(max_timeout);
                },
            }
        }
        drop(guard);
    }

    async fn try_connect_node(
        self: &Arc<Self>,
        node: &crate::cfg::config::NodeConfig,
        connect_timeout: Duration,
    ) -> Result<Arc<dyn Transport>> {
        *self.state.lock().await = ConnState::Connecting;

        let mux = Arc::clone(&self.mux);
        let client_for_packets = Arc::clone(self);
        let on_packet: PacketCallback = Arc::new(move |packet: Packet| {
            if let Some(event) = mux::route_packet(&mux, packet) {
                events::dispatch(&client_for_packets, event);
            }
        });

        // Populated with a weak handle to this attempt's transport right
        // after `connect_transport` returns. `on_lost` compares it against
        // the client's *current* transport before cancelling anything: a
        // stale (already-superseded) transport dying during its 10s grace
        // period must not cancel requests in flight on the connection that
        // replaced it.
        let this_transport: Arc<OnceCell<Weak<dyn Transport>>> = Arc::new(OnceCell::new());
        let cell_for_lost = Arc::clone(&this_transport);
        let client_for_lost = Arc::clone(self);
        let on_lost: LostCallback = Arc::new(move || {
            let client = Arc::clone(&client_for_lost);
            let cell = Arc::clone(&cell_for_lost);
            tokio::spawn(async move {
                let still_current = match (client.transport.read().await.as_ref(), cell.get()) {
                    (Some(current), Some(weak)) => {
                        weak.upgrade().is_some_and(|t| Arc::ptr_eq(&t, current))
                    },
                    _ => true,
                };
                if !still_current {
                    // A superseded transport closing during its grace
                    // period; the connection that replaced it owns the
                    // client's state now.
                    return;
                }
                client.mux.cancel_all();
                let shutting_down = *client.state.lock().await == ConnState::ShuttingDown;
                if !shutting_down {
                    *client.state.lock().await = ConnState::Disconnected;
                    if client.auto_reconnect() {
                        client.spawn_reconnect();
                    }
                }
            });
        });

        let transport = connect_transport(
            node,
            connect_timeout,
            self.config.timeouts.io,
            on_packet,
            on_lost,
            self.dump_sink.clone(),
        )
        .await?;
        let _ = this_transport.set(Arc::downgrade(&transport));

        self.mux
            .send(transport.as_ref(), Proto::ReqPing, &Value::Nil, Some(Duration::from_secs(2)))
            .await?;

        *self.state.lock().await = ConnState::Authenticating;
        let auth = match self.config.auth.credential() {
            AuthCredential::Token(token) => Value::from(token.as_str()),
            AuthCredential::UserPass { username, password } => Value::Array(vec![
                Value::from(username.as_str()),
                Value::from(password.as_str()),
            ]),
        };
        self.mux
            .send(transport.as_ref(), Proto::ReqAuth, &auth, Some(self.config.timeouts.auth))
            .await?;

        self.rejoin_rooms(transport.as_ref()).await;

        Ok(transport)
    }

    /// Groups currently-registered rooms by scope and re-sends one JOIN
    /// per scope over the freshly (re)established transport.
    async fn rejoin_rooms(&self, transport: &dyn Transport) {
        let mut by_scope: HashMap<String, Vec<i64>> = HashMap::new();
        for entry in self.rooms.iter() {
            let id = *entry.key();
            let scope = entry.value().scope_snapshot().unwrap_or_else(|| self.default_scope());
            by_scope.entry(scope).or_default().push(id);
        }

        for (scope, ids) in by_scope {
            let mut body = vec![Value::from(scope.as_str())];
            body.extend(ids.iter().map(|id| Value::from(*id)));
            match self
                .mux
                .send(transport, Proto::ReqJoin, &Value::Array(body), Some(Duration::from_secs(5)))
                .await
            {
                Ok(Value::Array(results)) => {
                    for (id, result) in ids.iter().zip(results.iter()) {
                        if result.is_nil() {
                            warn!("room id {id} disappeared while rejoining scope `{scope}`");
                        }
                    }
                },
                Ok(_) => warn!("unexpected JOIN response shape while rejoining `{scope}`"),
                Err(e) => warn!("failed to rejoin rooms in scope `{scope}`: {e}"),
            }
        }
    }

    /// Sends a request, applying the configured write policy when the
    /// client is disconnected or the send fails with a retryable error.
    pub(crate) async fn send_request(
        self: &Arc<Self>,
        tp: Proto,
        value: Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        loop {
            let transport = match self.current_transport().await {
                Ok(t) => t,
                Err(e) => {
                    if self.config.runtime.write_policy == WritePolicy::Ensure {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                    return Err(e);
                },
            };

            match self.mux.send(transport.as_ref(), tp, &value, timeout).await {
                Ok(v) => return Ok(v),
                Err(e)
                    if self.config.runtime.write_policy == WritePolicy::Ensure
                        && e.is_retryable_write_failure() =>
                {
                    warn!("request failed ({e}), retrying after reconnect");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                },
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn query(
        self: &Arc<Self>,
        code: &str,
        scope: Option<&str>,
        timeout: Option<Duration>,
        vars: Value,
    ) -> Result<Value> {
        let scope = scope.map(str::to_string).unwrap_or_else(|| self.default_scope());
        let mut body = vec![Value::from(scope.as_str()), Value::from(code)];
        let has_vars = matches!(&vars, Value::Map(m) if !m.is_empty());
        if has_vars {
            body.push(vars);
        }
        self.send_request(Proto::ReqQuery, Value::Array(body), timeout).await
    }

    pub async fn run(
        self: &Arc<Self>,
        procedure: &str,
        args: RunArgs,
        scope: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let scope = scope.map(str::to_string).unwrap_or_else(|| self.default_scope());
        let mut body = vec![Value::from(scope.as_str()), Value::from(procedure)];
        match args {
            RunArgs::Positional(args) => body.push(Value::Array(args)),
            RunArgs::Keyword(kwargs) => body.push(Value::Map(
                kwargs.into_iter().map(|(k, v)| (Value::from(k), v)).collect(),
            )),
            RunArgs::None => {},
        }
        self.send_request(Proto::ReqRun, Value::Array(body), timeout).await
    }

    pub(crate) async fn raw_join(
        self: &Arc<Self>,
        scope: &str,
        ids: &[i64],
    ) -> Result<Vec<Option<i64>>> {
        let mut body = vec![Value::from(scope)];
        body.extend(ids.iter().map(|id| Value::from(*id)));
        let resp =
            self.send_request(Proto::ReqJoin, Value::Array(body), Some(Duration::from_secs(5))).await?;
        parse_id_array(resp)
    }

    pub(crate) async fn raw_leave(
        self: &Arc<Self>,
        scope: &str,
        ids: &[i64],
    ) -> Result<Vec<Option<i64>>> {
        let mut body = vec![Value::from(scope)];
        body.extend(ids.iter().map(|id| Value::from(*id)));
        let resp =
            self.send_request(Proto::ReqLeave, Value::Array(body), Some(Duration::from_secs(5))).await?;
        parse_id_array(resp)
    }

    pub(crate) async fn raw_emit(
        self: &Arc<Self>,
        scope: &str,
        room_id: i64,
        event: &str,
        args: Vec<Value>,
    ) -> Result<()> {
        let mut body = vec![Value::from(scope), Value::from(room_id), Value::from(event)];
        body.extend(args);
        self.send_request(Proto::ReqEmit, Value::Array(body), Some(Duration::from_secs(5)))
            .await?;
        Ok(())
    }
}

fn parse_id_array(value: Value) -> Result<Vec<Option<i64>>> {
    match value {
        Value::Array(items) => Ok(items.into_iter().map(|v| v.as_i64()).collect()),
        other => Err(ProtocolError::TypeError(format!(
            "expected an array of room ids, got {other:?}"
        ))),
    }
}

async fn connect_transport(
    node: &crate::cfg::config::NodeConfig,
    connect_timeout: Duration,
    io_timeout: Duration,
    on_packet: PacketCallback,
    on_lost: LostCallback,
    dump_sink: Option<Arc<dyn PayloadDumpSink>>,
) -> Result<Arc<dyn Transport>> {
    match node.transport {
        TransportKind::Tcp => match node.tls {
            TlsSetting::None => {
                TcpTransport::connect(
                    (node.host.as_str(), node.port),
                    connect_timeout,
                    io_timeout,
                    on_packet,
                    on_lost,
                    dump_sink,
                )
                .await
                .map(|t| t as Arc<dyn Transport>)
            },
            TlsSetting::Default => {
                let server_name = rustls_pki_types::ServerName::try_from(node.host.clone())
                    .map_err(|e| {
                        ProtocolError::Internal(format!(
                            "invalid TLS server name `{}`: {e}",
                            node.host
                        ))
                    })?;
                TcpTransport::connect_tls(
                    (node.host.as_str(), node.port),
                    server_name,
                    TlsMode::Default,
                    connect_timeout,
                    io_timeout,
                    on_packet,
                    on_lost,
                    dump_sink,
                )
                .await
                .map(|t| t as Arc<dyn Transport>)
            },
        },
        TransportKind::WebSocket => {
            let scheme = if node.tls == TlsSetting::Default { "wss" } else { "ws" };
            let url = format!("{scheme}://{}:{}", node.host, node.port);
            WsTransport::connect(&url, connect_timeout, io_timeout, on_packet, on_lost, dump_sink)
                .await
                .map(|t| t as Arc<dyn Transport>)
        },
    }
}
