//! GATT server (peripheral role) session.
//!
//! A [`ServerSession`] publishes one service, advertises it and answers
//! requests from connected centrals. Every request gets exactly one
//! response, produced synchronously by a [`RequestHandler`].
//!
//! Server-initiated pushes are split into transmission units and paced by
//! the platform: the next unit is only handed over once the previous one is
//! reported sent.

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::ble::adapter::{AdapterState, PeripheralAdapter, ServerCallback};
use crate::ble::advertising::Advertisement;
use crate::ble::gatt::{find_characteristic, AttributePath, CharProperties, GattService};
use crate::ble::uuids::CLIENT_CHARACTERISTIC_CONFIG_UUID;
use crate::callback::{spawn_listener, CallbackHandle};
use crate::config::{ServerConfig, TransportConfig};
use crate::error::{Error, Result};
use crate::protocol::{chunk_size_for_mtu, ClientConfiguration, FragmentQueue, GattStatus};

/// Server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ServerState {
    /// Server closed.
    #[default]
    Idle,
    /// Server open and advertising; service registration pending.
    Advertising,
    /// Service registered; requests are served.
    Serving,
}

impl ServerState {
    /// Check if the server is open.
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Advertising => write!(f, "Advertising"),
            Self::Serving => write!(f, "Serving"),
        }
    }
}

/// Kind of request received from a central.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Characteristic read.
    ReadCharacteristic,
    /// Characteristic write.
    WriteCharacteristic,
    /// Descriptor read.
    ReadDescriptor,
    /// Descriptor write.
    WriteDescriptor,
    /// Commit or cancel of prepared writes.
    ExecuteWrite,
}

/// Event published by a [`ServerSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// The server changed state.
    StateChanged(ServerState),
    /// Service registration finished.
    ServiceAdded {
        /// Service UUID.
        service: Uuid,
        /// Platform status.
        status: GattStatus,
    },
    /// Advertising is running.
    AdvertisingStarted,
    /// Advertising could not start.
    AdvertisingFailed {
        /// Platform error code.
        code: i32,
    },
    /// A central connected.
    DeviceLinked {
        /// Remote address.
        device: String,
    },
    /// A central disconnected.
    DeviceUnlinked {
        /// Remote address.
        device: String,
    },
    /// A request was answered.
    RequestReceived {
        /// Remote address.
        device: String,
        /// Request identifier.
        request_id: u32,
        /// Request kind.
        kind: RequestKind,
        /// Target attribute; `None` for execute-write.
        path: Option<AttributePath>,
        /// Status sent in the response.
        status: GattStatus,
    },
    /// A central wrote a complete message to a characteristic.
    MessageReceived {
        /// Remote address.
        device: String,
        /// Characteristic written.
        characteristic: AttributePath,
        /// Written value.
        value: Bytes,
    },
    /// A central changed its push configuration.
    SubscriptionChanged {
        /// Remote address.
        device: String,
        /// Characteristic concerned.
        characteristic: AttributePath,
        /// New configuration.
        configuration: ClientConfiguration,
    },
    /// The platform sent one push unit.
    NotificationSent {
        /// Remote address.
        device: String,
        /// Platform status.
        status: GattStatus,
    },
    /// Every unit of a push was sent.
    PushComplete {
        /// Remote address.
        device: String,
        /// Characteristic pushed.
        characteristic: AttributePath,
        /// Bytes delivered.
        bytes: usize,
    },
    /// A push was abandoned.
    PushFailed {
        /// Remote address.
        device: String,
        /// Characteristic pushed.
        characteristic: AttributePath,
        /// Status that ended the push.
        status: GattStatus,
    },
    /// A link's MTU changed.
    MtuChanged {
        /// Remote address.
        device: String,
        /// New ATT MTU.
        mtu: u16,
    },
}

/// Result of a request handler: a value, or the status to answer with.
pub type HandlerResult<T> = std::result::Result<T, GattStatus>;

/// Produces responses to central requests.
///
/// Called with the session lock held; implementations must return promptly
/// and must not call back into the session.
pub trait RequestHandler: Send + Sync {
    /// Value for a characteristic read at `offset`.
    fn read_characteristic(
        &self,
        device: &str,
        path: &AttributePath,
        offset: u16,
    ) -> HandlerResult<Vec<u8>>;

    /// Accept a characteristic write at `offset`.
    fn write_characteristic(
        &self,
        device: &str,
        path: &AttributePath,
        offset: u16,
        value: &[u8],
    ) -> HandlerResult<()>;

    /// Value for a descriptor read. Client Characteristic Configuration
    /// descriptors are answered by the session itself.
    fn read_descriptor(
        &self,
        _device: &str,
        _path: &AttributePath,
        _offset: u16,
    ) -> HandlerResult<Vec<u8>> {
        Err(GattStatus::READ_NOT_PERMITTED)
    }

    /// Accept a descriptor write. Client Characteristic Configuration
    /// descriptors are handled by the session itself.
    fn write_descriptor(
        &self,
        _device: &str,
        _path: &AttributePath,
        _offset: u16,
        _value: &[u8],
    ) -> HandlerResult<()> {
        Err(GattStatus::WRITE_NOT_PERMITTED)
    }

    /// Payload to push when `device` subscribes to `path`.
    fn subscription_payload(&self, _device: &str, _path: &AttributePath) -> Option<Vec<u8>> {
        None
    }
}

/// In-memory attribute values, usable as a [`RequestHandler`].
///
/// Reads honour the offset, writes at an offset splice into the stored
/// value, and a new subscriber is pushed the characteristic's current value.
#[derive(Debug, Default)]
pub struct ValueStore {
    values: RwLock<HashMap<AttributePath, Vec<u8>>>,
}

impl ValueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with the static descriptor values of a service.
    pub fn from_service(service: &GattService) -> Self {
        let store = Self::new();
        for chr in &service.characteristics {
            for descriptor in &chr.descriptors {
                if let Some(value) = &descriptor.value {
                    store.set(
                        AttributePath::descriptor(service.uuid, chr.uuid, descriptor.uuid),
                        value.clone(),
                    );
                }
            }
        }
        store
    }

    /// Set a value, builder style.
    pub fn with_value(self, path: AttributePath, value: impl Into<Vec<u8>>) -> Self {
        self.set(path, value);
        self
    }

    /// Set a value.
    pub fn set(&self, path: AttributePath, value: impl Into<Vec<u8>>) {
        self.values.write().insert(path, value.into());
    }

    /// Current value.
    pub fn get(&self, path: &AttributePath) -> Option<Vec<u8>> {
        self.values.read().get(path).cloned()
    }

    fn read_at(&self, path: &AttributePath, offset: u16) -> HandlerResult<Vec<u8>> {
        let values = self.values.read();
        let value = values.get(path).map(Vec::as_slice).unwrap_or_default();
        let offset = usize::from(offset);
        if offset > value.len() {
            return Err(GattStatus::INVALID_OFFSET);
        }
        Ok(value[offset..].to_vec())
    }

    fn write_at(&self, path: &AttributePath, offset: u16, data: &[u8]) -> HandlerResult<()> {
        let mut values = self.values.write();
        let value = values.entry(*path).or_default();
        let offset = usize::from(offset);
        if offset > value.len() {
            return Err(GattStatus::INVALID_OFFSET);
        }
        value.truncate(offset);
        value.extend_from_slice(data);
        Ok(())
    }
}

impl RequestHandler for ValueStore {
    fn read_characteristic(
        &self,
        _device: &str,
        path: &AttributePath,
        offset: u16,
    ) -> HandlerResult<Vec<u8>> {
        self.read_at(path, offset)
    }

    fn write_characteristic(
        &self,
        _device: &str,
        path: &AttributePath,
        offset: u16,
        value: &[u8],
    ) -> HandlerResult<()> {
        self.write_at(path, offset, value)
    }

    fn read_descriptor(
        &self,
        _device: &str,
        path: &AttributePath,
        offset: u16,
    ) -> HandlerResult<Vec<u8>> {
        self.read_at(path, offset)
    }

    fn write_descriptor(
        &self,
        _device: &str,
        path: &AttributePath,
        offset: u16,
        value: &[u8],
    ) -> HandlerResult<()> {
        self.write_at(path, offset, value)
    }

    fn subscription_payload(&self, _device: &str, path: &AttributePath) -> Option<Vec<u8>> {
        self.get(&path.without_descriptor()).filter(|v| !v.is_empty())
    }
}

struct PushJob {
    path: AttributePath,
    queue: FragmentQueue,
    confirm: bool,
    sent: usize,
    cancelled: bool,
}

struct LinkedDevice {
    subscriptions: HashMap<AttributePath, ClientConfiguration>,
    backlog: VecDeque<PushJob>,
    in_flight: bool,
    chunk_size: usize,
}

impl LinkedDevice {
    fn new(chunk_size: usize) -> Self {
        Self {
            subscriptions: HashMap::new(),
            backlog: VecDeque::new(),
            in_flight: false,
            chunk_size,
        }
    }
}

struct ServerInner {
    state: ServerState,
    service: Option<GattService>,
    devices: HashMap<String, LinkedDevice>,
}

/// A GATT server publishing one service.
pub struct ServerSession {
    adapter: Arc<dyn PeripheralAdapter>,
    handler: Arc<dyn RequestHandler>,
    transport: TransportConfig,
    config: ServerConfig,
    inner: Mutex<ServerInner>,
    event_tx: broadcast::Sender<ServerEvent>,
    callback_counter: AtomicU64,
}

impl ServerSession {
    /// Create a server session.
    pub fn new(
        adapter: Arc<dyn PeripheralAdapter>,
        handler: Arc<dyn RequestHandler>,
        transport: TransportConfig,
        config: ServerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);

        Self {
            adapter,
            handler,
            transport,
            config,
            inner: Mutex::new(ServerInner {
                state: ServerState::Idle,
                service: None,
                devices: HashMap::new(),
            }),
            event_tx,
            callback_counter: AtomicU64::new(0),
        }
    }

    // === State ===

    /// Current state.
    pub fn state(&self) -> ServerState {
        self.inner.lock().state
    }

    /// The published service.
    pub fn service(&self) -> Option<GattService> {
        self.inner.lock().service.clone()
    }

    /// Addresses of connected centrals.
    pub fn linked_devices(&self) -> Vec<String> {
        let mut devices: Vec<String> = self.inner.lock().devices.keys().cloned().collect();
        devices.sort();
        devices
    }

    /// Push configuration a central set for a characteristic.
    pub fn subscription(&self, device: &str, characteristic: &AttributePath) -> ClientConfiguration {
        self.inner
            .lock()
            .devices
            .get(device)
            .and_then(|link| link.subscriptions.get(characteristic).copied())
            .unwrap_or(ClientConfiguration::Disabled)
    }

    /// Pushes queued for a device, the one in flight included.
    pub fn pending_pushes(&self, device: &str) -> usize {
        self.inner
            .lock()
            .devices
            .get(device)
            .map(|link| link.backlog.len())
            .unwrap_or(0)
    }

    /// Subscribe to server events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.event_tx.subscribe()
    }

    /// Register a callback for messages written by centrals.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_message<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&str, AttributePath, Bytes) + Send + Sync + 'static,
    {
        spawn_listener(
            &self.callback_counter,
            self.subscribe(),
            |event| match event {
                ServerEvent::MessageReceived {
                    device,
                    characteristic,
                    value,
                } => Some((device, characteristic, value)),
                _ => None,
            },
            move |(device, characteristic, value)| callback(&device, characteristic, value),
        )
    }

    fn emit(&self, event: ServerEvent) {
        let _ = self.event_tx.send(event);
    }

    fn set_state(&self, inner: &mut ServerInner, state: ServerState) {
        if inner.state == state {
            return;
        }
        debug!("Server state {} -> {}", inner.state, state);
        inner.state = state;
        self.emit(ServerEvent::StateChanged(state));
    }

    // === Lifecycle ===

    /// Open the server, register `service` and start advertising.
    ///
    /// The session is `Advertising` on return and becomes `Serving` once the
    /// platform confirms the service.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyInProgress`] unless the session is `Idle`
    /// - [`Error::AdapterUnavailable`] / [`Error::AdapterDisabled`]
    /// - [`Error::UnsupportedOperation`] if the controller cannot advertise
    /// - [`Error::InvalidParameter`] if the advertisement does not fit
    /// - any error the adapter returns; the server is closed again
    pub fn start(&self, service: GattService, advertisement: &Advertisement) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != ServerState::Idle {
            return Err(Error::in_progress("server start"));
        }

        match self.adapter.state() {
            AdapterState::Unavailable => return Err(Error::AdapterUnavailable),
            AdapterState::Disabled => return Err(Error::AdapterDisabled),
            AdapterState::Enabled => {}
        }
        if !self.adapter.supports_advertising() {
            return Err(Error::unsupported("LE advertising"));
        }
        advertisement.validate()?;

        info!("Opening GATT server for service {}", service.uuid);
        self.adapter.open_server()?;

        let registered = self
            .adapter
            .add_service(&service)
            .and_then(|()| self.adapter.start_advertising(advertisement));
        if let Err(e) = registered {
            warn!("Server start failed: {}", e);
            if let Err(close) = self.adapter.close_server() {
                warn!("Failed to close GATT server: {}", close);
            }
            return Err(e);
        }

        inner.service = Some(service);
        self.set_state(&mut inner, ServerState::Advertising);
        Ok(())
    }

    /// Stop advertising, then close the server. Links and pushes are dropped.
    ///
    /// # Errors
    ///
    /// Returns the first error the adapter reported. The session is `Idle`
    /// regardless.
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state == ServerState::Idle {
            debug!("Server not running, ignoring stop request");
            return Ok(());
        }
        self.shutdown(&mut inner)
    }

    fn shutdown(&self, inner: &mut ServerInner) -> Result<()> {
        info!("Stopping GATT server");
        let advertising = self.adapter.stop_advertising();
        if let Err(e) = &advertising {
            warn!("Failed to stop advertising: {}", e);
        }
        let closed = self.adapter.close_server();
        if let Err(e) = &closed {
            warn!("Failed to close GATT server: {}", e);
        }

        for (device, link) in inner.devices.drain() {
            if !link.backlog.is_empty() {
                debug!("Dropping {} pushes for {}", link.backlog.len(), device);
            }
        }
        inner.service = None;
        self.set_state(inner, ServerState::Idle);

        advertising.and(closed)
    }

    // === Pushes ===

    /// Push a payload to a connected central.
    ///
    /// The payload is split into the device's transmission unit. Notify is
    /// used unless the central subscribed for indications or the
    /// characteristic only supports indicate.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] unless the server is serving and `device` is linked
    /// - [`Error::CharacteristicNotFound`] / [`Error::ServiceNotFound`]
    /// - [`Error::UnsupportedOperation`] if the characteristic cannot push
    /// - [`Error::AlreadyInProgress`] if the device's backlog is full
    pub fn notify(&self, device: &str, characteristic: Uuid, payload: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;

        if inner.state != ServerState::Serving {
            return Err(Error::NotConnected);
        }
        let Some(service) = &inner.service else {
            return Err(Error::NotConnected);
        };
        let properties = find_characteristic(std::slice::from_ref(service), &service.uuid, &characteristic)?
            .properties;
        if !properties.can_push() {
            return Err(Error::unsupported(format!("push on {}", characteristic)));
        }
        let path = AttributePath::characteristic(service.uuid, characteristic);

        let link = inner.devices.get_mut(device).ok_or(Error::NotConnected)?;
        let confirm = match link.subscriptions.get(&path) {
            Some(configuration) if configuration.is_enabled() => {
                configuration.requires_confirmation()
            }
            _ => !properties.contains(CharProperties::NOTIFY),
        };

        self.enqueue(device, link, path, payload, confirm)
    }

    fn enqueue(
        &self,
        device: &str,
        link: &mut LinkedDevice,
        path: AttributePath,
        payload: &[u8],
        confirm: bool,
    ) -> Result<()> {
        if link.backlog.len() >= self.config.max_pending_pushes {
            return Err(Error::in_progress(format!("push to {}", device)));
        }

        let mut queue = FragmentQueue::from_payload(payload, link.chunk_size);
        if queue.is_empty() {
            queue.push(Bytes::new());
        }
        debug!(
            "Queueing {} byte push to {} on {} ({} chunks)",
            payload.len(),
            device,
            path,
            queue.len()
        );
        link.backlog.push_back(PushJob {
            path,
            queue,
            confirm,
            sent: 0,
            cancelled: false,
        });

        self.pump(device, link);
        Ok(())
    }

    /// Hand the next unit to the platform unless one is still in flight.
    fn pump(&self, device: &str, link: &mut LinkedDevice) {
        while !link.in_flight {
            let Some(job) = link.backlog.front_mut() else {
                return;
            };
            let path = job.path;

            match job.queue.pop_front() {
                Some(chunk) => {
                    match self
                        .adapter
                        .notify_changed(device, &path, &chunk, job.confirm)
                    {
                        Ok(()) => {
                            trace!("Pushed {} bytes to {} on {}", chunk.len(), device, path);
                            job.sent += chunk.len();
                            link.in_flight = true;
                        }
                        Err(e) => {
                            warn!("Push to {} failed: {}", device, e);
                            link.backlog.pop_front();
                            self.emit(ServerEvent::PushFailed {
                                device: device.to_string(),
                                characteristic: path,
                                status: GattStatus::FAILURE,
                            });
                        }
                    }
                }
                None if job.cancelled => {
                    link.backlog.pop_front();
                    debug!("Cancelled push to {} on {} settled", device, path);
                    self.emit(ServerEvent::PushFailed {
                        device: device.to_string(),
                        characteristic: path,
                        status: GattStatus::FAILURE,
                    });
                }
                None => {
                    let bytes = job.sent;
                    link.backlog.pop_front();
                    debug!("Push of {} bytes to {} complete", bytes, device);
                    self.emit(ServerEvent::PushComplete {
                        device: device.to_string(),
                        characteristic: path,
                        bytes,
                    });
                }
            }
        }
    }

    // === Platform callbacks ===

    /// Feed a platform callback into the session.
    pub fn handle_callback(&self, callback: ServerCallback) {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;

        match callback {
            ServerCallback::ConnectionStateChanged {
                device,
                status,
                connected,
            } => self.on_connection_state(inner, device, status, connected),
            ServerCallback::ServiceAdded { status, service } => {
                self.on_service_added(inner, service, status)
            }
            ServerCallback::AdvertisingStarted => {
                info!("Advertising started");
                self.emit(ServerEvent::AdvertisingStarted);
            }
            ServerCallback::AdvertisingFailed { code } => {
                warn!("Advertising failed with code {}", code);
                self.emit(ServerEvent::AdvertisingFailed { code });
            }
            ServerCallback::CharacteristicReadRequest {
                device,
                request_id,
                offset,
                path,
            } => {
                let (status, value) = if inner.state.is_open() {
                    split_result(self.handler.read_characteristic(&device, &path, offset))
                } else {
                    (GattStatus::FAILURE, Vec::new())
                };
                self.respond(
                    &device,
                    request_id,
                    RequestKind::ReadCharacteristic,
                    Some(path),
                    status,
                    offset,
                    &value,
                );
            }
            ServerCallback::CharacteristicWriteRequest {
                device,
                request_id,
                path,
                prepared,
                offset,
                value,
                ..
            } => {
                trace!(
                    "Write request {} from {} ({} bytes, prepared: {})",
                    request_id,
                    device,
                    value.len(),
                    prepared
                );
                let status = if inner.state.is_open() {
                    self.handler
                        .write_characteristic(&device, &path, offset, &value)
                        .err()
                        .unwrap_or(GattStatus::SUCCESS)
                } else {
                    GattStatus::FAILURE
                };
                self.respond(
                    &device,
                    request_id,
                    RequestKind::WriteCharacteristic,
                    Some(path),
                    status,
                    offset,
                    &value,
                );
                if status.is_success() {
                    self.emit(ServerEvent::MessageReceived {
                        device,
                        characteristic: path,
                        value: Bytes::from(value),
                    });
                }
            }
            ServerCallback::DescriptorReadRequest {
                device,
                request_id,
                offset,
                path,
            } => {
                let (status, value) = if !inner.state.is_open() {
                    (GattStatus::FAILURE, Vec::new())
                } else if path.descriptor == Some(CLIENT_CHARACTERISTIC_CONFIG_UUID) {
                    let configuration = inner
                        .devices
                        .get(&device)
                        .and_then(|link| link.subscriptions.get(&path.without_descriptor()))
                        .copied()
                        .unwrap_or(ClientConfiguration::Disabled);
                    (GattStatus::SUCCESS, configuration.to_bytes().to_vec())
                } else {
                    split_result(self.handler.read_descriptor(&device, &path, offset))
                };
                self.respond(
                    &device,
                    request_id,
                    RequestKind::ReadDescriptor,
                    Some(path),
                    status,
                    offset,
                    &value,
                );
            }
            ServerCallback::DescriptorWriteRequest {
                device,
                request_id,
                path,
                offset,
                value,
                ..
            } => self.on_descriptor_write(inner, device, request_id, path, offset, value),
            ServerCallback::ExecuteWrite {
                device,
                request_id,
                execute,
            } => {
                debug!("Execute write from {}: {}", device, execute);
                let status = if inner.state.is_open() {
                    GattStatus::SUCCESS
                } else {
                    GattStatus::FAILURE
                };
                self.respond(
                    &device,
                    request_id,
                    RequestKind::ExecuteWrite,
                    None,
                    status,
                    0,
                    &[],
                );
            }
            ServerCallback::NotificationSent { device, status } => {
                self.on_notification_sent(inner, device, status)
            }
            ServerCallback::MtuChanged { device, mtu } => {
                debug!("MTU for {} changed to {}", device, mtu);
                if self.transport.follow_mtu {
                    if let Some(link) = inner.devices.get_mut(&device) {
                        link.chunk_size = chunk_size_for_mtu(mtu);
                    }
                }
                self.emit(ServerEvent::MtuChanged { device, mtu });
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn respond(
        &self,
        device: &str,
        request_id: u32,
        kind: RequestKind,
        path: Option<AttributePath>,
        status: GattStatus,
        offset: u16,
        value: &[u8],
    ) {
        trace!(
            "Responding to {:?} {} from {} with {}",
            kind,
            request_id,
            device,
            status
        );
        if let Err(e) = self
            .adapter
            .send_response(device, request_id, status, offset, value)
        {
            warn!("Failed to answer request {} from {}: {}", request_id, device, e);
        }
        self.emit(ServerEvent::RequestReceived {
            device: device.to_string(),
            request_id,
            kind,
            path,
            status,
        });
    }

    fn on_connection_state(
        &self,
        inner: &mut ServerInner,
        device: String,
        status: GattStatus,
        connected: bool,
    ) {
        if !inner.state.is_open() {
            trace!("Ignoring link change of {} while closed", device);
            return;
        }

        if connected && status.is_success() {
            if inner.devices.contains_key(&device) {
                return;
            }
            info!("Central {} connected", device);
            inner.devices.insert(
                device.clone(),
                LinkedDevice::new(self.transport.chunk_size.max(1)),
            );
            self.emit(ServerEvent::DeviceLinked { device });
        } else if let Some(link) = inner.devices.remove(&device) {
            info!("Central {} disconnected ({})", device, status);
            if !link.backlog.is_empty() {
                debug!("Dropping {} pushes for {}", link.backlog.len(), device);
            }
            self.emit(ServerEvent::DeviceUnlinked { device });
        }
    }

    fn on_service_added(&self, inner: &mut ServerInner, service: Uuid, status: GattStatus) {
        if inner.state != ServerState::Advertising {
            trace!("Ignoring service added in {}", inner.state);
            return;
        }

        self.emit(ServerEvent::ServiceAdded { service, status });
        if status.is_success() {
            info!("Service {} registered", service);
            self.set_state(inner, ServerState::Serving);
        } else {
            warn!("Service {} registration failed: {}", service, status);
            if let Err(e) = self.shutdown(inner) {
                warn!("Teardown after failed registration: {}", e);
            }
        }
    }

    fn on_descriptor_write(
        &self,
        inner: &mut ServerInner,
        device: String,
        request_id: u32,
        path: AttributePath,
        offset: u16,
        value: Vec<u8>,
    ) {
        if !inner.state.is_open() {
            self.respond(
                &device,
                request_id,
                RequestKind::WriteDescriptor,
                Some(path),
                GattStatus::FAILURE,
                offset,
                &[],
            );
            return;
        }

        if path.descriptor != Some(CLIENT_CHARACTERISTIC_CONFIG_UUID) {
            let status = self
                .handler
                .write_descriptor(&device, &path, offset, &value)
                .err()
                .unwrap_or(GattStatus::SUCCESS);
            self.respond(
                &device,
                request_id,
                RequestKind::WriteDescriptor,
                Some(path),
                status,
                offset,
                &value,
            );
            return;
        }

        let Some(configuration) = ClientConfiguration::from_bytes(&value) else {
            self.respond(
                &device,
                request_id,
                RequestKind::WriteDescriptor,
                Some(path),
                GattStatus::INVALID_ATTRIBUTE_LENGTH,
                offset,
                &[],
            );
            return;
        };

        self.respond(
            &device,
            request_id,
            RequestKind::WriteDescriptor,
            Some(path),
            GattStatus::SUCCESS,
            offset,
            &value,
        );

        let characteristic = path.without_descriptor();
        let Some(link) = inner.devices.get_mut(&device) else {
            debug!("Subscription from unlinked {} ignored", device);
            return;
        };

        info!(
            "{} set {} to {:?}",
            device, characteristic, configuration
        );
        if configuration.is_enabled() {
            link.subscriptions.insert(characteristic, configuration);
        } else {
            link.subscriptions.remove(&characteristic);
            for _ in 0..cancel_pushes(link, &characteristic) {
                self.emit(ServerEvent::PushFailed {
                    device: device.clone(),
                    characteristic,
                    status: GattStatus::FAILURE,
                });
            }
        }
        self.emit(ServerEvent::SubscriptionChanged {
            device: device.clone(),
            characteristic,
            configuration,
        });

        if configuration.is_enabled() {
            if let Some(payload) = self.handler.subscription_payload(&device, &characteristic) {
                if let Err(e) = self.enqueue(
                    &device,
                    link,
                    characteristic,
                    &payload,
                    configuration.requires_confirmation(),
                ) {
                    warn!("Initial push to {} not queued: {}", device, e);
                }
            }
        }
    }

    fn on_notification_sent(&self, inner: &mut ServerInner, device: String, status: GattStatus) {
        self.emit(ServerEvent::NotificationSent {
            device: device.clone(),
            status,
        });

        let Some(link) = inner.devices.get_mut(&device) else {
            trace!("Notification sent to unlinked {}", device);
            return;
        };
        link.in_flight = false;

        if !status.is_success() {
            if let Some(job) = link.backlog.pop_front() {
                warn!("Push to {} on {} failed: {}", device, job.path, status);
                self.emit(ServerEvent::PushFailed {
                    device: device.clone(),
                    characteristic: job.path,
                    status,
                });
            }
        }

        self.pump(&device, link);
    }
}

/// Drop queued pushes for a characteristic and return how many were dropped.
/// A push already in flight keeps the unit being sent, sends nothing more and
/// is reported as failed once that unit settles.
fn cancel_pushes(link: &mut LinkedDevice, characteristic: &AttributePath) -> usize {
    let in_flight = link.in_flight;
    let before = link.backlog.len();
    let mut index = 0;
    link.backlog.retain_mut(|job| {
        let keep = if job.path != *characteristic {
            true
        } else if index == 0 && in_flight {
            job.queue.reset();
            job.cancelled = true;
            true
        } else {
            false
        };
        index += 1;
        keep
    });
    before - link.backlog.len()
}

fn split_result(result: HandlerResult<Vec<u8>>) -> (GattStatus, Vec<u8>) {
    match result {
        Ok(value) => (GattStatus::SUCCESS, value),
        Err(status) => (status, Vec::new()),
    }
}
