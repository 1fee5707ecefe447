//! GATT client (central role) session.
//!
//! A [`ClientSession`] owns one link to a remote peripheral. Requests are
//! issued through a [`CentralAdapter`]; their outcomes arrive later through
//! [`ClientSession::handle_callback`] and are published as [`ClientEvent`]s.
//!
//! Only one GATT operation is outstanding at a time. Outbound writes are
//! split into transmission units and sent one by one, each waiting for the
//! previous write to be acknowledged.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::ble::adapter::{CentralAdapter, CentralCallback};
use crate::ble::gatt::{find_characteristic, AttributePath, CharProperties, GattService, WriteType};
use crate::ble::registry::AttributeRegistry;
use crate::ble::uuids::CLIENT_CHARACTERISTIC_CONFIG_UUID;
use crate::callback::{spawn_listener, CallbackHandle};
use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::protocol::{chunk_size_for_mtu, ClientConfiguration, FragmentQueue, GattStatus};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClientState {
    /// No link.
    #[default]
    Disconnected,
    /// Link requested.
    Connecting,
    /// Link up, profile unknown.
    Connected,
    /// Enumerating the remote profile.
    DiscoveringServices,
    /// Profile known; GATT operations allowed.
    Ready,
    /// The link failed or dropped with an error.
    Failed,
}

impl ClientState {
    /// Check if a link is up.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            Self::Connected | Self::DiscoveringServices | Self::Ready
        )
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::DiscoveringServices)
    }

    /// Check if GATT operations are allowed.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::DiscoveringServices => write!(f, "DiscoveringServices"),
            Self::Ready => write!(f, "Ready"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Kind of GATT operation, used when reporting failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GattOperation {
    /// Opening the link.
    Connect,
    /// Enumerating the profile.
    DiscoverServices,
    /// Reading a characteristic.
    Read,
    /// Writing a characteristic.
    Write,
    /// Writing a descriptor (notification setup).
    DescriptorWrite,
}

impl std::fmt::Display for GattOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::DiscoverServices => write!(f, "service discovery"),
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::DescriptorWrite => write!(f, "descriptor write"),
        }
    }
}

/// Event published by a [`ClientSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The session changed state.
    StateChanged(ClientState),
    /// The remote profile is known.
    ServicesReady {
        /// Discovered services.
        services: Vec<GattService>,
    },
    /// A read finished.
    ReadComplete {
        /// Characteristic read.
        characteristic: AttributePath,
        /// Value read.
        value: Bytes,
    },
    /// Every chunk of a write was acknowledged.
    WriteComplete {
        /// Characteristic written.
        characteristic: AttributePath,
        /// Payload size.
        bytes_written: usize,
    },
    /// Notifications were switched on or off.
    NotificationStateChanged {
        /// Characteristic concerned.
        characteristic: AttributePath,
        /// New setting.
        enabled: bool,
    },
    /// The notifying characteristic pushed a value.
    NotificationReceived {
        /// Characteristic that changed.
        characteristic: AttributePath,
        /// Complete payload.
        value: Bytes,
    },
    /// The link MTU changed.
    MtuChanged {
        /// New ATT MTU.
        mtu: u16,
    },
    /// The platform reported a non-success status.
    OperationFailed {
        /// Failed operation.
        operation: GattOperation,
        /// Reported status.
        status: GattStatus,
    },
}

enum PendingOp {
    Read {
        path: AttributePath,
    },
    Write {
        path: AttributePath,
        write_type: WriteType,
        queue: FragmentQueue,
        total: usize,
    },
    Subscribe {
        path: AttributePath,
        enabled: bool,
    },
}

impl PendingOp {
    fn operation(&self) -> GattOperation {
        match self {
            Self::Read { .. } => GattOperation::Read,
            Self::Write { .. } => GattOperation::Write,
            Self::Subscribe { .. } => GattOperation::DescriptorWrite,
        }
    }
}

struct ClientInner {
    state: ClientState,
    device: Option<String>,
    services: Vec<GattService>,
    notifying: Option<AttributePath>,
    pending: Option<PendingOp>,
    inbound: FragmentQueue,
    chunk_size: usize,
    /// A reconnect to the same address may still see the old link go down.
    stale_disconnect: bool,
}

/// A GATT client session bound to at most one remote device.
pub struct ClientSession {
    adapter: Arc<dyn CentralAdapter>,
    config: TransportConfig,
    registry: AttributeRegistry,
    inner: Mutex<ClientInner>,
    event_tx: broadcast::Sender<ClientEvent>,
    callback_counter: AtomicU64,
}

impl ClientSession {
    /// Create a session using the standard attribute labels for logging.
    pub fn new(adapter: Arc<dyn CentralAdapter>, config: TransportConfig) -> Self {
        Self::with_registry(adapter, config, AttributeRegistry::standard())
    }

    /// Create a session with a custom attribute registry.
    pub fn with_registry(
        adapter: Arc<dyn CentralAdapter>,
        config: TransportConfig,
        registry: AttributeRegistry,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        let chunk_size = config.chunk_size.max(1);

        Self {
            adapter,
            config,
            registry,
            inner: Mutex::new(ClientInner {
                state: ClientState::Disconnected,
                device: None,
                services: Vec::new(),
                notifying: None,
                pending: None,
                inbound: FragmentQueue::new(),
                chunk_size,
                stale_disconnect: false,
            }),
            event_tx,
            callback_counter: AtomicU64::new(0),
        }
    }

    // === State ===

    /// Current state.
    pub fn state(&self) -> ClientState {
        self.inner.lock().state
    }

    /// Address of the current (or pending) remote device.
    pub fn device(&self) -> Option<String> {
        self.inner.lock().device.clone()
    }

    /// Discovered profile. Empty until [`ClientState::Ready`].
    pub fn services(&self) -> Vec<GattService> {
        self.inner.lock().services.clone()
    }

    /// Characteristic currently delivering notifications.
    pub fn notifying(&self) -> Option<AttributePath> {
        self.inner.lock().notifying
    }

    /// Transmission unit used for writes.
    pub fn chunk_size(&self) -> usize {
        self.inner.lock().chunk_size
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_tx.subscribe()
    }

    /// Register a callback for notification payloads.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_notification<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(AttributePath, Bytes) + Send + Sync + 'static,
    {
        spawn_listener(
            &self.callback_counter,
            self.subscribe(),
            |event| match event {
                ClientEvent::NotificationReceived {
                    characteristic,
                    value,
                } => Some((characteristic, value)),
                _ => None,
            },
            move |(characteristic, value)| callback(characteristic, value),
        )
    }

    /// Register a callback for state changes.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_state_changed<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(ClientState) + Send + Sync + 'static,
    {
        spawn_listener(
            &self.callback_counter,
            self.subscribe(),
            |event| match event {
                ClientEvent::StateChanged(state) => Some(state),
                _ => None,
            },
            callback,
        )
    }

    // === Link ===

    /// Connect to a remote device.
    ///
    /// Any existing link (or connection attempt) is torn down first with a
    /// single platform disconnect.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses the connection request. The
    /// session is left `Disconnected`.
    pub fn connect(&self, address: &str) -> Result<()> {
        let mut inner = self.inner.lock();

        let reconnecting = inner.device.as_deref() == Some(address);
        if inner.device.is_some() {
            debug!(
                "Tearing down {} ({}) before connecting to {}",
                inner.device.as_deref().unwrap_or_default(),
                inner.state,
                address
            );
            if let Err(e) = self.teardown(&mut inner) {
                warn!("Disconnect during reconnect failed: {}", e);
            }
        }

        info!("Connecting to {}", address);
        self.adapter.connect(address)?;

        inner.device = Some(address.to_string());
        inner.stale_disconnect = reconnecting;
        self.set_state(&mut inner, ClientState::Connecting);
        Ok(())
    }

    /// Release the link.
    ///
    /// Per-connection state is discarded even when the platform reports an
    /// error, which is then returned.
    pub fn disconnect(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.device.is_none() {
            debug!("Not connected, ignoring disconnect request");
            return Ok(());
        }
        self.teardown(&mut inner)
    }

    fn teardown(&self, inner: &mut ClientInner) -> Result<()> {
        let result = match inner.device.as_deref() {
            Some(address) => {
                info!("Disconnecting from {}", address);
                self.adapter.disconnect(address)
            }
            None => Ok(()),
        };
        self.release(inner);
        inner.device = None;
        self.set_state(inner, ClientState::Disconnected);
        result
    }

    fn release(&self, inner: &mut ClientInner) {
        if let Some(pending) = inner.pending.take() {
            debug!("Discarding pending {}", pending.operation());
        }
        inner.services.clear();
        inner.notifying = None;
        inner.inbound.reset();
        inner.chunk_size = self.config.chunk_size.max(1);
        inner.stale_disconnect = false;
    }

    fn set_state(&self, inner: &mut ClientInner, state: ClientState) {
        if inner.state == state {
            return;
        }
        debug!("Client state {} -> {}", inner.state, state);
        inner.state = state;
        let _ = self.event_tx.send(ClientEvent::StateChanged(state));
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event);
    }

    fn fail(&self, operation: GattOperation, status: GattStatus) {
        warn!("{} failed: {}", operation, status);
        self.emit(ClientEvent::OperationFailed { operation, status });
    }

    // === GATT operations ===

    fn ready_device(inner: &ClientInner, operation: &str) -> Result<String> {
        if !inner.state.is_ready() {
            return Err(Error::NotConnected);
        }
        if let Some(pending) = &inner.pending {
            debug!("Rejecting {} while {} is pending", operation, pending.operation());
            return Err(Error::in_progress(operation));
        }
        inner.device.clone().ok_or(Error::NotConnected)
    }

    /// Read a characteristic. The value arrives as [`ClientEvent::ReadComplete`].
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] unless the session is `Ready`
    /// - [`Error::AlreadyInProgress`] while another operation is pending
    /// - [`Error::ServiceNotFound`] / [`Error::CharacteristicNotFound`]
    /// - [`Error::UnsupportedOperation`] if the characteristic is not readable
    pub fn read(&self, service: Uuid, characteristic: Uuid) -> Result<()> {
        let mut inner = self.inner.lock();
        let address = Self::ready_device(&inner, "read")?;

        let properties = find_characteristic(&inner.services, &service, &characteristic)?.properties;
        if !properties.can_read() {
            return Err(Error::unsupported(format!(
                "read of {}",
                self.registry.describe(&characteristic)
            )));
        }

        let path = AttributePath::characteristic(service, characteristic);
        self.adapter.read_characteristic(&address, &path)?;
        debug!("Reading {}", self.registry.describe(&characteristic));
        inner.pending = Some(PendingOp::Read { path });
        Ok(())
    }

    /// Write a payload to a characteristic.
    ///
    /// With manual chunking the payload is sent in transmission units, each
    /// after the previous one is acknowledged. [`ClientEvent::WriteComplete`]
    /// follows the last unit. An empty payload completes at once.
    ///
    /// # Errors
    ///
    /// Same as [`ClientSession::read`], with the characteristic needing a
    /// write property.
    pub fn write(&self, service: Uuid, characteristic: Uuid, payload: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        let address = Self::ready_device(&inner, "write")?;

        let properties = find_characteristic(&inner.services, &service, &characteristic)?.properties;
        let write_type = WriteType::for_properties(properties).ok_or_else(|| {
            Error::unsupported(format!(
                "write to {}",
                self.registry.describe(&characteristic)
            ))
        })?;

        let path = AttributePath::characteristic(service, characteristic);
        if payload.is_empty() {
            debug!("Empty write to {}, nothing to send", path);
            self.emit(ClientEvent::WriteComplete {
                characteristic: path,
                bytes_written: 0,
            });
            return Ok(());
        }

        let unit = if self.config.manual_chunking {
            inner.chunk_size
        } else {
            payload.len()
        };
        let mut queue = FragmentQueue::from_payload(payload, unit);
        let Some(first) = queue.pop_front() else {
            return Err(Error::Internal("write produced no chunks".to_string()));
        };

        debug!(
            "Writing {} bytes to {} in {} chunk(s)",
            payload.len(),
            self.registry.describe(&characteristic),
            queue.len() + 1
        );
        self.adapter
            .write_characteristic(&address, &path, &first, write_type)?;

        inner.pending = Some(PendingOp::Write {
            path,
            write_type,
            queue,
            total: payload.len(),
        });
        Ok(())
    }

    /// Enable or disable value-change notifications on a characteristic.
    ///
    /// Notify is used when the characteristic supports it, indicate
    /// otherwise. Only one characteristic notifies at a time: enabling a new
    /// one switches the previous one off locally.
    ///
    /// # Errors
    ///
    /// Same as [`ClientSession::read`]; the characteristic needs notify or
    /// indicate and a Client Characteristic Configuration descriptor
    /// ([`Error::DescriptorNotFound`] otherwise).
    pub fn set_notification(
        &self,
        service: Uuid,
        characteristic: Uuid,
        enabled: bool,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let address = Self::ready_device(&inner, "notification setup")?;

        let (properties, has_cccd) = {
            let chr = find_characteristic(&inner.services, &service, &characteristic)?;
            (chr.properties, chr.has_cccd())
        };
        if !properties.can_push() {
            return Err(Error::unsupported(format!(
                "notifications on {}",
                self.registry.describe(&characteristic)
            )));
        }
        if !has_cccd {
            return Err(Error::DescriptorNotFound {
                uuid: CLIENT_CHARACTERISTIC_CONFIG_UUID.to_string(),
            });
        }

        let path = AttributePath::characteristic(service, characteristic);
        let configuration = if !enabled {
            ClientConfiguration::Disabled
        } else if properties.contains(CharProperties::NOTIFY) {
            ClientConfiguration::Notify
        } else {
            ClientConfiguration::Indicate
        };

        let previous = inner
            .notifying
            .filter(|active| enabled && *active != path);
        if let Some(active) = previous {
            debug!("Disabling notifications on {} first", active);
            if let Err(e) = self.adapter.set_notification_enabled(&address, &active, false) {
                warn!("Failed to disable notifications on {}: {}", active, e);
            }
        }

        let requested = self
            .adapter
            .set_notification_enabled(&address, &path, enabled)
            .and_then(|()| {
                self.adapter
                    .write_descriptor(&address, &path.cccd(), &configuration.to_bytes())
            });
        if let Err(e) = requested {
            // The previous slot stays active.
            if let Some(active) = previous {
                if let Err(e) = self.adapter.set_notification_enabled(&address, &active, true) {
                    warn!("Failed to restore notifications on {}: {}", active, e);
                }
            }
            return Err(e);
        }

        if let Some(active) = previous {
            inner.notifying = None;
            self.emit(ClientEvent::NotificationStateChanged {
                characteristic: active,
                enabled: false,
            });
        }

        debug!(
            "Configuring {} as {:?}",
            self.registry.describe(&characteristic),
            configuration
        );
        inner.pending = Some(PendingOp::Subscribe { path, enabled });
        Ok(())
    }

    // === Platform callbacks ===

    /// Feed a platform callback into the session.
    ///
    /// Callbacks for a device other than the current one are ignored.
    pub fn handle_callback(&self, callback: CentralCallback) {
        let mut inner = self.inner.lock();

        if inner.device.as_deref() != Some(callback.address()) {
            trace!("Ignoring callback for stale device {}", callback.address());
            return;
        }

        match callback {
            CentralCallback::ConnectionStateChanged {
                address,
                status,
                connected,
            } => self.on_connection_state(&mut inner, &address, status, connected),
            CentralCallback::ServicesDiscovered {
                status, services, ..
            } => self.on_services_discovered(&mut inner, status, services),
            CentralCallback::CharacteristicRead {
                path,
                status,
                value,
                ..
            } => self.on_read(&mut inner, path, status, value),
            CentralCallback::CharacteristicWrite { address, path, status } => {
                self.on_write(&mut inner, &address, path, status)
            }
            CentralCallback::DescriptorWrite { address, path, status } => {
                self.on_descriptor_write(&mut inner, &address, path, status)
            }
            CentralCallback::CharacteristicChanged { path, value, .. } => {
                self.on_changed(&mut inner, path, value)
            }
            CentralCallback::MtuChanged { mtu, .. } => {
                debug!("MTU changed to {}", mtu);
                if self.config.follow_mtu {
                    inner.chunk_size = chunk_size_for_mtu(mtu);
                    debug!("Chunk size now {}", inner.chunk_size);
                }
                self.emit(ClientEvent::MtuChanged { mtu });
            }
        }
    }

    fn on_connection_state(
        &self,
        inner: &mut ClientInner,
        address: &str,
        status: GattStatus,
        connected: bool,
    ) {
        if !status.is_success() {
            warn!("Link to {} failed in {}: {}", address, inner.state, status);
            let was_connecting = inner.state == ClientState::Connecting;
            self.release(inner);
            inner.device = None;
            self.set_state(inner, ClientState::Failed);
            if was_connecting {
                self.fail(GattOperation::Connect, status);
            }
            return;
        }

        if !connected {
            if inner.stale_disconnect && inner.state == ClientState::Connecting {
                debug!("Ignoring disconnect of the previous link to {}", address);
                inner.stale_disconnect = false;
                return;
            }
            info!("Disconnected from {}", address);
            self.release(inner);
            inner.device = None;
            self.set_state(inner, ClientState::Disconnected);
            return;
        }

        if inner.state != ClientState::Connecting {
            trace!("Ignoring connect callback in {}", inner.state);
            return;
        }

        info!("Connected to {}", address);
        inner.stale_disconnect = false;
        self.set_state(inner, ClientState::Connected);

        match self.adapter.discover_services(address) {
            Ok(()) => self.set_state(inner, ClientState::DiscoveringServices),
            Err(e) => {
                warn!("Service discovery request failed: {}", e);
                self.fail(GattOperation::DiscoverServices, GattStatus::FAILURE);
            }
        }
    }

    fn on_services_discovered(
        &self,
        inner: &mut ClientInner,
        status: GattStatus,
        services: Vec<GattService>,
    ) {
        if inner.state != ClientState::DiscoveringServices {
            trace!("Ignoring service discovery result in {}", inner.state);
            return;
        }

        if !status.is_success() {
            self.set_state(inner, ClientState::Connected);
            self.fail(GattOperation::DiscoverServices, status);
            return;
        }

        for service in &services {
            debug!("Service {}", self.registry.describe(&service.uuid));
            for chr in &service.characteristics {
                debug!(
                    "  Characteristic {} {}",
                    self.registry.describe(&chr.uuid),
                    chr.properties
                );
                for descriptor in &chr.descriptors {
                    trace!("    Descriptor {}", self.registry.describe(&descriptor.uuid));
                }
            }
        }
        info!("Discovered {} services", services.len());

        inner.services = services.clone();
        self.set_state(inner, ClientState::Ready);
        self.emit(ClientEvent::ServicesReady { services });
    }

    fn on_read(
        &self,
        inner: &mut ClientInner,
        path: AttributePath,
        status: GattStatus,
        value: Vec<u8>,
    ) {
        if !matches!(&inner.pending, Some(PendingOp::Read { path: p }) if *p == path) {
            trace!("Ignoring unexpected read result for {}", path);
            return;
        }
        inner.pending = None;

        if !status.is_success() {
            self.fail(GattOperation::Read, status);
            return;
        }

        inner.inbound.reset();
        inner.inbound.push(Bytes::from(value));
        let value = inner.inbound.drain();
        trace!("Read {} bytes from {}", value.len(), path);
        self.emit(ClientEvent::ReadComplete {
            characteristic: path,
            value,
        });
    }

    fn on_write(
        &self,
        inner: &mut ClientInner,
        address: &str,
        path: AttributePath,
        status: GattStatus,
    ) {
        let Some(PendingOp::Write {
            path: pending_path,
            write_type,
            queue,
            total,
        }) = &mut inner.pending
        else {
            trace!("Ignoring unexpected write result for {}", path);
            return;
        };
        if *pending_path != path {
            trace!("Ignoring write result for {}", path);
            return;
        }

        if !status.is_success() {
            inner.pending = None;
            self.fail(GattOperation::Write, status);
            return;
        }

        match queue.pop_front() {
            Some(chunk) => {
                trace!("Writing next {} byte chunk, {} left", chunk.len(), queue.len());
                if let Err(e) = self
                    .adapter
                    .write_characteristic(address, &path, &chunk, *write_type)
                {
                    warn!("Chunk write request failed: {}", e);
                    inner.pending = None;
                    self.fail(GattOperation::Write, GattStatus::FAILURE);
                }
            }
            None => {
                let bytes_written = *total;
                inner.pending = None;
                debug!("Wrote {} bytes to {}", bytes_written, path);
                self.emit(ClientEvent::WriteComplete {
                    characteristic: path,
                    bytes_written,
                });
            }
        }
    }

    fn on_descriptor_write(
        &self,
        inner: &mut ClientInner,
        address: &str,
        path: AttributePath,
        status: GattStatus,
    ) {
        let (target, enabled) = match &inner.pending {
            Some(PendingOp::Subscribe { path: p, enabled }) if p.cccd() == path => (*p, *enabled),
            _ => {
                trace!("Ignoring unexpected descriptor write for {}", path);
                return;
            }
        };
        inner.pending = None;

        if !status.is_success() {
            if enabled {
                if let Err(e) = self.adapter.set_notification_enabled(address, &target, false) {
                    warn!("Failed to roll back notifications on {}: {}", target, e);
                }
            }
            self.fail(GattOperation::DescriptorWrite, status);
            return;
        }

        if enabled {
            inner.notifying = Some(target);
        } else if inner.notifying == Some(target) {
            inner.notifying = None;
        }
        info!(
            "Notifications {} on {}",
            if enabled { "enabled" } else { "disabled" },
            self.registry.describe(&target.characteristic)
        );
        self.emit(ClientEvent::NotificationStateChanged {
            characteristic: target,
            enabled,
        });
    }

    fn on_changed(&self, inner: &mut ClientInner, path: AttributePath, value: Vec<u8>) {
        let path = path.without_descriptor();
        if inner.notifying != Some(path) {
            trace!("Ignoring change on non-notifying {}", path);
            return;
        }

        inner.inbound.reset();
        inner.inbound.push(Bytes::from(value));
        let value = inner.inbound.drain();
        trace!("Notification of {} bytes from {}", value.len(), path);
        self.emit(ClientEvent::NotificationReceived {
            characteristic: path,
            value,
        });
    }

    // === Awaitable helpers ===

    /// Connect and wait until the profile is discovered.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if `timeout` expires first
    /// - [`Error::Disconnected`] if the link drops or fails
    /// - [`Error::PlatformRejected`] if connection or discovery reports a
    ///   non-success status
    pub async fn connect_and_discover(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<Vec<GattService>> {
        let mut rx = self.subscribe();
        self.connect(address)?;

        let mut started = false;
        wait_for(&mut rx, timeout, move |event| match event {
            ClientEvent::StateChanged(ClientState::Connecting) => {
                started = true;
                None
            }
            ClientEvent::StateChanged(ClientState::Disconnected | ClientState::Failed)
                if started =>
            {
                Some(Err(Error::Disconnected))
            }
            ClientEvent::ServicesReady { services } => Some(Ok(services)),
            ClientEvent::OperationFailed {
                operation: operation @ (GattOperation::Connect | GattOperation::DiscoverServices),
                status,
            } => Some(Err(Error::rejected(operation.to_string(), status))),
            _ => None,
        })
        .await
    }

    /// Read a characteristic and wait for the value.
    ///
    /// # Errors
    ///
    /// Errors of [`ClientSession::read`], plus [`Error::Timeout`],
    /// [`Error::Disconnected`] and [`Error::PlatformRejected`].
    pub async fn read_value(
        &self,
        service: Uuid,
        characteristic: Uuid,
        timeout: Duration,
    ) -> Result<Bytes> {
        let mut rx = self.subscribe();
        self.read(service, characteristic)?;

        let target = AttributePath::characteristic(service, characteristic);
        wait_for(&mut rx, timeout, move |event| match event {
            ClientEvent::ReadComplete {
                characteristic,
                value,
            } if characteristic == target => Some(Ok(value)),
            ClientEvent::OperationFailed {
                operation: GattOperation::Read,
                status,
            } => Some(Err(Error::rejected("read", status))),
            ClientEvent::StateChanged(state) if !state.is_connected() => {
                Some(Err(Error::Disconnected))
            }
            _ => None,
        })
        .await
    }

    /// Write a payload and wait until every chunk is acknowledged.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Errors of [`ClientSession::write`], plus [`Error::Timeout`],
    /// [`Error::Disconnected`] and [`Error::PlatformRejected`].
    pub async fn write_value(
        &self,
        service: Uuid,
        characteristic: Uuid,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<usize> {
        let mut rx = self.subscribe();
        self.write(service, characteristic, payload)?;

        let target = AttributePath::characteristic(service, characteristic);
        wait_for(&mut rx, timeout, move |event| match event {
            ClientEvent::WriteComplete {
                characteristic,
                bytes_written,
            } if characteristic == target => Some(Ok(bytes_written)),
            ClientEvent::OperationFailed {
                operation: GattOperation::Write,
                status,
            } => Some(Err(Error::rejected("write", status))),
            ClientEvent::StateChanged(state) if !state.is_connected() => {
                Some(Err(Error::Disconnected))
            }
            _ => None,
        })
        .await
    }
}

async fn wait_for<T>(
    rx: &mut broadcast::Receiver<ClientEvent>,
    timeout: Duration,
    mut matcher: impl FnMut(ClientEvent) -> Option<Result<T>>,
) -> Result<T> {
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(result) = matcher(event) {
                        return result;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event receiver lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return Err(Error::Disconnected),
            }
        }
    };

    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| Error::Timeout)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::adapter::MockCentralAdapter;
    use crate::ble::gatt::{GattCharacteristic, GattDescriptor};
    use crate::ble::uuids::{uuid_from_u16, BATTERY_LEVEL_UUID, BATTERY_SERVICE_UUID};
    use mockall::predicate::{always, eq};
    use pretty_assertions::assert_eq;

    const ADDR: &str = "11:22:33:44:55:66";
    const CHAR_WRITE: Uuid = uuid_from_u16(0xfff2);
    const CHAR_INDICATE: Uuid = uuid_from_u16(0xfff3);
    const CHAR_ALERT: Uuid = uuid_from_u16(0xfff4);

    fn profile() -> Vec<GattService> {
        vec![GattService::primary(BATTERY_SERVICE_UUID)
            .with_characteristic(
                GattCharacteristic::new(
                    BATTERY_LEVEL_UUID,
                    CharProperties::READ | CharProperties::NOTIFY,
                )
                .with_descriptor(GattDescriptor::cccd()),
            )
            .with_characteristic(GattCharacteristic::new(
                CHAR_WRITE,
                CharProperties::WRITE_WITHOUT_RESPONSE,
            ))
            .with_characteristic(GattCharacteristic::new(
                CHAR_INDICATE,
                CharProperties::INDICATE,
            ))
            .with_characteristic(
                GattCharacteristic::new(CHAR_ALERT, CharProperties::INDICATE)
                    .with_descriptor(GattDescriptor::cccd()),
            )]
    }

    fn level_path() -> AttributePath {
        AttributePath::characteristic(BATTERY_SERVICE_UUID, BATTERY_LEVEL_UUID)
    }

    fn alert_path() -> AttributePath {
        AttributePath::characteristic(BATTERY_SERVICE_UUID, CHAR_ALERT)
    }

    /// Ready session with notifications active on the battery level.
    fn notifying_session(adapter: MockCentralAdapter) -> ClientSession {
        let session = ready_session(adapter);
        session
            .set_notification(BATTERY_SERVICE_UUID, BATTERY_LEVEL_UUID, true)
            .unwrap();
        session.handle_callback(CentralCallback::DescriptorWrite {
            address: ADDR.to_string(),
            path: level_path().cccd(),
            status: GattStatus::SUCCESS,
        });
        assert_eq!(session.notifying(), Some(level_path()));
        session
    }

    fn ready_session(mut adapter: MockCentralAdapter) -> ClientSession {
        adapter.expect_connect().returning(|_| Ok(()));
        adapter.expect_discover_services().returning(|_| Ok(()));
        let session = ClientSession::new(Arc::new(adapter), TransportConfig::default());
        session.connect(ADDR).unwrap();
        session.handle_callback(CentralCallback::ConnectionStateChanged {
            address: ADDR.to_string(),
            status: GattStatus::SUCCESS,
            connected: true,
        });
        session.handle_callback(CentralCallback::ServicesDiscovered {
            address: ADDR.to_string(),
            status: GattStatus::SUCCESS,
            services: profile(),
        });
        assert_eq!(session.state(), ClientState::Ready);
        session
    }

    fn drain(rx: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ClientState::DiscoveringServices.to_string(), "DiscoveringServices");
        assert!(ClientState::Ready.is_connected());
        assert!(!ClientState::Failed.is_connected());
        assert!(ClientState::Connecting.is_transitioning());
    }

    #[test]
    fn test_operations_need_ready_state() {
        let mut adapter = MockCentralAdapter::new();
        adapter.expect_read_characteristic().never();
        adapter.expect_write_characteristic().never();
        adapter.expect_write_descriptor().never();
        let session = ClientSession::new(Arc::new(adapter), TransportConfig::default());

        assert!(matches!(
            session.read(BATTERY_SERVICE_UUID, BATTERY_LEVEL_UUID),
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            session.write(BATTERY_SERVICE_UUID, CHAR_WRITE, b"x"),
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            session.set_notification(BATTERY_SERVICE_UUID, BATTERY_LEVEL_UUID, true),
            Err(Error::NotConnected)
        ));
    }

    #[test]
    fn test_connect_runs_discovery() {
        let mut adapter = MockCentralAdapter::new();
        adapter
            .expect_connect()
            .withf(|address| address == ADDR)
            .times(1)
            .returning(|_| Ok(()));
        adapter
            .expect_discover_services()
            .withf(|address| address == ADDR)
            .times(1)
            .returning(|_| Ok(()));
        let session = ClientSession::new(Arc::new(adapter), TransportConfig::default());
        let mut rx = session.subscribe();

        session.connect(ADDR).unwrap();
        session.handle_callback(CentralCallback::ConnectionStateChanged {
            address: ADDR.to_string(),
            status: GattStatus::SUCCESS,
            connected: true,
        });
        assert_eq!(session.state(), ClientState::DiscoveringServices);

        session.handle_callback(CentralCallback::ServicesDiscovered {
            address: ADDR.to_string(),
            status: GattStatus::SUCCESS,
            services: profile(),
        });

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                ClientEvent::StateChanged(ClientState::Connecting),
                ClientEvent::StateChanged(ClientState::Connected),
                ClientEvent::StateChanged(ClientState::DiscoveringServices),
                ClientEvent::StateChanged(ClientState::Ready),
                ClientEvent::ServicesReady {
                    services: profile()
                },
            ]
        );
        assert_eq!(session.services().len(), 1);
    }

    #[test]
    fn test_discovery_failure_returns_to_connected() {
        let mut adapter = MockCentralAdapter::new();
        adapter.expect_connect().returning(|_| Ok(()));
        adapter.expect_discover_services().returning(|_| Ok(()));
        let session = ClientSession::new(Arc::new(adapter), TransportConfig::default());
        session.connect(ADDR).unwrap();
        session.handle_callback(CentralCallback::ConnectionStateChanged {
            address: ADDR.to_string(),
            status: GattStatus::SUCCESS,
            connected: true,
        });
        let mut rx = session.subscribe();
        session.handle_callback(CentralCallback::ServicesDiscovered {
            address: ADDR.to_string(),
            status: GattStatus::FAILURE,
            services: Vec::new(),
        });

        assert_eq!(session.state(), ClientState::Connected);
        assert_eq!(
            drain(&mut rx),
            vec![
                ClientEvent::StateChanged(ClientState::Connected),
                ClientEvent::OperationFailed {
                    operation: GattOperation::DiscoverServices,
                    status: GattStatus::FAILURE,
                },
            ]
        );
    }

    #[test]
    fn test_connect_failure() {
        let mut adapter = MockCentralAdapter::new();
        adapter.expect_connect().returning(|_| Ok(()));
        let session = ClientSession::new(Arc::new(adapter), TransportConfig::default());
        session.connect(ADDR).unwrap();
        session.handle_callback(CentralCallback::ConnectionStateChanged {
            address: ADDR.to_string(),
            status: GattStatus(0x85),
            connected: false,
        });
        assert_eq!(session.state(), ClientState::Failed);
        assert_eq!(session.device(), None);
    }

    #[test]
    fn test_read_passes_value_through() {
        let mut adapter = MockCentralAdapter::new();
        adapter
            .expect_read_characteristic()
            .times(1)
            .returning(|_, _| Ok(()));
        let session = ready_session(adapter);
        let mut rx = session.subscribe();

        session.read(BATTERY_SERVICE_UUID, BATTERY_LEVEL_UUID).unwrap();
        assert!(matches!(
            session.read(BATTERY_SERVICE_UUID, BATTERY_LEVEL_UUID),
            Err(Error::AlreadyInProgress { .. })
        ));

        let path = AttributePath::characteristic(BATTERY_SERVICE_UUID, BATTERY_LEVEL_UUID);
        session.handle_callback(CentralCallback::CharacteristicRead {
            address: ADDR.to_string(),
            path,
            status: GattStatus::SUCCESS,
            value: vec![87],
        });

        assert_eq!(
            drain(&mut rx),
            vec![ClientEvent::ReadComplete {
                characteristic: path,
                value: Bytes::from_static(&[87]),
            }]
        );
    }

    #[test]
    fn test_read_requires_property() {
        let adapter = MockCentralAdapter::new();
        let session = ready_session(adapter);
        assert!(matches!(
            session.read(BATTERY_SERVICE_UUID, CHAR_WRITE),
            Err(Error::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            session.read(BATTERY_SERVICE_UUID, uuid_from_u16(0x1234)),
            Err(Error::CharacteristicNotFound { .. })
        ));
    }

    #[test]
    fn test_chunked_write_waits_for_each_ack() {
        let mut adapter = MockCentralAdapter::new();
        let mut seq = mockall::Sequence::new();
        for len in [20usize, 20, 5] {
            adapter
                .expect_write_characteristic()
                .withf(move |_, _, value, write_type| {
                    value.len() == len && *write_type == WriteType::WithoutResponse
                })
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _, _, _| Ok(()));
        }
        let session = ready_session(adapter);
        let mut rx = session.subscribe();
        let path = AttributePath::characteristic(BATTERY_SERVICE_UUID, CHAR_WRITE);
        let payload: Vec<u8> = (0..45).collect();

        session.write(BATTERY_SERVICE_UUID, CHAR_WRITE, &payload).unwrap();
        for _ in 0..3 {
            session.handle_callback(CentralCallback::CharacteristicWrite {
                address: ADDR.to_string(),
                path,
                status: GattStatus::SUCCESS,
            });
        }

        assert_eq!(
            drain(&mut rx),
            vec![ClientEvent::WriteComplete {
                characteristic: path,
                bytes_written: 45,
            }]
        );
    }

    #[test]
    fn test_empty_write_completes_immediately() {
        let mut adapter = MockCentralAdapter::new();
        adapter.expect_write_characteristic().never();
        let session = ready_session(adapter);
        let mut rx = session.subscribe();

        session.write(BATTERY_SERVICE_UUID, CHAR_WRITE, &[]).unwrap();
        assert!(matches!(
            rx.try_recv(),
            Ok(ClientEvent::WriteComplete { bytes_written: 0, .. })
        ));
    }

    #[test]
    fn test_write_failure_reported_once() {
        let mut adapter = MockCentralAdapter::new();
        adapter
            .expect_write_characteristic()
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let session = ready_session(adapter);
        let mut rx = session.subscribe();
        let path = AttributePath::characteristic(BATTERY_SERVICE_UUID, CHAR_WRITE);

        session.write(BATTERY_SERVICE_UUID, CHAR_WRITE, &[0u8; 30]).unwrap();
        session.handle_callback(CentralCallback::CharacteristicWrite {
            address: ADDR.to_string(),
            path,
            status: GattStatus::WRITE_NOT_PERMITTED,
        });
        // A late duplicate is ignored.
        session.handle_callback(CentralCallback::CharacteristicWrite {
            address: ADDR.to_string(),
            path,
            status: GattStatus::WRITE_NOT_PERMITTED,
        });

        assert_eq!(
            drain(&mut rx),
            vec![ClientEvent::OperationFailed {
                operation: GattOperation::Write,
                status: GattStatus::WRITE_NOT_PERMITTED,
            }]
        );
        assert_eq!(session.state(), ClientState::Ready);
    }

    #[test]
    fn test_enable_notification_prefers_notify() {
        let mut adapter = MockCentralAdapter::new();
        adapter
            .expect_set_notification_enabled()
            .with(always(), always(), eq(true))
            .times(1)
            .returning(|_, _, _| Ok(()));
        adapter
            .expect_write_descriptor()
            .withf(|_, path, value| {
                path.descriptor == Some(CLIENT_CHARACTERISTIC_CONFIG_UUID) && value == [1, 0]
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        let session = ready_session(adapter);
        let mut rx = session.subscribe();
        let path = AttributePath::characteristic(BATTERY_SERVICE_UUID, BATTERY_LEVEL_UUID);

        session
            .set_notification(BATTERY_SERVICE_UUID, BATTERY_LEVEL_UUID, true)
            .unwrap();
        // Not active until the descriptor write completes.
        assert_eq!(session.notifying(), None);

        session.handle_callback(CentralCallback::DescriptorWrite {
            address: ADDR.to_string(),
            path: path.cccd(),
            status: GattStatus::SUCCESS,
        });
        assert_eq!(session.notifying(), Some(path));

        session.handle_callback(CentralCallback::CharacteristicChanged {
            address: ADDR.to_string(),
            path,
            value: b"hello".to_vec(),
        });
        // Changes on other characteristics are not delivered.
        session.handle_callback(CentralCallback::CharacteristicChanged {
            address: ADDR.to_string(),
            path: AttributePath::characteristic(BATTERY_SERVICE_UUID, CHAR_WRITE),
            value: b"nope".to_vec(),
        });

        assert_eq!(
            drain(&mut rx),
            vec![
                ClientEvent::NotificationStateChanged {
                    characteristic: path,
                    enabled: true,
                },
                ClientEvent::NotificationReceived {
                    characteristic: path,
                    value: Bytes::from_static(b"hello"),
                },
            ]
        );
    }

    #[test]
    fn test_notification_needs_push_property_and_cccd() {
        let mut adapter = MockCentralAdapter::new();
        adapter.expect_write_descriptor().never();
        let session = ready_session(adapter);
        assert!(matches!(
            session.set_notification(BATTERY_SERVICE_UUID, CHAR_WRITE, true),
            Err(Error::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            session.set_notification(BATTERY_SERVICE_UUID, CHAR_INDICATE, true),
            Err(Error::DescriptorNotFound { .. })
        ));
    }

    #[test]
    fn test_indicate_only_writes_indication_value() {
        let mut adapter = MockCentralAdapter::new();
        adapter
            .expect_set_notification_enabled()
            .returning(|_, _, _| Ok(()));
        adapter
            .expect_write_descriptor()
            .withf(|_, path, value| *path == alert_path().cccd() && value == [2, 0])
            .times(1)
            .returning(|_, _, _| Ok(()));
        let session = ready_session(adapter);

        session
            .set_notification(BATTERY_SERVICE_UUID, CHAR_ALERT, true)
            .unwrap();
        session.handle_callback(CentralCallback::DescriptorWrite {
            address: ADDR.to_string(),
            path: alert_path().cccd(),
            status: GattStatus::SUCCESS,
        });
        assert_eq!(session.notifying(), Some(alert_path()));
    }

    #[test]
    fn test_enabling_second_characteristic_disables_first() {
        let mut adapter = MockCentralAdapter::new();
        let mut seq = mockall::Sequence::new();
        adapter
            .expect_set_notification_enabled()
            .withf(|_, path, enabled| *path == level_path() && *enabled)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        adapter
            .expect_write_descriptor()
            .withf(|_, path, _| *path == level_path().cccd())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        adapter
            .expect_set_notification_enabled()
            .withf(|_, path, enabled| *path == level_path() && !*enabled)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        adapter
            .expect_set_notification_enabled()
            .withf(|_, path, enabled| *path == alert_path() && *enabled)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        adapter
            .expect_write_descriptor()
            .withf(|_, path, value| *path == alert_path().cccd() && value == [2, 0])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        let session = notifying_session(adapter);
        let mut rx = session.subscribe();

        session
            .set_notification(BATTERY_SERVICE_UUID, CHAR_ALERT, true)
            .unwrap();
        assert_eq!(session.notifying(), None);
        session.handle_callback(CentralCallback::DescriptorWrite {
            address: ADDR.to_string(),
            path: alert_path().cccd(),
            status: GattStatus::SUCCESS,
        });
        assert_eq!(session.notifying(), Some(alert_path()));

        // The old characteristic no longer delivers.
        session.handle_callback(CentralCallback::CharacteristicChanged {
            address: ADDR.to_string(),
            path: level_path(),
            value: vec![50],
        });

        assert_eq!(
            drain(&mut rx),
            vec![
                ClientEvent::NotificationStateChanged {
                    characteristic: level_path(),
                    enabled: false,
                },
                ClientEvent::NotificationStateChanged {
                    characteristic: alert_path(),
                    enabled: true,
                },
            ]
        );
    }

    #[test]
    fn test_failed_switch_keeps_previous_slot() {
        let mut adapter = MockCentralAdapter::new();
        adapter
            .expect_set_notification_enabled()
            .returning(|_, _, _| Ok(()));
        adapter
            .expect_write_descriptor()
            .withf(|_, path, _| *path == level_path().cccd())
            .times(2)
            .returning(|_, _, _| Ok(()));
        adapter
            .expect_write_descriptor()
            .withf(|_, path, _| *path == alert_path().cccd())
            .times(1)
            .returning(|_, _, _| Err(Error::Internal("radio busy".to_string())));
        let session = notifying_session(adapter);
        let mut rx = session.subscribe();

        assert!(session
            .set_notification(BATTERY_SERVICE_UUID, CHAR_ALERT, true)
            .is_err());

        assert_eq!(session.notifying(), Some(level_path()));
        assert!(drain(&mut rx).is_empty());
        // No operation was left pending.
        session
            .set_notification(BATTERY_SERVICE_UUID, BATTERY_LEVEL_UUID, false)
            .unwrap();
    }

    #[test]
    fn test_reconnect_to_same_device_survives_old_link_drop() {
        let mut adapter = MockCentralAdapter::new();
        adapter.expect_connect().times(2).returning(|_| Ok(()));
        adapter.expect_disconnect().times(1).returning(|_| Ok(()));
        adapter
            .expect_discover_services()
            .times(1)
            .returning(|_| Ok(()));
        let session = ClientSession::new(Arc::new(adapter), TransportConfig::default());

        session.connect(ADDR).unwrap();
        session.connect(ADDR).unwrap();
        session.handle_callback(CentralCallback::ConnectionStateChanged {
            address: ADDR.to_string(),
            status: GattStatus::SUCCESS,
            connected: false,
        });
        assert_eq!(session.state(), ClientState::Connecting);

        session.handle_callback(CentralCallback::ConnectionStateChanged {
            address: ADDR.to_string(),
            status: GattStatus::SUCCESS,
            connected: true,
        });
        assert_eq!(session.state(), ClientState::DiscoveringServices);
        assert_eq!(session.device().as_deref(), Some(ADDR));

        // Once the new link is up, a drop is real.
        session.handle_callback(CentralCallback::ConnectionStateChanged {
            address: ADDR.to_string(),
            status: GattStatus::SUCCESS,
            connected: false,
        });
        assert_eq!(session.state(), ClientState::Disconnected);
    }

    #[test]
    fn test_stale_device_callbacks_ignored() {
        let mut adapter = MockCentralAdapter::new();
        adapter.expect_connect().returning(|_| Ok(()));
        adapter.expect_discover_services().never();
        let session = ClientSession::new(Arc::new(adapter), TransportConfig::default());
        session.connect(ADDR).unwrap();
        session.handle_callback(CentralCallback::ConnectionStateChanged {
            address: "AA:AA:AA:AA:AA:AA".to_string(),
            status: GattStatus::SUCCESS,
            connected: true,
        });
        assert_eq!(session.state(), ClientState::Connecting);
    }

    #[test]
    fn test_mtu_follow() {
        let mut session = ready_session(MockCentralAdapter::new());
        assert_eq!(session.chunk_size(), 20);
        session.config.follow_mtu = true;
        session.handle_callback(CentralCallback::MtuChanged {
            address: ADDR.to_string(),
            mtu: 185,
        });
        assert_eq!(session.chunk_size(), 182);
    }

    #[tokio::test]
    async fn test_read_value_times_out() {
        let mut adapter = MockCentralAdapter::new();
        adapter.expect_read_characteristic().returning(|_, _| Ok(()));
        let session = ready_session(adapter);

        let result = session
            .read_value(
                BATTERY_SERVICE_UUID,
                BATTERY_LEVEL_UUID,
                Duration::from_millis(10),
            )
            .await;
        assert!(matches!(result, Err(Error::Timeout)));
    }
}
