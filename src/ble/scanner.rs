//! Scan lifecycle.
//!
//! Starts and stops platform scans, forwards sightings into the
//! [`DiscoveryCache`] and ends every scan after a bounded interval.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::ble::adapter::{AdapterState, CentralAdapter, ScanApi, Sighting};
use crate::ble::discovery::{DiscoveryCache, SightingOutcome};
use crate::config::ScanConfig;
use crate::error::{Error, Result};

/// Scanner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScanState {
    /// Not scanning.
    #[default]
    Idle,
    /// A scan is running.
    Scanning,
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
        }
    }
}

/// Scan lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// A scan started.
    Started {
        /// API used for the scan.
        api: ScanApi,
    },
    /// The scan ended, by timeout or on request.
    Complete,
}

#[derive(Default)]
struct ScanInner {
    state: ScanState,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

struct ScanShared {
    adapter: Arc<dyn CentralAdapter>,
    inner: Mutex<ScanInner>,
    event_tx: broadcast::Sender<ScanEvent>,
}

impl ScanShared {
    /// End the scan. `generation` is set when a timer fires, so a timer
    /// armed for an earlier scan cannot end the current one.
    fn finish(&self, generation: Option<u64>) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != ScanState::Scanning {
            return false;
        }
        if let Some(generation) = generation {
            if generation != inner.generation {
                trace!("Ignoring stale scan timer {}", generation);
                return false;
            }
        }

        if let Err(e) = self.adapter.stop_scan() {
            warn!("Failed to stop platform scan: {}", e);
        }

        inner.state = ScanState::Idle;
        if let Some(timer) = inner.timer.take() {
            if generation.is_none() {
                timer.abort();
            }
        }

        info!("Scan complete");
        let _ = self.event_tx.send(ScanEvent::Complete);
        true
    }
}

/// Drives platform scans and feeds a [`DiscoveryCache`].
pub struct ScanController {
    shared: Arc<ScanShared>,
    cache: Arc<DiscoveryCache>,
    api: ScanApi,
    timeout: Duration,
}

impl ScanController {
    /// Create a scan controller.
    ///
    /// The scan API is fixed here: the configured override if any, otherwise
    /// whatever the adapter reports.
    pub fn new(
        adapter: Arc<dyn CentralAdapter>,
        cache: Arc<DiscoveryCache>,
        config: &ScanConfig,
    ) -> Self {
        let api = config.api.unwrap_or_else(|| adapter.scan_api());
        let timeout = config.timeout_for(api);
        let (event_tx, _) = broadcast::channel(16);

        debug!("Scan controller using {} API, timeout {:?}", api, timeout);

        Self {
            shared: Arc::new(ScanShared {
                adapter,
                inner: Mutex::new(ScanInner::default()),
                event_tx,
            }),
            cache,
            api,
            timeout,
        }
    }

    /// Start a scan, keeping previously discovered devices.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyInProgress`] if a scan is running
    /// - [`Error::AdapterUnavailable`] or [`Error::AdapterDisabled`] when the
    ///   adapter cannot scan
    /// - any error the adapter returns when asked to start
    pub fn start_scan(&self) -> Result<()> {
        self.start(false)
    }

    /// Clear the discovery cache and start a scan.
    ///
    /// # Errors
    ///
    /// Same as [`ScanController::start_scan`]. The cache is untouched when
    /// the call fails.
    pub fn rescan(&self) -> Result<()> {
        self.start(true)
    }

    fn start(&self, clear: bool) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        if inner.state == ScanState::Scanning {
            return Err(Error::in_progress("scan"));
        }

        match self.shared.adapter.state() {
            AdapterState::Unavailable => return Err(Error::AdapterUnavailable),
            AdapterState::Disabled => return Err(Error::AdapterDisabled),
            AdapterState::Enabled => {}
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::Internal("scan timer needs a tokio runtime".to_string()))?;

        if clear {
            self.cache.clear();
        }

        self.shared.adapter.start_scan()?;

        inner.state = ScanState::Scanning;
        inner.generation += 1;
        let generation = inner.generation;

        let shared = self.shared.clone();
        let timeout = self.timeout;
        inner.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            debug!("Scan {} timed out after {:?}", generation, timeout);
            shared.finish(Some(generation));
        }));

        info!("Scan {} started ({} API)", generation, self.api);
        let _ = self.shared.event_tx.send(ScanEvent::Started { api: self.api });
        Ok(())
    }

    /// Stop the running scan. Returns `false` if no scan was running.
    pub fn stop_scan(&self) -> bool {
        self.shared.finish(None)
    }

    /// Feed one platform sighting. Dropped unless a scan is running.
    pub fn on_sighting(&self, sighting: &Sighting) -> Option<SightingOutcome> {
        let inner = self.shared.inner.lock();
        if inner.state != ScanState::Scanning {
            trace!("Dropping sighting of {} while idle", sighting.address);
            return None;
        }

        Some(self.cache.on_sighting(
            &sighting.address,
            sighting.name.as_deref(),
            sighting.rssi,
            Instant::now(),
        ))
    }

    /// Current state.
    pub fn state(&self) -> ScanState {
        self.shared.inner.lock().state
    }

    /// Check if a scan is running.
    pub fn is_scanning(&self) -> bool {
        self.state() == ScanState::Scanning
    }

    /// Scan API in use.
    pub fn api(&self) -> ScanApi {
        self.api
    }

    /// Duration of each scan.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The cache this controller feeds.
    pub fn cache(&self) -> &Arc<DiscoveryCache> {
        &self.cache
    }

    /// Subscribe to scan lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.shared.event_tx.subscribe()
    }
}

impl Drop for ScanController {
    fn drop(&mut self) {
        if let Some(timer) = self.shared.inner.lock().timer.take() {
            timer.abort();
        }
    }
}
