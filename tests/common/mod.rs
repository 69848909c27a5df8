// tests/common/mod.rs
// Fakes for the source and transport seams.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

use notam_relay::{
    DeliveryReport, Notice, Poller, PollerSettings, SeenSet, SeenStore, SourceAdapter, Transport,
};

pub const AIRPORT: &str = "KBLM";
pub const DEST: &str = "pager-test";

pub fn notice(id: &str, text: &str) -> Notice {
    Notice::new(Some(id), &[], text)
}

pub fn settings(startup_probe: bool) -> PollerSettings {
    PollerSettings {
        airport_code: AIRPORT.into(),
        destination: DEST.into(),
        startup_probe,
        delivery_delay: Duration::ZERO,
        seed_on_cold_start: startup_probe,
        allow_unstable_ids: true,
    }
}

pub fn store(dir: &Path) -> SeenStore {
    SeenStore::new(dir.join("seen_notams.json"), 1000)
}

#[derive(Default)]
pub struct FakeSource {
    notices: Mutex<Vec<Notice>>,
    fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeSource {
    pub fn with(notices: Vec<Notice>) -> Arc<Self> {
        let s = Self::default();
        *s.notices.lock() = notices;
        Arc::new(s)
    }

    pub fn set(&self, notices: Vec<Notice>) {
        *self.notices.lock() = notices;
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl SourceAdapter for FakeSource {
    async fn fetch(&self, _airport_code: &str) -> Result<Vec<Notice>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("upstream unavailable");
        }
        Ok(self.notices.lock().clone())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Records every attempted send; fails messages containing a marker.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<(String, String)>>,
    fail_marker: Mutex<Option<String>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_when_contains(&self, marker: Option<&str>) {
        *self.fail_marker.lock() = marker.map(str::to_string);
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, destination: &str, message: &str) -> DeliveryReport {
        self.sent
            .lock()
            .push((destination.to_string(), message.to_string()));
        let fail = self
            .fail_marker
            .lock()
            .as_deref()
            .is_some_and(|m| message.contains(m));
        if fail {
            DeliveryReport::failed("simulated outage")
        } else {
            DeliveryReport::ok()
        }
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Blocks each send until the test releases a permit.
pub struct GateTransport {
    pub entered: Notify,
    pub gate: Semaphore,
    pub sends: AtomicUsize,
}

impl GateTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            gate: Semaphore::new(0),
            sends: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl Transport for GateTransport {
    async fn send(&self, _destination: &str, _message: &str) -> DeliveryReport {
        self.entered.notify_one();
        match self.gate.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return DeliveryReport::failed("gate closed"),
        }
        self.sends.fetch_add(1, Ordering::SeqCst);
        DeliveryReport::ok()
    }

    fn name(&self) -> &'static str {
        "gate"
    }
}

pub fn poller(
    settings: PollerSettings,
    source: Arc<FakeSource>,
    transport: Arc<dyn Transport>,
    store: SeenStore,
    seen: SeenSet,
) -> Poller {
    Poller::new(settings, source, transport, store, seen)
}
