use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Metrics collector for the application.
///
/// Tracks endpoint traffic, backend call outcomes and latency, and pipeline
/// throughput. Cheap to clone; all clones share the same counters.
/// Latency samples kept per backend; older samples are dropped
const LATENCY_WINDOW: usize = 1024;

#[derive(Default)]
struct LatencyWindow {
    total_calls: usize,
    recent_ms: VecDeque<u64>,
}

impl LatencyWindow {
    fn record(&mut self, ms: u64) {
        self.total_calls += 1;
        if self.recent_ms.len() == LATENCY_WINDOW {
            self.recent_ms.pop_front();
        }
        self.recent_ms.push_back(ms);
    }
}

#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Backend calls (OCR, detection, translation)
    backend_calls_total: AtomicUsize,
    backend_calls_failed: AtomicUsize,
    backend_latency_ms: DashMap<&'static str, RwLock<LatencyWindow>>,

    // Pipeline throughput
    regions_processed: AtomicUsize,
    regions_failed: AtomicUsize,
    scans_completed: AtomicUsize,
    boxes_returned: AtomicUsize,
    images_ingested: AtomicUsize,
    history_resets: AtomicUsize,
    pool_clears: AtomicUsize,

    // Per-endpoint request counters
    endpoint_counters: DashMap<String, AtomicUsize>,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                backend_calls_total: AtomicUsize::new(0),
                backend_calls_failed: AtomicUsize::new(0),
                backend_latency_ms: DashMap::new(),
                regions_processed: AtomicUsize::new(0),
                regions_failed: AtomicUsize::new(0),
                scans_completed: AtomicUsize::new(0),
                boxes_returned: AtomicUsize::new(0),
                images_ingested: AtomicUsize::new(0),
                history_resets: AtomicUsize::new(0),
                pool_clears: AtomicUsize::new(0),
                endpoint_counters: DashMap::new(),
                start_time: Instant::now(),
            }),
        }
    }

    /// `backend` is a short stage label such as "ocr" or "translate:method1"
    pub fn record_backend_call(&self, backend: &'static str, success: bool, duration: Duration) {
        self.inner.backend_calls_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.inner.backend_calls_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.inner
            .backend_latency_ms
            .entry(backend)
            .or_insert_with(|| RwLock::new(LatencyWindow::default()))
            .write()
            .record(duration.as_millis() as u64);
    }

    pub fn record_region(&self, success: bool) {
        let counter = if success {
            &self.inner.regions_processed
        } else {
            &self.inner.regions_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan(&self, boxes: usize) {
        self.inner.scans_completed.fetch_add(1, Ordering::Relaxed);
        self.inner.boxes_returned.fetch_add(boxes, Ordering::Relaxed);
    }

    pub fn record_images_ingested(&self, count: usize) {
        self.inner.images_ingested.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_history_reset(&self) {
        self.inner.history_resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pool_clear(&self) {
        self.inner.pool_clears.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_endpoint_request(&self, endpoint: &str) {
        self.inner
            .endpoint_counters
            .entry(endpoint.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let backend_latency = self
            .inner
            .backend_latency_ms
            .iter()
            .map(|entry| {
                let window = entry.value().read();
                let values: Vec<u64> = window.recent_ms.iter().copied().collect();
                let stats = LatencyStats {
                    calls: window.total_calls,
                    avg_ms: avg(&values),
                    p50_ms: percentile(&values, 0.5),
                    p95_ms: percentile(&values, 0.95),
                };
                (entry.key().to_string(), stats)
            })
            .collect();

        let endpoint_requests = self
            .inner
            .endpoint_counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();

        MetricsSnapshot {
            backend_calls_total: self.inner.backend_calls_total.load(Ordering::Relaxed),
            backend_calls_failed: self.inner.backend_calls_failed.load(Ordering::Relaxed),
            backend_latency,
            regions_processed: self.inner.regions_processed.load(Ordering::Relaxed),
            regions_failed: self.inner.regions_failed.load(Ordering::Relaxed),
            scans_completed: self.inner.scans_completed.load(Ordering::Relaxed),
            boxes_returned: self.inner.boxes_returned.load(Ordering::Relaxed),
            images_ingested: self.inner.images_ingested.load(Ordering::Relaxed),
            history_resets: self.inner.history_resets.load(Ordering::Relaxed),
            pool_clears: self.inner.pool_clears.load(Ordering::Relaxed),
            endpoint_requests,
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = format!(
            r#"# HELP backend_calls_total Total number of backend calls made
# TYPE backend_calls_total counter
backend_calls_total {}

# HELP backend_calls_failed_total Number of failed backend calls
# TYPE backend_calls_failed_total counter
backend_calls_failed_total {}

# HELP regions_processed_total Regions run through OCR and translation
# TYPE regions_processed_total counter
regions_processed_total {{status="ok"}} {}
regions_processed_total {{status="error"}} {}

# HELP scans_completed_total Completed bubble scans
# TYPE scans_completed_total counter
scans_completed_total {}

# HELP boxes_returned_total Boxes returned by scans
# TYPE boxes_returned_total counter
boxes_returned_total {}

# HELP images_ingested_total Images added to the pool
# TYPE images_ingested_total counter
images_ingested_total {}

# HELP history_resets_total Conversation history resets
# TYPE history_resets_total counter
history_resets_total {}

# HELP pool_clears_total Image pool clears
# TYPE pool_clears_total counter
pool_clears_total {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {}
"#,
            snapshot.backend_calls_total,
            snapshot.backend_calls_failed,
            snapshot.regions_processed,
            snapshot.regions_failed,
            snapshot.scans_completed,
            snapshot.boxes_returned,
            snapshot.images_ingested,
            snapshot.history_resets,
            snapshot.pool_clears,
            snapshot.uptime_seconds,
        );

        if !snapshot.backend_latency.is_empty() {
            out.push_str("\n# HELP backend_latency_avg_ms Average backend latency in milliseconds\n");
            out.push_str("# TYPE backend_latency_avg_ms gauge\n");
            for (backend, stats) in &snapshot.backend_latency {
                out.push_str(&format!(
                    "backend_latency_avg_ms {{backend=\"{}\"}} {}\n",
                    backend, stats.avg_ms
                ));
            }
        }

        if !snapshot.endpoint_requests.is_empty() {
            out.push_str("\n# HELP http_requests_total Requests per endpoint\n");
            out.push_str("# TYPE http_requests_total counter\n");
            for (endpoint, count) in &snapshot.endpoint_requests {
                out.push_str(&format!(
                    "http_requests_total {{endpoint=\"{}\"}} {}\n",
                    endpoint, count
                ));
            }
        }

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyStats {
    /// All calls since startup; the averages cover only the recent window
    pub calls: usize,
    pub avg_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub backend_calls_total: usize,
    pub backend_calls_failed: usize,
    pub backend_latency: BTreeMap<String, LatencyStats>,
    pub regions_processed: usize,
    pub regions_failed: usize,
    pub scans_completed: usize,
    pub boxes_returned: usize,
    pub images_ingested: usize,
    pub history_resets: usize,
    pub pool_clears: usize,
    pub endpoint_requests: BTreeMap<String, usize>,
    pub uptime_seconds: u64,
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}
