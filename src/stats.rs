use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Process-wide counters. Updated lock-free from every request task.
#[derive(Debug)]
pub struct Stats {
    pub start_time: Instant,
    pub requests: AtomicU64,
    pub leaks: AtomicU64,
    pub redacted: AtomicU64,
    pub rejected: AtomicU64,
    pub upstream_errors: AtomicU64,
    pub bytes_in: AtomicU64,
}

impl Stats {
    pub fn new() -> Arc<Self> {
        Arc::new(Stats {
            start_time: Instant::now(),
            requests: AtomicU64::new(0),
            leaks: AtomicU64::new(0),
            redacted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            upstream_errors: AtomicU64::new(0),
            bytes_in: AtomicU64::new(0),
        })
    }

    pub fn add_request(&self, bytes: u64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_leaks(&self, count: u64) {
        self.leaks.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_redacted(&self) {
        self.redacted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_upstream_error(&self) {
        self.upstream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn display(&self) -> String {
        let uptime = self.start_time.elapsed();
        let hours = uptime.as_secs() / 3600;
        let mins = (uptime.as_secs() % 3600) / 60;
        let secs = uptime.as_secs() % 60;

        format!(
            "{}h {}m {}s | {} reqs | {} leaks | {} redacted | {} rejected | {} upstream errors | in {}",
            hours,
            mins,
            secs,
            self.requests.load(Ordering::Relaxed),
            self.leaks.load(Ordering::Relaxed),
            self.redacted.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
            self.upstream_errors.load(Ordering::Relaxed),
            human_bytes(self.bytes_in.load(Ordering::Relaxed)),
        )
    }
}

fn human_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
