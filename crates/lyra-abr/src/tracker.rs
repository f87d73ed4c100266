//! Byte/time accounting for concurrently active downloads.

use std::{collections::HashMap, time::Duration};

use tracing::trace;

/// Identifier handed out when a download begins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DownloadId(u64);

impl DownloadId {
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// One progress report of a download.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DownloadSample {
    /// Estimator-relative time of the report.
    pub at: Duration,
    /// Bytes received since the download began.
    pub total_bytes: u64,
    /// Bytes received since the previous report.
    pub delta_bytes: u64,
}

#[expect(
    clippy::cast_precision_loss,
    reason = "byte counts far below 2^52 in practice"
)]
fn bits_per_second(bytes: u64, span: Duration) -> f64 {
    let secs = span.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    bytes as f64 * 8.0 / secs
}

/// Samples of a single download and the span of time it covers.
#[derive(Clone, Debug)]
pub struct DownloadEntry {
    samples: Vec<DownloadSample>,
    total_bytes: u64,
    min_elapsed: Duration,
    max_elapsed: Duration,
    completed: bool,
    bytes_since_checkpoint: u64,
    running_rate: f64,
}

impl DownloadEntry {
    #[must_use]
    pub fn new(started_at: Duration) -> Self {
        Self {
            samples: Vec::new(),
            total_bytes: 0,
            min_elapsed: started_at,
            max_elapsed: started_at,
            completed: false,
            bytes_since_checkpoint: 0,
            running_rate: 0.0,
        }
    }

    /// Record that `total_bytes` have arrived by `at`.
    ///
    /// Reports that go backwards in byte count contribute zero delta.
    pub fn add_sample(&mut self, at: Duration, total_bytes: u64) {
        let delta_bytes = total_bytes.saturating_sub(self.total_bytes);
        self.samples.push(DownloadSample {
            at,
            total_bytes,
            delta_bytes,
        });
        self.bytes_since_checkpoint = self.bytes_since_checkpoint.saturating_add(delta_bytes);
        self.total_bytes = total_bytes;
        self.max_elapsed = self.max_elapsed.max(at);
    }

    /// True once at least `threshold` bytes arrived since the last checkpoint.
    /// Consumes the accumulated count when it fires.
    pub fn is_checkpoint(&mut self, threshold: u64) -> bool {
        if self.bytes_since_checkpoint >= threshold {
            self.bytes_since_checkpoint = 0;
            true
        } else {
            false
        }
    }

    /// Rate over the whole span of this download.
    #[must_use]
    pub fn span_rate(&self) -> f64 {
        bits_per_second(self.total_bytes, self.max_elapsed - self.min_elapsed)
    }

    /// This download's contribution to throughput during `[start, end]`.
    ///
    /// Fully contained downloads report their full-span rate. A partial
    /// overlap sums only the samples reported inside the window and divides
    /// by the overlapping duration, so parallel downloads are credited in
    /// proportion to their time overlap.
    #[must_use]
    pub fn rate_over_span(&self, start: Duration, end: Duration) -> f64 {
        if self.max_elapsed < start || self.min_elapsed > end {
            return 0.0;
        }
        let starts_inside = self.min_elapsed >= start;
        let ends_inside = self.max_elapsed <= end;
        match (starts_inside, ends_inside) {
            (true, true) => self.span_rate(),
            (true, false) => {
                let bytes = self.bytes_between(Duration::ZERO, end);
                bits_per_second(bytes, end - self.min_elapsed)
            }
            (false, true) => {
                let bytes = self.bytes_between(start, Duration::MAX);
                bits_per_second(bytes, self.max_elapsed - start)
            }
            (false, false) => {
                let bytes = self.bytes_between(start, end);
                bits_per_second(bytes, end.saturating_sub(start))
            }
        }
    }

    fn bytes_between(&self, from: Duration, to: Duration) -> u64 {
        self.samples
            .iter()
            .filter(|s| s.at >= from && s.at <= to)
            .map(|s| s.delta_bytes)
            .sum()
    }

    #[must_use]
    pub fn samples(&self) -> &[DownloadSample] {
        &self.samples
    }

    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    #[must_use]
    pub fn min_elapsed(&self) -> Duration {
        self.min_elapsed
    }

    #[must_use]
    pub fn max_elapsed(&self) -> Duration {
        self.max_elapsed
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn running_rate(&self) -> f64 {
        self.running_rate
    }
}

/// All downloads that may still matter for an overlap computation.
#[derive(Debug, Default)]
pub struct DownloadTracker {
    entries: HashMap<DownloadId, DownloadEntry>,
    next_id: u64,
}

impl DownloadTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an id without tracking anything yet.
    pub fn allocate_id(&mut self) -> DownloadId {
        self.next_id += 1;
        DownloadId(self.next_id)
    }

    /// Begin tracking a download under a freshly allocated id.
    pub fn start(&mut self, at: Duration) -> DownloadId {
        let id = self.allocate_id();
        self.entries.insert(id, DownloadEntry::new(at));
        id
    }

    /// Append a sample. Returns whether the entry reached a checkpoint, or
    /// `None` for an id that is not tracked.
    pub fn add_sample(
        &mut self,
        id: DownloadId,
        at: Duration,
        total_bytes: u64,
        checkpoint_bytes: u64,
    ) -> Option<bool> {
        let Some(entry) = self.entries.get_mut(&id) else {
            trace!(id = id.0, "sample for untracked download ignored");
            return None;
        };
        entry.add_sample(at, total_bytes);
        Some(entry.is_checkpoint(checkpoint_bytes))
    }

    /// Mark a download as finished. Returns false for an untracked id.
    pub fn complete(&mut self, id: DownloadId) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.completed = true;
                true
            }
            None => false,
        }
    }

    /// Own-span rate of `id` plus the overlap contribution of every other
    /// tracked download, completed or not.
    ///
    /// Concurrent downloads are combined additively, not as a 1/N share.
    /// With many short parallel requests this overestimates available
    /// bandwidth; the behavior is kept as is.
    #[must_use]
    pub fn calculate_rate(&self, id: DownloadId) -> f64 {
        let Some(entry) = self.entries.get(&id) else {
            return 0.0;
        };
        let (start, end) = (entry.min_elapsed, entry.max_elapsed);
        let others: f64 = self
            .entries
            .iter()
            .filter(|(other, _)| **other != id)
            .map(|(_, e)| e.rate_over_span(start, end))
            .sum();
        entry.span_rate() + others
    }

    /// Recompute and store the running rate of `id`.
    pub fn update_running_rate(&mut self, id: DownloadId) -> Option<f64> {
        let rate = self.calculate_rate(id);
        let entry = self.entries.get_mut(&id)?;
        entry.running_rate = rate;
        Some(rate)
    }

    /// Drop entries that can no longer overlap an active download.
    ///
    /// Everything goes once no download is active. Otherwise a completed
    /// entry goes when it ended before the earliest start among the active
    /// downloads.
    ///
    /// A download that never completes would pin that marker forever. An
    /// incomplete entry is therefore treated as abandoned once a download
    /// started after its last sample has completed, and is dropped first.
    pub fn cleanup(&mut self) {
        let latest_completed_start = self
            .entries
            .values()
            .filter(|e| e.completed)
            .map(|e| e.min_elapsed)
            .max();
        if let Some(latest) = latest_completed_start {
            let before = self.entries.len();
            self.entries.retain(|_, e| e.completed || e.max_elapsed >= latest);
            let abandoned = before - self.entries.len();
            if abandoned > 0 {
                trace!(abandoned, "stale incomplete downloads dropped");
            }
        }

        let earliest_active = self
            .entries
            .values()
            .filter(|e| !e.completed)
            .map(|e| e.min_elapsed)
            .min();
        let Some(earliest_active) = earliest_active else {
            if !self.entries.is_empty() {
                trace!(removed = self.entries.len(), "all downloads complete");
            }
            self.entries.clear();
            return;
        };
        let before = self.entries.len();
        self.entries
            .retain(|_, e| !(e.completed && e.max_elapsed < earliest_active));
        trace!(
            removed = before - self.entries.len(),
            remaining = self.entries.len(),
            "download history cleaned"
        );
    }

    #[must_use]
    pub fn get(&self, id: DownloadId) -> Option<&DownloadEntry> {
        self.entries.get(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
