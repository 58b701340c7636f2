// Refresh cycle: acquire, filter, aggregate, and decide when to do it again

use crate::backends::SourceKind;
use crate::backends::connections::{AcquireError, Acquisition, ConnectionAcquirer};
use crate::backends::interfaces::{InterfaceCounters, InterfaceSelection};
use crate::connection::ConnectionRecord;
use crate::filter::{self, FilterState, SortMode};
use crate::stats::{self, Bandwidth, BandwidthMonitor, ConnectionStats, CounterSource};
use std::time::{Duration, Instant};

/// Periodic refresh interval
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(3);

/// Quiet period after the last filter keystroke before refreshing
pub const FILTER_DEBOUNCE: Duration = Duration::from_millis(300);

/// Everything the presentation layer needs from one refresh
#[derive(Debug, Clone)]
pub struct RefreshReport {
    /// Filtered and sorted records
    pub records: Vec<ConnectionRecord>,
    /// Record count before filtering
    pub total: usize,
    /// Counts over the filtered records
    pub stats: ConnectionStats,
    pub bandwidth: Option<Bandwidth>,
    /// None until the first successful acquisition
    pub source_used: Option<SourceKind>,
}

/// Owns the acquisition pipeline and the last published record set
pub struct Refresher<C: CounterSource = InterfaceCounters> {
    acquirer: ConnectionAcquirer,
    bandwidth: BandwidthMonitor<C>,
    filter: FilterState,
    last: Option<Acquisition>,
    last_bandwidth: Option<Bandwidth>,
}

impl Refresher<InterfaceCounters> {
    pub fn new(acquirer: ConnectionAcquirer, filter: FilterState, interface: InterfaceSelection) -> Self {
        Self::with_monitor(acquirer, BandwidthMonitor::new(interface), filter)
    }
}

impl<C: CounterSource> Refresher<C> {
    pub fn with_monitor(acquirer: ConnectionAcquirer, bandwidth: BandwidthMonitor<C>, filter: FilterState) -> Self {
        Self {
            acquirer,
            bandwidth,
            filter,
            last: None,
            last_bandwidth: None,
        }
    }

    /// Run one full cycle.
    ///
    /// A failed acquisition leaves the previous record set in place; the caller
    /// can keep showing it (via [`Refresher::reapply`]) alongside the error.
    pub fn refresh(&mut self) -> Result<RefreshReport, AcquireError> {
        let acquisition = self.acquirer.acquire();
        self.last_bandwidth = Some(self.bandwidth.sample());

        let acquisition = acquisition?;
        log::debug!(
            "Acquired {} connection(s) via {}",
            acquisition.records.len(),
            acquisition.source_used
        );
        self.last = Some(acquisition);
        Ok(self.reapply())
    }

    /// Re-filter and re-sort the last acquisition without acquiring again
    pub fn reapply(&self) -> RefreshReport {
        let (records, total, source_used) = match &self.last {
            Some(acquisition) => (
                filter::apply(&acquisition.records, &self.filter),
                acquisition.records.len(),
                Some(acquisition.source_used),
            ),
            None => (Vec::new(), 0, None),
        };

        RefreshReport {
            stats: stats::aggregate(&records),
            records,
            total,
            bandwidth: self.last_bandwidth.clone(),
            source_used,
        }
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    /// Returns true if the text actually changed
    pub fn set_filter_text(&mut self, text: &str) -> bool {
        self.filter.set_text(text)
    }

    pub fn set_sort(&mut self, sort: SortMode) {
        self.filter.set_sort(sort);
    }

    pub fn interface(&self) -> &InterfaceSelection {
        self.bandwidth.selection()
    }

    pub fn cycle_interface(&mut self) -> InterfaceSelection {
        self.bandwidth.cycle_interface().clone()
    }
}

/// Decides when the next refresh is due.
///
/// Triggers: the periodic tick, an explicit request, and a debounced filter
/// change. Every keystroke cancels the pending filter deadline and starts a
/// new one, so a burst of typing produces a single refresh.
#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    interval: Duration,
    next_tick: Instant,
    filter_deadline: Option<Instant>,
    requested: bool,
    paused: bool,
}

impl RefreshScheduler {
    /// The first refresh is due immediately
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next_tick: now,
            filter_deadline: None,
            requested: true,
            paused: false,
        }
    }

    pub fn request(&mut self) {
        self.requested = true;
    }

    /// Cancel any pending filter refresh and restart the debounce window
    pub fn filter_changed(&mut self, now: Instant) {
        self.filter_deadline = Some(now + FILTER_DEBOUNCE);
    }

    /// Stop periodic ticks. Explicit requests still go through.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume periodic ticks with an immediate refresh
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.requested = true;
        }
    }

    fn is_due(&self, now: Instant) -> bool {
        self.requested
            || self.filter_deadline.is_some_and(|deadline| now >= deadline)
            || (!self.paused && now >= self.next_tick)
    }

    /// If a refresh is due, consume every pending trigger and schedule the
    /// next tick one interval from `now`
    pub fn take_due(&mut self, now: Instant) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.requested = false;
        self.filter_deadline = None;
        self.next_tick = now + self.interval;
        true
    }

    /// How long the event loop can wait before the next trigger could fire
    pub fn time_until_due(&self, now: Instant) -> Duration {
        if self.requested {
            return Duration::ZERO;
        }

        let tick = (!self.paused).then_some(self.next_tick);
        [tick, self.filter_deadline]
            .into_iter()
            .flatten()
            .min()
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or(self.interval)
    }
}
