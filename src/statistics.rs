use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

pub enum Stats {
    AcceptedConnection,
    ReceivedReport,
    ErrorPacket,
    DroppedReport,
}

/// Runtime counters for the server.
///
/// Cloning shares the underlying counters; connection handlers feed them
/// concurrently and consumers read without locking.
///
/// # Example
///
/// ```
/// use nsca_server::statistics::{Statistics, Stats};
///
/// let statistics = Statistics::default();
///
/// statistics.add(Stats::ReceivedReport);
/// assert_eq!(statistics.received_reports(), 1);
/// assert_eq!(statistics.error_packets(), 0);
/// ```
#[derive(Default, Clone)]
pub struct Statistics(Arc<Counts>);

#[derive(Default)]
struct Counts {
    accepted_connections: AtomicUsize,
    received_reports: AtomicUsize,
    error_packets: AtomicUsize,
    dropped_reports: AtomicUsize,
}

impl Statistics {
    pub fn add(&self, payload: Stats) {
        let counter = match payload {
            Stats::AcceptedConnection => &self.0.accepted_connections,
            Stats::ReceivedReport => &self.0.received_reports,
            Stats::ErrorPacket => &self.0.error_packets,
            Stats::DroppedReport => &self.0.dropped_reports,
        };

        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn accepted_connections(&self) -> usize {
        self.0.accepted_connections.load(Ordering::Relaxed)
    }

    pub fn received_reports(&self) -> usize {
        self.0.received_reports.load(Ordering::Relaxed)
    }

    pub fn error_packets(&self) -> usize {
        self.0.error_packets.load(Ordering::Relaxed)
    }

    pub fn dropped_reports(&self) -> usize {
        self.0.dropped_reports.load(Ordering::Relaxed)
    }
}
