//! Packet and flow counters, reported on demand via SIGUSR1 and once more
//! at shutdown. Mirrors `print_stats`'s six-line report, using atomics
//! instead of file-scope globals since the capture loop and signal handler
//! run on different threads.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Stats {
    pub packets_received: AtomicU64,
    pub packets_dropped: AtomicU64,
    pub half_open_tcp_flows: AtomicU64,
    pub new_tcp_flows: AtomicU64,
    pub new_http_flows: AtomicU64,
    pub new_pe_flows: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Stats::default()
    }

    pub fn incr_half_open(&self) {
        self.half_open_tcp_flows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_new_tcp(&self) {
        self.new_tcp_flows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_new_http(&self) {
        self.new_http_flows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_new_pe(&self) {
        self.new_pe_flows.fetch_add(1, Ordering::Relaxed);
    }

    /// Formats the report exactly as the original prints it to stderr, so
    /// existing log-scraping tooling built against that output keeps working.
    pub fn report(&self, pcap_stats: Option<(u32, u32)>) -> String {
        let (recv, drop) = pcap_stats.unwrap_or((0, 0));
        format!(
            "----------------------------------\n\
             {recv} packets received by filter \n\
             {drop} packets dropped by kernel\n\
             {half_open} number of new half-open (SYN) tcp flows\n\
             {new_tcp} number of new (SYN ACK) tcp flows\n\
             {new_http} number of new http flows\n\
             {new_pe} number of new PE flows\n\
             ----------------------------------\n",
            recv = recv,
            drop = drop,
            half_open = self.half_open_tcp_flows.load(Ordering::Relaxed),
            new_tcp = self.new_tcp_flows.load(Ordering::Relaxed),
            new_http = self.new_http_flows.load(Ordering::Relaxed),
            new_pe = self.new_pe_flows.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_reflects_incremented_counters() {
        let stats = Stats::new();
        stats.incr_half_open();
        stats.incr_new_tcp();
        stats.incr_new_tcp();
        stats.incr_new_http();
        stats.incr_new_pe();

        let report = stats.report(Some((100, 2)));
        assert!(report.contains("100 packets received by filter"));
        assert!(report.contains("2 packets dropped by kernel"));
        assert!(report.contains("1 number of new half-open"));
        assert!(report.contains("2 number of new (SYN ACK) tcp flows"));
        assert!(report.contains("1 number of new http flows"));
        assert!(report.contains("1 number of new PE flows"));
    }
}
