//! Background dumping of recovered PE payloads to disk.
//!
//! A small pool of worker threads drains jobs off a bounded
//! [`crossbeam::channel`], the same channel-plus-thread-pool idiom the
//! teacher uses for its dedicated worker threads (see
//! `multicore::dedicated_worker`), just without the core-pinning that
//! depends on a DPDK runtime we don't have here. Each job owns everything
//! it needs to write the file: no shared state, no synchronization besides
//! the channel handoff itself.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use crossbeam::channel::{Receiver, Sender};
use log::{info, warn};

use crate::flow::gap;
use crate::flow::record::DumpSnapshot;
use crate::http;

const TMP_SUFFIX: &str = ".tmp";
const CORRUPT_PE_ALERT: &[u8] = b"CORRUPT_PE";

/// A fully detached unit of work for the dump pool: everything the original
/// flow owned that's needed to write one dump file.
pub struct DumpJob {
    pub file_stem: String,
    pub nic_name: Option<String>,
    pub snapshot: DumpSnapshot,
    pub timestamp: i64,
}

impl DumpJob {
    pub fn new(
        anon_key: impl std::fmt::Display,
        nic_name: Option<String>,
        snapshot: DumpSnapshot,
        timestamp: i64,
    ) -> Self {
        let file_stem = format!("{}-{}", anon_key, snapshot.http_request_count);
        DumpJob {
            file_stem,
            nic_name,
            snapshot,
            timestamp,
        }
    }

    fn file_name(&self) -> String {
        match &self.nic_name {
            // Live captures prefix the dump name with the capture interface;
            // offline replays (-r) have no interface to tag it with.
            Some(nic) => format!("{}~{}", nic, self.file_stem),
            None => self.file_stem.clone(),
        }
    }

    fn is_corrupt(&self) -> bool {
        let buf = &self.snapshot.payload[..self.snapshot.payload_size];
        let content_len = http::content_length(buf);
        let hdr_len = http::resp_header_length(buf);

        let declared_bad = match (content_len, hdr_len) {
            (Some(cl), Some(hl)) => {
                cl == 0 || hl == 0 || (cl as usize + hl) > self.snapshot.payload_size
            }
            _ => true,
        };

        let missing = gap::is_missing(&self.snapshot.seq_list, content_len.unwrap_or(0));
        self.snapshot.corrupt_pe || declared_bad || missing
    }

    fn write_to(&self, dump_dir: &Path) -> Result<PathBuf> {
        let final_path = dump_dir.join(self.file_name());
        let tmp_path = {
            let mut s = final_path.clone().into_os_string();
            s.push(TMP_SUFFIX);
            PathBuf::from(s)
        };

        let mut file = File::create(&tmp_path)
            .with_context(|| format!("cannot write to {}", tmp_path.display()))?;

        write!(file, "% {}\n", self.timestamp)?;
        write!(file, "% {}\n", self.file_stem)?;
        file.write_all(b"% ")?;
        file.write_all(&self.snapshot.url)?;
        file.write_all(b"\n% ")?;
        file.write_all(&self.snapshot.host)?;
        file.write_all(b"\n% ")?;
        file.write_all(&self.snapshot.referer)?;
        file.write_all(b"\n% ")?;
        if self.is_corrupt() {
            file.write_all(CORRUPT_PE_ALERT)?;
        }
        file.write_all(b"\n\n")?;
        file.write_all(&self.snapshot.payload[..self.snapshot.payload_size])?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&tmp_path, &final_path)
            .with_context(|| format!("unable to rename {}", tmp_path.display()))?;
        Ok(final_path)
    }
}

/// A bounded pool of threads that consume [`DumpJob`]s and write them out.
pub struct DumperPool {
    sender: Sender<DumpJob>,
    workers: Vec<JoinHandle<()>>,
}

impl DumperPool {
    pub fn new(dump_dir: PathBuf, num_workers: usize) -> Self {
        let (sender, receiver): (Sender<DumpJob>, Receiver<DumpJob>) =
            crossbeam::channel::bounded(256);

        let workers = (0..num_workers.max(1))
            .map(|id| {
                let receiver = receiver.clone();
                let dump_dir = dump_dir.clone();
                std::thread::Builder::new()
                    .name(format!("pe-dumper-{id}"))
                    .spawn(move || Self::worker_loop(receiver, &dump_dir))
                    .expect("failed to spawn dumper thread")
            })
            .collect();

        DumperPool { sender, workers }
    }

    pub fn submit(&self, job: DumpJob) {
        if self.sender.send(job).is_err() {
            warn!("dump pool is shut down; dropping a recovered payload");
        }
    }

    fn worker_loop(receiver: Receiver<DumpJob>, dump_dir: &Path) {
        for job in receiver.iter() {
            match job.write_to(dump_dir) {
                Ok(path) => info!("wrote dump file {}", path.display()),
                Err(e) => warn!("failed to write dump file: {e:#}"),
            }
        }
    }

    /// Closes the submission side and waits for every queued job to drain.
    pub fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::seqlist::SeqList;

    fn snapshot(payload: &[u8], corrupt: bool, seq_list: SeqList) -> DumpSnapshot {
        DumpSnapshot {
            url: b"GET /a.exe HTTP/1.1".to_vec(),
            host: b"Host: example.com".to_vec(),
            referer: Vec::new(),
            http_request_count: 1,
            payload: payload.to_vec(),
            payload_size: payload.len(),
            seq_list,
            corrupt_pe: corrupt,
        }
    }

    #[test]
    fn writes_preamble_and_renames_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let resp = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nMZ";
        let mut seq_list = SeqList::new();
        seq_list.insert(1000, resp.len() as u32);

        let snap = snapshot(resp, false, seq_list);
        let job = DumpJob::new("10.0.0.1:1234-1.2.3.4:80", None, snap, 1_700_000_000);
        let path = job.write_to(dir.path()).unwrap();

        assert!(path.exists());
        assert!(!path.to_string_lossy().ends_with(".tmp"));
        let written = std::fs::read(&path).unwrap();
        assert!(written.starts_with(b"% 1700000000\n"));
        assert!(written.ends_with(resp));
    }

    #[test]
    fn missing_gap_data_is_flagged_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let resp = b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nMZ";
        let mut seq_list = SeqList::new();
        seq_list.insert(1000, resp.len() as u32);

        let snap = snapshot(resp, false, seq_list);
        let job = DumpJob::new("10.0.0.1:1234-1.2.3.4:80", Some("eth0".to_string()), snap, 1);
        let path = job.write_to(dir.path()).unwrap();

        let written = std::fs::read(&path).unwrap();
        assert!(written.windows(CORRUPT_PE_ALERT.len()).any(|w| w == CORRUPT_PE_ALERT));
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("eth0~"));

        // the on-disk filename carries the nic prefix, but the preamble's
        // second line (the filename-stem line) must not.
        let second_line = written.split(|&b| b == b'\n').nth(1).unwrap();
        assert_eq!(second_line, b"% 10.0.0.1:1234-1.2.3.4:80-1");
    }

    #[test]
    fn complete_payload_is_not_flagged_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let resp = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nMZ";
        let mut seq_list = SeqList::new();
        seq_list.insert(1000, resp.len() as u32);

        let snap = snapshot(resp, false, seq_list);
        let job = DumpJob::new("10.0.0.1:1234-1.2.3.4:80", None, snap, 1);
        let path = job.write_to(dir.path()).unwrap();

        let written = std::fs::read(&path).unwrap();
        assert!(!written.windows(CORRUPT_PE_ALERT.len()).any(|w| w == CORRUPT_PE_ALERT));
    }
}
