//! Process entry point: parses CLI flags, opens the capture source, and
//! dispatches every decoded TCP segment to the flow table until a stop
//! signal fires or an offline replay runs out of packets.
//!
//! The dispatch loop is grounded in `packet_received` from
//! `original_source/pe_dump/pe_dump.c`: SYN-without-ACK creates a flow
//! (handling a same-key collision first), FIN/RST closes one, and everything
//! else is routed to whichever half of the connection's 4-tuple it matches.
//! The surrounding shape (`env_logger::init` + `clap::Parser` + the
//! `while let Ok(frame) = cap.next()` read loop) follows the teacher's own
//! example binaries and `runtime/offline.rs`.

mod capture;
mod config;
mod decode;
mod dump;
mod flow;
mod http;
mod protocols;
mod signals;
mod stats;
mod utils;

use std::sync::atomic::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use clap::Parser;
use log::info;

use capture::{CaptureHandle, NextFrame};
use config::{Args, RuntimeConfig};
use decode::TcpSegment;
use dump::{DumpJob, DumperPool};
use flow::{AnonKey, CsOutcome, DumpSnapshot, FlowKey, FlowRecord, FlowState, ScOutcome};
use flow::table::{Direction, FlowTable};
use stats::Stats;

/// Frames larger than this are assumed truncated/corrupt and dropped before
/// decoding, matching the original's `PCAP_SNAPLEN` guard.
const PCAP_SNAPLEN: usize = 1514;
/// Number of background threads writing recovered PE dumps to disk.
const NUM_DUMP_WORKERS: usize = 2;

fn main() -> Result<()> {
    let args = Args::parse();
    let config = match RuntimeConfig::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            std::process::exit(1);
        }
    };

    env_logger::Builder::new()
        .filter_level(config.debug_level.to_level_filter())
        .init();

    info!("starting pe-sensor");
    info!("max pe file size = {} KB", config.max_pe_file_size / 1024);
    info!("lru cache size = {}", config.lru_cache_size);
    info!("dump dir = {}", config.dump_dir().display());

    let stop = signals::install()?;

    let anon_key = if config.anonymize_src_ip {
        // Seeded once at start-up from wall-clock seconds, same as the
        // original's `xor_key = (unsigned long)time(NULL)`.
        let seed = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as u32;
        Some(AnonKey::from_seed(seed))
    } else {
        None
    };

    let mut capture = CaptureHandle::open(&config)?;
    info!("bpf filter = {}", config.pcap_filter);
    match config.nic_name() {
        Some(nic) => info!("listening on {nic}"),
        None => info!("reading from capture file"),
    }

    let stats = Stats::new();
    let dumper = DumperPool::new(config.dump_dir.clone(), NUM_DUMP_WORKERS);
    let mut table = FlowTable::new(config.lru_cache_size);

    'capture: while !stop.load(Ordering::SeqCst) {
        let frame = match capture.next_frame() {
            NextFrame::Frame(data) => data,
            NextFrame::Timeout => {
                if signals::stats_requested() {
                    eprint!("{}", stats.report(capture.stats()));
                }
                continue 'capture;
            }
            NextFrame::Eof => break 'capture,
        };

        if frame.len() > PCAP_SNAPLEN {
            continue;
        }
        let Some(seg) = decode::decode_tcp(&frame) else {
            continue;
        };
        if seg.is_empty_ack() {
            continue;
        }

        dispatch(&seg, &mut table, &config, anon_key, &stats, &dumper);

        if signals::stats_requested() {
            eprint!("{}", stats.report(capture.stats()));
        }
    }

    info!("done reading packets");
    for record in table.drain() {
        let anon = record.anon_key;
        if let Some(snapshot) = record.destroy() {
            submit_dump(&dumper, &config, anon, snapshot);
        }
    }
    eprint!("{}", stats.report(capture.stats()));
    dumper.shutdown();

    Ok(())
}

/// Routes one decoded, non-empty-ACK TCP segment to the flow table,
/// mirroring `packet_received`'s dispatch over `flow_direction`.
fn dispatch(
    seg: &TcpSegment,
    table: &mut FlowTable,
    config: &RuntimeConfig,
    anon_key: Option<AnonKey>,
    stats: &Stats,
    dumper: &DumperPool,
) {
    let observed_key = FlowKey::new(seg.src_addr, seg.src_port, seg.dst_addr, seg.dst_port);

    if seg.syn() && !seg.ack() {
        handle_new_syn(observed_key, table, config, anon_key, stats, dumper);
        return;
    }

    let Some((record, direction)) = table.lookup_mut(&observed_key) else {
        return;
    };

    if seg.fin() || seg.rst() {
        let anon = record.anon_key;
        let is_cs_dir = direction == Direction::ClientToServer;
        if let Some(snapshot) = record.handle_close(is_cs_dir, seg) {
            submit_dump(dumper, config, anon, snapshot);
        }
        table.remove(&observed_key);
        return;
    }

    match direction {
        Direction::ClientToServer => handle_cs_packet(seg, record, &observed_key, table, config, stats, dumper),
        Direction::ServerToClient => handle_sc_packet(seg, record, config, stats),
    }
}

/// Handles a pure SYN (no ACK): installs a new flow record, first flushing
/// any stale record already tracked under the same 4-tuple.
fn handle_new_syn(
    observed_key: FlowKey,
    table: &mut FlowTable,
    config: &RuntimeConfig,
    anon_key: Option<AnonKey>,
    stats: &Stats,
    dumper: &DumperPool,
) {
    if let Some(existing) = table.remove(&observed_key) {
        let anon = existing.anon_key;
        if let Some(snapshot) = existing.destroy() {
            submit_dump(dumper, config, anon, snapshot);
        }
    }

    let anon = anon_key
        .map(|k| k.anonymize(&observed_key))
        .unwrap_or(observed_key);
    let evicted = table.insert(observed_key, FlowRecord::new_on_syn(observed_key, anon));
    if let Some(evicted) = evicted {
        let anon = evicted.anon_key;
        if let Some(snapshot) = evicted.destroy() {
            submit_dump(dumper, config, anon, snapshot);
        }
    }
    stats.incr_half_open();
}

/// Handles a client-to-server segment against an already-tracked flow.
fn handle_cs_packet(
    seg: &TcpSegment,
    record: &mut FlowRecord,
    observed_key: &FlowKey,
    table: &mut FlowTable,
    config: &RuntimeConfig,
    stats: &Stats,
    dumper: &DumperPool,
) {
    let anon = record.anon_key;
    let was_waiting_for_first_request = record.state == FlowState::SynAck;

    match record.handle_cs(seg) {
        CsOutcome::NotHttp => {
            table.remove(observed_key);
        }
        CsOutcome::Ignored => {
            if was_waiting_for_first_request {
                stats.incr_new_http();
            }
        }
        CsOutcome::DumpAndContinue(snapshot) => {
            submit_dump(dumper, config, anon, snapshot);
        }
    }
}

/// Handles a server-to-client segment against an already-tracked flow.
fn handle_sc_packet(seg: &TcpSegment, record: &mut FlowRecord, config: &RuntimeConfig, stats: &Stats) {
    if seg.syn() && seg.ack() {
        record.on_synack();
        stats.incr_new_tcp();
        return;
    }

    if let ScOutcome::PeStarted = record.handle_sc(seg, config.max_pe_file_size) {
        stats.incr_new_pe();
    }
}

/// Hands a detached flow snapshot off to the dumper pool, stamping it with
/// the current wall-clock time and the capture's NIC name (if live).
fn submit_dump(dumper: &DumperPool, config: &RuntimeConfig, anon_key: FlowKey, snapshot: DumpSnapshot) {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let nic_name = config.nic_name().map(str::to_string);
    dumper.submit(DumpJob::new(anon_key, nic_name, snapshot, timestamp));
}
