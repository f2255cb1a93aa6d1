//! Per-connection state machine, reassembly buffer, and HTTP metadata.
//!
//! The state transitions and thresholds below are ported from the
//! reference `pe_dump` implementation's `packet_received`/`update_flow`
//! dispatch, restructured as methods on an owned value instead of a
//! `switch` over a global `tcp_flow*` and file-scope counters.

use crate::decode::TcpSegment;
use crate::flow::key::FlowKey;
use crate::flow::seqlist::SeqList;
use crate::http;
use crate::utils::types::seq_forward_distance;

/// Initial reassembly buffer size: four full-size TCP segments.
const INIT_SC_PAYLOAD: usize = 1460 * 4;
/// Buffer growth increment once the initial allocation is exhausted.
const REALLOC_SC_PAYLOAD: usize = 100 * 1024;
/// Abandon a flow still waiting on response headers/MZ after this many
/// server-side segments.
const MAX_SC_INIT_PAYLOADS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// SYN observed, waiting for the server's SYN-ACK.
    Init,
    /// SYN-ACK observed, waiting for the client's first HTTP request.
    SynAck,
    /// A request has been seen; waiting for the next request or response.
    Http,
    /// Request seen, response headers not yet complete.
    HdrWait,
    /// Response headers complete; waiting to see if the body starts `MZ`.
    MzWait,
    /// Body confirmed to start with the PE signature; reassembling.
    Pe,
}

/// A point-in-time snapshot of a flow's PE payload, detached for handoff to
/// the dumper. The originating [`FlowRecord`]'s buffer and sequence list
/// are left empty after this is taken — there is no shared ownership.
#[derive(Debug)]
pub struct DumpSnapshot {
    pub url: Vec<u8>,
    pub host: Vec<u8>,
    pub referer: Vec<u8>,
    pub http_request_count: u32,
    pub payload: Vec<u8>,
    pub payload_size: usize,
    pub seq_list: SeqList,
    pub corrupt_pe: bool,
}

pub struct FlowRecord {
    pub state: FlowState,
    pub cs_key: FlowKey,
    pub sc_key: FlowKey,
    pub anon_key: FlowKey,
    pub url: Vec<u8>,
    pub host: Vec<u8>,
    pub referer: Vec<u8>,
    pub http_request_count: u32,

    sc_init_seq: u32,
    sc_payload: Option<Vec<u8>>,
    sc_payload_size: usize,
    sc_num_payloads: u32,
    sc_seq_list: Option<SeqList>,
    pub corrupt_pe: bool,
}

impl FlowRecord {
    /// Creates a new record for a just-observed pure SYN.
    pub fn new_on_syn(cs_key: FlowKey, anon_key: FlowKey) -> Self {
        FlowRecord {
            state: FlowState::Init,
            sc_key: cs_key.reversed(),
            cs_key,
            anon_key,
            url: Vec::new(),
            host: Vec::new(),
            referer: Vec::new(),
            http_request_count: 0,
            sc_init_seq: 0,
            sc_payload: None,
            sc_payload_size: 0,
            sc_num_payloads: 0,
            sc_seq_list: None,
            corrupt_pe: false,
        }
    }

    pub fn has_pending_pe(&self) -> bool {
        self.state == FlowState::Pe
    }

    /// Records the server's SYN-ACK.
    pub fn on_synack(&mut self) {
        self.state = FlowState::SynAck;
    }

    /// Handles a client-to-server segment. Returns `true` if the caller
    /// should remove this flow (it never turned into an HTTP request).
    pub fn handle_cs(&mut self, seg: &TcpSegment) -> CsOutcome {
        let payload = seg.payload;
        if self.state == FlowState::SynAck {
            if !http::is_http_request(payload) {
                return CsOutcome::NotHttp;
            }
            self.state = FlowState::Http;
        }

        if self.state == FlowState::Http && !http::is_http_request(payload) {
            // Waiting for a proper request; ignore anything else.
            return CsOutcome::Ignored;
        }

        let mut dump = None;
        if self.state == FlowState::Pe {
            // New request arrives while a PE is still being reassembled:
            // the stream will never deliver the rest of it. Record where
            // the client's ack says the server should have gotten to
            // before snapshotting, so the gap detector can tell.
            self.note_expected_end(seg.ack_no);
            dump = Some(self.take_snapshot());
            self.state = FlowState::Http;
        }

        if http::is_http_request(payload) && self.state != FlowState::HdrWait {
            self.state = FlowState::HdrWait;
            self.http_request_count += 1;
            self.url = http::extract_url(payload);
            self.host = http::extract_host(payload);
            self.referer = http::extract_referer(payload);
        }

        match dump {
            Some(snapshot) => CsOutcome::DumpAndContinue(snapshot),
            None => CsOutcome::Ignored,
        }
    }

    /// Records a sentinel marking where the stream was expected to end
    /// (the client's ACK number at FIN/RST, or a new request's ACK), so the
    /// gap detector can tell a truncated PE from a complete one.
    pub fn note_expected_end(&mut self, ack_seq: u32) {
        if let Some(seq_list) = self.sc_seq_list.as_mut() {
            seq_list.insert(ack_seq, 0);
        }
    }

    /// Handles a server-to-client segment.
    pub fn handle_sc(&mut self, seg: &TcpSegment, max_pe_size: usize) -> ScOutcome {
        if self.state == FlowState::Http {
            // Still waiting for a request; nothing to reassemble yet.
            return ScOutcome::Ignored;
        }

        if self.state == FlowState::Pe && self.sc_payload_size > max_pe_size {
            self.reset_payload();
            self.state = FlowState::Http;
            return ScOutcome::Abandoned;
        }

        self.write_segment(seg.seq_no, seg.payload);

        if self.state == FlowState::HdrWait {
            let buf = self.sc_payload.as_deref().unwrap_or(&[]);
            if http::resp_header_length(&buf[..self.sc_payload_size]).is_some() {
                self.state = FlowState::MzWait;
            } else if self.sc_num_payloads > MAX_SC_INIT_PAYLOADS {
                self.reset_payload();
                self.state = FlowState::Http;
                return ScOutcome::Abandoned;
            }
        }

        if self.state == FlowState::MzWait {
            let buf = self.sc_payload.as_deref().unwrap_or(&[]);
            let content_len = http::content_length(&buf[..self.sc_payload_size]);

            let check = match content_len {
                Some(cl) if cl > 0 && cl < 2 * 1024 * 1024 => {
                    http::contains_pe_file(buf, self.sc_payload_size)
                }
                _ => http::PeCheck::NotFound,
            };

            match check {
                http::PeCheck::Found => {
                    self.state = FlowState::Pe;
                    return ScOutcome::PeStarted;
                }
                http::PeCheck::NotFound => {
                    self.reset_payload();
                    self.state = FlowState::Http;
                    return ScOutcome::Abandoned;
                }
                http::PeCheck::WaitForBody => {
                    if self.sc_num_payloads > MAX_SC_INIT_PAYLOADS {
                        self.reset_payload();
                        self.state = FlowState::Http;
                        return ScOutcome::Abandoned;
                    }
                }
            }
        }

        ScOutcome::Continued
    }

    /// Handles FIN/RST from either direction. Returns a dump snapshot if a
    /// PE was in progress.
    pub fn handle_close(&mut self, is_cs_dir: bool, seg: &TcpSegment) -> Option<DumpSnapshot> {
        if self.state != FlowState::Pe {
            return None;
        }
        if is_cs_dir {
            self.note_expected_end(seg.ack_no);
        } else {
            self.write_segment(seg.seq_no, seg.payload);
            if let Some(seq_list) = self.sc_seq_list.as_mut() {
                seq_list.insert(seg.seq_no, seg.payload.len() as u32);
            }
        }
        self.state = FlowState::Http;
        Some(self.take_snapshot())
    }

    /// Runs on eviction from the flow table or at shutdown drain. If a PE
    /// was in progress it is marked corrupt and handed off for dumping.
    pub fn destroy(mut self) -> Option<DumpSnapshot> {
        if self.state == FlowState::Pe {
            self.corrupt_pe = true;
            Some(self.take_snapshot())
        } else {
            None
        }
    }

    fn ensure_payload_init(&mut self, seq: u32) {
        if self.sc_payload.is_none() {
            self.sc_init_seq = seq;
            self.sc_payload = Some(vec![0u8; INIT_SC_PAYLOAD]);
            self.sc_payload_size = 0;
            self.sc_num_payloads = 0;
            self.sc_seq_list = Some(SeqList::new());
            self.corrupt_pe = false;
        }
    }

    fn write_segment(&mut self, seq: u32, payload: &[u8]) {
        self.ensure_payload_init(seq);
        if payload.is_empty() {
            return;
        }
        self.sc_num_payloads += 1;

        let Some(p) = seq_forward_distance(self.sc_init_seq, seq) else {
            // Unsigned distance exceeds half the sequence space: treat as
            // behind the window and drop, rather than misinterpret it as
            // a huge forward offset.
            return;
        };
        let p = p as usize;
        let len = payload.len();

        let buf = self.sc_payload.as_mut().expect("payload just initialized");
        if p + len > buf.len() {
            let realloc_size = REALLOC_SC_PAYLOAD.max(len);
            if p + len > buf.len() + realloc_size {
                // Pathological reordering or loss; drop this segment.
                return;
            }
            buf.resize(buf.len() + realloc_size, 0);
        }

        buf[p..p + len].copy_from_slice(payload);
        if let Some(seq_list) = self.sc_seq_list.as_mut() {
            seq_list.insert(seq, len as u32);
        }
        if p + len > self.sc_payload_size {
            self.sc_payload_size = p + len;
        }
    }

    fn reset_payload(&mut self) {
        self.sc_payload = None;
        self.sc_seq_list = None;
        self.sc_payload_size = 0;
        self.sc_num_payloads = 0;
    }

    fn take_snapshot(&mut self) -> DumpSnapshot {
        let payload = self.sc_payload.take().unwrap_or_default();
        let payload_size = self.sc_payload_size;
        let seq_list = self.sc_seq_list.take().unwrap_or_default();
        self.sc_payload_size = 0;
        self.sc_num_payloads = 0;

        DumpSnapshot {
            url: self.url.clone(),
            host: self.host.clone(),
            referer: self.referer.clone(),
            http_request_count: self.http_request_count,
            payload,
            payload_size,
            seq_list,
            corrupt_pe: self.corrupt_pe,
        }
    }
}

#[derive(Debug)]
pub enum CsOutcome {
    /// Flow never produced an HTTP request; caller should remove it.
    NotHttp,
    /// Nothing actionable happened.
    Ignored,
    /// A pending PE was cut short by a new request; dump it, then continue.
    DumpAndContinue(DumpSnapshot),
}

#[derive(Debug)]
pub enum ScOutcome {
    Ignored,
    Continued,
    Abandoned,
    PeStarted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::gap;
    use std::net::Ipv4Addr;

    fn key() -> FlowKey {
        FlowKey::new(Ipv4Addr::new(10, 0, 0, 1), 1234, Ipv4Addr::new(10, 0, 0, 2), 80)
    }

    fn seg(seq: u32, ack: u32, payload: &'static [u8]) -> TcpSegment<'static> {
        TcpSegment {
            src_addr: Ipv4Addr::new(10, 0, 0, 2),
            dst_addr: Ipv4Addr::new(10, 0, 0, 1),
            src_port: 80,
            dst_port: 1234,
            seq_no: seq,
            ack_no: ack,
            flags: 0,
            payload,
        }
    }

    #[test]
    fn full_round_trip_produces_pe_snapshot() {
        let mut rec = FlowRecord::new_on_syn(key(), key());
        rec.on_synack();
        let _ = rec.handle_cs(&seg(1, 0, b"GET /a.exe HTTP/1.1\r\nHost: x\r\n\r\n"));
        assert_eq!(rec.state, FlowState::HdrWait);

        let resp_hdr = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n";
        let body = b"MZ";
        let mut full = Vec::new();
        full.extend_from_slice(resp_hdr);
        full.extend_from_slice(body);

        let outcome = rec.handle_sc(&seg(1000, 0, &full), 2 * 1024 * 1024);
        assert!(matches!(outcome, ScOutcome::PeStarted));
        assert_eq!(rec.state, FlowState::Pe);

        let snap = rec.handle_close(false, &seg(1000 + full.len() as u32, 0, b"")).unwrap();
        assert!(!snap.corrupt_pe);
        assert_eq!(&snap.payload[..snap.payload_size], &full[..]);
    }

    #[test]
    fn non_http_first_request_is_rejected() {
        let mut rec = FlowRecord::new_on_syn(key(), key());
        rec.on_synack();
        assert!(matches!(rec.handle_cs(&seg(1, 0, b"not http")), CsOutcome::NotHttp));
    }

    #[test]
    fn destroy_mid_pe_marks_corrupt() {
        let mut rec = FlowRecord::new_on_syn(key(), key());
        rec.on_synack();
        let _ = rec.handle_cs(&seg(1, 0, b"GET / HTTP/1.1\r\n\r\n"));
        let resp = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nMZ";
        let _ = rec.handle_sc(&seg(1000, 0, resp), 2 * 1024 * 1024);
        assert_eq!(rec.state, FlowState::Pe);

        let snap = rec.destroy().expect("should dump on destroy");
        assert!(snap.corrupt_pe);
    }

    #[test]
    fn new_request_during_incomplete_pe_dumps_as_corrupt() {
        let mut rec = FlowRecord::new_on_syn(key(), key());
        rec.on_synack();
        let _ = rec.handle_cs(&seg(1, 0, b"GET /a.exe HTTP/1.1\r\n\r\n"));

        let resp_hdr = b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n";
        let mut partial = Vec::new();
        partial.extend_from_slice(resp_hdr);
        partial.extend_from_slice(b"MZ"); // only 2 of the declared 100 body bytes

        let _ = rec.handle_sc(&seg(1000, 0, &partial), 2 * 1024 * 1024);
        assert_eq!(rec.state, FlowState::Pe);

        let outcome = rec.handle_cs(&seg(2, 1000 + partial.len() as u32, b"GET /b.html HTTP/1.1\r\n\r\n"));
        match outcome {
            CsOutcome::DumpAndContinue(snapshot) => {
                assert!(!snapshot.corrupt_pe);
                assert!(gap::is_missing(&snapshot.seq_list, 100));
            }
            other => panic!("expected a dump, got {other:?}"),
        }
        assert_eq!(rec.state, FlowState::HdrWait);
    }

    #[test]
    fn abandons_after_too_many_header_wait_segments() {
        let mut rec = FlowRecord::new_on_syn(key(), key());
        rec.on_synack();
        let _ = rec.handle_cs(&seg(1, 0, b"GET / HTTP/1.1\r\n\r\n"));
        for _ in 0..(MAX_SC_INIT_PAYLOADS + 1) {
            let _ = rec.handle_sc(&seg(1000, 0, b"partial"), 2 * 1024 * 1024);
        }
        assert_eq!(rec.state, FlowState::Http);
    }

    #[test]
    fn oversize_content_length_is_not_a_pe_candidate() {
        let mut rec = FlowRecord::new_on_syn(key(), key());
        rec.on_synack();
        let _ = rec.handle_cs(&seg(1, 0, b"GET /a.exe HTTP/1.1\r\n\r\n"));

        let resp_hdr = b"HTTP/1.1 200 OK\r\nContent-Length: 3000000\r\n\r\n";
        let mut resp = Vec::new();
        resp.extend_from_slice(resp_hdr);
        resp.extend_from_slice(b"MZ");

        let outcome = rec.handle_sc(&seg(1000, 0, &resp), 2 * 1024 * 1024);
        assert!(matches!(outcome, ScOutcome::Abandoned));
        assert_eq!(rec.state, FlowState::Http);
    }
}
