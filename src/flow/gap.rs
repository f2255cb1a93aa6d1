//! Gap detection: did the reassembled buffer actually receive every byte of
//! the declared response body?
//!
//! Ported from `is_missing_flow_data` in the original pe_dump reference
//! implementation: a multi-pass absorption scan over the sequence interval
//! log, restarting from the head each pass and stopping either when a pass
//! makes no progress or when no gap is observed in a pass.

use crate::flow::seqlist::SeqList;

/// `true` if `a` is at or before `b` in TCP sequence order, tolerant of
/// wraparound (RFC 1323 style signed-difference comparison).
fn seq_leq(a: u32, b: u32) -> bool {
    (b.wrapping_sub(a) as i32) >= 0
}

/// Returns `true` if `seq_list` does not account for every byte of a body
/// `content_len` bytes long starting at the list's first sequence number.
pub fn is_missing(seq_list: &SeqList, content_len: u32) -> bool {
    let Some((first_seq, first_len)) = seq_list.head() else {
        return true;
    };

    let max_end = seq_list
        .iter()
        .map(|(seq, len)| seq.wrapping_add(len))
        .max_by(|a, b| {
            if a == b {
                std::cmp::Ordering::Equal
            } else if seq_leq(*a, *b) {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Greater
            }
        })
        .unwrap_or(first_seq);

    let estimated_content_len = max_end.wrapping_sub(first_seq);
    if estimated_content_len < content_len {
        return true;
    }

    let mut working: Vec<(u32, u32)> = seq_list.iter().collect();
    let mut expected = first_seq.wrapping_add(first_len);

    loop {
        let mut gap_detected = false;
        let start_of_pass = expected;

        for (seq, len) in working.iter_mut() {
            if *seq == 0 && *len == 0 {
                continue;
            }
            let end = seq.wrapping_add(*len);

            if seq_leq(*seq, expected) && seq_leq(end, expected) {
                // fully covered already (includes exact retransmissions)
                continue;
            } else if seq_leq(*seq, expected) {
                // overlaps or abuts the contiguous region: absorb it
                expected = end;
                *seq = 0;
                *len = 0;
            } else {
                gap_detected = true;
            }
        }

        if expected == start_of_pass {
            return gap_detected;
        }
        if !gap_detected {
            return false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_is_missing() {
        let l = SeqList::new();
        assert!(is_missing(&l, 10));
    }

    #[test]
    fn contiguous_segments_are_not_missing() {
        let mut l = SeqList::new();
        l.insert(1000, 500);
        l.insert(1500, 500);
        assert!(!is_missing(&l, 1000));
    }

    #[test]
    fn gap_in_the_middle_is_missing() {
        let mut l = SeqList::new();
        l.insert(1000, 500);
        l.insert(2000, 500);
        assert!(is_missing(&l, 1500));
    }

    #[test]
    fn out_of_order_delivery_absorbs_cleanly() {
        // The first write establishes the flow's init_seq; later segments
        // can still arrive out of order and are absorbed across passes.
        let mut l = SeqList::new();
        l.insert(1000, 500);
        l.insert(2000, 100);
        l.insert(1500, 500);
        assert!(!is_missing(&l, 1000));
    }

    #[test]
    fn retransmitted_segment_is_ignored() {
        let mut l = SeqList::new();
        l.insert(1000, 500);
        l.insert(1000, 500);
        l.insert(1500, 100);
        assert!(!is_missing(&l, 600));
    }

    #[test]
    fn max_seq_shorter_than_content_len_is_missing() {
        let mut l = SeqList::new();
        l.insert(1000, 100);
        assert!(is_missing(&l, 1000));
    }

    #[test]
    fn trailing_expected_end_sentinel_without_bytes_reports_gap() {
        // Models note_expected_end: a (seq, 0) sentinel marking where the
        // server's FIN said the stream should have ended, with no byte ever
        // covering that final stretch.
        let mut l = SeqList::new();
        l.insert(1000, 500);
        l.insert(2000, 0);
        assert!(is_missing(&l, 1000));
    }
}
