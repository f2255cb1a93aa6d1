//! Sequence interval log used by the reassembler and gap detector.

/// Insertion-ordered log of `(seq, len)` pairs describing every write made
/// to a flow's reassembly buffer. Entries absorbed by the gap detector are
/// rewritten to `(0, 0)` in place rather than removed, matching the
/// teacher-adjacent original's in-place "mark consumed" approach instead of
/// shrinking the list mid-scan.
#[derive(Debug, Default, Clone)]
pub struct SeqList {
    entries: Vec<(u32, u32)>,
}

impl SeqList {
    pub fn new() -> Self {
        SeqList::default()
    }

    pub fn insert(&mut self, seq: u32, len: u32) {
        self.entries.push((seq, len));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn head(&self) -> Option<(u32, u32)> {
        self.entries.first().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.entries.iter().copied()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut (u32, u32)> {
        self.entries.iter_mut()
    }
}
