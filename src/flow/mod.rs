pub mod gap;
pub mod key;
pub mod record;
pub mod seqlist;
pub mod table;

pub use key::{AnonKey, FlowKey};
pub use record::{CsOutcome, DumpSnapshot, FlowRecord, FlowState, ScOutcome};
pub use table::FlowTable;
