//! Dead-letter files.
//!
//! When a flush cannot reach the persistent store, the taken batch is
//! framed and appended to `fail_log_<code>.dat` for its kind. At startup
//! the controller replays those files through the same bulk insert path.

mod envelope;
mod file;

pub use envelope::{
    compute_crc32, encode_entry, scan_entries, DamagedRegion, DecodedEntry, ScanEnd, ScanResult,
    ENTRY_MAGIC, ENTRY_VERSION,
};
pub use file::{DeadLetterFile, ReplayReport, ReplayStep};
