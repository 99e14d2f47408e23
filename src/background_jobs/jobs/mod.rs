//! Job implementations registered in the job table.

pub mod scout_entry_ingest;
pub mod scout_message_send;

pub use scout_entry_ingest::ScoutEntryIngestJob;
pub use scout_message_send::ScoutMessageSendJob;
