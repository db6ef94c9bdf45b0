//! Snapshot import/export.
//!
//! A snapshot is a JSON document carrying the whole catalog (or one table
//! in the table-scoped mode). Numeric IDs inside a snapshot are
//! snapshot-local: the importer reconciles records against the live store
//! by natural key and remaps every relationship reference.

mod export;
mod format;
mod import;
mod tables;

pub use export::export_snapshot;
pub use format::{
    CollectionRecord, LectureRecord, MembershipRecord, NamedRecord, NormalizedMemberships,
    Snapshot,
};
pub use import::{import_snapshot, ImportStats, NamedRecordStats};
pub use tables::{export_table, import_table, reset_catalog, TableKind, TableTransferStats};
