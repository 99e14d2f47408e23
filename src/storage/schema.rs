//! SQLite schema definitions for the scout database.

use super::versioned_schema::{SqlType, Table, VersionedSchema};
use crate::sqlite_column;

// =============================================================================
// Version 1 - Ingested scout entries
// =============================================================================

/// Candidate entries pulled from scout services, one row per provider entry.
const SCOUT_ENTRIES_TABLE_V1: Table = Table {
    name: "scout_entries",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("provider", &SqlType::Text, non_null = true),
        sqlite_column!("external_id", &SqlType::Text, non_null = true),
        sqlite_column!("payload", &SqlType::Text, non_null = true),
        sqlite_column!("received_at", &SqlType::Text, non_null = true),
        sqlite_column!("ingested_at", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_scout_entries_provider_received", "provider, received_at DESC")],
    unique_constraints: &[&["provider", "external_id"]],
};

pub const STORAGE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[SCOUT_ENTRIES_TABLE_V1],
    migration: None,
}];
