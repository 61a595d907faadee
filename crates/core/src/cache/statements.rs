//! SQL statement templates bound to one cache table.
//!
//! The qualified table reference is formatted into every template once, when
//! [`Statements::new`] runs. Schema and table names used as structural tokens
//! are trusted as-is; the table name used inside the metadata lookup is a
//! string literal and is escaped.
//!
//! Timestamps are microseconds since the Unix epoch. Sliding expiration is
//! stored in whole seconds, hence the `* 1000000` in the arithmetic below.

/// Maximum key width, in characters.
pub const KEY_COLUMN_WIDTH: usize = 449;

/// Recommended width for the value column when provisioning a schema on a
/// store that needs one. Not enforced.
pub const DEFAULT_VALUE_COLUMN_WIDTH: usize = 8000;

/// The parameterized statements used by the entry store.
#[derive(Debug, Clone)]
pub struct Statements {
    pub get: String,
    pub refresh: String,
    pub upsert: String,
    pub delete: String,
    pub delete_expired: String,
    pub table_info: String,
    pub create_table: String,
    pub create_index: String,
}

impl Statements {
    pub fn new(schema_name: &str, table_name: &str) -> Self {
        let table = format!("{schema_name}.{table_name}");

        let get = format!(
            "SELECT value
            FROM {table}
            WHERE id = :id
              AND :now <= expires_at"
        );

        // Extend to min(now + sliding, absolute). Rows that are already
        // expired, absolute-only, or would not move forward are left alone.
        let refresh = format!(
            "UPDATE {table}
            SET expires_at = CASE
                    WHEN absolute_expiration IS NOT NULL
                         AND absolute_expiration < :now + sliding_expiration_seconds * 1000000
                        THEN absolute_expiration
                    ELSE :now + sliding_expiration_seconds * 1000000
                END
            WHERE id = :id
              AND :now <= expires_at
              AND sliding_expiration_seconds IS NOT NULL
              AND expires_at < CASE
                    WHEN absolute_expiration IS NOT NULL
                         AND absolute_expiration < :now + sliding_expiration_seconds * 1000000
                        THEN absolute_expiration
                    ELSE :now + sliding_expiration_seconds * 1000000
                END"
        );

        let upsert = format!(
            "INSERT INTO {table} (id, value, expires_at, sliding_expiration_seconds, absolute_expiration)
            VALUES (
                :id,
                :value,
                CASE
                    WHEN :sliding IS NULL THEN :absolute
                    WHEN :absolute IS NOT NULL AND :absolute < :now + :sliding * 1000000 THEN :absolute
                    ELSE :now + :sliding * 1000000
                END,
                :sliding,
                :absolute
            )
            ON CONFLICT(id) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at,
                sliding_expiration_seconds = excluded.sliding_expiration_seconds,
                absolute_expiration = excluded.absolute_expiration"
        );

        let delete = format!(
            "DELETE
            FROM {table}
            WHERE id = :id"
        );

        let delete_expired = format!(
            "DELETE
            FROM {table}
            WHERE :now > expires_at"
        );

        let table_info = format!(
            "SELECT name
            FROM {schema_name}.sqlite_master
            WHERE type = 'table'
              AND name = '{}'",
            escape_literal(table_name)
        );

        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT NOT NULL PRIMARY KEY CHECK (length(id) <= {KEY_COLUMN_WIDTH}),
                value BLOB NOT NULL,
                expires_at INTEGER NOT NULL,
                sliding_expiration_seconds INTEGER,
                absolute_expiration INTEGER
            )"
        );

        let create_index = format!(
            "CREATE INDEX IF NOT EXISTS {schema_name}.{table_name}_expires_at
            ON {table_name} (expires_at)"
        );

        Self { get, refresh, upsert, delete, delete_expired, table_info, create_table, create_index }
    }
}

fn escape_literal(literal: &str) -> String {
    literal.replace('\'', "''")
}
