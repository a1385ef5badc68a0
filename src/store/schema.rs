use rusqlite::Connection;

use crate::errors::GraphQueryError;

pub fn ensure_schema(conn: &Connection) -> Result<(), GraphQueryError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS store_nodes (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            space       TEXT NOT NULL,
            external_id TEXT NOT NULL,
            view        TEXT,
            data        TEXT NOT NULL,
            UNIQUE(space, external_id)
        );
        CREATE TABLE IF NOT EXISTS store_edges (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            space             TEXT NOT NULL,
            external_id       TEXT NOT NULL,
            type_space        TEXT NOT NULL,
            type_external_id  TEXT NOT NULL,
            start_space       TEXT NOT NULL,
            start_external_id TEXT NOT NULL,
            end_space         TEXT NOT NULL,
            end_external_id   TEXT NOT NULL,
            data              TEXT NOT NULL,
            UNIQUE(space, external_id)
        );
        CREATE INDEX IF NOT EXISTS idx_nodes_view ON store_nodes(view);
        CREATE INDEX IF NOT EXISTS idx_edges_start ON store_edges(start_space, start_external_id);
        CREATE INDEX IF NOT EXISTS idx_edges_end ON store_edges(end_space, end_external_id);
        "#,
    )
    .map_err(|e| GraphQueryError::connection(e.to_string()))?;
    Ok(())
}
