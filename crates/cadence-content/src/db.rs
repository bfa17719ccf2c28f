use rusqlite::{Connection, Result};

/// Initialise content tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_variants_table(conn)?;
    create_connections_table(conn)?;
    Ok(())
}

/// `media` holds the variant's media list as a JSON array.
fn create_variants_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS post_variants (
            id              TEXT    NOT NULL PRIMARY KEY,
            text            TEXT    NOT NULL,
            media           TEXT    NOT NULL DEFAULT '[]',
            published_at_ms INTEGER,
            created_at_ms   INTEGER NOT NULL,
            updated_at_ms   INTEGER NOT NULL
        );",
    )
}

fn create_connections_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS channel_connections (
            id            TEXT    NOT NULL PRIMARY KEY,
            channel_type  TEXT    NOT NULL,
            status        TEXT    NOT NULL DEFAULT 'connected'
                CHECK (status IN ('connected','disconnected','error')),
            access_token  TEXT    NOT NULL,
            base_url      TEXT,
            created_at_ms INTEGER NOT NULL,
            updated_at_ms INTEGER NOT NULL
        );",
    )
}
