use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Orders (created once by checkout, settled by webhook, then
        -- advanced through operator stages; never deleted here)
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            branch_id TEXT NOT NULL,
            customer TEXT NOT NULL,           -- JSON
            items TEXT NOT NULL,              -- JSON array
            delivery_price INTEGER NOT NULL DEFAULT 0,
            total_amount INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'paid', 'failed', 'processing',
                                  'out_for_delivery', 'delivered', 'completed')),
            payment_reference TEXT,
            payment_details TEXT,             -- opaque provider JSON
            payment_error TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_orders_branch ON orders(branch_id);
        CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);

        -- Payment records (one per order per terminal outcome; the UNIQUE
        -- constraint is what makes webhook redelivery idempotent)
        CREATE TABLE IF NOT EXISTS payment_records (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES orders(id),
            status TEXT NOT NULL CHECK (status IN ('success', 'failed')),
            amount INTEGER NOT NULL,
            currency TEXT NOT NULL,
            payment_reference TEXT NOT NULL,
            gateway TEXT NOT NULL,
            customer_email TEXT,
            branch_id TEXT,
            metadata TEXT,                    -- JSON
            created_at INTEGER NOT NULL,

            UNIQUE(order_id, status)
        );
        CREATE INDEX IF NOT EXISTS idx_payment_records_order ON payment_records(order_id);

        -- Webhook deliveries whose settlement transaction failed after a
        -- retry. Kept for manual reconciliation, never silently dropped.
        CREATE TABLE IF NOT EXISTS dead_letter_events (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            error TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_dead_letter_order ON dead_letter_events(order_id);
        "#,
    )
}
