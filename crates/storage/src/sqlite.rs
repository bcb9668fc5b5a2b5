//! SQLite-backed escrow storage.
//!
//! Holds only the rows the escrow protocol reads: listings with their escrow
//! terms, accepted bids, orders, order items, order item objects and the
//! received-action audit log.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, Result as SqlResult, Row};

use escrow_types::{
    ActionRecord, Bid, BidAction, EscrowActionType, EscrowError, EscrowInfo, EscrowType, Listing,
    Order, OrderItem, OrderItemObject, OrderItemStatus, Result,
};

use crate::store::{
    ActionLogStore, NewActionRecord, OrderItemObjectStore, OrderItemStore, OrderStore,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS listings (
        hash TEXT PRIMARY KEY,
        seller TEXT NOT NULL,
        template_id INTEGER
    );

    CREATE TABLE IF NOT EXISTS escrows (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        listing_hash TEXT NOT NULL UNIQUE REFERENCES listings(hash),
        escrow_type TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS bids (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        action TEXT NOT NULL,
        bidder TEXT NOT NULL,
        listing_hash TEXT NOT NULL REFERENCES listings(hash)
    );

    CREATE TABLE IF NOT EXISTS orders (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        buyer TEXT NOT NULL,
        seller TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS order_items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        order_id INTEGER NOT NULL REFERENCES orders(id),
        bid_id INTEGER NOT NULL REFERENCES bids(id),
        item_hash TEXT NOT NULL,
        status TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (order_id, item_hash)
    );

    CREATE TABLE IF NOT EXISTS order_item_objects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        order_item_id INTEGER NOT NULL REFERENCES order_items(id),
        data_id TEXT NOT NULL,
        data_value TEXT NOT NULL,
        UNIQUE (order_item_id, data_id)
    );

    CREATE TABLE IF NOT EXISTS action_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        action TEXT NOT NULL,
        listing_hash TEXT NOT NULL,
        sender TEXT NOT NULL,
        receiver TEXT NOT NULL,
        payload TEXT NOT NULL,
        received_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_action_log_listing ON action_log(listing_hash);
";

const ORDER_ITEM_SELECT: &str = "
    SELECT oi.id, oi.item_hash, oi.status,
           o.id, o.buyer, o.seller,
           b.id, b.action, b.bidder,
           l.hash, l.seller, l.template_id,
           e.id, e.escrow_type
    FROM order_items oi
    JOIN orders o ON o.id = oi.order_id
    JOIN bids b ON b.id = oi.bid_id
    JOIN listings l ON l.hash = b.listing_hash
    LEFT JOIN escrows e ON e.listing_hash = l.hash
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| EscrowError::Storage(format!("Failed to open database: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            EscrowError::Storage(format!("Failed to open in-memory database: {}", e))
        })?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .and_then(|_| conn.execute_batch(SCHEMA))
            .map_err(|e| EscrowError::Storage(format!("Failed to create schema: {}", e)))?;

        tracing::debug!("Escrow store schema initialized");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| EscrowError::Storage(format!("Lock error: {}", e)))
    }

    // ------------------------------------------------------------------------
    // Fixture inserts. Listings, bids and orders are produced by the bidding
    // flow; these exist so a node or test can be seeded with that state.
    // ------------------------------------------------------------------------

    pub fn insert_listing(&self, listing: &Listing) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO listings (hash, seller, template_id) VALUES (?1, ?2, ?3)",
            params![listing.hash, listing.seller, listing.template_id],
        )
        .map_err(|e| storage_error("Failed to insert listing", e))?;

        if let Some(escrow) = &listing.escrow {
            conn.execute(
                "INSERT INTO escrows (id, listing_hash, escrow_type) VALUES (?1, ?2, ?3)",
                params![escrow.id, listing.hash, escrow.escrow_type.as_str()],
            )
            .map_err(|e| storage_error("Failed to insert escrow", e))?;
        }
        Ok(())
    }

    pub fn insert_bid(&self, action: BidAction, bidder: &str, listing_hash: &str) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO bids (action, bidder, listing_hash) VALUES (?1, ?2, ?3)",
            params![action.as_str(), bidder, listing_hash],
        )
        .map_err(|e| storage_error("Failed to insert bid", e))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_order(&self, buyer: &str, seller: &str) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO orders (buyer, seller) VALUES (?1, ?2)",
            params![buyer, seller],
        )
        .map_err(|e| storage_error("Failed to insert order", e))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_order_item(
        &self,
        order_id: i64,
        bid_id: i64,
        item_hash: &str,
        status: OrderItemStatus,
    ) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO order_items (order_id, bid_id, item_hash, status, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                order_id,
                bid_id,
                item_hash,
                status.as_str(),
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| storage_error("Failed to insert order item", e))?;
        Ok(conn.last_insert_rowid())
    }
}

#[async_trait]
impl OrderItemStore for SqliteStore {
    async fn get(&self, order_item_id: i64) -> Result<Option<OrderItem>> {
        let conn = self.lock()?;
        load_order_item(&conn, order_item_id)
    }

    async fn update_status(
        &self,
        order_item_id: i64,
        status: OrderItemStatus,
    ) -> Result<OrderItem> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE order_items SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), Utc::now().to_rfc3339(), order_item_id],
            )
            .map_err(|e| storage_error("Failed to update order item", e))?;

        if changed == 0 {
            return Err(EscrowError::OrderItemNotFound(order_item_id.to_string()));
        }

        tracing::debug!(order_item_id, status = %status, "Order item status updated");
        load_order_item(&conn, order_item_id)?
            .ok_or_else(|| EscrowError::OrderItemNotFound(order_item_id.to_string()))
    }
}

#[async_trait]
impl OrderItemObjectStore for SqliteStore {
    async fn find_by_data_id(
        &self,
        order_item_id: i64,
        data_id: &str,
    ) -> Result<Option<OrderItemObject>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, order_item_id, data_id, data_value FROM order_item_objects
             WHERE order_item_id = ?1 AND data_id = ?2",
            params![order_item_id, data_id],
            map_object,
        )
        .optional()
        .map_err(|e| storage_error("Query error", e))
    }

    async fn update(&self, id: i64, data_id: &str, data_value: &str) -> Result<OrderItemObject> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE order_item_objects SET data_id = ?1, data_value = ?2 WHERE id = ?3",
                params![data_id, data_value, id],
            )
            .map_err(|e| storage_error("Failed to update order item object", e))?;

        if changed == 0 {
            return Err(EscrowError::Storage(format!(
                "OrderItemObject {} not found",
                id
            )));
        }
        load_object(&conn, id)
    }

    async fn create(
        &self,
        order_item_id: i64,
        data_id: &str,
        data_value: &str,
    ) -> Result<OrderItemObject> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO order_item_objects (order_item_id, data_id, data_value)
             VALUES (?1, ?2, ?3)",
            params![order_item_id, data_id, data_value],
        )
        .map_err(|e| storage_error("Failed to create order item object", e))?;

        let id = conn.last_insert_rowid();
        load_object(&conn, id)
    }
}

#[async_trait]
impl OrderStore for SqliteStore {
    async fn find_listing(&self, hash: &str) -> Result<Option<Listing>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT l.hash, l.seller, l.template_id, e.id, e.escrow_type
             FROM listings l LEFT JOIN escrows e ON e.listing_hash = l.hash
             WHERE l.hash = ?1",
            params![hash],
            |row| map_listing(row, 0),
        )
        .optional()
        .map_err(|e| storage_error("Query error", e))
    }

    async fn find_orders(
        &self,
        listing_hash: &str,
        buyer: &str,
        seller: &str,
    ) -> Result<Vec<Order>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT o.id, o.buyer, o.seller
                 FROM orders o JOIN order_items oi ON oi.order_id = o.id
                 WHERE oi.item_hash = ?1 AND o.buyer = ?2 AND o.seller = ?3
                 ORDER BY o.id",
            )
            .map_err(|e| storage_error("Query error", e))?;

        let orders = stmt
            .query_map(params![listing_hash, buyer, seller], |row| {
                Ok(Order {
                    id: row.get(0)?,
                    buyer: row.get(1)?,
                    seller: row.get(2)?,
                })
            })
            .and_then(|rows| rows.collect::<SqlResult<Vec<_>>>())
            .map_err(|e| storage_error("Query error", e))?;

        Ok(orders)
    }

    async fn find_order_item(&self, order_id: i64, item_hash: &str) -> Result<Option<OrderItem>> {
        let conn = self.lock()?;
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM order_items WHERE order_id = ?1 AND item_hash = ?2",
                params![order_id, item_hash],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| storage_error("Query error", e))?;

        match id {
            Some(id) => load_order_item(&conn, id),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ActionLogStore for SqliteStore {
    async fn record(&self, entry: NewActionRecord) -> Result<ActionRecord> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO action_log (action, listing_hash, sender, receiver, payload, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.action.as_str(),
                entry.listing_hash,
                entry.sender,
                entry.receiver,
                entry.payload,
                entry.received_at.to_rfc3339(),
            ],
        )
        .map_err(|e| storage_error("Failed to record action", e))?;

        Ok(ActionRecord {
            id: conn.last_insert_rowid(),
            action: entry.action,
            listing_hash: entry.listing_hash,
            sender: entry.sender,
            receiver: entry.receiver,
            payload: entry.payload,
            received_at: entry.received_at,
        })
    }

    async fn find_by_listing(&self, listing_hash: &str) -> Result<Vec<ActionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, action, listing_hash, sender, receiver, payload, received_at
                 FROM action_log WHERE listing_hash = ?1 ORDER BY id",
            )
            .map_err(|e| storage_error("Query error", e))?;

        let records = stmt
            .query_map(params![listing_hash], |row| {
                let action: String = row.get(1)?;
                let action = EscrowActionType::from_wire(&action).ok_or_else(|| {
                    conversion_error(1, format!("unknown escrow action '{}'", action))
                })?;

                Ok(ActionRecord {
                    id: row.get(0)?,
                    action,
                    listing_hash: row.get(2)?,
                    sender: row.get(3)?,
                    receiver: row.get(4)?,
                    payload: row.get(5)?,
                    received_at: parse_timestamp(row, 6)?,
                })
            })
            .and_then(|rows| rows.collect::<SqlResult<Vec<_>>>())
            .map_err(|e| storage_error("Query error", e))?;

        Ok(records)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn load_order_item(conn: &Connection, order_item_id: i64) -> Result<Option<OrderItem>> {
    let sql = format!("{} WHERE oi.id = ?1", ORDER_ITEM_SELECT);
    let item = conn
        .query_row(&sql, params![order_item_id], map_order_item)
        .optional()
        .map_err(|e| storage_error("Query error", e))?;

    let Some(mut item) = item else {
        return Ok(None);
    };

    let mut stmt = conn
        .prepare(
            "SELECT id, order_item_id, data_id, data_value FROM order_item_objects
             WHERE order_item_id = ?1 ORDER BY id",
        )
        .map_err(|e| storage_error("Query error", e))?;
    item.objects = stmt
        .query_map(params![order_item_id], map_object)
        .and_then(|rows| rows.collect::<SqlResult<Vec<_>>>())
        .map_err(|e| storage_error("Query error", e))?;

    Ok(Some(item))
}

fn load_object(conn: &Connection, id: i64) -> Result<OrderItemObject> {
    conn.query_row(
        "SELECT id, order_item_id, data_id, data_value FROM order_item_objects WHERE id = ?1",
        params![id],
        map_object,
    )
    .map_err(|e| storage_error("Query error", e))
}

fn map_order_item(row: &Row<'_>) -> SqlResult<OrderItem> {
    let status: String = row.get(2)?;
    let status = status
        .parse::<OrderItemStatus>()
        .map_err(|e| conversion_error(2, e.to_string()))?;

    let bid_action: String = row.get(7)?;
    let bid_action = bid_action
        .parse::<BidAction>()
        .map_err(|e| conversion_error(7, e.to_string()))?;

    Ok(OrderItem {
        id: row.get(0)?,
        item_hash: row.get(1)?,
        status,
        order: Order {
            id: row.get(3)?,
            buyer: row.get(4)?,
            seller: row.get(5)?,
        },
        bid: Bid {
            id: row.get(6)?,
            action: bid_action,
            bidder: row.get(8)?,
            listing: map_listing(row, 9)?,
        },
        objects: Vec::new(),
    })
}

/// Map `hash, seller, template_id, escrow id, escrow type` starting at column `start`.
fn map_listing(row: &Row<'_>, start: usize) -> SqlResult<Listing> {
    let escrow_id: Option<i64> = row.get(start + 3)?;
    let escrow_type: Option<String> = row.get(start + 4)?;

    let escrow = match (escrow_id, escrow_type) {
        (Some(id), Some(kind)) => Some(EscrowInfo {
            id,
            escrow_type: kind
                .parse::<EscrowType>()
                .map_err(|e| conversion_error(start + 4, e.to_string()))?,
        }),
        _ => None,
    };

    Ok(Listing {
        hash: row.get(start)?,
        seller: row.get(start + 1)?,
        template_id: row.get(start + 2)?,
        escrow,
    })
}

fn map_object(row: &Row<'_>) -> SqlResult<OrderItemObject> {
    Ok(OrderItemObject {
        id: row.get(0)?,
        order_item_id: row.get(1)?,
        data_id: row.get(2)?,
        data_value: row.get(3)?,
    })
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> SqlResult<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("invalid timestamp '{}': {}", raw, e)))
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

fn storage_error(context: &str, e: rusqlite::Error) -> EscrowError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            EscrowError::IntegrityViolation(format!("{}: {}", context, e))
        }
        _ => EscrowError::Storage(format!("{}: {}", context, e)),
    }
}

// Extend the optional trait for rusqlite
trait OptionalExt<T> {
    fn optional(self) -> SqlResult<Option<T>>;
}

impl<T> OptionalExt<T> for SqlResult<T> {
    fn optional(self) -> SqlResult<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
