//! SQLite-backed L3 event source.
//!
//! Events live in one table per symbol, `<symbol>_l3` (dashes become
//! underscores):
//!
//! | column | type | meaning |
//! |---|---|---|
//! | `ts` | INTEGER | origin timestamp, ns |
//! | `action` | INTEGER | 1 add, 2 modify, 3 cancel, 4 execute |
//! | `order_id` | INTEGER | exchange order id |
//! | `side` | INTEGER | 0 bid, 1 ask |
//! | `price` | REAL | instrument price |
//! | `qty` | INTEGER | quantity |
//!
//! Rows are read in `(ts, rowid)` order with keyset pagination so memory
//! stays bounded by the batch size.

use std::collections::VecDeque;
use std::path::Path;

use l3_core::{BookSide, Config, Error, L3Action, L3BookEvent, Result, TimestampNs};
use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, info};

use crate::source::{EventSource, IngestionStats};

/// Table name for a symbol.
pub fn table_name(symbol: &str) -> String {
    format!("{}_l3", symbol.replace('-', "_"))
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::database(e.to_string())
}

fn encode_action(action: L3Action) -> i64 {
    match action {
        L3Action::Add => 1,
        L3Action::Modify => 2,
        L3Action::Cancel => 3,
        L3Action::Execute => 4,
    }
}

fn decode_action(code: i64) -> Result<L3Action> {
    match code {
        1 => Ok(L3Action::Add),
        2 => Ok(L3Action::Modify),
        3 => Ok(L3Action::Cancel),
        4 => Ok(L3Action::Execute),
        other => Err(Error::data(format!("unknown action code {other}"))),
    }
}

fn encode_side(side: BookSide) -> i64 {
    match side {
        BookSide::Bid => 0,
        BookSide::Ask => 1,
    }
}

fn decode_side(code: i64) -> Result<BookSide> {
    match code {
        0 => Ok(BookSide::Bid),
        1 => Ok(BookSide::Ask),
        other => Err(Error::data(format!("unknown side code {other}"))),
    }
}

/// One undecoded table row.
#[derive(Debug, Clone, Copy)]
struct RawRow {
    rowid: i64,
    ts: TimestampNs,
    action: i64,
    order_id: i64,
    side: i64,
    price: f64,
    qty: i64,
}

/// Create the event table for `symbol` if it does not exist.
pub fn create_schema(conn: &Connection, symbol: &str) -> Result<()> {
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            ts INTEGER NOT NULL,
            action INTEGER NOT NULL,
            order_id INTEGER NOT NULL,
            side INTEGER NOT NULL,
            price REAL NOT NULL,
            qty INTEGER NOT NULL
        )",
        table_name(symbol)
    );
    conn.execute(&sql, []).map_err(db_err)?;
    Ok(())
}

/// Insert events into the table for `symbol`, converting ticks to prices.
pub fn insert_events(
    conn: &Connection,
    symbol: &str,
    tick_size: f64,
    events: &[L3BookEvent],
) -> Result<()> {
    let tx = conn.unchecked_transaction().map_err(db_err)?;
    {
        let sql = format!(
            "INSERT INTO {} (ts, action, order_id, side, price, qty)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            table_name(symbol)
        );
        let mut stmt = tx.prepare(&sql).map_err(db_err)?;
        for event in events {
            stmt.execute(params![
                event.ts,
                encode_action(event.action),
                event.order_id as i64,
                encode_side(event.side),
                event.price as f64 * tick_size,
                event.quantity,
            ])
            .map_err(db_err)?;
        }
    }
    tx.commit().map_err(db_err)?;
    Ok(())
}

/// Streams L3 events for one symbol from SQLite.
pub struct SqliteEventSource {
    conn: Connection,
    table: String,
    tick_size: f64,
    batch_size: usize,
    buffer: VecDeque<L3BookEvent>,
    /// Last `(ts, rowid)` read.
    cursor: (TimestampNs, i64),
    /// No rows left in the table.
    exhausted: bool,
    /// Every fetched row has been handed out.
    drained: bool,
    stats: IngestionStats,
}

impl SqliteEventSource {
    /// Open `path` read-only for the configured symbol.
    pub fn open(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| Error::database(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), "connected to event database");
        Self::from_connection(conn, config)
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection, config: &Config) -> Result<Self> {
        let table = table_name(&config.symbol);
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                params![table],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        if !exists {
            return Err(Error::data(format!("table {table} not found")));
        }
        info!(table = %table, "expecting L3 event table");

        Ok(Self {
            conn,
            table,
            tick_size: config.tick_size,
            batch_size: config.batch_size,
            buffer: VecDeque::new(),
            cursor: (TimestampNs::MIN, i64::MIN),
            exhausted: false,
            drained: false,
            stats: IngestionStats::default(),
        })
    }

    /// Whether the stream has handed out its last event.
    pub fn is_drained(&self) -> bool {
        self.drained
    }

    fn fetch_batch(&mut self) -> Result<()> {
        let sql = format!(
            "SELECT rowid, ts, action, order_id, side, price, qty FROM {}
             WHERE ts > ?1 OR (ts = ?1 AND rowid > ?2)
             ORDER BY ts, rowid LIMIT ?3",
            self.table
        );
        let mut stmt = self.conn.prepare_cached(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![self.cursor.0, self.cursor.1, self.batch_size as i64], |row| {
                Ok(RawRow {
                    rowid: row.get(0)?,
                    ts: row.get(1)?,
                    action: row.get(2)?,
                    order_id: row.get(3)?,
                    side: row.get(4)?,
                    price: row.get(5)?,
                    qty: row.get(6)?,
                })
            })
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;

        if rows.len() < self.batch_size {
            self.exhausted = true;
        }
        if let Some(last) = rows.last() {
            self.cursor = (last.ts, last.rowid);
        }
        debug!(rows = rows.len(), table = %self.table, "fetched event batch");

        for raw in rows {
            let event = decode_row(&raw, self.tick_size)?;
            self.buffer.push_back(event);
        }
        Ok(())
    }
}

fn decode_row(raw: &RawRow, tick_size: f64) -> Result<L3BookEvent> {
    if raw.order_id < 0 {
        return Err(Error::data(format!(
            "negative order id {} at rowid {}",
            raw.order_id, raw.rowid
        )));
    }
    Ok(L3BookEvent {
        ts: raw.ts,
        action: decode_action(raw.action)?,
        order_id: raw.order_id as u64,
        side: decode_side(raw.side)?,
        price: (raw.price / tick_size).round() as i64,
        quantity: raw.qty,
    })
}

impl EventSource for SqliteEventSource {
    fn next_event(&mut self) -> Result<Option<L3BookEvent>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_batch()?;
        }
        let event = self.buffer.pop_front();
        match &event {
            Some(event) => self.stats.record(event),
            None if !self.drained => {
                self.drained = true;
                info!(
                    total = self.stats.total_events,
                    table = %self.table,
                    "finished streaming events"
                );
            }
            None => {}
        }
        Ok(event)
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.table)
    }

    fn stats(&self) -> &IngestionStats {
        &self.stats
    }
}
