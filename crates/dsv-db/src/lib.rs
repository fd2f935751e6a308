// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use dsv_app::{DateRange, PurchaseOrderId, RowRecord, WritePolicy};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

pub const APP_NAME: &str = "dsv";

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[(
    "orders",
    &[
        "purchase_order_id",
        "sku",
        "item_name",
        "quantity",
        "unit_price",
        "order_date",
    ],
)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequiredIndex {
    name: &'static str,
    create_sql: &'static str,
}

const REQUIRED_INDEXES: &[RequiredIndex] = &[RequiredIndex {
    name: "idx_orders_order_date",
    create_sql: "CREATE INDEX IF NOT EXISTS idx_orders_order_date ON orders (order_date);",
}];

const ROW_COLUMNS: &str = "purchase_order_id, sku, item_name, quantity, unit_price, order_date";

/// Result of writing one batch of rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Purchase orders stored for the first time.
    pub written: usize,
    /// Stored purchase orders overwritten under upsert.
    pub updated: usize,
    /// Rows dropped because their purchase order was already stored.
    pub ignored: usize,
}

pub struct Store {
    conn: Connection,
    write_policy: WritePolicy,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open database at {}", path.display()))?;
        configure_connection(&conn)?;
        Ok(Self {
            conn,
            write_policy: WritePolicy::default(),
        })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self {
            conn,
            write_policy: WritePolicy::default(),
        })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        if has_user_tables(&self.conn)? {
            validate_schema(&self.conn)?;
        } else {
            self.conn
                .execute_batch(include_str!("sql/schema.sql"))
                .context("create schema")?;
        }

        ensure_required_indexes(&self.conn)
    }

    pub fn write_policy(&self) -> WritePolicy {
        self.write_policy
    }

    pub fn set_write_policy(&mut self, policy: WritePolicy) {
        self.write_policy = policy;
    }

    /// Writes each row in its own statement. Under `InsertOrIgnore` a row
    /// whose purchase order is already stored is counted as ignored and the
    /// stored row is left untouched.
    pub fn write_rows(&self, rows: &[RowRecord]) -> Result<WriteSummary> {
        let sql = match self.write_policy {
            WritePolicy::InsertOrIgnore => {
                "
                INSERT OR IGNORE INTO orders (
                  purchase_order_id, sku, item_name, quantity, unit_price, order_date
                ) VALUES (?, ?, ?, ?, ?, ?)
                "
            }
            WritePolicy::Upsert => {
                "
                INSERT INTO orders (
                  purchase_order_id, sku, item_name, quantity, unit_price, order_date
                ) VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT (purchase_order_id) DO UPDATE SET
                  sku = excluded.sku,
                  item_name = excluded.item_name,
                  quantity = excluded.quantity,
                  unit_price = excluded.unit_price,
                  order_date = excluded.order_date
                "
            }
        };

        let mut stmt = self
            .conn
            .prepare(sql)
            .context("prepare order row insert")?;
        let mut exists = self
            .conn
            .prepare("SELECT EXISTS (SELECT 1 FROM orders WHERE purchase_order_id = ?)")
            .context("prepare order lookup")?;
        let mut summary = WriteSummary::default();
        for row in rows {
            let already_stored: bool = exists
                .query_row([row.purchase_order_id.as_str()], |found| found.get(0))
                .with_context(|| format!("look up order {}", row.purchase_order_id))?;
            let changed = stmt
                .execute(params![
                    row.purchase_order_id.as_str(),
                    row.sku,
                    row.item_name,
                    row.quantity,
                    row.unit_price,
                    format_timestamp(row.order_date)?,
                ])
                .with_context(|| format!("write order {}", row.purchase_order_id))?;
            match (changed, already_stored) {
                (0, _) => summary.ignored += 1,
                (_, true) => summary.updated += 1,
                (_, false) => summary.written += 1,
            }
        }

        tracing::info!(
            policy = self.write_policy.as_str(),
            written = summary.written,
            updated = summary.updated,
            ignored = summary.ignored,
            "stored order rows"
        );
        Ok(summary)
    }

    /// Stored rows, newest first, optionally limited to the UTC days of
    /// `range`.
    pub fn list_rows(&self, range: Option<DateRange>) -> Result<Vec<RowRecord>> {
        let (lower, upper) = match range {
            Some(range) => (
                Some(day_start(range.start())?),
                range.end().next_day().map(day_start).transpose()?,
            ),
            None => (None, None),
        };

        let mut stmt = self
            .conn
            .prepare(&format!(
                "
                SELECT {ROW_COLUMNS}
                FROM orders
                WHERE (?1 IS NULL OR order_date >= ?1)
                  AND (?2 IS NULL OR order_date < ?2)
                ORDER BY order_date DESC, purchase_order_id ASC
                "
            ))
            .context("prepare order rows query")?;
        let rows = stmt
            .query_map(params![lower, upper], row_record)
            .context("query order rows")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect order rows")
    }

    pub fn get_row(&self, purchase_order_id: &PurchaseOrderId) -> Result<Option<RowRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {ROW_COLUMNS} FROM orders WHERE purchase_order_id = ?"),
                params![purchase_order_id.as_str()],
                row_record,
            )
            .optional()
            .with_context(|| format!("load order {purchase_order_id}"))
    }

    pub fn row_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))
            .context("count order rows")?;
        usize::try_from(count).context("order row count out of range")
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os("DSV_DB_PATH") {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set DSV_DB_PATH to a writable database path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("orders.db"))
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

fn row_record(row: &Row<'_>) -> rusqlite::Result<RowRecord> {
    let order_date_raw: String = row.get(5)?;
    Ok(RowRecord {
        purchase_order_id: PurchaseOrderId::new(row.get::<_, String>(0)?),
        sku: row.get(1)?,
        item_name: row.get(2)?,
        quantity: row.get(3)?,
        unit_price: row.get(4)?,
        order_date: parse_timestamp(&order_date_raw).map_err(to_sql_error)?,
    })
}

fn has_user_tables(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "
            SELECT COUNT(*)
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ",
            [],
            |row| row.get(0),
        )
        .context("count user tables")?;
    Ok(count > 0)
}

fn validate_schema(conn: &Connection) -> Result<()> {
    for (table, required_columns) in REQUIRED_SCHEMA {
        if !table_exists(conn, table)? {
            bail!(
                "database is missing required table `{table}`; point storage.db_path at a dsv database"
            );
        }

        let columns = table_columns(conn, table)?;
        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();

        if !missing.is_empty() {
            bail!(
                "table `{table}` is missing required columns: {}; move the old database aside",
                missing.join(", ")
            );
        }
    }

    Ok(())
}

fn ensure_required_indexes(conn: &Connection) -> Result<()> {
    for index in REQUIRED_INDEXES {
        conn.execute_batch(index.create_sql)
            .with_context(|| format!("ensure required index `{}`", index.name))?;
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "
            SELECT EXISTS(
              SELECT 1
              FROM sqlite_master
              WHERE type = 'table' AND name = ?
            )
            ",
            params![table],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("check table existence for {table}"))?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query column info for {table}"))?;

    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

/// UTC with fixed millisecond precision, so text order is time order.
fn format_timestamp(value: OffsetDateTime) -> Result<String> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
        ))
        .context("format order timestamp")
}

fn parse_timestamp(raw: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339)
        .with_context(|| format!("parse stored order timestamp {raw:?}"))
}

fn day_start(day: Date) -> Result<String> {
    format_timestamp(day.midnight().assume_utc())
}

fn to_sql_error(error: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        5,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            error.to_string(),
        )),
    )
}
