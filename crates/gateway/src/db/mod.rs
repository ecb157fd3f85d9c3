use annotations::{Fragment, FragmentKind};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;

pub struct Database {
    pub(crate) conn: Mutex<Connection>,
}

impl Database {
    pub fn new(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS assets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL CHECK (length(url) <= 1024),
                guid TEXT NOT NULL CHECK (length(guid) <= 1024),
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                asset_id INTEGER NOT NULL,
                uri TEXT NOT NULL,
                uuid TEXT NOT NULL,
                submitted_at TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (asset_id) REFERENCES assets(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS parts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id INTEGER NOT NULL,
                uri TEXT NOT NULL,
                uuid TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                name TEXT NOT NULL,
                processed_at TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (item_id) REFERENCES items(id)
            )",
            [],
        )?;

        // One table for every fragment kind; columns a kind does not use stay NULL.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS fragments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                part_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                range_start INTEGER NOT NULL,
                range_end INTEGER NOT NULL,
                x INTEGER,
                y INTEGER,
                width INTEGER,
                height INTEGER,
                label TEXT,
                reference TEXT,
                entity_type TEXT,
                confidence REAL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (part_id) REFERENCES parts(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS fragments_by_part ON fragments (part_id, kind)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                type TEXT NOT NULL,
                status TEXT NOT NULL,
                progress REAL NOT NULL,
                payload_json TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }
}

pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| rusqlite::Error::InvalidColumnType(idx, "TEXT".to_string(), rusqlite::types::Type::Text))
}

fn parse_optional_timestamp(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_timestamp(idx, &s)).transpose()
}

#[derive(Debug, Clone)]
pub struct Asset {
    pub id: i64,
    pub url: String,
    pub guid: String,
    pub created_at: DateTime<Utc>,
}

impl Asset {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let created_at_str: String = row.get(3)?;
        Ok(Asset {
            id: row.get(0)?,
            url: row.get(1)?,
            guid: row.get(2)?,
            created_at: parse_timestamp(3, &created_at_str)?,
        })
    }
}

/// A MICO content item created for an asset.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: i64,
    pub asset_id: i64,
    pub uri: String,
    pub uuid: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Item {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let created_at_str: String = row.get(5)?;
        Ok(Item {
            id: row.get(0)?,
            asset_id: row.get(1)?,
            uri: row.get(2)?,
            uuid: row.get(3)?,
            submitted_at: parse_optional_timestamp(4, row.get(4)?)?,
            created_at: parse_timestamp(5, &created_at_str)?,
        })
    }
}

/// A MICO content part (the uploaded media) of an item.
#[derive(Debug, Clone)]
pub struct Part {
    pub id: i64,
    pub item_id: i64,
    pub uri: String,
    pub uuid: String,
    pub mime_type: String,
    pub name: String,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Part {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let created_at_str: String = row.get(7)?;
        Ok(Part {
            id: row.get(0)?,
            item_id: row.get(1)?,
            uri: row.get(2)?,
            uuid: row.get(3)?,
            mime_type: row.get(4)?,
            name: row.get(5)?,
            processed_at: parse_optional_timestamp(6, row.get(6)?)?,
            created_at: parse_timestamp(7, &created_at_str)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StoredFragment {
    pub id: i64,
    pub part_id: i64,
    pub fragment: Fragment,
    pub created_at: DateTime<Utc>,
}

impl StoredFragment {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let kind_str: String = row.get(2)?;
        let kind: FragmentKind = kind_str
            .parse()
            .map_err(|_| rusqlite::Error::InvalidColumnType(2, "TEXT".to_string(), rusqlite::types::Type::Text))?;

        let fragment = match kind {
            FragmentKind::Sequence => Fragment::Sequence {
                start: row.get(3)?,
                end: row.get(4)?,
            },
            FragmentKind::Face => Fragment::Face {
                start: row.get(3)?,
                end: row.get(4)?,
                x: row.get(5)?,
                y: row.get(6)?,
                width: row.get(7)?,
                height: row.get(8)?,
            },
            FragmentKind::Topic => Fragment::Topic {
                label: row.get(9)?,
                reference: row.get(10)?,
                confidence: row.get(12)?,
            },
            FragmentKind::Entity => Fragment::Entity {
                label: row.get(9)?,
                reference: row.get(10)?,
                entity_type: row.get(11)?,
                confidence: row.get(12)?,
            },
        };

        let created_at_str: String = row.get(13)?;
        Ok(StoredFragment {
            id: row.get(0)?,
            part_id: row.get(1)?,
            fragment,
            created_at: parse_timestamp(13, &created_at_str)?,
        })
    }
}

const ITEM_COLUMNS: &str = "id, asset_id, uri, uuid, submitted_at, created_at";
const PART_COLUMNS: &str = "id, item_id, uri, uuid, mime_type, name, processed_at, created_at";
const FRAGMENT_COLUMNS: &str = "id, part_id, kind, range_start, range_end, x, y, width, height, \
                                label, reference, entity_type, confidence, created_at";

impl Database {
    pub fn create_asset(&self, url: &str, guid: &str) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO assets (url, guid, created_at) VALUES (?1, ?2, ?3)",
            params![url, guid, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_asset(&self, id: i64) -> Result<Option<Asset>> {
        let conn = self.conn.lock().unwrap();
        let asset = conn
            .query_row(
                "SELECT id, url, guid, created_at FROM assets WHERE id = ?1",
                params![id],
                |row| Asset::from_row(row),
            )
            .optional()?;
        Ok(asset)
    }

    pub fn get_all_assets(&self) -> Result<Vec<Asset>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, url, guid, created_at FROM assets ORDER BY id")?;
        let rows = stmt.query_map([], |row| Asset::from_row(row))?;

        let mut assets = Vec::new();
        for row in rows {
            assets.push(row?);
        }
        Ok(assets)
    }

    pub fn create_item(&self, asset_id: i64, uri: &str, uuid: &str) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO items (asset_id, uri, uuid, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![asset_id, uri, uuid, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_item(&self, id: i64) -> Result<Option<Item>> {
        let conn = self.conn.lock().unwrap();
        let item = conn
            .query_row(
                &format!("SELECT {} FROM items WHERE id = ?1", ITEM_COLUMNS),
                params![id],
                |row| Item::from_row(row),
            )
            .optional()?;
        Ok(item)
    }

    pub fn get_items_for_asset(&self, asset_id: i64) -> Result<Vec<Item>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM items WHERE asset_id = ?1 ORDER BY id",
            ITEM_COLUMNS
        ))?;
        let rows = stmt.query_map(params![asset_id], |row| Item::from_row(row))?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    pub fn mark_item_submitted(&self, item_id: i64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE items SET submitted_at = ?1 WHERE id = ?2",
            params![now, item_id],
        )?;
        Ok(())
    }

    pub fn create_part(
        &self,
        item_id: i64,
        uri: &str,
        uuid: &str,
        mime_type: &str,
        name: &str,
    ) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO parts (item_id, uri, uuid, mime_type, name, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![item_id, uri, uuid, mime_type, name, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_part(&self, id: i64) -> Result<Option<Part>> {
        let conn = self.conn.lock().unwrap();
        let part = conn
            .query_row(
                &format!("SELECT {} FROM parts WHERE id = ?1", PART_COLUMNS),
                params![id],
                |row| Part::from_row(row),
            )
            .optional()?;
        Ok(part)
    }

    pub fn get_parts_for_item(&self, item_id: i64) -> Result<Vec<Part>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM parts WHERE item_id = ?1 ORDER BY id",
            PART_COLUMNS
        ))?;
        let rows = stmt.query_map(params![item_id], |row| Part::from_row(row))?;

        let mut parts = Vec::new();
        for row in rows {
            parts.push(row?);
        }
        Ok(parts)
    }

    /// A part together with the item it belongs to.
    pub fn get_part_with_item(&self, part_id: i64) -> Result<Option<(Part, Item)>> {
        let part = match self.get_part(part_id)? {
            Some(part) => part,
            None => return Ok(None),
        };
        let item = self
            .get_item(part.item_id)?
            .ok_or_else(|| anyhow::anyhow!("Part {} refers to missing item {}", part_id, part.item_id))?;
        Ok(Some((part, item)))
    }

    /// Whether the item owning `part_id` has been submitted to MICO; `None` when
    /// the part does not exist.
    pub fn is_part_submitted(&self, part_id: i64) -> Result<Option<bool>> {
        let conn = self.conn.lock().unwrap();
        let submitted: Option<bool> = conn
            .query_row(
                "SELECT i.submitted_at IS NOT NULL
                 FROM parts p INNER JOIN items i ON p.item_id = i.id
                 WHERE p.id = ?1",
                params![part_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(submitted)
    }

    /// Swaps the part's fragments for `fragments` and stamps `processed_at`,
    /// all in one transaction.
    pub fn replace_fragments(&self, part_id: i64, fragments: &[Fragment]) -> Result<usize> {
        // SQLite stores a NaN REAL as NULL, which would make the part unreadable.
        let non_finite = fragments.iter().find(|fragment| {
            matches!(
                fragment,
                Fragment::Topic { confidence, .. } | Fragment::Entity { confidence, .. }
                    if !confidence.is_finite()
            )
        });
        if let Some(fragment) = non_finite {
            anyhow::bail!("Refusing to store fragment with non-finite confidence: {:?}", fragment);
        }

        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM fragments WHERE part_id = ?1", params![part_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO fragments (part_id, kind, range_start, range_end, x, y, width, height,
                                        label, reference, entity_type, confidence, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for fragment in fragments {
                let (x, y, width, height) = match fragment {
                    Fragment::Face {
                        x, y, width, height, ..
                    } => (Some(*x), Some(*y), Some(*width), Some(*height)),
                    _ => (None, None, None, None),
                };
                let (label, reference, entity_type, confidence) = match fragment {
                    Fragment::Topic {
                        label,
                        reference,
                        confidence,
                    } => (Some(label.as_str()), Some(reference.as_str()), None, Some(*confidence)),
                    Fragment::Entity {
                        label,
                        reference,
                        entity_type,
                        confidence,
                    } => (
                        Some(label.as_str()),
                        Some(reference.as_str()),
                        Some(entity_type.as_str()),
                        Some(*confidence),
                    ),
                    _ => (None, None, None, None),
                };
                stmt.execute(params![
                    part_id,
                    fragment.kind().as_str(),
                    fragment.start(),
                    fragment.end(),
                    x,
                    y,
                    width,
                    height,
                    label,
                    reference,
                    entity_type,
                    confidence,
                    now,
                ])?;
            }
        }
        tx.execute(
            "UPDATE parts SET processed_at = ?1 WHERE id = ?2",
            params![now, part_id],
        )?;
        tx.commit()?;

        Ok(fragments.len())
    }

    pub fn get_fragments_for_part(
        &self,
        part_id: i64,
        kind: Option<FragmentKind>,
    ) -> Result<Vec<StoredFragment>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM fragments
             WHERE part_id = ?1 AND (?2 IS NULL OR kind = ?2)
             ORDER BY id",
            FRAGMENT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![part_id, kind.map(|k| k.as_str())], |row| {
            StoredFragment::from_row(row)
        })?;

        let mut fragments = Vec::new();
        for row in rows {
            fragments.push(row?);
        }
        Ok(fragments)
    }
}
