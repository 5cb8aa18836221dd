//! SQLite-backed content store
//!
//! All records live in a single database file using WAL mode. Dimension
//! combinations and properties are stored as JSON text columns.

use crate::dimension::DimensionValues;
use crate::node::{NodeData, Site, Workspace, paths};
use crate::store::{ContentStore, Result, StoreError, sort_records};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS workspaces (
        name TEXT PRIMARY KEY,
        base_workspace TEXT
    ) WITHOUT ROWID;
    CREATE TABLE IF NOT EXISTS sites (
        node_name TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        site_package_key TEXT NOT NULL
    ) WITHOUT ROWID;
    CREATE TABLE IF NOT EXISTS node_data (
        workspace TEXT NOT NULL,
        identifier TEXT NOT NULL,
        dimensions_hash TEXT NOT NULL,
        path TEXT NOT NULL,
        parent_path TEXT NOT NULL,
        node_type TEXT NOT NULL,
        sort_index INTEGER NOT NULL,
        hidden INTEGER NOT NULL,
        removed INTEGER NOT NULL,
        dimensions TEXT NOT NULL,
        properties TEXT NOT NULL,
        last_modified TEXT NOT NULL,
        PRIMARY KEY (workspace, identifier, dimensions_hash)
    ) WITHOUT ROWID;
    CREATE INDEX IF NOT EXISTS node_data_path ON node_data (workspace, path);
    CREATE INDEX IF NOT EXISTS node_data_parent ON node_data (workspace, parent_path);
";

const NODE_COLUMNS: &str = "identifier,path,workspace,node_type,sort_index,hidden,removed,dimensions,properties,last_modified";

/// Raw row before JSON and timestamp decoding
struct NodeRow {
    identifier: String,
    path: String,
    workspace: String,
    node_type: String,
    index: i64,
    hidden: bool,
    removed: bool,
    dimensions: String,
    properties: String,
    last_modified: String,
}

impl NodeRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            identifier: row.get(0)?,
            path: row.get(1)?,
            workspace: row.get(2)?,
            node_type: row.get(3)?,
            index: row.get(4)?,
            hidden: row.get::<_, i64>(5)? != 0,
            removed: row.get::<_, i64>(6)? != 0,
            dimensions: row.get(7)?,
            properties: row.get(8)?,
            last_modified: row.get(9)?,
        })
    }

    fn into_node_data(self) -> Result<NodeData> {
        let dimensions: DimensionValues = serde_json::from_str(&self.dimensions)?;
        let properties: BTreeMap<String, serde_json::Value> = serde_json::from_str(&self.properties)?;
        let last_modified = DateTime::parse_from_rfc3339(&self.last_modified)
            .map_err(|e| StoreError::InvalidData(format!("Bad timestamp {:?}: {}", self.last_modified, e)))?
            .with_timezone(&Utc);
        Ok(NodeData {
            identifier: self.identifier,
            path: self.path,
            workspace: self.workspace,
            node_type: self.node_type,
            index: self.index,
            hidden: self.hidden,
            removed: self.removed,
            dimensions,
            properties,
            last_modified,
        })
    }
}

fn open_content_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

/// SQLite-backed store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store; a new store gets the live workspace
    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_content_db(path)?;
        conn.execute(
            "INSERT OR IGNORE INTO workspaces (name, base_workspace) VALUES (?1, NULL)",
            params![crate::node::LIVE_WORKSPACE],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (tests and dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        conn.execute(
            "INSERT OR IGNORE INTO workspaces (name, base_workspace) VALUES (?1, NULL)",
            params![crate::node::LIVE_WORKSPACE],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query_nodes(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<NodeData>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(args, NodeRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut records = rows
            .into_iter()
            .map(NodeRow::into_node_data)
            .collect::<Result<Vec<_>>>()?;
        sort_records(&mut records);
        Ok(records)
    }
}

impl ContentStore for SqliteStore {
    fn find_workspace(&self, name: &str) -> Result<Option<Workspace>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let workspace = conn
            .query_row(
                "SELECT name, base_workspace FROM workspaces WHERE name = ?1",
                params![name],
                |row| {
                    Ok(Workspace {
                        name: row.get(0)?,
                        base_workspace: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(workspace)
    }

    fn add_workspace(&self, workspace: Workspace) -> Result<()> {
        if self.find_workspace(&workspace.name)?.is_some() {
            return Err(StoreError::WorkspaceExists(workspace.name));
        }
        if let Some(base) = &workspace.base_workspace {
            if self.find_workspace(base)?.is_none() {
                return Err(StoreError::WorkspaceNotFound(base.clone()));
            }
        }
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO workspaces (name, base_workspace) VALUES (?1, ?2)",
            params![workspace.name, workspace.base_workspace],
        )?;
        Ok(())
    }

    fn find_site(&self, node_name: &str) -> Result<Option<Site>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let site = conn
            .query_row(
                "SELECT node_name, name, site_package_key FROM sites WHERE node_name = ?1",
                params![node_name],
                |row| {
                    Ok(Site {
                        node_name: row.get(0)?,
                        name: row.get(1)?,
                        site_package_key: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(site)
    }

    fn find_site_by_package_key(&self, package_key: &str) -> Result<Option<Site>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let site = conn
            .query_row(
                "SELECT node_name, name, site_package_key FROM sites \
                 WHERE site_package_key = ?1 ORDER BY node_name LIMIT 1",
                params![package_key],
                |row| {
                    Ok(Site {
                        node_name: row.get(0)?,
                        name: row.get(1)?,
                        site_package_key: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(site)
    }

    fn save_site(&self, site: Site) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO sites (node_name, name, site_package_key) VALUES (?1, ?2, ?3) \
             ON CONFLICT(node_name) DO UPDATE SET name=excluded.name, site_package_key=excluded.site_package_key",
            params![site.node_name, site.name, site.site_package_key],
        )?;
        Ok(())
    }

    fn node_data_by_identifier(&self, workspace: &str, identifier: &str) -> Result<Vec<NodeData>> {
        let sql = format!(
            "SELECT {} FROM node_data WHERE workspace = ?1 AND identifier = ?2",
            NODE_COLUMNS
        );
        self.query_nodes(&sql, &[&workspace, &identifier])
    }

    fn node_data_by_path(&self, workspace: &str, path: &str) -> Result<Vec<NodeData>> {
        let sql = format!(
            "SELECT {} FROM node_data WHERE workspace = ?1 AND path = ?2",
            NODE_COLUMNS
        );
        self.query_nodes(&sql, &[&workspace, &path])
    }

    fn node_data_below(
        &self,
        workspace: &str,
        parent_path: &str,
        recursive: bool,
    ) -> Result<Vec<NodeData>> {
        if recursive {
            let prefix = if parent_path == "/" {
                "/".to_string()
            } else {
                format!("{}/", parent_path)
            };
            let sql = format!(
                "SELECT {} FROM node_data WHERE workspace = ?1 \
                 AND substr(path, 1, length(?2)) = ?2 AND path != ?3",
                NODE_COLUMNS
            );
            self.query_nodes(&sql, &[&workspace, &prefix, &parent_path])
        } else {
            let sql = format!(
                "SELECT {} FROM node_data WHERE workspace = ?1 AND parent_path = ?2",
                NODE_COLUMNS
            );
            self.query_nodes(&sql, &[&workspace, &parent_path])
        }
    }

    fn save_node_data(&self, node: &NodeData) -> Result<()> {
        if self.find_workspace(&node.workspace)?.is_none() {
            return Err(StoreError::WorkspaceNotFound(node.workspace.clone()));
        }
        let dimensions = serde_json::to_string(&node.dimensions)?;
        let properties = serde_json::to_string(&node.properties)?;
        let parent_path = paths::parent_of(&node.path).unwrap_or("");
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO node_data (workspace,identifier,dimensions_hash,path,parent_path,node_type,\
             sort_index,hidden,removed,dimensions,properties,last_modified) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12) \
             ON CONFLICT(workspace,identifier,dimensions_hash) DO UPDATE SET \
             path=excluded.path,parent_path=excluded.parent_path,node_type=excluded.node_type,\
             sort_index=excluded.sort_index,hidden=excluded.hidden,removed=excluded.removed,\
             dimensions=excluded.dimensions,properties=excluded.properties,last_modified=excluded.last_modified",
            params![
                node.workspace,
                node.identifier,
                node.dimensions_hash(),
                node.path,
                parent_path,
                node.node_type,
                node.index,
                node.hidden as i64,
                node.removed as i64,
                dimensions,
                properties,
                node.last_modified.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}
