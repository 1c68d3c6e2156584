use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use rusqlite::backup::Backup;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::Serialize;
use thiserror::Error;

use crate::sqlite::configure_connection;

const CHANNELS_SCHEMA: &str = include_str!("../../sql/channels.sql");

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to open channel registry {path}: {source}")]
    Open {
        source: rusqlite::Error,
        path: PathBuf,
    },
    #[error("failed to execute statement on channel registry: {0}")]
    Execute(#[from] rusqlite::Error),
    #[error("registry path not configured")]
    MissingStore,
    #[error("channel not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Metadata for a channel being registered at bootstrap.
#[derive(Debug, Clone, Default)]
pub struct NewChannel {
    pub id: String,
    pub name: String,
    pub country: Option<String>,
    pub group_title: Option<String>,
    pub source_url: String,
}

/// The liveness fields owned by the health monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelHealth {
    pub is_online: bool,
    pub consecutive_failures: u32,
    pub last_checked: Option<DateTime<Utc>>,
}

impl Default for ChannelHealth {
    /// A channel that was never probed is assumed online.
    fn default() -> Self {
        Self {
            is_online: true,
            consecutive_failures: 0,
            last_checked: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelRecord {
    pub id: String,
    pub name: String,
    pub country: Option<String>,
    pub group_title: Option<String>,
    pub source_url: String,
    pub health: ChannelHealth,
    pub validated: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ChannelRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            country: row.get("country")?,
            group_title: row.get("group_title")?,
            source_url: row.get("source_url")?,
            health: ChannelHealth {
                is_online: row.get("is_online")?,
                consecutive_failures: row.get("consecutive_failures")?,
                last_checked: parse_timestamp(row.get("last_checked")?)?,
            },
            validated: row.get("validated")?,
            created_at: parse_timestamp(row.get("created_at")?)?,
            updated_at: parse_timestamp(row.get("updated_at")?)?,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistrySummary {
    pub total: i64,
    pub online: i64,
    pub offline: i64,
    pub never_checked: i64,
    pub validated: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ChannelFilter {
    pub online: Option<bool>,
    pub group_title: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ChannelRegistryBuilder {
    path: Option<PathBuf>,
    read_only: bool,
    create_if_missing: bool,
}

impl Default for ChannelRegistryBuilder {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            create_if_missing: true,
        }
    }
}

impl ChannelRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> RegistryResult<ChannelRegistry> {
        let path = self.path.ok_or(RegistryError::MissingStore)?;
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        if !self.read_only && self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        Ok(ChannelRegistry { path, flags })
    }
}

/// Durable store of channels and their health state.
///
/// Connections are short-lived: every operation opens, runs and drops its
/// own handle, which keeps the store `Clone` and usable from concurrent
/// probe tasks without shared connection state.
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    path: PathBuf,
    flags: OpenFlags,
}

impl ChannelRegistry {
    pub fn builder() -> ChannelRegistryBuilder {
        ChannelRegistryBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> RegistryResult<Self> {
        ChannelRegistryBuilder::new().path(path).build()
    }

    fn open(&self) -> RegistryResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            RegistryError::Open {
                source,
                path: self.path.clone(),
            }
        })?;
        configure_connection(&conn).map_err(|source| RegistryError::Open {
            source,
            path: self.path.clone(),
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> RegistryResult<()> {
        let conn = self.open()?;
        conn.execute_batch(CHANNELS_SCHEMA)?;
        Ok(())
    }

    /// Register a channel with optimistic health defaults.
    ///
    /// An already-registered id is left untouched, health state included,
    /// so repeated playlist imports never reset liveness bookkeeping.
    /// Returns whether a new row was inserted.
    pub fn register(&self, channel: &NewChannel) -> RegistryResult<bool> {
        let conn = self.open()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO channels (id, name, country, group_title, source_url)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &channel.id,
                &channel.name,
                &channel.country,
                &channel.group_title,
                &channel.source_url
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn register_all(&self, channels: &[NewChannel]) -> RegistryResult<usize> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        for channel in channels {
            inserted += tx.execute(
                "INSERT OR IGNORE INTO channels (id, name, country, group_title, source_url)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    &channel.id,
                    &channel.name,
                    &channel.country,
                    &channel.group_title,
                    &channel.source_url
                ],
            )?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn channel_by_id(&self, id: &str) -> RegistryResult<Option<ChannelRecord>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT * FROM channels WHERE id = ?1")?;
        let record = stmt
            .query_row([id], |row| ChannelRecord::from_row(row))
            .optional()?;
        Ok(record)
    }

    /// Channels never probed, or last probed before `older_than` ago.
    /// Never-checked rows sort first so fresh registrations are covered
    /// by the next sweep.
    pub fn channels_needing_check(&self, older_than: Duration) -> RegistryResult<Vec<ChannelRecord>> {
        let cutoff = (Utc::now() - older_than).naive_utc();
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM channels
             WHERE last_checked IS NULL OR last_checked < ?1
             ORDER BY last_checked ASC, id ASC",
        )?;
        let mut rows = stmt.query([cutoff])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(ChannelRecord::from_row(row)?);
        }
        Ok(records)
    }

    /// Single-row upsert of the health fields; the only write path used
    /// by the sweep and on-demand checks.
    pub fn update_health(&self, id: &str, health: &ChannelHealth) -> RegistryResult<()> {
        let conn = self.open()?;
        let affected = conn.execute(
            "UPDATE channels
             SET is_online = ?1, consecutive_failures = ?2, last_checked = ?3,
                 updated_at = CURRENT_TIMESTAMP
             WHERE id = ?4",
            params![
                health.is_online,
                health.consecutive_failures,
                health.last_checked.map(|ts| ts.naive_utc()),
                id
            ],
        )?;
        if affected == 0 {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Admin curation flag; orthogonal to liveness and never touched by
    /// the sweep path.
    pub fn set_validated(&self, id: &str, validated: bool) -> RegistryResult<()> {
        let conn = self.open()?;
        let affected = conn.execute(
            "UPDATE channels SET validated = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
            params![validated, id],
        )?;
        if affected == 0 {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn list(&self, filter: &ChannelFilter) -> RegistryResult<Vec<ChannelRecord>> {
        let conn = self.open()?;
        let mut query = String::from("SELECT * FROM channels");
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<Value> = Vec::new();
        if let Some(online) = filter.online {
            clauses.push("is_online = ?");
            params.push(Value::Integer(online as i64));
        }
        if let Some(group) = &filter.group_title {
            clauses.push("group_title = ?");
            params.push(Value::Text(group.clone()));
        }
        if !clauses.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&clauses.join(" AND "));
        }
        query.push_str(" ORDER BY name ASC");
        if let Some(limit) = filter.limit {
            query.push_str(" LIMIT ?");
            params.push(Value::Integer(limit as i64));
        }
        let mut stmt = conn.prepare(&query)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(
            params.iter().map(|value| value as &dyn rusqlite::ToSql),
        ))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(ChannelRecord::from_row(row)?);
        }
        Ok(records)
    }

    pub fn list_all(&self) -> RegistryResult<Vec<ChannelRecord>> {
        self.list(&ChannelFilter::default())
    }

    /// The read path the serving layer uses when listing channels.
    pub fn list_online(&self) -> RegistryResult<Vec<ChannelRecord>> {
        self.list(&ChannelFilter {
            online: Some(true),
            ..ChannelFilter::default()
        })
    }

    pub fn summary(&self) -> RegistryResult<RegistrySummary> {
        let conn = self.open()?;
        let summary = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(is_online), 0),
                    COALESCE(SUM(1 - is_online), 0),
                    COALESCE(SUM(last_checked IS NULL), 0),
                    COALESCE(SUM(validated), 0)
             FROM channels",
            [],
            |row| {
                Ok(RegistrySummary {
                    total: row.get(0)?,
                    online: row.get(1)?,
                    offline: row.get(2)?,
                    never_checked: row.get(3)?,
                    validated: row.get(4)?,
                })
            },
        )?;
        Ok(summary)
    }

    pub fn backup_to(&self, destination: impl AsRef<Path>) -> RegistryResult<()> {
        let destination_path = destination.as_ref();
        if let Some(parent) = destination_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let source = self.open()?;
        let mut dest = Connection::open(destination_path)?;
        configure_connection(&dest).map_err(|source| RegistryError::Open {
            source,
            path: destination_path.to_path_buf(),
        })?;
        let backup = Backup::new(&source, &mut dest)?;
        backup.run_to_completion(10, StdDuration::from_millis(50), None)?;
        Ok(())
    }
}

fn parse_timestamp(value: Option<NaiveDateTime>) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
    Ok(value.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)))
}
