//! # Cluster Store
//!
//! SQLite storage for the persisted-cache representation.
//!
//! ## Tables
//!
//! - **photos**: one row per photo, keyed by id
//! - **clusters**: scalar cluster fields plus the photo id list as a
//!   MessagePack blob, with `position` keeping presentation order
//! - **meta**: key/value integers (the refresh watermark)
//!
//! `save` replaces the whole snapshot in one transaction, so a crash never
//! leaves clusters pointing at photos from a different snapshot.

use std::collections::HashMap;

use log::{debug, info};
use rusqlite::{params, Connection, Result as SqlResult};

use crate::cache::{CachedCluster, ClusterCache};
use crate::error::{Result, TripClusterError};
use crate::{GpsPoint, Photo};

const WATERMARK_KEY: &str = "watermark";

/// SQLite-backed store for a [`ClusterCache`].
pub struct ClusterStore {
    db: Connection,
    db_path: String,
}

impl ClusterStore {
    // ========================================================================
    // Initialization
    // ========================================================================

    /// Open (or create) a store at the given database path.
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;

        info!("[ClusterStore] Opened {}", db_path);
        Ok(Self {
            db,
            db_path: db_path.to_string(),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    pub fn path(&self) -> &str {
        &self.db_path
    }

    fn init_schema(conn: &Connection) -> SqlResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS photos (
                id TEXT PRIMARY KEY,
                creation_time INTEGER NOT NULL,
                latitude REAL,
                longitude REAL,
                distance_from_home REAL,
                location_inferred INTEGER NOT NULL DEFAULT 0
            );

            -- Photo ids stored as a MessagePack blob
            CREATE TABLE IF NOT EXISTS clusters (
                id TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                photo_ids BLOB NOT NULL,
                start_date INTEGER NOT NULL,
                end_date INTEGER NOT NULL,
                latitude REAL,
                longitude REAL,
                location_name TEXT,
                is_vacation INTEGER NOT NULL,
                days INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_photos_time ON photos(creation_time);
            CREATE INDEX IF NOT EXISTS idx_clusters_position ON clusters(position);
        "#,
        )
    }

    // ========================================================================
    // Save
    // ========================================================================

    /// Replace the stored snapshot with `cache`.
    pub fn save(&mut self, cache: &ClusterCache) -> Result<()> {
        let tx = self.db.transaction()?;
        tx.execute("DELETE FROM photos", [])?;
        tx.execute("DELETE FROM clusters", [])?;
        tx.execute("DELETE FROM meta", [])?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO photos (id, creation_time, latitude, longitude, distance_from_home, location_inferred)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )?;
            for photo in cache.photos.values() {
                stmt.execute(params![
                    photo.id,
                    photo.creation_time,
                    photo.location.map(|p| p.latitude),
                    photo.location.map(|p| p.longitude),
                    photo.distance_from_home,
                    photo.location_inferred,
                ])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO clusters (id, position, photo_ids, start_date, end_date, latitude, longitude,
                                       location_name, is_vacation, days)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for (position, cluster) in cache.clusters.iter().enumerate() {
                let photo_ids = rmp_serde::to_vec(&cluster.photo_ids).map_err(|e| {
                    TripClusterError::Encoding {
                        message: format!("photo ids of {}: {}", cluster.id, e),
                    }
                })?;
                stmt.execute(params![
                    cluster.id,
                    position as i64,
                    photo_ids,
                    cluster.start_date,
                    cluster.end_date,
                    cluster.location.map(|p| p.latitude),
                    cluster.location.map(|p| p.longitude),
                    cluster.location_name,
                    cluster.is_vacation,
                    cluster.days,
                ])?;
            }

            if let Some(watermark) = cache.watermark {
                tx.execute(
                    "INSERT INTO meta (key, value) VALUES (?, ?)",
                    params![WATERMARK_KEY, watermark],
                )?;
            }
        }

        tx.commit()?;
        debug!(
            "[ClusterStore] Saved {} photos, {} clusters",
            cache.photos.len(),
            cache.clusters.len()
        );
        Ok(())
    }

    /// Remove all stored data.
    pub fn clear(&mut self) -> Result<()> {
        self.db
            .execute_batch("DELETE FROM photos; DELETE FROM clusters; DELETE FROM meta;")?;
        Ok(())
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// Load the stored snapshot. An empty database yields an empty cache.
    pub fn load(&self) -> Result<ClusterCache> {
        let photos = self.load_photos()?;
        let clusters = self.load_clusters()?;
        let watermark = self.load_watermark()?;

        debug!(
            "[ClusterStore] Loaded {} photos, {} clusters",
            photos.len(),
            clusters.len()
        );

        Ok(ClusterCache {
            photos,
            clusters,
            watermark,
        })
    }

    fn load_photos(&self) -> Result<HashMap<String, Photo>> {
        let mut stmt = self.db.prepare(
            "SELECT id, creation_time, latitude, longitude, distance_from_home, location_inferred
             FROM photos",
        )?;

        let photos = stmt
            .query_map([], |row| {
                Ok(Photo {
                    id: row.get(0)?,
                    creation_time: row.get(1)?,
                    location: point(row.get(2)?, row.get(3)?),
                    distance_from_home: row.get(4)?,
                    location_inferred: row.get(5)?,
                })
            })?
            .collect::<SqlResult<Vec<Photo>>>()?;

        Ok(photos.into_iter().map(|p| (p.id.clone(), p)).collect())
    }

    fn load_clusters(&self) -> Result<Vec<CachedCluster>> {
        let mut stmt = self.db.prepare(
            "SELECT id, photo_ids, start_date, end_date, latitude, longitude, location_name,
                    is_vacation, days
             FROM clusters ORDER BY position",
        )?;

        let rows = stmt
            .query_map([], |row| {
                let blob: Vec<u8> = row.get(1)?;
                let cluster = CachedCluster {
                    id: row.get(0)?,
                    photo_ids: Vec::new(),
                    start_date: row.get(2)?,
                    end_date: row.get(3)?,
                    location: point(row.get(4)?, row.get(5)?),
                    location_name: row.get(6)?,
                    is_vacation: row.get(7)?,
                    days: row.get(8)?,
                };
                Ok((cluster, blob))
            })?
            .collect::<SqlResult<Vec<(CachedCluster, Vec<u8>)>>>()?;

        rows.into_iter()
            .map(|(mut cluster, blob)| {
                cluster.photo_ids = rmp_serde::from_slice(&blob).map_err(|e| {
                    TripClusterError::Encoding {
                        message: format!("photo ids of {}: {}", cluster.id, e),
                    }
                })?;
                Ok(cluster)
            })
            .collect()
    }

    fn load_watermark(&self) -> Result<Option<i64>> {
        let mut stmt = self.db.prepare("SELECT value FROM meta WHERE key = ?")?;
        let mut rows = stmt.query_map(params![WATERMARK_KEY], |row| row.get::<_, i64>(0))?;
        let watermark = rows.next().transpose()?;
        Ok(watermark)
    }
}

fn point(latitude: Option<f64>, longitude: Option<f64>) -> Option<GpsPoint> {
    match (latitude, longitude) {
        (Some(lat), Some(lng)) => Some(GpsPoint::new(lat, lng)),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
