//! SQLite-backed store.
//!
//! Holds user-submitted playgrounds, favorites, ratings and photo metadata.
//! rusqlite is blocking, so every call hops onto the blocking pool and takes
//! the single connection for the duration of one closure.
//!
//! Ownership rules live in the SQL: every mutation is keyed or filtered by
//! the session's user id.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::{debug, info};

use crate::core::ratings::{normalize_category, RatingEntry, Score};
use crate::core::{Coordinates, PlaygroundId, PlaygroundRecord, Source};
use crate::ports::{
    FavoriteStore, NewPlayground, PlaygroundRepository, RatingStore, Session, StoreError, StoreResult,
    TopRated, UserPhoto,
};

/// Largest offset applied to rows without coordinates, in degrees (~1km)
const JITTER_DEG: f64 = 0.01;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS playgrounds (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    location    TEXT,
    city        TEXT,
    lat         REAL,
    lon         REAL,
    amenities   TEXT NOT NULL DEFAULT '[]',
    description TEXT,
    created_by  TEXT NOT NULL,
    created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS ratings (
    user_id       TEXT NOT NULL,
    playground_id TEXT NOT NULL,
    category      TEXT NOT NULL,
    score         INTEGER NOT NULL CHECK (score BETWEEN 1 AND 5),
    review        TEXT,
    updated_at    INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    UNIQUE (user_id, playground_id, category)
);
CREATE INDEX IF NOT EXISTS ratings_by_playground ON ratings (playground_id);

CREATE TABLE IF NOT EXISTS favorites (
    user_id       TEXT NOT NULL,
    playground_id TEXT NOT NULL,
    created_at    INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    PRIMARY KEY (user_id, playground_id)
);

CREATE TABLE IF NOT EXISTS user_photos (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       TEXT NOT NULL,
    playground_id TEXT NOT NULL,
    url           TEXT NOT NULL,
    created_at    INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);
CREATE INDEX IF NOT EXISTS photos_by_owner ON user_photos (user_id, playground_id);
"#;

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::PermissionDenied
                | ErrorCode::ReadOnly
                | ErrorCode::AuthorizationForStatementDenied => StoreError::PermissionDenied(err.to_string()),
                ErrorCode::ConstraintViolation => StoreError::Invalid(err.to_string()),
                _ => StoreError::Query(err.to_string()),
            },
            _ => StoreError::Query(err.to_string()),
        }
    }
}

/// SQLite store implementing the repository, favorites and ratings ports
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (and create if needed) the database at `path`
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        info!(path = %path.display(), "opening database");
        Self::init(Connection::open(path)?)
    }

    /// Fresh private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        // SQLite's LIKE only folds ASCII; search compares through this instead
        conn.create_scalar_function(
            "fold_case",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|text| text.to_lowercase())),
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn call<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| StoreError::Query("database connection poisoned".to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Query(format!("database task failed: {e}")))?
    }

    /// Record an uploaded photo's public URL
    pub async fn record_photo(&self, user_id: &str, id: &PlaygroundId, url: &str) -> StoreResult<UserPhoto> {
        let (user_id, key, url) = (user_id.to_string(), id.to_string(), url.to_string());
        let playground_id = id.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO user_photos (user_id, playground_id, url) VALUES (?1, ?2, ?3)",
                params![user_id, key, url],
            )?;
            let row_id = conn.last_insert_rowid();
            let created_at: i64 = conn.query_row(
                "SELECT created_at FROM user_photos WHERE id = ?1",
                params![row_id],
                |row| row.get(0),
            )?;
            Ok(UserPhoto {
                id: row_id,
                user_id,
                playground_id,
                url,
                created_at,
            })
        })
        .await
    }

    #[cfg(test)]
    pub(crate) async fn execute_batch(&self, sql: &str) -> StoreResult<()> {
        let sql = sql.to_string();
        self.call(move |conn| Ok(conn.execute_batch(&sql)?)).await
    }

    /// A user's photos of one playground, newest first
    pub async fn list_photos(&self, user_id: &str, id: &PlaygroundId) -> StoreResult<Vec<UserPhoto>> {
        let (user_id, key) = (user_id.to_string(), id.to_string());
        let playground_id = id.clone();
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, url, created_at FROM user_photos
                 WHERE user_id = ?1 AND playground_id = ?2
                 ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt.query_map(params![user_id, key], |row| {
                Ok(UserPhoto {
                    id: row.get(0)?,
                    user_id: user_id.clone(),
                    playground_id: playground_id.clone(),
                    url: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }
}

/// Raw playground row
struct PlaygroundRow {
    id: i64,
    name: String,
    location: Option<String>,
    city: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    amenities: String,
}

const PLAYGROUND_COLUMNS: &str = "id, name, location, city, lat, lon, amenities";

fn playground_row(row: &Row<'_>) -> rusqlite::Result<PlaygroundRow> {
    Ok(PlaygroundRow {
        id: row.get(0)?,
        name: row.get(1)?,
        location: row.get(2)?,
        city: row.get(3)?,
        lat: row.get(4)?,
        lon: row.get(5)?,
        amenities: row.get(6)?,
    })
}

/// Deterministic offset in [-JITTER_DEG, JITTER_DEG] for both axes, derived from the row id
fn jitter(row_id: i64) -> (f64, f64) {
    let mut x = row_id as u64 ^ 0x9e3779b97f4a7c15;
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^= x >> 31;

    let unit = |bits: u64| (bits & 0xffff_ffff) as f64 / u32::MAX as f64 * 2.0 - 1.0;
    (unit(x) * JITTER_DEG, unit(x >> 32) * JITTER_DEG)
}

impl PlaygroundRow {
    fn into_record(self, anchor: Option<&Coordinates>) -> Option<PlaygroundRecord> {
        let (coordinates, approximate) = match (Coordinates::from_parts(self.lat, self.lon), anchor) {
            (Some(c), _) => (c, false),
            (None, Some(anchor)) => {
                let (dlat, dlon) = jitter(self.id);
                (anchor.offset(dlat, dlon), true)
            }
            (None, None) => {
                debug!(row = self.id, "dropping playground row without coordinates");
                return None;
            }
        };

        let amenities: Vec<String> = serde_json::from_str(&self.amenities).unwrap_or_default();
        let mut record = PlaygroundRecord::new(
            PlaygroundId::new(Source::UserDatabase, self.id.to_string()),
            self.name,
            coordinates,
        )
        .with_amenities(amenities);
        record.address = self.location;
        record.city = self.city;
        record.approximate_location = approximate;
        Some(record)
    }
}

/// Case-folded substring pattern with LIKE wildcards escaped
fn like_pattern(filter: &str) -> String {
    let mut escaped = String::with_capacity(filter.len() + 2);
    escaped.push('%');
    for c in filter.trim().to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn database_row_id(id: &PlaygroundId) -> Option<i64> {
    if id.source() != Source::UserDatabase {
        return None;
    }
    id.raw().parse().ok()
}

#[async_trait]
impl PlaygroundRepository for SqliteStore {
    async fn search(
        &self,
        filter: &str,
        limit: usize,
        anchor: Option<&Coordinates>,
    ) -> StoreResult<Vec<PlaygroundRecord>> {
        let pattern = like_pattern(filter);
        let anchor = anchor.copied();
        let limit = limit as i64;

        self.call(move |conn| {
            let matching = "fold_case(name) LIKE ?1 ESCAPE '\\'
                 OR fold_case(location) LIKE ?1 ESCAPE '\\'
                 OR fold_case(city) LIKE ?1 ESCAPE '\\'";
            let rows = match anchor {
                // Closest first: rows with coordinates by equirectangular distance, the rest after
                Some(anchor) => {
                    let lon_scale = anchor.lat.to_radians().cos().powi(2);
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {PLAYGROUND_COLUMNS} FROM playgrounds
                         WHERE {matching}
                         ORDER BY (lat IS NULL OR lon IS NULL),
                                  (lat - ?3) * (lat - ?3) + (lon - ?4) * (lon - ?4) * ?5,
                                  name COLLATE NOCASE, id
                         LIMIT ?2"
                    ))?;
                    let rows = stmt
                        .query_map(
                            params![pattern, limit, anchor.lat, anchor.lon, lon_scale],
                            playground_row,
                        )?
                        .collect::<Result<Vec<_>, _>>()?;
                    rows
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {PLAYGROUND_COLUMNS} FROM playgrounds
                         WHERE {matching}
                         ORDER BY name COLLATE NOCASE, id
                         LIMIT ?2"
                    ))?;
                    let rows = stmt
                        .query_map(params![pattern, limit], playground_row)?
                        .collect::<Result<Vec<_>, _>>()?;
                    rows
                }
            };
            Ok(rows
                .into_iter()
                .filter_map(|row| row.into_record(anchor.as_ref()))
                .collect())
        })
        .await
    }

    async fn get(&self, id: &PlaygroundId) -> StoreResult<Option<PlaygroundRecord>> {
        let Some(row_id) = database_row_id(id) else {
            return Ok(None);
        };
        self.call(move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {PLAYGROUND_COLUMNS} FROM playgrounds WHERE id = ?1"),
                    params![row_id],
                    playground_row,
                )
                .optional()?;
            Ok(row.and_then(|r| r.into_record(None)))
        })
        .await
    }

    async fn insert(&self, session: &Session, playground: NewPlayground) -> StoreResult<PlaygroundId> {
        let user_id = session.require_user()?.to_string();
        let name = playground.name.trim().to_string();
        if name.is_empty() {
            return Err(StoreError::Invalid("playground name is required".to_string()));
        }
        let amenities = serde_json::to_string(&playground.amenities)
            .map_err(|e| StoreError::Invalid(e.to_string()))?;

        let row_id = self
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO playgrounds (name, location, city, lat, lon, amenities, description, created_by)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        name,
                        playground.location,
                        playground.city,
                        playground.coordinates.map(|c| c.lat),
                        playground.coordinates.map(|c| c.lon),
                        amenities,
                        playground.description,
                        user_id,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        info!(row = row_id, "playground submitted");
        Ok(PlaygroundId::new(Source::UserDatabase, row_id.to_string()))
    }
}

#[async_trait]
impl FavoriteStore for SqliteStore {
    async fn toggle_favorite(&self, session: &Session, id: &PlaygroundId) -> StoreResult<bool> {
        let user_id = session.require_user()?.to_string();
        let key = id.to_string();

        self.call(move |conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM favorites WHERE user_id = ?1 AND playground_id = ?2",
                params![user_id, key],
            )?;
            if removed == 0 {
                tx.execute(
                    "INSERT INTO favorites (user_id, playground_id) VALUES (?1, ?2)",
                    params![user_id, key],
                )?;
            }
            tx.commit()?;
            Ok(removed == 0)
        })
        .await
    }

    async fn is_favorite(&self, session: &Session, id: &PlaygroundId) -> StoreResult<bool> {
        let Some(user_id) = session.user_id().map(String::from) else {
            return Ok(false);
        };
        let key = id.to_string();
        self.call(move |conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM favorites WHERE user_id = ?1 AND playground_id = ?2",
                    params![user_id, key],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn favorites(&self, session: &Session) -> StoreResult<Vec<PlaygroundId>> {
        let user_id = session.require_user()?.to_string();
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT playground_id FROM favorites WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )?;
            let keys = stmt
                .query_map(params![user_id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(keys
                .into_iter()
                .filter_map(|k| match k.parse() {
                    Ok(id) => Some(id),
                    Err(e) => {
                        debug!(key = k.as_str(), error = %e, "skipping unparseable favorite");
                        None
                    }
                })
                .collect())
        })
        .await
    }
}

#[async_trait]
impl RatingStore for SqliteStore {
    async fn submit_ratings(
        &self,
        session: &Session,
        id: &PlaygroundId,
        scores: &BTreeMap<String, Score>,
        review: Option<&str>,
    ) -> StoreResult<usize> {
        let user_id = session.require_user()?.to_string();
        if scores.is_empty() {
            return Err(StoreError::Invalid("at least one category score is required".to_string()));
        }

        let mut rows: Vec<(String, u8)> = Vec::with_capacity(scores.len());
        for (category, score) in scores {
            let category = normalize_category(category);
            if category.is_empty() {
                return Err(StoreError::Invalid("rating category must not be blank".to_string()));
            }
            rows.push((category, score.value()));
        }
        let key = id.to_string();
        let review = review.map(str::trim).filter(|r| !r.is_empty()).map(String::from);

        self.call(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO ratings (user_id, playground_id, category, score, review)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (user_id, playground_id, category) DO UPDATE SET
                        score = excluded.score,
                        review = excluded.review,
                        updated_at = strftime('%s', 'now')",
                )?;
                for (category, score) in &rows {
                    stmt.execute(params![user_id, key, category, score, review])?;
                }
            }
            tx.commit()?;
            Ok(rows.len())
        })
        .await
    }

    async fn ratings_for(&self, id: &PlaygroundId) -> StoreResult<Vec<RatingEntry>> {
        let key = id.to_string();
        let playground_id = id.clone();
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, category, score, review FROM ratings
                 WHERE playground_id = ?1 ORDER BY updated_at, rowid",
            )?;
            let rows = stmt
                .query_map(params![key], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u8>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(user_id, category, score, review)| -> StoreResult<RatingEntry> {
                    let score = Score::new(score)
                        .ok_or_else(|| StoreError::Query(format!("stored score out of range: {score}")))?;
                    Ok(RatingEntry {
                        user_id,
                        playground_id: playground_id.clone(),
                        category,
                        score,
                        review,
                    })
                })
                .collect()
        })
        .await
    }

    async fn top_rated(&self, limit: usize) -> StoreResult<Vec<TopRated>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT playground_id, AVG(score) FROM ratings GROUP BY playground_id, category",
            )?;
            let mut means: HashMap<String, Vec<f64>> = HashMap::new();
            for row in stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))? {
                let (key, mean) = row?;
                means.entry(key).or_default().push(mean);
            }

            let mut stmt = conn.prepare(
                "SELECT playground_id, COUNT(DISTINCT user_id) FROM ratings GROUP BY playground_id",
            )?;
            let totals = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)))?
                .collect::<Result<HashMap<_, _>, _>>()?;

            let mut top: Vec<TopRated> = means
                .into_iter()
                .filter_map(|(key, category_means)| {
                    let playground_id: PlaygroundId = key.parse().ok()?;
                    let overall = category_means.iter().sum::<f64>() / category_means.len() as f64;
                    Some(TopRated {
                        total: totals.get(&key).copied().unwrap_or(0),
                        playground_id,
                        name: None,
                        overall,
                    })
                })
                .collect();

            top.sort_by(|a, b| {
                b.overall
                    .total_cmp(&a.overall)
                    .then(b.total.cmp(&a.total))
                    .then_with(|| a.playground_id.cmp(&b.playground_id))
            });
            top.truncate(limit);

            let mut name_stmt = conn.prepare("SELECT name FROM playgrounds WHERE id = ?1")?;
            for entry in &mut top {
                if let Some(row_id) = database_row_id(&entry.playground_id) {
                    entry.name = name_stmt
                        .query_row(params![row_id], |row| row.get(0))
                        .optional()?;
                }
            }
            Ok(top)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn alice() -> Session {
        Session::authenticated("alice")
    }

    fn scores(pairs: &[(&str, u8)]) -> BTreeMap<String, Score> {
        pairs
            .iter()
            .map(|(c, s)| (c.to_string(), Score::new(*s).unwrap()))
            .collect()
    }

    async fn submit(store: &SqliteStore, name: &str, coordinates: Option<Coordinates>) -> PlaygroundId {
        store
            .insert(
                &alice(),
                NewPlayground {
                    name: name.to_string(),
                    location: Some("Elm Street".to_string()),
                    city: Some("Springfield".to_string()),
                    coordinates,
                    amenities: vec!["Swings".to_string()],
                    description: None,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = store();
        let id = submit(&store, "Elm Park", Coordinates::new(1.0, 2.0)).await;
        assert_eq!(id.source(), Source::UserDatabase);

        let record = store.get(&id).await.unwrap().unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.name, "Elm Park");
        assert_eq!(record.city.as_deref(), Some("Springfield"));
        assert!(record.amenities.contains("swings"));
        assert!(!record.approximate_location);
        assert!(store
            .get(&PlaygroundId::new(Source::ExternalPlaces, "1"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_insert_requires_user_and_name() {
        let store = store();
        let err = store
            .insert(&Session::anonymous(), NewPlayground { name: "X".into(), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unauthorized));

        let err = store
            .insert(&alice(), NewPlayground { name: "  ".into(), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_search_case_insensitive_and_limited() {
        let store = store();
        submit(&store, "Oak Playground", Coordinates::new(1.0, 1.0)).await;
        submit(&store, "OAKWOOD Park", Coordinates::new(1.0, 1.1)).await;
        submit(&store, "Pine Park", Coordinates::new(1.0, 1.2)).await;

        let found = store.search("oak", 10, None).await.unwrap();
        let names: Vec<_> = found.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Oak Playground", "OAKWOOD Park"]);

        assert_eq!(store.search("oak", 1, None).await.unwrap().len(), 1);
        // Location column matches too
        assert_eq!(store.search("elm street", 10, None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_search_folds_non_ascii_case() {
        let store = store();
        submit(&store, "Élan Spielplatz Größe", Coordinates::new(48.1, 11.5)).await;
        submit(&store, "Oak Playground", Coordinates::new(1.0, 1.0)).await;

        let found = store.search("élan", 10, None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Élan Spielplatz Größe");
        assert_eq!(store.search("GRÖßE", 10, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_with_anchor_keeps_closest() {
        let store = store();
        submit(&store, "Aardvark Park London", Coordinates::new(51.5, -0.12)).await;
        submit(&store, "Zebra Park Austin", Coordinates::new(30.27, -97.74)).await;
        submit(&store, "Mystery Park", None).await;
        let austin = Coordinates::new(30.26, -97.75).unwrap();

        let found = store.search("", 1, Some(&austin)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Zebra Park Austin");

        // Rows placed near the anchor by jitter come after located ones
        let found = store.search("", 3, Some(&austin)).await.unwrap();
        let names: Vec<_> = found.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Zebra Park Austin", "Aardvark Park London", "Mystery Park"]);

        // Without an anchor the order stays alphabetical
        let found = store.search("", 1, None).await.unwrap();
        assert_eq!(found[0].name, "Aardvark Park London");
    }

    #[tokio::test]
    async fn test_search_escapes_wildcards() {
        let store = store();
        submit(&store, "Oak Playground", Coordinates::new(1.0, 1.0)).await;
        assert!(store.search("%", 10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_coordinates_jittered_near_anchor() {
        let store = store();
        let id = submit(&store, "Mystery Park", None).await;
        assert!(store.get(&id).await.unwrap().is_none());

        assert!(store.search("mystery", 10, None).await.unwrap().is_empty());

        let anchor = Coordinates::new(10.0, 20.0).unwrap();
        let found = store.search("mystery", 10, Some(&anchor)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].approximate_location);
        let (dlat, dlon) = found[0].coordinates.delta(&anchor);
        assert!(dlat <= JITTER_DEG + 1e-9 && dlon <= JITTER_DEG + 1e-9);

        // Same row, same spot
        let again = store.search("mystery", 10, Some(&anchor)).await.unwrap();
        assert_eq!(again[0].coordinates, found[0].coordinates);
    }

    #[tokio::test]
    async fn test_toggle_favorite_twice_restores_state() {
        let store = store();
        let id = PlaygroundId::new(Source::ExternalPlaces, "abc");

        assert!(!store.is_favorite(&alice(), &id).await.unwrap());
        assert!(store.toggle_favorite(&alice(), &id).await.unwrap());
        assert!(store.is_favorite(&alice(), &id).await.unwrap());
        assert!(!store.toggle_favorite(&alice(), &id).await.unwrap());
        assert!(!store.is_favorite(&alice(), &id).await.unwrap());
    }

    #[tokio::test]
    async fn test_favorites_scoped_to_user() {
        let store = store();
        let a = PlaygroundId::new(Source::ExternalPlaces, "a");
        let b = PlaygroundId::new(Source::MapData, "node-1");
        store.toggle_favorite(&alice(), &a).await.unwrap();
        store.toggle_favorite(&alice(), &b).await.unwrap();

        let bob = Session::authenticated("bob");
        assert!(!store.is_favorite(&bob, &a).await.unwrap());
        assert!(store.favorites(&bob).await.unwrap().is_empty());
        assert_eq!(store.favorites(&alice()).await.unwrap(), vec![b, a]);
    }

    #[tokio::test]
    async fn test_toggle_requires_session() {
        let store = store();
        let id = PlaygroundId::new(Source::ExternalPlaces, "a");
        let err = store.toggle_favorite(&Session::anonymous(), &id).await.unwrap_err();
        assert!(matches!(err, StoreError::Unauthorized));
        assert!(!store.is_favorite(&Session::anonymous(), &id).await.unwrap());
    }

    #[tokio::test]
    async fn test_ratings_upsert_last_write_wins() {
        let store = store();
        let id = PlaygroundId::new(Source::ExternalPlaces, "p");

        store
            .submit_ratings(&alice(), &id, &scores(&[("Safety", 2)]), Some("meh"))
            .await
            .unwrap();
        store
            .submit_ratings(&alice(), &id, &scores(&[("safety", 5)]), Some("fixed!"))
            .await
            .unwrap();

        let entries = store.ratings_for(&id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].score.value(), 5);
        assert_eq!(entries[0].review.as_deref(), Some("fixed!"));
    }

    #[tokio::test]
    async fn test_aggregate_ratings() {
        let store = store();
        let id = PlaygroundId::new(Source::UserDatabase, "9");
        for (user, score) in [("a", 5), ("b", 3), ("c", 4)] {
            store
                .submit_ratings(&Session::authenticated(user), &id, &scores(&[("overall", score)]), None)
                .await
                .unwrap();
        }

        let agg = store.aggregate_ratings(&id).await.unwrap();
        assert_eq!(agg.category("overall"), 4.0);
        assert_eq!(agg.total, 3);

        let empty = store
            .aggregate_ratings(&PlaygroundId::new(Source::UserDatabase, "10"))
            .await
            .unwrap();
        assert_eq!(empty.overall, 0.0);
        assert_eq!(empty.total, 0);
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let store = store();
        let id = PlaygroundId::new(Source::UserDatabase, "1");
        assert!(matches!(
            store.submit_ratings(&Session::anonymous(), &id, &scores(&[("overall", 3)]), None).await,
            Err(StoreError::Unauthorized)
        ));
        assert!(matches!(
            store.submit_ratings(&alice(), &id, &BTreeMap::new(), None).await,
            Err(StoreError::Invalid(_))
        ));
        assert!(matches!(
            store.submit_ratings(&alice(), &id, &scores(&[(" ", 3)]), None).await,
            Err(StoreError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_top_rated() {
        let store = store();
        let local = submit(&store, "Local Gem", Coordinates::new(1.0, 1.0)).await;
        let remote = PlaygroundId::new(Source::ExternalPlaces, "r");

        store
            .submit_ratings(&alice(), &local, &scores(&[("overall", 5), ("safety", 4)]), None)
            .await
            .unwrap();
        store
            .submit_ratings(&alice(), &remote, &scores(&[("overall", 3)]), None)
            .await
            .unwrap();
        store
            .submit_ratings(&Session::authenticated("bob"), &remote, &scores(&[("overall", 2)]), None)
            .await
            .unwrap();

        let top = store.top_rated(10).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].playground_id, local);
        assert_eq!(top[0].name.as_deref(), Some("Local Gem"));
        assert_eq!(top[0].overall, 4.5);
        assert_eq!(top[0].total, 1);
        assert_eq!(top[1].playground_id, remote);
        assert_eq!(top[1].name, None);
        assert_eq!(top[1].overall, 2.5);
        assert_eq!(top[1].total, 2);

        assert_eq!(store.top_rated(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_summaries_skip_unrated() {
        let store = store();
        let rated = PlaygroundId::new(Source::ExternalPlaces, "x");
        let unrated = PlaygroundId::new(Source::ExternalPlaces, "y");
        store
            .submit_ratings(&alice(), &rated, &scores(&[("overall", 4)]), None)
            .await
            .unwrap();

        let summaries = store.summaries(&[rated.clone(), unrated]).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[&rated].overall, 4.0);
    }

    #[tokio::test]
    async fn test_photo_metadata() {
        let store = store();
        let id = PlaygroundId::new(Source::ExternalPlaces, "p");
        let photo = store.record_photo("alice", &id, "http://x/1.jpg").await.unwrap();
        assert_eq!(photo.user_id, "alice");
        store.record_photo("bob", &id, "http://x/2.jpg").await.unwrap();

        let mine = store.list_photos("alice", &id).await.unwrap();
        assert_eq!(mine, vec![photo]);
    }

    #[test]
    fn test_like_pattern() {
        assert_eq!(like_pattern(" a%b_c "), "%a\\%b\\_c%");
        assert_eq!(like_pattern("ÉLAN Park"), "%élan park%");
        assert_eq!(like_pattern(""), "%%");
    }

    #[test]
    fn test_jitter_bounded_and_stable() {
        for id in [0, 1, 42, i64::MAX, -7] {
            let (a, b) = jitter(id);
            assert!(a.abs() <= JITTER_DEG && b.abs() <= JITTER_DEG);
            assert_eq!(jitter(id), (a, b));
        }
    }
}
