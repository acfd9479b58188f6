use anyhow::Result;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use surrealdb::engine::local::{Db, Mem, RocksDb};
use surrealdb::Surreal;
use tracing::debug;

pub type DbConn = Surreal<Db>;

/// Last imported historical table
pub const HISTORICAL_DATA_KEY: &str = "historical_logistics_data";
/// Provider/connection configuration, API keys included
pub const INTEGRATIONS_KEY: &str = "litper_integrations";

const KV_TABLE: &str = "kv";

/// Initialize database connection with RocksDB backend
pub async fn connect(path: &str) -> Result<DbConn> {
    let db = Surreal::new::<RocksDb>(path).await?;
    db.use_ns("litper").use_db("dashboard").await?;
    Ok(db)
}

/// In-memory database, for tests and one-off CLI runs
pub async fn connect_memory() -> Result<DbConn> {
    let db = Surreal::new::<Mem>(()).await?;
    db.use_ns("litper").use_db("dashboard").await?;
    Ok(db)
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredDocument {
    /// JSON text of the stored value
    payload: String,
    updated_at: String,
}

/// Key/value document store. One JSON document per key, last write wins.
#[derive(Clone)]
pub struct Store {
    db: DbConn,
}

impl Store {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    pub async fn open(path: &str) -> Result<Self> {
        Ok(Self::new(connect(path).await?))
    }

    pub async fn in_memory() -> Result<Self> {
        Ok(Self::new(connect_memory().await?))
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let doc: Option<StoredDocument> = self.db.select((KV_TABLE, key)).await?;
        match doc {
            Some(doc) => Ok(Some(serde_json::from_str(&doc.payload)?)),
            None => Ok(None),
        }
    }

    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let doc = StoredDocument {
            payload: serde_json::to_string(value)?,
            updated_at: Utc::now().to_rfc3339(),
        };
        debug!("Storing {} ({} bytes)", key, doc.payload.len());
        let _: Option<StoredDocument> = self.db.upsert((KV_TABLE, key)).content(doc).await?;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        let _: Option<StoredDocument> = self.db.delete((KV_TABLE, key)).await?;
        Ok(())
    }
}
