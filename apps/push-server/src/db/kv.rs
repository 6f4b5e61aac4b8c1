use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;

use crate::error::LookupError;

/// Resolves opaque session tokens to the user id that owns them.
///
/// Backed by the account site's Redis session database in production and an
/// in-memory map in tests.
#[async_trait]
pub trait SessionLookup: Send + Sync {
    async fn user_id(&self, session_token: &str) -> Result<Option<String>, LookupError>;
}

// ---------------------------------------------------------------------------
// Redis implementation
// ---------------------------------------------------------------------------

pub struct RedisSessionLookup {
    conn: ConnectionManager,
    db: i64,
}

impl RedisSessionLookup {
    pub async fn connect(client: redis::Client, db: i64) -> Result<Self, redis::RedisError> {
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn, db })
    }
}

#[async_trait]
impl SessionLookup for RedisSessionLookup {
    async fn user_id(&self, session_token: &str) -> Result<Option<String>, LookupError> {
        let mut conn = self.conn.clone();
        let (user_id,): (Option<String>,) = lookup_pipeline(self.db, session_token)
            .query_async(&mut conn)
            .await?;
        Ok(user_id)
    }
}

/// `SELECT db` followed by `GET token`.
///
/// A reconnected link may come back on the wrong database, so SELECT travels
/// in the same pipeline as every GET.
fn lookup_pipeline(db: i64, session_token: &str) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.cmd("SELECT").arg(db).ignore().cmd("GET").arg(session_token);
    pipe
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryLookup {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session_token: &str, user_id: &str) {
        self.data
            .lock()
            .insert(session_token.to_string(), user_id.to_string());
    }
}

#[async_trait]
impl SessionLookup for MemoryLookup {
    async fn user_id(&self, session_token: &str) -> Result<Option<String>, LookupError> {
        Ok(self.data.lock().get(session_token).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_selects_database_before_get() {
        let packed = lookup_pipeline(1, "sess-abc").get_packed_pipeline();
        assert_eq!(
            String::from_utf8(packed).unwrap(),
            "*2\r\n$6\r\nSELECT\r\n$1\r\n1\r\n*2\r\n$3\r\nGET\r\n$8\r\nsess-abc\r\n"
        );
    }

    #[test]
    fn lookup_uses_configured_database() {
        let packed = String::from_utf8(lookup_pipeline(12, "t").get_packed_pipeline()).unwrap();
        assert!(packed.starts_with("*2\r\n$6\r\nSELECT\r\n$2\r\n12\r\n"));
    }

    #[tokio::test]
    async fn memory_lookup_resolves_known_tokens() {
        let lookup = MemoryLookup::new();
        lookup.insert("sess-abc", "u42");
        assert_eq!(lookup.user_id("sess-abc").await.unwrap(), Some("u42".to_string()));
        assert_eq!(lookup.user_id("sess-missing").await.unwrap(), None);
    }
}
