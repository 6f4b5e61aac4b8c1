//! Redis access: session lookups and client construction.

pub mod kv;

use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};

use crate::config::Config;

/// Build a client for one logical database on the configured Redis server.
///
/// The database index is part of the connection info, so every fresh
/// connection the client opens issues `SELECT db` during its handshake.
pub fn redis_client(config: &Config, db: i64) -> Result<redis::Client, redis::RedisError> {
    let info = ConnectionInfo {
        addr: ConnectionAddr::Tcp(config.redis_host.clone(), config.redis_port),
        redis: RedisConnectionInfo {
            db,
            password: config.redis_password.clone(),
            ..Default::default()
        },
    };
    redis::Client::open(info)
}
