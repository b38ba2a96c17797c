//! Redis-backed [`Broker`], modeled on the `redis::aio::ConnectionManager`
//! usage pattern shown in the pack's cache services (multiplexed connection,
//! reconnecting transparently under the hood).

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashSet;

use super::Broker;
use crate::error::BrokerError;

#[derive(Clone)]
pub struct RedisBroker {
    conn: ConnectionManager,
}

impl RedisBroker {
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn push_tail(&self, queue: &str, payload: String) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.rpush(queue, payload).await?;
        Ok(())
    }

    async fn push_head(&self, queue: &str, payload: String) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.lpush(queue, payload).await?;
        Ok(())
    }

    async fn pop_head(&self, queue: &str) -> Result<Option<String>, BrokerError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.lpop(queue, None).await?;
        Ok(value)
    }

    async fn len(&self, queue: &str) -> Result<usize, BrokerError> {
        let mut conn = self.conn.clone();
        let len: i64 = conn.llen(queue).await?;
        Ok(len as usize)
    }

    async fn set_add(&self, set: &str, member: &str) -> Result<bool, BrokerError> {
        let mut conn = self.conn.clone();
        let added: i64 = conn.sadd(set, member).await?;
        Ok(added > 0)
    }

    async fn set_remove(&self, set: &str, member: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.srem(set, member).await?;
        Ok(())
    }

    async fn set_is_member(&self, set: &str, member: &str) -> Result<bool, BrokerError> {
        let mut conn = self.conn.clone();
        let is_member: bool = conn.sismember(set, member).await?;
        Ok(is_member)
    }

    async fn pop_arbitrary(&self, set: &str) -> Result<Option<String>, BrokerError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.spop(set).await?;
        Ok(value)
    }

    async fn set_members(&self, set: &str) -> Result<HashSet<String>, BrokerError> {
        let mut conn = self.conn.clone();
        let members: HashSet<String> = conn.smembers(set).await?;
        Ok(members)
    }
}
