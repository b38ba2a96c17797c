//! The broker (`spec.md` §4.3): durable FIFO lists carrying wire payloads, and
//! durable sets used only for in-flight de-duplication.

pub mod memory;
pub mod redis;

use async_trait::async_trait;

use crate::error::BrokerError;

pub use self::redis::RedisBroker;
pub use memory::InMemoryBroker;

/// In-flight de-dup set of user ids claimed by the scrape stage.
pub const USERS_IN_FLIGHT: &str = "users:in_flight";
/// In-flight de-dup set of post ids claimed by the entity stage.
pub const POSTS_IN_FLIGHT: &str = "posts:in_flight";

/// Queue of users to scrape.
pub const REQ_SCRAPE: &str = "req:scrape";
/// Queue of completed scrapes awaiting the coordinator's drain.
pub const RES_SCRAPE: &str = "res:scrape";
/// Queue of posts awaiting entity extraction.
pub const REQ_ENTITY: &str = "req:entity";
/// Queue of completed entity extractions awaiting the coordinator's drain.
pub const RES_ENTITY: &str = "res:entity";
/// Queue of classification requests, one per (user, entity) group.
pub const REQ_CLASSIFY: &str = "req:classify";
/// Queue of completed classifications awaiting the coordinator's drain.
pub const RES_CLASSIFY: &str = "res:classify";

/// Durable hand-off mechanism between the coordinator and the workers.
/// Lists are FIFO; sets are unordered de-dup membership only.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Appends `payload` to the tail of `queue` (normal enqueue).
    async fn push_tail(&self, queue: &str, payload: String) -> Result<(), BrokerError>;

    /// Prepends `payload` to the head of `queue` (re-queue after a failed attempt).
    async fn push_head(&self, queue: &str, payload: String) -> Result<(), BrokerError>;

    /// Pops from the head of `queue`, if non-empty.
    async fn pop_head(&self, queue: &str) -> Result<Option<String>, BrokerError>;

    /// Number of entries currently in `queue`.
    async fn len(&self, queue: &str) -> Result<usize, BrokerError>;

    /// Adds `member` to `set`. Returns `true` if it was newly added.
    async fn set_add(&self, set: &str, member: &str) -> Result<bool, BrokerError>;

    /// Removes `member` from `set`.
    async fn set_remove(&self, set: &str, member: &str) -> Result<(), BrokerError>;

    /// `true` if `member` is currently in `set`.
    async fn set_is_member(&self, set: &str, member: &str) -> Result<bool, BrokerError>;

    /// Removes and returns an arbitrary member of `set`, if non-empty.
    async fn pop_arbitrary(&self, set: &str) -> Result<Option<String>, BrokerError>;

    /// All current members of `set`.
    async fn set_members(&self, set: &str) -> Result<std::collections::HashSet<String>, BrokerError>;
}
