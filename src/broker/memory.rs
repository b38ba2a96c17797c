//! In-memory [`Broker`] fake for tests: `VecDeque`-backed lists, `HashSet`-backed sets.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::Broker;
use crate::error::BrokerError;

#[derive(Default)]
pub struct InMemoryBroker {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    sets: Mutex<HashMap<String, HashSet<String>>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn push_tail(&self, queue: &str, payload: String) -> Result<(), BrokerError> {
        let mut lists = self.lists.lock().unwrap();
        lists.entry(queue.to_string()).or_default().push_back(payload);
        Ok(())
    }

    async fn push_head(&self, queue: &str, payload: String) -> Result<(), BrokerError> {
        let mut lists = self.lists.lock().unwrap();
        lists.entry(queue.to_string()).or_default().push_front(payload);
        Ok(())
    }

    async fn pop_head(&self, queue: &str) -> Result<Option<String>, BrokerError> {
        let mut lists = self.lists.lock().unwrap();
        Ok(lists.get_mut(queue).and_then(|q| q.pop_front()))
    }

    async fn len(&self, queue: &str) -> Result<usize, BrokerError> {
        let lists = self.lists.lock().unwrap();
        Ok(lists.get(queue).map(|q| q.len()).unwrap_or(0))
    }

    async fn set_add(&self, set: &str, member: &str) -> Result<bool, BrokerError> {
        let mut sets = self.sets.lock().unwrap();
        Ok(sets.entry(set.to_string()).or_default().insert(member.to_string()))
    }

    async fn set_remove(&self, set: &str, member: &str) -> Result<(), BrokerError> {
        let mut sets = self.sets.lock().unwrap();
        if let Some(s) = sets.get_mut(set) {
            s.remove(member);
        }
        Ok(())
    }

    async fn set_is_member(&self, set: &str, member: &str) -> Result<bool, BrokerError> {
        let sets = self.sets.lock().unwrap();
        Ok(sets.get(set).map(|s| s.contains(member)).unwrap_or(false))
    }

    async fn pop_arbitrary(&self, set: &str) -> Result<Option<String>, BrokerError> {
        let mut sets = self.sets.lock().unwrap();
        let Some(s) = sets.get_mut(set) else {
            return Ok(None);
        };
        let member = s.iter().next().cloned();
        if let Some(m) = &member {
            s.remove(m);
        }
        Ok(member)
    }

    async fn set_members(&self, set: &str) -> Result<HashSet<String>, BrokerError> {
        let sets = self.sets.lock().unwrap();
        Ok(sets.get(set).cloned().unwrap_or_default())
    }
}
