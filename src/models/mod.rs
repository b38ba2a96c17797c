//! Data types, split the way the teacher split wire vs. persisted shapes:
//! [`domain`] is what the [`crate::store::Store`] persists, [`wire`] is what
//! crosses the [`crate::broker::Broker`] and the external ports.

pub mod domain;
pub mod wire;
