//! Payloads exchanged over the broker and returned by the external ports.
//!
//! Each of these is the typed, explicit-schema replacement for the ad-hoc
//! dict payloads the original worker queues carried; every queue in
//! `spec.md` §4.3 has exactly one payload type, serialized as JSON.

use serde::{Deserialize, Serialize};

use super::domain::Post;

/// One extracted entity, as returned by [`crate::ports::NlpApiPort::analyze_entities`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    pub entity_type: i16,
}

/// `res.entity` payload: the entities found in one post's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityResult {
    pub post_id: String,
    pub entities: Vec<ExtractedEntity>,
}

/// One category returned by [`crate::ports::NlpApiPort::classify_text`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub confidence: f32,
}

/// `res.scrape` payload. One record per processed `req.scrape` user id, carrying
/// every post fetched for that user (possibly none). A dedicated record -- rather
/// than pushing bare posts, as a literal reading of `spec.md` §4.5 might suggest --
/// is what lets the coordinator advance `last_scraped` even when a user has no new
/// posts (invariant 4, scenario S1); see DESIGN.md for the reasoning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub user_id: String,
    pub posts: Vec<Post>,
}

/// `req.classify` payload: one (user, entity) partition of analyzed posts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub user_id: String,
    pub entity_name: String,
    pub post_ids: Vec<String>,
    pub texts: Vec<String>,
}

impl ClassificationRequest {
    /// The text submitted to `classify_text`: the group's posts joined by newlines.
    pub fn combined_text(&self) -> String {
        self.texts.join("\n")
    }
}

/// `res.classify` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub user_id: String,
    pub post_ids: Vec<String>,
    pub categories: Vec<Category>,
}

/// A post pending classification, annotated with the entity names already
/// recorded against it -- what the coordinator partitions on in `spec.md` §4.4 step 3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedPost {
    pub post: Post,
    pub entity_names: Vec<String>,
}
