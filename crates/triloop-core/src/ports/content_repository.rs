use crate::domain::ContentItem;
use async_trait::async_trait;

/// Read-only access to the shared content pool.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Check that a topic exists.
    async fn topic_exists(&self, topic_id: &str) -> anyhow::Result<bool>;

    /// Topic display name.
    async fn get_topic_name(&self, topic_id: &str) -> anyhow::Result<Option<String>>;

    /// All active items across topics, ordered by stage then difficulty.
    async fn get_active_items(&self) -> anyhow::Result<Vec<ContentItem>>;

    /// Bulk read by id.
    async fn get_items_by_ids(&self, ids: &[String]) -> anyhow::Result<Vec<ContentItem>>;

    /// Primary knowledge component for a content item.
    async fn get_primary_kc(&self, content_item_id: &str) -> anyhow::Result<Option<String>>;

    /// Knowledge components attached to a topic.
    async fn get_topic_kcs(&self, topic_id: &str) -> anyhow::Result<Vec<String>>;
}
