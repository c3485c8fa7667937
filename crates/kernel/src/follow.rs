//! Follow registry: users observing content.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Content a user can follow, addressed by its polymorphic pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FollowTarget {
    pub object_type: String,
    pub object_id: i64,
}

impl FollowTarget {
    pub fn new(object_type: impl Into<String>, object_id: i64) -> Self {
        Self {
            object_type: object_type.into(),
            object_id,
        }
    }
}

/// Records who observes which content.
#[async_trait]
pub trait FollowRegistry: Send + Sync {
    /// Start following. Following twice is not an error.
    async fn follow(&self, user_id: Uuid, target: &FollowTarget) -> Result<()>;

    async fn is_following(&self, user_id: Uuid, target: &FollowTarget) -> Result<bool>;
}

/// Follow registry held in process memory.
#[derive(Clone, Default)]
pub struct MemoryFollowRegistry {
    followers: Arc<DashMap<FollowTarget, HashSet<Uuid>>>,
}

impl MemoryFollowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Followers of a target, in no particular order.
    pub fn followers(&self, target: &FollowTarget) -> Vec<Uuid> {
        self.followers
            .get(target)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FollowRegistry for MemoryFollowRegistry {
    async fn follow(&self, user_id: Uuid, target: &FollowTarget) -> Result<()> {
        self.followers
            .entry(target.clone())
            .or_default()
            .insert(user_id);
        Ok(())
    }

    async fn is_following(&self, user_id: Uuid, target: &FollowTarget) -> Result<bool> {
        Ok(self
            .followers
            .get(target)
            .is_some_and(|set| set.contains(&user_id)))
    }
}

/// Follow registry backed by the `user_follow` table.
#[derive(Clone)]
pub struct PgFollowRegistry {
    pool: PgPool,
}

impl PgFollowRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FollowRegistry for PgFollowRegistry {
    async fn follow(&self, user_id: Uuid, target: &FollowTarget) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO user_follow (user_id, object_type, object_id, created)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, object_type, object_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(&target.object_type)
        .bind(target.object_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("failed to insert follow")?;

        Ok(())
    }

    async fn is_following(&self, user_id: Uuid, target: &FollowTarget) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM user_follow WHERE user_id = $1 AND object_type = $2 AND object_id = $3)",
        )
        .bind(user_id)
        .bind(&target.object_type)
        .bind(target.object_id)
        .fetch_one(&self.pool)
        .await
        .context("failed to check follow")?;

        Ok(exists)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn follow_is_idempotent() {
        let registry = MemoryFollowRegistry::new();
        let user = Uuid::now_v7();
        let target = FollowTarget::new("note", 1);

        registry.follow(user, &target).await.unwrap();
        registry.follow(user, &target).await.unwrap();

        assert_eq!(registry.followers(&target), vec![user]);
        assert!(registry.is_following(user, &target).await.unwrap());
        assert!(
            !registry
                .is_following(user, &FollowTarget::new("post", 1))
                .await
                .unwrap()
        );
    }
}
