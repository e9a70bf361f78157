use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;
use uuid::Uuid;

use crate::lookup::SourceSlot;
use crate::models::{PlateCandidate, PlateRecord};

/// Matches retained after a summary so a later expand can fetch details.
#[derive(Debug)]
pub struct PendingExpansion {
    pub candidate: PlateCandidate,
    pub matches: Vec<(SourceSlot, PlateRecord)>,
    pub expires_at: Instant,
}

impl PendingExpansion {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Interaction id → retained matches, dropped after the retention window.
#[derive(Clone)]
pub struct PendingInteractions {
    cache: Cache<Uuid, Arc<PendingExpansion>>,
    retention: Duration,
}

impl PendingInteractions {
    pub fn new(retention: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(retention)
                .build(),
            retention,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Retain matches under a fresh interaction id.
    pub async fn insert(
        &self,
        candidate: PlateCandidate,
        matches: Vec<(SourceSlot, PlateRecord)>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let pending = PendingExpansion {
            candidate,
            matches,
            expires_at: Instant::now() + self.retention,
        };
        self.cache.insert(id, Arc::new(pending)).await;
        id
    }

    /// Remove and return the retained matches, if still within the window.
    pub async fn take(&self, id: Uuid) -> Option<Arc<PendingExpansion>> {
        let pending = self.cache.remove(&id).await?;
        (!pending.is_expired()).then_some(pending)
    }

    /// Put a taken entry back. Its original window is kept, so this is a
    /// no-op once that window has passed.
    pub async fn restore(&self, id: Uuid, pending: Arc<PendingExpansion>) {
        if !pending.is_expired() {
            self.cache.insert(id, pending).await;
        }
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.cache
            .get(&id)
            .await
            .is_some_and(|p| !p.is_expired())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> PlateCandidate {
        PlateCandidate::typed("ABC123").unwrap()
    }

    fn matches() -> Vec<(SourceSlot, PlateRecord)> {
        vec![(SourceSlot::First, PlateRecord::new("ABC123"))]
    }

    #[tokio::test]
    async fn take_consumes_entry() {
        let pending = PendingInteractions::new(Duration::from_secs(60));
        let id = pending.insert(candidate(), matches()).await;

        let taken = pending.take(id).await.unwrap();
        assert_eq!(taken.candidate.as_str(), "ABC123");
        assert!(pending.take(id).await.is_none());
    }

    #[tokio::test]
    async fn restore_makes_entry_available_again() {
        let pending = PendingInteractions::new(Duration::from_secs(60));
        let id = pending.insert(candidate(), matches()).await;

        let taken = pending.take(id).await.unwrap();
        pending.restore(id, taken).await;
        assert!(pending.contains(id).await);
    }

    #[tokio::test]
    async fn expired_entry_is_gone() {
        let pending = PendingInteractions::new(Duration::from_millis(20));
        let id = pending.insert(candidate(), matches()).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(pending.take(id).await.is_none());
    }

    #[tokio::test]
    async fn unknown_id_is_none() {
        let pending = PendingInteractions::new(Duration::from_secs(60));
        assert!(pending.take(Uuid::new_v4()).await.is_none());
    }
}
