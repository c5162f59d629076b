//! Named snapshots of session-derived state, retained FIFO and persisted as
//! one document.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use concierge_store::{read_document, write_document, LocalStore};
use concierge_types::{ActiveOrder, CallSummary, OrderSummary, ServiceRequest, TranscriptEvent};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Local-state key holding the checkpoint list.
pub const CHECKPOINTS_KEY: &str = "checkpoints";

/// Checkpoints kept; the oldest is evicted first.
pub const MAX_CHECKPOINTS: usize = 10;

/// Everything a checkpoint captures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub transcripts: Vec<TranscriptEvent>,
    pub order_summary: Option<OrderSummary>,
    pub call_summary: Option<CallSummary>,
    pub service_requests: Vec<ServiceRequest>,
    pub translated_summary: Option<String>,
    pub email_sent_for_current_session: bool,
    pub request_received_at: Option<DateTime<Utc>>,
    pub active_orders: Vec<ActiveOrder>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub state: SessionSnapshot,
}

pub struct CheckpointStore {
    store: Arc<dyn LocalStore>,
    checkpoints: VecDeque<Checkpoint>,
    last_id: i64,
}

impl CheckpointStore {
    /// Loads the persisted list. A missing or unreadable list starts empty.
    pub async fn load(store: Arc<dyn LocalStore>) -> Self {
        let checkpoints: Vec<Checkpoint> = match read_document(store.as_ref(), CHECKPOINTS_KEY).await {
            Ok(list) => list.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "failed to read checkpoints; starting with none");
                Vec::new()
            }
        };
        let last_id = checkpoints
            .iter()
            .filter_map(|c| c.id.parse::<i64>().ok())
            .max()
            .unwrap_or(0);
        let mut checkpoints: VecDeque<Checkpoint> = checkpoints.into();
        while checkpoints.len() > MAX_CHECKPOINTS {
            checkpoints.pop_front();
        }
        Self {
            store,
            checkpoints,
            last_id,
        }
    }

    /// Saves a snapshot, evicting the oldest checkpoints beyond
    /// [`MAX_CHECKPOINTS`], and persists the list.
    ///
    /// Ids are creation-time milliseconds, bumped when needed so they stay
    /// unique and increasing.
    pub async fn save(
        &mut self,
        name: Option<&str>,
        state: SessionSnapshot,
        now: DateTime<Utc>,
    ) -> Checkpoint {
        let id = now.timestamp_millis().max(self.last_id + 1);
        self.last_id = id;
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "Checkpoint {}",
                    now.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
                )
            });
        let checkpoint = Checkpoint {
            id: id.to_string(),
            name,
            timestamp: now,
            state,
        };

        self.checkpoints.push_back(checkpoint.clone());
        while self.checkpoints.len() > MAX_CHECKPOINTS {
            if let Some(evicted) = self.checkpoints.pop_front() {
                debug!(id = %evicted.id, "evicted oldest checkpoint");
            }
        }
        self.persist().await;
        checkpoint
    }

    pub fn get(&self, id: &str) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.id == id)
    }

    /// Oldest first.
    pub fn list(&self) -> impl Iterator<Item = &Checkpoint> + '_ {
        self.checkpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    async fn persist(&self) {
        let list: Vec<&Checkpoint> = self.checkpoints.iter().collect();
        if let Err(e) = write_document(self.store.as_ref(), CHECKPOINTS_KEY, &list).await {
            warn!(error = %e, "failed to persist checkpoints");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use concierge_store::MemoryLocalStore;

    fn snapshot(room: &str) -> SessionSnapshot {
        let mut order = OrderSummary::default_template();
        order.room_number = room.to_string();
        SessionSnapshot {
            order_summary: Some(order),
            ..SessionSnapshot::default()
        }
    }

    #[tokio::test]
    async fn keeps_the_ten_most_recent() {
        let store = Arc::new(MemoryLocalStore::new());
        let mut checkpoints = CheckpointStore::load(store.clone()).await;
        let start = Utc::now();
        for i in 0..13 {
            checkpoints
                .save(Some(&format!("cp{i}")), snapshot(&i.to_string()), start + Duration::seconds(i))
                .await;
        }
        let names: Vec<_> = checkpoints.list().map(|c| c.name.clone()).collect();
        let expected: Vec<_> = (3..13).map(|i| format!("cp{i}")).collect();
        assert_eq!(names, expected);

        let reloaded = CheckpointStore::load(store).await;
        assert_eq!(reloaded.len(), MAX_CHECKPOINTS);
        assert_eq!(reloaded.list().next().map(|c| c.name.as_str()), Some("cp3"));
    }

    #[tokio::test]
    async fn ids_are_unique_within_one_millisecond() {
        let store = Arc::new(MemoryLocalStore::new());
        let mut checkpoints = CheckpointStore::load(store).await;
        let now = Utc::now();
        let a = checkpoints.save(None, SessionSnapshot::default(), now).await;
        let b = checkpoints.save(None, SessionSnapshot::default(), now).await;
        assert_ne!(a.id, b.id);
        assert!(a.name.starts_with("Checkpoint "));
        assert!(checkpoints.get(&b.id).is_some());
        assert!(checkpoints.get("missing").is_none());
    }

    #[tokio::test]
    async fn persisted_document_is_a_flat_list() {
        let store = Arc::new(MemoryLocalStore::new());
        let mut checkpoints = CheckpointStore::load(store.clone()).await;
        checkpoints.save(Some("before"), snapshot("204"), Utc::now()).await;

        let doc = store.get(CHECKPOINTS_KEY).await.unwrap().unwrap();
        let first = &doc.as_array().unwrap()[0];
        assert_eq!(first["name"], "before");
        assert_eq!(first["orderSummary"]["roomNumber"], "204");
        assert!(first["timestamp"].is_string());
    }
}
