//! Status reporter
//!
//! Publishes the full list of data points joined with their status rows. The
//! latest snapshot is kept for late readers; subscribers receive every publish
//! through a broadcast channel.

use std::sync::Arc;

use acq_model::PointSnapshot;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::Result;
use crate::store::ConfigStore;

pub type Snapshot = Arc<Vec<PointSnapshot>>;

#[derive(Clone)]
pub struct StatusReporter {
    store: Arc<dyn ConfigStore>,
    tx: broadcast::Sender<Snapshot>,
    latest: Arc<RwLock<Snapshot>>,
}

impl std::fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReporter")
            .field("points", &self.latest.read().len())
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

impl StatusReporter {
    pub fn new(store: Arc<dyn ConfigStore>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            store,
            tx,
            latest: Arc::new(RwLock::new(Arc::new(Vec::new()))),
        }
    }

    /// Build a snapshot of every data point and broadcast it
    ///
    /// Returns the number of points in the snapshot.
    pub async fn publish(&self) -> Result<usize> {
        let points = self.store.all_points().await?;
        let mut snapshot = Vec::with_capacity(points.len());
        for point in points {
            let status = self.store.status(point.code).await?;
            snapshot.push(PointSnapshot { point, status });
        }

        let count = snapshot.len();
        let snapshot = Arc::new(snapshot);
        *self.latest.write() = Arc::clone(&snapshot);

        // No subscribers is not an error
        let receivers = self.tx.send(snapshot).unwrap_or(0);
        debug!("Status snapshot published: {} points, {} subscribers", count, receivers);
        Ok(count)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    /// Most recent snapshot, empty before the first publish
    pub fn latest(&self) -> Snapshot {
        Arc::clone(&self.latest.read())
    }
}
