use std::sync::Arc;

use async_trait::async_trait;

use crate::{plugins::Plugin, prelude::*, state::AppState};

/// Drops per-user lock slots nobody holds any more.
pub struct LockGc;

#[async_trait]
impl Plugin for LockGc {
  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
      interval.tick().await;
      let dropped = app.gc_locks();
      if dropped > 0 {
        debug!("lock gc dropped {dropped} idle slots");
      }
    }
  }
}
