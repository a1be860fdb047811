//! Periodic flush of global-persistent variables

use mapscript_storage::PersistentRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Spawn a task rewriting `path` every `period` while the registry is dirty
pub fn spawn_flush_task(registry: Arc<PersistentRegistry>, path: PathBuf, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            match registry.flush_if_dirty(&path) {
                Ok(true) => debug!("Flushed global variables to {}", path.display()),
                Ok(false) => {}
                Err(e) => error!("Failed to flush global variables to {}: {}", path.display(), e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapscript_storage::RegValue;

    #[tokio::test]
    async fn test_flush_task_writes_dirty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapreg.txt");
        let registry = Arc::new(PersistentRegistry::new());
        registry.set("$event_open", 0, RegValue::Int(1));

        let task = spawn_flush_task(registry.clone(), path.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        task.abort();

        assert!(!registry.is_dirty());
        let reloaded = PersistentRegistry::load(&path).unwrap();
        assert_eq!(reloaded.get("$event_open", 0), Some(RegValue::Int(1)));
    }

    #[tokio::test]
    async fn test_clean_registry_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapreg.txt");
        let registry = Arc::new(PersistentRegistry::new());

        let task = spawn_flush_task(registry, path.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.abort();

        assert!(!path.exists());
    }
}
