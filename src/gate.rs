use std::{path::PathBuf, sync::Arc};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::model::{Inference, ModelLoader};

/// Tracks whether a model is loaded and hands out the current handle.
///
/// Availability and the handle live in one `Option`, so a reader can never see
/// "available" without a model. `reload` builds the replacement off to the side
/// and publishes it in a single write; callers that already cloned the previous
/// `Arc` finish their inference on it undisturbed.
pub struct ModelGate {
    path: PathBuf,
    loader: Arc<dyn ModelLoader>,
    current: RwLock<Option<Arc<dyn Inference>>>,
    reloading: Mutex<()>,
}

impl ModelGate {
    pub fn new(path: impl Into<PathBuf>, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            path: path.into(),
            loader,
            current: RwLock::new(None),
            reloading: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Re-reads the artifact and publishes the result. Never fails: a missing
    /// or unloadable artifact leaves the gate unavailable. Returns the new
    /// availability.
    pub async fn reload(&self) -> bool {
        let _guard = self.reloading.lock().await;

        let next = if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            let loader = self.loader.clone();
            let path = self.path.clone();
            match tokio::task::spawn_blocking(move || loader.load(&path)).await {
                Ok(Ok(model)) => {
                    info!("model loaded from {}", self.path.display());
                    Some(model)
                }
                Ok(Err(err)) => {
                    warn!(error = %err, "failed to load model from {}", self.path.display());
                    None
                }
                Err(err) => {
                    warn!(error = %err, "model loader task failed");
                    None
                }
            }
        } else {
            debug!("no model artifact at {}", self.path.display());
            None
        };

        let available = next.is_some();
        *self.current.write().await = next;
        available
    }

    pub async fn is_available(&self) -> bool {
        self.current.read().await.is_some()
    }

    pub async fn snapshot(&self) -> Option<Arc<dyn Inference>> {
        self.current.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::{
        model::{ModelError, NoBackend},
        preprocess::InputTensor,
    };

    struct Fixed(Vec<f32>);

    impl Inference for Fixed {
        fn predict(&self, _input: &InputTensor) -> Result<Vec<f32>, ModelError> {
            Ok(self.0.clone())
        }
    }

    /// Accepts artifacts whose content is exactly `ok`.
    struct ContentLoader;

    impl ModelLoader for ContentLoader {
        fn load(&self, path: &Path) -> Result<Arc<dyn Inference>, ModelError> {
            match std::fs::read(path)?.as_slice() {
                b"ok" => Ok(Arc::new(Fixed(vec![1.0]))),
                _ => Err(ModelError::Load("bad artifact".to_string())),
            }
        }
    }

    #[tokio::test]
    async fn missing_artifact_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let gate = ModelGate::new(dir.path().join("model.pb"), Arc::new(ContentLoader));

        assert!(!gate.reload().await);
        assert!(!gate.is_available().await);
        assert!(gate.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn load_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pb");
        std::fs::write(&path, b"garbage").unwrap();

        let gate = ModelGate::new(&path, Arc::new(ContentLoader));
        assert!(!gate.reload().await);

        let gate = ModelGate::new(&path, Arc::new(NoBackend));
        assert!(!gate.reload().await);
    }

    #[tokio::test]
    async fn reload_is_idempotent_and_tracks_the_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pb");
        let gate = ModelGate::new(&path, Arc::new(ContentLoader));

        std::fs::write(&path, b"ok").unwrap();
        assert!(gate.reload().await);
        assert!(gate.reload().await);
        assert!(gate.is_available().await);

        std::fs::write(&path, b"broken").unwrap();
        assert!(!gate.reload().await);
        assert!(gate.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn held_snapshot_survives_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pb");
        std::fs::write(&path, b"ok").unwrap();

        let gate = ModelGate::new(&path, Arc::new(ContentLoader));
        gate.reload().await;
        let held = gate.snapshot().await.unwrap();

        std::fs::remove_file(&path).unwrap();
        gate.reload().await;

        assert!(!gate.is_available().await);
        let input = InputTensor {
            shape: [1, 1, 1, 3],
            data: vec![0.0; 3],
        };
        assert_eq!(held.predict(&input).unwrap(), vec![1.0]);
    }
}
