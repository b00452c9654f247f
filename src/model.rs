use std::{path::Path, sync::Arc};

use thiserror::Error;

use crate::preprocess::InputTensor;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("inference backend not compiled in (enable the `tensorflow` feature)")]
    BackendUnavailable,
    #[error("failed to read model file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

/// A loaded model that maps one preprocessed image to a class distribution.
pub trait Inference: Send + Sync {
    fn predict(&self, input: &InputTensor) -> Result<Vec<f32>, ModelError>;
}

pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn Inference>, ModelError>;
}

/// Loader used when no inference backend is compiled in: every artifact is
/// rejected, so the service stays in simulation mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBackend;

impl ModelLoader for NoBackend {
    fn load(&self, _path: &Path) -> Result<Arc<dyn Inference>, ModelError> {
        Err(ModelError::BackendUnavailable)
    }
}

#[cfg(feature = "tensorflow")]
pub use self::tf::{TensorFlowLoader, TensorFlowModel};

#[cfg(feature = "tensorflow")]
mod tf {
    use std::{
        path::Path,
        sync::{Arc, Mutex},
    };

    use tensorflow::{Graph, ImportGraphDefOptions, Session, SessionOptions, SessionRunArgs, Tensor};
    use tracing::debug;

    use super::{Inference, ModelError, ModelLoader};
    use crate::preprocess::InputTensor;

    fn load_err(err: impl std::fmt::Display) -> ModelError {
        ModelError::Load(err.to_string())
    }

    fn inference_err(err: impl std::fmt::Display) -> ModelError {
        ModelError::Inference(err.to_string())
    }

    /// Loads frozen TensorFlow graphs (`GraphDef` protobufs).
    #[derive(Debug, Clone)]
    pub struct TensorFlowLoader {
        input_op: String,
        output_op: String,
    }

    impl TensorFlowLoader {
        pub fn new(input_op: impl Into<String>, output_op: impl Into<String>) -> Self {
            Self {
                input_op: input_op.into(),
                output_op: output_op.into(),
            }
        }
    }

    impl ModelLoader for TensorFlowLoader {
        fn load(&self, path: &Path) -> Result<Arc<dyn Inference>, ModelError> {
            let model = TensorFlowModel::new(path, &self.input_op, &self.output_op)?;
            Ok(Arc::new(model))
        }
    }

    struct Loaded {
        session: Session,
        graph: Graph,
    }

    pub struct TensorFlowModel {
        inner: Mutex<Loaded>,
        input_op: String,
        output_op: String,
    }

    impl TensorFlowModel {
        pub fn new(path: &Path, input_op: &str, output_op: &str) -> Result<Self, ModelError> {
            debug!("loading frozen graph from {}", path.display());
            let model_bytes = std::fs::read(path)?;

            let mut graph = Graph::new();
            graph
                .import_graph_def(&model_bytes, &ImportGraphDefOptions::new())
                .map_err(load_err)?;

            // Fail at load time rather than on the first request.
            for name in [input_op, output_op] {
                graph
                    .operation_by_name(name)
                    .map_err(load_err)?
                    .ok_or_else(|| ModelError::Load(format!("operation '{name}' not found in graph")))?;
            }

            let session = Session::new(&SessionOptions::new(), &graph).map_err(load_err)?;

            Ok(Self {
                inner: Mutex::new(Loaded { session, graph }),
                input_op: input_op.to_string(),
                output_op: output_op.to_string(),
            })
        }
    }

    impl Inference for TensorFlowModel {
        fn predict(&self, input: &InputTensor) -> Result<Vec<f32>, ModelError> {
            let loaded = self
                .inner
                .lock()
                .map_err(|_| ModelError::Inference("model lock poisoned".to_string()))?;

            let mut tensor = Tensor::<f32>::new(&input.shape);
            if tensor.len() != input.data.len() {
                return Err(ModelError::Inference(format!(
                    "tensor of shape {:?} cannot hold {} values",
                    input.shape,
                    input.data.len()
                )));
            }
            tensor.copy_from_slice(&input.data);

            let input_operation = loaded
                .graph
                .operation_by_name(&self.input_op)
                .map_err(inference_err)?
                .ok_or_else(|| ModelError::Inference(format!("input operation '{}' not found", self.input_op)))?;
            let output_operation = loaded
                .graph
                .operation_by_name(&self.output_op)
                .map_err(inference_err)?
                .ok_or_else(|| ModelError::Inference(format!("output operation '{}' not found", self.output_op)))?;

            let mut args = SessionRunArgs::new();
            args.add_feed(&input_operation, 0, &tensor);
            let output_token = args.request_fetch(&output_operation, 0);
            loaded.session.run(&mut args).map_err(inference_err)?;

            let output: Tensor<f32> = args.fetch(output_token).map_err(inference_err)?;
            Ok(output.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_backend_rejects_every_artifact() {
        let err = NoBackend.load(Path::new("anything.pb")).err().unwrap();
        assert!(matches!(err, ModelError::BackendUnavailable));
    }
}
