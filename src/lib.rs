use std::sync::Arc;

pub mod codec;
pub mod config;
pub mod download;
pub mod error;
pub mod gate;
pub mod interpreter;
pub mod model;
pub mod preprocess;
pub mod routes;
pub mod storage;

pub use config::Config;
pub use routes::router;

use gate::ModelGate;
use interpreter::Interpreter;
use model::ModelLoader;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub interpreter: Arc<Interpreter>,
}

impl AppState {
    /// Wires the gate and the engine together. The gate starts out empty; call
    /// `reload` on it to pick up an existing artifact.
    pub fn new(config: Config, loader: Arc<dyn ModelLoader>) -> Self {
        let gate = Arc::new(ModelGate::new(config.model_path.clone(), loader));
        let interpreter = Interpreter::new(gate, config.input_size, config.simulated_latency);

        Self {
            config: Arc::new(config),
            interpreter: Arc::new(interpreter),
        }
    }

    pub fn gate(&self) -> &Arc<ModelGate> {
        self.interpreter.gate()
    }
}

#[cfg(feature = "tensorflow")]
pub fn default_loader(config: &Config) -> Arc<dyn ModelLoader> {
    Arc::new(model::TensorFlowLoader::new(
        config.input_op.clone(),
        config.output_op.clone(),
    ))
}

#[cfg(not(feature = "tensorflow"))]
pub fn default_loader(_config: &Config) -> Arc<dyn ModelLoader> {
    Arc::new(model::NoBackend)
}
