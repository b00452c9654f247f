use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use image::DynamicImage;
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinError;
use tracing::debug;

use crate::{
    gate::ModelGate,
    model::{Inference, ModelError},
    preprocess::preprocess,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Camera,
    Image,
    Video,
    Test,
    Mock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gesture {
    pub label: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretationResult {
    pub text: String,
    pub confidence: f32,
    pub source: Source,
    #[serde(rename = "detectedGestures")]
    pub detected_gestures: Vec<Gesture>,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_mock: Option<bool>,
}

pub const GESTURE_CATALOG: [(&str, f32); 10] = [
    ("Hello", 0.92),
    ("Thank you", 0.88),
    ("Yes", 0.95),
    ("No", 0.91),
    ("Please", 0.87),
    ("Help", 0.89),
    ("Sorry", 0.86),
    ("Good", 0.93),
    ("Bad", 0.85),
    ("Love", 0.94),
];

pub const PHRASES: [&str; 10] = [
    "Hello, how are you?",
    "Thank you for your help",
    "Yes, I understand",
    "No, I don't agree",
    "Please help me",
    "I need assistance",
    "Sorry for the confusion",
    "That's good news",
    "I'm not feeling well",
    "I love this app",
];

pub const SIMULATED_CONFIDENCE: (f32, f32) = (0.75, 0.98);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("model produced an empty output")]
    EmptyOutput,
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("inference worker failed: {0}")]
    Worker(#[from] JoinError),
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn catalog_gesture(index: usize) -> Gesture {
    let (label, confidence) = GESTURE_CATALOG[index];
    Gesture {
        label: label.to_string(),
        confidence,
    }
}

/// Placeholder output: 1-3 distinct catalog gestures, a random phrase and a
/// random confidence. Always tagged as mock.
pub fn simulate<R: Rng + ?Sized>(rng: &mut R) -> InterpretationResult {
    let count = rng.gen_range(1..=3);
    let detected_gestures = rand::seq::index::sample(rng, GESTURE_CATALOG.len(), count)
        .into_iter()
        .map(catalog_gesture)
        .collect();

    let text = PHRASES.choose(rng).copied().unwrap_or(PHRASES[0]).to_string();
    let confidence = rng.gen_range(SIMULATED_CONFIDENCE.0..=SIMULATED_CONFIDENCE.1);

    InterpretationResult {
        text,
        confidence,
        source: Source::Mock,
        detected_gestures,
        timestamp: now_millis(),
        is_mock: Some(true),
    }
}

/// Maps a class distribution onto the catalog. The model's class space is not
/// the catalog's, so the index wraps around. Scores outside `[0, 1]` (a graph
/// ending in logits) are clamped into range for the reported confidence.
pub fn label_prediction(scores: &[f32], source: Source) -> Result<InterpretationResult, EngineError> {
    let (index, probability) = scores
        .iter()
        .copied()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .ok_or(EngineError::EmptyOutput)?;

    let label = GESTURE_CATALOG[index % GESTURE_CATALOG.len()].0.to_string();
    let probability = if probability.is_nan() {
        0.0
    } else {
        probability.clamp(0.0, 1.0)
    };

    Ok(InterpretationResult {
        text: label.clone(),
        confidence: probability,
        source,
        detected_gestures: vec![Gesture {
            label,
            confidence: probability,
        }],
        timestamp: now_millis(),
        is_mock: Some(false),
    })
}

pub enum Strategy {
    Simulated,
    ModelBacked(Arc<dyn Inference>),
}

impl Strategy {
    pub fn is_simulated(&self) -> bool {
        matches!(self, Strategy::Simulated)
    }
}

pub struct Interpreter {
    gate: Arc<ModelGate>,
    input_size: u32,
    simulated_latency: Duration,
}

impl Interpreter {
    pub fn new(gate: Arc<ModelGate>, input_size: u32, simulated_latency: Duration) -> Self {
        Self {
            gate,
            input_size,
            simulated_latency,
        }
    }

    pub fn gate(&self) -> &Arc<ModelGate> {
        &self.gate
    }

    pub async fn strategy(&self) -> Strategy {
        match self.gate.snapshot().await {
            Some(model) => Strategy::ModelBacked(model),
            None => Strategy::Simulated,
        }
    }

    pub async fn interpret(
        &self,
        image: DynamicImage,
        source: Source,
    ) -> Result<InterpretationResult, EngineError> {
        match self.strategy().await {
            Strategy::Simulated => Ok(self.simulated().await),
            Strategy::ModelBacked(model) => {
                let size = self.input_size;
                let scores = tokio::task::spawn_blocking(move || {
                    let input = preprocess(&image, size);
                    model.predict(&input)
                })
                .await??;
                debug!(classes = scores.len(), "model prediction finished");
                label_prediction(&scores, source)
            }
        }
    }

    pub async fn simulated(&self) -> InterpretationResult {
        if !self.simulated_latency.is_zero() {
            tokio::time::sleep(self.simulated_latency).await;
        }
        simulate(&mut rand::thread_rng())
    }
}
