#![allow(dead_code)]

use peelpack_gen::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

pub const PIXEL: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

/// Provider that fails for a fixed set of seeds and records every call.
#[derive(Default)]
pub struct ScriptedProvider {
    fail_seeds: HashSet<i64>,
    delay: Duration,
    calls: Mutex<Vec<(i64, bool)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(seeds: impl IntoIterator<Item = i64>) -> Self {
        Self {
            fail_seeds: seeds.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Seeds requested so far, in call order.
    pub fn seeds(&self) -> Vec<i64> {
        self.calls.lock().unwrap().iter().map(|(s, _)| *s).collect()
    }

    /// Whether each call carried a reference image.
    pub fn references(&self) -> Vec<bool> {
        self.calls.lock().unwrap().iter().map(|(_, r)| *r).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl ImageProvider for ScriptedProvider {
    async fn generate(&self, req: &GenerationRequest) -> Result<GeneratedImage, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((req.seed, req.reference.is_some()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_seeds.contains(&req.seed) {
            return Err(ProviderError::Http {
                status: 429,
                body: format!("quota exceeded for seed {}", req.seed),
            });
        }
        Ok(GeneratedImage {
            bytes: format!("PNG:{}", req.seed).into_bytes(),
            width: 256,
            height: 256,
            metadata: serde_json::json!({ "seed": req.seed }),
        })
    }
}

/// Storage whose writes always fail.
pub struct BrokenStorage;

impl Storage for BrokenStorage {
    async fn save(&self, relative_path: &str, _bytes: &[u8]) -> Result<(), GenError> {
        Err(GenError::Storage {
            path: relative_path.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        })
    }

    async fn read(&self, relative_path: &str) -> Result<Vec<u8>, GenError> {
        Err(GenError::NotFound(relative_path.to_string()))
    }

    async fn exists(&self, _relative_path: &str) -> Result<bool, GenError> {
        Ok(false)
    }

    async fn delete(&self, _relative_path: &str) -> Result<(), GenError> {
        Ok(())
    }
}

/// Orchestrator over an in-memory database and a temporary storage directory.
pub fn setup<P: ImageProvider>(provider: P) -> (Orchestrator<P, FsStorage>, TempDir) {
    setup_with(provider, GenConfig::default())
}

pub fn setup_with<P: ImageProvider>(
    provider: P,
    config: GenConfig,
) -> (Orchestrator<P, FsStorage>, TempDir) {
    let temp = tempfile::tempdir().unwrap();
    let orch = Orchestrator::from_config(&config, FsStorage::new(temp.path()), provider).unwrap();
    (orch, temp)
}

/// Collect events until the terminal snapshot arrives.
pub async fn drain_until_terminal(sub: &mut Subscription<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(30), sub.recv())
            .await
            .expect("timed out waiting for progress")
            .expect("progress channel closed");
        let done = event.is_terminal();
        events.push(event);
        if done {
            return events;
        }
    }
}

pub fn image_request(kind: InputKind, description: Option<&str>) -> CreateProjectRequest {
    let mut payload = serde_json::json!({ "mimeType": "image/png", "base64Data": PIXEL });
    if let Some(d) = description {
        payload["description"] = serde_json::Value::String(d.to_string());
    }
    CreateProjectRequest {
        input_kind: kind,
        input_content: payload.to_string(),
        style_id: None,
        custom_prompt: None,
        seed: None,
    }
}
