use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{anyhow, Result};

use crate::config::{BackendKind, ModelSettings};
use crate::detect::backend::DetectorBackend;
use crate::detect::backends::ScriptedBackend;
use crate::detect::labels::ClassMap;
use crate::detect::result::Detection;
use crate::error::PipelineError;
use crate::frame::Frame;

/// Builds a fresh backend instance for a model.
pub type BackendFactory = Arc<dyn Fn() -> Result<Box<dyn DetectorBackend>> + Send + Sync>;

struct ModelDefinition {
    class_map: ClassMap,
    artifact: Option<PathBuf>,
    factory: BackendFactory,
}

/// A loaded model: backend instance plus its declared class map.
///
/// The backend is wrapped in a `Mutex` because `DetectorBackend::detect` takes `&mut self`.
pub struct LoadedModel {
    pub id: String,
    pub class_map: ClassMap,
    backend: Mutex<Box<dyn DetectorBackend>>,
}

impl LoadedModel {
    pub fn new(id: &str, class_map: ClassMap, backend: Box<dyn DetectorBackend>) -> Self {
        Self {
            id: id.to_string(),
            class_map,
            backend: Mutex::new(backend),
        }
    }

    /// Run the backend and label its output.
    pub fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        // A backend that panicked mid-call poisons the lock; the next frame gets
        // another attempt with the same instance.
        let mut guard = self.backend.lock().unwrap_or_else(|poisoned| {
            log::warn!("detector '{}' recovered after a panic", self.id);
            poisoned.into_inner()
        });
        let raw = guard.detect(frame)?;
        Ok(self.class_map.apply(&raw))
    }
}

/// Known models, keyed by id.
#[derive(Default)]
pub struct ModelRegistry {
    models: HashMap<String, ModelDefinition>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from configured model definitions.
    pub fn from_settings(models: &[ModelSettings]) -> Result<Self> {
        let mut registry = Self::new();
        for model in models {
            let class_map = ClassMap::from_config(&model.class_map)
                .map_err(|e| anyhow!("model '{}': {}", model.id, e))?;
            let (artifact, factory) = factory_for(model)?;
            registry.models.insert(
                model.id.clone(),
                ModelDefinition {
                    class_map,
                    artifact,
                    factory,
                },
            );
        }
        Ok(registry)
    }

    /// Register a model with a custom backend factory.
    pub fn register<F>(&mut self, id: &str, class_map: ClassMap, factory: F)
    where
        F: Fn() -> Result<Box<dyn DetectorBackend>> + Send + Sync + 'static,
    {
        self.models.insert(
            id.to_string(),
            ModelDefinition {
                class_map,
                artifact: None,
                factory: Arc::new(factory),
            },
        );
    }

    pub fn contains(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    /// List registered model ids, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.models.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Instantiate a model's backend.
    pub fn load(&self, id: &str) -> Result<Arc<LoadedModel>, PipelineError> {
        let definition = self
            .models
            .get(id)
            .ok_or_else(|| PipelineError::UnknownModel(id.to_string()))?;
        if let Some(path) = &definition.artifact {
            if !path.exists() {
                log::warn!("model '{}' artifact missing: {}", id, path.display());
                return Err(PipelineError::UnknownModel(id.to_string()));
            }
        }
        let mut backend = (definition.factory)().map_err(|e| PipelineError::ModelLoad {
            model_id: id.to_string(),
            reason: format!("{:#}", e),
        })?;
        backend.warm_up().map_err(|e| PipelineError::ModelLoad {
            model_id: id.to_string(),
            reason: format!("warm-up failed: {:#}", e),
        })?;
        log::info!("loaded detector model '{}' ({})", id, backend.name());
        Ok(Arc::new(LoadedModel::new(
            id,
            definition.class_map.clone(),
            backend,
        )))
    }
}

fn factory_for(model: &ModelSettings) -> Result<(Option<PathBuf>, BackendFactory)> {
    match model.backend {
        BackendKind::Scripted => {
            let detections = model.detections.clone();
            let factory: BackendFactory = Arc::new(move || {
                Ok(Box::new(ScriptedBackend::new(detections.clone())) as Box<dyn DetectorBackend>)
            });
            Ok((None, factory))
        }
        BackendKind::Tract => {
            let path = model
                .path
                .clone()
                .ok_or_else(|| anyhow!("model '{}': tract backend requires a path", model.id))?;
            Ok((Some(path.clone()), tract_factory(model, path)))
        }
    }
}

#[cfg(feature = "backend-tract")]
fn tract_factory(model: &ModelSettings, path: PathBuf) -> BackendFactory {
    let (width, height) = (model.input_width, model.input_height);
    let threshold = model.confidence_threshold;
    Arc::new(move || {
        let backend = crate::detect::backends::TractBackend::new(&path, width, height)?
            .with_threshold(threshold);
        Ok(Box::new(backend) as Box<dyn DetectorBackend>)
    })
}

#[cfg(not(feature = "backend-tract"))]
fn tract_factory(_model: &ModelSettings, _path: PathBuf) -> BackendFactory {
    Arc::new(|| Err(anyhow!("tract models require the backend-tract feature")))
}

/// The detector used for subsequent frames.
///
/// Swapping replaces the `Arc`; a detection already running keeps its clone of
/// the previous model until it finishes.
pub struct ActiveDetector {
    registry: ModelRegistry,
    current: RwLock<Arc<LoadedModel>>,
}

impl ActiveDetector {
    pub fn new(registry: ModelRegistry, default_model: &str) -> Result<Self, PipelineError> {
        let model = registry.load(default_model)?;
        Ok(Self {
            registry,
            current: RwLock::new(model),
        })
    }

    pub fn current(&self) -> Arc<LoadedModel> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn active_id(&self) -> String {
        self.current().id.clone()
    }

    pub fn available(&self) -> Vec<String> {
        self.registry.list()
    }

    /// Load `model_id` and make it current. On failure the previous model stays active.
    pub fn change(&self, model_id: &str) -> Result<(), PipelineError> {
        let model = self.registry.load(model_id)?;
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let previous = std::mem::replace(&mut *guard, model);
        log::info!("detector changed from '{}' to '{}'", previous.id, model_id);
        Ok(())
    }
}
