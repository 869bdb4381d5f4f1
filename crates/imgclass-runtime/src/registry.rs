use std::collections::HashMap;

use imgclass_core::{Backend, BackendModel, ClassifyError, ModelArtifact};
use tracing::info;

type LoadFn = Box<dyn Fn(&ModelArtifact) -> anyhow::Result<Box<dyn BackendModel>> + Send + Sync>;

struct Registered {
    backend: &'static str,
    load: LoadFn,
}

/// Backends keyed by the model format they open (`"onnx"`, ...).
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Registered>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Registers `backend` for `format`, replacing any earlier registration.
    pub fn register<B: Backend>(&mut self, format: &str, backend: B) -> &mut Self {
        let name = backend.name();
        let load: LoadFn = Box::new(move |artifact: &ModelArtifact| {
            let model = backend.load(artifact)?;
            Ok(Box::new(model) as Box<dyn BackendModel>)
        });
        self.backends.insert(
            format.to_ascii_lowercase(),
            Registered {
                backend: name,
                load,
            },
        );
        self
    }

    pub fn contains(&self, format: &str) -> bool {
        self.backends.contains_key(&format.to_ascii_lowercase())
    }

    pub fn load(&self, artifact: &ModelArtifact) -> Result<Box<dyn BackendModel>, ClassifyError> {
        let format = artifact.format();
        let registered = self
            .backends
            .get(format)
            .ok_or_else(|| ClassifyError::UnsupportedFormat(format.to_string()))?;

        info!(
            backend = registered.backend,
            path = %artifact.path().display(),
            "loading model"
        );
        Ok((registered.load)(artifact)?)
    }
}
