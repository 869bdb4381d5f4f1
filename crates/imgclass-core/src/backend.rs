use anyhow::Result;

use crate::{IOName, ModelArtifact, ModelSpec, Tensor};

pub trait Backend: Send + Sync + 'static {
    type Model: BackendModel;

    fn name(&self) -> &'static str;
    fn load(&self, artifact: &ModelArtifact) -> Result<Self::Model>;
}

pub trait BackendModel: Send + 'static {
    fn spec(&self) -> &ModelSpec;

    /// Runs one synchronous inference.
    ///
    /// Returns exactly the tensors named in `outputs`, in that order.
    fn infer(&mut self, inputs: Vec<(IOName, Tensor)>, outputs: &[IOName]) -> Result<Vec<Tensor>>;
}

impl BackendModel for Box<dyn BackendModel> {
    fn spec(&self) -> &ModelSpec {
        (**self).spec()
    }

    fn infer(&mut self, inputs: Vec<(IOName, Tensor)>, outputs: &[IOName]) -> Result<Vec<Tensor>> {
        (**self).infer(inputs, outputs)
    }
}
