use std::path::Path;

use image::DynamicImage;
use imgclass_core::{
    BackendModel, ClassifyError, IOName, ModelExport, Shape, Signature, Tensor, TensorDecl,
};
use ndarray::Axis;
use tracing::debug;

use crate::preprocess::{preprocess, InputSize};
use crate::prediction::{tensor_to_value, Prediction};
use crate::registry::BackendRegistry;

/// A loaded model paired with the signature that describes it.
pub struct Classifier<M = Box<dyn BackendModel>> {
    signature: Signature,
    model: M,
}

impl Classifier {
    /// Loads the signature above `model_dir`, then the model it names.
    ///
    /// Nothing is handed to a backend until the signature is known to declare
    /// an `Image` input and the model file exists.
    pub fn from_model_dir(
        model_dir: impl AsRef<Path>,
        registry: &BackendRegistry,
    ) -> Result<Self, ClassifyError> {
        let export = ModelExport::load(model_dir)?;
        image_input(&export.signature)?;

        let model = registry.load(&export.artifact())?;
        Self::new(export.signature, model)
    }
}

impl<M: BackendModel> Classifier<M> {
    pub fn new(signature: Signature, model: M) -> Result<Self, ClassifyError> {
        image_input(&signature)?;

        let spec = model.spec();
        debug!(
            model = signature.doc_name.as_deref().unwrap_or("unnamed"),
            runtime_inputs = ?spec.inputs.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            runtime_outputs = ?spec.outputs.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "classifier ready"
        );

        Ok(Self { signature, model })
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Runs one image through the model.
    pub fn predict(&mut self, image: &DynamicImage) -> Result<Prediction, ClassifyError> {
        let input = self.signature.image_input()?;
        let shape = input
            .shape
            .as_deref()
            .ok_or(ClassifyError::InvalidInputShape {
                shape: Vec::new(),
                reason: "the Image input declares no shape",
            })?;
        let size = InputSize::from_shape(shape)?;

        let batch = preprocess(image, size).insert_axis(Axis(0));
        let batch_shape = Shape::from_slice(batch.shape());
        let data: Vec<f32> = batch.iter().copied().collect();
        let inputs = vec![(
            IOName(input.name.clone()),
            Tensor::from_f32(batch_shape, &data),
        )];

        let fetches: Vec<IOName> = self
            .signature
            .outputs
            .iter()
            .map(|(_, decl)| IOName(decl.name.clone()))
            .collect();

        debug!(input = %input.name, height = size.height, width = size.width, "running inference");
        let outputs = self.model.infer(inputs, &fetches)?;

        let mut prediction = Prediction::default();
        let mut outputs = outputs.into_iter();
        for (key, _) in &self.signature.outputs {
            let tensor = outputs
                .next()
                .ok_or_else(|| ClassifyError::MissingOutput { name: key.clone() })?;
            let item = tensor
                .unbatch()
                .ok_or_else(|| ClassifyError::NotBatched { name: key.clone() })?;
            prediction.push(key.clone(), tensor_to_value(key, &item)?);
        }

        Ok(prediction)
    }
}

/// The declared `Image` input; its dtype, if given, must be `float32`.
fn image_input(signature: &Signature) -> Result<&TensorDecl, ClassifyError> {
    let input = signature.image_input()?;
    match input.dtype.as_deref() {
        None => Ok(input),
        Some(dtype) if dtype.eq_ignore_ascii_case("float32") => Ok(input),
        Some(dtype) => Err(ClassifyError::UnsupportedInputType {
            dtype: dtype.to_string(),
        }),
    }
}

/// Loads the model found relative to `model_dir` and classifies one image.
pub fn predict(
    image: &DynamicImage,
    model_dir: impl AsRef<Path>,
    registry: &BackendRegistry,
) -> Result<Prediction, ClassifyError> {
    Classifier::from_model_dir(model_dir, registry)?.predict(image)
}
