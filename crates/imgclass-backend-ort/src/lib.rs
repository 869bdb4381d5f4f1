use std::collections::HashMap;

use anyhow::{bail, ensure, Context, Result};
use bytes::Bytes;
use imgclass_core::{
    Backend, BackendModel, DType, IOName, ModelArtifact, ModelSpec, Shape, Tensor, TensorSpec,
    TensorStorage,
};
use ort::{
    logging::LogLevel,
    session::{
        builder::GraphOptimizationLevel, run_options::OutputSelector, RunOptions, Session,
        SessionInputValue,
    },
    tensor::TensorElementType,
    value::{DynValue, ValueType},
};
use tracing::debug;

pub struct OrtBackend;

impl OrtBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OrtBackend {
    fn default() -> Self {
        Self::new()
    }
}

pub struct OrtModel {
    spec: ModelSpec,
    session: Session,
}

impl Backend for OrtBackend {
    type Model = OrtModel;

    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn load(&self, artifact: &ModelArtifact) -> Result<Self::Model> {
        let ModelArtifact::OnnxPath(path) = artifact else {
            bail!(
                "onnxruntime cannot open '{}' artifacts ({})",
                artifact.format(),
                artifact.path().display()
            );
        };

        let session = Session::builder()
            .context("failed to create ORT session builder")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("failed to configure ORT session builder")?
            .with_log_level(LogLevel::Error)
            .context("failed to configure ORT logging")?
            .commit_from_file(path)
            .with_context(|| format!("failed to load ONNX model {}", path.display()))?;

        let spec = build_model_spec(&session)?;
        debug!(
            path = %path.display(),
            inputs = spec.inputs.len(),
            outputs = spec.outputs.len(),
            "onnx session ready"
        );

        Ok(OrtModel { spec, session })
    }
}

impl BackendModel for OrtModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn infer(&mut self, inputs: Vec<(IOName, Tensor)>, outputs: &[IOName]) -> Result<Vec<Tensor>> {
        let mut ort_inputs = Vec::with_capacity(inputs.len());
        for (name, input) in inputs {
            let value = tensor_to_ort_value(input)?;
            ort_inputs.push((name.0, SessionInputValue::from(value)));
        }

        let selected = outputs
            .iter()
            .fold(OutputSelector::no_default(), |sel, name| sel.with(name.as_str()));
        let options = RunOptions::new()
            .context("failed to create ORT run options")?
            .with_outputs(selected);

        let results = self.session.run_with_options(ort_inputs, &options)?;
        let mut by_name = HashMap::with_capacity(results.len());
        for (name, value) in results.iter() {
            by_name.insert(name.to_string(), value);
        }

        outputs
            .iter()
            .map(|name| {
                let value = by_name
                    .get(name.as_str())
                    .with_context(|| format!("model has no output named '{name}'"))?;
                ort_value_to_tensor(value)
                    .with_context(|| format!("failed to read model output '{name}'"))
            })
            .collect()
    }
}

fn build_model_spec(session: &Session) -> Result<ModelSpec> {
    let inputs = session
        .inputs
        .iter()
        .map(|input| tensor_spec_from_value_type(&input.name, &input.input_type))
        .collect::<Result<Vec<_>>>()?;

    let outputs = session
        .outputs
        .iter()
        .map(|output| tensor_spec_from_value_type(&output.name, &output.output_type))
        .collect::<Result<Vec<_>>>()?;

    Ok(ModelSpec { inputs, outputs })
}

fn tensor_spec_from_value_type(name: &str, value_type: &ValueType) -> Result<TensorSpec> {
    let ValueType::Tensor { ty, shape, .. } = value_type else {
        bail!("unsupported non-tensor IO value type for '{name}'");
    };

    let dtype = ort_tensor_element_to_dtype(*ty)?;
    let dims = shape
        .iter()
        .map(|d| if *d < 0 { None } else { Some(*d as usize) })
        .collect::<Vec<_>>();

    Ok(TensorSpec {
        name: IOName(name.to_string()),
        dtype,
        rank: shape.len(),
        dims,
    })
}

fn ort_tensor_element_to_dtype(ty: TensorElementType) -> Result<DType> {
    match ty {
        TensorElementType::Float32 => Ok(DType::F32),
        TensorElementType::Float64 => Ok(DType::F64),
        TensorElementType::Int64 => Ok(DType::I64),
        TensorElementType::Int32 => Ok(DType::I32),
        TensorElementType::Uint8 => Ok(DType::U8),
        TensorElementType::Bool => Ok(DType::Bool),
        TensorElementType::String => Ok(DType::Str),
        _ => bail!("unsupported tensor element type: {ty}"),
    }
}

fn tensor_to_ort_value(tensor: Tensor) -> Result<DynValue> {
    let shape: Vec<usize> = tensor.desc.shape.0.iter().copied().collect();
    let TensorStorage::CpuBytes(bytes) = &tensor.storage else {
        bail!("text tensors are not supported as model inputs");
    };
    let width = tensor
        .desc
        .dtype
        .byte_size()
        .context("input dtype has no fixed width")?;
    let expected_bytes = tensor.desc.shape.numel() * width;
    ensure!(
        bytes.len() == expected_bytes,
        "input byte size mismatch: got {}, expected {}",
        bytes.len(),
        expected_bytes
    );

    let value = match tensor.desc.dtype {
        DType::F32 => {
            let data = bytes_to_f32(bytes)?;
            ort::value::Tensor::from_array((shape, data))?.into_dyn()
        }
        DType::I64 => {
            let data = bytes_to_i64(bytes)?;
            ort::value::Tensor::from_array((shape, data))?.into_dyn()
        }
        DType::U8 => {
            let data = bytes.to_vec();
            ort::value::Tensor::from_array((shape, data))?.into_dyn()
        }
        other => bail!("{other:?} inputs are not supported"),
    };

    Ok(value)
}

fn ort_value_to_tensor(value: &ort::value::ValueRef<'_>) -> Result<Tensor> {
    let ValueType::Tensor { ty, shape, .. } = value.dtype() else {
        bail!("non-tensor outputs are not supported");
    };

    let dims: Vec<usize> = shape.iter().map(|d| *d as usize).collect();
    let out_shape = Shape::from_slice(&dims);

    match *ty {
        TensorElementType::Float32 => {
            let (_, data) = value.try_extract_tensor::<f32>()?;
            Ok(Tensor::from_slice(out_shape, data))
        }
        TensorElementType::Float64 => {
            let (_, data) = value.try_extract_tensor::<f64>()?;
            Ok(Tensor::from_slice(out_shape, data))
        }
        TensorElementType::Int64 => {
            let (_, data) = value.try_extract_tensor::<i64>()?;
            Ok(Tensor::from_slice(out_shape, data))
        }
        TensorElementType::Int32 => {
            let (_, data) = value.try_extract_tensor::<i32>()?;
            Ok(Tensor::from_slice(out_shape, data))
        }
        TensorElementType::Uint8 => {
            let (_, data) = value.try_extract_tensor::<u8>()?;
            Ok(Tensor::from_slice(out_shape, data))
        }
        TensorElementType::Bool => {
            let (_, data) = value.try_extract_tensor::<bool>()?;
            let packed: Vec<u8> = data.iter().map(|b| u8::from(*b)).collect();
            Ok(Tensor::from_cpu_bytes(DType::Bool, out_shape, Bytes::from(packed)))
        }
        TensorElementType::String => {
            let (_, items) = value.try_extract_strings()?;
            let items = items
                .into_iter()
                .map(|s| Bytes::from(s.into_bytes()))
                .collect();
            Ok(Tensor::from_text(out_shape, items))
        }
        _ => bail!("unsupported output tensor element type: {ty}"),
    }
}

#[allow(clippy::manual_is_multiple_of)]
fn bytes_to_f32(bytes: &Bytes) -> Result<Vec<f32>> {
    ensure!(bytes.len() % 4 == 0, "f32 input has invalid byte length");
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[allow(clippy::manual_is_multiple_of)]
fn bytes_to_i64(bytes: &Bytes) -> Result<Vec<i64>> {
    ensure!(bytes.len() % 8 == 0, "i64 input has invalid byte length");
    Ok(bytes
        .chunks_exact(8)
        .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .collect())
}
