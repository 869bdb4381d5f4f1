use std::fmt;

use anyhow::anyhow;
use imgclass_core::{ClassifyError, DType, Tensor, TensorStorage};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Output holding one confidence per class label.
pub const CONFIDENCES_OUTPUT: &str = "Confidences";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictionValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    List(Vec<PredictionValue>),
}

impl PredictionValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PredictionValue::Float(v) => Some(*v),
            PredictionValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PredictionValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Nesting depth; 0 for scalars.
    pub fn rank(&self) -> usize {
        match self {
            PredictionValue::List(items) => 1 + items.first().map_or(0, PredictionValue::rank),
            _ => 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f64,
}

/// Model outputs keyed by their signature names, in signature order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Prediction {
    entries: Vec<(String, PredictionValue)>,
}

impl Prediction {
    pub fn get(&self, key: &str) -> Option<&PredictionValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PredictionValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn push(&mut self, key: String, value: PredictionValue) {
        self.entries.push((key, value));
    }

    /// Pairs the per-class confidences with `labels`, highest first.
    ///
    /// Empty when there is no confidence list or it does not line up with
    /// the labels.
    pub fn classifications(&self, labels: &[String]) -> Vec<Classification> {
        let Some(PredictionValue::List(scores)) = self.get(CONFIDENCES_OUTPUT) else {
            return Vec::new();
        };
        if scores.len() != labels.len() {
            return Vec::new();
        }

        let mut ranked: Vec<Classification> = labels
            .iter()
            .zip(scores)
            .filter_map(|(label, score)| {
                score.as_f64().map(|confidence| Classification {
                    label: label.clone(),
                    confidence,
                })
            })
            .collect();
        ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        ranked
    }
}

impl Serialize for Prediction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// Converts an unbatched output tensor into a plain value.
///
/// Scalars stay scalars, higher ranks become nested lists, and text elements
/// are decoded from UTF-8.
pub fn tensor_to_value(name: &str, tensor: &Tensor) -> Result<PredictionValue, ClassifyError> {
    let items = decode_elements(name, tensor)?;
    let dims = tensor.shape().dims();
    if items.len() != tensor.shape().numel() {
        return Err(ClassifyError::Runtime(anyhow!(
            "output '{name}' holds {} values for shape {dims:?}",
            items.len()
        )));
    }
    Ok(nest(dims, &items))
}

fn decode_elements(name: &str, tensor: &Tensor) -> Result<Vec<PredictionValue>, ClassifyError> {
    let bytes = match &tensor.storage {
        TensorStorage::Text(items) => {
            return items
                .iter()
                .map(|raw| {
                    String::from_utf8(raw.to_vec())
                        .map(PredictionValue::Text)
                        .map_err(|source| ClassifyError::InvalidText {
                            name: name.to_string(),
                            source,
                        })
                })
                .collect();
        }
        TensorStorage::CpuBytes(bytes) => bytes,
    };

    let values = match tensor.dtype() {
        DType::F32 => bytes
            .chunks_exact(4)
            .map(|b| {
                let v = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                PredictionValue::Float(f64::from(v))
            })
            .collect(),
        DType::F64 => bytes
            .chunks_exact(8)
            .map(|b| {
                PredictionValue::Float(f64::from_le_bytes([
                    b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
                ]))
            })
            .collect(),
        DType::I64 => bytes
            .chunks_exact(8)
            .map(|b| {
                PredictionValue::Int(i64::from_le_bytes([
                    b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
                ]))
            })
            .collect(),
        DType::I32 => bytes
            .chunks_exact(4)
            .map(|b| {
                let v = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                PredictionValue::Int(i64::from(v))
            })
            .collect(),
        DType::U8 => bytes.iter().map(|b| PredictionValue::Int(i64::from(*b))).collect(),
        DType::Bool => bytes.iter().map(|b| PredictionValue::Bool(*b != 0)).collect(),
        DType::Str => {
            return Err(ClassifyError::Runtime(anyhow!(
                "output '{name}' is text but carries packed bytes"
            )))
        }
    };
    Ok(values)
}

fn nest(dims: &[usize], items: &[PredictionValue]) -> PredictionValue {
    match dims.split_first() {
        None => items
            .first()
            .cloned()
            .unwrap_or(PredictionValue::List(Vec::new())),
        Some((&len, rest)) => {
            let stride = rest.iter().product::<usize>();
            PredictionValue::List(
                (0..len)
                    .map(|i| nest(rest, &items[i * stride..(i + 1) * stride]))
                    .collect(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use imgclass_core::Shape;

    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn scalar_text_is_decoded() {
        let t = Tensor::from_text(Shape::from_slice(&[]), vec![Bytes::from_static(b"rose")]);
        let value = tensor_to_value("Label", &t).unwrap();
        assert_eq!(value, PredictionValue::Text("rose".into()));
        assert_eq!(value.rank(), 0);
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let t = Tensor::from_text(
            Shape::from_slice(&[]),
            vec![Bytes::from_static(&[0xff, 0xfe])],
        );
        let err = tensor_to_value("Label", &t).unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidText { name, .. } if name == "Label"));
    }

    #[test]
    fn matrices_become_nested_lists() {
        let data: Vec<i64> = (0..6).collect();
        let t = Tensor::from_slice(Shape::from_slice(&[2, 3]), &data);
        let value = tensor_to_value("Grid", &t).unwrap();

        assert_eq!(value.rank(), 2);
        assert_eq!(serde_json::to_string(&value).unwrap(), "[[0,1,2],[3,4,5]]");
    }

    #[test]
    fn unbatched_output_loses_one_dimension() {
        let data = [0.25_f32, 0.5, 0.25];
        let raw = Tensor::from_f32(Shape::from_slice(&[1, 3]), &data);
        let value = tensor_to_value("Confidences", &raw.unbatch().unwrap()).unwrap();

        assert_eq!(value.rank(), raw.shape().rank() - 1);
        assert_eq!(
            value,
            PredictionValue::List(vec![
                PredictionValue::Float(0.25),
                PredictionValue::Float(0.5),
                PredictionValue::Float(0.25),
            ])
        );
    }

    #[test]
    fn short_storage_is_rejected() {
        let t = Tensor::from_f32(Shape::from_slice(&[4]), &[1.0, 2.0]);
        assert!(matches!(
            tensor_to_value("x", &t),
            Err(ClassifyError::Runtime(_))
        ));
    }

    #[test]
    fn prints_as_ordered_json_object() {
        let mut prediction = Prediction::default();
        prediction.push("Label".into(), PredictionValue::Text("tulip".into()));
        prediction.push("Index".into(), PredictionValue::Int(2));

        assert_eq!(prediction.to_string(), r#"{"Label":"tulip","Index":2}"#);
        assert_eq!(prediction.len(), 2);
        assert_eq!(prediction.get("Label").and_then(PredictionValue::as_str), Some("tulip"));
    }

    #[test]
    fn classifications_are_ranked_by_confidence() {
        let mut prediction = Prediction::default();
        prediction.push(
            CONFIDENCES_OUTPUT.into(),
            PredictionValue::List(vec![
                PredictionValue::Float(0.1),
                PredictionValue::Float(0.7),
                PredictionValue::Float(0.2),
            ]),
        );

        let ranked = prediction.classifications(&labels(&["daisy", "rose", "tulip"]));
        let order: Vec<&str> = ranked.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(order, ["rose", "tulip", "daisy"]);
        assert_eq!(ranked[0].confidence, 0.7);
    }

    #[test]
    fn classifications_need_matching_labels() {
        let mut prediction = Prediction::default();
        prediction.push(
            CONFIDENCES_OUTPUT.into(),
            PredictionValue::List(vec![PredictionValue::Float(1.0)]),
        );

        assert!(prediction.classifications(&labels(&["a", "b"])).is_empty());
        assert!(Prediction::default().classifications(&labels(&["a"])).is_empty());
    }
}
