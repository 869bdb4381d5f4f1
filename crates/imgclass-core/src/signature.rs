//! `signature.json` descriptor written next to an exported model.
//!
//! The descriptor names the model file and declares the model's inputs and
//! outputs by semantic key (for example `"Image"` or `"Label"`), each mapped
//! to the tensor identifier the runtime uses and, optionally, its shape.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::{Deserializer, Error as _, MapAccess, Visitor};
use serde::Deserialize;

use crate::{ClassifyError, ModelArtifact};

pub const SIGNATURE_FILE: &str = "signature.json";
pub const IMAGE_INPUT: &str = "Image";
pub const DEFAULT_FORMAT: &str = "onnx";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TensorDecl {
    /// Tensor identifier inside the model graph.
    pub name: String,
    /// Dimension sizes; `None` marks a dynamic dimension.
    #[serde(default)]
    pub shape: Option<Vec<Option<usize>>>,
    #[serde(default)]
    pub dtype: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Classes {
    #[serde(rename = "Label", default)]
    pub label: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Signature {
    pub filename: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub doc_name: Option<String>,
    #[serde(default)]
    pub classes: Option<Classes>,
    #[serde(deserialize_with = "ordered_decls")]
    pub inputs: Vec<(String, TensorDecl)>,
    #[serde(deserialize_with = "ordered_decls")]
    pub outputs: Vec<(String, TensorDecl)>,
}

impl Signature {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ClassifyError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ClassifyError::SignatureRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ClassifyError::SignatureParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn input(&self, key: &str) -> Option<&TensorDecl> {
        self.inputs.iter().find(|(k, _)| k == key).map(|(_, d)| d)
    }

    pub fn output(&self, key: &str) -> Option<&TensorDecl> {
        self.outputs.iter().find(|(k, _)| k == key).map(|(_, d)| d)
    }

    pub fn image_input(&self) -> Result<&TensorDecl, ClassifyError> {
        self.input(IMAGE_INPUT).ok_or(ClassifyError::MissingImageInput)
    }

    pub fn format(&self) -> &str {
        self.format.as_deref().unwrap_or(DEFAULT_FORMAT)
    }

    /// Class labels in model output order; empty when the signature has none.
    pub fn labels(&self) -> &[String] {
        self.classes
            .as_ref()
            .map(|c| c.label.as_slice())
            .unwrap_or_default()
    }
}

/// A parsed signature together with the resolved path of its model file.
#[derive(Clone, Debug)]
pub struct ModelExport {
    pub signature: Signature,
    pub model_path: PathBuf,
}

impl ModelExport {
    /// Loads the signature that sits one directory above `model_dir`.
    ///
    /// The model file is resolved against the signature's own directory and
    /// must exist before any backend is asked to open it.
    pub fn load(model_dir: impl AsRef<Path>) -> Result<Self, ClassifyError> {
        let export_dir = model_dir.as_ref().join("..");
        let signature = Signature::from_path(export_dir.join(SIGNATURE_FILE))?;

        let model_path = export_dir.join(&signature.filename);
        if !model_path.is_file() {
            return Err(ClassifyError::ModelFileNotFound { path: model_path });
        }

        Ok(Self {
            signature,
            model_path,
        })
    }

    pub fn artifact(&self) -> ModelArtifact {
        ModelArtifact::from_format(self.signature.format(), self.model_path.clone())
    }
}

fn ordered_decls<'de, D>(deserializer: D) -> Result<Vec<(String, TensorDecl)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct DeclsVisitor;

    impl<'de> Visitor<'de> for DeclsVisitor {
        type Value = Vec<(String, TensorDecl)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of tensor declarations")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut decls: Vec<(String, TensorDecl)> =
                Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, decl)) = map.next_entry::<String, TensorDecl>()? {
                if decls.iter().any(|(k, _)| *k == key) {
                    return Err(A::Error::custom(format!("duplicate tensor key `{key}`")));
                }
                decls.push((key, decl));
            }
            Ok(decls)
        }
    }

    deserializer.deserialize_map(DeclsVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOBE_SIGNATURE: &str = r#"{
        "doc_name": "flowers",
        "format": "onnx",
        "filename": "model.onnx",
        "classes": {"Label": ["daisy", "rose", "tulip"]},
        "tags": ["serve"],
        "inputs": {"Image": {"dtype": "float32", "shape": [null, 224, 224, 3], "name": "Image:0"}},
        "outputs": {
            "Label": {"dtype": "string", "shape": [null], "name": "Label:0"},
            "Confidences": {"dtype": "float32", "shape": [null, 3], "name": "Confidences:0"}
        }
    }"#;

    fn write_export(dir: &Path, signature: &str, model: Option<&str>) {
        fs::create_dir_all(dir.join("example")).unwrap();
        fs::write(dir.join(SIGNATURE_FILE), signature).unwrap();
        if let Some(name) = model {
            fs::write(dir.join(name), b"not really onnx").unwrap();
        }
    }

    #[test]
    fn parses_declarations_in_file_order() {
        let sig: Signature = serde_json::from_str(LOBE_SIGNATURE).unwrap();

        let keys: Vec<&str> = sig.outputs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["Label", "Confidences"]);

        let image = sig.image_input().unwrap();
        assert_eq!(image.name, "Image:0");
        assert_eq!(image.shape, Some(vec![None, Some(224), Some(224), Some(3)]));
        assert_eq!(sig.labels(), ["daisy", "rose", "tulip"]);
        assert_eq!(sig.format(), "onnx");
    }

    #[test]
    fn minimal_signature_defaults() {
        let sig: Signature = serde_json::from_str(
            r#"{"filename": "m.onnx",
                "inputs": {"Image": {"name": "in0", "shape": [1, 224, 224, 3]}},
                "outputs": {"Label": {"name": "out0"}}}"#,
        )
        .unwrap();

        assert_eq!(sig.format(), DEFAULT_FORMAT);
        assert!(sig.labels().is_empty());
        assert_eq!(sig.output("Label").unwrap().shape, None);
    }

    #[test]
    fn missing_image_input_is_reported() {
        let sig: Signature = serde_json::from_str(
            r#"{"filename": "m.onnx", "inputs": {"Pixels": {"name": "x"}}, "outputs": {}}"#,
        )
        .unwrap();
        assert!(matches!(
            sig.image_input(),
            Err(ClassifyError::MissingImageInput)
        ));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let result = serde_json::from_str::<Signature>(
            r#"{"filename": "m.onnx",
                "inputs": {"Image": {"name": "a"}, "Image": {"name": "b"}},
                "outputs": {}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn load_resolves_model_next_to_signature() {
        let tmp = tempfile::tempdir().unwrap();
        write_export(tmp.path(), LOBE_SIGNATURE, Some("model.onnx"));

        let export = ModelExport::load(tmp.path().join("example")).unwrap();
        assert_eq!(
            export.model_path,
            tmp.path().join("example").join("..").join("model.onnx")
        );
        assert!(matches!(export.artifact(), ModelArtifact::OnnxPath(_)));
    }

    #[test]
    fn load_fails_when_model_file_is_absent() {
        let tmp = tempfile::tempdir().unwrap();
        write_export(tmp.path(), LOBE_SIGNATURE, None);

        let err = ModelExport::load(tmp.path().join("example")).unwrap_err();
        assert!(matches!(err, ClassifyError::ModelFileNotFound { .. }));
    }

    #[test]
    fn load_reports_missing_and_malformed_signatures() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("example")).unwrap();
        let err = ModelExport::load(tmp.path().join("example")).unwrap_err();
        assert!(matches!(err, ClassifyError::SignatureRead { .. }));

        fs::write(tmp.path().join(SIGNATURE_FILE), r#"{"filename": 3}"#).unwrap();
        let err = ModelExport::load(tmp.path().join("example")).unwrap_err();
        assert!(matches!(err, ClassifyError::SignatureParse { .. }));
    }

    #[test]
    fn unknown_format_is_left_to_the_registry() {
        let tmp = tempfile::tempdir().unwrap();
        write_export(
            tmp.path(),
            r#"{"filename": "saved_model.pb", "format": "tf",
                "inputs": {"Image": {"name": "x"}}, "outputs": {}}"#,
            Some("saved_model.pb"),
        );

        let export = ModelExport::load(tmp.path().join("example")).unwrap();
        let artifact = export.artifact();
        assert_eq!(artifact.format(), "tf");
        assert_eq!(artifact.path(), export.model_path);
    }
}
