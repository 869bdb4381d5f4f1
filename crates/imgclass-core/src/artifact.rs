use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelArtifact {
    OnnxPath(PathBuf),
    /// A model file in a format only a registered backend knows how to open.
    File { format: String, path: PathBuf },
}

impl ModelArtifact {
    /// Builds the artifact for a signature `format` string.
    ///
    /// Formats are matched case-insensitively; whether one can be loaded is
    /// decided by the backend registry.
    pub fn from_format(format: &str, path: PathBuf) -> Self {
        let format = format.to_ascii_lowercase();
        if format == "onnx" {
            return ModelArtifact::OnnxPath(path);
        }
        ModelArtifact::File { format, path }
    }

    /// Registry key of the backend able to load this artifact.
    pub fn format(&self) -> &str {
        match self {
            ModelArtifact::OnnxPath(_) => "onnx",
            ModelArtifact::File { format, .. } => format,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ModelArtifact::OnnxPath(path) | ModelArtifact::File { path, .. } => path,
        }
    }
}
