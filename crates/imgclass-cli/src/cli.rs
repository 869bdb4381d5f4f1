use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "imgclass", version, about = "Predict a label for an image.")]
pub struct Cli {
    /// Path to your image file
    pub image: PathBuf,

    /// Directory the exported model is used from; signature.json sits one level above it
    #[arg(long, default_value = ".")]
    pub model_dir: PathBuf,

    /// Log filter (RUST_LOG syntax)
    #[arg(long, default_value = "info")]
    pub log: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_is_the_only_required_argument() {
        let cli = Cli::try_parse_from(["imgclass", "cat.jpg"]).unwrap();
        assert_eq!(cli.image, PathBuf::from("cat.jpg"));
        assert_eq!(cli.model_dir, PathBuf::from("."));
        assert_eq!(cli.log, "info");

        assert!(Cli::try_parse_from(["imgclass"]).is_err());
    }

    #[test]
    fn model_dir_can_be_given_explicitly() {
        let cli =
            Cli::try_parse_from(["imgclass", "cat.jpg", "--model-dir", "export/example"]).unwrap();
        assert_eq!(cli.model_dir, PathBuf::from("export/example"));
    }
}
