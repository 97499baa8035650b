//! Extension-based framework detection.

use std::path::Path;

use crate::{Framework, FrameworkChoice, ProfileTable};

/// Detect the framework for a model file using the built-in profile table.
///
/// See [`detect_with_table`].
pub fn detect(model_path: &Path, override_choice: Option<&str>) -> Framework {
    detect_with_table(model_path, override_choice, &ProfileTable::builtin())
}

/// Detect the framework for a model file.
///
/// A recognized non-`auto` override wins. Otherwise the file extension is
/// matched case-insensitively against the table; unknown or missing
/// extensions fall back to the table's default framework. Never fails.
pub fn detect_with_table(
    model_path: &Path,
    override_choice: Option<&str>,
    table: &ProfileTable,
) -> Framework {
    if let Some(raw) = override_choice {
        match FrameworkChoice::parse_lenient(raw) {
            FrameworkChoice::Explicit(fw) => return fw,
            FrameworkChoice::Auto => {
                if !raw.trim().eq_ignore_ascii_case("auto") {
                    tracing::debug!(value = raw, "ignoring unrecognized framework override");
                }
            }
        }
    }

    let detected = model_path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(|ext| table.framework_for_extension(ext));

    match detected {
        Some(fw) => fw,
        None => {
            let fallback = table.default_framework();
            tracing::warn!(
                path = %model_path.display(),
                framework = %fallback,
                "unrecognized model extension, using default framework"
            );
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FrameworkProfile;

    #[test]
    fn test_supported_extensions() {
        assert_eq!(detect(Path::new("resnet18.pth"), None), Framework::Pytorch);
        assert_eq!(detect(Path::new("weights.pt"), None), Framework::Pytorch);
        assert_eq!(detect(Path::new("model.h5"), None), Framework::Tensorflow);
        assert_eq!(detect(Path::new("dir/model.keras"), None), Framework::Tensorflow);
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        assert_eq!(detect(Path::new("MODEL.PTH"), None), Framework::Pytorch);
        assert_eq!(detect(Path::new("Model.H5"), None), Framework::Tensorflow);
    }

    #[test]
    fn test_unknown_or_missing_extension_defaults() {
        assert_eq!(detect(Path::new("model.onnx"), None), Framework::Pytorch);
        assert_eq!(detect(Path::new("model"), None), Framework::Pytorch);
        assert_eq!(detect(Path::new(".hidden"), None), Framework::Pytorch);
        // deterministic across calls
        for _ in 0..3 {
            assert_eq!(detect(Path::new("x.safetensors"), None), Framework::Pytorch);
        }
    }

    #[test]
    fn test_override_wins() {
        assert_eq!(
            detect(Path::new("model.pth"), Some("tensorflow")),
            Framework::Tensorflow
        );
        assert_eq!(detect(Path::new("model.h5"), Some("pytorch")), Framework::Pytorch);
    }

    #[test]
    fn test_auto_and_unknown_override_fall_through() {
        assert_eq!(detect(Path::new("model.h5"), Some("auto")), Framework::Tensorflow);
        assert_eq!(detect(Path::new("model.h5"), Some("mxnet")), Framework::Tensorflow);
    }

    #[test]
    fn test_custom_table() {
        let table = ProfileTable::builtin().with_profile(FrameworkProfile {
            framework: Framework::Tensorflow,
            extensions: vec!["tflite".to_string()],
            requirements: vec!["tensorflow".to_string()],
        });
        assert_eq!(
            detect_with_table(Path::new("m.tflite"), None, &table),
            Framework::Tensorflow
        );
        assert_eq!(
            detect_with_table(Path::new("m.h5"), None, &table),
            Framework::Pytorch
        );
    }
}
