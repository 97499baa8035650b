//! Build descriptor (Dockerfile) rendering

use std::path::Path;

/// Base image for every packaged model.
pub const BASE_IMAGE: &str = "python:3.9-slim";

/// Descriptor file name inside the build context.
pub const DESCRIPTOR_FILE: &str = "Dockerfile";

const TEMPLATE: &str = "\
FROM {base_image}
WORKDIR /app
COPY requirements.txt ./
RUN pip install --no-cache-dir -r requirements.txt
COPY {model} ./
COPY infer.py .
COPY sample.jpg .
CMD [\"python\", \"infer.py\", \"--model\", \"{model}\", \"--test-input\", \"sample.jpg\"]
";

/// Errors for descriptor rendering
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("model filename must not be empty")]
    EmptyFilename,

    #[error("model filename must not start with '-': {0}")]
    LeadingDash(String),

    #[error("model filename {name:?} contains forbidden character {ch:?}")]
    ForbiddenCharacter { name: String, ch: char },
}

/// In-context name of the model: `model.<lowercase ext>`, or `model` when
/// the source has no extension.
pub fn canonical_model_filename(model_path: &Path) -> String {
    match model_path.extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("model.{}", ext.to_ascii_lowercase()),
        _ => "model".to_string(),
    }
}

/// Reject names that would break out of the `COPY` or exec-form `CMD` lines.
pub fn validate_filename(name: &str) -> Result<(), DescriptorError> {
    if name.is_empty() {
        return Err(DescriptorError::EmptyFilename);
    }
    if name.starts_with('-') {
        return Err(DescriptorError::LeadingDash(name.to_string()));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| matches!(c, '"' | '\'' | '`' | '\\' | '$') || c.is_whitespace() || c.is_control())
    {
        return Err(DescriptorError::ForbiddenCharacter {
            name: name.to_string(),
            ch,
        });
    }
    Ok(())
}

/// Render the descriptor for `model_filename`.
pub fn render(model_filename: &str) -> Result<String, DescriptorError> {
    validate_filename(model_filename)?;
    Ok(TEMPLATE
        .replace("{base_image}", BASE_IMAGE)
        .replace("{model}", model_filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_pytorch() {
        let text = render("model.pth").unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "FROM python:3.9-slim");
        assert_eq!(lines[1], "WORKDIR /app");
        assert_eq!(lines[3], "RUN pip install --no-cache-dir -r requirements.txt");
        assert_eq!(lines[4], "COPY model.pth ./");
        assert_eq!(
            lines.last().copied(),
            Some(r#"CMD ["python", "infer.py", "--model", "model.pth", "--test-input", "sample.jpg"]"#)
        );
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_render_has_no_placeholders() {
        let text = render("model.h5").unwrap();
        assert!(!text.contains('{'));
    }

    #[test]
    fn test_quote_rejected() {
        assert_eq!(
            render("mo\"del.pth"),
            Err(DescriptorError::ForbiddenCharacter {
                name: "mo\"del.pth".to_string(),
                ch: '"'
            })
        );
    }

    #[test]
    fn test_other_forbidden_names() {
        for bad in ["a b.pth", "a$b.pth", "a`b", "a\\b", "it's.pt", "a\nb", "a\tb"] {
            assert!(validate_filename(bad).is_err(), "{bad:?} accepted");
        }
        assert_eq!(validate_filename(""), Err(DescriptorError::EmptyFilename));
        assert!(matches!(
            validate_filename("-rf.pth"),
            Err(DescriptorError::LeadingDash(_))
        ));
    }

    #[test]
    fn test_canonical_filename() {
        assert_eq!(canonical_model_filename(Path::new("/tmp/ResNet 18.PTH")), "model.pth");
        assert_eq!(canonical_model_filename(Path::new("weights.keras")), "model.keras");
        assert_eq!(canonical_model_filename(Path::new("weights")), "model");
        assert_eq!(canonical_model_filename(Path::new(".hidden")), "model");
    }
}
