//! Static ignore list for the build context

/// Ignore-list file name inside the build context.
pub const IGNORE_FILE: &str = ".dockerignore";

const IGNORE_PATTERNS: &[&str] = &[
    "__pycache__",
    "**/__pycache__",
    "*.pyc",
    "*.pyo",
    ".git",
    ".gitignore",
    ".hg",
    ".svn",
    ".venv",
    "venv",
    ".pytest_cache",
    ".mypy_cache",
    "build",
    "dist",
    "*.egg-info",
    ".DS_Store",
    "*.log",
];

/// Rendered ignore list, one pattern per line.
pub fn render() -> String {
    let mut out = String::new();
    for pattern in IGNORE_PATTERNS {
        out.push_str(pattern);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_excludes_context_files() {
        let text = render();
        for required in ["requirements.txt", "infer.py", "sample.jpg", "Dockerfile", "model.pth"] {
            assert!(
                !text.lines().any(|l| l == required),
                "{required} must not be ignored"
            );
        }
        assert!(text.lines().any(|l| l == ".git"));
        assert!(text.ends_with('\n'));
    }
}
