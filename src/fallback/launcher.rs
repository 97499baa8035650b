//! Launcher scripts shipped in fallback packages

pub const RUN_PY: &str = "run.py";
pub const RUN_BAT: &str = "run.bat";

const RUN_PY_TEMPLATE: &str = r#"#!/usr/bin/env python3
"""Install dependencies and run inference on the packaged model."""
import subprocess
import sys


def main():
    print("Installing dependencies...")
    try:
        subprocess.check_call(
            [sys.executable, "-m", "pip", "install", "-q", "-r", "requirements.txt"]
        )
    except subprocess.CalledProcessError as e:
        print(f"Error installing dependencies: {e}", file=sys.stderr)
        return 1

    print("Running inference...")
    try:
        subprocess.check_call(
            [sys.executable, "infer.py", "--model", "{model}"] + sys.argv[1:]
        )
    except subprocess.CalledProcessError as e:
        print(f"Error running inference: {e}", file=sys.stderr)
        return 1

    return 0


if __name__ == "__main__":
    sys.exit(main())
"#;

const RUN_BAT_TEMPLATE: &str = "@echo off\r
echo Running model inference...\r
python run.py %*\r
if %ERRORLEVEL% NEQ 0 (\r
    echo Error occurred during execution.\r
    exit /b %ERRORLEVEL%\r
)\r
echo.\r
echo Execution completed successfully.\r
";

/// `run.py` for `model_file`. The name must already be validated.
pub fn render_run_py(model_file: &str) -> String {
    RUN_PY_TEMPLATE.replace("{model}", model_file)
}

pub fn render_run_bat() -> &'static str {
    RUN_BAT_TEMPLATE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_py_references_model() {
        let text = render_run_py("model.h5");
        assert!(text.starts_with("#!/usr/bin/env python3\n"));
        assert!(text.contains(r#""infer.py", "--model", "model.h5""#));
        assert!(text.contains("requirements.txt"));
        assert!(!text.contains("{model}"));
    }

    #[test]
    fn test_run_bat_propagates_error_level() {
        let text = render_run_bat();
        assert!(text.contains("python run.py"));
        assert!(text.contains("exit /b %ERRORLEVEL%"));
        assert!(text.split('\n').all(|l| l.is_empty() || l.ends_with('\r')));
    }
}
