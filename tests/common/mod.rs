//! Shared fixtures for integration tests: a scripted stand-in for the build
//! tool and a work directory holding the companion scripts.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use model_packager::PackagerConfig;
use tempfile::TempDir;

/// A `sh` script that records its arguments and answers each subcommand
/// with a configurable body.
pub struct FakeTool {
    pub path: PathBuf,
    pub calls: PathBuf,
    version: String,
    build: String,
    images: String,
    push: String,
}

impl FakeTool {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join("fake-docker"),
            calls: dir.join("calls.log"),
            version: r#"echo '{"Client":{"Version":"24.0.0"}}'"#.to_string(),
            build: "echo 'Step 1/8 : FROM python:3.9-slim'; echo 'Successfully built 0a1b2c3d'".to_string(),
            images: r#"echo "$2""#.to_string(),
            push: "echo 'pushed'".to_string(),
        }
    }

    pub fn version(mut self, body: &str) -> Self {
        self.version = body.to_string();
        self
    }

    pub fn build(mut self, body: &str) -> Self {
        self.build = body.to_string();
        self
    }

    pub fn images(mut self, body: &str) -> Self {
        self.images = body.to_string();
        self
    }

    pub fn push(mut self, body: &str) -> Self {
        self.push = body.to_string();
        self
    }

    /// Write the script and mark it executable.
    pub fn install(self) -> Self {
        let script = format!(
            "#!/bin/sh\n\
             echo \"$@\" >> '{calls}'\n\
             case \"$1\" in\n\
             version) {version} ;;\n\
             build) {build} ;;\n\
             images) {images} ;;\n\
             push) {push} ;;\n\
             *) echo \"unknown command $1\" >&2; exit 64 ;;\n\
             esac\n",
            calls = self.calls.display(),
            version = self.version,
            build = self.build,
            images = self.images,
            push = self.push,
        );
        fs::write(&self.path, script).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        self
    }

    pub fn program(&self) -> String {
        self.path.display().to_string()
    }

    /// Recorded invocations, one argument line per call.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(&self.calls)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// Temporary work directory with `infer.py`, `model_loader.py` and a model.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("infer.py"), "import sys\nprint('Top predictions:')\n").unwrap();
        fs::write(dir.path().join("model_loader.py"), "def load_model(path):\n    return path\n").unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a model file named `name` and return its path.
    pub fn model(&self, name: &str) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, b"\x80\x02weights").unwrap();
        path
    }

    /// Config rooted at this workspace using `tool`, with short timeouts.
    pub fn config(&self, tool: &str) -> PackagerConfig {
        let mut config = PackagerConfig {
            work_dir: self.path().to_path_buf(),
            tool: tool.to_string(),
            ..PackagerConfig::default()
        };
        config.timeouts.probe_secs = 5;
        config.timeouts.verify_secs = 5;
        config.timeouts.termination_grace_secs = 1;
        config
    }
}
