//! Framework profile table.

use serde::{Deserialize, Serialize};

use crate::Framework;

/// Static association between a framework, the model-file extensions that
/// select it, and its dependency manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkProfile {
    /// Framework this profile describes.
    pub framework: Framework,

    /// Lowercase extensions without the leading dot.
    pub extensions: Vec<String>,

    /// Manifest lines, one package (optionally pinned) per entry.
    pub requirements: Vec<String>,
}

impl FrameworkProfile {
    /// Built-in profile for the given framework.
    pub fn builtin(framework: Framework) -> Self {
        let (extensions, requirements): (&[&str], &[&str]) = match framework {
            Framework::Pytorch => (&["pth", "pt"], &["torch", "torchvision", "Pillow"]),
            Framework::Tensorflow => (&["h5", "keras"], &["tensorflow", "Pillow"]),
        };
        Self {
            framework,
            extensions: extensions.iter().map(|s| s.to_string()).collect(),
            requirements: requirements.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Render the dependency manifest.
    ///
    /// Content is a pure function of the profile: one line per entry,
    /// newline-terminated, no merging or version resolution.
    pub fn manifest(&self) -> String {
        let mut out = String::new();
        for line in &self.requirements {
            out.push_str(line.trim());
            out.push('\n');
        }
        out
    }

    /// Whether `ext` (with or without a leading dot, any case) selects this profile.
    pub fn matches_extension(&self, ext: &str) -> bool {
        let ext = normalize_extension(ext);
        self.extensions.iter().any(|e| normalize_extension(e) == ext)
    }
}

/// The two framework profiles plus the policy default for unknown formats.
///
/// Passed by value into the detector, assembler and fallback packager;
/// configuration may replace either profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileTable {
    pytorch: FrameworkProfile,
    tensorflow: FrameworkProfile,
    default_framework: Framework,
}

impl Default for ProfileTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProfileTable {
    /// Built-in table. Unknown extensions route to PyTorch.
    pub fn builtin() -> Self {
        Self {
            pytorch: FrameworkProfile::builtin(Framework::Pytorch),
            tensorflow: FrameworkProfile::builtin(Framework::Tensorflow),
            default_framework: Framework::Pytorch,
        }
    }

    /// Replace the profile for `profile.framework`.
    pub fn with_profile(mut self, profile: FrameworkProfile) -> Self {
        match profile.framework {
            Framework::Pytorch => self.pytorch = profile,
            Framework::Tensorflow => self.tensorflow = profile,
        }
        self
    }

    /// Profile for a framework.
    pub fn profile(&self, framework: Framework) -> &FrameworkProfile {
        match framework {
            Framework::Pytorch => &self.pytorch,
            Framework::Tensorflow => &self.tensorflow,
        }
    }

    /// Framework used when the extension is unknown or missing.
    pub fn default_framework(&self) -> Framework {
        self.default_framework
    }

    /// Look up an extension. Earlier frameworks in [`Framework::ALL`] win
    /// when a configured extension appears in both profiles.
    pub fn framework_for_extension(&self, ext: &str) -> Option<Framework> {
        Framework::ALL
            .into_iter()
            .find(|fw| self.profile(*fw).matches_extension(ext))
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}
