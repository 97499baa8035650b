//! Prediction report produced by the inference entry point.
//!
//! The entry point prints a block of the form
//!
//! ```text
//! Top 3 predictions:
//!    1. Class 207: 0.8123 (81.2%)
//!    2. Class 208: 0.1002 (10.0%)
//!    3. Class 151: 0.0311 (3.1%)
//! ```
//!
//! when the model output looks like a single-row class distribution, and a
//! raw shape/value dump otherwise.

use serde::{Deserialize, Serialize};

/// Maximum number of classes reported.
pub const TOP_K: usize = 5;

/// A single ranked class prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Class index in the model output.
    pub class_index: usize,
    /// Probability after softmax.
    pub probability: f32,
}

/// Parsed result of one forward pass.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Predictions {
    /// Top-k predictions, descending by probability. Empty when the output
    /// did not look like a classification distribution.
    pub top: Vec<Prediction>,
    /// Full stdout of the entry point.
    pub raw_output: String,
}

impl Predictions {
    /// Whether the entry point reported a classification distribution.
    pub fn is_classification(&self) -> bool {
        !self.top.is_empty()
    }

    /// Parse entry point stdout.
    pub fn parse(stdout: &str) -> Self {
        let mut top = Vec::new();
        let mut in_block = false;

        for line in stdout.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("Top ") && trimmed.ends_with("predictions:") {
                in_block = true;
                top.clear();
                continue;
            }
            if !in_block {
                continue;
            }
            match parse_prediction_line(trimmed) {
                Some(p) => top.push(p),
                None if trimmed.is_empty() => continue,
                None => in_block = false,
            }
        }

        Self {
            top: rank(top, TOP_K),
            raw_output: stdout.to_string(),
        }
    }

    /// Render in the entry point's own report format.
    pub fn to_human(&self) -> String {
        if self.top.is_empty() {
            return self.raw_output.trim_end().to_string();
        }
        let mut out = format!("Top {} predictions:", self.top.len());
        for (i, p) in self.top.iter().enumerate() {
            out.push_str(&format!(
                "\n   {}. Class {}: {:.4} ({:.1}%)",
                i + 1,
                p.class_index,
                p.probability,
                p.probability * 100.0
            ));
        }
        out
    }
}

/// Sort descending by probability (ties by class index) and keep at most `k`.
pub fn rank(mut predictions: Vec<Prediction>, k: usize) -> Vec<Prediction> {
    predictions.sort_by(|a, b| {
        b.probability
            .total_cmp(&a.probability)
            .then_with(|| a.class_index.cmp(&b.class_index))
    });
    predictions.truncate(k);
    predictions
}

/// Parse `N. Class IDX: PROB (PCT%)`.
fn parse_prediction_line(line: &str) -> Option<Prediction> {
    let (_, rest) = line.split_once(". Class ")?;
    let (idx, rest) = rest.split_once(':')?;
    let prob = rest.split_whitespace().next()?;
    Some(Prediction {
        class_index: idx.trim().parse().ok()?,
        probability: prob.parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "Processing image: sample.jpg\n\
        \n\
        Top 3 predictions:\n   \
        1. Class 207: 0.8123 (81.2%)\n   \
        2. Class 208: 0.1002 (10.0%)\n   \
        3. Class 151: 0.0311 (3.1%)\n";

    #[test]
    fn test_parse_report() {
        let preds = Predictions::parse(REPORT);
        assert!(preds.is_classification());
        assert_eq!(preds.top.len(), 3);
        assert_eq!(preds.top[0].class_index, 207);
        assert!((preds.top[0].probability - 0.8123).abs() < 1e-6);
        assert_eq!(preds.top[2].class_index, 151);
    }

    #[test]
    fn test_json_shape() {
        let value = serde_json::to_value(Predictions::parse(REPORT)).unwrap();
        let top = value["top"].as_array().unwrap();
        assert_eq!(top.len(), 3);
        assert_eq!(top[0]["class_index"], 207);
        assert!(top[0]["probability"].as_f64().unwrap() > 0.81);
        assert_eq!(value["raw_output"], REPORT);

        let back: Predictions = serde_json::from_value(value).unwrap();
        assert_eq!(back.top[1].class_index, 208);
    }

    #[test]
    fn test_parse_non_classification_output() {
        let out = "PyTorch inference output shape: torch.Size([1, 3, 7, 7])\n";
        let preds = Predictions::parse(out);
        assert!(!preds.is_classification());
        assert_eq!(preds.raw_output, out);
        assert_eq!(preds.to_human(), out.trim_end());
    }

    #[test]
    fn test_rank_sorts_and_caps() {
        let preds: Vec<Prediction> = (0..8)
            .map(|i| Prediction {
                class_index: i,
                probability: i as f32 / 10.0,
            })
            .collect();
        let ranked = rank(preds, TOP_K);
        assert_eq!(ranked.len(), 5);
        let order: Vec<usize> = ranked.iter().map(|p| p.class_index).collect();
        assert_eq!(order, vec![7, 6, 5, 4, 3]);
    }

    #[test]
    fn test_rank_fewer_than_k() {
        let preds = vec![
            Prediction { class_index: 0, probability: 0.4 },
            Prediction { class_index: 1, probability: 0.6 },
        ];
        let ranked = rank(preds, TOP_K);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].class_index, 1);
    }

    #[test]
    fn test_to_human_matches_entry_point_format() {
        let preds = Predictions::parse(REPORT);
        let human = preds.to_human();
        assert!(human.starts_with("Top 3 predictions:"));
        assert!(human.contains("1. Class 207: 0.8123 (81.2%)"));
    }
}
