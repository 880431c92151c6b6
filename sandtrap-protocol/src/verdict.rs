//! Final classification emitted by the scorer (§3, §4.8).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictLabel {
    Clean,
    Suspicious,
    Malicious,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub label: VerdictLabel,
    pub score: u32,
    pub technique_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Verdict {
    /// Caps `score` at 100 and classifies it against the two thresholds.
    /// `clean_threshold` and `suspicious_threshold` come from configuration
    /// (defaults 20 and 50 per §6).
    pub fn classify(score: u32, technique_tags: Vec<String>, clean_threshold: u32, suspicious_threshold: u32) -> Self {
        let capped = score.min(100);
        let label = if capped <= clean_threshold {
            VerdictLabel::Clean
        } else if capped <= suspicious_threshold {
            VerdictLabel::Suspicious
        } else {
            VerdictLabel::Malicious
        };
        Verdict {
            label,
            score: capped,
            technique_tags,
            message: None,
        }
    }

    /// A verdict that couldn't be computed; `message` carries why (e.g. the
    /// agent never answered) so callers don't have to infer it from a score
    /// of zero.
    pub fn error(message: impl Into<String>) -> Self {
        Verdict {
            label: VerdictLabel::Error,
            score: 0,
            technique_tags: Vec::new(),
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_at_clean_threshold_is_clean() {
        let v = Verdict::classify(20, vec![], 20, 50);
        assert_eq!(v.label, VerdictLabel::Clean);
    }

    #[test]
    fn score_just_above_clean_is_suspicious() {
        let v = Verdict::classify(21, vec![], 20, 50);
        assert_eq!(v.label, VerdictLabel::Suspicious);
    }

    #[test]
    fn score_above_suspicious_is_malicious() {
        let v = Verdict::classify(51, vec![], 20, 50);
        assert_eq!(v.label, VerdictLabel::Malicious);
    }

    #[test]
    fn score_is_capped_at_100() {
        let v = Verdict::classify(250, vec![], 20, 50);
        assert_eq!(v.score, 100);
    }

    #[test]
    fn empty_input_scores_clean_at_zero() {
        let v = Verdict::classify(0, vec![], 20, 50);
        assert_eq!(v.label, VerdictLabel::Clean);
        assert_eq!(v.score, 0);
    }

    #[test]
    fn error_verdict_keeps_its_message() {
        let v = Verdict::error("agent unreachable");
        assert_eq!(v.label, VerdictLabel::Error);
        assert_eq!(v.message.as_deref(), Some("agent unreachable"));
    }
}
