//! Storyline warning types.

use serde::{Deserialize, Serialize};

/// How serious a finding is. Ordered `Low < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Worth noting.
    Low,
    /// Degrading the story.
    High,
    /// Requires review on its own.
    Critical,
}

/// Category of a character finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningType {
    /// The character's story has drifted from the themes.
    ThemeDrift,
    /// The character's story has stopped being engaging.
    LowInterest,
    /// Tension is near its ceiling while the arc has barely moved.
    TensionOverload,
    /// The character has not appeared in recent events.
    StalledArc,
}

/// A single finding about a character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    /// Category.
    #[serde(rename = "type")]
    pub warning_type: WarningType,
    /// Human-readable explanation.
    pub message: String,
    /// Severity.
    pub severity: Severity,
}

/// All findings about one character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterWarnings {
    /// The character.
    pub character_id: String,
    /// Findings, in the order they were checked.
    pub warnings: Vec<Warning>,
}

impl CharacterWarnings {
    /// The most serious finding's severity.
    #[must_use]
    pub fn worst(&self) -> Option<Severity> {
        self.warnings.iter().map(|w| w.severity).max()
    }
}

/// Whether character storylines are drawing together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceStatus {
    /// No recent events to judge by.
    InsufficientData,
    /// At least half of recent events involve more than one character.
    Converging,
    /// Some recent events involve more than one character.
    Parallel,
    /// No recent event involves more than one character.
    Diverging,
}

/// A pair of characters heading toward betrayal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetrayalPrediction {
    /// Likely betrayer.
    pub character_id: String,
    /// Likely victim.
    pub target_id: String,
    /// Likelihood, 0–100.
    pub likelihood: u8,
}

/// Aggregate storyline health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorylineWarning {
    /// Characters with at least one finding.
    pub characters: Vec<CharacterWarnings>,
    /// Mean theme alignment, 0–100.
    pub overall_theme_alignment: u8,
    /// Mean interest, 0–100.
    pub overall_interest: u8,
    /// Convergence of character storylines.
    pub convergence_status: ConvergenceStatus,
    /// Most likely betrayal, if any pair qualifies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub betrayal_prediction: Option<BetrayalPrediction>,
    /// Suggested next step for the reviewer.
    pub recommendation: String,
}

impl StorylineWarning {
    /// The most serious character finding across all characters.
    #[must_use]
    pub fn worst_severity(&self) -> Option<Severity> {
        self.characters.iter().filter_map(CharacterWarnings::worst).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warning(severity: Severity) -> Warning {
        Warning {
            warning_type: WarningType::LowInterest,
            message: "flat".to_owned(),
            severity,
        }
    }

    #[test]
    fn test_severity_orders_critical_above_high_above_low() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Low);
    }

    #[test]
    fn test_worst_severity_spans_characters() {
        let report = StorylineWarning {
            characters: vec![
                CharacterWarnings {
                    character_id: "aria".to_owned(),
                    warnings: vec![warning(Severity::Low), warning(Severity::High)],
                },
                CharacterWarnings {
                    character_id: "bren".to_owned(),
                    warnings: vec![warning(Severity::Critical)],
                },
            ],
            overall_theme_alignment: 80,
            overall_interest: 80,
            convergence_status: ConvergenceStatus::Parallel,
            betrayal_prediction: None,
            recommendation: String::new(),
        };

        assert_eq!(report.worst_severity(), Some(Severity::Critical));
    }

    #[test]
    fn test_warning_type_is_serialized_as_type() {
        let json = serde_json::to_value(warning(Severity::High)).unwrap();

        assert_eq!(json["type"], "low_interest");
        assert_eq!(json["severity"], "high");
    }
}
