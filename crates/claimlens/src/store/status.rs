//! Stage and status types plus the pure status-derivation rule.

use serde::{Deserialize, Serialize};

/// The fixed pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    EvidenceExtraction,
    ModelInference,
    PdfGeneration,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 3] = [
        Stage::EvidenceExtraction,
        Stage::ModelInference,
        Stage::PdfGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::EvidenceExtraction => "evidence_extraction",
            Stage::ModelInference => "model_inference",
            Stage::PdfGeneration => "pdf_generation",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl StageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageState::Pending => "pending",
            StageState::Processing => "processing",
            StageState::Completed => "completed",
            StageState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall query status. Everything except `Trashed` is derived from the
/// stage map; `Trashed` is an operator override that leaves stage data
/// untouched so the query stays restorable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Trashed,
}

impl QueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStatus::Pending => "pending",
            QueryStatus::Processing => "processing",
            QueryStatus::Completed => "completed",
            QueryStatus::Failed => "failed",
            QueryStatus::Trashed => "trashed",
        }
    }

    pub fn parse(s: &str) -> Option<QueryStatus> {
        match s {
            "pending" => Some(QueryStatus::Pending),
            "processing" => Some(QueryStatus::Processing),
            "completed" => Some(QueryStatus::Completed),
            "failed" => Some(QueryStatus::Failed),
            "trashed" => Some(QueryStatus::Trashed),
            _ => None,
        }
    }
}

impl std::fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage state for the fixed three-stage sequence. Serialized as a JSON
/// object keyed by stage name in the `queries.stages` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMap {
    pub evidence_extraction: StageState,
    pub model_inference: StageState,
    pub pdf_generation: StageState,
}

impl Default for StageMap {
    fn default() -> Self {
        Self {
            evidence_extraction: StageState::Pending,
            model_inference: StageState::Pending,
            pdf_generation: StageState::Pending,
        }
    }
}

impl StageMap {
    pub fn get(&self, stage: Stage) -> StageState {
        match stage {
            Stage::EvidenceExtraction => self.evidence_extraction,
            Stage::ModelInference => self.model_inference,
            Stage::PdfGeneration => self.pdf_generation,
        }
    }

    pub fn set(&mut self, stage: Stage, state: StageState) {
        match stage {
            Stage::EvidenceExtraction => self.evidence_extraction = state,
            Stage::ModelInference => self.model_inference = state,
            Stage::PdfGeneration => self.pdf_generation = state,
        }
    }

    /// (stage, state) pairs in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (Stage, StageState)> + '_ {
        Stage::ALL.iter().map(move |s| (*s, self.get(*s)))
    }
}

/// Derive the overall status from the stage map.
///
/// Dominance rule: any failed stage makes the query failed; all stages
/// completed makes it completed; all stages still pending means the query
/// has not been picked up; anything else is in flight.
pub fn derive_status(stages: &StageMap) -> QueryStatus {
    let states = [
        stages.evidence_extraction,
        stages.model_inference,
        stages.pdf_generation,
    ];

    if states.iter().any(|s| *s == StageState::Failed) {
        QueryStatus::Failed
    } else if states.iter().all(|s| *s == StageState::Completed) {
        QueryStatus::Completed
    } else if states.iter().all(|s| *s == StageState::Pending) {
        QueryStatus::Pending
    } else {
        QueryStatus::Processing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_map_is_pending() {
        assert_eq!(derive_status(&StageMap::default()), QueryStatus::Pending);
    }

    #[test]
    fn test_any_failed_dominates() {
        let mut stages = StageMap::default();
        stages.evidence_extraction = StageState::Completed;
        stages.model_inference = StageState::Failed;
        assert_eq!(derive_status(&stages), QueryStatus::Failed);

        // Even a fully completed map loses to a single failure.
        let mut stages = StageMap {
            evidence_extraction: StageState::Completed,
            model_inference: StageState::Completed,
            pdf_generation: StageState::Failed,
        };
        assert_eq!(derive_status(&stages), QueryStatus::Failed);
        stages.pdf_generation = StageState::Completed;
        assert_eq!(derive_status(&stages), QueryStatus::Completed);
    }

    #[test]
    fn test_all_completed_is_completed() {
        let stages = StageMap {
            evidence_extraction: StageState::Completed,
            model_inference: StageState::Completed,
            pdf_generation: StageState::Completed,
        };
        assert_eq!(derive_status(&stages), QueryStatus::Completed);
    }

    #[test]
    fn test_in_flight_is_processing() {
        let mut stages = StageMap::default();
        stages.evidence_extraction = StageState::Processing;
        assert_eq!(derive_status(&stages), QueryStatus::Processing);

        stages.evidence_extraction = StageState::Completed;
        assert_eq!(derive_status(&stages), QueryStatus::Processing);
    }

    #[test]
    fn test_stage_map_round_trips_through_json() {
        let mut stages = StageMap::default();
        stages.set(Stage::EvidenceExtraction, StageState::Completed);

        let json = serde_json::to_string(&stages).unwrap();
        assert!(json.contains("\"evidence_extraction\":\"completed\""));
        assert!(json.contains("\"model_inference\":\"pending\""));

        let parsed: StageMap = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, stages);
    }

    #[test]
    fn test_stage_iteration_order() {
        let stages = StageMap::default();
        let order: Vec<Stage> = stages.iter().map(|(s, _)| s).collect();
        assert_eq!(
            order,
            vec![
                Stage::EvidenceExtraction,
                Stage::ModelInference,
                Stage::PdfGeneration
            ]
        );
    }
}
