use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::time::EpochMs;

/// Wire format is the bare integer `1|2|3`, not the variant name: `#[repr(u8)]`
/// alone only fixes the in-memory discriminant, serde ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum DunningStage {
    First = 1,
    Second = 2,
    Third = 3,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DunningEntry {
    #[serde(rename = "organizationId")]
    pub organization_id: String,
    #[serde(rename = "dunningStage")]
    pub dunning_stage: DunningStage,
    #[serde(rename = "startedAt")]
    pub started_at: EpochMs,
    #[serde(rename = "lastStageChangedAt")]
    pub last_stage_changed_at: EpochMs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dunning_stage_serializes_as_an_integer() {
        assert_eq!(serde_json::to_string(&DunningStage::Second).unwrap(), "2");
    }

    #[test]
    fn dunning_stage_deserializes_from_an_integer() {
        let entry: DunningEntry = serde_json::from_str(
            r#"{"organizationId":"org-1","dunningStage":3,"startedAt":0,"lastStageChangedAt":0}"#,
        )
        .unwrap();
        assert_eq!(entry.dunning_stage, DunningStage::Third);
    }
}
