//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{DifficultyTier, Level};

/// Version tag carried by exported progress documents.
pub const EXPORT_VERSION: &str = "1.0";

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    StartSession {
        #[serde(rename = "sessionId")]
        session_id: Option<Uuid>,
    },
    ListLevels,
    SelectLevel {
        level: String,
    },
    NextStep,
    PrevStep,
    CheckMicro {
        micro: u32,
        code: String,
    },
    Hint {
        micro: u32,
    },
    Progress,
    Reset,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    SessionStarted {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
        restored: bool,
        progress: ProgressOut,
    },
    Levels {
        levels: Vec<LevelSummaryOut>,
    },
    LevelSelected {
        progress: ProgressOut,
    },
    Step {
        #[serde(rename = "stepIndex")]
        step_index: usize,
        #[serde(rename = "stepTitle")]
        step_title: String,
        #[serde(rename = "progressPercent")]
        progress_percent: u32,
    },
    MicroResult {
        micro: u32,
        passed: bool,
        feedback: String,
        #[serde(rename = "badgesAwarded")]
        badges_awarded: Vec<BadgeOut>,
        completed: bool,
        #[serde(rename = "courseMessage", skip_serializing_if = "Option::is_none")]
        course_message: Option<String>,
    },
    Hint {
        text: String,
    },
    Progress {
        progress: ProgressOut,
    },
    ResetDone {
        progress: ProgressOut,
    },
    Error {
        message: String,
    },
}

/// DTO used by both WS and HTTP for level lists.
#[derive(Debug, Clone, Serialize)]
pub struct LevelSummaryOut {
    pub id: String,
    pub name: String,
    pub rank: u32,
    pub icon: String,
    pub duration: String,
    #[serde(rename = "totalSteps")]
    pub total_steps: usize,
}

/// Full level description, step titles and challenge list included.
#[derive(Debug, Serialize)]
pub struct LevelDetailOut {
    pub id: String,
    pub name: String,
    pub rank: u32,
    pub icon: String,
    pub duration: String,
    pub description: String,
    pub features: Vec<String>,
    #[serde(rename = "stepTitles")]
    pub step_titles: Vec<String>,
    #[serde(rename = "totalSteps")]
    pub total_steps: usize,
    pub challenges: Vec<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BadgeOut {
    pub id: String,
    pub label: String,
}

/// Session progress as shown to the client.
#[derive(Debug, Serialize)]
pub struct ProgressOut {
    pub level: Option<LevelSummaryOut>,
    #[serde(rename = "stepIndex")]
    pub step_index: usize,
    #[serde(rename = "stepTitle")]
    pub step_title: Option<String>,
    #[serde(rename = "totalSteps")]
    pub total_steps: usize,
    #[serde(rename = "progressPercent")]
    pub progress_percent: u32,
    /// Challenges validated in the selected level.
    pub validated: Vec<u32>,
    #[serde(rename = "validatedByLevel")]
    pub validated_by_level: BTreeMap<String, Vec<u32>>,
    pub badges: Vec<BadgeOut>,
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    pub completed: bool,
}

/// Convert a level to its list-entry DTO.
pub fn level_summary(l: &Level) -> LevelSummaryOut {
    LevelSummaryOut {
        id: l.id.clone(),
        name: l.name.clone(),
        rank: l.rank,
        icon: l.icon.clone(),
        duration: l.duration.clone(),
        total_steps: l.total_steps,
    }
}

/// Convert a level to its full DTO.
pub fn level_detail(l: &Level) -> LevelDetailOut {
    LevelDetailOut {
        id: l.id.clone(),
        name: l.name.clone(),
        rank: l.rank,
        icon: l.icon.clone(),
        duration: l.duration.clone(),
        description: l.description.clone(),
        features: l.features.clone(),
        step_titles: l.step_titles.clone(),
        total_steps: l.total_steps,
        challenges: l.challenges.clone(),
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct AttachSessionIn {
    #[serde(rename = "sessionId")]
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SessionOut {
    #[serde(rename = "sessionId")]
    pub session_id: Uuid,
    pub restored: bool,
    pub progress: ProgressOut,
}

#[derive(Debug, Deserialize)]
pub struct SelectLevelIn {
    pub level: String,
}

#[derive(Debug, Serialize)]
pub struct StepOut {
    #[serde(rename = "stepIndex")]
    pub step_index: usize,
    #[serde(rename = "stepTitle")]
    pub step_title: String,
    #[serde(rename = "progressPercent")]
    pub progress_percent: u32,
}

#[derive(Debug, Deserialize)]
pub struct CheckMicroIn {
    pub micro: u32,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct MicroResultOut {
    pub micro: u32,
    pub passed: bool,
    pub feedback: String,
    #[serde(rename = "badgesAwarded")]
    pub badges_awarded: Vec<BadgeOut>,
    pub completed: bool,
    #[serde(rename = "courseMessage", skip_serializing_if = "Option::is_none")]
    pub course_message: Option<String>,
}

#[derive(Serialize)]
pub struct HintOut {
    pub text: String,
}

/// Stateless validation request: the tier comes from the caller, not
/// from any session.
#[derive(Debug, Deserialize)]
pub struct ValidateIn {
    pub micro: u32,
    pub code: String,
    pub tier: DifficultyTier,
}

#[derive(Debug, Serialize)]
pub struct ValidateOut {
    pub micro: u32,
    pub tier: DifficultyTier,
    pub passed: bool,
}

#[derive(Debug, Deserialize)]
pub struct MicroInfoQuery {
    pub tier: Option<DifficultyTier>,
}

#[derive(Debug, Serialize)]
pub struct MicroInfoOut {
    pub id: u32,
    /// "generic" or "bespoke".
    pub strategy: &'static str,
    pub badge: Option<BadgeOut>,
    #[serde(rename = "checksByTier")]
    pub checks_by_tier: BTreeMap<DifficultyTier, bool>,
}

#[derive(Serialize)]
pub struct SavedOut {
    pub saved: bool,
}

#[derive(Serialize)]
pub struct RemovedOut {
    pub removed: bool,
}

/// Flattened progress totals used by export and import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressStats {
    pub level: Option<String>,
    #[serde(rename = "levelName")]
    pub level_name: Option<String>,
    #[serde(rename = "stepIndex")]
    pub step_index: usize,
    #[serde(rename = "totalSteps")]
    pub total_steps: usize,
    #[serde(rename = "progressPercent")]
    pub progress_percent: u32,
    #[serde(rename = "validatedByLevel", default)]
    pub validated_by_level: BTreeMap<String, Vec<u32>>,
    #[serde(rename = "validatedCount")]
    pub validated_count: usize,
    #[serde(default)]
    pub badges: Vec<String>,
    #[serde(rename = "badgeCount")]
    pub badge_count: usize,
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    pub completed: bool,
}

/// Exported progress document, importable on another deployment.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportDoc {
    pub progress: ProgressStats,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
