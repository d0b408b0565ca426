use serde::{Deserialize, Serialize};

/// Severity levels for activity logs.
/// Controls retention policies and log filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Critical events: long-term retention, never auto-delete
    Critical,
    /// Important events: medium-term retention (default)
    #[default]
    Important,
    /// Noise events: aggressively trimmed
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

/// Trait for entities that can be logged in the activity log.
pub trait Loggable: Serialize + Send + Sync {
    /// Prefix of the event name, e.g. "user" in "user.created".
    fn entity_type() -> &'static str;

    /// The subject the event is about (usually the owning account or role).
    fn subject_id(&self) -> i64;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    /// Removals are always critical; other actions use the entity's level.
    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" | "revoked" => Severity::Critical,
            _ => self.severity(),
        }
    }
}
