//! Entity class tags

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reconciliation family an entity class belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    /// Single-writer register with staleness check
    MutableRecord,
    /// Insert-once records; resubmissions are no-ops
    AppendOnly,
    /// Per-owner aggregate merged field by field
    MergeableAggregate,
}

/// Every entity class the engine knows how to address.
///
/// The wire tag is the camelCase variant name (`appointment`,
/// `analyticsFact`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityClass {
    Appointment,
    Customer,
    Artist,
    Message,
    AnalyticsFact,
}

impl EntityClass {
    pub const ALL: [Self; 5] = [
        Self::Appointment,
        Self::Customer,
        Self::Artist,
        Self::Message,
        Self::AnalyticsFact,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Appointment => "appointment",
            Self::Customer => "customer",
            Self::Artist => "artist",
            Self::Message => "message",
            Self::AnalyticsFact => "analyticsFact",
        }
    }

    pub const fn kind(self) -> ClassKind {
        match self {
            Self::Appointment | Self::Customer | Self::Artist => ClassKind::MutableRecord,
            Self::Message => ClassKind::AppendOnly,
            Self::AnalyticsFact => ClassKind::MergeableAggregate,
        }
    }

    /// Resolve a wire tag. Tags are matched exactly.
    pub fn from_wire(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.as_str() == tag)
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wire(s).ok_or_else(|| format!("unknown entity class `{s}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tags_match_serde_names() {
        for class in EntityClass::ALL {
            let json = serde_json::to_string(&class).unwrap();
            assert_eq!(json, format!("\"{}\"", class.as_str()));
        }
    }

    #[test]
    fn from_wire_is_exact() {
        assert_eq!(
            EntityClass::from_wire("analyticsFact"),
            Some(EntityClass::AnalyticsFact)
        );
        assert_eq!(EntityClass::from_wire("Appointment"), None);
        assert_eq!(EntityClass::from_wire("invoice"), None);
    }

    #[test]
    fn kinds() {
        assert_eq!(EntityClass::Artist.kind(), ClassKind::MutableRecord);
        assert_eq!(EntityClass::Message.kind(), ClassKind::AppendOnly);
        assert_eq!(
            EntityClass::AnalyticsFact.kind(),
            ClassKind::MergeableAggregate
        );
    }

    #[test]
    fn parse_unknown_class_reports_tag() {
        let err = "invoice".parse::<EntityClass>().unwrap_err();
        assert!(err.contains("invoice"));
    }
}
