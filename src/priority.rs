use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority requested for a work plan, forwarded to the execution system
/// with every job. Higher values are processed first downstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Standard = 0,
    High = 1,
}

impl Priority {
    /// Parse the priority names used in request forms; unknown names fall back to standard
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "high" => Priority::High,
            _ => Priority::Standard,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Standard => "standard",
            Priority::High => "high",
        }
    }

    /// Get the numeric priority value
    pub fn value(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_from_name() {
        assert_eq!(Priority::from_name("high"), Priority::High);
        assert_eq!(Priority::from_name("  HIGH "), Priority::High);
        assert_eq!(Priority::from_name("standard"), Priority::Standard);
        assert_eq!(Priority::from_name("urgent"), Priority::Standard);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Standard);
        assert_eq!(Priority::default(), Priority::Standard);
        assert_eq!(Priority::High.value(), 1);
    }

    #[test]
    fn test_priority_serializes_as_snake_case() {
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");
    }
}
