use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What happens to a user turn whose reply failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Leave it in the transcript and replay it as history next time
    #[default]
    Keep,
    /// Remove it from the transcript
    Drop,
    /// Leave it visible but never replay it
    Skip,
}

/// How sessions are obtained for each turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayMode {
    /// Open a new session every turn and replay the whole transcript
    #[default]
    Fresh,
    /// Keep one session while the instruction and transcript line up with
    /// it; fall back to a full replay otherwise
    Persistent,
}

impl FromStr for OrphanPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "drop" | "remove" => Ok(Self::Drop),
            "skip" | "mark" => Ok(Self::Skip),
            other => Err(format!(
                "unknown orphan policy '{}' (expected keep, drop or skip)",
                other
            )),
        }
    }
}

impl fmt::Display for OrphanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Keep => "keep",
            Self::Drop => "drop",
            Self::Skip => "skip",
        })
    }
}

impl FromStr for ReplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fresh" => Ok(Self::Fresh),
            "persistent" | "cached" => Ok(Self::Persistent),
            other => Err(format!(
                "unknown replay mode '{}' (expected fresh or persistent)",
                other
            )),
        }
    }
}

impl fmt::Display for ReplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fresh => "fresh",
            Self::Persistent => "persistent",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("keep".parse::<OrphanPolicy>(), Ok(OrphanPolicy::Keep));
        assert_eq!("DROP".parse::<OrphanPolicy>(), Ok(OrphanPolicy::Drop));
        assert_eq!("mark".parse::<OrphanPolicy>(), Ok(OrphanPolicy::Skip));
        assert!("retry".parse::<OrphanPolicy>().is_err());

        assert_eq!("persistent".parse::<ReplayMode>(), Ok(ReplayMode::Persistent));
        assert!("lazy".parse::<ReplayMode>().is_err());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(OrphanPolicy::default(), OrphanPolicy::Keep);
        assert_eq!(ReplayMode::default(), ReplayMode::Fresh);
    }
}
