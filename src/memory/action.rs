use crate::error::{MemoryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of rows in the last-action embedding table.
pub const NUM_ACTION_CATEGORIES: usize = 4;

/// Memory actions taken for a mention.
///
/// `Start` only marks "no previous action" for the first mention of a
/// document and is never a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Coref,
    Overwrite,
    Ignore,
    Start,
}

impl Action {
    /// Row of this action in the last-action embedding table
    pub fn index(self) -> usize {
        match self {
            Action::Coref => 0,
            Action::Overwrite => 1,
            Action::Ignore => 2,
            Action::Start => 3,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Action::Coref => "c",
            Action::Overwrite => "o",
            Action::Ignore => "i",
            Action::Start => "<s>",
        }
    }

    pub fn is_decision(self) -> bool {
        self != Action::Start
    }
}

impl FromStr for Action {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "c" | "coref" => Ok(Action::Coref),
            "o" | "overwrite" => Ok(Action::Overwrite),
            "i" | "ignore" => Ok(Action::Ignore),
            "<s>" | "start" => Ok(Action::Start),
            other => Err(MemoryError::UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
