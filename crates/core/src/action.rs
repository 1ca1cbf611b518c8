//! The fixed set of actions a permission can grant.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GateError;

/// Operation being authorized.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Select,
    Insert,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Select, Action::Insert, Action::Update, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Select => "select",
            Action::Insert => "insert",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "select" => Ok(Action::Select),
            "insert" => Ok(Action::Insert),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            other => Err(GateError::data(format!("unknown action '{other}'"))),
        }
    }
}

/// Per-resource action map as stored in a permission snapshot.
///
/// Keys missing from the stored object deserialize as `false`; a key holding
/// anything other than a boolean is a deserialization error.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionFlags {
    pub select: bool,
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
}

impl ActionFlags {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            select: true,
            insert: true,
            update: true,
            delete: true,
        }
    }

    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Select => self.select,
            Action::Insert => self.insert,
            Action::Update => self.update,
            Action::Delete => self.delete,
        }
    }

    pub fn with(mut self, action: Action) -> Self {
        match action {
            Action::Select => self.select = true,
            Action::Insert => self.insert = true,
            Action::Update => self.update = true,
            Action::Delete => self.delete = true,
        }
        self
    }

    pub fn union(&self, other: &ActionFlags) -> ActionFlags {
        ActionFlags {
            select: self.select || other.select,
            insert: self.insert || other.insert,
            update: self.update || other.update,
            delete: self.delete || other.delete,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.select || self.insert || self.update || self.delete)
    }
}
