//! Structured commands decoded from model output.

use serde_json::{Map, Value};

/// One decoded model command.
///
/// `Do` carries the action name and its named parameters; `Finish` ends the
/// task with an optional user-facing message. These are the only two kinds
/// the decoder produces; anything else in model output is a decode error.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Do {
        /// Action name from the `action=` argument. `None` when the model
        /// omitted it; the dispatcher reports that as a failed action.
        action: Option<String>,
        params: Map<String, Value>,
    },
    Finish {
        message: Option<String>,
    },
}

impl Command {
    /// Build a `Do` command programmatically.
    pub fn action(name: &str, params: &[(&str, Value)]) -> Self {
        let mut map = Map::new();
        for (key, value) in params {
            map.insert((*key).to_string(), value.clone());
        }
        Self::Do {
            action: Some(name.to_string()),
            params: map,
        }
    }

    /// Build a `Finish` command programmatically.
    pub fn finish(message: Option<&str>) -> Self {
        Self::Finish {
            message: message.map(|m| m.to_string()),
        }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, Self::Finish { .. })
    }

    /// Action name for `Do` commands, `"finish"` for `Finish`.
    pub fn kind(&self) -> &str {
        match self {
            Self::Do { action, .. } => action.as_deref().unwrap_or("unknown"),
            Self::Finish { .. } => "finish",
        }
    }

    /// Look up a named parameter of a `Do` command.
    pub fn param(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Do { params, .. } => params.get(name),
            Self::Finish { .. } => None,
        }
    }
}
