use serde::{Deserialize, Serialize};

use crate::domain::{ItemKind, Meta};

/// Result of a validation check or a gated mutation.
///
/// Rejections are ordinary values; `message` is only set when `success` is
/// false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.success
    }
}

/// A caller-requested change routed through the mutation gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MutationRequest {
    Insert {
        kind: ItemKind,
        number: String,
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<Meta>,
    },
    Update {
        kind: ItemKind,
        number: String,
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<Meta>,
    },
    Delete {
        kind: ItemKind,
        number: String,
    },
}

impl MutationRequest {
    pub fn kind(&self) -> ItemKind {
        match self {
            MutationRequest::Insert { kind, .. }
            | MutationRequest::Update { kind, .. }
            | MutationRequest::Delete { kind, .. } => *kind,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MutationRequest::Insert { .. } => "insert",
            MutationRequest::Update { .. } => "update",
            MutationRequest::Delete { .. } => "delete",
        }
    }
}
