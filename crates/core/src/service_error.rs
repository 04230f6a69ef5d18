//! Structured error bodies returned by the services.

use serde::{Deserialize, Serialize};

/// `{ code, message, target?, details? }` as sent by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceErrorBody {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ServiceErrorBody>,
}

impl ServiceErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            target: None,
            details: Vec::new(),
        }
    }
}

impl core::fmt::Display for ServiceErrorBody {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(target) = &self.target {
            write!(f, " (target: {target})")?;
        }
        for detail in &self.details {
            write!(f, "; {detail}")?;
        }
        Ok(())
    }
}

/// Wire envelope: `{ "error": { ... } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ServiceErrorBody,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_flattens_details() {
        let body: ErrorEnvelope = serde_json::from_str(
            r#"{"error":{"code":"InvalidJobRequest","message":"bad spec","target":"inputs",
                "details":[{"code":"MissingInput","message":"scene is required"}]}}"#,
        )
        .unwrap();

        assert_eq!(
            body.error.to_string(),
            "InvalidJobRequest: bad spec (target: inputs); MissingInput: scene is required"
        );
    }

    #[test]
    fn code_is_required() {
        assert!(serde_json::from_str::<ErrorEnvelope>(r#"{"error":{"message":"x"}}"#).is_err());
    }
}
