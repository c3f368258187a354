use crate::commands::types::DownloadedFile;
use crate::error::CommandError;

use serde::{Deserialize, Serialize};

/// Reason code for a wait that ran out of budget.
pub const ERROR_TIMEOUT: &str = "TIMEOUT";

/// Structured outcome handed back to the request layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl OperationResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error_code: None,
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error_code: Some(code.to_string()),
        }
    }

    pub fn timeout(operation: &str) -> Self {
        Self::error(
            ERROR_TIMEOUT,
            format!("{} did not finish in time; its outcome is unknown", operation),
        )
    }

    /// Failure response for `error`, with a message safe to show to clients.
    pub fn from_error(error: &CommandError) -> Self {
        let message = match error {
            CommandError::Validation(detail) => format!("Invalid input: {}", detail),
            CommandError::PermissionDenied(detail) => format!("Permission denied: {}", detail),
            CommandError::NotFound(detail) => format!("Not found: {}", detail),
            CommandError::NoNodesAvailable => "No storage nodes available".to_string(),
            CommandError::TotalFailure { operation, .. } => {
                format!("The {} could not be completed on any storage node", operation)
            }
            CommandError::Metadata(_) => {
                "The metadata store could not complete the request".to_string()
            }
            CommandError::QueueClosed => "The service is shutting down".to_string(),
            CommandError::Aborted => "The operation was interrupted".to_string(),
        };
        Self::error(error.code(), message)
    }

    pub fn code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }
}

/// Convenience alias for service calls that hand back a value.
pub type ServiceResult<T> = Result<T, OperationResponse>;

/// A downloaded file as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileDto {
    pub name: String,
    pub content: Vec<u8>,
}

impl From<DownloadedFile> for FileDto {
    fn from(file: DownloadedFile) -> Self {
        Self {
            name: file.name,
            content: file.content,
        }
    }
}

impl FileDto {
    pub fn placeholder() -> Self {
        DownloadedFile::placeholder().into()
    }
}
