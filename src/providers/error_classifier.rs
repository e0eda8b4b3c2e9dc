//! # Provider Error Classification
//!
//! Maps provider-specific error codes into the closed [`ProviderErrorKind`]
//! taxonomy, once, at the provider boundary. Everything above the boundary
//! matches on kinds, never on code strings.
//!
//! ## Usage
//!
//! ```rust
//! use recorder_pipeline::providers::{classify, ProviderError, ProviderErrorKind};
//!
//! let error = ProviderError::from_code(
//!     "PutConfigurationRecorder",
//!     "MaxNumberOfConfigurationRecordersExceededException",
//!     "limit reached",
//! );
//! assert_eq!(error.kind, ProviderErrorKind::InvalidRequest);
//!
//! let classification = classify(&error);
//! assert!(!classification.is_transient);
//! assert!(classification.remediation.is_some());
//! ```

use super::{ProviderError, ProviderErrorKind};
use serde::{Deserialize, Serialize};

const ALREADY_EXISTS_CODES: &[&str] = &[
    "EntityAlreadyExists",
    "EntityAlreadyExistsException",
    "ResourceInUseException",
    "ResourceAlreadyExistsException",
    "AlreadyExists",
];

const TRANSIENT_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "RequestTimeout",
    "RequestTimeoutException",
    "ServiceUnavailable",
    "ServiceUnavailableException",
    "ServiceFailure",
    "InternalFailure",
    "InternalError",
    "InternalServerError",
    "DispatchFailure",
    "TimeoutError",
];

const PERMISSION_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "UnrecognizedClientException",
    "InvalidClientTokenId",
    "ExpiredToken",
    "ExpiredTokenException",
    "InsufficientDeliveryPolicyException",
];

const NOT_FOUND_CODES: &[&str] = &[
    "NoSuchEntity",
    "NoSuchEntityException",
    "NoSuchConfigurationRecorderException",
    "NoSuchDeliveryChannelException",
    "ResourceNotFoundException",
];

const INVALID_REQUEST_CODES: &[&str] = &[
    "MaxNumberOfConfigurationRecordersExceededException",
    "MaxNumberOfDeliveryChannelsExceededException",
    "InvalidRoleException",
    "InvalidRecordingGroupException",
    "InvalidDeliveryChannelNameException",
    "InvalidS3KeyPrefixException",
    "InvalidSNSTopicARNException",
    "NoSuchBucketException",
    "NoAvailableConfigurationRecorderException",
    "LimitExceeded",
    "LimitExceededException",
    "InvalidArgumentException",
    "InvalidParameterValueException",
    "InvalidInput",
    "MalformedPolicyDocument",
    "ValidationError",
    "ValidationException",
];

/// Result of classifying a provider error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub kind: ProviderErrorKind,
    /// A caller-level retry of the whole run may succeed
    pub is_transient: bool,
    pub error_code: String,
    /// Suggested operator action, when one is known
    pub remediation: Option<String>,
}

/// Map a provider error code to its kind
pub fn classify_error_code(code: &str) -> ProviderErrorKind {
    if ALREADY_EXISTS_CODES.contains(&code) {
        ProviderErrorKind::AlreadyExists
    } else if TRANSIENT_CODES.contains(&code) {
        ProviderErrorKind::Transient
    } else if PERMISSION_DENIED_CODES.contains(&code) {
        ProviderErrorKind::PermissionDenied
    } else if NOT_FOUND_CODES.contains(&code) {
        ProviderErrorKind::NotFound
    } else if INVALID_REQUEST_CODES.contains(&code) {
        ProviderErrorKind::InvalidRequest
    } else {
        ProviderErrorKind::Unknown
    }
}

/// Classify an already-constructed provider error and attach remediation hints
pub fn classify(error: &ProviderError) -> ErrorClassification {
    ErrorClassification {
        kind: error.kind,
        is_transient: error.kind == ProviderErrorKind::Transient,
        error_code: error.code.clone(),
        remediation: remediation_for(error.kind, &error.code),
    }
}

fn remediation_for(kind: ProviderErrorKind, code: &str) -> Option<String> {
    let hint = match (kind, code) {
        (_, "MaxNumberOfConfigurationRecordersExceededException") => {
            "A recorder with a different name already exists in this region; reuse or delete it"
        }
        (_, "InvalidRoleException") => {
            "Check that the recorder role exists and trusts the recording service"
        }
        (_, "NoSuchBucketException") => "Create the snapshot bucket before binding the channel",
        (_, "InsufficientDeliveryPolicyException") => {
            "Grant the recorder role write access to the snapshot bucket"
        }
        (_, "NoAvailableConfigurationRecorderException") => {
            "Activate the recorder in this region before binding its channel"
        }
        (ProviderErrorKind::Transient, _) => "Transient provider failure; re-run the pipeline",
        (ProviderErrorKind::PermissionDenied, _) => {
            "Grant the calling identity permission for this operation"
        }
        (ProviderErrorKind::NotFound, _) => "A prerequisite resource is missing",
        _ => return None,
    };
    Some(hint.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_table_coverage() {
        assert_eq!(
            classify_error_code("EntityAlreadyExists"),
            ProviderErrorKind::AlreadyExists
        );
        assert_eq!(
            classify_error_code("ResourceInUseException"),
            ProviderErrorKind::AlreadyExists
        );
        assert_eq!(
            classify_error_code("ThrottlingException"),
            ProviderErrorKind::Transient
        );
        assert_eq!(
            classify_error_code("AccessDeniedException"),
            ProviderErrorKind::PermissionDenied
        );
        assert_eq!(
            classify_error_code("NoSuchConfigurationRecorderException"),
            ProviderErrorKind::NotFound
        );
        assert_eq!(
            classify_error_code("InvalidRoleException"),
            ProviderErrorKind::InvalidRequest
        );
        assert_eq!(classify_error_code("Teapot"), ProviderErrorKind::Unknown);
    }

    #[test]
    fn test_remediation_hints() {
        let err = ProviderError::from_code("StartRecorder", "ThrottlingException", "slow");
        let classification = classify(&err);
        assert!(classification.is_transient);
        assert!(classification.remediation.unwrap().contains("re-run"));

        let err = ProviderError::from_code("PutRecorder", "Teapot", "?");
        assert_eq!(classify(&err).remediation, None);
    }
}
