/// Approval-code validation outcomes
///
/// Signup failures send the user to an explanation screen keyed by the
/// error kind, so each kind carries its own copy and a distinct next step.

use crate::models::access_request::{AccessRequest, RequestStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an approval code was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CodeErrorKind {
    /// No code was supplied
    CodeMissing,

    /// No request carries this code
    CodeInvalid,

    /// The request exists but is not approved (pending, rejected or cancelled)
    NotApproved,

    /// The code was already redeemed
    CodeUsed,

    /// The email does not match the request's contact email
    EmailMismatch,

    /// Storage failed; safe to retry
    ValidationError,
}

/// What the user should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remedy {
    EnterCode,
    RequestNewAccess,
    ContactSupport,
    Retry,
}

impl CodeErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeErrorKind::CodeMissing => "CODE_MISSING",
            CodeErrorKind::CodeInvalid => "CODE_INVALID",
            CodeErrorKind::NotApproved => "NOT_APPROVED",
            CodeErrorKind::CodeUsed => "CODE_USED",
            CodeErrorKind::EmailMismatch => "EMAIL_MISMATCH",
            CodeErrorKind::ValidationError => "VALIDATION_ERROR",
        }
    }

    /// User-facing explanation
    pub fn message(&self) -> &'static str {
        match self {
            CodeErrorKind::CodeMissing => {
                "Enter the approval code from your invitation email to continue."
            }
            CodeErrorKind::CodeInvalid => {
                "We couldn't find that approval code. Check it for typos or request access again."
            }
            CodeErrorKind::NotApproved => {
                "This code is not active. Your request may have been declined or your access withdrawn; request access again."
            }
            CodeErrorKind::CodeUsed => {
                "This approval code has already been used to create an account. Contact support if that wasn't you."
            }
            CodeErrorKind::EmailMismatch => {
                "This code was issued to a different email address. Sign up with the email you applied with or contact support."
            }
            CodeErrorKind::ValidationError => {
                "We couldn't verify your code right now. Please try again in a moment."
            }
        }
    }

    pub fn remedy(&self) -> Remedy {
        match self {
            CodeErrorKind::CodeMissing => Remedy::EnterCode,
            CodeErrorKind::CodeInvalid | CodeErrorKind::NotApproved => Remedy::RequestNewAccess,
            CodeErrorKind::CodeUsed | CodeErrorKind::EmailMismatch => Remedy::ContactSupport,
            CodeErrorKind::ValidationError => Remedy::Retry,
        }
    }

    /// Whether the same input may succeed later
    pub fn is_retryable(&self) -> bool {
        matches!(self, CodeErrorKind::ValidationError)
    }
}

impl fmt::Display for CodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected code with its user-facing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRejection {
    pub error: CodeErrorKind,
    pub message: String,
}

impl From<CodeErrorKind> for CodeRejection {
    fn from(kind: CodeErrorKind) -> Self {
        Self {
            error: kind,
            message: kind.message().to_string(),
        }
    }
}

/// Outcome of checking a code against an email
#[derive(Debug, Clone, PartialEq)]
pub enum CodeValidation {
    Valid(AccessRequest),
    Invalid(CodeRejection),
}

impl CodeValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, CodeValidation::Valid(_))
    }

    /// The rejection kind, if any
    pub fn error(&self) -> Option<CodeErrorKind> {
        match self {
            CodeValidation::Valid(_) => None,
            CodeValidation::Invalid(rejection) => Some(rejection.error),
        }
    }
}

impl From<CodeErrorKind> for CodeValidation {
    fn from(kind: CodeErrorKind) -> Self {
        CodeValidation::Invalid(kind.into())
    }
}

/// Case-insensitive, whitespace-trimmed email comparison
pub fn emails_match(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Applies the checks that follow a code lookup, in precedence order:
/// not found, not approved, already used, email mismatch
pub fn evaluate_code(found: Option<AccessRequest>, email: &str) -> CodeValidation {
    let Some(request) = found else {
        return CodeErrorKind::CodeInvalid.into();
    };

    if request.status != RequestStatus::Approved {
        return CodeErrorKind::NotApproved.into();
    }

    if request.code_used {
        return CodeErrorKind::CodeUsed.into();
    }

    if !emails_match(&request.contact_email, email) {
        return CodeErrorKind::EmailMismatch.into();
    }

    CodeValidation::Valid(request)
}
