/// Access requests
///
/// A prospective agency submits a request; a platform admin approves or
/// rejects it. Approval issues a single-use `TP-XXXXXX` code that the agency
/// redeems at signup. Access can later be withdrawn by cancelling the
/// request, which also revokes the agency's beta entitlement.
///
/// - `code`: approval and group code generation
/// - `lifecycle`: legal status edges
/// - `validation`: code checks and user-facing error kinds
/// - `service`: the operations, backed by a [`crate::store::Store`]
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use travelpanel_shared::access::AccessService;
/// use travelpanel_shared::models::access_request::NewAccessRequest;
/// use travelpanel_shared::store::MemoryStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let access = AccessService::new(Arc::new(MemoryStore::new()));
///
/// let request = access
///     .submit_request(NewAccessRequest {
///         agency_name: "Acme Travel".to_string(),
///         contact_email: "a@acme.com".to_string(),
///         phone_number: None,
///         group_type: None,
///         message: None,
///     })
///     .await?;
///
/// let approved = access.approve(request.id, "ops@travelpanel.io").await?;
/// let code = approved.approval_code.unwrap();
/// assert!(access.validate_approval_code(&code, "a@acme.com").await.is_valid());
/// # Ok(())
/// # }
/// ```

pub mod code;
pub mod error;
pub mod lifecycle;
pub mod service;
pub mod validation;

pub use error::AccessError;
pub use service::{signup_link, AccessService, RequestEvent, RequestEventKind};
pub use validation::{CodeErrorKind, CodeRejection, CodeValidation, Remedy};
