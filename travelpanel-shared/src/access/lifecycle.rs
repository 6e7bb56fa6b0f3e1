/// Pure status transition rules
///
/// ```text
/// pending ──approve──▶ approved ──cancel──▶ cancelled
///    │
///    └──reject──▶ rejected
/// ```
///
/// `rejected` and `cancelled` are terminal. Code redemption is not a status
/// change: it flips `code_used` on an `approved` request.

use super::error::AccessError;
use crate::models::access_request::{AccessRequest, RequestStatus};

impl RequestStatus {
    /// Whether `self -> next` is one of the three legal edges
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::Pending, RequestStatus::Approved)
                | (RequestStatus::Pending, RequestStatus::Rejected)
                | (RequestStatus::Approved, RequestStatus::Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Rejected | RequestStatus::Cancelled)
    }

    /// Operation name that moves a request into this status
    pub fn action(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "reopen",
            RequestStatus::Approved => "approve",
            RequestStatus::Rejected => "reject",
            RequestStatus::Cancelled => "cancel",
        }
    }
}

impl AccessRequest {
    /// Checks that the request may move to `next`
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` for any edge other than the three legal ones.
    pub fn check_transition(&self, next: RequestStatus) -> Result<(), AccessError> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(AccessError::InvalidState {
                from: self.status,
                action: next.action(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::access_request::NewAccessRequest;

    const ALL: [RequestStatus; 4] = [
        RequestStatus::Pending,
        RequestStatus::Approved,
        RequestStatus::Rejected,
        RequestStatus::Cancelled,
    ];

    #[test]
    fn test_only_three_edges_are_legal() {
        let legal: Vec<(RequestStatus, RequestStatus)> = ALL
            .iter()
            .flat_map(|from| ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();

        assert_eq!(
            legal,
            vec![
                (RequestStatus::Pending, RequestStatus::Approved),
                (RequestStatus::Pending, RequestStatus::Rejected),
                (RequestStatus::Approved, RequestStatus::Cancelled),
            ]
        );
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for status in ALL.iter().filter(|s| s.is_terminal()) {
            assert!(ALL.iter().all(|next| !status.can_transition_to(*next)));
        }
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::Approved.is_terminal());
    }

    #[test]
    fn test_check_transition_reports_action() {
        let mut request = AccessRequest::pending(NewAccessRequest {
            agency_name: "Acme Travel".to_string(),
            contact_email: "a@acme.com".to_string(),
            phone_number: None,
            group_type: None,
            message: None,
        });
        assert!(request.check_transition(RequestStatus::Approved).is_ok());

        request.status = RequestStatus::Rejected;
        let err = request.check_transition(RequestStatus::Approved).unwrap_err();
        assert!(matches!(
            err,
            AccessError::InvalidState {
                from: RequestStatus::Rejected,
                action: "approve"
            }
        ));
        assert_eq!(err.to_string(), "Cannot approve: request is rejected");
    }
}
