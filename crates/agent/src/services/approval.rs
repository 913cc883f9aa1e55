//! Approval gating for attendee-backed transfers.

use anyhow::Result;
use async_trait::async_trait;
use shared_types::CalendarEvent;

/// Approval-check collaborator consulted before executing a transfer
/// whose event has attendees.
#[async_trait]
pub trait ApprovalPolicy: Send + Sync {
    async fn is_approved(&self, event: &CalendarEvent, approvers: &[String]) -> Result<bool>;
}

/// Deterministic approval based on attendee RSVPs: a gated transfer is
/// approved once every approver has accepted the event invitation.
/// Transfers without approvers are always approved.
pub struct RsvpApprovalPolicy;

#[async_trait]
impl ApprovalPolicy for RsvpApprovalPolicy {
    async fn is_approved(&self, event: &CalendarEvent, approvers: &[String]) -> Result<bool> {
        if approvers.is_empty() {
            return Ok(true);
        }

        Ok(event
            .attendees
            .iter()
            .all(|a| a.response_status.as_deref() == Some("accepted")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::EventAttendee;

    fn event_with(statuses: &[Option<&str>]) -> CalendarEvent {
        CalendarEvent {
            id: "evt".to_string(),
            attendees: statuses
                .iter()
                .enumerate()
                .map(|(i, s)| EventAttendee {
                    email: format!("approver{i}@example.com"),
                    response_status: s.map(str::to_string),
                })
                .collect(),
            ..Default::default()
        }
    }

    fn approvers(event: &CalendarEvent) -> Vec<String> {
        event.attendees.iter().map(|a| a.email.clone()).collect()
    }

    #[tokio::test]
    async fn zero_approvers_is_approved() {
        let event = event_with(&[]);
        assert!(RsvpApprovalPolicy.is_approved(&event, &[]).await.unwrap());
    }

    #[tokio::test]
    async fn all_accepted_is_approved() {
        let event = event_with(&[Some("accepted"), Some("accepted")]);
        let approvers = approvers(&event);
        assert!(RsvpApprovalPolicy.is_approved(&event, &approvers).await.unwrap());
    }

    #[tokio::test]
    async fn pending_rsvp_blocks_approval() {
        let event = event_with(&[Some("accepted"), Some("needsAction")]);
        let approvers = approvers(&event);
        assert!(!RsvpApprovalPolicy.is_approved(&event, &approvers).await.unwrap());
    }

    #[tokio::test]
    async fn declined_rsvp_blocks_approval() {
        let event = event_with(&[Some("declined")]);
        let approvers = approvers(&event);
        assert!(!RsvpApprovalPolicy.is_approved(&event, &approvers).await.unwrap());
    }
}
