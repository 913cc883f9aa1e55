//! Transfer-intent extraction from free-text event titles.
//!
//! Three keyword-anchored patterns are tried in order (send, swap,
//! delegate); the first match wins. The patterns are mutually exclusive by
//! construction, so the ordering only matters for documentation. Titles
//! that match nothing yield no intent, which is not an error.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{EventAttendee, IntentKind, TransferIntent};

static SEND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"send\s+(\d+(?:\.\d+)?)\s+(apt|aptos|usdc|usdt)\s+to\s+([a-z0-9]+(?:\.[a-z]+)*|0x[a-f0-9]+)")
        .expect("send pattern")
});

static SWAP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"swap\s+(\d+(?:\.\d+)?)\s+(\w+)\s+(?:to|for)\s+(\w+)").expect("swap pattern")
});

static DELEGATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"delegate\s+(\d+(?:\.\d+)?)\s+(apt|aptos)\s+to\s+([a-z0-9]+(?:\.[a-z]+)*|0x[a-f0-9]+)")
        .expect("delegate pattern")
});

/// Parse a transfer intent out of an event title.
///
/// Pure function of its inputs: the lowercased title is matched against the
/// three patterns, token symbols are uppercased, and approval is required
/// iff the event has at least one attendee.
pub fn parse_intent(
    title: &str,
    start: DateTime<Utc>,
    attendees: &[EventAttendee],
) -> Option<TransferIntent> {
    let title = title.to_lowercase();
    if title.is_empty() {
        return None;
    }

    let requires_approval = !attendees.is_empty();
    let approvers: Vec<String> = attendees.iter().map(|a| a.email.clone()).collect();

    if let Some(m) = SEND.captures(&title) {
        return Some(TransferIntent {
            kind: IntentKind::Send,
            amount: m[1].to_string(),
            token: m[2].to_uppercase(),
            recipient: m[3].to_string(),
            execute_at: start,
            requires_approval,
            approvers,
        });
    }

    if let Some(m) = SWAP.captures(&title) {
        return Some(TransferIntent {
            kind: IntentKind::Swap,
            amount: m[1].to_string(),
            token: m[2].to_uppercase(),
            // Target token of the swap.
            recipient: m[3].to_uppercase(),
            execute_at: start,
            requires_approval,
            approvers,
        });
    }

    if let Some(m) = DELEGATE.captures(&title) {
        return Some(TransferIntent {
            kind: IntentKind::Delegate,
            amount: m[1].to_string(),
            token: m[2].to_uppercase(),
            recipient: m[3].to_string(),
            execute_at: start,
            requires_approval,
            approvers,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn attendee(email: &str) -> EventAttendee {
        EventAttendee {
            email: email.to_string(),
            response_status: None,
        }
    }

    #[test]
    fn parses_send_title() {
        let intent = parse_intent("Send 3.5 APT to 0xabc", start(), &[]).unwrap();
        assert_eq!(intent.kind, IntentKind::Send);
        assert_eq!(intent.amount, "3.5");
        assert_eq!(intent.token, "APT");
        assert_eq!(intent.recipient, "0xabc");
        assert_eq!(intent.execute_at, start());
    }

    #[test]
    fn parses_send_to_alias() {
        let intent = parse_intent("send 10 USDC to alice.apt", start(), &[]).unwrap();
        assert_eq!(intent.token, "USDC");
        assert_eq!(intent.recipient, "alice.apt");
    }

    #[test]
    fn parses_swap_with_target_token_in_recipient() {
        let intent = parse_intent("Swap 2 usdc for apt", start(), &[]).unwrap();
        assert_eq!(intent.kind, IntentKind::Swap);
        assert_eq!(intent.amount, "2");
        assert_eq!(intent.token, "USDC");
        assert_eq!(intent.recipient, "APT");
    }

    #[test]
    fn parses_delegate_title() {
        let intent = parse_intent("Delegate 100 APT to 0xff00", start(), &[]).unwrap();
        assert_eq!(intent.kind, IntentKind::Delegate);
        assert_eq!(intent.recipient, "0xff00");
    }

    #[test]
    fn delegate_rejects_stablecoins() {
        assert!(parse_intent("delegate 100 usdc to 0xff00", start(), &[]).is_none());
    }

    #[test]
    fn non_matching_titles_yield_no_intent() {
        assert!(parse_intent("Lunch with Bob", start(), &[]).is_none());
        assert!(parse_intent("", start(), &[]).is_none());
        assert!(parse_intent("send money to bob", start(), &[]).is_none());
    }

    #[test]
    fn approval_derived_from_attendees() {
        let intent = parse_intent("send 1 apt to 0x1", start(), &[]).unwrap();
        assert!(!intent.requires_approval);
        assert!(intent.approvers.is_empty());

        let attendees = [attendee("a@example.com"), attendee("b@example.com")];
        let intent = parse_intent("send 1 apt to 0x1", start(), &attendees).unwrap();
        assert!(intent.requires_approval);
        assert_eq!(intent.approvers, vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn empty_attendee_email_is_preserved() {
        let attendees = [attendee("")];
        let intent = parse_intent("send 1 apt to 0x1", start(), &attendees).unwrap();
        assert!(intent.requires_approval);
        assert_eq!(intent.approvers, vec![""]);
    }
}
