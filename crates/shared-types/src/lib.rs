//! Domain types shared between the agent's collaborators and its HTTP
//! surface. Everything here is plain data: no I/O, no side effects.

pub mod intent;
pub mod window;

pub use intent::parse_intent;
pub use window::Schedule;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attendee on a calendar event. Attendees double as approvers for
/// transfers parsed out of the event title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttendee {
    pub email: String,
    /// Google RSVP status: "needsAction", "declined", "tentative", "accepted"
    pub response_status: Option<String>,
}

/// Normalized, read-only view of a Google Calendar event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub attendees: Vec<EventAttendee>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    Send,
    Swap,
    Delegate,
}

impl IntentKind {
    pub fn as_str(&self) -> &str {
        match self {
            IntentKind::Send => "send",
            IntentKind::Swap => "swap",
            IntentKind::Delegate => "delegate",
        }
    }
}

/// A structured transfer instruction derived from an event title.
///
/// Intents are derived fresh on every poll tick and never persisted;
/// parsing the same event twice yields the same intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferIntent {
    pub kind: IntentKind,
    /// Decimal amount exactly as written in the title, e.g. "3.5".
    pub amount: String,
    /// Token symbol, uppercased.
    pub token: String,
    /// Destination address or alias. For swaps this holds the target
    /// token symbol, uppercased.
    pub recipient: String,
    pub execute_at: DateTime<Utc>,
    /// True iff the event has at least one attendee.
    pub requires_approval: bool,
    pub approvers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletInfo {
    pub address: String,
    pub balance: String,
    pub network: String,
    pub explorer_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedEvent {
    pub event_id: String,
    pub event_url: String,
}
