//! Google Calendar collaborator.
//!
//! OAuth tokens are obtained through the web consent flow (`/auth` →
//! Google → `/auth/google/callback`) and cached in memory plus a small
//! JSON file so a restart does not force re-authentication. API calls
//! build a `CalendarHub` from the stored refresh token on demand.

use std::path::PathBuf;
use std::sync::RwLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use google_calendar3::api::{Event, EventDateTime};
use google_calendar3::hyper_rustls::HttpsConnector;
use google_calendar3::CalendarHub;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use shared_types::{CalendarEvent, CreatedEvent, EventAttendee};

const OAUTH_CONSENT_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const CALENDAR_SCOPES: &str =
    "https://www.googleapis.com/auth/calendar https://www.googleapis.com/auth/calendar.events";

/// Default duration of events created by the agent, in minutes.
const CREATED_EVENT_DURATION_MINS: i64 = 60;

/// External calendar source consumed by the poll loop and the routes.
#[async_trait]
pub trait EventSource: Send + Sync {
    fn is_authenticated(&self) -> bool;

    /// Upcoming events only, ordered by start time, bounded by
    /// `max_results`.
    async fn upcoming_events(&self, max_results: u32) -> Result<Vec<CalendarEvent>>;

    async fn create_event(
        &self,
        title: &str,
        start: DateTime<Utc>,
        description: Option<&str>,
    ) -> Result<CreatedEvent>;

    /// Append a human-readable result annotation to the event
    /// description. Best-effort; not required to be durable.
    async fn annotate_event(&self, event_id: &str, note: &str) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTokens {
    access_token: String,
    refresh_token: String,
}

pub struct GoogleCalendarService {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    calendar_id: String,
    token_path: PathBuf,
    tokens: RwLock<Option<StoredTokens>>,
    http: reqwest::Client,
}

impl GoogleCalendarService {
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GOOGLE_CLIENT_ID")
            .context("GOOGLE_CLIENT_ID environment variable must be set")?;
        let client_secret = std::env::var("GOOGLE_CLIENT_SECRET")
            .context("GOOGLE_CLIENT_SECRET environment variable must be set")?;
        let redirect_uri = std::env::var("GOOGLE_REDIRECT_URI")
            .unwrap_or_else(|_| "http://localhost:3001/auth/google/callback".to_string());
        let calendar_id = std::env::var("CALENDAR_ID").unwrap_or_else(|_| "primary".to_string());
        let token_path = std::env::var("TOKEN_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("tokens.json"));

        let service = Self {
            client_id,
            client_secret,
            redirect_uri,
            calendar_id,
            token_path,
            tokens: RwLock::new(None),
            http: reqwest::Client::new(),
        };
        service.load_stored_tokens();

        Ok(service)
    }

    fn load_stored_tokens(&self) {
        match std::fs::read_to_string(&self.token_path) {
            Ok(raw) => match serde_json::from_str::<StoredTokens>(&raw) {
                Ok(tokens) => {
                    tracing::info!("Loaded stored Google Calendar tokens");
                    self.set_tokens(tokens);
                }
                Err(e) => {
                    tracing::warn!("Ignoring malformed token file: {}", e);
                }
            },
            Err(_) => {
                tracing::debug!("No stored tokens at {:?}, authentication required", self.token_path);
            }
        }
    }

    fn current_tokens(&self) -> Option<StoredTokens> {
        self.tokens.read().ok().and_then(|guard| guard.clone())
    }

    fn set_tokens(&self, tokens: StoredTokens) {
        if let Ok(mut guard) = self.tokens.write() {
            *guard = Some(tokens);
        }
    }

    /// Build the Google consent URL for the calendar scopes.
    pub fn auth_url(&self) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            OAUTH_CONSENT_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(CALENDAR_SCOPES),
        )
    }

    /// Exchange an authorization code for tokens and persist them.
    pub async fn exchange_code(&self, code: &str) -> Result<()> {
        #[derive(Serialize)]
        struct TokenRequest<'a> {
            code: &'a str,
            client_id: &'a str,
            client_secret: &'a str,
            redirect_uri: &'a str,
            grant_type: &'a str,
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            refresh_token: Option<String>,
        }

        let response: TokenResponse = self
            .http
            .post(OAUTH_TOKEN_URL)
            .form(&TokenRequest {
                code,
                client_id: &self.client_id,
                client_secret: &self.client_secret,
                redirect_uri: &self.redirect_uri,
                grant_type: "authorization_code",
            })
            .send()
            .await
            .context("Token exchange request failed")?
            .error_for_status()
            .context("Token endpoint rejected the authorization code")?
            .json()
            .await
            .context("Invalid token response")?;

        let refresh_token = response
            .refresh_token
            .context("No refresh token granted; re-run consent with prompt=consent")?;

        let tokens = StoredTokens {
            access_token: response.access_token,
            refresh_token,
        };

        if let Err(e) = tokio::fs::write(&self.token_path, serde_json::to_string(&tokens)?).await {
            tracing::warn!("Failed to persist tokens to {:?}: {}", self.token_path, e);
        }
        self.set_tokens(tokens);
        tracing::info!("Google Calendar authentication complete");

        Ok(())
    }

    /// Build a calendar hub from the stored refresh token.
    async fn hub(&self) -> Result<CalendarHub<HttpsConnector<HttpConnector>>> {
        let tokens = self
            .current_tokens()
            .context("Not authenticated with Google Calendar")?;

        let secret = google_calendar3::yup_oauth2::authorized_user::AuthorizedUserSecret {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            refresh_token: tokens.refresh_token,
            key_type: "authorized_user".to_string(),
        };

        let auth = google_calendar3::yup_oauth2::AuthorizedUserAuthenticator::builder(secret)
            .build()
            .await
            .context("Failed to build authenticator from refresh token")?;

        let connector = google_calendar3::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .context("Failed to load native TLS roots")?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Ok(CalendarHub::new(client, auth))
    }

    fn normalize(event: Event) -> CalendarEvent {
        let start = event.start.as_ref().and_then(event_start_time);

        let attendees = event
            .attendees
            .unwrap_or_default()
            .into_iter()
            .map(|a| EventAttendee {
                email: a.email.unwrap_or_default(),
                response_status: a.response_status,
            })
            .collect();

        CalendarEvent {
            id: event.id.unwrap_or_default(),
            title: event.summary,
            description: event.description,
            start,
            attendees,
        }
    }
}

/// Start timestamp of an event; all-day events resolve to UTC midnight.
fn event_start_time(start: &EventDateTime) -> Option<DateTime<Utc>> {
    if let Some(dt) = start.date_time {
        return Some(dt);
    }
    start
        .date
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[async_trait]
impl EventSource for GoogleCalendarService {
    fn is_authenticated(&self) -> bool {
        self.current_tokens().is_some()
    }

    async fn upcoming_events(&self, max_results: u32) -> Result<Vec<CalendarEvent>> {
        let hub = self.hub().await?;

        let (_, listing) = hub
            .events()
            .list(&self.calendar_id)
            .time_min(Utc::now())
            .max_results(max_results as i32)
            .single_events(true)
            .order_by("startTime")
            .doit()
            .await
            .context("Failed to list calendar events")?;

        Ok(listing
            .items
            .unwrap_or_default()
            .into_iter()
            .map(Self::normalize)
            .collect())
    }

    async fn create_event(
        &self,
        title: &str,
        start: DateTime<Utc>,
        description: Option<&str>,
    ) -> Result<CreatedEvent> {
        let hub = self.hub().await?;
        let end = start + Duration::minutes(CREATED_EVENT_DURATION_MINS);

        let event = Event {
            summary: Some(title.to_string()),
            description: description.map(str::to_string),
            start: Some(EventDateTime {
                date_time: Some(start),
                ..Default::default()
            }),
            end: Some(EventDateTime {
                date_time: Some(end),
                ..Default::default()
            }),
            ..Default::default()
        };

        let (_, created) = hub
            .events()
            .insert(event, &self.calendar_id)
            .doit()
            .await
            .context("Failed to create calendar event")?;

        tracing::info!("Created calendar event: {} ({:?})", title, created.id);

        Ok(CreatedEvent {
            event_id: created.id.unwrap_or_default(),
            event_url: created.html_link.unwrap_or_default(),
        })
    }

    async fn annotate_event(&self, event_id: &str, note: &str) -> Result<()> {
        let hub = self.hub().await?;

        let (_, existing) = hub
            .events()
            .get(&self.calendar_id, event_id)
            .doit()
            .await
            .context("Failed to fetch event for annotation")?;

        let previous = existing.description.unwrap_or_default();
        let description = format!("{}\n\n--- CalendeFi Result ---\n{}", previous, note);

        let patch = Event {
            description: Some(description),
            ..Default::default()
        };

        hub.events()
            .patch(patch, &self.calendar_id, event_id)
            .doit()
            .await
            .context("Failed to update event description")?;

        Ok(())
    }
}
