use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    ToolContext, ToolDefinition, ToolError, ToolFuture, ToolHandler, ToolServices,
    decode_arguments, parameters_schema,
};
use crate::repos::{Event, EventSearch};

pub const DEFAULT_EVENT_SEARCH_LIMIT: u32 = 10;
pub const MAX_EVENT_SEARCH_LIMIT: u32 = 20;
const CONTACT_SCAN_LIMIT: u32 = 5;

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct SearchEventsArguments {
    /// Keyword matched against event title, description and category.
    pub query: Option<String>,
    /// Only include events on or after this date (YYYY-MM-DD).
    pub date_from: Option<String>,
    /// Maximum number of events to return; values above 20 are reduced to 20.
    #[schemars(range(min = 1))]
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EventDetailsArguments {
    /// Event title or keyword.
    pub event_title: String,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct NoArguments {}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct VolunteerContactArguments {
    /// Reference to the event: "next event", "that event", or an event name from the conversation.
    pub event_reference: Option<String>,
}

pub(super) fn search_events_tool(services: &ToolServices) -> Result<ToolDefinition, ToolError> {
    ToolDefinition::new(
        "search_events",
        "List upcoming mosque events with optional keyword and date filters.",
        parameters_schema::<SearchEventsArguments>(),
        Arc::new(SearchEvents {
            services: services.clone(),
        }),
    )
}

pub(super) fn get_event_details_tool(services: &ToolServices) -> Result<ToolDefinition, ToolError> {
    ToolDefinition::new(
        "get_event_details",
        "Fetch a single upcoming or current event by title or partial title.",
        parameters_schema::<EventDetailsArguments>(),
        Arc::new(GetEventDetails {
            services: services.clone(),
        }),
    )
}

pub(super) fn search_volunteer_opportunities_tool(
    services: &ToolServices,
) -> Result<ToolDefinition, ToolError> {
    ToolDefinition::new(
        "search_volunteer_opportunities",
        "Return upcoming events that still need volunteers.",
        parameters_schema::<NoArguments>(),
        Arc::new(SearchVolunteerOpportunities {
            services: services.clone(),
        }),
    )
}

pub(super) fn find_volunteer_contact_tool(
    services: &ToolServices,
) -> Result<ToolDefinition, ToolError> {
    ToolDefinition::new(
        "find_volunteer_contact_for_recent_event",
        "Find who to contact about volunteering for the event most recently discussed. \
         Use for follow-ups such as 'who can I contact to volunteer for that event'.",
        parameters_schema::<VolunteerContactArguments>(),
        Arc::new(FindVolunteerContact {
            services: services.clone(),
        }),
    )
}

pub struct SearchEvents {
    services: ToolServices,
}

impl ToolHandler for SearchEvents {
    fn call<'a>(&'a self, arguments: Value, context: &'a ToolContext) -> ToolFuture<'a> {
        Box::pin(async move {
            let arguments: SearchEventsArguments =
                match decode_arguments("search_events", arguments) {
                    Ok(arguments) => arguments,
                    Err(payload) => return payload,
                };

            let search = EventSearch {
                query: arguments.query,
                on_or_after: iso_date(context),
                date_from: arguments.date_from,
                limit: clamp_search_limit(arguments.limit),
            };
            let events = self
                .services
                .storage("search_events", self.services.store.search_events(&search))
                .await
                .unwrap_or_default();

            json!({ "count": events.len(), "events": events })
        })
    }
}

pub struct GetEventDetails {
    services: ToolServices,
}

impl ToolHandler for GetEventDetails {
    fn call<'a>(&'a self, arguments: Value, _context: &'a ToolContext) -> ToolFuture<'a> {
        Box::pin(async move {
            let arguments: EventDetailsArguments =
                match decode_arguments("get_event_details", arguments) {
                    Ok(arguments) => arguments,
                    Err(payload) => return payload,
                };

            let event = self
                .services
                .storage(
                    "event_by_title",
                    self.services.store.event_by_title(&arguments.event_title),
                )
                .await
                .ok()
                .flatten();

            match event {
                Some(event) => json!({ "event": event }),
                None => json!({ "error": "Event not found" }),
            }
        })
    }
}

pub struct SearchVolunteerOpportunities {
    services: ToolServices,
}

impl ToolHandler for SearchVolunteerOpportunities {
    fn call<'a>(&'a self, _arguments: Value, context: &'a ToolContext) -> ToolFuture<'a> {
        Box::pin(async move {
            let today = iso_date(context);
            let opportunities = self
                .services
                .storage(
                    "volunteer_opportunities",
                    self.services.store.volunteer_opportunities(&today),
                )
                .await
                .unwrap_or_default();

            let opportunities = opportunities
                .iter()
                .map(opportunity_payload)
                .collect::<Vec<_>>();
            json!({ "count": opportunities.len(), "opportunities": opportunities })
        })
    }
}

/// Resolves "the event" in a follow-up question. Tries the explicit
/// reference, then events mentioned earlier in the session, then the soonest
/// upcoming events.
pub struct FindVolunteerContact {
    services: ToolServices,
}

impl FindVolunteerContact {
    async fn referenced_event(&self, candidate: &str, today: &str) -> Option<Event> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return None;
        }

        self.services
            .storage(
                "event_by_title",
                self.services.store.event_by_title(candidate),
            )
            .await
            .ok()
            .flatten()
            .filter(|event| event.volunteers_needed > 0 && event.date.as_str() >= today)
    }
}

impl ToolHandler for FindVolunteerContact {
    fn call<'a>(&'a self, arguments: Value, context: &'a ToolContext) -> ToolFuture<'a> {
        Box::pin(async move {
            let arguments: VolunteerContactArguments =
                match decode_arguments("find_volunteer_contact_for_recent_event", arguments) {
                    Ok(arguments) => arguments,
                    Err(payload) => return payload,
                };
            let today = iso_date(context);

            let candidates = arguments
                .event_reference
                .iter()
                .chain(context.recent_events().iter());
            for candidate in candidates {
                if let Some(event) = self.referenced_event(candidate, &today).await {
                    return contact_payload(&event);
                }
            }

            let search = EventSearch {
                query: None,
                on_or_after: today,
                date_from: None,
                limit: CONTACT_SCAN_LIMIT,
            };
            let upcoming = self
                .services
                .storage("search_events", self.services.store.search_events(&search))
                .await
                .unwrap_or_default();

            match upcoming.iter().find(|event| event.volunteers_needed > 0) {
                Some(event) => contact_payload(event),
                None => json!({ "error": "No upcoming events currently need volunteers" }),
            }
        })
    }
}

pub fn clamp_search_limit(limit: Option<u32>) -> u32 {
    limit
        .unwrap_or(DEFAULT_EVENT_SEARCH_LIMIT)
        .clamp(1, MAX_EVENT_SEARCH_LIMIT)
}

fn iso_date(context: &ToolContext) -> String {
    context.today().format("%Y-%m-%d").to_string()
}

fn opportunity_payload(event: &Event) -> Value {
    json!({
        "title": event.title,
        "date": event.date,
        "time": event.time,
        "volunteers_needed": event.volunteers_needed,
        "description": event.description,
        "contact_email": event.contact_email,
    })
}

fn contact_payload(event: &Event) -> Value {
    json!({
        "event": event.title,
        "date": event.date,
        "time": event.time,
        "location": event.location,
        "volunteers_needed": event.volunteers_needed,
        "contact_email": event.contact_email,
        "price": event.price,
    })
}
