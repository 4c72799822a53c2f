use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::{
    ToolContext, ToolDefinition, ToolError, ToolFuture, ToolHandler, ToolServices,
    decode_arguments, parameters_schema,
};
use crate::repos::{Event, RsvpOutcome};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RsvpArguments {
    /// Email address of the person who wants to RSVP.
    pub user_email: String,
    /// Title or partial title of the event.
    pub event_title: String,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct CurrentUserRsvpArguments {
    /// Title or partial title of the event.
    pub event_title: Option<String>,
}

pub(super) fn rsvp_to_event_tool(services: &ToolServices) -> Result<ToolDefinition, ToolError> {
    ToolDefinition::new(
        "rsvp_to_event",
        "RSVP a person, identified by email, to a free event. Checks that the event is open, \
         free and not already booked by them, then records the RSVP and returns next steps.",
        parameters_schema::<RsvpArguments>(),
        Arc::new(RsvpToEvent {
            services: services.clone(),
        }),
    )
}

pub(super) fn rsvp_current_user_tool(services: &ToolServices) -> Result<ToolDefinition, ToolError> {
    ToolDefinition::new(
        "rsvp_current_user_to_event",
        "RSVP the signed-in user to an event using their session identity. Only works when the \
         user is logged in. Applies the same checks as rsvp_to_event.",
        parameters_schema::<CurrentUserRsvpArguments>(),
        Arc::new(RsvpCurrentUserToEvent {
            services: services.clone(),
        }),
    )
}

pub struct RsvpToEvent {
    services: ToolServices,
}

impl ToolHandler for RsvpToEvent {
    fn call<'a>(&'a self, arguments: Value, _context: &'a ToolContext) -> ToolFuture<'a> {
        Box::pin(async move {
            let arguments: RsvpArguments = match decode_arguments("rsvp_to_event", arguments) {
                Ok(arguments) => arguments,
                Err(payload) => return payload,
            };

            rsvp(&self.services, &arguments.user_email, &arguments.event_title).await
        })
    }
}

pub struct RsvpCurrentUserToEvent {
    services: ToolServices,
}

impl ToolHandler for RsvpCurrentUserToEvent {
    fn call<'a>(&'a self, arguments: Value, context: &'a ToolContext) -> ToolFuture<'a> {
        Box::pin(async move {
            let Some(user_email) = context.user_email() else {
                return json!({
                    "error": "User not authenticated",
                    "message": "Please log in to RSVP for events",
                    "suggestion": "You can also provide your email explicitly if you prefer",
                });
            };

            let arguments: CurrentUserRsvpArguments =
                match decode_arguments("rsvp_current_user_to_event", arguments) {
                    Ok(arguments) => arguments,
                    Err(payload) => return payload,
                };
            let event_title = arguments.event_title.unwrap_or_default();
            if event_title.trim().is_empty() {
                return json!({ "error": "Event title is required" });
            }

            rsvp(&self.services, user_email, &event_title).await
        })
    }
}

/// Validation pipeline shared by both RSVP tools. Stops at the first failed
/// check; paid events are never booked here.
async fn rsvp(services: &ToolServices, user_email: &str, event_title: &str) -> Value {
    let user_email = user_email.trim();
    let event_title = event_title.trim();
    if user_email.is_empty() || event_title.is_empty() {
        return json!({ "error": "Both user email and event title are required" });
    }

    let user = services
        .storage("user_by_email", services.store.user_by_email(user_email))
        .await
        .ok()
        .flatten();
    let Some(user) = user else {
        return json!({
            "error": format!("User with email {user_email} not found"),
            "suggestion": "Please make sure the email address is correct or register first",
        });
    };

    let event = services
        .storage("event_by_title", services.store.event_by_title(event_title))
        .await
        .ok()
        .flatten();
    let Some(event) = event else {
        return json!({
            "error": format!("Event '{event_title}' not found"),
            "suggestion": "Please check the event title or search for available events",
        });
    };

    if !event.is_active() {
        return json!({
            "error": format!("Event '{}' is not open for registration", event.title),
            "event_status": event.status,
        });
    }

    if let Some(price) = event.paid_price() {
        return json!({
            "error": format!("This event costs ${price} and requires payment"),
            "message": "For paid events, please visit our website to complete registration with payment",
            "event_details": {
                "title": event.title,
                "date": event.date,
                "time": event.time,
                "location": event.location,
                "price": price,
            },
            "suggestion": "Contact the mosque directly for payment options or visit the website",
        });
    }

    match services
        .storage("rsvp_status", services.store.rsvp_status(user.id, event.id))
        .await
    {
        Ok(Some(rsvp_date)) => return already_booked(&event, Some(rsvp_date)),
        Ok(None) => {}
        Err(_) => return rsvp_failed(),
    }

    match services
        .storage("create_rsvp", services.store.create_rsvp(user.id, event.id))
        .await
    {
        Ok(RsvpOutcome::Created) => {
            info!(user_id = user.id, event_id = event.id, "rsvp created");
            json!({
                "success": true,
                "message": format!("Successfully RSVP'd to '{}'", event.title),
                "user": {
                    "name": user.full_name(),
                    "email": user.email,
                },
                "event_details": {
                    "title": event.title,
                    "date": event.date,
                    "time": event.time,
                    "location": event.location,
                    "description": event.description,
                    "price": event.price,
                    "contact_email": event.contact_email,
                },
                "next_steps": "Please mark your calendar and contact the organizer if you have any questions",
            })
        }
        Ok(RsvpOutcome::AlreadyExists) => {
            let rsvp_date = services
                .storage("rsvp_status", services.store.rsvp_status(user.id, event.id))
                .await
                .ok()
                .flatten();
            already_booked(&event, rsvp_date)
        }
        Err(_) => rsvp_failed(),
    }
}

fn rsvp_failed() -> Value {
    json!({ "error": "Failed to create RSVP due to database error" })
}

fn already_booked(event: &Event, rsvp_date: Option<String>) -> Value {
    json!({
        "error": format!("You have already RSVP'd to '{}'", event.title),
        "rsvp_date": rsvp_date,
        "event_details": {
            "title": event.title,
            "date": event.date,
            "time": event.time,
            "location": event.location,
        },
    })
}
