use axum::Json;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use chrono::NaiveDate;
use shared::models::{
    EventsQuery, EventsResponse, PrayerTimesQuery, VolunteerOpportunitiesResponse,
};
use shared::repos::{EventSearch, bounded};
use shared::tools::clamp_search_limit;
use tracing::warn;

use super::AppState;
use super::errors::{bad_gateway_response, bad_request_response, store_error_response};

pub(super) async fn prayer_times(
    State(state): State<AppState>,
    Query(query): Query<PrayerTimesQuery>,
) -> Response {
    let date = match query
        .date
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                return bad_request_response(
                    "invalid_date",
                    &format!("Invalid date '{raw}'. Use YYYY-MM-DD format."),
                );
            }
        },
        None => None,
    };

    match state.prayer_times.fetch(date).await {
        Ok(times) => Json(times).into_response(),
        Err(err) => {
            warn!("prayer times passthrough failed: {err}");
            bad_gateway_response("prayer_times_unavailable", "Failed to get prayer times")
        }
    }
}

pub(super) async fn events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Response {
    let search = EventSearch {
        query: None,
        on_or_after: today(&state),
        date_from: None,
        limit: clamp_search_limit(query.limit),
    };

    match bounded(state.storage_timeout, state.store.search_events(&search)).await {
        Ok(events) => Json(EventsResponse {
            count: events.len(),
            events,
        })
        .into_response(),
        Err(err) => store_error_response("search_events", err),
    }
}

pub(super) async fn volunteer_opportunities(State(state): State<AppState>) -> Response {
    let today = today(&state);
    match bounded(
        state.storage_timeout,
        state.store.volunteer_opportunities(&today),
    )
    .await
    {
        Ok(opportunities) => Json(VolunteerOpportunitiesResponse {
            count: opportunities.len(),
            opportunities,
        })
        .into_response(),
        Err(err) => store_error_response("volunteer_opportunities", err),
    }
}

fn today(state: &AppState) -> String {
    state.local_now().date().format("%Y-%m-%d").to_string()
}
