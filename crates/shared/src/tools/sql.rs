use std::sync::Arc;

use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject, SingleOrVec};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use super::{
    ToolContext, ToolDefinition, ToolError, ToolFuture, ToolHandler, ToolServices,
    decode_arguments, parameters_schema,
};
use crate::repos::SqlParameters;
use crate::sql_gate::SqlGate;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SqlQueryArguments {
    /// Complete SQLite SELECT or WITH statement.
    pub sql: String,
    /// Optional bind values: an array for positional `?` placeholders or an
    /// object for `:name` placeholders.
    #[serde(default)]
    #[schemars(schema_with = "array_or_object_schema")]
    pub parameters: Option<Value>,
}

fn array_or_object_schema(_: &mut SchemaGenerator) -> Schema {
    Schema::Object(SchemaObject {
        instance_type: Some(SingleOrVec::Vec(vec![
            InstanceType::Array,
            InstanceType::Object,
            InstanceType::Null,
        ])),
        ..Default::default()
    })
}

pub(super) fn execute_sql_query_tool(
    services: &ToolServices,
    sql_gate: SqlGate,
) -> Result<ToolDefinition, ToolError> {
    let allowed = sql_gate.allowed_leading().join(" and ");
    ToolDefinition::new(
        "execute_sql_query",
        format!(
            "Run a read-only SQL query against the mosque database for questions the other \
             tools cannot answer, such as filtering, counting or aggregating. Tables: \
             events (id, title, description, date, time, location, category, volunteers_needed, \
             contact_email, price, status), users (id, first_name, last_name, email, phone), \
             volunteer_signups (user_id, event_id, created_at), event_rsvps (user_id, event_id, \
             created_at). Only {allowed} statements are allowed."
        ),
        parameters_schema::<SqlQueryArguments>(),
        Arc::new(ExecuteSqlQuery {
            services: services.clone(),
            sql_gate,
        }),
    )
}

pub struct ExecuteSqlQuery {
    services: ToolServices,
    sql_gate: SqlGate,
}

impl ToolHandler for ExecuteSqlQuery {
    fn call<'a>(&'a self, arguments: Value, _context: &'a ToolContext) -> ToolFuture<'a> {
        Box::pin(async move {
            let arguments: SqlQueryArguments = match decode_arguments("execute_sql_query", arguments)
            {
                Ok(arguments) => arguments,
                Err(payload) => return payload,
            };

            if let Err(rejection) = self.sql_gate.check(&arguments.sql) {
                warn!(reason = %rejection, "rejected model-authored SQL");
                return empty_result();
            }

            let parameters = match SqlParameters::from_json(arguments.parameters.as_ref()) {
                Ok(parameters) => parameters,
                Err(err) => {
                    warn!(error = %err, "rejected SQL parameters");
                    return empty_result();
                }
            };

            let rows = self
                .services
                .storage(
                    "execute_read_only",
                    self.services
                        .store
                        .execute_read_only(&arguments.sql, &parameters),
                )
                .await
                .unwrap_or_default();

            json!({ "row_count": rows.len(), "rows": rows })
        })
    }
}

fn empty_result() -> Value {
    json!({ "row_count": 0, "rows": [] })
}
