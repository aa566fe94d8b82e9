//! Static schema loading.
//!
//! Schemas are embedded in the binary at compile time (one JSON document per
//! registry stream), so discovery needs no network access and yields
//! identical output on every run.

use serde_json::Value;

use crate::registry::StreamDef;

/// The embedded JSON schema source for a stream.
fn schema_source(name: &str) -> Option<&'static str> {
    let src = match name {
        "account" => include_str!("schemas/account.json"),
        "users" => include_str!("schemas/users.json"),
        "leads" => include_str!("schemas/leads.json"),
        "people" => include_str!("schemas/people.json"),
        "companies" => include_str!("schemas/companies.json"),
        "opportunities" => include_str!("schemas/opportunities.json"),
        "projects" => include_str!("schemas/projects.json"),
        "customer_sources" => include_str!("schemas/customer_sources.json"),
        "lead_statuses" => include_str!("schemas/lead_statuses.json"),
        "contact_types" => include_str!("schemas/contact_types.json"),
        "loss_reasons" => include_str!("schemas/loss_reasons.json"),
        "pipelines" => include_str!("schemas/pipelines.json"),
        "pipeline_stages" => include_str!("schemas/pipeline_stages.json"),
        "tags" => include_str!("schemas/tags.json"),
        "custom_field_definitions" => include_str!("schemas/custom_field_definitions.json"),
        "activities" => include_str!("schemas/activities.json"),
        "tasks" => include_str!("schemas/tasks.json"),
        _ => return None,
    };
    Some(src)
}

/// Parse the embedded schema for a stream.
pub fn schema_for(def: &StreamDef) -> Result<Value, serde_json::Error> {
    let src = schema_source(def.name).unwrap_or("{}");
    serde_json::from_str(src)
}
