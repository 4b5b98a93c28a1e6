//! Student roster: record-store rows enriched with local data.

use std::collections::HashMap;

use serde_json::{Value, json};

use crate::database::models::StudentLink;
use crate::services::RemoteRow;

/// Attach `postgres_id` and `process_instance_id` to every remote row whose
/// `id` matches a local student's `baserow_id`. Other rows pass through
/// untouched, and the remote order is kept.
pub fn merge_students(local: &[StudentLink], remote: Vec<RemoteRow>) -> Vec<RemoteRow> {
    let by_external_id: HashMap<i64, &StudentLink> = local
        .iter()
        .map(|link| (i64::from(link.baserow_id), link))
        .collect();

    remote
        .into_iter()
        .map(|mut row| {
            let external_id = row.get("id").and_then(Value::as_i64);
            if let Some(link) = external_id.and_then(|id| by_external_id.get(&id)) {
                row.insert("postgres_id".to_string(), json!(link.id));
                row.insert(
                    "process_instance_id".to_string(),
                    json!(link.process_instance_id),
                );
            }
            row
        })
        .collect()
}
