//! Payload body construction for webhook requests.
//!
//! Each subscription chooses a wire format. JSON wraps the event data in a
//! `{event, timestamp, data}` envelope; CSV produces exactly two lines, a
//! header row and a data row, for tenants piping events into spreadsheets.

use selfkey_core::models::{BookingEvent, PayloadFormat};

use crate::error::{DeliveryError, Result};

/// Builds the payload body for an event in the requested format.
///
/// The body is built once per delivery chain and reused across attempts, so
/// retries send byte-identical content and signatures stay valid.
///
/// # Errors
///
/// Returns `DeliveryError::Serialization` if the event data cannot be
/// serialized, or `DeliveryError::Configuration` if CSV is requested for a
/// non-object data value.
pub fn build_payload(event: &BookingEvent, format: PayloadFormat) -> Result<String> {
    match format {
        PayloadFormat::Json => build_json(event),
        PayloadFormat::Csv => build_csv(event),
    }
}

fn build_json(event: &BookingEvent) -> Result<String> {
    let envelope = serde_json::json!({
        "event": event.name,
        "timestamp": event.occurred_at.to_rfc3339(),
        "data": event.data,
    });
    Ok(serde_json::to_string(&envelope)?)
}

/// Two-line CSV: header row `event,timestamp,<data keys>`, then one data
/// row. Scalars are written raw; nested objects and arrays are JSON-encoded
/// inline; null becomes an empty cell.
fn build_csv(event: &BookingEvent) -> Result<String> {
    let serde_json::Value::Object(data) = &event.data else {
        return Err(DeliveryError::configuration(
            "csv format requires event data to be an object",
        ));
    };

    let mut header: Vec<String> = vec!["event".to_string(), "timestamp".to_string()];
    let mut row: Vec<String> =
        vec![csv_escape(&event.name), csv_escape(&event.occurred_at.to_rfc3339())];

    for (key, value) in data {
        header.push(csv_escape(key));
        row.push(csv_escape(&csv_cell(value)?));
    }

    Ok(format!("{}\n{}", header.join(","), row.join(",")))
}

fn csv_cell(value: &serde_json::Value) -> Result<String> {
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(_) | serde_json::Value::Number(_) => value.to_string(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
            serde_json::to_string(value)?
        },
    })
}

/// RFC 4180 quoting: wrap in double quotes when the cell contains a comma,
/// quote, or line break, doubling any embedded quotes.
fn csv_escape(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') || cell.contains('\r') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use selfkey_core::models::TenantId;

    use super::*;

    fn event_at_epoch(data: serde_json::Value) -> BookingEvent {
        let mut event = BookingEvent::new("booking.created", TenantId::new(), data);
        event.occurred_at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        event
    }

    #[test]
    fn json_payload_wraps_data_in_envelope() {
        let event = event_at_epoch(serde_json::json!({"reference": "BK-1001", "total": 150.0}));
        let body = build_payload(&event, PayloadFormat::Json).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["event"], "booking.created");
        assert_eq!(parsed["timestamp"], "2024-06-01T12:00:00+00:00");
        assert_eq!(parsed["data"]["reference"], "BK-1001");
        assert_eq!(parsed["data"]["total"], 150.0);
    }

    #[test]
    fn csv_payload_is_two_lines_with_data_columns() {
        let event = event_at_epoch(serde_json::json!({
            "guest": "Ada Lovelace",
            "nights": 3,
            "notes": null,
        }));
        let body = build_payload(&event, PayloadFormat::Csv).unwrap();

        let lines: Vec<&str> = body.split('\n').collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "event,timestamp,guest,nights,notes");
        assert_eq!(lines[1], "booking.created,2024-06-01T12:00:00+00:00,Ada Lovelace,3,");
    }

    #[test]
    fn csv_quotes_cells_with_commas_and_quotes() {
        let event = event_at_epoch(serde_json::json!({
            "guest": "Lovelace, Ada",
            "comment": "said \"hello\"",
        }));
        let body = build_payload(&event, PayloadFormat::Csv).unwrap();

        let data_row = body.split('\n').nth(1).unwrap();
        assert!(data_row.contains("\"Lovelace, Ada\""));
        assert!(data_row.contains("\"said \"\"hello\"\"\""));
    }

    #[test]
    fn csv_inlines_nested_values_as_json() {
        let event = event_at_epoch(serde_json::json!({
            "options": {"breakfast": true},
        }));
        let body = build_payload(&event, PayloadFormat::Csv).unwrap();

        let data_row = body.split('\n').nth(1).unwrap();
        assert!(data_row.contains("\"{\"\"breakfast\"\":true}\""));
    }

    #[test]
    fn csv_rejects_non_object_data() {
        let event = event_at_epoch(serde_json::json!([1, 2, 3]));
        let err = build_payload(&event, PayloadFormat::Csv).unwrap_err();
        assert!(matches!(err, DeliveryError::Configuration { .. }));
    }
}
