//! Pricing-option selections and booking-time snapshots.
//!
//! Guests pick option values by ID (the compact form). At booking creation
//! the selection is enriched: option names, value labels, and price
//! modifiers are copied out of the catalog and frozen onto the booking, so
//! later catalog edits never change what was agreed. The inverse transform
//! compresses a snapshot back to IDs for size-capped transports.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::money::add_money;

/// How a pricing option is presented and selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    /// Single choice from a list.
    Select,
    /// Any number of choices.
    Checkbox,
}

/// One selectable value of a pricing option, as defined in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingOptionValue {
    /// Stable value identifier.
    pub id: String,
    /// Label shown to guests.
    pub label: String,
    /// Price change this value applies, in major currency units.
    pub price_modifier: f64,
    /// Whether the modifier applies per night rather than per stay.
    #[serde(default)]
    pub per_night: bool,
}

/// A tenant-defined pricing option with its selectable values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingOption {
    /// Stable option identifier.
    pub id: String,
    /// Name shown to guests.
    pub name: String,
    /// Presentation and selection mode.
    pub option_type: OptionType,
    /// Selectable values.
    pub values: Vec<PricingOptionValue>,
}

/// Compact selection for one option: a value ID or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompactSelection {
    /// Single-choice selection.
    One(String),
    /// Multi-choice selection.
    Many(Vec<String>),
}

/// Compact selections keyed by option ID.
pub type CompactSelections = BTreeMap<String, CompactSelection>;

/// A frozen copy of one selected value.
///
/// `price_modifier` is already multiplied by the stay length when the
/// catalog value was per-night.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedValue {
    /// Option ID at selection time.
    pub option_id: String,
    /// Option name at selection time.
    pub option_name: String,
    /// Option type at selection time.
    pub option_type: OptionType,
    /// Value ID at selection time.
    pub value_id: String,
    /// Value label at selection time.
    pub value_label: String,
    /// Effective price change for the whole stay.
    pub price_modifier: f64,
    /// When the selection was frozen.
    pub selected_at: DateTime<Utc>,
}

/// Enriched selection for one option, tagged by cardinality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnrichedSelection {
    /// Single-choice selection.
    Single {
        /// The frozen value.
        value: EnrichedValue,
    },
    /// Multi-choice selection.
    Multi {
        /// The frozen values, in selection order.
        values: Vec<EnrichedValue>,
    },
}

/// Enriched selections keyed by option ID.
pub type EnrichedSelections = BTreeMap<String, EnrichedSelection>;

fn freeze_value(
    option: &PricingOption,
    value_id: &str,
    duration_nights: u32,
    selected_at: DateTime<Utc>,
) -> Option<EnrichedValue> {
    let Some(value) = option.values.iter().find(|v| v.id == value_id) else {
        warn!(
            option_id = %option.id,
            value_id = %value_id,
            "selected value no longer exists in catalog, skipping"
        );
        return None;
    };

    let price_modifier = if value.per_night {
        add_money(&vec![value.price_modifier; duration_nights as usize])
    } else {
        value.price_modifier
    };

    Some(EnrichedValue {
        option_id: option.id.clone(),
        option_name: option.name.clone(),
        option_type: option.option_type,
        value_id: value.id.clone(),
        value_label: value.label.clone(),
        price_modifier,
        selected_at,
    })
}

/// Enriches compact selections against the current catalog.
///
/// Per-night modifiers are multiplied by `duration_nights`. Selections that
/// reference options or values missing from the catalog are skipped with a
/// warning; enrichment never fails.
pub fn enrich_selections(
    selections: &CompactSelections,
    catalog: &[PricingOption],
    duration_nights: u32,
    selected_at: DateTime<Utc>,
) -> EnrichedSelections {
    let mut enriched = EnrichedSelections::new();

    for (option_id, selection) in selections {
        let Some(option) = catalog.iter().find(|o| &o.id == option_id) else {
            warn!(option_id = %option_id, "selected option no longer exists in catalog, skipping");
            continue;
        };

        match selection {
            CompactSelection::One(value_id) => {
                if let Some(value) = freeze_value(option, value_id, duration_nights, selected_at) {
                    enriched.insert(option_id.clone(), EnrichedSelection::Single { value });
                }
            },
            CompactSelection::Many(value_ids) => {
                let values: Vec<EnrichedValue> = value_ids
                    .iter()
                    .filter_map(|id| freeze_value(option, id, duration_nights, selected_at))
                    .collect();
                // An empty multi-select is a valid selection and must survive
                // the round trip; drop the key only when every reference dangled
                if values.is_empty() && !value_ids.is_empty() {
                    continue;
                }
                enriched.insert(option_id.clone(), EnrichedSelection::Multi { values });
            },
        }
    }

    enriched
}

/// Type guard over stored JSON: true when the value already holds enriched
/// selections rather than the compact ID form.
///
/// Bookings written before enrichment existed store the compact form, so
/// readers must branch on this.
pub fn is_enriched_format(stored: &serde_json::Value) -> bool {
    let Some(map) = stored.as_object() else {
        return false;
    };
    let Some(first) = map.values().next() else {
        return false;
    };

    // Tagged selections nest the frozen value under `value` or `values`
    let candidate = match first {
        serde_json::Value::Object(obj) => {
            if let Some(v) = obj.get("value") {
                v
            } else if let Some(vs) = obj.get("values").and_then(|v| v.as_array()) {
                match vs.first() {
                    Some(v) => v,
                    None => return false,
                }
            } else {
                first
            }
        },
        _ => return false,
    };

    candidate.get("optionName").is_some()
        && candidate.get("valueLabel").is_some()
        && candidate.get("priceModifier").is_some()
}

/// Flattens enriched selections into a list of frozen values.
pub fn flatten(selections: &EnrichedSelections) -> Vec<&EnrichedValue> {
    let mut out = Vec::new();
    for selection in selections.values() {
        match selection {
            EnrichedSelection::Single { value } => out.push(value),
            EnrichedSelection::Multi { values } => out.extend(values.iter()),
        }
    }
    out
}

/// Sums the effective price modifiers of all frozen values, drift-free.
pub fn enriched_total(selections: &EnrichedSelections) -> f64 {
    let modifiers: Vec<f64> = flatten(selections).iter().map(|v| v.price_modifier).collect();
    add_money(&modifiers)
}

/// Compresses enriched selections back to the compact ID form.
///
/// Inverse of enrichment: `compress(enrich(sel)) == sel` for selections
/// fully resolvable in the catalog.
pub fn compress_selections(selections: &EnrichedSelections) -> CompactSelections {
    selections
        .iter()
        .map(|(option_id, selection)| {
            let compact = match selection {
                EnrichedSelection::Single { value } => {
                    CompactSelection::One(value.value_id.clone())
                },
                EnrichedSelection::Multi { values } => {
                    CompactSelection::Many(values.iter().map(|v| v.value_id.clone()).collect())
                },
            };
            (option_id.clone(), compact)
        })
        .collect()
}
