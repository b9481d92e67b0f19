//! # Simulator State
//!
//! Save, load and delete of the per-account political simulator state.
//!
//! ## Shape
//! - `parties`: array, contents opaque
//! - `parliament`: object with array fields `favoredParties` and `factions`, any
//!   other fields are kept as sent
//!
//! Only the shape is checked. Both values are stored as JSON text and returned
//! exactly as they were saved.
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::{
    error::AppError,
    store::{StateRecord, Store, StoreError},
};

pub const FAVORED_PARTIES: &str = "favoredParties";
pub const FACTIONS: &str = "factions";

#[derive(Deserialize, Debug, Default)]
pub struct SaveStateRequest {
    #[serde(default)]
    pub parties: Option<Value>,

    #[serde(default)]
    pub parliament: Option<Value>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub parties: Value,
    pub parliament: Value,
    pub last_updated: Option<DateTime<Utc>>,
}

impl StateSnapshot {
    /// What an account that never saved gets back.
    pub fn empty() -> Self {
        Self {
            parties: json!([]),
            parliament: json!({ "favoredParties": [], "factions": [] }),
            last_updated: None,
        }
    }
}

struct SimulatorState {
    parties: Value,
    parliament: Value,
}

fn validate(request: SaveStateRequest) -> Result<SimulatorState, AppError> {
    let parties = request.parties.filter(|v| !v.is_null());
    let parliament = request.parliament.filter(|v| !v.is_null());

    let (parties, parliament) = match (parties, parliament) {
        (Some(parties), Some(parliament)) => (parties, parliament),
        (parties, parliament) => {
            let mut details = Vec::new();
            if parties.is_none() {
                details.push("parties: is required".to_string());
            }
            if parliament.is_none() {
                details.push("parliament: is required".to_string());
            }

            return Err(AppError::validation(
                "Parties and parliament data required",
                details,
            ));
        }
    };

    let mut details = Vec::new();
    if !parties.is_array() {
        details.push("parties: must be an array".to_string());
    }
    match parliament.as_object() {
        Some(fields) => {
            for field in [FAVORED_PARTIES, FACTIONS] {
                if !fields.get(field).is_some_and(Value::is_array) {
                    details.push(format!("parliament.{field}: must be an array"));
                }
            }
        }
        None => details.push("parliament: must be an object".to_string()),
    }

    if !details.is_empty() {
        return Err(AppError::validation("Invalid state data structure", details));
    }

    Ok(SimulatorState {
        parties,
        parliament,
    })
}

/// Validates and upserts the state, returning the write timestamp.
pub async fn save_state(
    store: &dyn Store,
    user_id: i64,
    request: SaveStateRequest,
) -> Result<DateTime<Utc>, AppError> {
    let state = validate(request)?;

    // MySQL keeps milliseconds, so the acknowledged time matches what loads return.
    let now = Utc::now().trunc_subsecs(3);

    let record = StateRecord {
        user_id,
        parties_json: serde_json::to_string(&state.parties).map_err(StoreError::from)?,
        parliament_json: serde_json::to_string(&state.parliament).map_err(StoreError::from)?,
        last_updated: now,
    };

    store.upsert_state(&record).await?;
    info!("Saved state for account {user_id}");

    Ok(now)
}

pub async fn load_state(store: &dyn Store, user_id: i64) -> Result<StateSnapshot, AppError> {
    let Some(record) = store.find_state(user_id).await? else {
        return Ok(StateSnapshot::empty());
    };

    Ok(StateSnapshot {
        parties: serde_json::from_str(&record.parties_json).map_err(StoreError::from)?,
        parliament: serde_json::from_str(&record.parliament_json).map_err(StoreError::from)?,
        last_updated: Some(record.last_updated),
    })
}

pub async fn delete_state(store: &dyn Store, user_id: i64) -> Result<(), AppError> {
    if store.delete_state(user_id).await? {
        info!("Deleted state for account {user_id}");
    }

    Ok(())
}
