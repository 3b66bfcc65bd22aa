use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::PersistenceError;

pub const ENVELOPE_KIND: &str = "MapWithQuestions";
pub const ENVELOPE_VERSION: &str = "1.0";

/// The current save format: the map as a `FeatureCollection` plus the question answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveEnvelope {
  #[serde(alias = "type")]
  pub kind: String,
  pub version: String,
  pub geojson: Value,
  #[serde(default, alias = "questionsAnswers")]
  pub answers: BTreeMap<String, String>,
  pub saved_at: DateTime<Utc>,
}

impl SaveEnvelope {
  #[must_use]
  pub fn new(geojson: Value, answers: BTreeMap<String, String>) -> Self {
    Self {
      kind: ENVELOPE_KIND.to_owned(),
      version: ENVELOPE_VERSION.to_owned(),
      geojson,
      answers,
      saved_at: Utc::now(),
    }
  }
}

/// A loaded document, classified by format.
#[derive(Debug, Clone, PartialEq)]
pub enum SavedDocument {
  Envelope {
    geojson: Value,
    answers: BTreeMap<String, String>,
  },
  /// A bare `FeatureCollection`.
  FeatureCollection(Value),
  /// A `FeatureCollection` under `geojsonData`.
  Legacy(Value),
}

impl SavedDocument {
  /// Detects the format of a stored document.
  ///
  /// Envelopes win over bare collections, which win over `geojsonData` wrappers. Documents that
  /// were stored as an encoded JSON string are decoded first.
  ///
  /// # Errors
  /// Returns [`PersistenceError::UnrecognizedDocument`] if no format matches.
  pub fn classify(document: Value) -> Result<Self, PersistenceError> {
    match document {
      Value::String(encoded) => {
        let decoded: Value =
          serde_json::from_str(&encoded).map_err(|_| PersistenceError::UnrecognizedDocument)?;
        if decoded.is_string() {
          return Err(PersistenceError::UnrecognizedDocument);
        }
        Self::classify(decoded)
      }
      Value::Object(mut obj) => {
        if is_envelope(&obj) {
          let geojson = obj
            .remove("geojson")
            .map(decode_string)
            .ok_or(PersistenceError::UnrecognizedDocument)?;
          let answers = obj
            .remove("answers")
            .or_else(|| obj.remove("questionsAnswers"))
            .map(answers_from_value)
            .unwrap_or_default();
          Ok(SavedDocument::Envelope { geojson, answers })
        } else if obj.contains_key("features") {
          Ok(SavedDocument::FeatureCollection(Value::Object(obj)))
        } else if let Some(inner) = obj.remove("geojsonData") {
          match Self::classify(inner)? {
            SavedDocument::FeatureCollection(collection) | SavedDocument::Legacy(collection) => {
              Ok(SavedDocument::Legacy(collection))
            }
            envelope @ SavedDocument::Envelope { .. } => Ok(envelope),
          }
        } else {
          Err(PersistenceError::UnrecognizedDocument)
        }
      }
      _ => Err(PersistenceError::UnrecognizedDocument),
    }
  }

  /// The collection to import and the answers, if the format carries any.
  #[must_use]
  pub fn into_parts(self) -> (Value, Option<BTreeMap<String, String>>) {
    match self {
      SavedDocument::Envelope { geojson, answers } => (geojson, Some(answers)),
      SavedDocument::FeatureCollection(collection) | SavedDocument::Legacy(collection) => {
        (collection, None)
      }
    }
  }
}

fn is_envelope(obj: &Map<String, Value>) -> bool {
  let kind = obj
    .get("kind")
    .or_else(|| obj.get("type"))
    .and_then(Value::as_str);
  kind == Some(ENVELOPE_KIND)
    || (obj.contains_key("geojson")
      && (obj.contains_key("answers") || obj.contains_key("questionsAnswers")))
}

fn decode_string(value: Value) -> Value {
  match value {
    Value::String(encoded) => serde_json::from_str(&encoded).unwrap_or(Value::String(encoded)),
    other => other,
  }
}

/// Answers keyed by question id. Non-string answers are kept in their JSON form.
fn answers_from_value(value: Value) -> BTreeMap<String, String> {
  match decode_string(value) {
    Value::Object(answers) => answers
      .into_iter()
      .filter(|(_, answer)| !answer.is_null())
      .map(|(id, answer)| match answer {
        Value::String(text) => (id, text),
        other => (id, other.to_string()),
      })
      .collect(),
    _ => BTreeMap::new(),
  }
}
