//! Serde-deserializable types matching Notion API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::types::RemoteItem;
use crate::config::PropertyNames;

// ============================================================================
// Shared envelopes
// ============================================================================

/// Paginated list response (`/blocks/{id}/children`, `/databases/{id}/query`)
#[derive(Debug, Deserialize)]
pub struct ApiList<T> {
  #[serde(default = "Vec::new")]
  pub results: Vec<T>,
  #[serde(default)]
  pub has_more: bool,
  pub next_cursor: Option<String>,
}

/// Error body returned with non-2xx responses
#[derive(Debug, Deserialize)]
pub struct ApiError {
  #[serde(default)]
  pub code: String,
  #[serde(default)]
  pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiQueryRequest<'a> {
  pub page_size: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub start_cursor: Option<&'a str>,
}

/// Any object where only the ID matters (database rows)
#[derive(Debug, Deserialize)]
pub struct ApiObjectRef {
  pub id: String,
}

// ============================================================================
// Blocks
// ============================================================================

/// Block object. Partial objects carry only `object` and `id`.
#[derive(Debug, Deserialize)]
pub struct ApiBlock {
  pub id: String,
  #[serde(rename = "type")]
  pub block_type: Option<String>,
  pub last_edited_time: Option<DateTime<Utc>>,
}

impl ApiBlock {
  pub fn is_full(&self) -> bool {
    self.block_type.is_some()
  }

  pub fn is_child_database(&self) -> bool {
    self.block_type.as_deref() == Some("child_database")
  }
}

// ============================================================================
// Pages
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiRichText {
  #[serde(default)]
  pub plain_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiProperty {
  Title {
    #[serde(default)]
    title: Vec<ApiRichText>,
  },
  Number {
    number: Option<f64>,
  },
  Checkbox {
    #[serde(default)]
    checkbox: bool,
  },
  #[serde(other)]
  Other,
}

/// Page object. Partial objects carry no `properties`.
#[derive(Debug, Deserialize)]
pub struct ApiPage {
  pub id: String,
  pub properties: Option<HashMap<String, ApiProperty>>,
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl ApiPage {
  /// Convert a fully loaded page. Partial pages yield `None`.
  pub fn into_remote_item(self, names: &PropertyNames) -> Option<RemoteItem> {
    let properties = self.properties?;

    let description = match properties.get(&names.title) {
      Some(ApiProperty::Title { title }) => title
        .first()
        .map(|t| t.plain_text.clone())
        .unwrap_or_default(),
      _ => String::new(),
    };

    let measurement_value = match properties.get(&names.measurement) {
      Some(ApiProperty::Number { number }) => number.unwrap_or(0.0),
      _ => 0.0,
    };

    let checkbox_state = match properties.get(&names.status) {
      Some(ApiProperty::Checkbox { checkbox }) => Some(*checkbox),
      _ => None,
    };

    Some(RemoteItem {
      id: self.id,
      description,
      measurement_value,
      checkbox_state,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn page(value: serde_json::Value) -> ApiPage {
    serde_json::from_value(value).unwrap()
  }

  #[test]
  fn test_full_page_conversion() {
    let item = page(json!({
      "object": "page",
      "id": "p1",
      "properties": {
        "Title": {"id": "title", "type": "title", "title": [
          {"type": "text", "plain_text": "Pull ups"},
          {"type": "text", "plain_text": " (wide)"}
        ]},
        "Performances": {"id": "a", "type": "number", "number": 7.5},
        "Status": {"id": "b", "type": "checkbox", "checkbox": true},
        "Last Modified": {"id": "c", "type": "date", "date": null}
      }
    }))
    .into_remote_item(&PropertyNames::default())
    .unwrap();

    assert_eq!(
      item,
      RemoteItem {
        id: "p1".to_string(),
        description: "Pull ups".to_string(),
        measurement_value: 7.5,
        checkbox_state: Some(true),
      }
    );
  }

  #[test]
  fn test_partial_page_is_dropped() {
    let item = page(json!({"object": "page", "id": "p1"}))
      .into_remote_item(&PropertyNames::default());
    assert_eq!(item, None);
  }

  #[test]
  fn test_missing_or_mistyped_properties_fall_back() {
    let item = page(json!({
      "id": "p2",
      "properties": {
        "Title": {"type": "title", "title": []},
        "Performances": {"type": "number", "number": null},
        "Status": {"type": "select", "select": {"name": "Done"}}
      }
    }))
    .into_remote_item(&PropertyNames::default())
    .unwrap();

    assert_eq!(item.description, "");
    assert_eq!(item.measurement_value, 0.0);
    assert_eq!(item.checkbox_state, None);
  }

  #[test]
  fn test_custom_property_names() {
    let names = PropertyNames {
      measurement: "Reps".to_string(),
      ..PropertyNames::default()
    };
    let item = page(json!({
      "id": "p3",
      "properties": {
        "Reps": {"type": "number", "number": 20},
        "Performances": {"type": "number", "number": 1}
      }
    }))
    .into_remote_item(&names)
    .unwrap();

    assert_eq!(item.measurement_value, 20.0);
  }

  #[test]
  fn test_block_shape() {
    let block: ApiBlock = serde_json::from_value(json!({
      "object": "block",
      "id": "b1",
      "type": "child_database",
      "last_edited_time": "2024-03-01T10:15:00.000Z",
      "child_database": {"title": "Legs"}
    }))
    .unwrap();
    assert!(block.is_full());
    assert!(block.is_child_database());
    assert_eq!(
      block.last_edited_time.unwrap().to_rfc3339(),
      "2024-03-01T10:15:00+00:00"
    );

    let partial: ApiBlock = serde_json::from_value(json!({"object": "block", "id": "b2"})).unwrap();
    assert!(!partial.is_full());
    assert!(!partial.is_child_database());
  }

  #[test]
  fn test_query_request_omits_missing_cursor() {
    let first = serde_json::to_value(ApiQueryRequest {
      page_size: 100,
      start_cursor: None,
    })
    .unwrap();
    assert_eq!(first, json!({"page_size": 100}));

    let next = serde_json::to_value(ApiQueryRequest {
      page_size: 100,
      start_cursor: Some("c2"),
    })
    .unwrap();
    assert_eq!(next, json!({"page_size": 100, "start_cursor": "c2"}));
  }
}
