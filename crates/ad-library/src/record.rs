//! Records returned by the Ad Library API and the creative data attached to
//! them.

use crate::error::{AdLibraryError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Key under which extracted creative data is attached to a record.
pub const AD_ELEMENTS_FIELD: &str = "ad_elements";

/// Shape of an ad, as resolved from its preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdType {
    Image,
    Video,
    Carousel,
    /// Text-only ad, no media.
    Status,
}

/// One rendered visual unit of an ad.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creative {
    pub title: Option<String>,
    pub image: Option<String>,
    pub video: Option<String>,
    pub landing_page: Option<String>,
    pub cta: Option<String>,
    pub caption: Option<String>,
    pub description: Option<String>,
}

impl Creative {
    pub fn has_media(&self) -> bool {
        self.image.is_some() || self.video.is_some()
    }
}

/// Extraction result for one record.
///
/// The default value (no body, no type, no creatives) is what a record gets
/// when extraction was skipped or failed for that record alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdElements {
    pub body: Option<String>,
    #[serde(rename = "type")]
    pub ad_type: Option<AdType>,
    #[serde(default)]
    pub creatives: Vec<Creative>,
}

impl AdElements {
    pub fn is_empty(&self) -> bool {
        self.body.is_none() && self.ad_type.is_none() && self.creatives.is_empty()
    }
}

/// One item of an API page.
///
/// Platform-defined fields are kept verbatim; extraction only ever adds the
/// `ad_elements` key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(flatten)]
    fields: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ad_elements: Option<AdElements>,
}

impl Record {
    /// Build a record from one element of a page's `data` array.
    ///
    /// An `ad_elements` value that is not shaped like [`AdElements`] is
    /// dropped; the key belongs to extraction.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(AdLibraryError::MalformedPage(format!(
                    "expected a record object, got {other}"
                )))
            }
        };

        let ad_elements = match fields.remove(AD_ELEMENTS_FIELD) {
            None | Some(Value::Null) => None,
            Some(raw) => match serde_json::from_value(raw) {
                Ok(elements) => Some(elements),
                Err(e) => {
                    warn!(
                        id = fields.get("id").and_then(|v| v.as_str()).unwrap_or("?"),
                        "discarding unrecognised {AD_ELEMENTS_FIELD}: {e}"
                    );
                    None
                }
            },
        };
        Ok(Self {
            fields,
            ad_elements,
        })
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            ad_elements: None,
        }
    }

    /// Stable identifier of the record, if the platform returned one.
    pub fn id(&self) -> Option<&str> {
        self.get_str("id")
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn ad_elements(&self) -> Option<&AdElements> {
        self.ad_elements.as_ref()
    }

    /// Attach extraction results. The first attachment wins; later calls are
    /// ignored and return `false`.
    pub fn attach_ad_elements(&mut self, elements: AdElements) -> bool {
        if self.ad_elements.is_some() {
            return false;
        }
        self.ad_elements = Some(elements);
        true
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    #[test]
    fn test_record_keeps_platform_fields() {
        let record = Record::from_value(json!({
            "id": "123",
            "page_name": "Shoes Inc",
            "ad_reached_countries": ["FR"]
        }))
        .unwrap();

        assert_eq!(record.id(), Some("123"));
        assert_eq!(record.get_str("page_name"), Some("Shoes Inc"));
        assert!(record.ad_elements().is_none());
        assert_json_eq!(
            record.to_value(),
            json!({"id": "123", "page_name": "Shoes Inc", "ad_reached_countries": ["FR"]})
        );
    }

    #[test]
    fn test_ad_elements_serialize_as_one_more_key() {
        let mut record = Record::from_value(json!({"id": "1"})).unwrap();
        record.attach_ad_elements(AdElements {
            body: Some("Buy now".to_string()),
            ad_type: Some(AdType::Image),
            creatives: vec![Creative {
                image: Some("https://scontent.example/i.jpg".to_string()),
                ..Creative::default()
            }],
        });

        assert_json_eq!(
            record.to_value(),
            json!({
                "id": "1",
                "ad_elements": {
                    "body": "Buy now",
                    "type": "image",
                    "creatives": [{
                        "title": null,
                        "image": "https://scontent.example/i.jpg",
                        "video": null,
                        "landing_page": null,
                        "cta": null,
                        "caption": null,
                        "description": null
                    }]
                }
            })
        );
    }

    #[test]
    fn test_empty_ad_elements_shape() {
        let mut record = Record::from_value(json!({"id": "1"})).unwrap();
        record.attach_ad_elements(AdElements::default());
        assert_json_eq!(
            record.to_value(),
            json!({"id": "1", "ad_elements": {"body": null, "type": null, "creatives": []}})
        );
    }

    #[test]
    fn test_ad_elements_attach_once() {
        let mut record = Record::default();
        assert!(record.attach_ad_elements(AdElements {
            ad_type: Some(AdType::Status),
            ..AdElements::default()
        }));
        assert!(!record.attach_ad_elements(AdElements::default()));
        assert_eq!(
            record.ad_elements().and_then(|e| e.ad_type),
            Some(AdType::Status)
        );
    }

    #[test]
    fn test_non_object_record_is_rejected() {
        assert!(matches!(
            Record::from_value(json!("oops")),
            Err(AdLibraryError::MalformedPage(_))
        ));
    }

    #[test]
    fn test_foreign_ad_elements_are_dropped() {
        let mut record =
            Record::from_value(json!({"id": "1", "ad_elements": "legacy", "page_id": "7"})).unwrap();

        assert!(record.ad_elements().is_none());
        assert!(record.get(AD_ELEMENTS_FIELD).is_none());
        assert_json_eq!(record.to_value(), json!({"id": "1", "page_id": "7"}));

        assert!(record.attach_ad_elements(AdElements::default()));
        assert_json_eq!(
            record.to_value(),
            json!({
                "id": "1",
                "page_id": "7",
                "ad_elements": {"body": null, "type": null, "creatives": []}
            })
        );
    }

    #[test]
    fn test_round_trip_through_json() {
        let raw = json!({
            "id": "9",
            "ad_elements": {"body": null, "type": "carousel", "creatives": []}
        });
        let record = Record::from_value(raw.clone()).unwrap();
        assert_eq!(
            record.ad_elements().and_then(|e| e.ad_type),
            Some(AdType::Carousel)
        );
        assert!(record.get("ad_elements").is_none());
        assert_json_eq!(record.to_value(), raw);
    }
}
