//! Field schema shared by spaces and the issue ledger.
//!
//! A space's domain data is a bag of values addressed by [`FieldKey`]. The key
//! set is closed: anything outside it is rejected as `UnknownField` at the
//! boundary, before a request reaches the workflow.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::WorkflowError;

/// Stable identifier of one editable attribute of a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKey {
    Name,
    Description,
    SpaceType,
    Address,
    City,
    Country,
    PostalCode,
    Capacity,
    AreaSquareMeters,
    ManagerName,
    ManagerEmail,
    ManagerPhone,
    Website,
    ScreeningEquipment,
    SoundEquipment,
    AccessibilityFeatures,
    Documents,
    Photos,
}

impl FieldKey {
    pub const ALL: [FieldKey; 18] = [
        Self::Name,
        Self::Description,
        Self::SpaceType,
        Self::Address,
        Self::City,
        Self::Country,
        Self::PostalCode,
        Self::Capacity,
        Self::AreaSquareMeters,
        Self::ManagerName,
        Self::ManagerEmail,
        Self::ManagerPhone,
        Self::Website,
        Self::ScreeningEquipment,
        Self::SoundEquipment,
        Self::AccessibilityFeatures,
        Self::Documents,
        Self::Photos,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Description => "description",
            Self::SpaceType => "spaceType",
            Self::Address => "address",
            Self::City => "city",
            Self::Country => "country",
            Self::PostalCode => "postalCode",
            Self::Capacity => "capacity",
            Self::AreaSquareMeters => "areaSquareMeters",
            Self::ManagerName => "managerName",
            Self::ManagerEmail => "managerEmail",
            Self::ManagerPhone => "managerPhone",
            Self::Website => "website",
            Self::ScreeningEquipment => "screeningEquipment",
            Self::SoundEquipment => "soundEquipment",
            Self::AccessibilityFeatures => "accessibilityFeatures",
            Self::Documents => "documents",
            Self::Photos => "photos",
        }
    }
}

impl std::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKey {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| WorkflowError::UnknownField {
                field: s.to_string(),
            })
    }
}

/// The versioned domain data of a space. Documents and photos hold asset
/// references (IDs or URLs), never binary content.
pub type SpaceFields = BTreeMap<FieldKey, serde_json::Value>;

/// Parse a loosely keyed payload into [`SpaceFields`].
///
/// Fails closed: one unknown key rejects the whole payload.
pub fn parse_fields(raw: BTreeMap<String, serde_json::Value>) -> Result<SpaceFields, WorkflowError> {
    raw.into_iter()
        .map(|(key, value)| Ok((key.parse::<FieldKey>()?, value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_key_roundtrip() {
        for key in FieldKey::ALL {
            let parsed: FieldKey = key.as_str().parse().unwrap();
            assert_eq!(parsed, key);
        }
        assert!("colour".parse::<FieldKey>().is_err());
    }

    #[test]
    fn test_serde_matches_as_str() {
        for key in FieldKey::ALL {
            let json = serde_json::to_string(&key).unwrap();
            assert_eq!(json, format!("\"{}\"", key.as_str()));
        }
    }

    #[test]
    fn test_parse_fields_accepts_known_keys() {
        let raw = BTreeMap::from([
            ("name".to_string(), json!("Cine Rex")),
            ("capacity".to_string(), json!(200)),
        ]);
        let fields = parse_fields(raw).unwrap();
        assert_eq!(fields.get(&FieldKey::Capacity), Some(&json!(200)));
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_parse_fields_rejects_unknown_key() {
        let raw = BTreeMap::from([
            ("name".to_string(), json!("Cine Rex")),
            ("seatColour".to_string(), json!("red")),
        ]);
        match parse_fields(raw) {
            Err(WorkflowError::UnknownField { field }) => assert_eq!(field, "seatColour"),
            other => panic!("Expected UnknownField, got {other:?}"),
        }
    }

    #[test]
    fn test_space_fields_serialize_as_json_object() {
        let mut fields = SpaceFields::new();
        fields.insert(FieldKey::ManagerEmail, json!("ops@rex.example"));
        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json, json!({"managerEmail": "ops@rex.example"}));

        let back: SpaceFields = serde_json::from_value(json).unwrap();
        assert_eq!(back, fields);
    }
}
