//! Serializers turning a store's mapping into an entry payload and back

use crate::error::{MellonError, MellonResult};

use super::StoreData;

/// Converts a whole store mapping to text and back
///
/// Implementations:
/// - `YamlSerializer`: the default, human-editable in Keychain Access
/// - `JsonSerializer`: compact single-document JSON
pub trait Serializer: Send + Sync {
    /// Short name used by the serializer registry and in errors
    fn name(&self) -> &str;

    fn dump(&self, data: &StoreData) -> MellonResult<String>;

    /// Parse a payload. Blank and `null` documents load as an empty mapping.
    fn load(&self, text: &str) -> MellonResult<StoreData>;
}

/// YAML serializer backed by `serde_yaml`
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlSerializer;

impl Serializer for YamlSerializer {
    fn name(&self) -> &str {
        "yaml"
    }

    fn dump(&self, data: &StoreData) -> MellonResult<String> {
        serde_yaml::to_string(data).map_err(|e| MellonError::serialization(self.name(), e))
    }

    fn load(&self, text: &str) -> MellonResult<StoreData> {
        if text.trim().is_empty() {
            return Ok(StoreData::new());
        }
        let data: Option<StoreData> =
            serde_yaml::from_str(text).map_err(|e| MellonError::serialization(self.name(), e))?;
        Ok(data.unwrap_or_default())
    }
}

/// JSON serializer backed by `serde_json`
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &str {
        "json"
    }

    fn dump(&self, data: &StoreData) -> MellonResult<String> {
        serde_json::to_string(data).map_err(|e| MellonError::serialization(self.name(), e))
    }

    fn load(&self, text: &str) -> MellonResult<StoreData> {
        if text.trim().is_empty() {
            return Ok(StoreData::new());
        }
        let data: Option<StoreData> =
            serde_json::from_str(text).map_err(|e| MellonError::serialization(self.name(), e))?;
        Ok(data.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> StoreData {
        let mut data = StoreData::new();
        data.insert("some value".into(), json!("This is some yaml value"));
        data.insert("port".into(), json!(5432));
        data.insert("hosts".into(), json!(["a", "b"]));
        data
    }

    #[test]
    fn test_yaml_text_is_readable() {
        let text = YamlSerializer.dump(&sample()).unwrap();
        assert!(text.contains("some value: This is some yaml value"));
        assert!(text.contains("port: 5432"));
        assert_eq!(YamlSerializer.load(&text).unwrap(), sample());
    }

    #[test]
    fn test_yaml_loads_hand_written_document() {
        let data = YamlSerializer
            .load("---\nsome value: This is some yaml value\nnested:\n  key: 1\n")
            .unwrap();
        assert_eq!(data["some value"], json!("This is some yaml value"));
        assert_eq!(data["nested"], json!({"key": 1}));
    }

    #[test]
    fn test_blank_and_null_documents_are_empty() {
        assert!(YamlSerializer.load("").unwrap().is_empty());
        assert!(YamlSerializer.load("~").unwrap().is_empty());
        assert!(JsonSerializer.load("  \n").unwrap().is_empty());
        assert!(JsonSerializer.load("null").unwrap().is_empty());
    }

    #[test]
    fn test_json_rejects_garbage() {
        let err = JsonSerializer.load("{not json").unwrap_err();
        assert!(matches!(err, MellonError::Serialization { ref format, .. } if format == "json"));
    }

    #[test]
    fn test_json_single_line() {
        let text = JsonSerializer.dump(&sample()).unwrap();
        assert!(!text.contains('\n'));
        assert_eq!(JsonSerializer.load(&text).unwrap(), sample());
    }
}
