//! value representation
//!
//! Declaration bodies are loaded into the following data types
//! - null
//! - boolean (true/false)
//! - integer (signed, i64)
//! - decimal (f64)
//! - string (utf-8)
//! - array ("list" of values)
//! - object (order-preserving "map"/"dictionary", where the key is of type string)
//! - tagged (a YAML-native tag such as `!Sub` and the value it applies to)
//!
//! Mapping keys that are not strings in the source document are converted to their
//! textual representation. Order of object keys is the order of the source document
//! and is the order in which they are rendered.
use indexmap::IndexMap;
use serde::{
    ser::{SerializeMap, SerializeSeq},
    Serializer,
};

pub type Object = IndexMap<String, Value>;

/// All possible value types
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    Array(Vec<Value>),
    Object(Object),
    Tagged { tag: String, value: Box<Value> },
}

impl Value {
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(
            self,
            Value::Array(_) | Value::Object(_) | Value::Tagged { .. }
        )
    }

    /// Textual form of a scalar, as it is written into a template
    ///
    /// Returns `None` for collections and tagged values.
    pub fn to_scalar_string(&self) -> Option<String> {
        match self {
            Value::Null => Some("null".to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Decimal(d) => Some(decimal_to_string(*d)),
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Short name of the value type for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Tagged { .. } => "tagged value",
        }
    }
}

/// YAML float notation; `Debug` keeps the fraction (`1.0`), `Display` would not
fn decimal_to_string(value: f64) -> String {
    if value.is_nan() {
        ".nan".to_string()
    } else if value.is_infinite() {
        if value.is_sign_negative() { "-.inf" } else { ".inf" }.to_string()
    } else {
        format!("{value:?}")
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl From<serde_yaml::Number> for Value {
    fn from(value: serde_yaml::Number) -> Self {
        if let Some(int) = value.as_i64() {
            return Value::Integer(int);
        }

        // u64 beyond i64::MAX and floats both end up here
        Value::Decimal(value.as_f64().unwrap_or(f64::NAN))
    }
}

impl From<serde_yaml::Value> for Value {
    fn from(value: serde_yaml::Value) -> Value {
        use serde_yaml::Value as Yaml;

        match value {
            Yaml::Null => Value::Null,
            Yaml::Bool(b) => b.into(),
            Yaml::Number(n) => n.into(),
            Yaml::String(s) => s.into(),
            Yaml::Sequence(seq) => seq.into(),
            Yaml::Mapping(mapping) => Value::Object(
                mapping
                    .into_iter()
                    .map(|(k, v)| (key_to_string(k), v.into()))
                    .collect(),
            ),
            Yaml::Tagged(tagged) => {
                let tagged = *tagged;
                Value::Tagged {
                    tag: tagged.tag.to_string().trim_start_matches('!').to_string(),
                    value: Box::new(tagged.value.into()),
                }
            }
        }
    }
}

fn key_to_string(key: serde_yaml::Value) -> String {
    match Value::from(key) {
        Value::String(s) => s,
        other => other
            .to_scalar_string()
            .unwrap_or_else(|| format!("{other:?}")),
    }
}

impl serde::ser::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Boolean(value) => serializer.serialize_bool(*value),
            Value::Integer(value) => serializer.serialize_i64(*value),
            Value::Decimal(value) => serializer.serialize_f64(*value),
            Value::String(value) => serializer.serialize_str(value),
            Value::Array(value) => {
                let mut ser = serializer.serialize_seq(Some(value.len()))?;
                for element in value {
                    ser.serialize_element(element)?;
                }
                ser.end()
            }
            Value::Object(value) => {
                let mut ser = serializer.serialize_map(Some(value.len()))?;
                for (element_key, element_value) in value {
                    ser.serialize_entry(element_key, element_value)?;
                }
                ser.end()
            }
            Value::Tagged { tag, value } => {
                let mut ser = serializer.serialize_map(Some(1))?;
                ser.serialize_entry(&format!("!{tag}"), value)?;
                ser.end()
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn yaml(input: &str) -> Value {
        serde_yaml::from_str::<serde_yaml::Value>(input)
            .expect("valid yaml")
            .into()
    }

    #[test]
    fn object_keeps_source_order() {
        let value = yaml("zeta: 1\nalpha: 2\nmid: 3");
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn non_string_keys_become_strings() {
        let value = yaml("80: http\ntrue: yes");
        let object = value.as_object().unwrap();
        assert_eq!(object.get("80"), Some(&Value::from("http")));
        assert!(object.contains_key("true"));
    }

    #[test]
    fn tags_are_preserved() {
        let value = yaml("!Sub '${AWS::Region}-bucket'");
        assert_eq!(
            value,
            Value::Tagged {
                tag: "Sub".to_string(),
                value: Box::new(Value::from("${AWS::Region}-bucket")),
            }
        );
    }

    #[test]
    fn scalar_strings() {
        assert_eq!(yaml("true").to_scalar_string().as_deref(), Some("true"));
        assert_eq!(yaml("42").to_scalar_string().as_deref(), Some("42"));
        assert_eq!(yaml("~").to_scalar_string().as_deref(), Some("null"));
        assert_eq!(yaml("[1]").to_scalar_string(), None);
    }

    #[test]
    fn decimals_stay_decimals() {
        for (input, expected) in [
            ("1.0", "1.0"),
            ("2.5", "2.5"),
            ("-0.125", "-0.125"),
            (".inf", ".inf"),
            ("-.inf", "-.inf"),
            (".nan", ".nan"),
        ] {
            assert_eq!(yaml(input).to_scalar_string().as_deref(), Some(expected), "{input}");
        }

        let written = yaml("1e20").to_scalar_string().unwrap();
        let read: f64 = serde_yaml::from_str(&written).unwrap();
        assert_eq!(read, 1e20);
    }
}
