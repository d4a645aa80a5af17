use std::{
    fmt,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::Value;

use crate::error::AmmoError;

/// One unit of load: a single call of `call` with `payload` as its request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ammo {
    pub tag: String,
    /// fully-qualified method name, `package.Service.Method`
    pub call: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default = "empty_payload")]
    pub payload: Value,
}
fn empty_payload() -> Value {
    Value::Object(Default::default())
}

impl Ammo {
    pub fn new<T: Into<String>, C: Into<String>>(tag: T, call: C, payload: Value) -> Self {
        Self { tag: tag.into(), call: call.into(), metadata: None, payload }
    }
    pub fn with_metadata<I, K, V>(self, metadata: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self { metadata: Some(metadata.into_iter().collect()), ..self }
    }
}

/// Request metadata in document order. A key given twice keeps both entries here, and the
/// later one wins when attached to the request. Order also survives a trip through
/// [`serde_json::Value`], whose objects keep insertion order in this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Metadata(pub Vec<(String, String)>);
impl Metadata {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MetadataVisitor;
        impl<'de> Visitor<'de> for MetadataVisitor {
            type Value = Metadata;
            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of string metadata values")
            }
            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or_default());
                while let Some(entry) = access.next_entry()? {
                    entries.push(entry);
                }
                Ok(Metadata(entries))
            }
        }
        deserializer.deserialize_map(MetadataVisitor)
    }
}

/// Read json lines ammo. Blank lines are skipped, and errors carry the 1-based line number.
pub fn read<R: BufRead>(reader: R) -> impl Iterator<Item = Result<Ammo, AmmoError>> {
    reader.lines().enumerate().filter_map(|(i, line)| match line {
        Err(e) => Some(Err(AmmoError::Io(e))),
        Ok(line) if line.trim().is_empty() => None,
        Ok(line) => Some(serde_json::from_str(&line).map_err(|source| AmmoError::Parse { line: i + 1, source })),
    })
}

pub fn read_file<A: AsRef<Path>>(path: A) -> Result<Vec<Ammo>, AmmoError> {
    read(BufReader::new(File::open(path)?)).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_deserialize_ammo() {
        let ammo: Ammo = serde_json::from_value(json!({
            "tag": "t1",
            "call": "pkg.Svc.Echo",
            "metadata": {"x": "1", "authorization": "Bearer token"},
            "payload": {"msg": "hi"},
        }))
        .unwrap();
        assert_eq!(
            ammo,
            Ammo::new("t1", "pkg.Svc.Echo", json!({"msg": "hi"}))
                .with_metadata([("x", "1"), ("authorization", "Bearer token")])
        );
    }

    #[test]
    fn test_defaults() {
        let ammo: Ammo = serde_json::from_str(r#"{"tag": "t", "call": "pkg.Svc.Echo"}"#).unwrap();
        assert_eq!(ammo.metadata, None);
        assert_eq!(ammo.payload, json!({}));
        assert!(serde_json::from_str::<Ammo>(r#"{"tag": "t"}"#).is_err());
    }

    #[test]
    fn test_metadata_keeps_document_order() {
        let metadata: Metadata = serde_json::from_str(r#"{"b": "1", "a": "2", "b": "3"}"#).unwrap();
        assert_eq!(metadata.iter().collect::<Vec<_>>(), vec![("b", "1"), ("a", "2"), ("b", "3")]);
        assert!(serde_json::from_str::<Metadata>(r#"{"a": 1}"#).is_err());
        assert_eq!(serde_json::to_string(&metadata).unwrap(), r#"{"b":"1","a":"2","b":"3"}"#);
    }

    #[test]
    fn test_metadata_order_through_value() {
        let value: serde_json::Value = serde_json::from_str(
            r#"{"tag": "t", "call": "pkg.Svc.Echo", "metadata": {"x": "first", "X": "last", "a": "0"}}"#,
        )
        .unwrap();
        let ammo: Ammo = serde_json::from_value(value).unwrap();
        assert_eq!(
            ammo.metadata.unwrap().iter().collect::<Vec<_>>(),
            vec![("x", "first"), ("X", "last"), ("a", "0")]
        );
    }

    #[test]
    fn test_read_json_lines() {
        let lines = indoc::indoc! {r#"
            {"tag": "a", "call": "pkg.Svc.Echo", "payload": {"msg": "1"}}

            {"tag": "b", "call": "pkg.Svc.Slow"}
            {"tag": "c", "call"
        "#};
        let ammo: Vec<_> = read(lines.as_bytes()).collect();
        assert_eq!(ammo.len(), 3);
        assert_eq!(ammo[0].as_ref().unwrap().tag, "a");
        assert_eq!(ammo[1].as_ref().unwrap().call, "pkg.Svc.Slow");
        assert!(matches!(ammo[2], Err(AmmoError::Parse { line: 4, .. })));
    }
}
