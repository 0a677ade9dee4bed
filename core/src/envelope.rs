//! Normalization of the backend's response envelopes.
//!
//! # Design
//! The backend has answered list and document requests in several shapes over
//! time. Instead of probing fields ad hoc at every call site, a body is first
//! classified into `Envelope`, then projected into either the canonical
//! `PaginatedResult` or a single document. A shape outside the enum is an
//! `ApiError::UnrecognizedEnvelope`, never an empty default, and a document
//! without an `id` is an `ApiError::MissingId`, never a placeholder.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::types::{PageMeta, PaginatedResult};

/// Every response shape the backend is known to produce.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// `{"data": [..], "meta": {..}}`
    Paginated { data: Vec<Value>, meta: Option<PageMeta> },
    /// `{"data": {"data": [..], "meta": {..}}}`
    Nested { data: Vec<Value>, meta: Option<PageMeta> },
    /// `[..]`
    BareArray(Vec<Value>),
    /// `{"data": {..}}`
    Wrapped(Map<String, Value>),
    /// `{..}`
    BareObject(Map<String, Value>),
}

impl Envelope {
    pub fn parse(body: &str) -> Result<Self, ApiError> {
        let value: Value = serde_json::from_str(body)?;
        Self::classify(value)
    }

    pub fn classify(value: Value) -> Result<Self, ApiError> {
        let mut outer = match value {
            Value::Array(items) => return Ok(Envelope::BareArray(items)),
            Value::Object(map) => map,
            other => {
                return Err(ApiError::UnrecognizedEnvelope(format!(
                    "top-level {}",
                    kind(&other)
                )))
            }
        };

        // a document may carry its own `data` field
        if outer.contains_key("id") {
            return Ok(Envelope::BareObject(outer));
        }
        let Some(data) = outer.remove("data") else {
            return Ok(Envelope::BareObject(outer));
        };

        match data {
            Value::Array(items) => Ok(Envelope::Paginated {
                data: items,
                meta: parse_meta(outer.remove("meta"))?,
            }),
            Value::Object(inner) if inner.contains_key("id") => Ok(Envelope::Wrapped(inner)),
            Value::Object(mut inner) => match inner.remove("data") {
                Some(Value::Array(items)) => {
                    let meta = match inner.remove("meta") {
                        Some(meta) => parse_meta(Some(meta))?,
                        None => parse_meta(outer.remove("meta"))?,
                    };
                    Ok(Envelope::Nested { data: items, meta })
                }
                Some(Value::Object(document)) => Ok(Envelope::Wrapped(document)),
                Some(other) => Err(ApiError::UnrecognizedEnvelope(format!(
                    "`data.data` is {}",
                    kind(&other)
                ))),
                None => Ok(Envelope::Wrapped(inner)),
            },
            other => Err(ApiError::UnrecognizedEnvelope(format!(
                "`data` is {}",
                kind(&other)
            ))),
        }
    }

    /// Project a list envelope into the canonical page of documents.
    pub fn into_page<T: DeserializeOwned>(self) -> Result<PaginatedResult<T>, ApiError> {
        let (items, meta) = match self {
            Envelope::Paginated { data, meta } | Envelope::Nested { data, meta } => (data, meta),
            Envelope::BareArray(data) => (data, None),
            Envelope::Wrapped(_) | Envelope::BareObject(_) => {
                return Err(ApiError::UnrecognizedEnvelope(
                    "expected a list of documents, found a single object".to_string(),
                ))
            }
        };
        let meta = meta.unwrap_or_else(|| PageMeta::single_page(items.len()));
        let data = items
            .into_iter()
            .map(document)
            .collect::<Result<Vec<T>, _>>()?;
        Ok(PaginatedResult { data, meta })
    }

    /// Project a single-document envelope into `T`, requiring an `id`.
    pub fn into_document<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        document(Value::Object(self.into_object()?))
    }

    /// Project a single-object envelope into `T` without the `id` requirement.
    pub fn into_payload<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        Ok(serde_json::from_value(Value::Object(self.into_object()?))?)
    }

    fn into_object(self) -> Result<Map<String, Value>, ApiError> {
        match self {
            Envelope::Wrapped(map) | Envelope::BareObject(map) => Ok(map),
            _ => Err(ApiError::UnrecognizedEnvelope(
                "expected a single object, found a list".to_string(),
            )),
        }
    }
}

fn document<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    let has_id = match value.get("id") {
        Some(Value::String(id)) => !id.is_empty(),
        Some(Value::Number(_)) => true,
        _ => false,
    };
    if !has_id {
        return Err(ApiError::MissingId);
    }
    Ok(serde_json::from_value(value)?)
}

fn parse_meta(meta: Option<Value>) -> Result<Option<PageMeta>, ApiError> {
    match meta {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| ApiError::UnrecognizedEnvelope(format!("invalid `meta`: {e}"))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(text) => text,
            RawId::Number(number) => number.to_string(),
        }
    }
}

/// Accept string or numeric ids, rendering numbers as strings.
pub(crate) fn id_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let id: String = RawId::deserialize(deserializer)?.into();
    if id.is_empty() {
        return Err(de::Error::custom("empty id"));
    }
    Ok(id)
}

pub(crate) fn optional_id_as_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Task;
    use serde_json::json;

    fn task(id: &str, title: &str) -> Value {
        json!({
            "id": id,
            "title": title,
            "status": false,
            "priority": "low",
            "created_at": "2024-03-01T10:00:00Z",
            "updated_at": "2024-03-01T10:00:00Z"
        })
    }

    #[test]
    fn paginated_envelope_keeps_meta() {
        let body = json!({
            "data": [task("a", "One"), task("b", "Two")],
            "meta": {"page": 2, "limit": 2, "total": 6, "pages": 3}
        });
        let page: PaginatedResult<Task> = Envelope::classify(body).unwrap().into_page().unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.data[1].title, "Two");
        assert_eq!(page.meta.pages, 3);
        assert_eq!(page.meta.total, 6);
    }

    #[test]
    fn nested_envelope_is_flattened() {
        let body = json!({
            "data": {"data": [task("a", "One")], "meta": {"page": 1, "limit": 10, "total": 1, "pages": 1}}
        });
        let envelope = Envelope::classify(body).unwrap();
        assert!(matches!(envelope, Envelope::Nested { .. }));
        let page: PaginatedResult<Task> = envelope.into_page().unwrap();
        assert_eq!(page.data[0].id, "a");
        assert_eq!(page.meta.limit, 10);
    }

    #[test]
    fn bare_array_gets_synthesized_meta() {
        let body = json!([task("a", "One"), task("b", "Two"), task("c", "Three")]);
        let page: PaginatedResult<Task> = Envelope::classify(body).unwrap().into_page().unwrap();
        assert_eq!(page.meta, PageMeta::single_page(3));
    }

    #[test]
    fn wrapped_and_bare_documents_decode_alike() {
        let wrapped: Task = Envelope::classify(json!({"data": task("a", "One")}))
            .unwrap()
            .into_document()
            .unwrap();
        let bare: Task = Envelope::classify(task("a", "One"))
            .unwrap()
            .into_document()
            .unwrap();
        assert_eq!(wrapped, bare);
    }

    #[test]
    fn document_with_its_own_data_field_is_not_unwrapped() {
        let doc = json!({"id": "d1", "data": [1, 2], "title": "Chart"});

        let bare = Envelope::classify(doc.clone()).unwrap();
        assert!(matches!(bare, Envelope::BareObject(_)));
        let decoded: Map<String, Value> = bare.into_document().unwrap();
        assert_eq!(decoded["data"], json!([1, 2]));

        let wrapped = Envelope::classify(json!({ "data": doc })).unwrap();
        assert!(matches!(wrapped, Envelope::Wrapped(_)));
        let decoded: Map<String, Value> = wrapped.into_document().unwrap();
        assert_eq!(decoded["id"], "d1");
        assert_eq!(decoded["data"], json!([1, 2]));
    }

    #[test]
    fn scalar_body_is_rejected() {
        let err = Envelope::classify(json!("ok")).unwrap_err();
        assert!(matches!(err, ApiError::UnrecognizedEnvelope(_)));

        let err = Envelope::classify(json!({"data": 42})).unwrap_err();
        assert!(matches!(err, ApiError::UnrecognizedEnvelope(_)));
    }

    #[test]
    fn single_object_is_not_a_list() {
        let err = Envelope::classify(task("a", "One"))
            .unwrap()
            .into_page::<Task>()
            .unwrap_err();
        assert!(matches!(err, ApiError::UnrecognizedEnvelope(_)));
    }

    #[test]
    fn missing_id_is_a_hard_error() {
        let mut doc = task("a", "One");
        doc.as_object_mut().unwrap().remove("id");
        let err = Envelope::classify(json!({"data": [doc]}))
            .unwrap()
            .into_page::<Task>()
            .unwrap_err();
        assert_eq!(err, ApiError::MissingId);

        let err = Envelope::classify(task("", "Blank"))
            .unwrap()
            .into_document::<Task>()
            .unwrap_err();
        assert_eq!(err, ApiError::MissingId);
    }

    #[test]
    fn invalid_meta_is_reported() {
        let err = Envelope::classify(json!({"data": [], "meta": "page one"})).unwrap_err();
        assert!(matches!(err, ApiError::UnrecognizedEnvelope(_)));
    }

    #[test]
    fn non_json_body_is_a_deserialization_error() {
        let err = Envelope::parse("<html>").unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));
    }
}
