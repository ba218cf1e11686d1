use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::SerializationContext;
use crate::error::RestError;
use crate::response::{ApiResponse, Data, Model};
use crate::serializer::{Format, SerializerError, SharedSerializer, kind_of};

use super::ResponseTransformer;

/// Whether `value` is list-shaped: an array, or an object whose keys are
/// exactly `"0"..="n-1"`.
#[must_use]
pub fn is_sequential(value: &Value) -> bool {
    match value {
        Value::Array(_) => true,
        Value::Object(map) => {
            let mut seen = vec![false; map.len()];
            for key in map.keys() {
                match key.parse::<usize>() {
                    Ok(index) if index < seen.len() && index.to_string() == *key => {
                        seen[index] = true;
                    }
                    _ => return false,
                }
            }
            seen.into_iter().all(|hit| hit)
        }
        _ => false,
    }
}

fn is_filled(value: &Value) -> bool {
    match value {
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => false,
    }
}

fn ensure_sequential(value: &Value) -> Result<(), SerializerError> {
    if is_sequential(value) {
        Ok(())
    } else {
        Err(SerializerError::NotAList {
            found: kind_of(value).to_owned(),
        })
    }
}

/// Elements of a sequential value in index order. Callers check the shape
/// with [`ensure_sequential`] first.
fn elements(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(map) => {
            let mut indexed: Vec<(usize, Value)> = map
                .into_iter()
                .filter_map(|(key, item)| key.parse().ok().map(|index| (index, item)))
                .collect();
            indexed.sort_by_key(|(index, _)| *index);
            indexed.into_iter().map(|(_, item)| item).collect()
        }
        _ => Vec::new(),
    }
}

/// JSON data still held in the response slot.
fn pending_json(response: &dyn ApiResponse) -> Option<&Value> {
    response.data().and_then(Data::as_json)
}

/// Turns a single JSON object body into a `T`.
pub struct ObjectTransformer<T> {
    serializer: SharedSerializer,
    context: Option<SerializationContext>,
    _model: PhantomData<fn() -> T>,
}

impl<T> ObjectTransformer<T> {
    #[must_use]
    pub fn new(serializer: SharedSerializer) -> Self {
        Self {
            serializer,
            context: None,
            _model: PhantomData,
        }
    }

    /// Context used when the call itself carries none.
    #[must_use]
    pub fn with_context(mut self, context: SerializationContext) -> Self {
        self.context = Some(context);
        self
    }
}

impl<T> fmt::Debug for ObjectTransformer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectTransformer")
            .field("model", &std::any::type_name::<T>())
            .field("serializer", &self.serializer)
            .field("context", &self.context)
            .finish()
    }
}

impl<T: DeserializeOwned + Model> ResponseTransformer for ObjectTransformer<T> {
    fn supports(&self, response: &dyn ApiResponse) -> bool {
        response.is_successful()
            && pending_json(response)
                .is_some_and(|value| value.is_object() && is_filled(value) && !is_sequential(value))
    }

    fn transform(
        &self,
        response: &mut dyn ApiResponse,
        context: Option<&SerializationContext>,
    ) -> Result<(), RestError> {
        let context = context.or(self.context.as_ref());
        let model: T = self
            .serializer
            .deserialize(response.content(), Format::Json, context)?;
        response.set_data(Some(Data::model(model)));
        Ok(())
    }
}

/// Turns a list body, or the list values under selected keys of an object
/// body, into `T` models.
///
/// Without mapping keys the whole body must be sequential and becomes a
/// [`Data::List`]. With mapping keys the body must contain at least one of
/// them and each present one must hold a sequential value; the result is a
/// [`Data::Map`] where mapped keys hold lists of models and the remaining
/// keys keep their JSON.
pub struct ObjectCollectionTransformer<T> {
    serializer: SharedSerializer,
    context: Option<SerializationContext>,
    mapping_keys: Option<Vec<String>>,
    _model: PhantomData<fn() -> T>,
}

impl<T> ObjectCollectionTransformer<T> {
    #[must_use]
    pub fn new(serializer: SharedSerializer) -> Self {
        Self {
            serializer,
            context: None,
            mapping_keys: None,
            _model: PhantomData,
        }
    }

    /// Restricts the transformation to the values under `keys`. An empty
    /// list means the whole body.
    #[must_use]
    pub fn with_mapping_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        self.mapping_keys = (!keys.is_empty()).then_some(keys);
        self
    }

    /// Context used when the call itself carries none.
    #[must_use]
    pub fn with_context(mut self, context: SerializationContext) -> Self {
        self.context = Some(context);
        self
    }

    #[must_use]
    pub fn mapping_keys(&self) -> Option<&[String]> {
        self.mapping_keys.as_deref()
    }
}

impl<T: DeserializeOwned + Model> ObjectCollectionTransformer<T> {
    /// Every value the transformation would decode must be sequential.
    fn check_shape(&self, value: &Value) -> Result<(), SerializerError> {
        match (&self.mapping_keys, value) {
            (Some(keys), Value::Object(map)) => keys
                .iter()
                .filter_map(|key| map.get(key))
                .try_for_each(ensure_sequential),
            _ => ensure_sequential(value),
        }
    }

    fn models(
        &self,
        value: Value,
        context: Option<&SerializationContext>,
    ) -> Result<Data, RestError> {
        let mut models = Vec::new();
        for element in elements(value) {
            let payload = serde_json::to_string(&element).map_err(SerializerError::from)?;
            let model: T = self.serializer.deserialize(&payload, Format::Json, context)?;
            models.push(Data::model(model));
        }
        Ok(Data::List(models))
    }
}

impl<T> fmt::Debug for ObjectCollectionTransformer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCollectionTransformer")
            .field("model", &std::any::type_name::<T>())
            .field("serializer", &self.serializer)
            .field("context", &self.context)
            .field("mapping_keys", &self.mapping_keys)
            .finish()
    }
}

impl<T: DeserializeOwned + Model> ResponseTransformer for ObjectCollectionTransformer<T> {
    fn supports(&self, response: &dyn ApiResponse) -> bool {
        if !response.is_successful() {
            return false;
        }
        let Some(value) = pending_json(response).filter(|value| is_filled(value)) else {
            return false;
        };
        match &self.mapping_keys {
            None => is_sequential(value),
            Some(keys) => {
                let Value::Object(map) = value else {
                    return false;
                };
                let mut mapped = keys.iter().filter_map(|key| map.get(key)).peekable();
                mapped.peek().is_some() && mapped.all(is_sequential)
            }
        }
    }

    fn transform(
        &self,
        response: &mut dyn ApiResponse,
        context: Option<&SerializationContext>,
    ) -> Result<(), RestError> {
        let context = context.or(self.context.as_ref());
        if let Some(value) = pending_json(response) {
            self.check_shape(value)?;
        }
        let value = match response.take_data() {
            Some(Data::Json(value)) => value,
            other => {
                response.set_data(other);
                return Ok(());
            }
        };

        let data = match (&self.mapping_keys, value) {
            (Some(keys), Value::Object(map)) => {
                let mut entries = BTreeMap::new();
                for (key, item) in map {
                    let entry = if keys.contains(&key) {
                        self.models(item, context)?
                    } else {
                        Data::Json(item)
                    };
                    entries.insert(key, entry);
                }
                Data::Map(entries)
            }
            (_, value) => self.models(value, context)?,
        };
        response.set_data(Some(data));
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::metadata::{ClassMetadata, PropertyMetadata};
    use crate::response::Response;
    use crate::serializer::SerializerBuilder;
    use crate::transform::{ResponseStep, ResponseTransform};
    use http::header::{CONTENT_TYPE, HeaderValue};
    use http::{HeaderMap, StatusCode};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Article {
        heading: String,
        #[serde(default)]
        body: Option<String>,
    }

    fn article(heading: &str, body: &str) -> Article {
        Article {
            heading: heading.to_owned(),
            body: Some(body.to_owned()),
        }
    }

    fn response(status: StatusCode, body: &str) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Response::new(status, headers, body.to_owned()).unwrap()
    }

    fn serializer() -> SharedSerializer {
        SerializerBuilder::default().build().unwrap()
    }

    #[test]
    fn test_sequential_detection() {
        assert!(is_sequential(&json!([])));
        assert!(is_sequential(&json!([1, 2])));
        assert!(is_sequential(&json!({"0": "a", "1": "b"})));
        assert!(is_sequential(&json!({"1": "b", "0": "a"})));
        assert!(!is_sequential(&json!({"0": "a", "2": "b"})));
        assert!(!is_sequential(&json!({"00": "a"})));
        assert!(!is_sequential(&json!({"heading": "h"})));
        assert!(!is_sequential(&json!("x")));
    }

    #[test]
    fn test_object_transformer_builds_model() {
        let transformer = ObjectTransformer::<Article>::new(serializer());
        let mut response = response(StatusCode::OK, r#"{"heading":"heading 1","body":"body 1"}"#);

        assert!(transformer.supports(&response));
        transformer.transform(&mut response, None).unwrap();
        assert_eq!(response.model::<Article>(), Some(&article("heading 1", "body 1")));
    }

    #[test]
    fn test_object_transformer_rejects_lists_and_failures() {
        let transformer = ObjectTransformer::<Article>::new(serializer());

        assert!(!transformer.supports(&response(StatusCode::OK, r#"[{"heading":"h"}]"#)));
        assert!(!transformer.supports(&response(StatusCode::OK, r#"{"0":{"heading":"h"}}"#)));
        assert!(!transformer.supports(&response(StatusCode::OK, "{}")));
        assert!(!transformer.supports(&response(StatusCode::NOT_FOUND, r#"{"heading":"h"}"#)));
        assert!(!transformer.supports(&response(StatusCode::OK, "")));
    }

    #[test]
    fn test_object_transformer_default_context() {
        let serializer = SerializerBuilder::default()
            .register::<Article>(
                ClassMetadata::new()
                    .property("heading", PropertyMetadata::new().groups(["list", "detail"]))
                    .property("body", PropertyMetadata::new().groups(["detail"])),
            )
            .build()
            .unwrap();
        let transformer = ObjectTransformer::<Article>::new(serializer)
            .with_context(SerializationContext::for_groups(["list"]));
        let mut response = response(StatusCode::OK, r#"{"heading":"h","body":"b"}"#);

        transformer.transform(&mut response, None).unwrap();
        assert_eq!(response.model::<Article>().unwrap().body, None);

        let mut response = self::response(StatusCode::OK, r#"{"heading":"h","body":"b"}"#);
        let call = SerializationContext::for_groups(["detail"]);
        transformer.transform(&mut response, Some(&call)).unwrap();
        assert_eq!(response.model::<Article>().unwrap().body.as_deref(), Some("b"));
    }

    #[test]
    fn test_collection_from_array() {
        let transformer = ObjectCollectionTransformer::<Article>::new(serializer());
        let mut response = response(
            StatusCode::OK,
            r#"[{"heading":"h1","body":"b1"},{"heading":"h2","body":"b2"}]"#,
        );

        assert!(transformer.supports(&response));
        transformer.transform(&mut response, None).unwrap();
        assert_eq!(
            response.models::<Article>().unwrap(),
            vec![&article("h1", "b1"), &article("h2", "b2")]
        );
    }

    #[test]
    fn test_collection_from_indexed_object_keeps_order() {
        let transformer = ObjectCollectionTransformer::<Article>::new(serializer());
        let mut response = response(
            StatusCode::OK,
            r#"{"1":{"heading":"second"},"0":{"heading":"first"}}"#,
        );

        transformer.transform(&mut response, None).unwrap();
        let headings: Vec<&str> = response
            .models::<Article>()
            .unwrap()
            .into_iter()
            .map(|a| a.heading.as_str())
            .collect();
        assert_eq!(headings, ["first", "second"]);
    }

    #[test]
    fn test_collection_rejects_single_object() {
        let transformer = ObjectCollectionTransformer::<Article>::new(serializer());
        assert!(!transformer.supports(&response(StatusCode::OK, r#"{"heading":"h"}"#)));
        assert!(!transformer.supports(&response(StatusCode::OK, "[]")));
        assert!(!transformer.supports(&response(StatusCode::BAD_REQUEST, r#"[{"heading":"h"}]"#)));
    }

    #[test]
    fn test_collection_with_mapping_keys() {
        let transformer = ObjectCollectionTransformer::<Article>::new(serializer())
            .with_mapping_keys(["updated", "deleted"]);
        let mut response = response(
            StatusCode::OK,
            r#"{"updated":[{"heading":"u1"},{"heading":"u2"}],"deleted":[{"heading":"d1"}],"total":3}"#,
        );

        assert!(transformer.supports(&response));
        transformer.transform(&mut response, None).unwrap();

        let data = response.data().unwrap();
        assert_eq!(data.get("updated").unwrap().models::<Article>().unwrap().len(), 2);
        assert_eq!(
            data.get("deleted").unwrap().models::<Article>().unwrap()[0].heading,
            "d1"
        );
        assert_eq!(data.get("total").and_then(Data::as_json), Some(&json!(3)));
    }

    #[test]
    fn test_mapping_keys_must_exist_and_be_sequential() {
        let transformer = ObjectCollectionTransformer::<Article>::new(serializer())
            .with_mapping_keys(["updated"]);

        assert!(!transformer.supports(&response(StatusCode::OK, r#"{"other":[{"heading":"h"}]}"#)));
        assert!(!transformer.supports(&response(StatusCode::OK, r#"{"updated":{"heading":"h"}}"#)));
        assert!(!transformer.supports(&response(StatusCode::OK, r#"[{"heading":"h"}]"#)));
        assert!(transformer.supports(&response(StatusCode::OK, r#"{"updated":[]}"#)));
    }

    #[test]
    fn test_empty_mapping_keys_mean_whole_body() {
        let transformer = ObjectCollectionTransformer::<Article>::new(serializer())
            .with_mapping_keys(Vec::<String>::new());
        assert!(transformer.mapping_keys().is_none());
        assert!(transformer.supports(&response(StatusCode::OK, r#"[{"heading":"h"}]"#)));
    }

    #[test]
    fn test_transformed_data_is_not_picked_up_again() {
        let pipeline = ResponseTransform::new(vec![
            ResponseStep::transformer(ObjectCollectionTransformer::<Article>::new(serializer())),
            ResponseStep::transformer(ObjectTransformer::<Article>::new(serializer())),
        ]);
        let mut response = response(StatusCode::OK, r#"{"0":{"heading":"h"}}"#);

        pipeline.transform(&mut response, None).unwrap();
        assert_eq!(response.models::<Article>().unwrap().len(), 1);
    }

    #[test]
    fn test_element_mismatch_is_serialization_error() {
        let transformer = ObjectCollectionTransformer::<Article>::new(serializer());
        let mut response = response(StatusCode::OK, r#"[{"body":"no heading"}]"#);
        let err = transformer.transform(&mut response, None).unwrap_err();
        assert!(matches!(err, RestError::Serialization(_)));
    }

    #[test]
    fn test_non_sequential_body_rejected_without_losing_data() {
        let transformer = ObjectCollectionTransformer::<Article>::new(serializer());
        for body in [r#"{"0":{"heading":"h"},"next":"cursor"}"#, "42"] {
            let mut response = response(StatusCode::OK, body);
            let before = response.json().cloned();

            let err = transformer.transform(&mut response, None).unwrap_err();

            assert!(
                matches!(err, RestError::Serialization(SerializerError::NotAList { .. })),
                "{body}: {err:?}"
            );
            assert_eq!(response.json().cloned(), before);
        }
    }

    #[test]
    fn test_mapped_key_holding_an_object_rejected() {
        let transformer = ObjectCollectionTransformer::<Article>::new(serializer())
            .with_mapping_keys(["updated"]);
        let mut response = response(StatusCode::OK, r#"{"updated":{"heading":"h"},"total":1}"#);

        let err = transformer.transform(&mut response, None).unwrap_err();

        assert!(matches!(
            err,
            RestError::Serialization(SerializerError::NotAList { ref found }) if found == "object"
        ));
        assert!(response.json().is_some());
    }
}
