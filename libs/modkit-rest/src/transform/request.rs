use std::collections::BTreeMap;

use crate::context::SerializationContext;
use crate::error::RestError;
use crate::form::FormData;
use crate::serializer::SharedSerializer;

use super::RequestTransformer;

/// Maps typed objects in form data to plain mappings through the serializer.
///
/// A top-level object is replaced by its mapping; objects nested in mappings
/// or lists are converted in place.
#[derive(Debug, Clone)]
pub struct FormObjectTransformer {
    serializer: SharedSerializer,
    context: Option<SerializationContext>,
}

impl FormObjectTransformer {
    #[must_use]
    pub fn new(serializer: SharedSerializer) -> Self {
        Self {
            serializer,
            context: None,
        }
    }

    /// Context used when the call itself carries none.
    #[must_use]
    pub fn with_context(mut self, context: SerializationContext) -> Self {
        self.context = Some(context);
        self
    }

    fn convert(
        &self,
        form: FormData,
        context: Option<&SerializationContext>,
    ) -> Result<FormData, RestError> {
        Ok(match form {
            FormData::Object(payload) => payload.to_map(&self.serializer, context)?,
            FormData::Map(entries) => {
                let mut out = BTreeMap::new();
                for (key, value) in entries {
                    out.insert(key, self.convert(value, context)?);
                }
                FormData::Map(out)
            }
            FormData::List(items) => FormData::List(
                items
                    .into_iter()
                    .map(|item| self.convert(item, context))
                    .collect::<Result<_, _>>()?,
            ),
            value @ FormData::Value(_) => value,
        })
    }
}

impl RequestTransformer for FormObjectTransformer {
    fn supports(&self, form: &FormData) -> bool {
        !form.is_scalar()
    }

    fn transform(
        &self,
        form: FormData,
        context: Option<&SerializationContext>,
    ) -> Result<FormData, RestError> {
        self.convert(form, context.or(self.context.as_ref()))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::metadata::{ClassMetadata, PropertyMetadata};
    use crate::serializer::{SerializerBuilder, SerializerKind};
    use serde::Serialize;
    use serde_json::json;

    #[derive(Serialize)]
    struct Article {
        heading: String,
        body: String,
        draft: Option<bool>,
    }

    fn article() -> Article {
        Article {
            heading: "h".to_owned(),
            body: "b".to_owned(),
            draft: None,
        }
    }

    fn transformer() -> FormObjectTransformer {
        FormObjectTransformer::new(SerializerBuilder::default().build().unwrap())
    }

    #[test]
    fn test_scalar_not_supported() {
        let transformer = transformer();
        assert!(!transformer.supports(&FormData::from("x")));
        assert!(transformer.supports(&FormData::new()));
        assert!(transformer.supports(&FormData::object(&article()).unwrap()));
    }

    #[test]
    fn test_top_level_object_becomes_mapping() {
        let form = FormData::object(&article()).unwrap();
        let out = transformer().transform(form, None).unwrap();

        let expected: FormData = [("body", "b"), ("heading", "h")].into_iter().collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_nested_objects_converted_in_place() {
        let mut form = FormData::new();
        form.insert("article", FormData::object(&article()).unwrap());
        form.insert(
            "list",
            FormData::List(vec![FormData::object(&article()).unwrap(), FormData::from(3)]),
        );
        form.insert("page", 2);

        let out = transformer().transform(form, None).unwrap();
        let params = out.to_form_params();
        assert_eq!(params.get("article[heading]").map(String::as_str), Some("h"));
        assert_eq!(params.get("list[0][body]").map(String::as_str), Some("b"));
        assert_eq!(params.get("list[1]").map(String::as_str), Some("3"));
        assert_eq!(params.get("page").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_call_context_wins_over_default() {
        let serializer = SerializerBuilder::default()
            .register::<Article>(
                ClassMetadata::new()
                    .property("body", PropertyMetadata::new().groups(["detail"]))
                    .property("heading", PropertyMetadata::new().groups(["list"])),
            )
            .build()
            .unwrap();
        let transformer = FormObjectTransformer::new(serializer)
            .with_context(SerializationContext::for_groups(["detail"]));
        let form = FormData::object(&article()).unwrap();

        let out = transformer.transform(form.clone(), None).unwrap();
        assert_eq!(out.to_form_params().keys().collect::<Vec<_>>(), ["body"]);

        let call = SerializationContext::for_groups(["list"]);
        let out = transformer.transform(form, Some(&call)).unwrap();
        assert_eq!(out.get("heading").and_then(FormData::as_value), Some(&json!("h")));
        assert!(out.get("body").is_none());
    }
}
