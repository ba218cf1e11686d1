//! Request and response transformation pipelines.
//!
//! A pipeline is an ordered list of steps. Each step is either a capability
//! transformer (applied when its `supports` predicate accepts the payload) or
//! a plain callback (always applied).

mod request;
mod response;

use std::fmt;
use std::sync::Arc;

use crate::context::SerializationContext;
use crate::error::RestError;
use crate::form::FormData;
use crate::response::ApiResponse;

pub use request::FormObjectTransformer;
pub use response::{ObjectCollectionTransformer, ObjectTransformer, is_sequential};

/// Capability transformer on outgoing form data.
pub trait RequestTransformer: Send + Sync + fmt::Debug {
    fn supports(&self, form: &FormData) -> bool;

    /// # Errors
    /// Returns an error when the form cannot be transformed.
    fn transform(
        &self,
        form: FormData,
        context: Option<&SerializationContext>,
    ) -> Result<FormData, RestError>;
}

/// Capability transformer on a received response; replaces its data slot.
pub trait ResponseTransformer: Send + Sync + fmt::Debug {
    fn supports(&self, response: &dyn ApiResponse) -> bool;

    /// # Errors
    /// Returns an error when the response data cannot be transformed.
    fn transform(
        &self,
        response: &mut dyn ApiResponse,
        context: Option<&SerializationContext>,
    ) -> Result<(), RestError>;
}

pub type RequestCallback = Arc<dyn Fn(FormData) -> FormData + Send + Sync>;
pub type ResponseCallback = Arc<dyn Fn(&mut dyn ApiResponse) + Send + Sync>;

/// Request pipeline member.
#[derive(Clone)]
pub enum RequestStep {
    Transformer(Arc<dyn RequestTransformer>),
    Callback(RequestCallback),
}

impl RequestStep {
    pub fn transformer(transformer: impl RequestTransformer + 'static) -> Self {
        Self::Transformer(Arc::new(transformer))
    }

    pub fn callback(callback: impl Fn(FormData) -> FormData + Send + Sync + 'static) -> Self {
        Self::Callback(Arc::new(callback))
    }
}

impl fmt::Debug for RequestStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transformer(transformer) => f.debug_tuple("Transformer").field(transformer).finish(),
            Self::Callback(_) => f.write_str("Callback"),
        }
    }
}

/// Response pipeline member.
#[derive(Clone)]
pub enum ResponseStep {
    Transformer(Arc<dyn ResponseTransformer>),
    Callback(ResponseCallback),
}

impl ResponseStep {
    pub fn transformer(transformer: impl ResponseTransformer + 'static) -> Self {
        Self::Transformer(Arc::new(transformer))
    }

    pub fn callback(callback: impl Fn(&mut dyn ApiResponse) + Send + Sync + 'static) -> Self {
        Self::Callback(Arc::new(callback))
    }
}

impl fmt::Debug for ResponseStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transformer(transformer) => f.debug_tuple("Transformer").field(transformer).finish(),
            Self::Callback(_) => f.write_str("Callback"),
        }
    }
}

/// Chains request steps, each step's output feeding the next.
#[derive(Debug, Clone, Default)]
pub struct RequestTransform {
    steps: Vec<RequestStep>,
}

impl RequestTransform {
    #[must_use]
    pub fn new(steps: Vec<RequestStep>) -> Self {
        Self { steps }
    }

    pub fn push(&mut self, step: RequestStep) {
        self.steps.push(step);
    }

    #[must_use]
    pub fn steps(&self) -> &[RequestStep] {
        &self.steps
    }

    /// Empty form data is returned as is without running any step.
    ///
    /// # Errors
    /// Propagates the first transformer error.
    pub fn transform(
        &self,
        form: FormData,
        context: Option<&SerializationContext>,
    ) -> Result<FormData, RestError> {
        if form.is_empty() {
            return Ok(form);
        }
        let mut form = form;
        for step in &self.steps {
            form = match step {
                RequestStep::Transformer(transformer) if transformer.supports(&form) => {
                    transformer.transform(form, context)?
                }
                RequestStep::Transformer(_) => form,
                RequestStep::Callback(callback) => callback(form),
            };
        }
        Ok(form)
    }
}

/// Runs response steps over a response, in order, mutating it in place.
#[derive(Debug, Clone, Default)]
pub struct ResponseTransform {
    steps: Vec<ResponseStep>,
}

impl ResponseTransform {
    #[must_use]
    pub fn new(steps: Vec<ResponseStep>) -> Self {
        Self { steps }
    }

    pub fn push(&mut self, step: ResponseStep) {
        self.steps.push(step);
    }

    #[must_use]
    pub fn steps(&self) -> &[ResponseStep] {
        &self.steps
    }

    /// A response without data is left untouched. Otherwise every supporting
    /// transformer and every callback runs; a matching transformer does not
    /// stop later steps.
    ///
    /// # Errors
    /// Propagates the first transformer error.
    pub fn transform(
        &self,
        response: &mut dyn ApiResponse,
        context: Option<&SerializationContext>,
    ) -> Result<(), RestError> {
        if response.data().is_none() {
            return Ok(());
        }
        for step in &self.steps {
            match step {
                ResponseStep::Transformer(transformer) => {
                    if transformer.supports(&*response) {
                        transformer.transform(&mut *response, context)?;
                    }
                }
                ResponseStep::Callback(callback) => callback(&mut *response),
            }
        }
        Ok(())
    }
}
