#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! REST API client toolkit for `ModKit`
//!
//! Building blocks for typed clients of JSON REST APIs:
//! - A serializer-agnostic [`SerializationContext`] (groups, version,
//!   max depth, null policy, exclusion strategies) translated onto two
//!   serializer backends behind one [`Serializer`] trait
//! - Request and response transformer pipelines with capability
//!   transformers and plain callbacks
//! - Default transformers turning typed objects into form fields and JSON
//!   bodies into typed models, single or collections
//! - A [`RequestExecutor`] that builds wire options, calls the transport and
//!   wraps the reply into a [`Response`] envelope
//!
//! Transport is pluggable through [`Transport`]; [`HyperTransport`] (hyper +
//! rustls, pooled) is the default.
//!
//! # Example
//!
//! ```ignore
//! use modkit_rest::{Call, ClientConfig, Response, RestClient};
//!
//! #[derive(Debug, serde::Serialize, serde::Deserialize)]
//! struct Article {
//!     heading: String,
//!     body: String,
//! }
//!
//! let client = RestClient::new(ClientConfig::load("rest.yaml")?)?;
//! let articles = client.request("/articles").model::<Article>().build();
//!
//! let created: Response = articles
//!     .execute(Call::post(articles.uri()).with_object(&article)?.with_groups(["detail"]))
//!     .await?;
//! let listed = articles.get(articles.uri(), None).await?;
//! let all: Vec<&Article> = listed.models::<Article>().unwrap_or_default();
//! ```

mod client;
mod config;
mod context;
mod definition;
mod error;
mod form;
mod metadata;
mod request;
mod response;
pub mod serializer;
pub mod transform;
pub mod transport;

pub use client::{RestClient, RestClientBuilder};
pub use config::{ClientConfig, ENV_PREFIX};
pub use context::{
    Direction, ExclusionStrategy, PropertyView, SerializationContext, SkipProperties,
};
pub use definition::{QueryParams, RequestHeaders};
pub use error::{BoxError, RestError};
pub use form::{
    DefaultFormNormalizer, FormData, FormNormalization, FormNormalizer, ObjectPayload,
};
pub use metadata::{ClassMetadata, MetadataRegistry, PropertyMetadata};
pub use request::{Call, RequestBuilder, RequestExecutor};
pub use response::{ApiResponse, Data, Model, Response};
pub use serializer::{
    Format, Serializer, SerializerBuilder, SerializerError, SerializerKind, SharedSerializer,
};
pub use transform::{
    FormObjectTransformer, ObjectCollectionTransformer, ObjectTransformer, RequestStep,
    RequestTransform, RequestTransformer, ResponseStep, ResponseTransform, ResponseTransformer,
};
pub use transport::{
    HyperTransport, HyperTransportBuilder, RawResponse, TlsRoots, Transport, TransportError,
    WireOptions,
};
