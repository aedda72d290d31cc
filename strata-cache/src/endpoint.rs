//! Endpoint declarations.
//!
//! Every hook is a plain `fn` pointer: request builders, shapers and tag
//! functions are pure and carry no captured state, and the registry is fixed
//! once the client is built.

use std::collections::HashMap;

use serde_json::Value;
use strata_core::{CacheError, CacheResult, RequestDescriptor, ShapingError, Tag};

use crate::optimistic::PatchFn;
use crate::query::QueryData;

/// Builds the transport request from the call argument.
pub type RequestBuilder = fn(&Value) -> CacheResult<RequestDescriptor>;

/// Turns a raw payload into the stored result.
pub type ResponseShaper = fn(Value) -> Result<QueryData, ShapingError>;

/// Tags a successful query result provides, from `(result, arg)`.
pub type TagProvider = fn(&QueryData, &Value) -> Vec<Tag>;

/// Tags a successful mutation invalidates, from `(result, arg)`.
pub type InvalidationProvider = fn(&Value, &Value) -> Vec<Tag>;

/// A read endpoint.
#[derive(Debug, Clone, Copy)]
pub struct QueryEndpoint {
    pub build_request: RequestBuilder,
    pub shape: Option<ResponseShaper>,
    pub provides_tags: Option<TagProvider>,
}

impl QueryEndpoint {
    pub const fn new(build_request: RequestBuilder) -> Self {
        Self {
            build_request,
            shape: None,
            provides_tags: None,
        }
    }

    pub fn shape_with(mut self, shape: ResponseShaper) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn provides(mut self, provides_tags: TagProvider) -> Self {
        self.provides_tags = Some(provides_tags);
        self
    }

    pub(crate) fn shape(&self, raw: Value) -> Result<QueryData, ShapingError> {
        match self.shape {
            Some(shape) => shape(raw),
            None => Ok(QueryData::Value(raw)),
        }
    }

    pub(crate) fn tags(&self, data: &QueryData, arg: &Value) -> Vec<Tag> {
        self.provides_tags
            .map(|provides| provides(data, arg))
            .unwrap_or_default()
    }
}

/// Speculative edit of another endpoint's cached result.
#[derive(Debug, Clone, Copy)]
pub struct OptimisticUpdate {
    /// Query endpoint whose entry is patched.
    pub endpoint: &'static str,
    /// Argument of the patched entry, derived from the mutation argument.
    pub target_arg: fn(&Value) -> Value,
    pub apply: PatchFn,
}

/// A write endpoint.
#[derive(Debug, Clone, Copy)]
pub struct MutationEndpoint {
    pub build_request: RequestBuilder,
    pub invalidates_tags: Option<InvalidationProvider>,
    pub optimistic: Option<OptimisticUpdate>,
}

impl MutationEndpoint {
    pub const fn new(build_request: RequestBuilder) -> Self {
        Self {
            build_request,
            invalidates_tags: None,
            optimistic: None,
        }
    }

    pub fn invalidates(mut self, invalidates_tags: InvalidationProvider) -> Self {
        self.invalidates_tags = Some(invalidates_tags);
        self
    }

    pub fn optimistic(mut self, update: OptimisticUpdate) -> Self {
        self.optimistic = Some(update);
        self
    }

    pub(crate) fn tags(&self, result: &Value, arg: &Value) -> Vec<Tag> {
        self.invalidates_tags
            .map(|invalidates| invalidates(result, arg))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Endpoint {
    Query(QueryEndpoint),
    Mutation(MutationEndpoint),
}

/// Name → endpoint table.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    endpoints: HashMap<String, Endpoint>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a read endpoint. A later registration under the same name wins.
    pub fn query(mut self, name: &str, endpoint: QueryEndpoint) -> Self {
        self.insert(name, Endpoint::Query(endpoint));
        self
    }

    /// Register a write endpoint. A later registration under the same name wins.
    pub fn mutation(mut self, name: &str, endpoint: MutationEndpoint) -> Self {
        self.insert(name, Endpoint::Mutation(endpoint));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    pub fn query_endpoint(&self, name: &str) -> CacheResult<QueryEndpoint> {
        match self.endpoints.get(name) {
            Some(Endpoint::Query(endpoint)) => Ok(*endpoint),
            Some(Endpoint::Mutation(_)) => Err(CacheError::WrongEndpointKind {
                name: name.to_string(),
                expected: "query",
            }),
            None => Err(CacheError::UnknownEndpoint {
                name: name.to_string(),
            }),
        }
    }

    pub fn mutation_endpoint(&self, name: &str) -> CacheResult<MutationEndpoint> {
        match self.endpoints.get(name) {
            Some(Endpoint::Mutation(endpoint)) => Ok(*endpoint),
            Some(Endpoint::Query(_)) => Err(CacheError::WrongEndpointKind {
                name: name.to_string(),
                expected: "mutation",
            }),
            None => Err(CacheError::UnknownEndpoint {
                name: name.to_string(),
            }),
        }
    }

    fn insert(&mut self, name: &str, endpoint: Endpoint) {
        if self.endpoints.insert(name.to_string(), endpoint).is_some() {
            tracing::warn!(endpoint = name, "Endpoint registered twice, keeping the latest");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn list_things(_: &Value) -> CacheResult<RequestDescriptor> {
        Ok(RequestDescriptor::get("/things"))
    }

    fn thing_tags(_: &QueryData, _: &Value) -> Vec<Tag> {
        vec![Tag::list("Thing")]
    }

    fn delete_thing(arg: &Value) -> CacheResult<RequestDescriptor> {
        let id = arg
            .get("id")
            .ok_or_else(|| CacheError::invalid_argument("deleteThing", "missing id"))?;
        Ok(RequestDescriptor::delete(format!("/things/{}", id)))
    }

    fn registry() -> EndpointRegistry {
        EndpointRegistry::new()
            .query("getThings", QueryEndpoint::new(list_things).provides(thing_tags))
            .mutation("deleteThing", MutationEndpoint::new(delete_thing))
    }

    #[test]
    fn test_lookup_by_kind() {
        let registry = registry();
        assert!(registry.query_endpoint("getThings").is_ok());
        assert!(registry.mutation_endpoint("deleteThing").is_ok());
        assert_eq!(
            registry.query_endpoint("deleteThing").unwrap_err(),
            CacheError::WrongEndpointKind {
                name: "deleteThing".to_string(),
                expected: "query",
            }
        );
        assert!(matches!(
            registry.mutation_endpoint("nope"),
            Err(CacheError::UnknownEndpoint { .. })
        ));
        assert_eq!(registry.names().count(), 2);
    }

    #[test]
    fn test_default_shape_keeps_raw_payload() {
        let endpoint = QueryEndpoint::new(list_things);
        let shaped = endpoint.shape(json!({"k": 1})).unwrap();
        assert_eq!(shaped, QueryData::Value(json!({"k": 1})));
        assert!(endpoint.tags(&shaped, &Value::Null).is_empty());
    }

    #[test]
    fn test_mutation_without_invalidation_has_no_tags() {
        let endpoint = registry().mutation_endpoint("deleteThing").unwrap();
        assert!(endpoint.tags(&Value::Null, &json!({"id": 1})).is_empty());
        assert!((endpoint.build_request)(&json!({})).is_err());
    }
}
