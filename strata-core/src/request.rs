//! Request descriptors handed to the transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to ask the remote API for. Paths are relative to the transport's base URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub path: String,
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl RequestDescriptor {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: HttpMethod::Get,
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            path: path.into(),
            method: HttpMethod::Post,
            body: Some(body),
        }
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            path: path.into(),
            method: HttpMethod::Put,
            body: Some(body),
        }
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self {
            path: path.into(),
            method: HttpMethod::Patch,
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: HttpMethod::Delete,
            body: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builders_set_method_and_body() {
        let get = RequestDescriptor::get("/posts");
        assert_eq!(get.method, HttpMethod::Get);
        assert!(get.body.is_none());

        let post = RequestDescriptor::post("/posts", json!({"title": "t"}));
        assert_eq!(post.method, HttpMethod::Post);
        assert_eq!(post.body, Some(json!({"title": "t"})));

        assert_eq!(RequestDescriptor::delete("/posts/1").method.to_string(), "DELETE");
    }

    #[test]
    fn test_descriptor_serializes_method_uppercase() {
        let value = serde_json::to_value(RequestDescriptor::patch("/posts/2", json!({}))).unwrap();
        assert_eq!(value["method"], json!("PATCH"));
    }
}
