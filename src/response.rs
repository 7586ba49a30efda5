//! Response types delivered to callbacks.
//!
//! [`ResponseBody`] is the untyped GraphQL envelope that flows through the
//! interceptor chain and the cache. [`Response`] is its typed counterpart,
//! tagged with where it came from.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A location in the operation document an error refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLocation {
    /// Line number (1-based).
    pub line: u32,
    /// Column number (1-based).
    pub column: u32,
}

/// An error reported by the server in the `errors` array of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    /// Human-readable error message.
    pub message: String,
    /// Locations in the document.
    #[serde(default, deserialize_with = "null_as_default")]
    pub locations: Vec<ErrorLocation>,
    /// Path to the field that produced the error.
    #[serde(default, deserialize_with = "null_as_default")]
    pub path: Vec<Value>,
    /// Server-specific extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphqlError {
    /// Creates an error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: Vec::new(),
            extensions: None,
        }
    }
}

/// The untyped `{ "data": ..., "errors": [...] }` envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    /// The `data` member, absent or `null` when the server produced none.
    #[serde(default)]
    pub data: Option<Value>,
    /// The `errors` member.
    #[serde(default, deserialize_with = "null_as_default")]
    pub errors: Vec<GraphqlError>,
}

impl ResponseBody {
    /// Creates an envelope holding only data.
    pub fn with_data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// Returns the `data` member unless it is absent or `null`.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref().filter(|data| !data.is_null())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The result of an operation call.
///
/// `data == None` is legal even when `errors` is empty, e.g. for a cache
/// miss under [`ResponseFetcher::CacheOnly`](crate::ResponseFetcher::CacheOnly).
///
/// # Examples
///
/// ```
/// use graphcall::Response;
///
/// let miss: Response<u32> = Response::cache_miss();
/// assert!(miss.data.is_none());
/// assert!(miss.from_cache);
/// assert!(!miss.has_errors());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Response<T> {
    /// The typed data, if any.
    pub data: Option<T>,
    /// Errors reported by the server, in order.
    pub errors: Vec<GraphqlError>,
    /// Whether this response was read from the normalized cache.
    pub from_cache: bool,
}

impl<T> Response<T> {
    /// Creates a new `Response`.
    pub fn new(data: Option<T>, errors: Vec<GraphqlError>, from_cache: bool) -> Self {
        Self {
            data,
            errors,
            from_cache,
        }
    }

    /// The response delivered for a cache miss.
    pub fn cache_miss() -> Self {
        Self::new(None, Vec::new(), true)
    }

    /// Returns `true` if the server reported any errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Maps the data to a different type, preserving errors and origin.
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: self.data.map(f),
            errors: self.errors,
            from_cache: self.from_cache,
        }
    }
}

impl<T: DeserializeOwned> Response<T> {
    /// Decodes an untyped envelope into a typed response.
    pub fn decode(body: &ResponseBody, from_cache: bool) -> Result<Self, serde_json::Error> {
        let data = body.data().map(T::deserialize).transpose()?;
        Ok(Self::new(data, body.errors.clone(), from_cache))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Post {
        id: String,
    }

    #[test]
    fn test_body_accepts_null_errors() {
        let body: ResponseBody =
            serde_json::from_value(json!({ "data": { "id": "p1" }, "errors": null })).unwrap();
        assert!(body.errors.is_empty());
        assert_eq!(body.data(), Some(&json!({ "id": "p1" })));
    }

    #[test]
    fn test_decode_null_data_with_errors() {
        let body: ResponseBody = serde_json::from_value(json!({
            "data": null,
            "errors": [{ "message": "not found", "path": ["post"] }]
        }))
        .unwrap();

        let response = Response::<Post>::decode(&body, false).unwrap();
        assert!(response.data.is_none());
        assert!(response.has_errors());
        assert_eq!(response.errors[0].message, "not found");
    }

    #[test]
    fn test_decode_wrong_shape_fails() {
        let body = ResponseBody::with_data(json!({ "id": 7 }));
        assert!(Response::<Post>::decode(&body, false).is_err());
    }
}
