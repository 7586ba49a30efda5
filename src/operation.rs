//! Operation types.
//!
//! Operations are opaque typed values to the call engine: it only reads the
//! document, the variables and the identifiers derived from them.

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

/// The kind of a GraphQL operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// A read-only query.
    Query,
    /// A mutation.
    Mutation,
    /// A long-lived subscription.
    Subscription,
}

/// A typed GraphQL operation.
///
/// # Examples
///
/// ```
/// use graphcall::{Operation, OperationKind};
/// use serde::Deserialize;
/// use serde_json::{json, Value};
///
/// #[derive(Deserialize)]
/// struct PostData {
///     post: Option<Post>,
/// }
///
/// #[derive(Deserialize)]
/// struct Post {
///     id: String,
///     title: String,
/// }
///
/// struct GetPost {
///     id: String,
/// }
///
/// impl Operation for GetPost {
///     type Data = PostData;
///
///     const KIND: OperationKind = OperationKind::Query;
///     const NAME: &'static str = "GetPost";
///     const DOCUMENT: &'static str = "query GetPost($id: ID!) { post(id: $id) { id title } }";
///
///     fn variables(&self) -> Value {
///         json!({ "id": self.id })
///     }
/// }
///
/// let op = GetPost { id: "p1".to_string() };
/// assert_eq!(op.cache_key(), r#"GetPost({"id":"p1"})"#);
/// ```
pub trait Operation: Send + Sync + 'static {
    /// The decoded shape of the `data` member.
    type Data: DeserializeOwned + Send + 'static;

    /// The operation kind.
    const KIND: OperationKind;
    /// The operation name.
    const NAME: &'static str;
    /// The full GraphQL document.
    const DOCUMENT: &'static str;

    /// The operation variables as a JSON object.
    fn variables(&self) -> Value {
        Value::Object(Map::new())
    }

    /// The identifier sent instead of the document when the client is
    /// configured to send operation identifiers.
    fn operation_id(&self) -> String {
        Self::NAME.to_string()
    }

    /// The key under which this operation's data is stored in the cache.
    fn cache_key(&self) -> String {
        format!("{}({})", Self::NAME, self.variables())
    }
}

/// An untyped snapshot of an operation, as seen by interceptors,
/// the cache and the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRequest {
    /// The operation kind.
    pub kind: OperationKind,
    /// The operation name.
    pub name: &'static str,
    /// The full GraphQL document.
    pub document: &'static str,
    /// The operation identifier.
    pub operation_id: String,
    /// The operation variables.
    pub variables: Value,
    /// The resolved cache key.
    pub cache_key: String,
}

impl OperationRequest {
    /// Captures the request for a typed operation.
    pub fn of<O: Operation>(operation: &O) -> Self {
        Self {
            kind: O::KIND,
            name: O::NAME,
            document: O::DOCUMENT,
            operation_id: operation.operation_id(),
            variables: operation.variables(),
            cache_key: operation.cache_key(),
        }
    }

    /// Builds the JSON body sent to the server.
    ///
    /// When `send_operation_identifiers` is set the document is replaced by
    /// the operation identifier.
    pub fn to_body(&self, send_operation_identifiers: bool) -> Value {
        if send_operation_identifiers {
            json!({
                "id": self.operation_id,
                "operationName": self.name,
                "variables": self.variables,
            })
        } else {
            json!({
                "query": self.document,
                "operationName": self.name,
                "variables": self.variables,
            })
        }
    }
}
