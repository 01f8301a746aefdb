use base64::prelude::*;
use elasticsearch::{
    BulkParts, CountParts, Elasticsearch,
    http::StatusCode,
    http::request::JsonBody,
    http::response::Response,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesExistsParts, IndicesGetMappingParts},
};
use http::header::{ACCEPT_ENCODING, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, TransferError};
use crate::job::RemoteEndpoint;

/// Create and configure a client for a remote endpoint.
pub fn create_client(endpoint: &RemoteEndpoint) -> Result<Elasticsearch> {
    log::debug!(
        "Setting up client connection to {}",
        endpoint.host.as_str()
    );
    let conn_pool = SingleNodeConnectionPool::new(endpoint.host.clone());
    let transport_builder = TransportBuilder::new(conn_pool);

    let mut headers = HeaderMap::new();

    if let (Some(user), Some(pass)) = (endpoint.username.as_deref(), endpoint.password.as_deref()) {
        log::info!("Using basic authentication for user: {}", user);
        let auth_str = format!("{}:{}", user, pass);
        let auth_val = format!("Basic {}", BASE64_STANDARD.encode(auth_str));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_val)
                .map_err(|e| TransferError::InvalidJob(format!("invalid credentials: {e}")))?,
        );
        log::debug!("Adding authorization header");
    } else if endpoint.username.is_some() || endpoint.password.is_some() {
        log::warn!(
            "Partial basic auth credentials provided (username or password missing), ignoring."
        );
    }

    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    let transport = transport_builder
        .headers(headers)
        .build()
        .map_err(|e| TransferError::RemoteUnavailable(format!("failed to build transport: {e}")))?;

    log::debug!("Client created successfully");
    Ok(Elasticsearch::new(transport))
}

/// Check whether a collection exists on the endpoint.
pub async fn collection_exists(client: &Elasticsearch, collection: &str) -> Result<bool> {
    let response = client
        .indices()
        .exists(IndicesExistsParts::Index(&[collection]))
        .send()
        .await?;

    let status = response.status_code();
    if status.is_success() {
        Ok(true)
    } else if status == StatusCode::NOT_FOUND {
        Ok(false)
    } else {
        Err(TransferError::RemoteUnavailable(format!(
            "existence check for {collection} returned {status}"
        )))
    }
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

/// Count documents in a collection, optionally restricted by a query.
pub async fn count_documents(
    client: &Elasticsearch,
    collection: &str,
    query: Option<Value>,
) -> Result<u64> {
    let indices = [collection];
    let request = client.count(CountParts::Index(&indices));
    let response = match query {
        Some(q) => request.body(serde_json::json!({ "query": q })).send().await?,
        None => request.send().await?,
    };

    let response = check_status(response, "count").await?;
    let counted: CountResponse = response
        .json()
        .await
        .map_err(|e| TransferError::RemoteUnavailable(format!("failed to parse count response: {e}")))?;
    Ok(counted.count)
}

/// Fetch the raw mapping definition for a collection. The response is keyed
/// by the collection's own name, one level of nesting above the mappings.
pub async fn fetch_mapping(client: &Elasticsearch, collection: &str) -> Result<Value> {
    let response = client
        .indices()
        .get_mapping(IndicesGetMappingParts::Index(&[collection]))
        .send()
        .await?;

    let response = check_status(response, "mapping introspection").await?;
    response.json().await.map_err(|e| {
        TransferError::RemoteUnavailable(format!("failed to parse mapping response: {e}"))
    })
}

/// Create a collection with the given schema body.
pub async fn create_collection(
    client: &Elasticsearch,
    collection: &str,
    schema_body: &Value,
) -> Result<()> {
    let response = client
        .indices()
        .create(IndicesCreateParts::Index(collection))
        .body(schema_body)
        .send()
        .await?;

    check_status(response, "collection create").await?;
    Ok(())
}

/// Submit one bulk body of paired action/payload lines. Item-level rejections
/// inside an otherwise successful response are counted and logged, never
/// fatal; only connection-level failures abort the transfer.
pub async fn bulk_write(client: &Elasticsearch, body: Vec<JsonBody<Value>>) -> Result<()> {
    let response = client.bulk(BulkParts::None).body(body).send().await?;
    let response = check_status(response, "bulk write").await?;

    let response_body: Value = response.json().await.map_err(|e| {
        TransferError::RemoteUnavailable(format!("failed to parse bulk response: {e}"))
    })?;

    if response_body["errors"].as_bool().unwrap_or(false) {
        let mut rejected = 0usize;
        if let Some(items) = response_body["items"].as_array() {
            for item in items {
                if let Some(op_type) = item.as_object().and_then(|obj| obj.keys().next()) {
                    if let Some(error) = item[op_type].get("error") {
                        rejected += 1;
                        log::warn!("bulk item rejected: {error}");
                    }
                }
            }
        }
        log::warn!("bulk write rejected {rejected} item(s), continuing");
    }

    Ok(())
}

/// Map a non-success HTTP status to a remote error carrying the response body.
async fn check_status(response: Response, operation: &str) -> Result<Response> {
    let status = response.status_code();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    Err(TransferError::RemoteUnavailable(format!(
        "{operation} failed with status {status}: {detail}"
    )))
}
