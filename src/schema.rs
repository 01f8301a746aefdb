use std::fs;
use std::path::{Path, PathBuf};

use elasticsearch::Elasticsearch;
use serde_json::Value;

use crate::client;
use crate::error::{Result, TransferError};
use crate::job::GZIP_SUFFIX;

/// Suffix appended to a data-file base name to locate its schema companion.
const SCHEMA_SUFFIX: &str = "-schema.json";
/// Data-file extension stripped when deriving the companion path.
const DATA_SUFFIX: &str = ".json";

/// The destination-shape definition travelling alongside the data.
#[derive(Debug, Clone)]
pub struct Schema {
    /// Collection name the schema was captured from. In the file
    /// representation the definition is nested under this name.
    pub source_name: String,
    /// The raw definition as returned by the endpoint's introspection call.
    pub body: Value,
}

/// Derive the schema companion path for a data file: strip a trailing
/// compression suffix, strip the data-file extension, append the schema
/// marker. `events.json.gz` becomes `events-schema.json`.
pub fn companion_path(data_path: &Path) -> PathBuf {
    let raw = data_path.to_string_lossy();
    let base = raw.strip_suffix(GZIP_SUFFIX).unwrap_or(&raw);
    let base = base.strip_suffix(DATA_SUFFIX).unwrap_or(base);
    PathBuf::from(format!("{base}{SCHEMA_SUFFIX}"))
}

/// Query the endpoint's schema-introspection operation for a collection.
pub async fn fetch_schema(client: &Elasticsearch, collection: &str) -> Result<Schema> {
    if !client::collection_exists(client, collection).await? {
        return Err(TransferError::CollectionNotFound(collection.to_string()));
    }
    let body = client::fetch_mapping(client, collection).await?;
    log::debug!("Fetched schema for collection {}", collection);
    Ok(Schema {
        source_name: collection.to_string(),
        body,
    })
}

/// Serialize a schema next to its data file.
pub fn write_schema_to_file(data_path: &Path, schema: &Schema) -> Result<()> {
    let path = companion_path(data_path);
    let body = serde_json::to_vec(&schema.body)
        .map_err(|e| TransferError::SchemaParse(format!("failed to serialize schema: {e}")))?;
    fs::write(&path, body)?;
    log::info!("Wrote schema for {} to {}", schema.source_name, path.display());
    Ok(())
}

/// Read the schema companion of a data file.
pub fn read_schema_from_file(data_path: &Path) -> Result<Schema> {
    let path = companion_path(data_path);
    if !path.exists() {
        return Err(TransferError::SchemaFileMissing(path));
    }
    let raw = fs::read_to_string(&path)?;
    let body: Value = serde_json::from_str(&raw)
        .map_err(|e| TransferError::SchemaParse(format!("{}: {e}", path.display())))?;
    let source_name = single_top_level_key(&body)?;
    log::debug!("Read schema for {} from {}", source_name, path.display());
    Ok(Schema { source_name, body })
}

/// Unwrap one level of origin-collection nesting and rewrap only the
/// field-mapping section, so the origin name never leaks into the
/// destination.
pub fn unwrap_mappings(schema: &Schema) -> Result<Value> {
    let source_key = single_top_level_key(&schema.body)?;
    let nested = &schema.body[&source_key];

    let mappings = nested.get("mappings").ok_or_else(|| {
        TransferError::SchemaParse(format!(
            "schema for {source_key} has no mappings section"
        ))
    })?;

    Ok(serde_json::json!({ "mappings": mappings }))
}

/// Create the destination collection with the transferred schema.
///
/// The destination must not exist yet; schemas are never merged.
pub async fn apply_schema_to_remote(
    client: &Elasticsearch,
    dest_collection: &str,
    schema: &Schema,
) -> Result<()> {
    if client::collection_exists(client, dest_collection).await? {
        return Err(TransferError::CollectionAlreadyExists(
            dest_collection.to_string(),
        ));
    }

    let body = unwrap_mappings(schema)?;
    client::create_collection(client, dest_collection, &body).await?;
    log::info!(
        "Created collection {} with schema from {}",
        dest_collection,
        schema.source_name
    );
    Ok(())
}

/// A schema definition must be an object with exactly one top-level key, the
/// origin collection name. Zero or multiple keys are rejected rather than
/// picking one at random.
fn single_top_level_key(body: &Value) -> Result<String> {
    let obj = body
        .as_object()
        .ok_or_else(|| TransferError::SchemaParse("schema body is not a JSON object".into()))?;
    let mut keys = obj.keys();
    match (keys.next(), keys.next()) {
        (Some(key), None) => Ok(key.clone()),
        (None, _) => Err(TransferError::SchemaParse(
            "schema body has no top-level collection key".into(),
        )),
        (Some(_), Some(_)) => Err(TransferError::SchemaParse(format!(
            "schema body has {} top-level collection keys, expected exactly one",
            obj.len()
        ))),
    }
}
