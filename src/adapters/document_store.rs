//! Document-store adapters.
//!
//! - `MongoDocumentStore`: a MongoDB deployment (`mongodb://`, `mongodb+srv://`)
//! - `HttpDocumentStore`: an HTTP data API speaking the Atlas `action/find`
//!   protocol (`POST {base}/action/find`, paged)
//! - `JsonlDocumentStore`: `<dir>/<database>/<collection>.jsonl` exports

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use mongodb::Client;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use super::{DataSource, SourceError, DOCUMENT_ID_FIELD, MISSING_VALUE_MARKER};
use crate::domain::DataFrame;

/// Documents requested per page
pub const PAGE_SIZE: usize = 5000;

/// Cluster name used when the connection string does not carry one
pub const DEFAULT_DATA_SOURCE: &str = "Cluster0";

/// MongoDB client; connects on export
pub struct MongoDocumentStore {
    url: String,
}

impl MongoDocumentStore {
    /// Accept `mongodb://` and `mongodb+srv://` connection strings
    pub fn from_url(url: &str) -> Result<Self, SourceError> {
        let host = url
            .strip_prefix("mongodb://")
            .or_else(|| url.strip_prefix("mongodb+srv://"))
            .map(|rest| rest.rsplit_once('@').map_or(rest, |(_, host)| host))
            .ok_or_else(|| SourceError::InvalidUrl(format!("{}: expected mongodb://", crate::config::redact_url(url))))?;
        if host.is_empty() || host.starts_with('/') {
            return Err(SourceError::InvalidUrl(format!(
                "{}: no host",
                crate::config::redact_url(url)
            )));
        }
        Ok(Self { url: url.to_string() })
    }
}

#[async_trait]
impl DataSource for MongoDocumentStore {
    fn name(&self) -> &str {
        "mongodb"
    }

    async fn export_collection(&self, database: &str, collection: &str) -> Result<DataFrame> {
        let redacted = crate::config::redact_url(&self.url);
        let client = Client::with_uri_str(&self.url)
            .await
            .with_context(|| format!("Failed to connect to {}", redacted))?;

        let mut cursor = client
            .database(database)
            .collection::<Document>(collection)
            .find(doc! {}, None)
            .await
            .with_context(|| format!("Failed to query {}.{}", database, collection))?;

        let mut documents = Vec::new();
        while cursor.advance().await? {
            let document = cursor
                .deserialize_current()
                .with_context(|| format!("Failed to decode document from {}.{}", database, collection))?;
            documents.push(document_to_json(document));
        }

        info!(database, collection, documents = documents.len(), "Exported collection");
        into_frame(documents, database, collection)
    }
}

/// Flatten a BSON document into plain JSON scalars.
///
/// Non-finite doubles become null; other non-JSON types use relaxed
/// extended JSON.
fn document_to_json(document: Document) -> Map<String, Json> {
    document
        .into_iter()
        .map(|(key, value)| {
            let json = match value {
                Bson::Double(f) => serde_json::Number::from_f64(f).map_or(Json::Null, Json::Number),
                Bson::Int32(i) => Json::from(i),
                Bson::Int64(i) => Json::from(i),
                Bson::String(s) => Json::String(s),
                Bson::Boolean(b) => Json::Bool(b),
                Bson::Null | Bson::Undefined => Json::Null,
                other => other.into_relaxed_extjson(),
            };
            (key, json)
        })
        .collect()
}

/// HTTP data API client
pub struct HttpDocumentStore {
    base_url: String,
    api_key: String,
    data_source: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FindRequest<'a> {
    data_source: &'a str,
    database: &'a str,
    collection: &'a str,
    filter: Map<String, Json>,
    limit: usize,
    skip: usize,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    documents: Vec<Map<String, Json>>,
}

impl HttpDocumentStore {
    /// Parse `https://<api-key>@host/path?dataSource=<cluster>`
    pub fn from_url(url: &str) -> Result<Self, SourceError> {
        let redacted = crate::config::redact_url(url);
        let mut parsed = Url::parse(url).map_err(|e| SourceError::InvalidUrl(format!("{}: {}", redacted, e)))?;

        let api_key = parsed
            .password()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| parsed.username())
            .to_string();
        if api_key.is_empty() {
            return Err(SourceError::InvalidUrl(format!(
                "{}: no API key in the user-info part",
                redacted
            )));
        }

        let data_source = parsed
            .query_pairs()
            .find(|(k, _)| k == "dataSource")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_else(|| DEFAULT_DATA_SOURCE.to_string());

        // set_username/set_password only fail for cannot-be-a-base URLs
        let _ = parsed.set_username("");
        let _ = parsed.set_password(None);
        parsed.set_query(None);
        let base_url = parsed.as_str().trim_end_matches('/').to_string();

        Ok(Self::new(base_url, api_key, data_source))
    }

    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, data_source: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            data_source: data_source.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    async fn find_page(&self, database: &str, collection: &str, skip: usize) -> Result<Vec<Map<String, Json>>> {
        let request = FindRequest {
            data_source: &self.data_source,
            database,
            collection,
            filter: Map::new(),
            limit: PAGE_SIZE,
            skip,
        };

        let response = self
            .client
            .post(format!("{}/action/find", self.base_url))
            .header("api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach data API at {}", self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Http {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let page: FindResponse = response
            .json()
            .await
            .context("Failed to decode data API response")?;
        Ok(page.documents)
    }
}

#[async_trait]
impl DataSource for HttpDocumentStore {
    fn name(&self) -> &str {
        "http-data-api"
    }

    async fn export_collection(&self, database: &str, collection: &str) -> Result<DataFrame> {
        let mut documents = Vec::new();

        loop {
            let page = self.find_page(database, collection, documents.len()).await?;
            let fetched = page.len();
            documents.extend(page);
            debug!(fetched, total = documents.len(), "Fetched page from data API");

            if fetched < PAGE_SIZE {
                break;
            }
        }

        info!(database, collection, documents = documents.len(), "Exported collection");
        into_frame(documents, database, collection)
    }
}

/// Reads newline-delimited JSON exports from a directory
pub struct JsonlDocumentStore {
    root: PathBuf,
}

impl JsonlDocumentStore {
    /// Parse `file://<dir>`
    pub fn from_url(url: &str) -> Result<Self, SourceError> {
        let root = url
            .strip_prefix("file://")
            .filter(|p| !p.is_empty())
            .ok_or_else(|| SourceError::InvalidUrl(format!("{}: expected file://<dir>", url)))?;
        Ok(Self::new(root))
    }

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn collection_path(&self, database: &str, collection: &str) -> PathBuf {
        self.root.join(database).join(format!("{}.jsonl", collection))
    }
}

#[async_trait]
impl DataSource for JsonlDocumentStore {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn export_collection(&self, database: &str, collection: &str) -> Result<DataFrame> {
        let path = self.collection_path(database, collection);
        if !path.exists() {
            return Err(SourceError::MissingCollection {
                database: database.to_string(),
                collection: collection.to_string(),
                location: path.display().to_string(),
            }
            .into());
        }

        let file = File::open(&path)
            .await
            .with_context(|| format!("Failed to open collection export: {}", path.display()))?;
        let mut lines = BufReader::new(file).lines();
        let mut documents = Vec::new();
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let doc: Map<String, Json> =
                serde_json::from_str(&line).map_err(|e| SourceError::MalformedDocument {
                    location: format!("{}:{}", path.display(), line_no),
                    message: e.to_string(),
                })?;
            documents.push(doc);
        }

        info!(database, collection, documents = documents.len(), "Exported collection");
        into_frame(documents, database, collection)
    }
}

fn into_frame(mut documents: Vec<Map<String, Json>>, database: &str, collection: &str) -> Result<DataFrame> {
    if documents.is_empty() {
        return Err(SourceError::EmptyCollection {
            database: database.to_string(),
            collection: collection.to_string(),
        }
        .into());
    }

    for doc in &mut documents {
        doc.remove(DOCUMENT_ID_FIELD);
    }

    Ok(DataFrame::from_documents(&documents, MISSING_VALUE_MARKER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Value;
    use tempfile::TempDir;

    #[test]
    fn test_mongo_url_parsing() {
        let store = MongoDocumentStore::from_url("mongodb+srv://user:pw@cluster0.example.net/?retryWrites=true").unwrap();
        assert_eq!(store.name(), "mongodb");
        assert!(MongoDocumentStore::from_url("mongodb://localhost:27017").is_ok());

        assert!(matches!(
            MongoDocumentStore::from_url("mongodb://user:pw@"),
            Err(SourceError::InvalidUrl(msg)) if !msg.contains("pw")
        ));
        assert!(MongoDocumentStore::from_url("https://localhost").is_err());
    }

    #[test]
    fn test_bson_documents_become_rows() {
        let documents = vec![
            document_to_json(doc! {
                "_id": mongodb::bson::oid::ObjectId::new(),
                "class": "neg",
                "aa_000": 76698_i32,
                "ab_000": "na",
                "ac_000": f64::NAN,
            }),
            document_to_json(doc! {
                "_id": mongodb::bson::oid::ObjectId::new(),
                "class": "pos",
                "aa_000": 33058_i64,
                "ab_000": 0.5,
                "ac_000": 2.0,
            }),
        ];

        let frame = into_frame(documents, "ineuron", "sensor").unwrap();
        assert_eq!(frame.columns(), ["class", "aa_000", "ab_000", "ac_000"]);
        assert_eq!(frame.column("aa_000").unwrap()[0], &Value::Number(76698.0));
        assert_eq!(frame.column("aa_000").unwrap()[1], &Value::Number(33058.0));
        assert_eq!(frame.column("ab_000").unwrap()[0], &Value::Null);
        assert_eq!(frame.column("ac_000").unwrap()[0], &Value::Null);
        assert_eq!(frame.column("class").unwrap()[1], &Value::Text("pos".into()));
    }

    #[test]
    fn test_http_url_parsing() {
        let store = HttpDocumentStore::from_url(
            "https://secret-key@data.example.com/app/data-abc/endpoint/data/v1/?dataSource=Sensors",
        )
        .unwrap();

        assert_eq!(store.base_url(), "https://data.example.com/app/data-abc/endpoint/data/v1");
        assert_eq!(store.api_key, "secret-key");
        assert_eq!(store.data_source(), "Sensors");

        let default_cluster = HttpDocumentStore::from_url("https://user:pw@data.example.com/v1").unwrap();
        assert_eq!(default_cluster.api_key, "pw");
        assert_eq!(default_cluster.data_source(), DEFAULT_DATA_SOURCE);

        assert!(HttpDocumentStore::from_url("https://data.example.com/v1").is_err());
    }

    #[test]
    fn test_find_request_shape() {
        let request = FindRequest {
            data_source: "Cluster0",
            database: "ineuron",
            collection: "sensor",
            filter: Map::new(),
            limit: PAGE_SIZE,
            skip: 10000,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["dataSource"], "Cluster0");
        assert_eq!(json["limit"], 5000);
        assert_eq!(json["skip"], 10000);
        assert!(json["filter"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_jsonl_export() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("ineuron")).unwrap();
        std::fs::write(
            temp.path().join("ineuron").join("sensor.jsonl"),
            concat!(
                "{\"_id\": \"a1\", \"class\": \"neg\", \"aa_000\": 76698, \"ab_000\": \"na\"}\n",
                "\n",
                "{\"_id\": \"a2\", \"class\": \"pos\", \"aa_000\": \"33058\", \"ab_000\": 0.5}\n",
            ),
        )
        .unwrap();

        let url = format!("file://{}", temp.path().display());
        let store = JsonlDocumentStore::from_url(&url).unwrap();
        let frame = store.export_collection("ineuron", "sensor").await.unwrap();

        assert_eq!(frame.n_rows(), 2);
        assert!(!frame.has_column("_id"));
        assert_eq!(frame.column("ab_000").unwrap()[0], &Value::Null);
        assert_eq!(frame.column("aa_000").unwrap()[1], &Value::Number(33058.0));
        assert_eq!(frame.column("class").unwrap()[1], &Value::Text("pos".into()));
    }

    #[tokio::test]
    async fn test_jsonl_missing_and_empty() {
        let temp = TempDir::new().unwrap();
        let store = JsonlDocumentStore::new(temp.path());

        let err = store.export_collection("ineuron", "sensor").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SourceError>(),
            Some(SourceError::MissingCollection { .. })
        ));

        std::fs::create_dir_all(temp.path().join("ineuron")).unwrap();
        std::fs::write(temp.path().join("ineuron").join("sensor.jsonl"), "\n").unwrap();
        let err = store.export_collection("ineuron", "sensor").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SourceError>(),
            Some(SourceError::EmptyCollection { .. })
        ));
    }

    #[tokio::test]
    async fn test_jsonl_malformed_line() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("db")).unwrap();
        std::fs::write(temp.path().join("db").join("c.jsonl"), "{\"a\": 1}\nnot json\n").unwrap();

        let err = JsonlDocumentStore::new(temp.path())
            .export_collection("db", "c")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("c.jsonl:2"));
    }
}
