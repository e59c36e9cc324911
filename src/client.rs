use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, ETAG};
use reqwest::{Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, instrument, warn};

use crate::changes_result::StreamingChangesResult;
use crate::config::ClientConfig;
use crate::decoder::{DocumentDecoder, SimdJsonDecoder};
use crate::document::{
    BulkRequest, BulkResult, DatabaseInfo, DocumentIdentity, DocumentResponse, ErrorBody, UuidList,
};
use crate::error::{CouchError, DecodeError};
use crate::query::{ChangesQuery, ViewQuery};
use crate::results::{ChangesResult, ViewResult};
use crate::stream_adapter::HttpBody;
use crate::view_result::StreamingViewResult;

const ALL_DBS: &str = "_all_dbs";
const UUIDS: &str = "_uuids";
const BULK_DOCS: &str = "_bulk_docs";
const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Asynchronous CouchDB client.
///
/// Requests that fail with a 5xx status, or with a connection error when
/// [`ClientConfig::retry_on_io_error`] is set, are retried with exponential backoff.
/// A streamed response is never retried once its body has been handed out.
pub struct CouchDbClient<D = SimdJsonDecoder> {
    http: reqwest::Client,
    config: ClientConfig,
    base: Url,
    decoder: Arc<D>,
}

impl CouchDbClient<SimdJsonDecoder> {
    pub fn new(config: ClientConfig) -> Result<Self, CouchError> {
        Self::with_decoder(config, Arc::new(SimdJsonDecoder))
    }
}

impl<D: DocumentDecoder> CouchDbClient<D> {
    pub fn with_decoder(config: ClientConfig, decoder: Arc<D>) -> Result<Self, CouchError> {
        let base = Url::parse(&config.url)
            .map_err(|e| CouchError::Config(format!("invalid server url '{}': {e}", config.url)))?;
        if base.cannot_be_a_base() {
            return Err(CouchError::Config(format!("'{}' cannot be a base URL", config.url)));
        }
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()?;
        Ok(Self {
            http,
            config,
            base,
            decoder,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn decoder(&self) -> &Arc<D> {
        &self.decoder
    }

    /// Runs a view query and returns its rows as a stream.
    #[instrument(level = "debug", skip(self, query))]
    pub async fn query_for_streaming_view(
        &self,
        database: &str,
        query: &ViewQuery,
    ) -> Result<StreamingViewResult<HttpBody, D>, CouchError> {
        ensure_database(database)?;
        let mut segments = vec![database.to_owned()];
        segments.extend(query.path_segments()?);
        let url = self.url(&segments, &query.params())?;
        let response = if query.has_multiple_keys() {
            self.send(Method::POST, url, Some(Payload::json(query.keys_body())), None).await?
        } else {
            self.send(Method::GET, url, None, None).await?
        };
        StreamingViewResult::with_config(
            Arc::clone(&self.decoder),
            HttpBody::from_response(response),
            self.config.reader_config(),
        )
        .await
    }

    pub async fn query_view(&self, database: &str, query: &ViewQuery) -> Result<ViewResult<D>, CouchError> {
        self.query_for_streaming_view(database, query).await?.collect().await
    }

    #[instrument(level = "debug", skip(self, query))]
    pub async fn query_for_streaming_changes(
        &self,
        database: &str,
        query: &ChangesQuery,
    ) -> Result<StreamingChangesResult<HttpBody, D>, CouchError> {
        ensure_database(database)?;
        let mut segments = vec![database.to_owned()];
        segments.extend(query.path_segments());
        let url = self.url(&segments, &query.params())?;
        let response = self.send(Method::GET, url, None, None).await?;
        StreamingChangesResult::with_config(
            Arc::clone(&self.decoder),
            HttpBody::from_response(response),
            self.config.reader_config(),
        )
        .await
    }

    pub async fn query_changes(
        &self,
        database: &str,
        query: &ChangesQuery,
    ) -> Result<ChangesResult<D>, CouchError> {
        self.query_for_streaming_changes(database, query).await?.collect().await
    }

    pub async fn all_databases(&self) -> Result<Vec<String>, CouchError> {
        let url = self.url(&[ALL_DBS], &[])?;
        self.fetch_json(Method::GET, url, None).await
    }

    pub async fn database_info(&self, database: &str) -> Result<DatabaseInfo, CouchError> {
        ensure_database(database)?;
        let url = self.url(&[database], &[])?;
        self.fetch_json(Method::GET, url, None).await
    }

    pub async fn exists(&self, database: &str) -> Result<bool, CouchError> {
        ensure_database(database)?;
        let url = self.url(&[database], &[])?;
        found(self.send(Method::HEAD, url, None, self.request_timeout()).await)
    }

    /// Returns `false` when the database already exists.
    pub async fn create_database(&self, database: &str) -> Result<bool, CouchError> {
        ensure_database(database)?;
        let url = self.url(&[database], &[])?;
        match self.fetch_json::<DocumentStatus>(Method::PUT, url, None).await {
            Ok(status) => Ok(status.ok),
            Err(e) if e.status() == Some(StatusCode::PRECONDITION_FAILED.as_u16()) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Returns `false` when there was no such database.
    pub async fn delete_database(&self, database: &str) -> Result<bool, CouchError> {
        ensure_database(database)?;
        let url = self.url(&[database], &[])?;
        match self.fetch_json::<DocumentStatus>(Method::DELETE, url, None).await {
            Ok(status) => Ok(status.ok),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn contains(&self, database: &str, id: &str) -> Result<bool, CouchError> {
        let url = self.document_url(database, id, &[])?;
        found(self.send(Method::HEAD, url, None, self.request_timeout()).await)
    }

    /// Whether `rev` is the current revision of the document, judged by the `ETag` of a
    /// HEAD request.
    pub async fn contains_as_latest(&self, database: &str, id: &str, rev: &str) -> Result<bool, CouchError> {
        let url = self.document_url(database, id, &[])?;
        let response = match self.send(Method::HEAD, url, None, self.request_timeout()).await {
            Ok(response) => response,
            Err(e) if is_not_found(&e) => return Ok(false),
            Err(e) => return Err(e),
        };
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim_matches('"'));
        Ok(!rev.is_empty() && etag == Some(rev))
    }

    /// Opens an attachment for streaming. Without `rev` the current revision is read.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_attachment(
        &self,
        database: &str,
        id: &str,
        rev: Option<&str>,
        name: &str,
    ) -> Result<Attachment, CouchError> {
        let url = self.attachment_url(database, id, rev, name)?;
        let response = self.send(Method::GET, url, None, None).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        Ok(Attachment {
            content_type,
            content_length: response.content_length(),
            body: HttpBody::from_response(response),
        })
    }

    /// Uploads an attachment. Without `rev` the document is created along with it.
    #[instrument(level = "debug", skip(self, content))]
    pub async fn create_attachment(
        &self,
        database: &str,
        id: &str,
        rev: Option<&str>,
        name: &str,
        content_type: &str,
        content: impl Into<Bytes>,
    ) -> Result<DocumentResponse, CouchError> {
        let url = self.attachment_url(database, id, rev, name)?;
        let payload = Payload {
            content_type: content_type.to_owned(),
            data: content.into(),
        };
        self.fetch_json(Method::PUT, url, Some(payload)).await
    }

    /// Fetches a document, or `None` when it does not exist.
    pub async fn get<T: DeserializeOwned>(&self, database: &str, id: &str) -> Result<Option<T>, CouchError> {
        match self.find(database, id).await {
            Ok(doc) => Ok(Some(doc)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fetches a document; a missing one is a [`CouchError::Status`] with status 404.
    pub async fn find<T: DeserializeOwned>(&self, database: &str, id: &str) -> Result<T, CouchError> {
        let url = self.document_url(database, id, &[])?;
        self.fetch_json(Method::GET, url, None).await
    }

    /// Stores a new document and writes the assigned id and revision back into it.
    ///
    /// Documents without an id are POSTed and get a server generated one.
    pub async fn create<T>(&self, database: &str, document: &mut T) -> Result<DocumentResponse, CouchError>
    where
        T: Serialize + DocumentIdentity,
    {
        let id = document.id().map(str::to_owned);
        self.create_with_id(database, id.as_deref(), document).await
    }

    /// Like [`create`](Self::create), but stores the document under `id` whatever the
    /// document itself carries.
    #[instrument(level = "debug", skip(self, document))]
    pub async fn create_with_id<T>(
        &self,
        database: &str,
        id: Option<&str>,
        document: &mut T,
    ) -> Result<DocumentResponse, CouchError>
    where
        T: Serialize + DocumentIdentity,
    {
        ensure_database(database)?;
        let body = to_json(document)?;
        let response: DocumentResponse = match id {
            Some(id) => {
                let url = self.document_url(database, id, &[])?;
                self.fetch_json(Method::PUT, url, Some(Payload::json(body))).await?
            }
            None => {
                let url = self.url(&[database], &[])?;
                self.fetch_json(Method::POST, url, Some(Payload::json(body))).await?
            }
        };
        document.set_id(response.id.clone());
        document.set_rev(response.rev.clone());
        Ok(response)
    }

    /// Stores a new revision of an existing document and records the new revision in it.
    #[instrument(level = "debug", skip(self, document))]
    pub async fn update<T>(&self, database: &str, document: &mut T) -> Result<DocumentResponse, CouchError>
    where
        T: Serialize + DocumentIdentity,
    {
        let id = require(document.id(), "document id")?;
        let url = self.document_url(database, id, &[])?;
        let body = to_json(document)?;
        let response: DocumentResponse = self.fetch_json(Method::PUT, url, Some(Payload::json(body))).await?;
        document.set_rev(response.rev.clone());
        Ok(response)
    }

    /// Deletes the revision held by `document` and records the tombstone revision in it.
    pub async fn delete<T>(&self, database: &str, document: &mut T) -> Result<DocumentResponse, CouchError>
    where
        T: DocumentIdentity,
    {
        let id = require(document.id(), "document id")?;
        let rev = require(document.rev(), "document revision")?;
        let response = self.delete_revision(database, id, rev).await?;
        document.set_rev(response.rev.clone());
        Ok(response)
    }

    pub async fn delete_revision(
        &self,
        database: &str,
        id: &str,
        rev: &str,
    ) -> Result<DocumentResponse, CouchError> {
        let rev = require(Some(rev), "document revision")?;
        let params = [("rev".to_owned(), rev.to_owned())];
        let url = self.document_url(database, id, &params)?;
        self.fetch_json(Method::DELETE, url, None).await
    }

    /// Writes several documents in one `_bulk_docs` request.
    pub async fn bulk_update<T: Serialize>(&self, database: &str, documents: &[T]) -> Result<BulkResult, CouchError> {
        ensure_database(database)?;
        let url = self.url(&[database, BULK_DOCS], &[])?;
        let body = to_json(&BulkRequest { docs: documents })?;
        self.fetch_json(Method::POST, url, Some(Payload::json(body))).await
    }

    /// Asks the server for `count` fresh UUIDs.
    pub async fn uuids(&self, count: usize) -> Result<Vec<String>, CouchError> {
        let url = self.url(&[UUIDS], &[("count".to_owned(), count.to_string())])?;
        let list: UuidList = self.fetch_json(Method::GET, url, None).await?;
        Ok(list.uuids)
    }

    fn request_timeout(&self) -> Option<Duration> {
        (self.config.request_timeout_ms > 0).then(|| Duration::from_millis(self.config.request_timeout_ms))
    }

    fn url<S: AsRef<str>>(&self, segments: &[S], params: &[(String, String)]) -> Result<Url, CouchError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| CouchError::Config(format!("'{}' cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    fn document_url(&self, database: &str, id: &str, params: &[(String, String)]) -> Result<Url, CouchError> {
        ensure_database(database)?;
        let id = require(Some(id), "document id")?;
        let mut segments = vec![database];
        segments.extend(document_segments(id));
        self.url(&segments, params)
    }

    fn attachment_url(&self, database: &str, id: &str, rev: Option<&str>, name: &str) -> Result<Url, CouchError> {
        ensure_database(database)?;
        let id = require(Some(id), "document id")?;
        let name = require(Some(name), "attachment name")?;
        let mut segments = vec![database];
        segments.extend(document_segments(id));
        segments.push(name);
        let params: Vec<(String, String)> = rev
            .filter(|rev| !rev.is_empty())
            .map(|rev| ("rev".to_owned(), rev.to_owned()))
            .into_iter()
            .collect();
        self.url(&segments, &params)
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Payload>,
    ) -> Result<T, CouchError> {
        let response = self.send(method, url, body, self.request_timeout()).await?;
        let mut bytes = response.bytes().await?.to_vec();
        Ok(simd_json::from_slice(&mut bytes).map_err(DecodeError::from)?)
    }

    /// Sends a request, retrying per the client configuration, and fails on non-success statuses.
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Payload>,
        timeout: Option<Duration>,
    ) -> Result<Response, CouchError> {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.config.retry_base_delay_ms.max(1))
            .max_delay(MAX_RETRY_DELAY)
            .map(jitter)
            .take(self.config.max_retry_attempts);

        RetryIf::start(
            strategy,
            || {
                let request = self.request(method.clone(), url.clone(), body.clone(), timeout);
                async move {
                    let response = request.send().await?;
                    check_status(response).await
                }
            },
            |e: &CouchError| {
                let retry = self.is_retryable(e);
                if retry {
                    warn!(error = %e, "request failed, retrying");
                }
                retry
            },
        )
        .await
    }

    fn request(
        &self,
        method: Method,
        url: Url,
        body: Option<Payload>,
        timeout: Option<Duration>,
    ) -> reqwest::RequestBuilder {
        debug!(%method, %url, "sending request");
        let mut request = self
            .http
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(username) = &self.config.username {
            request = request.basic_auth(username, self.config.password.as_ref());
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        if let Some(payload) = body {
            request = request
                .header(CONTENT_TYPE, payload.content_type)
                .body(payload.data);
        }
        request
    }

    fn is_retryable(&self, error: &CouchError) -> bool {
        match error {
            CouchError::Status { status, .. } => *status >= 500,
            CouchError::Http(e) => self.config.retry_on_io_error && (e.is_connect() || e.is_timeout()),
            _ => false,
        }
    }
}

/// Attachment content streamed from the server.
pub struct Attachment {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub body: HttpBody,
}

/// Request body and its media type, cloned for every attempt.
#[derive(Debug, Clone)]
struct Payload {
    content_type: String,
    data: Bytes,
}

impl Payload {
    fn json(body: String) -> Self {
        Self {
            content_type: "application/json".to_owned(),
            data: Bytes::from(body),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct DocumentStatus {
    #[serde(default)]
    ok: bool,
}

async fn check_status(response: Response) -> Result<Response, CouchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut bytes = response.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
    let body: ErrorBody = simd_json::from_slice(&mut bytes).unwrap_or_default();
    debug!(status = status.as_u16(), error = %body.error, "request rejected");
    Err(CouchError::Status {
        status: status.as_u16(),
        error: body.error,
        reason: body.reason,
    })
}

fn found(result: Result<Response, CouchError>) -> Result<bool, CouchError> {
    match result {
        Ok(_) => Ok(true),
        Err(e) if is_not_found(&e) => Ok(false),
        Err(e) => Err(e),
    }
}

fn is_not_found(error: &CouchError) -> bool {
    error.status() == Some(StatusCode::NOT_FOUND.as_u16())
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, CouchError> {
    Ok(simd_json::to_string(value).map_err(DecodeError::from)?)
}

fn ensure_database(database: &str) -> Result<(), CouchError> {
    require(Some(database), "database name").map(|_| ())
}

fn require<'a>(value: Option<&'a str>, what: &str) -> Result<&'a str, CouchError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CouchError::InvalidArgument(format!("{what} must not be empty")))
}

/// `_design/` and `_local/` ids keep their slash as a path separator.
fn document_segments(id: &str) -> Vec<&str> {
    for prefix in ["_design", "_local"] {
        if let Some(name) = id.strip_prefix(prefix).and_then(|rest| rest.strip_prefix('/')) {
            return vec![prefix, name];
        }
    }
    vec![id]
}
