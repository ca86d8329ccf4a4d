use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::{task::AbortHandle, time::sleep};
use tracing::{debug, info, warn};

use crate::dao::{
    document_store::{ChangeCallback, DocumentStore, Fields, SubscriptionHandle, merge_fields},
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{ChangesResponse, REV_FIELD, doc_id, strip_meta},
};

const CHANGES: &str = "_changes";
const LONGPOLL_TIMEOUT_MS: &str = "25000";
const FEED_INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const FEED_MAX_DELAY: Duration = Duration::from_secs(10);

/// Document store backed by a CouchDB database.
#[derive(Clone)]
pub struct CouchDocumentStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
    feeds: Arc<DashMap<SubscriptionHandle, AbortHandle>>,
}

#[derive(Debug, Deserialize)]
struct DatabaseInfo {
    update_seq: Value,
}

impl CouchDocumentStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
            feeds: Arc::new(DashMap::new()),
        };

        store.ensure_database().await?;
        info!(database = %store.database, "connected to CouchDB");
        Ok(store)
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.database_url(), path);
        self.authorized(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorized(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    /// Fetch a raw document, CouchDB `_id`/`_rev` included.
    async fn get_raw(&self, doc_id: &str) -> CouchResult<Option<Fields>> {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<Fields>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_raw(&self, doc_id: &str, document: &Fields) -> CouchResult<()> {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(CouchDaoError::Conflict {
                path: doc_id.to_string(),
            }),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn write(&self, doc_id: &str, fields: Fields, merge: bool) -> CouchResult<()> {
        let (existing, rev) = match self.get_raw(doc_id).await? {
            Some(mut current) => {
                let rev = strip_meta(&mut current);
                (Some(current), rev)
            }
            None => (None, None),
        };

        let mut document = merge_fields(existing, fields, merge);
        if let Some(rev) = rev {
            document.insert(REV_FIELD.to_string(), Value::String(rev));
        }
        self.put_raw(doc_id, &document).await
    }

    async fn update_seq(&self) -> CouchResult<Value> {
        let url = self.database_url();
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: url,
                status: response.status(),
            });
        }

        let info = response
            .json::<DatabaseInfo>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse { path: url, source })?;
        Ok(info.update_seq)
    }

    async fn poll_changes(&self, doc_id: &str, since: &Value) -> CouchResult<ChangesResponse> {
        let since = match since {
            Value::String(seq) => seq.clone(),
            other => other.to_string(),
        };
        let query = [
            ("feed", "longpoll"),
            ("filter", "_doc_ids"),
            ("include_docs", "true"),
            ("timeout", LONGPOLL_TIMEOUT_MS),
            ("since", since.as_str()),
        ];

        let response = self
            .request(Method::POST, CHANGES)
            .query(&query)
            .json(&json!({ "doc_ids": [doc_id] }))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: CHANGES.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: CHANGES.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<ChangesResponse>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: CHANGES.to_string(),
                source,
            })
    }

    /// Long-poll the changes feed for a single document until aborted.
    async fn follow(self, doc_id: String, since: Value, on_change: ChangeCallback) {
        let mut since = since;
        let mut delay = FEED_INITIAL_DELAY;

        loop {
            match self.poll_changes(&doc_id, &since).await {
                Ok(changes) => {
                    delay = FEED_INITIAL_DELAY;
                    for row in changes.results {
                        if row.deleted || row.id != doc_id {
                            continue;
                        }
                        if let Some(mut fields) = row.doc {
                            strip_meta(&mut fields);
                            on_change(fields);
                        }
                    }
                    since = changes.last_seq;
                }
                Err(err) => {
                    warn!(document = %doc_id, error = %err, "CouchDB changes feed failed; retrying");
                    sleep(delay).await;
                    delay = (delay * 2).min(FEED_MAX_DELAY);
                }
            }
        }
    }
}

impl DocumentStore for CouchDocumentStore {
    fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Fields>>> {
        let store = self.clone();
        let doc_id = doc_id(collection, id);
        Box::pin(async move {
            let document = store.get_raw(&doc_id).await?;
            Ok(document.map(|mut fields| {
                strip_meta(&mut fields);
                fields
            }))
        })
    }

    fn set_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        merge: bool,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let doc_id = doc_id(collection, id);
        Box::pin(async move { store.write(&doc_id, fields, merge).await.map_err(Into::into) })
    }

    fn subscribe(
        &self,
        collection: &str,
        id: &str,
        on_change: ChangeCallback,
    ) -> BoxFuture<'static, StorageResult<SubscriptionHandle>> {
        let store = self.clone();
        let doc_id = doc_id(collection, id);
        Box::pin(async move {
            // Sequence first so nothing written after the initial read is missed.
            let since = store.update_seq().await?;
            if let Some(mut fields) = store.get_raw(&doc_id).await? {
                strip_meta(&mut fields);
                on_change(fields);
            }

            let handle = SubscriptionHandle::new();
            let feed = tokio::spawn(store.clone().follow(doc_id.clone(), since, on_change));
            store.feeds.insert(handle, feed.abort_handle());
            debug!(document = %doc_id, %handle, "CouchDB subscription started");
            Ok(handle)
        })
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> BoxFuture<'static, StorageResult<()>> {
        let feeds = self.feeds.clone();
        Box::pin(async move {
            if let Some((_, feed)) = feeds.remove(&handle) {
                feed.abort();
                debug!(%handle, "CouchDB subscription stopped");
            }
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url();
            let response = store
                .authorized(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }
}
