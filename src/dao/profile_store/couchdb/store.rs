use std::{sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode, Url};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;

use crate::dao::{
    models::{BestScoreWrite, Difficulty, Identity, ProfileEntity, ScoreEntity},
    profile_store::ProfileStore,
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, CouchProfileDocument, CouchScoreDocument, END_SUFFIX, PROFILE_PREFIX,
        profile_doc_id, score_prefix,
    },
};

/// CouchDB has no server-side `$max`/`$inc`; writes re-read and retry on `409 Conflict`.
const MAX_CAS_ATTEMPTS: u32 = 8;

/// [`ProfileStore`] backed by a single CouchDB database over HTTP.
#[derive(Clone)]
pub struct CouchProfileStore {
    client: Client,
    database_url: Arc<Url>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchProfileStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let database_url = database_url(&config.base_url, &config.database)?;

        let store = Self {
            client,
            database_url: Arc::new(database_url),
            database: Arc::from(config.database),
            auth: config
                .username
                .zip(config.password)
                .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p))),
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, segment: &str) -> reqwest::RequestBuilder {
        let url = document_url(&self.database_url, segment);
        self.authorize(self.client.request(method, url))
    }

    fn database_url(&self) -> String {
        self.database_url.to_string()
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .authorize(self.client.get(&url))
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
                    .authorize(self.client.put(&url))
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

    async fn ping(&self) -> CouchResult<()> {
        let url = self.database_url();
        let response = self
            .authorize(self.client.get(&url))
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
            })
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
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
                response.json::<T>().await.map(Some).map_err(|source| {
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

    /// PUT a document; a stale or missing `_rev` surfaces as [`CouchDaoError::Conflict`].
    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
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

    /// Documents whose id starts with `prefix`, in key order.
    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const ALL_DOCS: &str = "_all_docs";
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", format!("\"{prefix}\"")),
            ("endkey", format!("\"{prefix}{END_SUFFIX}\"")),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            }
        })?;

        payload
            .rows
            .into_iter()
            .filter_map(|row| row.doc)
            .map(|doc| {
                from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                    path: ALL_DOCS.to_string(),
                    source,
                })
            })
            .collect()
    }

    async fn upsert_profile(&self, identity: Identity) -> CouchResult<()> {
        let doc_id = profile_doc_id(&identity.uid);
        for _ in 0..MAX_CAS_ATTEMPTS {
            let mut document = match self.get_document::<CouchProfileDocument>(&doc_id).await? {
                Some(mut existing) => {
                    existing.profile.apply_identity(&identity);
                    existing
                }
                None => CouchProfileDocument::new(ProfileEntity::fresh(&identity)),
            };
            document.profile.last_seen = Some(SystemTime::now());

            match self.put_document(&doc_id, &document).await {
                Err(CouchDaoError::Conflict { .. }) => continue,
                other => return other,
            }
        }

        Err(CouchDaoError::ConflictRetriesExhausted {
            path: doc_id,
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    /// Read-modify-write loop. `apply` returns whether the document must be written
    /// along with the value to report; `None` means the profile does not exist.
    async fn modify_profile<R>(
        &self,
        uid: &str,
        mut apply: impl FnMut(&mut ProfileEntity) -> (bool, R),
    ) -> CouchResult<Option<R>> {
        let doc_id = profile_doc_id(uid);
        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(mut document) = self.get_document::<CouchProfileDocument>(&doc_id).await?
            else {
                return Ok(None);
            };

            let (dirty, outcome) = apply(&mut document.profile);
            if !dirty {
                return Ok(Some(outcome));
            }

            match self.put_document(&doc_id, &document).await {
                Ok(()) => return Ok(Some(outcome)),
                Err(CouchDaoError::Conflict { .. }) => continue,
                Err(err) => return Err(err),
            }
        }

        Err(CouchDaoError::ConflictRetriesExhausted {
            path: doc_id,
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    async fn raise_best_score(&self, uid: String, candidate: u64) -> CouchResult<BestScoreWrite> {
        let outcome = self
            .modify_profile(&uid, |profile| {
                if candidate > profile.best_score {
                    let previous = profile.best_score;
                    profile.best_score = candidate;
                    (true, BestScoreWrite::Raised { previous })
                } else {
                    (
                        false,
                        BestScoreWrite::Kept {
                            current: profile.best_score,
                        },
                    )
                }
            })
            .await?;
        Ok(outcome.unwrap_or(BestScoreWrite::NoProfile))
    }

    async fn bump_games_played(&self, uid: String) -> CouchResult<bool> {
        let outcome = self
            .modify_profile(&uid, |profile| {
                profile.games_played += 1;
                (true, ())
            })
            .await?;
        Ok(outcome.is_some())
    }

    async fn top_profiles(&self, limit: usize) -> CouchResult<Vec<ProfileEntity>> {
        let documents = self
            .list_documents::<CouchProfileDocument>(PROFILE_PREFIX)
            .await?;
        let mut profiles: Vec<ProfileEntity> =
            documents.into_iter().map(|doc| doc.profile).collect();
        // stable sort keeps key order among equal scores
        profiles.sort_by(|a, b| b.best_score.cmp(&a.best_score));
        profiles.truncate(limit);
        Ok(profiles)
    }

    async fn top_scores(
        &self,
        difficulty: Difficulty,
        limit: usize,
    ) -> CouchResult<Vec<ScoreEntity>> {
        let documents = self
            .list_documents::<CouchScoreDocument>(&score_prefix(difficulty))
            .await?;
        let mut entries: Vec<ScoreEntity> = documents.into_iter().map(Into::into).collect();
        entries.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        entries.truncate(limit);
        Ok(entries)
    }
}

/// `{base}/{database}` with the database name as its own path segment.
fn database_url(base_url: &str, database: &str) -> CouchResult<Url> {
    let invalid = |reason: String| CouchDaoError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason,
    };
    let mut url = Url::parse(base_url).map_err(|err| invalid(err.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| invalid("not a base url".into()))?
        .pop_if_empty()
        .push(database);
    Ok(url)
}

/// Append one percent-encoded path segment, so `?`, `#`, `%` and `/` in a
/// doc id never leak into the query or fragment.
fn document_url(database_url: &Url, segment: &str) -> Url {
    let mut url = database_url.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.push(segment);
    }
    url
}

impl ProfileStore for CouchProfileStore {
    fn upsert(&self, identity: &Identity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let identity = identity.clone();
        Box::pin(async move { store.upsert_profile(identity).await.map_err(Into::into) })
    }

    fn get(&self, uid: &str) -> BoxFuture<'static, StorageResult<Option<ProfileEntity>>> {
        let store = self.clone();
        let doc_id = profile_doc_id(uid);
        Box::pin(async move {
            let maybe_doc = store
                .get_document::<CouchProfileDocument>(&doc_id)
                .await?;
            Ok(maybe_doc.map(|doc| doc.profile))
        })
    }

    fn update_best_score(
        &self,
        uid: &str,
        candidate: u64,
    ) -> BoxFuture<'static, StorageResult<BestScoreWrite>> {
        let store = self.clone();
        let uid = uid.to_owned();
        Box::pin(async move {
            store
                .raise_best_score(uid, candidate)
                .await
                .map_err(Into::into)
        })
    }

    fn increment_games_played(&self, uid: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let uid = uid.to_owned();
        Box::pin(async move { store.bump_games_played(uid).await.map_err(Into::into) })
    }

    fn top_by_best_score(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<ProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.top_profiles(limit).await.map_err(Into::into) })
    }

    fn record_score(&self, entry: ScoreEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let document = CouchScoreDocument::from(entry);
            store
                .put_document(&document.id, &document)
                .await
                .map_err(Into::into)
        })
    }

    fn top_scores(
        &self,
        difficulty: Difficulty,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<ScoreEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            CouchProfileStore::top_scores(&store, difficulty, limit)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_name_becomes_one_segment() {
        let url = database_url("http://localhost:5984/", "camblaster").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5984/camblaster");
    }

    #[test]
    fn doc_ids_are_percent_encoded() {
        let base = database_url("http://localhost:5984", "camblaster").unwrap();

        let url = document_url(&base, &profile_doc_id("a?b#c%d/e"));
        assert_eq!(
            url.as_str(),
            "http://localhost:5984/camblaster/user::a%3Fb%23c%25d%2Fe"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);

        assert_eq!(
            document_url(&base, "_all_docs").as_str(),
            "http://localhost:5984/camblaster/_all_docs"
        );
    }

    #[test]
    fn relative_base_url_is_rejected() {
        assert!(matches!(
            database_url("localhost:5984", "camblaster"),
            Err(CouchDaoError::InvalidBaseUrl { .. })
        ));
    }
}
