// 検索インデックスクライアント
//
// Algolia REST APIに対する部分更新（存在しなければ作成）とフィルター付き検索を行う。
// 再試行は行わない。失敗は呼び出し元（ストリーム処理）が報告する。

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument};
use url::Url;

use super::config::SearchIndexConfig;

/// リクエストタイムアウト（秒）
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// 接続タイムアウト（秒）
const CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum SearchIndexError {
    #[error("HTTPエラー: status={status}, message={message}")]
    HttpError { status: u16, message: String },

    #[error("ネットワークエラー: {0}")]
    NetworkError(String),

    #[error("シリアライズエラー: {0}")]
    SerializationError(String),

    #[error("URL構築エラー: {0}")]
    InvalidUrl(String),
}

/// 検索リクエスト
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    pub filters: String,
    pub page: u32,
    pub hits_per_page: u32,
}

/// 検索レスポンス
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub hits: Vec<Value>,
    #[serde(default)]
    pub nb_hits: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub nb_pages: u32,
    #[serde(default)]
    pub hits_per_page: u32,
}

/// フィルター式の値をクオートしてエスケープ
pub fn quoted_filter(attribute: &str, value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("{}:\"{}\"", attribute, escaped)
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// ドキュメントを部分更新（存在しなければ作成）
    async fn partial_update(
        &self,
        index: &str,
        object_id: &str,
        document: &Value,
    ) -> Result<(), SearchIndexError>;

    async fn search(
        &self,
        index: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse, SearchIndexError>;
}

/// Algolia REST APIクライアント
#[derive(Clone)]
pub struct AlgoliaSearchIndex {
    client: Client,
    application_id: String,
    api_key: String,
    write_host: String,
    read_host: String,
}

impl std::fmt::Debug for AlgoliaSearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgoliaSearchIndex")
            .field("application_id", &self.application_id)
            .finish_non_exhaustive()
    }
}

impl AlgoliaSearchIndex {
    pub fn new(config: &SearchIndexConfig) -> Result<Self, SearchIndexError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| SearchIndexError::NetworkError(e.to_string()))?;

        let application_id = config.application_id().to_string();
        Ok(Self {
            client,
            write_host: format!("https://{}.algolia.net", application_id.to_lowercase()),
            read_host: format!("https://{}-dsn.algolia.net", application_id.to_lowercase()),
            application_id,
            api_key: config.api_key().to_string(),
        })
    }

    fn build_url(host: &str, segments: &[&str]) -> Result<Url, SearchIndexError> {
        let mut url = Url::parse(host).map_err(|e| SearchIndexError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| SearchIndexError::InvalidUrl(host.to_string()))?
            .extend(segments);
        Ok(url)
    }

    /// `POST /1/indexes/{index}/{objectID}/partial?createIfNotExists=true`
    fn partial_update_url(&self, index: &str, object_id: &str) -> Result<Url, SearchIndexError> {
        let mut url = Self::build_url(
            &self.write_host,
            &["1", "indexes", index, object_id, "partial"],
        )?;
        url.query_pairs_mut()
            .append_pair("createIfNotExists", "true");
        Ok(url)
    }

    /// `POST /1/indexes/{index}/query`
    fn query_url(&self, index: &str) -> Result<Url, SearchIndexError> {
        Self::build_url(&self.read_host, &["1", "indexes", index, "query"])
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<reqwest::Response, SearchIndexError> {
        let response = self
            .client
            .post(url)
            .header("X-Algolia-Application-Id", &self.application_id)
            .header("X-Algolia-API-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "検索インデックスへのリクエスト失敗");
                SearchIndexError::NetworkError(e.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        error!(status = %status, body = %message, "検索インデックスエラー");
        Err(SearchIndexError::HttpError {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl SearchIndex for AlgoliaSearchIndex {
    #[instrument(skip(self, document), fields(index = %index, object_id = %object_id))]
    async fn partial_update(
        &self,
        index: &str,
        object_id: &str,
        document: &Value,
    ) -> Result<(), SearchIndexError> {
        let url = self.partial_update_url(index, object_id)?;
        self.post_json(url, document).await?;
        debug!("ドキュメント部分更新成功");
        Ok(())
    }

    #[instrument(skip(self, request), fields(index = %index, page = request.page))]
    async fn search(
        &self,
        index: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse, SearchIndexError> {
        let url = self.query_url(index)?;
        let response = self.post_json(url, request).await?;
        response
            .json::<SearchResponse>()
            .await
            .map_err(|e| SearchIndexError::SerializationError(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// テスト用のインメモリ検索インデックス
    ///
    /// 部分更新はトップレベルのキー単位でマージする。
    /// 検索は事前に設定したレスポンスを返し、リクエストを記録する。
    #[derive(Clone, Default)]
    pub struct MockSearchIndex {
        documents: Arc<Mutex<HashMap<(String, String), Value>>>,
        responses: Arc<Mutex<HashMap<String, SearchResponse>>>,
        requests: Arc<Mutex<Vec<(String, SearchRequest)>>>,
        fail_updates: Arc<Mutex<bool>>,
    }

    impl MockSearchIndex {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_response(self, index: &str, response: SearchResponse) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert(index.to_string(), response);
            self
        }

        pub fn fail_updates(&self) {
            *self.fail_updates.lock().unwrap() = true;
        }

        pub fn document(&self, index: &str, object_id: &str) -> Option<Value> {
            self.documents
                .lock()
                .unwrap()
                .get(&(index.to_string(), object_id.to_string()))
                .cloned()
        }

        pub fn document_count(&self) -> usize {
            self.documents.lock().unwrap().len()
        }

        pub fn requests(&self) -> Vec<(String, SearchRequest)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchIndex for MockSearchIndex {
        async fn partial_update(
            &self,
            index: &str,
            object_id: &str,
            document: &Value,
        ) -> Result<(), SearchIndexError> {
            if *self.fail_updates.lock().unwrap() {
                return Err(SearchIndexError::HttpError {
                    status: 500,
                    message: "mock error".to_string(),
                });
            }
            let mut documents = self.documents.lock().unwrap();
            let entry = documents
                .entry((index.to_string(), object_id.to_string()))
                .or_insert_with(|| json!({}));
            if let (Some(target), Some(source)) = (entry.as_object_mut(), document.as_object()) {
                for (key, value) in source {
                    target.insert(key.clone(), value.clone());
                }
            }
            Ok(())
        }

        async fn search(
            &self,
            index: &str,
            request: &SearchRequest,
        ) -> Result<SearchResponse, SearchIndexError> {
            self.requests
                .lock()
                .unwrap()
                .push((index.to_string(), request.clone()));
            Ok(self
                .responses
                .lock()
                .unwrap()
                .get(index)
                .cloned()
                .unwrap_or_default())
        }
    }

    fn client() -> AlgoliaSearchIndex {
        AlgoliaSearchIndex::new(&SearchIndexConfig::new("dev", "APPID", "secret")).unwrap()
    }

    #[test]
    fn test_partial_update_url() {
        let url = client()
            .partial_update_url("appsync_invitations_by_role_dev", "inv-1")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://appid.algolia.net/1/indexes/appsync_invitations_by_role_dev/inv-1/partial?createIfNotExists=true"
        );
    }

    #[test]
    fn test_object_id_is_percent_encoded() {
        let url = client().partial_update_url("idx", "a/b c").unwrap();
        assert!(url.as_str().contains("/a%2Fb%20c/partial"));
    }

    #[test]
    fn test_query_url_uses_read_host() {
        let url = client().query_url("appsync_users_by_role_dev").unwrap();
        assert_eq!(
            url.as_str(),
            "https://appid-dsn.algolia.net/1/indexes/appsync_users_by_role_dev/query"
        );
    }

    #[test]
    fn test_debug_hides_api_key() {
        let debug = format!("{:?}", client());
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_quoted_filter_escapes() {
        assert_eq!(quoted_filter("roleId", "role-1"), "roleId:\"role-1\"");
        assert_eq!(quoted_filter("roleId", "a\"b"), "roleId:\"a\\\"b\"");
    }

    #[test]
    fn test_search_request_serialization() {
        let request = SearchRequest {
            query: "ana".to_string(),
            filters: "roleId:\"r\"".to_string(),
            page: 1,
            hits_per_page: 20,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["hitsPerPage"], 20);
        assert_eq!(json["page"], 1);
    }

    #[test]
    fn test_search_response_deserialization() {
        let response: SearchResponse = serde_json::from_value(json!({
            "hits": [{"objectID": "1"}],
            "nbHits": 41,
            "page": 2,
            "nbPages": 3,
            "hitsPerPage": 20,
            "processingTimeMS": 1
        }))
        .unwrap();

        assert_eq!(response.hits.len(), 1);
        assert_eq!(response.nb_hits, 41);
        assert_eq!(response.nb_pages, 3);
    }

    #[tokio::test]
    async fn test_mock_partial_update_merges() {
        let index = MockSearchIndex::new();
        index
            .partial_update("idx", "1", &json!({"status": "PENDING", "email": "a@x"}))
            .await
            .unwrap();
        index
            .partial_update("idx", "1", &json!({"status": "APPROVED"}))
            .await
            .unwrap();

        let doc = index.document("idx", "1").unwrap();
        assert_eq!(doc["status"], "APPROVED");
        assert_eq!(doc["email"], "a@x");
        assert_eq!(index.document_count(), 1);
    }
}
