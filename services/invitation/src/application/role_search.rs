// ロール単位の検索クエリ
//
// usersByRole / invitationsByRole を検索インデックスへのフィルター付き検索に変換し、
// ヒットをページ形式のレスポンスに整形する。

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use crate::domain::format_timestamp;
use crate::infrastructure::search_index::quoted_filter;
use crate::infrastructure::{SearchIndex, SearchIndexError, SearchRequest, SearchResponse};

/// デフォルトのページ番号（0始まり）
pub const DEFAULT_PAGE: u32 = 0;
/// デフォルトのページサイズ
pub const DEFAULT_PAGE_SIZE: u32 = 100;
/// 検索インデックスが許可する最大ページサイズ
pub const MAX_PAGE_SIZE: u32 = 1000;
/// usersByRoleのデフォルトのユーザーステータス
pub const DEFAULT_USER_STATUS: &str = "APPROVED";

#[derive(Debug, Error)]
pub enum RoleSearchError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Search failed: {0}")]
    Index(#[from] SearchIndexError),
}

/// usersByRoleの入力
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsersByRoleInput {
    pub role_id: String,
    #[serde(default)]
    pub user_status: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub size: Option<u32>,
}

/// invitationsByRoleの入力
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationsByRoleInput {
    pub role_id: String,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub size: Option<u32>,
}

/// ページ形式のレスポンス
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub data: Vec<Value>,
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u32,
}

impl Page {
    fn from_response(response: SearchResponse, map_hit: impl Fn(Value) -> Value) -> Self {
        Self {
            page: response.page,
            size: response.hits_per_page,
            total_elements: response.nb_hits,
            total_pages: response.nb_pages,
            data: response.hits.into_iter().map(map_hit).collect(),
        }
    }
}

fn require_role_id(role_id: &str) -> Result<(), RoleSearchError> {
    if role_id.trim().is_empty() {
        return Err(RoleSearchError::InvalidInput(
            "roleId must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn page_size(size: Option<u32>) -> u32 {
    size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

/// ヒットに別属性の値を`id`として追加
fn with_id_from(mut hit: Value, source: &str) -> Value {
    if let Some(object) = hit.as_object_mut() {
        let id = object.get(source).cloned().unwrap_or(Value::Null);
        object.insert("id".to_string(), id);
    }
    hit
}

/// 招待ヒットの整形
///
/// `id`=objectID、`expirationDate`=有効期限のISO 8601表現、`date`=createdAt。
fn invitation_hit(hit: Value) -> Value {
    let mut hit = with_id_from(hit, "objectID");
    if let Some(object) = hit.as_object_mut() {
        let expiration_date = object
            .get("expiration")
            .and_then(Value::as_i64)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|dt| Value::String(format_timestamp(dt)))
            .unwrap_or(Value::Null);
        let date = object.get("createdAt").cloned().unwrap_or(Value::Null);
        object.insert("expirationDate".to_string(), expiration_date);
        object.insert("date".to_string(), date);
    }
    hit
}

pub struct RoleSearch<SI: SearchIndex> {
    index: SI,
    users_index: String,
    invitations_index: String,
}

impl<SI: SearchIndex> RoleSearch<SI> {
    pub fn new(
        index: SI,
        users_index: impl Into<String>,
        invitations_index: impl Into<String>,
    ) -> Self {
        Self {
            index,
            users_index: users_index.into(),
            invitations_index: invitations_index.into(),
        }
    }

    /// ロールに所属するユーザーを検索
    pub async fn users_by_role(&self, input: &UsersByRoleInput) -> Result<Page, RoleSearchError> {
        require_role_id(&input.role_id)?;

        let status = input.user_status.as_deref().unwrap_or(DEFAULT_USER_STATUS);
        let request = SearchRequest {
            query: input.search.clone().unwrap_or_default(),
            filters: format!(
                "{} AND {}",
                quoted_filter("roleId", &input.role_id),
                quoted_filter("status", status)
            ),
            page: input.page.unwrap_or(DEFAULT_PAGE),
            hits_per_page: page_size(input.size),
        };

        let response = self
            .index
            .search(&self.users_index, &request)
            .await
            .inspect_err(|e| error!(role_id = %input.role_id, error = %e, "usersByRole検索失敗"))?;

        info!(
            role_id = %input.role_id,
            nb_hits = response.nb_hits,
            page = response.page,
            "usersByRole検索完了"
        );
        Ok(Page::from_response(response, |hit| with_id_from(hit, "userId")))
    }

    /// ロールのPENDING / REJECTED招待を検索
    pub async fn invitations_by_role(
        &self,
        input: &InvitationsByRoleInput,
    ) -> Result<Page, RoleSearchError> {
        require_role_id(&input.role_id)?;

        let request = SearchRequest {
            query: String::new(),
            filters: format!(
                "({} OR {}) AND {}",
                quoted_filter("status", "PENDING"),
                quoted_filter("status", "REJECTED"),
                quoted_filter("roleId", &input.role_id)
            ),
            page: input.page.unwrap_or(DEFAULT_PAGE),
            hits_per_page: page_size(input.size),
        };

        let response = self
            .index
            .search(&self.invitations_index, &request)
            .await
            .inspect_err(|e| {
                error!(role_id = %input.role_id, error = %e, "invitationsByRole検索失敗")
            })?;

        info!(
            role_id = %input.role_id,
            nb_hits = response.nb_hits,
            page = response.page,
            "invitationsByRole検索完了"
        );
        Ok(Page::from_response(response, invitation_hit))
    }
}
