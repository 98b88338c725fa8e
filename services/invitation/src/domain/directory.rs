/// アカウント・ロール・ユーザーの参照用モデル
///
/// 招待ワークフローはこれらを読み取るだけで、作成・更新は行わない。
/// （ロールの`users_amount`は承認トランザクション内でのみ加算される）
use serde::{Deserialize, Serialize};

/// アカウント（テナント）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
}

/// アカウントに属するロール
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: String,
    pub account_id: String,
    #[serde(default)]
    pub name: String,
    /// 所属ユーザー数
    #[serde(default)]
    pub users_amount: i64,
}

/// ユーザーの表示用情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    /// PENDING / APPROVED / BLOCKED
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}
