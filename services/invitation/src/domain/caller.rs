/// リゾルバー呼び出し元のID情報
///
/// AppSyncイベントの`identity`（Cognitoユーザープール認証）から構築する。
use serde::Deserialize;
use serde_json::{Map, Value};

use super::membership::{ACCOUNTS_ATTRIBUTE, AccountMemberships};

/// 全アカウントへのアクセスを許可されたグループ名
pub const SUPER_ADMIN_GROUP: &str = "SuperAdmin";

/// 呼び出し元
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallerIdentity {
    /// Cognitoユーザー名（ユーザーテーブルのIDと一致）
    #[serde(default)]
    pub username: String,
    /// 所属グループ
    #[serde(default, deserialize_with = "nullable_groups")]
    pub groups: Vec<String>,
    /// IDトークンのクレーム
    #[serde(default)]
    pub claims: Map<String, Value>,
}

fn nullable_groups<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl CallerIdentity {
    pub fn is_super_admin(&self) -> bool {
        self.groups.iter().any(|g| g == SUPER_ADMIN_GROUP)
    }

    /// クレームに含まれる所属アカウント
    ///
    /// クレームが無い、または読めない場合は空。
    pub fn accounts(&self) -> AccountMemberships {
        let raw = self.claims.get(ACCOUNTS_ATTRIBUTE).and_then(Value::as_str);
        AccountMemberships::parse(raw).unwrap_or_default()
    }

    /// 指定アカウントが呼び出し元のスコープ内かどうか
    ///
    /// SuperAdminは全アカウントにアクセスできる。
    pub fn can_access_account(&self, account_id: &str) -> bool {
        self.is_super_admin() || self.accounts().contains(account_id)
    }
}
