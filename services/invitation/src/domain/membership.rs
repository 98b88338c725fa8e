/// アカウント所属の管理
///
/// ユーザー属性`custom:accounts`に保存されるアカウントIDのJSON配列と、
/// 招待承認時に作成される関連行（アカウント-ユーザー、ロール-ユーザー）を扱う。
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::invitation::generate_id;

/// ユーザー属性名
pub const ACCOUNTS_ATTRIBUTE: &str = "custom:accounts";

/// アカウント所属リストのエラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MembershipError {
    /// 既に所属している
    #[error("account {0} is already in the membership list")]
    AlreadyMember(String),
    /// 属性値がJSON配列として読めない
    #[error("invalid membership attribute: {0}")]
    InvalidAttribute(String),
}

/// ユーザーが所属するアカウントIDのリスト
///
/// 既存要素の順序を保ち、重複を持たない。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountMemberships(Vec<String>);

impl AccountMemberships {
    pub fn new(accounts: Vec<String>) -> Self {
        Self(accounts)
    }

    /// 属性値（JSON配列文字列）をパース
    ///
    /// 属性が存在しない場合は空リストとして扱う。
    pub fn parse(attribute: Option<&str>) -> Result<Self, MembershipError> {
        match attribute {
            None => Ok(Self::default()),
            Some(raw) if raw.trim().is_empty() => Ok(Self::default()),
            Some(raw) => serde_json::from_str::<Vec<String>>(raw)
                .map(Self)
                .map_err(|e| MembershipError::InvalidAttribute(e.to_string())),
        }
    }

    pub fn contains(&self, account_id: &str) -> bool {
        self.0.iter().any(|a| a == account_id)
    }

    /// アカウントを末尾に追加した新しいリストを返す
    pub fn with_account(&self, account_id: &str) -> Result<Self, MembershipError> {
        if self.contains(account_id) {
            return Err(MembershipError::AlreadyMember(account_id.to_string()));
        }
        let mut accounts = self.0.clone();
        accounts.push(account_id.to_string());
        Ok(Self(accounts))
    }

    /// 属性値としてエンコード
    pub fn to_attribute(&self) -> String {
        // Vec<String>のシリアライズは失敗しない
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// アカウント-ユーザー関連行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUser {
    pub id: String,
    pub account_id: String,
    pub user_id: String,
}

impl AccountUser {
    pub fn new(account_id: &str, user_id: &str) -> Self {
        Self {
            id: generate_id(),
            account_id: account_id.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

/// ロール-ユーザー関連行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleUser {
    pub id: String,
    pub role_id: String,
    pub user_id: String,
}

impl RoleUser {
    pub fn new(role_id: &str, user_id: &str) -> Self {
        Self {
            id: generate_id(),
            role_id: role_id.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

/// 承認時に一括で書き込む所属情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipGrant {
    pub account_user: AccountUser,
    pub role_user: RoleUser,
}

impl MembershipGrant {
    pub fn new(account_id: &str, role_id: &str, user_id: &str) -> Self {
        Self {
            account_user: AccountUser::new(account_id, user_id),
            role_user: RoleUser::new(role_id, user_id),
        }
    }
}
