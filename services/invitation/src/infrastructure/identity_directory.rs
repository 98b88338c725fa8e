//! アイデンティティプロバイダー（Cognito）のアカウント所属属性
//!
//! `custom:accounts`はユーザーレコード単位の読み書きしかできないため、
//! 追加は読み込み→追記→書き込み→再読み込みによる確認で行う。
//! 確認時に他の書き込みで追加分が失われていれば、最新値に対して再適用する。

use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_cognitoidentityprovider::types::AttributeType;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::membership::ACCOUNTS_ATTRIBUTE;
use crate::domain::{AccountMemberships, MembershipError};

/// 所属追加の最大試行回数
pub const MAX_MEMBERSHIP_ATTEMPTS: usize = 3;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IdentityDirectoryError {
    #[error("User not found in identity provider: {0}")]
    UserNotFound(String),

    /// 既に所属している
    #[error("User is already in Account")]
    AlreadyMember(String),

    #[error("Invalid membership attribute: {0}")]
    InvalidAttribute(String),

    /// 並行書き込みにより追加を確定できなかった
    #[error("Membership update did not persist after {attempts} attempts for {username}")]
    Conflict { username: String, attempts: usize },

    #[error("AWS Cognito APIエラー: {0}")]
    AwsSdkError(String),
}

impl From<MembershipError> for IdentityDirectoryError {
    fn from(err: MembershipError) -> Self {
        match err {
            MembershipError::AlreadyMember(account) => IdentityDirectoryError::AlreadyMember(account),
            MembershipError::InvalidAttribute(msg) => IdentityDirectoryError::InvalidAttribute(msg),
        }
    }
}

/// ユーザーの所属アカウント属性の読み書き
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn account_memberships(
        &self,
        username: &str,
    ) -> Result<AccountMemberships, IdentityDirectoryError>;

    /// 属性値を丸ごと書き込む
    async fn write_account_memberships(
        &self,
        username: &str,
        memberships: &AccountMemberships,
    ) -> Result<(), IdentityDirectoryError>;
}

/// アカウントを所属リストへ追加する
///
/// 既に所属していればAlreadyMember（書き込みは行わない）。
/// 書き込み後に再読み込みして追加を確認し、失われていれば最大
/// `MAX_MEMBERSHIP_ATTEMPTS`回まで再適用する。
pub async fn add_account_membership<D: IdentityDirectory + ?Sized>(
    directory: &D,
    username: &str,
    account_id: &str,
) -> Result<AccountMemberships, IdentityDirectoryError> {
    let mut current = directory.account_memberships(username).await?;
    if current.contains(account_id) {
        return Err(IdentityDirectoryError::AlreadyMember(account_id.to_string()));
    }

    for attempt in 1..=MAX_MEMBERSHIP_ATTEMPTS {
        let updated = current.with_account(account_id)?;
        directory
            .write_account_memberships(username, &updated)
            .await?;

        let persisted = directory.account_memberships(username).await?;
        if persisted.contains(account_id) {
            info!(
                username = %username,
                account_id = %account_id,
                attempt,
                "所属アカウント追加完了"
            );
            return Ok(persisted);
        }

        warn!(
            username = %username,
            account_id = %account_id,
            attempt,
            "所属アカウントが並行更新で失われたため再適用"
        );
        current = persisted;
    }

    Err(IdentityDirectoryError::Conflict {
        username: username.to_string(),
        attempts: MAX_MEMBERSHIP_ATTEMPTS,
    })
}

/// Cognitoユーザープールを使用した実装
pub struct CognitoIdentityDirectory {
    client: CognitoClient,
    user_pool_id: String,
}

impl CognitoIdentityDirectory {
    pub fn new(client: CognitoClient, user_pool_id: impl Into<String>) -> Self {
        Self {
            client,
            user_pool_id: user_pool_id.into(),
        }
    }
}

#[async_trait]
impl IdentityDirectory for CognitoIdentityDirectory {
    async fn account_memberships(
        &self,
        username: &str,
    ) -> Result<AccountMemberships, IdentityDirectoryError> {
        let result = self
            .client
            .admin_get_user()
            .user_pool_id(&self.user_pool_id)
            .username(username)
            .send()
            .await;

        match result {
            Ok(output) => {
                let raw = output
                    .user_attributes()
                    .iter()
                    .find(|attribute| attribute.name() == ACCOUNTS_ATTRIBUTE)
                    .and_then(|attribute| attribute.value());
                Ok(AccountMemberships::parse(raw)?)
            }
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_user_not_found_exception() {
                    return Err(IdentityDirectoryError::UserNotFound(username.to_string()));
                }
                Err(IdentityDirectoryError::AwsSdkError(service_error.to_string()))
            }
        }
    }

    async fn write_account_memberships(
        &self,
        username: &str,
        memberships: &AccountMemberships,
    ) -> Result<(), IdentityDirectoryError> {
        let attribute = AttributeType::builder()
            .name(ACCOUNTS_ATTRIBUTE)
            .value(memberships.to_attribute())
            .build()
            .map_err(|e| IdentityDirectoryError::AwsSdkError(e.to_string()))?;

        self.client
            .admin_update_user_attributes()
            .user_pool_id(&self.user_pool_id)
            .username(username)
            .user_attributes(attribute)
            .send()
            .await
            .map_err(|err| {
                let service_error = err.into_service_error();
                if service_error.is_user_not_found_exception() {
                    IdentityDirectoryError::UserNotFound(username.to_string())
                } else {
                    IdentityDirectoryError::AwsSdkError(service_error.to_string())
                }
            })?;

        Ok(())
    }
}
