/// 環境変数からの設定読み込み
///
/// Lambdaのコールドスタート時に一度だけ読み込み、ハンドラーへ参照で渡す。
use aws_sdk_dynamodb::Client as DynamoDbClient;
use thiserror::Error;

use super::ssm_ops::{SsmOps, SsmOpsError};

/// 設定のエラー型
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// SSMパラメータ取得エラー
    #[error("SSM parameter error: {0}")]
    Ssm(#[from] SsmOpsError),
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

/// DynamoDBテーブル名
///
/// - INVITATION_TABLE: 招待（GSI: byStatusByExpiration）
/// - ROLE_TABLE: ロール（キー: id + accountId）
/// - USER_TABLE: ユーザー（GSI: byEmail）
/// - ACCOUNT_TABLE: アカウント
/// - ACCOUNT_BY_USER_TABLE: アカウント-ユーザー関連
/// - USER_BY_ROLE_TABLE: ロール-ユーザー関連
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub invitations: String,
    pub roles: String,
    pub users: String,
    pub accounts: String,
    pub account_users: String,
    pub role_users: String,
}

impl TableNames {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            invitations: required_env("INVITATION_TABLE")?,
            roles: required_env("ROLE_TABLE")?,
            users: required_env("USER_TABLE")?,
            accounts: required_env("ACCOUNT_TABLE")?,
            account_users: required_env("ACCOUNT_BY_USER_TABLE")?,
            role_users: required_env("USER_BY_ROLE_TABLE")?,
        })
    }
}

/// テーブル名とクライアントを持つDynamoDB設定
#[derive(Debug, Clone)]
pub struct DynamoDbConfig {
    client: DynamoDbClient,
    tables: TableNames,
}

impl DynamoDbConfig {
    /// 共有AWS設定からクライアントを作成し、テーブル名を環境変数から読み込む
    pub fn from_env(aws_config: &aws_config::SdkConfig) -> Result<Self, ConfigError> {
        let tables = TableNames::from_env()?;
        Ok(Self {
            client: DynamoDbClient::new(aws_config),
            tables,
        })
    }

    /// 明示的な値で作成（テスト用）
    pub fn new(client: DynamoDbClient, tables: TableNames) -> Self {
        Self { client, tables }
    }

    pub fn client(&self) -> &DynamoDbClient {
        &self.client
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }
}

/// Cognitoユーザープール設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CognitoConfig {
    user_pool_id: String,
}

impl CognitoConfig {
    /// 環境変数: COGNITO_USER_POOL
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            user_pool_id: required_env("COGNITO_USER_POOL")?,
        })
    }

    pub fn new(user_pool_id: impl Into<String>) -> Self {
        Self {
            user_pool_id: user_pool_id.into(),
        }
    }

    pub fn user_pool_id(&self) -> &str {
        &self.user_pool_id
    }
}

/// 通知設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    sender_email: String,
    topic_arn: String,
    invitation_url: String,
}

impl NotificationConfig {
    /// 招待リンクのデフォルトベースURL
    pub const DEFAULT_INVITATION_URL: &'static str = "https://prueba.com";

    /// 環境変数:
    /// - SES_EMAIL: 送信元メールアドレス（必須）
    /// - NOTIFICATION_TOPIC_ARN: アプリ内通知用SNSトピック（必須）
    /// - INVITATION_URL: 招待リンクのベースURL（任意）
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            sender_email: required_env("SES_EMAIL")?,
            topic_arn: required_env("NOTIFICATION_TOPIC_ARN")?,
            invitation_url: std::env::var("INVITATION_URL")
                .unwrap_or_else(|_| Self::DEFAULT_INVITATION_URL.to_string()),
        })
    }

    pub fn new(
        sender_email: impl Into<String>,
        topic_arn: impl Into<String>,
        invitation_url: impl Into<String>,
    ) -> Self {
        Self {
            sender_email: sender_email.into(),
            topic_arn: topic_arn.into(),
            invitation_url: invitation_url.into(),
        }
    }

    pub fn sender_email(&self) -> &str {
        &self.sender_email
    }

    pub fn topic_arn(&self) -> &str {
        &self.topic_arn
    }

    pub fn invitation_url(&self) -> &str {
        &self.invitation_url
    }
}

/// 検索インデックス設定
///
/// 認証情報はSSM Parameter Storeから取得する。
/// - `/{STAGE}/algolia-app-id`
/// - `/{STAGE}/algolia-admin-key`
#[derive(Clone, PartialEq, Eq)]
pub struct SearchIndexConfig {
    stage: String,
    application_id: String,
    api_key: String,
}

impl std::fmt::Debug for SearchIndexConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndexConfig")
            .field("stage", &self.stage)
            .field("application_id", &self.application_id)
            .finish_non_exhaustive()
    }
}

impl SearchIndexConfig {
    pub fn new(
        stage: impl Into<String>,
        application_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            application_id: application_id.into(),
            api_key: api_key.into(),
        }
    }

    /// 環境変数STAGEを読み、SSMから認証情報を取得
    pub async fn from_env_with_ssm<S: SsmOps>(ssm: &S) -> Result<Self, ConfigError> {
        let stage = required_env("STAGE")?;
        let application_id = ssm.get_parameter(&Self::app_id_parameter(&stage)).await?;
        let api_key = ssm.get_parameter(&Self::api_key_parameter(&stage)).await?;
        Ok(Self::new(stage, application_id, api_key))
    }

    pub fn app_id_parameter(stage: &str) -> String {
        format!("/{}/algolia-app-id", stage)
    }

    pub fn api_key_parameter(stage: &str) -> String {
        format!("/{}/algolia-admin-key", stage)
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// ロール別ユーザーのインデックス名
    pub fn users_by_role_index(&self) -> String {
        format!("appsync_users_by_role_{}", self.stage)
    }

    /// ロール別招待のインデックス名
    pub fn invitations_by_role_index(&self) -> String {
        format!("appsync_invitations_by_role_{}", self.stage)
    }
}
