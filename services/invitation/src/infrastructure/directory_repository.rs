/// アカウント・ロール・ユーザーの参照用リポジトリ
use async_trait::async_trait;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_dynamodb::types::AttributeValue;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

use super::config::TableNames;
use super::invitation_repository::RepositoryError;
use crate::domain::{Account, Role, UserProfile};

/// ユーザーテーブルのメールアドレスGSI
pub const USER_EMAIL_INDEX: &str = "byEmail";

#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    async fn get_account(&self, account_id: &str) -> Result<Option<Account>, RepositoryError>;

    /// ロールはアカウントとの複合キーで取得する
    async fn get_role(
        &self,
        role_id: &str,
        account_id: &str,
    ) -> Result<Option<Role>, RepositoryError>;

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, RepositoryError>;

    /// メールアドレスに一致するユーザーIDを検索（存在しなければNone）
    async fn find_user_id_by_email(&self, email: &str) -> Result<Option<String>, RepositoryError>;
}

/// DirectoryRepositoryのDynamoDB実装
#[derive(Debug, Clone)]
pub struct DynamoDirectoryRepository {
    client: DynamoDbClient,
    tables: TableNames,
}

impl DynamoDirectoryRepository {
    pub fn new(client: DynamoDbClient, tables: TableNames) -> Self {
        Self { client, tables }
    }

    async fn get_by_key<T: DeserializeOwned>(
        &self,
        table_name: &str,
        key: HashMap<String, AttributeValue>,
    ) -> Result<Option<T>, RepositoryError> {
        let result = self
            .client
            .get_item()
            .table_name(table_name)
            .set_key(Some(key))
            .send()
            .await
            .map_err(|e| RepositoryError::ReadError(e.into_service_error().to_string()))?;

        result
            .item
            .map(|item| {
                serde_dynamo::from_item(item)
                    .map_err(|e| RepositoryError::SerializationError(e.to_string()))
            })
            .transpose()
    }

    fn id_key(id: &str) -> HashMap<String, AttributeValue> {
        HashMap::from([("id".to_string(), AttributeValue::S(id.to_string()))])
    }
}

#[async_trait]
impl DirectoryRepository for DynamoDirectoryRepository {
    async fn get_account(&self, account_id: &str) -> Result<Option<Account>, RepositoryError> {
        self.get_by_key(&self.tables.accounts, Self::id_key(account_id))
            .await
    }

    async fn get_role(
        &self,
        role_id: &str,
        account_id: &str,
    ) -> Result<Option<Role>, RepositoryError> {
        let mut key = Self::id_key(role_id);
        key.insert(
            "accountId".to_string(),
            AttributeValue::S(account_id.to_string()),
        );
        self.get_by_key(&self.tables.roles, key).await
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, RepositoryError> {
        self.get_by_key(&self.tables.users, Self::id_key(user_id))
            .await
    }

    async fn find_user_id_by_email(&self, email: &str) -> Result<Option<String>, RepositoryError> {
        let result = self
            .client
            .query()
            .table_name(&self.tables.users)
            .index_name(USER_EMAIL_INDEX)
            .key_condition_expression("email = :email")
            .expression_attribute_values(":email", AttributeValue::S(email.to_string()))
            .limit(1)
            .send()
            .await
            .map_err(|e| RepositoryError::ReadError(e.into_service_error().to_string()))?;

        Ok(result
            .items
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|item| match item.get("id") {
                Some(AttributeValue::S(id)) => Some(id.clone()),
                _ => None,
            }))
    }
}
