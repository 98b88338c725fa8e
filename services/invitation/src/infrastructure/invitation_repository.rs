/// DynamoDBで招待と所属関連行を管理するリポジトリ
///
/// ステータス遷移を伴う書き込みは全て条件付きで行い、
/// 複数アイテムにまたがる書き込みはトランザクションで原子的に実行する。
use async_trait::async_trait;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{AttributeValue, CancellationReason, Put, TransactWriteItem, Update};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

use super::config::TableNames;
use super::update_expression::{InvitationField, UpdateExpression};
use crate::domain::invitation::INVITATION_TYPENAME;
use crate::domain::{Invitation, InvitationPatch, InvitationStatus, MembershipGrant, format_timestamp};

/// 1トランザクションに含められる最大アイテム数
pub const MAX_TRANSACTION_ITEMS: usize = 25;

/// 期限切れ検索に使うGSI（status + expiration）
pub const STATUS_EXPIRATION_INDEX: &str = "byStatusByExpiration";

/// リポジトリ操作のエラー型
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RepositoryError {
    /// DynamoDBへの書き込みに失敗
    #[error("Write error: {0}")]
    WriteError(String),

    /// DynamoDBからの読み取りに失敗
    #[error("Read error: {0}")]
    ReadError(String),

    /// データのシリアライズ/デシリアライズに失敗
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// 条件式（存在・ステータス）を満たさなかった
    #[error("Condition check failed: {0}")]
    ConditionFailed(String),
}

/// スキャン結果の1ページ
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvitationPage {
    pub invitations: Vec<Invitation>,
    /// 次ページの開始キー（最終ページならNone）
    pub next_cursor: Option<String>,
}

/// キャンセル理由に条件チェック失敗が含まれるか
///
/// 理由はトランザクション内のアイテム順に並び、成功したアイテムは`None`コードになる。
fn has_condition_failure(reasons: &[CancellationReason]) -> bool {
    reasons
        .iter()
        .any(|reason| reason.code() == Some("ConditionalCheckFailed"))
}

/// 招待の永続化トレイト
#[async_trait]
pub trait InvitationRepository: Send + Sync {
    /// IDで取得（強い整合性読み込み）
    async fn get(&self, invitation_id: &str) -> Result<Option<Invitation>, RepositoryError>;

    /// 新規招待を保存（同一IDが存在する場合はConditionFailed）
    async fn put_new(&self, invitation: &Invitation) -> Result<(), RepositoryError>;

    /// PENDINGの招待にパッチを適用
    async fn update_pending(
        &self,
        invitation_id: &str,
        patch: &InvitationPatch,
    ) -> Result<(), RepositoryError>;

    /// ステータスに関わらずDELETEDにする（存在しない場合はConditionFailed）
    async fn mark_deleted(&self, invitation_id: &str, now: DateTime<Utc>)
    -> Result<(), RepositoryError>;

    /// 再送: クローンの保存と元招待のDELETED化を1トランザクションで実行
    async fn resend(
        &self,
        original_id: &str,
        replacement: &Invitation,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// 承認: 関連行2件の作成、ロールのユーザー数加算、招待の更新を1トランザクションで実行
    async fn grant_membership(
        &self,
        invitation_id: &str,
        patch: &InvitationPatch,
        grant: &MembershipGrant,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// 期限切れ（`expiration <= now_epoch`）のPENDING招待IDを全件取得
    async fn expired_pending_ids(&self, now_epoch: i64) -> Result<Vec<String>, RepositoryError>;

    /// 複数の招待を1トランザクションでDELETEDにする（最大25件）
    async fn mark_deleted_batch(
        &self,
        invitation_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// 招待テーブルを1ページ分スキャン
    async fn scan_page(
        &self,
        cursor: Option<&str>,
        limit: i32,
    ) -> Result<InvitationPage, RepositoryError>;
}

/// InvitationRepositoryのDynamoDB実装
#[derive(Debug, Clone)]
pub struct DynamoInvitationRepository {
    client: DynamoDbClient,
    tables: TableNames,
}

impl DynamoInvitationRepository {
    pub fn new(client: DynamoDbClient, tables: TableNames) -> Self {
        Self { client, tables }
    }

    fn id_key(id: &str) -> AttributeValue {
        AttributeValue::S(id.to_string())
    }

    /// 構造体をアイテムに変換し`__typename`と（無ければ）作成・更新日時を付与
    fn to_item<T: Serialize>(
        value: &T,
        typename: &str,
        now: Option<DateTime<Utc>>,
    ) -> Result<HashMap<String, AttributeValue>, RepositoryError> {
        let mut item: HashMap<String, AttributeValue> = serde_dynamo::to_item(value)
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;
        item.insert(
            "__typename".to_string(),
            AttributeValue::S(typename.to_string()),
        );
        if let Some(now) = now {
            let timestamp = AttributeValue::S(format_timestamp(now));
            item.entry("createdAt".to_string())
                .or_insert_with(|| timestamp.clone());
            item.entry("updatedAt".to_string()).or_insert(timestamp);
        }
        Ok(item)
    }

    fn from_item(item: HashMap<String, AttributeValue>) -> Result<Invitation, RepositoryError> {
        serde_dynamo::from_item(item).map_err(|e| RepositoryError::SerializationError(e.to_string()))
    }

    /// PENDING条件付きのパッチ更新式
    fn pending_update(patch: &InvitationPatch) -> Result<UpdateExpression, RepositoryError> {
        UpdateExpression::from_patch(patch)
            .map(|update| {
                update
                    .with_name(InvitationField::Status)
                    .with_value(
                        ":pending",
                        AttributeValue::S(InvitationStatus::Pending.as_str().to_string()),
                    )
            })
            .map_err(|e| RepositoryError::WriteError(e.to_string()))
    }

    fn deleted_update(now: DateTime<Utc>) -> Result<UpdateExpression, RepositoryError> {
        UpdateExpression::from_patch(&InvitationPatch::status(InvitationStatus::Deleted, now))
            .map_err(|e| RepositoryError::WriteError(e.to_string()))
    }

    fn invitation_update(
        &self,
        invitation_id: &str,
        update: UpdateExpression,
        condition: &str,
    ) -> Result<Update, RepositoryError> {
        let (expression, names, values) = update.into_parts();
        Update::builder()
            .table_name(&self.tables.invitations)
            .key("id", Self::id_key(invitation_id))
            .update_expression(expression)
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(Some(values))
            .condition_expression(condition)
            .build()
            .map_err(|e| RepositoryError::WriteError(e.to_string()))
    }

    fn put_new_item(
        table_name: &str,
        item: HashMap<String, AttributeValue>,
    ) -> Result<Put, RepositoryError> {
        Put::builder()
            .table_name(table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(id)")
            .build()
            .map_err(|e| RepositoryError::WriteError(e.to_string()))
    }

    /// トランザクションを実行し、条件チェック失敗をConditionFailedに変換
    async fn transact(
        &self,
        items: Vec<TransactWriteItem>,
        context: &str,
    ) -> Result<(), RepositoryError> {
        if items.len() > MAX_TRANSACTION_ITEMS {
            return Err(RepositoryError::WriteError(format!(
                "transaction has {} items (max {})",
                items.len(),
                MAX_TRANSACTION_ITEMS
            )));
        }

        let result = self
            .client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let service_error = err.into_service_error();
                if let TransactWriteItemsError::TransactionCanceledException(canceled) =
                    &service_error
                    && has_condition_failure(canceled.cancellation_reasons())
                {
                    return Err(RepositoryError::ConditionFailed(context.to_string()));
                }
                warn!(context = %context, error = %service_error, "トランザクション失敗");
                Err(RepositoryError::WriteError(service_error.to_string()))
            }
        }
    }
}

#[async_trait]
impl InvitationRepository for DynamoInvitationRepository {
    async fn get(&self, invitation_id: &str) -> Result<Option<Invitation>, RepositoryError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.tables.invitations)
            .key("id", Self::id_key(invitation_id))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| RepositoryError::ReadError(e.into_service_error().to_string()))?;

        result.item.map(Self::from_item).transpose()
    }

    async fn put_new(&self, invitation: &Invitation) -> Result<(), RepositoryError> {
        let item = Self::to_item(invitation, INVITATION_TYPENAME, None)?;

        let result = self
            .client
            .put_item()
            .table_name(&self.tables.invitations)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_conditional_check_failed_exception() {
                    return Err(RepositoryError::ConditionFailed(invitation.id.clone()));
                }
                Err(RepositoryError::WriteError(service_error.to_string()))
            }
        }
    }

    async fn update_pending(
        &self,
        invitation_id: &str,
        patch: &InvitationPatch,
    ) -> Result<(), RepositoryError> {
        let (expression, names, values) = Self::pending_update(patch)?.into_parts();

        let result = self
            .client
            .update_item()
            .table_name(&self.tables.invitations)
            .key("id", Self::id_key(invitation_id))
            .update_expression(expression)
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(Some(values))
            .condition_expression("attribute_exists(id) AND #status = :pending")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_conditional_check_failed_exception() {
                    return Err(RepositoryError::ConditionFailed(invitation_id.to_string()));
                }
                Err(RepositoryError::WriteError(service_error.to_string()))
            }
        }
    }

    async fn mark_deleted(
        &self,
        invitation_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let (expression, names, values) = Self::deleted_update(now)?.into_parts();

        let result = self
            .client
            .update_item()
            .table_name(&self.tables.invitations)
            .key("id", Self::id_key(invitation_id))
            .update_expression(expression)
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(Some(values))
            .condition_expression("attribute_exists(id)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_conditional_check_failed_exception() {
                    return Err(RepositoryError::ConditionFailed(invitation_id.to_string()));
                }
                Err(RepositoryError::WriteError(service_error.to_string()))
            }
        }
    }

    async fn resend(
        &self,
        original_id: &str,
        replacement: &Invitation,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let item = Self::to_item(replacement, INVITATION_TYPENAME, None)?;
        let put = Self::put_new_item(&self.tables.invitations, item)?;

        let deleted = InvitationPatch::status(InvitationStatus::Deleted, now);
        let update = self.invitation_update(
            original_id,
            Self::pending_update(&deleted)?,
            "attribute_exists(id) AND #status = :pending",
        )?;

        self.transact(
            vec![
                TransactWriteItem::builder().put(put).build(),
                TransactWriteItem::builder().update(update).build(),
            ],
            original_id,
        )
        .await
    }

    async fn grant_membership(
        &self,
        invitation_id: &str,
        patch: &InvitationPatch,
        grant: &MembershipGrant,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let account_user = Self::put_new_item(
            &self.tables.account_users,
            Self::to_item(&grant.account_user, "AccountUser", Some(now))?,
        )?;
        let role_user = Self::put_new_item(
            &self.tables.role_users,
            Self::to_item(&grant.role_user, "UserByRole", Some(now))?,
        )?;

        let role_counter = Update::builder()
            .table_name(&self.tables.roles)
            .key("id", Self::id_key(&grant.role_user.role_id))
            .key("accountId", Self::id_key(&grant.account_user.account_id))
            .update_expression("ADD usersAmount :one")
            .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
            .condition_expression("attribute_exists(id)")
            .build()
            .map_err(|e| RepositoryError::WriteError(e.to_string()))?;

        let invitation = self.invitation_update(
            invitation_id,
            Self::pending_update(patch)?,
            "attribute_exists(id) AND #status = :pending",
        )?;

        debug!(
            invitation_id = %invitation_id,
            account_user_id = %grant.account_user.id,
            role_user_id = %grant.role_user.id,
            "所属付与トランザクション実行"
        );

        self.transact(
            vec![
                TransactWriteItem::builder().put(account_user).build(),
                TransactWriteItem::builder().put(role_user).build(),
                TransactWriteItem::builder().update(role_counter).build(),
                TransactWriteItem::builder().update(invitation).build(),
            ],
            invitation_id,
        )
        .await
    }

    async fn expired_pending_ids(&self, now_epoch: i64) -> Result<Vec<String>, RepositoryError> {
        let mut ids = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let result = self
                .client
                .query()
                .table_name(&self.tables.invitations)
                .index_name(STATUS_EXPIRATION_INDEX)
                .key_condition_expression("#status = :pending AND #expiration <= :now")
                .expression_attribute_names("#status", "status")
                .expression_attribute_names("#expiration", "expiration")
                .expression_attribute_values(
                    ":pending",
                    AttributeValue::S(InvitationStatus::Pending.as_str().to_string()),
                )
                .expression_attribute_values(":now", AttributeValue::N(now_epoch.to_string()))
                .projection_expression("id")
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| RepositoryError::ReadError(e.into_service_error().to_string()))?;

            for item in result.items.unwrap_or_default() {
                if let Some(AttributeValue::S(id)) = item.get("id") {
                    ids.push(id.clone());
                }
            }

            match result.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        Ok(ids)
    }

    async fn mark_deleted_batch(
        &self,
        invitation_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if invitation_ids.is_empty() {
            return Ok(());
        }

        let items = invitation_ids
            .iter()
            .map(|id| {
                self.invitation_update(id, Self::deleted_update(now)?, "attribute_exists(id)")
                    .map(|update| TransactWriteItem::builder().update(update).build())
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.transact(items, &invitation_ids.join(",")).await
    }

    async fn scan_page(
        &self,
        cursor: Option<&str>,
        limit: i32,
    ) -> Result<InvitationPage, RepositoryError> {
        let start_key = cursor.map(|id| HashMap::from([("id".to_string(), Self::id_key(id))]));

        let result = self
            .client
            .scan()
            .table_name(&self.tables.invitations)
            .limit(limit)
            .set_exclusive_start_key(start_key)
            .send()
            .await
            .map_err(|e| RepositoryError::ReadError(e.into_service_error().to_string()))?;

        let invitations = result
            .items
            .unwrap_or_default()
            .into_iter()
            .map(Self::from_item)
            .collect::<Result<Vec<_>, _>>()?;

        let next_cursor = result
            .last_evaluated_key
            .and_then(|key| key.get("id").and_then(|v| v.as_s().ok()).cloned());

        Ok(InvitationPage {
            invitations,
            next_cursor,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::{AccountUser, RoleUser};
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    /// テスト用のインメモリ招待リポジトリ
    ///
    /// DynamoDB実装と同じ条件（存在・PENDING）を検証する。
    #[derive(Clone, Default)]
    pub struct MockInvitationRepository {
        invitations: Arc<Mutex<HashMap<String, Invitation>>>,
        /// ロールID -> usersAmount
        role_counters: Arc<Mutex<HashMap<String, i64>>>,
        account_users: Arc<Mutex<Vec<AccountUser>>>,
        role_users: Arc<Mutex<Vec<RoleUser>>>,
        /// put_newを失敗させるメールアドレス
        failing_emails: Arc<Mutex<HashSet<String>>>,
        /// 次の操作で返すエラー（エラーパスのテスト用）
        next_error: Arc<Mutex<Option<RepositoryError>>>,
        /// mark_deleted_batchの呼び出しごとの件数
        batch_sizes: Arc<Mutex<Vec<usize>>>,
        /// このIDを含むバッチを失敗させる
        failing_batch_ids: Arc<Mutex<HashSet<String>>>,
        /// grant_membershipに渡された時刻
        granted_at: Arc<Mutex<Vec<DateTime<Utc>>>>,
    }

    impl MockInvitationRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_invitation(self, invitation: Invitation) -> Self {
            self.invitations
                .lock()
                .unwrap()
                .insert(invitation.id.clone(), invitation);
            self
        }

        pub fn with_role(self, role_id: &str, users_amount: i64) -> Self {
            self.role_counters
                .lock()
                .unwrap()
                .insert(role_id.to_string(), users_amount);
            self
        }

        pub fn fail_email(&self, email: &str) {
            self.failing_emails.lock().unwrap().insert(email.to_string());
        }

        pub fn set_next_error(&self, error: RepositoryError) {
            *self.next_error.lock().unwrap() = Some(error);
        }

        pub fn fail_batch_containing(&self, invitation_id: &str) {
            self.failing_batch_ids
                .lock()
                .unwrap()
                .insert(invitation_id.to_string());
        }

        pub fn get_sync(&self, invitation_id: &str) -> Option<Invitation> {
            self.invitations.lock().unwrap().get(invitation_id).cloned()
        }

        pub fn all(&self) -> Vec<Invitation> {
            self.invitations.lock().unwrap().values().cloned().collect()
        }

        pub fn users_amount(&self, role_id: &str) -> Option<i64> {
            self.role_counters.lock().unwrap().get(role_id).copied()
        }

        pub fn account_users(&self) -> Vec<AccountUser> {
            self.account_users.lock().unwrap().clone()
        }

        pub fn role_users(&self) -> Vec<RoleUser> {
            self.role_users.lock().unwrap().clone()
        }

        pub fn granted_at(&self) -> Vec<DateTime<Utc>> {
            self.granted_at.lock().unwrap().clone()
        }

        pub fn batch_sizes(&self) -> Vec<usize> {
            self.batch_sizes.lock().unwrap().clone()
        }

        fn take_error(&self) -> Option<RepositoryError> {
            self.next_error.lock().unwrap().take()
        }

        fn apply_patch(invitation: &mut Invitation, patch: &InvitationPatch) {
            if let Some(status) = patch.status {
                invitation.status = status;
            }
            if let Some(guest_id) = &patch.guest_id {
                invitation.guest_id = Some(guest_id.clone());
            }
            if let Some(updated_at) = &patch.updated_at {
                invitation.updated_at = updated_at.clone();
            }
        }
    }

    #[async_trait]
    impl InvitationRepository for MockInvitationRepository {
        async fn get(&self, invitation_id: &str) -> Result<Option<Invitation>, RepositoryError> {
            if let Some(error) = self.take_error() {
                return Err(error);
            }
            Ok(self.get_sync(invitation_id))
        }

        async fn put_new(&self, invitation: &Invitation) -> Result<(), RepositoryError> {
            if let Some(error) = self.take_error() {
                return Err(error);
            }
            if self.failing_emails.lock().unwrap().contains(&invitation.email) {
                return Err(RepositoryError::WriteError(format!(
                    "mock failure for {}",
                    invitation.email
                )));
            }
            let mut invitations = self.invitations.lock().unwrap();
            if invitations.contains_key(&invitation.id) {
                return Err(RepositoryError::ConditionFailed(invitation.id.clone()));
            }
            invitations.insert(invitation.id.clone(), invitation.clone());
            Ok(())
        }

        async fn update_pending(
            &self,
            invitation_id: &str,
            patch: &InvitationPatch,
        ) -> Result<(), RepositoryError> {
            if let Some(error) = self.take_error() {
                return Err(error);
            }
            let mut invitations = self.invitations.lock().unwrap();
            match invitations.get_mut(invitation_id) {
                Some(invitation) if invitation.status == InvitationStatus::Pending => {
                    Self::apply_patch(invitation, patch);
                    Ok(())
                }
                _ => Err(RepositoryError::ConditionFailed(invitation_id.to_string())),
            }
        }

        async fn mark_deleted(
            &self,
            invitation_id: &str,
            now: DateTime<Utc>,
        ) -> Result<(), RepositoryError> {
            if let Some(error) = self.take_error() {
                return Err(error);
            }
            let mut invitations = self.invitations.lock().unwrap();
            match invitations.get_mut(invitation_id) {
                Some(invitation) => {
                    Self::apply_patch(
                        invitation,
                        &InvitationPatch::status(InvitationStatus::Deleted, now),
                    );
                    Ok(())
                }
                None => Err(RepositoryError::ConditionFailed(invitation_id.to_string())),
            }
        }

        async fn resend(
            &self,
            original_id: &str,
            replacement: &Invitation,
            now: DateTime<Utc>,
        ) -> Result<(), RepositoryError> {
            if let Some(error) = self.take_error() {
                return Err(error);
            }
            let mut invitations = self.invitations.lock().unwrap();
            let original_pending = invitations
                .get(original_id)
                .is_some_and(|i| i.status == InvitationStatus::Pending);
            if !original_pending || invitations.contains_key(&replacement.id) {
                return Err(RepositoryError::ConditionFailed(original_id.to_string()));
            }
            if let Some(original) = invitations.get_mut(original_id) {
                Self::apply_patch(
                    original,
                    &InvitationPatch::status(InvitationStatus::Deleted, now),
                );
            }
            invitations.insert(replacement.id.clone(), replacement.clone());
            Ok(())
        }

        async fn grant_membership(
            &self,
            invitation_id: &str,
            patch: &InvitationPatch,
            grant: &MembershipGrant,
            now: DateTime<Utc>,
        ) -> Result<(), RepositoryError> {
            if let Some(error) = self.take_error() {
                return Err(error);
            }
            let mut invitations = self.invitations.lock().unwrap();
            let mut counters = self.role_counters.lock().unwrap();

            // 全条件を先に検証し、満たさなければ何も書き込まない
            let pending = invitations
                .get(invitation_id)
                .is_some_and(|i| i.status == InvitationStatus::Pending);
            let role_exists = counters.contains_key(&grant.role_user.role_id);
            if !pending || !role_exists {
                return Err(RepositoryError::ConditionFailed(invitation_id.to_string()));
            }

            if let Some(invitation) = invitations.get_mut(invitation_id) {
                Self::apply_patch(invitation, patch);
            }
            if let Some(counter) = counters.get_mut(&grant.role_user.role_id) {
                *counter += 1;
            }
            self.account_users
                .lock()
                .unwrap()
                .push(grant.account_user.clone());
            self.role_users.lock().unwrap().push(grant.role_user.clone());
            self.granted_at.lock().unwrap().push(now);
            Ok(())
        }

        async fn expired_pending_ids(
            &self,
            now_epoch: i64,
        ) -> Result<Vec<String>, RepositoryError> {
            if let Some(error) = self.take_error() {
                return Err(error);
            }
            let mut ids: Vec<String> = self
                .invitations
                .lock()
                .unwrap()
                .values()
                .filter(|i| i.status == InvitationStatus::Pending && i.is_expired(now_epoch))
                .map(|i| i.id.clone())
                .collect();
            ids.sort();
            Ok(ids)
        }

        async fn mark_deleted_batch(
            &self,
            invitation_ids: &[String],
            now: DateTime<Utc>,
        ) -> Result<(), RepositoryError> {
            self.batch_sizes.lock().unwrap().push(invitation_ids.len());
            if let Some(error) = self.take_error() {
                return Err(error);
            }
            let failing = self.failing_batch_ids.lock().unwrap();
            if let Some(id) = invitation_ids.iter().find(|id| failing.contains(*id)) {
                return Err(RepositoryError::WriteError(format!("mock failure for {id}")));
            }
            drop(failing);
            if invitation_ids.len() > MAX_TRANSACTION_ITEMS {
                return Err(RepositoryError::WriteError("too many items".to_string()));
            }
            let mut invitations = self.invitations.lock().unwrap();
            if let Some(missing) = invitation_ids.iter().find(|id| !invitations.contains_key(*id)) {
                return Err(RepositoryError::ConditionFailed(missing.clone()));
            }
            let patch = InvitationPatch::status(InvitationStatus::Deleted, now);
            for id in invitation_ids {
                if let Some(invitation) = invitations.get_mut(id) {
                    Self::apply_patch(invitation, &patch);
                }
            }
            Ok(())
        }

        async fn scan_page(
            &self,
            cursor: Option<&str>,
            limit: i32,
        ) -> Result<InvitationPage, RepositoryError> {
            if let Some(error) = self.take_error() {
                return Err(error);
            }
            let mut all = self.all();
            all.sort_by(|a, b| a.id.cmp(&b.id));

            let remaining: Vec<Invitation> = all
                .into_iter()
                .filter(|i| cursor.is_none_or(|c| i.id.as_str() > c))
                .collect();
            let limit = limit.max(1) as usize;
            let has_more = remaining.len() > limit;
            let invitations: Vec<Invitation> = remaining.into_iter().take(limit).collect();
            let next_cursor = if has_more {
                invitations.last().map(|i| i.id.clone())
            } else {
                None
            };

            Ok(InvitationPage {
                invitations,
                next_cursor,
            })
        }
    }

    fn invitation(id: &str) -> Invitation {
        Invitation {
            id: id.to_string(),
            role_id: "role-1".to_string(),
            account_id: "acc-1".to_string(),
            owner_id: "owner-1".to_string(),
            email: "guest@example.com".to_string(),
            guest_id: None,
            status: InvitationStatus::Pending,
            expiration: 1_714_568_400,
            created_at: "2024-05-01T12:00:00.000Z".to_string(),
            updated_at: "2024-05-01T12:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn test_repository_error_display() {
        assert_eq!(
            RepositoryError::ConditionFailed("inv-1".to_string()).to_string(),
            "Condition check failed: inv-1"
        );
        assert_eq!(
            RepositoryError::ReadError("timeout".to_string()).to_string(),
            "Read error: timeout"
        );
    }

    #[test]
    fn test_to_item_adds_typename_and_numeric_expiration() {
        let item =
            DynamoInvitationRepository::to_item(&invitation("inv-1"), INVITATION_TYPENAME, None)
                .unwrap();

        assert_eq!(
            item.get("__typename"),
            Some(&AttributeValue::S("Invitation".to_string()))
        );
        assert_eq!(
            item.get("expiration"),
            Some(&AttributeValue::N("1714568400".to_string()))
        );
        assert_eq!(
            item.get("status"),
            Some(&AttributeValue::S("PENDING".to_string()))
        );
        assert!(!item.contains_key("guestId"));
    }

    #[test]
    fn test_to_item_fills_timestamps_for_rows() {
        let row = RoleUser {
            id: "ru-1".to_string(),
            role_id: "role-1".to_string(),
            user_id: "user-1".to_string(),
        };
        let now = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let item = DynamoInvitationRepository::to_item(&row, "UserByRole", Some(now)).unwrap();

        assert_eq!(
            item.get("createdAt"),
            Some(&AttributeValue::S("2024-05-01T12:00:00.000Z".to_string()))
        );
        assert_eq!(item.get("roleId"), Some(&AttributeValue::S("role-1".to_string())));
    }

    #[test]
    fn test_condition_failure_detected_from_cancellation_reasons() {
        let reason = |code: Option<&str>| {
            CancellationReason::builder()
                .set_code(code.map(str::to_string))
                .build()
        };

        assert!(has_condition_failure(&[
            reason(Some("None")),
            reason(Some("ConditionalCheckFailed")),
        ]));
        assert!(!has_condition_failure(&[
            reason(Some("None")),
            reason(Some("TransactionConflict")),
        ]));
        assert!(!has_condition_failure(&[reason(None)]));
        assert!(!has_condition_failure(&[]));
    }

    #[test]
    fn test_item_round_trip_keeps_invitation() {
        let mut original = invitation("inv-1");
        original.guest_id = Some("guest-1".to_string());

        let item =
            DynamoInvitationRepository::to_item(&original, INVITATION_TYPENAME, None).unwrap();
        let restored = DynamoInvitationRepository::from_item(item).unwrap();

        assert_eq!(restored, original);
    }

    #[test]
    fn test_pending_update_adds_guard_placeholders() {
        let patch = InvitationPatch {
            status: Some(InvitationStatus::Rejected),
            ..Default::default()
        };
        let update = DynamoInvitationRepository::pending_update(&patch).unwrap();

        assert_eq!(update.expression(), "SET #status = :status");
        assert!(update.values().contains_key(":pending"));
    }

    #[test]
    fn test_pending_update_rejects_empty_patch() {
        let result = DynamoInvitationRepository::pending_update(&InvitationPatch::default());
        assert!(matches!(result, Err(RepositoryError::WriteError(_))));
    }

    #[tokio::test]
    async fn test_mock_update_pending_guard() {
        let mut approved = invitation("inv-2");
        approved.status = InvitationStatus::Approved;
        let repo = MockInvitationRepository::new()
            .with_invitation(invitation("inv-1"))
            .with_invitation(approved);
        let patch = InvitationPatch::status(InvitationStatus::Rejected, Utc::now());

        assert!(repo.update_pending("inv-1", &patch).await.is_ok());
        assert_eq!(
            repo.update_pending("inv-2", &patch).await,
            Err(RepositoryError::ConditionFailed("inv-2".to_string()))
        );
        assert_eq!(
            repo.update_pending("missing", &patch).await,
            Err(RepositoryError::ConditionFailed("missing".to_string()))
        );
    }

    #[tokio::test]
    async fn test_mock_scan_page_pagination() {
        let repo = MockInvitationRepository::new()
            .with_invitation(invitation("a"))
            .with_invitation(invitation("b"))
            .with_invitation(invitation("c"));

        let first = repo.scan_page(None, 2).await.unwrap();
        assert_eq!(first.invitations.len(), 2);
        assert_eq!(first.next_cursor.as_deref(), Some("b"));

        let second = repo.scan_page(Some("b"), 2).await.unwrap();
        assert_eq!(second.invitations.len(), 1);
        assert_eq!(second.next_cursor, None);
    }

    #[tokio::test]
    #[ignore = "requires AWS credentials and a deployed invitation table"]
    async fn test_dynamo_get_missing_invitation() {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let tables = TableNames::from_env().unwrap();
        let repo = DynamoInvitationRepository::new(DynamoDbClient::new(&config), tables);

        let result = repo.get("does-not-exist").await.unwrap();
        assert!(result.is_none());
    }
}
