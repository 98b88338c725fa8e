// 検索インデックス同期
//
// 招待テーブルおよびロール-ユーザー関連テーブルの変更ストリームを受け取り、
// 検索インデックスのプロジェクションをupsertする。
// objectIDは元レコードのIDのため、同じレコードの再配信は同じ結果になる。

use aws_lambda_events::event::dynamodb::{Event, EventRecord};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::stream_record::{RecordOutcome, StreamProcessResult, decode_new_image};
use crate::domain::{Invitation, InvitationProjection, RoleUser, UserRoleProjection};
use crate::infrastructure::{DirectoryRepository, RepositoryError, SearchIndex, SearchIndexError};

#[derive(Debug, Error)]
pub enum ProjectionSyncError {
    /// NewImageのデシリアライズに失敗
    #[error("NewImageのデシリアライズに失敗: {0}")]
    DeserializationError(String),

    /// 関連行のユーザーが存在しない
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("リポジトリエラー: {0}")]
    Repository(#[from] RepositoryError),

    #[error("検索インデックスエラー: {0}")]
    SearchIndex(#[from] SearchIndexError),
}

/// INSERT/MODIFY以外のイベントのスキップ理由
fn skip_reason(event_name: &str) -> Option<RecordOutcome> {
    match event_name {
        "INSERT" | "MODIFY" => None,
        "REMOVE" => Some(RecordOutcome::Skipped("REMOVEは同期対象外".to_string())),
        other => {
            warn!(event_name = other, "未知のイベントタイプ");
            Some(RecordOutcome::Skipped(format!("未知のイベントタイプ: {other}")))
        }
    }
}

/// 結果を集計する
fn tally(result: &mut StreamProcessResult, outcome: Result<RecordOutcome, ProjectionSyncError>) {
    match outcome {
        Ok(RecordOutcome::Processed) => result.success_count += 1,
        Ok(RecordOutcome::Skipped(reason)) => {
            debug!(reason = %reason, "レコードをスキップ");
            result.skip_count += 1;
        }
        Err(e) => {
            error!(error = %e, "レコード処理に失敗");
            result.failure_count += 1;
        }
    }
}

/// 招待プロジェクションの同期
pub struct InvitationProjectionSync<SI: SearchIndex> {
    index: SI,
    index_name: String,
}

impl<SI: SearchIndex> InvitationProjectionSync<SI> {
    pub fn new(index: SI, index_name: impl Into<String>) -> Self {
        Self {
            index,
            index_name: index_name.into(),
        }
    }

    pub async fn process_event(&self, event: Event) -> StreamProcessResult {
        info!(record_count = event.records.len(), "招待同期開始");

        let mut result = StreamProcessResult::new();
        for record in &event.records {
            let outcome = self.process_record(record).await;
            tally(&mut result, outcome);
        }

        info!(
            success_count = result.success_count,
            failure_count = result.failure_count,
            skip_count = result.skip_count,
            "招待同期完了"
        );
        result
    }

    async fn process_record(
        &self,
        record: &EventRecord,
    ) -> Result<RecordOutcome, ProjectionSyncError> {
        if let Some(skipped) = skip_reason(&record.event_name) {
            return Ok(skipped);
        }

        let Some(invitation) = decode_new_image::<Invitation>(record)
            .map_err(|e| ProjectionSyncError::DeserializationError(e.to_string()))?
        else {
            return Ok(RecordOutcome::Skipped("NewImageがありません".to_string()));
        };

        self.upsert(&invitation).await?;
        Ok(RecordOutcome::Processed)
    }

    /// 招待1件のプロジェクションをupsert
    pub async fn upsert(&self, invitation: &Invitation) -> Result<(), ProjectionSyncError> {
        let projection = InvitationProjection::from_invitation(invitation);
        let document = serde_json::to_value(&projection)
            .map_err(|e| ProjectionSyncError::DeserializationError(e.to_string()))?;

        self.index
            .partial_update(&self.index_name, projection.document_id(), &document)
            .await?;

        debug!(
            invitation_id = %invitation.id,
            status = %invitation.status,
            "招待プロジェクションをupsert"
        );
        Ok(())
    }
}

/// ロール-ユーザープロジェクションの同期
///
/// ユーザーの表示情報は処理時点のユーザーテーブルから取得する。
pub struct UserRoleProjectionSync<SI: SearchIndex, DR: DirectoryRepository> {
    index: SI,
    directory: DR,
    index_name: String,
}

impl<SI: SearchIndex, DR: DirectoryRepository> UserRoleProjectionSync<SI, DR> {
    pub fn new(index: SI, directory: DR, index_name: impl Into<String>) -> Self {
        Self {
            index,
            directory,
            index_name: index_name.into(),
        }
    }

    pub async fn process_event(&self, event: Event) -> StreamProcessResult {
        info!(record_count = event.records.len(), "ロール所属ユーザー同期開始");

        let mut result = StreamProcessResult::new();
        for record in &event.records {
            let outcome = self.process_record(record).await;
            tally(&mut result, outcome);
        }

        info!(
            success_count = result.success_count,
            failure_count = result.failure_count,
            skip_count = result.skip_count,
            "ロール所属ユーザー同期完了"
        );
        result
    }

    async fn process_record(
        &self,
        record: &EventRecord,
    ) -> Result<RecordOutcome, ProjectionSyncError> {
        if let Some(skipped) = skip_reason(&record.event_name) {
            return Ok(skipped);
        }

        let Some(row) = decode_new_image::<RoleUser>(record)
            .map_err(|e| ProjectionSyncError::DeserializationError(e.to_string()))?
        else {
            return Ok(RecordOutcome::Skipped("NewImageがありません".to_string()));
        };

        let user = self
            .directory
            .get_user(&row.user_id)
            .await?
            .ok_or_else(|| ProjectionSyncError::UserNotFound(row.user_id.clone()))?;

        let projection = UserRoleProjection::from_row(&row, &user);
        let document = serde_json::to_value(&projection)
            .map_err(|e| ProjectionSyncError::DeserializationError(e.to_string()))?;

        self.index
            .partial_update(&self.index_name, projection.document_id(), &document)
            .await?;

        debug!(
            role_user_id = %row.id,
            role_id = %row.role_id,
            user_id = %row.user_id,
            "ロール所属ユーザープロジェクションをupsert"
        );
        Ok(RecordOutcome::Processed)
    }
}
