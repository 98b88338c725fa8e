/// 招待の通知ディスパッチ
///
/// 招待テーブルの変更ストリームから通知アクションを決定し、
/// 招待メール（SES）とアプリ内通知（SNS）を送る。
/// 参照先（アカウント・ロール・招待者・招待先）が存在しない場合は
/// スキップせずにそのレコードを失敗として報告する。
use aws_lambda_events::event::dynamodb::{Event, EventRecord};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::stream_record::{
    RecordOutcome, StreamProcessResult, decode_new_image, decode_old_image,
};
use crate::domain::{
    Account, ChangeKind, InAppNotification, Invitation, InvitationEmail, NotificationAction, Role,
    UserProfile,
};
use crate::infrastructure::{
    DirectoryRepository, EmailSendError, EmailSender, NotificationPublisher, RepositoryError,
    SnsOpsError,
};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("NewImageのデシリアライズに失敗: {0}")]
    DeserializationError(String),

    /// 参照先レコードが存在しない
    #[error("{entity} not found: {id}")]
    MissingRecord { entity: &'static str, id: String },

    #[error("リポジトリエラー: {0}")]
    Repository(#[from] RepositoryError),

    #[error("メール送信エラー: {0}")]
    Email(#[from] EmailSendError),

    #[error("通知発行エラー: {0}")]
    Publish(#[from] SnsOpsError),
}

fn missing(entity: &'static str, id: &str) -> NotifyError {
    NotifyError::MissingRecord {
        entity,
        id: id.to_string(),
    }
}

pub struct InvitationNotifier<DR, ES, NP>
where
    DR: DirectoryRepository,
    ES: EmailSender,
    NP: NotificationPublisher,
{
    directory: DR,
    email_sender: ES,
    publisher: NP,
    /// 招待メールのリンクのベースURL
    invitation_url: String,
}

impl<DR, ES, NP> InvitationNotifier<DR, ES, NP>
where
    DR: DirectoryRepository,
    ES: EmailSender,
    NP: NotificationPublisher,
{
    pub fn new(
        directory: DR,
        email_sender: ES,
        publisher: NP,
        invitation_url: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            email_sender,
            publisher,
            invitation_url: invitation_url.into(),
        }
    }

    pub async fn process_event(&self, event: Event) -> StreamProcessResult {
        info!(record_count = event.records.len(), "招待通知処理開始");

        let mut result = StreamProcessResult::new();
        for record in &event.records {
            match self.process_record(record).await {
                Ok(RecordOutcome::Processed) => result.success_count += 1,
                Ok(RecordOutcome::Skipped(reason)) => {
                    debug!(reason = %reason, "通知対象外");
                    result.skip_count += 1;
                }
                Err(e) => {
                    error!(event_id = %record.event_id, error = %e, "招待通知に失敗");
                    result.failure_count += 1;
                }
            }
        }

        info!(
            success_count = result.success_count,
            failure_count = result.failure_count,
            skip_count = result.skip_count,
            "招待通知処理完了"
        );
        result
    }

    async fn process_record(&self, record: &EventRecord) -> Result<RecordOutcome, NotifyError> {
        let Some(kind) = ChangeKind::from_event_name(&record.event_name) else {
            return Ok(RecordOutcome::Skipped(format!(
                "イベントタイプ対象外: {}",
                record.event_name
            )));
        };

        let Some(invitation) = decode_new_image::<Invitation>(record)
            .map_err(|e| NotifyError::DeserializationError(e.to_string()))?
        else {
            return Ok(RecordOutcome::Skipped("NewImageがありません".to_string()));
        };

        // OldImageは比較にのみ使う（読めなければ比較しない）
        let old_status = match decode_old_image::<Invitation>(record) {
            Ok(old) => old.map(|i| i.status),
            Err(e) => {
                warn!(invitation_id = %invitation.id, error = %e, "OldImageを読み取れません");
                None
            }
        };

        let Some(action) = NotificationAction::for_change(kind, old_status, invitation.status)
        else {
            return Ok(RecordOutcome::Skipped(format!(
                "通知不要なステータス: {}",
                invitation.status
            )));
        };

        self.dispatch(action, &invitation).await?;
        Ok(RecordOutcome::Processed)
    }

    /// 通知アクションを実行
    pub async fn dispatch(
        &self,
        action: NotificationAction,
        invitation: &Invitation,
    ) -> Result<(), NotifyError> {
        let (account, role) = self.account_and_role(invitation).await?;

        match action {
            NotificationAction::Request => {
                // 参照先を全て解決してから送信する（再配信でメールが重複しないように）
                let owner = self.user("Owner", &invitation.owner_id).await?;
                if let Some(guest_id) = invitation.guest_id.as_deref() {
                    self.user("Guest user", guest_id).await?;
                }

                let email = InvitationEmail::new(
                    &invitation.email,
                    &invitation.id,
                    &self.invitation_url,
                    &account,
                    &role,
                    &owner,
                );
                self.email_sender.send(&email).await?;

                if let Some(guest_id) = invitation.guest_id.as_deref() {
                    let notification =
                        InAppNotification::invitation_request(guest_id, &account, &role, &owner);
                    self.publisher.publish(&notification).await?;
                }
            }
            NotificationAction::Approved | NotificationAction::Rejected => {
                let guest_id = invitation
                    .guest_id
                    .as_deref()
                    .ok_or_else(|| missing("Guest user", &invitation.id))?;
                let guest = self.user("Guest user", guest_id).await?;
                let notification = InAppNotification::invitation_answered(
                    action,
                    &invitation.owner_id,
                    &account,
                    &role,
                    &guest,
                );
                self.publisher.publish(&notification).await?;
            }
        }

        info!(
            invitation_id = %invitation.id,
            action = ?action,
            "招待通知送信"
        );
        Ok(())
    }

    async fn account_and_role(&self, invitation: &Invitation) -> Result<(Account, Role), NotifyError> {
        let account = self
            .directory
            .get_account(&invitation.account_id)
            .await?
            .ok_or_else(|| missing("Account", &invitation.account_id))?;
        let role = self
            .directory
            .get_role(&invitation.role_id, &invitation.account_id)
            .await?
            .ok_or_else(|| missing("Role", &invitation.role_id))?;
        Ok((account, role))
    }

    async fn user(&self, entity: &'static str, user_id: &str) -> Result<UserProfile, NotifyError> {
        self.directory
            .get_user(user_id)
            .await?
            .ok_or_else(|| missing(entity, user_id))
    }
}
