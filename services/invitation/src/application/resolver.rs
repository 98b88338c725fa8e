/// AppSyncリゾルバーイベントのディスパッチ
///
/// `info.parentTypeName` / `info.fieldName` の組を閉じた列挙型に変換する。
/// 未対応の組は全て "Resolver not found" になる。
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use super::invitation_workflow::{
    CreateInvitationInput, ErrorKind, InvitationError, InvitationIdInput, InvitationWorkflow,
    UpdateInvitationInput,
};
use super::role_search::{
    InvitationsByRoleInput, Page, RoleSearch, RoleSearchError, UsersByRoleInput,
};
use crate::domain::CallerIdentity;
use crate::infrastructure::{DirectoryRepository, IdentityDirectory, InvitationRepository, SearchIndex};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolverError {
    /// 未対応のparentTypeName / fieldName
    #[error("Resolver not found")]
    NotFound {
        parent_type_name: String,
        field_name: String,
    },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// 呼び出し元のID情報がない（未認証）
    #[error("Caller identity is required")]
    MissingIdentity,
}

/// リゾルバーの対象フィールド
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverInfo {
    pub parent_type_name: String,
    pub field_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResolverArguments {
    #[serde(default)]
    pub input: Value,
}

/// AppSync Lambdaリゾルバーのイベント
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResolverEvent {
    #[serde(default)]
    pub identity: Option<CallerIdentity>,
    #[serde(default)]
    pub arguments: ResolverArguments,
    pub info: ResolverInfo,
}

impl ResolverEvent {
    fn input<T: DeserializeOwned>(&self) -> Result<T, ResolverError> {
        serde_json::from_value(self.arguments.input.clone())
            .map_err(|e| ResolverError::InvalidArguments(e.to_string()))
    }

    fn not_found(&self) -> ResolverError {
        warn!(
            parent_type_name = %self.info.parent_type_name,
            field_name = %self.info.field_name,
            "未対応のリゾルバー"
        );
        ResolverError::NotFound {
            parent_type_name: self.info.parent_type_name.clone(),
            field_name: self.info.field_name.clone(),
        }
    }
}

/// 招待ミューテーション
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvitationCommand {
    Create(CreateInvitationInput),
    Update(UpdateInvitationInput),
    Resend(InvitationIdInput),
    Delete(InvitationIdInput),
}

impl InvitationCommand {
    pub fn from_event(event: &ResolverEvent) -> Result<Self, ResolverError> {
        match (
            event.info.parent_type_name.as_str(),
            event.info.field_name.as_str(),
        ) {
            ("Mutation", "createInvitation") => Ok(Self::Create(event.input()?)),
            ("Mutation", "updateInvitation") => Ok(Self::Update(event.input()?)),
            ("Mutation", "resendInvitation") => Ok(Self::Resend(event.input()?)),
            ("Mutation", "deleteInvitation") => Ok(Self::Delete(event.input()?)),
            _ => Err(event.not_found()),
        }
    }

    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Create(_) => "createInvitation",
            Self::Update(_) => "updateInvitation",
            Self::Resend(_) => "resendInvitation",
            Self::Delete(_) => "deleteInvitation",
        }
    }
}

/// ロール単位の検索クエリ
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleSearchQuery {
    UsersByRole(UsersByRoleInput),
    InvitationsByRole(InvitationsByRoleInput),
}

impl RoleSearchQuery {
    pub fn from_event(event: &ResolverEvent) -> Result<Self, ResolverError> {
        match (
            event.info.parent_type_name.as_str(),
            event.info.field_name.as_str(),
        ) {
            ("Query", "usersByRole") => Ok(Self::UsersByRole(event.input()?)),
            ("Query", "invitationsByRole") => Ok(Self::InvitationsByRole(event.input()?)),
            _ => Err(event.not_found()),
        }
    }
}

/// ミューテーション処理のエラー
///
/// 表示文字列は内側のエラーのメッセージそのもの。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MutationError {
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Invitation(#[from] InvitationError),
}

impl MutationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MutationError::Resolver(ResolverError::MissingIdentity) => ErrorKind::Unauthorized,
            MutationError::Resolver(_) => ErrorKind::InvalidState,
            MutationError::Invitation(e) => e.kind(),
        }
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Search(#[from] RoleSearchError),
}

/// 招待ミューテーションを実行（成功時はtrue）
pub async fn resolve_invitation<IR, DR, ID>(
    workflow: &InvitationWorkflow<IR, DR, ID>,
    event: &ResolverEvent,
    now: DateTime<Utc>,
) -> Result<bool, MutationError>
where
    IR: InvitationRepository,
    DR: DirectoryRepository,
    ID: IdentityDirectory,
{
    let command = InvitationCommand::from_event(event)?;
    info!(field_name = command.field_name(), "招待ミューテーション受信");

    execute(workflow, event, &command, now)
        .await
        .inspect_err(|e| {
            warn!(
                field_name = command.field_name(),
                error_kind = ?e.kind(),
                error = %e,
                "招待ミューテーション失敗"
            )
        })?;
    Ok(true)
}

async fn execute<IR, DR, ID>(
    workflow: &InvitationWorkflow<IR, DR, ID>,
    event: &ResolverEvent,
    command: &InvitationCommand,
    now: DateTime<Utc>,
) -> Result<(), MutationError>
where
    IR: InvitationRepository,
    DR: DirectoryRepository,
    ID: IdentityDirectory,
{
    match command {
        InvitationCommand::Create(input) => {
            let caller = event
                .identity
                .as_ref()
                .ok_or(ResolverError::MissingIdentity)?;
            workflow.create(caller, input, now).await?;
        }
        InvitationCommand::Update(input) => {
            workflow.update(input, now).await?;
        }
        InvitationCommand::Resend(input) => {
            workflow.resend(input, now).await?;
        }
        InvitationCommand::Delete(input) => {
            workflow.delete(input, now).await?;
        }
    }
    Ok(())
}

/// ロール単位の検索クエリを実行
pub async fn resolve_role_search<SI: SearchIndex>(
    search: &RoleSearch<SI>,
    event: &ResolverEvent,
) -> Result<Page, QueryError> {
    let page = match RoleSearchQuery::from_event(event)? {
        RoleSearchQuery::UsersByRole(input) => search.users_by_role(&input).await?,
        RoleSearchQuery::InvitationsByRole(input) => search.invitations_by_role(&input).await?,
    };
    Ok(page)
}
