/// 招待ワークフロー
///
/// 招待の作成・承認/拒否・再送・削除を行う。
/// 前提条件の検証は全て書き込み前に行い、違反時は何も書き込まない。
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::domain::{
    CallerIdentity, Decision, Invitation, InvitationPatch, MAX_EXPIRATION_MINUTES, MembershipGrant,
    TransitionError,
};
use crate::infrastructure::{
    DirectoryRepository, IdentityDirectory, IdentityDirectoryError, InvitationRepository,
    RepositoryError, add_account_membership,
};

/// 見つからなかったエンティティ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Invitation,
    Account,
    Role,
    User,
    GuestUser,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Invitation => "Invitation",
            Entity::Account => "Account",
            Entity::Role => "Role",
            Entity::User => "User",
            Entity::GuestUser => "Guest user",
        })
    }
}

/// エラー分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    Unauthorized,
    Internal,
}

/// ワークフローのエラー型
///
/// 表示文字列はそのまま呼び出し元へ返すメッセージになる。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvitationError {
    #[error("{0} not found")]
    NotFound(Entity),

    /// PENDING以外の招待への操作
    #[error("Invitation not valid")]
    NotPending,

    #[error("Invitation is expired")]
    Expired,

    #[error("User is already in Account")]
    AlreadyMember,

    /// 呼び出し元のスコープ外のアカウント
    #[error("Account not found")]
    Unauthorized,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 一部のメールアドレスで作成に失敗（成功分は残る）
    #[error("Failed to create {failed} of {total} invitations")]
    PartialCreate { failed: usize, total: usize },

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Identity provider error: {0}")]
    Identity(String),
}

impl InvitationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InvitationError::NotFound(_) => ErrorKind::NotFound,
            InvitationError::NotPending
            | InvitationError::Expired
            | InvitationError::AlreadyMember
            | InvitationError::InvalidInput(_) => ErrorKind::InvalidState,
            InvitationError::Unauthorized => ErrorKind::Unauthorized,
            InvitationError::PartialCreate { .. }
            | InvitationError::Repository(_)
            | InvitationError::Identity(_) => ErrorKind::Internal,
        }
    }
}

impl From<RepositoryError> for InvitationError {
    fn from(err: RepositoryError) -> Self {
        InvitationError::Repository(err.to_string())
    }
}

impl From<TransitionError> for InvitationError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::NotPending(_) => InvitationError::NotPending,
            TransitionError::Expired { .. } => InvitationError::Expired,
        }
    }
}

impl From<IdentityDirectoryError> for InvitationError {
    fn from(err: IdentityDirectoryError) -> Self {
        match err {
            IdentityDirectoryError::AlreadyMember(_) => InvitationError::AlreadyMember,
            IdentityDirectoryError::UserNotFound(_) => InvitationError::NotFound(Entity::GuestUser),
            other => InvitationError::Identity(other.to_string()),
        }
    }
}

/// 条件付き書き込みの条件違反を、招待の状態エラーとして扱う
fn pending_guard(err: RepositoryError) -> InvitationError {
    match err {
        RepositoryError::ConditionFailed(_) => InvitationError::NotPending,
        other => other.into(),
    }
}

/// createInvitationの入力
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvitationInput {
    pub account_id: String,
    pub role_id: String,
    pub emails: Vec<String>,
    /// 有効期間（分）
    pub expiration: i64,
}

/// updateInvitationの入力
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInvitationInput {
    pub id: String,
    pub status: crate::domain::InvitationStatus,
    #[serde(default)]
    pub guest_id: Option<String>,
}

/// resendInvitation / deleteInvitationの入力
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InvitationIdInput {
    pub id: String,
}

/// 招待ワークフロー
pub struct InvitationWorkflow<IR, DR, ID>
where
    IR: InvitationRepository,
    DR: DirectoryRepository,
    ID: IdentityDirectory,
{
    invitations: IR,
    directory: DR,
    identity: ID,
}

impl<IR, DR, ID> InvitationWorkflow<IR, DR, ID>
where
    IR: InvitationRepository,
    DR: DirectoryRepository,
    ID: IdentityDirectory,
{
    pub fn new(invitations: IR, directory: DR, identity: ID) -> Self {
        Self {
            invitations,
            directory,
            identity,
        }
    }

    /// メールアドレスごとにPENDING招待を作成
    ///
    /// 各メールは独立かつ並行に処理される。一部が失敗しても成功分は残り、
    /// 失敗件数を`PartialCreate`で報告する。
    pub async fn create(
        &self,
        caller: &CallerIdentity,
        input: &CreateInvitationInput,
        now: DateTime<Utc>,
    ) -> Result<Vec<Invitation>, InvitationError> {
        self.create_inner(caller, input, now)
            .await
            .inspect_err(|e| {
                error!(
                    account_id = %input.account_id,
                    role_id = %input.role_id,
                    error = %e,
                    "招待作成失敗"
                )
            })
    }

    async fn create_inner(
        &self,
        caller: &CallerIdentity,
        input: &CreateInvitationInput,
        now: DateTime<Utc>,
    ) -> Result<Vec<Invitation>, InvitationError> {
        let emails: Vec<&str> = input
            .emails
            .iter()
            .map(|e| e.trim())
            .filter(|e| !e.is_empty())
            .collect();
        if emails.is_empty() {
            return Err(InvitationError::InvalidInput(
                "emails must not be empty".to_string(),
            ));
        }
        if !(1..=MAX_EXPIRATION_MINUTES).contains(&input.expiration) {
            return Err(InvitationError::InvalidInput(format!(
                "expiration must be between 1 and {MAX_EXPIRATION_MINUTES} minutes"
            )));
        }

        if !caller.can_access_account(&input.account_id) {
            warn!(
                username = %caller.username,
                account_id = %input.account_id,
                "呼び出し元のスコープ外のアカウント"
            );
            return Err(InvitationError::Unauthorized);
        }

        self.directory
            .get_account(&input.account_id)
            .await?
            .ok_or(InvitationError::NotFound(Entity::Account))?;
        self.directory
            .get_role(&input.role_id, &input.account_id)
            .await?
            .ok_or(InvitationError::NotFound(Entity::Role))?;
        self.directory
            .get_user(&caller.username)
            .await?
            .ok_or(InvitationError::NotFound(Entity::User))?;

        let results = join_all(
            emails
                .iter()
                .map(|email| self.create_one(caller, input, email, now)),
        )
        .await;

        let total = results.len();
        let mut created = Vec::with_capacity(total);
        for (email, result) in emails.iter().zip(results) {
            match result {
                Ok(invitation) => created.push(invitation),
                Err(e) => error!(email = %email, error = %e, "招待の保存に失敗"),
            }
        }

        let failed = total - created.len();
        if failed > 0 {
            return Err(InvitationError::PartialCreate { failed, total });
        }

        info!(
            account_id = %input.account_id,
            role_id = %input.role_id,
            count = total,
            "招待作成完了"
        );
        Ok(created)
    }

    async fn create_one(
        &self,
        caller: &CallerIdentity,
        input: &CreateInvitationInput,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Invitation, InvitationError> {
        // 招待先ユーザーの解決はベストエフォート
        let guest_id = match self.directory.find_user_id_by_email(email).await {
            Ok(found) => found,
            Err(e) => {
                warn!(email = %email, error = %e, "招待先ユーザーの検索に失敗");
                None
            }
        };

        let invitation = Invitation::new_pending(
            &input.role_id,
            &input.account_id,
            &caller.username,
            email,
            guest_id,
            input.expiration,
            now,
        );
        self.invitations.put_new(&invitation).await?;
        Ok(invitation)
    }

    /// 承認または拒否
    pub async fn update(
        &self,
        input: &UpdateInvitationInput,
        now: DateTime<Utc>,
    ) -> Result<Invitation, InvitationError> {
        self.update_inner(input, now).await.inspect_err(|e| {
            error!(invitation_id = %input.id, status = %input.status, error = %e, "招待更新失敗")
        })
    }

    async fn update_inner(
        &self,
        input: &UpdateInvitationInput,
        now: DateTime<Utc>,
    ) -> Result<Invitation, InvitationError> {
        let decision = Decision::try_from(input.status).map_err(|status| {
            InvitationError::InvalidInput(format!(
                "status must be APPROVED or REJECTED (got {})",
                status
            ))
        })?;

        let invitation = self
            .invitations
            .get(&input.id)
            .await?
            .ok_or(InvitationError::NotFound(Entity::Invitation))?;
        invitation.ensure_transitionable(now.timestamp())?;

        let guest_id = invitation
            .resolve_guest(input.guest_id.as_deref())
            .ok_or(InvitationError::NotFound(Entity::GuestUser))?
            .to_string();
        if input.guest_id.is_some() {
            self.directory
                .get_user(&guest_id)
                .await?
                .ok_or(InvitationError::NotFound(Entity::GuestUser))?;
        }

        let patch = InvitationPatch::status(decision.status(), now).with_guest(guest_id.clone());

        match decision {
            Decision::Approve => {
                self.directory
                    .get_role(&invitation.role_id, &invitation.account_id)
                    .await?
                    .ok_or(InvitationError::NotFound(Entity::Role))?;

                add_account_membership(&self.identity, &guest_id, &invitation.account_id)
                    .await?;

                let grant =
                    MembershipGrant::new(&invitation.account_id, &invitation.role_id, &guest_id);
                self.invitations
                    .grant_membership(&invitation.id, &patch, &grant, now)
                    .await
                    .map_err(|e| {
                        // 所属属性は追加済みのまま残る
                        error!(
                            invitation_id = %invitation.id,
                            guest_id = %guest_id,
                            account_id = %invitation.account_id,
                            "所属属性の追加後に付与トランザクションが失敗"
                        );
                        pending_guard(e)
                    })?;
            }
            Decision::Reject => {
                self.invitations
                    .update_pending(&invitation.id, &patch)
                    .await
                    .map_err(pending_guard)?;
            }
        }

        info!(
            invitation_id = %invitation.id,
            status = %decision.status(),
            guest_id = %guest_id,
            "招待ステータス更新"
        );

        Ok(Invitation {
            status: decision.status(),
            guest_id: Some(guest_id),
            updated_at: patch.updated_at.unwrap_or(invitation.updated_at.clone()),
            ..invitation
        })
    }

    /// 新しいIDで招待を再発行し、元の招待をDELETEDにする
    ///
    /// 有効期限切れでもPENDINGであれば再送できる。
    pub async fn resend(
        &self,
        input: &InvitationIdInput,
        now: DateTime<Utc>,
    ) -> Result<Invitation, InvitationError> {
        self.resend_inner(input, now)
            .await
            .inspect_err(|e| error!(invitation_id = %input.id, error = %e, "招待再送失敗"))
    }

    async fn resend_inner(
        &self,
        input: &InvitationIdInput,
        now: DateTime<Utc>,
    ) -> Result<Invitation, InvitationError> {
        let original = self
            .invitations
            .get(&input.id)
            .await?
            .ok_or(InvitationError::NotFound(Entity::Invitation))?;
        original.ensure_pending()?;

        let replacement = original.resend_clone(now);
        self.invitations
            .resend(&original.id, &replacement, now)
            .await
            .map_err(pending_guard)?;

        info!(
            original_id = %original.id,
            invitation_id = %replacement.id,
            "招待再送"
        );
        Ok(replacement)
    }

    /// ステータスに関わらずDELETEDにする
    pub async fn delete(
        &self,
        input: &InvitationIdInput,
        now: DateTime<Utc>,
    ) -> Result<(), InvitationError> {
        let result = self
            .invitations
            .mark_deleted(&input.id, now)
            .await
            .map_err(|e| match e {
                RepositoryError::ConditionFailed(_) => InvitationError::NotFound(Entity::Invitation),
                other => other.into(),
            });

        match &result {
            Ok(()) => info!(invitation_id = %input.id, "招待削除"),
            Err(e) => error!(invitation_id = %input.id, error = %e, "招待削除失敗"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::InvitationStatus;
    use crate::infrastructure::directory_repository::tests::MockDirectoryRepository;
    use crate::infrastructure::identity_directory::tests::MockIdentityDirectory;
    use crate::infrastructure::invitation_repository::tests::MockInvitationRepository;
    use chrono::TimeZone;
    use serde_json::json;

    type TestWorkflow =
        InvitationWorkflow<MockInvitationRepository, MockDirectoryRepository, MockIdentityDirectory>;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn directory() -> MockDirectoryRepository {
        MockDirectoryRepository::new()
            .with_account("A2", "Tienda")
            .with_role("role-1", "A2", "Cajero")
            .with_user("owner-1", "Olga", "owner@example.com")
            .with_user("guest-1", "Ana", "guest@example.com")
    }

    fn pending(id: &str, guest_id: Option<&str>, expiration: i64) -> Invitation {
        Invitation {
            id: id.to_string(),
            role_id: "role-1".to_string(),
            account_id: "A2".to_string(),
            owner_id: "owner-1".to_string(),
            email: "guest@example.com".to_string(),
            guest_id: guest_id.map(str::to_string),
            status: InvitationStatus::Pending,
            expiration,
            created_at: "2024-05-01T11:00:00.000Z".to_string(),
            updated_at: "2024-05-01T11:00:00.000Z".to_string(),
        }
    }

    fn setup(
        repo: MockInvitationRepository,
        identity: MockIdentityDirectory,
    ) -> (TestWorkflow, MockInvitationRepository, MockIdentityDirectory) {
        let workflow = InvitationWorkflow::new(repo.clone(), directory(), identity.clone());
        (workflow, repo, identity)
    }

    fn owner() -> CallerIdentity {
        serde_json::from_value(json!({
            "username": "owner-1",
            "groups": ["Admin"],
            "claims": { "custom:accounts": "[\"A2\"]" }
        }))
        .unwrap()
    }

    fn create_input(emails: &[&str]) -> CreateInvitationInput {
        CreateInvitationInput {
            account_id: "A2".to_string(),
            role_id: "role-1".to_string(),
            emails: emails.iter().map(|e| e.to_string()).collect(),
            expiration: 60,
        }
    }

    fn approve(id: &str) -> UpdateInvitationInput {
        UpdateInvitationInput {
            id: id.to_string(),
            status: InvitationStatus::Approved,
            guest_id: None,
        }
    }

    // ==================== create ====================

    #[tokio::test]
    async fn test_create_sets_expiration_and_resolves_guest() {
        let (workflow, repo, _) = setup(MockInvitationRepository::new(), MockIdentityDirectory::new());

        let created = workflow
            .create(&owner(), &create_input(&["guest@example.com", "new@example.com"]), now())
            .await
            .unwrap();

        assert_eq!(created.len(), 2);
        assert_eq!(repo.all().len(), 2);
        for invitation in &created {
            assert_eq!(invitation.status, InvitationStatus::Pending);
            assert_eq!(invitation.expiration, now().timestamp() + 3600);
            assert_eq!(invitation.owner_id, "owner-1");
        }
        assert_eq!(created[0].guest_id.as_deref(), Some("guest-1"));
        assert_eq!(created[1].guest_id, None);
    }

    #[tokio::test]
    async fn test_create_outside_caller_scope_is_unauthorized() {
        let (workflow, repo, _) = setup(MockInvitationRepository::new(), MockIdentityDirectory::new());
        let mut input = create_input(&["guest@example.com"]);
        input.account_id = "A9".to_string();

        let result = workflow.create(&owner(), &input, now()).await;

        assert_eq!(result, Err(InvitationError::Unauthorized));
        assert_eq!(result.unwrap_err().to_string(), "Account not found");
        assert!(repo.all().is_empty());
    }

    #[tokio::test]
    async fn test_create_super_admin_bypasses_scope() {
        let (workflow, _, _) = setup(MockInvitationRepository::new(), MockIdentityDirectory::new());
        let admin: CallerIdentity = serde_json::from_value(json!({
            "username": "owner-1",
            "groups": ["SuperAdmin"],
            "claims": {}
        }))
        .unwrap();

        let result = workflow
            .create(&admin, &create_input(&["guest@example.com"]), now())
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_create_unknown_role() {
        let (workflow, _, _) = setup(MockInvitationRepository::new(), MockIdentityDirectory::new());
        let mut input = create_input(&["guest@example.com"]);
        input.role_id = "role-x".to_string();

        let result = workflow.create(&owner(), &input, now()).await;

        assert_eq!(result, Err(InvitationError::NotFound(Entity::Role)));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input() {
        let (workflow, _, _) = setup(MockInvitationRepository::new(), MockIdentityDirectory::new());

        let empty = workflow.create(&owner(), &create_input(&[" "]), now()).await;
        assert!(matches!(empty, Err(InvitationError::InvalidInput(_))));

        let mut input = create_input(&["guest@example.com"]);
        input.expiration = 0;
        let zero = workflow.create(&owner(), &input, now()).await;
        assert!(matches!(zero, Err(InvitationError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_oversized_expiration_without_writing() {
        let (workflow, repo, _) = setup(MockInvitationRepository::new(), MockIdentityDirectory::new());

        let mut input = create_input(&["guest@example.com"]);
        input.expiration = i64::MAX / 30;
        let huge = workflow.create(&owner(), &input, now()).await;
        assert!(matches!(huge, Err(InvitationError::InvalidInput(_))));

        input.expiration = MAX_EXPIRATION_MINUTES + 1;
        let over = workflow.create(&owner(), &input, now()).await;
        assert!(matches!(over, Err(InvitationError::InvalidInput(_))));
        assert!(repo.all().is_empty());

        input.expiration = MAX_EXPIRATION_MINUTES;
        let created = workflow.create(&owner(), &input, now()).await.unwrap();
        assert_eq!(
            created[0].expiration,
            now().timestamp() + MAX_EXPIRATION_MINUTES * 60
        );
    }

    #[tokio::test]
    async fn test_create_partial_failure_keeps_successful_rows() {
        let repo = MockInvitationRepository::new();
        repo.fail_email("bad@example.com");
        let (workflow, repo, _) = setup(repo, MockIdentityDirectory::new());

        let result = workflow
            .create(&owner(), &create_input(&["guest@example.com", "bad@example.com"]), now())
            .await;

        assert_eq!(
            result,
            Err(InvitationError::PartialCreate {
                failed: 1,
                total: 2
            })
        );
        let stored = repo.all();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].email, "guest@example.com");
    }

    // ==================== update ====================

    #[tokio::test]
    async fn test_approve_grants_membership_once() {
        let repo = MockInvitationRepository::new()
            .with_invitation(pending("inv-1", Some("guest-1"), now().timestamp() + 60))
            .with_role("role-1", 3);
        let identity = MockIdentityDirectory::new().with_user("guest-1", &["A1"]);
        let (workflow, repo, identity) = setup(repo, identity);

        let updated = workflow.update(&approve("inv-1"), now()).await.unwrap();

        assert_eq!(updated.status, InvitationStatus::Approved);
        assert_eq!(repo.get_sync("inv-1").unwrap().status, InvitationStatus::Approved);
        assert_eq!(repo.users_amount("role-1"), Some(4));
        assert_eq!(repo.account_users().len(), 1);
        assert_eq!(repo.role_users().len(), 1);
        assert_eq!(
            identity.memberships("guest-1").unwrap().as_slice(),
            &["A1".to_string(), "A2".to_string()]
        );
        // 関連行の作成日時は招待の更新日時と同じ時刻
        assert_eq!(repo.granted_at(), vec![now()]);
        assert_eq!(
            repo.get_sync("inv-1").unwrap().updated_at,
            "2024-05-01T12:00:00.000Z"
        );

        // 2回目はPENDINGでないため拒否される
        let second = workflow.update(&approve("inv-1"), now()).await;
        assert_eq!(second, Err(InvitationError::NotPending));
        assert_eq!(repo.users_amount("role-1"), Some(4));
        assert_eq!(repo.account_users().len(), 1);
    }

    #[tokio::test]
    async fn test_approve_when_already_member_writes_nothing() {
        let repo = MockInvitationRepository::new()
            .with_invitation(pending("inv-1", Some("guest-1"), now().timestamp() + 60))
            .with_role("role-1", 0);
        let identity = MockIdentityDirectory::new().with_user("guest-1", &["A2"]);
        let (workflow, repo, identity) = setup(repo, identity);

        let result = workflow.update(&approve("inv-1"), now()).await;

        assert_eq!(result, Err(InvitationError::AlreadyMember));
        assert_eq!(result.unwrap_err().to_string(), "User is already in Account");
        assert_eq!(repo.get_sync("inv-1").unwrap().status, InvitationStatus::Pending);
        assert_eq!(repo.users_amount("role-1"), Some(0));
        assert_eq!(identity.write_count(), 0);
    }

    #[tokio::test]
    async fn test_update_expired_invitation() {
        let repo = MockInvitationRepository::new()
            .with_invitation(pending("inv-1", Some("guest-1"), now().timestamp()));
        let (workflow, repo, _) = setup(repo, MockIdentityDirectory::new());

        let result = workflow.update(&approve("inv-1"), now()).await;

        assert_eq!(result, Err(InvitationError::Expired));
        assert_eq!(repo.get_sync("inv-1").unwrap().status, InvitationStatus::Pending);
    }

    #[tokio::test]
    async fn test_update_terminal_invitation() {
        let mut rejected = pending("inv-1", Some("guest-1"), now().timestamp() + 60);
        rejected.status = InvitationStatus::Rejected;
        let (workflow, _, _) = setup(
            MockInvitationRepository::new().with_invitation(rejected),
            MockIdentityDirectory::new(),
        );

        let result = workflow.update(&approve("inv-1"), now()).await;

        assert_eq!(result, Err(InvitationError::NotPending));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_update_missing_invitation() {
        let (workflow, _, _) = setup(MockInvitationRepository::new(), MockIdentityDirectory::new());

        let result = workflow.update(&approve("missing"), now()).await;

        assert_eq!(result, Err(InvitationError::NotFound(Entity::Invitation)));
        assert_eq!(result.unwrap_err().to_string(), "Invitation not found");
    }

    #[tokio::test]
    async fn test_update_without_guest() {
        let repo = MockInvitationRepository::new()
            .with_invitation(pending("inv-1", None, now().timestamp() + 60));
        let (workflow, _, _) = setup(repo, MockIdentityDirectory::new());

        let result = workflow.update(&approve("inv-1"), now()).await;

        assert_eq!(result, Err(InvitationError::NotFound(Entity::GuestUser)));
        assert_eq!(result.unwrap_err().to_string(), "Guest user not found");
    }

    #[tokio::test]
    async fn test_reject_uses_supplied_guest() {
        let repo = MockInvitationRepository::new()
            .with_invitation(pending("inv-1", None, now().timestamp() + 60));
        let (workflow, repo, identity) = setup(repo, MockIdentityDirectory::new());

        let input = UpdateInvitationInput {
            id: "inv-1".to_string(),
            status: InvitationStatus::Rejected,
            guest_id: Some("guest-1".to_string()),
        };
        workflow.update(&input, now()).await.unwrap();

        let stored = repo.get_sync("inv-1").unwrap();
        assert_eq!(stored.status, InvitationStatus::Rejected);
        assert_eq!(stored.guest_id.as_deref(), Some("guest-1"));
        assert_eq!(stored.updated_at, "2024-05-01T12:00:00.000Z");
        assert!(repo.account_users().is_empty());
        assert_eq!(identity.write_count(), 0);
    }

    #[tokio::test]
    async fn test_update_with_unknown_supplied_guest() {
        let repo = MockInvitationRepository::new()
            .with_invitation(pending("inv-1", None, now().timestamp() + 60));
        let (workflow, _, _) = setup(repo, MockIdentityDirectory::new());

        let input = UpdateInvitationInput {
            id: "inv-1".to_string(),
            status: InvitationStatus::Rejected,
            guest_id: Some("ghost".to_string()),
        };

        assert_eq!(
            workflow.update(&input, now()).await,
            Err(InvitationError::NotFound(Entity::GuestUser))
        );
    }

    #[tokio::test]
    async fn test_update_rejects_non_decision_status() {
        let (workflow, _, _) = setup(MockInvitationRepository::new(), MockIdentityDirectory::new());

        let input = UpdateInvitationInput {
            id: "inv-1".to_string(),
            status: InvitationStatus::Deleted,
            guest_id: None,
        };

        assert!(matches!(
            workflow.update(&input, now()).await,
            Err(InvitationError::InvalidInput(_))
        ));
    }

    // ==================== resend / delete ====================

    #[tokio::test]
    async fn test_resend_supersedes_original() {
        let original = pending("inv-1", Some("guest-1"), now().timestamp() - 10);
        let (workflow, repo, _) = setup(
            MockInvitationRepository::new().with_invitation(original.clone()),
            MockIdentityDirectory::new(),
        );

        let replacement = workflow
            .resend(&InvitationIdInput { id: "inv-1".to_string() }, now())
            .await
            .unwrap();

        assert_ne!(replacement.id, original.id);
        assert_eq!(replacement.status, InvitationStatus::Pending);
        assert_eq!(replacement.expiration, original.expiration);
        assert_eq!(replacement.email, original.email);
        assert_eq!(replacement.role_id, original.role_id);
        assert_eq!(replacement.created_at, "2024-05-01T12:00:00.000Z");
        assert_eq!(repo.get_sync("inv-1").unwrap().status, InvitationStatus::Deleted);
        assert!(repo.get_sync(&replacement.id).is_some());
    }

    #[tokio::test]
    async fn test_resend_requires_pending() {
        let mut approved = pending("inv-1", Some("guest-1"), now().timestamp() + 60);
        approved.status = InvitationStatus::Approved;
        let (workflow, repo, _) = setup(
            MockInvitationRepository::new().with_invitation(approved),
            MockIdentityDirectory::new(),
        );

        let result = workflow
            .resend(&InvitationIdInput { id: "inv-1".to_string() }, now())
            .await;

        assert_eq!(result, Err(InvitationError::NotPending));
        assert_eq!(repo.all().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_overwrites_any_status() {
        let mut approved = pending("inv-1", Some("guest-1"), now().timestamp() + 60);
        approved.status = InvitationStatus::Approved;
        let (workflow, repo, _) = setup(
            MockInvitationRepository::new().with_invitation(approved),
            MockIdentityDirectory::new(),
        );

        workflow
            .delete(&InvitationIdInput { id: "inv-1".to_string() }, now())
            .await
            .unwrap();

        assert_eq!(repo.get_sync("inv-1").unwrap().status, InvitationStatus::Deleted);
    }

    #[tokio::test]
    async fn test_delete_missing_invitation() {
        let (workflow, _, _) = setup(MockInvitationRepository::new(), MockIdentityDirectory::new());

        let result = workflow
            .delete(&InvitationIdInput { id: "missing".to_string() }, now())
            .await;

        assert_eq!(result, Err(InvitationError::NotFound(Entity::Invitation)));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(InvitationError::NotFound(Entity::Role).kind(), ErrorKind::NotFound);
        assert_eq!(InvitationError::Expired.kind(), ErrorKind::InvalidState);
        assert_eq!(InvitationError::AlreadyMember.kind(), ErrorKind::InvalidState);
        assert_eq!(InvitationError::Unauthorized.kind(), ErrorKind::Unauthorized);
        assert_eq!(
            InvitationError::Repository("x".to_string()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_identity_error_conversion() {
        assert_eq!(
            InvitationError::from(IdentityDirectoryError::UserNotFound("g".to_string())),
            InvitationError::NotFound(Entity::GuestUser)
        );
        assert_eq!(
            InvitationError::from(IdentityDirectoryError::AlreadyMember("A".to_string())),
            InvitationError::AlreadyMember
        );
    }
}
