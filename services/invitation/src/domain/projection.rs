// 検索インデックス用プロジェクション
//
// 招待およびロール-ユーザー関連行を、検索インデックスで絞り込みやすい
// 非正規化ドキュメントに変換する。objectIDに元レコードのIDを使うため、
// 同じレコードを何度upsertしても結果は変わらない。

use serde::{Deserialize, Serialize};

use super::directory::UserProfile;
use super::invitation::{Invitation, InvitationStatus, timestamp_seconds};
use super::membership::RoleUser;

/// 招待プロジェクション
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationProjection {
    /// 検索インデックスのドキュメントID（招待ID）
    #[serde(rename = "objectID")]
    pub object_id: String,
    pub account_id: String,
    pub status: InvitationStatus,
    /// 有効期限（UNIXエポック秒）
    pub expiration: i64,
    pub email: String,
    pub guest_id: Option<String>,
    pub owner_id: String,
    pub role_id: String,
    pub created_at: String,
    /// 作成日時のエポック秒（範囲検索用）
    #[serde(rename = "createdAt_timestamp")]
    pub created_at_timestamp: Option<i64>,
}

impl InvitationProjection {
    pub fn from_invitation(invitation: &Invitation) -> Self {
        Self {
            object_id: invitation.id.clone(),
            account_id: invitation.account_id.clone(),
            status: invitation.status,
            expiration: invitation.expiration,
            email: invitation.email.clone(),
            guest_id: invitation.guest_id.clone(),
            owner_id: invitation.owner_id.clone(),
            role_id: invitation.role_id.clone(),
            created_at: invitation.created_at.clone(),
            created_at_timestamp: timestamp_seconds(&invitation.created_at),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.object_id
    }
}

/// ロール-ユーザープロジェクション
///
/// ユーザーの表示情報は書き込み時点のスナップショット。
/// ユーザー名が後から変わっても、関連行が再度変更されるまで反映されない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRoleProjection {
    /// 関連行のID
    #[serde(rename = "objectID")]
    pub object_id: String,
    pub user_id: String,
    pub role_id: String,
    pub name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<String>,
    #[serde(rename = "createdAt_timestamp")]
    pub created_at_timestamp: Option<i64>,
}

impl UserRoleProjection {
    pub fn from_row(row: &RoleUser, user: &UserProfile) -> Self {
        Self {
            object_id: row.id.clone(),
            user_id: user.id.clone(),
            role_id: row.role_id.clone(),
            name: user.name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            picture: user.picture.clone(),
            status: user.status.clone(),
            created_at: user.created_at.clone(),
            created_at_timestamp: user.created_at.as_deref().and_then(timestamp_seconds),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.object_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invitation() -> Invitation {
        Invitation {
            id: "inv-1".to_string(),
            role_id: "role-1".to_string(),
            account_id: "acc-1".to_string(),
            owner_id: "owner-1".to_string(),
            email: "guest@example.com".to_string(),
            guest_id: Some("guest-1".to_string()),
            status: InvitationStatus::Pending,
            expiration: 1_714_568_400,
            created_at: "2024-05-01T12:00:00.000Z".to_string(),
            updated_at: "2024-05-01T12:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn test_invitation_projection_fields() {
        let projection = InvitationProjection::from_invitation(&invitation());

        assert_eq!(projection.document_id(), "inv-1");
        assert_eq!(projection.created_at_timestamp, Some(1_714_564_800));

        let json = serde_json::to_value(&projection).unwrap();
        assert_eq!(json["objectID"], "inv-1");
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["guestId"], "guest-1");
        assert_eq!(json["createdAt_timestamp"], 1_714_564_800);
        assert_eq!(json["expiration"], 1_714_568_400);
    }

    #[test]
    fn test_invitation_projection_with_unparseable_date() {
        let mut invitation = invitation();
        invitation.created_at = "yesterday".to_string();

        let projection = InvitationProjection::from_invitation(&invitation);
        assert_eq!(projection.created_at_timestamp, None);
    }

    #[test]
    fn test_user_role_projection_snapshot() {
        let row = RoleUser {
            id: "ru-1".to_string(),
            role_id: "role-1".to_string(),
            user_id: "user-1".to_string(),
        };
        let user = UserProfile {
            id: "user-1".to_string(),
            name: "Ana".to_string(),
            last_name: Some("Ruiz".to_string()),
            email: Some("ana@example.com".to_string()),
            picture: None,
            status: Some("APPROVED".to_string()),
            created_at: Some("2024-05-01T12:00:00.000Z".to_string()),
        };

        let projection = UserRoleProjection::from_row(&row, &user);
        assert_eq!(projection.document_id(), "ru-1");
        assert_eq!(projection.user_id, "user-1");
        assert_eq!(projection.created_at_timestamp, Some(1_714_564_800));

        let json = serde_json::to_value(&projection).unwrap();
        assert_eq!(json["lastName"], "Ruiz");
        assert_eq!(json["status"], "APPROVED");
    }
}
