/// 招待に関する通知（メール・アプリ内通知）
///
/// 変更レコードの種類とステータスから通知アクションを決定し、
/// 送信内容を組み立てる。送信自体はインフラ層が担う。
use serde::{Deserialize, Serialize};

use super::directory::{Account, Role, UserProfile};
use super::invitation::{InvitationStatus, generate_id};

/// 通知種別
pub const NOTIFICATION_TYPE_INVITATION: &str = "INVITATION";

/// 変更レコードの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Modify,
}

impl ChangeKind {
    /// DynamoDB Streamsの`eventName`から変換（REMOVE等はNone）
    pub fn from_event_name(event_name: &str) -> Option<Self> {
        match event_name {
            "INSERT" => Some(ChangeKind::Insert),
            "MODIFY" => Some(ChangeKind::Modify),
            _ => None,
        }
    }
}

/// 通知アクション
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationAction {
    /// 招待の依頼（招待先への通知）
    Request,
    /// 承認（招待者への通知）
    Approved,
    /// 拒否（招待者への通知）
    Rejected,
}

impl NotificationAction {
    /// 変更内容から通知アクションを決定
    ///
    /// - INSERTかつPENDING: Request
    /// - MODIFYでAPPROVED/REJECTEDに遷移: Approved / Rejected
    /// - DELETEDへの遷移、その他: 通知なし
    ///
    /// `old_status`が取得できる場合、ステータスが変わっていないMODIFYは通知しない。
    pub fn for_change(
        kind: ChangeKind,
        old_status: Option<InvitationStatus>,
        new_status: InvitationStatus,
    ) -> Option<Self> {
        match (kind, new_status) {
            (ChangeKind::Insert, InvitationStatus::Pending) => Some(NotificationAction::Request),
            (ChangeKind::Modify, InvitationStatus::Approved | InvitationStatus::Rejected) => {
                if old_status == Some(new_status) {
                    return None;
                }
                if new_status == InvitationStatus::Approved {
                    Some(NotificationAction::Approved)
                } else {
                    Some(NotificationAction::Rejected)
                }
            }
            _ => None,
        }
    }
}

/// アプリ内通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InAppNotification {
    pub id: String,
    /// 通知先ユーザー
    pub user_id: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub action: NotificationAction,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub picture: Option<String>,
}

impl InAppNotification {
    /// 招待先ユーザーへの招待依頼通知
    pub fn invitation_request(
        guest_id: &str,
        account: &Account,
        role: &Role,
        owner: &UserProfile,
    ) -> Self {
        Self {
            id: generate_id(),
            user_id: guest_id.to_string(),
            notification_type: NOTIFICATION_TYPE_INVITATION.to_string(),
            action: NotificationAction::Request,
            title: format!(
                "{} te ha invitado a unirte como {}",
                account.name, role.name
            ),
            description: format!("{} te ha invitado a ser parte de su equipo.", owner.name),
            picture: account.picture.clone(),
        }
    }

    /// 招待者への回答（承認/拒否）通知
    pub fn invitation_answered(
        action: NotificationAction,
        owner_id: &str,
        account: &Account,
        role: &Role,
        guest: &UserProfile,
    ) -> Self {
        let approved = action == NotificationAction::Approved;
        Self {
            id: generate_id(),
            user_id: owner_id.to_string(),
            notification_type: NOTIFICATION_TYPE_INVITATION.to_string(),
            action,
            title: format!(
                "{} ha {} la solicitud a unirse a {}",
                guest.name,
                if approved { "aprobado" } else { "rechazado" },
                account.name
            ),
            description: format!(
                "{} {} del rol {}",
                guest.name,
                if approved { "hace parte" } else { "no hace parte" },
                role.name
            ),
            picture: account.picture.clone(),
        }
    }
}

/// 招待メール
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

impl InvitationEmail {
    /// 招待メールを組み立てる
    ///
    /// リンクは `{base_url}/{invitation_id}`。
    pub fn new(
        to: &str,
        invitation_id: &str,
        base_url: &str,
        account: &Account,
        role: &Role,
        owner: &UserProfile,
    ) -> Self {
        let link = format!("{}/{}", base_url.trim_end_matches('/'), invitation_id);
        Self {
            to: to.to_string(),
            subject: format!(
                "{} te ha invitado a unirte como {}.",
                account.name, role.name
            ),
            // 本文はHTMLのため、利用者が設定できる値は全てエスケープする
            html_body: format!(
                "<p>{} te ha invitado a ser parte de su equipo.</p>\nURL: <a href=\"{}\">{}</a>",
                html_escape::encode_text(&owner.name),
                html_escape::encode_double_quoted_attribute(&link),
                html_escape::encode_text(&link),
            ),
        }
    }
}
