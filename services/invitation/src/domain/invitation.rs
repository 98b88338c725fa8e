/// 招待エンティティとステータス遷移
///
/// 招待はPENDINGでのみ遷移可能で、APPROVED / REJECTED / DELETEDは終端状態。
/// 有効期限は作成時に確定し、以後延長されない。
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// DynamoDBアイテムの`__typename`に格納する値
pub const INVITATION_TYPENAME: &str = "Invitation";

/// 有効期限として指定できる最大の分数（1年）
pub const MAX_EXPIRATION_MINUTES: i64 = 365 * 24 * 60;

/// 招待ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvitationStatus {
    /// 承認待ち（唯一の遷移可能な状態）
    Pending,
    /// 承認済み
    Approved,
    /// 拒否
    Rejected,
    /// 削除（論理削除、物理削除は行わない）
    Deleted,
}

impl InvitationStatus {
    /// DynamoDB / 検索インデックスに保存する文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "PENDING",
            InvitationStatus::Approved => "APPROVED",
            InvitationStatus::Rejected => "REJECTED",
            InvitationStatus::Deleted => "DELETED",
        }
    }

    /// 終端状態かどうか
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvitationStatus::Pending)
    }
}

impl fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ステータス文字列のパースエラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown invitation status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for InvitationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(InvitationStatus::Pending),
            "APPROVED" => Ok(InvitationStatus::Approved),
            "REJECTED" => Ok(InvitationStatus::Rejected),
            "DELETED" => Ok(InvitationStatus::Deleted),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// updateInvitationで指定できる遷移先
///
/// PENDINGへの遷移やDELETEDへの遷移はupdateでは受け付けない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    /// 遷移後のステータス
    pub fn status(&self) -> InvitationStatus {
        match self {
            Decision::Approve => InvitationStatus::Approved,
            Decision::Reject => InvitationStatus::Rejected,
        }
    }
}

impl TryFrom<InvitationStatus> for Decision {
    type Error = InvitationStatus;

    fn try_from(status: InvitationStatus) -> Result<Self, Self::Error> {
        match status {
            InvitationStatus::Approved => Ok(Decision::Approve),
            InvitationStatus::Rejected => Ok(Decision::Reject),
            other => Err(other),
        }
    }
}

/// 遷移前提条件の違反
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// PENDING以外からの遷移
    #[error("invitation is not pending (status: {0})")]
    NotPending(InvitationStatus),
    /// 有効期限切れ
    #[error("invitation expired at {expiration} (now: {now})")]
    Expired { expiration: i64, now: i64 },
}

/// 招待
///
/// DynamoDBストリームのNewImageから直接デシリアライズできるよう、
/// 属性名はcamelCaseで保持する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    /// 時系列ソート可能なID
    pub id: String,
    pub role_id: String,
    pub account_id: String,
    /// 招待者
    pub owner_id: String,
    pub email: String,
    /// 招待先ユーザー（メールに一致するユーザーが判明している場合のみ）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_id: Option<String>,
    pub status: InvitationStatus,
    /// 有効期限（UNIXエポック秒）
    pub expiration: i64,
    /// 作成日時（RFC 3339、ミリ秒精度）
    pub created_at: String,
    pub updated_at: String,
}

impl Invitation {
    /// 新しいPENDING招待を作成
    ///
    /// 有効期限は `created_at + expiration_minutes * 60` 秒。
    pub fn new_pending(
        role_id: &str,
        account_id: &str,
        owner_id: &str,
        email: &str,
        guest_id: Option<String>,
        expiration_minutes: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let timestamp = format_timestamp(now);
        Self {
            id: generate_id(),
            role_id: role_id.to_string(),
            account_id: account_id.to_string(),
            owner_id: owner_id.to_string(),
            email: email.to_string(),
            guest_id,
            status: InvitationStatus::Pending,
            expiration: expiration_at(now, expiration_minutes),
            created_at: timestamp.clone(),
            updated_at: timestamp,
        }
    }

    /// 再送用のクローンを作成
    ///
    /// 新しいIDでPENDINGに戻し、作成・更新日時を現在時刻にする。
    /// 有効期限・ロール・アカウント・招待者・メール・招待先は引き継ぐ。
    pub fn resend_clone(&self, now: DateTime<Utc>) -> Self {
        let timestamp = format_timestamp(now);
        Self {
            id: generate_id(),
            status: InvitationStatus::Pending,
            created_at: timestamp.clone(),
            updated_at: timestamp,
            ..self.clone()
        }
    }

    /// 有効期限切れかどうか（`expiration <= now`）
    pub fn is_expired(&self, now_epoch: i64) -> bool {
        self.expiration <= now_epoch
    }

    /// PENDINGかどうかのみ確認（resendは期限切れでも許可される）
    pub fn ensure_pending(&self) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::NotPending(self.status));
        }
        Ok(())
    }

    /// update（承認/拒否）の前提条件を検証
    pub fn ensure_transitionable(&self, now_epoch: i64) -> Result<(), TransitionError> {
        self.ensure_pending()?;
        if self.is_expired(now_epoch) {
            return Err(TransitionError::Expired {
                expiration: self.expiration,
                now: now_epoch,
            });
        }
        Ok(())
    }

    /// 招待先ユーザーIDを解決（入力値を優先）
    pub fn resolve_guest<'a>(&'a self, requested: Option<&'a str>) -> Option<&'a str> {
        requested.or(self.guest_id.as_deref())
    }
}

/// 有効期限のエポック秒を計算
///
/// 範囲外の分数は飽和させる。入力の上限検証は呼び出し側で行う。
pub fn expiration_at(now: DateTime<Utc>, minutes: i64) -> i64 {
    now.timestamp().saturating_add(minutes.saturating_mul(60))
}

/// 保存用の日時文字列（`2024-01-01T00:00:00.000Z`形式）
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 日時文字列をエポック秒に変換（パースできない場合はNone）
pub fn timestamp_seconds(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp())
}

/// 時系列ソート可能な一意IDを生成
pub fn generate_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// 招待の部分更新
///
/// 更新可能な属性のみをフィールドとして持つ。
/// JSONから構築する場合、未知のフィールドはエラーになる。
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InvitationPatch {
    #[serde(default)]
    pub status: Option<InvitationStatus>,
    #[serde(default)]
    pub guest_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl InvitationPatch {
    /// ステータスと更新日時を設定するパッチ
    pub fn status(status: InvitationStatus, now: DateTime<Utc>) -> Self {
        Self {
            status: Some(status),
            guest_id: None,
            updated_at: Some(format_timestamp(now)),
        }
    }

    /// 招待先ユーザーIDを追加
    pub fn with_guest(mut self, guest_id: impl Into<String>) -> Self {
        self.guest_id = Some(guest_id.into());
        self
    }

    /// 更新対象が一つもないかどうか
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.guest_id.is_none() && self.updated_at.is_none()
    }
}
