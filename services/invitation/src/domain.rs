// ドメイン層モジュール
pub mod caller;
pub mod directory;
pub mod invitation;
pub mod membership;
pub mod notification;
pub mod projection;

// 再エクスポート
pub use caller::CallerIdentity;
pub use directory::{Account, Role, UserProfile};
pub use invitation::{
    Decision, Invitation, InvitationPatch, InvitationStatus, MAX_EXPIRATION_MINUTES, TransitionError,
    format_timestamp,
};
pub use membership::{AccountMemberships, AccountUser, MembershipError, MembershipGrant, RoleUser};
pub use notification::{ChangeKind, InAppNotification, InvitationEmail, NotificationAction};
pub use projection::{InvitationProjection, UserRoleProjection};
