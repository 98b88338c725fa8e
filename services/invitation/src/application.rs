// アプリケーション層モジュール
pub mod expiry_sweeper;
pub mod invitation_notifier;
pub mod invitation_workflow;
pub mod projection_rebuilder;
pub mod projection_sync;
pub mod resolver;
pub mod role_search;
pub mod stream_record;

// 再エクスポート
pub use expiry_sweeper::{ExpirySweeper, SweepReport};
pub use invitation_notifier::{InvitationNotifier, NotifyError};
pub use invitation_workflow::{
    CreateInvitationInput, Entity, ErrorKind, InvitationError, InvitationIdInput,
    InvitationWorkflow, UpdateInvitationInput,
};
pub use projection_rebuilder::{
    DEFAULT_REBUILD_BATCH_SIZE, ProjectionRebuilder, RebuildError, RebuildOptions, RebuildReport,
};
pub use projection_sync::{InvitationProjectionSync, ProjectionSyncError, UserRoleProjectionSync};
pub use resolver::{
    InvitationCommand, MutationError, QueryError, ResolverError, ResolverEvent, RoleSearchQuery,
    resolve_invitation, resolve_role_search,
};
pub use role_search::{InvitationsByRoleInput, Page, RoleSearch, RoleSearchError, UsersByRoleInput};
pub use stream_record::{RecordOutcome, StreamProcessResult};
