// インフラストラクチャ層モジュール
pub mod config;
pub mod directory_repository;
pub mod email_sender;
pub mod identity_directory;
pub mod invitation_repository;
pub mod logging;
pub mod search_index;
pub mod sns_ops;
pub mod ssm_ops;
pub mod update_expression;

// 再エクスポート
pub use config::{
    CognitoConfig, ConfigError, DynamoDbConfig, NotificationConfig, SearchIndexConfig, TableNames,
};
pub use directory_repository::{DirectoryRepository, DynamoDirectoryRepository};
pub use email_sender::{EmailSendError, EmailSender, SesEmailSender};
pub use identity_directory::{
    CognitoIdentityDirectory, IdentityDirectory, IdentityDirectoryError, add_account_membership,
};
pub use invitation_repository::{
    DynamoInvitationRepository, InvitationPage, InvitationRepository, MAX_TRANSACTION_ITEMS,
    RepositoryError,
};
pub use logging::init_logging;
#[cfg(test)]
pub use logging::init_test_logging;
pub use search_index::{AlgoliaSearchIndex, SearchIndex, SearchIndexError, SearchRequest, SearchResponse};
pub use sns_ops::{NotificationPublisher, SnsNotificationPublisher, SnsOpsError};
pub use ssm_ops::{AwsSsmOps, SsmOps, SsmOpsError};
pub use update_expression::{InvitationField, UpdateExpression, UpdateExpressionError};
