/// ロール所属ユーザー同期Lambda関数
///
/// ロール-ユーザー関連テーブルのDynamoDB Streamsを受け取り、
/// ユーザーの表示情報を付与して appsync_users_by_role_{STAGE} をupsertする。
///
/// # 環境変数
/// - STAGE: デプロイステージ（必須）
/// - USER_TABLE ほかDynamoDBテーブル名（必須）
use aws_lambda_events::event::dynamodb::Event;
use invitation::application::UserRoleProjectionSync;
use invitation::infrastructure::{
    AlgoliaSearchIndex, AwsSsmOps, DynamoDbConfig, DynamoDirectoryRepository, SearchIndexConfig,
    init_logging,
};
use lambda_runtime::{Error, LambdaEvent, service_fn};
use tracing::{error, info};

type RoleUserSync = UserRoleProjectionSync<AlgoliaSearchIndex, DynamoDirectoryRepository>;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // 構造化ログを初期化
    init_logging();

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let ssm = AwsSsmOps::from_config(&aws_config);

    let config = SearchIndexConfig::from_env_with_ssm(&ssm).await.map_err(|e| {
        error!(error = %e, "検索インデックス設定読み込み失敗");
        Error::from(e.to_string())
    })?;
    let dynamodb = DynamoDbConfig::from_env(&aws_config).map_err(|e| {
        error!(error = %e, "DynamoDB設定読み込み失敗");
        Error::from(e.to_string())
    })?;
    let index = AlgoliaSearchIndex::new(&config).map_err(|e| Error::from(e.to_string()))?;

    let sync = UserRoleProjectionSync::new(
        index,
        DynamoDirectoryRepository::new(dynamodb.client().clone(), dynamodb.tables().clone()),
        config.users_by_role_index(),
    );
    let sync = &sync;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Event>| async move {
        handler(sync, event).await
    }))
    .await?;
    Ok(())
}

/// Lambda関数のメインハンドラー
async fn handler(sync: &RoleUserSync, event: LambdaEvent<Event>) -> Result<(), Error> {
    info!(
        record_count = event.payload.records.len(),
        "DynamoDB Streamsイベントを受信"
    );

    let result = sync.process_event(event.payload).await;

    // 失敗があった場合はエラーを返す（Lambda再試行をトリガー）
    if result.has_failures() {
        return Err(format!(
            "ロール所属ユーザー同期に失敗: {} 件の失敗",
            result.failure_count
        )
        .into());
    }

    Ok(())
}
