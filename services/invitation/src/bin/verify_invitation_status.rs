/// 期限切れ招待スイーパーLambda関数
///
/// スケジュール実行され、有効期限を過ぎたPENDING招待をDELETEDにする。
/// 失敗したバッチがある場合はエラーを返す（確定済みのバッチはそのまま）。
///
/// # 環境変数
/// - INVITATION_TABLE ほかDynamoDBテーブル名（必須）
use chrono::Utc;
use invitation::application::{ExpirySweeper, SweepReport};
use invitation::infrastructure::{DynamoDbConfig, DynamoInvitationRepository, init_logging};
use lambda_runtime::{Error, LambdaEvent, service_fn};
use serde_json::Value;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Error> {
    // 構造化ログを初期化
    init_logging();

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let dynamodb = DynamoDbConfig::from_env(&aws_config).map_err(|e| {
        error!(error = %e, "DynamoDB設定読み込み失敗");
        Error::from(e.to_string())
    })?;

    let sweeper = ExpirySweeper::new(DynamoInvitationRepository::new(
        dynamodb.client().clone(),
        dynamodb.tables().clone(),
    ));
    let sweeper = &sweeper;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        handler(sweeper, event).await
    }))
    .await?;
    Ok(())
}

/// Lambda関数のメインハンドラー
///
/// スケジュールイベントのペイロードは使用しない。
async fn handler(
    sweeper: &ExpirySweeper<DynamoInvitationRepository>,
    event: LambdaEvent<Value>,
) -> Result<(), Error> {
    info!(request_id = %event.context.request_id, "期限切れ招待スイープ開始");

    let report: SweepReport = sweeper
        .sweep(Utc::now())
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    if report.has_failures() {
        return Err(format!(
            "期限切れ招待の削除に失敗: {} バッチ（{} 件）",
            report.failed_batches, report.failed_count
        )
        .into());
    }

    Ok(())
}
