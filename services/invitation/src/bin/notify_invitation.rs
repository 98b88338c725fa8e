/// 招待通知Lambda関数
///
/// 招待テーブルのDynamoDB Streamsを受け取り、
/// 新規PENDING招待には招待メールと（招待先が判明していれば）アプリ内通知を、
/// APPROVED / REJECTEDへの遷移には招待者へのアプリ内通知を送る。
///
/// # 環境変数
/// - ACCOUNT_TABLE, ROLE_TABLE, USER_TABLE ほかDynamoDBテーブル名（必須）
/// - SES_EMAIL: 送信元メールアドレス（必須）
/// - NOTIFICATION_TOPIC_ARN: アプリ内通知用SNSトピック（必須）
/// - INVITATION_URL: 招待リンクのベースURL（任意）
use aws_lambda_events::event::dynamodb::Event;
use invitation::application::InvitationNotifier;
use invitation::infrastructure::{
    DynamoDbConfig, DynamoDirectoryRepository, NotificationConfig, SesEmailSender,
    SnsNotificationPublisher, init_logging,
};
use lambda_runtime::{Error, LambdaEvent, service_fn};
use tracing::{error, info};

type Notifier = InvitationNotifier<DynamoDirectoryRepository, SesEmailSender, SnsNotificationPublisher>;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // 構造化ログを初期化
    init_logging();

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    let dynamodb = DynamoDbConfig::from_env(&aws_config).map_err(|e| {
        error!(error = %e, "DynamoDB設定読み込み失敗");
        Error::from(e.to_string())
    })?;
    let notification = NotificationConfig::from_env().map_err(|e| {
        error!(error = %e, "通知設定読み込み失敗");
        Error::from(e.to_string())
    })?;

    let notifier = InvitationNotifier::new(
        DynamoDirectoryRepository::new(dynamodb.client().clone(), dynamodb.tables().clone()),
        SesEmailSender::new(
            aws_sdk_sesv2::Client::new(&aws_config),
            notification.sender_email(),
        ),
        SnsNotificationPublisher::new(
            aws_sdk_sns::Client::new(&aws_config),
            notification.topic_arn(),
        ),
        notification.invitation_url(),
    );
    let notifier = &notifier;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Event>| async move {
        handler(notifier, event).await
    }))
    .await?;
    Ok(())
}

/// Lambda関数のメインハンドラー
async fn handler(notifier: &Notifier, event: LambdaEvent<Event>) -> Result<(), Error> {
    info!(
        record_count = event.payload.records.len(),
        "DynamoDB Streamsイベントを受信"
    );

    let result = notifier.process_event(event.payload).await;

    if result.has_failures() {
        return Err(format!("招待通知に失敗: {} 件の失敗", result.failure_count).into());
    }

    Ok(())
}
