/// 招待ミューテーションLambda関数
///
/// AppSyncリゾルバーとして createInvitation / updateInvitation /
/// resendInvitation / deleteInvitation を処理する。成功時はtrueを返す。
///
/// # 環境変数
/// - INVITATION_TABLE, ROLE_TABLE, USER_TABLE, ACCOUNT_TABLE,
///   ACCOUNT_BY_USER_TABLE, USER_BY_ROLE_TABLE: DynamoDBテーブル名（必須）
/// - COGNITO_USER_POOL: CognitoユーザープールID（必須）
use chrono::Utc;
use invitation::application::{InvitationWorkflow, ResolverEvent, resolve_invitation};
use invitation::infrastructure::{
    CognitoConfig, CognitoIdentityDirectory, DynamoDbConfig, DynamoDirectoryRepository,
    DynamoInvitationRepository, init_logging,
};
use lambda_runtime::{Error, LambdaEvent, service_fn};
use tracing::{error, info};

type Workflow =
    InvitationWorkflow<DynamoInvitationRepository, DynamoDirectoryRepository, CognitoIdentityDirectory>;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // 構造化ログを初期化
    init_logging();

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    let dynamodb = DynamoDbConfig::from_env(&aws_config).map_err(|e| {
        error!(error = %e, "DynamoDB設定読み込み失敗");
        Error::from(e.to_string())
    })?;
    let cognito = CognitoConfig::from_env().map_err(|e| {
        error!(error = %e, "Cognito設定読み込み失敗");
        Error::from(e.to_string())
    })?;

    // クライアントはコールドスタート時に一度だけ作成し、参照で渡す
    let workflow = InvitationWorkflow::new(
        DynamoInvitationRepository::new(dynamodb.client().clone(), dynamodb.tables().clone()),
        DynamoDirectoryRepository::new(dynamodb.client().clone(), dynamodb.tables().clone()),
        CognitoIdentityDirectory::new(
            aws_sdk_cognitoidentityprovider::Client::new(&aws_config),
            cognito.user_pool_id(),
        ),
    );
    let workflow = &workflow;

    lambda_runtime::run(service_fn(
        move |event: LambdaEvent<ResolverEvent>| async move { handler(workflow, event).await },
    ))
    .await?;
    Ok(())
}

/// Lambda関数のメインハンドラー
async fn handler(workflow: &Workflow, event: LambdaEvent<ResolverEvent>) -> Result<bool, Error> {
    let payload = event.payload;

    info!(
        request_id = %event.context.request_id,
        parent_type_name = %payload.info.parent_type_name,
        field_name = %payload.info.field_name,
        username = payload.identity.as_ref().map(|i| i.username.as_str()).unwrap_or("anonymous"),
        "リゾルバーイベント受信"
    );

    resolve_invitation(workflow, &payload, Utc::now())
        .await
        .map_err(|e| Error::from(e.to_string()))
}
