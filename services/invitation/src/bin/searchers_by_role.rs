/// ロール単位検索Lambda関数
///
/// AppSyncリゾルバーとして usersByRole / invitationsByRole を処理し、
/// 検索インデックスの結果をページ形式で返す。
///
/// # 環境変数
/// - STAGE: デプロイステージ（必須、SSMパラメータ名とインデックス名に使用）
use invitation::application::{Page, ResolverEvent, RoleSearch, resolve_role_search};
use invitation::infrastructure::{AlgoliaSearchIndex, AwsSsmOps, SearchIndexConfig, init_logging};
use lambda_runtime::{Error, LambdaEvent, service_fn};
use tracing::{error, info};

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
    let index = AlgoliaSearchIndex::new(&config).map_err(|e| {
        error!(error = %e, "検索インデックスクライアント作成失敗");
        Error::from(e.to_string())
    })?;

    let search = RoleSearch::new(
        index,
        config.users_by_role_index(),
        config.invitations_by_role_index(),
    );
    let search = &search;

    lambda_runtime::run(service_fn(
        move |event: LambdaEvent<ResolverEvent>| async move { handler(search, event).await },
    ))
    .await?;
    Ok(())
}

/// Lambda関数のメインハンドラー
async fn handler(
    search: &RoleSearch<AlgoliaSearchIndex>,
    event: LambdaEvent<ResolverEvent>,
) -> Result<Page, Error> {
    let payload = event.payload;

    info!(
        request_id = %event.context.request_id,
        parent_type_name = %payload.info.parent_type_name,
        field_name = %payload.info.field_name,
        "リゾルバーイベント受信"
    );

    resolve_role_search(search, &payload)
        .await
        .map_err(|e| Error::from(e.to_string()))
}
