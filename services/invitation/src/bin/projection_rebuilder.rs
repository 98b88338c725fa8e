/// 招待プロジェクション再構築Lambda関数
///
/// 招待テーブルを全件スキャンし、検索インデックス
/// appsync_invitations_by_role_{STAGE} を再構築する。
/// Lambda関数としても、ローカルスクリプトとしても実行可能。
///
/// # 環境変数
/// - STAGE: デプロイステージ（必須）
/// - INVITATION_TABLE ほかDynamoDBテーブル名（必須）
/// - REBUILD_BATCH_SIZE: バッチサイズ（デフォルト: 100、コマンドライン引数で上書き可能）
///
/// # Lambda実行
/// 空のペイロードでトリガーする。
/// 中断した場合は`start_cursor`に前回の`last_cursor`を指定して再開する。
///
/// # ローカル実行
/// ```bash
/// export STAGE=dev
/// export INVITATION_TABLE=invitation-dev
///
/// # 全件再構築
/// cargo run --bin projection_rebuilder
///
/// # 書き込みなしで件数のみ確認
/// cargo run --bin projection_rebuilder -- --dry-run
///
/// # 中断位置から再開
/// cargo run --bin projection_rebuilder -- --batch-size 200 --start-cursor 0190c1a2-...
/// ```
use clap::Parser;
use invitation::application::{
    DEFAULT_REBUILD_BATCH_SIZE, InvitationProjectionSync, ProjectionRebuilder, RebuildError,
    RebuildOptions, RebuildReport,
};
use invitation::infrastructure::{
    AlgoliaSearchIndex, AwsSsmOps, DynamoDbConfig, DynamoInvitationRepository, SearchIndexConfig,
    init_logging,
};
use lambda_runtime::{Error, LambdaEvent, service_fn};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// コマンドライン引数（ローカル実行用）
#[derive(Parser, Debug)]
#[command(name = "projection_rebuilder")]
#[command(about = "招待テーブルから招待検索インデックスを再構築")]
struct CliArgs {
    /// バッチサイズ（1回のスキャンで取得する招待数）
    /// 環境変数REBUILD_BATCH_SIZEより優先される
    #[arg(long, short = 'b')]
    batch_size: Option<u32>,

    /// 再開用の開始カーソル（前回出力されたlast_cursor）
    #[arg(long, short = 's')]
    start_cursor: Option<String>,

    /// 検索インデックスへ書き込まずにスキャンのみ行う
    #[arg(long)]
    dry_run: bool,
}

/// Lambda関数の入力（空または設定オーバーライド）
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RebuildInput {
    batch_size: Option<u32>,
    start_cursor: Option<String>,
    dry_run: bool,
}

/// Lambda関数の出力
#[derive(Debug, Serialize)]
struct RebuildOutput {
    /// 処理成功フラグ
    success: bool,
    scanned_count: usize,
    indexed_count: usize,
    /// dry-runで書き込みを省略した件数
    skipped_count: usize,
    error_count: usize,
    /// 最後に処理したカーソル（再開用）
    #[serde(skip_serializing_if = "Option::is_none")]
    last_cursor: Option<String>,
    /// エラーメッセージ（エラー時のみ）
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl RebuildOutput {
    fn from_report(report: RebuildReport) -> Self {
        Self {
            success: report.error_count == 0,
            scanned_count: report.scanned_count,
            indexed_count: report.indexed_count,
            skipped_count: report.skipped_count,
            error_count: report.error_count,
            last_cursor: report.last_cursor,
            error_message: None,
        }
    }

    fn from_error(e: &RebuildError) -> Self {
        let last_cursor = match e {
            RebuildError::Scan { last_cursor, .. } => last_cursor.clone(),
            RebuildError::InvalidBatchSize => None,
        };
        Self {
            success: false,
            scanned_count: 0,
            indexed_count: 0,
            skipped_count: 0,
            error_count: 0,
            last_cursor,
            error_message: Some(e.to_string()),
        }
    }
}

type Rebuilder = ProjectionRebuilder<DynamoInvitationRepository, AlgoliaSearchIndex>;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // 構造化ログを初期化
    init_logging();

    let rebuilder = build_rebuilder().await?;

    // Lambda環境かどうかを判定
    if std::env::var("AWS_LAMBDA_FUNCTION_NAME").is_ok() {
        info!("Lambda関数として起動");
        let rebuilder = &rebuilder;
        lambda_runtime::run(service_fn(
            move |event: LambdaEvent<RebuildInput>| async move { handler(rebuilder, event).await },
        ))
        .await?;
    } else {
        info!("ローカルスクリプトとして起動");
        run_local(&rebuilder).await?;
    }

    Ok(())
}

/// 依存関係を組み立てる
async fn build_rebuilder() -> Result<Rebuilder, Error> {
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    let dynamodb = DynamoDbConfig::from_env(&aws_config).map_err(|e| {
        error!(error = %e, "DynamoDB設定読み込み失敗");
        Error::from(e.to_string())
    })?;
    let search_config = SearchIndexConfig::from_env_with_ssm(&AwsSsmOps::from_config(&aws_config))
        .await
        .map_err(|e| {
            error!(error = %e, "検索インデックス設定読み込み失敗");
            Error::from(e.to_string())
        })?;
    let index = AlgoliaSearchIndex::new(&search_config).map_err(|e| Error::from(e.to_string()))?;

    info!(
        invitation_table = %dynamodb.tables().invitations,
        index_name = %search_config.invitations_by_role_index(),
        "設定読み込み完了"
    );

    Ok(ProjectionRebuilder::new(
        DynamoInvitationRepository::new(dynamodb.client().clone(), dynamodb.tables().clone()),
        InvitationProjectionSync::new(index, search_config.invitations_by_role_index()),
    ))
}

/// バッチサイズを決定（引数 > REBUILD_BATCH_SIZE > デフォルト）
fn resolve_batch_size(batch_size_override: Option<u32>) -> u32 {
    batch_size_override
        .or_else(|| {
            std::env::var("REBUILD_BATCH_SIZE").ok().and_then(|value| {
                value
                    .parse()
                    .inspect_err(|_| warn!(value = %value, "REBUILD_BATCH_SIZEが不正なためデフォルトを使用"))
                    .ok()
            })
        })
        .unwrap_or(DEFAULT_REBUILD_BATCH_SIZE)
}

/// Lambda関数のメインハンドラー
async fn handler(
    rebuilder: &Rebuilder,
    event: LambdaEvent<RebuildInput>,
) -> Result<RebuildOutput, Error> {
    let input = event.payload;
    let options = RebuildOptions {
        batch_size: resolve_batch_size(input.batch_size),
        dry_run: input.dry_run,
        start_cursor: input.start_cursor,
    };

    info!(
        batch_size = options.batch_size,
        dry_run = options.dry_run,
        has_start_cursor = options.start_cursor.is_some(),
        "招待プロジェクション再構築を開始"
    );

    match rebuilder.rebuild(&options).await {
        Ok(report) => Ok(RebuildOutput::from_report(report)),
        Err(e) => {
            error!(error = %e, "招待プロジェクション再構築に失敗");
            Ok(RebuildOutput::from_error(&e))
        }
    }
}

/// ローカル実行用関数
async fn run_local(rebuilder: &Rebuilder) -> Result<(), Error> {
    let args = CliArgs::parse();
    let options = RebuildOptions {
        batch_size: resolve_batch_size(args.batch_size),
        dry_run: args.dry_run,
        start_cursor: args.start_cursor,
    };

    info!(
        batch_size = options.batch_size,
        dry_run = options.dry_run,
        start_cursor = ?options.start_cursor,
        "コマンドライン引数をパース"
    );

    match rebuilder.rebuild(&options).await {
        Ok(report) => {
            info!(
                scanned_count = report.scanned_count,
                indexed_count = report.indexed_count,
                skipped_count = report.skipped_count,
                error_count = report.error_count,
                last_cursor = ?report.last_cursor,
                "招待プロジェクション再構築完了"
            );
            if report.error_count > 0 {
                return Err(format!("{} 件のupsertに失敗", report.error_count).into());
            }
            Ok(())
        }
        Err(e) => {
            if let RebuildError::Scan {
                last_cursor: Some(ref cursor),
                ..
            } = e
            {
                info!(start_cursor = %cursor, "次回の再開用カーソル");
            }
            error!(error = %e, "招待プロジェクション再構築に失敗");
            Err(Error::from(e.to_string()))
        }
    }
}
