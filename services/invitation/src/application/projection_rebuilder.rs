// 招待プロジェクションの再構築
//
// 招待テーブルをページ単位でスキャンし、全招待のプロジェクションを
// 検索インデックスへ再upsertする。初回構築およびインデックス破損時の復旧用。
// 中断した場合は最後のカーソルから再開できる。

use thiserror::Error;
use tracing::{info, warn};

use super::projection_sync::InvitationProjectionSync;
use crate::infrastructure::{InvitationRepository, RepositoryError, SearchIndex};

/// デフォルトのスキャンバッチサイズ
pub const DEFAULT_REBUILD_BATCH_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("バッチサイズは1以上である必要があります")]
    InvalidBatchSize,

    /// スキャン失敗（再開用に直前のカーソルを保持）
    #[error("招待テーブルのスキャンに失敗: {source}")]
    Scan {
        source: RepositoryError,
        last_cursor: Option<String>,
    },
}

/// 再構築オプション
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildOptions {
    /// 1回のスキャンで取得する件数
    pub batch_size: u32,
    /// trueの場合は検索インデックスへ書き込まない
    pub dry_run: bool,
    /// 再開用の開始カーソル（直前に処理した招待ID）
    pub start_cursor: Option<String>,
}

impl Default for RebuildOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_REBUILD_BATCH_SIZE,
            dry_run: false,
            start_cursor: None,
        }
    }
}

/// 再構築結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub scanned_count: usize,
    pub indexed_count: usize,
    /// dry-runで書き込みを省略した件数
    pub skipped_count: usize,
    pub error_count: usize,
    /// 最後に処理したページのカーソル
    pub last_cursor: Option<String>,
}

pub struct ProjectionRebuilder<IR: InvitationRepository, SI: SearchIndex> {
    invitations: IR,
    sync: InvitationProjectionSync<SI>,
}

impl<IR: InvitationRepository, SI: SearchIndex> ProjectionRebuilder<IR, SI> {
    pub fn new(invitations: IR, sync: InvitationProjectionSync<SI>) -> Self {
        Self { invitations, sync }
    }

    pub async fn rebuild(&self, options: &RebuildOptions) -> Result<RebuildReport, RebuildError> {
        if options.batch_size == 0 {
            return Err(RebuildError::InvalidBatchSize);
        }
        let limit = i32::try_from(options.batch_size).unwrap_or(i32::MAX);

        let mut report = RebuildReport {
            last_cursor: options.start_cursor.clone(),
            ..RebuildReport::default()
        };
        let mut cursor = options.start_cursor.clone();
        let mut batch_number = 0usize;

        loop {
            let page = self
                .invitations
                .scan_page(cursor.as_deref(), limit)
                .await
                .map_err(|source| RebuildError::Scan {
                    source,
                    last_cursor: report.last_cursor.clone(),
                })?;

            batch_number += 1;
            let batch_len = page.invitations.len();

            for invitation in &page.invitations {
                report.scanned_count += 1;
                if options.dry_run {
                    report.skipped_count += 1;
                    continue;
                }
                match self.sync.upsert(invitation).await {
                    Ok(()) => report.indexed_count += 1,
                    Err(e) => {
                        warn!(invitation_id = %invitation.id, error = %e, "プロジェクションのupsertに失敗");
                        report.error_count += 1;
                    }
                }
            }

            if let Some(last) = page.invitations.last() {
                report.last_cursor = Some(last.id.clone());
            }

            info!(
                batch_number,
                batch_len,
                scanned_count = report.scanned_count,
                indexed_count = report.indexed_count,
                error_count = report.error_count,
                dry_run = options.dry_run,
                "バッチ処理完了"
            );

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!(
            scanned_count = report.scanned_count,
            indexed_count = report.indexed_count,
            skipped_count = report.skipped_count,
            error_count = report.error_count,
            "プロジェクション再構築完了"
        );
        Ok(report)
    }
}
