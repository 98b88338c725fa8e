/// 期限切れ招待のスイーパー
///
/// 有効期限を過ぎたPENDING招待を全件取得し、
/// トランザクション上限ごとのバッチでDELETEDにする。
/// 失敗したバッチは再試行せず報告する。確定済みのバッチは巻き戻さない。
use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::infrastructure::{InvitationRepository, MAX_TRANSACTION_ITEMS, RepositoryError};

/// スイープ結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// 期限切れとして検出した件数
    pub expired_count: usize,
    /// DELETEDにした件数
    pub deleted_count: usize,
    /// 失敗したバッチ数
    pub failed_batches: usize,
    /// 失敗したバッチに含まれていた件数
    pub failed_count: usize,
}

impl SweepReport {
    pub fn has_failures(&self) -> bool {
        self.failed_batches > 0
    }
}

pub struct ExpirySweeper<IR: InvitationRepository> {
    invitations: IR,
    batch_size: usize,
}

impl<IR: InvitationRepository> ExpirySweeper<IR> {
    pub fn new(invitations: IR) -> Self {
        Self {
            invitations,
            batch_size: MAX_TRANSACTION_ITEMS,
        }
    }

    /// バッチサイズを指定（1以上、トランザクション上限以下に丸める）
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_TRANSACTION_ITEMS);
        self
    }

    /// 期限切れ招待をDELETEDにする
    ///
    /// 対象の検索に失敗した場合はエラー。バッチの失敗はレポートに含める。
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, RepositoryError> {
        let expired_ids = self
            .invitations
            .expired_pending_ids(now.timestamp())
            .await
            .inspect_err(|e| error!(error = %e, "期限切れ招待の検索に失敗"))?;

        let mut report = SweepReport {
            expired_count: expired_ids.len(),
            ..SweepReport::default()
        };

        if expired_ids.is_empty() {
            info!("期限切れ招待なし");
            return Ok(report);
        }

        for (batch_index, batch) in expired_ids.chunks(self.batch_size).enumerate() {
            match self.invitations.mark_deleted_batch(batch, now).await {
                Ok(()) => {
                    report.deleted_count += batch.len();
                }
                Err(e) => {
                    error!(
                        batch_index,
                        batch_len = batch.len(),
                        first_id = %batch[0],
                        error = %e,
                        "期限切れ招待バッチの削除に失敗"
                    );
                    report.failed_batches += 1;
                    report.failed_count += batch.len();
                }
            }
        }

        info!(
            expired_count = report.expired_count,
            deleted_count = report.deleted_count,
            failed_batches = report.failed_batches,
            "期限切れ招待スイープ完了"
        );

        Ok(report)
    }
}
