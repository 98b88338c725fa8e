// DynamoDB Streamsレコード処理の共通部品
//
// 同期・通知のハンドラーはレコード単位で独立に処理し、
// 成功/失敗/スキップ件数を集計する。

use aws_lambda_events::event::dynamodb::EventRecord;
use serde::de::DeserializeOwned;
use serde_dynamo::Item;

/// ストリームイベント処理の結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamProcessResult {
    /// 処理に成功したレコード数
    pub success_count: usize,
    /// 処理に失敗したレコード数
    pub failure_count: usize,
    /// スキップしたレコード数（REMOVE、対象外の変更等）
    pub skip_count: usize,
}

impl StreamProcessResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_failures(&self) -> bool {
        self.failure_count > 0
    }
}

/// 単一レコードの処理結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Processed,
    /// スキップした（理由を含む）
    Skipped(String),
}

/// イメージをデシリアライズ（空イメージはNone）
pub fn decode_image<T: DeserializeOwned>(image: &Item) -> Result<Option<T>, serde_dynamo::Error> {
    if image.is_empty() {
        return Ok(None);
    }
    serde_dynamo::from_item(image.clone()).map(Some)
}

pub fn decode_new_image<T: DeserializeOwned>(
    record: &EventRecord,
) -> Result<Option<T>, serde_dynamo::Error> {
    decode_image(&record.change.new_image)
}

pub fn decode_old_image<T: DeserializeOwned>(
    record: &EventRecord,
) -> Result<Option<T>, serde_dynamo::Error> {
    decode_image(&record.change.old_image)
}
