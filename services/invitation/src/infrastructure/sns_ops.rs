//! SNS操作モジュール
//!
//! アプリ内通知をSNSトピックへ発行する。
//! 購読側（通知配信サービス）は`userId`と`type`のメッセージ属性で絞り込む。

use async_trait::async_trait;
use aws_sdk_sns::Client as SnsClient;
use aws_sdk_sns::types::MessageAttributeValue;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::InAppNotification;

/// SNS操作のエラー型
#[derive(Debug, Error)]
pub enum SnsOpsError {
    /// AWS SDK エラー
    #[error("AWS SNS APIエラー: {0}")]
    AwsSdkError(String),
    /// JSON シリアライズエラー
    #[error("JSONシリアライズエラー: {0}")]
    SerializeError(String),
}

/// アプリ内通知の発行トレイト（テスト用の抽象化）
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    /// 通知を発行し、メッセージIDを返す
    async fn publish(&self, notification: &InAppNotification) -> Result<String, SnsOpsError>;
}

/// 実際のAWS SNS SDKを使用した通知発行実装
pub struct SnsNotificationPublisher {
    client: SnsClient,
    topic_arn: String,
}

impl SnsNotificationPublisher {
    pub fn new(client: SnsClient, topic_arn: impl Into<String>) -> Self {
        Self {
            client,
            topic_arn: topic_arn.into(),
        }
    }

    fn string_attribute(value: &str) -> Result<MessageAttributeValue, SnsOpsError> {
        MessageAttributeValue::builder()
            .data_type("String")
            .string_value(value)
            .build()
            .map_err(|e| SnsOpsError::AwsSdkError(e.to_string()))
    }
}

#[async_trait]
impl NotificationPublisher for SnsNotificationPublisher {
    async fn publish(&self, notification: &InAppNotification) -> Result<String, SnsOpsError> {
        let message = serde_json::to_string(notification)
            .map_err(|e| SnsOpsError::SerializeError(e.to_string()))?;

        let result = self
            .client
            .publish()
            .topic_arn(&self.topic_arn)
            .message(message)
            .message_attributes("userId", Self::string_attribute(&notification.user_id)?)
            .message_attributes(
                "type",
                Self::string_attribute(&notification.notification_type)?,
            )
            .send()
            .await;

        match result {
            Ok(response) => {
                let message_id = response.message_id().unwrap_or("unknown").to_string();

                info!(
                    topic_arn = %self.topic_arn,
                    message_id = %message_id,
                    user_id = %notification.user_id,
                    action = ?notification.action,
                    "通知発行成功"
                );

                Ok(message_id)
            }
            Err(err) => {
                let service_error = err.into_service_error();
                warn!(
                    topic_arn = %self.topic_arn,
                    error = %service_error,
                    "SNS Publishエラー"
                );
                Err(SnsOpsError::AwsSdkError(service_error.to_string()))
            }
        }
    }
}
