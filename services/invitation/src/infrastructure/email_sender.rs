//! メール送信モジュール（SES v2）

use async_trait::async_trait;
use aws_sdk_sesv2::Client as SesClient;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::InvitationEmail;

/// 件名・本文の文字コード
const CHARSET: &str = "UTF-8";

#[derive(Debug, Error)]
pub enum EmailSendError {
    /// メッセージ構築エラー
    #[error("メッセージ構築エラー: {0}")]
    BuildError(String),
    /// AWS SDK エラー
    #[error("AWS SES APIエラー: {0}")]
    AwsSdkError(String),
}

/// メール送信トレイト（テスト用の抽象化）
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// 送信し、メッセージIDを返す
    async fn send(&self, email: &InvitationEmail) -> Result<String, EmailSendError>;
}

pub struct SesEmailSender {
    client: SesClient,
    from_address: String,
}

impl SesEmailSender {
    pub fn new(client: SesClient, from_address: impl Into<String>) -> Self {
        Self {
            client,
            from_address: from_address.into(),
        }
    }

    fn content(data: &str) -> Result<Content, EmailSendError> {
        Content::builder()
            .data(data)
            .charset(CHARSET)
            .build()
            .map_err(|e| EmailSendError::BuildError(e.to_string()))
    }

    fn build_content(email: &InvitationEmail) -> Result<EmailContent, EmailSendError> {
        let message = Message::builder()
            .subject(Self::content(&email.subject)?)
            .body(Body::builder().html(Self::content(&email.html_body)?).build())
            .build();
        Ok(EmailContent::builder().simple(message).build())
    }
}

#[async_trait]
impl EmailSender for SesEmailSender {
    async fn send(&self, email: &InvitationEmail) -> Result<String, EmailSendError> {
        let content = Self::build_content(email)?;

        let result = self
            .client
            .send_email()
            .from_email_address(&self.from_address)
            .destination(Destination::builder().to_addresses(&email.to).build())
            .content(content)
            .send()
            .await;

        match result {
            Ok(output) => {
                let message_id = output.message_id().unwrap_or("unknown").to_string();
                info!(to = %email.to, message_id = %message_id, "招待メール送信成功");
                Ok(message_id)
            }
            Err(err) => {
                let service_error = err.into_service_error();
                warn!(to = %email.to, error = %service_error, "招待メール送信エラー");
                Err(EmailSendError::AwsSdkError(service_error.to_string()))
            }
        }
    }
}
