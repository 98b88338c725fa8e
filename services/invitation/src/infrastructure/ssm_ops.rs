//! SSM操作モジュール
//!
//! 検索インデックスの認証情報をParameter Storeから取得する。

use async_trait::async_trait;
use aws_sdk_ssm::Client as SsmClient;
use thiserror::Error;
use tracing::{info, warn};

/// SSM操作のエラー型
#[derive(Debug, Error)]
pub enum SsmOpsError {
    /// AWS SDK エラー
    #[error("AWS SSM APIエラー: {0}")]
    AwsSdkError(String),
    /// パラメータが存在しない、または値が空
    #[error("パラメータが見つかりません: {0}")]
    ParameterNotFound(String),
}

/// SSM操作トレイト（テスト用の抽象化）
#[async_trait]
pub trait SsmOps: Send + Sync {
    /// パラメータ値を取得する（SecureStringは復号される）
    async fn get_parameter(&self, name: &str) -> Result<String, SsmOpsError>;
}

/// 実際のAWS SSM SDKを使用したSSM操作実装
pub struct AwsSsmOps {
    client: SsmClient,
}

impl AwsSsmOps {
    pub fn new(client: SsmClient) -> Self {
        Self { client }
    }

    /// 共有AWS設定からクライアントを作成
    pub fn from_config(config: &aws_config::SdkConfig) -> Self {
        Self::new(SsmClient::new(config))
    }
}

#[async_trait]
impl SsmOps for AwsSsmOps {
    async fn get_parameter(&self, name: &str) -> Result<String, SsmOpsError> {
        let result = self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await;

        match result {
            Ok(response) => {
                let value = response
                    .parameter()
                    .and_then(|p| p.value())
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| SsmOpsError::ParameterNotFound(name.to_string()))?;

                info!(parameter = %name, "SSMパラメータ取得完了");
                Ok(value.to_string())
            }
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_parameter_not_found() {
                    return Err(SsmOpsError::ParameterNotFound(name.to_string()));
                }
                warn!(
                    parameter = %name,
                    error = %service_error,
                    "GetParameterエラー"
                );
                Err(SsmOpsError::AwsSdkError(service_error.to_string()))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// テスト用のモックSSM操作
    #[derive(Default)]
    pub struct MockSsmOps {
        parameters: HashMap<String, String>,
        call_count: Arc<AtomicUsize>,
    }

    impl MockSsmOps {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_parameter(mut self, name: &str, value: &str) -> Self {
            self.parameters.insert(name.to_string(), value.to_string());
            self
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SsmOps for MockSsmOps {
        async fn get_parameter(&self, name: &str) -> Result<String, SsmOpsError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.parameters
                .get(name)
                .cloned()
                .ok_or_else(|| SsmOpsError::ParameterNotFound(name.to_string()))
        }
    }

    #[test]
    fn test_ssm_ops_error_display() {
        let sdk_error = SsmOpsError::AwsSdkError("API呼び出し失敗".to_string());
        assert_eq!(sdk_error.to_string(), "AWS SSM APIエラー: API呼び出し失敗");

        let not_found = SsmOpsError::ParameterNotFound("/dev/algolia-app-id".to_string());
        assert_eq!(
            not_found.to_string(),
            "パラメータが見つかりません: /dev/algolia-app-id"
        );
    }

    #[tokio::test]
    async fn test_mock_ssm_ops_returns_parameter() {
        let mock = MockSsmOps::new().with_parameter("/dev/algolia-app-id", "APP");

        let value = mock.get_parameter("/dev/algolia-app-id").await.unwrap();

        assert_eq!(value, "APP");
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_ssm_ops_missing_parameter() {
        let mock = MockSsmOps::new();

        let result = mock.get_parameter("/dev/algolia-admin-key").await;

        assert!(matches!(result, Err(SsmOpsError::ParameterNotFound(_))));
    }
}
