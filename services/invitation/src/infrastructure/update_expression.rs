/// DynamoDB UpdateExpressionビルダー
///
/// 型付きの部分更新（InvitationPatch）から`SET`式と属性名・属性値マップを組み立てる。
/// 更新可能な属性はInvitationFieldで列挙したものに限られる。
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::InvitationPatch;

/// ビルダーのエラー型
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpdateExpressionError {
    /// 更新対象の属性が無い
    #[error("update has no fields to set")]
    Empty,
}

/// 更新可能な招待属性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationField {
    Status,
    GuestId,
    UpdatedAt,
}

impl InvitationField {
    /// DynamoDB上の属性名
    pub fn attribute_name(&self) -> &'static str {
        match self {
            InvitationField::Status => "status",
            InvitationField::GuestId => "guestId",
            InvitationField::UpdatedAt => "updatedAt",
        }
    }

    fn name_placeholder(&self) -> String {
        format!("#{}", self.attribute_name())
    }

    fn value_placeholder(&self) -> String {
        format!(":{}", self.attribute_name())
    }
}

/// 組み立て済みのUpdateExpression
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateExpression {
    expression: String,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl UpdateExpression {
    /// パッチから`SET`式を構築
    ///
    /// 出力順は status → guestId → updatedAt で固定。
    pub fn from_patch(patch: &InvitationPatch) -> Result<Self, UpdateExpressionError> {
        if patch.is_empty() {
            return Err(UpdateExpressionError::Empty);
        }

        let mut assignments: Vec<(InvitationField, AttributeValue)> = Vec::new();

        if let Some(status) = patch.status {
            assignments.push((
                InvitationField::Status,
                AttributeValue::S(status.as_str().to_string()),
            ));
        }
        if let Some(guest_id) = &patch.guest_id {
            assignments.push((InvitationField::GuestId, AttributeValue::S(guest_id.clone())));
        }
        if let Some(updated_at) = &patch.updated_at {
            assignments.push((
                InvitationField::UpdatedAt,
                AttributeValue::S(updated_at.clone()),
            ));
        }

        let mut names = HashMap::new();
        let mut values = HashMap::new();
        let mut clauses = Vec::with_capacity(assignments.len());

        for (field, value) in assignments {
            clauses.push(format!(
                "{} = {}",
                field.name_placeholder(),
                field.value_placeholder()
            ));
            names.insert(field.name_placeholder(), field.attribute_name().to_string());
            values.insert(field.value_placeholder(), value);
        }

        Ok(Self {
            expression: format!("SET {}", clauses.join(", ")),
            names,
            values,
        })
    }

    /// 条件式で使う属性名プレースホルダーを追加
    pub fn with_name(mut self, field: InvitationField) -> Self {
        self.names
            .insert(field.name_placeholder(), field.attribute_name().to_string());
        self
    }

    /// 条件式で使う属性値を追加
    pub fn with_value(mut self, placeholder: &str, value: AttributeValue) -> Self {
        self.values.insert(placeholder.to_string(), value);
        self
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn names(&self) -> &HashMap<String, String> {
        &self.names
    }

    pub fn values(&self) -> &HashMap<String, AttributeValue> {
        &self.values
    }

    /// SDKビルダーへ渡すために分解
    pub fn into_parts(
        self,
    ) -> (
        String,
        HashMap<String, String>,
        HashMap<String, AttributeValue>,
    ) {
        (self.expression, self.names, self.values)
    }
}
