// ==========================================
// 集装箱分配系统 - API层错误类型
// ==========================================
// 职责: 将仓储错误转换为调用方可处理的错误类别
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
/// 所有错误信息必须包含显式原因
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 调用方错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    /// 可重试：并发运行改变了订单关联
    #[error("并发冲突: {0}")]
    Conflict(String),

    // ==========================================
    // 存储错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 调用方稍后重试即可能成功
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Conflict(_))
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg)
            | RepositoryError::ForeignKeyViolation(msg)
            | RepositoryError::CheckConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("数据约束违反: {}", msg))
            }
            err @ RepositoryError::OrderNotActive { .. } => {
                ApiError::BusinessRuleViolation(err.to_string())
            }
            RepositoryError::ConcurrentModification(msg) => ApiError::Conflict(msg),
            RepositoryError::BusinessRuleViolation(msg) => ApiError::BusinessRuleViolation(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

/// 校验ID参数非空
pub fn require_id<'a>(field: &str, value: &'a str) -> ApiResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::InvalidInput(format!("{}不能为空", field)));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::OrderState;

    #[test]
    fn test_repository_error_conversion() {
        let api_err: ApiError = RepositoryError::NotFound {
            entity: "Order".to_string(),
            id: "O001".to_string(),
        }
        .into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("Order"));
                assert!(msg.contains("O001"));
            }
            _ => panic!("Expected NotFound"),
        }

        let field_err = RepositoryError::FieldValueError {
            field: "quantity".to_string(),
            message: "必须为正".to_string(),
        };
        assert!(matches!(ApiError::from(field_err), ApiError::InvalidInput(_)));

        let refunded = ApiError::from(RepositoryError::OrderNotActive {
            order_id: "O9".to_string(),
            state: OrderState::Refunded,
        });
        assert!(matches!(&refunded, ApiError::BusinessRuleViolation(msg) if msg.contains("O9")));
    }

    #[test]
    fn test_only_conflicts_are_retryable() {
        let conflict = ApiError::from(RepositoryError::ConcurrentModification("O1".to_string()));
        assert!(conflict.is_retryable());
        assert!(!ApiError::InvalidInput("x".to_string()).is_retryable());
    }

    #[test]
    fn test_require_id() {
        assert_eq!(require_id("order_id", " O1 ").unwrap(), "O1");
        assert!(matches!(require_id("order_id", "   "), Err(ApiError::InvalidInput(_))));
    }
}
