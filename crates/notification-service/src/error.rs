//! 通知服务专用错误类型
//!
//! 在共享库 NotifyError 基础上定义本服务特有的错误变体，
//! 使上层可以精确区分"重复启动/类型不符/无法路由"等不同失败原因，
//! 而无需在共享库中为每个服务追加变体。

use vclip_shared::error::NotifyError;

/// 通知服务错误
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// 消费者或管理器处于非 Stopped 状态时再次 start
    #[error("组件已在运行: {component}")]
    AlreadyRunning { component: String },

    /// 事件结构与其携带的类型标签类目不符，说明调用方拼装出了非法事件
    #[error("事件类型与生产者类目不符: {event_type}")]
    InvalidEventType { event_type: String },

    /// 类型标签合法但没有映射到任何生产者方法，发布前直接拒绝
    #[error("不支持发布的事件类型: {event_type}")]
    UnsupportedEventType { event_type: String },

    /// 服务装配缺少必要组件（如启用状态下缺少存储）
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 透传共享库错误，避免在每个 match 分支手动转换
    #[error(transparent)]
    Shared(#[from] NotifyError),
}

/// 服务层统一返回类型
pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServiceError::AlreadyRunning {
            component: "video-consumer".to_string(),
        };
        assert_eq!(err.to_string(), "组件已在运行: video-consumer");

        let err = ServiceError::InvalidEventType {
            event_type: "USER_FOLLOWED".to_string(),
        };
        assert_eq!(err.to_string(), "事件类型与生产者类目不符: USER_FOLLOWED");

        let err = ServiceError::UnsupportedEventType {
            event_type: "VIDEO_DELETED".to_string(),
        };
        assert_eq!(err.to_string(), "不支持发布的事件类型: VIDEO_DELETED");

        let shared_err = NotifyError::Kafka("broker 不可达".to_string());
        let err = ServiceError::Shared(shared_err);
        assert_eq!(err.to_string(), "Kafka 错误: broker 不可达");
    }
}
