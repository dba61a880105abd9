//! 通知模型
//!
//! 通知是事件被消费后的持久化产物：每个接收者一条、带已读状态、
//! 按创建时间倒序分页读取。元数据在存储层是 string→string 映射，
//! 写入时统一字符串化（有损），读取时以字符串值拓宽回开放映射。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

/// 通知
///
/// 由消费者在事件解码成功后创建一次；此后唯一合法的修改是
/// 标记已读（写入 `read_at`），不会被更新或删除。
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// 全局唯一（UUID v7，时间有序）
    #[serde(default)]
    pub id: Uuid,
    /// 接收者
    pub user_id: Uuid,
    /// 触发事件的类型标签（SCREAMING_SNAKE_CASE 字符串）
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub notification_type: String,
    /// 人类可读内容，由消费端按类目模板生成
    pub content: String,
    /// 开放键值元数据（videoId / commentId / parentId 等类目键）
    #[serde(default)]
    #[sqlx(json)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// None 表示未读
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    /// UNIX_EPOCH 视为未设置（与反序列化默认零值一致），入库前补齐
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: Uuid,
        notification_type: impl std::fmt::Display,
        content: impl Into<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            notification_type: notification_type.to_string(),
            content: content.into(),
            metadata,
            read_at: None,
            created_at: Utc::now(),
        }
    }

    /// 指定通知 id
    ///
    /// 消费端用事件 id 作通知 id：同一事件的重复投递在主键上冲突，
    /// 幂等写入直接吸收重复行。
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

/// 将开放元数据字符串化为存储形式
///
/// 字符串值原样保留，其余值按 JSON 默认格式渲染。这是单向有损转换：
/// 数字、布尔等类型入库后读回来只是字符串，不会恢复原始类型。
pub fn stringify_metadata(
    metadata: &HashMap<String, serde_json::Value>,
) -> HashMap<String, String> {
    metadata
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect()
}
