//! 事件模型
//!
//! 定义通知管线的三类领域事件（视频、评论、用户）、事件类型标签及其
//! 类目划分。每个类目是一个封闭的具名结构体，生产者只接受本类目的
//! 结构体，跨类目的负载在编译期就无法构造。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// EventType — 事件类型标签
// ---------------------------------------------------------------------------

/// 事件类型标签
///
/// 按事件主体划分为三大类目：视频、评论、用户。类目决定事件发布到
/// 哪个主题、由哪个消费者物化成通知。标签的线上形式（日志、Kafka
/// header、通知 type 字段）统一为 SCREAMING_SNAKE_CASE。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    // 视频类事件 — 围绕单个视频的生命周期
    VideoUploaded,
    VideoProcessed,
    VideoDeleted,

    // 评论类事件 — 围绕单条评论的互动
    CommentCreated,
    CommentReplied,
    CommentLiked,

    // 用户类事件 — 用户之间的社交关系与账号安全
    UserFollowed,
    UserUnfollowed,
    UserMentioned,
    UserLogin,
}

/// 事件类目
///
/// 每个类目对应一个主题、一个生产者和一个消费者。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Video,
    Comment,
    User,
}

impl EventCategory {
    /// 类目的小写名，用作消费组后缀和日志字段
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Comment => "comment",
            Self::User => "user",
        }
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl EventType {
    /// 标签所属类目
    pub fn category(&self) -> EventCategory {
        match self {
            Self::VideoUploaded | Self::VideoProcessed | Self::VideoDeleted => {
                EventCategory::Video
            }
            Self::CommentCreated | Self::CommentReplied | Self::CommentLiked => {
                EventCategory::Comment
            }
            Self::UserFollowed | Self::UserUnfollowed | Self::UserMentioned | Self::UserLogin => {
                EventCategory::User
            }
        }
    }

    /// 视频类事件围绕单个视频的生命周期
    pub fn is_video(&self) -> bool {
        self.category() == EventCategory::Video
    }

    /// 评论类事件围绕单条评论的互动
    pub fn is_comment(&self) -> bool {
        self.category() == EventCategory::Comment
    }

    /// 用户类事件的通知接收方是 target_user_id，而非动作发起者
    pub fn is_user(&self) -> bool {
        self.category() == EventCategory::User
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 与 serde 的 SCREAMING_SNAKE_CASE 保持一致，
        // 便于在日志、Kafka header 和通知 type 字段中统一引用
        let s = match self {
            Self::VideoUploaded => "VIDEO_UPLOADED",
            Self::VideoProcessed => "VIDEO_PROCESSED",
            Self::VideoDeleted => "VIDEO_DELETED",
            Self::CommentCreated => "COMMENT_CREATED",
            Self::CommentReplied => "COMMENT_REPLIED",
            Self::CommentLiked => "COMMENT_LIKED",
            Self::UserFollowed => "USER_FOLLOWED",
            Self::UserUnfollowed => "USER_UNFOLLOWED",
            Self::UserMentioned => "USER_MENTIONED",
            Self::UserLogin => "USER_LOGIN",
        };
        write!(f, "{s}")
    }
}

/// 序列号默认值：高精度时钟，粗略单调
pub fn next_sequence_number() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// VideoEvent — 视频类事件
// ---------------------------------------------------------------------------

/// 视频类事件
///
/// 公共字段（id、createdAt、eventKey、sequenceNumber）缺省时由
/// `fill_defaults` 在发布前补齐，调用方已提供的值不会被覆盖。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoEvent {
    /// 事件唯一标识（UUID v7，时间有序），nil 表示未设置
    #[serde(default)]
    pub id: Uuid,
    pub event_type: EventType,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Kafka 分区键，保证同一主体的事件按发布顺序投递
    #[serde(default)]
    pub event_key: String,
    #[serde(default)]
    pub sequence_number: i64,
    pub video_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl VideoEvent {
    pub fn new(event_type: EventType, video_id: Uuid, user_id: Uuid, title: impl Into<String>) -> Self {
        let mut event = Self {
            id: Uuid::nil(),
            event_type,
            created_at: None,
            event_key: String::new(),
            sequence_number: 0,
            video_id,
            user_id,
            title: title.into(),
            metadata: HashMap::new(),
        };
        event.fill_defaults();
        event
    }

    /// 补齐缺省的公共字段，已有值保持不变
    pub fn fill_defaults(&mut self) {
        if self.id.is_nil() {
            self.id = Uuid::now_v7();
        }
        if self.created_at.is_none() {
            self.created_at = Some(Utc::now());
        }
        if self.event_key.is_empty() {
            self.event_key = self.video_id.to_string();
        }
        if self.sequence_number == 0 {
            self.sequence_number = next_sequence_number();
        }
    }

    /// 分区键：视频 id
    pub fn message_key(&self) -> String {
        self.video_id.to_string()
    }

    /// 随消息携带的可过滤属性，供消费者和运维工具免解码筛选
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("event_type", self.event_type.to_string()),
            ("user_id", self.user_id.to_string()),
            ("video_id", self.video_id.to_string()),
        ]
    }
}

// ---------------------------------------------------------------------------
// CommentEvent — 评论类事件
// ---------------------------------------------------------------------------

/// 评论类事件
///
/// `parent_id` 仅在回复场景存在；`user_id` 是被通知方（核心层不负责
/// 解析视频作者，由调用方在构造事件时填入正确的接收者）。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentEvent {
    #[serde(default)]
    pub id: Uuid,
    pub event_type: EventType,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub event_key: String,
    #[serde(default)]
    pub sequence_number: i64,
    pub comment_id: Uuid,
    pub user_id: Uuid,
    pub video_id: Uuid,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CommentEvent {
    pub fn new(
        event_type: EventType,
        comment_id: Uuid,
        user_id: Uuid,
        video_id: Uuid,
        content: impl Into<String>,
    ) -> Self {
        let mut event = Self {
            id: Uuid::nil(),
            event_type,
            created_at: None,
            event_key: String::new(),
            sequence_number: 0,
            comment_id,
            user_id,
            video_id,
            parent_id: None,
            content: content.into(),
            metadata: HashMap::new(),
        };
        event.fill_defaults();
        event
    }

    /// 回复场景：记录被回复的父评论
    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// 补齐缺省的公共字段，已有值保持不变
    pub fn fill_defaults(&mut self) {
        if self.id.is_nil() {
            self.id = Uuid::now_v7();
        }
        if self.created_at.is_none() {
            self.created_at = Some(Utc::now());
        }
        if self.event_key.is_empty() {
            self.event_key = self.comment_id.to_string();
        }
        if self.sequence_number == 0 {
            self.sequence_number = next_sequence_number();
        }
    }

    /// 分区键：评论 id
    pub fn message_key(&self) -> String {
        self.comment_id.to_string()
    }

    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("event_type", self.event_type.to_string()),
            ("user_id", self.user_id.to_string()),
            ("video_id", self.video_id.to_string()),
            ("comment_id", self.comment_id.to_string()),
        ];
        if let Some(parent_id) = self.parent_id {
            headers.push(("parent_id", parent_id.to_string()));
        }
        headers
    }
}

// ---------------------------------------------------------------------------
// UserEvent — 用户类事件
// ---------------------------------------------------------------------------

/// 用户类事件
///
/// `user_id` 是动作发起者，`target_user_id` 是通知接收者。
/// 关注、提及、登录提醒都落在接收方的通知列表里。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEvent {
    #[serde(default)]
    pub id: Uuid,
    pub event_type: EventType,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub event_key: String,
    #[serde(default)]
    pub sequence_number: i64,
    pub user_id: Uuid,
    pub target_user_id: Uuid,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl UserEvent {
    pub fn new(
        event_type: EventType,
        user_id: Uuid,
        target_user_id: Uuid,
        content: impl Into<String>,
    ) -> Self {
        let mut event = Self {
            id: Uuid::nil(),
            event_type,
            created_at: None,
            event_key: String::new(),
            sequence_number: 0,
            user_id,
            target_user_id,
            content: content.into(),
            metadata: HashMap::new(),
        };
        event.fill_defaults();
        event
    }

    /// 补齐缺省的公共字段，已有值保持不变
    pub fn fill_defaults(&mut self) {
        if self.id.is_nil() {
            self.id = Uuid::now_v7();
        }
        if self.created_at.is_none() {
            self.created_at = Some(Utc::now());
        }
        if self.event_key.is_empty() {
            self.event_key = self.message_key();
        }
        if self.sequence_number == 0 {
            self.sequence_number = next_sequence_number();
        }
    }

    /// 分区键：`{动作方}-{接收方}`，同一对用户的事件保持顺序
    pub fn message_key(&self) -> String {
        format!("{}-{}", self.user_id, self.target_user_id)
    }

    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("event_type", self.event_type.to_string()),
            ("user_id", self.user_id.to_string()),
            ("target_user_id", self.target_user_id.to_string()),
        ]
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_classification() {
        // 视频类
        assert!(EventType::VideoUploaded.is_video());
        assert!(EventType::VideoProcessed.is_video());
        assert!(EventType::VideoDeleted.is_video());
        assert!(!EventType::VideoUploaded.is_comment());

        // 评论类
        assert!(EventType::CommentCreated.is_comment());
        assert!(EventType::CommentReplied.is_comment());
        assert!(EventType::CommentLiked.is_comment());
        assert!(!EventType::CommentCreated.is_user());

        // 用户类
        assert!(EventType::UserFollowed.is_user());
        assert!(EventType::UserUnfollowed.is_user());
        assert!(EventType::UserMentioned.is_user());
        assert!(EventType::UserLogin.is_user());
        assert!(!EventType::UserFollowed.is_video());
    }

    #[test]
    fn test_event_type_display() {
        assert_eq!(EventType::VideoUploaded.to_string(), "VIDEO_UPLOADED");
        assert_eq!(EventType::CommentReplied.to_string(), "COMMENT_REPLIED");
        assert_eq!(EventType::UserFollowed.to_string(), "USER_FOLLOWED");
        assert_eq!(EventType::UserLogin.to_string(), "USER_LOGIN");
    }

    #[test]
    fn test_event_category_as_str() {
        assert_eq!(EventType::VideoDeleted.category().as_str(), "video");
        assert_eq!(EventType::CommentLiked.category().as_str(), "comment");
        assert_eq!(EventType::UserMentioned.category().as_str(), "user");
    }

    #[test]
    fn test_video_event_serialization() {
        let video_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let event = VideoEvent::new(EventType::VideoUploaded, video_id, user_id, "春日骑行vlog");

        let json = serde_json::to_string(&event).unwrap();

        // 验证 camelCase 序列化格式
        assert!(json.contains("eventType"));
        assert!(json.contains("createdAt"));
        assert!(json.contains("eventKey"));
        assert!(json.contains("sequenceNumber"));
        assert!(json.contains("videoId"));
        assert!(json.contains("\"VIDEO_UPLOADED\""));

        // 验证反序列化能还原
        let deserialized: VideoEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.id, event.id);
        assert_eq!(deserialized.event_type, EventType::VideoUploaded);
        assert_eq!(deserialized.video_id, video_id);
        assert_eq!(deserialized.title, "春日骑行vlog");
    }

    #[test]
    fn test_new_fills_common_fields() {
        let event = VideoEvent::new(
            EventType::VideoProcessed,
            Uuid::new_v4(),
            Uuid::new_v4(),
            "标题",
        );

        assert!(!event.id.is_nil());
        assert!(event.created_at.is_some());
        assert_eq!(event.event_key, event.video_id.to_string());
        assert_ne!(event.sequence_number, 0);
    }

    #[test]
    fn test_fill_defaults_preserves_existing_values() {
        let fixed_id = Uuid::new_v4();
        let fixed_time = DateTime::parse_from_rfc3339("2025-06-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let mut event = VideoEvent::new(
            EventType::VideoUploaded,
            Uuid::new_v4(),
            Uuid::new_v4(),
            "标题",
        );
        event.id = fixed_id;
        event.created_at = Some(fixed_time);
        event.sequence_number = 42;

        // 再次补齐不应覆盖调用方提供的值
        event.fill_defaults();
        assert_eq!(event.id, fixed_id);
        assert_eq!(event.created_at, Some(fixed_time));
        assert_eq!(event.sequence_number, 42);
    }

    #[test]
    fn test_deserialize_without_common_fields() {
        // 外部适配器可能只提供业务字段，公共字段缺省
        let json = format!(
            r#"{{"eventType":"VIDEO_UPLOADED","videoId":"{}","userId":"{}","title":"t"}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        let mut event: VideoEvent = serde_json::from_str(&json).unwrap();

        assert!(event.id.is_nil());
        assert!(event.created_at.is_none());

        event.fill_defaults();
        assert!(!event.id.is_nil());
        assert!(event.created_at.is_some());
    }

    #[test]
    fn test_comment_event_keys_and_headers() {
        let comment_id = Uuid::new_v4();
        let parent_id = Uuid::new_v4();
        let event = CommentEvent::new(
            EventType::CommentReplied,
            comment_id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            "写得太好了",
        )
        .with_parent(parent_id);

        // 分区键是评论 id
        assert_eq!(event.message_key(), comment_id.to_string());

        let headers = event.headers();
        let keys: Vec<&str> = headers.iter().map(|(k, _)| *k).collect();
        assert!(keys.contains(&"event_type"));
        assert!(keys.contains(&"comment_id"));
        assert!(keys.contains(&"parent_id"));

        let parent_header = headers.iter().find(|(k, _)| *k == "parent_id").unwrap();
        assert_eq!(parent_header.1, parent_id.to_string());
    }

    #[test]
    fn test_comment_event_without_parent_omits_header() {
        let event = CommentEvent::new(
            EventType::CommentCreated,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "第一条评论",
        );

        let keys: Vec<&str> = event.headers().iter().map(|(k, _)| *k).collect();
        assert!(!keys.contains(&"parent_id"));
    }

    #[test]
    fn test_user_event_message_key_pairs_actor_and_target() {
        let actor = Uuid::new_v4();
        let target = Uuid::new_v4();
        let event = UserEvent::new(EventType::UserFollowed, actor, target, "");

        assert_eq!(event.message_key(), format!("{}-{}", actor, target));
        assert_eq!(event.event_key, format!("{}-{}", actor, target));

        let headers = event.headers();
        let target_header = headers
            .iter()
            .find(|(k, _)| *k == "target_user_id")
            .unwrap();
        assert_eq!(target_header.1, target.to_string());
    }

    #[test]
    fn test_user_event_parent_id_roundtrip() {
        let event = CommentEvent::new(
            EventType::CommentReplied,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "hi",
        )
        .with_parent(Uuid::new_v4());

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("parentId"));

        let deserialized: CommentEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.parent_id, event.parent_id);
    }
}
