//! 通知文案生成
//!
//! 把三类领域事件渲染成面向用户的通知：选定接收者、套用该类型的
//! 中文模板、截断过长的标题和预览，并把业务关联 id 写进元数据。
//! 通知 id 取事件 id：同一事件无论被投递多少次，装配出的通知主键
//! 相同，仓储的幂等写入据此吸收重复投递。
//! 当前使用硬编码模板以降低外部依赖，未来可扩展为
//! 从数据库或配置中心动态加载模板。

use serde_json::Value;
use vclip_shared::events::{CommentEvent, EventType, UserEvent, VideoEvent};
use vclip_shared::notification::Notification;

use crate::error::{Result, ServiceError};

/// 视频标题在通知文案中的最大字符数
pub const MAX_TITLE_CHARS: usize = 80;

/// 评论预览与用户事件文案的最大字符数
pub const MAX_PREVIEW_CHARS: usize = 50;

// ---------------------------------------------------------------------------
// truncate — 字符级截断
// ---------------------------------------------------------------------------

/// 按字符数截断字符串
///
/// 以字符而非字节计数，中文等多字节文本不会被截在字符中间。
/// 不超长时原样返回；超长时保留 `max - 3` 个字符并追加 "..."，
/// 结果恰好 `max` 个字符；`max <= 3` 时退化为 `max` 个点。
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max <= 3 {
        return ".".repeat(max);
    }
    let kept: String = s.chars().take(max - 3).collect();
    format!("{kept}...")
}

// ---------------------------------------------------------------------------
// 通知装配
// ---------------------------------------------------------------------------

/// 从视频事件装配通知
///
/// 接收者是事件上的 user_id（视频作者收到自己视频的状态变更）。
pub fn build_video_notification(event: &VideoEvent) -> Result<Notification> {
    let title = truncate(&event.title, MAX_TITLE_CHARS);
    let content = match event.event_type {
        EventType::VideoUploaded => {
            format!("你的视频《{title}》已上传成功，正在处理中")
        }
        EventType::VideoProcessed => {
            format!("你的视频《{title}》已处理完成，快去看看吧")
        }
        EventType::VideoDeleted => format!("你的视频《{title}》已被删除"),
        other => {
            return Err(ServiceError::InvalidEventType {
                event_type: other.to_string(),
            });
        }
    };

    let mut metadata = event.metadata.clone();
    metadata.insert(
        "videoId".to_string(),
        Value::String(event.video_id.to_string()),
    );

    Ok(Notification::new(event.user_id, event.event_type, content, metadata).with_id(event.id))
}

/// 从评论事件装配通知
///
/// 接收者是事件上的 user_id：视频作者/父评论作者由上游在构造
/// 事件时解析填入，核心层不做归属查询。
pub fn build_comment_notification(event: &CommentEvent) -> Result<Notification> {
    let preview = truncate(&event.content, MAX_PREVIEW_CHARS);
    let content = match event.event_type {
        EventType::CommentCreated => format!("你的视频收到了新评论：{preview}"),
        EventType::CommentReplied => format!("你的评论收到了新回复：{preview}"),
        EventType::CommentLiked => "你的评论收到了新的点赞".to_string(),
        other => {
            return Err(ServiceError::InvalidEventType {
                event_type: other.to_string(),
            });
        }
    };

    let mut metadata = event.metadata.clone();
    metadata.insert(
        "videoId".to_string(),
        Value::String(event.video_id.to_string()),
    );
    metadata.insert(
        "commentId".to_string(),
        Value::String(event.comment_id.to_string()),
    );
    if let Some(parent_id) = event.parent_id {
        metadata.insert("parentId".to_string(), Value::String(parent_id.to_string()));
    }

    Ok(Notification::new(event.user_id, event.event_type, content, metadata).with_id(event.id))
}

/// 从用户事件装配通知
///
/// 接收者永远是 target_user_id，动作发起者只出现在元数据里。
/// 事件自带文案时优先使用（截断后），为空时落到该类型的默认文案。
pub fn build_user_notification(event: &UserEvent) -> Result<Notification> {
    let fallback = match event.event_type {
        EventType::UserFollowed => "你有了新的粉丝",
        EventType::UserUnfollowed => "有用户取消了对你的关注",
        EventType::UserMentioned => "有人在评论中提到了你",
        EventType::UserLogin => "你的账号刚刚在新设备上登录",
        other => {
            return Err(ServiceError::InvalidEventType {
                event_type: other.to_string(),
            });
        }
    };
    let content = if event.content.trim().is_empty() {
        fallback.to_string()
    } else {
        truncate(&event.content, MAX_PREVIEW_CHARS)
    };

    let mut metadata = event.metadata.clone();
    metadata.insert(
        "userId".to_string(),
        Value::String(event.user_id.to_string()),
    );

    Ok(
        Notification::new(event.target_user_id, event.event_type, content, metadata)
            .with_id(event.id),
    )
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_truncate_short_string_unchanged() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("", 5), "");
    }

    #[test]
    fn test_truncate_exact_length_unchanged() {
        assert_eq!(truncate("hello", 5), "hello");
    }

    #[test]
    fn test_truncate_long_string() {
        // 结果恰好 max 个字符，以省略号结尾
        assert_eq!(truncate("Hello world", 5), "He...");
        assert_eq!(truncate("Hello world", 5).chars().count(), 5);
    }

    #[test]
    fn test_truncate_cjk_by_chars_not_bytes() {
        // 中文按字符计数，不会截在多字节字符中间
        assert_eq!(truncate("春日骑行日记第一集", 6), "春日骑...");
        assert_eq!(truncate("春日骑行", 6), "春日骑行");
    }

    #[test]
    fn test_truncate_tiny_max_degenerates_to_dots() {
        assert_eq!(truncate("hello", 3), "...");
        assert_eq!(truncate("hello", 1), ".");
        assert_eq!(truncate("hello", 0), "");
    }

    #[test]
    fn test_video_uploaded_notification() {
        let video_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let event = VideoEvent::new(EventType::VideoUploaded, video_id, user_id, "春日骑行vlog");

        let notification = build_video_notification(&event).unwrap();

        assert_eq!(notification.user_id, user_id);
        assert_eq!(notification.notification_type, "VIDEO_UPLOADED");
        assert_eq!(
            notification.content,
            "你的视频《春日骑行vlog》已上传成功，正在处理中"
        );
        assert_eq!(
            notification.metadata.get("videoId").unwrap(),
            &Value::String(video_id.to_string())
        );
        assert!(!notification.is_read());
    }

    #[test]
    fn test_video_processed_and_deleted_templates() {
        let event = VideoEvent::new(
            EventType::VideoProcessed,
            Uuid::new_v4(),
            Uuid::new_v4(),
            "海边日落",
        );
        let notification = build_video_notification(&event).unwrap();
        assert_eq!(
            notification.content,
            "你的视频《海边日落》已处理完成，快去看看吧"
        );

        let event = VideoEvent::new(
            EventType::VideoDeleted,
            Uuid::new_v4(),
            Uuid::new_v4(),
            "海边日落",
        );
        let notification = build_video_notification(&event).unwrap();
        assert_eq!(notification.content, "你的视频《海边日落》已被删除");
    }

    #[test]
    fn test_video_long_title_is_truncated() {
        let long_title = "标".repeat(100);
        let event = VideoEvent::new(
            EventType::VideoUploaded,
            Uuid::new_v4(),
            Uuid::new_v4(),
            long_title,
        );

        let notification = build_video_notification(&event).unwrap();
        let truncated = format!("{}...", "标".repeat(MAX_TITLE_CHARS - 3));
        assert!(notification.content.contains(&truncated));
    }

    #[test]
    fn test_video_rejects_foreign_tag() {
        // 结构上是视频事件，却带了用户类标签
        let event = VideoEvent::new(
            EventType::UserFollowed,
            Uuid::new_v4(),
            Uuid::new_v4(),
            "标题",
        );

        let err = build_video_notification(&event).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidEventType { .. }));
    }

    #[test]
    fn test_comment_created_notification_with_preview() {
        let user_id = Uuid::new_v4();
        let event = CommentEvent::new(
            EventType::CommentCreated,
            Uuid::new_v4(),
            user_id,
            Uuid::new_v4(),
            "拍得真好，请问用的什么相机？",
        );

        let notification = build_comment_notification(&event).unwrap();
        assert_eq!(notification.user_id, user_id);
        assert_eq!(
            notification.content,
            "你的视频收到了新评论：拍得真好，请问用的什么相机？"
        );
        assert!(notification.metadata.contains_key("videoId"));
        assert!(notification.metadata.contains_key("commentId"));
        assert!(!notification.metadata.contains_key("parentId"));
    }

    #[test]
    fn test_comment_replied_includes_parent_metadata() {
        let comment_id = Uuid::new_v4();
        let parent_id = Uuid::new_v4();
        let event = CommentEvent::new(
            EventType::CommentReplied,
            comment_id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            "hi",
        )
        .with_parent(parent_id);

        let notification = build_comment_notification(&event).unwrap();
        assert_eq!(notification.content, "你的评论收到了新回复：hi");
        assert_eq!(
            notification.metadata.get("parentId").unwrap(),
            &Value::String(parent_id.to_string())
        );
        assert_eq!(
            notification.metadata.get("commentId").unwrap(),
            &Value::String(comment_id.to_string())
        );
    }

    #[test]
    fn test_comment_liked_has_fixed_content() {
        let event = CommentEvent::new(
            EventType::CommentLiked,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "这条内容不该出现在文案里",
        );

        let notification = build_comment_notification(&event).unwrap();
        assert_eq!(notification.content, "你的评论收到了新的点赞");
    }

    #[test]
    fn test_comment_long_preview_is_truncated() {
        let long_content = "评".repeat(80);
        let event = CommentEvent::new(
            EventType::CommentCreated,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            long_content,
        );

        let notification = build_comment_notification(&event).unwrap();
        assert!(notification.content.ends_with("..."));
    }

    #[test]
    fn test_user_followed_goes_to_target() {
        let actor = Uuid::new_v4();
        let target = Uuid::new_v4();
        let event = UserEvent::new(EventType::UserFollowed, actor, target, "");

        let notification = build_user_notification(&event).unwrap();
        // 接收者必须是被关注方，绝不是动作发起者
        assert_eq!(notification.user_id, target);
        assert_ne!(notification.user_id, actor);
        assert_eq!(notification.content, "你有了新的粉丝");
        assert_eq!(
            notification.metadata.get("userId").unwrap(),
            &Value::String(actor.to_string())
        );
    }

    #[test]
    fn test_user_event_default_contents() {
        let cases = [
            (EventType::UserUnfollowed, "有用户取消了对你的关注"),
            (EventType::UserMentioned, "有人在评论中提到了你"),
            (EventType::UserLogin, "你的账号刚刚在新设备上登录"),
        ];
        for (event_type, expected) in cases {
            let event = UserEvent::new(event_type, Uuid::new_v4(), Uuid::new_v4(), "");
            let notification = build_user_notification(&event).unwrap();
            assert_eq!(notification.content, expected);
        }
    }

    #[test]
    fn test_user_event_custom_content_wins() {
        let event = UserEvent::new(
            EventType::UserFollowed,
            Uuid::new_v4(),
            Uuid::new_v4(),
            "摄影爱好者小王关注了你",
        );

        let notification = build_user_notification(&event).unwrap();
        assert_eq!(notification.content, "摄影爱好者小王关注了你");
    }

    #[test]
    fn test_redelivered_event_builds_same_notification_id() {
        // 同一事件重复装配必须得到同一个通知主键，
        // 仓储的幂等写入才能在重复投递时吸收第二行
        let video = VideoEvent::new(
            EventType::VideoUploaded,
            Uuid::new_v4(),
            Uuid::new_v4(),
            "标题",
        );
        let first = build_video_notification(&video).unwrap();
        let second = build_video_notification(&video).unwrap();
        assert_eq!(first.id, video.id);
        assert_eq!(first.id, second.id);

        let comment = CommentEvent::new(
            EventType::CommentCreated,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "评论",
        );
        assert_eq!(build_comment_notification(&comment).unwrap().id, comment.id);

        let user = UserEvent::new(EventType::UserFollowed, Uuid::new_v4(), Uuid::new_v4(), "");
        assert_eq!(build_user_notification(&user).unwrap().id, user.id);
    }

    #[test]
    fn test_derived_metadata_wins_on_collision() {
        let video_id = Uuid::new_v4();
        let mut event = VideoEvent::new(
            EventType::VideoUploaded,
            video_id,
            Uuid::new_v4(),
            "标题",
        );
        // 事件自带的同名键会被派生键覆盖
        event
            .metadata
            .insert("videoId".to_string(), Value::String("bogus".to_string()));
        event
            .metadata
            .insert("source".to_string(), Value::String("mobile".to_string()));

        let notification = build_video_notification(&event).unwrap();
        assert_eq!(
            notification.metadata.get("videoId").unwrap(),
            &Value::String(video_id.to_string())
        );
        // 非派生键原样保留
        assert_eq!(
            notification.metadata.get("source").unwrap(),
            &Value::String("mobile".to_string())
        );
    }
}
