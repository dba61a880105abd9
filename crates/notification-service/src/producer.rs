//! 事件生产者
//!
//! 三个类目各有一个生产者，只接受本类目的事件结构体；跨类目负载在
//! 编译期不可表示，同结构体携带异类标签在发布前被拒绝。发布路径不做
//! 内部重试，序列化与投递失败原样包装后交给调用方处置。
//! `ProducerManager` 统一三个生产者的注册与启停。

use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use vclip_shared::config::{AppConfig, TopicsConfig};
use vclip_shared::error::NotifyError;
use vclip_shared::events::{CommentEvent, EventType, UserEvent, VideoEvent};
use vclip_shared::kafka::KafkaProducer;

use crate::error::{Result, ServiceError};

/// 停止时冲刷在途消息的等待上限
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// VideoEventProducer — 视频类事件
// ---------------------------------------------------------------------------

/// 视频事件生产者
///
/// 以 `video_id` 作为分区键，同一视频的事件按发布顺序投递。
pub struct VideoEventProducer {
    producer: KafkaProducer,
    topic: String,
    running: AtomicBool,
}

impl VideoEventProducer {
    pub fn new(producer: KafkaProducer, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
            running: AtomicBool::new(false),
        }
    }

    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::AlreadyRunning {
                component: "VideoEventProducer".to_string(),
            });
        }
        debug!(topic = %self.topic, "视频事件生产者已启动");
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 发布一条视频事件
    ///
    /// 缺省公共字段在此补齐；携带非视频类标签的事件直接拒绝。
    #[instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn publish(&self, mut event: VideoEvent) -> Result<()> {
        if !event.event_type.is_video() {
            return Err(ServiceError::InvalidEventType {
                event_type: event.event_type.to_string(),
            });
        }
        event.fill_defaults();

        let payload = serde_json::to_vec(&event).map_err(NotifyError::from)?;
        let (partition, offset) = self
            .producer
            .send_with_headers(
                &self.topic,
                &event.message_key(),
                &payload,
                &event.headers(),
                event.created_at.map(|t| t.timestamp_millis()),
            )
            .await?;

        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            video_id = %event.video_id,
            partition,
            offset,
            "视频事件已发布"
        );
        Ok(())
    }

    pub async fn publish_video_upload_event(
        &self,
        video_id: Uuid,
        user_id: Uuid,
        title: impl Into<String>,
    ) -> Result<()> {
        self.publish(VideoEvent::new(
            EventType::VideoUploaded,
            video_id,
            user_id,
            title,
        ))
        .await
    }

    pub async fn publish_video_processed_event(
        &self,
        video_id: Uuid,
        user_id: Uuid,
        title: impl Into<String>,
    ) -> Result<()> {
        self.publish(VideoEvent::new(
            EventType::VideoProcessed,
            video_id,
            user_id,
            title,
        ))
        .await
    }
}

// ---------------------------------------------------------------------------
// CommentEventProducer — 评论类事件
// ---------------------------------------------------------------------------

/// 评论事件生产者
///
/// 以 `comment_id` 作为分区键。`user_id` 是被通知方（视频作者或被
/// 回复者），由调用方在构造事件时解析好填入。
pub struct CommentEventProducer {
    producer: KafkaProducer,
    topic: String,
    running: AtomicBool,
}

impl CommentEventProducer {
    pub fn new(producer: KafkaProducer, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
            running: AtomicBool::new(false),
        }
    }

    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::AlreadyRunning {
                component: "CommentEventProducer".to_string(),
            });
        }
        debug!(topic = %self.topic, "评论事件生产者已启动");
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    #[instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn publish(&self, mut event: CommentEvent) -> Result<()> {
        if !event.event_type.is_comment() {
            return Err(ServiceError::InvalidEventType {
                event_type: event.event_type.to_string(),
            });
        }
        event.fill_defaults();

        let payload = serde_json::to_vec(&event).map_err(NotifyError::from)?;
        let (partition, offset) = self
            .producer
            .send_with_headers(
                &self.topic,
                &event.message_key(),
                &payload,
                &event.headers(),
                event.created_at.map(|t| t.timestamp_millis()),
            )
            .await?;

        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            comment_id = %event.comment_id,
            partition,
            offset,
            "评论事件已发布"
        );
        Ok(())
    }

    pub async fn publish_comment_created_event(
        &self,
        comment_id: Uuid,
        user_id: Uuid,
        video_id: Uuid,
        content: impl Into<String>,
    ) -> Result<()> {
        self.publish(CommentEvent::new(
            EventType::CommentCreated,
            comment_id,
            user_id,
            video_id,
            content,
        ))
        .await
    }

    pub async fn publish_comment_replied_event(
        &self,
        comment_id: Uuid,
        user_id: Uuid,
        video_id: Uuid,
        parent_id: Uuid,
        content: impl Into<String>,
    ) -> Result<()> {
        self.publish(
            CommentEvent::new(
                EventType::CommentReplied,
                comment_id,
                user_id,
                video_id,
                content,
            )
            .with_parent(parent_id),
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// UserEventProducer — 用户类事件
// ---------------------------------------------------------------------------

/// 用户事件生产者
///
/// 分区键是 `{动作方}-{接收方}`，同一对用户之间的事件保持顺序。
pub struct UserEventProducer {
    producer: KafkaProducer,
    topic: String,
    running: AtomicBool,
}

impl UserEventProducer {
    pub fn new(producer: KafkaProducer, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
            running: AtomicBool::new(false),
        }
    }

    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::AlreadyRunning {
                component: "UserEventProducer".to_string(),
            });
        }
        debug!(topic = %self.topic, "用户事件生产者已启动");
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    #[instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn publish(&self, mut event: UserEvent) -> Result<()> {
        if !event.event_type.is_user() {
            return Err(ServiceError::InvalidEventType {
                event_type: event.event_type.to_string(),
            });
        }
        event.fill_defaults();

        let payload = serde_json::to_vec(&event).map_err(NotifyError::from)?;
        let (partition, offset) = self
            .producer
            .send_with_headers(
                &self.topic,
                &event.message_key(),
                &payload,
                &event.headers(),
                event.created_at.map(|t| t.timestamp_millis()),
            )
            .await?;

        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            target_user_id = %event.target_user_id,
            partition,
            offset,
            "用户事件已发布"
        );
        Ok(())
    }

    pub async fn publish_follow_event(
        &self,
        user_id: Uuid,
        target_user_id: Uuid,
    ) -> Result<()> {
        self.publish(UserEvent::new(
            EventType::UserFollowed,
            user_id,
            target_user_id,
            "",
        ))
        .await
    }

    pub async fn publish_unfollow_event(
        &self,
        user_id: Uuid,
        target_user_id: Uuid,
    ) -> Result<()> {
        self.publish(UserEvent::new(
            EventType::UserUnfollowed,
            user_id,
            target_user_id,
            "",
        ))
        .await
    }

    pub async fn publish_mention_event(
        &self,
        user_id: Uuid,
        target_user_id: Uuid,
        content: impl Into<String>,
    ) -> Result<()> {
        self.publish(UserEvent::new(
            EventType::UserMentioned,
            user_id,
            target_user_id,
            content,
        ))
        .await
    }

    /// 登录提醒的接收者是登录者本人；content 为空时由消费端套用默认文案
    pub async fn publish_login_event(
        &self,
        user_id: Uuid,
        content: impl Into<String>,
    ) -> Result<()> {
        self.publish(UserEvent::new(EventType::UserLogin, user_id, user_id, content))
            .await
    }
}

// ---------------------------------------------------------------------------
// ProducerManager — 生产者生命周期管理
// ---------------------------------------------------------------------------

/// 已注册的三个类目生产者
#[derive(Clone)]
struct ProducerSet {
    video: Arc<VideoEventProducer>,
    comment: Arc<CommentEventProducer>,
    user: Arc<UserEventProducer>,
}

impl ProducerSet {
    fn new(producer: KafkaProducer, topics: &TopicsConfig) -> Self {
        Self {
            video: Arc::new(VideoEventProducer::new(
                producer.clone(),
                &topics.video_events,
            )),
            comment: Arc::new(CommentEventProducer::new(
                producer.clone(),
                &topics.comment_events,
            )),
            user: Arc::new(UserEventProducer::new(producer, &topics.user_events)),
        }
    }
}

/// 生产者管理器
///
/// 三个类目生产者共享同一个底层 Kafka 生产者，惰性注册一次。
/// 启动按 video、comment、user 顺序进行，任一失败则逆序回滚已启动的
/// 生产者，整体要么全部启动要么全部停止。
pub struct ProducerManager {
    producer: KafkaProducer,
    topics: TopicsConfig,
    producers: RwLock<Option<ProducerSet>>,
    /// 串行化 start/stop，注册与启停不会交错
    lifecycle: tokio::sync::Mutex<()>,
    running: AtomicBool,
}

impl ProducerManager {
    pub fn new(producer: KafkaProducer, config: &AppConfig) -> Self {
        Self {
            producer,
            topics: config.topics.clone(),
            producers: RwLock::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            running: AtomicBool::new(false),
        }
    }

    /// 惰性注册三个类目生产者，重复调用是空操作
    fn ensure_registered(&self) -> ProducerSet {
        let mut guard = self.producers.write();
        guard
            .get_or_insert_with(|| {
                debug!("注册事件生产者");
                ProducerSet::new(self.producer.clone(), &self.topics)
            })
            .clone()
    }

    /// 启动全部生产者，全有或全无
    pub async fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.running.load(Ordering::SeqCst) {
            return Err(ServiceError::AlreadyRunning {
                component: "ProducerManager".to_string(),
            });
        }

        let set = self.ensure_registered();

        set.video.start()?;
        if let Err(e) = set.comment.start() {
            warn!(error = %e, "评论事件生产者启动失败，回滚已启动的生产者");
            let _ = set.video.stop();
            return Err(e);
        }
        if let Err(e) = set.user.start() {
            warn!(error = %e, "用户事件生产者启动失败，回滚已启动的生产者");
            let _ = set.comment.stop();
            let _ = set.video.stop();
            return Err(e);
        }

        self.running.store(true, Ordering::SeqCst);
        info!("事件生产者已全部启动");
        Ok(())
    }

    /// 停止全部生产者并冲刷在途消息
    ///
    /// 尽力而为：单个失败记录日志后继续，最终返回最后一个错误。
    pub async fn stop(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut last_err: Option<ServiceError> = None;
        if let Some(set) = self.producers.read().clone() {
            // 与启动顺序相反
            for (name, result) in [
                ("UserEventProducer", set.user.stop()),
                ("CommentEventProducer", set.comment.stop()),
                ("VideoEventProducer", set.video.stop()),
            ] {
                if let Err(e) = result {
                    warn!(component = name, error = %e, "生产者停止失败");
                    last_err = Some(e);
                }
            }
        }

        if let Err(e) = self.producer.flush(FLUSH_TIMEOUT) {
            warn!(error = %e, "冲刷共享生产者失败");
            last_err = Some(e.into());
        }

        self.running.store(false, Ordering::SeqCst);
        info!("事件生产者已全部停止");
        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn video_producer(&self) -> Result<Arc<VideoEventProducer>> {
        self.producers
            .read()
            .as_ref()
            .map(|set| set.video.clone())
            .ok_or_else(|| ServiceError::Configuration("视频事件生产者尚未注册".to_string()))
    }

    pub fn comment_producer(&self) -> Result<Arc<CommentEventProducer>> {
        self.producers
            .read()
            .as_ref()
            .map(|set| set.comment.clone())
            .ok_or_else(|| ServiceError::Configuration("评论事件生产者尚未注册".to_string()))
    }

    pub fn user_producer(&self) -> Result<Arc<UserEventProducer>> {
        self.producers
            .read()
            .as_ref()
            .map(|set| set.user.clone())
            .ok_or_else(|| ServiceError::Configuration("用户事件生产者尚未注册".to_string()))
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
