//! 通知服务门面
//!
//! 上层（HTTP 层、其他领域模块）只与该门面交互：发布按类型标签分发到
//! 对应生产者，读写透传给存储。服务可整体禁用（所有发布静默忽略），
//! 启用态下生产者启动失败是致命错误，消费者启动失败则降级为只发布
//! 模式继续运行。

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vclip_shared::cache::Cache;
use vclip_shared::config::AppConfig;
use vclip_shared::events::{CommentEvent, EventType, UserEvent, VideoEvent};
use vclip_shared::kafka::KafkaProducer;
use vclip_shared::notification::Notification;

use crate::consumer::ConsumerManager;
use crate::error::{Result, ServiceError};
use crate::producer::ProducerManager;
use crate::repository::NotificationStore;

// ---------------------------------------------------------------------------
// NotificationService
// ---------------------------------------------------------------------------

/// 启用态下的运行组件
struct ServiceRuntime {
    producers: ProducerManager,
    consumers: ConsumerManager,
    /// 全局关闭信号，关闭时让所有消费循环并行开始退出
    shutdown_tx: watch::Sender<bool>,
    /// 消费者是否成功启动；false 表示只发布模式
    consuming: bool,
}

/// 通知服务门面
pub struct NotificationService {
    store: Option<Arc<dyn NotificationStore>>,
    runtime: Option<ServiceRuntime>,
}

impl NotificationService {
    /// 装配通知服务
    ///
    /// 禁用态（配置开关关闭）不建立任何 broker 连接；启用态要求提供
    /// 存储，生产者启动失败直接返回错误，消费者启动失败记告警后以
    /// 只发布模式继续。
    pub async fn new(
        config: Arc<AppConfig>,
        store: Option<Arc<dyn NotificationStore>>,
        cache: Cache,
    ) -> Result<Self> {
        if !config.notifications.enabled {
            debug!("通知服务未启用，所有发布调用将被忽略");
            return Ok(Self {
                store,
                runtime: None,
            });
        }

        let Some(enabled_store) = store.clone() else {
            return Err(ServiceError::Configuration(
                "启用通知服务必须提供通知存储".to_string(),
            ));
        };

        // 发布能力是硬性要求，任何失败直接向上抛
        let producer = KafkaProducer::new(&config.kafka)?;
        let producers = ProducerManager::new(producer.clone(), &config);
        producers.start().await?;

        // 消费能力尽力而为：启动失败的话事件仍可发布，由其他实例消费
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let consumers = ConsumerManager::new(config, enabled_store, cache, producer);
        let consuming = match consumers.start(shutdown_rx).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "事件消费者启动失败，服务以只发布模式运行");
                false
            }
        };

        info!(consuming, "通知服务已启动");
        Ok(Self {
            store,
            runtime: Some(ServiceRuntime {
                producers,
                consumers,
                shutdown_tx,
                consuming,
            }),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.runtime.is_some()
    }

    /// 是否在本进程内消费事件（只发布模式下为 false）
    pub fn is_consuming(&self) -> bool {
        self.runtime
            .as_ref()
            .is_some_and(|runtime| runtime.consuming)
    }

    // -----------------------------------------------------------------------
    // 发布
    // -----------------------------------------------------------------------

    /// 发布视频事件
    ///
    /// 只接受服务对外开放的标签；VIDEO_DELETED 由视频域自己的管线发出，
    /// 这里不提供发布入口。
    pub async fn publish_video_event(&self, mut event: VideoEvent) -> Result<()> {
        let Some(runtime) = &self.runtime else {
            debug!(event_type = %event.event_type, "通知服务未启用，忽略视频事件发布");
            return Ok(());
        };
        event.fill_defaults();

        match event.event_type {
            EventType::VideoUploaded | EventType::VideoProcessed => {
                runtime.producers.video_producer()?.publish(event).await
            }
            other => Err(ServiceError::UnsupportedEventType {
                event_type: other.to_string(),
            }),
        }
    }

    /// 发布评论事件
    pub async fn publish_comment_event(&self, mut event: CommentEvent) -> Result<()> {
        let Some(runtime) = &self.runtime else {
            debug!(event_type = %event.event_type, "通知服务未启用，忽略评论事件发布");
            return Ok(());
        };
        event.fill_defaults();

        match event.event_type {
            EventType::CommentCreated | EventType::CommentReplied => {
                runtime.producers.comment_producer()?.publish(event).await
            }
            other => Err(ServiceError::UnsupportedEventType {
                event_type: other.to_string(),
            }),
        }
    }

    /// 发布用户事件
    pub async fn publish_user_event(&self, mut event: UserEvent) -> Result<()> {
        let Some(runtime) = &self.runtime else {
            debug!(event_type = %event.event_type, "通知服务未启用，忽略用户事件发布");
            return Ok(());
        };
        event.fill_defaults();

        match event.event_type {
            EventType::UserFollowed
            | EventType::UserUnfollowed
            | EventType::UserMentioned
            | EventType::UserLogin => runtime.producers.user_producer()?.publish(event).await,
            other => Err(ServiceError::UnsupportedEventType {
                event_type: other.to_string(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // 读写透传
    // -----------------------------------------------------------------------

    /// 分页读取用户通知，按创建时间倒序
    pub async fn get_user_notifications(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>> {
        match &self.store {
            Some(store) => Ok(store.list_user_notifications(user_id, limit, offset).await?),
            None => {
                debug!(user_id = %user_id, "未配置通知存储，返回空列表");
                Ok(Vec::new())
            }
        }
    }

    /// 用户未读通知数
    pub async fn get_unread_count(&self, user_id: Uuid) -> Result<i64> {
        match &self.store {
            Some(store) => Ok(store.unread_count(user_id).await?),
            None => {
                debug!(user_id = %user_id, "未配置通知存储，未读数记为 0");
                Ok(0)
            }
        }
    }

    /// 标记单条通知已读
    pub async fn mark_as_read(&self, id: Uuid) -> Result<()> {
        match &self.store {
            Some(store) => Ok(store.mark_as_read(id).await?),
            None => {
                debug!(notification_id = %id, "未配置通知存储，忽略已读标记");
                Ok(())
            }
        }
    }

    /// 标记用户全部通知已读
    pub async fn mark_all_as_read(&self, user_id: Uuid) -> Result<()> {
        match &self.store {
            Some(store) => Ok(store.mark_all_as_read(user_id).await?),
            None => {
                debug!(user_id = %user_id, "未配置通知存储，忽略全量已读标记");
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------------
    // 关闭
    // -----------------------------------------------------------------------

    /// 关闭服务：先停消费者再停生产者
    ///
    /// 单个步骤的失败只记录日志，不中断后续步骤。可重复调用。
    pub async fn close(&self) {
        let Some(runtime) = &self.runtime else {
            debug!("通知服务未启用，无需关闭");
            return;
        };

        // 先广播关闭信号，让所有消费循环并行开始退出
        let _ = runtime.shutdown_tx.send(true);

        if let Err(e) = runtime.consumers.stop().await {
            warn!(error = %e, "停止事件消费者时出错");
        }
        if let Err(e) = runtime.producers.stop().await {
            warn!(error = %e, "停止事件生产者时出错");
        }

        info!("通知服务已关闭");
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
