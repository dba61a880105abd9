//! 事件消费者
//!
//! 三个类目消费者把事件物化为通知：解码、去重、按类目模板生成文案、
//! 持久化、提交偏移量。处理失败的消息按投递预算进入重投或死信 topic，
//! 由重投消费者在退避时间到达后发回原始 topic。
//! 消费者是显式状态机（Stopped → Starting → Running → Stopping），
//! `ConsumerManager` 负责全有或全无的启动与尽力而为的停止。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vclip_shared::cache::{Cache, CacheKey};
use vclip_shared::config::{AppConfig, TopicsConfig};
use vclip_shared::dlq::{DeadLetterMessage, DlqRouter};
use vclip_shared::error::NotifyError;
use vclip_shared::events::{CommentEvent, EventCategory, UserEvent, VideoEvent};
use vclip_shared::kafka::{ConsumerMessage, KafkaConsumer, KafkaProducer};

use crate::content::{
    build_comment_notification, build_user_notification, build_video_notification,
};
use crate::error::{Result, ServiceError};
use crate::repository::NotificationStore;

/// 拉取失败后的短暂退避，避免对不可用的 broker 空转
const RECV_RETRY_DELAY: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// ConsumerState — 消费者状态机
// ---------------------------------------------------------------------------

/// 消费者生命周期状态
///
/// Stopped 是初始态也是终态，停止后的消费者可以再次启动。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

// ---------------------------------------------------------------------------
// EventConsumer — 类目事件消费者
// ---------------------------------------------------------------------------

/// 消费处理过程共享的依赖
struct ConsumerContext {
    store: Arc<dyn NotificationStore>,
    cache: Cache,
    dlq: DlqRouter,
    /// 去重窗口时长
    dedup_ttl: Duration,
}

/// 类目事件消费者
///
/// 一个实例订阅一个类目 topic，以类目名作消费组后缀，同类目的多个
/// 实例按消费组语义分摊分区。接收循环运行在独立任务里，停止时等待
/// 任务汇合，保证 `stop` 返回后不再发生持久化调用。
pub struct EventConsumer {
    category: EventCategory,
    config: Arc<AppConfig>,
    ctx: Arc<ConsumerContext>,
    state: Mutex<ConsumerState>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl EventConsumer {
    pub fn new(
        category: EventCategory,
        config: Arc<AppConfig>,
        store: Arc<dyn NotificationStore>,
        cache: Cache,
        producer: KafkaProducer,
    ) -> Self {
        let ctx = ConsumerContext {
            store,
            cache,
            dlq: DlqRouter::new(producer, &config),
            dedup_ttl: Duration::from_secs(config.notifications.dedup_window_seconds),
        };
        Self {
            category,
            config,
            ctx: Arc::new(ctx),
            state: Mutex::new(ConsumerState::Stopped),
            shutdown_tx: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// 启动消费者并订阅类目 topic
    ///
    /// 只有 Stopped 态可以启动；订阅成功、接收任务就位后进入 Running，
    /// 中途任何失败都回退到 Stopped。
    pub fn start(&self, parent_shutdown: watch::Receiver<bool>) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != ConsumerState::Stopped {
                return Err(ServiceError::AlreadyRunning {
                    component: format!("{}-consumer", self.category),
                });
            }
            *state = ConsumerState::Starting;
        }

        let consumer = match KafkaConsumer::new(&self.config.kafka, Some(self.category.as_str()))
        {
            Ok(consumer) => consumer,
            Err(e) => {
                *self.state.lock() = ConsumerState::Stopped;
                return Err(e.into());
            }
        };

        let topic = category_topic(&self.config.topics, self.category);
        if let Err(e) = consumer.subscribe(&[topic]) {
            *self.state.lock() = ConsumerState::Stopped;
            return Err(e.into());
        }

        // 自有关闭通道与调用方的全局通道并联，两者任一触发循环都会退出
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(receive_loop(
            self.category,
            consumer,
            self.ctx.clone(),
            parent_shutdown,
            shutdown_rx,
        ));

        *self.shutdown_tx.lock() = Some(shutdown_tx);
        *self.handle.lock() = Some(handle);
        *self.state.lock() = ConsumerState::Running;

        info!(category = %self.category, topic, "事件消费者已启动");
        Ok(())
    }

    /// 停止消费者，等待接收任务汇合
    ///
    /// 非 Running 态下是空操作。返回后不会再有本消费者发起的持久化调用。
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != ConsumerState::Running {
                return Ok(());
            }
            *state = ConsumerState::Stopping;
        }

        let shutdown_tx = self.shutdown_tx.lock().take();
        if let Some(tx) = shutdown_tx {
            // 循环可能已因全局关闭信号退出，接收端不在也无妨
            let _ = tx.send(true);
        }

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(category = %self.category, error = %e, "消费任务异常结束");
            }
        }

        *self.state.lock() = ConsumerState::Stopped;
        info!(category = %self.category, "事件消费者已停止");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        *self.state.lock() == ConsumerState::Running
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.lock()
    }
}

/// 类目对应的事件 topic
fn category_topic(topics: &TopicsConfig, category: EventCategory) -> &str {
    match category {
        EventCategory::Video => &topics.video_events,
        EventCategory::Comment => &topics.comment_events,
        EventCategory::User => &topics.user_events,
    }
}

/// 类目消费接收循环
///
/// 关闭信号优先于消息处理；拉取失败短暂退避后重试，
/// 避免单次 broker 抖动终止整个消费者。
async fn receive_loop(
    category: EventCategory,
    consumer: KafkaConsumer,
    ctx: Arc<ConsumerContext>,
    mut parent_shutdown: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(category = %category, "事件消费循环已启动");

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                // 发送端关闭视同收到关闭信号
                if changed.is_err() || *shutdown.borrow() {
                    info!(category = %category, "收到停止信号，事件消费循环退出");
                    break;
                }
            }

            changed = parent_shutdown.changed() => {
                if changed.is_err() || *parent_shutdown.borrow() {
                    info!(category = %category, "收到全局关闭信号，事件消费循环退出");
                    break;
                }
            }

            received = consumer.recv() => {
                match received {
                    Ok(msg) => handle_event_message(category, &consumer, &ctx, msg).await,
                    Err(e) => {
                        warn!(category = %category, error = %e, "拉取消息失败，稍后重试");
                        tokio::time::sleep(RECV_RETRY_DELAY).await;
                    }
                }
            }
        }
    }
}

/// 处理单条消息并完成提交或失败路由
///
/// 处理成功提交偏移量；失败时先把信封写入重投/死信 topic 再提交，
/// 信封写入失败则保留偏移量，消息等待重新投递。
async fn handle_event_message(
    category: EventCategory,
    consumer: &KafkaConsumer,
    ctx: &ConsumerContext,
    msg: ConsumerMessage,
) {
    debug!(
        category = %category,
        topic = %msg.topic,
        partition = msg.partition,
        offset = msg.offset,
        "收到事件消息"
    );

    match process_event(category, ctx, &msg).await {
        Ok(()) => {
            if let Err(e) = consumer.commit(&msg) {
                warn!(
                    category = %category,
                    partition = msg.partition,
                    offset = msg.offset,
                    error = %e,
                    "提交偏移量失败"
                );
            }
        }
        Err(e) => {
            error!(
                category = %category,
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                delivery_count = msg.delivery_count(),
                error = %e,
                "处理事件消息失败"
            );

            let message_id = failed_message_id(&msg);
            match ctx.dlq.route(&msg, &message_id, &e.to_string()).await {
                Ok(_) => {
                    if let Err(commit_err) = consumer.commit(&msg) {
                        warn!(
                            category = %category,
                            partition = msg.partition,
                            offset = msg.offset,
                            error = %commit_err,
                            "提交偏移量失败"
                        );
                    }
                }
                Err(route_err) => {
                    error!(
                        category = %category,
                        message_id,
                        error = %route_err,
                        "失败消息路由未完成，保留偏移量等待重新投递"
                    );
                }
            }
        }
    }
}

/// 消息处理核心：解码、去重、生成文案、持久化
///
/// 拆分为独立函数而非方法，便于在测试中直接调用。
/// 返回 Err 表示本次投递失败，由调用方按投递预算路由。
async fn process_event(
    category: EventCategory,
    ctx: &ConsumerContext,
    msg: &ConsumerMessage,
) -> Result<()> {
    let (event_id, event_type, notification) = match category {
        EventCategory::Video => {
            let event: VideoEvent = msg.deserialize_payload()?;
            (event.id, event.event_type, build_video_notification(&event)?)
        }
        EventCategory::Comment => {
            let event: CommentEvent = msg.deserialize_payload()?;
            (event.id, event.event_type, build_comment_notification(&event)?)
        }
        EventCategory::User => {
            let event: UserEvent = msg.deserialize_payload()?;
            (event.id, event.event_type, build_user_notification(&event)?)
        }
    };

    if is_duplicate(&ctx.cache, event_id).await {
        debug!(
            event_id = %event_id,
            event_type = %event_type,
            "事件已在去重窗口内处理过，直接确认"
        );
        return Ok(());
    }

    ctx.store.save_notification(&notification).await?;

    // 持久化成功后才登记去重键：先登记的话，持久化失败的重投会被误判为重复
    claim_dedup(&ctx.cache, event_id, ctx.dedup_ttl).await;

    info!(
        event_id = %event_id,
        event_type = %event_type,
        notification_id = %notification.id,
        user_id = %notification.user_id,
        "事件已物化为通知"
    );
    Ok(())
}

/// 路由信封的消息 ID：优先负载里的事件 id，解析不出时退回物理坐标
fn failed_message_id(msg: &ConsumerMessage) -> String {
    #[derive(serde::Deserialize)]
    struct IdProbe {
        #[serde(default)]
        id: Option<Uuid>,
    }

    serde_json::from_slice::<IdProbe>(&msg.payload)
        .ok()
        .and_then(|probe| probe.id)
        .map(|id| id.to_string())
        .unwrap_or_else(|| format!("{}-{}-{}", msg.topic, msg.partition, msg.offset))
}

/// 去重窗口检查，Redis 故障按未重复处理
async fn is_duplicate(cache: &Cache, event_id: Uuid) -> bool {
    let key = CacheKey::event_dedup(&event_id.to_string());
    match cache.exists(&key).await {
        Ok(seen) => seen,
        Err(e) => {
            warn!(event_id = %event_id, error = %e, "去重检查失败，按未重复继续处理");
            false
        }
    }
}

/// 持久化成功后登记去重键，失败只记告警
async fn claim_dedup(cache: &Cache, event_id: Uuid, ttl: Duration) {
    let key = CacheKey::event_dedup(&event_id.to_string());
    if let Err(e) = cache.set_nx(&key, &Utc::now().timestamp(), ttl).await {
        warn!(event_id = %event_id, error = %e, "登记去重键失败");
    }
}

// ---------------------------------------------------------------------------
// RetryQueueConsumer — 重投消费者
// ---------------------------------------------------------------------------

/// 重投消费者
///
/// 订阅重投 topic，等信封里的重投时间到达后把原始负载发回原始
/// topic，投递次数 header 加一。损坏的信封直接转入死信 topic。
pub struct RetryQueueConsumer {
    config: Arc<AppConfig>,
    producer: KafkaProducer,
    state: Mutex<ConsumerState>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// 单条重投消息的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryOutcome {
    /// 已发回原始 topic
    Redelivered,
    /// 已转入死信 topic
    DeadLettered,
    /// 等待期间收到关闭信号，消息未处理完
    Interrupted,
}

impl RetryQueueConsumer {
    pub fn new(config: Arc<AppConfig>, producer: KafkaProducer) -> Self {
        Self {
            config,
            producer,
            state: Mutex::new(ConsumerState::Stopped),
            shutdown_tx: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    pub fn start(&self, parent_shutdown: watch::Receiver<bool>) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != ConsumerState::Stopped {
                return Err(ServiceError::AlreadyRunning {
                    component: "RetryQueueConsumer".to_string(),
                });
            }
            *state = ConsumerState::Starting;
        }

        let consumer = match KafkaConsumer::new(&self.config.kafka, Some("retry")) {
            Ok(consumer) => consumer,
            Err(e) => {
                *self.state.lock() = ConsumerState::Stopped;
                return Err(e.into());
            }
        };

        if let Err(e) = consumer.subscribe(&[&self.config.topics.retry_queue]) {
            *self.state.lock() = ConsumerState::Stopped;
            return Err(e.into());
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(retry_loop(
            consumer,
            self.producer.clone(),
            self.config.topics.dead_letter.clone(),
            parent_shutdown,
            shutdown_rx,
        ));

        *self.shutdown_tx.lock() = Some(shutdown_tx);
        *self.handle.lock() = Some(handle);
        *self.state.lock() = ConsumerState::Running;

        info!(topic = %self.config.topics.retry_queue, "重投消费者已启动");
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != ConsumerState::Running {
                return Ok(());
            }
            *state = ConsumerState::Stopping;
        }

        let shutdown_tx = self.shutdown_tx.lock().take();
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(true);
        }

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "重投消费任务异常结束");
            }
        }

        *self.state.lock() = ConsumerState::Stopped;
        info!("重投消费者已停止");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        *self.state.lock() == ConsumerState::Running
    }
}

/// 重投消费接收循环
async fn retry_loop(
    consumer: KafkaConsumer,
    producer: KafkaProducer,
    dead_letter_topic: String,
    mut parent_shutdown: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("重投消费循环已启动");

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("收到停止信号，重投消费循环退出");
                    break;
                }
            }

            changed = parent_shutdown.changed() => {
                if changed.is_err() || *parent_shutdown.borrow() {
                    info!("收到全局关闭信号，重投消费循环退出");
                    break;
                }
            }

            received = consumer.recv() => {
                match received {
                    Ok(msg) => {
                        let outcome = handle_retry_message(
                            &producer,
                            &dead_letter_topic,
                            &msg,
                            &mut shutdown,
                            &mut parent_shutdown,
                        )
                        .await;

                        match outcome {
                            Ok(RetryOutcome::Redelivered | RetryOutcome::DeadLettered) => {
                                if let Err(e) = consumer.commit(&msg) {
                                    warn!(
                                        partition = msg.partition,
                                        offset = msg.offset,
                                        error = %e,
                                        "提交偏移量失败"
                                    );
                                }
                            }
                            Ok(RetryOutcome::Interrupted) => {
                                // 未提交偏移量，重启后消息会重新投递
                                info!("重投等待被关闭信号打断，消费循环退出");
                                break;
                            }
                            Err(e) => {
                                error!(
                                    partition = msg.partition,
                                    offset = msg.offset,
                                    error = %e,
                                    "转发重投消息失败，保留偏移量等待重新投递"
                                );
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "拉取重投消息失败，稍后重试");
                        tokio::time::sleep(RECV_RETRY_DELAY).await;
                    }
                }
            }
        }
    }
}

/// 处理单条重投信封
///
/// 等待到重投时间点后把原始负载按原始分区键发回原始 topic；
/// 等待可被关闭信号打断，此时不提交偏移量。
async fn handle_retry_message(
    producer: &KafkaProducer,
    dead_letter_topic: &str,
    msg: &ConsumerMessage,
    shutdown: &mut watch::Receiver<bool>,
    parent_shutdown: &mut watch::Receiver<bool>,
) -> std::result::Result<RetryOutcome, NotifyError> {
    let envelope: DeadLetterMessage = match msg.deserialize_payload() {
        Ok(envelope) => envelope,
        Err(e) => {
            // 信封本身损坏，没有重投依据，原样转入死信保留现场
            warn!(
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                error = %e,
                "重投信封无法解析，转入死信 topic"
            );
            let key = msg
                .key
                .clone()
                .unwrap_or_else(|| format!("{}-{}-{}", msg.topic, msg.partition, msg.offset));
            producer.send(dead_letter_topic, &key, &msg.payload).await?;
            return Ok(RetryOutcome::DeadLettered);
        }
    };

    if envelope.is_exhausted() {
        // 预算已尽的信封不该出现在重投 topic，转入死信兜底
        producer
            .send_json(dead_letter_topic, &envelope.message_id, &envelope)
            .await?;
        error!(
            message_id = %envelope.message_id,
            delivery_count = envelope.delivery_count,
            "重投信封已耗尽投递预算，转入死信 topic"
        );
        return Ok(RetryOutcome::DeadLettered);
    }

    let wait = redelivery_wait(&envelope, Utc::now());
    if !wait.is_zero() {
        debug!(
            message_id = %envelope.message_id,
            wait_ms = wait.as_millis() as u64,
            "等待重投时间点"
        );
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(RetryOutcome::Interrupted);
                    }
                }

                changed = parent_shutdown.changed() => {
                    if changed.is_err() || *parent_shutdown.borrow() {
                        return Ok(RetryOutcome::Interrupted);
                    }
                }

                _ = tokio::time::sleep_until(deadline) => break,
            }
        }
    }

    let key = envelope
        .message_key
        .clone()
        .unwrap_or_else(|| envelope.message_id.clone());
    producer
        .send_with_headers(
            &envelope.source_topic,
            &key,
            envelope.payload.as_bytes(),
            &envelope.redeliver_headers(),
            None,
        )
        .await?;

    info!(
        message_id = %envelope.message_id,
        source_topic = %envelope.source_topic,
        delivery_count = envelope.delivery_count + 1,
        "消息已重新投回原始 topic"
    );
    Ok(RetryOutcome::Redelivered)
}

/// 距离重投时间点的剩余等待；已到期或无重投时间时为零
fn redelivery_wait(envelope: &DeadLetterMessage, now: DateTime<Utc>) -> Duration {
    match envelope.next_retry_at {
        Some(at) if at > now => (at - now).to_std().unwrap_or(Duration::ZERO),
        _ => Duration::ZERO,
    }
}

// ---------------------------------------------------------------------------
// ConsumerManager — 消费者生命周期管理
// ---------------------------------------------------------------------------

/// 已注册的消费者集合：三个类目消费者加重投消费者
#[derive(Clone)]
struct ConsumerSet {
    video: Arc<EventConsumer>,
    comment: Arc<EventConsumer>,
    user: Arc<EventConsumer>,
    retry: Arc<RetryQueueConsumer>,
}

/// 消费者管理器
///
/// 惰性注册一次全部消费者。启动按 video、comment、user、retry 顺序，
/// 任一失败则逆序停掉已启动的消费者再返回错误；停止尽力而为，
/// 逐个停掉所有消费者并返回最后一个错误。
pub struct ConsumerManager {
    config: Arc<AppConfig>,
    store: Arc<dyn NotificationStore>,
    cache: Cache,
    producer: KafkaProducer,
    consumers: RwLock<Option<ConsumerSet>>,
    /// 串行化 start/stop
    lifecycle: tokio::sync::Mutex<()>,
    running: AtomicBool,
}

impl ConsumerManager {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn NotificationStore>,
        cache: Cache,
        producer: KafkaProducer,
    ) -> Self {
        Self {
            config,
            store,
            cache,
            producer,
            consumers: RwLock::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            running: AtomicBool::new(false),
        }
    }

    /// 惰性注册全部消费者，重复调用是空操作
    fn ensure_registered(&self) -> ConsumerSet {
        let mut guard = self.consumers.write();
        guard
            .get_or_insert_with(|| {
                debug!("注册事件消费者");
                let event_consumer = |category| {
                    Arc::new(EventConsumer::new(
                        category,
                        self.config.clone(),
                        self.store.clone(),
                        self.cache.clone(),
                        self.producer.clone(),
                    ))
                };
                ConsumerSet {
                    video: event_consumer(EventCategory::Video),
                    comment: event_consumer(EventCategory::Comment),
                    user: event_consumer(EventCategory::User),
                    retry: Arc::new(RetryQueueConsumer::new(
                        self.config.clone(),
                        self.producer.clone(),
                    )),
                }
            })
            .clone()
    }

    /// 启动全部消费者，全有或全无
    pub async fn start(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.running.load(Ordering::SeqCst) {
            return Err(ServiceError::AlreadyRunning {
                component: "ConsumerManager".to_string(),
            });
        }

        let set = self.ensure_registered();

        set.video.start(shutdown.clone())?;
        if let Err(e) = set.comment.start(shutdown.clone()) {
            warn!(error = %e, "评论消费者启动失败，回滚已启动的消费者");
            let _ = set.video.stop().await;
            return Err(e);
        }
        if let Err(e) = set.user.start(shutdown.clone()) {
            warn!(error = %e, "用户消费者启动失败，回滚已启动的消费者");
            let _ = set.comment.stop().await;
            let _ = set.video.stop().await;
            return Err(e);
        }
        if let Err(e) = set.retry.start(shutdown) {
            warn!(error = %e, "重投消费者启动失败，回滚已启动的消费者");
            let _ = set.user.stop().await;
            let _ = set.comment.stop().await;
            let _ = set.video.stop().await;
            return Err(e);
        }

        self.running.store(true, Ordering::SeqCst);
        info!("事件消费者已全部启动");
        Ok(())
    }

    /// 停止全部消费者，与启动顺序相反
    ///
    /// 尽力而为：单个失败记录日志后继续，最终返回最后一个错误。
    pub async fn stop(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut last_err: Option<ServiceError> = None;
        if let Some(set) = self.consumers.read().clone() {
            if let Err(e) = set.retry.stop().await {
                warn!(component = "RetryQueueConsumer", error = %e, "消费者停止失败");
                last_err = Some(e);
            }
            if let Err(e) = set.user.stop().await {
                warn!(component = "user-consumer", error = %e, "消费者停止失败");
                last_err = Some(e);
            }
            if let Err(e) = set.comment.stop().await {
                warn!(component = "comment-consumer", error = %e, "消费者停止失败");
                last_err = Some(e);
            }
            if let Err(e) = set.video.stop().await {
                warn!(component = "video-consumer", error = %e, "消费者停止失败");
                last_err = Some(e);
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("事件消费者已全部停止");
        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
