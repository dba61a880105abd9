//! 失败消息的重投与死信路由
//!
//! Kafka 不原生跟踪单条消息的投递次数，也没有内置死信队列。
//! 这里用信封 + header 显式补齐：处理失败的消息被包进 `DeadLetterMessage`
//! 信封，按剩余投递预算路由到重投 topic（延迟后发回原始 topic）
//! 或死信 topic（记录日志等待人工介入）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::config::AppConfig;
use crate::error::NotifyError;
use crate::kafka::{ConsumerMessage, DELIVERY_COUNT_HEADER, KafkaProducer};
use crate::retry::RetryPolicy;

/// 单条消息的投递预算
///
/// 计入首次投递：第 3 次投递仍失败即进入死信 topic。
pub const MAX_DELIVERY_ATTEMPTS: u32 = 3;

// ---------------------------------------------------------------------------
// DeadLetterMessage — 失败消息信封
// ---------------------------------------------------------------------------

/// 失败消息信封
///
/// 包装原始消息，附加失败原因、投递次数等元数据。
/// 重投消费者根据信封决定何时将原始负载发回原始 topic；
/// 死信 topic 里的信封保留完整现场供人工排查。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterMessage {
    /// 原始消息 ID（如事件 ID）
    pub message_id: String,
    /// 原始 topic
    pub source_topic: String,
    /// 原始消息的分区键，重投时沿用以保持同主体的顺序
    #[serde(default)]
    pub message_key: Option<String>,
    /// 原始消息内容（JSON 序列化的字符串）
    pub payload: String,
    /// 失败原因
    pub error: String,
    /// 已投递次数（含首次投递）
    pub delivery_count: u32,
    /// 投递次数上限
    pub max_deliveries: u32,
    /// 首次失败时间
    pub first_failed_at: DateTime<Utc>,
    /// 最近失败时间
    pub last_failed_at: DateTime<Utc>,
    /// 下次重投时间（None 表示不再重投）
    pub next_retry_at: Option<DateTime<Utc>>,
    /// 来源服务
    pub source_service: String,
}

impl DeadLetterMessage {
    /// 从处理失败的消息构造信封
    ///
    /// 投递次数取自消息 header（首次投递为 1），重投间隔按退避策略
    /// 随投递次数递增。已耗尽预算时 next_retry_at 置为 None。
    pub fn from_failed(
        msg: &ConsumerMessage,
        message_id: impl Into<String>,
        error: impl Into<String>,
        retry_policy: &RetryPolicy,
        source_service: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let delivery_count = msg.delivery_count();

        let next_retry_at = if delivery_count >= MAX_DELIVERY_ATTEMPTS {
            None
        } else {
            let delay = retry_policy.delay_for_attempt(delivery_count.saturating_sub(1));
            Some(now + chrono::Duration::from_std(delay).unwrap_or_default())
        };

        // 负载本该是我们自己生产的 JSON；这里处于失败路径，
        // 编码异常不应再阻断兜底投递，按有损转换保留现场
        let payload = String::from_utf8_lossy(&msg.payload).into_owned();

        Self {
            message_id: message_id.into(),
            source_topic: msg.topic.clone(),
            message_key: msg.key.clone(),
            payload,
            error: error.into(),
            delivery_count,
            max_deliveries: MAX_DELIVERY_ATTEMPTS,
            first_failed_at: now,
            last_failed_at: now,
            next_retry_at,
            source_service: source_service.into(),
        }
    }

    /// 是否已耗尽投递预算
    pub fn is_exhausted(&self) -> bool {
        self.delivery_count >= self.max_deliveries
    }

    /// 重投时间是否已到达
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at.is_none_or(|at| now >= at)
    }

    /// 重投时携带的 header：投递次数加一
    ///
    /// 原始 topic 的消费者从该 header 读出累计投递次数，
    /// 再次失败时据此判断是否还有重投机会。
    pub fn redeliver_headers(&self) -> Vec<(&'static str, String)> {
        vec![(DELIVERY_COUNT_HEADER, (self.delivery_count + 1).to_string())]
    }
}

// ---------------------------------------------------------------------------
// DlqRouter — 失败消息路由
// ---------------------------------------------------------------------------

/// 路由结果，用于日志与测试断言
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlqRoute {
    /// 仍有投递预算，进入重投 topic
    RetryQueue,
    /// 预算耗尽，进入死信 topic
    DeadLetter,
}

/// 失败消息路由器
///
/// 消费者在消息处理失败（否认）时调用，将信封写入重投或死信 topic。
/// 信封写入成功后，调用方才提交原始消息的偏移量，
/// 保证失败消息在转移完成前不会丢失。
pub struct DlqRouter {
    producer: KafkaProducer,
    retry_topic: String,
    dead_letter_topic: String,
    source_service: String,
    retry_policy: RetryPolicy,
}

impl DlqRouter {
    pub fn new(producer: KafkaProducer, config: &AppConfig) -> Self {
        Self {
            producer,
            retry_topic: config.topics.retry_queue.clone(),
            dead_letter_topic: config.topics.dead_letter.clone(),
            source_service: config.service_name.clone(),
            retry_policy: RetryPolicy::from_config(&config.retry),
        }
    }

    /// 路由一条处理失败的消息
    ///
    /// 按投递预算决定去向并发送信封，返回实际路由结果。
    /// 发送失败时原样返回错误，由调用方决定是否放弃提交偏移量
    /// （不提交意味着消息稍后会被重新投递，语义依然是至少一次）。
    pub async fn route(
        &self,
        msg: &ConsumerMessage,
        message_id: &str,
        error_text: &str,
    ) -> Result<DlqRoute, NotifyError> {
        let envelope = DeadLetterMessage::from_failed(
            msg,
            message_id,
            error_text,
            &self.retry_policy,
            &self.source_service,
        );

        if envelope.is_exhausted() {
            self.producer
                .send_json(&self.dead_letter_topic, message_id, &envelope)
                .await?;

            error!(
                message_id,
                source_topic = %envelope.source_topic,
                delivery_count = envelope.delivery_count,
                max_deliveries = envelope.max_deliveries,
                error = error_text,
                "消息已耗尽投递预算，进入死信 topic 等待人工介入"
            );
            Ok(DlqRoute::DeadLetter)
        } else {
            self.producer
                .send_json(&self.retry_topic, message_id, &envelope)
                .await?;

            warn!(
                message_id,
                source_topic = %envelope.source_topic,
                delivery_count = envelope.delivery_count,
                next_retry_at = ?envelope.next_retry_at,
                error = error_text,
                "消息处理失败，已进入重投 topic"
            );
            Ok(DlqRoute::RetryQueue)
        }
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
