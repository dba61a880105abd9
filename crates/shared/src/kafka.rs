//! Kafka 基础设施封装
//!
//! 将 rdkafka 的底层 API 封装为业务友好的 Producer/Consumer 抽象，
//! 统一消息序列化、错误映射和安全配置，避免上层重复编写样板代码。
//! 消费侧关闭自动提交：确认语义（ack/nack）由消费者显式控制，
//! 只有处理完成（成功或已转入重投/死信）的消息才提交偏移量。

use std::collections::HashMap;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::{Offset, TopicPartitionList};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::KafkaConfig;
use crate::error::NotifyError;

/// 投递次数 header 键
///
/// Kafka 不原生跟踪投递次数，重投链路通过该 header 显式传递；
/// 首次投递没有该 header，按 1 计。
pub const DELIVERY_COUNT_HEADER: &str = "delivery_count";

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 消费到的 Kafka 消息的统一表示
///
/// 将 rdkafka 的 `BorrowedMessage`（带生命周期约束）转换为拥有所有权的结构体，
/// 使消息可以安全地跨 await 点传递给异步处理函数。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub timestamp: Option<i64>,
    pub headers: HashMap<String, String>,
}

impl ConsumerMessage {
    /// 从 rdkafka 的借用消息构造，提取并拥有所有字段
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        let key = msg
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .map(String::from);

        let payload = msg.payload().map(|p| p.to_vec()).unwrap_or_default();

        let timestamp = msg.timestamp().to_millis();

        let mut headers = HashMap::new();
        if let Some(h) = msg.headers() {
            for idx in 0..h.count() {
                let header = h.get(idx);
                if let Some(raw) = header.value
                    && let Ok(value) = std::str::from_utf8(raw)
                {
                    headers.insert(header.key.to_string(), value.to_string());
                }
            }
        }

        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key,
            payload,
            timestamp,
            headers,
        }
    }

    /// 将负载视为 UTF-8 字符串返回
    pub fn payload_str(&self) -> Result<&str, NotifyError> {
        std::str::from_utf8(&self.payload)
            .map_err(|e| NotifyError::Kafka(format!("负载非 UTF-8 编码: {e}")))
    }

    /// 将 JSON 格式负载反序列化为目标类型
    pub fn deserialize_payload<T: DeserializeOwned>(&self) -> Result<T, NotifyError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// 当前投递次数（含本次）
    pub fn delivery_count(&self) -> u32 {
        self.headers
            .get(DELIVERY_COUNT_HEADER)
            .and_then(|v| v.parse().ok())
            .unwrap_or(1)
    }
}

// ---------------------------------------------------------------------------
// 安全配置
// ---------------------------------------------------------------------------

/// 按配置追加 TLS / SASL 设置
///
/// 托管 Kafka 通常以固定用户名 "token" + 密钥令牌做 SASL/PLAIN 认证；
/// 两者都未配置时保持明文连接（本地开发）。
fn apply_security(client_config: &mut ClientConfig, config: &KafkaConfig) {
    match (&config.tls_ca_cert, &config.auth_token) {
        (Some(ca_cert), Some(token)) => {
            client_config
                .set("security.protocol", "SASL_SSL")
                .set("ssl.ca.location", ca_cert)
                .set("sasl.mechanism", "PLAIN")
                .set("sasl.username", "token")
                .set("sasl.password", token);
        }
        (Some(ca_cert), None) => {
            client_config
                .set("security.protocol", "SSL")
                .set("ssl.ca.location", ca_cert);
        }
        (None, Some(token)) => {
            client_config
                .set("security.protocol", "SASL_PLAINTEXT")
                .set("sasl.mechanism", "PLAIN")
                .set("sasl.username", "token")
                .set("sasl.password", token);
        }
        (None, None) => {}
    }
}

// ---------------------------------------------------------------------------
// KafkaProducer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 生产者
///
/// 封装 `FutureProducer` 并提供带 header 和事件时间的发送方法，
/// 内部已派生 Clone（`FutureProducer` 本身是 Arc 包装的），
/// 三个类目生产者与重投链路共享同一个连接。
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
    send_timeout: Duration,
}

impl KafkaProducer {
    /// 根据配置创建生产者
    ///
    /// `linger.ms` + `batch.num.messages` 构成微批窗口：在几毫秒内攒批
    /// 摊薄网络开销，对尾延迟影响可忽略。`message.timeout.ms` 限定单条
    /// 消息的投递上限——超时错误原样返回给调用方，本层不做重试。
    pub fn new(config: &KafkaConfig) -> Result<Self, NotifyError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", config.send_timeout_ms.to_string())
            .set("linger.ms", config.linger_ms.to_string())
            .set("batch.num.messages", config.batch_num_messages.to_string());
        apply_security(&mut client_config, config);

        let producer: FutureProducer = client_config
            .create()
            .map_err(|e| NotifyError::Kafka(format!("创建生产者失败: {e}")))?;

        info!(brokers = %config.brokers, "Kafka 生产者已初始化");
        Ok(Self {
            producer,
            send_timeout: Duration::from_millis(config.send_timeout_ms),
        })
    }

    /// 发送原始字节消息
    pub async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<(i32, i64), NotifyError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        let delivery = self
            .producer
            .send(record, self.send_timeout)
            .await
            .map_err(|(e, _)| NotifyError::Kafka(format!("发送消息失败: {e}")))?;

        debug!(
            topic,
            key,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已发送"
        );
        Ok((delivery.partition, delivery.offset))
    }

    /// 发送完整事件信封：负载 + 分区键 + 可过滤 header + 事件时间
    pub async fn send_with_headers(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        headers: &[(&str, String)],
        event_time_ms: Option<i64>,
    ) -> Result<(i32, i64), NotifyError> {
        let mut owned_headers = OwnedHeaders::new_with_capacity(headers.len());
        for (header_key, header_value) in headers {
            owned_headers = owned_headers.insert(Header {
                key: header_key,
                value: Some(header_value),
            });
        }

        let mut record = FutureRecord::to(topic)
            .key(key)
            .payload(payload)
            .headers(owned_headers);
        if let Some(ts) = event_time_ms {
            record = record.timestamp(ts);
        }

        let delivery = self
            .producer
            .send(record, self.send_timeout)
            .await
            .map_err(|(e, _)| NotifyError::Kafka(format!("发送消息失败: {e}")))?;

        debug!(
            topic,
            key,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已发送"
        );
        Ok((delivery.partition, delivery.offset))
    }

    /// 将值序列化为 JSON 后发送
    ///
    /// 序列化与网络发送拆分为两步，便于独立定位故障原因。
    pub async fn send_json<T: Serialize>(
        &self,
        topic: &str,
        key: &str,
        value: &T,
    ) -> Result<(i32, i64), NotifyError> {
        let payload = serde_json::to_vec(value)?;

        self.send(topic, key, &payload).await
    }

    /// 冲刷发送缓冲区，等待在途消息落地
    pub fn flush(&self, timeout: Duration) -> Result<(), NotifyError> {
        self.producer
            .flush(timeout)
            .map_err(|e| NotifyError::Kafka(format!("冲刷生产者失败: {e}")))
    }
}

// ---------------------------------------------------------------------------
// KafkaConsumer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 消费者
///
/// 封装 `StreamConsumer`，暴露 recv/commit 原语供上层消费循环组合。
/// 自动提交已关闭：调用方处理完一条消息后必须显式 `commit`，
/// 否则进程重启后该消息会被重新投递（至少一次语义）。
pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

impl KafkaConsumer {
    /// 创建消费者
    ///
    /// `group_id_suffix` 允许同一服务内不同消费逻辑使用独立的消费组，
    /// 例如 "vclip-notification.video" 和 "vclip-notification.retry"。
    /// 同组多实例按分区分摊消息，即共享订阅。
    pub fn new(config: &KafkaConfig, group_id_suffix: Option<&str>) -> Result<Self, NotifyError> {
        let group_id = match group_id_suffix {
            Some(suffix) => format!("{}.{}", config.consumer_group, suffix),
            None => config.consumer_group.clone(),
        };

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "false");
        apply_security(&mut client_config, config);

        let consumer: StreamConsumer = client_config
            .create()
            .map_err(|e| NotifyError::Kafka(format!("创建消费者失败: {e}")))?;

        info!(brokers = %config.brokers, group_id, "Kafka 消费者已初始化");
        Ok(Self { consumer })
    }

    /// 订阅指定的 topic 列表
    pub fn subscribe(&self, topics: &[&str]) -> Result<(), NotifyError> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| NotifyError::Kafka(format!("订阅 topic 失败: {e}")))?;

        info!(?topics, "已订阅 Kafka topics");
        Ok(())
    }

    /// 阻塞接收下一条消息
    ///
    /// 只受调用方取消约束（放在 `tokio::select!` 里与关闭信号竞争），
    /// rdkafka 的 `recv` 是取消安全的，select 丢弃分支不会丢消息。
    pub async fn recv(&self) -> Result<ConsumerMessage, NotifyError> {
        let borrowed = self
            .consumer
            .recv()
            .await
            .map_err(|e| NotifyError::Kafka(format!("接收消息失败: {e}")))?;
        Ok(ConsumerMessage::from_borrowed(&borrowed))
    }

    /// 确认消息：提交偏移量到下一条
    pub fn commit(&self, msg: &ConsumerMessage) -> Result<(), NotifyError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&msg.topic, msg.partition, Offset::Offset(msg.offset + 1))
            .map_err(|e| NotifyError::Kafka(format!("构造偏移量失败: {e}")))?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| NotifyError::Kafka(format!("提交偏移量失败: {e}")))
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_message(headers: HashMap<String, String>) -> ConsumerMessage {
        ConsumerMessage {
            topic: "vclip.video.events".to_string(),
            partition: 0,
            offset: 42,
            key: Some("key-1".to_string()),
            payload: b"hello".to_vec(),
            timestamp: Some(1_700_000_000_000),
            headers,
        }
    }

    #[test]
    fn test_consumer_message_creation() {
        let msg = make_message(HashMap::from([(
            "event_type".to_string(),
            "VIDEO_UPLOADED".to_string(),
        )]));

        assert_eq!(msg.topic, "vclip.video.events");
        assert_eq!(msg.partition, 0);
        assert_eq!(msg.offset, 42);
        assert_eq!(msg.key.as_deref(), Some("key-1"));
        assert_eq!(msg.payload, b"hello");
        assert_eq!(msg.headers.get("event_type").unwrap(), "VIDEO_UPLOADED");
    }

    #[test]
    fn test_delivery_count_defaults_to_one() {
        // 首次投递没有 delivery_count header
        let msg = make_message(HashMap::new());
        assert_eq!(msg.delivery_count(), 1);
    }

    #[test]
    fn test_delivery_count_parses_header() {
        let msg = make_message(HashMap::from([(
            DELIVERY_COUNT_HEADER.to_string(),
            "3".to_string(),
        )]));
        assert_eq!(msg.delivery_count(), 3);
    }

    #[test]
    fn test_delivery_count_ignores_garbage_header() {
        let msg = make_message(HashMap::from([(
            DELIVERY_COUNT_HEADER.to_string(),
            "not-a-number".to_string(),
        )]));
        assert_eq!(msg.delivery_count(), 1);
    }

    #[test]
    fn test_consumer_message_deserialize() {
        #[derive(Debug, serde::Deserialize, PartialEq)]
        struct Probe {
            user_id: String,
            action: String,
        }

        let probe_json = r#"{"user_id":"u-001","action":"follow"}"#;
        let mut msg = make_message(HashMap::new());
        msg.payload = probe_json.as_bytes().to_vec();

        let probe: Probe = msg.deserialize_payload().unwrap();
        assert_eq!(
            probe,
            Probe {
                user_id: "u-001".to_string(),
                action: "follow".to_string(),
            }
        );
    }

    #[test]
    fn test_consumer_message_deserialize_invalid_json() {
        let mut msg = make_message(HashMap::new());
        msg.payload = b"not json".to_vec();

        let result: Result<serde_json::Value, _> = msg.deserialize_payload();
        assert!(matches!(
            result.unwrap_err(),
            NotifyError::Serialization(_)
        ));
    }

    #[test]
    fn test_consumer_message_payload_str() {
        let mut msg = make_message(HashMap::new());
        msg.payload = b"hello world".to_vec();
        assert_eq!(msg.payload_str().unwrap(), "hello world");
    }

    #[test]
    fn test_consumer_message_payload_str_invalid_utf8() {
        let mut msg = make_message(HashMap::new());
        msg.payload = vec![0xFF, 0xFE];
        assert!(msg.payload_str().is_err());
    }
}
