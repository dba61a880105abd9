//! 通知服务
//!
//! 社交视频平台的事件驱动通知管线：三类领域事件（视频、评论、用户）
//! 由生产者发布到 Kafka，类目消费者物化为持久化通知，失败消息按
//! 投递预算进入重投/死信 topic。对外暴露统一的服务门面。

pub mod consumer;
pub mod content;
pub mod error;
pub mod producer;
pub mod repository;
pub mod service;
