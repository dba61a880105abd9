//! 共享库
//!
//! 包含通知管线各组件共用的配置、错误处理、数据库连接、缓存、
//! Kafka 封装与重试等基础设施代码。

pub mod cache;
pub mod config;
pub mod database;
pub mod dlq;
pub mod error;
pub mod events;
pub mod kafka;
pub mod logging;
pub mod notification;
pub mod retry;
