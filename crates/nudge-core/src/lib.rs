//! nudge-core
//!
//! Reminder scheduling and push delivery.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, reminder, state, outcome, decision, recurrence, window, errors）
//! - **ports**: 抽象化レイヤー（ReminderStore, UserDirectory, PushGateway, Clock, Ticker, IdGenerator）
//! - **impls**: 実装（in-memory / SQLite ストア、FCM / log / scripted gateway）
//! - **app**: アプリケーションロジック（DeliveryAdapter, ReminderScheduler, SchedulerService）
//! - **config**: TOML 設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
