//! App - アプリケーション層
//!
//! ports を組み合わせて reminder 配信のロジックを実装します。
//!
//! # 主要コンポーネント
//! - **DeliveryAdapter**: push gateway の呼び出しを `DispatchOutcome` に写す
//! - **ReminderScheduler**: 1 tick 分の処理（claim→resolve→send→decide→persist）
//! - **SchedulerService / SchedulerHandle**: tick ループの起動・停止
//! - **status**: tick レポートと累計

pub mod adapter;
pub mod scheduler;
pub mod service;
pub mod status;

pub use self::adapter::{DeliveryAdapter, reminder_data};
pub use self::scheduler::ReminderScheduler;
pub use self::service::{SchedulerHandle, SchedulerService};
pub use self::status::{OutcomeCounts, SchedulerStatus, TickReport};
