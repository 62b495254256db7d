//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（reminder ストア、user ディレクトリ、push 配信サービス）
//! と時間（clock, ticker）へのインターフェースを提供し、実装の詳細を隠蔽します。

pub mod clock;
pub mod id_generator;
pub mod push_gateway;
pub mod reminder_store;
pub mod ticker;
pub mod user_directory;

pub use self::clock::{Clock, FixedClock, ManualClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::push_gateway::{PushError, PushGateway, PushMessage};
pub use self::reminder_store::{ReminderStore, UpdateResult};
pub use self::ticker::{ChannelTicker, IntervalTicker, Ticker};
pub use self::user_directory::UserDirectory;
