// 基本的なデータ型と数学ユーティリティ
pub mod common;

// ワールドモデル（矩形領域と円形障害物）
pub mod world;

// エージェント状態とフリート生成
pub mod agent;

// ウェイポイント経路の計画と到達判定
pub mod waypoint;

// 自律制御コントローラ（状態機械の中核）
pub mod autonomy;

// 便利な re-export
pub use agent::{Agent, AgentSnapshot, create_fleet};
pub use autonomy::{Autonomy, ControlDecision};
pub use common::*;
pub use waypoint::{is_reached, plan_routes, select_active};
pub use world::{Obstacle, World};
