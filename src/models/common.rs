use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// 2次元位置を表す構造体
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position2D {
    pub x: f64,
    pub y: f64,
}

impl Position2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// 2点間のユークリッド距離を計算
    pub fn distance_to(&self, other: &Position2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// 自身から他点への方位角を計算（ラジアン、X軸正方向基準）
    pub fn bearing_to(&self, other: &Position2D) -> f64 {
        (other.y - self.y).atan2(other.x - self.x)
    }

    /// 位置を矩形領域 [0, width] × [0, height] 内に丸め込む
    pub fn clamped_to(&self, width: f64, height: f64) -> Self {
        Self {
            x: math_utils::clamp(self.x, 0.0, width),
            y: math_utils::clamp(self.y, 0.0, height),
        }
    }
}

impl Add<Velocity2D> for Position2D {
    type Output = Self;

    fn add(self, velocity: Velocity2D) -> Self::Output {
        Self::new(self.x + velocity.x, self.y + velocity.y)
    }
}

impl Sub for Position2D {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

/// 2次元速度を表す構造体
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Velocity2D {
    pub x: f64, // 距離単位/ステップ
    pub y: f64, // 距離単位/ステップ
}

impl Velocity2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn zero() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    /// 方位角と速さから速度ベクトルを構成
    pub fn from_heading(heading_rad: f64, speed: f64) -> Self {
        Self {
            x: heading_rad.cos() * speed,
            y: heading_rad.sin() * speed,
        }
    }

    /// 速度ベクトルの大きさ
    pub fn magnitude(&self) -> f64 {
        (self.x.powi(2) + self.y.powi(2)).sqrt()
    }
}

impl Mul<f64> for Velocity2D {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self::Output {
        Self::new(self.x * scalar, self.y * scalar)
    }
}

/// エージェントの行動モードを表す列挙型
///
/// 有限状態機械の状態ラベルで、毎ステップの制御判断で更新されます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// 待機中（初期状態）
    Idle,
    /// ウェイポイントへ航行中
    Navigating,
    /// 障害物を回避中
    Avoiding,
    /// センサー喪失による安全停止
    SafeMode,
    /// 通信断による位置保持
    LostComms,
    /// 全ウェイポイント到達済み
    Arrived,
}

impl std::fmt::Display for AgentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AgentMode::Idle => "idle",
            AgentMode::Navigating => "navigating",
            AgentMode::Avoiding => "avoiding",
            AgentMode::SafeMode => "safe_mode",
            AgentMode::LostComms => "lost_comms",
            AgentMode::Arrived => "arrived",
        };
        write!(f, "{}", label)
    }
}

/// 制御判断の根拠コード
///
/// 自律制御が移動量と併せて返す判断理由です。ステッパーがログ行の
/// 種別分けに使用します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// センサー喪失により安全停止した
    SensorDropout,
    /// 障害物回避の操舵を行った
    AvoidObstacle,
    /// ウェイポイント追従の操舵を行った
    FollowWaypoint,
}

/// 数学ユーティリティ関数
pub mod math_utils {
    /// 値を [lo, hi] の範囲に丸め込む
    ///
    /// max(lo, min(hi, v)) と同じ全域的な定義で、lo > hi でも
    /// パニックせず lo を返します（f64::clamp と異なる点）。
    pub fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
        v.min(hi).max(lo)
    }
}
