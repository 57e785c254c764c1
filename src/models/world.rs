use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::models::common::Position2D;
use crate::simulation::MissionError;

/// 障害物の中心座標を領域境界から内側に離すマージン
pub const OBSTACLE_MARGIN: f64 = 10.0;
/// 障害物半径の下限
pub const OBSTACLE_RADIUS_MIN: f64 = 3.0;
/// 障害物半径の上限
pub const OBSTACLE_RADIUS_MAX: f64 = 8.0;
/// ウェイポイントとスポーン位置を領域境界から内側に離すマージン
pub const INTERIOR_MARGIN: f64 = 5.0;

/// 円形障害物
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    /// 中心X座標
    pub x: f64,
    /// 中心Y座標
    pub y: f64,
    /// 半径
    pub radius: f64,
}

impl Obstacle {
    pub fn center(&self) -> Position2D {
        Position2D::new(self.x, self.y)
    }
}

/// ミッション領域のワールドモデル
///
/// [0, width] × [0, height] の矩形領域と円形障害物の集合を保持します。
/// 生成後は不変で、再構成時はセッションごと丸ごと置き換えられます。
#[derive(Debug, Clone, PartialEq)]
pub struct World {
    /// 領域の幅
    pub width: f64,
    /// 領域の高さ
    pub height: f64,
    /// 障害物の集合（生成順を保持。回避判定はこの順で走査される）
    pub obstacles: Vec<Obstacle>,
}

impl World {
    /// シード付き手続き生成でワールドを構築します
    ///
    /// 同一の (width, height, obstacle_count, seed) からは常にビット同一の
    /// 障害物列が得られます。乱数列は ChaCha8 の単一ストリームで、
    /// 障害物ごとに x, y, radius の順で消費します。
    ///
    /// # 引数
    ///
    /// * `width` - 領域の幅（正の実数）
    /// * `height` - 領域の高さ（正の実数）
    /// * `obstacle_count` - 生成する障害物の個数
    /// * `seed` - 障害物生成専用のシード値
    ///
    /// # 戻り値
    ///
    /// 構築されたワールド。寸法が不正な場合は `MissionError::InvalidParameter`
    pub fn generate(
        width: f64,
        height: f64,
        obstacle_count: u32,
        seed: u64,
    ) -> Result<Self, MissionError> {
        Self::validate_dimensions(width, height)?;

        if obstacle_count > 0 && (width <= 2.0 * OBSTACLE_MARGIN || height <= 2.0 * OBSTACLE_MARGIN)
        {
            return Err(MissionError::InvalidParameter(format!(
                "領域 {}x{} は障害物マージン {} を確保できません",
                width, height, OBSTACLE_MARGIN
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut obstacles = Vec::with_capacity(obstacle_count as usize);

        for _ in 0..obstacle_count {
            let x = rng.gen_range(OBSTACLE_MARGIN..width - OBSTACLE_MARGIN);
            let y = rng.gen_range(OBSTACLE_MARGIN..height - OBSTACLE_MARGIN);
            let radius = rng.gen_range(OBSTACLE_RADIUS_MIN..OBSTACLE_RADIUS_MAX);
            obstacles.push(Obstacle { x, y, radius });
        }

        Ok(Self {
            width,
            height,
            obstacles,
        })
    }

    /// 明示的に列挙された障害物からワールドを構築します（宣言型ソース）
    ///
    /// # 引数
    ///
    /// * `width` - 領域の幅（正の実数）
    /// * `height` - 領域の高さ（正の実数）
    /// * `obstacles` - シナリオファイルに列挙された障害物
    ///
    /// # 戻り値
    ///
    /// 構築されたワールド。寸法・半径・中心位置が不正な場合は
    /// `MissionError::InvalidParameter`
    pub fn from_declared(
        width: f64,
        height: f64,
        obstacles: Vec<Obstacle>,
    ) -> Result<Self, MissionError> {
        Self::validate_dimensions(width, height)?;

        for obs in &obstacles {
            if obs.radius <= 0.0 {
                return Err(MissionError::InvalidParameter(format!(
                    "障害物半径は正である必要があります: {}",
                    obs.radius
                )));
            }
            if obs.x < 0.0 || obs.x > width || obs.y < 0.0 || obs.y > height {
                return Err(MissionError::InvalidParameter(format!(
                    "障害物中心 ({}, {}) が領域外です",
                    obs.x, obs.y
                )));
            }
        }

        Ok(Self {
            width,
            height,
            obstacles,
        })
    }

    /// 位置が領域内かどうかを判定
    pub fn contains(&self, position: &Position2D) -> bool {
        position.x >= 0.0 && position.x <= self.width && position.y >= 0.0 && position.y <= self.height
    }

    fn validate_dimensions(width: f64, height: f64) -> Result<(), MissionError> {
        if width <= 0.0 || height <= 0.0 {
            return Err(MissionError::InvalidParameter(format!(
                "領域の寸法は正である必要があります: {}x{}",
                width, height
            )));
        }
        Ok(())
    }
}
