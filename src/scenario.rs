use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::models::autonomy::DEFAULT_AVOIDANCE_RADIUS;
use crate::models::common::Position2D;
use crate::models::world::Obstacle;

/// シナリオメタデータ
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioMeta {
    pub version: String,
    pub name: String,
    pub description: String,
}

/// シミュレーション設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// 時間刻み（1フレームあたりの経過量）
    pub dt_s: f64,
    /// ステップ予算（この回数に達したらミッション終了）
    pub max_steps: u64,
}

/// ワールド設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorldConfig {
    pub width: f64,
    pub height: f64,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub source: WorldSource,
}

/// ワールド構築ソース
///
/// 手続き生成と宣言型列挙は同一の `World` 型に対する2つの構築戦略で、
/// シナリオファイルのタグで選択します。
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorldSource {
    /// シード付き手続き生成
    Procedural { seed: u64, obstacle_count: u32 },
    /// シナリオファイルに列挙された障害物・スポーン点・経路
    Declared {
        obstacles: Vec<Obstacle>,
        #[serde(default)]
        spawns: Vec<Position2D>,
        #[serde(default)]
        routes: Vec<Vec<Position2D>>,
    },
}

/// フリート設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FleetConfig {
    /// 機体数
    pub agent_count: u32,
    /// 公称巡航速度
    #[serde(default = "default_cruise_speed")]
    pub cruise_speed: f64,
    /// ランダムスポーン用シード値
    #[serde(default = "default_spawn_seed")]
    pub spawn_seed: u64,
}

/// ウェイポイント計画設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlannerConfig {
    /// 1機あたりのウェイポイント数
    pub waypoints_per_agent: u32,
    /// ウェイポイント生成専用シード値（ワールドのシードとは独立）
    #[serde(default = "default_planner_seed")]
    pub seed: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            waypoints_per_agent: 3,
            seed: default_planner_seed(),
        }
    }
}

/// 自律制御設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AutonomyConfig {
    /// 回避発動の余裕距離
    #[serde(default = "default_avoidance_radius")]
    pub avoidance_radius: f64,
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            avoidance_radius: default_avoidance_radius(),
        }
    }
}

/// 故障注入の1エントリ
///
/// `at_step` 以降の全ステップで故障が有効になります（一方向ラッチ、
/// 同一ラン内での回復はない）。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FailureSpec {
    pub agent_id: String,
    pub at_step: u64,
}

/// 故障注入スケジュール設定
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FailuresConfig {
    /// センサー喪失の注入
    #[serde(default)]
    pub sensor_dropouts: Vec<FailureSpec>,
    /// 通信断の注入
    #[serde(default)]
    pub comms_losses: Vec<FailureSpec>,
}

/// 完全なシナリオ設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    pub meta: ScenarioMeta,
    pub sim: SimulationConfig,
    pub world: WorldConfig,
    pub fleet: FleetConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub autonomy: AutonomyConfig,
    #[serde(default)]
    pub failures: FailuresConfig,
}

fn default_cruise_speed() -> f64 {
    1.0
}

fn default_spawn_seed() -> u64 {
    7
}

fn default_planner_seed() -> u64 {
    // 元システムのウェイポイント生成器が固定で使用していたシード値
    1234
}

fn default_avoidance_radius() -> f64 {
    DEFAULT_AVOIDANCE_RADIUS
}

impl ScenarioConfig {
    /// YAMLファイルからシナリオ設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }

        let contents =
            fs::read_to_string(path).map_err(|e| ScenarioError::IoError(path.to_path_buf(), e))?;

        let config: ScenarioConfig = serde_yaml::from_str(&contents)
            .map_err(|e| ScenarioError::ParseError(path.to_path_buf(), e))?;

        config.validate()?;

        Ok(config)
    }

    /// 組み込みデモシナリオ
    ///
    /// 元デモの既定値を再現します: 100×100領域、障害物5個（シード42）、
    /// エージェント4機、1機あたりウェイポイント3点、300ステップ。
    pub fn builtin_demo() -> Self {
        Self {
            meta: ScenarioMeta {
                version: "0.1.0".to_string(),
                name: "builtin_demo".to_string(),
                description: "組み込みデモミッション（手続き生成ワールド）".to_string(),
            },
            sim: SimulationConfig {
                dt_s: 1.0,
                max_steps: 300,
            },
            world: WorldConfig {
                width: 100.0,
                height: 100.0,
                source: WorldSource::Procedural {
                    seed: 42,
                    obstacle_count: 5,
                },
            },
            fleet: FleetConfig {
                agent_count: 4,
                cruise_speed: default_cruise_speed(),
                spawn_seed: default_spawn_seed(),
            },
            planner: PlannerConfig::default(),
            autonomy: AutonomyConfig::default(),
            failures: FailuresConfig::default(),
        }
    }

    /// 設定の基本的な検証
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.sim.dt_s <= 0.0 {
            return Err(ScenarioError::ValidationError(
                "dt_s must be positive".to_string(),
            ));
        }
        if self.sim.max_steps == 0 {
            return Err(ScenarioError::ValidationError(
                "max_steps must be positive".to_string(),
            ));
        }

        if self.world.width <= 0.0 || self.world.height <= 0.0 {
            return Err(ScenarioError::ValidationError(
                "world dimensions must be positive".to_string(),
            ));
        }

        if self.fleet.cruise_speed <= 0.0 {
            return Err(ScenarioError::ValidationError(
                "cruise_speed must be positive".to_string(),
            ));
        }

        if self.autonomy.avoidance_radius < 0.0 {
            return Err(ScenarioError::ValidationError(
                "avoidance_radius must not be negative".to_string(),
            ));
        }

        if let WorldSource::Declared { spawns, routes, .. } = &self.world.source {
            for spawn in spawns {
                if spawn.x < 0.0
                    || spawn.x > self.world.width
                    || spawn.y < 0.0
                    || spawn.y > self.world.height
                {
                    return Err(ScenarioError::ValidationError(format!(
                        "spawn ({}, {}) outside world bounds",
                        spawn.x, spawn.y
                    )));
                }
            }
            if !routes.is_empty() && routes.len() != self.fleet.agent_count as usize {
                return Err(ScenarioError::ValidationError(format!(
                    "declared routes ({}) must match agent_count ({})",
                    routes.len(),
                    self.fleet.agent_count
                )));
            }
        }

        Ok(())
    }

    /// シナリオの概要を表示
    pub fn print_summary(&self) {
        println!("=== シナリオ情報 ===");
        println!("名前: {}", self.meta.name);
        println!("説明: {}", self.meta.description);
        println!("バージョン: {}", self.meta.version);
        println!();

        println!("=== ミッション設定 ===");
        println!("時間刻み: {:.3}", self.sim.dt_s);
        println!("ステップ予算: {}", self.sim.max_steps);
        println!("領域: {:.0} x {:.0}", self.world.width, self.world.height);
        match &self.world.source {
            WorldSource::Procedural {
                seed,
                obstacle_count,
            } => {
                println!("ワールド: 手続き生成 (シード: {}, 障害物: {}個)", seed, obstacle_count);
            }
            WorldSource::Declared {
                obstacles, spawns, ..
            } => {
                println!(
                    "ワールド: 宣言型 (障害物: {}個, スポーン点: {}箇所)",
                    obstacles.len(),
                    spawns.len()
                );
            }
        }
        println!();

        println!("=== フリート ===");
        println!("機体数: {}機", self.fleet.agent_count);
        println!("巡航速度: {:.2}", self.fleet.cruise_speed);
        println!(
            "ウェイポイント: {}点/機 (シード: {})",
            self.planner.waypoints_per_agent, self.planner.seed
        );
        println!();

        println!("=== 故障注入 ===");
        if self.failures.sensor_dropouts.is_empty() && self.failures.comms_losses.is_empty() {
            println!("なし");
        }
        for spec in &self.failures.sensor_dropouts {
            println!("センサー喪失: {} (ステップ {} 以降)", spec.agent_id, spec.at_step);
        }
        for spec in &self.failures.comms_losses {
            println!("通信断: {} (ステップ {} 以降)", spec.agent_id, spec.at_step);
        }
    }
}

/// シナリオ読み込みエラー
#[derive(Debug)]
pub enum ScenarioError {
    FileNotFound(std::path::PathBuf),
    IoError(std::path::PathBuf, std::io::Error),
    ParseError(std::path::PathBuf, serde_yaml::Error),
    ValidationError(String),
}

impl std::fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioError::FileNotFound(path) => {
                write!(f, "シナリオファイルが見つかりません: {}", path.display())
            }
            ScenarioError::IoError(path, err) => {
                write!(f, "ファイル読み込みエラー {}: {}", path.display(), err)
            }
            ScenarioError::ParseError(path, err) => {
                write!(f, "YAML解析エラー {}: {}", path.display(), err)
            }
            ScenarioError::ValidationError(msg) => {
                write!(f, "設定検証エラー: {}", msg)
            }
        }
    }
}

impl std::error::Error for ScenarioError {}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_YAML: &str = r#"
meta:
  version: "0.1.0"
  name: "plant_patrol"
  description: "工場区画の巡回ミッション"
sim:
  dt_s: 1.0
  max_steps: 300
world:
  width: 100.0
  height: 100.0
  source:
    procedural:
      seed: 42
      obstacle_count: 5
fleet:
  agent_count: 4
planner:
  waypoints_per_agent: 3
failures:
  sensor_dropouts:
    - agent_id: "Agent_1"
      at_step: 150
  comms_losses:
    - agent_id: "Agent_3"
      at_step: 200
"#;

    #[test]
    fn test_parse_sample_yaml_with_defaults() {
        let config: ScenarioConfig = serde_yaml::from_str(SAMPLE_YAML).unwrap();
        config.validate().unwrap();

        assert_eq!(config.fleet.agent_count, 4);
        // 省略されたフィールドには既定値が入る
        assert_eq!(config.fleet.cruise_speed, 1.0);
        assert_eq!(config.planner.seed, 1234);
        assert_eq!(config.autonomy.avoidance_radius, 10.0);
        assert_eq!(config.failures.sensor_dropouts[0].agent_id, "Agent_1");
        assert_eq!(config.failures.comms_losses[0].at_step, 200);
    }

    #[test]
    fn test_parse_declared_world() {
        let yaml = r#"
meta: { version: "0.1.0", name: "declared", description: "宣言型ワールド" }
sim: { dt_s: 1.0, max_steps: 50 }
world:
  width: 60.0
  height: 60.0
  source:
    declared:
      obstacles:
        - { x: 30.0, y: 30.0, radius: 4.0 }
      spawns:
        - { x: 10.0, y: 10.0 }
      routes:
        - [{ x: 50.0, y: 50.0 }]
fleet:
  agent_count: 1
"#;
        let config: ScenarioConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        match &config.world.source {
            WorldSource::Declared {
                obstacles,
                spawns,
                routes,
            } => {
                assert_eq!(obstacles.len(), 1);
                assert_eq!(spawns.len(), 1);
                assert_eq!(routes[0][0], Position2D::new(50.0, 50.0));
            }
            _ => panic!("declared source expected"),
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ScenarioConfig::builtin_demo();
        config.sim.dt_s = 0.0;
        assert!(config.validate().is_err());

        let mut config = ScenarioConfig::builtin_demo();
        config.sim.max_steps = 0;
        assert!(config.validate().is_err());

        let mut config = ScenarioConfig::builtin_demo();
        config.world.width = -10.0;
        assert!(config.validate().is_err());

        let mut config = ScenarioConfig::builtin_demo();
        config.fleet.cruise_speed = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_route_count_mismatch() {
        let mut config = ScenarioConfig::builtin_demo();
        config.world.source = WorldSource::Declared {
            obstacles: vec![],
            spawns: vec![],
            routes: vec![vec![Position2D::new(50.0, 50.0)]],
        };
        // agent_count = 4 に対して経路1本
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builtin_demo_is_valid() {
        assert!(ScenarioConfig::builtin_demo().validate().is_ok());
    }
}
