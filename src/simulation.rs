//! # Simulation モジュール
//!
//! フリートミッションの中核となるミッションセッションとステッパーを提供します。
//!
//! このモジュールは、固定時間刻みのフレームループを管理し、ワールド・
//! フリート・ウェイポイント経路・故障注入スケジュールを1つのセッション値に
//! 束ねます。グローバル状態は持たず、セッションは生成・再生成・破棄の
//! ライフサイクルを明示的にたどります。
//!
//! ## フレーム内の処理順序
//!
//! 各ステップにおいて、フリート生成順に各エージェントへ以下を適用します:
//!
//! 1. **故障判定**: 注入スケジュールからセンサー健全性と通信可否を決定
//! 2. **ウェイポイント選択**: 経路中で最初の未到達点を採用（全到達なら停止）
//! 3. **通信断の上書き**: 通信断なら自律制御を呼ばずに位置を凍結
//! 4. **自律制御**: 判断結果（位置・速度・モード・根拠）をエージェントへ適用
//! 5. **軌跡記録**: 新しい位置を軌跡履歴に追記
//!
//! 全機体の処理後にスナップショットを発行し、ステップカウンタを進めます。
//! 停止要求はフレーム境界でのみ観測されます（フレーム途中での中断はない）。

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::models::agent::{Agent, AgentSnapshot, create_fleet};
use crate::models::autonomy::Autonomy;
use crate::models::common::{AgentMode, Position2D, ReasonCode, Velocity2D};
use crate::models::waypoint::{plan_routes, select_active};
use crate::models::world::World;
use crate::scenario::{FailuresConfig, ScenarioConfig, WorldSource};

/// ミッション操作のエラー
#[derive(Debug)]
pub enum MissionError {
    /// 構築時パラメータが不正（非正の寸法など）。ミッション実行中には発生しない
    InvalidParameter(String),
    /// 現在のフリートに存在しないエージェントIDが参照された
    UnknownAgent(String),
}

impl std::fmt::Display for MissionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissionError::InvalidParameter(msg) => {
                write!(f, "不正なパラメータ: {}", msg)
            }
            MissionError::UnknownAgent(id) => {
                write!(f, "不明なエージェントID: {}", id)
            }
        }
    }
}

impl std::error::Error for MissionError {}

/// 故障注入スケジュール
///
/// エージェントごとの発動ステップを保持します。発動後は同一ラン内で
/// 回復しません（一方向ラッチ）。
#[derive(Debug, Clone, Default)]
pub struct FailureSchedule {
    sensor_dropouts: HashMap<String, u64>,
    comms_losses: HashMap<String, u64>,
}

impl FailureSchedule {
    pub fn from_config(config: &FailuresConfig) -> Self {
        let mut schedule = Self::default();
        for spec in &config.sensor_dropouts {
            let trigger = schedule
                .sensor_dropouts
                .entry(spec.agent_id.clone())
                .or_insert(spec.at_step);
            *trigger = (*trigger).min(spec.at_step);
        }
        for spec in &config.comms_losses {
            let trigger = schedule
                .comms_losses
                .entry(spec.agent_id.clone())
                .or_insert(spec.at_step);
            *trigger = (*trigger).min(spec.at_step);
        }
        schedule
    }

    /// このステップでセンサーが健全かどうか
    pub fn sensor_ok(&self, agent_id: &str, step: u64) -> bool {
        self.sensor_dropouts
            .get(agent_id)
            .is_none_or(|&trigger| step < trigger)
    }

    /// このステップで通信が生きているかどうか
    pub fn comms_ok(&self, agent_id: &str, step: u64) -> bool {
        self.comms_losses
            .get(agent_id)
            .is_none_or(|&trigger| step < trigger)
    }
}

/// フレーム境界で発行されるミッション全体のスナップショット
///
/// 内部の可変状態への参照を含まない複製です（描画層はこれだけを読む）。
#[derive(Debug, Clone, Serialize)]
pub struct MissionSnapshot {
    /// このスナップショットが表すステップ番号
    pub step: u64,
    /// 全エージェントの状態射影（フリート生成順）
    pub agents: Vec<AgentSnapshot>,
}

/// ミッションセッション
///
/// ワールド・フリート・経路・故障スケジュール・ステップカウンタ・実行
/// フラグを束ねたプロセス内セッション状態です。`create` で構築し、設定
/// 変更時は `regenerate` で丸ごと作り直します（過去の状態は引き継がない）。
#[derive(Debug)]
pub struct MissionSession {
    pub config: ScenarioConfig,
    pub world: World,
    pub fleet: Vec<Agent>,
    /// エージェントごとの読み取り専用ウェイポイント経路（フリートと同順）
    pub routes: Vec<Vec<Position2D>>,
    autonomy: Autonomy,
    schedule: FailureSchedule,
    step_count: u64,
    running: bool,
}

impl MissionSession {
    /// シナリオ設定からセッションを構築します
    ///
    /// ワールド・経路・フリートを構築し、故障注入の参照先エージェントを
    /// 検証します。検証はすべて構築時に行われ、実行中のステップが
    /// エラーを返すことはありません。
    ///
    /// # 引数
    ///
    /// * `config` - 検証済みのシナリオ設定
    ///
    /// # 戻り値
    ///
    /// 構築されたセッション。寸法不正は `InvalidParameter`、故障注入が
    /// 存在しない機体を指す場合は `UnknownAgent`
    pub fn create(config: ScenarioConfig) -> Result<Self, MissionError> {
        let world = match &config.world.source {
            WorldSource::Procedural {
                seed,
                obstacle_count,
            } => World::generate(config.world.width, config.world.height, *obstacle_count, *seed)?,
            WorldSource::Declared { obstacles, .. } => World::from_declared(
                config.world.width,
                config.world.height,
                obstacles.clone(),
            )?,
        };

        let (spawns, declared_routes) = match &config.world.source {
            WorldSource::Declared { spawns, routes, .. } => (spawns.clone(), routes.clone()),
            WorldSource::Procedural { .. } => (Vec::new(), Vec::new()),
        };

        let routes = if declared_routes.is_empty() {
            plan_routes(
                config.fleet.agent_count,
                config.world.width,
                config.world.height,
                config.planner.waypoints_per_agent,
                config.planner.seed,
            )?
        } else {
            declared_routes
        };

        let fleet = create_fleet(
            config.fleet.agent_count,
            &world,
            config.fleet.cruise_speed,
            config.fleet.spawn_seed,
            &spawns,
        )?;

        for spec in config
            .failures
            .sensor_dropouts
            .iter()
            .chain(&config.failures.comms_losses)
        {
            if !fleet.iter().any(|a| a.id == spec.agent_id) {
                return Err(MissionError::UnknownAgent(spec.agent_id.clone()));
            }
        }

        let schedule = FailureSchedule::from_config(&config.failures);
        let autonomy = Autonomy::new(config.autonomy.avoidance_radius);

        info!(
            "セッション構築完了: 機体 {}機, 障害物 {}個, ステップ予算 {}",
            fleet.len(),
            world.obstacles.len(),
            config.sim.max_steps
        );

        Ok(Self {
            config,
            world,
            fleet,
            routes,
            autonomy,
            schedule,
            step_count: 0,
            running: false,
        })
    }

    /// セッションを破棄して新しい設定で作り直します
    ///
    /// ワールド・フリート・経路・カウンタのすべてが置き換えられ、
    /// 以前のログと軌跡は失われます（完全リセット）。
    pub fn regenerate(&mut self, config: ScenarioConfig) -> Result<(), MissionError> {
        *self = Self::create(config)?;
        Ok(())
    }

    /// 実行フラグを立てます（次の `run` ループが観測する）
    pub fn start(&mut self) {
        self.running = true;
    }

    /// 停止を要求します。フレーム境界で観測される協調的な停止で、
    /// フレーム途中の機体処理が中断されることはありません
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// 次に処理されるステップ番号
    pub fn current_step(&self) -> u64 {
        self.step_count
    }

    /// 1フレーム分のミッションを進めます
    ///
    /// フリート生成順に全機体を処理し、処理後のスナップショットを
    /// 返します。1機体の故障が他機体の処理を妨げることはありません。
    pub fn step_once(&mut self) -> MissionSnapshot {
        let step = self.step_count;
        let dt = self.config.sim.dt_s;
        let world = &self.world;
        let autonomy = &self.autonomy;
        let schedule = &self.schedule;

        for (agent, route) in self.fleet.iter_mut().zip(self.routes.iter()) {
            let sensor_ok = schedule.sensor_ok(&agent.id, step);
            let comms_ok = schedule.comms_ok(&agent.id, step);

            // 経路中で最初の未到達ウェイポイントを選択。全到達なら停止
            let Some(waypoint) = select_active(route, &agent.position) else {
                agent.mode = AgentMode::Arrived;
                agent.velocity = Velocity2D::zero();
                continue;
            };

            // 通信断は自律制御そのものを上書きする（障害物回避より優先）
            if !comms_ok {
                agent.mode = AgentMode::LostComms;
                agent.push_log("Lost communications".to_string());
                agent.push_log("Comms lost -> holding position".to_string());
                continue;
            }

            let decision = autonomy.compute_control(agent, world, waypoint, dt, sensor_ok);

            agent.position = decision.position;
            agent.velocity = decision.velocity;
            agent.heading = decision.heading;
            agent.mode = decision.mode;

            if let Some(note) = decision.note {
                agent.push_log(note);
            }
            let reason_line = match decision.reason {
                ReasonCode::AvoidObstacle => format!("Step {}: avoided obstacle", step),
                ReasonCode::FollowWaypoint => format!("Step {}: following waypoint", step),
                ReasonCode::SensorDropout => format!("Step {}: sensor dropout -> safe_mode", step),
            };
            agent.push_log(reason_line);

            agent.record_position();

            debug!(
                "ステップ {}: {} mode={} pos=({:.1},{:.1})",
                step, agent.id, agent.mode, agent.position.x, agent.position.y
            );
        }

        self.step_count += 1;
        self.emit_snapshot(step)
    }

    /// ステップ予算に達するか停止要求が観測されるまでフレームを進めます
    ///
    /// # 戻り値
    ///
    /// 実行した各フレームのスナップショット（フレーム順）
    pub fn run(&mut self) -> Vec<MissionSnapshot> {
        info!("=== ミッション実行開始 ===");
        self.start();

        let mut snapshots = Vec::new();
        while self.running && self.step_count < self.config.sim.max_steps {
            snapshots.push(self.step_once());

            if self.step_count % 100 == 0 {
                let progress =
                    (self.step_count as f64 / self.config.sim.max_steps as f64) * 100.0;
                info!(
                    "進行状況: {:.1}% ({}/{}ステップ)",
                    progress, self.step_count, self.config.sim.max_steps
                );
            }
        }

        self.running = false;
        info!("=== ミッション完了 ===");
        info!("総ステップ数: {}", self.step_count);

        snapshots
    }

    /// 指定エージェントの現在スナップショットを返します
    ///
    /// 存在しないIDは `UnknownAgent` として呼び出し側に報告され、
    /// 他のエージェントには影響しません。
    pub fn inspect(&self, agent_id: &str) -> Result<AgentSnapshot, MissionError> {
        self.fleet
            .iter()
            .find(|a| a.id == agent_id)
            .map(Agent::snapshot)
            .ok_or_else(|| MissionError::UnknownAgent(agent_id.to_string()))
    }

    fn emit_snapshot(&self, step: u64) -> MissionSnapshot {
        MissionSnapshot {
            step,
            agents: self.fleet.iter().map(Agent::snapshot).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::world::Obstacle;
    use crate::scenario::{FailureSpec, FailuresConfig};

    fn demo_config() -> ScenarioConfig {
        ScenarioConfig::builtin_demo()
    }

    /// 宣言型ワールドの1機ミッション（テストの足場）
    fn declared_config(
        spawns: Vec<Position2D>,
        routes: Vec<Vec<Position2D>>,
        obstacles: Vec<Obstacle>,
    ) -> ScenarioConfig {
        let mut config = demo_config();
        config.fleet.agent_count = routes.len() as u32;
        config.world.source = WorldSource::Declared {
            obstacles,
            spawns,
            routes,
        };
        config
    }

    #[test]
    fn test_failure_schedule_latches_one_way() {
        let config = FailuresConfig {
            sensor_dropouts: vec![FailureSpec {
                agent_id: "Agent_1".to_string(),
                at_step: 5,
            }],
            comms_losses: vec![],
        };
        let schedule = FailureSchedule::from_config(&config);

        assert!(schedule.sensor_ok("Agent_1", 4));
        // 発動以降は全ステップで故障のまま（回復しない）
        assert!(!schedule.sensor_ok("Agent_1", 5));
        assert!(!schedule.sensor_ok("Agent_1", 500));
        // 他機体と他系統には影響しない
        assert!(schedule.sensor_ok("Agent_2", 500));
        assert!(schedule.comms_ok("Agent_1", 500));
    }

    #[test]
    fn test_positions_stay_in_bounds() {
        let mut session = MissionSession::create(demo_config()).unwrap();
        let snapshots = session.run();

        assert_eq!(snapshots.len(), 300);
        for snapshot in &snapshots {
            for agent in &snapshot.agents {
                assert!(agent.x >= 0.0 && agent.x <= 100.0, "x={} が領域外", agent.x);
                assert!(agent.y >= 0.0 && agent.y <= 100.0, "y={} が領域外", agent.y);
                assert!(session.world.contains(&Position2D::new(agent.x, agent.y)));
            }
        }
    }

    #[test]
    fn test_full_run_is_deterministic() {
        let mut a = MissionSession::create(demo_config()).unwrap();
        let mut b = MissionSession::create(demo_config()).unwrap();

        let last_a = a.run().pop().unwrap();
        let last_b = b.run().pop().unwrap();

        for (x, y) in last_a.agents.iter().zip(last_b.agents.iter()) {
            assert_eq!(x.x, y.x);
            assert_eq!(x.y, y.y);
            assert_eq!(x.mode, y.mode);
        }
    }

    #[test]
    fn test_arrived_position_is_idempotent() {
        // スポーン位置が唯一のウェイポイントの許容量内 → 最初から到達済み
        let config = declared_config(
            vec![Position2D::new(30.0, 30.0)],
            vec![vec![Position2D::new(30.5, 30.2)]],
            vec![],
        );
        let mut session = MissionSession::create(config).unwrap();

        for _ in 0..5 {
            let snapshot = session.step_once();
            let agent = &snapshot.agents[0];
            assert_eq!(agent.mode, AgentMode::Arrived);
            assert_eq!(agent.x, 30.0);
            assert_eq!(agent.y, 30.0);
            assert_eq!(agent.vx, 0.0);
            assert_eq!(agent.vy, 0.0);
        }
    }

    #[test]
    fn test_lost_comms_freezes_position() {
        let mut config = demo_config();
        config.failures.comms_losses.push(FailureSpec {
            agent_id: "Agent_2".to_string(),
            at_step: 3,
        });
        let mut session = MissionSession::create(config).unwrap();
        let snapshots = session.run();

        let frozen = &snapshots[3].agents[1];
        assert_eq!(frozen.mode, AgentMode::LostComms);
        for snapshot in &snapshots[3..] {
            let agent = &snapshot.agents[1];
            assert_eq!(agent.x, frozen.x);
            assert_eq!(agent.y, frozen.y);
            assert_eq!(agent.mode, AgentMode::LostComms);
        }

        // 他機体は通常どおり動き続けている
        assert_ne!(snapshots[3].agents[0].x, snapshots[250].agents[0].x);
    }

    #[test]
    fn test_sensor_dropout_enters_safe_mode() {
        let mut config = demo_config();
        config.failures.sensor_dropouts.push(FailureSpec {
            agent_id: "Agent_1".to_string(),
            at_step: 0,
        });
        let mut session = MissionSession::create(config).unwrap();

        let before = session.inspect("Agent_1").unwrap();
        let snapshot = session.step_once();
        let agent = &snapshot.agents[0];

        assert_eq!(agent.mode, AgentMode::SafeMode);
        assert_eq!(agent.x, before.x);
        assert_eq!(agent.y, before.y);
        assert!(
            agent
                .recent_log
                .iter()
                .any(|line| line.contains("sensor dropout"))
        );
    }

    #[test]
    fn test_waypoint_progression_to_arrival() {
        let config = declared_config(
            vec![Position2D::new(5.0, 5.0)],
            vec![vec![Position2D::new(8.0, 5.0), Position2D::new(20.0, 5.0)]],
            vec![],
        );
        let mut session = MissionSession::create(config).unwrap();
        let snapshots = session.run();

        let last = snapshots.last().unwrap();
        let agent = &last.agents[0];
        assert_eq!(agent.mode, AgentMode::Arrived);
        // 最終ウェイポイントの到達許容量内で停止している
        assert!((agent.x - 20.0).abs() <= 1.5);
        assert!((agent.y - 5.0).abs() <= 1.5);
    }

    #[test]
    fn test_failure_config_rejects_unknown_agent() {
        let mut config = demo_config();
        config.failures.comms_losses.push(FailureSpec {
            agent_id: "Agent_99".to_string(),
            at_step: 10,
        });
        let err = MissionSession::create(config).unwrap_err();
        assert!(matches!(err, MissionError::UnknownAgent(_)));
    }

    #[test]
    fn test_inspect_unknown_agent() {
        let session = MissionSession::create(demo_config()).unwrap();
        assert!(session.inspect("Agent_1").is_ok());
        assert!(matches!(
            session.inspect("Agent_99"),
            Err(MissionError::UnknownAgent(_))
        ));
    }

    #[test]
    fn test_regenerate_discards_all_state() {
        let mut session = MissionSession::create(demo_config()).unwrap();
        for _ in 0..5 {
            session.step_once();
        }
        assert_eq!(session.current_step(), 5);

        session.regenerate(demo_config()).unwrap();
        assert_eq!(session.current_step(), 0);

        let agent = session.inspect("Agent_1").unwrap();
        assert_eq!(agent.mode, AgentMode::Idle);
        assert!(agent.recent_log.is_empty());
    }

    #[test]
    fn test_snapshot_step_indexing() {
        let mut session = MissionSession::create(demo_config()).unwrap();
        let snapshot = session.step_once();
        assert_eq!(snapshot.step, 0);
        assert_eq!(session.current_step(), 1);
    }

    #[test]
    fn test_run_honors_step_budget() {
        let mut config = demo_config();
        config.sim.max_steps = 10;
        let mut session = MissionSession::create(config).unwrap();

        let snapshots = session.run();
        assert_eq!(snapshots.len(), 10);
        assert_eq!(session.current_step(), 10);
        assert!(!session.is_running());

        // 予算消化後の run は1フレームも追加しない
        assert!(session.run().is_empty());

        // 停止要求はフラグを下ろすだけで状態を壊さない
        session.start();
        session.stop();
        assert!(!session.is_running());
        assert_eq!(session.current_step(), 10);
    }
}
