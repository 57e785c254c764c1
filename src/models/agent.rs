use std::collections::VecDeque;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::models::common::{AgentMode, Position2D, Velocity2D};
use crate::models::world::{INTERIOR_MARGIN, World};
use crate::simulation::MissionError;

/// エージェントログの保持上限（超過時は古い行から破棄）
pub const LOG_CAPACITY: usize = 64;
/// 軌跡履歴の保持上限（超過時は古い位置から破棄）
pub const TRAJECTORY_CAPACITY: usize = 4096;
/// スナップショットに載せる直近ログ行数
pub const SNAPSHOT_LOG_LINES: usize = 5;

/// 自律エージェント
///
/// フリート内の1機体が持つ可変状態です。運動状態・行動モード・説明ログ・
/// 軌跡履歴を保持し、毎フレーム、ミッションステッパーだけが書き換えます。
/// フリート再生成時は過去のログと軌跡ごと破棄されます（完全リセット）。
#[derive(Debug, Clone)]
pub struct Agent {
    /// エージェントの一意識別子（"Agent_1" 形式、フリート内で安定）
    pub id: String,
    /// 現在位置
    pub position: Position2D,
    /// 現在の速度ベクトル
    pub velocity: Velocity2D,
    /// 現在の方位角（ラジアン）
    pub heading: f64,
    /// 公称巡航速度（速度整形の上限値）
    pub speed: f64,
    /// 現在の行動モード
    pub mode: AgentMode,
    /// 説明ログ（追記専用、上限付きリング）
    log: VecDeque<String>,
    /// 訪問位置の軌跡（追記専用、上限付きリング）
    trajectory: VecDeque<Position2D>,
}

impl Agent {
    /// 新しいエージェントを作成します
    ///
    /// 初期モードは `Idle`、速度ベクトルはゼロで、軌跡はスポーン位置
    /// 1点から始まります。
    pub fn new(id: String, position: Position2D, cruise_speed: f64) -> Self {
        let mut trajectory = VecDeque::with_capacity(64);
        trajectory.push_back(position);

        Self {
            id,
            position,
            velocity: Velocity2D::zero(),
            heading: 0.0,
            speed: cruise_speed,
            mode: AgentMode::Idle,
            log: VecDeque::new(),
            trajectory,
        }
    }

    /// 説明ログを追記します（上限超過時は最古行を破棄）
    pub fn push_log(&mut self, entry: String) {
        if self.log.len() == LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(entry);
    }

    /// 直近 n 行のログを古い順で複製して返します
    pub fn recent_log(&self, n: usize) -> Vec<String> {
        let skip = self.log.len().saturating_sub(n);
        self.log.iter().skip(skip).cloned().collect()
    }

    /// 現在位置を軌跡履歴に追記します（上限超過時は最古点を破棄）
    pub fn record_position(&mut self) {
        if self.trajectory.len() == TRAJECTORY_CAPACITY {
            self.trajectory.pop_front();
        }
        self.trajectory.push_back(self.position);
    }

    /// 軌跡履歴（古い順）
    pub fn trajectory(&self) -> impl Iterator<Item = &Position2D> {
        self.trajectory.iter()
    }

    /// 描画層向けの読み取り専用スナップショットを複製して返します
    ///
    /// 内部の可変状態への参照は一切含みません（コピーオンエミット）。
    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id.clone(),
            x: self.position.x,
            y: self.position.y,
            vx: self.velocity.x,
            vy: self.velocity.y,
            speed: self.speed,
            heading: self.heading,
            mode: self.mode,
            recent_log: self.recent_log(SNAPSHOT_LOG_LINES),
        }
    }
}

/// エージェント状態の読み取り専用射影
///
/// フレーム境界で発行され、描画層はこれだけを消費します。
#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub speed: f64,
    pub heading: f64,
    pub mode: AgentMode,
    pub recent_log: Vec<String>,
}

/// フリートを生成します
///
/// スポーン位置は宣言型スポーン点が与えられていればそれを巡回使用し、
/// なければ領域内側 [5, dim-5] の一様乱数（spawn_seed 専用ストリーム）で
/// 決定します。再生成は常に全エージェントの作り直しです。
///
/// # 引数
///
/// * `agent_count` - 生成する機体数
/// * `world` - スポーン先のワールド（領域寸法のみ参照）
/// * `cruise_speed` - 各機体の公称巡航速度
/// * `spawn_seed` - ランダムスポーン用のシード値
/// * `declared_spawns` - 宣言型スポーン点（空なら未使用）
///
/// # 戻り値
///
/// 生成されたエージェント列。領域がスポーンマージンを確保できない場合は
/// `MissionError::InvalidParameter`
pub fn create_fleet(
    agent_count: u32,
    world: &World,
    cruise_speed: f64,
    spawn_seed: u64,
    declared_spawns: &[Position2D],
) -> Result<Vec<Agent>, MissionError> {
    if !declared_spawns.is_empty() {
        let agents = (0..agent_count)
            .map(|i| {
                let spawn = declared_spawns[i as usize % declared_spawns.len()];
                Agent::new(format!("Agent_{}", i + 1), spawn, cruise_speed)
            })
            .collect();
        return Ok(agents);
    }

    if world.width <= 2.0 * INTERIOR_MARGIN || world.height <= 2.0 * INTERIOR_MARGIN {
        return Err(MissionError::InvalidParameter(format!(
            "領域 {}x{} はスポーンマージン {} を確保できません",
            world.width, world.height, INTERIOR_MARGIN
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(spawn_seed);
    let mut agents = Vec::with_capacity(agent_count as usize);

    for i in 0..agent_count {
        let x = rng.gen_range(INTERIOR_MARGIN..world.width - INTERIOR_MARGIN);
        let y = rng.gen_range(INTERIOR_MARGIN..world.height - INTERIOR_MARGIN);
        agents.push(Agent::new(
            format!("Agent_{}", i + 1),
            Position2D::new(x, y),
            cruise_speed,
        ));
    }

    Ok(agents)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_world() -> World {
        World::generate(100.0, 100.0, 0, 1).unwrap()
    }

    #[test]
    fn test_new_agent_initial_state() {
        let agent = Agent::new("Agent_1".to_string(), Position2D::new(10.0, 20.0), 1.0);
        assert_eq!(agent.mode, AgentMode::Idle);
        assert_eq!(agent.velocity, Velocity2D::zero());
        assert_eq!(agent.trajectory().count(), 1);
    }

    #[test]
    fn test_log_ring_is_bounded() {
        let mut agent = Agent::new("Agent_1".to_string(), Position2D::new(0.0, 0.0), 1.0);
        for i in 0..(LOG_CAPACITY + 10) {
            agent.push_log(format!("entry {}", i));
        }
        assert_eq!(agent.recent_log(usize::MAX).len(), LOG_CAPACITY);
        // 最新行が残り、最古行が落ちている
        let recent = agent.recent_log(1);
        assert_eq!(recent[0], format!("entry {}", LOG_CAPACITY + 9));
    }

    #[test]
    fn test_trajectory_ring_is_bounded() {
        let mut agent = Agent::new("Agent_1".to_string(), Position2D::new(0.0, 0.0), 1.0);
        for _ in 0..(TRAJECTORY_CAPACITY + 50) {
            agent.record_position();
        }
        assert_eq!(agent.trajectory().count(), TRAJECTORY_CAPACITY);
    }

    #[test]
    fn test_create_fleet_deterministic_and_interior() {
        let world = empty_world();
        let a = create_fleet(4, &world, 1.0, 7, &[]).unwrap();
        let b = create_fleet(4, &world, 1.0, 7, &[]).unwrap();
        assert_eq!(a.len(), 4);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.position, y.position);
        }
        for agent in &a {
            assert!(agent.position.x >= INTERIOR_MARGIN);
            assert!(agent.position.x <= world.width - INTERIOR_MARGIN);
            assert!(agent.position.y >= INTERIOR_MARGIN);
            assert!(agent.position.y <= world.height - INTERIOR_MARGIN);
        }
        assert_eq!(a[0].id, "Agent_1");
        assert_eq!(a[3].id, "Agent_4");
    }

    #[test]
    fn test_create_fleet_cycles_declared_spawns() {
        let world = empty_world();
        let spawns = vec![Position2D::new(10.0, 10.0), Position2D::new(90.0, 90.0)];
        let fleet = create_fleet(3, &world, 1.0, 0, &spawns).unwrap();
        assert_eq!(fleet[0].position, spawns[0]);
        assert_eq!(fleet[1].position, spawns[1]);
        assert_eq!(fleet[2].position, spawns[0]); // リストを一巡して先頭へ戻る
    }

    #[test]
    fn test_snapshot_does_not_alias_live_state() {
        let mut agent = Agent::new("Agent_1".to_string(), Position2D::new(1.0, 2.0), 1.0);
        agent.push_log("before".to_string());
        let snap = agent.snapshot();

        agent.position = Position2D::new(50.0, 50.0);
        agent.push_log("after".to_string());

        assert_eq!(snap.x, 1.0);
        assert_eq!(snap.y, 2.0);
        assert_eq!(snap.recent_log, vec!["before".to_string()]);
    }
}
