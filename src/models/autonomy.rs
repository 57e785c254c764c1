use crate::models::agent::Agent;
use crate::models::common::{AgentMode, Position2D, ReasonCode, Velocity2D, math_utils};
use crate::models::world::World;

/// 障害物回避の発動距離（障害物半径に加算される余裕距離）のデフォルト
pub const DEFAULT_AVOIDANCE_RADIUS: f64 = 10.0;
/// 回避操舵における離反方位の混合比率（目標方位は 1 - この値）
const AWAY_BLEND_WEIGHT: f64 = 0.7;
/// 速度整形の下限（匍匐速度。これ未満には減速しない）
const CREEP_SPEED: f64 = 0.2;
/// 接近減速を開始する目標距離
const APPROACH_DISTANCE: f64 = 3.0;
/// 接近減速時の速度係数
const APPROACH_SPEED_FACTOR: f64 = 0.3;
/// 到達とみなす目標距離
const ARRIVE_DISTANCE: f64 = 0.5;

/// 1ステップ分の制御判断の結果レコード
///
/// 自律制御は共有状態を書き換えず、この結果だけを返します。運動状態・
/// モードの適用とログ追記は呼び出し側（ミッションステッパー）の責務です。
#[derive(Debug, Clone)]
pub struct ControlDecision {
    /// 適用すべき新しい位置（領域内に丸め込み済み）
    pub position: Position2D,
    /// 適用すべき新しい速度ベクトル
    pub velocity: Velocity2D,
    /// 適用すべき新しい方位角（ラジアン）
    pub heading: f64,
    /// 遷移先の行動モード
    pub mode: AgentMode,
    /// 判断の根拠コード
    pub reason: ReasonCode,
    /// エージェントログに追記すべき説明文（ない場合は None）
    pub note: Option<String>,
}

/// 自律制御コントローラ
///
/// ウェイポイント追従・反応型障害物回避・センサー喪失時の安全停止を
/// 担う純粋な判断器です。エージェント1機の現在状態と選択済みウェイ
/// ポイントから次ステップの運動とモード遷移を決定します。
///
/// 判断の優先順位:
///
/// 1. センサー喪失 → `SafeMode` で停止（全ての移動判断に優先）
/// 2. 障害物近接 → `Avoiding` で離反方位寄りに操舵
/// 3. それ以外 → `Navigating`/`Arrived` でウェイポイント直進
#[derive(Debug, Clone)]
pub struct Autonomy {
    /// 回避発動の余裕距離（障害物半径に加算）
    pub avoidance_radius: f64,
}

impl Autonomy {
    pub fn new(avoidance_radius: f64) -> Self {
        Self { avoidance_radius }
    }

    /// 1ステップ分の制御判断を行います
    ///
    /// エージェントの状態は読み取るだけで書き換えません。
    ///
    /// # 引数
    ///
    /// * `agent` - 対象エージェントの現在状態
    /// * `world` - 領域寸法と障害物集合（読み取り専用共有）
    /// * `waypoint` - 呼び出し側が選択した現在の目標ウェイポイント
    /// * `dt` - 時間刻み
    /// * `sensor_ok` - このステップのセンサー健全性
    ///
    /// # 戻り値
    ///
    /// 適用すべき運動・モード・根拠を束ねた判断結果
    pub fn compute_control(
        &self,
        agent: &Agent,
        world: &World,
        waypoint: Position2D,
        dt: f64,
        sensor_ok: bool,
    ) -> ControlDecision {
        // センサー喪失はあらゆる移動判断に優先する
        if !sensor_ok {
            return ControlDecision {
                position: agent.position,
                velocity: agent.velocity,
                heading: agent.heading,
                mode: AgentMode::SafeMode,
                reason: ReasonCode::SensorDropout,
                note: Some("Sensor dropout -> safe_mode (stop)".to_string()),
            };
        }

        let target_heading = agent.position.bearing_to(&waypoint);
        let distance_to_target = agent.position.distance_to(&waypoint);

        // 反応型の障害物チェック。走査順で最初に近接条件を満たした
        // 障害物が採用される（最近傍選択ではない。生成順が決定的なので
        // 実行ごとの再現性は保たれる）
        for obs in &world.obstacles {
            let d = agent.position.distance_to(&obs.center());
            if d < obs.radius + self.avoidance_radius {
                let away_heading = obs.center().bearing_to(&agent.position);
                // 目標方位と離反方位のスカラー混合。角度の折り返しは
                // 考慮しない（離反側の重みが支配的）
                let new_heading = (1.0 - AWAY_BLEND_WEIGHT) * target_heading
                    + AWAY_BLEND_WEIGHT * away_heading;
                let speed = math_utils::clamp(agent.speed, CREEP_SPEED, agent.speed);
                let velocity = Velocity2D::from_heading(new_heading, speed);
                let position =
                    (agent.position + velocity * dt).clamped_to(world.width, world.height);

                return ControlDecision {
                    position,
                    velocity,
                    heading: new_heading,
                    mode: AgentMode::Avoiding,
                    reason: ReasonCode::AvoidObstacle,
                    note: Some(format!("Obstacle near ({:.1},{:.1}) -> avoiding", obs.x, obs.y)),
                };
            }
        }

        // 障害物なし: ウェイポイントへ直進。接近時は減速する
        let speed = if distance_to_target < APPROACH_DISTANCE {
            (agent.speed * APPROACH_SPEED_FACTOR).max(CREEP_SPEED)
        } else {
            agent.speed
        };

        let mode = if distance_to_target > ARRIVE_DISTANCE {
            AgentMode::Navigating
        } else {
            AgentMode::Arrived
        };

        let velocity = Velocity2D::from_heading(target_heading, speed);
        let position = (agent.position + velocity * dt).clamped_to(world.width, world.height);

        let note = if mode == AgentMode::Arrived {
            Some(format!("Arrived at waypoint ({:.1},{:.1})", waypoint.x, waypoint.y))
        } else {
            None
        };

        ControlDecision {
            position,
            velocity,
            heading: target_heading,
            mode,
            reason: ReasonCode::FollowWaypoint,
            note,
        }
    }
}

impl Default for Autonomy {
    fn default() -> Self {
        Self::new(DEFAULT_AVOIDANCE_RADIUS)
    }
}
