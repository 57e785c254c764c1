use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::models::common::Position2D;
use crate::models::world::INTERIOR_MARGIN;
use crate::simulation::MissionError;

/// ウェイポイント到達判定の許容量（X・Y両軸の偏差がこの値以下で到達）
pub const REACH_TOLERANCE: f64 = 1.5;

/// 各エージェントのウェイポイント経路を生成します
///
/// フリート生成時に一度だけ呼ばれ、以後は読み取り専用です。乱数列は
/// ウェイポイント専用シードの ChaCha8 ストリームで、ワールドの障害物
/// シードとは共有も派生もしません（両者の再現性を独立に保つため）。
/// 消費順はエージェント順・ウェイポイント順に x, y です。
///
/// # 引数
///
/// * `agent_count` - 経路を割り当てるエージェント数
/// * `width` - 領域の幅
/// * `height` - 領域の高さ
/// * `waypoints_per_agent` - 1機あたりのウェイポイント数（固定長）
/// * `seed` - ウェイポイント生成専用のシード値
///
/// # 戻り値
///
/// エージェントごとの順序付きウェイポイント列。領域が内側マージンを
/// 確保できない場合は `MissionError::InvalidParameter`
pub fn plan_routes(
    agent_count: u32,
    width: f64,
    height: f64,
    waypoints_per_agent: u32,
    seed: u64,
) -> Result<Vec<Vec<Position2D>>, MissionError> {
    if waypoints_per_agent > 0 && (width <= 2.0 * INTERIOR_MARGIN || height <= 2.0 * INTERIOR_MARGIN)
    {
        return Err(MissionError::InvalidParameter(format!(
            "領域 {}x{} はウェイポイントマージン {} を確保できません",
            width, height, INTERIOR_MARGIN
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut routes = Vec::with_capacity(agent_count as usize);

    for _ in 0..agent_count {
        let mut route = Vec::with_capacity(waypoints_per_agent as usize);
        for _ in 0..waypoints_per_agent {
            let x = rng.gen_range(INTERIOR_MARGIN..width - INTERIOR_MARGIN);
            let y = rng.gen_range(INTERIOR_MARGIN..height - INTERIOR_MARGIN);
            route.push(Position2D::new(x, y));
        }
        routes.push(route);
    }

    Ok(routes)
}

/// ウェイポイント到達判定
///
/// X・Y両軸の偏差がともに許容量以下なら到達とみなします
/// （ユークリッド距離ではなく軸ごとの判定）。
pub fn is_reached(position: &Position2D, waypoint: &Position2D) -> bool {
    (position.x - waypoint.x).abs() <= REACH_TOLERANCE
        && (position.y - waypoint.y).abs() <= REACH_TOLERANCE
}

/// 経路中で最初の未到達ウェイポイントを選択します
///
/// 全て到達済みの場合は `None`（エージェントは `Arrived` で停止）。
pub fn select_active(route: &[Position2D], position: &Position2D) -> Option<Position2D> {
    route.iter().find(|&wp| !is_reached(position, wp)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_routes_deterministic() {
        let a = plan_routes(4, 100.0, 100.0, 3, 1234).unwrap();
        let b = plan_routes(4, 100.0, 100.0, 3, 1234).unwrap();
        assert_eq!(a, b);

        let c = plan_routes(4, 100.0, 100.0, 3, 999).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_plan_routes_shape_and_interior() {
        let routes = plan_routes(3, 100.0, 60.0, 5, 1234).unwrap();
        assert_eq!(routes.len(), 3);
        for route in &routes {
            assert_eq!(route.len(), 5);
            for wp in route {
                assert!(wp.x >= INTERIOR_MARGIN && wp.x <= 100.0 - INTERIOR_MARGIN);
                assert!(wp.y >= INTERIOR_MARGIN && wp.y <= 60.0 - INTERIOR_MARGIN);
            }
        }
    }

    #[test]
    fn test_reach_tolerance_is_per_axis() {
        // 両軸の偏差が1.5以内なら到達
        assert!(is_reached(
            &Position2D::new(9.0, 0.0),
            &Position2D::new(10.0, 0.0)
        ));
        assert!(is_reached(
            &Position2D::new(10.0, 1.5),
            &Position2D::new(10.0, 0.0)
        ));
        // 片軸でも超えれば未到達
        assert!(!is_reached(
            &Position2D::new(8.4, 0.0),
            &Position2D::new(10.0, 0.0)
        ));
    }

    #[test]
    fn test_select_active_skips_reached() {
        let route = vec![
            Position2D::new(10.0, 0.0),
            Position2D::new(20.0, 0.0),
            Position2D::new(30.0, 0.0),
        ];
        // 先頭は到達済み → 2番目が有効ウェイポイントになる
        let active = select_active(&route, &Position2D::new(9.0, 0.0));
        assert_eq!(active, Some(Position2D::new(20.0, 0.0)));

        // 全て到達済み
        let done = select_active(&route[..1], &Position2D::new(10.0, 0.0));
        assert_eq!(done, None);
    }
}
