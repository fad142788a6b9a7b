use std::ops::Sub;

use serde::{Deserialize, Serialize};

/// WGS-84 長半径 (m)
pub const WGS84_A_M: f64 = 6_378_137.0;
/// WGS-84 扁平率
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// 地球中心・地球固定座標 (ECEF) の位置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64, // m
    pub y: f64, // m
    pub z: f64, // m
}

impl Location {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// 測地座標（緯度・経度[度]、楕円体高[m]）から ECEF 座標を計算
    pub fn from_geodetic(latitude_deg: f64, longitude_deg: f64, elevation_m: f64) -> Self {
        let lat = math_utils::deg_to_rad(latitude_deg);
        let lon = math_utils::deg_to_rad(longitude_deg);
        let e2 = WGS84_F * (2.0 - WGS84_F);
        let n = WGS84_A_M / (1.0 - e2 * lat.sin().powi(2)).sqrt();

        Self {
            x: (n + elevation_m) * lat.cos() * lon.cos(),
            y: (n + elevation_m) * lat.cos() * lon.sin(),
            z: (n * (1.0 - e2) + elevation_m) * lat.sin(),
        }
    }

    /// 原点（地球中心）からの距離
    pub fn magnitude(&self) -> f64 {
        (self.x.powi(2) + self.y.powi(2) + self.z.powi(2)).sqrt()
    }

    /// 3次元距離を計算
    pub fn distance(&self, other: &Location) -> f64 {
        (*self - *other).magnitude()
    }

    pub fn dot(&self, other: &Location) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// 単位ベクトル。長さ0の場合は None
    pub fn unit(&self) -> Option<Location> {
        let mag = self.magnitude();
        if mag > 0.0 {
            Some(Location::new(self.x / mag, self.y / mag, self.z / mag))
        } else {
            None
        }
    }
}

impl Sub for Location {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

/// 地上ノードから見た宇宙ノードの仰角（度）
///
/// 地心方向を天頂とみなし、`asin(unit(space - ground) · unit(ground))` で求めます。
/// 上向き・下向きのどちらの視野でも同じ式を使います。
/// 位置が一致するなど方向が定まらない場合は None。
pub fn elevation_deg(ground: &Location, space: &Location) -> Option<f64> {
    let up = ground.unit()?;
    let line_of_sight = (*space - *ground).unit()?;
    Some(math_utils::rad_to_deg(line_of_sight.dot(&up).clamp(-1.0, 1.0).asin()))
}

/// 視野内のノード
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleNode {
    pub node_id: u32,
    pub elevation_deg: f64,
}

/// 最低仰角以上に見える候補を候補順のまま返す
///
/// `observer_on_ground` が true の場合は観測者を地上側、候補を宇宙側として計算し、
/// false の場合（衛星からの下向き視野）は候補を地上側として計算します。
pub fn visible_nodes<I>(
    observer: &Location,
    observer_on_ground: bool,
    candidates: I,
    min_elevation_deg: f64,
) -> Vec<VisibleNode>
where
    I: IntoIterator<Item = (u32, Location)>,
{
    candidates
        .into_iter()
        .filter_map(|(node_id, location)| {
            let elevation = if observer_on_ground {
                elevation_deg(observer, &location)
            } else {
                elevation_deg(&location, observer)
            }?;
            (elevation >= min_elevation_deg).then_some(VisibleNode {
                node_id,
                elevation_deg: elevation,
            })
        })
        .collect()
}

/// 数学ユーティリティ関数
pub mod math_utils {
    /// 度をラジアンに変換
    pub fn deg_to_rad(degrees: f64) -> f64 {
        degrees * std::f64::consts::PI / 180.0
    }

    /// ラジアンを度に変換
    pub fn rad_to_deg(radians: f64) -> f64 {
        radians * 180.0 / std::f64::consts::PI
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geodetic_equator_and_pole() {
        let equator = Location::from_geodetic(0.0, 0.0, 0.0);
        assert!((equator.x - WGS84_A_M).abs() < 1e-6);
        assert!(equator.y.abs() < 1e-6 && equator.z.abs() < 1e-6);

        let east = Location::from_geodetic(0.0, 90.0, 1000.0);
        assert!((east.y - (WGS84_A_M + 1000.0)).abs() < 1e-6);

        // 極半径 約6356752m
        let pole = Location::from_geodetic(90.0, 0.0, 0.0);
        assert!((pole.z - 6_356_752.314).abs() < 0.01);
    }

    #[test]
    fn test_elevation_angles() {
        let gs = Location::from_geodetic(0.0, 0.0, 0.0);
        let overhead = Location::new(WGS84_A_M + 550_000.0, 0.0, 0.0);
        let horizon = Location::new(WGS84_A_M, 1_000_000.0, 0.0);
        let below = Location::new(WGS84_A_M - 10_000.0, 1_000_000.0, 0.0);

        assert!((elevation_deg(&gs, &overhead).unwrap() - 90.0).abs() < 1e-9);
        assert!(elevation_deg(&gs, &horizon).unwrap().abs() < 1e-9);
        assert!(elevation_deg(&gs, &below).unwrap() < 0.0);
        assert_eq!(elevation_deg(&gs, &gs), None);
    }

    #[test]
    fn test_visible_nodes_filters_by_min_elevation() {
        let gs = Location::from_geodetic(0.0, 0.0, 0.0);
        let sats = vec![
            (1, Location::new(WGS84_A_M + 550_000.0, 0.0, 0.0)),
            (2, Location::new(WGS84_A_M + 550_000.0, 3_000_000.0, 0.0)),
            (3, Location::new(WGS84_A_M + 550_000.0, 550_000.0, 0.0)),
        ];

        let up = visible_nodes(&gs, true, sats.clone(), 25.0);
        let ids: Vec<u32> = up.iter().map(|v| v.node_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!((up[1].elevation_deg - 45.0).abs() < 1e-9);

        // 衛星1からの下向き視野でも同じ仰角になる
        let down = visible_nodes(&sats[0].1, false, vec![(10, gs)], 25.0);
        assert_eq!(down.len(), 1);
        assert!((down[0].elevation_deg - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_distance() {
        let a = Location::new(1.0, 2.0, 2.0);
        assert_eq!(a.magnitude(), 3.0);
        assert_eq!(a.distance(&Location::new(1.0, 2.0, 2.0)), 0.0);
        assert_eq!(a.distance(&Location::new(4.0, 6.0, 2.0)), 5.0);
    }
}
