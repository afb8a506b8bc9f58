//! 2D幾何カーネル
//!
//! すべて度単位。入力は画像座標（Y下向き）の点。

use nalgebra::{distance as nalgebra_distance, Point2};

/// 点 b における角 ABC (0°〜180°)
///
/// b→a または b→c が長さ0なら None（退化）。
pub fn angle_at_vertex(a: Point2<f64>, b: Point2<f64>, c: Point2<f64>) -> Option<f64> {
    let ba = a - b;
    let bc = c - b;
    let denom = ba.norm() * bc.norm();
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    // acos は ±1 付近で精度が落ちるので atan2(|外積|, 内積) で求める
    let angle = f64::atan2(ba.perp(&bc).abs(), ba.dot(&bc)).to_degrees();
    angle.is_finite().then_some(angle)
}

/// ベクトル p1→p2 の水平軸からの角度 [0°, 360°)
///
/// 画像座標はYが下向きなので反転し、画面上方向が90°になる。
pub fn line_angle_vs_horizontal(p1: Point2<f64>, p2: Point2<f64>) -> f64 {
    let dx = p2.x - p1.x;
    let dy = p2.y - p1.y;
    let deg = f64::atan2(-dy, dx).to_degrees().rem_euclid(360.0);
    if deg >= 360.0 { 0.0 } else { deg }
}

/// ベクトル p1→p2 の鉛直上向きからの傾き [0°, 180°]
///
/// 0° = 真上。p1 == p2 なら None。
pub fn line_angle_from_vertical(p1: Point2<f64>, p2: Point2<f64>) -> Option<f64> {
    if p1 == p2 {
        return None;
    }
    let horizontal = line_angle_vs_horizontal(p1, p2);
    Some(normalize_to_180((90.0 - horizontal).abs()))
}

/// 線分の水平からの傾き [0°, 90°]（向きは問わない）
pub fn line_tilt_from_horizontal(p1: Point2<f64>, p2: Point2<f64>) -> Option<f64> {
    if p1 == p2 {
        return None;
    }
    let folded = normalize_to_180(line_angle_vs_horizontal(p1, p2));
    Some(folded.min(180.0 - folded))
}

/// ユークリッド距離
pub fn distance(a: Point2<f64>, b: Point2<f64>) -> f64 {
    nalgebra_distance(&a, &b)
}

/// 2点の中点
pub fn midpoint(a: Point2<f64>, b: Point2<f64>) -> Point2<f64> {
    nalgebra::center(&a, &b)
}

/// 任意の角度を [0°, 180°] に折り返す（NaN はそのまま）
pub fn normalize_to_180(angle: f64) -> f64 {
    if angle.is_nan() {
        return angle;
    }
    let wrapped = angle.rem_euclid(360.0);
    if wrapped > 180.0 { 360.0 - wrapped } else { wrapped }
}
