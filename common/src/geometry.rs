//! ドキュメント座標系の矩形
//!
//! 座標はすべてポイント単位（Excelの Shape.Top / Range.Top と同じ）。
//! 一度取得した矩形はスナップショットとして扱い、変更しない。

use serde::{Deserialize, Serialize};

/// 浮動小数点比較の許容誤差
pub const GEOMETRY_EPSILON: f64 = 1e-6;

/// 2次元の点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// ユークリッド距離
    pub fn distance_to(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// 矩形スナップショット {top, left, width, height}
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self { top, left, width, height }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.left + self.width / 2.0, self.top + self.height / 2.0)
    }

    /// 全フィールドが有限値か
    pub fn is_finite(&self) -> bool {
        self.top.is_finite()
            && self.left.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
    }

    /// 点が矩形内にあるか（境界を含む）
    pub fn contains_point(&self, point: &Point) -> bool {
        self.left <= point.x
            && point.x <= self.right()
            && self.top <= point.y
            && point.y <= self.bottom()
    }

    /// `other` の外接矩形が、自身を `padding` 広げた範囲に収まるか（境界を含む）
    pub fn contains_rect_padded(&self, other: &Rect, padding: f64) -> bool {
        other.left >= self.left - padding
            && other.top >= self.top - padding
            && other.right() <= self.right() + padding
            && other.bottom() <= self.bottom() + padding
    }

    /// サイズを倍率で拡大し、左上を指定座標へ移動した矩形
    pub fn scaled_at(&self, scale: f64, top: f64, left: f64) -> Rect {
        Rect {
            top,
            left,
            width: self.width * scale,
            height: self.height * scale,
        }
    }

    /// 許容誤差内で等しいか
    pub fn approx_eq(&self, other: &Rect) -> bool {
        (self.top - other.top).abs() <= GEOMETRY_EPSILON
            && (self.left - other.left).abs() <= GEOMETRY_EPSILON
            && (self.width - other.width).abs() <= GEOMETRY_EPSILON
            && (self.height - other.height).abs() <= GEOMETRY_EPSILON
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(top={:.2}, left={:.2}, {:.2}x{:.2})",
            self.top, self.left, self.width, self.height
        )
    }
}
