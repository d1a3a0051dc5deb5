//! 画像と行の空間マッチング
//!
//! 浮動図形の座標は、対応する行の基準セルとおおまかにしか一致しない。
//! 2段階で照合する:
//!
//! - Pass 1（許容 20）: 最も近い基準セルに対し、
//!   中心がセル内 / 中心同士が近い / 外接矩形がセル±許容内 のいずれかで採用
//! - Pass 2（許容 30）: Pass 1 で不採用の画像を、同じ最近傍行の
//!   外接矩形条件のみで再判定。既に割り当て済みの行は上書きしない
//!
//! 行の割り当ては先着優先。後から同じ行に採用された画像は破棄する。

use crate::geometry::Rect;
use crate::types::{RowKey, ShapeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pass 1 の許容値
pub const STRICT_TOLERANCE: f64 = 20.0;

/// Pass 2 の許容値
pub const RELAXED_TOLERANCE: f64 = 30.0;

/// 照合対象の画像スナップショット
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PictureSnapshot {
    pub id: ShapeId,
    pub rect: Rect,
}

/// 採用条件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchBasis {
    /// 画像中心がセル内
    InCell,
    /// 中心同士が許容値未満
    NearCenter,
    /// 外接矩形がセル±許容値内
    InBoundary,
}

impl std::fmt::Display for MatchBasis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchBasis::InCell => write!(f, "セル内"),
            MatchBasis::NearCenter => write!(f, "セル中心付近"),
            MatchBasis::InBoundary => write!(f, "セル境界内"),
        }
    }
}

/// どちらのパスで採用されたか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchPass {
    Strict,
    Relaxed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub row: RowKey,
    pub picture: ShapeId,
    pub distance: f64,
    pub basis: MatchBasis,
    pub pass: MatchPass,
}

/// Pass 1 で不採用になった画像
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedPicture {
    pub picture: ShapeId,
    pub nearest_row: Option<RowKey>,
    pub distance: f64,
}

/// 照合の判断ログ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchDecision {
    Accepted(MatchRecord),
    /// Pass 1 で条件を満たさなかった
    Deferred(UnmatchedPicture),
    /// 採用条件は満たしたが行が割り当て済み
    RowAlreadyClaimed {
        picture: ShapeId,
        row: RowKey,
        claimed_by: ShapeId,
        pass: MatchPass,
    },
    /// Pass 2 でも条件を満たさなかった
    Rejected(UnmatchedPicture),
}

/// 照合結果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// 行 → 採用レコード
    pub mapping: BTreeMap<RowKey, MatchRecord>,
    /// Pass 2 に回された画像
    pub pass2_candidates: Vec<UnmatchedPicture>,
    /// 最終的にどの行にも割り当てられなかった画像
    pub unmatched: Vec<ShapeId>,
    pub decisions: Vec<MatchDecision>,
}

impl MatchOutcome {
    pub fn record_for(&self, row: RowKey) -> Option<&MatchRecord> {
        self.mapping.get(&row)
    }

    pub fn matched_count(&self) -> usize {
        self.mapping.len()
    }
}

/// 2段階マッチャー
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    pub strict_tolerance: f64,
    pub relaxed_tolerance: f64,
}

impl Default for Matcher {
    fn default() -> Self {
        Self {
            strict_tolerance: STRICT_TOLERANCE,
            relaxed_tolerance: RELAXED_TOLERANCE,
        }
    }
}

/// 最近傍の基準セルを線形探索（同距離なら先に見つかった行）
pub fn nearest_row(picture: &Rect, cells: &BTreeMap<RowKey, Rect>) -> Option<(RowKey, f64)> {
    let center = picture.center();
    let mut best: Option<(RowKey, f64)> = None;

    for (row, cell) in cells {
        let distance = center.distance_to(&cell.center());
        if distance.is_nan() {
            continue;
        }
        match best {
            Some((_, min)) if distance >= min => {}
            _ => best = Some((*row, distance)),
        }
    }

    best
}

/// Pass 1 の3条件を順に評価し、最初に成立した条件を返す
pub fn strict_basis(picture: &Rect, cell: &Rect, tolerance: f64) -> Option<MatchBasis> {
    let center = picture.center();
    let cell_center = cell.center();

    if cell.contains_point(&center) {
        return Some(MatchBasis::InCell);
    }

    let near_x = (center.x - cell_center.x).abs() < tolerance;
    let near_y = (center.y - cell_center.y).abs() < tolerance;
    if near_x && near_y {
        return Some(MatchBasis::NearCenter);
    }

    if cell.contains_rect_padded(picture, tolerance) {
        return Some(MatchBasis::InBoundary);
    }

    None
}

impl Matcher {
    pub fn new(strict_tolerance: f64, relaxed_tolerance: f64) -> Self {
        Self {
            strict_tolerance,
            relaxed_tolerance,
        }
    }

    pub fn run(
        &self,
        pictures: &[PictureSnapshot],
        cells: &BTreeMap<RowKey, Rect>,
    ) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();

        // Pass 1: 中心ベース
        for picture in pictures {
            let Some((row, distance)) = nearest_row(&picture.rect, cells) else {
                let unmatched = UnmatchedPicture {
                    picture: picture.id,
                    nearest_row: None,
                    distance: f64::INFINITY,
                };
                outcome.decisions.push(MatchDecision::Deferred(unmatched));
                outcome.pass2_candidates.push(unmatched);
                continue;
            };

            let cell = &cells[&row];
            match strict_basis(&picture.rect, cell, self.strict_tolerance) {
                Some(basis) => {
                    let record = MatchRecord {
                        row,
                        picture: picture.id,
                        distance,
                        basis,
                        pass: MatchPass::Strict,
                    };
                    self.claim(&mut outcome, record);
                }
                None => {
                    let unmatched = UnmatchedPicture {
                        picture: picture.id,
                        nearest_row: Some(row),
                        distance,
                    };
                    outcome.decisions.push(MatchDecision::Deferred(unmatched));
                    outcome.pass2_candidates.push(unmatched);
                }
            }
        }

        // Pass 2: 外接矩形のみ、許容値を広げて再判定
        let candidates = outcome.pass2_candidates.clone();
        for candidate in candidates {
            let Some(row) = candidate.nearest_row else {
                outcome.decisions.push(MatchDecision::Rejected(candidate));
                outcome.unmatched.push(candidate.picture);
                continue;
            };
            let Some(picture) = pictures.iter().find(|p| p.id == candidate.picture) else {
                continue;
            };

            if cells[&row].contains_rect_padded(&picture.rect, self.relaxed_tolerance) {
                let record = MatchRecord {
                    row,
                    picture: candidate.picture,
                    distance: candidate.distance,
                    basis: MatchBasis::InBoundary,
                    pass: MatchPass::Relaxed,
                };
                self.claim(&mut outcome, record);
            } else {
                outcome.decisions.push(MatchDecision::Rejected(candidate));
                outcome.unmatched.push(candidate.picture);
            }
        }

        outcome
    }

    /// 行が空いていれば割り当て、埋まっていれば破棄する
    fn claim(&self, outcome: &mut MatchOutcome, record: MatchRecord) {
        if let Some(existing) = outcome.mapping.get(&record.row) {
            outcome.decisions.push(MatchDecision::RowAlreadyClaimed {
                picture: record.picture,
                row: record.row,
                claimed_by: existing.picture,
                pass: record.pass,
            });
            outcome.unmatched.push(record.picture);
            return;
        }

        outcome.mapping.insert(record.row, record);
        outcome.decisions.push(MatchDecision::Accepted(record));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(rects: &[(u32, Rect)]) -> BTreeMap<RowKey, Rect> {
        rects.iter().map(|(row, rect)| (RowKey(*row), *rect)).collect()
    }

    fn picture(id: usize, rect: Rect) -> PictureSnapshot {
        PictureSnapshot { id: ShapeId(id), rect }
    }

    /// 行ごとに 100pt 間隔の基準セル
    fn grid(rows: u32) -> BTreeMap<RowKey, Rect> {
        (2..2 + rows)
            .map(|row| (RowKey(row), Rect::new(row as f64 * 100.0, 100.0, 40.0, 20.0)))
            .collect()
    }

    #[test]
    fn test_center_in_cell() {
        let cells = grid(3);
        let pictures = vec![picture(0, Rect::new(305.0, 105.0, 30.0, 10.0))];

        let outcome = Matcher::default().run(&pictures, &cells);
        let record = outcome.record_for(RowKey(3)).unwrap();
        assert_eq!(record.basis, MatchBasis::InCell);
        assert_eq!(record.pass, MatchPass::Strict);
        assert!(outcome.pass2_candidates.is_empty());
    }

    #[test]
    fn test_near_center_when_outside_cell() {
        // セル(2行目): left=100, top=200, 40x20 → 中心 (120, 210)
        // 画像中心 (120, 225): セル外だが dy=15 < 20
        let cells = grid(1);
        let pictures = vec![picture(0, Rect::new(215.0, 110.0, 20.0, 20.0))];

        let outcome = Matcher::default().run(&pictures, &cells);
        assert_eq!(outcome.record_for(RowKey(2)).unwrap().basis, MatchBasis::NearCenter);
    }

    #[test]
    fn test_in_boundary_when_center_far() {
        // 中心 (143, 210): x はセル外（>140）、dx=23 ≥ 20
        // 外接: left 127 ≥ 80, top 195 ≥ 180, right 159 ≤ 160, bottom 225 ≤ 240
        let cell = Rect::new(200.0, 100.0, 40.0, 20.0);
        let pic = Rect::new(195.0, 127.0, 32.0, 30.0);
        assert_eq!(strict_basis(&pic, &cell, STRICT_TOLERANCE), Some(MatchBasis::InBoundary));
    }

    #[test]
    fn test_pass2_recovers_offset_picture() {
        let cells = cells(&[(2, Rect::new(100.0, 100.0, 40.0, 20.0))]);
        // 中心 (120, 135): セル中心から 25
        let pictures = vec![picture(0, Rect::new(121.0, 95.0, 50.0, 28.0))];

        let outcome = Matcher::default().run(&pictures, &cells);
        assert_eq!(outcome.pass2_candidates.len(), 1);
        let record = outcome.record_for(RowKey(2)).unwrap();
        assert_eq!(record.pass, MatchPass::Relaxed);
        assert_eq!(record.basis, MatchBasis::InBoundary);
        assert!((record.distance - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_pass2_rejects_far_picture() {
        let cells = cells(&[(2, Rect::new(100.0, 100.0, 40.0, 20.0))]);
        let pictures = vec![picture(0, Rect::new(400.0, 400.0, 50.0, 50.0))];

        let outcome = Matcher::default().run(&pictures, &cells);
        assert!(outcome.mapping.is_empty());
        assert_eq!(outcome.unmatched, vec![ShapeId(0)]);
        assert!(matches!(outcome.decisions.last(), Some(MatchDecision::Rejected(_))));
    }

    #[test]
    fn test_first_claim_wins_in_pass1() {
        let cells = grid(1);
        let pictures = vec![
            picture(0, Rect::new(205.0, 105.0, 30.0, 10.0)),
            picture(1, Rect::new(202.0, 102.0, 30.0, 10.0)),
        ];

        let outcome = Matcher::default().run(&pictures, &cells);
        assert_eq!(outcome.record_for(RowKey(2)).unwrap().picture, ShapeId(0));
        assert_eq!(outcome.unmatched, vec![ShapeId(1)]);
        assert!(outcome.decisions.iter().any(|d| matches!(
            d,
            MatchDecision::RowAlreadyClaimed { picture: ShapeId(1), claimed_by: ShapeId(0), .. }
        )));
    }

    #[test]
    fn test_pass2_does_not_override_pass1() {
        let cells = cells(&[(2, Rect::new(100.0, 100.0, 40.0, 20.0))]);
        let pictures = vec![
            // Pass 2 候補（先に列挙される）
            picture(0, Rect::new(121.0, 95.0, 50.0, 28.0)),
            // Pass 1 でセル内
            picture(1, Rect::new(102.0, 105.0, 30.0, 16.0)),
        ];

        let outcome = Matcher::default().run(&pictures, &cells);
        let record = outcome.record_for(RowKey(2)).unwrap();
        assert_eq!(record.picture, ShapeId(1));
        assert_eq!(record.pass, MatchPass::Strict);
        assert_eq!(outcome.unmatched, vec![ShapeId(0)]);
    }

    #[test]
    fn test_tie_goes_to_lower_row() {
        // 2つのセルのちょうど中間に中心がある画像
        let cells = cells(&[
            (2, Rect::new(0.0, 0.0, 40.0, 20.0)),
            (3, Rect::new(20.0, 0.0, 40.0, 20.0)),
        ]);
        let pic = Rect::new(15.0, 10.0, 20.0, 10.0);
        let (row, _) = nearest_row(&pic, &cells).unwrap();
        assert_eq!(row, RowKey(2));
    }

    #[test]
    fn test_no_cells_leaves_all_unmatched() {
        let pictures = vec![picture(0, Rect::new(0.0, 0.0, 10.0, 10.0))];
        let outcome = Matcher::default().run(&pictures, &BTreeMap::new());
        assert!(outcome.mapping.is_empty());
        assert_eq!(outcome.unmatched, vec![ShapeId(0)]);
        assert_eq!(outcome.pass2_candidates[0].nearest_row, None);
    }

    #[test]
    fn test_three_aligned_pictures() {
        let cells = grid(3);
        let pictures: Vec<PictureSnapshot> = cells
            .values()
            .enumerate()
            .map(|(i, cell)| {
                let c = cell.center();
                picture(i, Rect::new(c.y - 8.0, c.x - 15.0, 30.0, 16.0))
            })
            .collect();

        let outcome = Matcher::default().run(&pictures, &cells);
        assert_eq!(outcome.matched_count(), 3);
        assert!(outcome.pass2_candidates.is_empty());
        assert!(outcome.unmatched.is_empty());
        for (row, record) in &outcome.mapping {
            assert_eq!(record.row, *row);
            assert_eq!(record.basis, MatchBasis::InCell);
        }
    }
}
