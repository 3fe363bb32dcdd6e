// ============================================================================
// NORMAL ARROWS — user-authored direction + inclination hints
// ============================================================================

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::debug_lines::LineVertex;
use crate::error::{Error, Result};

/// Capacity of the arrow uniform block the normal shader reads.
pub const MAX_ARROWS: usize = 256;
/// Canvas-space length of every arrow shaft.
pub const ARROW_LENGTH: f32 = 20.0;
pub const MIN_ANGLE_DEG: f32 = 0.001;
pub const MAX_ANGLE_DEG: f32 = 89.999;

/// Arrowhead stroke spread either side of the shaft.
const HEAD_SPREAD_DEG: f32 = 25.0;
/// Arrowhead stroke length relative to the shaft.
const HEAD_RATIO: f32 = 0.3;

/// One arrow as stored on disk and in the GPU uniform block (32 bytes).
///
/// `start`/`end` are canvas pixels (y down); `angle` is the surface
/// inclination in radians.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct NormalArrow {
    pub start: Vec2,
    pub end: Vec2,
    pub angle: f32,
    pub _pad: [f32; 3],
}

impl NormalArrow {
    pub fn new(start: Vec2, end: Vec2, angle: f32) -> Self {
        Self {
            start,
            end,
            angle,
            _pad: [0.0; 3],
        }
    }

    /// Unit direction of the shaft, or zero for a degenerate arrow.
    pub fn direction(&self) -> Vec2 {
        (self.end - self.start).normalize_or_zero()
    }
}

/// Fixed-capacity mirror of the arrow list, laid out for the uniform buffer:
/// `MAX_ARROWS` records followed by a `u32` count padded to 16 bytes.
pub struct ArrowBlock {
    pub records: Vec<NormalArrow>,
    pub count: u32,
}

impl ArrowBlock {
    pub const BYTE_SIZE: usize = MAX_ARROWS * std::mem::size_of::<NormalArrow>() + 16;

    /// Live arrows only.
    pub fn live(&self) -> &[NormalArrow] {
        &self.records[..self.count as usize]
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::BYTE_SIZE);
        out.extend_from_slice(bytemuck::cast_slice(&self.records));
        out.extend_from_slice(bytemuck::cast_slice(&[self.count, 0u32, 0, 0]));
        out
    }
}

/// The canvas-wide arrow list plus the UI selection.
#[derive(Clone, Debug, Default)]
pub struct NormalArrows {
    arrows: Vec<NormalArrow>,
    selected: Option<usize>,
}

impl NormalArrows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(arrows: Vec<NormalArrow>) -> Result<Self> {
        if arrows.len() > MAX_ARROWS {
            return Err(Error::ArrowCapacity { max: MAX_ARROWS });
        }
        Ok(Self {
            arrows,
            selected: None,
        })
    }

    pub fn len(&self) -> usize {
        self.arrows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrows.is_empty()
    }

    pub fn as_slice(&self) -> &[NormalArrow] {
        &self.arrows
    }

    pub fn get(&self, index: usize) -> Option<&NormalArrow> {
        self.arrows.get(index)
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn select(&mut self, index: usize) {
        if index < self.arrows.len() {
            self.selected = Some(index);
        }
    }

    pub fn deselect(&mut self) {
        self.selected = None;
    }

    /// Start a new arrow at `start`, pointing down the canvas.
    pub fn push(&mut self, start: Vec2) -> Result<usize> {
        if self.arrows.len() >= MAX_ARROWS {
            return Err(Error::ArrowCapacity { max: MAX_ARROWS });
        }
        self.arrows.push(NormalArrow::new(
            start,
            start + Vec2::new(0.0, ARROW_LENGTH),
            MIN_ANGLE_DEG.to_radians(),
        ));
        Ok(self.arrows.len() - 1)
    }

    /// Point the most recent arrow at `point`, keeping the shaft length fixed.
    pub fn drag_last_to(&mut self, point: Vec2) {
        if let Some(arrow) = self.arrows.last_mut()
            && point != arrow.start
        {
            arrow.end = arrow.start + (point - arrow.start).normalize() * ARROW_LENGTH;
        }
    }

    /// Counter-clockwise orientation in degrees, [0, 360). Canvas y points down.
    pub fn orientation_degrees(&self, index: usize) -> Option<f32> {
        let arrow = self.arrows.get(index)?;
        let v = Vec2::new(arrow.end.x - arrow.start.x, arrow.start.y - arrow.end.y);
        Some(v.y.atan2(v.x).to_degrees().rem_euclid(360.0))
    }

    pub fn set_orientation_degrees(&mut self, index: usize, degrees: f32) {
        if let Some(arrow) = self.arrows.get_mut(index) {
            let rad = degrees.rem_euclid(360.0).to_radians();
            arrow.end = arrow.start + Vec2::new(rad.cos(), -rad.sin()) * ARROW_LENGTH;
        }
    }

    pub fn angle_degrees(&self, index: usize) -> Option<f32> {
        self.arrows.get(index).map(|a| a.angle.to_degrees())
    }

    pub fn set_angle_degrees(&mut self, index: usize, degrees: f32) {
        if let Some(arrow) = self.arrows.get_mut(index) {
            arrow.angle = degrees.clamp(MIN_ANGLE_DEG, MAX_ANGLE_DEG).to_radians();
        }
    }

    /// Remove one arrow, keeping the rest in order.  The selection follows the
    /// arrow it pointed at and is clamped to the new end of the list.
    pub fn remove(&mut self, index: usize) -> Option<NormalArrow> {
        if index >= self.arrows.len() {
            return None;
        }
        let removed = self.arrows.remove(index);
        self.selected = match self.selected {
            Some(sel) if sel > index => Some(sel - 1),
            Some(_) if self.arrows.is_empty() => None,
            Some(sel) => Some(sel.min(self.arrows.len() - 1)),
            None => None,
        };
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.arrows.clear();
        self.selected = None;
    }

    pub fn gpu_block(&self) -> ArrowBlock {
        let mut records = vec![NormalArrow::zeroed(); MAX_ARROWS];
        records[..self.arrows.len()].copy_from_slice(&self.arrows);
        ArrowBlock {
            records,
            count: self.arrows.len() as u32,
        }
    }

    /// Line-list vertices for every arrow: shaft plus two head strokes.
    pub fn glyph_lines(&self, color: [f32; 3], selected_color: [f32; 3]) -> Vec<LineVertex> {
        let mut lines = Vec::with_capacity(self.arrows.len() * 6);
        for (i, arrow) in self.arrows.iter().enumerate() {
            let c = if Some(i) == self.selected { selected_color } else { color };
            push_glyph(&mut lines, arrow, c);
        }
        lines
    }
}

fn push_glyph(lines: &mut Vec<LineVertex>, arrow: &NormalArrow, color: [f32; 3]) {
    lines.push(LineVertex::new(arrow.start, color));
    lines.push(LineVertex::new(arrow.end, color));

    let back = arrow.start - arrow.end;
    let phi = back.y.atan2(back.x);
    let len = back.length() * HEAD_RATIO;
    let spread = HEAD_SPREAD_DEG.to_radians();

    for side in [spread, -spread] {
        let tip = arrow.end + Vec2::new((phi + side).cos(), (phi + side).sin()) * len;
        lines.push(LineVertex::new(arrow.end, color));
        lines.push(LineVertex::new(tip, color));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrows(n: usize) -> NormalArrows {
        let mut a = NormalArrows::new();
        for i in 0..n {
            a.push(Vec2::new(i as f32, 0.0)).unwrap();
        }
        a
    }

    #[test]
    fn record_is_32_bytes() {
        assert_eq!(std::mem::size_of::<NormalArrow>(), 32);
        assert_eq!(arrows(3).gpu_block().to_bytes().len(), ArrowBlock::BYTE_SIZE);
    }

    #[test]
    fn push_beyond_capacity_is_an_error() {
        let mut a = arrows(MAX_ARROWS);
        assert!(matches!(
            a.push(Vec2::ZERO),
            Err(Error::ArrowCapacity { max: MAX_ARROWS })
        ));
        assert_eq!(a.len(), MAX_ARROWS);
    }

    #[test]
    fn remove_compacts_in_order() {
        let mut a = arrows(5);
        a.remove(1);
        let xs: Vec<f32> = a.as_slice().iter().map(|r| r.start.x).collect();
        assert_eq!(xs, vec![0.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn removing_before_last_selected_clamps_selection() {
        let mut a = arrows(4);
        a.select(3);
        a.remove(3);
        assert_eq!(a.selected(), Some(2));

        a.select(2);
        a.remove(0);
        assert_eq!(a.selected(), Some(1));
        assert_eq!(a.get(1).unwrap().start.x, 2.0);
    }

    #[test]
    fn removing_only_arrow_clears_selection() {
        let mut a = arrows(1);
        a.select(0);
        a.remove(0);
        assert_eq!(a.selected(), None);
        assert!(a.remove(0).is_none());
    }

    #[test]
    fn angle_is_clamped() {
        let mut a = arrows(1);
        a.set_angle_degrees(0, 120.0);
        assert!((a.angle_degrees(0).unwrap() - MAX_ANGLE_DEG).abs() < 1e-3);
        a.set_angle_degrees(0, -5.0);
        assert!((a.angle_degrees(0).unwrap() - MIN_ANGLE_DEG).abs() < 1e-4);
    }

    #[test]
    fn orientation_round_trips() {
        let mut a = arrows(1);
        // Fresh arrows point down the canvas, i.e. 270 degrees.
        assert!((a.orientation_degrees(0).unwrap() - 270.0).abs() < 1e-3);
        a.set_orientation_degrees(0, 45.0);
        assert!((a.orientation_degrees(0).unwrap() - 45.0).abs() < 1e-3);
        a.set_orientation_degrees(0, -90.0);
        assert!((a.orientation_degrees(0).unwrap() - 270.0).abs() < 1e-3);
    }

    #[test]
    fn drag_keeps_length() {
        let mut a = arrows(1);
        a.drag_last_to(Vec2::new(100.0, 0.0));
        let arrow = *a.get(0).unwrap();
        assert!((arrow.end - Vec2::new(ARROW_LENGTH, 0.0)).length() < 1e-4);
        a.drag_last_to(arrow.start);
        assert!((a.get(0).unwrap().end - Vec2::new(ARROW_LENGTH, 0.0)).length() < 1e-4);
    }

    #[test]
    fn glyph_has_shaft_and_two_heads() {
        let mut a = arrows(2);
        a.select(1);
        let lines = a.glyph_lines([1.0; 3], [0.8, 0.3, 0.2]);
        assert_eq!(lines.len(), 12);
        assert_eq!(lines[6].color, [0.8, 0.3, 0.2]);
        // Head strokes start at the arrow tip.
        assert_eq!(lines[2].position, lines[1].position);
    }
}
