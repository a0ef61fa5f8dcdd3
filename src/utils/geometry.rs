// src/utils/geometry.rs
//! Mapping of the arm angle onto the vertical screen axis and target zones
//!
//! The position range maps linearly onto `[offset, height - offset]` pixels,
//! so the minimum angle sits on the upper edge and the maximum on the lower.

use crate::config::constants::geometry::BAND_ENTRY_FRACTION;
use crate::config::GeometryConfig;
use crate::experiment::trial::Direction;
use serde::Serialize;

/// Target zones occupied by the cursor this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Zones {
    pub in_middle: bool,
    pub in_upper_band: bool,
    pub in_lower_band: bool,
}

impl Zones {
    pub fn in_band(&self, direction: Direction) -> bool {
        match direction {
            Direction::Up => self.in_upper_band,
            Direction::Down => self.in_lower_band,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PositionMapper {
    geometry: GeometryConfig,
}

impl PositionMapper {
    pub fn new(geometry: GeometryConfig) -> Self {
        Self { geometry }
    }

    fn center_angle(&self) -> f64 {
        (self.geometry.min_position_deg + self.geometry.max_position_deg) / 2.0
    }

    fn travel_px(&self) -> f64 {
        self.geometry.screen_height_px - 2.0 * self.geometry.band_offset_px
    }

    /// Cursor height in pixels; a missing position maps to the range centre
    pub fn screen_y(&self, position: Option<f64>) -> f64 {
        let g = &self.geometry;
        let angle = position.unwrap_or_else(|| self.center_angle());
        (angle - g.min_position_deg) / (g.max_position_deg - g.min_position_deg) * self.travel_px()
            + g.band_offset_px
    }

    pub fn zones(&self, position: Option<f64>) -> Zones {
        let g = &self.geometry;
        let y = self.screen_y(position);
        let entry = BAND_ENTRY_FRACTION * g.band_width_px;
        Zones {
            in_middle: (y - g.screen_height_px / 2.0).abs() < g.center_tolerance_px,
            in_upper_band: y < entry + g.band_offset_px,
            in_lower_band: y > g.screen_height_px - entry - g.band_offset_px,
        }
    }

    /// Arm angle placing the cursor in the middle of the given band, or the centre for `None`
    pub fn target_angle(&self, direction: Option<Direction>) -> f64 {
        let g = &self.geometry;
        let y = match direction {
            None => return self.center_angle(),
            Some(Direction::Up) => g.band_offset_px + g.band_width_px / 2.0,
            Some(Direction::Down) => g.screen_height_px - g.band_offset_px - g.band_width_px / 2.0,
        };
        (y - g.band_offset_px) / self.travel_px() * (g.max_position_deg - g.min_position_deg)
            + g.min_position_deg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> PositionMapper {
        PositionMapper::new(GeometryConfig::default())
    }

    #[test]
    fn test_range_edges_map_to_band_edges() {
        let mapper = mapper();
        assert!((mapper.screen_y(Some(55.0)) - 100.0).abs() < 1e-9);
        assert!((mapper.screen_y(Some(180.0)) - 720.0).abs() < 1e-9);
        assert!((mapper.screen_y(None) - 410.0).abs() < 1e-9);
    }

    #[test]
    fn test_zones() {
        let mapper = mapper();

        let center = mapper.zones(None);
        assert!(center.in_middle && !center.in_upper_band && !center.in_lower_band);

        let up = mapper.zones(Some(60.0));
        assert!(up.in_upper_band && !up.in_middle);
        assert!(up.in_band(Direction::Up));

        let down = mapper.zones(Some(175.0));
        assert!(down.in_lower_band);
        assert!(!down.in_band(Direction::Up));
    }

    #[test]
    fn test_center_tolerance_is_strict() {
        let mapper = mapper();
        // 6 px off centre is 6 * 125 / 620 degrees
        let offset_deg = 6.0 * 125.0 / 620.0;
        assert!(!mapper.zones(Some(117.5 + offset_deg * 1.1)).in_middle);
        assert!(mapper.zones(Some(117.5 + offset_deg * 0.9)).in_middle);
    }

    #[test]
    fn test_target_angles_land_in_zones() {
        let mapper = mapper();
        assert!(mapper.zones(Some(mapper.target_angle(Some(Direction::Up)))).in_upper_band);
        assert!(mapper.zones(Some(mapper.target_angle(Some(Direction::Down)))).in_lower_band);
        assert!(mapper.zones(Some(mapper.target_angle(None))).in_middle);
    }
}
