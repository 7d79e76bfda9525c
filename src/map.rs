use crate::waypoint::Destination;
use nalgebra as na;
use serde::Deserialize;
use tracing::*;

/// Where the map is drawn on the operator display
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MapDisplayConfig {
    /// Top left corner of the map view in display pixels
    #[serde(default = "default_origin_px")]
    pub origin_px: [f32; 2],
    /// Side length of the square map view
    #[serde(default = "default_view_size_px")]
    pub view_size_px: f32,
}

fn default_origin_px() -> [f32; 2] {
    [965.0, 405.0]
}

fn default_view_size_px() -> f32 {
    300.0
}

impl Default for MapDisplayConfig {
    fn default() -> Self {
        Self {
            origin_px: default_origin_px(),
            view_size_px: default_view_size_px(),
        }
    }
}

/// Maps clicks on the operator's map view to destinations
#[derive(Debug, Clone, Copy)]
pub struct MapDisplay {
    origin: na::Point2<f32>,
    view_size_px: f32,
    map_size_m: f32,
}

impl MapDisplay {
    pub fn new(config: &MapDisplayConfig, map_size_m: f32) -> Self {
        Self {
            origin: na::Point2::from(config.origin_px),
            view_size_px: config.view_size_px,
            map_size_m,
        }
    }

    /// World position under a display pixel, in cm
    pub fn display_to_world(&self, click: na::Point2<f32>) -> na::Point2<f32> {
        let relative = click - self.origin;
        let half_map = na::Vector2::repeat(self.map_size_m / 2.0);
        let metres = relative / self.view_size_px * self.map_size_m - half_map;
        let centimetres = metres * 100.0;
        // display x runs against map x
        na::Point2::new(-centimetres.x, centimetres.y)
    }

    /// Destination for a click, `None` when the click falls outside the map
    pub fn click_to_destination(&self, x: f32, y: f32) -> Option<Destination> {
        let world = self.display_to_world(na::Point2::new(x, y));
        let half_extent = self.map_size_m * 100.0 / 2.0;
        let inside = |value: f32| -half_extent < value && value < half_extent;
        if inside(world.x) && inside(world.y) {
            debug!("Click at {} {} maps to {} {}", x, y, world.x, world.y);
            Some(Destination::new(world.x, world.y))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn display() -> MapDisplay {
        MapDisplay::new(&MapDisplayConfig::default(), 5.0)
    }

    #[test]
    fn view_centre_is_world_origin() {
        let destination = display().click_to_destination(1115.0, 555.0).unwrap();
        assert_relative_eq!(destination.x_cm, 0.0, epsilon = 1e-3);
        assert_relative_eq!(destination.y_cm, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn display_x_is_flipped() {
        // 60 px right of centre is 1 m on the display axis
        let destination = display().click_to_destination(1175.0, 615.0).unwrap();
        assert_relative_eq!(destination.x_cm, -100.0, epsilon = 1e-3);
        assert_relative_eq!(destination.y_cm, 100.0, epsilon = 1e-3);
    }

    #[test]
    fn clicks_off_the_map_are_ignored() {
        assert!(display().click_to_destination(965.0, 555.0).is_none());
        assert!(display().click_to_destination(100.0, 100.0).is_none());
        assert!(display().click_to_destination(1115.0, 706.0).is_none());
    }
}
