use serde::Serialize;

/// Distance from the screen edges to the corner targets.
pub const MARGIN_PX: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationPoint {
    pub index: usize,
    pub screen_x: f64,
    pub screen_y: f64,
}

/// The ordered targets of one calibration pass. Fixed once built.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationLayout {
    points: Vec<CalibrationPoint>,
}

impl CalibrationLayout {
    /// Four corners inset by [`MARGIN_PX`], then the centre.
    pub fn five_point(width: f64, height: f64) -> Self {
        let coords = [
            (MARGIN_PX, MARGIN_PX),
            (width - MARGIN_PX, MARGIN_PX),
            (MARGIN_PX, height - MARGIN_PX),
            (width - MARGIN_PX, height - MARGIN_PX),
            (width / 2.0, height / 2.0),
        ];
        let points = coords
            .into_iter()
            .enumerate()
            .map(|(index, (screen_x, screen_y))| CalibrationPoint {
                index,
                screen_x,
                screen_y,
            })
            .collect();
        Self { points }
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
