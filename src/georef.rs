use crate::models::{Corners, LngLat};

/// Corner geocoordinates for overlaying a raster image anchored by two
/// clicks. `ratio = width / height` decides the axis: wider images expand
/// longitude by half of `height * ratio - width`, taller or square images
/// expand latitude by half of `width / ratio - height`. Both deltas cancel
/// algebraically, so the clicks always stay on the rectangle's boundary.
pub fn compute_corners(
    top_left: LngLat,
    bottom_right: LngLat,
    width_px: f64,
    height_px: f64,
) -> Corners {
    if !(width_px > 0.0 && width_px.is_finite() && height_px > 0.0 && height_px.is_finite()) {
        // Degenerate image dimensions: the click rectangle as-is.
        return rectangle(top_left.lng, bottom_right.lng, top_left.lat, bottom_right.lat);
    }

    let ratio = width_px / height_px;
    if ratio > 1.0 {
        let new_width = height_px * ratio;
        let dx = (new_width - width_px) / 2.0;
        rectangle(
            top_left.lng - dx,
            bottom_right.lng + dx,
            top_left.lat,
            bottom_right.lat,
        )
    } else {
        let new_height = width_px / ratio;
        let dy = (new_height - height_px) / 2.0;
        rectangle(
            top_left.lng,
            bottom_right.lng,
            top_left.lat - dy,
            bottom_right.lat + dy,
        )
    }
}

fn rectangle(left: f64, right: f64, top: f64, bottom: f64) -> Corners {
    Corners {
        top_left: LngLat { lng: left, lat: top },
        bottom_left: LngLat { lng: left, lat: bottom },
        bottom_right: LngLat { lng: right, lat: bottom },
        top_right: LngLat { lng: right, lat: top },
    }
}
