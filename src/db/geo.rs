/// Coordinates parsed out of a client's map data string
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTag {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoTag {
    /// Parse `latitude:<f>,longitude:<f>` (keys in any order, spaces allowed).
    ///
    /// Returns `None` for anything else; the raw string is stored either way.
    pub fn parse(map_data: &str) -> Option<Self> {
        let mut latitude = None;
        let mut longitude = None;

        for part in map_data.split(',') {
            let (key, value) = part.split_once(':')?;
            let value: f64 = value.trim().parse().ok()?;
            match key.trim().to_ascii_lowercase().as_str() {
                "latitude" | "lat" => latitude = Some(value),
                "longitude" | "lon" | "lng" => longitude = Some(value),
                _ => return None,
            }
        }

        let (latitude, longitude) = (latitude?, longitude?);
        if (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude) {
            Some(GeoTag { latitude, longitude })
        } else {
            None
        }
    }
}
