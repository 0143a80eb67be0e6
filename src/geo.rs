const EARTH_RADIUS_M: f64 = 6_371_000.0;
const WALK_SPEED_M_PER_MIN: f64 = 80.0;

pub fn haversine_meters(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> u32 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    (EARTH_RADIUS_M * c).round() as u32
}

pub fn walk_minutes(distance_meters: u32) -> u32 {
    (f64::from(distance_meters) / WALK_SPEED_M_PER_MIN).ceil() as u32
}

pub fn tile_key(lat: f64, lng: f64) -> String {
    format!("{lat:.2},{lng:.2}")
}
