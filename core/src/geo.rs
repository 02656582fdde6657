//! Geocentric great-circle geometry: the same conversions and distance/
//! azimuth formulas as the original `CGeo`, ported formula-for-formula.

pub const DEG2RAD: f64 = 0.01745329251994;
pub const RAD2DEG: f64 = 57.29577951308;
pub const TWO_PI: f64 = std::f64::consts::TAU;
pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const DEG2KM: f64 = 111.19;
pub const KM2DEG: f64 = 0.00899;

/// Geocentric-latitude correction factor used by `setGeographic`.
const GEOCENTRIC_FACTOR: f64 = 0.993277;

/// A point on (or above/below) the Earth's surface, carrying both its
/// geographic lat/lon/radius and a precomputed Cartesian unit vector so
/// great-circle distance and azimuth reduce to dot/cross products.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geo {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
    x: f64,
    y: f64,
    z: f64,
    ux: f64,
    uy: f64,
    uz: f64,
}

impl Geo {
    /// Construct from geographic (surface) latitude/longitude in degrees
    /// and radius in km, applying the geocentric-latitude correction.
    pub fn from_geographic(lat: f64, lon: f64, radius: f64) -> Self {
        let geocentric_lat =
            RAD2DEG * (GEOCENTRIC_FACTOR * (DEG2RAD * lat).tan()).atan();
        Self::build(geocentric_lat, lon, radius)
    }

    /// Construct directly from an already-geocentric latitude, skipping
    /// the correction factor.
    pub fn from_geocentric(lat: f64, lon: f64, radius: f64) -> Self {
        Self::build(lat, lon, radius)
    }

    fn build(geocentric_lat: f64, lon: f64, radius: f64) -> Self {
        let lat_rad = DEG2RAD * geocentric_lat;
        let lon_rad = DEG2RAD * lon;
        let x = radius * lat_rad.cos() * lon_rad.cos();
        let y = radius * lat_rad.cos() * lon_rad.sin();
        let z = radius * lat_rad.sin();
        let norm = (x * x + y * y + z * z).sqrt().max(1e-12);
        Geo {
            latitude: geocentric_lat,
            longitude: lon,
            radius,
            x,
            y,
            z,
            ux: x / norm,
            uy: y / norm,
            uz: z / norm,
        }
    }

    /// Geographic (surface) latitude, inverting the geocentric
    /// correction, plus longitude normalized into `[-180, 180]`.
    pub fn geographic(&self) -> (f64, f64) {
        let geographic_lat =
            RAD2DEG * ((DEG2RAD * self.latitude).tan() / GEOCENTRIC_FACTOR).atan();
        let mut lon = self.longitude;
        while lon > 180.0 {
            lon -= 360.0;
        }
        while lon < -180.0 {
            lon += 360.0;
        }
        (geographic_lat, lon)
    }

    /// Great-circle angular distance to `other`, in radians.
    pub fn delta(&self, other: &Geo) -> f64 {
        let dot = self.ux * other.ux + self.uy * other.uy + self.uz * other.uz;
        if dot >= 1.0 {
            0.0
        } else {
            dot.max(-1.0).acos()
        }
    }

    /// Azimuth from `self` to `other`, in radians, wrapped to `[0, 2*pi)`.
    pub fn azimuth(&self, other: &Geo) -> f64 {
        // Tangent-plane construction: normal to the great circle through
        // the two points, then a tangent vector at `self`, projected onto
        // local north/east.
        let gc_normal = cross(
            (self.ux, self.uy, self.uz),
            (other.ux, other.uy, other.uz),
        );
        let tangent = normalize(cross(gc_normal, (self.ux, self.uy, self.uz)));

        // Local north/east tangent vectors at `self`.
        let north = normalize(cross((self.ux, self.uy, self.uz), (0.0, 0.0, 1.0)));
        let north = cross(north, (self.ux, self.uy, self.uz));
        let north = normalize(north);
        let east = normalize(cross((0.0, 0.0, 1.0), (self.ux, self.uy, self.uz)));

        let n = dot(tangent, north);
        let e = dot(tangent, east);
        let mut az = e.atan2(n);
        if az < 0.0 {
            az += TWO_PI;
        }
        az
    }

    /// Great-circle distance in km, assuming `EARTH_RADIUS_KM`.
    pub fn delta_km(&self, other: &Geo) -> f64 {
        self.delta(other) * EARTH_RADIUS_KM
    }

    /// Great-circle distance in degrees.
    pub fn delta_deg(&self, other: &Geo) -> f64 {
        self.delta(other) * RAD2DEG
    }

    /// Depth below the surface implied by this point's radius, in km.
    pub fn depth_km(&self) -> f64 {
        EARTH_RADIUS_KM - self.radius
    }
}

fn dot(a: (f64, f64, f64), b: (f64, f64, f64)) -> f64 {
    a.0 * b.0 + a.1 * b.1 + a.2 * b.2
}

fn cross(a: (f64, f64, f64), b: (f64, f64, f64)) -> (f64, f64, f64) {
    (
        a.1 * b.2 - a.2 * b.1,
        a.2 * b.0 - a.0 * b.2,
        a.0 * b.1 - a.1 * b.0,
    )
}

fn normalize(v: (f64, f64, f64)) -> (f64, f64, f64) {
    let norm = (v.0 * v.0 + v.1 * v.1 + v.2 * v.2).sqrt();
    if norm < 1e-12 {
        v
    } else {
        (v.0 / norm, v.1 / norm, v.2 / norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_is_symmetric() {
        let a = Geo::from_geographic(45.0, -110.0, EARTH_RADIUS_KM);
        let b = Geo::from_geographic(10.0, 30.0, EARTH_RADIUS_KM);
        assert!((a.delta(&b) - b.delta(&a)).abs() < 1e-9);
    }

    #[test]
    fn delta_to_self_is_zero() {
        let a = Geo::from_geographic(12.3, 45.6, EARTH_RADIUS_KM);
        assert!(a.delta(&a).abs() < 1e-9);
    }

    #[test]
    fn geographic_round_trips_through_geocentric_correction() {
        let a = Geo::from_geographic(35.0, -120.0, EARTH_RADIUS_KM);
        let (lat, lon) = a.geographic();
        assert!((lat - 35.0).abs() < 1e-6);
        assert!((lon - (-120.0)).abs() < 1e-6);
    }

    #[test]
    fn equator_quarter_turn_is_known_distance() {
        let a = Geo::from_geocentric(0.0, 0.0, EARTH_RADIUS_KM);
        let b = Geo::from_geocentric(0.0, 90.0, EARTH_RADIUS_KM);
        assert!((a.delta(&b) - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
    }

    proptest::proptest! {
        #[test]
        fn delta_is_symmetric_for_any_pair(
            lat1 in -89.0f64..89.0,
            lon1 in -180.0f64..180.0,
            lat2 in -89.0f64..89.0,
            lon2 in -180.0f64..180.0,
        ) {
            let a = Geo::from_geographic(lat1, lon1, EARTH_RADIUS_KM);
            let b = Geo::from_geographic(lat2, lon2, EARTH_RADIUS_KM);
            proptest::prop_assert!((a.delta(&b) - b.delta(&a)).abs() < 1e-9);
        }

        #[test]
        fn delta_stays_within_a_half_turn(
            lat1 in -89.0f64..89.0,
            lon1 in -180.0f64..180.0,
            lat2 in -89.0f64..89.0,
            lon2 in -180.0f64..180.0,
        ) {
            let a = Geo::from_geographic(lat1, lon1, EARTH_RADIUS_KM);
            let b = Geo::from_geographic(lat2, lon2, EARTH_RADIUS_KM);
            let d = a.delta(&b);
            proptest::prop_assert!(d >= 0.0 && d <= std::f64::consts::PI + 1e-9);
        }
    }
}
