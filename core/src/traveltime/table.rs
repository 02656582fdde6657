//! Binary travel-time table: the little-endian "TRAV" file format and
//! bilinear lookup across the warped (distance x depth) grid.
//!
//! File layout (all little-endian):
//! ```text
//! "TRAV"              4 bytes
//! endian marker       2 bytes  (int16 = 1)
//! branch name         16 bytes (NUL-padded)
//! phase list          64 bytes (comma-separated, NUL-padded)
//! nDist               4 bytes  (int32)
//! dist warp params    5 x 8    (min, max, k, s0, s_inf as f64)
//! nDepth              4 bytes
//! depth warp params   5 x 8
//! travelTime[]        nDist*nDepth x 8  (f64, row-major: depth-major)
//! depthDistance[]     nDist*nDepth x 8
//! phaseTag[]          nDist*nDepth x 1  (one byte per cell)
//! ```

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{GlassError, Result};
use crate::timewarp::TimeWarp;

const MAGIC: &[u8; 4] = b"TRAV";
const ENDIAN_MARKER: i16 = 1;
const BRANCH_NAME_LEN: usize = 16;
const PHASE_LIST_LEN: usize = 64;

/// Sentinel returned when a cell, or an interpolated lookup, has no
/// valid travel time.
pub const NO_TIME: f64 = -1.0;

/// A single (distance x depth) travel-time grid for one phase branch.
///
/// A table's phase tags are stored as raw `u8` (no C `char` cast), but
/// the 127-distinct-phase limit the original's cast implied is kept: the
/// wire format still reserves exactly one byte per cell, so the
/// constraint is inherited from the file layout itself, not merely an
/// artifact of the original language's casting rules.
#[derive(Debug, Clone)]
pub struct TravelTimeTable {
    pub branch_name: String,
    pub phase_list: String,
    pub n_dist: usize,
    pub n_depth: usize,
    pub distance_warp: TimeWarp,
    pub depth_warp: TimeWarp,
    /// Row-major, depth-major: `travel_time[depth_index * n_dist + dist_index]`.
    pub travel_time: Vec<f64>,
    pub depth_distance: Vec<f64>,
    pub phase_tag: Vec<u8>,
}

impl TravelTimeTable {
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(MAGIC)?;
        w.write_i16::<LittleEndian>(ENDIAN_MARKER)?;
        w.write_all(&pad(&self.branch_name, BRANCH_NAME_LEN))?;
        w.write_all(&pad(&self.phase_list, PHASE_LIST_LEN))?;

        w.write_i32::<LittleEndian>(self.n_dist as i32)?;
        write_warp(w, &self.distance_warp)?;

        w.write_i32::<LittleEndian>(self.n_depth as i32)?;
        write_warp(w, &self.depth_warp)?;

        let cells = self.n_dist * self.n_depth;
        if self.travel_time.len() != cells || self.depth_distance.len() != cells {
            return Err(GlassError::bug(
                "travel time table array length does not match nDist*nDepth",
            ));
        }
        for v in &self.travel_time {
            w.write_f64::<LittleEndian>(*v)?;
        }
        for v in &self.depth_distance {
            w.write_f64::<LittleEndian>(*v)?;
        }
        w.write_all(&self.phase_tag)?;
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(GlassError::config(
                "travel time file is missing the TRAV magic header",
            ));
        }
        let marker = r.read_i16::<LittleEndian>()?;
        if marker != ENDIAN_MARKER {
            return Err(GlassError::config(
                "travel time file endian marker mismatch",
            ));
        }
        let branch_name = read_padded_string(r, BRANCH_NAME_LEN)?;
        let phase_list = read_padded_string(r, PHASE_LIST_LEN)?;

        let n_dist = r.read_i32::<LittleEndian>()? as usize;
        let distance_warp = read_warp(r)?;

        let n_depth = r.read_i32::<LittleEndian>()? as usize;
        let depth_warp = read_warp(r)?;

        let cells = n_dist
            .checked_mul(n_depth)
            .ok_or_else(|| GlassError::config("travel time table dimensions overflow"))?;

        let mut travel_time = Vec::with_capacity(cells);
        for _ in 0..cells {
            travel_time.push(r.read_f64::<LittleEndian>()?);
        }
        let mut depth_distance = Vec::with_capacity(cells);
        for _ in 0..cells {
            depth_distance.push(r.read_f64::<LittleEndian>()?);
        }
        let mut phase_tag = vec![0u8; cells];
        r.read_exact(&mut phase_tag)?;

        Ok(TravelTimeTable {
            branch_name,
            phase_list,
            n_dist,
            n_depth,
            distance_warp,
            depth_warp,
            travel_time,
            depth_distance,
            phase_tag,
        })
    }

    fn cell(&self, dist_index: usize, depth_index: usize) -> f64 {
        self.travel_time[depth_index * self.n_dist + dist_index]
    }

    /// Raw lookup at exact integer grid indices, or `NO_TIME` if either
    /// index is out of range or the stored cell is itself the sentinel.
    pub fn at_index(&self, dist_index: usize, depth_index: usize) -> f64 {
        if dist_index >= self.n_dist || depth_index >= self.n_depth {
            return NO_TIME;
        }
        self.cell(dist_index, depth_index)
    }

    /// Bilinear interpolation between the four grid cells enclosing
    /// `(distance, depth)`. Returns `NO_TIME` if any enclosing corner is
    /// itself a sentinel, or if the point falls outside the warped grid.
    pub fn bilinear(&self, distance: f64, depth: f64) -> f64 {
        let gx = self.distance_warp.calculate_grid_point(distance);
        let gy = self.depth_warp.calculate_grid_point(depth);

        if gx < 0.0 || gy < 0.0 {
            return NO_TIME;
        }

        let x0 = gx.floor();
        let y0 = gy.floor();
        let ix0 = x0 as isize;
        let iy0 = y0 as isize;
        let ix1 = ix0 + 1;
        let iy1 = iy0 + 1;

        if ix0 < 0 || iy0 < 0 || ix1 as usize >= self.n_dist || iy1 as usize >= self.n_depth {
            return NO_TIME;
        }

        let (ix0, ix1, iy0, iy1) = (ix0 as usize, ix1 as usize, iy0 as usize, iy1 as usize);

        let v00 = self.cell(ix0, iy0);
        let v10 = self.cell(ix1, iy0);
        let v01 = self.cell(ix0, iy1);
        let v11 = self.cell(ix1, iy1);
        if v00 < 0.0 || v10 < 0.0 || v01 < 0.0 || v11 < 0.0 {
            return NO_TIME;
        }

        let fx = gx - x0;
        let fy = gy - y0;

        let top = v00 * (1.0 - fx) + v10 * fx;
        let bottom = v01 * (1.0 - fx) + v11 * fx;
        top * (1.0 - fy) + bottom * fy
    }
}

fn write_warp<W: Write>(w: &mut W, warp: &TimeWarp) -> Result<()> {
    w.write_f64::<LittleEndian>(warp.grid_minimum)?;
    w.write_f64::<LittleEndian>(warp.grid_maximum)?;
    w.write_f64::<LittleEndian>(warp.decay_constant)?;
    w.write_f64::<LittleEndian>(warp.slope_zero)?;
    w.write_f64::<LittleEndian>(warp.slope_infinity)?;
    Ok(())
}

fn read_warp<R: Read>(r: &mut R) -> Result<TimeWarp> {
    Ok(TimeWarp::new(
        r.read_f64::<LittleEndian>()?,
        r.read_f64::<LittleEndian>()?,
        r.read_f64::<LittleEndian>()?,
        r.read_f64::<LittleEndian>()?,
        r.read_f64::<LittleEndian>()?,
    ))
}

fn pad(s: &str, len: usize) -> Vec<u8> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.truncate(len);
    bytes.resize(len, 0);
    bytes
}

fn read_padded_string<R: Read>(r: &mut R, len: usize) -> Result<String> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(len);
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn synthetic_table(n_dist: usize, n_depth: usize) -> TravelTimeTable {
        let distance_warp = TimeWarp::new(0.0, n_dist as f64 - 1.0, 0.05, 1.0, 8.0);
        let depth_warp = TimeWarp::new(0.0, n_depth as f64 - 1.0, 0.05, 1.0, 8.0);
        let mut travel_time = Vec::with_capacity(n_dist * n_depth);
        let mut depth_distance = Vec::with_capacity(n_dist * n_depth);
        for depth_index in 0..n_depth {
            for dist_index in 0..n_dist {
                travel_time.push(dist_index as f64 * 0.1 + depth_index as f64 * 0.01);
                depth_distance.push(dist_index as f64);
            }
        }
        TravelTimeTable {
            branch_name: "P".to_string(),
            phase_list: "P,Pn".to_string(),
            n_dist,
            n_depth,
            distance_warp,
            depth_warp,
            travel_time,
            depth_distance,
            phase_tag: vec![b'P'; n_dist * n_depth],
        }
    }

    #[test]
    fn round_trips_through_binary_file() {
        let table = synthetic_table(550, 105);
        let mut buf = Vec::new();
        table.write(&mut buf).unwrap();

        let mut cursor = Cursor::new(buf);
        let read_back = TravelTimeTable::read(&mut cursor).unwrap();

        assert_eq!(read_back.n_dist, table.n_dist);
        assert_eq!(read_back.n_depth, table.n_depth);
        for i in 0..table.travel_time.len() {
            assert!((read_back.travel_time[i] - table.travel_time[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn round_trips_through_a_real_file_on_disk() {
        let table = synthetic_table(550, 105);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        table.write(&mut file).unwrap();

        let mut f = std::fs::File::open(file.path()).unwrap();
        let read_back = TravelTimeTable::read(&mut f).unwrap();

        assert_eq!(read_back.n_dist, table.n_dist);
        assert_eq!(read_back.n_depth, table.n_depth);
        assert_eq!(read_back.branch_name, table.branch_name);
        for i in 0..table.travel_time.len() {
            assert!((read_back.travel_time[i] - table.travel_time[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = vec![0u8; 16];
        buf[0..4].copy_from_slice(b"NOPE");
        let mut cursor = Cursor::new(buf);
        assert!(TravelTimeTable::read(&mut cursor).is_err());
    }

    #[test]
    fn bilinear_round_trips_interior_grid_points() {
        let table = synthetic_table(20, 10);
        for dist_index in 1..19usize {
            for depth_index in 1..9usize {
                let distance = table.distance_warp.calculate_value(dist_index as f64);
                let depth = table.depth_warp.calculate_value(depth_index as f64);
                let expected = table.at_index(dist_index, depth_index);
                let got = table.bilinear(distance, depth);
                assert!(
                    (got - expected).abs() < 1e-6,
                    "dist_index={dist_index} depth_index={depth_index} expected={expected} got={got}"
                );
            }
        }
    }

    #[test]
    fn distance_monotonic_within_branch() {
        let table = synthetic_table(50, 5);
        let depth = table.depth_warp.calculate_value(2.0);
        let mut prev = table.bilinear(0.0, depth);
        for step in 1..40 {
            let distance = step as f64;
            let t = table.bilinear(distance, depth);
            assert!(t >= prev - 1e-9, "travel time not monotonic at distance={distance}");
            prev = t;
        }
    }

    proptest::proptest! {
        #[test]
        fn bilinear_matches_exact_index_on_any_interior_grid_point(
            dist_index in 1usize..19,
            depth_index in 1usize..9,
        ) {
            let table = synthetic_table(20, 10);
            let distance = table.distance_warp.calculate_value(dist_index as f64);
            let depth = table.depth_warp.calculate_value(depth_index as f64);
            let expected = table.at_index(dist_index, depth_index);
            let got = table.bilinear(distance, depth);
            proptest::prop_assert!((got - expected).abs() < 1e-5);
        }
    }
}
