//! Speed-bucketed polyline cache
//!
//! A trace whose color changes with speed is stored as one append-only
//! polyline per speed bucket instead of a single multi-colored line. Appending
//! a point only ever touches the polyline of the point's own bucket, so a
//! renderer can redraw thousands of points every frame without rebuilding any
//! geometry. Buckets are not bridged: when the speed crosses a threshold the
//! old bucket's line simply ends and the new bucket's line picks up at the new
//! point, leaving a small visual gap.

use serde::{Deserialize, Serialize};

use crate::types::ProjectedPoint;

/// Display color of one bucket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    fn lerp(a: Rgb, b: Rgb, t: f64) -> Rgb {
        let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * t).round() as u8;
        Rgb::new(mix(a.r, b.r), mix(a.g, b.g), mix(a.b, b.b))
    }
}

const SLOW_COLOR: Rgb = Rgb::new(0x2E, 0xCC, 0x40);
const FAST_COLOR: Rgb = Rgb::new(0xFF, 0x41, 0x36);

/// Linear mapping from speed onto `count` discrete buckets
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeedBuckets {
    pub min_speed: f64,
    pub max_speed: f64,
    pub count: usize,
}

impl SpeedBuckets {
    pub fn new(min_speed: f64, max_speed: f64, count: usize) -> Self {
        Self {
            min_speed,
            max_speed,
            count: count.max(1),
        }
    }

    /// Clamp `speed` to the range and map it onto `[0, count - 1]`, truncating
    pub fn assign(&self, speed: f64) -> usize {
        let last = self.count.saturating_sub(1);
        let span = self.max_speed - self.min_speed;
        if last == 0 || !(span > 0.0) || speed.is_nan() {
            return 0;
        }

        let clamped = speed.clamp(self.min_speed, self.max_speed);
        let t = (clamped - self.min_speed) / span;
        let bucket = (t * last as f64) as usize;
        bucket.min(last)
    }

    /// Green (slow) to red (fast) gradient, one color per bucket
    pub fn default_palette(&self) -> Vec<Rgb> {
        let last = self.count.saturating_sub(1);
        (0..self.count)
            .map(|i| {
                let t = if last == 0 { 0.0 } else { i as f64 / last as f64 };
                Rgb::lerp(SLOW_COLOR, FAST_COLOR, t)
            })
            .collect()
    }
}

impl Default for SpeedBuckets {
    fn default() -> Self {
        Self::new(0.0, 40.0, 16)
    }
}

/// One bucket's geometry and color
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BucketPath {
    pub color: Rgb,
    pub points: Vec<ProjectedPoint>,
}

impl BucketPath {
    /// Number of drawable segments (consecutive point pairs)
    pub fn segment_count(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    pub fn last_point(&self) -> Option<&ProjectedPoint> {
        self.points.last()
    }
}

#[derive(Clone, Debug)]
pub struct PathCache {
    buckets: SpeedBuckets,
    paths: Vec<BucketPath>,
    max_speed: f64,
    appended: usize,
}

impl PathCache {
    pub fn new(buckets: SpeedBuckets) -> Self {
        let palette = buckets.default_palette();
        Self::with_colors(buckets, palette)
    }

    /// Build with explicit colors. Missing entries fall back to the default palette.
    pub fn with_colors(buckets: SpeedBuckets, colors: Vec<Rgb>) -> Self {
        // Struct literals can bypass `SpeedBuckets::new`; there is always one bucket
        let buckets = SpeedBuckets::new(buckets.min_speed, buckets.max_speed, buckets.count);
        let fallback = buckets.default_palette();
        let paths = (0..buckets.count)
            .map(|i| BucketPath {
                color: colors.get(i).copied().unwrap_or(fallback[i]),
                points: Vec::new(),
            })
            .collect();
        Self {
            buckets,
            paths,
            max_speed: 0.0,
            appended: 0,
        }
    }

    pub fn buckets(&self) -> &SpeedBuckets {
        &self.buckets
    }

    pub fn assign_bucket(&self, speed: f64) -> usize {
        self.buckets.assign(speed)
    }

    /// Extend `bucket`'s polyline with `point`. An empty bucket starts a new line at `point`.
    ///
    /// Out-of-range bucket indices are clamped to the last bucket.
    pub fn append(&mut self, point: ProjectedPoint, bucket: usize) -> usize {
        let bucket = bucket.min(self.paths.len().saturating_sub(1));
        self.paths[bucket].points.push(point);
        self.appended += 1;
        bucket
    }

    /// Assign a bucket from `speed`, append, and track the running max speed.
    /// Returns the bucket the point landed in.
    pub fn push(&mut self, point: ProjectedPoint, speed: f64) -> usize {
        if speed > self.max_speed {
            self.max_speed = speed;
        }
        let bucket = self.assign_bucket(speed);
        self.append(point, bucket)
    }

    pub fn paths(&self) -> &[BucketPath] {
        &self.paths
    }

    pub fn path(&self, bucket: usize) -> Option<&BucketPath> {
        self.paths.get(bucket)
    }

    /// Highest speed passed to `push` so far
    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    pub fn total_points(&self) -> usize {
        self.appended
    }

    pub fn segment_count(&self) -> usize {
        self.paths.iter().map(BucketPath::segment_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.appended == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(x: f64) -> ProjectedPoint {
        ProjectedPoint::new(x, 0.0)
    }

    #[test]
    fn test_assign_bounds_and_monotonic() {
        let buckets = SpeedBuckets::new(5.0, 25.0, 8);
        let speeds = [-1e9, -3.0, 0.0, 5.0, 7.5, 12.0, 19.99, 25.0, 30.0, 1e12, f64::INFINITY];
        let mut prev = 0;
        for speed in speeds {
            let b = buckets.assign(speed);
            assert!(b < 8, "speed {} -> bucket {}", speed, b);
            assert!(b >= prev, "not monotonic at {}", speed);
            prev = b;
        }
        assert_eq!(buckets.assign(-3.0), 0);
        assert_eq!(buckets.assign(25.0), 7);
        assert_eq!(buckets.assign(f64::NEG_INFINITY), 0);
        assert_eq!(buckets.assign(f64::NAN), 0);
    }

    #[test]
    fn test_assign_truncates() {
        let buckets = SpeedBuckets::new(0.0, 10.0, 11);
        assert_eq!(buckets.assign(4.99), 4);
        assert_eq!(buckets.assign(5.0), 5);
        assert_eq!(buckets.assign(9.999), 9);
    }

    #[test]
    fn test_degenerate_ranges() {
        assert_eq!(SpeedBuckets::new(10.0, 10.0, 4).assign(50.0), 0);
        assert_eq!(SpeedBuckets::new(0.0, 10.0, 1).assign(50.0), 0);
        assert_eq!(SpeedBuckets::new(0.0, 10.0, 0).count, 1);
    }

    #[test]
    fn test_buckets_are_not_bridged() {
        let mut cache = PathCache::new(SpeedBuckets::new(0.0, 10.0, 2));
        cache.append(pt(0.0), 0);
        cache.append(pt(1.0), 0);
        cache.append(pt(2.0), 1);
        cache.append(pt(3.0), 0);

        // Bucket 1 starts at its own first point, not at the last global point
        assert_eq!(cache.path(1).unwrap().points, vec![pt(2.0)]);
        assert_eq!(cache.path(0).unwrap().points, vec![pt(0.0), pt(1.0), pt(3.0)]);
        assert_eq!(cache.segment_count(), 2);
        assert_eq!(cache.total_points(), 4);
    }

    #[test]
    fn test_push_tracks_max_speed() {
        let mut cache = PathCache::new(SpeedBuckets::new(0.0, 10.0, 5));
        assert_eq!(cache.push(pt(0.0), 2.0), 0);
        assert_eq!(cache.push(pt(1.0), 14.0), 4);
        cache.push(pt(2.0), 3.0);
        assert_eq!(cache.max_speed(), 14.0);
    }

    #[test]
    fn test_colors_fixed_at_construction() {
        let buckets = SpeedBuckets::new(0.0, 1.0, 3);
        let cache = PathCache::with_colors(buckets, vec![Rgb::new(1, 2, 3)]);
        assert_eq!(cache.path(0).unwrap().color, Rgb::new(1, 2, 3));
        assert_eq!(cache.path(2).unwrap().color, FAST_COLOR);
        assert_eq!(buckets.default_palette()[0], SLOW_COLOR);
    }

    #[test]
    fn test_zero_bucket_literal_gets_one_bucket() {
        let buckets = SpeedBuckets {
            min_speed: 0.0,
            max_speed: 40.0,
            count: 0,
        };
        let mut cache = PathCache::new(buckets);
        assert_eq!(cache.buckets().count, 1);
        assert_eq!(cache.paths().len(), 1);
        assert_eq!(cache.push(pt(1.0), 12.0), 0);
        assert_eq!(cache.append(pt(2.0), 7), 0);
        assert_eq!(cache.path(0).unwrap().points.len(), 2);
    }
}
