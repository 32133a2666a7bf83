//! Geometric primitives and intersection tests
//!
//! Bounding boxes, planes, plane sets, line segments, spheres and convex
//! polygons, together with the intersection predicates the spatial hierarchy
//! and the scene queries are built on. Every primitive can be moved into
//! another coordinate space with a 4x4 affine matrix; where the exact image is
//! not representable (spheres under non-uniform scale, boxes under rotation)
//! the result is a conservative enclosure.

use serde::{Deserialize, Serialize};

use crate::foundation::math::{max_stretch, Mat4, Point3, Vec3, Vec4};

/// Tolerance used for plane side classification
pub const PLANE_EPSILON: f32 = 1e-5;

/// Axis-Aligned Bounding Box for spatial queries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AABB {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Default for AABB {
    fn default() -> Self {
        Self::new(Vec3::zeros(), Vec3::zeros())
    }
}

impl AABB {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Smallest box enclosing all given points, `None` for an empty iterator
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut aabb = Self::new(first, first);
        for point in points {
            aabb.append_point(point);
        }
        Some(aabb)
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Full size along each axis
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Grow the box so it includes `point`
    pub fn append_point(&mut self, point: Vec3) {
        self.min = self.min.inf(&point);
        self.max = self.max.sup(&point);
    }

    /// Smallest box enclosing both boxes
    pub fn combine(&self, other: &AABB) -> AABB {
        AABB::new(self.min.inf(&other.min), self.max.sup(&other.max))
    }

    /// The eight corners of the box
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(b.x, b.y, b.z),
            Vec3::new(a.x, b.y, b.z),
        ]
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if `other` lies completely inside this box
    pub fn contains_aabb(&self, other: &AABB) -> bool {
        other.min.x >= self.min.x && other.max.x <= self.max.x &&
        other.min.y >= self.min.y && other.max.y <= self.max.y &&
        other.min.z >= self.min.z && other.max.z <= self.max.z
    }

    /// Check if this AABB intersects another AABB
    pub fn intersects(&self, other: &AABB) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Squared distance from `point` to the closest point of the box (0 inside)
    pub fn squared_distance_to_point(&self, point: Vec3) -> f32 {
        let closest_point = Vec3::new(
            point.x.clamp(self.min.x, self.max.x),
            point.y.clamp(self.min.y, self.max.y),
            point.z.clamp(self.min.z, self.max.z),
        );
        (closest_point - point).magnitude_squared()
    }

    /// Check if the segment `line` touches the box
    pub fn intersects_line(&self, line: &Line) -> bool {
        let dir = line.end - line.start;
        match self.slab_interval(line.start, dir) {
            Some((tmin, tmax)) => tmax >= tmin && tmax >= 0.0 && tmin <= 1.0,
            None => false,
        }
    }

    /// Entry/exit parameters of the infinite line `origin + t * dir`
    ///
    /// `None` when the line is parallel to a slab and outside of it.
    fn slab_interval(&self, origin: Vec3, dir: Vec3) -> Option<(f32, f32)> {
        let mut tmin = f32::NEG_INFINITY;
        let mut tmax = f32::INFINITY;

        for axis in 0..3 {
            if dir[axis] == 0.0 {
                if origin[axis] < self.min[axis] || origin[axis] > self.max[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / dir[axis];
            let t1 = (self.min[axis] - origin[axis]) * inv;
            let t2 = (self.max[axis] - origin[axis]) * inv;
            tmin = tmin.max(t1.min(t2));
            tmax = tmax.min(t1.max(t2));
        }

        Some((tmin, tmax))
    }

    /// Axis aligned hull of the box after transforming all eight corners
    pub fn transformed(&self, matrix: &Mat4) -> AABB {
        let [first, rest @ ..] = self.corners();
        let mut aabb = {
            let p = matrix.transform_point(&Point3::from(first)).coords;
            AABB::new(p, p)
        };
        for corner in rest {
            aabb.append_point(matrix.transform_point(&Point3::from(corner)).coords);
        }
        aabb
    }
}

/// Which side of a plane a point lies on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneSide {
    /// Positive signed distance
    InFront,
    /// Negative signed distance
    Behind,
    /// Within [`PLANE_EPSILON`] of the plane
    Coinciding,
}

/// Plane defined by normal and distance from origin
///
/// The plane equation is `normal · p + distance = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (normalized)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self::from_coefficients(normal.x, normal.y, normal.z, distance)
    }

    /// Create the plane through `point` with the given normal
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize();
        Self {
            normal,
            distance: -normal.dot(&point),
        }
    }

    /// Plane through three points, normal following the counter-clockwise winding
    ///
    /// Returns `None` for collinear points.
    pub fn from_points(a: Vec3, b: Vec3, c: Vec3) -> Option<Self> {
        let normal = (b - a).cross(&(c - a));
        if normal.magnitude_squared() <= f32::EPSILON {
            return None;
        }
        Some(Self::from_point_normal(a, normal))
    }

    /// Create a plane from `ax + by + cz + d = 0`, normalizing the coefficients
    ///
    /// A degenerate normal yields a plane every point is in front of.
    pub fn from_coefficients(a: f32, b: f32, c: f32, d: f32) -> Self {
        let length = (a * a + b * b + c * c).sqrt();
        if length <= f32::EPSILON {
            return Self {
                normal: Vec3::new(0.0, 1.0, 0.0),
                distance: f32::INFINITY,
            };
        }
        Self {
            normal: Vec3::new(a / length, b / length, c / length),
            distance: d / length,
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }

    /// Classify a point against the plane
    pub fn side(&self, point: Vec3) -> PlaneSide {
        let distance = self.distance_to_point(point);
        if distance > PLANE_EPSILON {
            PlaneSide::InFront
        } else if distance < -PLANE_EPSILON {
            PlaneSide::Behind
        } else {
            PlaneSide::Coinciding
        }
    }

    /// Classify a box against the plane; `Coinciding` means the plane cuts it
    pub fn aabb_side(&self, aabb: &AABB) -> PlaneSide {
        let (near, far) = self.extreme_corners(aabb);
        if self.distance_to_point(near) > 0.0 {
            PlaneSide::InFront
        } else if self.distance_to_point(far) < 0.0 {
            PlaneSide::Behind
        } else {
            PlaneSide::Coinciding
        }
    }

    /// Corners of `aabb` with the smallest and largest signed distance
    fn extreme_corners(&self, aabb: &AABB) -> (Vec3, Vec3) {
        let mut near = aabb.max;
        let mut far = aabb.min;
        for axis in 0..3 {
            if self.normal[axis] >= 0.0 {
                near[axis] = aabb.min[axis];
                far[axis] = aabb.max[axis];
            }
        }
        (near, far)
    }

    /// Move the plane with the point transform `matrix`
    ///
    /// Planes transform with the inverse transpose. A singular matrix gives
    /// `None`.
    pub fn transformed(&self, matrix: &Mat4) -> Option<Self> {
        let inv_transpose = matrix.try_inverse()?.transpose();
        let v = inv_transpose * Vec4::new(self.normal.x, self.normal.y, self.normal.z, self.distance);
        Some(Self::from_coefficients(v.x, v.y, v.z, v.w))
    }
}

/// Result of classifying a box against a plane set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneSetClip {
    /// Completely outside at least one plane
    Outside,
    /// Inside every plane; no clipping needed
    Inside,
    /// Partially inside; bit `i` set means plane `i` cuts the box
    Intersecting(u32),
}

/// Convex volume given as the intersection of half spaces
///
/// A point is inside when its signed distance to every plane is non-negative,
/// so plane normals point into the volume. An empty set contains everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaneSet {
    planes: Vec<Plane>,
}

impl PlaneSet {
    /// Index of the near plane in a set built by [`PlaneSet::from_view_projection`]
    pub const NEAR: usize = 0;

    /// Create a plane set from planes with inward normals
    pub fn new(planes: Vec<Plane>) -> Self {
        Self { planes }
    }

    /// Planes of the set
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Number of planes
    pub fn len(&self) -> usize {
        self.planes.len()
    }

    /// True when there are no planes (the set contains everything)
    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    /// Add a plane
    pub fn push(&mut self, plane: Plane) {
        self.planes.push(plane);
    }

    /// Extract frustum planes from a view-projection matrix
    ///
    /// Gribb-Hartmann extraction for a 0..1 depth range. Planes are ordered
    /// near, far, left, right, top, bottom.
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let row = |i: usize| view_projection.row(i).transpose();
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        let plane = |v: Vec4| Plane::from_coefficients(v.x, v.y, v.z, v.w);

        Self::new(vec![
            plane(r2),
            plane(r3 - r2),
            plane(r3 + r0),
            plane(r3 - r0),
            plane(r3 - r1),
            plane(r3 + r1),
        ])
    }

    /// View planes from `viewer` through the edges of a convex polygon
    ///
    /// Used to narrow a frustum to what is visible through a portal. Each
    /// plane contains the viewer and one polygon edge and faces the polygon
    /// interior. Returns `None` for fewer than three vertices or a viewer in
    /// the polygon plane.
    pub fn create_view_planes(polygon: &[Vec3], viewer: Vec3) -> Option<Self> {
        if polygon.len() < 3 {
            return None;
        }
        let centroid = polygon.iter().sum::<Vec3>() / polygon.len() as f32;

        let mut planes = Vec::with_capacity(polygon.len());
        for (i, &a) in polygon.iter().enumerate() {
            let b = polygon[(i + 1) % polygon.len()];
            let mut plane = Plane::from_points(viewer, a, b)?;
            if plane.distance_to_point(centroid) < 0.0 {
                plane = Plane { normal: -plane.normal, distance: -plane.distance };
            }
            planes.push(plane);
        }
        Some(Self::new(planes))
    }

    /// Check if a point is inside every plane
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(point) >= 0.0)
    }

    /// Conservative box test
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        self.clip_aabb(aabb) != PlaneSetClip::Outside
    }

    /// Classify a box, reporting which planes cut it
    pub fn clip_aabb(&self, aabb: &AABB) -> PlaneSetClip {
        let mut mask = 0_u32;
        for (i, plane) in self.planes.iter().enumerate() {
            match plane.aabb_side(aabb) {
                PlaneSide::Behind => return PlaneSetClip::Outside,
                PlaneSide::Coinciding if i < 32 => mask |= 1 << i,
                _ => {}
            }
        }
        if mask == 0 {
            PlaneSetClip::Inside
        } else {
            PlaneSetClip::Intersecting(mask)
        }
    }

    /// Move every plane with the point transform `matrix`
    ///
    /// A singular matrix yields an empty set, which contains everything.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let planes: Option<Vec<Plane>> = self.planes.iter().map(|p| p.transformed(matrix)).collect();
        match planes {
            Some(planes) => Self::new(planes),
            None => {
                log::warn!("Singular transform applied to plane set, dropping all planes");
                Self::default()
            }
        }
    }
}

/// Line segment from `start` to `end`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    /// Segment start
    pub start: Vec3,
    /// Segment end
    pub end: Vec3,
}

impl Line {
    /// Create a new segment
    pub fn new(start: Vec3, end: Vec3) -> Self {
        Self { start, end }
    }

    /// Transform both end points
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self {
            start: matrix.transform_point(&Point3::from(self.start)).coords,
            end: matrix.transform_point(&Point3::from(self.end)).coords,
        }
    }
}

/// Sphere given by center and radius
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// Sphere center
    pub center: Vec3,
    /// Sphere radius
    pub radius: f32,
}

impl Sphere {
    /// Create a new sphere
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Check if the sphere touches a box
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        aabb.squared_distance_to_point(self.center) <= self.radius * self.radius
    }

    /// Enclosing sphere of the transformed sphere
    ///
    /// The center maps exactly; the radius grows by the largest stretch of
    /// the matrix, so the result may be larger than the true image but never
    /// smaller.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self {
            center: matrix.transform_point(&Point3::from(self.center)).coords,
            radius: self.radius * max_stretch(matrix),
        }
    }
}

/// Convex planar polygon, used for cell portal openings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polygon {
    /// Vertices in counter-clockwise order seen from the front side
    pub vertices: Vec<Vec3>,
}

impl Polygon {
    /// Create a polygon from its vertices
    pub fn new(vertices: Vec<Vec3>) -> Self {
        Self { vertices }
    }

    /// Axis aligned rectangle in the local XY plane, facing +Z
    pub fn rectangle(width: f32, height: f32) -> Self {
        let (w, h) = (width * 0.5, height * 0.5);
        Self::new(vec![
            Vec3::new(-w, -h, 0.0),
            Vec3::new(w, -h, 0.0),
            Vec3::new(w, h, 0.0),
            Vec3::new(-w, h, 0.0),
        ])
    }

    /// Supporting plane from the first three vertices
    pub fn plane(&self) -> Option<Plane> {
        match self.vertices.as_slice() {
            [a, b, c, ..] => Plane::from_points(*a, *b, *c),
            _ => None,
        }
    }

    /// Bounding box of the vertices
    pub fn aabb(&self) -> Option<AABB> {
        AABB::from_points(self.vertices.iter().copied())
    }

    /// Transform every vertex
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self::new(
            self.vertices
                .iter()
                .map(|v| matrix.transform_point(&Point3::from(*v)).coords)
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4Ext;
    use approx::assert_relative_eq;

    fn unit_box() -> AABB {
        AABB::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_aabb_contains_point() {
        let aabb = unit_box();

        assert!(aabb.contains_point(Vec3::zeros()));
        assert!(aabb.contains_point(Vec3::new(0.5, 0.5, 0.5)));
        assert!(!aabb.contains_point(Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn test_aabb_intersects() {
        let aabb1 = AABB::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 2.0, 2.0));
        let aabb2 = AABB::new(Vec3::new(1.0, 1.0, 1.0), Vec3::new(3.0, 3.0, 3.0));
        let aabb3 = AABB::new(Vec3::new(5.0, 5.0, 5.0), Vec3::new(7.0, 7.0, 7.0));

        assert!(aabb1.intersects(&aabb2));
        assert!(!aabb1.intersects(&aabb3));
        assert!(aabb1.combine(&aabb3).contains_aabb(&aabb2));
    }

    #[test]
    fn test_segment_vs_box() {
        let aabb = unit_box();

        assert!(aabb.intersects_line(&Line::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0))));
        // Stops short of the box
        assert!(!aabb.intersects_line(&Line::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(-2.0, 0.0, 0.0))));
        // Parallel and outside
        assert!(!aabb.intersects_line(&Line::new(Vec3::new(-5.0, 3.0, 0.0), Vec3::new(5.0, 3.0, 0.0))));
        // Fully inside
        assert!(aabb.intersects_line(&Line::new(Vec3::new(-0.5, 0.0, 0.0), Vec3::new(0.5, 0.0, 0.0))));
    }

    #[test]
    fn test_rotated_box_hull_grows() {
        let rotation = Mat4::from_axis_angle(&Vec3::z_axis(), std::f32::consts::FRAC_PI_4);
        let hull = unit_box().transformed(&rotation);

        let expected = 2.0_f32.sqrt();
        assert_relative_eq!(hull.max.x, expected, epsilon = 1e-5);
        assert_relative_eq!(hull.min.y, -expected, epsilon = 1e-5);
        assert_relative_eq!(hull.max.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_plane_set_clip_mask() {
        // Half space x >= 0
        let set = PlaneSet::new(vec![Plane::new(Vec3::new(1.0, 0.0, 0.0), 0.0)]);

        assert_eq!(set.clip_aabb(&unit_box()), PlaneSetClip::Intersecting(1));
        let right = AABB::new(Vec3::new(1.0, -1.0, -1.0), Vec3::new(2.0, 1.0, 1.0));
        assert_eq!(set.clip_aabb(&right), PlaneSetClip::Inside);
        let left = AABB::new(Vec3::new(-3.0, -1.0, -1.0), Vec3::new(-2.0, 1.0, 1.0));
        assert_eq!(set.clip_aabb(&left), PlaneSetClip::Outside);
    }

    #[test]
    fn test_plane_transform_keeps_points_on_plane() {
        let plane = Plane::from_point_normal(Vec3::new(0.0, 0.0, 2.0), Vec3::new(0.0, 0.0, 1.0));
        let matrix = Mat4::new_translation(&Vec3::new(5.0, 0.0, 1.0))
            * Mat4::new_nonuniform_scaling(&Vec3::new(1.0, 3.0, 2.0));

        let moved = plane.transformed(&matrix).unwrap();
        let point = matrix.transform_point(&Point3::new(7.0, -4.0, 2.0)).coords;
        assert_relative_eq!(moved.distance_to_point(point), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_frustum_extraction() {
        let projection = Mat4::perspective(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let view = Mat4::look_at(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0), Vec3::y());
        let frustum = PlaneSet::from_view_projection(&(projection * view));

        assert_eq!(frustum.len(), 6);
        assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -10.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 10.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, -200.0)));
        assert!(!frustum.contains_point(Vec3::new(50.0, 0.0, -10.0)));
    }

    #[test]
    fn test_view_planes_through_portal() {
        let portal = Polygon::rectangle(2.0, 2.0).transformed(&Mat4::new_translation(&Vec3::new(0.0, 0.0, -5.0)));
        let planes = PlaneSet::create_view_planes(&portal.vertices, Vec3::zeros()).unwrap();

        assert_eq!(planes.len(), 4);
        assert!(planes.contains_point(Vec3::new(0.0, 0.0, -10.0)));
        assert!(!planes.contains_point(Vec3::new(5.0, 0.0, -10.0)));
    }

    #[test]
    fn test_sphere_scaled_radius_is_conservative() {
        let sphere = Sphere::new(Vec3::zeros(), 1.0);
        let scaled = sphere.transformed(&Mat4::new_nonuniform_scaling(&Vec3::new(2.0, 1.0, 1.0)));

        assert!(scaled.radius >= 2.0 - 1e-5);
    }
}
