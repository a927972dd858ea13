//! Orbit camera driven by input velocities.
//!
//! Input events fold into an immutable [`CameraInputState`]; each frame the
//! pose is advanced by [`integrate`], a pure function of the previous pose,
//! the input and the frame time.

use std::f32::consts::TAU;
use std::time::Instant;

use glam::{Mat4, Vec2, Vec3};

use crate::params::{CameraParams, Control};

/// Look-at target, orientation and pull-back distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    /// Target latitude (tiles, 0..=latitudinal size)
    pub latitude: f32,

    /// Target longitude (tiles, 0..=longitudinal size)
    pub longitude: f32,

    /// Target altitude (map units). Pinned to ground level.
    pub altitude: f32,

    /// Heading (radians, [0, 2π))
    pub azimuth: f32,

    /// Pitch below the horizon (radians)
    pub elevation: f32,

    /// Eye distance from the target (map units)
    pub distance: f32,
}

impl CameraPose {
    pub fn new(params: &CameraParams) -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            azimuth: 0.0,
            elevation: 0.0,
            distance: params.distance_min,
        }
    }
}

/// Limits applied to the pose after every update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraBounds {
    pub latitude_max: f32,
    pub longitude_max: f32,
    pub elevation: [f32; 2],
    pub distance: [f32; 2],
}

impl CameraBounds {
    pub fn new(params: &CameraParams, latitudinal_size: usize, longitudinal_size: usize) -> Self {
        Self {
            latitude_max: latitudinal_size as f32,
            longitude_max: longitudinal_size as f32,
            elevation: [params.elevation_min, params.elevation_max],
            distance: [params.distance_min, params.distance_max],
        }
    }
}

/// Velocities set by input events plus the last pointer position
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CameraInputState {
    /// Forward speed (tiles per second)
    pub anterior: f32,

    /// Rightward speed (tiles per second)
    pub lateral: f32,

    /// Turn rate (radians per second)
    pub azimuthal: f32,

    /// Pitch rate (radians per second)
    pub elevational: f32,

    /// Zoom-out rate (map units per second)
    pub distantial: f32,

    /// Pointer position in window pixels
    pub pointer: Vec2,
}

impl CameraInputState {
    pub fn with_anterior(self, anterior: f32) -> Self {
        Self { anterior, ..self }
    }

    pub fn with_lateral(self, lateral: f32) -> Self {
        Self { lateral, ..self }
    }

    pub fn with_movement(self, anterior: f32, lateral: f32) -> Self {
        Self {
            anterior,
            lateral,
            ..self
        }
    }

    pub fn with_azimuthal(self, azimuthal: f32) -> Self {
        Self { azimuthal, ..self }
    }

    pub fn with_elevational(self, elevational: f32) -> Self {
        Self {
            elevational,
            ..self
        }
    }

    pub fn with_distantial(self, distantial: f32) -> Self {
        Self { distantial, ..self }
    }

    pub fn with_pointer(self, pointer: Vec2) -> Self {
        Self { pointer, ..self }
    }

    pub fn is_still(&self) -> bool {
        self.anterior == 0.0
            && self.lateral == 0.0
            && self.azimuthal == 0.0
            && self.elevational == 0.0
            && self.distantial == 0.0
    }

    /// State after a bound key changes. Presses set their axis; releases zero
    /// the whole axis group (any move key stops both movement axes).
    pub fn on_control(self, params: &CameraParams, control: Control, pressed: bool) -> Self {
        let scroll = params.scrolling_speed;
        let diagonal = params.diagonal_speed();
        let rotate = params.rotation_speed;
        let zoom = params.zooming_speed;

        if !pressed {
            return match control {
                Control::MoveForward
                | Control::MoveBackward
                | Control::MoveLeft
                | Control::MoveRight
                | Control::MoveForwardLeft
                | Control::MoveForwardRight
                | Control::MoveBackwardLeft
                | Control::MoveBackwardRight => self.with_movement(0.0, 0.0),
                Control::TurnLeft | Control::TurnRight => self.with_azimuthal(0.0),
                Control::PitchUp | Control::PitchDown => self.with_elevational(0.0),
                Control::ZoomIn | Control::ZoomOut => self.with_distantial(0.0),
                Control::PauseResume => self,
            };
        }

        match control {
            Control::MoveForward => self.with_anterior(scroll),
            Control::MoveBackward => self.with_anterior(-scroll),
            Control::MoveLeft => self.with_lateral(-scroll),
            Control::MoveRight => self.with_lateral(scroll),
            Control::MoveForwardLeft => self.with_movement(diagonal, -diagonal),
            Control::MoveForwardRight => self.with_movement(diagonal, diagonal),
            Control::MoveBackwardLeft => self.with_movement(-diagonal, -diagonal),
            Control::MoveBackwardRight => self.with_movement(-diagonal, diagonal),
            Control::TurnLeft => self.with_azimuthal(-rotate),
            Control::TurnRight => self.with_azimuthal(rotate),
            Control::PitchUp => self.with_elevational(rotate),
            Control::PitchDown => self.with_elevational(-rotate),
            Control::ZoomOut => self.with_distantial(zoom),
            Control::ZoomIn => self.with_distantial(-zoom),
            Control::PauseResume => self,
        }
    }

    /// State after the pointer moves inside a `size` window. Within
    /// `scroll_padding` of a border the view pans toward it; corners pan
    /// diagonally, a single border only sets its own axis, and the interior
    /// stops panning.
    pub fn on_pointer(self, params: &CameraParams, position: Vec2, size: Vec2) -> Self {
        let scroll = params.scrolling_speed;
        let diagonal = params.diagonal_speed();
        let padding = params.scroll_padding;

        let left = position.x < padding;
        let right = position.x >= size.x - padding;
        let top = position.y < padding;
        let bottom = position.y >= size.y - padding;

        let state = self.with_pointer(position);
        match (left, right, top, bottom) {
            (true, _, true, _) => state.with_movement(diagonal, -diagonal),
            (false, true, true, _) => state.with_movement(diagonal, diagonal),
            (true, _, false, true) => state.with_movement(-diagonal, -diagonal),
            (false, true, false, true) => state.with_movement(-diagonal, diagonal),
            (true, _, false, false) => state.with_lateral(-scroll),
            (false, true, false, false) => state.with_lateral(scroll),
            (false, false, true, _) => state.with_anterior(scroll),
            (false, false, false, true) => state.with_anterior(-scroll),
            (false, false, false, false) => state.with_movement(0.0, 0.0),
        }
    }
}

/// Input that affects the camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraEvent {
    Control { control: Control, pressed: bool },
    /// Precise wheel rotation; positive rotates toward the user
    Wheel(f32),
    Pointer {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
}

/// Apply the pose limits: latitude and longitude stop at the map edges,
/// azimuth wraps, elevation and distance clamp
pub fn clamp_pose(pose: CameraPose, bounds: &CameraBounds) -> CameraPose {
    CameraPose {
        latitude: pose.latitude.clamp(0.0, bounds.latitude_max),
        longitude: pose.longitude.clamp(0.0, bounds.longitude_max),
        altitude: pose.altitude,
        azimuth: wrap_azimuth(pose.azimuth),
        elevation: pose.elevation.clamp(bounds.elevation[0], bounds.elevation[1]),
        distance: pose.distance.clamp(bounds.distance[0], bounds.distance[1]),
    }
}

fn wrap_azimuth(azimuth: f32) -> f32 {
    let wrapped = azimuth.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Advance `pose` by `dt` seconds of `input`
pub fn integrate(
    pose: CameraPose,
    input: &CameraInputState,
    dt: f32,
    bounds: &CameraBounds,
) -> CameraPose {
    let (sin, cos) = pose.azimuth.sin_cos();
    let moved = CameraPose {
        latitude: pose.latitude + (cos * input.anterior - sin * input.lateral) * dt,
        longitude: pose.longitude + (sin * input.anterior + cos * input.lateral) * dt,
        altitude: pose.altitude,
        azimuth: pose.azimuth + input.azimuthal * dt,
        elevation: pose.elevation + input.elevational * dt,
        distance: pose.distance + input.distantial * dt,
    };
    clamp_pose(moved, bounds)
}

/// World-to-eye transform of an orbit camera: move the target to the origin,
/// orient, then pull back along the view axis
pub fn view_matrix(pose: &CameraPose) -> Mat4 {
    Mat4::from_translation(Vec3::new(0.0, 0.0, -pose.distance))
        * Mat4::from_rotation_x(pose.elevation)
        * Mat4::from_rotation_y(pose.azimuth)
        * Mat4::from_translation(Vec3::new(-pose.longitude, -pose.altitude, pose.latitude))
}

/// Perspective projection whose far plane reaches across the whole map from
/// the farthest eye distance
pub fn projection(
    params: &CameraParams,
    aspect_ratio: f32,
    latitudinal_size: usize,
    longitudinal_size: usize,
) -> Mat4 {
    let diagonal = (latitudinal_size as f32).hypot(longitudinal_size as f32);
    Mat4::perspective_rh(
        params.fov_y_degrees.to_radians(),
        aspect_ratio,
        params.distance_min,
        params.distance_max + diagonal,
    )
}

/// Camera state of one map view
pub struct CameraController {
    params: CameraParams,
    bounds: CameraBounds,
    map_size: [usize; 2],
    pose: CameraPose,
    input: CameraInputState,
    previous: Instant,
}

impl CameraController {
    pub fn new(params: &CameraParams, latitudinal_size: usize, longitudinal_size: usize) -> Self {
        Self {
            params: params.clone(),
            bounds: CameraBounds::new(params, latitudinal_size, longitudinal_size),
            map_size: [latitudinal_size, longitudinal_size],
            pose: CameraPose::new(params),
            input: CameraInputState::default(),
            previous: Instant::now(),
        }
    }

    pub fn pose(&self) -> CameraPose {
        self.pose
    }

    pub fn input(&self) -> CameraInputState {
        self.input
    }

    pub fn handle(&mut self, event: CameraEvent) {
        match event {
            CameraEvent::Control { control, pressed } => {
                self.input = self.input.on_control(&self.params, control, pressed);
            }
            CameraEvent::Wheel(rotation) => {
                let mut pose = self.pose;
                pose.distance -= rotation / self.params.wheel_divisor;
                self.pose = clamp_pose(pose, &self.bounds);
            }
            CameraEvent::Pointer {
                x,
                y,
                width,
                height,
            } => {
                self.input = self.input.on_pointer(
                    &self.params,
                    Vec2::new(x, y),
                    Vec2::new(width, height),
                );
            }
        }
    }

    /// Advance by the wall-clock time since the previous tick
    pub fn tick(&mut self) -> CameraPose {
        let now = Instant::now();
        let dt = now.duration_since(self.previous).as_secs_f32();
        self.previous = now;
        self.advance(dt)
    }

    pub fn advance(&mut self, dt: f32) -> CameraPose {
        self.pose = integrate(self.pose, &self.input, dt, &self.bounds);
        self.pose
    }

    /// Restart the frame clock, e.g. after the render loop was paused
    pub fn reset_clock(&mut self) {
        self.previous = Instant::now();
    }

    /// Combined projection × view transformation
    pub fn transformation(&self, aspect_ratio: f32) -> Mat4 {
        projection(&self.params, aspect_ratio, self.map_size[0], self.map_size[1])
            * view_matrix(&self.pose)
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::{FRAC_PI_2, PI};

    use super::*;
    use crate::params::{DISTANCE_MAX, DISTANCE_MIN};

    fn bounds() -> CameraBounds {
        CameraBounds::new(&CameraParams::default(), 10, 20)
    }

    #[test]
    fn test_initial_pose() {
        let pose = CameraPose::new(&CameraParams::default());
        assert_eq!(pose.distance, DISTANCE_MIN);
        assert_eq!(pose.latitude, 0.0);
        assert_eq!(pose.altitude, 0.0);
        assert_eq!(pose.elevation, 0.0);
    }

    #[test]
    fn test_zero_velocity_is_idempotent() {
        let input = CameraInputState::default();
        let start = CameraPose {
            latitude: 3.0,
            longitude: 7.5,
            altitude: 0.0,
            azimuth: 1.0,
            elevation: 0.4,
            distance: 12.0,
        };
        let mut pose = start;
        for dt in [0.0, 0.016, 1.0, 250.0] {
            pose = integrate(pose, &input, dt, &bounds());
            assert_eq!(pose, start, "pose drifted with dt={}", dt);
        }
    }

    #[test]
    fn test_clamp_is_a_fixed_point() {
        let wild = CameraPose {
            latitude: -5.0,
            longitude: 1e6,
            altitude: 0.0,
            azimuth: -0.5,
            elevation: 3.0,
            distance: -40.0,
        };
        let once = clamp_pose(wild, &bounds());
        assert_eq!(clamp_pose(once, &bounds()), once);
        assert_eq!(once.latitude, 0.0);
        assert_eq!(once.longitude, 20.0);
        assert_eq!(once.elevation, FRAC_PI_2);
        assert_eq!(once.distance, DISTANCE_MIN);
        assert!((0.0..TAU).contains(&once.azimuth));
    }

    #[test]
    fn test_azimuth_wraps_by_full_turns() {
        let start = CameraPose {
            azimuth: 1.25,
            ..CameraPose::new(&CameraParams::default())
        };
        for turns in [-3.0, -1.0, 1.0, 2.0, 5.0] {
            let input = CameraInputState::default().with_azimuthal(TAU * turns);
            let pose = integrate(start, &input, 1.0, &bounds());
            assert!(
                (pose.azimuth - start.azimuth).abs() < 1e-4,
                "{} turns gave azimuth {}",
                turns,
                pose.azimuth
            );
        }
    }

    #[test]
    fn test_wheel_clamps_to_max_distance() {
        let params = CameraParams::default();
        let mut camera = CameraController::new(&params, 10, 10);
        let rotation = -((DISTANCE_MAX - DISTANCE_MIN) * params.wheel_divisor + 1.0);
        camera.handle(CameraEvent::Wheel(rotation));
        assert_eq!(camera.pose().distance, DISTANCE_MAX);

        camera.handle(CameraEvent::Wheel(1e6));
        assert_eq!(camera.pose().distance, DISTANCE_MIN);
    }

    #[test]
    fn test_forward_moves_along_azimuth() {
        let params = CameraParams::default();
        let input = CameraInputState::default().on_control(&params, Control::MoveForward, true);
        let start = CameraPose {
            latitude: 5.0,
            longitude: 5.0,
            ..CameraPose::new(&params)
        };

        let north = integrate(start, &input, 0.5, &bounds());
        assert!((north.latitude - 7.5).abs() < 1e-5);
        assert!((north.longitude - 5.0).abs() < 1e-5);

        let east = integrate(
            CameraPose {
                azimuth: FRAC_PI_2,
                ..start
            },
            &input,
            0.5,
            &bounds(),
        );
        assert!((east.latitude - 5.0).abs() < 1e-5);
        assert!((east.longitude - 7.5).abs() < 1e-5);
    }

    #[test]
    fn test_movement_stops_at_map_edge() {
        let params = CameraParams::default();
        let input = CameraInputState::default().on_control(&params, Control::MoveBackward, true);
        let pose = integrate(CameraPose::new(&params), &input, 10.0, &bounds());
        assert_eq!(pose.latitude, 0.0);
    }

    #[test]
    fn test_release_zeroes_axis_group() {
        let params = CameraParams::default();
        let input = CameraInputState::default()
            .on_control(&params, Control::MoveForwardLeft, true)
            .on_control(&params, Control::TurnRight, true);
        assert!((input.anterior - params.diagonal_speed()).abs() < 1e-6);
        assert!((input.lateral + params.diagonal_speed()).abs() < 1e-6);

        let released = input.on_control(&params, Control::MoveRight, false);
        assert_eq!(released.anterior, 0.0);
        assert_eq!(released.lateral, 0.0);
        assert_eq!(released.azimuthal, params.rotation_speed);

        let stopped = released.on_control(&params, Control::TurnLeft, false);
        assert!(stopped.is_still());
    }

    #[test]
    fn test_zoom_keys() {
        let params = CameraParams::default();
        let zoom_out = CameraInputState::default().on_control(&params, Control::ZoomOut, true);
        assert_eq!(zoom_out.distantial, params.zooming_speed);
        let zoom_in = zoom_out.on_control(&params, Control::ZoomIn, true);
        assert_eq!(zoom_in.distantial, -params.zooming_speed);
        let paused = zoom_in.on_control(&params, Control::PauseResume, true);
        assert_eq!(paused, zoom_in);
    }

    #[test]
    fn test_edge_panning() {
        let params = CameraParams::default();
        let size = Vec2::new(800.0, 600.0);
        let still = CameraInputState::default();

        let corner = still.on_pointer(&params, Vec2::new(2.0, 3.0), size);
        assert!((corner.anterior - params.diagonal_speed()).abs() < 1e-6);
        assert!((corner.lateral + params.diagonal_speed()).abs() < 1e-6);

        let right = still
            .with_anterior(1.0)
            .on_pointer(&params, Vec2::new(795.0, 300.0), size);
        assert_eq!(right.lateral, params.scrolling_speed);
        assert_eq!(right.anterior, 1.0);

        let bottom = still.on_pointer(&params, Vec2::new(400.0, 599.0), size);
        assert_eq!(bottom.anterior, -params.scrolling_speed);

        let centre = bottom.on_pointer(&params, Vec2::new(400.0, 300.0), size);
        assert_eq!(centre.anterior, 0.0);
        assert_eq!(centre.lateral, 0.0);
        assert_eq!(centre.pointer, Vec2::new(400.0, 300.0));
    }

    #[test]
    fn test_pointer_overrides_keyboard() {
        let params = CameraParams::default();
        let mut camera = CameraController::new(&params, 10, 10);
        camera.handle(CameraEvent::Control {
            control: Control::MoveForward,
            pressed: true,
        });
        camera.handle(CameraEvent::Pointer {
            x: 400.0,
            y: 300.0,
            width: 800.0,
            height: 600.0,
        });
        assert_eq!(camera.input().anterior, 0.0);
    }

    #[test]
    fn test_view_places_target_in_front() {
        let pose = CameraPose {
            latitude: 4.0,
            longitude: 6.0,
            altitude: 0.0,
            azimuth: 0.7,
            elevation: 0.3,
            distance: 15.0,
        };
        // Target in world space: x = longitude, z = -latitude
        let target = view_matrix(&pose).transform_point3(Vec3::new(6.0, 0.0, -4.0));
        assert!(target.truncate().length() < 1e-4);
        assert!((target.z + 15.0).abs() < 1e-4);
    }

    #[test]
    fn test_looking_straight_down() {
        let pose = CameraPose {
            elevation: FRAC_PI_2,
            distance: 10.0,
            ..CameraPose::new(&CameraParams::default())
        };
        let eye = view_matrix(&pose).inverse().transform_point3(Vec3::ZERO);
        assert!((eye - Vec3::new(0.0, 10.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_projection_far_plane_covers_map() {
        let params = CameraParams::default();
        let proj = projection(&params, 1.0, 30, 40);
        let far = params.distance_max + 50.0;

        let near_clip = proj * glam::Vec4::new(0.0, 0.0, -params.distance_min, 1.0);
        assert!((near_clip.z / near_clip.w).abs() < 1e-5);
        let far_clip = proj * glam::Vec4::new(0.0, 0.0, -far, 1.0);
        assert!((far_clip.z / far_clip.w - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_advance_integrates_time() {
        let params = CameraParams::default();
        let mut camera = CameraController::new(&params, 10, 10);
        camera.handle(CameraEvent::Control {
            control: Control::TurnRight,
            pressed: true,
        });
        let pose = camera.advance(1.0);
        assert!((pose.azimuth - PI / 4.0).abs() < 1e-6);
    }
}
