//! Keyframe tracks for thrown objects and the player that applies them.

use nalgebra::{Point3, Unit};
use tracing::debug;

use crate::error::AnimationError;
use crate::raycast::{Raycast, Raycaster};
use crate::scene::{NodeId, Scene};

/// Property name position tracks are bound to
pub const POSITION_PROPERTY: &str = ".position";

/// Time-keyed positions, played back with linear interpolation
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeTrack {
    pub name: String,
    pub times: Vec<f32>,
    pub values: Vec<Point3<f32>>,
}

impl KeyframeTrack {
    pub fn new(name: impl Into<String>, times: Vec<f32>, values: Vec<Point3<f32>>) -> Self {
        debug_assert_eq!(times.len(), values.len());
        Self {
            name: name.into(),
            times,
            values,
        }
    }

    /// Time of the last key
    pub fn duration(&self) -> f32 {
        self.times.last().copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Interpolated position at `time`, clamped to the first and last keys.
    ///
    /// Keys without a partner (when `times` and `values` differ in length)
    /// are ignored.
    pub fn sample(&self, time: f32) -> Option<Point3<f32>> {
        let keys = self.times.len().min(self.values.len());
        let (times, values) = (&self.times[..keys], &self.values[..keys]);

        let (&first_time, &first) = (times.first()?, values.first()?);
        if time <= first_time {
            return Some(first);
        }

        // First key strictly after `time`; out of order keys only skew the search
        let next = times.partition_point(|&t| t <= time).max(1);
        if next >= keys {
            return values.last().copied();
        }

        let (t0, t1) = (times[next - 1], times[next]);
        let (p0, p1) = (values[next - 1], values[next]);
        let span = t1 - t0;
        if span <= 0.0 {
            return Some(p1);
        }
        Some(p0 + (p1 - p0) * ((time - t0) / span))
    }
}

/// Plan the flight of a thrown object from `start` towards `end`.
///
/// The object moves at constant speed so that it would reach `end` after
/// `duration`. If a ray from `start` towards `end` hits one of `obstacles`
/// before `end`, the object instead stops at the nearest hit, arriving at the
/// proportional time, and holds there until `duration`.
pub fn position_track<O: Raycast + ?Sized>(
    start: &Point3<f32>,
    end: &Point3<f32>,
    duration: f32,
    obstacles: &O,
) -> Result<KeyframeTrack, AnimationError> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(AnimationError::InvalidDuration(duration));
    }

    let offset = end - start;
    let total = offset.norm();
    let direction =
        Unit::try_new(offset, f32::EPSILON).ok_or(AnimationError::DegenerateTrajectory)?;

    let raycaster = Raycaster::new(*start, direction).with_far(total);
    let track = match raycaster.intersect_objects(obstacles).first() {
        Some(hit) => {
            let rate = hit.distance / total;
            let stop = raycaster.ray.at(hit.distance);
            debug!(object = %hit.object, distance = hit.distance, rate, "trajectory blocked");
            KeyframeTrack::new(
                POSITION_PROPERTY,
                vec![0.0, duration * rate, duration],
                vec![*start, stop, stop],
            )
        }
        None => {
            debug!(distance = total, "trajectory clear");
            KeyframeTrack::new(POSITION_PROPERTY, vec![0.0, duration], vec![*start, *end])
        }
    };

    Ok(track)
}

/// One track being played on one scene node
#[derive(Debug, Clone)]
pub struct AnimationAction {
    pub node: NodeId,
    pub track: KeyframeTrack,
    pub time: f32,
}

impl AnimationAction {
    pub fn is_finished(&self) -> bool {
        self.time >= self.track.duration()
    }
}

/// Plays position tracks once, leaving each node at its final key
#[derive(Debug, Clone, Default)]
pub struct AnimationMixer {
    actions: Vec<AnimationAction>,
}

impl AnimationMixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start playing `track` on `node`, replacing any action already on it
    pub fn play(&mut self, node: NodeId, track: KeyframeTrack) {
        self.actions.retain(|action| action.node != node);
        self.actions.push(AnimationAction {
            node,
            track,
            time: 0.0,
        });
    }

    pub fn active(&self) -> &[AnimationAction] {
        &self.actions
    }

    pub fn is_idle(&self) -> bool {
        self.actions.is_empty()
    }

    /// Advance every action by `delta` seconds and write the sampled
    /// positions into `scene`. Returns the nodes whose actions completed.
    pub fn update(&mut self, delta: f32, scene: &mut Scene) -> Vec<NodeId> {
        let mut finished = Vec::new();

        for action in &mut self.actions {
            action.time = (action.time + delta).min(action.track.duration());
            if let (Some(position), Some(node)) =
                (action.track.sample(action.time), scene.node_mut(action.node))
            {
                node.set_position(&position);
            }
            if action.is_finished() {
                finished.push(action.node);
            }
        }

        self.actions.retain(|action| !action.is_finished());
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Mesh;
    use crate::raycast::Intersection;
    use crate::scene::SceneNode;
    use crate::transform::Transform;
    use approx::assert_relative_eq;

    /// Reports hits at fixed distances along whatever ray it is given
    struct FixedHits(Vec<f32>);

    impl Raycast for FixedHits {
        fn raycast(&self, raycaster: &Raycaster, hits: &mut Vec<Intersection>) {
            for &distance in &self.0 {
                if distance <= raycaster.far {
                    hits.push(Intersection {
                        distance,
                        point: raycaster.ray.at(distance),
                        face_index: 0,
                        object: format!("hit@{distance}"),
                    });
                }
            }
        }
    }

    fn origin() -> Point3<f32> {
        Point3::origin()
    }

    fn ten_x() -> Point3<f32> {
        Point3::new(10.0, 0.0, 0.0)
    }

    #[test]
    fn test_straight_line_without_obstacles() {
        let obstacles: Vec<SceneNode> = Vec::new();
        let track = position_track(&origin(), &ten_x(), 10.0, &obstacles).unwrap();
        assert_eq!(track.name, POSITION_PROPERTY);
        assert_eq!(track.times, vec![0.0, 10.0]);
        assert_eq!(track.values, vec![origin(), ten_x()]);
    }

    #[test]
    fn test_obstacle_halfway() {
        let track = position_track(&origin(), &ten_x(), 10.0, &FixedHits(vec![5.0])).unwrap();
        assert_eq!(track.times, vec![0.0, 5.0, 10.0]);
        let stop = Point3::new(5.0, 0.0, 0.0);
        assert_eq!(track.values, vec![origin(), stop, stop]);
    }

    #[test]
    fn test_obstacle_near_start() {
        let track = position_track(&origin(), &ten_x(), 4.0, &FixedHits(vec![1.0])).unwrap();
        assert_relative_eq!(track.times[1], 4.0 * 0.1);
        assert_relative_eq!(track.values[1], Point3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_nearest_of_multiple_regardless_of_order() {
        for distances in [vec![3.0, 7.0], vec![7.0, 3.0]] {
            let track = position_track(&origin(), &ten_x(), 10.0, &FixedHits(distances)).unwrap();
            assert_relative_eq!(track.times[1], 3.0);
            assert_relative_eq!(track.values[2], Point3::new(3.0, 0.0, 0.0));
        }
    }

    #[test]
    fn test_obstacle_beyond_end_is_ignored() {
        let track = position_track(&origin(), &ten_x(), 10.0, &FixedHits(vec![12.0])).unwrap();
        assert_eq!(track.times, vec![0.0, 10.0]);
    }

    #[test]
    fn test_real_obstacle_in_scene() {
        let wall = SceneNode::with_mesh("wall", Mesh::cube(2.0))
            .with_transform(Transform::translation_matrix(0.0, 0.0, -6.0));
        let start = Point3::new(0.0, 0.3, 0.0);
        let end = Point3::new(0.0, 0.3, -20.0);

        let track = position_track(&start, &end, 10.0, &vec![&wall]).unwrap();
        assert_eq!(track.len(), 3);
        // Front face of the wall sits at z = -5
        assert_relative_eq!(track.times[1], 10.0 * 5.0 / 20.0, epsilon = 1e-4);
        assert_relative_eq!(track.values[1], Point3::new(0.0, 0.3, -5.0), epsilon = 1e-4);
    }

    #[test]
    fn test_track_monotonic_and_bounded() {
        let cases = [
            (Point3::new(1.0, 2.0, 3.0), Point3::new(-4.0, 0.5, 9.0), 3.5, vec![]),
            (Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 8.0, 6.0), 2.0, vec![0.0]),
            (Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 8.0, 6.0), 2.0, vec![10.0]),
            (Point3::new(5.0, 5.0, 5.0), Point3::new(6.0, 5.0, 5.0), 0.25, vec![0.5, 0.2]),
        ];

        for (start, end, duration, distances) in cases {
            let track = position_track(&start, &end, duration, &FixedHits(distances)).unwrap();
            assert_eq!(track.times[0], 0.0);
            assert_relative_eq!(track.duration(), duration);
            assert!(track.times.windows(2).all(|pair| pair[0] <= pair[1]));
            assert_eq!(track.values[0], start);
        }
    }

    #[test]
    fn test_idempotent() {
        let obstacles = FixedHits(vec![2.5, 6.0]);
        let a = position_track(&origin(), &ten_x(), 10.0, &obstacles).unwrap();
        let b = position_track(&origin(), &ten_x(), 10.0, &obstacles).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_degenerate_inputs_rejected() {
        let none: Vec<SceneNode> = Vec::new();
        assert_eq!(
            position_track(&ten_x(), &ten_x(), 10.0, &none),
            Err(AnimationError::DegenerateTrajectory)
        );
        assert_eq!(
            position_track(&origin(), &ten_x(), 0.0, &none),
            Err(AnimationError::InvalidDuration(0.0))
        );
        assert!(matches!(
            position_track(&origin(), &ten_x(), f32::NAN, &none),
            Err(AnimationError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_sample_interpolates_and_clamps() {
        let stop = Point3::new(5.0, 0.0, 0.0);
        let track = KeyframeTrack::new(
            POSITION_PROPERTY,
            vec![0.0, 5.0, 10.0],
            vec![origin(), stop, stop],
        );
        assert_eq!(track.sample(-1.0), Some(origin()));
        assert_relative_eq!(track.sample(2.5).unwrap(), Point3::new(2.5, 0.0, 0.0));
        assert_eq!(track.sample(7.0), Some(stop));
        assert_eq!(track.sample(11.0), Some(stop));

        let empty = KeyframeTrack::new(POSITION_PROPERTY, Vec::new(), Vec::new());
        assert_eq!(empty.sample(1.0), None);
    }

    #[test]
    fn test_sample_malformed_tracks() {
        let lopsided = KeyframeTrack {
            name: POSITION_PROPERTY.into(),
            times: vec![0.0, 5.0, 10.0],
            values: vec![origin(), ten_x()],
        };
        assert_relative_eq!(lopsided.sample(2.5).unwrap(), Point3::new(5.0, 0.0, 0.0));
        assert_eq!(lopsided.sample(20.0), Some(ten_x()));

        let no_times = KeyframeTrack {
            name: POSITION_PROPERTY.into(),
            times: Vec::new(),
            values: vec![origin()],
        };
        assert_eq!(no_times.sample(1.0), None);

        let unsorted = KeyframeTrack {
            name: POSITION_PROPERTY.into(),
            times: vec![0.0, 8.0, 2.0, 4.0],
            values: vec![origin(), ten_x(), origin(), ten_x()],
        };
        for t in [0.5, 3.0, 6.0, 9.0] {
            assert!(unsorted.sample(t).is_some());
        }
    }

    #[test]
    fn test_sample_with_zero_length_segment() {
        let track = KeyframeTrack::new(
            POSITION_PROPERTY,
            vec![0.0, 0.0, 4.0],
            vec![origin(), origin(), ten_x()],
        );
        assert_relative_eq!(track.sample(2.0).unwrap(), Point3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn test_mixer_moves_node_and_holds() {
        let mut scene = Scene::new();
        let ball = scene.add_projectile(SceneNode::group("ball"));
        let track = position_track(&origin(), &ten_x(), 10.0, &FixedHits(vec![5.0])).unwrap();

        let mut mixer = AnimationMixer::new();
        mixer.play(ball, track);

        assert!(mixer.update(2.5, &mut scene).is_empty());
        assert_relative_eq!(scene.node(ball).unwrap().position(), Point3::new(2.5, 0.0, 0.0));

        assert!(mixer.update(5.0, &mut scene).is_empty());
        assert_relative_eq!(scene.node(ball).unwrap().position(), Point3::new(5.0, 0.0, 0.0));

        assert_eq!(mixer.update(5.0, &mut scene), vec![ball]);
        assert!(mixer.is_idle());
        assert_relative_eq!(scene.node(ball).unwrap().position(), Point3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn test_mixer_replaces_action_on_same_node() {
        let mut scene = Scene::new();
        let ball = scene.add_projectile(SceneNode::group("ball"));
        let mut mixer = AnimationMixer::new();
        let short = KeyframeTrack::new(POSITION_PROPERTY, vec![0.0, 1.0], vec![origin(), ten_x()]);
        mixer.play(ball, short.clone());
        mixer.play(ball, short);
        assert_eq!(mixer.active().len(), 1);
    }
}
