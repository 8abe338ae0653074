use crate::error::Error;
use num_traits::FromPrimitive;
use std::ops::{Index, IndexMut};

/// The 17 landmarks of the MoveNet single-pose layout, in tensor order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, num_derive::FromPrimitive)]
pub enum KeypointKind {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

pub const NUM_KEYPOINTS: usize = 17;

/// Values per keypoint in the model output: `(y, x, confidence)`.
pub const VALUES_PER_KEYPOINT: usize = 3;

impl KeypointKind {
    pub const ALL: [KeypointKind; NUM_KEYPOINTS] = [
        Self::Nose,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEar,
        Self::RightEar,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];

    /// The landmark stored at row `index` of the model output.
    pub fn from_idx(index: usize) -> Result<Self, Error> {
        Self::from_usize(index).ok_or(Error::ConvertUSizeToKeypointKind(index))
    }

    /// Stable camelCase name, as consumed by UI layers.
    pub fn name(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "leftEye",
            Self::RightEye => "rightEye",
            Self::LeftEar => "leftEar",
            Self::RightEar => "rightEar",
            Self::LeftShoulder => "leftShoulder",
            Self::RightShoulder => "rightShoulder",
            Self::LeftElbow => "leftElbow",
            Self::RightElbow => "rightElbow",
            Self::LeftWrist => "leftWrist",
            Self::RightWrist => "rightWrist",
            Self::LeftHip => "leftHip",
            Self::RightHip => "rightHip",
            Self::LeftKnee => "leftKnee",
            Self::RightKnee => "rightKnee",
            Self::LeftAnkle => "leftAnkle",
            Self::RightAnkle => "rightAnkle",
        }
    }
}

impl std::fmt::Display for KeypointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A keypoint in normalized image coordinates; all fields lie in `[0, 1]`.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    pub fn is_valid(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }

    pub fn to_screen(self, screen_width: f32, screen_height: f32) -> ScreenKeypoint {
        ScreenKeypoint {
            x: self.x * screen_width,
            y: self.y * screen_height,
            confidence: self.confidence,
        }
    }
}

/// A keypoint in destination pixel space.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct ScreenKeypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

/// One value per landmark, indexed by [`KeypointKind`].
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Skeleton<P> {
    points: [P; NUM_KEYPOINTS],
}

pub type PoseKeypoints = Skeleton<Keypoint>;
pub type ScreenKeypoints = Skeleton<ScreenKeypoint>;

impl<P> Skeleton<P> {
    pub fn new(points: [P; NUM_KEYPOINTS]) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[P; NUM_KEYPOINTS] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeypointKind, &P)> + '_ {
        KeypointKind::ALL.iter().copied().zip(self.points.iter())
    }

    pub fn map<Q, F>(&self, mut f: F) -> Skeleton<Q>
    where
        Q: Copy + Default,
        F: FnMut(&P) -> Q,
    {
        let mut points = [Q::default(); NUM_KEYPOINTS];
        for (dst, src) in points.iter_mut().zip(self.points.iter()) {
            *dst = f(src);
        }
        Skeleton { points }
    }
}

impl<P> Index<KeypointKind> for Skeleton<P> {
    type Output = P;

    fn index(&self, kind: KeypointKind) -> &Self::Output {
        // discriminants are 0..NUM_KEYPOINTS by construction
        &self.points[kind as usize]
    }
}

impl<P> IndexMut<KeypointKind> for Skeleton<P> {
    fn index_mut(&mut self, kind: KeypointKind) -> &mut Self::Output {
        &mut self.points[kind as usize]
    }
}

pub(crate) mod constants {
    use crate::pose::KeypointKind::{self, *};

    /// Joints that contribute to a pose's overall confidence.
    pub(crate) const CORE_JOINTS: [KeypointKind; 7] = [
        Nose,
        LeftShoulder,
        RightShoulder,
        LeftHip,
        RightHip,
        LeftKnee,
        RightKnee,
    ];

    /// Joints with confidence at or below this floor are left out of the overall confidence.
    pub(crate) const CORE_JOINT_FLOOR: f32 = 0.1;
}
