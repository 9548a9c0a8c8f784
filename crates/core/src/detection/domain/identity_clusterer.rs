//! Online identity assignment over face descriptors.
//!
//! Each scan owns one [`IdentityClusterer`]. Descriptors are compared against
//! the registry in insertion order and the **first** entry closer than the
//! uniqueness threshold wins, even if a later entry is closer. When three or
//! more faces lie mutually within the threshold this can tag a face with an
//! older identity rather than its nearest one. Assignment depends only on
//! descriptor order, so identical streams always yield identical IDs.

/// Append-only list of identity descriptors. Index is the face ID.
#[derive(Clone, Debug, Default)]
pub struct FaceRegistry {
    descriptors: Vec<Vec<f32>>,
}

impl FaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn get(&self, face_id: usize) -> Option<&[f32]> {
        self.descriptors.get(face_id).map(|d| d.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        self.descriptors.iter().map(|d| d.as_slice())
    }

    fn push(&mut self, descriptor: Vec<f32>) -> usize {
        self.descriptors.push(descriptor);
        self.descriptors.len() - 1
    }
}

/// Assigns stable face IDs by greedy first-match over a per-scan registry.
#[derive(Clone, Debug)]
pub struct IdentityClusterer {
    registry: FaceRegistry,
    uniqueness_threshold: f64,
}

impl IdentityClusterer {
    pub fn new(uniqueness_threshold: f64) -> Self {
        Self {
            registry: FaceRegistry::new(),
            uniqueness_threshold,
        }
    }

    /// Returns the face ID for `descriptor`, registering a new identity if
    /// no existing one is within the threshold.
    pub fn assign(&mut self, descriptor: &[f32]) -> usize {
        let matched = self
            .registry
            .iter()
            .position(|known| euclidean_distance(descriptor, known) < self.uniqueness_threshold);

        match matched {
            Some(face_id) => {
                log::debug!("Face matches identity {face_id}");
                face_id
            }
            None => {
                let face_id = self.registry.push(descriptor.to_vec());
                log::debug!("New identity {face_id}");
                face_id
            }
        }
    }

    pub fn registry(&self) -> &FaceRegistry {
        &self.registry
    }

    pub fn unique_faces(&self) -> usize {
        self.registry.len()
    }

    pub fn uniqueness_threshold(&self) -> f64 {
        self.uniqueness_threshold
    }
}

/// Euclidean distance between two descriptors of equal length.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "descriptor lengths must match");
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}
