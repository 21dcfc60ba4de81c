//! Training data containers.

use neurso_core::Tensor;

/// One input/target pair. Targets are flat; the network's output shape
/// determines how they are read.
#[derive(Debug, Clone)]
pub struct Sample {
    pub input: Tensor,
    pub target: Vec<f32>,
}

impl Sample {
    pub fn new(input: Tensor, target: Vec<f32>) -> Self {
        Self { input, target }
    }
}

/// Flat datasets batch independent samples; sequential datasets group
/// samples into ordered timestep lists, trained with the loss applied to
/// the final step's output.
#[derive(Debug, Clone)]
pub enum Dataset {
    Flat(Vec<Sample>),
    Sequential(Vec<Vec<Sample>>),
}

impl Dataset {
    /// Number of training units (samples, or whole sequences).
    pub fn len(&self) -> usize {
        match self {
            Dataset::Flat(samples) => samples.len(),
            Dataset::Sequential(sequences) => sequences.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split off the trailing `fraction` of units as a validation set.
    /// The split is positional; shuffle beforehand if order carries
    /// signal.
    pub fn validation_split(self, fraction: f32) -> (Dataset, Dataset) {
        let fraction = fraction.clamp(0.0, 1.0);
        match self {
            Dataset::Flat(mut samples) => {
                let keep = held_out_boundary(samples.len(), fraction);
                let held = samples.split_off(keep);
                (Dataset::Flat(samples), Dataset::Flat(held))
            }
            Dataset::Sequential(mut sequences) => {
                let keep = held_out_boundary(sequences.len(), fraction);
                let held = sequences.split_off(keep);
                (Dataset::Sequential(sequences), Dataset::Sequential(held))
            }
        }
    }
}

fn held_out_boundary(len: usize, fraction: f32) -> usize {
    len - (len as f32 * fraction).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(n: usize) -> Dataset {
        Dataset::Flat(
            (0..n)
                .map(|i| Sample::new(Tensor::from_vec(vec![i as f32]), vec![0.0]))
                .collect(),
        )
    }

    #[test]
    fn test_validation_split_fraction() {
        let (train, validation) = flat(10).validation_split(0.2);
        assert_eq!(train.len(), 8);
        assert_eq!(validation.len(), 2);
    }

    #[test]
    fn test_zero_fraction_keeps_everything() {
        let (train, validation) = flat(5).validation_split(0.0);
        assert_eq!(train.len(), 5);
        assert!(validation.is_empty());
    }

    #[test]
    fn test_split_is_positional() {
        let (train, validation) = flat(4).validation_split(0.5);
        match (train, validation) {
            (Dataset::Flat(t), Dataset::Flat(v)) => {
                assert_eq!(t[0].input.data, vec![0.0]);
                assert_eq!(v[0].input.data, vec![2.0]);
            }
            _ => unreachable!(),
        }
    }
}
