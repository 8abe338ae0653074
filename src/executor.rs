use crate::error::BoxError;
use ndarray::ArrayView3;

/// A borrowed `[height, width, channels]` model input.
#[derive(Debug, Clone, Copy)]
pub enum ModelInput<'a> {
    U8(ArrayView3<'a, u8>),
    F32(ArrayView3<'a, f32>),
}

impl ModelInput<'_> {
    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            Self::U8(view) => view.dim(),
            Self::F32(view) => view.dim(),
        }
    }
}

/// Runs the pose model on one preprocessed frame.
///
/// Implementations wrap whatever runtime actually executes the model. The
/// pipeline only relies on the first returned tensor.
pub trait ModelExecutor {
    fn run(&mut self, input: ModelInput<'_>) -> Result<Vec<Vec<f32>>, BoxError>;
}

impl<F> ModelExecutor for F
where
    F: FnMut(ModelInput<'_>) -> Result<Vec<Vec<f32>>, BoxError>,
{
    fn run(&mut self, input: ModelInput<'_>) -> Result<Vec<Vec<f32>>, BoxError> {
        self(input)
    }
}
