use super::error::DetectionError;

type Callback<T> = Box<dyn FnOnce(Result<T, DetectionError>) + Send>;

/// One-shot completion handle handed to a detector with every dispatch.
///
/// `complete` consumes the handle, so a dispatched frame is reported at most
/// once. Dropping the handle without completing reports
/// `DetectionError::Abandoned`, so it is reported exactly once.
pub struct Completion<T> {
    callback: Option<Callback<T>>,
}

impl<T> Completion<T> {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(Result<T, DetectionError>) + Send + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// Report the outcome of the detection.
    pub fn complete(mut self, result: Result<T, DetectionError>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }

    pub fn succeed(self, output: T) {
        self.complete(Ok(output));
    }

    pub fn fail(self, error: DetectionError) {
        self.complete(Err(error));
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(Err(DetectionError::Abandoned));
        }
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("pending", &self.callback.is_some())
            .finish()
    }
}
